// Timeline runner: prepare every entry, wait one paint frame, animate every entry,
// then wait for the slowest one. A buffer is never driven by two timelines at once.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use futures::future::{AbortHandle, Abortable, LocalBoxFuture};
use futures::FutureExt;

use crate::animation::{AnimationKind, AnimationSpec};
use crate::error::EngineError;
use crate::host::{SharedHost, StyleCommand};
use crate::types::{AnimationPhase, BufferId, Target};

/// One element's part in a timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEntry {
    pub target: Target,
    pub phase: AnimationPhase,
    pub spec: AnimationSpec,
    /// Clear inline animation styling on completion (and make outgoing buffers inert).
    pub cleanup: bool,
}

impl TimelineEntry {
    pub fn new(target: Target, phase: AnimationPhase, spec: AnimationSpec) -> Self {
        TimelineEntry {
            target,
            phase,
            spec,
            cleanup: true,
        }
    }

    /// Keep the end style inline after completion.
    pub fn keep_styles(mut self) -> Self {
        self.cleanup = false;
        self
    }

    pub fn is_outgoing(&self) -> bool {
        !self.phase.is_entrance()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimelineHandle(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineOutcome {
    Completed,
    Cancelled,
}

struct Running {
    id: u64,
    abort: AbortHandle,
    entries: Rc<[TimelineEntry]>,
}

impl Running {
    fn touches(&self, buffer: BufferId) -> bool {
        self.entries.iter().any(|e| e.target.buffer == buffer)
    }
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    running: Vec<Running>,
}

/// Starts, tracks and cancels timelines.
pub struct TimelineRunner {
    host: SharedHost,
    registry: Rc<RefCell<Registry>>,
}

impl TimelineRunner {
    pub fn new(host: SharedHost) -> Self {
        TimelineRunner {
            host,
            registry: Rc::new(RefCell::new(Registry::default())),
        }
    }

    /// Starts `entries` and returns a future that settles once the slowest entry
    /// finished or the timeline was cancelled. Start styles are applied before this
    /// returns, so every entry is prepared in the caller's turn. Any timeline already
    /// driving one of the touched buffers is cancelled first.
    pub fn run(
        &self,
        entries: Vec<TimelineEntry>,
    ) -> (TimelineHandle, LocalBoxFuture<'static, TimelineOutcome>) {
        let buffers: BTreeSet<_> = entries.iter().map(|e| e.target.buffer.index()).collect();
        for buffer in [BufferId::A, BufferId::B] {
            if !buffers.contains(&buffer.index()) {
                continue;
            }
            if let Some(previous) = self.running_on(buffer) {
                tracing::warn!(%buffer, "cancelling timeline still driving buffer");
                self.cancel(previous);
            }
            debug_assert!(
                self.running_on(buffer).is_none(),
                "{}",
                EngineError::AnimationRace { buffer }
            );
        }

        // Step 1: start styles, all in this turn.
        for entry in entries.iter().filter(|e| !e.is_outgoing()) {
            self.host.set_buffer_inert(entry.target.buffer, false);
        }
        for entry in &entries {
            self.host.apply_style(
                entry.target,
                &StyleCommand::Prepare {
                    frame: entry.spec.kind.start_style(),
                },
            );
        }

        let length_ms = entries.iter().map(|e| e.spec.total_ms()).max().unwrap_or(0);
        let entries: Rc<[TimelineEntry]> = entries.into();
        let (abort, registration) = AbortHandle::new_pair();

        let id = {
            let mut registry = self.registry.borrow_mut();
            let id = registry.next_id;
            registry.next_id += 1;
            registry.running.push(Running {
                id,
                abort,
                entries: entries.clone(),
            });
            id
        };
        tracing::debug!(id, entries = entries.len(), length_ms, "timeline started");

        let host = self.host.clone();
        let work = async move {
            // Step 2: let the start styles commit.
            host.next_frame().await;

            // Step 3: animate everything in one turn, then wait for the slowest entry.
            for entry in entries.iter() {
                let settle = entry.spec.kind == AnimationKind::None || entry.spec.duration_ms == 0;
                let command = if settle {
                    StyleCommand::Settle {
                        frame: entry.spec.kind.end_style(),
                    }
                } else {
                    StyleCommand::animate(&entry.spec)
                };
                host.apply_style(entry.target, &command);
            }
            if length_ms > 0 {
                host.sleep(length_ms).await;
            }

            finish(&host, &entries);
        };

        let registry = self.registry.clone();
        let future = async move {
            let outcome = match Abortable::new(work, registration).await {
                Ok(()) => TimelineOutcome::Completed,
                Err(_) => TimelineOutcome::Cancelled,
            };
            registry.borrow_mut().running.retain(|r| r.id != id);
            tracing::debug!(id, ?outcome, "timeline settled");
            outcome
        }
        .boxed_local();

        (TimelineHandle(id), future)
    }

    /// Stops a running timeline and leaves its elements at their end style.
    /// Returns false if the timeline already settled.
    pub fn cancel(&self, handle: TimelineHandle) -> bool {
        let running = {
            let mut registry = self.registry.borrow_mut();
            let Some(index) = registry.running.iter().position(|r| r.id == handle.0) else {
                return false;
            };
            registry.running.remove(index)
        };

        running.abort.abort();
        for entry in running.entries.iter() {
            self.host.apply_style(
                entry.target,
                &StyleCommand::Settle {
                    frame: entry.spec.kind.end_style(),
                },
            );
        }
        tracing::debug!(id = handle.0, "timeline cancelled");
        true
    }

    pub fn running_on(&self, buffer: BufferId) -> Option<TimelineHandle> {
        self.registry
            .borrow()
            .running
            .iter()
            .find(|r| r.touches(buffer))
            .map(|r| TimelineHandle(r.id))
    }

    pub fn is_running(&self, buffer: BufferId) -> bool {
        self.running_on(buffer).is_some()
    }

    pub fn running_count(&self) -> usize {
        self.registry.borrow().running.len()
    }
}

fn finish(host: &SharedHost, entries: &[TimelineEntry]) {
    let mut inert = BTreeSet::new();
    for entry in entries {
        if entry.cleanup {
            host.apply_style(entry.target, &StyleCommand::Clear);
            if entry.is_outgoing() {
                inert.insert(entry.target.buffer.index());
            }
        } else {
            host.apply_style(
                entry.target,
                &StyleCommand::Settle {
                    frame: entry.spec.kind.end_style(),
                },
            );
        }
    }
    for buffer in [BufferId::A, BufferId::B] {
        if inert.contains(&buffer.index()) {
            host.set_buffer_inert(buffer, true);
        }
    }
}
