// Transition state machine: classifies each snapshot as intro / sync / transition /
// outro and drives the timeline runner and content sync accordingly.
// `is_animating` is the only lock; snapshots arriving while it is held are dropped.

use std::cell::RefCell;
use std::rc::Rc;

use futures::FutureExt;

use crate::config::Messages;
use crate::content::ContentSync;
use crate::host::SharedHost;
use crate::preset::AnimationConfig;
use crate::skin::Skin;
use crate::timeline::{TimelineEntry, TimelineHandle, TimelineOutcome, TimelineRunner};
use crate::types::{
    AnimationPhase, BufferId, EnginePhase, EngineState, PlaybackSnapshot, StatusMessage, Target,
};

/// What a snapshot makes the engine do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// An animation holds the lock; the snapshot is ignored.
    Drop,
    /// A failed poll arrived mid-animation: cancel it, then decide again.
    Interrupt,
    /// Nothing to animate; only the status slot changes.
    StatusOnly,
    Intro,
    Outro,
    Transition,
    Sync,
}

impl Decision {
    /// Decisions that run a timeline and hold the lock until it settles.
    pub fn is_animated(&self) -> bool {
        matches!(self, Decision::Intro | Decision::Outro | Decision::Transition)
    }
}

/// Lock token of an accepted phase.
#[derive(Debug, Clone, Copy)]
struct Started {
    epoch: u64,
    buffer: BufferId,
    received_at: f64,
}

/// Pure classification of `snapshot` against `state`. `first` marks the very
/// first snapshot the widget receives.
pub fn decide(state: &EngineState, snapshot: &PlaybackSnapshot, first: bool) -> Decision {
    if state.is_animating && !first {
        return match (&snapshot.error, state.phase) {
            (None, _) => Decision::Drop,
            // Already heading to idle.
            (Some(_), EnginePhase::Outro) => Decision::StatusOnly,
            (Some(_), _) => Decision::Interrupt,
        };
    }

    if state.phase == EnginePhase::Idle {
        return if snapshot.has_track() {
            Decision::Intro
        } else {
            Decision::StatusOnly
        };
    }

    if !snapshot.has_track() {
        Decision::Outro
    } else if snapshot.track_id != state.last_track_id {
        Decision::Transition
    } else {
        Decision::Sync
    }
}

/// Owns the engine state of one widget.
pub struct TransitionStateMachine {
    host: SharedHost,
    skin: Rc<Skin>,
    messages: Messages,
    config: RefCell<AnimationConfig>,
    state: RefCell<EngineState>,
    runner: TimelineRunner,
    content: Rc<ContentSync>,
    current: RefCell<Option<TimelineHandle>>,
    last_snapshot: RefCell<Option<(PlaybackSnapshot, f64)>>,
}

impl TransitionStateMachine {
    pub fn new(
        host: SharedHost,
        skin: Rc<Skin>,
        config: AnimationConfig,
        content: Rc<ContentSync>,
        messages: Messages,
    ) -> Self {
        TransitionStateMachine {
            runner: TimelineRunner::new(host.clone()),
            host,
            skin,
            messages,
            config: RefCell::new(config),
            state: RefCell::new(EngineState::default()),
            content,
            current: RefCell::new(None),
            last_snapshot: RefCell::new(None),
        }
    }

    pub fn state(&self) -> EngineState {
        self.state.borrow().clone()
    }

    pub fn runner(&self) -> &TimelineRunner {
        &self.runner
    }

    pub fn content(&self) -> &Rc<ContentSync> {
        &self.content
    }

    /// Replaces the baked animation config; used from the next phase on.
    pub fn set_animation_config(&self, config: AnimationConfig) {
        *self.config.borrow_mut() = config;
    }

    /// Feeds one snapshot through the state machine and runs whatever it decides,
    /// resolving once the resulting phase finished or was superseded.
    pub async fn on_snapshot(&self, snapshot: PlaybackSnapshot) -> Decision {
        let (decision, started) = self.accept(&snapshot);
        self.run_phase(decision, snapshot, started).await;
        decision
    }

    /// Decides in the caller's turn and runs the resulting phase as its own task.
    /// The returned decision is final: a dropped snapshot is never looked at again.
    pub fn dispatch(self: &Rc<Self>, snapshot: PlaybackSnapshot) -> Decision {
        let (decision, started) = self.accept(&snapshot);
        if decision.is_animated() {
            let this = self.clone();
            self.host.spawn(
                async move { this.run_phase(decision, snapshot, started).await }.boxed_local(),
            );
        }
        decision
    }

    /// Cancels whatever runs and plays the intro again on the active buffer with the
    /// last accepted track. Returns false when no track has been shown yet.
    pub async fn replay_intro(&self) -> bool {
        let Some((snapshot, received_at)) = self.last_snapshot.borrow().clone() else {
            return false;
        };
        // Nothing on screen; the next playing snapshot runs the intro anyway.
        if self.state.borrow().last_track_id.is_none() {
            return false;
        }
        self.interrupt();
        let started = self.begin(EnginePhase::Intro, Some(&snapshot), received_at);
        self.intro(snapshot, started).await;
        true
    }

    /// Everything that happens synchronously for a snapshot: classification, status,
    /// sync, and taking the lock for an animated phase.
    #[tracing::instrument(
        skip_all,
        fields(track = ?snapshot.track_id, playing = snapshot.is_playing)
    )]
    fn accept(&self, snapshot: &PlaybackSnapshot) -> (Decision, Started) {
        let received_at = self.host.now_ms();
        let first = {
            let mut state = self.state.borrow_mut();
            state.snapshots_seen += 1;
            state.snapshots_seen == 1
        };

        let mut decision = decide(&self.state.borrow(), snapshot, first);
        if decision == Decision::Interrupt {
            tracing::info!(error = ?snapshot.error, "poll failed mid-animation, interrupting");
            self.interrupt();
            decision = decide(&self.state.borrow(), snapshot, first);
        }

        let idle = {
            let state = self.state.borrow();
            Started {
                epoch: state.epoch,
                buffer: state.active_buffer,
                received_at,
            }
        };
        if decision == Decision::Drop {
            tracing::debug!("animation in flight, snapshot dropped");
            return (decision, idle);
        }
        tracing::debug!(?decision, "snapshot accepted");

        self.host.set_status(&self.status_for(snapshot));
        if snapshot.has_track() {
            *self.last_snapshot.borrow_mut() = Some((snapshot.clone(), received_at));
        }

        let started = match decision {
            Decision::Intro => self.begin(EnginePhase::Intro, Some(snapshot), received_at),
            Decision::Transition => {
                self.begin(EnginePhase::Transitioning, Some(snapshot), received_at)
            }
            Decision::Outro => self.begin(EnginePhase::Outro, None, received_at),
            Decision::Sync => {
                self.sync(snapshot, received_at);
                idle
            }
            Decision::StatusOnly => {
                self.state.borrow_mut().is_playing = false;
                idle
            }
            Decision::Drop | Decision::Interrupt => idle,
        };
        (decision, started)
    }

    async fn run_phase(&self, decision: Decision, snapshot: PlaybackSnapshot, started: Started) {
        if self.superseded(started.epoch) {
            return;
        }
        match decision {
            Decision::Intro => self.intro(snapshot, started).await,
            Decision::Transition => self.transition(snapshot, started).await,
            Decision::Outro => self.outro(started).await,
            _ => {}
        }
    }

    fn status_for(&self, snapshot: &PlaybackSnapshot) -> StatusMessage {
        match &snapshot.error {
            Some(err) => StatusMessage::Error(format!("{}{}", self.messages.error_prefix, err)),
            None if !snapshot.has_track() => StatusMessage::Idle(self.messages.idle.clone()),
            None => StatusMessage::Hidden,
        }
    }

    /// Cancels the in-flight timeline and invalidates the operation awaiting it.
    /// A half-done transition is committed so exactly one buffer stays active.
    fn interrupt(&self) {
        if let Some(handle) = self.current.borrow_mut().take() {
            self.runner.cancel(handle);
        }

        let mut state = self.state.borrow_mut();
        state.epoch += 1;
        state.is_animating = false;
        if state.phase == EnginePhase::Transitioning {
            let outgoing = state.active_buffer;
            state.active_buffer = outgoing.other();
            state.phase = EnginePhase::Synced;
            drop(state);
            self.content.clear(outgoing);
            self.host.set_buffer_inert(outgoing, true);
        }
    }

    /// Takes the lock for `phase`. A snapshot with a track becomes the shown track.
    fn begin(
        &self,
        phase: EnginePhase,
        track: Option<&PlaybackSnapshot>,
        received_at: f64,
    ) -> Started {
        let mut state = self.state.borrow_mut();
        state.epoch += 1;
        state.phase = phase;
        state.is_animating = true;
        if let Some(snapshot) = track {
            state.last_track_id = snapshot.track_id.clone();
            state.is_playing = true;
        }
        tracing::info!(?phase, buffer = %state.active_buffer, "phase started");
        Started {
            epoch: state.epoch,
            buffer: state.active_buffer,
            received_at,
        }
    }

    fn superseded(&self, epoch: u64) -> bool {
        self.state.borrow().epoch != epoch
    }

    fn entries(&self, buffer: BufferId, phase: AnimationPhase) -> Vec<TimelineEntry> {
        let config = self.config.borrow();
        self.skin
            .components()
            .map(|component| {
                TimelineEntry::new(
                    Target::new(buffer, component),
                    phase,
                    config.get(component, phase),
                )
            })
            .collect()
    }

    async fn animate(&self, entries: Vec<TimelineEntry>) -> TimelineOutcome {
        let (handle, settled) = self.runner.run(entries);
        *self.current.borrow_mut() = Some(handle);
        let outcome = settled.await;
        let mut current = self.current.borrow_mut();
        if *current == Some(handle) {
            *current = None;
        }
        outcome
    }

    async fn intro(&self, snapshot: PlaybackSnapshot, started: Started) {
        let Started {
            epoch,
            buffer,
            received_at,
        } = started;
        self.host.set_container_inert(false);

        self.content.populate(buffer, &snapshot).await;
        if self.superseded(epoch) {
            return;
        }

        let outcome = self.animate(self.entries(buffer, AnimationPhase::Intro)).await;
        if outcome == TimelineOutcome::Cancelled || self.superseded(epoch) {
            return;
        }

        {
            let mut state = self.state.borrow_mut();
            state.phase = EnginePhase::Synced;
            state.is_animating = false;
        }
        self.content.start_ticking(buffer, &snapshot, received_at);
        tracing::info!(%buffer, "intro finished");
    }

    async fn transition(&self, snapshot: PlaybackSnapshot, started: Started) {
        let Started {
            epoch,
            buffer: outgoing,
            received_at,
        } = started;
        let incoming = outgoing.other();

        self.content.populate(incoming, &snapshot).await;
        if self.superseded(epoch) {
            return;
        }

        let mut entries = self.entries(outgoing, AnimationPhase::TransitionOut);
        entries.extend(self.entries(incoming, AnimationPhase::TransitionIn));
        let outcome = self.animate(entries).await;
        if outcome == TimelineOutcome::Cancelled || self.superseded(epoch) {
            return;
        }

        {
            let mut state = self.state.borrow_mut();
            state.active_buffer = incoming;
            state.phase = EnginePhase::Synced;
            state.is_animating = false;
        }
        self.content.stop_ticking(outgoing);
        self.content.clear(outgoing);
        self.content.start_ticking(incoming, &snapshot, received_at);
        tracing::info!(from = %outgoing, to = %incoming, "buffers swapped");
    }

    async fn outro(&self, started: Started) {
        let Started { epoch, buffer, .. } = started;

        let outcome = self.animate(self.entries(buffer, AnimationPhase::Outro)).await;
        if outcome == TimelineOutcome::Cancelled || self.superseded(epoch) {
            return;
        }

        self.content.stop_ticking(buffer);
        self.content.clear(buffer);
        self.host.set_buffer_inert(buffer, true);
        self.host.set_container_inert(true);
        {
            let mut state = self.state.borrow_mut();
            state.phase = EnginePhase::Idle;
            state.is_animating = false;
            state.is_playing = false;
            state.last_track_id = None;
        }
        tracing::info!(%buffer, "outro finished, idle");
    }

    fn sync(&self, snapshot: &PlaybackSnapshot, received_at: f64) {
        let buffer = self.state.borrow().active_buffer;
        self.state.borrow_mut().is_playing = true;
        self.content.sync_progress(buffer, snapshot);
        self.content.start_ticking(buffer, snapshot, received_at);
    }
}
