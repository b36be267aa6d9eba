// Test doubles: a host with a virtual clock and a scripted poll source.
// Timers only fire when a test advances the clock, so every await point is observable.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use futures::channel::oneshot;
use futures::executor::{LocalPool, LocalSpawner};
use futures::future::{self, LocalBoxFuture};
use futures::task::LocalSpawnExt;
use futures::FutureExt;

use crate::error::EngineError;
use crate::host::{Host, PollSource, SharedHost, StyleCommand};
use crate::types::{BufferId, Component, PlaybackSnapshot, StatusMessage, Target, TrackMetadata};

pub(crate) const FRAME_MS: u32 = 16;

struct Timer {
    deadline: f64,
    seq: u64,
    fire: oneshot::Sender<()>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StyleEvent {
    pub at: f64,
    pub target: Target,
    pub command: StyleCommand,
}

pub(crate) struct FakeHost {
    spawner: LocalSpawner,
    now: Cell<f64>,
    seq: Cell<u64>,
    timers: RefCell<Vec<Timer>>,
    pub image_delay_ms: Cell<u32>,
    pub styles: RefCell<Vec<StyleEvent>>,
    pub texts: RefCell<HashMap<Target, String>>,
    pub progress: RefCell<HashMap<Target, f32>>,
    pub images: RefCell<HashMap<Target, Option<String>>>,
    pub image_loads: Cell<usize>,
    pub inert: RefCell<HashMap<BufferId, bool>>,
    pub container_inert: Cell<bool>,
    pub status: RefCell<Option<StatusMessage>>,
}

impl FakeHost {
    fn new(spawner: LocalSpawner) -> Self {
        FakeHost {
            spawner,
            now: Cell::new(0.0),
            seq: Cell::new(0),
            timers: RefCell::new(Vec::new()),
            image_delay_ms: Cell::new(0),
            styles: RefCell::new(Vec::new()),
            texts: RefCell::new(HashMap::new()),
            progress: RefCell::new(HashMap::new()),
            images: RefCell::new(HashMap::new()),
            image_loads: Cell::new(0),
            inert: RefCell::new(HashMap::new()),
            container_inert: Cell::new(false),
            status: RefCell::new(None),
        }
    }

    fn timer(&self, ms: u32) -> LocalBoxFuture<'static, ()> {
        let (tx, rx) = oneshot::channel();
        let seq = self.seq.get();
        self.seq.set(seq + 1);
        self.timers.borrow_mut().push(Timer {
            deadline: self.now.get() + ms as f64,
            seq,
            fire: tx,
        });
        rx.map(|_| ()).boxed_local()
    }

    fn next_deadline(&self) -> Option<f64> {
        self.timers
            .borrow()
            .iter()
            .map(|t| t.deadline)
            .fold(None, |min, d| Some(min.map_or(d, |m: f64| m.min(d))))
    }

    fn fire_until(&self, deadline: f64) {
        self.now.set(deadline);
        let (mut due, pending): (Vec<Timer>, Vec<Timer>) = self
            .timers
            .take()
            .into_iter()
            .partition(|t| t.deadline <= deadline);
        *self.timers.borrow_mut() = pending;
        due.sort_by(|a, b| a.deadline.total_cmp(&b.deadline).then(a.seq.cmp(&b.seq)));
        for timer in due {
            let _ = timer.fire.send(());
        }
    }

    pub fn now(&self) -> f64 {
        self.now.get()
    }

    pub fn text(&self, buffer: BufferId, component: Component) -> Option<String> {
        self.texts.borrow().get(&Target::new(buffer, component)).cloned()
    }

    pub fn image(&self, buffer: BufferId, component: Component) -> Option<String> {
        self.images
            .borrow()
            .get(&Target::new(buffer, component))
            .cloned()
            .flatten()
    }

    pub fn is_inert(&self, buffer: BufferId) -> bool {
        self.inert.borrow().get(&buffer).copied().unwrap_or(false)
    }

    pub fn styles_for(&self, buffer: BufferId) -> Vec<StyleEvent> {
        self.styles
            .borrow()
            .iter()
            .filter(|e| e.target.buffer == buffer)
            .cloned()
            .collect()
    }

    pub fn clear_log(&self) {
        self.styles.borrow_mut().clear();
    }
}

impl Host for FakeHost {
    fn now_ms(&self) -> f64 {
        self.now.get()
    }

    fn sleep(&self, ms: u32) -> LocalBoxFuture<'static, ()> {
        if ms == 0 {
            return future::ready(()).boxed_local();
        }
        self.timer(ms)
    }

    fn next_frame(&self) -> LocalBoxFuture<'static, ()> {
        self.timer(FRAME_MS)
    }

    fn spawn(&self, task: LocalBoxFuture<'static, ()>) {
        self.spawner
            .spawn_local(task)
            .expect("local pool accepts tasks");
    }

    fn apply_style(&self, target: Target, command: &StyleCommand) {
        self.styles.borrow_mut().push(StyleEvent {
            at: self.now.get(),
            target,
            command: command.clone(),
        });
    }

    fn set_text(&self, target: Target, text: &str) {
        self.texts.borrow_mut().insert(target, text.to_string());
    }

    fn set_progress(&self, target: Target, fraction: f32) {
        self.progress.borrow_mut().insert(target, fraction);
    }

    fn load_image(&self, target: Target, url: Option<&str>) -> LocalBoxFuture<'static, bool> {
        self.image_loads.set(self.image_loads.get() + 1);
        self.images
            .borrow_mut()
            .insert(target, url.map(str::to_string));
        let ok = url.is_some_and(|u| !u.contains("broken"));
        let delay = self.image_delay_ms.get();
        self.sleep(delay).map(move |_| ok).boxed_local()
    }

    fn set_buffer_inert(&self, buffer: BufferId, inert: bool) {
        self.inert.borrow_mut().insert(buffer, inert);
    }

    fn set_container_inert(&self, inert: bool) {
        self.container_inert.set(inert);
    }

    fn set_status(&self, status: &StatusMessage) {
        *self.status.borrow_mut() = Some(status.clone());
    }
}

/// Routes engine logs to the test output.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Local executor plus fake host, driven by advancing virtual time.
pub(crate) struct Harness {
    pub pool: LocalPool,
    pub host: Rc<FakeHost>,
}

impl Harness {
    pub fn new() -> Self {
        init_tracing();
        let pool = LocalPool::new();
        let host = Rc::new(FakeHost::new(pool.spawner()));
        Harness { pool, host }
    }

    pub fn shared(&self) -> SharedHost {
        self.host.clone()
    }

    pub fn spawn(&self, task: impl std::future::Future<Output = ()> + 'static) {
        self.host.spawn(task.boxed_local());
    }

    /// Runs every task that can make progress without time passing.
    pub fn run(&mut self) {
        self.pool.run_until_stalled();
    }

    /// Advances virtual time by `ms`, firing timers in deadline order.
    pub fn advance(&mut self, ms: u32) {
        let target = self.host.now() + ms as f64;
        loop {
            self.pool.run_until_stalled();
            match self.host.next_deadline() {
                Some(deadline) if deadline <= target => self.host.fire_until(deadline),
                _ => break,
            }
        }
        self.host.now.set(target);
        self.pool.run_until_stalled();
    }
}

/// Poll source that replays scripted responses, then reports nothing playing.
#[derive(Default)]
pub(crate) struct ScriptedSource {
    responses: RefCell<VecDeque<Result<String, EngineError>>>,
    pub fetches: Cell<usize>,
}

impl ScriptedSource {
    pub fn push(&self, response: Result<&str, EngineError>) {
        self.responses
            .borrow_mut()
            .push_back(response.map(str::to_string));
    }
}

impl PollSource for ScriptedSource {
    fn fetch(&self) -> LocalBoxFuture<'static, Result<String, EngineError>> {
        self.fetches.set(self.fetches.get() + 1);
        let next = self
            .responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Ok(String::new()));
        future::ready(next).boxed_local()
    }
}

pub(crate) fn track(id: &str, progress_ms: u64, duration_ms: u64) -> PlaybackSnapshot {
    PlaybackSnapshot::playing(
        id,
        progress_ms,
        duration_ms,
        TrackMetadata {
            title: format!("Title {id}"),
            artists: vec![format!("Artist {id}")],
            album: None,
            artwork_url: Some(format!("https://img.test/{id}.jpg")),
        },
    )
}
