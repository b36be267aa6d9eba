// The boundary to the page. The engine decides; the host only executes DOM writes,
// timers and fetches. Everything runs on one event loop, hence `Rc` and local futures.

use std::rc::Rc;

use futures::future::LocalBoxFuture;
use serde::Serialize;

use crate::animation::{AnimationKind, AnimationSpec, StyleFrame};
use crate::error::EngineError;
use crate::types::{BufferId, StatusMessage, Target};

/// Style instruction for one element.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum StyleCommand {
    /// Apply a style immediately, without transition.
    #[serde(rename_all = "camelCase")]
    Prepare { frame: StyleFrame },
    /// Animate from `from` to `to`.
    #[serde(rename_all = "camelCase")]
    Animate {
        kind: AnimationKind,
        from: StyleFrame,
        to: StyleFrame,
        duration_ms: u32,
        delay_ms: u32,
        easing: String,
        timing_function: String,
    },
    /// Stop any running animation and hold `frame`.
    #[serde(rename_all = "camelCase")]
    Settle { frame: StyleFrame },
    /// Remove inline animation styling.
    Clear,
}

impl StyleCommand {
    pub fn animate(spec: &AnimationSpec) -> Self {
        StyleCommand::Animate {
            kind: spec.kind,
            from: spec.kind.start_style(),
            to: spec.kind.end_style(),
            duration_ms: spec.duration_ms,
            delay_ms: spec.delay_ms,
            easing: spec.easing.name().to_string(),
            timing_function: spec.easing.css().to_string(),
        }
    }
}

/// Timers, scheduling and DOM writes provided by the page.
pub trait Host {
    /// Wall-clock milliseconds.
    fn now_ms(&self) -> f64;

    fn sleep(&self, ms: u32) -> LocalBoxFuture<'static, ()>;

    /// Resolves after the next paint, once pending style writes are committed.
    fn next_frame(&self) -> LocalBoxFuture<'static, ()>;

    /// Runs a task on the event loop without awaiting it.
    fn spawn(&self, task: LocalBoxFuture<'static, ()>);

    fn apply_style(&self, target: Target, command: &StyleCommand);

    fn set_text(&self, target: Target, text: &str);

    /// Progress readout, `fraction` in [0, 1].
    fn set_progress(&self, target: Target, fraction: f32);

    /// Swaps an image source and resolves once it loaded (`true`) or failed and the
    /// placeholder is shown (`false`). `None` shows the placeholder.
    fn load_image(&self, target: Target, url: Option<&str>) -> LocalBoxFuture<'static, bool>;

    /// Inert buffers are hidden from input and paint.
    fn set_buffer_inert(&self, buffer: BufferId, inert: bool);

    fn set_container_inert(&self, inert: bool);

    fn set_status(&self, status: &StatusMessage);
}

pub type SharedHost = Rc<dyn Host>;

/// Source of raw playback JSON, e.g. a `GET` against the data endpoint.
pub trait PollSource {
    /// Response body. An empty body means nothing is playing.
    fn fetch(&self) -> LocalBoxFuture<'static, Result<String, EngineError>>;
}
