// nowplaying_engine: dual-buffer "now playing" card engine.
// The engine owns state, timing and sequencing; JS only executes DOM writes, timers and fetches.

mod animation;
mod config;
mod content;
mod error;
mod host;
mod machine;
mod poll;
mod preset;
mod skin;
mod timeline;
mod types;
mod wasm;
mod widget;

#[cfg(test)]
pub(crate) mod testing;

use std::rc::Rc;

use wasm_bindgen::prelude::*;

pub use animation::{AnimationKind, AnimationSpec, Easing, StyleFrame};
pub use config::{Messages, PollSettings, WidgetConfig};
pub use content::ContentSync;
pub use error::EngineError;
pub use host::{Host, PollSource, SharedHost, StyleCommand};
pub use machine::{decide, Decision, TransitionStateMachine};
pub use poll::{next_delay, parse_snapshot, PollLoop};
pub use preset::{
    catalog, classify, compile, AnimationConfig, PhaseSpecs, Preset, PresetGuess, PresetInfo,
    StoredAnimationConfig, StoredSpec, DEFAULT_PRESET,
};
pub use skin::{Skin, SkinChoice, SkinSlot};
pub use timeline::{TimelineEntry, TimelineHandle, TimelineOutcome, TimelineRunner};
pub use types::*;
pub use wasm::{JsHost, JsPollSource};
pub use widget::Widget;

/// Initialize panic hook for better error messages in browser console.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

fn to_js(err: EngineError) -> JsValue {
    JsValue::from_str(&err.to_string())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, EngineError> {
    serde_json::to_string(value).map_err(EngineError::from)
}

/// Widget handle exposed to JavaScript. `host` is the object the engine drives
/// (see `JsHost`); it also provides `fetch()` for polling.
#[wasm_bindgen]
pub struct NowPlayingWidget {
    inner: Widget,
}

#[wasm_bindgen]
impl NowPlayingWidget {
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: &str, host: JsValue) -> Result<NowPlayingWidget, JsValue> {
        let config = WidgetConfig::from_json(config_json).map_err(to_js)?;
        let skin = Rc::new(config.resolve_skin());
        let js_host: SharedHost = Rc::new(JsHost::new(host.clone(), skin.clone()));
        let source = Rc::new(JsPollSource::new(host));
        Ok(NowPlayingWidget {
            inner: Widget::with_skin(js_host, source, config, skin),
        })
    }

    pub fn start(&self) {
        self.inner.start();
    }

    pub fn stop(&self) {
        self.inner.stop();
    }

    /// Feed a poll response obtained by the page itself.
    pub fn push_snapshot(&self, body: &str) {
        self.inner.push_json(body);
    }

    pub fn replay_intro(&self) {
        self.inner.replay_intro();
    }

    pub fn set_preset(&self, preset_id: &str) -> Result<(), JsValue> {
        self.inner.set_preset(preset_id).map_err(to_js)
    }

    /// Replace the animations with a stored per-component config merged over `preset_id`.
    /// Returns the ignored entries as a JSON array of messages.
    pub fn set_animations(&self, preset_id: &str, stored_json: &str) -> Result<String, JsValue> {
        let stored: StoredAnimationConfig = serde_json::from_str(stored_json)
            .map_err(|e| to_js(EngineError::InvalidConfig(e.to_string())))?;
        let (config, problems) =
            AnimationConfig::from_stored(&stored, preset_id, self.inner.skin());
        self.inner.set_animation_config(config);
        let problems: Vec<String> = problems.iter().map(ToString::to_string).collect();
        to_json(&problems).map_err(to_js)
    }

    /// Current engine state as JSON.
    pub fn state_json(&self) -> Result<String, JsValue> {
        to_json(&self.inner.state()).map_err(to_js)
    }
}

/// Compile one spec: returns `{type, durationMs, delayMs, easingId}` as JSON.
#[wasm_bindgen]
pub fn compile_preset(
    preset_id: &str,
    phase: &str,
    component: &str,
    order_index: u32,
) -> Result<String, JsValue> {
    let phase: AnimationPhase = phase.parse().map_err(to_js)?;
    to_json(&compile(preset_id, phase, component, order_index)).map_err(to_js)
}

/// `[{id, label}]` for every preset.
#[wasm_bindgen]
pub fn preset_catalog() -> Result<String, JsValue> {
    to_json(&catalog()).map_err(to_js)
}

/// Bake `preset_id` for a skin (builtin name or inline descriptor, as JSON).
#[wasm_bindgen]
pub fn bake_preset(preset_id: &str, skin_json: &str) -> Result<String, JsValue> {
    let skin = parse_skin(skin_json).map_err(to_js)?;
    to_json(&AnimationConfig::bake(preset_id, &skin)).map_err(to_js)
}

/// Guess the preset behind a baked config; `null` when nothing fits.
#[wasm_bindgen]
pub fn classify_preset(config_json: &str, skin_json: &str) -> Result<String, JsValue> {
    let skin = parse_skin(skin_json).map_err(to_js)?;
    let config: AnimationConfig = serde_json::from_str(config_json)
        .map_err(|e| to_js(EngineError::InvalidConfig(e.to_string())))?;
    to_json(&classify(&config, &skin)).map_err(to_js)
}

/// Style of an `{type, durationMs, delayMs, easingId}` spec at `elapsed_ms`, for hosts
/// that scrub or preview animations themselves. Returns the frame plus its CSS `transform`.
#[wasm_bindgen]
pub fn sample_spec(spec_json: &str, elapsed_ms: f64) -> Result<String, JsValue> {
    let spec: AnimationSpec = serde_json::from_str(spec_json)
        .map_err(|e| to_js(EngineError::InvalidConfig(e.to_string())))?;
    let frame = spec.sample(elapsed_ms);
    let sampled = serde_json::json!({
        "frame": frame,
        "transform": frame.css_transform(),
    });
    to_json(&sampled).map_err(to_js)
}

fn parse_skin(json: &str) -> Result<Skin, EngineError> {
    let choice: SkinChoice =
        serde_json::from_str(json).map_err(|e| EngineError::InvalidConfig(e.to_string()))?;
    Ok(choice.resolve())
}
