// Widget configuration passed from JS as JSON. Every field has a default so an
// empty object yields a working card.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::preset::{AnimationConfig, StoredAnimationConfig, DEFAULT_PRESET};
use crate::skin::{Skin, SkinChoice};

/// Complete widget configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetConfig {
    #[serde(default = "default_preset")]
    pub preset: String,
    #[serde(default)]
    pub skin: SkinChoice,
    /// Stored per-component animation config; overrides the preset where it parses.
    #[serde(default)]
    pub animations: Option<StoredAnimationConfig>,
    #[serde(default)]
    pub poll: PollSettings,
    #[serde(default)]
    pub messages: Messages,
}

impl WidgetConfig {
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        serde_json::from_str(json).map_err(|e| EngineError::InvalidConfig(e.to_string()))
    }

    pub fn resolve_skin(&self) -> Skin {
        self.skin.resolve()
    }

    /// Bakes the preset for `skin` and applies stored overrides, returning the
    /// settings that had to be ignored.
    pub fn animation_config(&self, skin: &Skin) -> (AnimationConfig, Vec<EngineError>) {
        match &self.animations {
            Some(stored) => AnimationConfig::from_stored(stored, &self.preset, skin),
            None => (AnimationConfig::bake(&self.preset, skin), Vec::new()),
        }
    }
}

impl Default for WidgetConfig {
    fn default() -> Self {
        WidgetConfig {
            preset: default_preset(),
            skin: SkinChoice::default(),
            animations: None,
            poll: PollSettings::default(),
            messages: Messages::default(),
        }
    }
}

fn default_preset() -> String {
    DEFAULT_PRESET.to_string()
}

/// Poll cadence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSettings {
    /// Regular interval while a track plays (milliseconds).
    #[serde(default = "default_interval")]
    pub interval_ms: u32,
    /// Interval while nothing plays.
    #[serde(default = "default_idle_interval")]
    pub idle_interval_ms: u32,
    /// Interval after a failed poll.
    #[serde(default = "default_error_backoff")]
    pub error_backoff_ms: u32,
    /// Floor for every computed delay.
    #[serde(default = "default_min_interval")]
    pub min_interval_ms: u32,
    /// Added to the remaining track time when polling for the next track.
    #[serde(default = "default_end_slack")]
    pub end_slack_ms: u32,
    /// Progress readout refresh.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u32,
}

fn default_interval() -> u32 {
    5_000
}

fn default_idle_interval() -> u32 {
    10_000
}

fn default_error_backoff() -> u32 {
    15_000
}

fn default_min_interval() -> u32 {
    1_000
}

fn default_end_slack() -> u32 {
    750
}

fn default_tick_interval() -> u32 {
    1_000
}

impl Default for PollSettings {
    fn default() -> Self {
        PollSettings {
            interval_ms: default_interval(),
            idle_interval_ms: default_idle_interval(),
            error_backoff_ms: default_error_backoff(),
            min_interval_ms: default_min_interval(),
            end_slack_ms: default_end_slack(),
            tick_interval_ms: default_tick_interval(),
        }
    }
}

/// User-facing strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Messages {
    #[serde(default = "default_idle_message")]
    pub idle: String,
    #[serde(default = "default_error_prefix")]
    pub error_prefix: String,
    #[serde(default = "default_badge")]
    pub badge: String,
}

fn default_idle_message() -> String {
    "Nothing playing right now".to_string()
}

fn default_error_prefix() -> String {
    "Couldn't reach the player: ".to_string()
}

fn default_badge() -> String {
    "Now playing".to_string()
}

impl Default for Messages {
    fn default() -> Self {
        Messages {
            idle: default_idle_message(),
            error_prefix: default_error_prefix(),
            badge: default_badge(),
        }
    }
}
