// Strong typing over strings. Components, roles, buffers and phases are closed enums;
// only the wire format and the JS boundary ever see their string names.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// A named visual slot of the card. Each buffer holds one DOM instance per component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Component {
    Background,
    Overlay,
    Cover,
    TrackName,
    ArtistName,
    ProgressBar,
    CurrentTime,
    TotalTime,
    Badge,
}

impl Component {
    pub const ALL: [Component; 9] = [
        Component::Background,
        Component::Overlay,
        Component::Cover,
        Component::TrackName,
        Component::ArtistName,
        Component::ProgressBar,
        Component::CurrentTime,
        Component::TotalTime,
        Component::Badge,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Component::Background => "Background",
            Component::Overlay => "Overlay",
            Component::Cover => "Cover",
            Component::TrackName => "TrackName",
            Component::ArtistName => "ArtistName",
            Component::ProgressBar => "ProgressBar",
            Component::CurrentTime => "CurrentTime",
            Component::TotalTime => "TotalTime",
            Component::Badge => "Badge",
        }
    }

    /// Position in the default reveal order (Background first, Badge last).
    pub fn default_order(&self) -> u32 {
        match self {
            Component::Background => 0,
            Component::Overlay => 1,
            Component::Cover => 2,
            Component::TrackName => 3,
            Component::ArtistName => 4,
            Component::ProgressBar => 5,
            Component::CurrentTime => 6,
            Component::TotalTime => 7,
            Component::Badge => 8,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Component::Background => Role::Background,
            Component::Overlay => Role::Overlay,
            Component::Cover => Role::Cover,
            Component::TrackName | Component::ArtistName => Role::Text,
            Component::ProgressBar => Role::Bar,
            Component::CurrentTime | Component::TotalTime => Role::Time,
            Component::Badge => Role::Badge,
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Component {
    type Err = EngineError;

    /// Accepts the component name case-insensitively, with or without separators
    /// (`TrackName`, `track-name`, `track_name`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        Component::ALL
            .into_iter()
            .find(|c| c.name().to_ascii_lowercase() == folded)
            .ok_or_else(|| EngineError::UnknownComponent(s.to_string()))
    }
}

/// Coarse classification of a component, used only for preset timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Background,
    Overlay,
    Cover,
    Text,
    Bar,
    Time,
    Badge,
    Other,
}

/// One of the two alternating containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BufferId {
    A,
    B,
}

impl BufferId {
    pub fn other(&self) -> BufferId {
        match self {
            BufferId::A => BufferId::B,
            BufferId::B => BufferId::A,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            BufferId::A => 0,
            BufferId::B => 1,
        }
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferId::A => write!(f, "A"),
            BufferId::B => write!(f, "B"),
        }
    }
}

/// Animation phase. Intro/transitionIn target an incoming buffer,
/// transitionOut/outro an outgoing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnimationPhase {
    Intro,
    TransitionIn,
    TransitionOut,
    Outro,
}

impl AnimationPhase {
    pub const ALL: [AnimationPhase; 4] = [
        AnimationPhase::Intro,
        AnimationPhase::TransitionIn,
        AnimationPhase::TransitionOut,
        AnimationPhase::Outro,
    ];

    pub fn is_entrance(&self) -> bool {
        matches!(self, AnimationPhase::Intro | AnimationPhase::TransitionIn)
    }

    pub fn name(&self) -> &'static str {
        match self {
            AnimationPhase::Intro => "intro",
            AnimationPhase::TransitionIn => "transitionIn",
            AnimationPhase::TransitionOut => "transitionOut",
            AnimationPhase::Outro => "outro",
        }
    }
}

impl FromStr for AnimationPhase {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AnimationPhase::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| EngineError::UnknownPhase(s.to_string()))
    }
}

/// Where the state machine currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnginePhase {
    Idle,
    Intro,
    Synced,
    Transitioning,
    Outro,
}

/// One DOM node: a component inside a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub buffer: BufferId,
    pub component: Component,
}

impl Target {
    pub fn new(buffer: BufferId, component: Component) -> Self {
        Target { buffer, component }
    }
}

/// Display metadata of a track.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub title: String,
    pub artists: Vec<String>,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub artwork_url: Option<String>,
}

impl TrackMetadata {
    pub fn artist_line(&self) -> String {
        self.artists.join(", ")
    }
}

/// One polled playback state. Created per poll and discarded after the
/// state machine has classified it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlaybackSnapshot {
    pub track_id: Option<String>,
    pub is_playing: bool,
    pub progress_ms: u64,
    pub duration_ms: u64,
    pub metadata: TrackMetadata,
    /// Set on synthetic snapshots produced from a failed poll.
    #[serde(default)]
    pub error: Option<String>,
}

impl PlaybackSnapshot {
    pub fn playing(
        track_id: &str,
        progress_ms: u64,
        duration_ms: u64,
        metadata: TrackMetadata,
    ) -> Self {
        PlaybackSnapshot {
            track_id: Some(track_id.to_string()),
            is_playing: true,
            progress_ms,
            duration_ms,
            metadata,
            error: None,
        }
    }

    pub fn not_playing() -> Self {
        PlaybackSnapshot::default()
    }

    /// Synthetic snapshot standing in for a failed poll.
    pub fn failed(err: &EngineError) -> Self {
        PlaybackSnapshot {
            error: Some(err.to_string()),
            ..PlaybackSnapshot::default()
        }
    }

    /// Playing with a known track.
    pub fn has_track(&self) -> bool {
        self.is_playing && self.track_id.is_some()
    }
}

/// Engine state owned by one widget instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineState {
    pub active_buffer: BufferId,
    pub phase: EnginePhase,
    pub last_track_id: Option<String>,
    pub is_playing: bool,
    pub is_animating: bool,
    /// Snapshots handed to the state machine so far, dropped ones included.
    pub snapshots_seen: u64,
    /// Bumped whenever an in-flight operation is superseded.
    pub epoch: u64,
}

impl Default for EngineState {
    fn default() -> Self {
        EngineState {
            active_buffer: BufferId::A,
            phase: EnginePhase::Idle,
            last_track_id: None,
            is_playing: false,
            is_animating: false,
            snapshots_seen: 0,
            epoch: 0,
        }
    }
}

/// Content of the status slot, separate from the two buffers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "lowercase")]
pub enum StatusMessage {
    Hidden,
    Idle(String),
    Error(String),
}

/// Formats milliseconds as `m:ss`.
pub fn format_clock(ms: u64) -> String {
    let total_secs = ms / 1000;
    format!("{}:{:02}", total_secs / 60, total_secs % 60)
}
