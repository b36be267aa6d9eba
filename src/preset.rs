// Preset catalog and compiler: (preset, phase, component, order) -> AnimationSpec.
// Presets are static tables. Compiling is pure, so a stored config can be compared
// against fresh bakes to find out which preset produced it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::animation::{AnimationKind, AnimationSpec, Easing};
use crate::error::EngineError;
use crate::skin::Skin;
use crate::types::{AnimationPhase, Component, Role};

/// Preset used when a config names one that does not exist.
pub const DEFAULT_PRESET: &str = "fade-soft";

/// Base timing of one phase.
#[derive(Debug, Clone, Copy)]
struct PhaseTiming {
    duration_ms: u32,
    spacing_ms: u32,
    max_delay_ms: u32,
    ease_in: Easing,
    ease_out: Easing,
}

const fn timing(
    duration_ms: u32,
    spacing_ms: u32,
    max_delay_ms: u32,
    ease_in: Easing,
    ease_out: Easing,
) -> PhaseTiming {
    PhaseTiming {
        duration_ms,
        spacing_ms,
        max_delay_ms,
        ease_in,
        ease_out,
    }
}

/// Per-role adjustments of a preset.
#[derive(Debug, Clone, Copy)]
struct RoleTweak {
    role: Role,
    duration_scale: f32,
    entrance: Option<AnimationKind>,
    exit: Option<AnimationKind>,
    ease_in: Option<Easing>,
}

const fn tweak(role: Role, duration_scale: f32) -> RoleTweak {
    RoleTweak {
        role,
        duration_scale,
        entrance: None,
        exit: None,
        ease_in: None,
    }
}

const fn tweak_kinds(
    role: Role,
    duration_scale: f32,
    entrance: Option<AnimationKind>,
    exit: Option<AnimationKind>,
) -> RoleTweak {
    RoleTweak {
        role,
        duration_scale,
        entrance,
        exit,
        ease_in: None,
    }
}

/// A named catalog entry.
#[derive(Debug)]
pub struct Preset {
    pub id: &'static str,
    pub label: &'static str,
    /// Indexed like `AnimationPhase::ALL`. `None` marks the static preset.
    timings: Option<[PhaseTiming; 4]>,
    entrance: AnimationKind,
    exit: AnimationKind,
    tweaks: &'static [RoleTweak],
    /// Reveal order override; unlisted components keep their default index.
    order: &'static [Component],
}

static PRESETS: [Preset; 6] = [
    Preset {
        id: "static",
        label: "Static (no animation)",
        timings: None,
        entrance: AnimationKind::None,
        exit: AnimationKind::None,
        tweaks: &[],
        order: &[],
    },
    Preset {
        id: "fade-soft",
        label: "Soft fade",
        timings: Some([
            timing(900, 80, 640, Easing::Power2Out, Easing::Power2In),
            timing(700, 60, 420, Easing::Power2Out, Easing::Power2In),
            timing(500, 40, 280, Easing::Power2Out, Easing::Power2In),
            timing(700, 60, 480, Easing::Power2Out, Easing::Power2In),
        ]),
        entrance: AnimationKind::FadeIn,
        exit: AnimationKind::FadeOut,
        tweaks: &[
            tweak(Role::Background, 1.25),
            tweak(Role::Overlay, 1.25),
            tweak(Role::Badge, 0.8),
        ],
        order: &[],
    },
    Preset {
        id: "slide-left",
        label: "Slide left",
        timings: Some([
            timing(800, 70, 560, Easing::Power3Out, Easing::Power3In),
            timing(650, 50, 400, Easing::Power3Out, Easing::Power3In),
            timing(450, 35, 280, Easing::Power3Out, Easing::Power3In),
            timing(600, 50, 400, Easing::Power3Out, Easing::Power3In),
        ]),
        entrance: AnimationKind::SlideLeft,
        exit: AnimationKind::SlideLeftOut,
        tweaks: &[
            tweak_kinds(
                Role::Background,
                1.2,
                Some(AnimationKind::FadeIn),
                Some(AnimationKind::FadeOut),
            ),
            tweak_kinds(
                Role::Overlay,
                1.2,
                Some(AnimationKind::FadeIn),
                Some(AnimationKind::FadeOut),
            ),
            tweak_kinds(Role::Bar, 1.0, Some(AnimationKind::ClipLeft), None),
            tweak(Role::Time, 0.8),
        ],
        order: &[],
    },
    Preset {
        id: "zoom-pop",
        label: "Zoom pop",
        timings: Some([
            timing(750, 90, 540, Easing::Power4Out, Easing::Power2In),
            timing(600, 60, 360, Easing::Power4Out, Easing::Power2In),
            timing(400, 30, 180, Easing::Power4Out, Easing::Power2In),
            timing(550, 50, 300, Easing::Power4Out, Easing::Power2In),
        ]),
        entrance: AnimationKind::ZoomInSoft,
        exit: AnimationKind::ZoomOutSoft,
        tweaks: &[
            RoleTweak {
                role: Role::Cover,
                duration_scale: 1.1,
                entrance: Some(AnimationKind::CardPop),
                exit: None,
                ease_in: Some(Easing::BackOut),
            },
            tweak_kinds(
                Role::Background,
                1.3,
                Some(AnimationKind::FadeIn),
                Some(AnimationKind::FadeOut),
            ),
        ],
        order: &[
            Component::Cover,
            Component::Background,
            Component::Overlay,
            Component::TrackName,
            Component::ArtistName,
            Component::Badge,
            Component::ProgressBar,
            Component::CurrentTime,
            Component::TotalTime,
        ],
    },
    Preset {
        id: "cascade",
        label: "Cascade (text last)",
        timings: Some([
            timing(850, 110, 880, Easing::ExpoOut, Easing::Power2In),
            timing(700, 80, 560, Easing::ExpoOut, Easing::Power2In),
            timing(450, 40, 240, Easing::ExpoOut, Easing::Power2In),
            timing(650, 70, 490, Easing::ExpoOut, Easing::Power2In),
        ]),
        entrance: AnimationKind::FadeIn,
        exit: AnimationKind::FadeOut,
        tweaks: &[
            tweak_kinds(
                Role::Text,
                1.0,
                Some(AnimationKind::ClipUp),
                Some(AnimationKind::SlideUpOut),
            ),
            tweak_kinds(Role::Bar, 1.0, Some(AnimationKind::UnderlineSweep), None),
            tweak_kinds(
                Role::Cover,
                1.0,
                Some(AnimationKind::SlideUp),
                Some(AnimationKind::SlideDownOut),
            ),
        ],
        order: &[
            Component::Background,
            Component::Overlay,
            Component::Cover,
            Component::ProgressBar,
            Component::CurrentTime,
            Component::TotalTime,
            Component::Badge,
            Component::TrackName,
            Component::ArtistName,
        ],
    },
    Preset {
        id: "float",
        label: "Float",
        timings: Some([
            timing(1000, 90, 720, Easing::SineInOut, Easing::SineInOut),
            timing(800, 70, 490, Easing::SineInOut, Easing::SineInOut),
            timing(500, 40, 280, Easing::SineInOut, Easing::SineInOut),
            timing(800, 70, 560, Easing::SineInOut, Easing::SineInOut),
        ]),
        entrance: AnimationKind::FloatUp,
        exit: AnimationKind::FadeOut,
        tweaks: &[
            RoleTweak {
                role: Role::Cover,
                duration_scale: 1.15,
                entrance: Some(AnimationKind::TiltIn),
                exit: None,
                ease_in: Some(Easing::Power2Out),
            },
            tweak_kinds(Role::Background, 1.3, Some(AnimationKind::FadeIn), None),
            tweak(Role::Time, 0.85),
        ],
        order: &[],
    },
];

fn phase_index(phase: AnimationPhase) -> usize {
    match phase {
        AnimationPhase::Intro => 0,
        AnimationPhase::TransitionIn => 1,
        AnimationPhase::TransitionOut => 2,
        AnimationPhase::Outro => 3,
    }
}

impl Preset {
    pub fn all() -> &'static [Preset] {
        &PRESETS
    }

    pub fn find(id: &str) -> Result<&'static Preset, EngineError> {
        PRESETS
            .iter()
            .find(|p| p.id == id)
            .ok_or_else(|| EngineError::UnknownPreset(id.to_string()))
    }

    /// Like `find`, but an unknown id resolves to the default preset.
    pub fn find_or_default(id: &str) -> &'static Preset {
        Preset::find(id).unwrap_or_else(|err| {
            tracing::warn!(%err, fallback = DEFAULT_PRESET, "preset fallback");
            Preset::default_preset()
        })
    }

    pub fn default_preset() -> &'static Preset {
        PRESETS
            .iter()
            .find(|p| p.id == DEFAULT_PRESET)
            .unwrap_or(&PRESETS[0])
    }

    pub fn is_static(&self) -> bool {
        self.timings.is_none()
    }

    /// Upper bound of any delay this preset produces in `phase`.
    pub fn max_delay_ms(&self, phase: AnimationPhase) -> u32 {
        self.timings
            .map(|t| t[phase_index(phase)].max_delay_ms)
            .unwrap_or(0)
    }

    /// Reveal position of `component` under this preset.
    pub fn order_index(&self, component: Component) -> u32 {
        self.order
            .iter()
            .position(|c| *c == component)
            .map(|i| i as u32)
            .unwrap_or_else(|| component.default_order())
    }

    fn tweak_for(&self, role: Role) -> Option<&RoleTweak> {
        self.tweaks.iter().find(|t| t.role == role)
    }

    /// Concrete spec for a role at a reveal position.
    pub fn spec(&self, phase: AnimationPhase, role: Role, order_index: u32) -> AnimationSpec {
        let Some(timings) = self.timings else {
            return AnimationSpec::none();
        };
        let base = timings[phase_index(phase)];
        let tweak = self.tweak_for(role);

        let scale = tweak.map(|t| t.duration_scale).unwrap_or(1.0);
        let duration_ms = (base.duration_ms as f32 * scale).round() as u32;
        let delay_ms = order_index
            .saturating_mul(base.spacing_ms)
            .min(base.max_delay_ms);

        let (kind, easing) = if phase.is_entrance() {
            (
                tweak.and_then(|t| t.entrance).unwrap_or(self.entrance),
                tweak.and_then(|t| t.ease_in).unwrap_or(base.ease_in),
            )
        } else {
            (
                tweak.and_then(|t| t.exit).unwrap_or(self.exit),
                base.ease_out,
            )
        };

        AnimationSpec {
            kind,
            duration_ms,
            delay_ms,
            easing,
        }
    }

    pub fn info(&self) -> PresetInfo {
        PresetInfo {
            id: self.id.to_string(),
            label: self.label.to_string(),
        }
    }
}

/// Catalog entry as shown in the settings UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetInfo {
    pub id: String,
    pub label: String,
}

pub fn catalog() -> Vec<PresetInfo> {
    Preset::all().iter().map(Preset::info).collect()
}

/// Compiles one spec. Unknown presets use the default preset; unknown components
/// are timed as role `other`.
pub fn compile(
    preset_id: &str,
    phase: AnimationPhase,
    component: &str,
    order_index: u32,
) -> AnimationSpec {
    let preset = Preset::find_or_default(preset_id);
    let role = match component.parse::<Component>() {
        Ok(c) => c.role(),
        Err(err) => {
            tracing::debug!(%err, "component fallback to role other");
            Role::Other
        }
    };
    preset.spec(phase, role, order_index)
}

/// Specs of every phase for one component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseSpecs {
    pub intro: AnimationSpec,
    pub transition_in: AnimationSpec,
    pub transition_out: AnimationSpec,
    pub outro: AnimationSpec,
}

impl PhaseSpecs {
    pub fn get(&self, phase: AnimationPhase) -> AnimationSpec {
        match phase {
            AnimationPhase::Intro => self.intro,
            AnimationPhase::TransitionIn => self.transition_in,
            AnimationPhase::TransitionOut => self.transition_out,
            AnimationPhase::Outro => self.outro,
        }
    }

    pub fn set(&mut self, phase: AnimationPhase, spec: AnimationSpec) {
        match phase {
            AnimationPhase::Intro => self.intro = spec,
            AnimationPhase::TransitionIn => self.transition_in = spec,
            AnimationPhase::TransitionOut => self.transition_out = spec,
            AnimationPhase::Outro => self.outro = spec,
        }
    }
}

/// Baked per-component config the engine animates from.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnimationConfig {
    components: BTreeMap<Component, PhaseSpecs>,
}

impl AnimationConfig {
    /// Compiles every (component, phase) of `skin` with `preset_id`.
    pub fn bake(preset_id: &str, skin: &Skin) -> Self {
        let preset = Preset::find_or_default(preset_id);
        let components = skin
            .components()
            .map(|component| {
                let role = skin.role_of(component);
                let order = preset.order_index(component);
                let specs = PhaseSpecs {
                    intro: preset.spec(AnimationPhase::Intro, role, order),
                    transition_in: preset.spec(AnimationPhase::TransitionIn, role, order),
                    transition_out: preset.spec(AnimationPhase::TransitionOut, role, order),
                    outro: preset.spec(AnimationPhase::Outro, role, order),
                };
                (component, specs)
            })
            .collect();
        AnimationConfig { components }
    }

    /// Merges a stored (possibly hand-edited) config over a fresh bake.
    /// Entries that do not parse keep the preset's value and are reported back.
    pub fn from_stored(
        stored: &StoredAnimationConfig,
        preset_id: &str,
        skin: &Skin,
    ) -> (Self, Vec<EngineError>) {
        let preset = Preset::find_or_default(preset_id);
        let mut config = AnimationConfig::bake(preset.id, skin);
        let mut problems = Vec::new();

        for (component_name, phases) in stored {
            let component = match component_name.parse::<Component>() {
                Ok(c) => c,
                Err(err) => {
                    problems.push(err);
                    continue;
                }
            };
            let Some(specs) = config.components.get_mut(&component) else {
                continue;
            };

            for (phase_name, raw) in phases {
                let phase = match phase_name.parse::<AnimationPhase>() {
                    Ok(p) => p,
                    Err(err) => {
                        problems.push(err);
                        continue;
                    }
                };
                let mut spec = specs.get(phase);
                if let Some(kind) = &raw.kind {
                    match kind.parse() {
                        Ok(kind) => spec.kind = kind,
                        Err(err) => problems.push(err),
                    }
                }
                if let Some(easing) = &raw.easing {
                    match easing.parse() {
                        Ok(easing) => spec.easing = easing,
                        Err(err) => problems.push(err),
                    }
                }
                if let Some(duration) = raw.duration_ms {
                    spec.duration_ms = duration;
                }
                if let Some(delay) = raw.delay_ms {
                    spec.delay_ms = delay.min(preset.max_delay_ms(phase));
                }
                specs.set(phase, spec);
            }
        }

        for problem in &problems {
            tracing::warn!(%problem, "ignored stored animation setting");
        }
        (config, problems)
    }

    pub fn get(&self, component: Component, phase: AnimationPhase) -> AnimationSpec {
        self.components
            .get(&component)
            .map(|specs| specs.get(phase))
            .unwrap_or_else(AnimationSpec::none)
    }

    pub fn components(&self) -> impl Iterator<Item = Component> + '_ {
        self.components.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

/// Lenient form of a stored config: component -> phase -> partial spec, all strings.
pub type StoredAnimationConfig = BTreeMap<String, BTreeMap<String, StoredSpec>>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSpec {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<u32>,
    #[serde(default)]
    pub delay_ms: Option<u32>,
    #[serde(rename = "easingId", default)]
    pub easing: Option<String>,
}

/// Result of guessing which preset produced a config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetGuess {
    pub id: String,
    /// True when a fresh bake of the preset matches the config exactly.
    pub exact: bool,
}

/// Best-effort reverse mapping from a baked config to a preset id, used to highlight
/// the active choice in a settings UI. Hand-edited configs may be guessed wrong.
pub fn classify(config: &AnimationConfig, skin: &Skin) -> Option<PresetGuess> {
    if config.is_empty() {
        return None;
    }

    if let Some(preset) = Preset::all()
        .iter()
        .find(|p| AnimationConfig::bake(p.id, skin) == *config)
    {
        return Some(PresetGuess {
            id: preset.id.to_string(),
            exact: true,
        });
    }

    let intro: Vec<AnimationSpec> = config
        .components()
        .map(|c| config.get(c, AnimationPhase::Intro))
        .collect();

    if intro
        .iter()
        .all(|s| s.kind == AnimationKind::None && s.duration_ms == 0)
    {
        return Some(PresetGuess {
            id: "static".to_string(),
            exact: false,
        });
    }

    let dominant = dominant_kind(&intro);
    let reference_duration = if config.components.contains_key(&Component::TrackName) {
        config.get(Component::TrackName, AnimationPhase::Intro).duration_ms
    } else {
        let total: u64 = intro.iter().map(|s| s.duration_ms as u64).sum();
        (total / intro.len() as u64) as u32
    };

    let animated = || Preset::all().iter().filter(|p| !p.is_static());
    let mut candidates: Vec<&Preset> =
        animated().filter(|p| Some(p.entrance) == dominant).collect();
    if candidates.is_empty() {
        candidates = animated().collect();
    }

    candidates
        .into_iter()
        .min_by_key(|p| {
            let expected = p.spec(AnimationPhase::Intro, Role::Text, 0).duration_ms;
            expected.abs_diff(reference_duration)
        })
        .map(|p| PresetGuess {
            id: p.id.to_string(),
            exact: false,
        })
}

fn dominant_kind(specs: &[AnimationSpec]) -> Option<AnimationKind> {
    let mut counts: Vec<(AnimationKind, usize)> = Vec::new();
    for spec in specs.iter().filter(|s| s.kind != AnimationKind::None) {
        match counts.iter_mut().find(|(k, _)| *k == spec.kind) {
            Some((_, n)) => *n += 1,
            None => counts.push((spec.kind, 1)),
        }
    }
    // First-seen wins ties so the result is deterministic.
    counts
        .iter()
        .fold(None::<(AnimationKind, usize)>, |best, &(k, n)| match best {
            Some((_, m)) if m >= n => best,
            _ => Some((k, n)),
        })
        .map(|(k, _)| k)
}
