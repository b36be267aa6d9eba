// Animation kinds and easing curves.
// Every kind is a pure (start, end) style recipe; hosts either hand the pair to CSS
// or sample it frame by frame through `AnimationSpec::sample`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Closed set of animation recipes a host knows how to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AnimationKind {
    None,
    FadeIn,
    FadeOut,
    SlideUp,
    SlideDown,
    SlideLeft,
    SlideRight,
    SlideUpOut,
    SlideDownOut,
    SlideLeftOut,
    SlideRightOut,
    ZoomInSoft,
    ZoomOutSoft,
    CardPop,
    ClipUp,
    ClipLeft,
    UnderlineSweep,
    TiltIn,
    FloatUp,
}

impl AnimationKind {
    pub const ALL: [AnimationKind; 19] = [
        AnimationKind::None,
        AnimationKind::FadeIn,
        AnimationKind::FadeOut,
        AnimationKind::SlideUp,
        AnimationKind::SlideDown,
        AnimationKind::SlideLeft,
        AnimationKind::SlideRight,
        AnimationKind::SlideUpOut,
        AnimationKind::SlideDownOut,
        AnimationKind::SlideLeftOut,
        AnimationKind::SlideRightOut,
        AnimationKind::ZoomInSoft,
        AnimationKind::ZoomOutSoft,
        AnimationKind::CardPop,
        AnimationKind::ClipUp,
        AnimationKind::ClipLeft,
        AnimationKind::UnderlineSweep,
        AnimationKind::TiltIn,
        AnimationKind::FloatUp,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AnimationKind::None => "none",
            AnimationKind::FadeIn => "fade-in",
            AnimationKind::FadeOut => "fade-out",
            AnimationKind::SlideUp => "slide-up",
            AnimationKind::SlideDown => "slide-down",
            AnimationKind::SlideLeft => "slide-left",
            AnimationKind::SlideRight => "slide-right",
            AnimationKind::SlideUpOut => "slide-up-out",
            AnimationKind::SlideDownOut => "slide-down-out",
            AnimationKind::SlideLeftOut => "slide-left-out",
            AnimationKind::SlideRightOut => "slide-right-out",
            AnimationKind::ZoomInSoft => "zoom-in-soft",
            AnimationKind::ZoomOutSoft => "zoom-out-soft",
            AnimationKind::CardPop => "card-pop",
            AnimationKind::ClipUp => "clip-up",
            AnimationKind::ClipLeft => "clip-left",
            AnimationKind::UnderlineSweep => "underline-sweep",
            AnimationKind::TiltIn => "tilt-in",
            AnimationKind::FloatUp => "float-up",
        }
    }

    /// Exit recipes end hidden; everything else ends at rest.
    pub fn is_exit(&self) -> bool {
        matches!(
            self,
            AnimationKind::FadeOut
                | AnimationKind::SlideUpOut
                | AnimationKind::SlideDownOut
                | AnimationKind::SlideLeftOut
                | AnimationKind::SlideRightOut
                | AnimationKind::ZoomOutSoft
        )
    }

    /// Style applied before the animation starts.
    pub fn start_style(&self) -> StyleFrame {
        let rest = StyleFrame::REST;
        match self {
            AnimationKind::None => rest,
            AnimationKind::FadeIn => StyleFrame {
                opacity: 0.0,
                ..rest
            },
            AnimationKind::SlideUp => StyleFrame {
                opacity: 0.0,
                translate_y: 24.0,
                ..rest
            },
            AnimationKind::SlideDown => StyleFrame {
                opacity: 0.0,
                translate_y: -24.0,
                ..rest
            },
            AnimationKind::SlideLeft => StyleFrame {
                opacity: 0.0,
                translate_x: 24.0,
                ..rest
            },
            AnimationKind::SlideRight => StyleFrame {
                opacity: 0.0,
                translate_x: -24.0,
                ..rest
            },
            AnimationKind::ZoomInSoft => StyleFrame {
                opacity: 0.0,
                scale: 0.92,
                ..rest
            },
            AnimationKind::CardPop => StyleFrame {
                opacity: 0.0,
                scale: 0.8,
                translate_y: 6.0,
                ..rest
            },
            AnimationKind::ClipUp => StyleFrame {
                clip_top: 100.0,
                ..rest
            },
            AnimationKind::ClipLeft => StyleFrame {
                clip_right: 100.0,
                ..rest
            },
            AnimationKind::UnderlineSweep => StyleFrame {
                scale_x: 0.0,
                ..rest
            },
            AnimationKind::TiltIn => StyleFrame {
                opacity: 0.0,
                rotate_deg: -8.0,
                scale: 0.96,
                ..rest
            },
            AnimationKind::FloatUp => StyleFrame {
                opacity: 0.0,
                translate_y: 12.0,
                ..rest
            },
            // Exits start from rest.
            AnimationKind::FadeOut
            | AnimationKind::SlideUpOut
            | AnimationKind::SlideDownOut
            | AnimationKind::SlideLeftOut
            | AnimationKind::SlideRightOut
            | AnimationKind::ZoomOutSoft => rest,
        }
    }

    /// Style the element holds once the animation has finished.
    pub fn end_style(&self) -> StyleFrame {
        let rest = StyleFrame::REST;
        match self {
            AnimationKind::FadeOut => StyleFrame::HIDDEN,
            AnimationKind::SlideUpOut => StyleFrame {
                translate_y: -24.0,
                ..StyleFrame::HIDDEN
            },
            AnimationKind::SlideDownOut => StyleFrame {
                translate_y: 24.0,
                ..StyleFrame::HIDDEN
            },
            AnimationKind::SlideLeftOut => StyleFrame {
                translate_x: -24.0,
                ..StyleFrame::HIDDEN
            },
            AnimationKind::SlideRightOut => StyleFrame {
                translate_x: 24.0,
                ..StyleFrame::HIDDEN
            },
            AnimationKind::ZoomOutSoft => StyleFrame {
                scale: 0.92,
                ..StyleFrame::HIDDEN
            },
            _ => rest,
        }
    }
}

impl fmt::Display for AnimationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AnimationKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AnimationKind::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| EngineError::UnknownAnimation(s.to_string()))
    }
}

impl TryFrom<String> for AnimationKind {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AnimationKind> for String {
    fn from(kind: AnimationKind) -> Self {
        kind.name().to_string()
    }
}

/// Easing curves, named the way the settings UI stores them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Easing {
    Linear,
    Power1Out,
    Power2In,
    Power2Out,
    Power2InOut,
    Power3In,
    Power3Out,
    Power4Out,
    BackOut,
    ExpoIn,
    ExpoOut,
    SineInOut,
}

impl Easing {
    pub const ALL: [Easing; 12] = [
        Easing::Linear,
        Easing::Power1Out,
        Easing::Power2In,
        Easing::Power2Out,
        Easing::Power2InOut,
        Easing::Power3In,
        Easing::Power3Out,
        Easing::Power4Out,
        Easing::BackOut,
        Easing::ExpoIn,
        Easing::ExpoOut,
        Easing::SineInOut,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Easing::Linear => "none",
            Easing::Power1Out => "power1.out",
            Easing::Power2In => "power2.in",
            Easing::Power2Out => "power2.out",
            Easing::Power2InOut => "power2.inOut",
            Easing::Power3In => "power3.in",
            Easing::Power3Out => "power3.out",
            Easing::Power4Out => "power4.out",
            Easing::BackOut => "back.out",
            Easing::ExpoIn => "expo.in",
            Easing::ExpoOut => "expo.out",
            Easing::SineInOut => "sine.inOut",
        }
    }

    /// CSS timing function approximating the curve, for hosts that animate with CSS.
    pub fn css(&self) -> &'static str {
        match self {
            Easing::Linear => "linear",
            Easing::Power1Out => "cubic-bezier(0.5, 1, 0.89, 1)",
            Easing::Power2In => "cubic-bezier(0.32, 0, 0.67, 0)",
            Easing::Power2Out => "cubic-bezier(0.33, 1, 0.68, 1)",
            Easing::Power2InOut => "cubic-bezier(0.65, 0, 0.35, 1)",
            Easing::Power3In => "cubic-bezier(0.5, 0, 0.75, 0)",
            Easing::Power3Out => "cubic-bezier(0.25, 1, 0.5, 1)",
            Easing::Power4Out => "cubic-bezier(0.22, 1, 0.36, 1)",
            Easing::BackOut => "cubic-bezier(0.34, 1.56, 0.64, 1)",
            Easing::ExpoIn => "cubic-bezier(0.7, 0, 0.84, 0)",
            Easing::ExpoOut => "cubic-bezier(0.16, 1, 0.3, 1)",
            Easing::SineInOut => "cubic-bezier(0.37, 0, 0.63, 1)",
        }
    }

    /// Maps linear progress `t` in [0, 1] onto the curve.
    pub fn apply(&self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::Power1Out => 1.0 - (1.0 - t).powi(2),
            Easing::Power2In => t.powi(3),
            Easing::Power2Out => 1.0 - (1.0 - t).powi(3),
            Easing::Power2InOut => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
                }
            }
            Easing::Power3In => t.powi(4),
            Easing::Power3Out => 1.0 - (1.0 - t).powi(4),
            Easing::Power4Out => 1.0 - (1.0 - t).powi(5),
            Easing::BackOut => {
                let c1 = 1.70158;
                let c3 = c1 + 1.0;
                1.0 + c3 * (t - 1.0).powi(3) + c1 * (t - 1.0).powi(2)
            }
            Easing::ExpoIn => {
                if t == 0.0 {
                    0.0
                } else {
                    2.0_f32.powf(10.0 * t - 10.0)
                }
            }
            Easing::ExpoOut => {
                if t == 1.0 {
                    1.0
                } else {
                    1.0 - 2.0_f32.powf(-10.0 * t)
                }
            }
            Easing::SineInOut => -((std::f32::consts::PI * t).cos() - 1.0) / 2.0,
        }
    }
}

impl fmt::Display for Easing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Easing {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "linear" {
            return Ok(Easing::Linear);
        }
        Easing::ALL
            .into_iter()
            .find(|e| e.name() == s)
            .ok_or_else(|| EngineError::UnknownEasing(s.to_string()))
    }
}

impl TryFrom<String> for Easing {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Easing> for String {
    fn from(easing: Easing) -> Self {
        easing.name().to_string()
    }
}

/// Visual state of one element. Translations and clip insets are percentages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleFrame {
    pub opacity: f32,
    pub translate_x: f32,
    pub translate_y: f32,
    pub scale: f32,
    pub scale_x: f32,
    pub rotate_deg: f32,
    pub clip_top: f32,
    pub clip_right: f32,
}

impl StyleFrame {
    pub const REST: StyleFrame = StyleFrame {
        opacity: 1.0,
        translate_x: 0.0,
        translate_y: 0.0,
        scale: 1.0,
        scale_x: 1.0,
        rotate_deg: 0.0,
        clip_top: 0.0,
        clip_right: 0.0,
    };

    pub const HIDDEN: StyleFrame = StyleFrame {
        opacity: 0.0,
        ..StyleFrame::REST
    };

    pub fn lerp(&self, to: &StyleFrame, t: f32) -> StyleFrame {
        StyleFrame {
            opacity: lerp(self.opacity, to.opacity, t),
            translate_x: lerp(self.translate_x, to.translate_x, t),
            translate_y: lerp(self.translate_y, to.translate_y, t),
            scale: lerp(self.scale, to.scale, t),
            scale_x: lerp(self.scale_x, to.scale_x, t),
            rotate_deg: lerp(self.rotate_deg, to.rotate_deg, t),
            clip_top: lerp(self.clip_top, to.clip_top, t),
            clip_right: lerp(self.clip_right, to.clip_right, t),
        }
    }

    /// CSS `transform` value for this frame.
    pub fn css_transform(&self) -> String {
        format!(
            "translate({}%, {}%) scale({}) scaleX({}) rotate({}deg)",
            self.translate_x, self.translate_y, self.scale, self.scale_x, self.rotate_deg
        )
    }
}

impl Default for StyleFrame {
    fn default() -> Self {
        StyleFrame::REST
    }
}

/// Concrete timing for one (component, buffer, phase) triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimationSpec {
    #[serde(rename = "type")]
    pub kind: AnimationKind,
    pub duration_ms: u32,
    pub delay_ms: u32,
    #[serde(rename = "easingId")]
    pub easing: Easing,
}

impl AnimationSpec {
    pub fn none() -> Self {
        AnimationSpec {
            kind: AnimationKind::None,
            duration_ms: 0,
            delay_ms: 0,
            easing: Easing::Linear,
        }
    }

    /// Delay plus duration: when this entry is visually settled.
    pub fn total_ms(&self) -> u32 {
        self.delay_ms.saturating_add(self.duration_ms)
    }

    /// Style at `elapsed_ms` after the timeline started.
    pub fn sample(&self, elapsed_ms: f64) -> StyleFrame {
        let start = self.kind.start_style();
        let end = self.kind.end_style();
        let delay = self.delay_ms as f64;

        if elapsed_ms < delay {
            return start;
        }
        if self.duration_ms == 0 || elapsed_ms >= delay + self.duration_ms as f64 {
            return end;
        }

        let progress = ((elapsed_ms - delay) / self.duration_ms as f64) as f32;
        start.lerp(&end, self.easing.apply(progress))
    }
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_parse_back() {
        for kind in AnimationKind::ALL {
            assert_eq!(kind.name().parse::<AnimationKind>().unwrap(), kind);
        }
        assert_eq!(
            "wobble".parse::<AnimationKind>(),
            Err(EngineError::UnknownAnimation("wobble".into()))
        );
    }

    #[test]
    fn entrances_end_at_rest_and_exits_end_hidden() {
        for kind in AnimationKind::ALL {
            if kind.is_exit() {
                assert_eq!(kind.start_style(), StyleFrame::REST, "{kind}");
                assert_eq!(kind.end_style().opacity, 0.0, "{kind}");
            } else {
                assert_eq!(kind.end_style(), StyleFrame::REST, "{kind}");
            }
        }
    }

    #[test]
    fn easing_bounds() {
        for easing in Easing::ALL {
            let start = easing.apply(0.0);
            let end = easing.apply(1.0);
            assert!((-0.01..=0.01).contains(&start), "{easing} should start at ~0");
            assert!((0.99..=1.01).contains(&end), "{easing} should end at ~1");
        }
    }

    #[test]
    fn linear_accepts_css_alias() {
        assert_eq!("linear".parse::<Easing>().unwrap(), Easing::Linear);
        assert!("bounce.out".parse::<Easing>().is_err());
    }

    #[test]
    fn sample_respects_delay_and_duration() {
        let spec = AnimationSpec {
            kind: AnimationKind::FadeIn,
            duration_ms: 400,
            delay_ms: 100,
            easing: Easing::Linear,
        };
        assert_eq!(spec.sample(50.0).opacity, 0.0);
        assert!((spec.sample(300.0).opacity - 0.5).abs() < 1e-4);
        assert_eq!(spec.sample(500.0), StyleFrame::REST);
        assert_eq!(spec.total_ms(), 500);
    }

    #[test]
    fn zero_duration_jumps_to_end() {
        let spec = AnimationSpec {
            kind: AnimationKind::FadeOut,
            duration_ms: 0,
            delay_ms: 0,
            easing: Easing::Power2In,
        };
        assert_eq!(spec.sample(0.0).opacity, 0.0);
    }

    #[test]
    fn spec_serializes_with_wire_names() {
        let spec = AnimationSpec {
            kind: AnimationKind::SlideLeftOut,
            duration_ms: 500,
            delay_ms: 40,
            easing: Easing::Power2In,
        };
        let json = serde_json::to_string(&spec).unwrap();
        assert_eq!(
            json,
            r#"{"type":"slide-left-out","durationMs":500,"delayMs":40,"easingId":"power2.in"}"#
        );
        let back: AnimationSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, spec);
    }

    #[test]
    fn unknown_kind_in_json_is_rejected() {
        let json = r#"{"type":"spin","durationMs":1,"delayMs":0,"easingId":"none"}"#;
        let err = serde_json::from_str::<AnimationSpec>(json).unwrap_err();
        assert!(err.to_string().contains("Unknown animation type"));
    }
}
