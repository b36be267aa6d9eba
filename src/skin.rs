// Layout/skin descriptors. One engine serves every card shape; a skin only says which
// components exist, where they live in a buffer, and which role times them.

use serde::{Deserialize, Serialize};

use crate::types::{Component, Role};

/// One component slot of a skin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkinSlot {
    pub component: Component,
    /// Selector of the node inside a buffer container.
    pub selector: String,
    /// Overrides the component's default role for preset timing.
    #[serde(default)]
    pub role: Option<Role>,
}

impl SkinSlot {
    fn new(component: Component, selector: &str) -> Self {
        SkinSlot {
            component,
            selector: selector.to_string(),
            role: None,
        }
    }

    fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }
}

/// Layout descriptor: element selectors plus role mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skin {
    pub id: String,
    pub slots: Vec<SkinSlot>,
}

impl Skin {
    /// Rectangular card with every component.
    pub fn card() -> Self {
        Skin {
            id: "card".to_string(),
            slots: vec![
                SkinSlot::new(Component::Background, ".np-bg"),
                SkinSlot::new(Component::Overlay, ".np-overlay"),
                SkinSlot::new(Component::Cover, ".np-cover"),
                SkinSlot::new(Component::TrackName, ".np-track"),
                SkinSlot::new(Component::ArtistName, ".np-artist"),
                SkinSlot::new(Component::ProgressBar, ".np-bar"),
                SkinSlot::new(Component::CurrentTime, ".np-time-current"),
                SkinSlot::new(Component::TotalTime, ".np-time-total"),
                SkinSlot::new(Component::Badge, ".np-badge"),
            ],
        }
    }

    /// Circular layout: the progress ring hugs the cover and moves with it.
    pub fn circle() -> Self {
        Skin {
            id: "circle".to_string(),
            slots: vec![
                SkinSlot::new(Component::Background, ".np-circle-bg"),
                SkinSlot::new(Component::Cover, ".np-circle-cover"),
                SkinSlot::new(Component::ProgressBar, ".np-circle-ring").with_role(Role::Cover),
                SkinSlot::new(Component::TrackName, ".np-circle-track"),
                SkinSlot::new(Component::ArtistName, ".np-circle-artist"),
                SkinSlot::new(Component::CurrentTime, ".np-circle-time"),
            ],
        }
    }

    pub fn builtin(id: &str) -> Option<Self> {
        match id {
            "card" => Some(Skin::card()),
            "circle" => Some(Skin::circle()),
            _ => None,
        }
    }

    pub fn components(&self) -> impl Iterator<Item = Component> + '_ {
        self.slots.iter().map(|slot| slot.component)
    }

    pub fn contains(&self, component: Component) -> bool {
        self.slots.iter().any(|slot| slot.component == component)
    }

    pub fn slot(&self, component: Component) -> Option<&SkinSlot> {
        self.slots.iter().find(|slot| slot.component == component)
    }

    pub fn selector(&self, component: Component) -> Option<&str> {
        self.slot(component).map(|slot| slot.selector.as_str())
    }

    pub fn role_of(&self, component: Component) -> Role {
        self.slot(component)
            .and_then(|slot| slot.role)
            .unwrap_or_else(|| component.role())
    }
}

impl Default for Skin {
    fn default() -> Self {
        Skin::card()
    }
}

/// Skin as written in the widget config: a builtin name or an inline descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SkinChoice {
    Named(String),
    Custom(Skin),
}

impl SkinChoice {
    /// Unknown builtin names fall back to the card skin.
    pub fn resolve(&self) -> Skin {
        match self {
            SkinChoice::Named(id) => Skin::builtin(id).unwrap_or_else(|| {
                tracing::warn!(skin = %id, "unknown skin, using card");
                Skin::card()
            }),
            SkinChoice::Custom(skin) => skin.clone(),
        }
    }
}

impl Default for SkinChoice {
    fn default() -> Self {
        SkinChoice::Named("card".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn card_has_every_component() {
        let skin = Skin::card();
        for component in Component::ALL {
            assert!(skin.contains(component), "{component}");
        }
    }

    #[test]
    fn circle_ring_is_timed_like_the_cover() {
        let skin = Skin::circle();
        assert_eq!(skin.role_of(Component::ProgressBar), Role::Cover);
        assert_eq!(skin.role_of(Component::TrackName), Role::Text);
        assert!(!skin.contains(Component::Badge));
    }

    #[test]
    fn skin_choice_accepts_name_or_descriptor() {
        let named: SkinChoice = serde_json::from_str(r#""circle""#).unwrap();
        assert_eq!(named.resolve().id, "circle");

        let custom: SkinChoice = serde_json::from_str(
            r##"{"id":"mini","slots":[{"component":"TrackName","selector":"#t","role":"badge"}]}"##,
        )
        .unwrap();
        let skin = custom.resolve();
        assert_eq!(skin.selector(Component::TrackName), Some("#t"));
        assert_eq!(skin.role_of(Component::TrackName), Role::Badge);

        let unknown = SkinChoice::Named("hexagon".into());
        assert_eq!(unknown.resolve().id, "card");
    }
}
