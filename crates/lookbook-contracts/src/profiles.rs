use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleProfile {
    pub id: String,
    pub label: String,
    pub description: String,
    #[serde(skip)]
    pub directive: String,
}

pub const DEFAULT_PROFILE_ID: &str = "studio_white";

#[derive(Debug, Clone)]
pub struct ProfileCatalog {
    profiles: Vec<StyleProfile>,
}

impl Default for ProfileCatalog {
    fn default() -> Self {
        Self::new(default_profiles())
    }
}

impl ProfileCatalog {
    pub fn new(profiles: Vec<StyleProfile>) -> Self {
        Self { profiles }
    }

    pub fn get(&self, id: &str) -> Option<&StyleProfile> {
        let wanted = id.trim();
        self.profiles
            .iter()
            .find(|profile| profile.id.eq_ignore_ascii_case(wanted))
    }

    pub fn list(&self) -> &[StyleProfile] {
        self.profiles.as_slice()
    }

    pub fn default_profile(&self) -> Option<&StyleProfile> {
        self.get(DEFAULT_PROFILE_ID).or_else(|| self.profiles.first())
    }

    /// Unknown or missing ids resolve to the default profile.
    pub fn resolve(&self, preferred: Option<&str>) -> Option<&StyleProfile> {
        preferred
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .and_then(|value| self.get(value))
            .or_else(|| self.default_profile())
    }
}

fn default_profiles() -> Vec<StyleProfile> {
    let profile = |id: &str, label: &str, description: &str, directive: &str| StyleProfile {
        id: id.to_string(),
        label: label.to_string(),
        description: description.to_string(),
        directive: directive.to_string(),
    };

    vec![
        profile(
            "studio_white",
            "Studio white",
            "Seamless pure-white sweep with soft, even key lighting.",
            "Place the product on a seamless pure white (#FFFFFF) background with soft, even \
             studio lighting, a faint natural contact shadow, and no props.",
        ),
        profile(
            "soft_shadow",
            "Soft shadow",
            "Light grey backdrop with a pronounced diffuse drop shadow.",
            "Place the product on a light warm-grey backdrop lit by a single large softbox from \
             the upper left, casting a soft diffuse shadow to the lower right.",
        ),
        profile(
            "lifestyle_neutral",
            "Lifestyle neutral",
            "Minimal styled surface with neutral tones and shallow depth of field.",
            "Stage the product on a minimal light oak or linen surface with neutral tones, natural \
             window light, and a gently blurred background. Keep the product the clear focus.",
        ),
        profile(
            "ghost_mannequin",
            "Ghost mannequin",
            "Apparel shaped as if worn, with the form removed.",
            "Render the garment in a ghost-mannequin style: filled out as if worn, with no visible \
             mannequin or model, on a pure white background.",
        ),
        profile(
            "flat_lay",
            "Flat lay",
            "Neatly arranged overhead composition on a clean surface.",
            "Arrange the product neatly as a flat lay on a clean off-white surface with crisp, \
             even overhead lighting and minimal shadow.",
        ),
    ]
}
