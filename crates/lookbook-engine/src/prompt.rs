use lookbook_contracts::angles::Angle;
use lookbook_contracts::profiles::StyleProfile;

const CUSTOM_PROMPT_MAX_CHARS: usize = 2000;

const PREAMBLE: &str = "You are a professional e-commerce product photographer. Using the attached \
source photo(s) of the product, produce one photorealistic, studio-quality catalog image of the \
same product. Preserve the product's exact shape, proportions, materials, stitching, logos, and \
printed text. Do not add, remove, or redesign any part of the product. Output a single image with \
no text overlays, borders, or watermarks.";

/// Everything that varies between angle prompts within one batch.
#[derive(Debug, Clone, Copy)]
pub struct PromptInputs<'a> {
    pub profile: &'a StyleProfile,
    pub angle: Angle,
    pub source_count: usize,
    pub target_color: Option<&'a str>,
    pub has_color_reference: bool,
    pub anchor_angle: Option<Angle>,
    pub custom_prompt: Option<&'a str>,
}

/// Reference order in the payload is sources, color reference, then anchor,
/// and the clauses below describe them in that order.
pub fn compose_prompt(inputs: &PromptInputs<'_>) -> String {
    let mut sections = vec![PREAMBLE.to_string()];

    if inputs.source_count > 1 {
        sections.push(format!(
            "The first {} attached images all show the same product from different viewpoints.",
            inputs.source_count
        ));
    }
    sections.push(format!(
        "Style ({}): {}",
        inputs.profile.label, inputs.profile.directive
    ));
    sections.push(format!(
        "Camera angle ({}): {}",
        inputs.angle.label(),
        inputs.angle.directive()
    ));

    if let Some(color) = inputs.target_color {
        sections.push(format!(
            "Recolor the product to {color}, keeping its material, texture, and shading realistic."
        ));
    }
    if inputs.has_color_reference {
        sections.push(
            "An additional attached image is a color reference: match the product's color to it \
             exactly."
                .to_string(),
        );
    }
    if let Some(anchor_angle) = inputs.anchor_angle {
        sections.push(format!(
            "The last attached image is the already-approved {} view from this same shoot. \
             Match its lighting, background, color grading, and product appearance exactly so \
             the set looks consistent; only the camera angle changes.",
            anchor_angle.label().to_ascii_lowercase()
        ));
    }
    if let Some(custom) = inputs
        .custom_prompt
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        let capped: String = custom.chars().take(CUSTOM_PROMPT_MAX_CHARS).collect();
        sections.push(format!("Additional instructions from the merchant: {capped}"));
    }

    sections.join("\n\n")
}
