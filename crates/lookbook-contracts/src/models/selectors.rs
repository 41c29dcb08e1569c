use super::registry::{canonical_model_name, ModelRegistry};

/// Ordered, de-duplicated list of model identifiers for one cascade walk.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CandidateList {
    models: Vec<String>,
}

impl CandidateList {
    pub fn new<I, S>(models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out = Self::default();
        for model in models {
            out.push(model.as_ref());
        }
        out
    }

    /// Returns false when the name is blank or already listed.
    pub fn push(&mut self, model: &str) -> bool {
        let name = canonical_model_name(model);
        if name.is_empty() || self.contains(name) {
            return false;
        }
        self.models.push(name.to_string());
        true
    }

    pub fn contains(&self, model: &str) -> bool {
        let name = canonical_model_name(model);
        self.models.iter().any(|existing| existing == name)
    }

    pub fn as_slice(&self) -> &[String] {
        self.models.as_slice()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.models.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModelSelector {
    pub registry: ModelRegistry,
}

impl ModelSelector {
    pub fn new(registry: Option<ModelRegistry>) -> Self {
        Self {
            registry: registry.unwrap_or_default(),
        }
    }

    /// Operator overrides come first, then the provider's registry order.
    pub fn cascade<S: AsRef<str>>(&self, provider: &str, overrides: &[S]) -> CandidateList {
        let mut candidates = CandidateList::new(overrides);
        for spec in self.registry.by_provider(provider, "edit") {
            candidates.push(&spec.name);
        }
        candidates
    }
}
