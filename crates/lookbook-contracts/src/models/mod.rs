mod registry;
mod selectors;

pub use registry::{canonical_model_name, ModelRegistry, ModelSpec};
pub use selectors::{CandidateList, ModelSelector};
