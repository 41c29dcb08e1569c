pub mod angles;
pub mod api;
pub mod crop;
pub mod error;
pub mod gallery;
pub mod generation;
pub mod models;
pub mod profiles;
pub mod runs;
