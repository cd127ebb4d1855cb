//! Declarative report templates: the model, structural validation,
//! rendering against report data, and the versioned registry.

pub mod defaults;
pub mod registry;
pub mod render;
pub mod types;
pub mod validate;

pub use registry::TemplateRegistry;
pub use render::{compose_sections, evaluate, resolve_variables, substitute, Variables};
pub use types::*;
pub use validate::{validate, ValidationResult};
