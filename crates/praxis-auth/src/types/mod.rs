//! Subjects and resource instances.

pub mod resource;
pub mod subject;

pub use resource::{Confidentiality, ResourceInstance};
pub use subject::Subject;
