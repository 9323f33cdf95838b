pub mod lifecycle;
pub mod rest;

pub use lifecycle::{CollaborationLifecycle, Decided, DecisionError};
