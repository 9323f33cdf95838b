pub mod notifier;
pub mod rest;
pub mod stream;

pub use notifier::Notifier;
