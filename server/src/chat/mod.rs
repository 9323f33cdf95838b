pub mod controller;
pub mod handler;
pub mod protocol;
pub mod rest;

pub use controller::{ChatError, ChatRooms};
