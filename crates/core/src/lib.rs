//! Core business logic for EqualVoice.

pub mod services;

pub use services::*;
