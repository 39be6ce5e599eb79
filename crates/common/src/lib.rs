//! Common utilities and shared types for EqualVoice.
//!
//! - **Configuration**: Application settings via [`Config`]
//! - **Error handling**: Unified error types via [`AppError`] and [`AppResult`]
//! - **ID Generation**: ULID-based identifiers and session tokens via [`IdGenerator`]
//!
//! # Example
//!
//! ```no_run
//! use equalvoice_common::{AppResult, Config, IdGenerator};
//!
//! fn example() -> AppResult<()> {
//!     let config = Config::load()?;
//!     let id = IdGenerator::new().generate();
//!     println!("{} -> {}", config.server.url, id);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod id;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use id::IdGenerator;
