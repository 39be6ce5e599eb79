//! Repositories for database operations.

pub mod profile;
pub mod report;

pub use profile::ProfileRepository;
pub use report::ReportRepository;
