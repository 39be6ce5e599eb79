//! Database entities.

pub mod profile;
pub mod report;
pub mod report_comment;
pub mod report_supporter;

pub use profile::Entity as Profile;
pub use report::Entity as Report;
pub use report_comment::Entity as ReportComment;
pub use report_supporter::Entity as ReportSupporter;
