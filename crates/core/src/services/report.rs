//! Report service.

use crate::services::event_publisher::{EventPublisherService, ReportChange, publish_change};
use crate::services::identity::Identity;
use equalvoice_common::{AppError, AppResult};
use equalvoice_db::{NewReport, ReportDocument, ReportStoreService};
use serde::Deserialize;
use validator::Validate;

/// Input for submitting a report.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReportInput {
    #[validate(length(min = 1, message = "Please fill in all fields"))]
    pub title: String,
    #[validate(length(min = 1, message = "Please fill in all fields"))]
    pub description: String,
}

/// Report service for business logic.
#[derive(Clone)]
pub struct ReportService {
    reports: ReportStoreService,
    event_publisher: Option<EventPublisherService>,
}

impl ReportService {
    /// Create a new report service.
    #[must_use]
    pub const fn new(reports: ReportStoreService) -> Self {
        Self {
            reports,
            event_publisher: None,
        }
    }

    /// Set the event publisher.
    pub fn set_event_publisher(&mut self, event_publisher: EventPublisherService) {
        self.event_publisher = Some(event_publisher);
    }

    /// Submit a new report.
    ///
    /// Empty fields are rejected before the author is checked.
    pub async fn submit(
        &self,
        input: SubmitReportInput,
        author: Option<&Identity>,
    ) -> AppResult<ReportDocument> {
        input.validate()?;
        let author = author.ok_or(AppError::Unauthorized)?;

        let created = self
            .reports
            .create_report(NewReport {
                title: input.title,
                description: input.description,
                author_id: author.id.clone(),
                author_name: author.display_name.clone(),
                author_photo_url: author.photo_url.clone(),
            })
            .await?;

        tracing::info!(report_id = %created.id(), user_id = %author.id, "Report submitted");

        publish_change(
            self.event_publisher.as_ref(),
            ReportChange::Created {
                report_id: created.id().to_string(),
            },
        )
        .await;

        Ok(created)
    }

    /// Get a report by ID.
    pub async fn get(&self, report_id: &str) -> AppResult<ReportDocument> {
        self.reports
            .find_report(report_id)
            .await?
            .ok_or_else(|| AppError::ReportNotFound(report_id.to_string()))
    }
}
