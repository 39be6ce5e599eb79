//! Report repository.
//!
//! Comments and supporters live in their own tables; a [`ReportDocument`] is
//! assembled from three queries run in one read-only repeatable-read
//! transaction, so every snapshot reflects a single point in time.

use std::collections::HashMap;
use std::sync::Arc;

use crate::entities::{Report, ReportComment, ReportSupporter, report, report_comment, report_supporter};
use crate::store::{NewComment, NewReport, ReportDocument, ReportStore};
use async_trait::async_trait;
use chrono::Utc;
use equalvoice_common::{AppError, AppResult, IdGenerator};
use sea_orm::{
    AccessMode, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    DatabaseTransaction, EntityTrait, IsolationLevel, QueryFilter, QueryOrder, Set,
    TransactionTrait,
    sea_query::{Expr, OnConflict},
};

/// Report repository for database operations.
#[derive(Clone)]
pub struct ReportRepository {
    db: Arc<DatabaseConnection>,
    id_gen: IdGenerator,
}

impl ReportRepository {
    /// Create a new report repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            db,
            id_gen: IdGenerator::new(),
        }
    }

    /// Find a report row by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<report::Model>> {
        Report::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a report row by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<report::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::ReportNotFound(id.to_string()))
    }

    /// Open a snapshot transaction.
    async fn begin_snapshot(&self) -> AppResult<DatabaseTransaction> {
        self.db
            .begin_with_config(
                Some(IsolationLevel::RepeatableRead),
                Some(AccessMode::ReadOnly),
            )
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Comments of the given reports, oldest first.
    async fn find_comments<C: ConnectionTrait>(
        db: &C,
        report_ids: &[String],
    ) -> AppResult<Vec<report_comment::Model>> {
        if report_ids.is_empty() {
            return Ok(vec![]);
        }

        ReportComment::find()
            .filter(report_comment::Column::ReportId.is_in(report_ids.to_vec()))
            .order_by_asc(report_comment::Column::CreatedAt)
            .order_by_asc(report_comment::Column::Id)
            .all(db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Supporters of the given reports, oldest first.
    async fn find_supporters<C: ConnectionTrait>(
        db: &C,
        report_ids: &[String],
    ) -> AppResult<Vec<report_supporter::Model>> {
        if report_ids.is_empty() {
            return Ok(vec![]);
        }

        ReportSupporter::find()
            .filter(report_supporter::Column::ReportId.is_in(report_ids.to_vec()))
            .order_by_asc(report_supporter::Column::CreatedAt)
            .all(db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Attach comments and supporters to their reports, keeping report order.
    fn assemble(
        reports: Vec<report::Model>,
        comments: Vec<report_comment::Model>,
        supporters: Vec<report_supporter::Model>,
    ) -> Vec<ReportDocument> {
        let mut comments_by_report: HashMap<String, Vec<report_comment::Model>> = HashMap::new();
        for comment in comments {
            comments_by_report
                .entry(comment.report_id.clone())
                .or_default()
                .push(comment);
        }

        let mut supporters_by_report: HashMap<String, Vec<String>> = HashMap::new();
        for supporter in supporters {
            supporters_by_report
                .entry(supporter.report_id)
                .or_default()
                .push(supporter.user_id);
        }

        reports
            .into_iter()
            .map(|report| ReportDocument {
                comments: comments_by_report.remove(&report.id).unwrap_or_default(),
                supporters: supporters_by_report.remove(&report.id).unwrap_or_default(),
                report,
            })
            .collect()
    }

    /// Flip a boolean column with `UPDATE ... RETURNING`, yielding the new value.
    async fn toggle_flag(&self, id: &str, column: report::Column, sql: &str) -> AppResult<bool> {
        let report = Report::update_many()
            .col_expr(column, Expr::cust(sql))
            .filter(report::Column::Id.eq(id))
            .exec_with_returning(self.db.as_ref())
            .await
            .map_err(|e| AppError::Write(e.to_string()))?
            .pop()
            .ok_or_else(|| AppError::ReportNotFound(id.to_string()))?;

        Ok(match column {
            report::Column::Resolved => report.resolved,
            _ => report.pinned,
        })
    }
}

#[async_trait]
impl ReportStore for ReportRepository {
    async fn create_report(&self, input: NewReport) -> AppResult<ReportDocument> {
        let model = report::ActiveModel {
            id: Set(self.id_gen.generate()),
            title: Set(input.title),
            description: Set(input.description),
            author_id: Set(input.author_id),
            author_name: Set(input.author_name),
            author_photo_url: Set(input.author_photo_url),
            pinned: Set(false),
            resolved: Set(false),
            created_at: Set(Utc::now().into()),
        };

        let created = model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Write(e.to_string()))?;

        Ok(ReportDocument::new(created))
    }

    async fn find_report(&self, id: &str) -> AppResult<Option<ReportDocument>> {
        let txn = self.begin_snapshot().await?;

        let report = Report::find_by_id(id)
            .one(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        let document = match report {
            Some(report) => {
                let ids = vec![report.id.clone()];
                let comments = Self::find_comments(&txn, &ids).await?;
                let supporters = Self::find_supporters(&txn, &ids).await?;
                Self::assemble(vec![report], comments, supporters).pop()
            }
            None => None,
        };

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(document)
    }

    async fn list_reports(&self) -> AppResult<Vec<ReportDocument>> {
        let txn = self.begin_snapshot().await?;

        let reports = Report::find()
            .order_by_desc(report::Column::CreatedAt)
            .order_by_desc(report::Column::Id)
            .all(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let ids: Vec<String> = reports.iter().map(|r| r.id.clone()).collect();
        let comments = Self::find_comments(&txn, &ids).await?;
        let supporters = Self::find_supporters(&txn, &ids).await?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(Self::assemble(reports, comments, supporters))
    }

    async fn append_comment(
        &self,
        report_id: &str,
        input: NewComment,
    ) -> AppResult<report_comment::Model> {
        self.get_by_id(report_id).await?;

        let model = report_comment::ActiveModel {
            id: Set(self.id_gen.generate()),
            report_id: Set(report_id.to_string()),
            author_id: Set(input.author_id),
            author_name: Set(input.author_name),
            author_photo_url: Set(input.author_photo_url),
            author_is_admin: Set(input.author_is_admin),
            text: Set(input.text),
            created_at: Set(Utc::now().into()),
        };

        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Write(e.to_string()))
    }

    async fn remove_comment(&self, report_id: &str, comment_id: &str) -> AppResult<bool> {
        self.get_by_id(report_id).await?;

        let result = ReportComment::delete_many()
            .filter(report_comment::Column::Id.eq(comment_id))
            .filter(report_comment::Column::ReportId.eq(report_id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Write(e.to_string()))?;

        Ok(result.rows_affected > 0)
    }

    async fn add_supporter(&self, report_id: &str, user_id: &str) -> AppResult<bool> {
        self.get_by_id(report_id).await?;

        let model = report_supporter::ActiveModel {
            id: Set(self.id_gen.generate()),
            report_id: Set(report_id.to_string()),
            user_id: Set(user_id.to_string()),
            created_at: Set(Utc::now().into()),
        };

        let rows = ReportSupporter::insert(model)
            .on_conflict(
                OnConflict::columns([
                    report_supporter::Column::ReportId,
                    report_supporter::Column::UserId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(|e| AppError::Write(e.to_string()))?;

        Ok(rows > 0)
    }

    async fn remove_supporter(&self, report_id: &str, user_id: &str) -> AppResult<bool> {
        self.get_by_id(report_id).await?;

        let result = ReportSupporter::delete_many()
            .filter(report_supporter::Column::ReportId.eq(report_id))
            .filter(report_supporter::Column::UserId.eq(user_id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Write(e.to_string()))?;

        Ok(result.rows_affected > 0)
    }

    async fn toggle_pinned(&self, id: &str) -> AppResult<bool> {
        self.toggle_flag(id, report::Column::Pinned, "NOT pinned")
            .await
    }

    async fn toggle_resolved(&self, id: &str) -> AppResult<bool> {
        self.toggle_flag(id, report::Column::Resolved, "NOT resolved")
            .await
    }

    async fn delete_report(&self, id: &str) -> AppResult<()> {
        // Comments and supporters go with it (ON DELETE CASCADE)
        let result = Report::delete_by_id(id)
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Write(e.to_string()))?;

        if result.rows_affected == 0 {
            return Err(AppError::ReportNotFound(id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn create_test_report(id: &str, pinned: bool) -> report::Model {
        report::Model {
            id: id.to_string(),
            title: "Broken streetlight".to_string(),
            description: "Main street, since Monday".to_string(),
            author_id: "author1".to_string(),
            author_name: Some("Author".to_string()),
            author_photo_url: None,
            pinned,
            resolved: false,
            created_at: Utc::now().into(),
        }
    }

    fn create_test_comment(id: &str, report_id: &str, text: &str) -> report_comment::Model {
        report_comment::Model {
            id: id.to_string(),
            report_id: report_id.to_string(),
            author_id: "user1".to_string(),
            author_name: Some("User".to_string()),
            author_photo_url: None,
            author_is_admin: false,
            text: text.to_string(),
            created_at: Utc::now().into(),
        }
    }

    fn create_test_supporter(id: &str, report_id: &str, user_id: &str) -> report_supporter::Model {
        report_supporter::Model {
            id: id.to_string(),
            report_id: report_id.to_string(),
            user_id: user_id.to_string(),
            created_at: Utc::now().into(),
        }
    }

    fn exec_result(rows_affected: u64) -> MockExecResult {
        MockExecResult {
            last_insert_id: 0,
            rows_affected,
        }
    }

    #[tokio::test]
    async fn test_find_report_assembles_document() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[create_test_report("r1", false)]])
                .append_query_results([[
                    create_test_comment("c1", "r1", "first"),
                    create_test_comment("c2", "r1", "second"),
                ]])
                .append_query_results([[create_test_supporter("s1", "r1", "user2")]])
                .into_connection(),
        );

        let repo = ReportRepository::new(db);
        let doc = repo.find_report("r1").await.unwrap().unwrap();

        assert_eq!(doc.id(), "r1");
        assert_eq!(doc.comments.len(), 2);
        assert_eq!(doc.comments[0].text, "first");
        assert_eq!(doc.supporters, vec!["user2".to_string()]);
        assert!(doc.is_supported_by("user2"));
    }

    #[tokio::test]
    async fn test_find_report_not_found() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<report::Model>::new()])
                .into_connection(),
        );

        let repo = ReportRepository::new(db);
        let result = repo.find_report("missing").await.unwrap();

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_list_reports_reads_in_one_transaction() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[create_test_report("r1", false)]])
                .append_query_results([[create_test_comment("c1", "r1", "first")]])
                .append_query_results([[create_test_supporter("s1", "r1", "user1")]])
                .into_connection(),
        );

        let repo = ReportRepository::new(Arc::clone(&db));
        repo.list_reports().await.unwrap();

        drop(repo);
        let log = Arc::try_unwrap(db).unwrap().into_transaction_log();
        assert_eq!(log.len(), 1);
        let statements: Vec<&str> = log[0].statements().iter().map(|s| s.sql.as_str()).collect();
        assert_eq!(statements.len(), 5);
        assert_eq!(statements[0], "BEGIN");
        assert!(statements[1].contains("FROM \"report\""));
        assert!(statements[2].contains("FROM \"report_comment\""));
        assert!(statements[3].contains("FROM \"report_supporter\""));
        assert_eq!(statements[4], "COMMIT");
    }

    #[tokio::test]
    async fn test_find_report_reads_in_one_transaction() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[create_test_report("r1", false)]])
                .append_query_results([Vec::<report_comment::Model>::new()])
                .append_query_results([Vec::<report_supporter::Model>::new()])
                .into_connection(),
        );

        let repo = ReportRepository::new(Arc::clone(&db));
        assert!(repo.find_report("r1").await.unwrap().is_some());

        drop(repo);
        let log = Arc::try_unwrap(db).unwrap().into_transaction_log();
        assert_eq!(log.len(), 1);
        let statements = log[0].statements();
        assert_eq!(statements.first().unwrap().sql, "BEGIN");
        assert_eq!(statements.last().unwrap().sql, "COMMIT");
        assert_eq!(statements.len(), 5);
    }

    #[tokio::test]
    async fn test_list_reports_empty_skips_child_queries() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<report::Model>::new()])
                .into_connection(),
        );

        let repo = ReportRepository::new(db);
        let result = repo.list_reports().await.unwrap();

        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_list_reports_groups_children_by_report() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[
                    create_test_report("r2", true),
                    create_test_report("r1", false),
                ]])
                .append_query_results([[
                    create_test_comment("c1", "r1", "on r1"),
                    create_test_comment("c2", "r2", "on r2"),
                ]])
                .append_query_results([[
                    create_test_supporter("s1", "r1", "user1"),
                    create_test_supporter("s2", "r1", "user2"),
                ]])
                .into_connection(),
        );

        let repo = ReportRepository::new(db);
        let docs = repo.list_reports().await.unwrap();

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id(), "r2");
        assert_eq!(docs[0].comments[0].text, "on r2");
        assert!(docs[0].supporters.is_empty());
        assert_eq!(docs[1].id(), "r1");
        assert_eq!(docs[1].supporters.len(), 2);
    }

    #[tokio::test]
    async fn test_append_comment_report_missing() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<report::Model>::new()])
                .into_connection(),
        );

        let repo = ReportRepository::new(db);
        let result = repo
            .append_comment(
                "missing",
                NewComment {
                    author_id: "user1".to_string(),
                    author_name: None,
                    author_photo_url: None,
                    author_is_admin: false,
                    text: "hello".to_string(),
                },
            )
            .await;

        match result {
            Err(AppError::ReportNotFound(id)) => assert_eq!(id, "missing"),
            _ => panic!("Expected ReportNotFound error"),
        }
    }

    #[tokio::test]
    async fn test_add_supporter_new_and_duplicate() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([
                    [create_test_report("r1", false)],
                    [create_test_report("r1", false)],
                ])
                .append_exec_results([exec_result(1), exec_result(0)])
                .into_connection(),
        );

        let repo = ReportRepository::new(db);

        assert!(repo.add_supporter("r1", "user1").await.unwrap());
        assert!(!repo.add_supporter("r1", "user1").await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_comment_without_match_reports_false() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[create_test_report("r1", false)]])
                .append_exec_results([exec_result(0)])
                .into_connection(),
        );

        let repo = ReportRepository::new(db);
        let removed = repo.remove_comment("r1", "unknown").await.unwrap();

        assert!(!removed);
    }

    #[tokio::test]
    async fn test_toggle_pinned_returns_updated_row() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[create_test_report("r1", true)]])
                .into_connection(),
        );

        let repo = ReportRepository::new(Arc::clone(&db));
        let pinned = repo.toggle_pinned("r1").await.unwrap();
        assert!(pinned);

        // One round trip: the flip and its result come from the same statement
        drop(repo);
        let log = Arc::try_unwrap(db).unwrap().into_transaction_log();
        assert_eq!(log.len(), 1);
        let sql = &log[0].statements()[0].sql;
        assert!(sql.starts_with("UPDATE"));
        assert!(sql.contains("NOT pinned"));
        assert!(sql.contains("RETURNING"));
    }

    #[tokio::test]
    async fn test_toggle_resolved_missing_report() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<report::Model>::new()])
                .into_connection(),
        );

        let repo = ReportRepository::new(db);
        let result = repo.toggle_resolved("missing").await;

        assert!(matches!(result, Err(AppError::ReportNotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_report() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([exec_result(1), exec_result(0)])
                .into_connection(),
        );

        let repo = ReportRepository::new(db);

        assert!(repo.delete_report("r1").await.is_ok());
        assert!(matches!(
            repo.delete_report("r1").await,
            Err(AppError::ReportNotFound(_))
        ));
    }
}
