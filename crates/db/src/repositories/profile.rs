//! Profile repository.

use std::sync::Arc;

use crate::entities::{Profile, profile};
use crate::store::{NewProfile, ProfileStore};
use async_trait::async_trait;
use chrono::Utc;
use equalvoice_common::{AppError, AppResult};
use sea_orm::{DatabaseConnection, EntityTrait, Set, sea_query::OnConflict};

/// Profile repository for database operations.
#[derive(Clone)]
pub struct ProfileRepository {
    db: Arc<DatabaseConnection>,
}

impl ProfileRepository {
    /// Create a new profile repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a profile by identity ID.
    pub async fn find_by_identity_id(&self, identity_id: &str) -> AppResult<Option<profile::Model>> {
        Profile::find_by_id(identity_id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Insert a profile, doing nothing if the identity already has one.
    pub async fn insert_if_absent(&self, input: NewProfile) -> AppResult<bool> {
        let model = profile::ActiveModel {
            identity_id: Set(input.identity_id),
            display_name: Set(input.display_name),
            email: Set(input.email),
            photo_url: Set(input.photo_url),
            is_admin: Set(false),
            created_at: Set(Utc::now().into()),
        };

        let rows = Profile::insert(model)
            .on_conflict(
                OnConflict::column(profile::Column::IdentityId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(|e| AppError::Write(e.to_string()))?;

        Ok(rows > 0)
    }
}

#[async_trait]
impl ProfileStore for ProfileRepository {
    async fn find_profile(&self, identity_id: &str) -> AppResult<Option<profile::Model>> {
        self.find_by_identity_id(identity_id).await
    }

    async fn create_profile_if_absent(&self, profile: NewProfile) -> AppResult<bool> {
        self.insert_if_absent(profile).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn create_test_profile(identity_id: &str, is_admin: bool) -> profile::Model {
        profile::Model {
            identity_id: identity_id.to_string(),
            display_name: Some("Test User".to_string()),
            email: Some("test@example.com".to_string()),
            photo_url: None,
            is_admin,
            created_at: Utc::now().into(),
        }
    }

    fn new_profile(identity_id: &str) -> NewProfile {
        NewProfile {
            identity_id: identity_id.to_string(),
            display_name: Some("Test User".to_string()),
            email: None,
            photo_url: None,
        }
    }

    #[tokio::test]
    async fn test_find_profile_found() {
        let profile = create_test_profile("uid1", true);

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[profile.clone()]])
                .into_connection(),
        );

        let repo = ProfileRepository::new(db);
        let result = repo.find_profile("uid1").await.unwrap();

        let found = result.unwrap();
        assert_eq!(found.identity_id, "uid1");
        assert!(found.is_admin);
    }

    #[tokio::test]
    async fn test_find_profile_not_found() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<profile::Model>::new()])
                .into_connection(),
        );

        let repo = ProfileRepository::new(db);
        let result = repo.find_profile("missing").await.unwrap();

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_create_profile_when_absent() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                }])
                .into_connection(),
        );

        let repo = ProfileRepository::new(db);
        let created = repo.create_profile_if_absent(new_profile("uid1")).await.unwrap();

        assert!(created);
    }

    #[tokio::test]
    async fn test_create_profile_keeps_existing() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                }])
                .into_connection(),
        );

        let repo = ProfileRepository::new(db);
        let created = repo.create_profile_if_absent(new_profile("uid1")).await.unwrap();

        assert!(!created);
    }
}
