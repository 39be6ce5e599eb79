//! Request extractors.

use axum::{
    extract::{FromRequestParts, Query},
    http::request::Parts,
};
use equalvoice_common::AppError;
use equalvoice_core::{FeedFilter, Identity};
use serde::Deserialize;

use crate::middleware::SessionToken;

/// Authenticated identity extractor.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Identity);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Set by auth middleware
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .map(AuthUser)
            .ok_or(AppError::Unauthorized)
    }
}

/// Optional identity extractor.
///
/// Handlers pass the identity through untouched; the services decide
/// what an anonymous call means.
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<Identity>);

impl<S> FromRequestParts<S> for MaybeAuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(parts.extensions.get::<Identity>().cloned()))
    }
}

/// The bearer token of an authenticated request.
#[derive(Debug, Clone)]
pub struct AuthToken(pub String);

impl<S> FromRequestParts<S> for AuthToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionToken>()
            .map(|t| Self(t.0.clone()))
            .ok_or(AppError::Unauthorized)
    }
}

#[derive(Debug, Default, Deserialize)]
struct FilterQuery {
    filter: Option<String>,
}

/// The `?filter=` of a feed request, `latest` when absent.
///
/// Unknown values are rejected as [`AppError::BadRequest`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Filter(pub FeedFilter);

impl<S> FromRequestParts<S> for Filter
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Query(query) = Query::<FilterQuery>::try_from_uri(&parts.uri)
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        match query.filter {
            Some(filter) => Ok(Self(filter.parse()?)),
            None => Ok(Self::default()),
        }
    }
}
