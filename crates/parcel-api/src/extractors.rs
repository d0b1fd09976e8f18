//! # Validated JSON Bodies
//!
//! [`ValidatedJson`] and [`OptionalJson`] are drop-in replacements for
//! `axum::Json` that reject with [`AppError`]: unparseable bodies become
//! 400 `BAD_REQUEST`, rule violations become 422 `VALIDATION_ERROR`.

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::Json;
use serde::de::DeserializeOwned;

use crate::error::AppError;

/// Request DTOs with rules beyond what serde enforces.
pub trait Validate {
    /// Human-readable reason on failure.
    fn validate(&self) -> Result<(), String>;
}

fn rejection(err: JsonRejection) -> AppError {
    AppError::BadRequest(err.body_text())
}

/// A JSON body that parsed and passed [`Validate::validate`].
#[derive(Debug)]
pub struct ValidatedJson<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(rejection)?;
        value.validate().map_err(AppError::Validation)?;
        Ok(Self(value))
    }
}

/// Like [`ValidatedJson`], but a request without a JSON body yields
/// `T::default()`. A body that is sent but malformed is still a 400.
#[derive(Debug)]
pub struct OptionalJson<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for OptionalJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate + Default,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let value = match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => value,
            Err(JsonRejection::MissingJsonContentType(_)) => T::default(),
            Err(err) => return Err(rejection(err)),
        };
        value.validate().map_err(AppError::Validation)?;
        Ok(Self(value))
    }
}
