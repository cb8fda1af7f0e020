use axum::{
    extract::{FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;
use service_core::error::{AppError, ErrorDetail};
use validator::Validate;

/// JSON body that is validated before the handler sees it. Rejections use
/// the same error envelope as every other failure.
pub struct ValidatedJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate + 'static,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|e| {
            AppError::InvalidArgument(ErrorDetail::new("malformed_body", e.body_text()))
        })?;

        value.validate().map_err(|e| {
            AppError::InvalidArgument(ErrorDetail::new("validation_failed", e.to_string()))
        })?;

        Ok(ValidatedJson(value))
    }
}
