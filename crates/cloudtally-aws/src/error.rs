//! AWS error types and SDK error classification

use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use cloudtally_core::ProviderError;
use thiserror::Error;

/// Errors raised while setting up collectors
#[derive(Error, Debug)]
pub enum AwsError {
    #[error("Unknown resource family: {0} (expected dns, s3, cdn, iam or all)")]
    UnknownFamily(String),
}

pub type Result<T> = std::result::Result<T, AwsError>;

/// Map an SDK failure onto the provider error model
///
/// Transport level failures are transient; service errors keep their code
/// so collectors can match on it.
pub(crate) fn classify<E, R>(service: &str, err: SdkError<E, R>) -> ProviderError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            ProviderError::Transient(format!("{}: {}", service, DisplayErrorContext(&err)))
        }
        SdkError::ConstructionFailure(_) => {
            ProviderError::Malformed(format!("{}: {}", service, DisplayErrorContext(&err)))
        }
        _ => {
            let service_error = err.as_service_error();
            let code = service_error.and_then(|e| e.code()).unwrap_or("Unknown");
            let message = service_error
                .and_then(|e| e.message())
                .map(str::to_string)
                .unwrap_or_else(|| DisplayErrorContext(&err).to_string());
            ProviderError::api(service, code, message)
        }
    }
}

/// A required response field was missing
pub(crate) fn missing(service: &str, field: &str) -> ProviderError {
    ProviderError::Malformed(format!("{} response has no {}", service, field))
}
