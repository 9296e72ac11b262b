//! Error surfaced by command handlers.

use thiserror::Error;

use dockyard_core::DomainError;
use dockyard_deployment::StoreError;

pub type HandlerResult<T> = Result<T, HandlerError>;

#[derive(Debug, Error)]
pub enum HandlerError {
    /// Sentinel error raised by an aggregate, returned as is.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Domain error caused by a user supplied value.
    #[error("{field}: {error}")]
    Validation {
        field: &'static str,
        error: DomainError,
    },

    #[error(transparent)]
    Infrastructure(#[from] anyhow::Error),
}

impl HandlerError {
    /// Scope availability and parsing errors to the input field they come from.
    pub fn on_field(field: &'static str) -> impl FnOnce(DomainError) -> HandlerError {
        move |error| {
            let from_input = error.is_naming_collision()
                || matches!(
                    error,
                    DomainError::InvalidUrl
                        | DomainError::InvalidAppName
                        | DomainError::InvalidEnvironmentName
                        | DomainError::InvalidSourcePayload
                        | DomainError::InvalidProviderPayload
                );

            if from_input {
                HandlerError::Validation { field, error }
            } else {
                HandlerError::Domain(error)
            }
        }
    }

    /// Stable code of the underlying domain error, if any.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            HandlerError::Domain(error) | HandlerError::Validation { error, .. } => {
                Some(error.code())
            }
            HandlerError::Infrastructure(_) => None,
        }
    }

    pub fn is(&self, expected: DomainError) -> bool {
        match self {
            HandlerError::Domain(error) | HandlerError::Validation { error, .. } => {
                *error == expected
            }
            HandlerError::Infrastructure(_) => false,
        }
    }
}

impl From<StoreError> for HandlerError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound => HandlerError::Domain(DomainError::NotFound),
            other => HandlerError::Infrastructure(anyhow::Error::new(other)),
        }
    }
}
