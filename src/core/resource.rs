//! Loading/success/error wrapper for asynchronously produced values

use crate::core::error::ProvisionError;

/// State of a value the session is fetching
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource<T> {
    Loading,
    Success(T),
    Error(ProvisionError),
}

impl<T> Resource<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, Resource::Loading)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Resource::Success(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Resource::Error(_))
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Resource::Success(data) => Some(data),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ProvisionError> {
        match self {
            Resource::Error(error) => Some(error),
            _ => None,
        }
    }
}

impl<T> From<Result<T, ProvisionError>> for Resource<T> {
    fn from(result: Result<T, ProvisionError>) -> Self {
        match result {
            Ok(data) => Resource::Success(data),
            Err(error) => Resource::Error(error),
        }
    }
}
