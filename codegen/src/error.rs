//! Typed fatal errors for a code generation run.
//!
//! Both variants travel inside `anyhow::Error`; callers that need to tell them
//! apart use `err.downcast_ref::<CodegenError>()`.

use thiserror::Error;

/// Which agent a completion failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiOrigin {
    Planner,
    Worker,
}

impl ApiOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            ApiOrigin::Planner => "planner",
            ApiOrigin::Worker => "worker",
        }
    }
}

#[derive(Debug, Error)]
pub enum CodegenError {
    /// The source reference failed validation; no workspace was created.
    #[error("Invalid source reference: {reference}")]
    InvalidReference { reference: String },

    /// A completion call returned no usable result, a payload that failed
    /// schema decoding, or timed out.
    #[error("{message}")]
    Api {
        origin: Option<ApiOrigin>,
        message: String,
    },
}

impl CodegenError {
    pub fn invalid_reference(reference: impl Into<String>) -> Self {
        CodegenError::InvalidReference {
            reference: reference.into(),
        }
    }

    pub fn api(origin: ApiOrigin, message: impl Into<String>) -> Self {
        CodegenError::Api {
            origin: Some(origin),
            message: message.into(),
        }
    }

    /// Completion failure not tied to a specific agent (e.g. a backend timeout).
    pub fn backend(message: impl Into<String>) -> Self {
        CodegenError::Api {
            origin: None,
            message: message.into(),
        }
    }

    pub fn no_result(origin: ApiOrigin) -> Self {
        let message = match origin {
            ApiOrigin::Planner => "Failed to get plan from API",
            ApiOrigin::Worker => "Failed to get code diff from API",
        };
        Self::api(origin, message)
    }

    pub fn undecodable(origin: ApiOrigin) -> Self {
        Self::api(
            origin,
            format!(
                "Failed to decode codegen {} JSON response from API",
                origin.as_str()
            ),
        )
    }

    pub fn is_api(&self) -> bool {
        matches!(self, CodegenError::Api { .. })
    }
}
