use http::StatusCode;
use std::fmt;

/// Everything a request can fail with, as seen by the client.
#[derive(Debug)]
pub enum ApiError {
    /// Required input was missing or malformed.
    Validation(String),
    /// The store could not be reached or bootstrapped.
    StoreUnavailable(anyhow::Error),
    /// A statement against the store failed.
    StoreOperation(anyhow::Error),
    /// No route matched the request.
    NotFound { path: String, method: String },
    /// Anything else that went wrong while serving the request.
    Internal(anyhow::Error),
}

impl ApiError {
    pub fn validation<T: Into<String>>(msg: T) -> Self {
        ApiError::Validation(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::StoreUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::StoreOperation(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message placed in the `error` field of the response body.
    ///
    /// An unavailable store is reported with a fixed message; the cause is
    /// only logged.
    pub fn client_message(&self) -> String {
        match self {
            ApiError::Validation(msg) => msg.clone(),
            ApiError::StoreUnavailable(_) => {
                String::from("Database connection failed")
            }
            ApiError::StoreOperation(error) => format!("{:#}", error),
            ApiError::NotFound { .. } => String::from("Endpoint not found"),
            ApiError::Internal(error) => format!("{:#}", error),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Validation(msg) => write!(f, "validation error: {}", msg),
            ApiError::StoreUnavailable(error) => {
                write!(f, "store unavailable: {:#}", error)
            }
            ApiError::StoreOperation(error) => {
                write!(f, "store operation failed: {:#}", error)
            }
            ApiError::NotFound { path, method } => {
                write!(f, "no endpoint for {} {}", method, path)
            }
            ApiError::Internal(error) => write!(f, "internal error: {:#}", error),
        }
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(
            ApiError::validation("Country is required").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::StoreUnavailable(anyhow!("refused")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::StoreOperation(anyhow!("timeout")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        let not_found = ApiError::NotFound {
            path: String::from("nope"),
            method: String::from("GET"),
        };
        assert_eq!(not_found.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn store_operation_message_keeps_cause_chain() {
        let error = anyhow!("relation \"clicks\" does not exist")
            .context("loading leaderboard");
        let api_error = ApiError::StoreOperation(error);
        assert_eq!(
            api_error.client_message(),
            "loading leaderboard: relation \"clicks\" does not exist"
        );
    }

    #[test]
    fn unavailable_store_hides_cause_from_client() {
        let api_error =
            ApiError::StoreUnavailable(anyhow!("password authentication failed"));
        assert_eq!(api_error.client_message(), "Database connection failed");
        assert!(api_error.to_string().contains("password authentication"));
    }
}
