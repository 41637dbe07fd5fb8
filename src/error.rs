use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")] Database(#[from] sea_orm::DbErr),

    #[error("Encryption error: {0}")] Encryption(String),

    #[error("Invalid input: {0}")] InvalidInput(String),

    #[error("Password must be at least {min_length} characters")] PasswordTooShort {
        min_length: usize,
    },

    #[error("Password is already set up")]
    PasswordAlreadySet,

    #[error("Password has not been set up")]
    PasswordNotSet,

    #[error("Incorrect password. {attempts_remaining} attempts remaining")] IncorrectPassword {
        attempts_remaining: u32,
    },

    #[error("Too many failed attempts. Try again in {retry_after_secs} seconds")] LockedOut {
        retry_after_secs: i64,
    },

    #[error("Wallet is locked. Unlock it to continue")]
    WalletLocked,

    #[error("Wallet not found")]
    WalletNotFound,

    #[error("Order not found")]
    OrderNotFound,

    #[error("Order is no longer active")]
    OrderNotActive,

    #[error("Invalid address")]
    InvalidAddress,

    #[error("Invalid private key")]
    InvalidPrivateKey,

    #[error("External service error: {0}")] External(String),

    #[error("Timed out: {0}")] Timeout(String),

    #[error("Configuration error: {0}")] Config(String),

    #[error("Internal error: {0}")] Internal(String),
}

#[derive(serde::Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(serde::Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl AppError {
    pub fn to_error_response(&self) -> ErrorResponse {
        let (code, field) = match self {
            AppError::Database(_) => ("DATABASE_ERROR", None),
            AppError::Encryption(_) => ("ENCRYPTION_ERROR", None),
            AppError::InvalidInput(_) => ("INVALID_INPUT", None),
            AppError::PasswordTooShort { .. } => ("PASSWORD_TOO_SHORT", Some("password")),
            AppError::PasswordAlreadySet => ("PASSWORD_ALREADY_SET", None),
            AppError::PasswordNotSet => ("PASSWORD_NOT_SET", None),
            AppError::IncorrectPassword { .. } => ("INCORRECT_PASSWORD", Some("password")),
            AppError::LockedOut { .. } => ("LOCKED_OUT", None),
            AppError::WalletLocked => ("WALLET_LOCKED", None),
            AppError::WalletNotFound => ("WALLET_NOT_FOUND", None),
            AppError::OrderNotFound => ("ORDER_NOT_FOUND", None),
            AppError::OrderNotActive => ("ORDER_NOT_ACTIVE", None),
            AppError::InvalidAddress => ("INVALID_ADDRESS", Some("address")),
            AppError::InvalidPrivateKey => ("INVALID_PRIVATE_KEY", Some("secret")),
            AppError::External(_) => ("EXTERNAL_ERROR", None),
            AppError::Timeout(_) => ("TIMEOUT", None),
            AppError::Config(_) => ("CONFIG_ERROR", None),
            AppError::Internal(_) => ("INTERNAL_ERROR", None),
        };

        // Database errors can echo SQL parameters; keep them out of responses.
        let message = match self {
            AppError::Database(_) => "Database error".to_string(),
            other => other.to_string(),
        };

        ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                field: field.map(str::to_string),
            },
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let status = match &self {
            AppError::WalletNotFound | AppError::OrderNotFound => StatusCode::NOT_FOUND,
            | AppError::InvalidInput(_)
            | AppError::PasswordTooShort { .. }
            | AppError::InvalidAddress
            | AppError::InvalidPrivateKey => StatusCode::BAD_REQUEST,
            AppError::IncorrectPassword { .. } | AppError::PasswordNotSet =>
                StatusCode::UNAUTHORIZED,
            AppError::LockedOut { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::WalletLocked => StatusCode::FORBIDDEN,
            AppError::PasswordAlreadySet | AppError::OrderNotActive => StatusCode::CONFLICT,
            AppError::External(_) => StatusCode::BAD_GATEWAY,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let response = self.to_error_response();
        (status, axum::Json(response)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incorrect_password_reports_remaining_attempts() {
        let err = AppError::IncorrectPassword { attempts_remaining: 3 };
        assert_eq!(err.to_string(), "Incorrect password. 3 attempts remaining");

        let response = err.to_error_response();
        assert_eq!(response.error.code, "INCORRECT_PASSWORD");
        assert_eq!(response.error.field.as_deref(), Some("password"));
    }

    #[test]
    fn test_database_errors_are_not_echoed() {
        let err = AppError::Database(sea_orm::DbErr::Custom("secret=abc".to_string()));
        let response = err.to_error_response();
        assert_eq!(response.error.message, "Database error");
    }
}
