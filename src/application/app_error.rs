use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed: {0}")]
    ValidationError(String),

    #[error("Subscription composition rejected: {0}")]
    Composition(String),

    #[error("Subscription cannot be resumed: {0}")]
    NotResumable(String),

    #[error("Concurrent modification detected")]
    ConcurrencyConflict,

    #[error("Payment gateway sync failed: {0}")]
    GatewaySync(String),

    #[error("Invalid signature: {0}")]
    SignatureInvalid(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Not found")]
    NotFound,

    #[error("Forbidden")]
    Forbidden,

    #[error("Missing or unknown caller identity")]
    Unauthorized,

    #[error("Payment gateway is not configured")]
    ProviderNotConfigured,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::ValidationError(_) => ErrorCode::ValidationError,
            AppError::Composition(_) => ErrorCode::CompositionError,
            AppError::NotResumable(_) => ErrorCode::NotResumable,
            AppError::ConcurrencyConflict => ErrorCode::ConcurrencyConflict,
            AppError::GatewaySync(_) => ErrorCode::GatewaySyncError,
            AppError::SignatureInvalid(_) => ErrorCode::SignatureInvalid,
            AppError::MalformedPayload(_) => ErrorCode::MalformedPayload,
            AppError::NotFound => ErrorCode::NotFound,
            AppError::Forbidden => ErrorCode::Forbidden,
            AppError::Unauthorized => ErrorCode::Unauthorized,
            AppError::ProviderNotConfigured => ErrorCode::ProviderNotConfigured,
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::Internal(_) => ErrorCode::InternalError,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    ValidationError,
    CompositionError,
    NotResumable,
    ConcurrencyConflict,
    GatewaySyncError,
    SignatureInvalid,
    MalformedPayload,
    NotFound,
    Forbidden,
    Unauthorized,
    ProviderNotConfigured,
    DatabaseError,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::CompositionError => "COMPOSITION_ERROR",
            ErrorCode::NotResumable => "NOT_RESUMABLE",
            ErrorCode::ConcurrencyConflict => "CONCURRENCY_CONFLICT",
            ErrorCode::GatewaySyncError => "GATEWAY_SYNC_ERROR",
            ErrorCode::SignatureInvalid => "SIGNATURE_INVALID",
            ErrorCode::MalformedPayload => "MALFORMED_PAYLOAD",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::ProviderNotConfigured => "PROVIDER_NOT_CONFIGURED",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
