use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use settlement_engine::{LedgerApiError, SettlementError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("The request was rejected. {0}")]
    ValidationFailed(String),
    #[error("The request conflicts with the current state of the order. {0}")]
    Conflict(String),
    #[error("The peer address is not allowed to call this endpoint.")]
    ForbiddenPeer,
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::ForbiddenPeer => StatusCode::FORBIDDEN,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

impl From<SettlementError> for ServerError {
    fn from(e: SettlementError) -> Self {
        match e {
            SettlementError::DatabaseError(s) => Self::BackendError(format!("Database error: {s}")),
            SettlementError::Validation(_) => Self::ValidationFailed(e.to_string()),
            SettlementError::OrderNotFound(_) |
            SettlementError::OrderLineNotFound(_) |
            SettlementError::CommissionNotFound(_) => Self::NoRecordFound(e.to_string()),
            SettlementError::InsufficientStock { .. } |
            SettlementError::StockUnitNotFound(_) |
            SettlementError::InvalidPaymentState { .. } |
            SettlementError::InvalidCommissionTransition { .. } => Self::Conflict(e.to_string()),
        }
    }
}

impl From<LedgerApiError> for ServerError {
    fn from(e: LedgerApiError) -> Self {
        match e {
            LedgerApiError::DatabaseError(s) => Self::BackendError(format!("Database error: {s}")),
            LedgerApiError::QueryError(s) => Self::InvalidQuery(s),
        }
    }
}
