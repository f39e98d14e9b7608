use std::string::FromUtf8Error;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{event, Level};

use crate::lightning::error::LightningError;

/// Every variant carries a stable `code` (NUT-00 error envelope) so wallets can branch on a
/// machine-readable value instead of parsing `detail`.
#[derive(Error, Debug)]
pub enum MokshaMintError {
    #[error("{0}")]
    InputError(String),

    #[error("Token already spent - {0}")]
    ProofAlreadySpent(String),

    #[error("Token is pending - {0}")]
    ProofPending(String),

    #[error("Signature verification failed - {0}")]
    SignatureVerification(String),

    #[error("Spending condition not satisfied - {0}")]
    ConditionFailed(String),

    #[error("Output already signed - {0}")]
    OutputAlreadySigned(String),

    #[error("Keyset {0} unknown")]
    KeysetUnknown(String),

    #[error("Keyset {0} is inactive")]
    KeysetInactive(String),

    #[error("Inputs and outputs are not balanced - {0}")]
    AmountUnbalanced(String),

    #[error("Units of inputs, outputs and quote do not match - {0}")]
    UnitMismatch(String),

    #[error("Transferred amount does not cover fees - {0}")]
    FeeInsufficient(String),

    #[error("Quote {0} unknown")]
    QuoteUnknown(String),

    #[error("Quote {0} is not paid")]
    QuoteNotPaid(String),

    #[error("Quote {0} has already been issued")]
    QuoteAlreadyIssued(String),

    #[error("Quote {0} is locked by a concurrent request")]
    QuoteLocked(String),

    #[error("Quote {0} is expired")]
    QuoteExpired(String),

    #[error("Lightning backend error - {0}")]
    Lightning(#[from] LightningError),

    #[error("Lightning backend returned a permanent failure - {0}")]
    LightningPermanent(String),

    #[error("mint is busy, try again")]
    Busy,

    #[error("DB Error {0}")]
    Db(#[from] sqlx::Error),

    #[error("Utf8 Error {0}")]
    Utf8(#[from] FromUtf8Error),

    #[error("Serde Error {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Core error {0}")]
    MokshaCore(#[from] moksha_core::error::MokshaCoreError),

    #[error("Invalid amount")]
    InvalidAmount,
}

impl MokshaMintError {
    fn code(&self) -> u16 {
        match self {
            Self::InputError(_) => 10000,
            Self::ProofAlreadySpent(_) => 11001,
            Self::ProofPending(_) => 11002,
            Self::SignatureVerification(_) | Self::MokshaCore(_) => 12001,
            Self::ConditionFailed(_) => 12002,
            Self::OutputAlreadySigned(_) => 12003,
            Self::KeysetUnknown(_) => 13001,
            Self::KeysetInactive(_) => 13002,
            Self::AmountUnbalanced(_) | Self::InvalidAmount => 14001,
            Self::UnitMismatch(_) => 14002,
            Self::FeeInsufficient(_) => 14003,
            Self::QuoteUnknown(_) => 15001,
            Self::QuoteNotPaid(_) => 15002,
            Self::QuoteAlreadyIssued(_) => 15003,
            Self::QuoteLocked(_) => 15004,
            Self::QuoteExpired(_) => 15005,
            Self::Lightning(_) => 16001,
            Self::LightningPermanent(_) => 16002,
            Self::Busy => 17001,
            Self::Db(_) | Self::Utf8(_) | Self::Serialization(_) => 0,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Db(_) | Self::Utf8(_) | Self::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Busy => StatusCode::SERVICE_UNAVAILABLE,
            Self::QuoteLocked(_) => StatusCode::CONFLICT,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for MokshaMintError {
    fn into_response(self) -> Response {
        event!(Level::ERROR, "error in mint: {:?}", self);

        let status = self.status();
        let body = Json(json!({
            "code": self.code(),
            "detail": self.to_string(),
        }));

        (status, body).into_response()
    }
}
