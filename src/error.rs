use argon2::Error as Argon2Error;
use jsonwebtoken::errors::{Error as JwtError, ErrorKind as JwtErrorKind};
use mongodb::error::Error as DbError;
use rocket::{
    http::Status,
    response::{self, status::Custom, Responder},
    serde::json::Json,
    Request,
};
use serde::Serialize;
use thiserror::Error;

use crate::model::{api::otp::ParseError, common::InstanceStatus};

pub type Result<T> = std::result::Result<T, Error>;

/// Every way a request can fail.
///
/// Only `Db` (and the other infrastructure variants) indicate something wrong
/// with the server; everything else is an ordinary, recoverable outcome of
/// the request.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Jwt(#[from] JwtError),
    #[error(transparent)]
    Argon2(#[from] Argon2Error),
    #[error("Failed to deliver login code: {0}")]
    Delivery(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Too many code requests; try again in {wait_seconds}s")]
    RateLimited { wait_seconds: u64 },
    #[error("Invalid code")]
    InvalidCode,
    #[error("Malformed code: {0}")]
    MalformedCode(#[from] ParseError),
    #[error("A vote has already been cast in this category")]
    AlreadyVoted,
    #[error("Election is {0}")]
    ElectionNotActive(InstanceStatus),
    #[error("Cannot {action} an election that is {from}")]
    IllegalTransition {
        from: InstanceStatus,
        action: &'static str,
    },
    #[error("Invalid target: {0}")]
    InvalidTarget(String),
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Short machine-readable name of the error, for API clients.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Db(_) | Self::Jwt(_) | Self::Argon2(_) => "server_error",
            Self::Delivery(_) => "delivery_failed",
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::RateLimited { .. } => "rate_limited",
            Self::InvalidCode => "invalid_code",
            Self::MalformedCode(_) => "malformed_code",
            Self::AlreadyVoted => "already_voted",
            Self::ElectionNotActive(status) if status.has_ended() => "election_ended",
            Self::ElectionNotActive(_) => "election_not_active",
            Self::IllegalTransition { .. } => "illegal_transition",
            Self::InvalidTarget(_) => "invalid_target",
            Self::Conflict(_) => "conflict",
        }
    }

    pub fn status(&self) -> Status {
        match self {
            Self::Db(_) | Self::Argon2(_) => Status::InternalServerError,
            Self::Jwt(err) => match err.kind() {
                JwtErrorKind::ExpiredSignature | JwtErrorKind::ImmatureSignature => {
                    Status::Unauthorized
                }
                _ => Status::BadRequest,
            },
            Self::Delivery(_) => Status::BadGateway,
            Self::BadRequest(_) | Self::MalformedCode(_) => Status::BadRequest,
            Self::Unauthorized(_) | Self::InvalidCode => Status::Unauthorized,
            Self::Forbidden(_) => Status::Forbidden,
            Self::NotFound(_) => Status::NotFound,
            Self::RateLimited { .. } => Status::TooManyRequests,
            Self::AlreadyVoted
            | Self::ElectionNotActive(_)
            | Self::IllegalTransition { .. }
            | Self::Conflict(_) => Status::Conflict,
            Self::InvalidTarget(_) => Status::UnprocessableEntity,
        }
    }
}

/// JSON body sent along with every error response.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    wait_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<InstanceStatus>,
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let status = self.status();
        // Never leak storage internals to the client.
        let message = if status == Status::InternalServerError {
            error!("{self}");
            "Internal server error".to_string()
        } else {
            warn!("{self}");
            self.to_string()
        };
        let body = ErrorBody {
            error: self.kind(),
            message,
            wait_seconds: match self {
                Self::RateLimited { wait_seconds } => Some(wait_seconds),
                _ => None,
            },
            status: match self {
                Self::ElectionNotActive(status) => Some(status),
                _ => None,
            },
        };
        Custom(status, Json(body)).respond_to(req)
    }
}
