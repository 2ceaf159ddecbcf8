use serde::{Deserialize, Serialize};

use crate::model::common::Email;

/// A voter asking for a login code to be sent to them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeRequestBody {
    pub email: Email,
}

/// A voter submitting the code they received.
///
/// The code stays a raw string here so a malformed code is reported as such,
/// rather than as a generic body parse failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyRequest {
    pub email: Email,
    pub code: String,
}

/// A voter exchanging a freshly minted durable credential for a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeRequest {
    pub email: Email,
    pub secret: String,
}

/// Staff sign-in credentials. The password is never stored.
#[derive(Clone, Serialize, Deserialize)]
pub struct StaffCredentials {
    pub email: Email,
    pub password: String,
}
