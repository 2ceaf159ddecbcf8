use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};

use crate::model::{common::Email, mongodb::Id};

/// A durable voter identity, created on first sign-in and keyed by email.
///
/// The secret itself is never stored, only its keyed digest. The digest is
/// cleared once the secret has been exchanged for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialCore {
    pub email: Email,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_digest: Option<String>,
    pub created_at: DateTime,
    pub rotated_at: DateTime,
}

impl CredentialCore {
    pub fn new(email: Email, secret_digest: String, now: DateTime) -> Self {
        Self {
            email,
            secret_digest: Some(secret_digest),
            created_at: now,
            rotated_at: now,
        }
    }
}

/// A credential without an ID.
pub type NewCredential = CredentialCore;

/// A credential from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub credential: CredentialCore,
}

deref_core!(Credential, credential, CredentialCore);
