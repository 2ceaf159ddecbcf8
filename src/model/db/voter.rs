use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};

use crate::model::{api::otp::Code, common::Email, mongodb::Id};

/// Core voter data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterCore {
    /// The instance this voter may vote in. Never changes.
    pub instance_id: Id,
    pub full_name: String,
    /// Unique within the instance.
    pub email: Email,
    pub is_registered: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registered_at: Option<DateTime>,
    /// The durable identity behind this voter, once they have first signed in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_id: Option<Id>,
    /// The single live login code slot. Only the OTP engine touches this.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_code: Option<Code>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_code_expires_at: Option<DateTime>,
    /// Wrong guesses made against the current code.
    #[serde(default)]
    pub login_code_failures: u32,
}

impl VoterCore {
    /// Create a new, unregistered voter with no code on file.
    pub fn new(instance_id: Id, full_name: String, email: Email) -> Self {
        Self {
            instance_id,
            full_name,
            email,
            is_registered: false,
            registered_at: None,
            credential_id: None,
            login_code: None,
            login_code_expires_at: None,
            login_code_failures: 0,
        }
    }
}

/// A voter without an ID.
pub type NewVoter = VoterCore;

/// A voter from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voter {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub voter: VoterCore,
}

deref_core!(Voter, voter, VoterCore);
