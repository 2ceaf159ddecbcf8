use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};

use crate::model::common::Email;

/// When a login code was last sent to an email address. Drives the per-email cooldown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeRequest {
    #[serde(rename = "_id")]
    pub email: Email,
    pub last_sent_at: DateTime,
}
