use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};

use crate::model::{common::InstanceStatus, mongodb::Id};

/// Core election instance (tenant) data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceCore {
    pub name: String,
    /// Purely cosmetic; carried through for the UI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    pub status: InstanceStatus,
    pub created_at: DateTime,
}

impl InstanceCore {
    /// A fresh instance always starts out as a draft.
    pub fn new(name: String, theme: Option<String>) -> Self {
        Self {
            name,
            theme,
            status: InstanceStatus::Draft,
            created_at: DateTime::now(),
        }
    }
}

/// An instance without an ID.
pub type NewInstance = InstanceCore;

/// An instance from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub instance: InstanceCore,
}

deref_core!(Instance, instance, InstanceCore);
