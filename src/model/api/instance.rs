use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::lifecycle::Capabilities;
use crate::model::{
    common::InstanceStatus,
    db::{Instance, NewInstance},
    mongodb::{id_as_hex, Id},
};

/// What an admin supplies to create an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSpec {
    pub name: String,
    #[serde(default)]
    pub theme: Option<String>,
}

impl From<InstanceSpec> for NewInstance {
    fn from(spec: InstanceSpec) -> Self {
        NewInstance::new(spec.name, spec.theme)
    }
}

/// API-friendly view of an instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceDescription {
    #[serde(with = "id_as_hex")]
    pub id: Id,
    pub name: String,
    pub theme: Option<String>,
    pub status: InstanceStatus,
    pub created_at: DateTime<Utc>,
    pub capabilities: Capabilities,
}

impl From<Instance> for InstanceDescription {
    fn from(instance: Instance) -> Self {
        Self {
            id: instance.id,
            capabilities: Capabilities::for_status(instance.status),
            name: instance.instance.name,
            theme: instance.instance.theme,
            status: instance.instance.status,
            created_at: instance.instance.created_at.to_chrono(),
        }
    }
}
