use std::fmt::Display;

use mongodb::bson::{to_bson, Bson};
use serde::{Deserialize, Serialize};

/// States in the election instance lifecycle.
///
/// See [`crate::engine::lifecycle`] for which transitions and mutations each state permits.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    /// Under construction. Structure is editable, nobody can vote.
    Draft,
    /// Voting is open. Structure is frozen.
    Active,
    /// Voting is temporarily suspended. Structure stays frozen.
    Paused,
    /// Voting has ended for good. Results remain available.
    Completed,
    /// Retired. Administrative visibility only.
    Archived,
}

impl InstanceStatus {
    pub const ALL: [InstanceStatus; 5] = [
        Self::Draft,
        Self::Active,
        Self::Paused,
        Self::Completed,
        Self::Archived,
    ];

    /// Has voting in this instance ended for good?
    pub fn has_ended(self) -> bool {
        matches!(self, Self::Completed | Self::Archived)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Archived => "archived",
        }
    }
}

impl Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<InstanceStatus> for Bson {
    fn from(status: InstanceStatus) -> Self {
        to_bson(&status).expect("Serialisation is infallible")
    }
}
