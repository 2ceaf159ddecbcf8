use serde::{Deserialize, Serialize};

use crate::model::mongodb::Id;

/// Core category data: one question on the ballot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCore {
    pub instance_id: Id,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub display_order: i32,
}

/// A category without an ID.
pub type NewCategory = CategoryCore;

/// A category from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub category: CategoryCore,
}

deref_core!(Category, category, CategoryCore);

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl CategoryCore {
        pub fn example(instance_id: Id) -> Self {
            Self {
                instance_id,
                name: "President".to_string(),
                description: "Chairs the council".to_string(),
                display_order: 1,
            }
        }

        pub fn example2(instance_id: Id) -> Self {
            Self {
                instance_id,
                name: "Treasurer".to_string(),
                description: "Keeps the books".to_string(),
                display_order: 2,
            }
        }
    }
}
