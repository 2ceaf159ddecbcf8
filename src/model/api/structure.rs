//! Categories, candidates and voters: the structure of an instance's ballot and electorate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    common::Email,
    db::{Candidate, Category, Voter},
    mongodb::{id_as_hex, Id},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub display_order: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryDescription {
    #[serde(with = "id_as_hex")]
    pub id: Id,
    #[serde(with = "id_as_hex")]
    pub instance_id: Id,
    pub name: String,
    pub description: String,
    pub display_order: i32,
}

impl From<Category> for CategoryDescription {
    fn from(category: Category) -> Self {
        Self {
            id: category.id,
            instance_id: category.category.instance_id,
            name: category.category.name,
            description: category.category.description,
            display_order: category.category.display_order,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSpec {
    pub full_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub program_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateDescription {
    #[serde(with = "id_as_hex")]
    pub id: Id,
    #[serde(with = "id_as_hex")]
    pub category_id: Id,
    pub full_name: String,
    pub description: String,
    pub photo_url: Option<String>,
    pub program_url: Option<String>,
}

impl From<Candidate> for CandidateDescription {
    fn from(candidate: Candidate) -> Self {
        Self {
            id: candidate.id,
            category_id: candidate.candidate.category_id,
            full_name: candidate.candidate.full_name,
            description: candidate.candidate.description,
            photo_url: candidate.candidate.photo_url,
            program_url: candidate.candidate.program_url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterSpec {
    pub full_name: String,
    pub email: Email,
}

/// API-friendly view of a voter. Code fields and the credential reference stay private.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterDescription {
    #[serde(with = "id_as_hex")]
    pub id: Id,
    #[serde(with = "id_as_hex")]
    pub instance_id: Id,
    pub full_name: String,
    pub email: Email,
    pub is_registered: bool,
    pub registered_at: Option<DateTime<Utc>>,
}

impl From<Voter> for VoterDescription {
    fn from(voter: Voter) -> Self {
        Self {
            id: voter.id,
            instance_id: voter.voter.instance_id,
            full_name: voter.voter.full_name,
            email: voter.voter.email,
            is_registered: voter.voter.is_registered,
            registered_at: voter.voter.registered_at.map(|at| at.to_chrono()),
        }
    }
}

/// One category of the ballot as a voter sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotCategory {
    #[serde(flatten)]
    pub category: CategoryDescription,
    pub candidates: Vec<CandidateDescription>,
}
