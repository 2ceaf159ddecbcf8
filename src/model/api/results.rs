use serde::{Deserialize, Serialize};

use crate::model::mongodb::{id_as_hex, Id};

/// One candidate's standing within a category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateTally {
    #[serde(with = "id_as_hex")]
    pub candidate_id: Id,
    pub full_name: String,
    pub votes: u64,
    /// Share of the category's votes, in percent. Zero when nobody has voted.
    pub percentage: f64,
}

/// Live tally of one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryResults {
    #[serde(with = "id_as_hex")]
    pub category_id: Id,
    pub name: String,
    pub total_votes: u64,
    pub candidates: Vec<CandidateTally>,
}

/// Participation figures for a whole instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceStats {
    #[serde(with = "id_as_hex")]
    pub instance_id: Id,
    pub registered_voters: u64,
    /// Total vote rows across all categories.
    pub votes_cast: u64,
    /// Distinct voters who cast at least one vote.
    pub voters_participated: u64,
    /// `voters_participated / registered_voters` in percent. Zero without registered voters.
    pub participation_rate: f64,
    pub categories_count: u64,
}

/// A vote as shown back to the voter who cast it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastVote {
    #[serde(with = "id_as_hex")]
    pub category_id: Id,
    #[serde(with = "id_as_hex")]
    pub candidate_id: Id,
}

impl From<crate::model::db::Vote> for CastVote {
    fn from(vote: crate::model::db::Vote) -> Self {
        Self {
            category_id: vote.vote.category_id,
            candidate_id: vote.vote.candidate_id,
        }
    }
}
