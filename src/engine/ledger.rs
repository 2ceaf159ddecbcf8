//! The vote ledger: one vote per voter per category, ever.

use chrono::{DateTime, Utc};
use mongodb::bson::DateTime as BsonDateTime;

use crate::error::{Error, Result};
use crate::model::{
    db::{NewVote, Vote},
    mongodb::Id,
};
use crate::store::{instance_or_404, Store};

use super::lifecycle::ensure_voting_open;

/// Record a vote for `candidate_id` in `category_id`.
///
/// Every id must belong to `instance_id`, and the instance must be active.
/// A second vote by the same voter in the same category is rejected by the
/// store itself with `AlreadyVoted`, however the requests interleave.
pub async fn cast_vote(
    store: &dyn Store,
    voter_id: Id,
    candidate_id: Id,
    category_id: Id,
    instance_id: Id,
    now: DateTime<Utc>,
) -> Result<Vote> {
    let instance = instance_or_404(store, instance_id).await?;
    ensure_voting_open(instance.status)?;

    let voter = store
        .voter(voter_id)
        .await?
        .ok_or_else(|| Error::not_found(format!("Voter {voter_id}")))?;
    if voter.instance_id != instance_id {
        return Err(Error::InvalidTarget(format!(
            "Voter {voter_id} does not belong to instance {instance_id}"
        )));
    }

    let category = store
        .category(category_id)
        .await?
        .ok_or_else(|| Error::not_found(format!("Category {category_id}")))?;
    if category.instance_id != instance_id {
        return Err(Error::InvalidTarget(format!(
            "Category {category_id} does not belong to instance {instance_id}"
        )));
    }

    let candidate = store
        .candidate(candidate_id)
        .await?
        .ok_or_else(|| Error::not_found(format!("Candidate {candidate_id}")))?;
    if candidate.category_id != category_id {
        return Err(Error::InvalidTarget(format!(
            "Candidate {candidate_id} does not stand in category {category_id}"
        )));
    }

    let vote = NewVote {
        voter_id,
        candidate_id,
        category_id,
        instance_id,
        cast_at: BsonDateTime::from_chrono(now),
    };
    match store.insert_vote(&vote).await {
        Ok(vote) => {
            info!("Recorded vote {} in category {category_id}", vote.id);
            Ok(vote)
        }
        Err(Error::AlreadyVoted) => {
            warn!("Voter {voter_id} tried to vote twice in category {category_id}");
            Err(Error::AlreadyVoted)
        }
        Err(e) => Err(e),
    }
}
