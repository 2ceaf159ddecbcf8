//! Read-only tallies and participation figures.

use crate::error::{Error, Result};
use crate::model::{
    api::results::{CandidateTally, CategoryResults, InstanceStats},
    mongodb::Id,
};
use crate::store::{instance_or_404, Store};

/// `part / whole` in percent, or zero when `whole` is zero.
fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Every candidate of a category with their vote count and share.
/// Candidates are listed in the order they were added.
pub async fn category_results(store: &dyn Store, category_id: Id) -> Result<CategoryResults> {
    let category = store
        .category(category_id)
        .await?
        .ok_or_else(|| Error::not_found(format!("Category {category_id}")))?;
    let candidates = store.candidates(category_id).await?;
    let tally = store.tally(category_id).await?;

    let total_votes = tally.values().sum();
    let candidates = candidates
        .into_iter()
        .map(|candidate| {
            let votes = tally.get(&candidate.id).copied().unwrap_or(0);
            CandidateTally {
                candidate_id: candidate.id,
                full_name: candidate.candidate.full_name,
                votes,
                percentage: percentage(votes, total_votes),
            }
        })
        .collect();

    Ok(CategoryResults {
        category_id,
        name: category.category.name,
        total_votes,
        candidates,
    })
}

/// Participation across a whole instance.
pub async fn instance_stats(store: &dyn Store, instance_id: Id) -> Result<InstanceStats> {
    instance_or_404(store, instance_id).await?;

    let registered_voters = store.count_registered_voters(instance_id).await?;
    let votes_cast = store.count_votes(instance_id).await?;
    let voters_participated = store.count_participants(instance_id).await?;
    let categories_count = store.categories(instance_id).await?.len() as u64;

    Ok(InstanceStats {
        instance_id,
        registered_voters,
        votes_cast,
        voters_participated,
        participation_rate: percentage(voters_participated, registered_voters),
        categories_count,
    })
}
