use chrono::Utc;
use rocket::{serde::json::Json, Route, State};

use crate::{
    engine::ledger,
    error::Result,
    model::{
        api::{
            auth::AuthToken,
            results::CastVote,
            structure::{BallotCategory, CandidateDescription},
        },
        db::Voter,
    },
    store::Db,
};

use super::common::signed_in_voter;

pub fn routes() -> Vec<Route> {
    routes![get_ballot, cast_vote, get_votes]
}

/// Every category of the voter's instance with its candidates.
#[get("/voter/ballot")]
async fn get_ballot(token: AuthToken<Voter>, store: &State<Db>) -> Result<Json<Vec<BallotCategory>>> {
    let voter = signed_in_voter(&***store, &token).await?;

    let mut ballot = Vec::new();
    for category in store.categories(voter.instance_id).await? {
        let candidates = store
            .candidates(category.id)
            .await?
            .into_iter()
            .map(CandidateDescription::from)
            .collect();
        ballot.push(BallotCategory {
            category: category.into(),
            candidates,
        });
    }
    Ok(Json(ballot))
}

#[post("/voter/votes", data = "<choice>", format = "json")]
pub async fn cast_vote(
    token: AuthToken<Voter>,
    choice: Json<CastVote>,
    store: &State<Db>,
) -> Result<Json<CastVote>> {
    let voter = signed_in_voter(&***store, &token).await?;
    let vote = ledger::cast_vote(
        &***store,
        voter.id,
        choice.candidate_id,
        choice.category_id,
        voter.instance_id,
        Utc::now(),
    )
    .await?;
    Ok(Json(vote.into()))
}

/// The categories the voter has already voted in, and for whom.
#[get("/voter/votes")]
async fn get_votes(token: AuthToken<Voter>, store: &State<Db>) -> Result<Json<Vec<CastVote>>> {
    let voter = signed_in_voter(&***store, &token).await?;
    let votes = store
        .votes_by_voter(voter.id)
        .await?
        .into_iter()
        .map(CastVote::from)
        .collect();
    Ok(Json(votes))
}
