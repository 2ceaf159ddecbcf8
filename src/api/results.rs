use rocket::{serde::json::Json, Route, State};

use crate::{
    engine::{lifecycle::Capabilities, results},
    error::{Error, Result},
    model::{
        api::{
            auth::AuthToken,
            results::{CategoryResults, InstanceStats},
        },
        db::{Account, Voter},
        mongodb::Id,
    },
    store::{instance_or_404, Db, Store},
};

use super::common::{category_or_404, signed_in_account, signed_in_voter, visible_instance};

pub fn routes() -> Vec<Route> {
    routes![
        category_results,
        category_results_for_voter,
        instance_stats,
        instance_stats_for_voter,
    ]
}

/// Voters only see the figures of their own instance, and only once voting is over.
async fn ensure_voter_may_read(store: &dyn Store, voter: &Voter, instance_id: Id) -> Result<()> {
    if voter.instance_id != instance_id {
        return Err(Error::Forbidden(format!("No access to instance {instance_id}")));
    }
    let instance = instance_or_404(store, instance_id).await?;
    if Capabilities::for_status(instance.status).voters_see_results {
        Ok(())
    } else {
        Err(Error::Forbidden(
            "Results are published once voting has ended".to_string(),
        ))
    }
}

#[get("/categories/<category_id>/results")]
async fn category_results(
    token: AuthToken<Account>,
    category_id: Id,
    store: &State<Db>,
) -> Result<Json<CategoryResults>> {
    let account = signed_in_account(&***store, &token).await?;
    let category = category_or_404(&***store, category_id).await?;
    visible_instance(&***store, &account, category.instance_id).await?;

    Ok(Json(results::category_results(&***store, category_id).await?))
}

#[get("/categories/<category_id>/results", rank = 2)]
async fn category_results_for_voter(
    token: AuthToken<Voter>,
    category_id: Id,
    store: &State<Db>,
) -> Result<Json<CategoryResults>> {
    let voter = signed_in_voter(&***store, &token).await?;
    let category = category_or_404(&***store, category_id).await?;
    ensure_voter_may_read(&***store, &voter, category.instance_id).await?;

    Ok(Json(results::category_results(&***store, category_id).await?))
}

#[get("/instances/<instance_id>/stats")]
async fn instance_stats(
    token: AuthToken<Account>,
    instance_id: Id,
    store: &State<Db>,
) -> Result<Json<InstanceStats>> {
    let account = signed_in_account(&***store, &token).await?;
    visible_instance(&***store, &account, instance_id).await?;

    Ok(Json(results::instance_stats(&***store, instance_id).await?))
}

#[get("/instances/<instance_id>/stats", rank = 2)]
async fn instance_stats_for_voter(
    token: AuthToken<Voter>,
    instance_id: Id,
    store: &State<Db>,
) -> Result<Json<InstanceStats>> {
    let voter = signed_in_voter(&***store, &token).await?;
    ensure_voter_may_read(&***store, &voter, instance_id).await?;

    Ok(Json(results::instance_stats(&***store, instance_id).await?))
}

#[cfg(test)]
mod tests {
    use rocket::{
        http::{ContentType, Status},
        local::asynchronous::Client,
        serde::json::serde_json::json,
    };

    use super::*;
    use crate::api::testing::sign_in_voter;
    use crate::engine::ledger::tests::Ballot;
    use crate::model::{
        api::{auth::StaffCredentials, results::CastVote},
        common::InstanceStatus,
        db::{NewAccount, NewInstance},
    };
    use crate::notifier::testing::Captured;

    #[backend_test(admin)]
    async fn staff_see_live_results(client: Client, store: Db) {
        let ballot = Ballot::build(&*store, InstanceStatus::Active).await;
        ballot.cast(&*store, &ballot.c2).await.unwrap();

        let response = client
            .get(uri!(category_results(ballot.category.id)))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let results = response.into_json::<CategoryResults>().await.unwrap();
        assert_eq!(results.total_votes, 1);
        assert_eq!(results.candidates.len(), 2);
        assert_eq!(results.candidates[0].votes, 0);
        assert_eq!(results.candidates[1].votes, 1);
        assert_eq!(results.candidates[1].percentage, 100.0);

        let response = client
            .get(uri!(instance_stats(ballot.instance.id)))
            .dispatch()
            .await;
        let stats = response.into_json::<InstanceStats>().await.unwrap();
        assert_eq!(stats.votes_cast, 1);
        assert_eq!(stats.voters_participated, 1);
        assert_eq!(stats.categories_count, 1);

        let response = client
            .get(uri!(category_results(Id::new())))
            .dispatch()
            .await;
        assert_eq!(Status::NotFound, response.status());
    }

    #[backend_test]
    async fn observers_of_other_instances_see_nothing(client: Client, store: Db) {
        let ballot = Ballot::build(&*store, InstanceStatus::Active).await;
        let other = store.insert_instance(&NewInstance::example()).await.unwrap();
        store
            .insert_account(&NewAccount::example_observer(other.id))
            .await
            .unwrap();
        client
            .post(uri!(crate::api::auth::staff_sign_in))
            .header(ContentType::JSON)
            .body(json!(StaffCredentials::example("observer@x.com")).to_string())
            .dispatch()
            .await;

        let response = client
            .get(uri!(category_results(ballot.category.id)))
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());
        let response = client
            .get(uri!(instance_stats(ballot.instance.id)))
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());
    }

    #[backend_test]
    async fn voters_wait_for_the_end(client: Client, store: Db, notifier: Captured) {
        let ballot = Ballot::build(&*store, InstanceStatus::Active).await;
        sign_in_voter(&client, &notifier, &ballot.voter.email).await;
        let vote = CastVote {
            category_id: ballot.category.id,
            candidate_id: ballot.c1.id,
        };
        client
            .post(uri!(crate::api::voting::cast_vote))
            .header(ContentType::JSON)
            .body(json!(vote).to_string())
            .dispatch()
            .await;

        let response = client
            .get(uri!(category_results(ballot.category.id)))
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());

        store
            .transition_instance(
                ballot.instance.id,
                InstanceStatus::Active,
                InstanceStatus::Completed,
            )
            .await
            .unwrap();

        let response = client
            .get(uri!(category_results(ballot.category.id)))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let results = response.into_json::<CategoryResults>().await.unwrap();
        assert_eq!(results.total_votes, 1);

        let response = client
            .get(uri!(instance_stats(ballot.instance.id)))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let stats = response.into_json::<InstanceStats>().await.unwrap();
        assert_eq!(stats.registered_voters, 1);
        assert_eq!(stats.participation_rate, 100.0);
    }
}
