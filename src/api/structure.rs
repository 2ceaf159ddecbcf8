use rocket::{serde::json::Json, Route, State};

use crate::{
    engine::lifecycle::{ensure_structure_editable, ensure_voters_editable},
    error::{Error, Result},
    model::{
        api::{
            auth::AuthToken,
            pagination::{Paginated, PaginationRequest},
            structure::{
                CandidateDescription, CandidateSpec, CategoryDescription, CategorySpec,
                VoterDescription, VoterSpec,
            },
        },
        db::{Account, Category, NewCandidate, NewCategory, NewVoter},
        mongodb::Id,
    },
    store::{Db, Store},
};

use super::common::{category_or_404, managed_instance, signed_in_account, visible_instance};

pub fn routes() -> Vec<Route> {
    routes![
        get_categories,
        create_category,
        update_category,
        delete_category,
        get_candidates,
        create_candidate,
        delete_candidate,
        get_voters,
        create_voter,
        delete_voter,
    ]
}

fn non_empty(what: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(Error::BadRequest(format!("{what} cannot be empty")))
    } else {
        Ok(())
    }
}

/// Load a category whose instance the account may change, and check the
/// instance's ballot is still open for editing.
async fn editable_category(
    store: &dyn Store,
    account: &Account,
    category_id: Id,
) -> Result<Category> {
    let category = category_or_404(store, category_id).await?;
    let instance = managed_instance(store, account, category.instance_id).await?;
    ensure_structure_editable(instance.status)?;
    Ok(category)
}

#[get("/instances/<instance_id>/categories")]
async fn get_categories(
    token: AuthToken<Account>,
    instance_id: Id,
    store: &State<Db>,
) -> Result<Json<Vec<CategoryDescription>>> {
    let account = signed_in_account(&***store, &token).await?;
    visible_instance(&***store, &account, instance_id).await?;

    let categories = store.categories(instance_id).await?;
    Ok(Json(categories.into_iter().map(Into::into).collect()))
}

#[post("/instances/<instance_id>/categories", data = "<spec>", format = "json")]
async fn create_category(
    token: AuthToken<Account>,
    instance_id: Id,
    spec: Json<CategorySpec>,
    store: &State<Db>,
) -> Result<Json<CategoryDescription>> {
    let account = signed_in_account(&***store, &token).await?;
    let instance = managed_instance(&***store, &account, instance_id).await?;
    ensure_structure_editable(instance.status)?;
    non_empty("Category name", &spec.name)?;

    let spec = spec.into_inner();
    let category = NewCategory {
        instance_id,
        name: spec.name,
        description: spec.description,
        display_order: spec.display_order,
    };
    let category = store.insert_category(&category).await?;
    Ok(Json(category.into()))
}

#[put("/categories/<category_id>", data = "<spec>", format = "json")]
async fn update_category(
    token: AuthToken<Account>,
    category_id: Id,
    spec: Json<CategorySpec>,
    store: &State<Db>,
) -> Result<Json<CategoryDescription>> {
    let account = signed_in_account(&***store, &token).await?;
    editable_category(&***store, &account, category_id).await?;
    non_empty("Category name", &spec.name)?;

    let category = store
        .update_category(category_id, &spec)
        .await?
        .ok_or_else(|| Error::not_found(format!("Category {category_id}")))?;
    Ok(Json(category.into()))
}

#[delete("/categories/<category_id>")]
async fn delete_category(
    token: AuthToken<Account>,
    category_id: Id,
    store: &State<Db>,
) -> Result<()> {
    let account = signed_in_account(&***store, &token).await?;
    editable_category(&***store, &account, category_id).await?;

    if store.delete_category(category_id).await? {
        Ok(())
    } else {
        Err(Error::not_found(format!("Category {category_id}")))
    }
}

#[get("/categories/<category_id>/candidates")]
async fn get_candidates(
    token: AuthToken<Account>,
    category_id: Id,
    store: &State<Db>,
) -> Result<Json<Vec<CandidateDescription>>> {
    let account = signed_in_account(&***store, &token).await?;
    let category = category_or_404(&***store, category_id).await?;
    visible_instance(&***store, &account, category.instance_id).await?;

    let candidates = store.candidates(category_id).await?;
    Ok(Json(candidates.into_iter().map(Into::into).collect()))
}

#[post("/categories/<category_id>/candidates", data = "<spec>", format = "json")]
async fn create_candidate(
    token: AuthToken<Account>,
    category_id: Id,
    spec: Json<CandidateSpec>,
    store: &State<Db>,
) -> Result<Json<CandidateDescription>> {
    let account = signed_in_account(&***store, &token).await?;
    let category = editable_category(&***store, &account, category_id).await?;
    non_empty("Candidate name", &spec.full_name)?;

    let spec = spec.into_inner();
    let candidate = NewCandidate {
        category_id,
        instance_id: category.instance_id,
        full_name: spec.full_name,
        description: spec.description,
        photo_url: spec.photo_url,
        program_url: spec.program_url,
    };
    let candidate = store.insert_candidate(&candidate).await?;
    Ok(Json(candidate.into()))
}

#[delete("/candidates/<candidate_id>")]
async fn delete_candidate(
    token: AuthToken<Account>,
    candidate_id: Id,
    store: &State<Db>,
) -> Result<()> {
    let account = signed_in_account(&***store, &token).await?;
    let candidate = store
        .candidate(candidate_id)
        .await?
        .ok_or_else(|| Error::not_found(format!("Candidate {candidate_id}")))?;
    editable_category(&***store, &account, candidate.category_id).await?;

    if store.delete_candidate(candidate_id).await? {
        Ok(())
    } else {
        Err(Error::not_found(format!("Candidate {candidate_id}")))
    }
}

#[get("/instances/<instance_id>/voters")]
async fn get_voters(
    token: AuthToken<Account>,
    instance_id: Id,
    pagination: PaginationRequest,
    store: &State<Db>,
) -> Result<Json<Paginated<VoterDescription>>> {
    let account = signed_in_account(&***store, &token).await?;
    visible_instance(&***store, &account, instance_id).await?;

    let voters = store
        .voters(instance_id)
        .await?
        .into_iter()
        .map(VoterDescription::from)
        .collect();
    Ok(Json(pagination.paginate(voters)))
}

#[post("/instances/<instance_id>/voters", data = "<spec>", format = "json")]
async fn create_voter(
    token: AuthToken<Account>,
    instance_id: Id,
    spec: Json<VoterSpec>,
    store: &State<Db>,
) -> Result<Json<VoterDescription>> {
    let account = signed_in_account(&***store, &token).await?;
    let instance = managed_instance(&***store, &account, instance_id).await?;
    ensure_voters_editable(instance.status)?;
    non_empty("Voter name", &spec.full_name)?;

    let spec = spec.into_inner();
    let voter = store
        .insert_voter(&NewVoter::new(instance_id, spec.full_name, spec.email))
        .await?;
    Ok(Json(voter.into()))
}

#[delete("/voters/<voter_id>")]
async fn delete_voter(token: AuthToken<Account>, voter_id: Id, store: &State<Db>) -> Result<()> {
    let account = signed_in_account(&***store, &token).await?;
    let voter = store
        .voter(voter_id)
        .await?
        .ok_or_else(|| Error::not_found(format!("Voter {voter_id}")))?;
    let instance = managed_instance(&***store, &account, voter.instance_id).await?;
    ensure_voters_editable(instance.status)?;

    if store.delete_voter(voter_id).await? {
        Ok(())
    } else {
        Err(Error::not_found(format!("Voter {voter_id}")))
    }
}
