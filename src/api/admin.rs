use rocket::{serde::json::Json, Route, State};

use crate::{
    engine::lifecycle::{self, Action, Capabilities},
    error::{Error, Result},
    model::{
        api::{
            admin::{AccountDescription, AccountSpec},
            auth::AuthToken,
            instance::{InstanceDescription, InstanceSpec},
        },
        common::Role,
        db::{Account, NewAccount, NewInstance},
        mongodb::Id,
    },
    store::{instance_or_404, Db},
};

use super::common::{
    ensure_super_admin, managed_instance, signed_in_account, visible_instance,
};

pub fn routes() -> Vec<Route> {
    routes![
        get_accounts,
        create_account,
        delete_account,
        create_instance,
        get_instances,
        get_instance,
        get_capabilities,
        transition_instance,
        delete_instance,
    ]
}

#[get("/accounts")]
async fn get_accounts(
    token: AuthToken<Account>,
    store: &State<Db>,
) -> Result<Json<Vec<AccountDescription>>> {
    let account = signed_in_account(&***store, &token).await?;
    ensure_super_admin(&account)?;

    let accounts = store
        .accounts()
        .await?
        .into_iter()
        .map(AccountDescription::from)
        .collect();
    Ok(Json(accounts))
}

#[post("/accounts", data = "<spec>", format = "json")]
async fn create_account(
    token: AuthToken<Account>,
    spec: Json<AccountSpec>,
    store: &State<Db>,
) -> Result<Json<AccountDescription>> {
    let account = signed_in_account(&***store, &token).await?;
    ensure_super_admin(&account)?;

    let new_account = NewAccount::try_from(spec.into_inner()).map_err(Error::BadRequest)?;
    if let Some(instance_id) = new_account.instance_id {
        instance_or_404(&***store, instance_id).await?;
    }
    let created = store.insert_account(&new_account).await?;
    info!("Created {} account {}", created.role, created.email);
    Ok(Json(created.into()))
}

#[delete("/accounts/<account_id>")]
async fn delete_account(
    token: AuthToken<Account>,
    account_id: Id,
    store: &State<Db>,
) -> Result<()> {
    let account = signed_in_account(&***store, &token).await?;
    ensure_super_admin(&account)?;
    if account.id == account_id {
        return Err(Error::BadRequest("Cannot delete your own account".to_string()));
    }

    if store.delete_account(account_id).await? {
        Ok(())
    } else {
        Err(Error::not_found(format!("Account {account_id}")))
    }
}

/// Super admins may create any number of instances. An admin without an
/// instance may create exactly one, which becomes theirs.
#[post("/instances", data = "<spec>", format = "json")]
async fn create_instance(
    token: AuthToken<Account>,
    spec: Json<InstanceSpec>,
    store: &State<Db>,
) -> Result<Json<InstanceDescription>> {
    let account = signed_in_account(&***store, &token).await?;
    if spec.name.trim().is_empty() {
        return Err(Error::BadRequest("Instance name cannot be empty".to_string()));
    }

    match (account.role, account.instance_id) {
        (Role::SuperAdmin, _) => {}
        (Role::Admin, None) => {}
        (Role::Admin, Some(instance_id)) => {
            return Err(Error::Conflict(format!(
                "Admin already manages instance {instance_id}"
            )))
        }
        (Role::Observer, _) => {
            return Err(Error::Forbidden("Observers cannot create instances".to_string()))
        }
    }

    let instance = store
        .insert_instance(&NewInstance::from(spec.into_inner()))
        .await?;
    if account.role == Role::Admin {
        if let Err(e) = store.bind_account(account.id, instance.id).await {
            // Do not leave an instance nobody manages.
            store.delete_instance(instance.id).await?;
            return Err(e);
        }
    }
    info!("Account {} created instance {}", account.id, instance.id);
    Ok(Json(instance.into()))
}

#[get("/instances")]
async fn get_instances(
    token: AuthToken<Account>,
    store: &State<Db>,
) -> Result<Json<Vec<InstanceDescription>>> {
    let account = signed_in_account(&***store, &token).await?;

    let instances = match (account.role, account.instance_id) {
        (Role::SuperAdmin, _) => store.instances().await?,
        (_, Some(instance_id)) => store.instance(instance_id).await?.into_iter().collect(),
        (_, None) => Vec::new(),
    };
    Ok(Json(instances.into_iter().map(Into::into).collect()))
}

#[get("/instances/<instance_id>")]
async fn get_instance(
    token: AuthToken<Account>,
    instance_id: Id,
    store: &State<Db>,
) -> Result<Json<InstanceDescription>> {
    let account = signed_in_account(&***store, &token).await?;
    let instance = visible_instance(&***store, &account, instance_id).await?;
    Ok(Json(instance.into()))
}

#[get("/instances/<instance_id>/capabilities")]
async fn get_capabilities(
    token: AuthToken<Account>,
    instance_id: Id,
    store: &State<Db>,
) -> Result<Json<Capabilities>> {
    let account = signed_in_account(&***store, &token).await?;
    let instance = visible_instance(&***store, &account, instance_id).await?;
    Ok(Json(Capabilities::for_status(instance.status)))
}

// Ranked below the static `/instances/<id>/...` collection routes.
#[post("/instances/<instance_id>/<action>", rank = 2)]
async fn transition_instance(
    token: AuthToken<Account>,
    instance_id: Id,
    action: Action,
    store: &State<Db>,
) -> Result<Json<InstanceDescription>> {
    let account = signed_in_account(&***store, &token).await?;
    managed_instance(&***store, &account, instance_id).await?;
    let instance = lifecycle::transition(&***store, instance_id, action).await?;
    Ok(Json(instance.into()))
}

#[delete("/instances/<instance_id>")]
async fn delete_instance(
    token: AuthToken<Account>,
    instance_id: Id,
    store: &State<Db>,
) -> Result<()> {
    let account = signed_in_account(&***store, &token).await?;
    let instance = managed_instance(&***store, &account, instance_id).await?;
    lifecycle::ensure_deletable(instance.status)?;

    if store.delete_instance(instance_id).await? {
        info!("Deleted instance {instance_id} and everything in it");
        Ok(())
    } else {
        Err(Error::not_found(format!("Instance {instance_id}")))
    }
}

#[cfg(test)]
mod tests {
    use rocket::{
        http::{ContentType, Status},
        local::asynchronous::Client,
        serde::json::{serde_json::json, Value},
    };

    use super::*;
    use crate::model::{
        api::auth::{StaffCredentials, AUTH_TOKEN_COOKIE},
        common::InstanceStatus,
        db::{NewVoter, Voter},
    };

    async fn sign_in(client: &Client, email: &str) {
        let response = client
            .post(uri!(crate::api::auth::staff_sign_in))
            .header(ContentType::JSON)
            .body(json!(StaffCredentials::example(email)).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
    }

    async fn create(client: &Client) -> InstanceDescription {
        let response = client
            .post(uri!(create_instance))
            .header(ContentType::JSON)
            .body(json!(InstanceSpec::example()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        response.into_json().await.unwrap()
    }

    async fn act(client: &Client, instance_id: Id, action: Action) -> Status {
        client
            .post(uri!(transition_instance(instance_id, action)))
            .dispatch()
            .await
            .status()
    }

    #[backend_test(admin)]
    async fn manage_accounts(client: Client) {
        let spec = AccountSpec::example("admin@x.com", Role::Admin, None);
        let response = client
            .post(uri!(create_account))
            .header(ContentType::JSON)
            .body(json!(spec).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let created = response.into_json::<AccountDescription>().await.unwrap();
        assert_eq!(created.role, Role::Admin);

        // Emails are unique.
        let response = client
            .post(uri!(create_account))
            .header(ContentType::JSON)
            .body(json!(spec).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Conflict, response.status());

        let response = client.get(uri!(get_accounts)).dispatch().await;
        let accounts = response
            .into_json::<Vec<AccountDescription>>()
            .await
            .unwrap();
        assert_eq!(accounts.len(), 2);

        let response = client
            .delete(uri!(delete_account(created.id)))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let response = client
            .delete(uri!(delete_account(created.id)))
            .dispatch()
            .await;
        assert_eq!(Status::NotFound, response.status());
    }

    #[backend_test(admin)]
    async fn invalid_account_specs(client: Client) {
        let response = client
            .post(uri!(create_account))
            .header(ContentType::JSON)
            .body(json!(AccountSpec::example("o@x.com", Role::Observer, None)).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());

        let spec = AccountSpec::example("o@x.com", Role::Observer, Some(Id::new()));
        let response = client
            .post(uri!(create_account))
            .header(ContentType::JSON)
            .body(json!(spec).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::NotFound, response.status());
    }

    #[backend_test]
    async fn accounts_need_super_admin(client: Client, store: Db) {
        let response = client.get(uri!(get_accounts)).dispatch().await;
        assert_eq!(Status::Unauthorized, response.status());

        store
            .insert_account(&NewAccount::example_admin(None))
            .await
            .unwrap();
        sign_in(&client, "admin@x.com").await;
        let response = client.get(uri!(get_accounts)).dispatch().await;
        assert_eq!(Status::Forbidden, response.status());
    }

    #[backend_test]
    async fn self_service_instance(client: Client, store: Db) {
        store
            .insert_account(&NewAccount::example_admin(None))
            .await
            .unwrap();
        sign_in(&client, "admin@x.com").await;

        let instance = create(&client).await;
        assert_eq!(instance.status, InstanceStatus::Draft);
        assert!(instance.capabilities.can_edit_voters);
        let admin = store
            .account_by_email(&"admin@x.com".parse().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(admin.instance_id, Some(instance.id));

        // Only one.
        let response = client
            .post(uri!(create_instance))
            .header(ContentType::JSON)
            .body(json!(InstanceSpec::example()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Conflict, response.status());
        assert_eq!(store.instances().await.unwrap().len(), 1);

        let response = client.get(uri!(get_instances)).dispatch().await;
        let listed = response
            .into_json::<Vec<InstanceDescription>>()
            .await
            .unwrap();
        assert_eq!(listed, vec![instance]);
    }

    #[backend_test]
    async fn observers_are_read_only(client: Client, store: Db) {
        let instance = store.insert_instance(&NewInstance::example()).await.unwrap();
        let other = store.insert_instance(&NewInstance::example()).await.unwrap();
        store
            .insert_account(&NewAccount::example_observer(instance.id))
            .await
            .unwrap();
        sign_in(&client, "observer@x.com").await;

        let response = client.get(uri!(get_instance(instance.id))).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let response = client.get(uri!(get_instance(other.id))).dispatch().await;
        assert_eq!(Status::Forbidden, response.status());

        assert_eq!(Status::Forbidden, act(&client, instance.id, Action::Start).await);
        let response = client
            .post(uri!(create_instance))
            .header(ContentType::JSON)
            .body(json!(InstanceSpec::example()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());
    }

    #[backend_test(admin)]
    async fn lifecycle_over_http(client: Client) {
        let instance = create(&client).await;

        assert_eq!(Status::Ok, act(&client, instance.id, Action::Start).await);
        let response = client
            .post(uri!(transition_instance(instance.id, Action::Start)))
            .dispatch()
            .await;
        assert_eq!(Status::Conflict, response.status());
        let body = response.into_json::<Value>().await.unwrap();
        assert_eq!(body["error"], "illegal_transition");

        assert_eq!(Status::Ok, act(&client, instance.id, Action::Pause).await);
        assert_eq!(Status::Ok, act(&client, instance.id, Action::Resume).await);

        let response = client
            .get(uri!(get_capabilities(instance.id)))
            .dispatch()
            .await;
        let capabilities = response.into_json::<Capabilities>().await.unwrap();
        assert_eq!(capabilities, Capabilities::for_status(InstanceStatus::Active));

        let response = client
            .post(format!("/instances/{}/restart", instance.id))
            .dispatch()
            .await;
        assert_eq!(Status::UnprocessableEntity, response.status());
    }

    #[backend_test(admin)]
    async fn delete_only_when_settled(client: Client, store: Db) {
        let instance = create(&client).await;
        let voter: Voter = store
            .insert_voter(&NewVoter::example(instance.id))
            .await
            .unwrap();
        act(&client, instance.id, Action::Start).await;

        let response = client
            .delete(uri!(delete_instance(instance.id)))
            .dispatch()
            .await;
        assert_eq!(Status::Conflict, response.status());

        act(&client, instance.id, Action::End).await;
        act(&client, instance.id, Action::Archive).await;
        let response = client
            .delete(uri!(delete_instance(instance.id)))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        assert!(store.instance(instance.id).await.unwrap().is_none());
        assert!(store.voter(voter.id).await.unwrap().is_none());

        // The session survives the instance.
        assert!(client.cookies().get(AUTH_TOKEN_COOKIE).is_some());
        let response = client.get(uri!(get_instance(instance.id))).dispatch().await;
        assert_eq!(Status::NotFound, response.status());
    }
}
