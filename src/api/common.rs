//! Access checks shared by the route handlers.

use crate::error::{Error, Result};
use crate::model::{
    api::auth::AuthToken,
    common::Role,
    db::{Account, Category, Instance, Voter},
    mongodb::Id,
};
use crate::store::{instance_or_404, Store};

/// The staff account behind a session.
pub async fn signed_in_account(store: &dyn Store, token: &AuthToken<Account>) -> Result<Account> {
    store
        .account(token.id)
        .await?
        .ok_or_else(|| Error::Unauthorized("Account no longer exists".to_string()))
}

/// The voter behind a session.
pub async fn signed_in_voter(store: &dyn Store, token: &AuthToken<Voter>) -> Result<Voter> {
    store
        .voter(token.id)
        .await?
        .ok_or_else(|| Error::Unauthorized("Voter no longer exists".to_string()))
}

pub fn ensure_super_admin(account: &Account) -> Result<()> {
    if account.role == Role::SuperAdmin {
        Ok(())
    } else {
        Err(Error::Forbidden("Super admin only".to_string()))
    }
}

/// Load an instance the account may read.
pub async fn visible_instance(store: &dyn Store, account: &Account, id: Id) -> Result<Instance> {
    if !account.can_see(id) {
        return Err(Error::Forbidden(format!("No access to instance {id}")));
    }
    instance_or_404(store, id).await
}

/// Load an instance the account may change.
pub async fn managed_instance(store: &dyn Store, account: &Account, id: Id) -> Result<Instance> {
    if !account.can_manage(id) {
        return Err(Error::Forbidden(format!("Cannot manage instance {id}")));
    }
    instance_or_404(store, id).await
}

pub async fn category_or_404(store: &dyn Store, category_id: Id) -> Result<Category> {
    store
        .category(category_id)
        .await?
        .ok_or_else(|| Error::not_found(format!("Category {category_id}")))
}
