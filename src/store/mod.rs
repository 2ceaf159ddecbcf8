//! Persistence for everything the election engine touches.
//!
//! The [`Store`] trait abstracts over the production MongoDB backend and an
//! in-memory backend used for tests and local development. Every uniqueness
//! rule the engine relies on is enforced *by the store*, atomically, and
//! surfaced as the matching domain error rather than a raw constraint code:
//!
//! - one vote per `(voter, category)` → [`Error::AlreadyVoted`];
//! - one staff account per email, one admin per instance → [`Error::Conflict`];
//! - one voter per `(instance, email)` → [`Error::Conflict`];
//! - one durable credential per email → [`Error::Conflict`].
//!
//! Conditional writes (`transition_instance`, `consume_code`,
//! `reserve_code_send`, `take_credential_secret`) are single atomic
//! compare-and-set operations, so concurrent requests cannot both win.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::error::{Error, Result};
use crate::model::{
    api::{otp::Code, structure::CategorySpec},
    common::{Email, InstanceStatus, Role},
    db::{
        account::hash_password, Account, Candidate, Category, Credential, Instance, NewAccount,
        NewCandidate, NewCategory, NewCredential, NewInstance, NewVote, NewVoter, Vote, Voter,
    },
    mongodb::Id,
};

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// The store as held in Rocket's managed state.
pub type Db = Arc<dyn Store>;

/// Outcome of trying to reserve the right to send a login code to an email.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// The cooldown had elapsed; the send timestamp is now `now`.
    Granted,
    /// A code was sent too recently.
    Throttled { last_sent_at: DateTime<Utc> },
}

#[rocket::async_trait]
pub trait Store: Send + Sync {
    // ─── Instances ──────────────────────────────────────────────────────────

    async fn insert_instance(&self, instance: &NewInstance) -> Result<Instance>;

    async fn instance(&self, id: Id) -> Result<Option<Instance>>;

    async fn instances(&self) -> Result<Vec<Instance>>;

    /// Move an instance from `from` to `to`, only if it is still in `from`.
    /// Returns whether the transition happened.
    async fn transition_instance(
        &self,
        id: Id,
        from: InstanceStatus,
        to: InstanceStatus,
    ) -> Result<bool>;

    /// Delete an instance and everything that belongs to it: categories,
    /// candidates, voters and votes. Observers of the instance are deleted
    /// and its admin is unbound. Returns whether the instance existed.
    async fn delete_instance(&self, id: Id) -> Result<bool>;

    // ─── Staff accounts ─────────────────────────────────────────────────────

    async fn insert_account(&self, account: &NewAccount) -> Result<Account>;

    async fn account(&self, id: Id) -> Result<Option<Account>>;

    async fn account_by_email(&self, email: &Email) -> Result<Option<Account>>;

    async fn accounts(&self) -> Result<Vec<Account>>;

    /// Bind an unbound account to an instance. Fails with `Conflict` if the
    /// account is already bound or the instance already has an admin.
    async fn bind_account(&self, id: Id, instance_id: Id) -> Result<()>;

    async fn delete_account(&self, id: Id) -> Result<bool>;

    // ─── Voters ─────────────────────────────────────────────────────────────

    async fn insert_voter(&self, voter: &NewVoter) -> Result<Voter>;

    async fn voter(&self, id: Id) -> Result<Option<Voter>>;

    /// All voter records with this email, across every instance.
    async fn voters_by_email(&self, email: &Email) -> Result<Vec<Voter>>;

    async fn voters(&self, instance_id: Id) -> Result<Vec<Voter>>;

    /// Delete a voter and their votes. Returns whether the voter existed.
    async fn delete_voter(&self, id: Id) -> Result<bool>;

    async fn count_registered_voters(&self, instance_id: Id) -> Result<u64>;

    // ─── Login codes ────────────────────────────────────────────────────────

    /// Claim the right to send a code to `email`: succeeds only if no code was
    /// sent within `cooldown` before `now`, recording `now` as the new send time.
    async fn reserve_code_send(
        &self,
        email: &Email,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> Result<Reservation>;

    /// Put a code in the voter's single code slot, replacing whatever was there.
    async fn store_code(&self, voter_id: Id, code: Code, expires_at: DateTime<Utc>)
        -> Result<()>;

    /// Clear the voter's code slot, only if it still holds `code`.
    /// Returns whether the slot was cleared.
    async fn consume_code(&self, voter_id: Id, code: Code) -> Result<bool>;

    /// Count a wrong guess against the voter's current code, clearing the slot
    /// once `limit` wrong guesses have been made. Returns whether it was cleared.
    async fn record_code_failure(&self, voter_id: Id, limit: u32) -> Result<bool>;

    /// Point the voter at their durable credential and mark them registered
    /// (stamping `registered_at`) if they were not already.
    async fn link_credential(&self, voter_id: Id, credential_id: Id, now: DateTime<Utc>)
        -> Result<()>;

    // ─── Durable credentials ────────────────────────────────────────────────

    async fn insert_credential(&self, credential: &NewCredential) -> Result<Credential>;

    async fn credential(&self, id: Id) -> Result<Option<Credential>>;

    async fn credential_by_email(&self, email: &Email) -> Result<Option<Credential>>;

    /// Replace the credential's secret digest.
    async fn rotate_credential(&self, id: Id, secret_digest: &str, now: DateTime<Utc>)
        -> Result<()>;

    /// Clear the credential's secret digest, only if it still equals
    /// `secret_digest`. Returns whether it was cleared.
    async fn take_credential_secret(&self, id: Id, secret_digest: &str) -> Result<bool>;

    // ─── Categories and candidates ──────────────────────────────────────────

    async fn insert_category(&self, category: &NewCategory) -> Result<Category>;

    async fn category(&self, id: Id) -> Result<Option<Category>>;

    /// All categories of an instance, in display order.
    async fn categories(&self, instance_id: Id) -> Result<Vec<Category>>;

    async fn update_category(&self, id: Id, spec: &CategorySpec) -> Result<Option<Category>>;

    /// Delete a category, its candidates and their votes.
    async fn delete_category(&self, id: Id) -> Result<bool>;

    async fn insert_candidate(&self, candidate: &NewCandidate) -> Result<Candidate>;

    async fn candidate(&self, id: Id) -> Result<Option<Candidate>>;

    async fn candidates(&self, category_id: Id) -> Result<Vec<Candidate>>;

    /// Delete a candidate and their votes.
    async fn delete_candidate(&self, id: Id) -> Result<bool>;

    // ─── Votes ──────────────────────────────────────────────────────────────

    /// Record a vote. Fails with `AlreadyVoted` if the voter already has a
    /// vote in that category.
    async fn insert_vote(&self, vote: &NewVote) -> Result<Vote>;

    async fn votes_by_voter(&self, voter_id: Id) -> Result<Vec<Vote>>;

    /// Number of votes per candidate in a category. Candidates without votes are absent.
    async fn tally(&self, category_id: Id) -> Result<HashMap<Id, u64>>;

    async fn count_votes(&self, instance_id: Id) -> Result<u64>;

    /// Number of distinct voters with at least one vote in the instance.
    async fn count_participants(&self, instance_id: Id) -> Result<u64>;
}

/// Look up an instance, failing with `NotFound` if it does not exist.
pub async fn instance_or_404(store: &dyn Store, id: Id) -> Result<Instance> {
    store
        .instance(id)
        .await?
        .ok_or_else(|| Error::not_found(format!("Instance {id}")))
}

/// Make sure the bootstrap super admin account exists, creating it with the
/// given password if it does not. An existing account is left untouched.
pub async fn ensure_super_admin_exists(
    store: &dyn Store,
    email: &Email,
    password: &str,
) -> Result<()> {
    match store.account_by_email(email).await? {
        Some(account) if account.role == Role::SuperAdmin => Ok(()),
        Some(account) => {
            warn!("Bootstrap account {email} exists with role {}", account.role);
            Ok(())
        }
        None => {
            let account = NewAccount {
                email: email.clone(),
                password_hash: hash_password(password)?,
                role: Role::SuperAdmin,
                instance_id: None,
            };
            store.insert_account(&account).await?;
            info!("Created super admin account {email}");
            Ok(())
        }
    }
}
