use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use mongodb::{
    bson::{doc, DateTime as BsonDateTime, Document},
    error::Error as DbError,
    options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument, UpdateOptions},
    Database,
};
use rocket::futures::TryStreamExt;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::model::{
    api::{otp::Code, structure::CategorySpec},
    common::{Email, InstanceStatus, Role},
    db::{
        Account, Candidate, Category, CodeRequest, Credential, Instance, NewAccount,
        NewCandidate, NewCategory, NewCredential, NewInstance, NewVote, NewVoter, Vote, Voter,
    },
    mongodb::{
        duplicate_key_index, is_duplicate_key_error, Coll, Id, ACCOUNT_EMAIL_INDEX,
    },
};

use super::{Reservation, Store};

/// The production store, backed by a MongoDB database.
///
/// Uniqueness rests on the indexes created by
/// [`crate::model::mongodb::ensure_indexes_exist`]; duplicate-key errors are
/// translated into domain errors here.
pub struct MongoStore {
    instances: Coll<Instance>,
    accounts: Coll<Account>,
    voters: Coll<Voter>,
    credentials: Coll<Credential>,
    code_requests: Coll<CodeRequest>,
    categories: Coll<Category>,
    candidates: Coll<Candidate>,
    votes: Coll<Vote>,
}

impl MongoStore {
    pub fn new(db: &Database) -> Self {
        Self {
            instances: Coll::from_db(db),
            accounts: Coll::from_db(db),
            voters: Coll::from_db(db),
            credentials: Coll::from_db(db),
            code_requests: Coll::from_db(db),
            categories: Coll::from_db(db),
            candidates: Coll::from_db(db),
            votes: Coll::from_db(db),
        }
    }
}

#[cfg(test)]
impl MongoStore {
    /// A store over a fresh, uniquely named database on the `db_uri` server,
    /// with every index in place. The caller drops the database.
    pub(crate) async fn for_test() -> (Self, Database) {
        let db_uri = rocket::Config::figment()
            .extract_inner::<String>("db_uri")
            .expect("`db_uri` not set");
        let client = mongodb::Client::with_uri_str(&db_uri)
            .await
            .expect("Could not connect to database");
        let db = client.database(&format!("ballotbox_test_{}", Id::new()));
        crate::model::mongodb::ensure_indexes_exist(&db)
            .await
            .unwrap();
        (Self::new(&db), db)
    }
}

/// Turn a duplicate-key error on the accounts collection into a conflict
/// naming the rule that was broken.
fn account_conflict(err: DbError, email: &Email) -> Error {
    if !is_duplicate_key_error(&err) {
        return err.into();
    }
    match duplicate_key_index(&err) {
        Some(index) if index == ACCOUNT_EMAIL_INDEX => {
            Error::Conflict(format!("An account with email {email} already exists"))
        }
        _ => Error::Conflict("The instance already has an admin".to_string()),
    }
}

/// One row of the per-candidate tally aggregation.
#[derive(Deserialize)]
struct TallyRow {
    #[serde(rename = "_id")]
    candidate_id: Id,
    count: u64,
}

#[rocket::async_trait]
impl Store for MongoStore {
    async fn insert_instance(&self, instance: &NewInstance) -> Result<Instance> {
        let instance = Instance {
            id: Id::new(),
            instance: instance.clone(),
        };
        self.instances.insert_one(&instance, None).await?;
        Ok(instance)
    }

    async fn instance(&self, id: Id) -> Result<Option<Instance>> {
        Ok(self.instances.find_one(id.as_doc(), None).await?)
    }

    async fn instances(&self) -> Result<Vec<Instance>> {
        Ok(self.instances.find(None, None).await?.try_collect().await?)
    }

    async fn transition_instance(
        &self,
        id: Id,
        from: InstanceStatus,
        to: InstanceStatus,
    ) -> Result<bool> {
        let filter = doc! {
            "_id": id,
            "status": from,
        };
        let update = doc! {
            "$set": { "status": to },
        };
        let result = self.instances.update_one(filter, update, None).await?;
        Ok(result.modified_count == 1)
    }

    async fn delete_instance(&self, id: Id) -> Result<bool> {
        let result = self.instances.delete_one(id.as_doc(), None).await?;
        if result.deleted_count == 0 {
            return Ok(false);
        }

        let owned = doc! { "instance_id": id };
        self.votes.delete_many(owned.clone(), None).await?;
        self.candidates.delete_many(owned.clone(), None).await?;
        self.categories.delete_many(owned.clone(), None).await?;
        self.voters.delete_many(owned.clone(), None).await?;

        let observers = doc! {
            "role": Role::Observer,
            "instance_id": id,
        };
        self.accounts.delete_many(observers, None).await?;
        let unbind = doc! {
            "$unset": { "instance_id": "" },
        };
        self.accounts.update_many(owned, unbind, None).await?;

        Ok(true)
    }

    async fn insert_account(&self, account: &NewAccount) -> Result<Account> {
        let account = Account {
            id: Id::new(),
            account: account.clone(),
        };
        self.accounts
            .insert_one(&account, None)
            .await
            .map_err(|err| account_conflict(err, &account.email))?;
        Ok(account)
    }

    async fn account(&self, id: Id) -> Result<Option<Account>> {
        Ok(self.accounts.find_one(id.as_doc(), None).await?)
    }

    async fn account_by_email(&self, email: &Email) -> Result<Option<Account>> {
        let filter = doc! { "email": email };
        Ok(self.accounts.find_one(filter, None).await?)
    }

    async fn accounts(&self) -> Result<Vec<Account>> {
        Ok(self.accounts.find(None, None).await?.try_collect().await?)
    }

    async fn bind_account(&self, id: Id, instance_id: Id) -> Result<()> {
        let update = doc! {
            "$set": { "instance_id": instance_id },
        };
        // Only an unbound account may be bound.
        let filter = doc! { "_id": id, "instance_id": null };
        let result = self
            .accounts
            .update_one(filter, update, None)
            .await
            .map_err(|err| {
                if is_duplicate_key_error(&err) {
                    Error::Conflict("The instance already has an admin".to_string())
                } else {
                    err.into()
                }
            })?;
        if result.matched_count == 0 {
            return match self.account(id).await? {
                Some(_) => Err(Error::Conflict(format!(
                    "Account {id} is already bound to an instance"
                ))),
                None => Err(Error::not_found(format!("Account {id}"))),
            };
        }
        Ok(())
    }

    async fn delete_account(&self, id: Id) -> Result<bool> {
        let result = self.accounts.delete_one(id.as_doc(), None).await?;
        Ok(result.deleted_count == 1)
    }

    async fn insert_voter(&self, voter: &NewVoter) -> Result<Voter> {
        let voter = Voter {
            id: Id::new(),
            voter: voter.clone(),
        };
        self.voters.insert_one(&voter, None).await.map_err(|err| {
            if is_duplicate_key_error(&err) {
                Error::Conflict(format!(
                    "A voter with email {} already exists in this instance",
                    voter.email
                ))
            } else {
                err.into()
            }
        })?;
        Ok(voter)
    }

    async fn voter(&self, id: Id) -> Result<Option<Voter>> {
        Ok(self.voters.find_one(id.as_doc(), None).await?)
    }

    async fn voters_by_email(&self, email: &Email) -> Result<Vec<Voter>> {
        let filter = doc! { "email": email };
        Ok(self.voters.find(filter, None).await?.try_collect().await?)
    }

    async fn voters(&self, instance_id: Id) -> Result<Vec<Voter>> {
        let filter = doc! { "instance_id": instance_id };
        Ok(self.voters.find(filter, None).await?.try_collect().await?)
    }

    async fn delete_voter(&self, id: Id) -> Result<bool> {
        let result = self.voters.delete_one(id.as_doc(), None).await?;
        if result.deleted_count == 0 {
            return Ok(false);
        }
        self.votes
            .delete_many(doc! { "voter_id": id }, None)
            .await?;
        Ok(true)
    }

    async fn count_registered_voters(&self, instance_id: Id) -> Result<u64> {
        let filter = doc! {
            "instance_id": instance_id,
            "is_registered": true,
        };
        Ok(self.voters.count_documents(filter, None).await?)
    }

    async fn reserve_code_send(
        &self,
        email: &Email,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> Result<Reservation> {
        // Matches only if the cooldown has elapsed. If a recent record exists
        // the upsert collides with it on `_id`, which means we were throttled.
        let filter = doc! {
            "_id": email,
            "last_sent_at": { "$lte": BsonDateTime::from_chrono(now - cooldown) },
        };
        let update = doc! {
            "$set": { "last_sent_at": BsonDateTime::from_chrono(now) },
        };
        let options = UpdateOptions::builder().upsert(true).build();
        match self.code_requests.update_one(filter, update, options).await {
            Ok(_) => Ok(Reservation::Granted),
            Err(err) if is_duplicate_key_error(&err) => {
                let last_sent_at = self
                    .code_requests
                    .find_one(doc! { "_id": email }, None)
                    .await?
                    .map(|request| request.last_sent_at.to_chrono())
                    .unwrap_or(now);
                Ok(Reservation::Throttled { last_sent_at })
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn store_code(
        &self,
        voter_id: Id,
        code: Code,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let update = doc! {
            "$set": {
                "login_code": code,
                "login_code_expires_at": BsonDateTime::from_chrono(expires_at),
                "login_code_failures": 0,
            },
        };
        let result = self.voters.update_one(voter_id.as_doc(), update, None).await?;
        if result.matched_count == 0 {
            return Err(Error::not_found(format!("Voter {voter_id}")));
        }
        Ok(())
    }

    async fn consume_code(&self, voter_id: Id, code: Code) -> Result<bool> {
        let filter = doc! {
            "_id": voter_id,
            "login_code": code,
        };
        let update = doc! {
            "$unset": {
                "login_code": "",
                "login_code_expires_at": "",
                "login_code_failures": "",
            },
        };
        let result = self.voters.update_one(filter, update, None).await?;
        Ok(result.modified_count == 1)
    }

    async fn record_code_failure(&self, voter_id: Id, limit: u32) -> Result<bool> {
        let filter = doc! {
            "_id": voter_id,
            "login_code": { "$exists": true },
        };
        let update = doc! {
            "$inc": { "login_code_failures": 1 },
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        let failures = match self.voters.find_one_and_update(filter, update, options).await? {
            Some(voter) => voter.login_code_failures,
            None => return Ok(false),
        };
        if failures < limit {
            return Ok(false);
        }

        let filter = doc! {
            "_id": voter_id,
            "login_code_failures": { "$gte": i64::from(limit) },
        };
        let update = doc! {
            "$unset": {
                "login_code": "",
                "login_code_expires_at": "",
                "login_code_failures": "",
            },
        };
        let result = self.voters.update_one(filter, update, None).await?;
        Ok(result.modified_count == 1)
    }

    async fn link_credential(
        &self,
        voter_id: Id,
        credential_id: Id,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let update = doc! {
            "$set": { "credential_id": credential_id },
        };
        let result = self.voters.update_one(voter_id.as_doc(), update, None).await?;
        if result.matched_count == 0 {
            return Err(Error::not_found(format!("Voter {voter_id}")));
        }

        // Registration is stamped only once.
        let filter = doc! {
            "_id": voter_id,
            "is_registered": false,
        };
        let update = doc! {
            "$set": {
                "is_registered": true,
                "registered_at": BsonDateTime::from_chrono(now),
            },
        };
        self.voters.update_one(filter, update, None).await?;
        Ok(())
    }

    async fn insert_credential(&self, credential: &NewCredential) -> Result<Credential> {
        let credential = Credential {
            id: Id::new(),
            credential: credential.clone(),
        };
        self.credentials
            .insert_one(&credential, None)
            .await
            .map_err(|err| {
                if is_duplicate_key_error(&err) {
                    Error::Conflict(format!(
                        "A credential for {} already exists",
                        credential.email
                    ))
                } else {
                    err.into()
                }
            })?;
        Ok(credential)
    }

    async fn credential(&self, id: Id) -> Result<Option<Credential>> {
        Ok(self.credentials.find_one(id.as_doc(), None).await?)
    }

    async fn credential_by_email(&self, email: &Email) -> Result<Option<Credential>> {
        let filter = doc! { "email": email };
        Ok(self.credentials.find_one(filter, None).await?)
    }

    async fn rotate_credential(
        &self,
        id: Id,
        secret_digest: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let update = doc! {
            "$set": {
                "secret_digest": secret_digest,
                "rotated_at": BsonDateTime::from_chrono(now),
            },
        };
        let result = self.credentials.update_one(id.as_doc(), update, None).await?;
        if result.matched_count == 0 {
            return Err(Error::not_found(format!("Credential {id}")));
        }
        Ok(())
    }

    async fn take_credential_secret(&self, id: Id, secret_digest: &str) -> Result<bool> {
        let filter = doc! {
            "_id": id,
            "secret_digest": secret_digest,
        };
        let update = doc! {
            "$unset": { "secret_digest": "" },
        };
        let result = self.credentials.update_one(filter, update, None).await?;
        Ok(result.modified_count == 1)
    }

    async fn insert_category(&self, category: &NewCategory) -> Result<Category> {
        let category = Category {
            id: Id::new(),
            category: category.clone(),
        };
        self.categories.insert_one(&category, None).await?;
        Ok(category)
    }

    async fn category(&self, id: Id) -> Result<Option<Category>> {
        Ok(self.categories.find_one(id.as_doc(), None).await?)
    }

    async fn categories(&self, instance_id: Id) -> Result<Vec<Category>> {
        let filter = doc! { "instance_id": instance_id };
        let options = FindOptions::builder()
            .sort(doc! { "display_order": 1, "_id": 1 })
            .build();
        Ok(self
            .categories
            .find(filter, options)
            .await?
            .try_collect()
            .await?)
    }

    async fn update_category(&self, id: Id, spec: &CategorySpec) -> Result<Option<Category>> {
        let update = doc! {
            "$set": {
                "name": spec.name.clone(),
                "description": spec.description.clone(),
                "display_order": spec.display_order,
            },
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        Ok(self
            .categories
            .find_one_and_update(id.as_doc(), update, options)
            .await?)
    }

    async fn delete_category(&self, id: Id) -> Result<bool> {
        let result = self.categories.delete_one(id.as_doc(), None).await?;
        if result.deleted_count == 0 {
            return Ok(false);
        }
        let owned = doc! { "category_id": id };
        self.votes.delete_many(owned.clone(), None).await?;
        self.candidates.delete_many(owned, None).await?;
        Ok(true)
    }

    async fn insert_candidate(&self, candidate: &NewCandidate) -> Result<Candidate> {
        let candidate = Candidate {
            id: Id::new(),
            candidate: candidate.clone(),
        };
        self.candidates.insert_one(&candidate, None).await?;
        Ok(candidate)
    }

    async fn candidate(&self, id: Id) -> Result<Option<Candidate>> {
        Ok(self.candidates.find_one(id.as_doc(), None).await?)
    }

    async fn candidates(&self, category_id: Id) -> Result<Vec<Candidate>> {
        let filter = doc! { "category_id": category_id };
        let options = FindOptions::builder().sort(doc! { "_id": 1 }).build();
        Ok(self
            .candidates
            .find(filter, options)
            .await?
            .try_collect()
            .await?)
    }

    async fn delete_candidate(&self, id: Id) -> Result<bool> {
        let result = self.candidates.delete_one(id.as_doc(), None).await?;
        if result.deleted_count == 0 {
            return Ok(false);
        }
        self.votes
            .delete_many(doc! { "candidate_id": id }, None)
            .await?;
        Ok(true)
    }

    async fn insert_vote(&self, vote: &NewVote) -> Result<Vote> {
        let vote = Vote {
            id: Id::new(),
            vote: vote.clone(),
        };
        self.votes.insert_one(&vote, None).await.map_err(|err| {
            if is_duplicate_key_error(&err) {
                Error::AlreadyVoted
            } else {
                err.into()
            }
        })?;
        Ok(vote)
    }

    async fn votes_by_voter(&self, voter_id: Id) -> Result<Vec<Vote>> {
        let filter = doc! { "voter_id": voter_id };
        Ok(self.votes.find(filter, None).await?.try_collect().await?)
    }

    async fn tally(&self, category_id: Id) -> Result<HashMap<Id, u64>> {
        let pipeline: Vec<Document> = vec![
            doc! { "$match": { "category_id": category_id } },
            doc! { "$group": { "_id": "$candidate_id", "count": { "$sum": 1 } } },
        ];
        let rows: Vec<TallyRow> = self
            .votes
            .aggregate(pipeline, None)
            .await?
            .with_type::<TallyRow>()
            .try_collect()
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| (row.candidate_id, row.count))
            .collect())
    }

    async fn count_votes(&self, instance_id: Id) -> Result<u64> {
        let filter = doc! { "instance_id": instance_id };
        Ok(self.votes.count_documents(filter, None).await?)
    }

    async fn count_participants(&self, instance_id: Id) -> Result<u64> {
        let filter = doc! { "instance_id": instance_id };
        let voters = self.votes.distinct("voter_id", filter, None).await?;
        Ok(voters.len() as u64)
    }
}
