use std::ops::Deref;

use mongodb::{
    bson::doc, error::Error as DbError, options::IndexOptions, Collection, Database, IndexModel,
};

use crate::model::db::{
    Account, Candidate, Category, CodeRequest, Credential, Instance, NewAccount, NewCandidate,
    NewCategory, NewCredential, NewInstance, NewVote, NewVoter, Vote, Voter,
};

/// A type that can be directly inserted/read to/from the database.
pub trait MongoCollection {
    /// The name of the collection.
    const NAME: &'static str;
}

/// A database collection of the given type.
pub struct Coll<T>(Collection<T>);

impl<T> Coll<T>
where
    T: MongoCollection,
{
    /// Get a handle on this collection in the given database.
    pub fn from_db(db: &Database) -> Self {
        Self(db.collection(T::NAME))
    }
}

// `Derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Coll<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Tie both the stored and the insertable form of an entity to one collection.
macro_rules! collection {
    ($name:literal: $($ty:ty),+) => {
        $(
            impl MongoCollection for $ty {
                const NAME: &'static str = $name;
            }
        )+
    };
}

collection!("instances": Instance, NewInstance);
collection!("accounts": Account, NewAccount);
collection!("voters": Voter, NewVoter);
collection!("credentials": Credential, NewCredential);
collection!("code_requests": CodeRequest);
collection!("categories": Category, NewCategory);
collection!("candidates": Candidate, NewCandidate);
collection!("votes": Vote, NewVote);

/// Index guaranteeing an email belongs to at most one staff account.
pub const ACCOUNT_EMAIL_INDEX: &str = "account_email";
/// Index guaranteeing an instance has at most one admin.
pub const INSTANCE_ADMIN_INDEX: &str = "instance_admin";

/// Ensure that all the required indexes exist on the given database.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    let unique = |name: &str| {
        IndexOptions::builder()
            .unique(true)
            .name(name.to_string())
            .build()
    };

    // Account collection: one account per email, one admin per instance.
    let email_index = IndexModel::builder()
        .keys(doc! {"email": 1})
        .options(unique(ACCOUNT_EMAIL_INDEX))
        .build();
    let admin_index = IndexModel::builder()
        .keys(doc! {"instance_id": 1})
        .options(
            IndexOptions::builder()
                .unique(true)
                .name(INSTANCE_ADMIN_INDEX.to_string())
                .partial_filter_expression(doc! {
                    "role": "admin",
                    "instance_id": {"$exists": true},
                })
                .build(),
        )
        .build();
    let accounts = Coll::<Account>::from_db(db);
    accounts.create_index(email_index, None).await?;
    accounts.create_index(admin_index, None).await?;

    // Voter collection: email unique within an instance.
    let voter_index = IndexModel::builder()
        .keys(doc! {"instance_id": 1, "email": 1})
        .options(unique("voter_instance_email"))
        .build();
    let voter_email_index = IndexModel::builder().keys(doc! {"email": 1}).build();
    let voters = Coll::<Voter>::from_db(db);
    voters.create_index(voter_index, None).await?;
    voters.create_index(voter_email_index, None).await?;

    // Credential collection: one durable identity per email.
    let credential_index = IndexModel::builder()
        .keys(doc! {"email": 1})
        .options(unique("credential_email"))
        .build();
    Coll::<Credential>::from_db(db)
        .create_index(credential_index, None)
        .await?;

    // Vote collection: one vote per voter per category.
    let vote_index = IndexModel::builder()
        .keys(doc! {"voter_id": 1, "category_id": 1})
        .options(unique("vote_voter_category"))
        .build();
    let tally_index = IndexModel::builder()
        .keys(doc! {"category_id": 1, "candidate_id": 1})
        .build();
    let votes = Coll::<Vote>::from_db(db);
    votes.create_index(vote_index, None).await?;
    votes.create_index(tally_index, None).await?;

    Ok(())
}
