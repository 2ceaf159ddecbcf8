//! Durable voter credentials.
//!
//! A login code only proves control of an email once. Each successful
//! verification mints a fresh random secret for the voter's durable
//! credential; the client trades that secret for a session straight away.
//! Only an HMAC of the secret is stored.

use chrono::{DateTime, Utc};
use data_encoding::{BASE64, BASE64URL_NOPAD};
use hmac::{Hmac, Mac};
use mongodb::bson::DateTime as BsonDateTime;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{Error, Result};
use crate::model::{
    common::Email,
    db::{NewCredential, Voter},
    mongodb::Id,
};
use crate::store::Store;

use super::identity::voter_for_email;

type HmacSha256 = Hmac<Sha256>;

/// Length of a credential secret, in random bytes.
const SECRET_BYTES: usize = 32;

/// A freshly rotated credential, handed to the client exactly once.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedSecret {
    pub email: Email,
    pub secret: String,
}

// Keep secrets out of logs and panic messages.
impl std::fmt::Debug for IssuedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedSecret")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

fn random_secret() -> String {
    let mut bytes = [0_u8; SECRET_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    BASE64URL_NOPAD.encode(&bytes)
}

/// The stored form of a secret.
pub fn digest(hmac_secret: &[u8], secret: &str) -> String {
    let mut hmac =
        HmacSha256::new_from_slice(hmac_secret).expect("HMAC can take key of any size");
    hmac.update(secret.as_bytes());
    BASE64.encode(&hmac.finalize().into_bytes())
}

/// Give the voter's durable credential a new secret, creating the credential
/// (and marking the voter registered) the first time round.
pub async fn rotate(
    store: &dyn Store,
    hmac_secret: &[u8],
    voter: &Voter,
    now: DateTime<Utc>,
) -> Result<IssuedSecret> {
    let secret = random_secret();
    let secret_digest = digest(hmac_secret, &secret);

    let credential_id = match store.credential_by_email(&voter.email).await? {
        Some(credential) => {
            store.rotate_credential(credential.id, &secret_digest, now).await?;
            credential.id
        }
        None => create_or_reuse(store, &voter.email, &secret_digest, now).await?,
    };

    if voter.credential_id != Some(credential_id) || !voter.is_registered {
        store.link_credential(voter.id, credential_id, now).await?;
        if !voter.is_registered {
            info!("Voter {} registered", voter.id);
        }
    }

    Ok(IssuedSecret {
        email: voter.email.clone(),
        secret,
    })
}

/// Create the credential for an email. If a concurrent first sign-in created
/// it in the meantime, rotate that one instead.
async fn create_or_reuse(
    store: &dyn Store,
    email: &Email,
    secret_digest: &str,
    now: DateTime<Utc>,
) -> Result<Id> {
    let new = NewCredential::new(
        email.clone(),
        secret_digest.to_string(),
        BsonDateTime::from_chrono(now),
    );
    match store.insert_credential(&new).await {
        Ok(credential) => Ok(credential.id),
        Err(Error::Conflict(_)) => {
            warn!("Credential for {email} created concurrently, reusing it");
            let existing = store
                .credential_by_email(email)
                .await?
                .ok_or_else(|| Error::not_found(format!("Credential for {email}")))?;
            store.rotate_credential(existing.id, secret_digest, now).await?;
            Ok(existing.id)
        }
        Err(e) => Err(e),
    }
}

/// Trade a credential secret for the voter it signs in as. The secret is
/// consumed, so a second exchange with the same secret fails.
pub async fn exchange(
    store: &dyn Store,
    hmac_secret: &[u8],
    email: &Email,
    secret: &str,
) -> Result<Voter> {
    let refused = || Error::Unauthorized("Invalid credential".to_string());

    let credential = store.credential_by_email(email).await?.ok_or_else(refused)?;
    let secret_digest = digest(hmac_secret, secret);
    if !store
        .take_credential_secret(credential.id, &secret_digest)
        .await?
    {
        warn!("Rejected credential exchange for {email}");
        return Err(refused());
    }

    let (voter, _) = voter_for_email(store, email).await?.ok_or_else(refused)?;
    Ok(voter)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::model::db::{NewInstance, NewVoter};
    use crate::store::MemoryStore;

    const HMAC_SECRET: &[u8] = b"test hmac secret";

    async fn voter(store: &MemoryStore) -> Voter {
        let instance = store.insert_instance(&NewInstance::example()).await.unwrap();
        store
            .insert_voter(&NewVoter::example(instance.id))
            .await
            .unwrap()
    }

    #[test]
    fn digests_depend_on_key_and_secret() {
        let a = digest(b"key one", "secret");
        assert_eq!(a, digest(b"key one", "secret"));
        assert_ne!(a, digest(b"key two", "secret"));
        assert_ne!(a, digest(b"key one", "secret!"));
    }

    #[test]
    fn secrets_are_random() {
        let secret = random_secret();
        assert_eq!(secret.len(), 43);
        assert_ne!(secret, random_secret());
    }

    #[rocket::async_test]
    async fn first_rotation_creates_and_registers() {
        let store = MemoryStore::new();
        let voter = voter(&store).await;
        let now = Utc::now();

        let issued = rotate(&store, HMAC_SECRET, &voter, now).await.unwrap();
        assert_eq!(issued.email, voter.email);

        let stored = store.voter(voter.id).await.unwrap().unwrap();
        assert!(stored.is_registered);
        let credential = store
            .credential(stored.credential_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(credential.email, voter.email);
        assert_eq!(
            credential.secret_digest,
            Some(digest(HMAC_SECRET, &issued.secret))
        );
    }

    #[rocket::async_test]
    async fn later_rotations_replace_the_secret() {
        let store = MemoryStore::new();
        let voter = voter(&store).await;

        let first = rotate(&store, HMAC_SECRET, &voter, Utc::now()).await.unwrap();
        let voter = store.voter(voter.id).await.unwrap().unwrap();
        let registered_at = voter.registered_at;
        let second = rotate(&store, HMAC_SECRET, &voter, Utc::now()).await.unwrap();
        assert_ne!(first.secret, second.secret);

        // The old secret no longer works, the new one does, once.
        assert!(exchange(&store, HMAC_SECRET, &voter.email, &first.secret)
            .await
            .is_err());
        let signed_in = exchange(&store, HMAC_SECRET, &voter.email, &second.secret)
            .await
            .unwrap();
        assert_eq!(signed_in.id, voter.id);
        assert!(matches!(
            exchange(&store, HMAC_SECRET, &voter.email, &second.secret).await,
            Err(Error::Unauthorized(_))
        ));

        let stored = store.voter(voter.id).await.unwrap().unwrap();
        assert_eq!(stored.registered_at, registered_at);
    }

    #[rocket::async_test]
    async fn concurrent_first_rotations_share_one_credential() {
        let store = Arc::new(MemoryStore::new());
        let voter = voter(&store).await;

        let handles = (0..8)
            .map(|_| {
                let store = store.clone();
                let voter = voter.clone();
                rocket::tokio::spawn(async move {
                    rotate(&*store, HMAC_SECRET, &voter, Utc::now()).await
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let credential = store
            .credential_by_email(&voter.email)
            .await
            .unwrap()
            .unwrap();
        let stored = store.voter(voter.id).await.unwrap().unwrap();
        assert_eq!(stored.credential_id, Some(credential.id));
    }

    #[rocket::async_test]
    async fn exchange_without_credential() {
        let store = MemoryStore::new();
        let result = exchange(&store, HMAC_SECRET, &Email::example(), "whatever").await;
        assert!(matches!(result, Err(Error::Unauthorized(_))));
    }
}
