//! Resolving an email to the kind of identity behind it.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{
    common::{Email, InstanceStatus, Role},
    db::{Instance, Voter},
    mongodb::{id_as_hex, Id},
};
use crate::store::Store;

/// Who an email belongs to, and so which sign-in path applies.
///
/// Carries nothing beyond what the login screen needs to pick that path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Identity {
    None,
    /// Signs in with a password.
    #[serde(rename = "admin_or_observer")]
    Staff {
        role: Role,
        #[serde(with = "id_as_hex::option", default)]
        instance_id: Option<Id>,
    },
    /// Signs in with a one-time code.
    Voter {
        #[serde(with = "id_as_hex")]
        voter_id: Id,
        #[serde(with = "id_as_hex")]
        instance_id: Id,
        status: InstanceStatus,
    },
}

/// Resolve an email. Staff accounts take precedence over voter records.
pub async fn resolve(store: &dyn Store, email: &Email) -> Result<Identity> {
    if let Some(account) = store.account_by_email(email).await? {
        return Ok(Identity::Staff {
            role: account.role,
            instance_id: account.instance_id,
        });
    }

    Ok(match voter_for_email(store, email).await? {
        Some((voter, instance)) => Identity::Voter {
            voter_id: voter.id,
            instance_id: instance.id,
            status: instance.status,
        },
        None => Identity::None,
    })
}

/// How strongly a voter record in an instance of this status should be
/// preferred when one email is registered in several instances. Lower wins.
fn liveness(status: InstanceStatus) -> u8 {
    match status {
        InstanceStatus::Active => 0,
        InstanceStatus::Paused => 1,
        InstanceStatus::Draft => 2,
        InstanceStatus::Completed => 3,
        InstanceStatus::Archived => 4,
    }
}

/// The voter record an email signs in as, together with its instance.
///
/// When the email is on the roll of several instances, the one whose
/// election is most live wins, then the oldest voter record.
pub async fn voter_for_email(
    store: &dyn Store,
    email: &Email,
) -> Result<Option<(Voter, Instance)>> {
    let mut candidates = Vec::new();
    for voter in store.voters_by_email(email).await? {
        // A voter whose instance has vanished cannot sign in anywhere.
        if let Some(instance) = store.instance(voter.instance_id).await? {
            candidates.push((voter, instance));
        }
    }
    Ok(candidates
        .into_iter()
        .min_by_key(|(voter, instance)| (liveness(instance.status), voter.id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::db::{NewAccount, NewInstance, NewVoter};
    use crate::store::MemoryStore;

    #[rocket::async_test]
    async fn unknown_email() {
        let store = MemoryStore::new();
        let identity = resolve(&store, &Email::example()).await.unwrap();
        assert_eq!(identity, Identity::None);
    }

    #[rocket::async_test]
    async fn staff_before_voters() {
        let store = MemoryStore::new();
        let instance = store.insert_instance(&NewInstance::example()).await.unwrap();
        store
            .insert_account(&NewAccount::example("a@x.com", Role::Observer, Some(instance.id)))
            .await
            .unwrap();
        store
            .insert_voter(&NewVoter::example(instance.id))
            .await
            .unwrap();

        let identity = resolve(&store, &Email::example()).await.unwrap();
        assert_eq!(
            identity,
            Identity::Staff {
                role: Role::Observer,
                instance_id: Some(instance.id),
            }
        );
    }

    #[rocket::async_test]
    async fn unassigned_admin() {
        let store = MemoryStore::new();
        store
            .insert_account(&NewAccount::example_admin(None))
            .await
            .unwrap();
        let identity = resolve(&store, &"ADMIN@x.com ".parse().unwrap()).await.unwrap();
        assert_eq!(
            identity,
            Identity::Staff {
                role: Role::Admin,
                instance_id: None,
            }
        );
    }

    #[rocket::async_test]
    async fn voter_with_status() {
        let store = MemoryStore::new();
        let instance = store
            .insert_instance(&NewInstance::example_with_status(InstanceStatus::Paused))
            .await
            .unwrap();
        let voter = store
            .insert_voter(&NewVoter::example(instance.id))
            .await
            .unwrap();

        let identity = resolve(&store, &" A@X.com".parse().unwrap()).await.unwrap();
        assert_eq!(
            identity,
            Identity::Voter {
                voter_id: voter.id,
                instance_id: instance.id,
                status: InstanceStatus::Paused,
            }
        );
    }

    #[rocket::async_test]
    async fn most_live_instance_wins() {
        let store = MemoryStore::new();
        let mut expected = None;
        for status in [
            InstanceStatus::Archived,
            InstanceStatus::Draft,
            InstanceStatus::Active,
            InstanceStatus::Completed,
        ] {
            let instance = store
                .insert_instance(&NewInstance::example_with_status(status))
                .await
                .unwrap();
            let voter = store
                .insert_voter(&NewVoter::example(instance.id))
                .await
                .unwrap();
            if status == InstanceStatus::Active {
                expected = Some(voter.id);
            }
        }

        let (voter, instance) = voter_for_email(&store, &Email::example())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(Some(voter.id), expected);
        assert_eq!(instance.status, InstanceStatus::Active);
    }

    #[test]
    fn serialised_shape() {
        let identity = Identity::Staff {
            role: Role::SuperAdmin,
            instance_id: None,
        };
        let json = rocket::serde::json::to_string(&identity).unwrap();
        assert_eq!(
            json,
            r#"{"kind":"admin_or_observer","role":"super_admin","instance_id":null}"#
        );
        let json = rocket::serde::json::to_string(&Identity::None).unwrap();
        assert_eq!(json, r#"{"kind":"none"}"#);
    }
}
