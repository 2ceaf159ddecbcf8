use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use mongodb::bson::DateTime as BsonDateTime;
use rocket::tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::model::{
    api::{otp::Code, structure::CategorySpec},
    common::{Email, InstanceStatus, Role},
    db::{
        Account, Candidate, Category, Credential, Instance, NewAccount, NewCandidate,
        NewCategory, NewCredential, NewInstance, NewVote, NewVoter, Vote, Voter,
    },
    mongodb::Id,
};

use super::{Reservation, Store};

/// A store that lives entirely in memory.
///
/// All state sits behind one lock, so every operation is atomic with respect
/// to every other, and the uniqueness rules are checked inside the same
/// critical section as the write they guard.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    instances: BTreeMap<Id, Instance>,
    accounts: BTreeMap<Id, Account>,
    voters: BTreeMap<Id, Voter>,
    credentials: BTreeMap<Id, Credential>,
    code_requests: HashMap<Email, DateTime<Utc>>,
    categories: BTreeMap<Id, Category>,
    candidates: BTreeMap<Id, Candidate>,
    votes: BTreeMap<Id, Vote>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Inner {
    /// Would this account clash with an existing one (other than `except`)?
    fn account_conflict(&self, account: &NewAccount, except: Option<Id>) -> Option<Error> {
        for (id, existing) in &self.accounts {
            if Some(*id) == except {
                continue;
            }
            if existing.email == account.email {
                return Some(Error::Conflict(format!(
                    "An account with email {} already exists",
                    account.email
                )));
            }
            if account.role == Role::Admin
                && existing.role == Role::Admin
                && account.instance_id.is_some()
                && existing.instance_id == account.instance_id
            {
                return Some(Error::Conflict(
                    "The instance already has an admin".to_string(),
                ));
            }
        }
        None
    }

    fn remove_votes(&mut self, predicate: impl Fn(&Vote) -> bool) {
        self.votes.retain(|_, vote| !predicate(vote));
    }
}

#[rocket::async_trait]
impl Store for MemoryStore {
    async fn insert_instance(&self, instance: &NewInstance) -> Result<Instance> {
        let instance = Instance {
            id: Id::new(),
            instance: instance.clone(),
        };
        let mut inner = self.inner.lock().await;
        inner.instances.insert(instance.id, instance.clone());
        Ok(instance)
    }

    async fn instance(&self, id: Id) -> Result<Option<Instance>> {
        Ok(self.inner.lock().await.instances.get(&id).cloned())
    }

    async fn instances(&self) -> Result<Vec<Instance>> {
        Ok(self.inner.lock().await.instances.values().cloned().collect())
    }

    async fn transition_instance(
        &self,
        id: Id,
        from: InstanceStatus,
        to: InstanceStatus,
    ) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        match inner.instances.get_mut(&id) {
            Some(instance) if instance.status == from => {
                instance.status = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_instance(&self, id: Id) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        if inner.instances.remove(&id).is_none() {
            return Ok(false);
        }
        inner.categories.retain(|_, c| c.instance_id != id);
        inner.candidates.retain(|_, c| c.instance_id != id);
        inner.voters.retain(|_, v| v.instance_id != id);
        inner.remove_votes(|vote| vote.instance_id == id);
        inner
            .accounts
            .retain(|_, a| !(a.role == Role::Observer && a.instance_id == Some(id)));
        for account in inner.accounts.values_mut() {
            if account.instance_id == Some(id) {
                account.instance_id = None;
            }
        }
        Ok(true)
    }

    async fn insert_account(&self, account: &NewAccount) -> Result<Account> {
        let mut inner = self.inner.lock().await;
        if let Some(conflict) = inner.account_conflict(account, None) {
            return Err(conflict);
        }
        let account = Account {
            id: Id::new(),
            account: account.clone(),
        };
        inner.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn account(&self, id: Id) -> Result<Option<Account>> {
        Ok(self.inner.lock().await.accounts.get(&id).cloned())
    }

    async fn account_by_email(&self, email: &Email) -> Result<Option<Account>> {
        let inner = self.inner.lock().await;
        Ok(inner.accounts.values().find(|a| &a.email == email).cloned())
    }

    async fn accounts(&self) -> Result<Vec<Account>> {
        Ok(self.inner.lock().await.accounts.values().cloned().collect())
    }

    async fn bind_account(&self, id: Id, instance_id: Id) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let mut updated = inner
            .accounts
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("Account {id}")))?;
        if let Some(bound) = updated.instance_id {
            return Err(Error::Conflict(format!(
                "Account {id} is already bound to instance {bound}"
            )));
        }
        updated.instance_id = Some(instance_id);
        if let Some(conflict) = inner.account_conflict(&updated, Some(id)) {
            return Err(conflict);
        }
        inner.accounts.insert(id, updated);
        Ok(())
    }

    async fn delete_account(&self, id: Id) -> Result<bool> {
        Ok(self.inner.lock().await.accounts.remove(&id).is_some())
    }

    async fn insert_voter(&self, voter: &NewVoter) -> Result<Voter> {
        let mut inner = self.inner.lock().await;
        let duplicate = inner
            .voters
            .values()
            .any(|v| v.instance_id == voter.instance_id && v.email == voter.email);
        if duplicate {
            return Err(Error::Conflict(format!(
                "A voter with email {} already exists in this instance",
                voter.email
            )));
        }
        let voter = Voter {
            id: Id::new(),
            voter: voter.clone(),
        };
        inner.voters.insert(voter.id, voter.clone());
        Ok(voter)
    }

    async fn voter(&self, id: Id) -> Result<Option<Voter>> {
        Ok(self.inner.lock().await.voters.get(&id).cloned())
    }

    async fn voters_by_email(&self, email: &Email) -> Result<Vec<Voter>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .voters
            .values()
            .filter(|v| &v.email == email)
            .cloned()
            .collect())
    }

    async fn voters(&self, instance_id: Id) -> Result<Vec<Voter>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .voters
            .values()
            .filter(|v| v.instance_id == instance_id)
            .cloned()
            .collect())
    }

    async fn delete_voter(&self, id: Id) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        if inner.voters.remove(&id).is_none() {
            return Ok(false);
        }
        inner.remove_votes(|vote| vote.voter_id == id);
        Ok(true)
    }

    async fn count_registered_voters(&self, instance_id: Id) -> Result<u64> {
        let inner = self.inner.lock().await;
        Ok(inner
            .voters
            .values()
            .filter(|v| v.instance_id == instance_id && v.is_registered)
            .count() as u64)
    }

    async fn reserve_code_send(
        &self,
        email: &Email,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> Result<Reservation> {
        let mut inner = self.inner.lock().await;
        if let Some(last_sent_at) = inner.code_requests.get(email) {
            if *last_sent_at > now - cooldown {
                return Ok(Reservation::Throttled {
                    last_sent_at: *last_sent_at,
                });
            }
        }
        inner.code_requests.insert(email.clone(), now);
        Ok(Reservation::Granted)
    }

    async fn store_code(
        &self,
        voter_id: Id,
        code: Code,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let voter = inner
            .voters
            .get_mut(&voter_id)
            .ok_or_else(|| Error::not_found(format!("Voter {voter_id}")))?;
        voter.login_code = Some(code);
        voter.login_code_expires_at = Some(BsonDateTime::from_chrono(expires_at));
        voter.login_code_failures = 0;
        Ok(())
    }

    async fn consume_code(&self, voter_id: Id, code: Code) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        match inner.voters.get_mut(&voter_id) {
            Some(voter) if voter.login_code == Some(code) => {
                voter.login_code = None;
                voter.login_code_expires_at = None;
                voter.login_code_failures = 0;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_code_failure(&self, voter_id: Id, limit: u32) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        match inner.voters.get_mut(&voter_id) {
            Some(voter) if voter.login_code.is_some() => {
                voter.login_code_failures += 1;
                if voter.login_code_failures < limit {
                    return Ok(false);
                }
                voter.login_code = None;
                voter.login_code_expires_at = None;
                voter.login_code_failures = 0;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn link_credential(
        &self,
        voter_id: Id,
        credential_id: Id,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let voter = inner
            .voters
            .get_mut(&voter_id)
            .ok_or_else(|| Error::not_found(format!("Voter {voter_id}")))?;
        voter.credential_id = Some(credential_id);
        if !voter.is_registered {
            voter.is_registered = true;
            voter.registered_at = Some(BsonDateTime::from_chrono(now));
        }
        Ok(())
    }

    async fn insert_credential(&self, credential: &NewCredential) -> Result<Credential> {
        let mut inner = self.inner.lock().await;
        if inner
            .credentials
            .values()
            .any(|c| c.email == credential.email)
        {
            return Err(Error::Conflict(format!(
                "A credential for {} already exists",
                credential.email
            )));
        }
        let credential = Credential {
            id: Id::new(),
            credential: credential.clone(),
        };
        inner.credentials.insert(credential.id, credential.clone());
        Ok(credential)
    }

    async fn credential(&self, id: Id) -> Result<Option<Credential>> {
        Ok(self.inner.lock().await.credentials.get(&id).cloned())
    }

    async fn credential_by_email(&self, email: &Email) -> Result<Option<Credential>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .credentials
            .values()
            .find(|c| &c.email == email)
            .cloned())
    }

    async fn rotate_credential(
        &self,
        id: Id,
        secret_digest: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let credential = inner
            .credentials
            .get_mut(&id)
            .ok_or_else(|| Error::not_found(format!("Credential {id}")))?;
        credential.secret_digest = Some(secret_digest.to_string());
        credential.rotated_at = BsonDateTime::from_chrono(now);
        Ok(())
    }

    async fn take_credential_secret(&self, id: Id, secret_digest: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        match inner.credentials.get_mut(&id) {
            Some(credential) if credential.secret_digest.as_deref() == Some(secret_digest) => {
                credential.secret_digest = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_category(&self, category: &NewCategory) -> Result<Category> {
        let category = Category {
            id: Id::new(),
            category: category.clone(),
        };
        let mut inner = self.inner.lock().await;
        inner.categories.insert(category.id, category.clone());
        Ok(category)
    }

    async fn category(&self, id: Id) -> Result<Option<Category>> {
        Ok(self.inner.lock().await.categories.get(&id).cloned())
    }

    async fn categories(&self, instance_id: Id) -> Result<Vec<Category>> {
        let inner = self.inner.lock().await;
        let mut categories: Vec<Category> = inner
            .categories
            .values()
            .filter(|c| c.instance_id == instance_id)
            .cloned()
            .collect();
        categories.sort_by_key(|c| c.display_order);
        Ok(categories)
    }

    async fn update_category(&self, id: Id, spec: &CategorySpec) -> Result<Option<Category>> {
        let mut inner = self.inner.lock().await;
        Ok(inner.categories.get_mut(&id).map(|category| {
            category.name = spec.name.clone();
            category.description = spec.description.clone();
            category.display_order = spec.display_order;
            category.clone()
        }))
    }

    async fn delete_category(&self, id: Id) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        if inner.categories.remove(&id).is_none() {
            return Ok(false);
        }
        inner.candidates.retain(|_, c| c.category_id != id);
        inner.remove_votes(|vote| vote.category_id == id);
        Ok(true)
    }

    async fn insert_candidate(&self, candidate: &NewCandidate) -> Result<Candidate> {
        let candidate = Candidate {
            id: Id::new(),
            candidate: candidate.clone(),
        };
        let mut inner = self.inner.lock().await;
        inner.candidates.insert(candidate.id, candidate.clone());
        Ok(candidate)
    }

    async fn candidate(&self, id: Id) -> Result<Option<Candidate>> {
        Ok(self.inner.lock().await.candidates.get(&id).cloned())
    }

    async fn candidates(&self, category_id: Id) -> Result<Vec<Candidate>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .candidates
            .values()
            .filter(|c| c.category_id == category_id)
            .cloned()
            .collect())
    }

    async fn delete_candidate(&self, id: Id) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        if inner.candidates.remove(&id).is_none() {
            return Ok(false);
        }
        inner.remove_votes(|vote| vote.candidate_id == id);
        Ok(true)
    }

    async fn insert_vote(&self, vote: &NewVote) -> Result<Vote> {
        let mut inner = self.inner.lock().await;
        let duplicate = inner
            .votes
            .values()
            .any(|v| v.voter_id == vote.voter_id && v.category_id == vote.category_id);
        if duplicate {
            return Err(Error::AlreadyVoted);
        }
        let vote = Vote {
            id: Id::new(),
            vote: vote.clone(),
        };
        inner.votes.insert(vote.id, vote.clone());
        Ok(vote)
    }

    async fn votes_by_voter(&self, voter_id: Id) -> Result<Vec<Vote>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .votes
            .values()
            .filter(|v| v.voter_id == voter_id)
            .cloned()
            .collect())
    }

    async fn tally(&self, category_id: Id) -> Result<HashMap<Id, u64>> {
        let inner = self.inner.lock().await;
        let mut tally = HashMap::new();
        for vote in inner.votes.values().filter(|v| v.category_id == category_id) {
            *tally.entry(vote.candidate_id).or_insert(0) += 1;
        }
        Ok(tally)
    }

    async fn count_votes(&self, instance_id: Id) -> Result<u64> {
        let inner = self.inner.lock().await;
        Ok(inner
            .votes
            .values()
            .filter(|v| v.instance_id == instance_id)
            .count() as u64)
    }

    async fn count_participants(&self, instance_id: Id) -> Result<u64> {
        let inner = self.inner.lock().await;
        let voters: HashSet<Id> = inner
            .votes
            .values()
            .filter(|v| v.instance_id == instance_id)
            .map(|v| v.voter_id)
            .collect();
        Ok(voters.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rocket::tokio;

    use super::*;

    fn vote(voter_id: Id, candidate_id: Id, category_id: Id, instance_id: Id) -> NewVote {
        NewVote {
            voter_id,
            candidate_id,
            category_id,
            instance_id,
            cast_at: BsonDateTime::now(),
        }
    }

    #[rocket::async_test]
    async fn concurrent_votes_for_one_category_admit_exactly_one() {
        let store = Arc::new(MemoryStore::new());
        let (voter, category, instance) = (Id::new(), Id::new(), Id::new());

        let handles = (0..16)
            .map(|_| {
                let store = store.clone();
                let vote = vote(voter, Id::new(), category, instance);
                tokio::spawn(async move { store.insert_vote(&vote).await })
            })
            .collect::<Vec<_>>();

        let mut accepted = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(Error::AlreadyVoted) => rejected += 1,
                Err(e) => panic!("unexpected error {e}"),
            }
        }
        assert_eq!(accepted, 1);
        assert_eq!(rejected, 15);
        assert_eq!(store.count_votes(instance).await.unwrap(), 1);
    }

    #[rocket::async_test]
    async fn reservation_respects_cooldown() {
        let store = MemoryStore::new();
        let email = Email::example();
        let cooldown = Duration::seconds(60);
        let now = Utc::now();

        assert_eq!(
            store.reserve_code_send(&email, now, cooldown).await.unwrap(),
            Reservation::Granted
        );
        assert_eq!(
            store
                .reserve_code_send(&email, now + Duration::seconds(59), cooldown)
                .await
                .unwrap(),
            Reservation::Throttled { last_sent_at: now }
        );
        // Other addresses are unaffected.
        assert_eq!(
            store
                .reserve_code_send(&Email::example2(), now, cooldown)
                .await
                .unwrap(),
            Reservation::Granted
        );
        assert_eq!(
            store
                .reserve_code_send(&email, now + cooldown, cooldown)
                .await
                .unwrap(),
            Reservation::Granted
        );
    }

    #[rocket::async_test]
    async fn one_admin_per_instance() {
        let store = MemoryStore::new();
        let instance = Id::new();
        store
            .insert_account(&NewAccount::example_admin(Some(instance)))
            .await
            .unwrap();

        let second = NewAccount::example("admin2@x.com", Role::Admin, Some(instance));
        assert!(matches!(
            store.insert_account(&second).await,
            Err(Error::Conflict(_))
        ));

        // Unbound admins never clash with each other.
        let unbound = store
            .insert_account(&NewAccount::example("admin3@x.com", Role::Admin, None))
            .await
            .unwrap();
        store
            .insert_account(&NewAccount::example("admin4@x.com", Role::Admin, None))
            .await
            .unwrap();
        assert!(matches!(
            store.bind_account(unbound.id, instance).await,
            Err(Error::Conflict(_))
        ));
        store.bind_account(unbound.id, Id::new()).await.unwrap();
    }

    #[rocket::async_test]
    async fn bound_admins_stay_bound() {
        let store = MemoryStore::new();
        let (first, second) = (Id::new(), Id::new());
        let admin = store
            .insert_account(&NewAccount::example_admin(None))
            .await
            .unwrap();

        store.bind_account(admin.id, first).await.unwrap();
        assert!(matches!(
            store.bind_account(admin.id, second).await,
            Err(Error::Conflict(_))
        ));
        let admin = store.account(admin.id).await.unwrap().unwrap();
        assert_eq!(admin.instance_id, Some(first));

        assert!(matches!(
            store.bind_account(Id::new(), second).await,
            Err(Error::NotFound(_))
        ));
    }

    #[rocket::async_test]
    async fn deleting_an_instance_cascades() {
        let store = MemoryStore::new();
        let instance = store.insert_instance(&NewInstance::example()).await.unwrap();
        let category = store
            .insert_category(&NewCategory::example(instance.id))
            .await
            .unwrap();
        let candidate = store
            .insert_candidate(&NewCandidate::example(instance.id, category.id, "C1"))
            .await
            .unwrap();
        let voter = store
            .insert_voter(&NewVoter::example(instance.id))
            .await
            .unwrap();
        store
            .insert_vote(&vote(voter.id, candidate.id, category.id, instance.id))
            .await
            .unwrap();
        let admin = store
            .insert_account(&NewAccount::example_admin(Some(instance.id)))
            .await
            .unwrap();
        let observer = store
            .insert_account(&NewAccount::example_observer(instance.id))
            .await
            .unwrap();

        assert!(store.delete_instance(instance.id).await.unwrap());

        assert!(store.category(category.id).await.unwrap().is_none());
        assert!(store.candidate(candidate.id).await.unwrap().is_none());
        assert!(store.voter(voter.id).await.unwrap().is_none());
        assert_eq!(store.count_votes(instance.id).await.unwrap(), 0);
        assert!(store.account(observer.id).await.unwrap().is_none());
        assert_eq!(
            store.account(admin.id).await.unwrap().unwrap().instance_id,
            None
        );
        assert!(!store.delete_instance(instance.id).await.unwrap());
    }
}
