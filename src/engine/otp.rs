//! One-time login codes for voters.
//!
//! Each voter has a single code slot. [`request_code`] is the only way to
//! fill it and [`verify_code`] the only way to empty it.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    api::otp::Code,
    common::{Email, InstanceStatus},
    db::{Instance, Voter},
};
use crate::notifier::Notifier;
use crate::store::{Reservation, Store};

use super::identity::voter_for_email;
use super::linker::{self, IssuedSecret};

/// Wrong guesses a voter may make before their code is withdrawn.
pub const MAX_CODE_ATTEMPTS: u32 = 5;

/// Timing rules for code issuance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OtpPolicy {
    /// How long an issued code stays valid.
    pub ttl: Duration,
    /// Minimum gap between two code requests for the same email.
    pub cooldown: Duration,
}

/// Result of a successful code request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CodeIssue {
    /// A fresh code was stored and handed to the notifier.
    Issued { expires_at: DateTime<Utc> },
    /// The voter still holds an unexpired code; nothing was sent.
    AlreadyValid {
        expires_at: DateTime<Utc>,
        remaining_minutes: i64,
    },
}

/// Whole seconds until `until`, rounded up and never negative.
fn seconds_until(now: DateTime<Utc>, until: DateTime<Utc>) -> i64 {
    let millis = (until - now).num_milliseconds().max(0);
    (millis + 999) / 1000
}

/// Ask for a login code to be sent to `email`.
pub async fn request_code(
    store: &dyn Store,
    notifier: &dyn Notifier,
    policy: OtpPolicy,
    email: &Email,
    now: DateTime<Utc>,
) -> Result<CodeIssue> {
    let (voter, instance) = voter_for_email(store, email)
        .await?
        .ok_or_else(|| Error::not_found("No voter with that email"))?;

    match instance.status {
        InstanceStatus::Active => {}
        // After the election only returning voters may sign in, to view results.
        status if status.has_ended() && voter.is_registered => {}
        status => return Err(Error::ElectionNotActive(status)),
    }

    if let Reservation::Throttled { last_sent_at } =
        store.reserve_code_send(email, now, policy.cooldown).await?
    {
        let wait_seconds = seconds_until(now, last_sent_at + policy.cooldown) as u64;
        warn!("Code request for {email} throttled for another {wait_seconds}s");
        return Err(Error::RateLimited { wait_seconds });
    }

    if let (Some(_), Some(expires_at)) = (voter.login_code, voter.login_code_expires_at) {
        let expires_at = expires_at.to_chrono();
        if expires_at > now {
            let remaining_minutes = (seconds_until(now, expires_at) + 59) / 60;
            return Ok(CodeIssue::AlreadyValid {
                expires_at,
                remaining_minutes,
            });
        }
    }

    let code = Code::random();
    let expires_at = now + policy.ttl;
    store.store_code(voter.id, code, expires_at).await?;

    if let Err(e) = notifier.send_code(email, code, expires_at).await {
        error!("Failed to deliver code to {email}: {e}");
        // Don't leave the voter holding a code they never received.
        store.consume_code(voter.id, code).await?;
        return Err(e);
    }

    info!("Issued login code to voter {} of instance {}", voter.id, instance.id);
    Ok(CodeIssue::Issued { expires_at })
}

/// A voter who has just proven control of their email.
#[derive(Debug, Clone)]
pub struct Verified {
    pub voter: Voter,
    pub instance: Instance,
    pub credential: IssuedSecret,
}

/// Check a submitted code and, on success, rotate the voter's durable credential.
///
/// Every failure after the format check is the same `InvalidCode`, whether
/// or not the email belongs to a voter. After [`MAX_CODE_ATTEMPTS`] wrong
/// guesses the code is withdrawn and a new one must be requested.
pub async fn verify_code(
    store: &dyn Store,
    hmac_secret: &[u8],
    email: &Email,
    code: &str,
    now: DateTime<Utc>,
) -> Result<Verified> {
    let code: Code = code.parse()?;

    let (voter, instance) = voter_for_email(store, email)
        .await?
        .ok_or(Error::InvalidCode)?;

    if voter.login_code != Some(code) {
        warn!("Wrong or missing code for voter {}", voter.id);
        if store.record_code_failure(voter.id, MAX_CODE_ATTEMPTS).await? {
            warn!("Too many wrong codes for voter {}, code withdrawn", voter.id);
        }
        return Err(Error::InvalidCode);
    }

    // Once an election has ended the last code becomes a standing view credential.
    let ended = instance.status.has_ended();
    if !ended {
        let expired = voter
            .login_code_expires_at
            .map_or(true, |at| at.to_chrono() <= now);
        if expired {
            warn!("Expired code for voter {}", voter.id);
            return Err(Error::InvalidCode);
        }
        if !store.consume_code(voter.id, code).await? {
            // A concurrent verification got there first.
            return Err(Error::InvalidCode);
        }
    }

    let credential = linker::rotate(store, hmac_secret, &voter, now).await?;
    Ok(Verified {
        voter,
        instance,
        credential,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::model::{
        api::otp::ParseError,
        db::{NewInstance, NewVoter},
        mongodb::Id,
    };
    use crate::notifier::testing::{CapturingNotifier, FailingNotifier};
    use crate::store::MemoryStore;

    const HMAC_SECRET: &[u8] = b"test hmac secret";

    /// The current time at the precision the store keeps.
    fn now() -> DateTime<Utc> {
        mongodb::bson::DateTime::now().to_chrono()
    }

    fn policy() -> OtpPolicy {
        OtpPolicy {
            ttl: Duration::hours(5),
            cooldown: Duration::seconds(60),
        }
    }

    async fn voter_in(store: &MemoryStore, status: InstanceStatus) -> (Voter, Instance) {
        let instance = store
            .insert_instance(&NewInstance::example_with_status(status))
            .await
            .unwrap();
        let voter = store
            .insert_voter(&NewVoter::example(instance.id))
            .await
            .unwrap();
        (voter, instance)
    }

    #[rocket::async_test]
    async fn issue_verify_and_reuse() {
        let store = MemoryStore::new();
        let notifier = CapturingNotifier::default();
        let (voter, _) = voter_in(&store, InstanceStatus::Active).await;
        let email = Email::example();
        let now = now();

        let issue = request_code(&store, &notifier, policy(), &email, now)
            .await
            .unwrap();
        assert_eq!(
            issue,
            CodeIssue::Issued {
                expires_at: now + Duration::hours(5)
            }
        );
        let code = notifier.last_code_for(&email).await.unwrap();
        assert!((100_000..=999_999).contains(&code.value()));

        let verified = verify_code(&store, HMAC_SECRET, &email, &code.to_string(), now)
            .await
            .unwrap();
        assert_eq!(verified.voter.id, voter.id);
        assert_eq!(verified.credential.email, email);

        let stored = store.voter(voter.id).await.unwrap().unwrap();
        assert!(stored.is_registered);
        assert!(stored.registered_at.is_some());
        assert!(stored.credential_id.is_some());
        assert_eq!(stored.login_code, None);

        let again = verify_code(&store, HMAC_SECRET, &email, &code.to_string(), now).await;
        assert!(matches!(again, Err(Error::InvalidCode)));
    }

    #[rocket::async_test]
    async fn second_request_within_cooldown_is_throttled() {
        let store = MemoryStore::new();
        let notifier = CapturingNotifier::default();
        voter_in(&store, InstanceStatus::Active).await;
        let email = Email::example();
        let now = now();

        request_code(&store, &notifier, policy(), &email, now)
            .await
            .unwrap();
        let second = request_code(
            &store,
            &notifier,
            policy(),
            &email,
            now + Duration::seconds(10),
        )
        .await;
        match second {
            Err(Error::RateLimited { wait_seconds }) => assert_eq!(wait_seconds, 50),
            other => panic!("expected rate limiting, got {other:?}"),
        }
        assert_eq!(notifier.sent_count().await, 1);
    }

    #[rocket::async_test]
    async fn concurrent_requests_issue_once() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(CapturingNotifier::default());
        voter_in(&store, InstanceStatus::Active).await;
        let now = now();

        let handles = (0..8)
            .map(|_| {
                let store = store.clone();
                let notifier = notifier.clone();
                rocket::tokio::spawn(async move {
                    request_code(&*store, &*notifier, policy(), &Email::example(), now).await
                })
            })
            .collect::<Vec<_>>();

        let mut issued = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(CodeIssue::Issued { .. }) => issued += 1,
                Err(Error::RateLimited { .. }) => {}
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        assert_eq!(issued, 1);
        assert_eq!(notifier.sent_count().await, 1);
    }

    #[rocket::async_test]
    async fn unexpired_code_is_reported_not_resent() {
        let store = MemoryStore::new();
        let notifier = CapturingNotifier::default();
        voter_in(&store, InstanceStatus::Active).await;
        let email = Email::example();
        let now = now();

        request_code(&store, &notifier, policy(), &email, now)
            .await
            .unwrap();
        let later = now + Duration::minutes(30);
        let issue = request_code(&store, &notifier, policy(), &email, later)
            .await
            .unwrap();
        assert_eq!(
            issue,
            CodeIssue::AlreadyValid {
                expires_at: now + Duration::hours(5),
                remaining_minutes: 270,
            }
        );
        assert_eq!(notifier.sent_count().await, 1);
    }

    #[rocket::async_test]
    async fn new_code_replaces_expired_one() {
        let store = MemoryStore::new();
        let notifier = CapturingNotifier::default();
        let (voter, _) = voter_in(&store, InstanceStatus::Active).await;
        let email = Email::example();
        let now = now();

        request_code(&store, &notifier, policy(), &email, now)
            .await
            .unwrap();
        let first = notifier.last_code_for(&email).await.unwrap();

        let later = now + Duration::hours(6);
        request_code(&store, &notifier, policy(), &email, later)
            .await
            .unwrap();
        let second = notifier.last_code_for(&email).await.unwrap();

        let stored = store.voter(voter.id).await.unwrap().unwrap();
        assert_eq!(stored.login_code, Some(second));
        if first != second {
            let old = verify_code(&store, HMAC_SECRET, &email, &first.to_string(), later).await;
            assert!(matches!(old, Err(Error::InvalidCode)));
        }
    }

    #[rocket::async_test]
    async fn no_codes_before_start_or_while_paused() {
        for status in [InstanceStatus::Draft, InstanceStatus::Paused] {
            let store = MemoryStore::new();
            let notifier = CapturingNotifier::default();
            voter_in(&store, status).await;
            let result =
                request_code(&store, &notifier, policy(), &Email::example(), now()).await;
            assert!(matches!(result, Err(Error::ElectionNotActive(s)) if s == status));
        }
    }

    #[rocket::async_test]
    async fn ended_elections_only_admit_returning_voters() {
        let store = MemoryStore::new();
        let notifier = CapturingNotifier::default();
        let (voter, _) = voter_in(&store, InstanceStatus::Completed).await;
        let result =
            request_code(&store, &notifier, policy(), &Email::example(), now()).await;
        assert!(matches!(
            result,
            Err(Error::ElectionNotActive(InstanceStatus::Completed))
        ));

        store
            .link_credential(voter.id, Id::new(), now())
            .await
            .unwrap();
        let result =
            request_code(&store, &notifier, policy(), &Email::example(), now()).await;
        assert!(matches!(result, Ok(CodeIssue::Issued { .. })));
    }

    #[rocket::async_test]
    async fn expired_code_accepted_only_after_the_election() {
        let store = MemoryStore::new();
        let notifier = CapturingNotifier::default();
        let (voter, instance) = voter_in(&store, InstanceStatus::Active).await;
        let email = Email::example();
        let now = now();

        request_code(&store, &notifier, policy(), &email, now)
            .await
            .unwrap();
        let code = notifier.last_code_for(&email).await.unwrap().to_string();
        let much_later = now + Duration::days(2);

        // Still active: the expired code is refused.
        let result = verify_code(&store, HMAC_SECRET, &email, &code, much_later).await;
        assert!(matches!(result, Err(Error::InvalidCode)));

        // Once completed, the same expired code is a standing credential.
        store
            .transition_instance(instance.id, InstanceStatus::Active, InstanceStatus::Completed)
            .await
            .unwrap();
        verify_code(&store, HMAC_SECRET, &email, &code, much_later)
            .await
            .unwrap();
        verify_code(&store, HMAC_SECRET, &email, &code, much_later)
            .await
            .unwrap();
        let stored = store.voter(voter.id).await.unwrap().unwrap();
        assert!(stored.login_code.is_some());
    }

    #[rocket::async_test]
    async fn wrong_guesses_withdraw_the_code() {
        let store = MemoryStore::new();
        let notifier = CapturingNotifier::default();
        let (voter, instance) = voter_in(&store, InstanceStatus::Active).await;
        let email = Email::example();
        let now = now();

        request_code(&store, &notifier, policy(), &email, now)
            .await
            .unwrap();
        let code = notifier.last_code_for(&email).await.unwrap();
        let wrong = if code.value() == 123_456 { "654321" } else { "123456" };
        // Ended elections keep the code, so only the guess limit stands in the way.
        store
            .transition_instance(instance.id, InstanceStatus::Active, InstanceStatus::Completed)
            .await
            .unwrap();
        store.link_credential(voter.id, Id::new(), now).await.unwrap();

        for _ in 1..MAX_CODE_ATTEMPTS {
            let result = verify_code(&store, HMAC_SECRET, &email, wrong, now).await;
            assert!(matches!(result, Err(Error::InvalidCode)));
        }
        let stored = store.voter(voter.id).await.unwrap().unwrap();
        assert_eq!(stored.login_code, Some(code));
        assert_eq!(stored.login_code_failures, MAX_CODE_ATTEMPTS - 1);

        let result = verify_code(&store, HMAC_SECRET, &email, wrong, now).await;
        assert!(matches!(result, Err(Error::InvalidCode)));
        let result = verify_code(&store, HMAC_SECRET, &email, &code.to_string(), now).await;
        assert!(matches!(result, Err(Error::InvalidCode)));
        let stored = store.voter(voter.id).await.unwrap().unwrap();
        assert_eq!(stored.login_code, None);
        assert_eq!(stored.login_code_failures, 0);

        // A fresh code starts with a clean slate.
        let later = now + policy().cooldown;
        let issue = request_code(&store, &notifier, policy(), &email, later)
            .await
            .unwrap();
        assert!(matches!(issue, CodeIssue::Issued { .. }));
        let fresh = notifier.last_code_for(&email).await.unwrap();
        verify_code(&store, HMAC_SECRET, &email, &fresh.to_string(), later)
            .await
            .unwrap();
    }

    #[rocket::async_test]
    async fn malformed_codes_fail_fast() {
        let store = MemoryStore::new();
        let now = now();
        let result = verify_code(&store, HMAC_SECRET, &Email::example(), "12345", now).await;
        assert!(matches!(
            result,
            Err(Error::MalformedCode(ParseError::InvalidLength(5)))
        ));
        let result = verify_code(&store, HMAC_SECRET, &Email::example(), "12a456", now).await;
        assert!(matches!(
            result,
            Err(Error::MalformedCode(ParseError::InvalidChar('a')))
        ));
    }

    #[rocket::async_test]
    async fn unknown_email_looks_like_a_wrong_code() {
        let store = MemoryStore::new();
        let result =
            verify_code(&store, HMAC_SECRET, &Email::example(), "123456", now()).await;
        assert!(matches!(result, Err(Error::InvalidCode)));
    }

    #[rocket::async_test]
    async fn failed_delivery_clears_the_code() {
        let store = MemoryStore::new();
        let (voter, _) = voter_in(&store, InstanceStatus::Active).await;
        let result = request_code(
            &store,
            &FailingNotifier,
            policy(),
            &Email::example(),
            now(),
        )
        .await;
        assert!(matches!(result, Err(Error::Delivery(_))));
        let stored = store.voter(voter.id).await.unwrap().unwrap();
        assert_eq!(stored.login_code, None);
    }
}
