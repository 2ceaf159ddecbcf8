//! DB-compatible (e.g. de/serialisable) types.
//!
//! The types in this module are serialised in an DB-friendly way, e.g.:
//!
//! - IDs and datetimes are serialised in MongoDB's own format.
//!
//! Each entity comes as an `XCore` holding the data, a `NewX` alias used for
//! insertion, and an `X` wrapping the core together with its unique ID.

/// Implement the `Deref`/`DerefMut` pair from a stored entity to its core data.
macro_rules! deref_core {
    ($outer:ty, $field:ident, $core:ty) => {
        impl std::ops::Deref for $outer {
            type Target = $core;

            fn deref(&self) -> &Self::Target {
                &self.$field
            }
        }

        impl std::ops::DerefMut for $outer {
            fn deref_mut(&mut self) -> &mut Self::Target {
                &mut self.$field
            }
        }
    };
}

pub mod account;
pub mod candidate;
pub mod category;
pub mod code_request;
pub mod credential;
pub mod instance;
pub mod vote;
pub mod voter;

pub use account::{Account, AccountCore, NewAccount};
pub use candidate::{Candidate, CandidateCore, NewCandidate};
pub use category::{Category, CategoryCore, NewCategory};
pub use code_request::CodeRequest;
pub use credential::{Credential, CredentialCore, NewCredential};
pub use instance::{Instance, InstanceCore, NewInstance};
pub use vote::{NewVote, Vote, VoteCore};
pub use voter::{NewVoter, Voter, VoterCore};
