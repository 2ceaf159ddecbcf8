//! The election lifecycle gate.
//!
//! ```text
//! draft --start--> active --pause--> paused --start/resume--> active
//!                  active|paused --end--> completed --archive--> archived
//! ```
//!
//! The transition table and the capability sets are pure functions of the
//! status; [`transition`] applies a transition to a stored instance with a
//! compare-and-set so concurrent transitions cannot both succeed.

use std::fmt::Display;
use std::str::FromStr;

use rocket::{
    http::{
        impl_from_uri_param_identity,
        uri::fmt::{Formatter, Path, UriDisplay},
    },
    request::FromParam,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{Error, Result};
use crate::model::{common::InstanceStatus, db::Instance, mongodb::Id};
use crate::store::{instance_or_404, Store};

/// A requested lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Start,
    Pause,
    Resume,
    End,
    Archive,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::End => "end",
            Self::Archive => "archive",
        }
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown lifecycle action: {0}")]
pub struct UnknownAction(String);

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "start" => Ok(Self::Start),
            "pause" => Ok(Self::Pause),
            "resume" => Ok(Self::Resume),
            "end" => Ok(Self::End),
            "archive" => Ok(Self::Archive),
            other => Err(UnknownAction(other.to_string())),
        }
    }
}

impl<'a> FromParam<'a> for Action {
    type Error = UnknownAction;

    fn from_param(param: &'a str) -> std::result::Result<Self, Self::Error> {
        param.parse()
    }
}

impl UriDisplay<Path> for Action {
    fn fmt(&self, f: &mut Formatter<'_, Path>) -> std::fmt::Result {
        f.write_raw(self.as_str())
    }
}

impl_from_uri_param_identity!([Path] Action);

/// The status an instance in `from` moves to under `action`.
pub fn next_status(from: InstanceStatus, action: Action) -> Result<InstanceStatus> {
    use Action::*;
    use InstanceStatus::*;

    match (from, action) {
        (Draft, Start) => Ok(Active),
        (Active, Pause) => Ok(Paused),
        (Paused, Start | Resume) => Ok(Active),
        (Active | Paused, End) => Ok(Completed),
        (Completed, Archive) => Ok(Archived),
        _ => Err(Error::IllegalTransition {
            from,
            action: action.as_str(),
        }),
    }
}

/// What may be done to an instance in a given status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub can_edit_categories: bool,
    pub can_edit_candidates: bool,
    pub can_edit_voters: bool,
    pub can_vote: bool,
    /// Whether voters may ask for a login code at all. In ended instances
    /// this is further limited to voters who already registered.
    pub can_request_codes: bool,
    /// Whether the instance's voters (not just staff) may see results.
    pub voters_see_results: bool,
    pub can_delete: bool,
}

impl Capabilities {
    pub fn for_status(status: InstanceStatus) -> Self {
        let draft = status == InstanceStatus::Draft;
        let active = status == InstanceStatus::Active;
        Self {
            can_edit_categories: draft,
            can_edit_candidates: draft,
            can_edit_voters: draft,
            can_vote: active,
            can_request_codes: active || status.has_ended(),
            voters_see_results: status.has_ended(),
            can_delete: draft || status == InstanceStatus::Archived,
        }
    }
}

/// Fail unless categories and candidates may be changed.
pub fn ensure_structure_editable(status: InstanceStatus) -> Result<()> {
    let caps = Capabilities::for_status(status);
    if caps.can_edit_categories && caps.can_edit_candidates {
        Ok(())
    } else {
        Err(Error::ElectionNotActive(status))
    }
}

/// Fail unless the voter roll may be changed.
pub fn ensure_voters_editable(status: InstanceStatus) -> Result<()> {
    if Capabilities::for_status(status).can_edit_voters {
        Ok(())
    } else {
        Err(Error::ElectionNotActive(status))
    }
}

/// Fail unless votes may be cast.
pub fn ensure_voting_open(status: InstanceStatus) -> Result<()> {
    if Capabilities::for_status(status).can_vote {
        Ok(())
    } else {
        Err(Error::ElectionNotActive(status))
    }
}

/// Fail unless the instance may be deleted.
pub fn ensure_deletable(status: InstanceStatus) -> Result<()> {
    if Capabilities::for_status(status).can_delete {
        Ok(())
    } else {
        Err(Error::IllegalTransition {
            from: status,
            action: "delete",
        })
    }
}

/// Apply `action` to a stored instance, returning the updated instance.
pub async fn transition(store: &dyn Store, instance_id: Id, action: Action) -> Result<Instance> {
    let mut instance = instance_or_404(store, instance_id).await?;
    let from = instance.status;
    let to = next_status(from, action)?;

    if !store.transition_instance(instance_id, from, to).await? {
        // Somebody else moved the instance first; judge the action against where it is now.
        let current = instance_or_404(store, instance_id).await?.status;
        warn!("Lost transition race on instance {instance_id}: {from} is now {current}");
        return Err(Error::IllegalTransition {
            from: current,
            action: action.as_str(),
        });
    }

    info!("Instance {instance_id} {from} -> {to} ({action})");
    instance.status = to;
    Ok(instance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::db::NewInstance;
    use crate::store::MemoryStore;

    use InstanceStatus::*;

    #[test]
    fn transition_table() {
        assert_eq!(next_status(Draft, Action::Start).unwrap(), Active);
        assert_eq!(next_status(Active, Action::Pause).unwrap(), Paused);
        assert_eq!(next_status(Paused, Action::Start).unwrap(), Active);
        assert_eq!(next_status(Paused, Action::Resume).unwrap(), Active);
        assert_eq!(next_status(Active, Action::End).unwrap(), Completed);
        assert_eq!(next_status(Paused, Action::End).unwrap(), Completed);
        assert_eq!(next_status(Completed, Action::Archive).unwrap(), Archived);
    }

    #[test]
    fn illegal_transitions() {
        let legal = [
            (Draft, Action::Start),
            (Active, Action::Pause),
            (Paused, Action::Start),
            (Paused, Action::Resume),
            (Active, Action::End),
            (Paused, Action::End),
            (Completed, Action::Archive),
        ];
        let actions = [
            Action::Start,
            Action::Pause,
            Action::Resume,
            Action::End,
            Action::Archive,
        ];
        for from in InstanceStatus::ALL {
            for action in actions {
                if legal.contains(&(from, action)) {
                    continue;
                }
                match next_status(from, action) {
                    Err(Error::IllegalTransition { from: f, action: a }) => {
                        assert_eq!(f, from);
                        assert_eq!(a, action.as_str());
                    }
                    other => panic!("{from} --{action}--> {other:?} should be illegal"),
                }
            }
        }
    }

    #[test]
    fn only_drafts_are_editable() {
        for status in InstanceStatus::ALL {
            let caps = Capabilities::for_status(status);
            assert_eq!(caps.can_edit_categories, status == Draft);
            assert_eq!(caps.can_edit_voters, status == Draft);
            assert_eq!(caps.can_vote, status == Active);
            assert_eq!(ensure_structure_editable(status).is_ok(), status == Draft);
        }
        assert!(matches!(
            ensure_voters_editable(Paused),
            Err(Error::ElectionNotActive(Paused))
        ));
        assert!(matches!(
            ensure_voting_open(Completed),
            Err(Error::ElectionNotActive(Completed))
        ));
    }

    #[test]
    fn deletion_only_from_draft_or_archived() {
        assert!(ensure_deletable(Draft).is_ok());
        assert!(ensure_deletable(Archived).is_ok());
        assert!(ensure_deletable(Active).is_err());
        assert!(ensure_deletable(Completed).is_err());
    }

    #[test]
    fn parse_actions() {
        assert_eq!("resume".parse::<Action>().unwrap(), Action::Resume);
        assert!("restart".parse::<Action>().is_err());
    }

    #[rocket::async_test]
    async fn start_then_start_again() {
        let store = MemoryStore::new();
        let instance = store.insert_instance(&NewInstance::example()).await.unwrap();

        let started = transition(&store, instance.id, Action::Start)
            .await
            .unwrap();
        assert_eq!(started.status, Active);
        assert_eq!(store.instance(instance.id).await.unwrap().unwrap().status, Active);

        let again = transition(&store, instance.id, Action::Start).await;
        assert!(matches!(
            again,
            Err(Error::IllegalTransition { from: Active, action: "start" })
        ));
    }

    #[rocket::async_test]
    async fn cannot_restart_completed() {
        let store = MemoryStore::new();
        let instance = store
            .insert_instance(&NewInstance::example_with_status(Completed))
            .await
            .unwrap();
        let result = transition(&store, instance.id, Action::Start).await;
        assert!(matches!(
            result,
            Err(Error::IllegalTransition { from: Completed, .. })
        ));
    }

    #[rocket::async_test]
    async fn unknown_instance() {
        let store = MemoryStore::new();
        let result = transition(&store, Id::new(), Action::Start).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }
}
