use std::fmt::Display;

use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::model::{
    common::Role,
    db::{Account, Voter},
    mongodb::Id,
};

/// A user of our application, having defined rights.
pub trait User {
    /// Does a session with these rights count as this user type?
    fn admits(rights: Rights) -> bool;
    /// Get the user's ID.
    fn id(&self) -> Id;
    /// The rights a session for this user carries.
    fn rights(&self) -> Rights;
}

/// Different privilege levels.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum Rights {
    Voter = 0,
    Observer = 1,
    Admin = 2,
    SuperAdmin = 3,
}

impl From<Role> for Rights {
    fn from(role: Role) -> Self {
        match role {
            Role::SuperAdmin => Self::SuperAdmin,
            Role::Admin => Self::Admin,
            Role::Observer => Self::Observer,
        }
    }
}

impl Display for Rights {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "{}",
            match self {
                Self::Voter => "voter",
                Self::Observer => "observer",
                Self::Admin => "admin",
                Self::SuperAdmin => "super admin",
            }
        )
    }
}

impl User for Voter {
    fn admits(rights: Rights) -> bool {
        rights == Rights::Voter
    }

    fn id(&self) -> Id {
        self.id
    }

    fn rights(&self) -> Rights {
        Rights::Voter
    }
}

/// Any staff account: super admin, admin or observer.
impl User for Account {
    fn admits(rights: Rights) -> bool {
        rights != Rights::Voter
    }

    fn id(&self) -> Id {
        self.id
    }

    fn rights(&self) -> Rights {
        self.role.into()
    }
}
