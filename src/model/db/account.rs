use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::model::{
    common::{Email, Role},
    mongodb::Id,
};

/// A staff account: the role assignment together with its sign-in credentials.
///
/// Built from an [`crate::model::api::admin::AccountSpec`], which hashes the
/// password and enforces the role/instance pairing rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountCore {
    pub email: Email,
    pub password_hash: String,
    pub role: Role,
    /// The instance this account is bound to. Absent for super admins and for
    /// admins who have not created their instance yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<Id>,
}

impl AccountCore {
    /// Check whether the given password is correct.
    pub fn verify_password<T: AsRef<[u8]>>(&self, password: T) -> bool {
        // A malformed hash can only come from outside this crate, so treat it as a mismatch.
        argon2::verify_encoded(&self.password_hash, password.as_ref()).unwrap_or(false)
    }

    /// Does this account have any access to the given instance?
    pub fn can_see(&self, instance_id: Id) -> bool {
        self.role == Role::SuperAdmin || self.instance_id == Some(instance_id)
    }

    /// May this account change the given instance?
    pub fn can_manage(&self, instance_id: Id) -> bool {
        match self.role {
            Role::SuperAdmin => true,
            Role::Admin => self.instance_id == Some(instance_id),
            Role::Observer => false,
        }
    }
}

/// Hash a password with argon2 and a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, argon2::Error> {
    // 16 bytes is recommended for password hashing:
    //  https://en.wikipedia.org/wiki/Argon2
    let mut salt = [0_u8; 16];
    rand::thread_rng().fill(&mut salt);
    argon2::hash_encoded(password.as_bytes(), &salt, &argon2::Config::default())
}

/// An account without an ID.
pub type NewAccount = AccountCore;

/// A staff account from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub account: AccountCore,
}

deref_core!(Account, account, AccountCore);
