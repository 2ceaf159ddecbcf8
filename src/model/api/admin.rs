use serde::{Deserialize, Serialize};

use crate::model::{
    common::{Email, Role},
    db::{account::hash_password, Account, NewAccount},
    mongodb::{id_as_hex, Id},
};

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// A request to create a staff account. The password is in plaintext, so this
/// is never stored directly.
#[derive(Clone, Deserialize, Serialize)]
pub struct AccountSpec {
    pub email: Email,
    pub password: String,
    pub role: Role,
    #[serde(default, with = "id_as_hex::option")]
    pub instance_id: Option<Id>,
}

impl TryFrom<AccountSpec> for NewAccount {
    type Error = String;

    /// Convert an [`AccountSpec`] into a new account by hashing the password.
    ///
    /// Enforces the minimum password length, that observers are bound to an
    /// instance, and that super admins are not.
    fn try_from(spec: AccountSpec) -> Result<Self, Self::Error> {
        if spec.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(format!(
                "Password must be at least {MIN_PASSWORD_LENGTH} characters"
            ));
        }
        match (spec.role, spec.instance_id) {
            (Role::Observer, None) => {
                return Err("An observer must be bound to an instance".to_string())
            }
            (Role::SuperAdmin, Some(_)) => {
                return Err("A super admin cannot be bound to an instance".to_string())
            }
            _ => {}
        }
        let password_hash = hash_password(&spec.password).map_err(|e| e.to_string())?;
        Ok(Self {
            email: spec.email,
            password_hash,
            role: spec.role,
            instance_id: spec.instance_id,
        })
    }
}

/// API-friendly view of a staff account, without the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountDescription {
    #[serde(with = "id_as_hex")]
    pub id: Id,
    pub email: Email,
    pub role: Role,
    #[serde(with = "id_as_hex::option")]
    pub instance_id: Option<Id>,
}

impl From<Account> for AccountDescription {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            email: account.account.email,
            role: account.account.role,
            instance_id: account.account.instance_id,
        }
    }
}
