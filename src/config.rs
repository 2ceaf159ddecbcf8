use std::sync::Arc;

use chrono::Duration;
use mongodb::Client as MongoClient;
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::engine::otp::OtpPolicy;
use crate::model::{common::Email, mongodb::ensure_indexes_exist};
use crate::notifier::{HttpNotifier, LogNotifier, SharedNotifier};
use crate::store::{ensure_super_admin_exists, Db, MongoStore};

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Deserialize)]
pub struct Config {
    // non-secrets
    #[serde(default = "default_otp_ttl")]
    otp_ttl: u32,
    #[serde(default = "default_otp_cooldown")]
    otp_cooldown: u32,
    auth_ttl: u32,
    // secrets
    jwt_secret: String,
    hmac_secret: String,
}

/// Five hours.
fn default_otp_ttl() -> u32 {
    5 * 60 * 60
}

fn default_otp_cooldown() -> u32 {
    60
}

impl Config {
    /// Valid lifetime of a login code in seconds.
    pub fn otp_ttl(&self) -> Duration {
        Duration::seconds(self.otp_ttl.into())
    }

    /// Minimum gap between two code requests for one email, in seconds.
    pub fn otp_cooldown(&self) -> Duration {
        Duration::seconds(self.otp_cooldown.into())
    }

    pub fn otp_policy(&self) -> OtpPolicy {
        OtpPolicy {
            ttl: self.otp_ttl(),
            cooldown: self.otp_cooldown(),
        }
    }

    /// Valid lifetime of auth token cookies in seconds.
    pub fn auth_ttl(&self) -> Duration {
        Duration::seconds(self.auth_ttl.into())
    }

    /// Secret key used to encrypt JWTs.
    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }

    /// Secret key used to sign HMACs of voter credential secrets.
    pub fn hmac_secret(&self) -> &[u8] {
        self.hmac_secret.as_bytes()
    }
}

/// A fairing that loads the application config and puts it in managed state.
/// This could easily be achieved using `AdHoc::config`, but is written out
/// explicitly for symmetry with the other fairings and control over error
/// messages.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        // Manage the state.
        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// Configuration for the database.
#[derive(Deserialize)]
struct DbConfig {
    // non-secrets
    #[serde(default = "default_db_name")]
    db_name: String,
    super_admin_email: Email,
    // secrets
    db_uri: String,
    super_admin_password: String,
}

fn default_db_name() -> String {
    "ballotbox".to_string()
}

/// A fairing that loads the MongoDB config, connects to the database,
/// performs any setup necessary, and places the resulting [`Db`] store into
/// managed state.
pub struct DatabaseFairing;

#[rocket::async_trait]
impl Fairing for DatabaseFairing {
    fn info(&self) -> Info {
        Info {
            name: "MongoDB",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<DbConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load database config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        info!("Loaded database config, connecting...");
        // Construct the connection.
        let client = match MongoClient::with_uri_str(&config.db_uri).await {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to connect to database: {e}");
                return Err(rocket);
            }
        };
        let db = client.database(&config.db_name);

        // Ensure the required indexes exist.
        if let Err(e) = ensure_indexes_exist(&db).await {
            error!("Failed to connect to database: {e}");
            return Err(rocket);
        }

        // Ensure there is a super admin to sign in with.
        let store: Db = Arc::new(MongoStore::new(&db));
        if let Err(e) = ensure_super_admin_exists(
            &*store,
            &config.super_admin_email,
            &config.super_admin_password,
        )
        .await
        {
            error!("Failed to set up super admin account: {e}");
            return Err(rocket);
        }
        info!("...database connection online!");

        // Manage the state.
        rocket = rocket.manage(store);
        Ok(rocket)
    }
}

/// Configuration for the mail relay used to deliver login codes.
#[derive(Deserialize)]
struct MailConfig {
    // non-secrets
    mail_endpoint: Option<String>,
    #[serde(default = "default_mail_from")]
    mail_from: String,
    // secrets
    mail_api_key: Option<String>,
}

fn default_mail_from() -> String {
    "no-reply@ballotbox.invalid".to_string()
}

/// A fairing that loads the mail config and places a [`SharedNotifier`] into
/// managed state. Without a `mail_endpoint`, codes are only logged.
pub struct NotifierFairing;

#[rocket::async_trait]
impl Fairing for NotifierFairing {
    fn info(&self) -> Info {
        Info {
            name: "Code notifier",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<MailConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load mail config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        let notifier: SharedNotifier = match config.mail_endpoint {
            Some(endpoint) => {
                info!("Delivering login codes via {endpoint}");
                Arc::new(HttpNotifier::new(
                    endpoint,
                    config.mail_api_key,
                    config.mail_from,
                ))
            }
            None => {
                warn!("No mail_endpoint configured, login codes will only be logged");
                Arc::new(LogNotifier)
            }
        };

        // Manage the state.
        rocket = rocket.manage(notifier);
        Ok(rocket)
    }
}
