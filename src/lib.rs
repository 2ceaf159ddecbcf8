#[macro_use]
extern crate rocket;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{Build, Rocket};

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod model;
pub mod notifier;
pub mod store;

pub use config::Config;

use config::{ConfigFairing, DatabaseFairing, NotifierFairing};
use logging::LoggerFairing;

/// The production server: configuration, MongoDB storage and mail delivery
/// are all taken from the Rocket figment.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .attach(ConfigFairing)
        .attach(DatabaseFairing)
        .attach(NotifierFairing)
        .attach(LoggerFairing)
        .mount("/", api::routes())
}

/// A test server over the given store and notifier, with the bootstrap super
/// admin already in place.
#[cfg(test)]
pub(crate) async fn rocket_for_store_and_notifier(
    store: store::Db,
    notifier: notifier::SharedNotifier,
) -> Rocket<Build> {
    use config::examples::{figment, SUPER_ADMIN_EMAIL, SUPER_ADMIN_PASSWORD};

    let email = SUPER_ADMIN_EMAIL.parse().unwrap();
    store::ensure_super_admin_exists(&*store, &email, SUPER_ADMIN_PASSWORD)
        .await
        .unwrap();

    rocket::custom(figment())
        .attach(ConfigFairing)
        .attach(LoggerFairing)
        .manage(store)
        .manage(notifier)
        .mount("/", api::routes())
}
