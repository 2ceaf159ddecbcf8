//! Delivery of login codes to voters.
//!
//! Delivery is fire-and-forget: the engine only learns whether the hand-off
//! to the transport succeeded.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::model::{api::otp::Code, common::Email};

/// The notifier as held in Rocket's managed state.
pub type SharedNotifier = Arc<dyn Notifier>;

#[rocket::async_trait]
pub trait Notifier: Send + Sync {
    /// Send a login code to the given address.
    async fn send_code(&self, email: &Email, code: Code, expires_at: DateTime<Utc>) -> Result<()>;
}

/// Sends codes through an HTTP mail relay, as a JSON message.
pub struct HttpNotifier {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    from: String,
}

#[derive(Serialize)]
struct MailMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: String,
}

impl HttpNotifier {
    pub fn new(endpoint: String, api_key: Option<String>, from: String) -> Self {
        Self {
            client: Client::new(),
            endpoint,
            api_key,
            from,
        }
    }
}

#[rocket::async_trait]
impl Notifier for HttpNotifier {
    async fn send_code(&self, email: &Email, code: Code, expires_at: DateTime<Utc>) -> Result<()> {
        let message = MailMessage {
            from: &self.from,
            to: email,
            subject: "Your voting login code",
            text: format!(
                "Your login code is {code}. It is valid until {}.",
                expires_at.format("%Y-%m-%d %H:%M UTC")
            ),
        };

        let mut request = self.client.post(&self.endpoint).json(&message);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Delivery(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Delivery(format!("mail relay returned {status}: {text}")));
        }

        info!("Sent login code to {email}");
        Ok(())
    }
}

/// Writes codes to the log instead of sending them. For local development.
pub struct LogNotifier;

#[rocket::async_trait]
impl Notifier for LogNotifier {
    async fn send_code(&self, email: &Email, code: Code, expires_at: DateTime<Utc>) -> Result<()> {
        debug!("Login code for {email}: {code} (valid until {expires_at})");
        Ok(())
    }
}
