//! Pushover notifications for newly captured contacts.
//!
//! Delivery is fire-and-forget: the request runs on a spawned task, and a
//! failure is logged at `warn` and never reaches the visitor. Spawned tasks
//! are tracked so a short-lived process can [`Notifier::flush`] them before
//! the runtime shuts down.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinSet;

use crate::config::{NotifyConfig, PushoverCredentials};
use crate::error::{Error, Result};
use crate::models::Contact;

const NOTIFY_TIMEOUT_SECS: u64 = 10;

#[derive(Clone)]
pub struct Notifier {
    client: reqwest::Client,
    endpoint: String,
    credentials: Option<PushoverCredentials>,
    pending: Arc<Mutex<JoinSet<()>>>,
}

impl Notifier {
    /// A notifier that sends only when `config.enabled` and credentials
    /// are both present.
    pub fn new(config: &NotifyConfig, credentials: Option<PushoverCredentials>) -> Self {
        let credentials = credentials.filter(|_| config.enabled);
        if credentials.is_none() {
            tracing::debug!("contact notifications disabled");
        }
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(NOTIFY_TIMEOUT_SECS))
                .build()
                .unwrap_or_default(),
            endpoint: config.pushover_url.clone(),
            credentials,
            pending: Arc::default(),
        }
    }

    pub fn disabled() -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: String::new(),
            credentials: None,
            pending: Arc::default(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.credentials.is_some()
    }

    /// Announce a new contact in the background. Returns whether a
    /// notification was dispatched.
    pub fn notify_contact(&self, contact: &Contact) -> bool {
        if !self.is_enabled() {
            return false;
        }
        let notifier = self.clone();
        let title = format!("New contact: {}", contact.name);
        let message = contact_message(contact);
        let email = contact.email.clone();

        let mut pending = self.pending();
        // drop handles of deliveries that already finished
        while pending.try_join_next().is_some() {}
        pending.spawn(async move {
            match notifier.send(&title, &message).await {
                Ok(()) => tracing::info!(email = %email, "contact notification sent"),
                Err(e) => tracing::warn!(email = %email, error = %e, "contact notification failed"),
            }
        });
        true
    }

    /// Wait up to `timeout` for dispatched notifications to finish. Returns
    /// `false` if some were still in flight (those are aborted).
    pub async fn flush(&self, timeout: Duration) -> bool {
        let mut tasks = std::mem::take(&mut *self.pending());
        if tasks.is_empty() {
            return true;
        }

        let drained = tokio::time::timeout(timeout, async {
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    tracing::warn!(error = %e, "notification task failed");
                }
            }
        })
        .await;

        match drained {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(pending = tasks.len(), "notifications still in flight; dropping them");
                false
            }
        }
    }

    fn pending(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// POST one message to the webhook.
    pub async fn send(&self, title: &str, message: &str) -> Result<()> {
        let creds = self
            .credentials
            .as_ref()
            .ok_or_else(|| Error::Configuration("notifications are disabled".to_string()))?;

        let response = self
            .client
            .post(&self.endpoint)
            .form(&[
                ("token", creds.token.as_str()),
                ("user", creds.user.as_str()),
                ("title", title),
                ("message", message),
            ])
            .send()
            .await
            .map_err(|e| Error::ExternalService(format!("notification request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ExternalService(format!(
                "notification webhook returned {}: {}",
                status, body
            )));
        }
        Ok(())
    }
}

fn contact_message(contact: &Contact) -> String {
    let mut lines = vec![format!("{} <{}>", contact.name, contact.email)];
    if let Some(company) = &contact.company {
        lines.push(format!("Company: {}", company));
    }
    if let Some(position) = &contact.position {
        lines.push(format!("Position: {}", position));
    }
    lines.push(format!("Interest: {}", contact.interest_level));
    if let Some(notes) = &contact.notes {
        lines.push(format!("Notes: {}", notes));
    }
    lines.join("\n")
}
