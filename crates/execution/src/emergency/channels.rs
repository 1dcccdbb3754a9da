//! Emergency contacts and notification channels.

use async_trait::async_trait;
use failsafe_domain::{ChannelKind, IncidentKind, Severity, Team};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{error, info, warn};
use uuid::Uuid;

/// A person or rota reachable during an incident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyContact {
    /// Contact name.
    pub name: String,
    /// Team the contact belongs to.
    pub team: Team,
    /// Lowest severity this contact wants to hear about.
    pub min_severity: Severity,
    /// Channels to use, in preference order.
    pub channels: Vec<ChannelKind>,
    /// Address per channel (email address, phone number, webhook URL...).
    #[serde(default)]
    pub addresses: BTreeMap<ChannelKind, String>,
}

impl EmergencyContact {
    /// Creates a contact with no channels.
    pub fn new(name: impl Into<String>, team: Team, min_severity: Severity) -> Self {
        Self {
            name: name.into(),
            team,
            min_severity,
            channels: Vec::new(),
            addresses: BTreeMap::new(),
        }
    }

    /// Adds a channel and its address.
    #[must_use]
    pub fn via(mut self, channel: ChannelKind, address: impl Into<String>) -> Self {
        self.channels.push(channel);
        self.addresses.insert(channel, address.into());
        self
    }

    /// Address for a channel.
    #[must_use]
    pub fn address(&self, channel: ChannelKind) -> Option<&str> {
        self.addresses.get(&channel).map(String::as_str)
    }

    /// Whether this contact should hear about an incident.
    #[must_use]
    pub fn wants(&self, teams: &[Team], severity: Severity) -> bool {
        teams.contains(&self.team) && severity >= self.min_severity
    }
}

/// Message sent to contacts for one incident.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationMessage {
    pub incident_id: Uuid,
    pub kind: IncidentKind,
    pub severity: Severity,
    pub title: String,
    pub summary: String,
    pub teams: Vec<Team>,
}

impl NotificationMessage {
    /// One-line rendering for text channels.
    #[must_use]
    pub fn render(&self) -> String {
        format!(
            "[{}] {}: {} (incident {})",
            self.severity.to_string().to_uppercase(),
            self.title,
            self.summary,
            self.incident_id
        )
    }
}

/// Transport that can deliver a message to a contact.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Channel this transport serves.
    fn kind(&self) -> ChannelKind;

    /// Delivers `message` to `contact`.
    async fn send(
        &self,
        contact: &EmergencyContact,
        message: &NotificationMessage,
    ) -> anyhow::Result<()>;
}

/// Writes notifications to the log.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleChannel {
    kind: ChannelKind,
}

impl ConsoleChannel {
    /// Creates a console channel standing in for `kind`.
    #[must_use]
    pub fn new(kind: ChannelKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl NotificationChannel for ConsoleChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn send(
        &self,
        contact: &EmergencyContact,
        message: &NotificationMessage,
    ) -> anyhow::Result<()> {
        match message.severity {
            Severity::Critical | Severity::High => {
                error!(contact = %contact.name, channel = %self.kind, "{}", message.render());
            }
            Severity::Medium => {
                warn!(contact = %contact.name, channel = %self.kind, "{}", message.render());
            }
            Severity::Low => {
                info!(contact = %contact.name, channel = %self.kind, "{}", message.render());
            }
        }
        Ok(())
    }
}

/// Posts notifications as JSON to a webhook (chat integrations, paging services).
#[derive(Debug, Clone)]
pub struct WebhookChannel {
    /// HTTP client.
    client: reqwest::Client,
    /// Channel this webhook serves.
    kind: ChannelKind,
    /// URL used when the contact has no address for this channel.
    default_url: Option<String>,
}

impl WebhookChannel {
    /// Creates a webhook channel.
    #[must_use]
    pub fn new(kind: ChannelKind, default_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            kind,
            default_url,
        }
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn send(
        &self,
        contact: &EmergencyContact,
        message: &NotificationMessage,
    ) -> anyhow::Result<()> {
        let url = contact
            .address(self.kind)
            .or(self.default_url.as_deref())
            .ok_or_else(|| anyhow::anyhow!("no {} address for {}", self.kind, contact.name))?;

        let body = serde_json::json!({
            "content": message.render(),
            "contact": contact.name,
            "incident": message,
        });

        self.client
            .post(url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}
