//! Alerting module for webhook notifications
//!
//! Threat reports that cross the configured risk level (or are flagged as
//! anomalous) are pushed to Slack, Discord and generic webhooks from an
//! async task, so the analysis loop never waits on the network.

use crate::config::{AlertConfig, DiscordConfig, SlackConfig, WebhookConfig};
use crate::models::{RiskLevel, ThreatReport};
use reqwest::Client;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::mpsc;

const QUEUE_CAPACITY: usize = 100;

/// Errors that can occur during alert dispatch
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Alert channel closed")]
    ChannelClosed,
}

/// Whether a report should be dispatched under `config`
pub fn should_alert(config: &AlertConfig, report: &ThreatReport) -> bool {
    if !config.enabled {
        return false;
    }
    report.risk.risk_level >= config.min_level
        || (config.include_anomalies && report.anomaly.is_anomaly)
}

fn headline(report: &ThreatReport) -> String {
    if report.anomaly.is_anomaly {
        format!("{} risk anomalous source {}", report.risk.risk_level, report.address)
    } else {
        format!("{} risk source {}", report.risk.risk_level, report.address)
    }
}

/// Remembers what was last alerted per address across repeated analyses
/// of the same log, so a source is only re-sent when it escalates.
#[derive(Debug, Default)]
pub struct AlertTracker {
    last_sent: HashMap<String, (RiskLevel, bool)>,
}

impl AlertTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `report` should be dispatched now. An address is dispatched
    /// when it first qualifies, when its risk level rises, or when it
    /// becomes anomalous. Addresses that stop qualifying are forgotten.
    pub fn should_dispatch(&mut self, config: &AlertConfig, report: &ThreatReport) -> bool {
        if !should_alert(config, report) {
            self.last_sent.remove(&report.address);
            return false;
        }

        let current = (report.risk.risk_level, report.anomaly.is_anomaly);
        let escalated = match self.last_sent.get(&report.address) {
            None => true,
            Some(&(level, was_anomaly)) => current.0 > level || (current.1 && !was_anomaly),
        };

        if escalated {
            self.last_sent.insert(report.address.clone(), current);
        }
        escalated
    }

    pub fn len(&self) -> usize {
        self.last_sent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_sent.is_empty()
    }
}

/// Async alert dispatcher
///
/// Runs as a tokio task, receiving reports from an `AlertQueue`.
pub struct AlertDispatcher {
    config: AlertConfig,
    client: Client,
}

impl AlertDispatcher {
    pub fn new(config: AlertConfig) -> Self {
        AlertDispatcher {
            config,
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Create the channel connecting an `AlertQueue` to the dispatcher
    pub fn create_channel() -> (mpsc::Sender<ThreatReport>, mpsc::Receiver<ThreatReport>) {
        mpsc::channel(QUEUE_CAPACITY)
    }

    /// Receive reports until every sender is dropped
    pub async fn run(self, mut rx: mpsc::Receiver<ThreatReport>) {
        log::info!("Alert dispatcher started");

        while let Some(report) = rx.recv().await {
            if !should_alert(&self.config, &report) {
                log::debug!(
                    "Skipping alert for {} (level {})",
                    report.address,
                    report.risk.risk_level
                );
                continue;
            }

            log::info!(
                "Dispatching alert for {} (level {}, anomaly {})",
                report.address,
                report.risk.risk_level,
                report.anomaly.is_anomaly
            );

            if let Err(e) = self.dispatch_alert(&report).await {
                log::error!("Failed to dispatch alert: {}", e);
            }
        }

        log::info!("Alert dispatcher stopped");
    }

    /// Dispatch an alert to all configured channels
    async fn dispatch_alert(&self, report: &ThreatReport) -> Result<(), AlertError> {
        let mut errors = Vec::new();

        if let Some(ref slack) = self.config.slack {
            if let Err(e) = self.send_slack_alert(slack, report).await {
                log::error!("Slack alert failed: {}", e);
                errors.push(e);
            }
        }

        if let Some(ref discord) = self.config.discord {
            if let Err(e) = self.send_discord_alert(discord, report).await {
                log::error!("Discord alert failed: {}", e);
                errors.push(e);
            }
        }

        for webhook in &self.config.webhooks {
            if let Err(e) = self.send_generic_webhook(webhook, report).await {
                log::error!("Webhook {} failed: {}", webhook.name, e);
                errors.push(e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.remove(0))
        }
    }

    async fn send_slack_alert(
        &self,
        config: &SlackConfig,
        report: &ThreatReport,
    ) -> Result<(), AlertError> {
        let payload = slack_payload(config, report);
        let response = self
            .client
            .post(&config.webhook_url)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            log::warn!("Slack returned non-success status: {}", response.status());
        }

        Ok(())
    }

    async fn send_discord_alert(
        &self,
        config: &DiscordConfig,
        report: &ThreatReport,
    ) -> Result<(), AlertError> {
        let payload = discord_payload(config, report);
        let response = self
            .client
            .post(&config.webhook_url)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            log::warn!("Discord returned non-success status: {}", response.status());
        }

        Ok(())
    }

    async fn send_generic_webhook(
        &self,
        config: &WebhookConfig,
        report: &ThreatReport,
    ) -> Result<(), AlertError> {
        let method = config.method.as_deref().unwrap_or("POST");

        let mut request = match method.to_uppercase().as_str() {
            "PUT" => self.client.put(&config.url),
            _ => self.client.post(&config.url),
        };

        if let Some(ref headers) = config.headers {
            for (key, value) in headers {
                request = request.header(key, value);
            }
        }

        let body = serde_json::to_vec(report)?;
        let response = request
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            log::warn!(
                "Webhook {} returned non-success status: {}",
                config.name,
                response.status()
            );
        }

        Ok(())
    }
}

fn slack_payload(config: &SlackConfig, report: &ThreatReport) -> serde_json::Value {
    let color = match report.risk.risk_level {
        RiskLevel::High => "danger",
        RiskLevel::Medium => "warning",
        RiskLevel::Low => "good",
    };

    serde_json::json!({
        "channel": config.channel,
        "username": config.username.as_deref().unwrap_or("Sentinel"),
        "icon_emoji": ":shield:",
        "attachments": [{
            "color": color,
            "title": headline(report),
            "fields": [
                { "title": "Risk score", "value": report.risk.risk_score.to_string(), "short": true },
                { "title": "Anomaly", "value": report.anomaly.is_anomaly.to_string(), "short": true },
                { "title": "Failed attempts", "value": report.features.failed_attempts.to_string(), "short": true },
                { "title": "Users targeted", "value": report.features.unique_users_targeted.to_string(), "short": true },
            ],
            "text": report.actions.join("\n"),
        }]
    })
}

fn discord_payload(config: &DiscordConfig, report: &ThreatReport) -> serde_json::Value {
    let color = match report.risk.risk_level {
        RiskLevel::High => 0xFF0000,
        RiskLevel::Medium => 0xFFCC00,
        RiskLevel::Low => 0x00CCFF,
    };

    serde_json::json!({
        "username": config.username.as_deref().unwrap_or("Sentinel"),
        "embeds": [{
            "title": format!(":shield: {}", headline(report)),
            "description": report.actions.join("\n"),
            "color": color,
            "fields": [
                { "name": "Risk", "value": format!("{} ({})", report.risk.risk_level, report.risk.risk_score), "inline": true },
                { "name": "Failed", "value": report.features.failed_attempts.to_string(), "inline": true },
                { "name": "Succeeded", "value": report.features.successful_logins.to_string(), "inline": true },
            ],
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "footer": { "text": "Sentinel threat assessment" }
        }]
    })
}

/// Synchronous alert queue for use in sync code
#[derive(Clone)]
pub struct AlertQueue {
    tx: mpsc::Sender<ThreatReport>,
}

impl AlertQueue {
    pub fn new(tx: mpsc::Sender<ThreatReport>) -> Self {
        AlertQueue { tx }
    }

    /// Queue an alert without blocking. Drops the alert if the queue is full.
    pub fn queue_alert(&self, report: ThreatReport) {
        if let Err(e) = self.tx.try_send(report) {
            match e {
                mpsc::error::TrySendError::Full(_) => {
                    log::warn!("Alert queue full, dropping alert");
                }
                mpsc::error::TrySendError::Closed(_) => {
                    log::warn!("Alert queue closed");
                }
            }
        }
    }

    pub async fn queue_alert_async(&self, report: ThreatReport) -> Result<(), AlertError> {
        self.tx
            .send(report)
            .await
            .map_err(|_| AlertError::ChannelClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
