use crate::parser::RawMessage;
use crate::resolver::Identity;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

/// A validated, enriched log event. Constructed only when the timestamp is
/// present, the priority is non-zero and the content is non-empty; priority
/// zero counts as absent, matching what the fleet's consumers expect.
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub timestamp: DateTime<Utc>,
    pub priority: u32,
    pub content: String,
    pub source_id: String,
    pub identity: Identity,
}

/// Wire record for the managed sink, one JSON object per message.
#[derive(Debug, Serialize)]
pub struct AppLogRecord<'a> {
    #[serde(rename = "Date")]
    pub date: &'a DateTime<Utc>,
    #[serde(rename = "AppName")]
    pub app_name: &'a str,
    #[serde(rename = "Message")]
    pub message: &'a str,
    #[serde(rename = "Source")]
    pub source: &'a str,
    #[serde(rename = "Unit")]
    pub unit: &'a str,
}

impl LogEvent {
    /// Builds an event from decoded fields, or `None` when any required
    /// field is missing.
    pub fn build(raw: RawMessage, source_id: String, identity: Identity) -> Option<Self> {
        let timestamp = raw.timestamp?;
        let priority = raw.priority.filter(|p| *p != 0)?;
        let content = raw.content.filter(|c| !c.is_empty())?;
        Some(Self {
            timestamp,
            priority,
            content,
            source_id,
            identity,
        })
    }

    /// Classic syslog line for raw sinks:
    /// `<PRI>RFC3339 SOURCEID APP[PROCESS]: CONTENT\n`.
    pub fn line(&self) -> String {
        format!(
            "<{}>{} {} {}[{}]: {}\n",
            self.priority,
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.source_id,
            self.identity.app_name,
            self.identity.process_name,
            self.content,
        )
    }

    pub fn record(&self) -> AppLogRecord<'_> {
        AppLogRecord {
            date: &self.timestamp,
            app_name: &self.identity.app_name,
            message: &self.content,
            source: &self.identity.process_name,
            unit: &self.source_id,
        }
    }
}
