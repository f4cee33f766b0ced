//! Automation topic events.
//!
//! The automation feed carries loosely structured payloads; only the fields
//! the dashboard keys on are typed, the rest are kept in `fields`.

use serde::Deserialize;
use serde_json::{Map, Value};

use super::lenient;
use crate::channel::Envelope;

/// Payload of an automation event.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AutomationPayload {
    /// Company the event belongs to.
    #[serde(default, deserialize_with = "lenient::id")]
    pub company_id: Option<String>,

    /// Session the event belongs to.
    #[serde(default, deserialize_with = "lenient::id")]
    pub session_id: Option<String>,

    /// Remaining fields.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Envelopes pushed on `automation`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AutomationEvent {
    /// Customer session opened.
    SessionCreated(AutomationPayload),
    /// Customer session changed.
    SessionUpdated(AutomationPayload),
    /// Automated message delivered.
    MessageSent(AutomationPayload),
    /// Inbound webhook processed.
    WebhookReceived(AutomationPayload),
    /// Automation run failed.
    AutomationError(AutomationPayload),
    /// Dashboard counters changed.
    StatsUpdate(AutomationPayload),
    /// Scheduled message delivered.
    ScheduledMessageSent(AutomationPayload),
    /// Report ready for download.
    ReportGenerated(AutomationPayload),
    /// Unrecognized type.
    #[serde(other)]
    Unknown,
}

/// Routing key for [`AutomationEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AutomationEventKind {
    /// `session_created`.
    SessionCreated,
    /// `session_updated`.
    SessionUpdated,
    /// `message_sent`.
    MessageSent,
    /// `webhook_received`.
    WebhookReceived,
    /// `automation_error`.
    AutomationError,
    /// `stats_update`.
    StatsUpdate,
    /// `scheduled_message_sent`.
    ScheduledMessageSent,
    /// `report_generated`.
    ReportGenerated,
    /// Anything else.
    Unknown,
}

impl AutomationEventKind {
    /// Every recognized kind.
    pub const ALL: [Self; 8] = [
        Self::SessionCreated,
        Self::SessionUpdated,
        Self::MessageSent,
        Self::WebhookReceived,
        Self::AutomationError,
        Self::StatsUpdate,
        Self::ScheduledMessageSent,
        Self::ReportGenerated,
    ];
}

impl AutomationEvent {
    /// Returns the payload, if the event is recognized.
    #[must_use]
    pub const fn payload(&self) -> Option<&AutomationPayload> {
        match self {
            Self::SessionCreated(p)
            | Self::SessionUpdated(p)
            | Self::MessageSent(p)
            | Self::WebhookReceived(p)
            | Self::AutomationError(p)
            | Self::StatsUpdate(p)
            | Self::ScheduledMessageSent(p)
            | Self::ReportGenerated(p) => Some(p),
            Self::Unknown => None,
        }
    }
}

impl Envelope for AutomationEvent {
    type Kind = AutomationEventKind;

    fn kind(&self) -> AutomationEventKind {
        match self {
            Self::SessionCreated(_) => AutomationEventKind::SessionCreated,
            Self::SessionUpdated(_) => AutomationEventKind::SessionUpdated,
            Self::MessageSent(_) => AutomationEventKind::MessageSent,
            Self::WebhookReceived(_) => AutomationEventKind::WebhookReceived,
            Self::AutomationError(_) => AutomationEventKind::AutomationError,
            Self::StatsUpdate(_) => AutomationEventKind::StatsUpdate,
            Self::ScheduledMessageSent(_) => AutomationEventKind::ScheduledMessageSent,
            Self::ReportGenerated(_) => AutomationEventKind::ReportGenerated,
            Self::Unknown => AutomationEventKind::Unknown,
        }
    }
}
