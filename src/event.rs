use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const KIND_ASR_PARTIAL: &str = "asr.partial";
pub const KIND_GESTURE_NOD: &str = "gesture.nod";
pub const KIND_HEARTBEAT: &str = "heartbeat";
pub const KIND_ASR_TOGGLE: &str = "asr.toggle";

/// Record shape as it arrives off the bus, before validation.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEvent {
    pub event: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub ts: Option<f64>,
}

/// Capture control carried by `asr.toggle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToggleAction {
    Start,
    Stop,
}

impl ToggleAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ToggleAction::Start => "start",
            ToggleAction::Stop => "stop",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "start" => Some(ToggleAction::Start),
            "stop" => Some(ToggleAction::Stop),
            _ => None,
        }
    }
}

/// A validated bus event. Each variant carries only the fields its kind allows.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    AsrPartial { text: String, ts: Option<f64> },
    GestureNod { ts: Option<f64> },
    Heartbeat { ts: Option<f64> },
    AsrToggle { action: ToggleAction, ts: Option<f64> },
}

#[derive(Debug, Error)]
pub enum MalformedEvent {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown event kind {0:?}")]
    UnknownKind(String),
    #[error("{kind} requires field `{field}`")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },
    #[error("{kind} must not carry field `{field}`")]
    UnexpectedField {
        kind: &'static str,
        field: &'static str,
    },
    #[error("invalid toggle action {0:?}")]
    InvalidAction(String),
}

impl Event {
    /// Parse one raw bus message. No side effects.
    pub fn parse(raw: &str) -> Result<Self, MalformedEvent> {
        let record: RawEvent = serde_json::from_str(raw)?;
        Self::from_record(record)
    }

    pub fn from_record(record: RawEvent) -> Result<Self, MalformedEvent> {
        let RawEvent {
            event,
            text,
            action,
            ts,
        } = record;

        match event.as_str() {
            KIND_ASR_PARTIAL => {
                forbid(KIND_ASR_PARTIAL, "action", &action)?;
                let text = text.ok_or(MalformedEvent::MissingField {
                    kind: KIND_ASR_PARTIAL,
                    field: "text",
                })?;
                Ok(Event::AsrPartial { text, ts })
            }
            KIND_GESTURE_NOD => {
                forbid(KIND_GESTURE_NOD, "text", &text)?;
                forbid(KIND_GESTURE_NOD, "action", &action)?;
                Ok(Event::GestureNod { ts })
            }
            KIND_HEARTBEAT => {
                forbid(KIND_HEARTBEAT, "text", &text)?;
                forbid(KIND_HEARTBEAT, "action", &action)?;
                Ok(Event::Heartbeat { ts })
            }
            KIND_ASR_TOGGLE => {
                forbid(KIND_ASR_TOGGLE, "text", &text)?;
                let raw_action = action.ok_or(MalformedEvent::MissingField {
                    kind: KIND_ASR_TOGGLE,
                    field: "action",
                })?;
                let action = ToggleAction::parse(&raw_action)
                    .ok_or(MalformedEvent::InvalidAction(raw_action))?;
                Ok(Event::AsrToggle { action, ts })
            }
            _ => Err(MalformedEvent::UnknownKind(event)),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Event::AsrPartial { .. } => KIND_ASR_PARTIAL,
            Event::GestureNod { .. } => KIND_GESTURE_NOD,
            Event::Heartbeat { .. } => KIND_HEARTBEAT,
            Event::AsrToggle { .. } => KIND_ASR_TOGGLE,
        }
    }

    /// Producer timestamp. Advisory; never used for ordering.
    pub fn ts(&self) -> Option<f64> {
        match self {
            Event::AsrPartial { ts, .. }
            | Event::GestureNod { ts }
            | Event::Heartbeat { ts }
            | Event::AsrToggle { ts, .. } => *ts,
        }
    }
}

fn forbid(
    kind: &'static str,
    field: &'static str,
    value: &Option<String>,
) -> Result<(), MalformedEvent> {
    if value.is_some() {
        return Err(MalformedEvent::UnexpectedField { kind, field });
    }
    Ok(())
}

/// Outbound `asr.toggle` record sent toward the bridge.
#[derive(Debug, Clone, Serialize)]
pub struct ToggleRecord {
    pub event: &'static str,
    pub action: ToggleAction,
    pub ts: i64,
}

impl ToggleRecord {
    pub fn now(action: ToggleAction) -> Self {
        Self {
            event: KIND_ASR_TOGGLE,
            action,
            ts: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
