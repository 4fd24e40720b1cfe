use std::time::Duration;

use http::{Method, StatusCode};
use serde::Serialize;

/// Request lifecycle notification sent to monitor subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MonitorEvent {
    Started {
        request_id: String,
        #[serde(serialize_with = "serialize_method")]
        method: Method,
        url: String,
    },
    Completed {
        request_id: String,
        #[serde(serialize_with = "serialize_status")]
        status: StatusCode,
        #[serde(with = "crate::config::serde_millis")]
        duration: Duration,
        from_cache: bool,
    },
    Failed {
        request_id: String,
        error: String,
        #[serde(with = "crate::config::serde_millis")]
        duration: Duration,
    },
    Cancelled {
        request_id: String,
        reason: String,
    },
}

impl MonitorEvent {
    #[must_use]
    pub fn request_id(&self) -> &str {
        match self {
            MonitorEvent::Started { request_id, .. }
            | MonitorEvent::Completed { request_id, .. }
            | MonitorEvent::Failed { request_id, .. }
            | MonitorEvent::Cancelled { request_id, .. } => request_id,
        }
    }
}

fn serialize_method<S: serde::Serializer>(method: &Method, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(method.as_str())
}

fn serialize_status<S: serde::Serializer>(status: &StatusCode, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u16(status.as_u16())
}
