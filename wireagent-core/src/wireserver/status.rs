use serde::Serialize;
use serde_json::Value;

use crate::config::STATUS_DOCUMENT_VERSION;
use crate::types::{ProtocolError, Result};
use crate::utils::timestamps::rfc3339_timestamp;

/// Aggregate status document uploaded to the status blob.
///
/// Agent status is reported as plain fields; each handler entry embeds the
/// status artifact its runtime wrote, verbatim.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateStatusDocument {
    pub version: String,
    #[serde(rename = "timestampUTC")]
    pub timestamp_utc: String,
    pub aggregate_status: AggregateStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateStatus {
    pub guest_agent_status: GuestAgentStatus,
    pub handler_aggregate_status: Vec<HandlerAggregateStatus>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestAgentStatus {
    pub version: String,
    pub status: String,
    pub formatted_message: FormattedMessage,
}

#[derive(Debug, Serialize)]
pub struct FormattedMessage {
    pub lang: String,
    pub message: String,
}

impl FormattedMessage {
    pub fn en_us(message: impl Into<String>) -> Self {
        FormattedMessage {
            lang: "en-US".to_string(),
            message: message.into(),
        }
    }
}

/// Per-handler entry in the aggregate document.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerAggregateStatus {
    pub handler_name: String,
    pub handler_version: String,
    pub sequence_number: String,
    /// Status artifact written by the handler runtime.
    pub status: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heartbeat: Option<Value>,
}

impl AggregateStatusDocument {
    pub fn new(
        agent_version: &str,
        agent_status: &str,
        message: &str,
        handlers: Vec<HandlerAggregateStatus>,
    ) -> Self {
        AggregateStatusDocument {
            version: STATUS_DOCUMENT_VERSION.to_string(),
            timestamp_utc: rfc3339_timestamp(),
            aggregate_status: AggregateStatus {
                guest_agent_status: GuestAgentStatus {
                    version: agent_version.to_string(),
                    status: agent_status.to_string(),
                    formatted_message: FormattedMessage::en_us(message),
                },
                handler_aggregate_status: handlers,
            },
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|_| ProtocolError::ReportFailed { attempts: 0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn document_shape_matches_the_wire_format() {
        let handler = HandlerAggregateStatus {
            handler_name: "ExampleHandlerLinux".to_string(),
            handler_version: "1.4.2".to_string(),
            sequence_number: "0".to_string(),
            status: json!({"status": "success", "operation": "Enable"}),
            heartbeat: Some(json!([{"version": 1.0, "heartbeat": {"status": "ready"}}])),
        };
        let doc = AggregateStatusDocument::new("1.0", "Ready", "Agent is running", vec![handler]);
        let text = doc.to_json().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["version"], "1.1");
        assert!(value["timestampUTC"].is_string());
        let agent = &value["aggregateStatus"]["guestAgentStatus"];
        assert_eq!(agent["status"], "Ready");
        assert_eq!(agent["formattedMessage"]["lang"], "en-US");
        assert_eq!(agent["formattedMessage"]["message"], "Agent is running");

        let handlers = value["aggregateStatus"]["handlerAggregateStatus"]
            .as_array()
            .unwrap();
        assert_eq!(handlers.len(), 1);
        assert_eq!(handlers[0]["handlerName"], "ExampleHandlerLinux");
        assert_eq!(handlers[0]["sequenceNumber"], "0");
        assert_eq!(handlers[0]["status"]["operation"], "Enable");
    }

    #[test]
    fn absent_heartbeat_is_omitted() {
        let handler = HandlerAggregateStatus {
            handler_name: "NoBeat".to_string(),
            handler_version: "2.0".to_string(),
            sequence_number: "3".to_string(),
            status: json!({"status": "success"}),
            heartbeat: None,
        };
        let doc = AggregateStatusDocument::new("1.0", "Ready", "ok", vec![handler]);
        let text = doc.to_json().unwrap();
        assert!(!text.contains("heartbeat"));
    }
}
