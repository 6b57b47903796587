use quick_xml::se::to_string;
use serde::Serialize;

use crate::types::{ProtocolError, Result};
use crate::utils::timestamps::wire_timestamp;
use crate::wireserver::goal_state::GoalState;

/// Telemetry event document POSTed to `machine?comp=telemetrydata`.
#[derive(Debug, Serialize)]
pub struct TelemetryData {
    #[serde(rename = "@version")]
    pub version: String,
    #[serde(rename = "Provider")]
    pub provider: Provider,
}

#[derive(Debug, Serialize)]
pub struct Provider {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "Event")]
    pub event: Event,
}

#[derive(Debug, Serialize)]
pub struct Event {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "EventData")]
    pub event_data: EventData,
}

#[derive(Debug, Serialize)]
pub struct EventData {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "Param")]
    pub param: Vec<Param>,
}

#[derive(Debug, Serialize)]
pub struct Param {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@value")]
    pub value: String,
}

impl Param {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Param {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl TelemetryData {
    /// Builds an event carrying the standard identity parameters plus the
    /// caller's extras.
    pub fn event(
        goal_state: &GoalState,
        agent_name: &str,
        agent_version: &str,
        event_id: &str,
        event_name: &str,
        extra: Vec<Param>,
    ) -> Self {
        let mut param = vec![
            Param::new("Version", agent_version),
            Param::new("Timestamp", wire_timestamp()),
            Param::new("Container", goal_state.container.container_id.clone()),
            Param::new(
                "RoleInstance",
                goal_state.role_instance().instance_id.clone(),
            ),
        ];
        param.extend(extra);
        TelemetryData {
            version: "1.0".to_string(),
            provider: Provider {
                id: agent_name.to_string(),
                event: Event {
                    id: event_id.to_string(),
                    event_data: EventData {
                        name: event_name.to_string(),
                        param,
                    },
                },
            },
        }
    }

    pub fn to_xml(&self) -> Result<String> {
        let body = to_string(self).map_err(|_| ProtocolError::ReportFailed { attempts: 0 })?;
        Ok(format!("<?xml version=\"1.0\" encoding=\"utf-8\"?>{body}"))
    }
}
