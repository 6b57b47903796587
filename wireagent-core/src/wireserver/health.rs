use quick_xml::se::to_string;
use serde::Serialize;

use crate::types::{ProtocolError, Result};
use crate::wireserver::goal_state::GoalState;

/// Provisioning health document POSTed to `machine?comp=health`.
#[derive(Debug, Serialize)]
pub struct Health {
    #[serde(rename = "GoalStateIncarnation")]
    pub goal_state_incarnation: u32,
    #[serde(rename = "Container")]
    pub container: HealthContainer,
}

#[derive(Debug, Serialize)]
pub struct HealthContainer {
    #[serde(rename = "ContainerId")]
    pub container_id: String,
    #[serde(rename = "RoleInstanceList")]
    pub role_instance_list: HealthRoleInstanceList,
}

#[derive(Debug, Serialize)]
pub struct HealthRoleInstanceList {
    #[serde(rename = "Role")]
    pub role: HealthRole,
}

#[derive(Debug, Serialize)]
pub struct HealthRole {
    #[serde(rename = "InstanceId")]
    pub instance_id: String,
    #[serde(rename = "Health")]
    pub health: HealthState,
}

#[derive(Debug, Serialize)]
pub struct HealthState {
    #[serde(rename = "State")]
    pub state: String,
    #[serde(rename = "Details", skip_serializing_if = "Option::is_none")]
    pub details: Option<HealthDetails>,
}

/// Optional sub-status block; carried while provisioning is in flight.
#[derive(Debug, Serialize)]
pub struct HealthDetails {
    #[serde(rename = "SubStatus")]
    pub sub_status: String,
    #[serde(rename = "Description")]
    pub description: String,
}

impl Health {
    /// Builds the health payload for the current goal state identity.
    ///
    /// An empty `sub_status` omits the `Details` element entirely, which is
    /// how a terminal `Ready` is reported.
    pub fn provisioning(
        goal_state: &GoalState,
        state: &str,
        sub_status: &str,
        description: &str,
    ) -> Self {
        let details = if sub_status.is_empty() {
            None
        } else {
            Some(HealthDetails {
                sub_status: sub_status.to_string(),
                description: description.to_string(),
            })
        };
        Health {
            goal_state_incarnation: goal_state.incarnation,
            container: HealthContainer {
                container_id: goal_state.container.container_id.clone(),
                role_instance_list: HealthRoleInstanceList {
                    role: HealthRole {
                        instance_id: goal_state.role_instance().instance_id.clone(),
                        health: HealthState {
                            state: state.to_string(),
                            details,
                        },
                    },
                },
            },
        }
    }

    /// Serializes with the XML declaration the fabric expects on POSTs.
    pub fn to_xml(&self) -> Result<String> {
        let body = to_string(self).map_err(|_| ProtocolError::ReportFailed { attempts: 0 })?;
        Ok(format!("<?xml version=\"1.0\" encoding=\"utf-8\"?>{body}"))
    }
}
