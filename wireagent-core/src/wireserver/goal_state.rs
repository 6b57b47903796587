use quick_xml::de::from_str;
use serde::Deserialize;

use crate::types::{DocumentKind, ProtocolError, Result};

/// Top-level goal state document for one incarnation.
///
/// The incarnation is the version counter for everything reachable from
/// here: sub-document URIs, certificates, extension requests. It only moves
/// forward when the fabric publishes a new goal state.
#[derive(Debug, Deserialize, Clone)]
pub struct GoalState {
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "Incarnation")]
    pub incarnation: u32,
    #[serde(rename = "Container")]
    pub container: Container,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Container {
    #[serde(rename = "ContainerId")]
    pub container_id: String,
    #[serde(rename = "RoleInstanceList")]
    pub role_instance_list: RoleInstanceList,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RoleInstanceList {
    #[serde(rename = "RoleInstance")]
    pub role_instance: RoleInstance,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RoleInstance {
    #[serde(rename = "InstanceId")]
    pub instance_id: String,
    #[serde(rename = "State", default)]
    pub state: String,
    #[serde(rename = "Configuration")]
    pub configuration: Configuration,
}

/// Sub-document URIs issued by the fabric for this incarnation.
///
/// Hosting environment and shared config are always present; certificates
/// and extensions only when the goal state carries them.
#[derive(Debug, Deserialize, Clone)]
pub struct Configuration {
    #[serde(rename = "HostingEnvironmentConfig")]
    pub hosting_environment_config: String,
    #[serde(rename = "SharedConfig")]
    pub shared_config: String,
    #[serde(rename = "Certificates", default)]
    pub certificates: Option<String>,
    #[serde(rename = "ExtensionsConfig", default)]
    pub extensions_config: Option<String>,
    #[serde(rename = "FullConfig", default)]
    pub full_config: Option<String>,
    #[serde(rename = "ConfigName", default)]
    pub config_name: Option<String>,
}

impl GoalState {
    /// Parses and validates a goal state document.
    ///
    /// Rejects documents missing the fields the rest of the protocol relies
    /// on: the incarnation, the container/instance identity and the required
    /// sub-document URIs.
    pub fn parse(xml: &str) -> Result<Self> {
        let goal_state: GoalState = from_str(xml).map_err(|e| malformed(e.to_string()))?;

        if goal_state.container.container_id.is_empty() {
            return Err(malformed("ContainerId is empty".to_string()));
        }
        let role_instance = &goal_state.container.role_instance_list.role_instance;
        if role_instance.instance_id.is_empty() {
            return Err(malformed("RoleInstance InstanceId is empty".to_string()));
        }
        if role_instance.configuration.hosting_environment_config.is_empty() {
            return Err(malformed(
                "HostingEnvironmentConfig uri is missing".to_string(),
            ));
        }
        if role_instance.configuration.shared_config.is_empty() {
            return Err(malformed("SharedConfig uri is missing".to_string()));
        }

        Ok(goal_state)
    }

    pub fn role_instance(&self) -> &RoleInstance {
        &self.container.role_instance_list.role_instance
    }

    pub fn configuration(&self) -> &Configuration {
        &self.role_instance().configuration
    }
}

fn malformed(reason: String) -> ProtocolError {
    ProtocolError::MalformedDocument {
        kind: DocumentKind::GoalState,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<GoalState xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <Version>2012-11-30</Version>
  <Incarnation>1</Incarnation>
  <Machine>
    <ExpectedState>Started</ExpectedState>
    <LBProbePorts>
      <Port>16001</Port>
    </LBProbePorts>
  </Machine>
  <Container>
    <ContainerId>c6d5526c-5ac2-4200-b6e2-56f2b70c5ab2</ContainerId>
    <RoleInstanceList>
      <RoleInstance>
        <InstanceId>MachineRole_IN_0</InstanceId>
        <State>Started</State>
        <Configuration>
          <HostingEnvironmentConfig>http://fabric/hostingenvuri/</HostingEnvironmentConfig>
          <SharedConfig>http://fabric/sharedconfiguri/</SharedConfig>
          <ExtensionsConfig>http://fabric/extensionsconfiguri/</ExtensionsConfig>
          <FullConfig>http://fabric/fullconfiguri/</FullConfig>
          <Certificates>http://fabric/certificatesuri/</Certificates>
        </Configuration>
      </RoleInstance>
    </RoleInstanceList>
  </Container>
</GoalState>"#;

    #[test]
    fn parses_identity_and_sub_document_uris() {
        let goal_state = GoalState::parse(SAMPLE).unwrap();
        assert_eq!(goal_state.incarnation, 1);
        assert_eq!(
            goal_state.container.container_id,
            "c6d5526c-5ac2-4200-b6e2-56f2b70c5ab2"
        );
        assert_eq!(goal_state.role_instance().instance_id, "MachineRole_IN_0");

        let config = goal_state.configuration();
        assert_eq!(
            config.hosting_environment_config,
            "http://fabric/hostingenvuri/"
        );
        assert_eq!(config.shared_config, "http://fabric/sharedconfiguri/");
        assert_eq!(
            config.certificates.as_deref(),
            Some("http://fabric/certificatesuri/")
        );
        assert_eq!(
            config.extensions_config.as_deref(),
            Some("http://fabric/extensionsconfiguri/")
        );
    }

    #[test]
    fn optional_uris_may_be_absent() {
        let xml = r#"<GoalState>
  <Version>2012-11-30</Version>
  <Incarnation>4</Incarnation>
  <Container>
    <ContainerId>c-1</ContainerId>
    <RoleInstanceList>
      <RoleInstance>
        <InstanceId>r-1</InstanceId>
        <Configuration>
          <HostingEnvironmentConfig>http://fabric/he/</HostingEnvironmentConfig>
          <SharedConfig>http://fabric/sc/</SharedConfig>
        </Configuration>
      </RoleInstance>
    </RoleInstanceList>
  </Container>
</GoalState>"#;
        let goal_state = GoalState::parse(xml).unwrap();
        assert!(goal_state.configuration().certificates.is_none());
        assert!(goal_state.configuration().extensions_config.is_none());
    }

    #[test]
    fn missing_incarnation_is_malformed() {
        let xml = r#"<GoalState>
  <Version>2012-11-30</Version>
  <Container>
    <ContainerId>c-1</ContainerId>
    <RoleInstanceList>
      <RoleInstance>
        <InstanceId>r-1</InstanceId>
        <Configuration>
          <HostingEnvironmentConfig>http://fabric/he/</HostingEnvironmentConfig>
          <SharedConfig>http://fabric/sc/</SharedConfig>
        </Configuration>
      </RoleInstance>
    </RoleInstanceList>
  </Container>
</GoalState>"#;
        let err = GoalState::parse(xml).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::MalformedDocument {
                kind: DocumentKind::GoalState,
                ..
            }
        ));
    }

    #[test]
    fn missing_required_uri_is_malformed() {
        let xml = r#"<GoalState>
  <Version>2012-11-30</Version>
  <Incarnation>1</Incarnation>
  <Container>
    <ContainerId>c-1</ContainerId>
    <RoleInstanceList>
      <RoleInstance>
        <InstanceId>r-1</InstanceId>
        <Configuration>
          <HostingEnvironmentConfig></HostingEnvironmentConfig>
          <SharedConfig>http://fabric/sc/</SharedConfig>
        </Configuration>
      </RoleInstance>
    </RoleInstanceList>
  </Container>
</GoalState>"#;
        let err = GoalState::parse(xml).unwrap_err();
        assert!(err.to_string().contains("HostingEnvironmentConfig"));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(GoalState::parse("not xml at all").is_err());
    }
}
