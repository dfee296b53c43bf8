use serde::{Deserialize, Serialize};

/// One record of the service reference dataset (ownership and on-call routing).
///
/// Attribute fields are optional: inventory records are maintained by hand
/// and frequently incomplete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceEntity {
    pub service_name: String,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub oncall_slack_channel: Option<String>,
    #[serde(default)]
    pub criticality: Option<String>,
    #[serde(default)]
    pub pagerduty_service_id: Option<String>,
}

impl ReferenceEntity {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self { service_name: service_name.into(), ..Default::default() }
    }

    pub fn team(mut self, team: impl Into<String>) -> Self {
        self.team = Some(team.into());
        self
    }

    pub fn slack_channel(mut self, channel: impl Into<String>) -> Self {
        self.oncall_slack_channel = Some(channel.into());
        self
    }

    pub fn criticality(mut self, criticality: impl Into<String>) -> Self {
        self.criticality = Some(criticality.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_attributes_deserialize_as_none() {
        let e: ReferenceEntity = serde_json::from_value(json!({
            "service_name": "auth-service",
            "team": "identity",
        }))
        .unwrap();
        assert_eq!(e.team.as_deref(), Some("identity"));
        assert!(e.oncall_slack_channel.is_none());
        assert!(e.criticality.is_none());
    }
}
