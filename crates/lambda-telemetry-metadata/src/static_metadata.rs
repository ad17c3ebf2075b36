//! Organisation-level facts fixed at deployment time.

use crate::metadata::Metadata;
use serde::{Deserialize, Serialize};

/// Static descriptive metadata about the service and its owners.
///
/// Loaded once from configuration and never mutated afterwards. Field
/// names are snake_case in configuration files and environment variables;
/// [`to_metadata`](Self::to_metadata) emits the camelCase keys used in
/// telemetry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticMetadata {
    /// Owning organisation.
    pub owner: String,
    /// Hosting platform.
    pub host_platform: String,
    /// Business domain.
    pub domain: String,
    /// System within the domain.
    pub system: String,
    /// Service name; also used as the logger and metrics service name.
    pub service: String,
    /// Owning team.
    pub team: String,
    /// Free-form tags.
    pub tags: Vec<String>,
    /// Data sensitivity classification.
    pub data_sensitivity: String,
    /// Legal jurisdiction of the data.
    pub jurisdiction: String,
}

impl Default for StaticMetadata {
    fn default() -> Self {
        Self {
            owner: "MyCompany".to_string(),
            host_platform: "aws".to_string(),
            domain: "CustomerAcquisition".to_string(),
            system: "ShowroomActivities".to_string(),
            service: "UserSignUp".to_string(),
            team: "MyDemoTeam".to_string(),
            tags: vec!["rust".to_string(), "backend".to_string()],
            data_sensitivity: "public".to_string(),
            jurisdiction: "EU".to_string(),
        }
    }
}

impl StaticMetadata {
    /// All fields as a telemetry mapping.
    pub fn to_metadata(&self) -> Metadata {
        Metadata::new()
            .with("owner", self.owner.as_str())
            .with("hostPlatform", self.host_platform.as_str())
            .with("domain", self.domain.as_str())
            .with("system", self.system.as_str())
            .with("service", self.service.as_str())
            .with("team", self.team.as_str())
            .with("tags", self.tags.clone())
            .with("dataSensitivity", self.data_sensitivity.as_str())
            .with("jurisdiction", self.jurisdiction.as_str())
    }

    /// Only the service name, for channels that carry no organisational
    /// facts.
    pub fn service_only(&self) -> Metadata {
        Metadata::new().with("service", self.service.as_str())
    }
}
