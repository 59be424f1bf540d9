//! Service and plan definitions from the broker catalog.

use serde::{Deserialize, Serialize};

use super::maintenance::MaintenanceInfo;

/// A catalog document listing service offerings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceCatalog {
    /// Service offerings.
    #[serde(default)]
    pub services: Vec<ServiceDefinition>,
}

/// A service offering and its plans.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDefinition {
    /// Service offering id.
    pub id: String,
    /// Service offering name.
    pub name: String,
    /// Plans offered by the service.
    #[serde(default)]
    pub plans: Vec<ServicePlan>,
}

/// A single plan of a service offering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicePlan {
    /// Plan id.
    pub id: String,
    /// Plan name.
    pub name: String,
    /// Current maintenance info of the plan, if the catalog declares one.
    #[serde(default)]
    pub maintenance_info: Option<MaintenanceInfo>,
}

impl ServiceCatalog {
    /// Gets a service by id.
    #[must_use]
    pub fn service_by_id(&self, id: &str) -> Option<&ServiceDefinition> {
        self.services.iter().find(|s| s.id == id)
    }
}

impl ServiceDefinition {
    /// Gets a plan by id.
    #[must_use]
    pub fn plan_by_id(&self, id: &str) -> Option<&ServicePlan> {
        self.plans.iter().find(|p| p.id == id)
    }
}
