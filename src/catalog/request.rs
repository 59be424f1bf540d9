//! Parsed update request.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::maintenance::MaintenanceInfo;

/// Ordered mapping of parameter names to JSON values.
pub type Params = serde_json::Map<String, Value>;

/// Parsed form of a client update request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateDetails {
    /// Requested service id.
    pub service_id: String,
    /// Requested plan id.
    pub plan_id: String,
    /// Raw request parameters; absent when the client sent none.
    #[serde(default, rename = "parameters")]
    pub raw_parameters: Option<Value>,
    /// Maintenance info the client asks for.
    #[serde(default)]
    pub maintenance_info: Option<MaintenanceInfo>,
    /// Values the platform recorded for the instance before this request.
    #[serde(default)]
    pub previous_values: PreviousValues,
}

/// Previously recorded values of a service instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreviousValues {
    /// Previous plan id.
    #[serde(default)]
    pub plan_id: String,
    /// Previous service id.
    #[serde(default)]
    pub service_id: String,
    /// Organization id.
    #[serde(default)]
    pub org_id: String,
    /// Space id.
    #[serde(default)]
    pub space_id: String,
    /// Maintenance info the instance was last seen running.
    #[serde(default)]
    pub maintenance_info: Option<MaintenanceInfo>,
}

impl UpdateDetails {
    /// Returns true if the request carries no parameters.
    ///
    /// Absent, `null`, and `{}` are all empty. Anything that does not decode
    /// as an object counts as non-empty.
    #[must_use]
    pub fn parameters_empty(&self) -> bool {
        match &self.raw_parameters {
            None | Some(Value::Null) => true,
            Some(Value::Object(map)) => map.is_empty(),
            Some(_) => false,
        }
    }

    /// Returns the request parameters as an ordered mapping.
    #[must_use]
    pub fn parameters(&self) -> Params {
        match &self.raw_parameters {
            Some(Value::Object(map)) => map.clone(),
            _ => Params::new(),
        }
    }

    /// Returns true if the requested plan equals the previous plan.
    #[must_use]
    pub fn plan_unchanged(&self) -> bool {
        self.plan_id == self.previous_values.plan_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn with_params(params: Option<Value>) -> UpdateDetails {
        UpdateDetails {
            raw_parameters: params,
            ..UpdateDetails::default()
        }
    }

    #[test]
    fn test_parameters_empty() {
        assert!(with_params(None).parameters_empty());
        assert!(with_params(Some(Value::Null)).parameters_empty());
        assert!(with_params(Some(json!({}))).parameters_empty());
        assert!(!with_params(Some(json!({"size": "large"}))).parameters_empty());
        assert!(!with_params(Some(json!(["size"]))).parameters_empty());
    }

    #[test]
    fn test_parameters_keep_insertion_order() {
        let details = with_params(Some(json!({"zeta": 1, "alpha": 2, "mid": 3})));
        let keys: Vec<_> = details.parameters().keys().cloned().collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_parse_request_document() {
        let doc = r#"{
            "service_id": "svc",
            "plan_id": "plan",
            "parameters": {"a": 1},
            "maintenance_info": {"version": "2.0.0"},
            "previous_values": {"plan_id": "plan", "maintenance_info": {"version": "1.0.0"}}
        }"#;
        let details: UpdateDetails = serde_json::from_str(doc).expect("valid request");
        assert!(details.plan_unchanged());
        assert!(!details.parameters_empty());
        assert_eq!(
            details.previous_values.maintenance_info.map(|m| m.version.to_string()),
            Some(String::from("1.0.0"))
        );
    }
}
