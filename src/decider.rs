//! Classification of update requests.
//!
//! An update request is either a data-plane update, a broker-side upgrade
//! (the client only moved maintenance info), or an invalid request. The checks
//! run in a fixed order; the order decides which failure a client sees when
//! several apply.

use std::fmt;

use tracing::{debug, warn};

use crate::catalog::{MaintenanceInfo, ServiceDefinition, UpdateDetails, maintenance_info_conflict};
use crate::error::DecisionError;

/// How an update request must be carried out.
///
/// A request that cannot be carried out at all is reported as a
/// [`DecisionError`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Apply the client's changes to the instance.
    Update,
    /// Walk the instance (and its bindings) to the broker's current tool version.
    Upgrade,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Update => f.write_str("update"),
            Self::Upgrade => f.write_str("upgrade"),
        }
    }
}

/// Outcome of comparing the request against the plan's maintenance info.
enum MaintenanceCheck {
    Match,
    MissingInRequest,
}

/// Classifies an update request.
///
/// # Errors
///
/// Returns the classification failure: an unknown plan, a maintenance info
/// conflict with the catalog, or an instance that must be upgraded before it
/// can be updated.
pub fn decide_operation(
    service: &ServiceDefinition,
    details: &UpdateDetails,
) -> Result<Operation, DecisionError> {
    match validate_maintenance_info(service, &details.plan_id, details.maintenance_info.as_ref())? {
        MaintenanceCheck::Match => {}
        MaintenanceCheck::MissingInRequest => {
            warn!("maintenance info defined in broker service catalog, but not passed in request");
            validate_previous_maintenance_info(service, details)?;
            return Ok(Operation::Update);
        }
    }

    if details.plan_unchanged()
        && details.parameters_empty()
        && maintenance_info_conflict(
            details.maintenance_info.as_ref(),
            details.previous_values.maintenance_info.as_ref(),
        )
    {
        debug!("Only maintenance info changed for plan {}, upgrading", details.plan_id);
        return Ok(Operation::Upgrade);
    }

    validate_previous_maintenance_info(service, details)?;
    Ok(Operation::Update)
}

fn validate_maintenance_info(
    service: &ServiceDefinition,
    plan_id: &str,
    requested: Option<&MaintenanceInfo>,
) -> Result<MaintenanceCheck, DecisionError> {
    let plan_info = plan_maintenance_info(service, plan_id)?;

    if !maintenance_info_conflict(requested, plan_info) {
        return Ok(MaintenanceCheck::Match);
    }

    match (requested, plan_info) {
        (None, _) => Ok(MaintenanceCheck::MissingInRequest),
        (Some(_), None) => Err(DecisionError::MaintenanceInfoNilConflict),
        (Some(_), Some(_)) => Err(DecisionError::MaintenanceInfoConflict),
    }
}

// Skipped when the instance has no recorded maintenance info or its previous
// plan is gone from the catalog.
fn validate_previous_maintenance_info(
    service: &ServiceDefinition,
    details: &UpdateDetails,
) -> Result<(), DecisionError> {
    let previous = &details.previous_values;
    let Some(previous_info) = previous.maintenance_info.as_ref() else {
        return Ok(());
    };

    if let Ok(plan_info) = plan_maintenance_info(service, &previous.plan_id)
        && maintenance_info_conflict(Some(previous_info), plan_info)
    {
        return Err(DecisionError::InstanceMustBeUpgradedFirst);
    }

    Ok(())
}

fn plan_maintenance_info<'a>(
    service: &'a ServiceDefinition,
    plan_id: &str,
) -> Result<Option<&'a MaintenanceInfo>, DecisionError> {
    service
        .plan_by_id(plan_id)
        .map(|plan| plan.maintenance_info.as_ref())
        .ok_or_else(|| DecisionError::PlanNotFound {
            plan_id: plan_id.to_string(),
        })
}
