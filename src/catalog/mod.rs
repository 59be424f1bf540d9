//! Service catalog and request types.
//!
//! This module holds the broker-facing data the operation decider reads:
//! - Plans and their maintenance info, as loaded from the catalog
//! - The parsed form of a client update request and its previous values

mod maintenance;
mod request;
mod service;

pub use maintenance::{MaintenanceInfo, maintenance_info_conflict};
pub use request::{Params, PreviousValues, UpdateDetails};
pub use service::{ServiceCatalog, ServiceDefinition, ServicePlan};
