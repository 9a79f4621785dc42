//! Shared-state record values kept in the key-value tables.

use serde::{Deserialize, Serialize};

use crate::event::{Center, ScannerId};

/// Per-package attributes shared between sorting centers.
///
/// Created on the first intake scan, updated by the weighing and output
/// scans, never deleted. Every field is optional on the wire because the
/// origin and destination centers fill in different parts of the record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intake_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<Center>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<Center>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_value: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_delivery_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_time: Option<i64>,
}

/// One entry in a package's customer-visible tracking history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedScan {
    pub event_time: i64,
    pub sorting_center: Center,
    pub scanner_id: ScannerId,
}
