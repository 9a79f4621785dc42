//! Names of the streams, tables, and coordination keys shared by every tool.

use crate::event::Center;

pub const TROUBLE_STREAM: &str = "trouble-events";

pub const PACKAGE_ATTRIBUTES_TABLE: &str = "package-attributes";
pub const PACKAGE_EVENTS_TABLE: &str = "package-events";

pub const NEXT_EVENT_KEY: &str = "next_package_event";
pub const NEXT_SCANNER_KEY: &str = "next_package_scanner";
pub const LATE_PACKAGES_KEY: &str = "late_packages";
pub const CLOCK_SYNC_KEY: &str = "clock_sync";

pub const ALL_COORDINATION_KEYS: [&str; 4] = [
    NEXT_EVENT_KEY,
    NEXT_SCANNER_KEY,
    LATE_PACKAGES_KEY,
    CLOCK_SYNC_KEY,
];

pub const END_OF_STREAM_PACKAGE_ID: &str = "end-of-stream";

/// Name of a sorting center's input stream.
pub fn input_stream(center: Center) -> String {
    format!("sorting-center-input-{center}")
}
