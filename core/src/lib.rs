pub mod admin;
pub mod config;
pub mod event;
pub mod importer;
pub mod names;
pub mod pipeline;
pub mod records;
pub mod reporter;
pub mod simulator;
pub mod store;

pub use config::Config;
pub use event::{Center, NextHop, ScanEvent, ScanKind, ScannerId, TroubleEvent};
pub use importer::EventImporter;
pub use pipeline::{extract_package_events, SortingCenterWorker, WorkerOptions};
pub use records::{PackageAttributes, TrackedScan};
pub use reporter::TroubleReporter;
pub use simulator::{Simulator, SimulatorConfig};
pub use store::{
    create_coord_store, create_kv_table, create_stream_bus, CoordStore, KvTable, StreamBus,
};
