//! The bundled station dataset. It is compiled into the binary and never
//! read from disk at runtime.

use std::sync::Arc;

use tracing::info;

use crate::records::{parse_records, StationRecord};

pub const RAW_CSV_DATA: &str = include_str!("../data/balai_bomba.csv");

/// Label shown next to the record count on the dashboard.
pub const DATASET_VERSION: &str = "v1.1";

/// Parses the embedded blob into the immutable session collection.
pub fn load_embedded() -> Arc<[StationRecord]> {
    let records = parse_records(RAW_CSV_DATA);
    info!(stations = records.len(), "Loaded embedded Balai Bomba dataset");
    records.into()
}
