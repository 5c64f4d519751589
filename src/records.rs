//! Fire station records and the line parser that builds them from the
//! bundled delimited text.
//!
//! Parsing is lossy on purpose: a line that cannot produce a record with
//! valid coordinates is dropped and never reported as an error.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Category used when a line has no seventh field.
pub const DEFAULT_CATEGORY: &str = "Balai Bomba";

/// Every station in the dataset is reported as active.
pub const ACTIVE_STATUS: &str = "Aktif";

/// Lines with fewer fields than this are skipped.
pub const MIN_FIELDS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// Value stored in a record's open attribute map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Text(String),
    Number(f64),
    Flag(bool),
}

/// One fire station ("Balai Bomba").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationRecord {
    /// `<region>-<sequence number>`
    pub id: String,
    pub name: String,
    pub address: String,
    /// State (negeri) the station belongs to.
    pub region: String,
    pub category: String,
    pub coordinates: Coordinates,
    pub staff_total: u32,
    pub staff_female: u32,
    pub staff_male: u32,
    pub status: String,
    /// Reserved for future fields; empty for the current dataset.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, AttributeValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldState {
    /// Before the first non-whitespace character of a field.
    Start,
    Bare,
    Quoted,
    /// A quoted span has closed but the field has not ended yet.
    AfterQuote,
}

/// Splits one line into trimmed fields.
///
/// A double-quoted span forms a single field with the quotes removed, so
/// commas inside it do not split. `""` inside a quoted span is a literal
/// quote. An unterminated quote runs to the end of the line.
pub fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut state = FieldState::Start;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match (state, c) {
            (FieldState::Quoted, '"') => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    state = FieldState::AfterQuote;
                }
            }
            (FieldState::Quoted, _) => current.push(c),
            (_, ',') => {
                fields.push(current.trim().to_string());
                current.clear();
                state = FieldState::Start;
            }
            (FieldState::Start, '"') => state = FieldState::Quoted,
            (FieldState::Start, c) if c.is_whitespace() => {}
            (FieldState::Start, _) => {
                current.push(c);
                state = FieldState::Bare;
            }
            (FieldState::Bare, _) | (FieldState::AfterQuote, _) => current.push(c),
        }
    }
    fields.push(current.trim().to_string());
    fields
}

fn parse_coordinate(field: &str) -> Option<f64> {
    field.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Reads the leading digit run, so "50.5" and "50 orang" both count as 50.
fn parse_count(field: Option<&String>) -> u32 {
    let Some(field) = field else {
        return 0;
    };
    let field = field.trim_start();
    let digits = field.find(|c: char| !c.is_ascii_digit()).unwrap_or(field.len());
    field[..digits].parse().unwrap_or(0)
}

/// Builds a record from one data line, or `None` when the line is unusable.
pub fn parse_line(line: &str) -> Option<StationRecord> {
    if line.trim().is_empty() {
        return None;
    }

    let fields = split_fields(line);
    if fields.len() < MIN_FIELDS {
        trace!(fields = fields.len(), "Skipping line with too few fields");
        return None;
    }

    let lat = parse_coordinate(&fields[4]);
    let lng = parse_coordinate(&fields[5]);
    let (Some(lat), Some(lng)) = (lat, lng) else {
        trace!(line, "Skipping line with invalid coordinates");
        return None;
    };

    let region = fields[0].clone();
    let category = fields
        .get(6)
        .filter(|c| !c.is_empty())
        .cloned()
        .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());

    Some(StationRecord {
        id: format!("{}-{}", region, fields[1]),
        name: fields[2].clone(),
        address: fields[3].clone(),
        region,
        category,
        coordinates: Coordinates { lat, lng },
        staff_total: parse_count(fields.get(7)),
        staff_female: parse_count(fields.get(8)),
        staff_male: parse_count(fields.get(9)),
        status: ACTIVE_STATUS.to_string(),
        attributes: BTreeMap::new(),
    })
}

/// Parses the whole blob. The first line is a header and is always skipped.
pub fn parse_records(raw: &str) -> Vec<StationRecord> {
    let mut lines = raw.lines();
    lines.next();

    let mut total = 0usize;
    let records: Vec<StationRecord> = lines
        .filter(|l| !l.trim().is_empty())
        .inspect(|_| total += 1)
        .filter_map(parse_line)
        .collect();

    debug!(
        parsed = records.len(),
        skipped = total - records.len(),
        "Parsed station records"
    );
    records
}
