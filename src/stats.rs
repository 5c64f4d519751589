//! Aggregate statistics over the station collection. Recomputed for every
//! question; the dataset is small and never changes during a session.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::records::StationRecord;

/// Projection of a record used to ground the model on real rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StationSample {
    #[serde(rename = "nama")]
    pub name: String,
    #[serde(rename = "negeri")]
    pub region: String,
    #[serde(rename = "jumlah_anggota")]
    pub staff_total: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DatasetStats {
    /// Station count per region, ordered by region name.
    pub region_counts: BTreeMap<String, usize>,
    pub station_count: usize,
    pub total_staff: u64,
    pub female_staff: u64,
    pub male_staff: u64,
    pub sample: Vec<StationSample>,
}

/// Computes the statistics, keeping the first `sample_size` records as the sample.
///
/// Female and male totals are summed from their own columns and are not
/// expected to add up to `total_staff`.
pub fn summarize(records: &[StationRecord], sample_size: usize) -> DatasetStats {
    let mut stats = DatasetStats {
        station_count: records.len(),
        ..Default::default()
    };

    for record in records {
        *stats.region_counts.entry(record.region.clone()).or_insert(0) += 1;
        stats.total_staff += u64::from(record.staff_total);
        stats.female_staff += u64::from(record.staff_female);
        stats.male_staff += u64::from(record.staff_male);
    }

    stats.sample = records
        .iter()
        .take(sample_size)
        .map(|r| StationSample {
            name: r.name.clone(),
            region: r.region.clone(),
            staff_total: r.staff_total,
        })
        .collect();

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::parse_line;

    fn record(line: &str) -> StationRecord {
        parse_line(line).unwrap()
    }

    fn fixture() -> Vec<StationRecord> {
        vec![
            record("Selangor,1,Balai A,Jalan 1,3.1,101.6,Balai Bomba,50,10,40"),
            record("Selangor,2,Balai B,Jalan 2,3.0,101.5,Balai Bomba,30,5,20"),
            record("Kedah,1,Balai C,Jalan 3,6.1,100.3,Balai Bomba,20,2,18"),
            record("Johor,1,Balai D,Jalan 4,1.5,103.7"),
        ]
    }

    #[test]
    fn test_region_counts_sum_to_station_count() {
        let stats = summarize(&fixture(), 5);
        assert_eq!(stats.station_count, 4);
        assert_eq!(stats.region_counts.values().sum::<usize>(), stats.station_count);
        assert_eq!(stats.region_counts["Selangor"], 2);
        assert_eq!(stats.region_counts["Kedah"], 1);
        assert_eq!(stats.region_counts["Johor"], 1);
    }

    #[test]
    fn test_staff_totals_are_independent_columns() {
        let stats = summarize(&fixture(), 5);
        assert_eq!(stats.total_staff, 100);
        assert_eq!(stats.female_staff, 17);
        assert_eq!(stats.male_staff, 78);
        // Balai B reports 30 staff but only 25 split by gender.
        assert_ne!(stats.female_staff + stats.male_staff, stats.total_staff);
    }

    #[test]
    fn test_sample_takes_first_records_in_order() {
        let stats = summarize(&fixture(), 2);
        assert_eq!(
            stats.sample,
            vec![
                StationSample {
                    name: "Balai A".to_string(),
                    region: "Selangor".to_string(),
                    staff_total: 50,
                },
                StationSample {
                    name: "Balai B".to_string(),
                    region: "Selangor".to_string(),
                    staff_total: 30,
                },
            ]
        );

        assert_eq!(summarize(&fixture(), 10).sample.len(), 4);
        assert!(summarize(&fixture(), 0).sample.is_empty());
    }

    #[test]
    fn test_empty_collection_yields_zeroes() {
        let stats = summarize(&[], 5);
        assert_eq!(stats, DatasetStats::default());
        assert!(stats.region_counts.is_empty());
        assert_eq!(stats.station_count, 0);
        assert_eq!(stats.total_staff, 0);
    }

    #[test]
    fn test_sample_serializes_with_malay_keys() {
        let stats = summarize(&fixture(), 1);
        let json = serde_json::to_string(&stats.sample).unwrap();
        assert_eq!(
            json,
            r#"[{"nama":"Balai A","negeri":"Selangor","jumlah_anggota":50}]"#
        );
    }
}
