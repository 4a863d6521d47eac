use std::collections::HashMap;
use std::fs;
use std::path::Path;

use edcsim_common::{Error, Result};

use crate::reader::EventKind;

/// One row of the raw CSV failure log: `node_id,root_cause,start_hours,down_time_hours`.
#[derive(Clone, Debug)]
pub struct FailureRecord {
    pub node: usize,
    pub root_cause: String,
    pub start_hours: f64,
    pub down_time_hours: f64,
}

/// Classifies a raw failure record into permanent or transient, by root
/// cause and down-time threshold:
///
/// - Facilities / Network -> transient.
/// - Hardware / Software with a disk-related keyword in the free-text
///   root cause -> permanent; otherwise transient.
/// - Human Error / Undetermined -> permanent iff down-time exceeds 0.25h.
pub fn classify(record: &FailureRecord) -> EventKind {
    let cause = record.root_cause.to_lowercase();
    if cause.contains("facilit") || cause.contains("network") {
        return EventKind::Transient;
    }
    if cause.contains("hardware") || cause.contains("software") {
        const DISK_KEYWORDS: [&str; 4] = ["disk", "drive", "storage", "hdd"];
        return if DISK_KEYWORDS.iter().any(|kw| cause.contains(kw)) {
            EventKind::Permanent
        } else {
            EventKind::Transient
        };
    }
    // Human Error / Undetermined / anything else.
    if record.down_time_hours > 0.25 {
        EventKind::Permanent
    } else {
        EventKind::Transient
    }
}

/// Per-node trace derived from a parsed CSV log.
#[derive(Clone, Debug, Default)]
pub struct NodeTrace {
    pub permanent: Vec<f64>,
    pub transient: Vec<f64>,
    pub transient_repair: Vec<f64>,
}

/// Converts a raw CSV failure log into per-node trace event lists, ready
/// to be written out as the files `TraceReader` expects.
pub struct Parser;

impl Parser {
    /// Parses `node_id,root_cause,start_hours,down_time_hours` rows,
    /// skipping a header line if present.
    pub fn parse_csv(contents: &str) -> Result<Vec<FailureRecord>> {
        let mut records = Vec::new();
        for (lineno, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            if fields.len() < 4 {
                return Err(Error::trace(format!("line {}: expected 4 fields, got {}", lineno + 1, fields.len())));
            }
            let Ok(node) = fields[0].parse::<usize>() else {
                if lineno == 0 {
                    continue; // header row
                }
                return Err(Error::trace(format!("line {}: invalid node id {:?}", lineno + 1, fields[0])));
            };
            let start_hours = fields[2]
                .parse::<f64>()
                .map_err(|e| Error::trace(format!("line {}: invalid start time: {e}", lineno + 1)))?;
            let down_time_hours = fields[3]
                .parse::<f64>()
                .map_err(|e| Error::trace(format!("line {}: invalid down time: {e}", lineno + 1)))?;
            records.push(FailureRecord {
                node,
                root_cause: fields[1].to_string(),
                start_hours,
                down_time_hours,
            });
        }
        Ok(records)
    }

    /// Groups classified records by node, extending the observed period to
    /// `mission_time_hours` by periodic repetition: if the trace spans an
    /// observed period `t_obs` shorter than the mission, the whole record
    /// set is replayed again (and again) at offsets of `k * t_obs` until
    /// the mission horizon is covered.
    pub fn build_node_traces(
        records: &[FailureRecord],
        mission_time_hours: f64,
    ) -> HashMap<usize, NodeTrace> {
        let mut traces: HashMap<usize, NodeTrace> = HashMap::new();
        if records.is_empty() {
            return traces;
        }

        let t_obs = records
            .iter()
            .map(|r| r.start_hours + r.down_time_hours)
            .fold(0.0_f64, f64::max)
            .max(1.0);

        let mut offset = 0.0;
        while offset < mission_time_hours {
            for record in records {
                let fail_time = record.start_hours + offset;
                if fail_time > mission_time_hours {
                    continue;
                }
                let kind = classify(record);
                let entry = traces.entry(record.node).or_default();
                match kind {
                    EventKind::Permanent => entry.permanent.push(fail_time),
                    EventKind::Transient => {
                        entry.transient.push(fail_time);
                        entry
                            .transient_repair
                            .push(fail_time + record.down_time_hours);
                    }
                    EventKind::TransientRepair => unreachable!("classify never returns this"),
                }
            }
            offset += t_obs;
        }

        for trace in traces.values_mut() {
            trace.permanent.sort_by(f64::total_cmp);
            trace.transient.sort_by(f64::total_cmp);
            trace.transient_repair.sort_by(f64::total_cmp);
        }
        traces
    }

    /// Writes one file per node per event kind under `root`, in the
    /// layout `TraceReader` reads from.
    pub fn write_traces(
        root: &Path,
        trace_id: u32,
        traces: &HashMap<usize, NodeTrace>,
    ) -> Result<()> {
        for kind in [EventKind::Permanent, EventKind::Transient, EventKind::TransientRepair] {
            fs::create_dir_all(root.join(kind.dir_name()))?;
        }
        for (&node, trace) in traces {
            Self::write_one(root, trace_id, node, EventKind::Permanent, &trace.permanent)?;
            Self::write_one(root, trace_id, node, EventKind::Transient, &trace.transient)?;
            Self::write_one(
                root,
                trace_id,
                node,
                EventKind::TransientRepair,
                &trace.transient_repair,
            )?;
        }
        Ok(())
    }

    fn write_one(root: &Path, trace_id: u32, node: usize, kind: EventKind, times: &[f64]) -> Result<()> {
        let path = root.join(kind.dir_name()).join(format!("s{trace_id}n{node}.txt"));
        let body = times.iter().map(|t| t.to_string()).collect::<Vec<_>>().join("\n");
        fs::write(path, body)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(node: usize, cause: &str, start: f64, down: f64) -> FailureRecord {
        FailureRecord {
            node,
            root_cause: cause.to_string(),
            start_hours: start,
            down_time_hours: down,
        }
    }

    #[test]
    fn facilities_and_network_classify_transient() {
        assert_eq!(classify(&record(0, "Facilities", 0.0, 100.0)), EventKind::Transient);
        assert_eq!(classify(&record(0, "Network", 0.0, 100.0)), EventKind::Transient);
    }

    #[test]
    fn hardware_disk_keyword_classifies_permanent() {
        assert_eq!(
            classify(&record(0, "Hardware - Disk controller failure", 0.0, 1.0)),
            EventKind::Permanent
        );
        assert_eq!(
            classify(&record(0, "Hardware - Fan failure", 0.0, 1.0)),
            EventKind::Transient
        );
    }

    #[test]
    fn human_error_depends_on_down_time_threshold() {
        assert_eq!(classify(&record(0, "Human Error", 0.0, 0.1)), EventKind::Transient);
        assert_eq!(classify(&record(0, "Human Error", 0.0, 0.3)), EventKind::Permanent);
    }

    #[test]
    fn csv_parse_roundtrips_basic_rows() {
        let csv = "node,cause,start,down\n0,Hardware Disk,1.5,10\n1,Network,2.0,5\n";
        let records = Parser::parse_csv(csv).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].node, 0);
        assert_eq!(records[1].root_cause, "Network");
    }

    #[test]
    fn node_traces_repeat_periodically_to_cover_the_mission() {
        let records = vec![record(0, "Hardware Disk", 10.0, 1.0)];
        let traces = Parser::build_node_traces(&records, 50.0);
        let trace = &traces[&0];
        assert!(trace.permanent.len() >= 4);
        assert!(trace.permanent.iter().all(|&t| t <= 50.0));
    }
}
