use std::fs;
use std::path::{Path, PathBuf};

use edcsim_common::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Permanent,
    Transient,
    TransientRepair,
}

impl EventKind {
    pub(crate) fn dir_name(self) -> &'static str {
        match self {
            Self::Permanent => "failure_events",
            Self::Transient => "transient_events",
            Self::TransientRepair => "transient_repair",
        }
    }
}

/// Reads pre-parsed per-node trace files of newline-separated hours.
///
/// One variant of the "next-failure-time" capability alongside the
/// Weibull-draw variant (`edcsim_distributions::Weibull`); the regular
/// simulator picks between them per node at reset time without branching
/// through its main loop.
pub struct TraceReader {
    root: PathBuf,
}

impl TraceReader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, trace_id: u32, node: usize, kind: EventKind) -> PathBuf {
        self.root
            .join(kind.dir_name())
            .join(format!("s{trace_id}n{node}.txt"))
    }

    /// Reads the ordered list of event times (hours) for `node` under
    /// `kind`. An absent file (a node the trace never mentions) is not an
    /// error: it yields an empty list, meaning that node never fails of
    /// this kind over the mission.
    pub fn read(&self, trace_id: u32, node: usize, kind: EventKind) -> Result<Vec<f64>> {
        let path = self.path_for(trace_id, node, kind);
        if !path.exists() {
            return Ok(Vec::new());
        }
        Self::parse_file(&path)
    }

    fn parse_file(path: &Path) -> Result<Vec<f64>> {
        let contents = fs::read_to_string(path)?;
        contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| {
                line.parse::<f64>()
                    .map_err(|e| Error::trace(format!("{}: invalid time {line:?}: {e}", path.display())))
            })
            .collect()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn missing_node_file_yields_empty_list_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let reader = TraceReader::new(dir.path());
        assert_eq!(reader.read(1, 0, EventKind::Permanent).unwrap(), Vec::<f64>::new());
    }

    #[test]
    fn parses_newline_separated_hours() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("failure_events")).unwrap();
        fs::write(dir.path().join("failure_events/s1n0.txt"), "10.5\n200\n\n3000.25\n").unwrap();
        let reader = TraceReader::new(dir.path());
        let times = reader.read(1, 0, EventKind::Permanent).unwrap();
        assert_eq!(times, vec![10.5, 200.0, 3000.25]);
    }
}
