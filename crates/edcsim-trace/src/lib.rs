//! Trace ingestion: replaying pre-recorded failure times instead of
//! drawing them from a distribution, and the CSV parser that produces the
//! per-node trace files in the first place.
//!
//! Kept as two types, mirroring the source's own `Trace`/`Parser` split:
//! `TraceReader` is the only capability the discrete-event simulators
//! depend on; `Parser` is a CLI-invoked preprocessing step.

mod parser;
mod reader;

pub use parser::{FailureRecord, NodeTrace, Parser, classify};
pub use reader::{EventKind, TraceReader};
