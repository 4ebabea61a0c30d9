//! Query-algebra classification: triple graphs, the ordered decision
//! procedure, and the counters aggregated over a dataset.

mod classify;
mod graph;
mod tally;

pub use self::classify::{Classification, classify};
pub use self::graph::{TripleGraph, resolve_target};
pub use self::tally::{Bucket, Fact, Label, Tally, TallySnapshot};
