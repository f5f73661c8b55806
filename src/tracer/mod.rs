pub mod dfs;
pub mod tree;

pub use dfs::Tracer;
pub use tree::{Investigation, TerminationReason, TraceMetadata, TraceNode, TxSummary};
