//! heap-retention — heap retention analysis library.
//!
//! Answers "is this object still kept alive from these held values, and
//! through which references?" over a snapshot of an object heap. The heap
//! itself is reached through the [`source::HeapEdgeSource`] trait; the
//! engine only builds identity-keyed graphs and walks them.

pub mod analysis;
pub mod config;
pub mod error;
pub mod graph;
pub mod observability;
pub mod report;
pub mod source;
pub mod types;

pub use analysis::{analyze_retention, run_analysis, Analysis, RetentionResult};
pub use error::{Result, RetentionError};
pub use graph::model::{HeapGraph, RetentionGraph, SerializedGraph};
pub use source::HeapEdgeSource;
