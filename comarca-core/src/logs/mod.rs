//! Log aggregation, sanitization, and delivery.
//!
//! [`aggregator`] owns the bounded per-job buffers and live fan-out;
//! [`stream`] merges buffered and persisted history into the single sorted
//! source both transports read from; [`sanitize`] scrubs credential material
//! before entries cross any process boundary.

pub mod aggregator;
pub mod sanitize;
pub mod stream;

pub use aggregator::{LogAggregator, LogFrame};
pub use stream::{LogQueryPage, LogStream, merged_entries, open_stream, query_logs};
