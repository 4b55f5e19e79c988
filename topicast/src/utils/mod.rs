//! Utility functions for timestamps and file names.

mod naming;
pub mod timestamps;

pub use naming::{sanitize_topic, MAX_TOPIC_CHARS};
pub use timestamps::{format_iso8601, iso_timestamp, now_utc, run_stamp, Timestamp};
