//! Stage records and their persisted shapes.

pub mod batch;
pub mod extraction;
pub mod site;

/// Format of store keys and per-site timestamps.
///
/// Fixed width and zero padded, so lexicographic order is chronological order.
pub const RUN_KEY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
