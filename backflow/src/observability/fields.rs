//! Formatting helpers for structured log fields.

use crate::protocol::UNBOUNDED;

/// Renders a demand value, spelling out the unbounded sentinel.
pub fn format_demand(n: u64) -> String {
    if n == UNBOUNDED {
        "unbounded".to_string()
    } else {
        n.to_string()
    }
}
