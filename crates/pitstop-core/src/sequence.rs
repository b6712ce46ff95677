//! # Sequence Numbers
//!
//! Formatting for the human-readable numbers printed on bills and job cards.
//!
//! ```text
//! prefix "BS", width 3:   1 → BS001    42 → BS042    1000 → BS1000
//! ```
//!
//! The counter itself lives in the database; this module only formats.

use serde::{Deserialize, Serialize};

/// Default zero-padding width.
pub const DEFAULT_SEQUENCE_WIDTH: usize = 3;

/// Which counter a number is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceKind {
    Service,
    Order,
    Invoice,
}

impl SequenceKind {
    /// Default prefix for the counter.
    pub const fn default_prefix(&self) -> &'static str {
        match self {
            SequenceKind::Service => "SE",
            SequenceKind::Order => "OD",
            SequenceKind::Invoice => "BS",
        }
    }
}

/// Formats `value` as `prefix` + zero-padded number.
///
/// Values wider than `width` are printed in full.
///
/// ## Example
/// ```rust
/// use pitstop_core::sequence::format_sequence;
///
/// assert_eq!(format_sequence("SE", 7, 3), "SE007");
/// assert_eq!(format_sequence("BS", 1000, 3), "BS1000");
/// ```
pub fn format_sequence(prefix: &str, value: i64, width: usize) -> String {
    format!("{}{:0width$}", prefix, value, width = width)
}

/// Reads the number back out of a formatted id.
///
/// Returns `None` when the prefix does not match or the rest is not a number.
pub fn parse_sequence(prefix: &str, id: &str) -> Option<i64> {
    id.strip_prefix(prefix)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_pads_and_grows() {
        assert_eq!(format_sequence("OD", 1, 3), "OD001");
        assert_eq!(format_sequence("OD", 999, 3), "OD999");
        assert_eq!(format_sequence("OD", 1000, 3), "OD1000");
        assert_eq!(format_sequence("INV-", 12, 5), "INV-00012");
    }

    #[test]
    fn test_parse_sequence() {
        assert_eq!(parse_sequence("BS", "BS042"), Some(42));
        assert_eq!(parse_sequence("BS", "SE042"), None);
        assert_eq!(parse_sequence("BS", "BSxyz"), None);
    }

    #[test]
    fn test_default_prefixes() {
        assert_eq!(SequenceKind::Service.default_prefix(), "SE");
        assert_eq!(SequenceKind::Order.default_prefix(), "OD");
        assert_eq!(SequenceKind::Invoice.default_prefix(), "BS");
    }
}
