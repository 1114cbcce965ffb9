//! Outcome of one worksheet write

use std::fmt;

/// How many rows a worksheet write emitted and whether it consumed the whole source
///
/// A result is incomplete when writing stopped before the data source was
/// exhausted: the async path was cancelled, or the worksheet ran out of rows.
/// The header row is never counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WriteResult {
    rows_written: u64,
    complete: bool,
}

impl WriteResult {
    pub fn new(rows_written: u64, complete: bool) -> Self {
        WriteResult {
            rows_written,
            complete,
        }
    }

    /// Every row of the data source was written
    pub fn complete(rows_written: u64) -> Self {
        Self::new(rows_written, true)
    }

    /// Writing stopped with rows still left in the data source
    pub fn incomplete(rows_written: u64) -> Self {
        Self::new(rows_written, false)
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }
}

impl fmt::Display for WriteResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.complete {
            "complete"
        } else {
            "incomplete"
        };
        write!(f, "{} rows ({})", self.rows_written, state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_facets_round_trip() {
        for (rows, complete) in [(0, true), (0, false), (1, true), (1_048_575, false)] {
            let result = WriteResult::new(rows, complete);
            assert_eq!(result.rows_written(), rows);
            assert_eq!(result.is_complete(), complete);
        }
    }

    #[test]
    fn test_zero_rows_keeps_completion_state() {
        assert!(WriteResult::complete(0).is_complete());
        assert!(!WriteResult::incomplete(0).is_complete());
        assert_ne!(WriteResult::complete(0), WriteResult::incomplete(0));
    }

    #[test]
    fn test_display() {
        assert_eq!(WriteResult::complete(1200).to_string(), "1200 rows (complete)");
        assert_eq!(WriteResult::incomplete(7).to_string(), "7 rows (incomplete)");
    }
}
