//! Shared strings table for string deduplication
//!
//! Every distinct cell text is stored once and referenced from cells by a
//! small dense index. The table lives as long as the writer that owns it, so
//! an index handed out while writing one worksheet stays valid for every
//! later worksheet of the same workbook.

use indexmap::IndexSet;
use std::fmt;

/// Index of an entry in [`SharedStrings`]
///
/// Ids are dense, start at 0 and follow first-seen order. `Display` renders
/// the decimal form embedded in cell markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SharedStringId(u32);

impl SharedStringId {
    /// Numeric value of the id
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SharedStringId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(itoa::Buffer::new().format(self.0))
    }
}

impl From<SharedStringId> for usize {
    fn from(id: SharedStringId) -> Self {
        id.0 as usize
    }
}

/// Shared strings table that deduplicates strings across the workbook
#[derive(Debug, Default)]
pub struct SharedStrings {
    strings: IndexSet<Box<str>>,
    references: u64,
}

impl SharedStrings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-allocate room for `capacity` distinct strings
    pub fn with_capacity(capacity: usize) -> Self {
        SharedStrings {
            strings: IndexSet::with_capacity(capacity),
            references: 0,
        }
    }

    /// Add a string and get its index
    ///
    /// Returns the existing id when an equal string was added before,
    /// otherwise records the string under the next free id.
    pub fn add_string(&mut self, s: &str) -> SharedStringId {
        self.references += 1;

        if let Some(index) = self.strings.get_index_of(s) {
            return SharedStringId(index as u32);
        }

        let (index, _) = self.strings.insert_full(Box::from(s));
        SharedStringId(index as u32)
    }

    /// Id of a string already in the table
    pub fn lookup(&self, s: &str) -> Option<SharedStringId> {
        self.strings
            .get_index_of(s)
            .map(|index| SharedStringId(index as u32))
    }

    /// String stored under `id`
    ///
    /// # Panics
    ///
    /// Panics if `id` was not handed out by this table.
    pub fn get(&self, id: SharedStringId) -> &str {
        match self.try_get(id) {
            Some(s) => s,
            None => panic!(
                "shared string id {} out of range (table holds {} strings)",
                id,
                self.strings.len()
            ),
        }
    }

    /// String stored under `id`, if any
    pub fn try_get(&self, id: SharedStringId) -> Option<&str> {
        self.strings.get_index(id.0 as usize).map(|s| &**s)
    }

    /// Get number of unique strings
    pub fn count(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Number of cell references made through [`add_string`](Self::add_string)
    pub fn total_references(&self) -> u64 {
        self.references
    }

    /// Entries in id order
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (SharedStringId, &str)> + '_ {
        self.strings
            .iter()
            .enumerate()
            .map(|(index, s)| (SharedStringId(index as u32), &**s))
    }
}
