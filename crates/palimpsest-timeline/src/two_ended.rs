//! A sequence that grows at both ends without renumbering.
//!
//! History arrives from two directions: live mutations are appended, older
//! translog entries are prepended. Every item keeps the absolute index it was
//! given when it entered the sequence, so indices can be negative.
//!
//! ```text
//!   add_to_beginning          add_to_end
//!          ←  [-2][-1][0][1][2]  →
//!              ^first_idx     ^last_idx
//! ```

use std::collections::VecDeque;

use palimpsest_types::{Chunk, Transaction};

/// Items that learn their position when they enter a [`TwoEndedArray`].
pub trait Indexed {
    fn set_index(&mut self, index: i64);
}

impl Indexed for Transaction {
    fn set_index(&mut self, index: i64) {
        self.index = index;
    }
}

impl Indexed for Chunk {
    fn set_index(&mut self, index: i64) {
        self.index = index;
    }
}

/// Outcome of offering two adjacent items to a merger.
#[derive(Debug, Clone, PartialEq)]
pub enum Merge<T> {
    /// The two items became one.
    Merged(T),
    /// The items stay apart, possibly rewritten.
    Separate(T, T),
}

/// Deque addressed by stable absolute indices.
#[derive(Debug, Clone)]
pub struct TwoEndedArray<T> {
    items: VecDeque<T>,
    first_idx: i64,
}

impl<T> Default for TwoEndedArray<T> {
    fn default() -> Self {
        Self { items: VecDeque::new(), first_idx: 0 }
    }
}

impl<T: Indexed> TwoEndedArray<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Index of the first item, or where the next appended item will land
    /// when empty.
    pub fn first_idx(&self) -> i64 {
        self.first_idx
    }

    /// Index of the last item; `first_idx - 1` when empty.
    pub fn last_idx(&self) -> i64 {
        self.first_idx + self.items.len() as i64 - 1
    }

    fn offset(&self, idx: i64) -> Option<usize> {
        usize::try_from(idx - self.first_idx).ok().filter(|&o| o < self.items.len())
    }

    pub fn has(&self, idx: i64) -> bool {
        self.offset(idx).is_some()
    }

    pub fn get(&self, idx: i64) -> Option<&T> {
        self.offset(idx).and_then(|o| self.items.get(o))
    }

    pub fn get_mut(&mut self, idx: i64) -> Option<&mut T> {
        self.offset(idx).and_then(|o| self.items.get_mut(o))
    }

    pub fn first(&self) -> Option<&T> {
        self.items.front()
    }

    pub fn last(&self) -> Option<&T> {
        self.items.back()
    }

    /// Items in index order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.items.iter()
    }

    /// Append `item`, returning its index.
    pub fn add_to_end(&mut self, mut item: T) -> i64 {
        let idx = self.first_idx + self.items.len() as i64;
        item.set_index(idx);
        self.items.push_back(item);
        idx
    }

    /// Prepend `item`, returning its index.
    pub fn add_to_beginning(&mut self, mut item: T) -> i64 {
        self.first_idx -= 1;
        item.set_index(self.first_idx);
        self.items.push_front(item);
        self.first_idx
    }

    pub fn remove_from_end(&mut self) -> Option<T> {
        self.items.pop_back()
    }

    pub fn remove_from_beginning(&mut self) -> Option<T> {
        let item = self.items.pop_front()?;
        self.first_idx += 1;
        Some(item)
    }

    /// Append `item`, letting `merger(last, item)` fold it into the current
    /// last item.
    pub fn merge_at_end<F>(&mut self, item: T, merger: F)
    where
        F: FnOnce(&T, &T) -> Merge<T>,
    {
        let Some(last) = self.items.back() else {
            self.add_to_end(item);
            return;
        };

        let merged = merger(last, &item);
        self.items.pop_back();
        match merged {
            Merge::Merged(one) => {
                self.add_to_end(one);
            }
            Merge::Separate(left, right) => {
                self.add_to_end(left);
                self.add_to_end(right);
            }
        }
    }

    /// Prepend `item`, letting `merger(item, first)` fold it into the current
    /// first item.
    pub fn merge_at_beginning<F>(&mut self, item: T, merger: F)
    where
        F: FnOnce(&T, &T) -> Merge<T>,
    {
        let Some(first) = self.items.front() else {
            self.add_to_beginning(item);
            return;
        };

        let merged = merger(&item, first);
        self.remove_from_beginning();
        match merged {
            Merge::Merged(one) => {
                self.add_to_beginning(one);
            }
            Merge::Separate(left, right) => {
                self.add_to_beginning(right);
                self.add_to_beginning(left);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
