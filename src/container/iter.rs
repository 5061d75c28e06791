//! Local cursors.
//!
//! A cursor walks one location's parts in order and never leaves the
//! location. Positions are `(part, pos)` pairs kept normalized: `pos` is
//! inside a non-empty part, or the cursor is `end()` at `(parts.len(), 0)`.
//! Stepping past a part's last element therefore lands on the next part's
//! first element, never on the previous part's end.

use super::part::Part;
use crate::distribution::types::PartId;

use parking_lot::MappedRwLockReadGuard;
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Sub};

/// Read-locked view over a location's parts. Writers on this location wait
/// until the view is dropped, so do not hold it across an `.await`.
pub struct LocalView<'a, P> {
    parts: MappedRwLockReadGuard<'a, [P]>,
}

impl<'a, P: Part> LocalView<'a, P> {
    pub(crate) fn new(parts: MappedRwLockReadGuard<'a, [P]>) -> Self {
        Self { parts }
    }

    /// Cursor on the first local element, or `end()` if there is none.
    pub fn begin(&self) -> Cursor<'_, P> {
        Cursor::begin(&self.parts)
    }

    /// Cursor one past the last local element.
    pub fn end(&self) -> Cursor<'_, P> {
        Cursor::end(&self.parts)
    }

    /// Same as `begin()`; the cursor is also an `Iterator`.
    pub fn iter(&self) -> Cursor<'_, P> {
        self.begin()
    }

    /// Elements across all local parts.
    pub fn len(&self) -> usize {
        self.parts.iter().map(Part::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Local parts, empty ones included.
    pub fn num_parts(&self) -> usize {
        self.parts.len()
    }

    pub fn parts(&self) -> &[P] {
        &self.parts
    }
}

/// Position in one location's parts. Cheap to copy; comparisons between
/// cursors over different views are meaningless.
pub struct Cursor<'a, P> {
    parts: &'a [P],
    part: usize,
    pos: usize,
}

impl<P> Clone for Cursor<'_, P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P> Copy for Cursor<'_, P> {}

impl<'a, P: Part> Cursor<'a, P> {
    /// First element of `parts`, skipping empty parts.
    pub fn begin(parts: &'a [P]) -> Self {
        Self {
            parts,
            part: 0,
            pos: 0,
        }
        .normalized()
    }

    pub fn end(parts: &'a [P]) -> Self {
        Self {
            parts,
            part: parts.len(),
            pos: 0,
        }
    }

    /// Skips empty parts so the cursor rests on an element or at `end()`.
    fn normalized(mut self) -> Self {
        while self.part < self.parts.len() && self.pos >= self.parts[self.part].len() {
            self.part += 1;
            self.pos = 0;
        }
        self
    }

    /// True once the cursor has walked past the last local element.
    pub fn is_end(&self) -> bool {
        self.part >= self.parts.len()
    }

    /// Part the cursor rests in; `None` at `end()`.
    pub fn part_id(&self) -> Option<PartId> {
        self.parts.get(self.part).map(Part::id)
    }

    /// Position within the location's concatenated parts.
    pub fn local_index(&self) -> usize {
        self.parts[..self.part.min(self.parts.len())]
            .iter()
            .map(Part::len)
            .sum::<usize>()
            + self.pos
    }

    /// Dereference by copy.
    pub fn get(&self) -> Option<P::Item>
    where
        P::Item: Clone,
    {
        self.get_ref().cloned()
    }

    /// Dereference by reference; only valid because the view is local.
    pub fn get_ref(&self) -> Option<&'a P::Item> {
        self.parts.get(self.part).and_then(|p| p.at(self.pos))
    }

    /// Moves `n` elements forward, crossing part boundaries.
    ///
    /// # Returns
    /// The moved cursor, or `None` if it would pass `end()`. Landing exactly
    /// on `end()` is allowed.
    pub fn checked_add(self, n: usize) -> Option<Self> {
        let mut cursor = self;
        let mut remaining = n;

        loop {
            if cursor.is_end() {
                return (remaining == 0).then_some(cursor);
            }
            let available = cursor.parts[cursor.part].len() - cursor.pos;
            if remaining < available {
                cursor.pos += remaining;
                return Some(cursor);
            }
            remaining -= available;
            cursor.part += 1;
            cursor.pos = 0;
            cursor = cursor.normalized();
        }
    }

    /// Moves `n` elements back; `None` if that would pass `begin()`.
    pub fn checked_sub(self, n: usize) -> Option<Self> {
        let mut cursor = self;
        let mut remaining = n;

        loop {
            if remaining <= cursor.pos {
                cursor.pos -= remaining;
                return Some(cursor);
            }
            remaining -= cursor.pos;
            if cursor.part == 0 {
                return None;
            }
            cursor.part -= 1;
            cursor.pos = cursor.parts[cursor.part].len();
        }
    }

    /// Steps one element forward. Panics at `end()`.
    pub fn advance(&mut self) {
        *self = *self + 1;
    }

    /// Steps one element back. Panics at `begin()`.
    pub fn retreat(&mut self) {
        *self = *self - 1;
    }

    /// `self - other`, counted in elements.
    pub fn distance_from(&self, other: &Self) -> isize {
        self.local_index() as isize - other.local_index() as isize
    }
}

impl<'a, P: Part> Add<usize> for Cursor<'a, P> {
    type Output = Self;

    fn add(self, n: usize) -> Self {
        match self.checked_add(n) {
            Some(cursor) => cursor,
            None => panic!(
                "cursor advanced {} past the end of the local sequence (at {})",
                n,
                self.local_index()
            ),
        }
    }
}

impl<'a, P: Part> Sub<usize> for Cursor<'a, P> {
    type Output = Self;

    fn sub(self, n: usize) -> Self {
        match self.checked_sub(n) {
            Some(cursor) => cursor,
            None => panic!(
                "cursor moved {} before the start of the local sequence (at {})",
                n,
                self.local_index()
            ),
        }
    }
}

impl<'a, P: Part> Sub for Cursor<'a, P> {
    type Output = isize;

    fn sub(self, other: Self) -> isize {
        self.distance_from(&other)
    }
}

impl<P: Part> PartialEq for Cursor<'_, P> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.parts, other.parts) && self.part == other.part && self.pos == other.pos
    }
}

impl<P: Part> Eq for Cursor<'_, P> {}

impl<P: Part> PartialOrd for Cursor<'_, P> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        std::ptr::eq(self.parts, other.parts)
            .then(|| (self.part, self.pos).cmp(&(other.part, other.pos)))
    }
}

impl<P: Part> fmt::Debug for Cursor<'_, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("part", &self.part)
            .field("pos", &self.pos)
            .finish()
    }
}

impl<'a, P: Part> Iterator for Cursor<'a, P> {
    type Item = &'a P::Item;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.get_ref()?;
        self.pos += 1;
        *self = self.normalized();
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let total: usize = self.parts.iter().map(Part::len).sum();
        let left = total - self.local_index();
        (left, Some(left))
    }
}

impl<P: Part> ExactSizeIterator for Cursor<'_, P> {}
