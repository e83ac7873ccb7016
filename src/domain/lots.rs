//! FIFO lot tracking and realized P&L.
//!
//! Open lots live in an arena (`Vec<Lot>`) addressed from a head offset, so
//! consuming the oldest lots only advances the offset. The consumed prefix is
//! dropped once it grows past half of the storage.

use super::error::RotatorError;

/// Remainders smaller than this close the lot outright.
const LOT_EPSILON: f64 = 1e-12;

/// Compaction is skipped for small arenas.
const COMPACT_MIN_HEAD: usize = 32;

/// An unclosed purchase tranche.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lot {
    pub size: f64,
    pub price: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LotTracker {
    lots: Vec<Lot>,
    head: usize,
}

impl LotTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_lot(&mut self, size: f64, price: f64) {
        self.lots.push(Lot { size, price });
    }

    /// Oldest first.
    pub fn open_lots(&self) -> &[Lot] {
        &self.lots[self.head..]
    }

    pub fn len(&self) -> usize {
        self.lots.len() - self.head
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn open_size(&self) -> f64 {
        self.open_lots().iter().map(|lot| lot.size).sum()
    }

    pub fn clear(&mut self) {
        self.lots.clear();
        self.head = 0;
    }

    /// Close `size` units against the oldest lots at `exit_price` and return
    /// the realized P&L (gross of fees).
    ///
    /// Asking for more than is open is a caller defect; the tracker is left
    /// untouched in that case.
    pub fn consume(&mut self, size: f64, exit_price: f64) -> Result<f64, RotatorError> {
        let available = self.open_size();
        if size > available + LOT_EPSILON * available.max(1.0) {
            return Err(RotatorError::LotShortfall {
                requested: size,
                available,
            });
        }

        let mut remaining = size;
        let mut pnl = 0.0;

        while remaining > 0.0 && self.head < self.lots.len() {
            let lot = &mut self.lots[self.head];
            if lot.size <= remaining + LOT_EPSILON {
                pnl += (exit_price - lot.price) * lot.size;
                remaining -= lot.size;
                self.head += 1;
            } else {
                pnl += (exit_price - lot.price) * remaining;
                lot.size -= remaining;
                remaining = 0.0;
            }
        }

        self.compact();
        Ok(pnl)
    }

    fn compact(&mut self) {
        if self.head == self.lots.len() {
            self.clear();
        } else if self.head >= COMPACT_MIN_HEAD && self.head * 2 >= self.lots.len() {
            self.lots.drain(..self.head);
            self.head = 0;
        }
    }
}
