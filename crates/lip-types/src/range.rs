use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// A window of ledger sequences: bounded `[from, to]` or unbounded `[from, ∞)`.
///
/// Construction does not validate; sources reject invalid ranges when they
/// are prepared, so the check lives in one place.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerRange {
    pub from: u32,
    pub to: Option<u32>,
}

impl LedgerRange {
    pub const fn bounded(from: u32, to: u32) -> Self {
        Self { from, to: Some(to) }
    }

    pub const fn unbounded(from: u32) -> Self {
        Self { from, to: None }
    }

    pub fn from(&self) -> u32 {
        self.from
    }

    /// Upper bound, `None` when unbounded.
    pub fn to(&self) -> Option<u32> {
        self.to
    }

    pub fn is_bounded(&self) -> bool {
        self.to.is_some()
    }

    /// `from <= to` for bounded ranges; unbounded ranges are always valid.
    pub fn is_valid(&self) -> bool {
        self.to.map_or(true, |to| self.from <= to)
    }

    /// Return `self` if valid, otherwise [`TypeError::InvalidRange`].
    pub fn validate(self) -> Result<Self, TypeError> {
        match self.to {
            Some(to) if self.from > to => Err(TypeError::InvalidRange {
                from: self.from,
                to,
            }),
            _ => Ok(self),
        }
    }

    pub fn contains(&self, seq: u32) -> bool {
        seq >= self.from && self.to.map_or(true, |to| seq <= to)
    }

    /// Returns `true` if every sequence of `other` lies inside `self`.
    pub fn contains_range(&self, other: &LedgerRange) -> bool {
        if other.from < self.from {
            return false;
        }
        match (self.to, other.to) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(a), Some(b)) => b <= a,
        }
    }

    /// Number of ledgers in a bounded range.
    pub fn len(&self) -> Option<u64> {
        self.to.map(|to| u64::from(to).saturating_sub(u64::from(self.from)) + 1)
    }
}

impl fmt::Debug for LedgerRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LedgerRange{self}")
    }
}

impl fmt::Display for LedgerRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to {
            Some(to) => write!(f, "[{}, {}]", self.from, to),
            None => write!(f, "[{}, latest)", self.from),
        }
    }
}
