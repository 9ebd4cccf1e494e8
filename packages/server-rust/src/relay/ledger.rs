//! Per-client token accounting.
//!
//! A client holds one counter per consumed filter. Sending a frame on a
//! filter takes a token from that filter's counter; the token comes back
//! when the frame's result is dispatched, or immediately if the frame never
//! reached an engine. Filters are independent: a client can be out of tokens
//! on one filter while still sending on another.

use std::collections::HashMap;

/// Why a token could not be taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AcquireError {
    /// No engine consumes the filter, so the ledger has no counter for it.
    #[error("no engine consumes this filter")]
    NoEngineForFilter,
    /// The counter for the filter is at zero.
    #[error("no tokens left for this filter")]
    NoTokens,
}

/// Counter state for one filter.
///
/// `available + outstanding` stays equal to the allotment the counter was
/// created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Credit {
    available: u32,
    outstanding: u32,
}

/// Token counters of one client session.
#[derive(Debug, Clone)]
pub struct TokenLedger {
    allotment: u32,
    credits: HashMap<String, Credit>,
}

impl TokenLedger {
    /// Creates a ledger with a full allotment on each of `filters`.
    pub fn new<I, S>(allotment: u32, filters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ledger = Self {
            allotment,
            credits: HashMap::new(),
        };
        for filter in filters {
            ledger.add_filter(filter);
        }
        ledger
    }

    /// Tokens each new counter starts with.
    #[must_use]
    pub fn allotment(&self) -> u32 {
        self.allotment
    }

    /// Adds a counter with a full allotment. An existing counter is left alone.
    pub fn add_filter(&mut self, filter: impl Into<String>) {
        self.credits.entry(filter.into()).or_insert(Credit {
            available: self.allotment,
            outstanding: 0,
        });
    }

    /// Removes the counter for `filter`. Returns `false` if there was none.
    pub fn remove_filter(&mut self, filter: &str) -> bool {
        self.credits.remove(filter).is_some()
    }

    /// Takes one token from `filter`'s counter.
    ///
    /// # Errors
    ///
    /// `AcquireError::NoEngineForFilter` if the ledger has no counter for the
    /// filter, `AcquireError::NoTokens` if the counter is at zero. The ledger
    /// is unchanged on error.
    pub fn try_acquire(&mut self, filter: &str) -> Result<(), AcquireError> {
        let credit = self
            .credits
            .get_mut(filter)
            .ok_or(AcquireError::NoEngineForFilter)?;
        if credit.available == 0 {
            return Err(AcquireError::NoTokens);
        }
        credit.available -= 1;
        credit.outstanding += 1;
        Ok(())
    }

    /// Returns one previously acquired token to `filter`'s counter.
    ///
    /// Returns `false` and changes nothing when no token is outstanding on
    /// the filter, including when the filter was removed (or removed and
    /// re-added) after the token was taken.
    pub fn refund(&mut self, filter: &str) -> bool {
        match self.credits.get_mut(filter) {
            Some(credit) if credit.outstanding > 0 => {
                credit.outstanding -= 1;
                credit.available += 1;
                true
            }
            _ => false,
        }
    }

    /// Tokens currently available on `filter`, or `None` if there is no counter.
    #[must_use]
    pub fn available(&self, filter: &str) -> Option<u32> {
        self.credits.get(filter).map(|credit| credit.available)
    }

    /// Tokens taken on `filter` and not yet refunded.
    #[must_use]
    pub fn outstanding(&self, filter: &str) -> Option<u32> {
        self.credits.get(filter).map(|credit| credit.outstanding)
    }

    /// Whether the ledger has a counter for `filter`.
    #[must_use]
    pub fn has_filter(&self, filter: &str) -> bool {
        self.credits.contains_key(filter)
    }

    /// Filters this ledger has counters for, in no particular order.
    pub fn filters(&self) -> impl Iterator<Item = &str> {
        self.credits.keys().map(String::as_str)
    }
}
