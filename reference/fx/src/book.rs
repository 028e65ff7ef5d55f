//! Quote book: issued quotes and their single-use markers.

use chrono::Duration;
use dashmap::DashMap;
use swapsettle_common::{is_past, QuoteId, SwapSettleError, Timestamp, UserId};
use tracing::debug;

use crate::quote::Quote;

#[derive(Debug, Clone)]
struct BookEntry {
    quote: Quote,
    consumed: bool,
}

/// Holds live quotes until they are consumed or expire.
///
/// Expiry is checked lazily on access; nothing runs on a timer.
pub struct QuoteBook {
    entries: DashMap<QuoteId, BookEntry>,
    grace: Duration,
    max_entries: usize,
}

impl QuoteBook {
    /// Create a book with the given confirmation grace and capacity.
    pub fn new(grace: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            grace,
            max_entries,
        }
    }

    /// Store a freshly issued quote.
    pub fn insert(&self, quote: Quote, now: Timestamp) {
        if self.entries.len() >= self.max_entries {
            self.cleanup_expired(now);
        }

        debug!(quote_id = %quote.id, expires_at = %quote.expires_at, "Quote stored");
        self.entries.insert(
            quote.id,
            BookEntry {
                quote,
                consumed: false,
            },
        );
    }

    /// Get a quote by ID.
    pub fn get(&self, id: &QuoteId) -> Option<Quote> {
        self.entries.get(id).map(|e| e.quote.clone())
    }

    /// Take the quote for confirmation, setting its single-use marker.
    ///
    /// The marker flips under the entry's shard lock, so of two racing
    /// callers exactly one gets the quote.
    pub fn consume(
        &self,
        id: &QuoteId,
        user_id: &UserId,
        now: Timestamp,
    ) -> Result<Quote, SwapSettleError> {
        let mut entry = self
            .entries
            .get_mut(id)
            .ok_or(SwapSettleError::QuoteExpired(*id))?;

        // Do not reveal another user's quote.
        if &entry.quote.user_id != user_id {
            return Err(SwapSettleError::QuoteExpired(*id));
        }

        if entry.consumed {
            return Err(SwapSettleError::QuoteAlreadyConsumed(*id));
        }

        if is_past(entry.quote.expires_at, self.grace, now) {
            return Err(SwapSettleError::QuoteExpired(*id));
        }

        entry.consumed = true;
        debug!(quote_id = %id, "Quote consumed");
        Ok(entry.quote.clone())
    }

    /// Clear the single-use marker after a failure that created no trade.
    pub fn restore(&self, id: &QuoteId) {
        if let Some(mut entry) = self.entries.get_mut(id) {
            entry.consumed = false;
            debug!(quote_id = %id, "Quote restored");
        }
    }

    /// Drop quotes past their expiry and grace.
    pub fn cleanup_expired(&self, now: Timestamp) -> usize {
        let before = self.entries.len();
        let grace = self.grace;
        self.entries
            .retain(|_, entry| !is_past(entry.quote.expires_at, grace, now));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed, "Expired quotes cleaned up");
        }
        removed
    }

    /// Get the number of stored quotes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the book is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get statistics.
    pub fn stats(&self, now: Timestamp) -> QuoteBookStats {
        let total = self.entries.len();
        let mut live = 0;
        let mut consumed = 0;
        for entry in self.entries.iter() {
            if entry.consumed {
                consumed += 1;
            } else if !is_past(entry.quote.expires_at, self.grace, now) {
                live += 1;
            }
        }

        QuoteBookStats {
            total_quotes: total,
            live_quotes: live,
            consumed_quotes: consumed,
            expired_quotes: total - live - consumed,
        }
    }
}

/// Quote book statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteBookStats {
    pub total_quotes: usize,
    pub live_quotes: usize,
    pub consumed_quotes: usize,
    pub expired_quotes: usize,
}
