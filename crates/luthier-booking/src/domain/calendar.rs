use crate::domain::types::{DateRange, ItemId, RequestId};
use crate::error::{BookingError, Result};

/// A confirmed booking on the calendar, tagged with the request that owns it.
///
/// Blocked ranges are never merged with their neighbors so that each entry
/// keeps a 1:1 mapping with an accepted request and can be released on
/// cancellation.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockedRange {
    pub request_id: RequestId,
    pub range: DateRange,
}

/// Per-item set of blocked date ranges, kept sorted by start time.
///
/// Readers only observe the calendar through `is_free`; mutation happens
/// exclusively through `block`/`unblock` driven by request decisions.
#[derive(Debug, Clone)]
pub struct AvailabilityCalendar {
    item_id: ItemId,
    blocked: Vec<BlockedRange>,
}

impl AvailabilityCalendar {
    pub fn new(item_id: ItemId) -> Self {
        Self {
            item_id,
            blocked: Vec::new(),
        }
    }

    /// Rebuild a calendar from persisted entries, re-validating the
    /// no-overlap invariant. A stored overlap means the backing document
    /// was corrupted, so rehydration fails instead of repairing silently.
    pub fn from_blocked(item_id: ItemId, mut blocked: Vec<BlockedRange>) -> Result<Self> {
        blocked.sort_by_key(|b| b.range.start());
        for pair in blocked.windows(2) {
            if pair[0].range.overlaps(&pair[1].range) {
                return Err(BookingError::Decode {
                    record: "item",
                    detail: format!(
                        "stored ranges for item {} overlap ({} and {})",
                        item_id, pair[0].request_id, pair[1].request_id
                    ),
                });
            }
            if pair[0].request_id == pair[1].request_id {
                return Err(BookingError::Decode {
                    record: "item",
                    detail: format!(
                        "duplicate blocked range for request {}",
                        pair[0].request_id
                    ),
                });
            }
        }
        Ok(Self { item_id, blocked })
    }

    pub fn item_id(&self) -> ItemId {
        self.item_id
    }

    /// True iff `range` overlaps no blocked range.
    ///
    /// Entries are non-overlapping and sorted by start, so their end times
    /// are sorted as well; a binary search on end time finds the only
    /// candidate that could intersect.
    pub fn is_free(&self, range: &DateRange) -> bool {
        let idx = self
            .blocked
            .partition_point(|b| b.range.end() <= range.start());
        match self.blocked.get(idx) {
            Some(candidate) => !candidate.range.overlaps(range),
            None => true,
        }
    }

    /// Atomic check-and-insert. The free recheck here is mandatory even when
    /// the caller already validated: another acceptance may have landed in
    /// between, and that race must surface as a conflict.
    pub fn block(&mut self, request_id: RequestId, range: DateRange) -> Result<()> {
        if self.blocked.iter().any(|b| b.request_id == request_id) {
            return Err(BookingError::Conflict {
                subject: self.item_id.to_string(),
                detail: format!("request {} already holds a blocked range", request_id),
            });
        }
        if !self.is_free(&range) {
            return Err(BookingError::Conflict {
                subject: self.item_id.to_string(),
                detail: format!(
                    "range {}..{} overlaps an existing booking",
                    range.start(),
                    range.end()
                ),
            });
        }
        let idx = self
            .blocked
            .partition_point(|b| b.range.start() < range.start());
        self.blocked.insert(idx, BlockedRange { request_id, range });
        Ok(())
    }

    /// Release the range held by `request_id`. Returns `false` when no such
    /// entry exists, which makes cancellation idempotent.
    pub fn unblock(&mut self, request_id: RequestId) -> bool {
        match self.blocked.iter().position(|b| b.request_id == request_id) {
            Some(idx) => {
                self.blocked.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn blocked(&self) -> &[BlockedRange] {
        &self.blocked
    }

    pub fn len(&self) -> usize {
        self.blocked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocked.is_empty()
    }
}
