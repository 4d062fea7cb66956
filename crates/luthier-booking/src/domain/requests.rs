use crate::domain::calendar::AvailabilityCalendar;
use crate::domain::types::{DateRange, ItemId, Price, RequestId, RequestStatus, UserId};
use crate::error::{BookingError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// A renter's time-bounded request to book an item.
///
/// Created in `Pending`; decided exactly once by the owner. A pending
/// request reserves nothing on the calendar, so several competing requests
/// can cover the same interval and the first acceptance wins.
#[derive(Debug, Clone, PartialEq)]
pub struct ReservationRequest {
    pub id: RequestId,
    pub item_id: ItemId,
    pub requester_id: UserId,
    pub owner_id: UserId,
    pub requested_range: DateRange,
    pub unit_price: Price,
    pub computed_total: Price,
    pub status: RequestStatus,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub rated: bool,
}

impl ReservationRequest {
    pub fn new(
        item_id: ItemId,
        requester_id: UserId,
        owner_id: UserId,
        requested_range: DateRange,
        unit_price: Price,
    ) -> Result<Self> {
        if !unit_price.is_positive() {
            return Err(BookingError::InvalidPrice {
                price: unit_price.as_decimal(),
            });
        }
        let computed_total =
            unit_price.multiply(Decimal::from(requested_range.duration_in_days()));
        Ok(Self {
            id: RequestId::new(),
            item_id,
            requester_id,
            owner_id,
            requested_range,
            unit_price,
            computed_total,
            status: RequestStatus::Pending,
            rejection_reason: None,
            created_at: Utc::now(),
            decided_at: None,
            rated: false,
        })
    }

    fn ensure_transition(&self, next: RequestStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(BookingError::InvalidStateTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        Ok(())
    }

    /// Accept the request, blocking its range on the calendar.
    ///
    /// A calendar conflict leaves the request `Pending`: the slot was taken
    /// by a competing acceptance, and the owner keeps the decision (reject,
    /// or let the renter pick other dates). The request is never
    /// auto-rejected.
    pub fn accept(&mut self, calendar: &mut AvailabilityCalendar) -> Result<()> {
        self.ensure_transition(RequestStatus::Accepted)?;
        calendar.block(self.id, self.requested_range)?;
        self.status = RequestStatus::Accepted;
        self.decided_at = Some(Utc::now());
        Ok(())
    }

    /// Reject the request. The reason may be empty; it is stored verbatim.
    pub fn reject(&mut self, reason: impl Into<String>) -> Result<()> {
        self.ensure_transition(RequestStatus::Rejected)?;
        self.status = RequestStatus::Rejected;
        self.rejection_reason = Some(reason.into());
        self.decided_at = Some(Utc::now());
        Ok(())
    }

    /// Cancel an accepted booking by mutual agreement, releasing the
    /// calendar range. Unblocking is idempotent, so cancel never fails on a
    /// missing entry.
    pub fn cancel(&mut self, calendar: &mut AvailabilityCalendar) -> Result<()> {
        self.ensure_transition(RequestStatus::Cancelled)?;
        calendar.unblock(self.id);
        self.status = RequestStatus::Cancelled;
        self.decided_at = Some(Utc::now());
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
