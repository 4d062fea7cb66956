use crate::domain::calendar::AvailabilityCalendar;
use crate::domain::ratings::{RatingAggregator, RatingSnapshot};
use crate::domain::requests::ReservationRequest;
use crate::domain::types::{DateRange, ItemId, Price, RequestId, RequestStatus, SubjectId, UserId};
use crate::error::{BookingError, Result};
use chrono::Utc;
use std::collections::HashMap;

/// Single-item rental ledger: the calendar, the request set, and the item's
/// rating aggregate, kept consistent through the use-case operations.
///
/// The ledger is pure domain state; callers that share one ledger across
/// sessions must serialize mutations (see the store-backed service layer).
#[derive(Debug, Clone)]
pub struct RentalLedger {
    item_id: ItemId,
    owner_id: UserId,
    unit_price: Price,
    calendar: AvailabilityCalendar,
    requests: HashMap<RequestId, ReservationRequest>,
    item_rating: RatingAggregator,
}

impl RentalLedger {
    pub fn new(item_id: ItemId, owner_id: UserId, unit_price: Price) -> Self {
        Self {
            item_id,
            owner_id,
            unit_price,
            calendar: AvailabilityCalendar::new(item_id),
            requests: HashMap::new(),
            item_rating: RatingAggregator::new(SubjectId::Item(item_id)),
        }
    }

    /// Rehydrate a ledger from persisted state.
    pub fn from_parts(
        owner_id: UserId,
        unit_price: Price,
        calendar: AvailabilityCalendar,
        requests: Vec<ReservationRequest>,
        item_rating: RatingAggregator,
    ) -> Self {
        let item_id = calendar.item_id();
        Self {
            item_id,
            owner_id,
            unit_price,
            calendar,
            requests: requests.into_iter().map(|r| (r.id, r)).collect(),
            item_rating,
        }
    }

    /// Create a pending request against this item.
    ///
    /// Deliberately does not consult the calendar: a pending request reserves
    /// nothing, and competing requests over the same interval are resolved
    /// first-accept-wins at decision time.
    pub fn submit_request(
        &mut self,
        requester_id: UserId,
        range: DateRange,
    ) -> Result<&ReservationRequest> {
        if requester_id == self.owner_id {
            return Err(BookingError::Validation {
                field: "requester_id".to_string(),
                message: "owners cannot rent their own listing".to_string(),
            });
        }
        let request = ReservationRequest::new(
            self.item_id,
            requester_id,
            self.owner_id.clone(),
            range,
            self.unit_price,
        )?;
        let id = request.id;
        self.requests.insert(id, request);
        Ok(&self.requests[&id])
    }

    /// Apply the owner's decision to a pending request.
    pub fn decide(
        &mut self,
        request_id: RequestId,
        accept: bool,
        reason: Option<String>,
    ) -> Result<&ReservationRequest> {
        let request =
            self.requests
                .get_mut(&request_id)
                .ok_or_else(|| BookingError::NotFound {
                    kind: "reservation_request",
                    id: request_id.to_string(),
                })?;
        if accept {
            request.accept(&mut self.calendar)?;
        } else {
            request.reject(reason.unwrap_or_default())?;
        }
        Ok(request)
    }

    /// Cancel an accepted booking, releasing its calendar range.
    pub fn cancel(&mut self, request_id: RequestId) -> Result<&ReservationRequest> {
        let request =
            self.requests
                .get_mut(&request_id)
                .ok_or_else(|| BookingError::NotFound {
                    kind: "reservation_request",
                    id: request_id.to_string(),
                })?;
        request.cancel(&mut self.calendar)?;
        Ok(request)
    }

    /// Fold one completed rental's score into the item aggregate and the
    /// renter's aggregate. Each request rates at most once; the duplicate
    /// call is a no-op returning the current item snapshot.
    pub fn record_completion(
        &mut self,
        request_id: RequestId,
        score: f64,
        renter_rating: &mut RatingAggregator,
    ) -> Result<RatingSnapshot> {
        let request =
            self.requests
                .get_mut(&request_id)
                .ok_or_else(|| BookingError::NotFound {
                    kind: "reservation_request",
                    id: request_id.to_string(),
                })?;
        if request.rated {
            return Ok(self.item_rating.snapshot());
        }
        if request.status != RequestStatus::Accepted {
            return Err(BookingError::InvalidStateTransition {
                from: request.status.to_string(),
                to: "completed".to_string(),
            });
        }
        if request.requested_range.end() > Utc::now() {
            return Err(BookingError::InvalidStateTransition {
                from: "accepted".to_string(),
                to: "completed".to_string(),
            });
        }
        if renter_rating.subject() != &SubjectId::User(request.requester_id.clone()) {
            return Err(BookingError::Validation {
                field: "renter_rating".to_string(),
                message: format!(
                    "aggregate subject {} does not match requester {}",
                    renter_rating.subject(),
                    request.requester_id
                ),
            });
        }
        self.item_rating.fold(score)?;
        renter_rating.fold(score)?;
        request.rated = true;
        Ok(self.item_rating.snapshot())
    }

    pub fn item_id(&self) -> ItemId {
        self.item_id
    }

    pub fn owner_id(&self) -> &UserId {
        &self.owner_id
    }

    pub fn unit_price(&self) -> Price {
        self.unit_price
    }

    pub fn is_free(&self, range: &DateRange) -> bool {
        self.calendar.is_free(range)
    }

    pub fn calendar(&self) -> &AvailabilityCalendar {
        &self.calendar
    }

    pub fn request(&self, request_id: RequestId) -> Option<&ReservationRequest> {
        self.requests.get(&request_id)
    }

    pub fn requests(&self) -> impl Iterator<Item = &ReservationRequest> {
        self.requests.values()
    }

    pub fn pending_count(&self) -> usize {
        self.requests
            .values()
            .filter(|r| r.status == RequestStatus::Pending)
            .count()
    }

    pub fn item_rating(&self) -> &RatingAggregator {
        &self.item_rating
    }
}
