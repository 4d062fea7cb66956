use crate::domain::calendar::{AvailabilityCalendar, BlockedRange};
use crate::domain::ratings::RatingAggregator;
use crate::domain::requests::ReservationRequest;
use crate::domain::types::{
    DateRange, ItemId, Price, RequestId, RequestStatus, SubjectId, SubjectKind, UserId,
};
use crate::error::{BookingError, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Decode a stored document into a typed record.
///
/// Missing or mismatched fields fail fast with a typed error; nothing is
/// silently defaulted.
fn decode<T: DeserializeOwned>(record: &'static str, document: &serde_json::Value) -> Result<T> {
    serde_json::from_value(document.clone()).map_err(|e| BookingError::Decode {
        record,
        detail: e.to_string(),
    })
}

fn encode<T: Serialize>(record: &'static str, value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| BookingError::Decode {
        record,
        detail: e.to_string(),
    })
}

/// One blocked interval as persisted on the item document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockedRangeRecord {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub request_id: RequestId,
}

/// Listed item document, keyed by item id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemRecord {
    pub owner_id: UserId,
    pub name: String,
    pub unit_price: Price,
    pub available: bool,
    pub unavailable_ranges: Vec<BlockedRangeRecord>,
    pub rating_mean: f64,
    pub rating_count: u64,
}

impl ItemRecord {
    pub fn new(owner_id: UserId, name: String, unit_price: Price) -> Self {
        Self {
            owner_id,
            name,
            unit_price,
            available: true,
            unavailable_ranges: Vec::new(),
            rating_mean: 0.0,
            rating_count: 0,
        }
    }

    pub fn from_document(document: &serde_json::Value) -> Result<Self> {
        decode("item", document)
    }

    pub fn to_document(&self) -> Result<serde_json::Value> {
        encode("item", self)
    }

    /// Rebuild the availability calendar, re-validating every stored range.
    pub fn calendar(&self, item_id: ItemId) -> Result<AvailabilityCalendar> {
        let blocked = self
            .unavailable_ranges
            .iter()
            .map(|r| {
                Ok(BlockedRange {
                    request_id: r.request_id,
                    range: DateRange::new(r.start, r.end)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        AvailabilityCalendar::from_blocked(item_id, blocked)
    }

    pub fn item_rating(&self, item_id: ItemId) -> Result<RatingAggregator> {
        RatingAggregator::from_parts(
            SubjectId::Item(item_id),
            self.rating_count,
            self.rating_mean,
        )
    }

    pub fn apply_calendar(&mut self, calendar: &AvailabilityCalendar) {
        self.unavailable_ranges = calendar
            .blocked()
            .iter()
            .map(|b| BlockedRangeRecord {
                start: b.range.start(),
                end: b.range.end(),
                request_id: b.request_id,
            })
            .collect();
    }

    pub fn apply_rating(&mut self, rating: &RatingAggregator) {
        self.rating_count = rating.count();
        self.rating_mean = rating.mean();
    }
}

/// Reservation request document, keyed by request id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestRecord {
    pub requester_id: UserId,
    pub owner_id: UserId,
    pub item_id: ItemId,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub unit_price: Price,
    pub total_price: Price,
    pub status: RequestStatus,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub rated: bool,
}

impl RequestRecord {
    pub fn from_request(request: &ReservationRequest) -> Self {
        Self {
            requester_id: request.requester_id.clone(),
            owner_id: request.owner_id.clone(),
            item_id: request.item_id,
            start_date: request.requested_range.start(),
            end_date: request.requested_range.end(),
            unit_price: request.unit_price,
            total_price: request.computed_total,
            status: request.status,
            rejection_reason: request.rejection_reason.clone(),
            created_at: request.created_at,
            decided_at: request.decided_at,
            rated: request.rated,
        }
    }

    pub fn from_document(document: &serde_json::Value) -> Result<Self> {
        decode("reservation_request", document)
    }

    pub fn to_document(&self) -> Result<serde_json::Value> {
        encode("reservation_request", self)
    }

    /// Rebuild the domain request. The document key carries the id.
    pub fn into_request(self, id: RequestId) -> Result<ReservationRequest> {
        let requested_range = DateRange::new(self.start_date, self.end_date)?;
        Ok(ReservationRequest {
            id,
            item_id: self.item_id,
            requester_id: self.requester_id,
            owner_id: self.owner_id,
            requested_range,
            unit_price: self.unit_price,
            computed_total: self.total_price,
            status: self.status,
            rejection_reason: self.rejection_reason,
            created_at: self.created_at,
            decided_at: self.decided_at,
            rated: self.rated,
        })
    }
}

/// Append-only audit record for one folded rating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingEventRecord {
    pub subject_id: String,
    pub subject_kind: SubjectKind,
    pub score: f64,
    pub related_request_id: RequestId,
    pub created_at: DateTime<Utc>,
}

impl RatingEventRecord {
    pub fn new(subject: &SubjectId, score: f64, related_request_id: RequestId) -> Self {
        Self {
            subject_id: subject.key(),
            subject_kind: subject.kind(),
            score,
            related_request_id,
            created_at: Utc::now(),
        }
    }

    pub fn to_document(&self) -> Result<serde_json::Value> {
        encode("rating_event", self)
    }

    pub fn from_document(document: &serde_json::Value) -> Result<Self> {
        decode("rating_event", document)
    }
}

/// Rolled-up rating aggregate for a non-item subject, keyed by subject id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectRatingRecord {
    pub subject_id: String,
    pub subject_kind: SubjectKind,
    pub count: u64,
    pub mean: f64,
}

impl SubjectRatingRecord {
    pub fn from_aggregator(rating: &RatingAggregator) -> Self {
        Self {
            subject_id: rating.subject().key(),
            subject_kind: rating.subject().kind(),
            count: rating.count(),
            mean: rating.mean(),
        }
    }

    pub fn from_document(document: &serde_json::Value) -> Result<Self> {
        decode("subject_rating", document)
    }

    pub fn to_document(&self) -> Result<serde_json::Value> {
        encode("subject_rating", self)
    }

    pub fn into_aggregator(self) -> Result<RatingAggregator> {
        let subject = match self.subject_kind {
            SubjectKind::User => SubjectId::User(UserId::new(self.subject_id)),
            SubjectKind::Item => {
                let item_id = ItemId::from_str(&self.subject_id).map_err(|e| {
                    BookingError::Decode {
                        record: "subject_rating",
                        detail: format!("invalid item id {}: {}", self.subject_id, e),
                    }
                })?;
                SubjectId::Item(item_id)
            }
        };
        RatingAggregator::from_parts(subject, self.count, self.mean)
    }
}
