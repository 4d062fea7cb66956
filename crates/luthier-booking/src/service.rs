use crate::config::BookingConfig;
use crate::domain::ledger::RentalLedger;
use crate::domain::ratings::{RatingAggregator, RatingSnapshot};
use crate::domain::requests::ReservationRequest;
use crate::domain::types::{DateRange, ItemId, Price, RequestId, RequestStatus, SubjectId, UserId};
use crate::error::{BookingError, Result};
use crate::storage::records::{ItemRecord, RatingEventRecord, RequestRecord, SubjectRatingRecord};
use crate::storage::store::{collections, DocumentStore};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Use-case surface of the reservation engine.
#[async_trait]
pub trait BookingOperations: Send + Sync {
    async fn create_item(&self, owner_id: UserId, name: String, unit_price: Price)
        -> Result<ItemId>;

    async fn set_available(&self, item_id: ItemId, available: bool) -> Result<()>;

    async fn check_availability(&self, item_id: ItemId, range: DateRange) -> Result<bool>;

    async fn submit_request(
        &self,
        item_id: ItemId,
        requester_id: UserId,
        range: DateRange,
    ) -> Result<ReservationRequest>;

    async fn decide(
        &self,
        request_id: RequestId,
        accept: bool,
        reason: Option<String>,
    ) -> Result<ReservationRequest>;

    async fn cancel(&self, request_id: RequestId) -> Result<ReservationRequest>;

    async fn record_completion(&self, request_id: RequestId, score: f64)
        -> Result<RatingSnapshot>;

    async fn get_item(&self, item_id: ItemId) -> Result<ItemRecord>;

    async fn get_request(&self, request_id: RequestId) -> Result<ReservationRequest>;

    async fn list_requests(
        &self,
        item_id: ItemId,
        status: Option<RequestStatus>,
    ) -> Result<Vec<ReservationRequest>>;
}

/// Store-backed booking service.
///
/// Stateless between calls: every operation reads the records it needs,
/// rehydrates the domain objects, applies one domain operation, and writes
/// back with a compare-and-swap on the calendar-bearing item document. Two
/// acceptances racing for the same interval therefore collapse into one
/// winner; the loser sees a conflict, which is surfaced to the caller as a
/// decision point and never retried here.
#[derive(Clone)]
pub struct BookingService {
    store: Arc<dyn DocumentStore>,
    config: BookingConfig,
}

impl BookingService {
    pub fn new(store: Arc<dyn DocumentStore>, config: BookingConfig) -> Self {
        Self { store, config }
    }

    async fn load_item(&self, item_id: ItemId) -> Result<(ItemRecord, u64)> {
        let doc = self
            .store
            .get(collections::ITEMS, &item_id.to_string())
            .await?
            .ok_or_else(|| BookingError::NotFound {
                kind: "item",
                id: item_id.to_string(),
            })?;
        Ok((ItemRecord::from_document(&doc.body)?, doc.version))
    }

    async fn load_request(&self, request_id: RequestId) -> Result<(ReservationRequest, u64)> {
        let doc = self
            .store
            .get(collections::REQUESTS, &request_id.to_string())
            .await?
            .ok_or_else(|| BookingError::NotFound {
                kind: "reservation_request",
                id: request_id.to_string(),
            })?;
        let record = RequestRecord::from_document(&doc.body)?;
        Ok((record.into_request(request_id)?, doc.version))
    }

    fn hydrate_ledger(
        &self,
        item_id: ItemId,
        item: &ItemRecord,
        requests: Vec<ReservationRequest>,
    ) -> Result<RentalLedger> {
        Ok(RentalLedger::from_parts(
            item.owner_id.clone(),
            item.unit_price,
            item.calendar(item_id)?,
            requests,
            item.item_rating(item_id)?,
        ))
    }

    async fn load_renter_rating(&self, user: &UserId) -> Result<(RatingAggregator, Option<u64>)> {
        match self
            .store
            .get(collections::SUBJECT_RATINGS, user.as_str())
            .await?
        {
            Some(doc) => {
                let aggregator = SubjectRatingRecord::from_document(&doc.body)?.into_aggregator()?;
                Ok((aggregator, Some(doc.version)))
            }
            None => Ok((
                RatingAggregator::new(SubjectId::User(user.clone())),
                None,
            )),
        }
    }

    async fn requests_for_item(&self, item_id: ItemId) -> Result<Vec<ReservationRequest>> {
        let item_key = serde_json::Value::String(item_id.to_string());
        let docs = self
            .store
            .query(collections::REQUESTS, "item_id", &item_key)
            .await?;
        let mut requests = Vec::with_capacity(docs.len());
        for (id, doc) in docs {
            let request_id = id.parse::<RequestId>().map_err(|e| BookingError::Decode {
                record: "reservation_request",
                detail: format!("invalid document key {}: {}", id, e),
            })?;
            requests.push(RequestRecord::from_document(&doc.body)?.into_request(request_id)?);
        }
        requests.sort_by_key(|r| r.created_at);
        Ok(requests)
    }

    async fn append_rating_event(&self, event: &RatingEventRecord) -> Result<()> {
        self.store
            .insert(
                collections::RATING_EVENTS,
                &Uuid::new_v4().to_string(),
                event.to_document()?,
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl BookingOperations for BookingService {
    async fn create_item(
        &self,
        owner_id: UserId,
        name: String,
        unit_price: Price,
    ) -> Result<ItemId> {
        if name.trim().is_empty() {
            return Err(BookingError::Validation {
                field: "name".to_string(),
                message: "item name must not be empty".to_string(),
            });
        }
        if !unit_price.is_positive() {
            return Err(BookingError::InvalidPrice {
                price: unit_price.as_decimal(),
            });
        }

        let item_id = ItemId::new();
        let record = ItemRecord::new(owner_id, name, unit_price);
        self.store
            .insert(
                collections::ITEMS,
                &item_id.to_string(),
                record.to_document()?,
            )
            .await?;

        info!(item_id = %item_id, "created item listing");
        Ok(item_id)
    }

    async fn set_available(&self, item_id: ItemId, available: bool) -> Result<()> {
        let (mut item, version) = self.load_item(item_id).await?;
        item.available = available;
        self.store
            .compare_and_swap(
                collections::ITEMS,
                &item_id.to_string(),
                version,
                item.to_document()?,
            )
            .await?;
        info!(item_id = %item_id, available, "updated item availability flag");
        Ok(())
    }

    async fn check_availability(&self, item_id: ItemId, range: DateRange) -> Result<bool> {
        let (item, _) = self.load_item(item_id).await?;
        Ok(item.calendar(item_id)?.is_free(&range))
    }

    async fn submit_request(
        &self,
        item_id: ItemId,
        requester_id: UserId,
        range: DateRange,
    ) -> Result<ReservationRequest> {
        let (item, _) = self.load_item(item_id).await?;
        if !item.available {
            // The listing was withdrawn; to the renter it no longer exists.
            return Err(BookingError::NotFound {
                kind: "item",
                id: item_id.to_string(),
            });
        }
        if range.duration_in_days() > self.config.max_rental_days {
            return Err(BookingError::LimitExceeded {
                detail: format!(
                    "requested {} days, limit is {}",
                    range.duration_in_days(),
                    self.config.max_rental_days
                ),
            });
        }

        let existing = self.requests_for_item(item_id).await?;
        let pending = existing
            .iter()
            .filter(|r| r.status == RequestStatus::Pending)
            .count();
        if pending >= self.config.max_pending_per_item {
            return Err(BookingError::LimitExceeded {
                detail: format!(
                    "item {} already has {} pending requests",
                    item_id, pending
                ),
            });
        }

        let mut ledger = self.hydrate_ledger(item_id, &item, Vec::new())?;
        let request = ledger.submit_request(requester_id, range)?.clone();

        self.store
            .insert(
                collections::REQUESTS,
                &request.id.to_string(),
                RequestRecord::from_request(&request).to_document()?,
            )
            .await?;

        info!(
            request_id = %request.id,
            item_id = %item_id,
            total = %request.computed_total,
            "submitted reservation request"
        );
        Ok(request)
    }

    async fn decide(
        &self,
        request_id: RequestId,
        accept: bool,
        reason: Option<String>,
    ) -> Result<ReservationRequest> {
        let (request, request_version) = self.load_request(request_id).await?;
        let item_id = request.item_id;
        let (mut item, item_version) = self.load_item(item_id).await?;

        let mut ledger = self.hydrate_ledger(item_id, &item, vec![request])?;
        let decided = ledger.decide(request_id, accept, reason)?.clone();

        if accept {
            // The item document is the CAS anchor for booking safety: a
            // version miss means another acceptance landed since our read,
            // and the slot must be re-contested, not overwritten.
            item.apply_calendar(ledger.calendar());
            self.store
                .compare_and_swap(
                    collections::ITEMS,
                    &item_id.to_string(),
                    item_version,
                    item.to_document()?,
                )
                .await?;
        }

        self.store
            .compare_and_swap(
                collections::REQUESTS,
                &request_id.to_string(),
                request_version,
                RequestRecord::from_request(&decided).to_document()?,
            )
            .await?;

        info!(
            request_id = %request_id,
            item_id = %item_id,
            status = %decided.status,
            "decided reservation request"
        );
        Ok(decided)
    }

    async fn cancel(&self, request_id: RequestId) -> Result<ReservationRequest> {
        let (request, request_version) = self.load_request(request_id).await?;
        let item_id = request.item_id;
        let (mut item, item_version) = self.load_item(item_id).await?;

        let mut ledger = self.hydrate_ledger(item_id, &item, vec![request])?;
        let cancelled = ledger.cancel(request_id)?.clone();

        item.apply_calendar(ledger.calendar());
        self.store
            .compare_and_swap(
                collections::ITEMS,
                &item_id.to_string(),
                item_version,
                item.to_document()?,
            )
            .await?;
        self.store
            .compare_and_swap(
                collections::REQUESTS,
                &request_id.to_string(),
                request_version,
                RequestRecord::from_request(&cancelled).to_document()?,
            )
            .await?;

        info!(request_id = %request_id, item_id = %item_id, "cancelled accepted booking");
        Ok(cancelled)
    }

    async fn record_completion(
        &self,
        request_id: RequestId,
        score: f64,
    ) -> Result<RatingSnapshot> {
        let (request, request_version) = self.load_request(request_id).await?;
        let item_id = request.item_id;
        let (mut item, item_version) = self.load_item(item_id).await?;

        if request.rated {
            debug!(request_id = %request_id, "completion already rated, no-op");
            return Ok(item.item_rating(item_id)?.snapshot());
        }

        let requester = request.requester_id.clone();
        let (mut renter_rating, renter_version) = self.load_renter_rating(&requester).await?;

        let mut ledger = self.hydrate_ledger(item_id, &item, vec![request])?;
        let snapshot = ledger.record_completion(request_id, score, &mut renter_rating)?;

        item.apply_rating(ledger.item_rating());
        self.store
            .compare_and_swap(
                collections::ITEMS,
                &item_id.to_string(),
                item_version,
                item.to_document()?,
            )
            .await?;

        let renter_record = SubjectRatingRecord::from_aggregator(&renter_rating);
        match renter_version {
            Some(version) => {
                self.store
                    .compare_and_swap(
                        collections::SUBJECT_RATINGS,
                        requester.as_str(),
                        version,
                        renter_record.to_document()?,
                    )
                    .await?;
            }
            None => {
                self.store
                    .insert(
                        collections::SUBJECT_RATINGS,
                        requester.as_str(),
                        renter_record.to_document()?,
                    )
                    .await?;
            }
        }

        let rated = ledger
            .request(request_id)
            .cloned()
            .ok_or_else(|| BookingError::NotFound {
                kind: "reservation_request",
                id: request_id.to_string(),
            })?;
        self.store
            .compare_and_swap(
                collections::REQUESTS,
                &request_id.to_string(),
                request_version,
                RequestRecord::from_request(&rated).to_document()?,
            )
            .await?;

        self.append_rating_event(&RatingEventRecord::new(
            &SubjectId::Item(item_id),
            score,
            request_id,
        ))
        .await?;
        self.append_rating_event(&RatingEventRecord::new(
            &SubjectId::User(requester),
            score,
            request_id,
        ))
        .await?;

        info!(
            request_id = %request_id,
            item_id = %item_id,
            count = snapshot.count,
            mean = snapshot.display_mean,
            "recorded completion rating"
        );
        Ok(snapshot)
    }

    async fn get_item(&self, item_id: ItemId) -> Result<ItemRecord> {
        let (item, _) = self.load_item(item_id).await?;
        Ok(item)
    }

    async fn get_request(&self, request_id: RequestId) -> Result<ReservationRequest> {
        let (request, _) = self.load_request(request_id).await?;
        Ok(request)
    }

    async fn list_requests(
        &self,
        item_id: ItemId,
        status: Option<RequestStatus>,
    ) -> Result<Vec<ReservationRequest>> {
        let mut requests = self.requests_for_item(item_id).await?;
        if let Some(status) = status {
            requests.retain(|r| r.status == status);
        }
        Ok(requests)
    }
}
