pub mod calendar;
pub mod ledger;
pub mod ratings;
pub mod requests;
pub mod types;

pub use calendar::{AvailabilityCalendar, BlockedRange};
pub use ledger::RentalLedger;
pub use ratings::{RatingAggregator, RatingSnapshot};
pub use requests::ReservationRequest;
pub use types::{
    DateRange, ItemId, Price, RequestId, RequestStatus, SubjectId, SubjectKind, UserId,
};
