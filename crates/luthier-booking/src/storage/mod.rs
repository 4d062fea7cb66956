pub mod records;
pub mod store;

pub use records::{
    BlockedRangeRecord, ItemRecord, RatingEventRecord, RequestRecord, SubjectRatingRecord,
};
pub use store::{collections, DocumentStore, InMemoryDocumentStore, VersionedDocument};
