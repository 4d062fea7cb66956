use crate::domain::types::SubjectId;
use crate::error::{BookingError, Result};

/// Running rating aggregate for one item or user.
///
/// The stored mean keeps full precision; rounding happens display-side only,
/// so future folds never accumulate rounding error.
#[derive(Debug, Clone, PartialEq)]
pub struct RatingAggregator {
    subject: SubjectId,
    count: u64,
    mean: f64,
}

/// Point-in-time read of an aggregate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingSnapshot {
    pub count: u64,
    pub mean: f64,
    pub display_mean: f64,
}

fn is_valid_score(score: f64) -> bool {
    // Half-point increments between 1.0 and 5.0 inclusive.
    (1.0..=5.0).contains(&score) && (score * 2.0).fract() == 0.0
}

impl RatingAggregator {
    pub fn new(subject: SubjectId) -> Self {
        Self {
            subject,
            count: 0,
            mean: 0.0,
        }
    }

    /// Rehydrate from persisted parts, rejecting a corrupted aggregate.
    pub fn from_parts(subject: SubjectId, count: u64, mean: f64) -> Result<Self> {
        if count == 0 && mean != 0.0 {
            return Err(BookingError::Decode {
                record: "subject_rating",
                detail: format!("empty aggregate for {} carries mean {}", subject, mean),
            });
        }
        if count > 0 && !(1.0..=5.0).contains(&mean) {
            return Err(BookingError::Decode {
                record: "subject_rating",
                detail: format!("stored mean {} for {} is out of range", mean, subject),
            });
        }
        Ok(Self {
            subject,
            count,
            mean,
        })
    }

    pub fn subject(&self) -> &SubjectId {
        &self.subject
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Fold one score into the running mean.
    ///
    /// Uses the incremental form `mean += (score - mean) / (count + 1)`,
    /// which never materializes a running sum and stays stable over long
    /// histories.
    pub fn fold(&mut self, score: f64) -> Result<()> {
        if !is_valid_score(score) {
            return Err(BookingError::InvalidScore { score });
        }
        self.mean += (score - self.mean) / (self.count + 1) as f64;
        self.count += 1;
        Ok(())
    }

    pub fn snapshot(&self) -> RatingSnapshot {
        RatingSnapshot {
            count: self.count,
            mean: self.mean,
            display_mean: (self.mean * 10.0).round() / 10.0,
        }
    }
}
