use super::model::{ContentRecord, RetrievalOutcome};
use crate::core::extremes;

/// Every endpoint's outcome for one record, in completion order.
#[derive(Debug, Clone)]
pub struct RaceResult {
    pub record: ContentRecord,
    pub outcomes: Vec<RetrievalOutcome>,
    fastest: Option<usize>,
    slowest: Option<usize>,
}

impl RaceResult {
    /// Fastest and slowest are taken among verified outcomes only; ties go
    /// to whichever finished first.
    pub fn new(record: ContentRecord, outcomes: Vec<RetrievalOutcome>) -> Self {
        let (fastest, slowest) = extremes(&outcomes, |o| o.digest_matched.then_some(o.elapsed)).unzip();
        Self {
            record,
            outcomes,
            fastest,
            slowest,
        }
    }

    pub fn fastest(&self) -> Option<&RetrievalOutcome> { self.fastest.map(|i| &self.outcomes[i]) }

    pub fn slowest(&self) -> Option<&RetrievalOutcome> { self.slowest.map(|i| &self.outcomes[i]) }

    /// Fastest and slowest secondary reads.
    pub fn secondary_extremes(&self) -> Option<(&RetrievalOutcome, &RetrievalOutcome)> {
        extremes(&self.outcomes, |o| o.secondary.map(|s| s.elapsed))
            .map(|(fast, slow)| (&self.outcomes[fast], &self.outcomes[slow]))
    }

    pub fn failures(&self) -> usize { self.outcomes.iter().filter(|o| !o.digest_matched).count() }
}
