//! Immutable data types shared by the retrieval, retry and race layers.

pub mod model;
pub mod options;
pub mod race;

pub use model::{
    Backend, ContentRecord, Endpoint, Location, OutcomeError, RetrievalOutcome, SecondaryRead, Transport,
};
pub use options::{RaceOptions, RetryPolicy};
pub use race::RaceResult;
