//! Pure transformations: backoff timing, locator parsing, extremes selection.

mod extremes;
mod locator;
mod retry;

pub use extremes::extremes;
pub use locator::{Target, parse_locator};
pub use retry::retry_delay;
