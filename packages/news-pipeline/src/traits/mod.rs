//! Seams to the external collaborators.
//!
//! The pipeline only talks to the outside world through these traits. Real
//! adapters live in [`crate::adapters`]; mocks live in [`crate::testing`].

pub mod clock;
pub mod fetcher;
pub mod mapper;
pub mod rows;
pub mod scorer;
pub mod sites;

pub use clock::{Clock, SystemClock};
pub use fetcher::PageFetcher;
pub use mapper::{LinkMapper, MapConfig};
pub use rows::{Row, RowWriter};
pub use scorer::Scorer;
pub use sites::SiteSource;
