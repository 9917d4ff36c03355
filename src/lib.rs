//! Hospital procedure cost and quality navigator.
//!
//! Ranks providers for an MS-DRG by average covered charges or rating,
//! optionally restricted to a radius around a ZIP code, and answers
//! free-text questions by translating them onto the same allow-listed
//! queries.

pub mod answer;
pub mod app;
pub mod assistant;
pub mod cli;
pub mod download;
pub mod error;
pub mod geo;
pub mod load;
pub mod model;
pub mod query;
pub mod ranking;
pub mod scope;
pub mod server;
pub mod storage;
pub mod store;
pub mod translate;

pub use answer::{GroundedAnswer, GroundedExecutor};
pub use error::{NavigatorError, NavigatorResult};
pub use ranking::{ProviderSearch, RankingEngine};
