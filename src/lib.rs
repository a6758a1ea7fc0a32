//! Client-side data layer of the review analytics platform: filter-driven
//! query parameters, shallow and deep search, result normalization, and
//! dashboard analytics cycles.

pub mod dashboard;
pub mod error;
pub mod normalize;
pub mod query;
pub mod search;
pub mod settings;
pub mod state;
pub mod transport;

pub use error::{Error, Result};
pub use transport::{HttpTransport, Transport};
