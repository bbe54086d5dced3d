//! REST adapter for v1.1-shaped list APIs.
//!
//! Maps the JSON endpoints onto [`CollectionClient`](crate::remote::CollectionClient)
//! and validates every payload into the typed boundary structs.
//!
//! # Module Structure
//!
//! - [`error`] - `RestError` and its mapping onto `RemoteError`
//! - [`types`] - Wire types of the JSON payloads
//! - [`convert`] - Validation of wire types into boundary structs, `RateLimitStatus`
//! - [`client`] - `RestClient`
//!
//! # Example
//!
//! ```ignore
//! use listsync::remote::{RateLimitedClient, rate_limits};
//! use listsync::rest::{DEFAULT_BASE_URL, RestClient};
//!
//! let client = RestClient::new(DEFAULT_BASE_URL, &token)?;
//! let client = RateLimitedClient::new(client, 180, rate_limits::WINDOW);
//! ```

mod client;
mod convert;
mod error;
mod types;

pub use client::{DEFAULT_BASE_URL, RestClient};
pub use convert::RateLimitStatus;
pub use error::RestError;
