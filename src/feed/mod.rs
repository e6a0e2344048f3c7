//! Tick sources.
//!
//! The core does not care where ticks come from. [`MockFeed`] is a simulated
//! source for demos and tests; anything that yields [`Tick`](crate::Tick)
//! values on a channel can be plugged into
//! [`PriceWatch::spawn_ingest`](crate::PriceWatch::spawn_ingest).

/// Random-walk price simulator.
pub mod mock;

pub use mock::{random_walk, seed_price, MockFeed, PRICE_FLOOR};
