//! # rampart-reputation
//!
//! The scoring half of the Rampart coordinator: converts observed request
//! volume into a bounded, time-decaying weight per `(tenant, ip)` and raises
//! threshold-crossing events when a weight change should alter enforcement.
//!
//! ## Pieces
//!
//! - [`WeightPolicy`] / [`DecayPolicy`] — every numeric constant of the
//!   scoring model, configurable rather than contractual
//! - [`WeightStore`] / [`RequestCounterStore`] — storage seams with in-memory
//!   reference implementations
//! - [`ReputationEngine`] — one observed event in, new weight plus crossing
//!   out
//! - [`DecaySweeper`] — periodic aging of inactive reputations
//!
//! The engine and sweeper only touch the store; neither knows channels exist.
//! That keeps scoring unit-testable without a live connection.

pub mod config;
pub mod decay;
pub mod engine;
pub mod error;
pub mod keyed_lock;
pub mod store;

pub use config::{DecayPolicy, WeightPolicy};
pub use decay::DecaySweeper;
pub use engine::{Crossing, CrossingEvent, Observation, ReputationEngine};
pub use error::{StoreError, StoreResult};
pub use keyed_lock::KeyedMutex;
pub use store::{
    MemoryRequestCounterStore, MemoryWeightStore, ReputationRecord, RequestCounter,
    RequestCounterStore, WeightStore,
};
