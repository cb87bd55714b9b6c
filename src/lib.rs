//! Sim-racing telemetry analysis core.
//!
//! Pitcrew turns a multiplexed stream of ~60 Hz car telemetry into racing
//! records: sessions, laps, and landmark-bound segments with driving features
//! (braking point, lift-off point, apex, coasting time, launch wheel slip).
//!
//! # Features
//!
//! - **Session registry**: one state machine per topic, created on first sight,
//!   evicted when idle, flushed to the repository in batches
//! - **Lap detection**: finish-line crossing for circuit games, frozen-clock
//!   detection for rally stages
//! - **Segment analysis**: streaming feature extraction per landmark, with a
//!   shared per-track landmark index
//! - **Workers**: tokio drivers for tick sources, optionally sharded by topic
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use chrono::Utc;
//! use pitcrew::{InMemoryRepository, PitcrewConfig, SessionRegistry, Telemetry};
//! use pitcrew::types::channels;
//!
//! let repository = Arc::new(InMemoryRepository::new());
//! let mut registry = SessionRegistry::new(repository.clone(), PitcrewConfig::default());
//!
//! let telemetry = Telemetry::new()
//!     .with(channels::DISTANCE_ROUND_TRACK, 3.5)
//!     .with(channels::CURRENT_LAP, 1)
//!     .with(channels::CURRENT_LAP_TIME, 0.1)
//!     .with(channels::LAP_TIME_PREVIOUS, 0.0)
//!     .with(channels::CURRENT_LAP_IS_VALID, true)
//!     .with(channels::PREVIOUS_LAP_WAS_VALID, true);
//!
//! let topic = "b4mad/alice/1001/iRacing/spa/gt3/Race";
//! registry.notify(topic, &telemetry, Utc::now());
//! registry.on_stop();
//!
//! let session = registry.session(topic).unwrap();
//! assert_eq!(session.current_lap().map(|lap| lap.number), Some(1));
//! ```
//!
//! ## Example (tick log replay)
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pitcrew::{Driver, InMemoryRepository, PitcrewConfig, SessionRegistry};
//! use pitcrew::providers::ReplayProvider;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PitcrewConfig::from_path("pitcrew.yaml")?;
//!     let registry = SessionRegistry::new(Arc::new(InMemoryRepository::new()), config);
//!     let source = ReplayProvider::open("ticks.jsonl").await?;
//!
//!     let registry = Driver::spawn(registry, source).join().await?;
//!     println!("{:?}", registry.stats());
//!     Ok(())
//! }
//! ```

// Core types and error handling
pub mod config;
mod error;
pub mod model;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Analysis core
pub mod analysis;
pub mod landmarks;
pub mod registry;
pub mod repository;
pub mod session;

// Stream-based tick processing
pub mod driver;
pub mod provider;
pub mod providers;

// Core exports
pub use config::{AnalysisConfig, AnalyzerConfig, AnnouncementPolicy, PitcrewConfig, RegistryConfig};
pub use error::*;
pub use types::{Presence, SampleRate, Telemetry, Tick, Topic, Value};

// Analysis exports
pub use analysis::{Features, SegmentAnalyzer};
pub use landmarks::{LandmarkCatalog, LandmarkIndex};
pub use registry::{RegistryStats, SessionRegistry};
pub use repository::{InMemoryRepository, Repository};
pub use session::{Session, StrategyTag};

// Processing exports
pub use driver::{Driver, DriverHandle, ShardedDriver};
pub use provider::TickSource;
