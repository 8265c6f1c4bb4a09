//! Portfolio flood-risk engine: per-property flood depth from a flood
//! scenario or gauge readings, depth-damage impacts, correlated Monte Carlo
//! portfolio losses, and the concentration and clustering diagnostics built
//! on them.

pub mod cluster;
pub mod config;
pub mod correlation;
pub mod damage;
pub mod depth;
pub mod error;
pub mod metrics;
pub mod model;
pub mod portfolio;
pub mod scenario;
pub mod simulation;
pub mod spatial;
pub mod types;

pub use config::ModelConfig;
pub use error::{FloodRiskError, ModelWarning, Result};
pub use model::{FloodRiskModel, RiskReport};
pub use portfolio::{FloodCenter, FloodEvent, GaugeReading, Property};
pub use simulation::SimulationResult;
