//! HPS Vertexing Simulation Harness
//!
//! Deterministic toy V0 decays with known truth, fitted by the Billoir
//! vertexer and its straight-line fallbacks. The fit statistics (vertex
//! pulls, chi2/ndf, mass pulls) decide whether a scenario passes.
//!
//! # Determinism
//!
//! All randomness comes from a single 64-bit seed through `ChaCha8Rng`, so
//! a failing seed reproduces exactly.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                   ScenarioRunner                     │
//! │  ┌────────────┐   tracks    ┌────────────────────┐   │
//! │  │  V0Oracle  │────────────►│  BilliorVertexer   │   │
//! │  │  (truth)   │             │  / straight-line   │   │
//! │  └─────┬──────┘             └─────────┬──────────┘   │
//! │        │ truth                        │ fit          │
//! │        └──────────►ValidationSession◄─┘              │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use vertexing_sim::{ScenarioId, ScenarioRunner};
//!
//! let result = ScenarioRunner::new(42).with_events(200).run(ScenarioId::PromptTarget);
//! assert!(result.passed);
//! ```

mod error;
mod exporter;
mod oracle;
mod runner;
pub mod scenarios;

pub use error::SimError;
pub use exporter::{EventRecord, FitRecord, SimExport};
pub use oracle::{TrackResolution, V0Event, V0Oracle};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use scenarios::ScenarioId;
