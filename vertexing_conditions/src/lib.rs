//! HPS Vertexing Run Conditions
//!
//! Beam spot and magnetic field values the vertex fitter depends on,
//! resolved per run and distributed to consumers through a watch channel.
//!
//! # Example
//!
//! ```
//! use vertexing_conditions::{ConditionsService, ConditionsTable, RunConditions};
//!
//! let service = ConditionsService::new(ConditionsTable::new(RunConditions::default()));
//! let mut listener = service.subscribe();
//!
//! service.select_run(7796).unwrap();
//! assert_eq!(listener.latest().run, 7796);
//! ```

mod error;
mod service;
mod types;

pub use error::ConditionsError;
pub use service::{ConditionsListener, ConditionsService};
pub use types::{BeamSpot, ConditionsTable, RunConditions, RunOverride};
