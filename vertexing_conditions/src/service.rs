//! Publish/subscribe distribution of the active run conditions.
//!
//! A [`ConditionsService`] owns the conditions table and a `tokio::sync::watch`
//! channel. Selecting a run publishes the resolved [`RunConditions`]; every
//! [`ConditionsListener`] sees the latest value and can await changes.

use crate::error::ConditionsError;
use crate::types::{ConditionsTable, RunConditions};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

/// Owner of the active run conditions.
pub struct ConditionsService {
    /// Table used to resolve run numbers
    table: ConditionsTable,

    /// Publisher for the active conditions
    sender: watch::Sender<Arc<RunConditions>>,
}

impl ConditionsService {
    /// Creates a service publishing the table's default conditions.
    pub fn new(table: ConditionsTable) -> Self {
        let initial = Arc::new(table.default);
        let (sender, _receiver) = watch::channel(initial);
        Self { table, sender }
    }

    /// Creates a service from a JSON conditions table.
    pub fn from_json(json: &str) -> Result<Self, ConditionsError> {
        Ok(Self::new(ConditionsTable::from_json(json)?))
    }

    /// Creates a service from a conditions table file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConditionsError> {
        Ok(Self::new(ConditionsTable::from_path(path)?))
    }

    /// Returns the conditions currently in effect.
    pub fn current(&self) -> Arc<RunConditions> {
        self.sender.borrow().clone()
    }

    /// Returns the table used to resolve runs.
    pub fn table(&self) -> &ConditionsTable {
        &self.table
    }

    /// Registers a new listener. It starts with the current value marked seen.
    pub fn subscribe(&self) -> ConditionsListener {
        ConditionsListener {
            receiver: self.sender.subscribe(),
        }
    }

    /// Number of live listeners.
    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Resolves `run` against the table and publishes the result.
    ///
    /// Listeners are only notified when the resolved conditions differ from
    /// the ones already in effect.
    pub fn select_run(&self, run: i32) -> Result<Arc<RunConditions>, ConditionsError> {
        let conditions = self.table.conditions_for_run(run);
        conditions.validate()?;
        info!(run, b_field = conditions.b_field, "Selecting run conditions");
        Ok(self.publish(conditions))
    }

    /// Publishes explicit conditions, bypassing the table.
    pub fn update(&self, conditions: RunConditions) -> Result<Arc<RunConditions>, ConditionsError> {
        conditions.validate()?;
        Ok(self.publish(conditions))
    }

    /// Replaces the table and republishes the active run from it.
    pub fn reload(&mut self, table: ConditionsTable) -> Result<Arc<RunConditions>, ConditionsError> {
        table.validate()?;
        let run = self.current().run;
        self.table = table;
        self.select_run(run)
    }

    fn publish(&self, conditions: RunConditions) -> Arc<RunConditions> {
        let next = Arc::new(conditions);
        let changed = self.sender.send_if_modified(|active| {
            if **active == conditions {
                false
            } else {
                *active = next.clone();
                true
            }
        });
        debug!(run = conditions.run, changed, "Published run conditions");
        self.current()
    }
}

impl Default for ConditionsService {
    fn default() -> Self {
        Self::new(ConditionsTable::default())
    }
}

/// Receiving end of a [`ConditionsService`].
#[derive(Clone)]
pub struct ConditionsListener {
    receiver: watch::Receiver<Arc<RunConditions>>,
}

impl ConditionsListener {
    /// Returns the latest conditions and marks them as seen.
    pub fn latest(&mut self) -> Arc<RunConditions> {
        self.receiver.borrow_and_update().clone()
    }

    /// True if conditions were published since the last `latest`/`changed`.
    pub fn has_changed(&self) -> Result<bool, ConditionsError> {
        self.receiver
            .has_changed()
            .map_err(|_| ConditionsError::ServiceClosed)
    }

    /// Waits for the next change and returns the new conditions.
    pub async fn changed(&mut self) -> Result<Arc<RunConditions>, ConditionsError> {
        self.receiver
            .changed()
            .await
            .map_err(|_| ConditionsError::ServiceClosed)?;
        Ok(self.latest())
    }
}
