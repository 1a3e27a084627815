use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, info};

use crate::history::RunHandle;
use crate::panel::display::DisplayConfig;
use crate::panel::{Panel, PanelError};
use crate::storage::{self, Pool};

#[derive(Clone)]
pub struct AppState {
    pub panel: Panel,
    /// History store; `None` keeps history in memory only.
    pub store: Option<Pool>,
    pub display: Arc<DisplayConfig>,
    /// Runs changed in memory but not yet stored. The lock also serializes
    /// run writes so stored rows follow the in-memory order.
    unsaved: Arc<Mutex<HashSet<RunHandle>>>,
}

impl AppState {
    pub fn new(panel: Panel, store: Option<Pool>, display: DisplayConfig) -> Self {
        Self {
            panel,
            store,
            display: Arc::new(display),
            unsaved: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Apply a run-changing operation and write the run it names through to
    /// the store.
    ///
    /// Returns the operation's value and whether every changed run reached
    /// the store. A run that could not be stored stays queued and is retried
    /// on the next write, so a storage failure never undoes or hides a change
    /// the panel has already made.
    pub fn write_run<T>(
        &self,
        op: impl FnOnce(&Panel) -> Result<(T, Option<RunHandle>), PanelError>,
    ) -> Result<(T, bool), PanelError> {
        let mut unsaved = self.unsaved.lock();
        let (value, run) = op(&self.panel)?;
        if let Some(handle) = run {
            unsaved.insert(handle);
        }
        let persisted = self.flush(&mut unsaved);
        Ok((value, persisted))
    }

    /// Number of runs waiting to be stored.
    pub fn unsaved_runs(&self) -> usize {
        self.unsaved.lock().len()
    }

    fn flush(&self, unsaved: &mut HashSet<RunHandle>) -> bool {
        let Some(pool) = &self.store else {
            unsaved.clear();
            return true;
        };
        let queued = unsaved.len();
        unsaved.retain(|&handle| {
            let Some(entry) = self.panel.run(handle) else {
                return false;
            };
            match storage::save_run(pool, &entry) {
                Ok(()) => false,
                Err(e) => {
                    error!(run = %handle, error = %e, "failed to persist test run, will retry");
                    true
                }
            }
        });
        if queued > 1 && unsaved.is_empty() {
            info!(count = queued, "stored queued test runs");
        }
        unsaved.is_empty()
    }
}
