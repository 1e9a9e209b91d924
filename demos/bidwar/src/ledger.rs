use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("no entry named {0:?} on the sheet")]
    UnknownEntry(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Row {
    pub goal: i64,
    pub funded: i64,
}

impl Row {
    pub fn remaining(&self) -> i64 {
        (self.goal - self.funded).max(0)
    }
}

/// Stand-in for the remote spreadsheet: every call is a slow round trip and
/// nothing is transactional.
#[derive(Clone)]
pub struct LedgerClient {
    rows: Arc<Mutex<BTreeMap<String, Row>>>,
    latency: Duration,
}

impl LedgerClient {
    pub fn new(latency: Duration) -> Self {
        Self {
            rows: Arc::new(Mutex::new(BTreeMap::new())),
            latency,
        }
    }

    pub fn with_entry(self, name: &str, goal: i64) -> Self {
        self.lock().insert(name.to_ascii_lowercase(), Row { goal, funded: 0 });
        self
    }

    pub async fn read(&self, entry: &str) -> Result<Row, LedgerError> {
        tokio::time::sleep(self.latency).await;
        self.lock()
            .get(entry)
            .copied()
            .ok_or_else(|| LedgerError::UnknownEntry(entry.to_string()))
    }

    pub async fn write_funded(&self, entry: &str, funded: i64) -> Result<(), LedgerError> {
        tokio::time::sleep(self.latency).await;
        let mut rows = self.lock();
        let row = rows
            .get_mut(entry)
            .ok_or_else(|| LedgerError::UnknownEntry(entry.to_string()))?;
        row.funded = funded;
        debug!(entry, funded, "ledger row written");
        Ok(())
    }

    pub fn snapshot(&self) -> Vec<(String, Row)> {
        self.lock().iter().map(|(k, v)| (k.clone(), *v)).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Row>> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
