//! The journal facade: one place that owns the store, the in-memory snapshot
//! and the status flag the UI layer polls.
//!
//! Mutations are serialized by an async mutex around the [`EntryStore`]; a
//! second caller waits for the first to finish. Readers never wait on the
//! store: they see the last good snapshot and the current [`JournalStatus`],
//! which reads `Loading` while a mutation is in flight.

use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::model::{ChartDataPoint, Entry, NutritionData, ReportPeriod, Summary};
use crate::period::to_millis;
use crate::report;
use crate::store::{EntryStore, KvStore, StoreError};
use crate::thumbnail::{ThumbnailError, Thumbnailer};

pub const LOAD_FAILED: &str = "Failed to load food journal from storage.";
pub const DELETE_FAILED: &str = "Failed to delete entry.";
pub const CLEAR_FAILED: &str = "Failed to clear journal.";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "lowercase")]
pub enum JournalStatus {
    Idle,
    Loading,
    Error(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum AddOutcome {
    Added(Entry),
    /// The estimate failed the journal policy and nothing was stored.
    NotJournaled,
}

#[derive(Debug, Error)]
pub enum JournalError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Thumbnail(#[from] ThumbnailError),
    #[error("thumbnail worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

#[derive(Clone, Debug)]
pub struct Snapshot {
    pub status: JournalStatus,
    pub entries: Arc<Vec<Entry>>,
}

struct JournalState {
    status: JournalStatus,
    entries: Arc<Vec<Entry>>,
}

pub struct Journal<S, T> {
    store: Mutex<EntryStore<S>>,
    thumbnailer: Arc<T>,
    state: RwLock<JournalState>,
}

impl<S: KvStore, T: Thumbnailer + Send + Sync + 'static> Journal<S, T> {
    /// Loads the journal once. A corrupt record starts an empty journal;
    /// unreachable storage starts an empty journal in the error state.
    pub fn open(store: EntryStore<S>, thumbnailer: T) -> Self {
        let (status, entries) = match store.load() {
            Ok(entries) => {
                info!("journal loaded: {} entries", entries.len());
                (JournalStatus::Idle, entries)
            }
            Err(StoreError::Corrupt(err)) => {
                warn!("stored journal is unreadable, starting empty: {err}");
                (JournalStatus::Idle, Vec::new())
            }
            Err(err) => {
                error!("journal load failed: {err}");
                (JournalStatus::Error(LOAD_FAILED.to_string()), Vec::new())
            }
        };
        Self {
            store: Mutex::new(store),
            thumbnailer: Arc::new(thumbnailer),
            state: RwLock::new(JournalState {
                status,
                entries: Arc::new(entries),
            }),
        }
    }

    pub async fn add_entry(
        &self,
        nutrition: NutritionData,
        image: &[u8],
    ) -> Result<AddOutcome, JournalError> {
        self.add_entry_at(nutrition, image, to_millis(OffsetDateTime::now_utc()))
            .await
    }

    pub async fn add_entry_at(
        &self,
        nutrition: NutritionData,
        image: &[u8],
        timestamp: i64,
    ) -> Result<AddOutcome, JournalError> {
        if !nutrition.is_journalable() {
            info!(
                "not journaling '{}' ({} kcal)",
                nutrition.food_name, nutrition.calories
            );
            return Ok(AddOutcome::NotJournaled);
        }

        let mut store = self.store.lock().await;
        self.set_status(JournalStatus::Loading);

        // Decoding and resizing run on the blocking pool.
        let thumbnailer = Arc::clone(&self.thumbnailer);
        let image = image.to_vec();
        let result = async {
            let image_base64 =
                tokio::task::spawn_blocking(move || thumbnailer.thumbnail(&image)).await??;
            let entry = Entry {
                id: Uuid::new_v4().to_string(),
                timestamp,
                nutrition,
                image_base64,
            };
            let entries = store.append(entry.clone())?;
            Ok::<_, JournalError>((entry, entries))
        }
        .await;

        match result {
            Ok((entry, entries)) => {
                info!("added entry {} '{}'", entry.id, entry.nutrition.food_name);
                self.replace(entries);
                Ok(AddOutcome::Added(entry))
            }
            Err(err) => {
                error!("add entry failed: {err}");
                self.set_status(JournalStatus::Error(format!(
                    "Failed to add food entry: {err}"
                )));
                Err(err)
            }
        }
    }

    pub async fn delete_entry(&self, id: &str) -> Result<(), JournalError> {
        let mut store = self.store.lock().await;
        self.set_status(JournalStatus::Loading);
        match store.remove(id) {
            Ok(entries) => {
                self.replace(entries);
                Ok(())
            }
            Err(err) => {
                error!("delete {id} failed: {err}");
                self.set_status(JournalStatus::Error(DELETE_FAILED.to_string()));
                Err(err.into())
            }
        }
    }

    pub async fn clear_all(&self) -> Result<(), JournalError> {
        let mut store = self.store.lock().await;
        self.set_status(JournalStatus::Loading);
        match store.clear() {
            Ok(()) => {
                info!("journal cleared");
                self.replace(Vec::new());
                Ok(())
            }
            Err(err) => {
                error!("clear failed: {err}");
                self.set_status(JournalStatus::Error(CLEAR_FAILED.to_string()));
                Err(err.into())
            }
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Snapshot {
            status: state.status.clone(),
            entries: Arc::clone(&state.entries),
        }
    }

    /// Newest first.
    pub fn entries(&self) -> Arc<Vec<Entry>> {
        self.snapshot().entries
    }

    pub fn status(&self) -> JournalStatus {
        self.snapshot().status
    }

    pub fn report(&self, period: ReportPeriod, now: OffsetDateTime) -> Vec<ChartDataPoint> {
        report::build(period, &self.entries(), now)
    }

    pub fn summary(&self, now: OffsetDateTime) -> Summary {
        report::summary(&self.entries(), now)
    }

    /// Clears an error status. Any other status is left alone.
    pub fn dismiss_error(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if matches!(state.status, JournalStatus::Error(_)) {
            state.status = JournalStatus::Idle;
        }
    }

    /// Surfaces a failure from outside the journal, e.g. a failed analysis.
    pub fn set_error(&self, message: impl Into<String>) {
        self.set_status(JournalStatus::Error(message.into()));
    }

    fn set_status(&self, status: JournalStatus) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .status = status;
    }

    fn replace(&self, entries: Vec<Entry>) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.entries = Arc::new(entries);
        state.status = JournalStatus::Idle;
    }
}
