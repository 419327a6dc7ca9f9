use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use depot_fs::AtomicWriteOptions;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, TokioClock};
use crate::error::{Result, StateError};

/// A structured record persisted by a [`RecordStore`].
pub trait Record: Serialize + DeserializeOwned + Default + Send + Sync + 'static {
    /// Human readable name used in logs and errors.
    const NAME: &'static str;
}

#[derive(Clone, Copy, Debug)]
pub struct SaveOptions {
    /// Delay between the first save request and the write, coalescing bursts.
    pub quiescence:         Duration,
    /// Delay after the first failed write; doubles per further failure.
    pub retry_interval:     Duration,
    pub max_retry_interval: Duration,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            quiescence:         Duration::from_millis(500),
            retry_interval:     Duration::from_millis(100),
            max_retry_interval: Duration::from_secs(5),
        }
    }
}

impl SaveOptions {
    pub fn quiescence(mut self, quiescence: Duration) -> Self {
        self.quiescence = quiescence;
        self
    }

    pub fn retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    pub fn max_retry_interval(mut self, max_retry_interval: Duration) -> Self {
        self.max_retry_interval = max_retry_interval;
        self
    }

    /// Delay before the attempt following failure number `failures` (1-based).
    fn retry_delay(&self, failures: u32) -> Duration {
        let multiplier = 2_u32.saturating_pow(failures.saturating_sub(1));
        self.retry_interval.saturating_mul(multiplier).min(self.max_retry_interval)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    /// No file existed; the record starts from its default.
    Fresh,
    /// The record was decoded from disk.
    Restored,
    /// The file could not be decoded and the record starts from its default.
    /// `deleted` is set when the file was truncated and has been removed.
    Recovered { deleted: bool },
    /// The store was loaded before; the in-memory record is unchanged.
    AlreadyLoaded,
}

#[derive(Clone, Copy, Debug, Default)]
struct SaveState {
    pending:   bool,
    requested: u64,
    writes:    u64,
    closed:    bool,
}

struct Loaded<T> {
    path:   PathBuf,
    record: RwLock<T>,
}

struct Shared<T> {
    options: SaveOptions,
    clock:   Arc<dyn Clock>,
    loaded:  OnceLock<Loaded<T>>,
    state:   watch::Sender<SaveState>,
    wake:    Notify,
}

/// Load-once, debounced-save persistence of a single record.
///
/// The record is mutated in place through [`update`](Self::update); a
/// dedicated writer task owns the pending flag and performs the writes, so at
/// most one save is in flight per store.
pub struct RecordStore<T: Record> {
    shared: Arc<Shared<T>>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Record> Default for RecordStore<T> {
    fn default() -> Self { Self::new(SaveOptions::default()) }
}

impl<T: Record> RecordStore<T> {
    pub fn new(options: SaveOptions) -> Self { Self::with_clock(options, Arc::new(TokioClock)) }

    pub fn with_clock(options: SaveOptions, clock: Arc<dyn Clock>) -> Self {
        let (state, _) = watch::channel(SaveState::default());
        Self {
            shared: Arc::new(Shared {
                options,
                clock,
                loaded: OnceLock::new(),
                state,
                wake: Notify::new(),
            }),
            writer: Mutex::new(None),
        }
    }

    /// Load the record from `path`, falling back to a default record on any
    /// failure. A second call keeps the existing record.
    pub async fn load(&self, path: impl Into<PathBuf>) -> LoadOutcome {
        if self.is_loaded() {
            return LoadOutcome::AlreadyLoaded;
        }

        let path = path.into();
        let (record, outcome) = read_record::<T>(&path).await;

        if self
            .shared
            .loaded
            .set(Loaded {
                path,
                record: RwLock::new(record),
            })
            .is_err()
        {
            return LoadOutcome::AlreadyLoaded;
        }

        let writer = tokio::spawn(run_writer(Arc::clone(&self.shared)));
        *lock(&self.writer) = Some(writer);
        outcome
    }

    pub fn is_loaded(&self) -> bool { self.shared.loaded.get().is_some() }

    pub fn path(&self) -> Option<&Path> { self.shared.loaded.get().map(|l| l.path.as_path()) }

    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        let loaded = self.loaded()?;
        Ok(f(&read_lock(&loaded.record)))
    }

    /// Mutate the record in place. Call [`save`](Self::save) to persist.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let loaded = self.loaded()?;
        Ok(f(&mut write_lock(&loaded.record)))
    }

    /// Request a write of the current record.
    ///
    /// Returns immediately. While a save is pending further requests are
    /// folded into it; a request arriving after the writer took its snapshot
    /// causes one more write.
    pub fn save(&self) -> Result<()> {
        self.loaded()?;
        if self.shared.state.borrow().closed {
            return Err(StateError::Closed { record: T::NAME });
        }

        let raised = self.shared.state.send_if_modified(|s| {
            s.requested += 1;
            if s.pending {
                false
            } else {
                s.pending = true;
                true
            }
        });
        if raised {
            debug!(record = T::NAME, "save scheduled");
            self.shared.wake.notify_one();
        }
        Ok(())
    }

    pub fn is_save_pending(&self) -> bool { self.shared.state.borrow().pending }

    /// Number of physical writes performed so far.
    pub fn write_count(&self) -> u64 { self.shared.state.borrow().writes }

    /// Wait until no save is pending.
    pub async fn flush(&self) {
        let mut rx = self.shared.state.subscribe();
        let _ = rx.wait_for(|s| !s.pending).await;
    }

    /// Reject further saves, let the writer finish the pending one and wait
    /// for it to stop. A write that keeps failing is given up after its next
    /// attempt and the unsaved record is logged.
    pub async fn close(&self) {
        self.shared.state.send_modify(|s| s.closed = true);
        self.shared.wake.notify_one();
        self.flush().await;

        let writer = lock(&self.writer).take();
        if let Some(writer) = writer
            && let Err(e) = writer.await
        {
            error!(record = T::NAME, error = %e, "record writer terminated abnormally");
        }
    }

    fn loaded(&self) -> Result<&Loaded<T>> {
        self.shared
            .loaded
            .get()
            .ok_or(StateError::NotLoaded { record: T::NAME })
    }
}

impl<T: Record> Drop for RecordStore<T> {
    fn drop(&mut self) {
        self.shared.state.send_modify(|s| s.closed = true);
        self.shared.wake.notify_one();
    }
}

async fn read_record<T: Record>(path: &Path) -> (T, LoadOutcome) {
    let read = {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || depot_fs::read_optional(path)).await
    };
    let bytes = match read {
        Ok(Ok(Some(bytes))) => bytes,
        Ok(Ok(None)) => {
            debug!(record = T::NAME, path = %path.display(), "no saved record, starting fresh");
            return (T::default(), LoadOutcome::Fresh);
        }
        Ok(Err(e)) => {
            warn!(record = T::NAME, error = %e, "failed to read record");
            return (T::default(), LoadOutcome::Recovered { deleted: false });
        }
        Err(e) => {
            warn!(record = T::NAME, path = %path.display(), error = %e, "record read task failed");
            return (T::default(), LoadOutcome::Recovered { deleted: false });
        }
    };

    match depot_codec::decode::<T>(&bytes) {
        Ok(record) => {
            debug!(record = T::NAME, path = %path.display(), "record restored");
            (record, LoadOutcome::Restored)
        }
        Err(e) if e.is_truncated() => {
            warn!(record = T::NAME, path = %path.display(), "record is partial, removing");
            let removed = {
                let path = path.to_path_buf();
                tokio::task::spawn_blocking(move || depot_fs::remove_if_exists(path)).await
            };
            let deleted = match removed {
                Ok(Ok(deleted)) => deleted,
                Ok(Err(e)) => {
                    warn!(record = T::NAME, error = %e, "failed to remove partial record");
                    false
                }
                Err(e) => {
                    warn!(record = T::NAME, error = %e, "record removal task failed");
                    false
                }
            };
            (T::default(), LoadOutcome::Recovered { deleted })
        }
        Err(e) => {
            warn!(record = T::NAME, path = %path.display(), error = %e, "failed to decode record");
            (T::default(), LoadOutcome::Recovered { deleted: false })
        }
    }
}

async fn run_writer<T: Record>(shared: Arc<Shared<T>>) {
    loop {
        shared.wake.notified().await;

        let pending = shared.state.borrow().pending;
        if pending {
            shared.clock.sleep(shared.options.quiescence).await;
            shared.write_until_current().await;
        }

        let (closed, pending) = {
            let state = shared.state.borrow();
            (state.closed, state.pending)
        };
        if closed && !pending {
            break;
        }
    }
    debug!(record = T::NAME, "record writer stopped");
}

impl<T: Record> Shared<T> {
    fn is_closed(&self) -> bool { self.state.borrow().closed }

    fn abandon_save(&self) { self.state.send_modify(|s| s.pending = false); }

    /// Sleep before the next write attempt, waking early when the store closes.
    async fn retry_pause(&self, delay: Duration) {
        let mut state = self.state.subscribe();
        tokio::select! {
            _ = self.clock.sleep(delay) => {},
            _ = async {
                let _ = state.wait_for(|s| s.closed).await;
            } => {},
        }
    }

    async fn write_until_current(&self) {
        let Some(loaded) = self.loaded.get() else {
            return;
        };
        let mut failures = 0u32;

        loop {
            let generation = self.state.borrow().requested;
            let encoded = {
                let record = read_lock(&loaded.record);
                depot_codec::encode(&*record)
            };
            let bytes = match encoded {
                Ok(bytes) => bytes,
                Err(e) => {
                    error!(record = T::NAME, error = %e, "failed to encode record, dropping save");
                    self.abandon_save();
                    return;
                }
            };

            let path = loaded.path.clone();
            let written =
                tokio::task::spawn_blocking(move || depot_fs::atomic_write(&path, &bytes, AtomicWriteOptions::new()))
                    .await;

            match written {
                Ok(Ok(())) => {
                    if failures > 0 {
                        info!(record = T::NAME, failures, "record saved after retries");
                    }
                    failures = 0;

                    let mut current = false;
                    self.state.send_modify(|s| {
                        s.writes += 1;
                        if s.requested == generation {
                            s.pending = false;
                            current = true;
                        }
                    });
                    if current {
                        debug!(record = T::NAME, path = %loaded.path.display(), "record saved");
                        return;
                    }
                    // superseded while writing; coalesce the newer requests
                    self.clock.sleep(self.options.quiescence).await;
                }
                Ok(Err(e)) => {
                    failures += 1;
                    if !e.is_transient() {
                        error!(record = T::NAME, error = %e, "cannot save record, keeping it in memory only");
                        self.abandon_save();
                        return;
                    }
                    if self.is_closed() {
                        error!(record = T::NAME, error = %e, failures, "store closed with an unsaved record");
                        self.abandon_save();
                        return;
                    }
                    let delay = self.options.retry_delay(failures);
                    if failures == 1 {
                        warn!(record = T::NAME, error = %e, "failed to save record, retrying");
                    } else {
                        debug!(record = T::NAME, error = %e, failures, delay_ms = delay.as_millis() as u64, "record save still failing");
                    }
                    self.retry_pause(delay).await;
                }
                Err(e) => {
                    failures += 1;
                    if self.is_closed() {
                        error!(record = T::NAME, error = %e, "store closed with an unsaved record");
                        self.abandon_save();
                        return;
                    }
                    error!(record = T::NAME, error = %e, "record write task failed, retrying");
                    self.retry_pause(self.options.retry_delay(failures)).await;
                }
            }
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> { m.lock().unwrap_or_else(PoisonError::into_inner) }

fn read_lock<T>(l: &RwLock<T>) -> RwLockReadGuard<'_, T> { l.read().unwrap_or_else(PoisonError::into_inner) }

fn write_lock<T>(l: &RwLock<T>) -> RwLockWriteGuard<'_, T> { l.write().unwrap_or_else(PoisonError::into_inner) }
