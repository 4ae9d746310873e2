use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, unbounded, Sender};
use crossbeam_utils::sync::ShardedLock;
use fxhash::FxHashMap;
use log::{debug, error, info, warn};

use crate::db::format::InternalKeyComparator;
use crate::error::Error;
use crate::opt::Options;
use crate::storage::Storage;
use crate::util::comparator::Comparator;
use crate::version::{SessionRecord, Staging, Version, VersionRef};
use crate::IResult;

mod cleaner;

use cleaner::Task;

/// State shared between a session and every version it creates.
pub(crate) struct SessionCore {
    // Table number -> number of live versions listing it.
    tables: Mutex<FxHashMap<u64, usize>>,
    next_version_id: AtomicU64,
    cleaner: Sender<Task>,
    closed: AtomicBool,
}

impl SessionCore {
    pub(crate) fn next_version_id(&self) -> u64 {
        self.next_version_id.fetch_add(1, Ordering::SeqCst)
    }

    fn tables(&self) -> MutexGuard<'_, FxHashMap<u64, usize>> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ref_tables(&self, version: &Version) {
        let mut tables = self.tables();
        for t in version.tables() {
            *tables.entry(t.number).or_insert(0) += 1;
        }
    }

    /// Called once the last holder of `version` lets go of it.
    pub(crate) fn unref_tables(&self, version: &Version) {
        let mut obsolete = vec![];
        {
            let mut tables = self.tables();
            for t in version.tables() {
                match tables.get_mut(&t.number) {
                    Some(refs) if *refs > 1 => *refs -= 1,
                    Some(_) => {
                        tables.remove(&t.number);
                        obsolete.push(t.number);
                    }
                    None => error!(
                        "table #{} of version #{} released without a reference",
                        t.number,
                        version.id()
                    ),
                }
            }
        }
        if obsolete.is_empty() {
            return;
        }
        if self.closed.load(Ordering::SeqCst) {
            debug!("session closed, leaving tables {:?} in place", obsolete);
            return;
        }
        for number in obsolete {
            if self.cleaner.send(Task::Remove(number)).is_err() {
                warn!("table cleaner is gone, table #{} is left in place", number);
            }
        }
    }
}

/// Owns the current `Version` of a table layout and the bookkeeping that
/// decides when a table file may be removed.
///
/// A table stays in storage while any live version lists it. A version is
/// live while it is current or some `VersionRef` to it exists. Removal is
/// handed to a background thread, so releasing a version never blocks on I/O.
pub struct Session<S: Storage + 'static, C: Comparator> {
    core: Arc<SessionCore>,
    icmp: InternalKeyComparator<C>,
    storage: Arc<S>,
    options: Options,
    current: ShardedLock<Arc<Version>>,
    // Serializes installs; readers of `current` never wait on it.
    install: Mutex<()>,
    next_file_number: AtomicU64,
    cleaner: Mutex<Option<JoinHandle<()>>>,
}

impl<S: Storage + 'static, C: Comparator> Session<S, C> {
    pub fn new(storage: Arc<S>, ucmp: C, options: Options) -> IResult<Self> {
        let (tx, rx) = unbounded();
        let handle = cleaner::spawn(Arc::clone(&storage), rx, options.delete_obsolete_files)?;
        let core = Arc::new(SessionCore {
            tables: Mutex::new(FxHashMap::default()),
            next_version_id: AtomicU64::new(1),
            cleaner: tx,
            closed: AtomicBool::new(false),
        });
        let initial = Arc::new(Version::new(Arc::clone(&core), None, vec![]));
        initial.incref();
        info!("session opened with comparator {}", ucmp.name());
        Ok(Session {
            core,
            icmp: InternalKeyComparator::new(ucmp),
            storage,
            options,
            current: ShardedLock::new(initial),
            install: Mutex::new(()),
            next_file_number: AtomicU64::new(1),
            cleaner: Mutex::new(Some(handle)),
        })
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn comparator(&self) -> &InternalKeyComparator<C> {
        &self.icmp
    }

    /// Returns a counted handle on the current version.
    pub fn current(&self) -> VersionRef {
        let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
        // Still held by the session here, so the count cannot be zero.
        current.incref();
        VersionRef::adopt(Arc::clone(&current))
    }

    /// Same as `current`.
    pub fn version(&self) -> VersionRef {
        self.current()
    }

    /// Gives up a handle obtained from `current`.
    pub fn release(&self, version: VersionRef) {
        version.release();
    }

    /// Starts a staging on top of `base`.
    pub fn new_staging(&self, base: &VersionRef) -> Staging<C> {
        Staging::new(Arc::clone(base.version()), self.icmp.clone())
    }

    /// Installs `version` as current. Fails without changing anything if
    /// `version` was not staged from the current version.
    pub fn set_version(&self, edit: &SessionRecord, version: Version) -> IResult<()> {
        let _install = self.install.lock().unwrap_or_else(PoisonError::into_inner);
        self.install_locked(edit, version)
    }

    /// Stages `edit` on the current version and installs the result.
    pub fn apply(&self, edit: &SessionRecord) -> IResult<()> {
        let _install = self.install.lock().unwrap_or_else(PoisonError::into_inner);
        let base = self.current();
        let mut staging = self.new_staging(&base);
        staging.commit(edit)?;
        let version = staging.finish(true)?;
        drop(staging);
        self.install_locked(edit, version)?;
        base.release();
        Ok(())
    }

    fn install_locked(&self, edit: &SessionRecord, version: Version) -> IResult<()> {
        let current_id = self
            .current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .id();
        if version.base_id() != current_id {
            let e = Error::StaleVersion {
                base: version.base_id(),
                current: current_id,
            };
            error!("install rejected: {}", e);
            return Err(e);
        }

        for t in edit.added_tables() {
            self.mark_file_number_used(t.number);
        }
        if let Some(next) = edit.next_file_number() {
            self.next_file_number.fetch_max(next, Ordering::SeqCst);
        }

        self.core.ref_tables(&version);
        let version = Arc::new(version);
        version.incref();
        let old = {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *current, Arc::clone(&version))
        };
        debug!(
            "installed version #{} over #{}: +{} -{} tables, {} live",
            version.id(),
            old.id(),
            edit.added_tables().len(),
            edit.deleted_tables().len(),
            version.total_files()
        );
        old.decref();
        Ok(())
    }

    /// Number of live versions listing each referenced table.
    pub fn file_refs(&self) -> BTreeMap<u64, usize> {
        self.core
            .tables()
            .iter()
            .map(|(&number, &refs)| (number, refs))
            .collect()
    }

    /// Allocates a fresh table number.
    pub fn new_file_number(&self) -> u64 {
        self.next_file_number.fetch_add(1, Ordering::SeqCst)
    }

    /// Makes sure `number` is never handed out by `new_file_number`.
    pub fn mark_file_number_used(&self, number: u64) {
        self.next_file_number
            .fetch_max(number.saturating_add(1), Ordering::SeqCst);
    }

    pub fn next_file_number(&self) -> u64 {
        self.next_file_number.load(Ordering::SeqCst)
    }

    /// Blocks until every removal queued so far has been attempted.
    pub fn wait_for_deletions(&self) {
        if self.core.closed.load(Ordering::SeqCst) {
            return;
        }
        let (tx, rx) = bounded(1);
        if self.core.cleaner.send(Task::Barrier(tx)).is_ok() {
            // Errors only if the cleaner stopped first.
            let _ = rx.recv();
        }
    }

    /// Stops the cleaner after it drains the queue. Tables released after
    /// this point are left in storage.
    pub fn close(&self) {
        if self.core.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.core.cleaner.send(Task::Shutdown);
        let handle = self
            .cleaner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("table cleaner panicked");
            }
        }
        info!("session closed");
    }
}

impl<S: Storage + 'static, C: Comparator> Drop for Session<S, C> {
    fn drop(&mut self) {
        self.close();
    }
}
