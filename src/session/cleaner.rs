use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use log::{debug, info, warn};

use crate::storage::Storage;
use crate::IResult;

pub(crate) enum Task {
    /// The table is no longer listed by any live version.
    Remove(u64),
    /// Acknowledged once every earlier task has been handled.
    Barrier(Sender<()>),
    Shutdown,
}

/// Starts the background thread that removes unreferenced tables from
/// `storage`. Tasks are handled in batches; with `delete` unset the thread
/// only logs what it would have removed.
pub(crate) fn spawn<S: Storage + 'static>(
    storage: Arc<S>,
    tasks: Receiver<Task>,
    delete: bool,
) -> IResult<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("table-cleaner".to_owned())
        .spawn(move || run(storage.as_ref(), &tasks, delete))?;
    Ok(handle)
}

fn run<S: Storage>(storage: &S, tasks: &Receiver<Task>, delete: bool) {
    // Exits when every sender is gone.
    while let Ok(first) = tasks.recv() {
        let mut numbers = vec![];
        let mut barriers = vec![];
        let mut shutdown = false;
        for task in std::iter::once(first).chain(tasks.try_iter()) {
            match task {
                Task::Remove(number) => numbers.push(number),
                Task::Barrier(done) => barriers.push(done),
                Task::Shutdown => {
                    shutdown = true;
                    break;
                }
            }
        }

        numbers.sort_unstable();
        numbers.dedup();
        for number in numbers {
            if !delete {
                debug!("table #{} is obsolete, keeping it", number);
                continue;
            }
            match storage.remove(number) {
                Ok(()) => info!("removed obsolete table #{}", number),
                Err(e) => warn!("failed to remove obsolete table #{}: {}", number, e),
            }
        }
        for done in barriers {
            // The waiter may have given up.
            let _ = done.send(());
        }
        if shutdown {
            debug!("table cleaner stopped");
            return;
        }
    }
}
