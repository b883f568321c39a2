//! Background sync of dirty stores.

use crate::store::Store;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

type StoreList = Arc<Mutex<Vec<Arc<Store>>>>;

/// A thread that syncs every dirty store on a fixed interval.
///
/// Stopped and joined on drop.
pub(crate) struct Flusher {
    interval: Duration,
    stop: Arc<(Mutex<bool>, Condvar)>,
    handle: Option<JoinHandle<()>>,
}

impl Flusher {
    pub(crate) fn spawn(interval: Duration, stores: StoreList) -> std::io::Result<Self> {
        let stop = Arc::new((Mutex::new(false), Condvar::new()));
        let signal = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("kindstore-flusher".into())
            .spawn(move || run(interval, &stores, &signal))?;

        debug!(?interval, "flusher started");
        Ok(Self {
            interval,
            stop,
            handle: Some(handle),
        })
    }

    pub(crate) fn interval(&self) -> Duration {
        self.interval
    }
}

fn run(interval: Duration, stores: &StoreList, stop: &(Mutex<bool>, Condvar)) {
    let (lock, cvar) = stop;
    loop {
        {
            let mut stopped = lock.lock();
            if !*stopped {
                cvar.wait_for(&mut stopped, interval);
            }
            if *stopped {
                return;
            }
        }

        let snapshot: Vec<Arc<Store>> = stores.lock().clone();
        for store in snapshot {
            if let Err(e) = store.sync_if_dirty() {
                warn!(path = %store.dir().display(), error = %e, "background sync failed");
            }
        }
    }
}

impl Drop for Flusher {
    fn drop(&mut self) {
        {
            let (lock, cvar) = &*self.stop;
            *lock.lock() = true;
            cvar.notify_all();
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("flusher thread panicked");
            }
        }
    }
}
