//! Background dataset refresh
//!
//! A single refresher thread owns all writes to the [`DatasetStore`]: it
//! loads the dataset directory once at startup, then again on every
//! interval tick and on every external kick (the CLI wires a filesystem
//! watcher into the kick channel). Lookups keep serving the previous
//! dataset through any failed or in-progress reload.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{never, select, tick, Receiver};
use tracing::{debug, info, warn};

use crate::store::DatasetStore;

/// Run the refresh loop until `stop` fires or every sender is gone.
///
/// This is the loop body of [`spawn`], exposed for callers that want to
/// drive it on a thread of their own.
pub fn run(
    store: Arc<DatasetStore>,
    dir: PathBuf,
    interval: Duration,
    stop: Receiver<()>,
    kick: Receiver<()>,
) {
    info!(dir = %dir.display(), interval_secs = interval.as_secs(), "refresher started");

    // Initial load; failure is not fatal, the next trigger retries.
    reload(&store, &dir);

    let mut kick = kick;
    let ticker = tick(interval);
    loop {
        select! {
            recv(ticker) -> _ => {
                debug!("interval refresh");
                reload(&store, &dir);
            }
            recv(kick) -> msg => {
                if msg.is_err() {
                    // Kick side hung up; keep ticking.
                    kick = never();
                    continue;
                }
                debug!("kicked refresh");
                reload(&store, &dir);
            }
            recv(stop) -> _ => {
                info!("refresher stopping");
                return;
            }
        }
    }
}

/// Spawn the refresh loop on a named background thread.
pub fn spawn(
    store: Arc<DatasetStore>,
    dir: PathBuf,
    interval: Duration,
    stop: Receiver<()>,
    kick: Receiver<()>,
) -> thread::JoinHandle<()> {
    thread::Builder::new()
        .name("geomark-refresh".to_string())
        .spawn(move || run(store, dir, interval, stop, kick))
        .expect("failed to spawn refresher thread")
}

fn reload(store: &DatasetStore, dir: &Path) {
    if let Err(err) = store.refresh_from_dir(dir) {
        warn!(error = %err, "keeping previously published dataset");
    }
}
