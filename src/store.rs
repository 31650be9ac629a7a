//! Concurrent dataset publication
//!
//! One shared reference to the currently-served dataset, read by every
//! lookup and replaced whole by the refresher. Readers hold the read lock
//! only long enough to clone the `Arc`; the writer holds the write lock
//! only for the pointer swap. Dataset construction happens entirely
//! outside both locks, so a rebuild never stalls a lookup, and a failed
//! rebuild never touches what is already serving.

use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use tracing::{info, warn};

use crate::dataset::{GeoDataset, GeoMetadata};
use crate::error::{GeoError, Result};

/// Holder of the currently-published dataset.
///
/// Starts unset; lookups report `NotReady` until the first publish. The
/// lifecycle is unset -> ready -> (refreshing -> ready)*, with readers
/// always seeing either the previous or the next dataset, never a partial
/// one.
pub struct DatasetStore {
    current: RwLock<Option<Arc<GeoDataset>>>,
    // Serializes rebuilds; never held while the current lock is.
    refresh: Mutex<()>,
}

impl DatasetStore {
    /// Create an empty store (no dataset published).
    pub fn new() -> Self {
        Self {
            current: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    /// Whether a dataset has been published.
    pub fn is_ready(&self) -> bool {
        self.snapshot().is_some()
    }

    /// Clone a handle to the currently-published dataset, if any.
    ///
    /// The handle stays valid for as long as the caller holds it, even
    /// across later publishes; the swapped-out dataset is dropped once the
    /// last in-flight reader lets go.
    pub fn snapshot(&self) -> Option<Arc<GeoDataset>> {
        // A poisoned lock still guards a coherent pointer; the swap is a
        // single assignment and can't be observed half-done.
        let guard = self
            .current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.clone()
    }

    /// Publish a dataset, replacing whatever was serving.
    pub fn publish(&self, dataset: GeoDataset) {
        let next = Arc::new(dataset);
        let previous = {
            let mut guard = self
                .current
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.replace(next)
        };
        match previous {
            Some(_) => info!("dataset replaced"),
            None => info!("first dataset published"),
        }
    }

    /// Annotate one IP against the published dataset.
    ///
    /// `NotReady` before the first publish; otherwise exactly
    /// [`GeoDataset::annotate`] on a snapshot taken for this lookup.
    pub fn annotate(&self, ip: &str) -> Result<GeoMetadata> {
        let dataset = self.snapshot().ok_or(GeoError::NotReady)?;
        dataset.annotate(ip)
    }

    /// Rebuild from a dataset directory and publish on success.
    ///
    /// Only one refresh runs at a time; a second caller blocks on the
    /// guard rather than interleaving installs. On failure the published
    /// dataset is left serving and the error is returned.
    pub fn refresh_from_dir<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let _guard = self
            .refresh
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match GeoDataset::load_dir(dir.as_ref()) {
            Ok(dataset) => {
                self.publish(dataset);
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, dir = %dir.as_ref().display(), "dataset refresh failed");
                Err(err)
            }
        }
    }
}

impl Default for DatasetStore {
    fn default() -> Self {
        Self::new()
    }
}
