// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Model provisioning: download, cache, load, validate, fall back.
//!
//! [`Provisioner::acquire`] drives the acquisition state machine:
//!
//! ```text
//! UNRESOLVED --fetch ok--> CACHED --load ok--> LOADED --schema ok--> VALIDATED
//! UNRESOLVED --fetch fail--> FAILED_ACQ --fallback--> (machine re-runs on fallback)
//! CACHED --load fail--> FAILED_LOAD --fallback--> ...
//! LOADED --schema fail--> FAILED_SCHEMA --fallback--> ...
//! (fallback machine also fails) --> FATAL
//! ```
//!
//! Failures are never retried automatically and a cached file is never
//! deleted on load failure; [`Provisioner::invalidate`] is the only sanctioned
//! way to force a re-download. Acquisition and invalidation of the same
//! identifier are mutually exclusive, so a file cannot be deleted mid-load.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use crate::artifact::ArtifactRef;
use crate::download::{Fetcher, HttpFetcher};
use crate::error::{DetectError, Result};
use crate::model::OnnxLoader;
use crate::schema::ClassSchema;

/// A loaded model as seen by the provisioner: enough surface to validate its
/// class schema.
pub trait ModelHandle {
    /// Class id to class name mapping.
    fn names(&self) -> &HashMap<usize, String>;
}

/// Constructs a model handle from a cached artifact file.
///
/// Contract: failures are reported as [`DetectError::Load`]; the file at
/// `path` is left in place regardless of outcome.
pub trait ModelLoader {
    /// The handle type this loader produces.
    type Handle: ModelHandle;

    /// Load a handle from the artifact at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DetectError::Load`] when the file is unreadable or not a
    /// usable model.
    fn load(&self, path: &Path) -> Result<Self::Handle>;
}

/// How a handle was obtained.
#[derive(Debug)]
pub enum Provenance {
    /// The primary artifact was provisioned and validated.
    Primary,
    /// The primary artifact failed; the generic fallback was substituted.
    /// A warning-level outcome: usable, but not the specialized model.
    Fallback {
        /// Why the primary artifact could not be provisioned.
        primary_cause: Box<DetectError>,
    },
}

impl Provenance {
    /// Whether the handle came from the fallback artifact.
    #[must_use]
    pub const fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

/// A provisioned handle together with how it was obtained.
#[derive(Debug)]
pub struct Provisioned<H> {
    /// The ready-to-use model handle.
    pub handle: H,
    /// Primary or fallback.
    pub provenance: Provenance,
}

/// The model provisioner. Generic over the fetch and load seams so the state
/// machine is testable without network access or a real inference runtime.
pub struct Provisioner<L: ModelLoader, F: Fetcher = HttpFetcher> {
    fetcher: F,
    loader: L,
    /// Per-identifier locks serializing acquire/invalidate on the same artifact.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// The production provisioner: ONNX loading over HTTP fetching.
pub type PipeProvisioner = Provisioner<OnnxLoader>;

impl Default for PipeProvisioner {
    fn default() -> Self {
        Self::new(OnnxLoader, HttpFetcher::default())
    }
}

impl<L: ModelLoader, F: Fetcher> Provisioner<L, F> {
    /// Create a provisioner from a loader and a fetcher.
    pub fn new(loader: L, fetcher: F) -> Self {
        Self {
            fetcher,
            loader,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Produce a validated handle for `primary`, or fail over to `fallback`.
    ///
    /// The fallback is acquired without a schema: it is a generic model,
    /// accepted as-is.
    ///
    /// # Errors
    ///
    /// Returns [`DetectError::ProvisioningFailed`] wrapping both causes when
    /// the fallback fails too. All other failures are recovered through the
    /// fallback and reported via [`Provenance::Fallback`].
    pub fn acquire(
        &self,
        primary: &ArtifactRef,
        schema: Option<&ClassSchema>,
        fallback: &ArtifactRef,
    ) -> Result<Provisioned<L::Handle>> {
        match self.provision(primary, schema) {
            Ok(handle) => Ok(Provisioned {
                handle,
                provenance: Provenance::Primary,
            }),
            Err(primary_cause) => match self.provision(fallback, None) {
                Ok(handle) => Ok(Provisioned {
                    handle,
                    provenance: Provenance::Fallback {
                        primary_cause: Box::new(primary_cause),
                    },
                }),
                Err(fallback_cause) => Err(DetectError::ProvisioningFailed {
                    primary: Box::new(primary_cause),
                    fallback: Box::new(fallback_cause),
                }),
            },
        }
    }

    /// Run the acquisition machine for a single artifact, no fallback.
    ///
    /// Fetches only when the cache path is absent (exactly one attempt), loads
    /// the cached file, and validates the class schema when one is given.
    ///
    /// # Errors
    ///
    /// Returns [`DetectError::Acquisition`], [`DetectError::Load`], or
    /// [`DetectError::SchemaMismatch`] depending on the failing stage.
    pub fn provision(
        &self,
        reference: &ArtifactRef,
        schema: Option<&ClassSchema>,
    ) -> Result<L::Handle> {
        let lock = self.lock_for(reference.identifier());
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        if !reference.cache_path().exists() {
            self.fetcher
                .fetch(reference.identifier(), reference.cache_path())?;
        }

        let handle = self.loader.load(reference.cache_path())?;

        if let Some(schema) = schema {
            schema.validate(reference.identifier(), handle.names())?;
        }

        Ok(handle)
    }

    /// Delete the cached artifact file, forcing the next acquisition to
    /// re-download. A no-op when nothing is cached.
    ///
    /// # Errors
    ///
    /// Returns an IO error for failures other than the file being absent.
    pub fn invalidate(&self, reference: &ArtifactRef) -> Result<()> {
        let lock = self.lock_for(reference.identifier());
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        match fs::remove_file(reference.cache_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DetectError::Io(e)),
        }
    }

    fn lock_for(&self, identifier: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(identifier.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Outcome of a [`ModelCache`] lookup.
#[derive(Debug)]
pub enum CacheOutcome {
    /// The handle was already loaded in this session.
    Hit,
    /// The handle was acquired now; carries the acquisition provenance.
    Acquired(Provenance),
}

/// An explicit session-scoped cache from primary identifier to loaded handle.
///
/// Replaces hidden memoized-singleton model loading: handle lifetime is owned
/// by whoever owns the cache, and invalidation is explicit.
pub struct ModelCache<L: ModelLoader, F: Fetcher = HttpFetcher> {
    provisioner: Provisioner<L, F>,
    handles: Mutex<HashMap<String, Arc<Mutex<L::Handle>>>>,
}

impl<L: ModelLoader, F: Fetcher> ModelCache<L, F> {
    /// Create a cache around a provisioner.
    pub fn new(provisioner: Provisioner<L, F>) -> Self {
        Self {
            provisioner,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Return the session handle for `primary`, acquiring (with fallback) on
    /// first use. Keyed by the primary identifier.
    ///
    /// # Errors
    ///
    /// As [`Provisioner::acquire`].
    pub fn get_or_acquire(
        &self,
        primary: &ArtifactRef,
        schema: Option<&ClassSchema>,
        fallback: &ArtifactRef,
    ) -> Result<(Arc<Mutex<L::Handle>>, CacheOutcome)> {
        if let Some(handle) = self.lookup(primary.identifier()) {
            return Ok((handle, CacheOutcome::Hit));
        }

        let provisioned = self.provisioner.acquire(primary, schema, fallback)?;
        let handle = Arc::new(Mutex::new(provisioned.handle));
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(primary.identifier().to_string(), handle.clone());
        Ok((handle, CacheOutcome::Acquired(provisioned.provenance)))
    }

    /// Drop the session handle for an identifier. Returns whether one existed.
    /// The cached artifact file stays on disk.
    pub fn evict(&self, identifier: &str) -> bool {
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(identifier)
            .is_some()
    }

    /// Drop the session handle and delete the cached artifact file, forcing a
    /// full re-acquisition next time.
    ///
    /// # Errors
    ///
    /// As [`Provisioner::invalidate`].
    pub fn invalidate(&self, reference: &ArtifactRef) -> Result<()> {
        self.evict(reference.identifier());
        self.provisioner.invalidate(reference)
    }

    /// The underlying provisioner.
    pub const fn provisioner(&self) -> &Provisioner<L, F> {
        &self.provisioner
    }

    fn lookup(&self, identifier: &str) -> Option<Arc<Mutex<L::Handle>>> {
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(identifier)
            .cloned()
    }
}
