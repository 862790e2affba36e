//! Fingerprint-cached artifact preparation and dynamic-library loading.
//!
//! The first load of a mod goes through a cache copy of its artifact named
//! `<artifact>.<fingerprint>.cache`, so that unchanged mods reuse the copy
//! across restarts while any change to the artifact, the manager version,
//! or the compatibility revision forces a fresh one. Once a mod has loaded
//! through the cache in this process, later preparations (reloads) read
//! the artifact path directly so a freshly rebuilt artifact is picked up.

use crate::error::{ModError, Result};
use crate::version::Version;
use libloading::Library;
use siphasher::sip::SipHasher13;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, warn};

const CACHE_SUFFIX: &str = "cache";

// Fixed keys: fingerprints must be stable across process restarts.
const FP_KEY_0: u64 = 0x6d6f_6472_756e_7431;
const FP_KEY_1: u64 = 0x6361_6368_6566_7031;

/// Per-instance preparation state.
///
/// Lives on the owning instance and survives across reloads; `Default`
/// gives the never-loaded state.
#[derive(Debug, Default, Clone)]
pub struct PrepState {
    /// True once a cache-mediated load has completed in this process.
    pub first_load_done: bool,
    /// Cache file produced by the first load, if any.
    pub cache_path: Option<PathBuf>,
}

/// Prepares mod artifacts and loads them as dynamic libraries.
#[derive(Debug, Clone, Copy)]
pub struct CodeLoader {
    manager_version: Version,
}

impl CodeLoader {
    pub fn new(manager_version: Version) -> Self {
        Self { manager_version }
    }

    /// Resolve the path actually loaded for `artifact`.
    ///
    /// First load: compute the fingerprint, reuse a matching cache copy or
    /// purge stale ones and make a new copy. Later loads return the
    /// artifact path itself.
    pub fn prepare(
        &self,
        artifact: &Path,
        compat_version: Version,
        state: &mut PrepState,
    ) -> Result<PathBuf> {
        if !artifact.is_file() {
            return Err(ModError::Load(format!(
                "artifact '{}' not found",
                artifact.display()
            )));
        }

        if state.first_load_done {
            return Ok(artifact.to_path_buf());
        }

        let fp = self.fingerprint(artifact, compat_version)?;
        let cache_path = cache_path_for(artifact, fp);

        if !cache_path.is_file() {
            purge_stale_caches(artifact);
            std::fs::copy(artifact, &cache_path).map_err(|e| {
                ModError::Load(format!(
                    "copying '{}' to '{}': {e}",
                    artifact.display(),
                    cache_path.display()
                ))
            })?;
            debug!("created cache copy '{}'", cache_path.display());
        } else {
            debug!("reusing cache copy '{}'", cache_path.display());
        }

        state.first_load_done = true;
        state.cache_path = Some(cache_path.clone());
        Ok(cache_path)
    }

    /// Load a prepared artifact as a dynamic library.
    pub fn load(&self, path: &Path) -> Result<Library> {
        // Safety: loading runs arbitrary library initializers; mods are
        // trusted code by definition here.
        unsafe { Library::new(path) }
            .map_err(|e| ModError::Load(format!("loading '{}': {e}", path.display())))
    }

    fn fingerprint(&self, artifact: &Path, compat_version: Version) -> Result<u16> {
        let mtime = std::fs::metadata(artifact)?.modified()?;
        let since_epoch = mtime.duration_since(UNIX_EPOCH).unwrap_or_default();

        let mut hasher = SipHasher13::new_with_keys(FP_KEY_0, FP_KEY_1);
        since_epoch.as_secs().hash(&mut hasher);
        since_epoch.subsec_nanos().hash(&mut hasher);
        self.manager_version.hash(&mut hasher);
        compat_version.hash(&mut hasher);
        Ok(hasher.finish() as u16)
    }
}

fn cache_path_for(artifact: &Path, fp: u16) -> PathBuf {
    let mut name = artifact.as_os_str().to_os_string();
    name.push(format!(".{fp:04x}.{CACHE_SUFFIX}"));
    PathBuf::from(name)
}

/// Remove every `*.cache` sibling of `artifact`. Best effort; a cache file
/// that cannot be removed only costs disk space.
fn purge_stale_caches(artifact: &Path) {
    let Some(dir) = artifact.parent() else {
        return;
    };
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some(CACHE_SUFFIX) {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!("could not remove stale cache '{}': {e}", path.display());
            }
        }
    }
}
