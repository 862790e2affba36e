//! Hot reload: swap a mod's code generation in place, carrying marked
//! state across.
//!
//! The sequence mirrors a full unload and load of a single mod: save, ask
//! the old generation to stand down, capture its state snapshot, drop the
//! code handle, run the load sequence again, then merge the captured state
//! into the new generation's defaults and hand it back. A reload that
//! fails mid-way leaves the mod unloaded rather than restoring the old
//! generation; a second reload attempt starts from the unloaded state.

use crate::code::{hooks, HookSig};
use crate::error::ModError;
use crate::invoke::{HookArgs, HookResult};
use crate::runtime::ModRuntime;
use crate::snapshot::StateSnapshot;
use tracing::{error, info, warn};

/// What a reload request accomplished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// The mod never started, or did not opt in to reloading.
    NotCapable,
    /// The artifact has not changed since it was loaded.
    UpToDate,
    /// The old generation refused to deactivate or to unload.
    Canceled,
    /// A new generation is running.
    Reloaded,
}

impl ModRuntime {
    /// Reload a mod by id.
    pub fn reload(&mut self, id: &str) -> ReloadOutcome {
        match self.index_of(id) {
            Some(i) => self.reload_at(i),
            None => {
                error!("[{}] unknown mod", id);
                ReloadOutcome::NotCapable
            }
        }
    }

    fn reload_at(&mut self, i: usize) -> ReloadOutcome {
        {
            let inst = &self.mods_mut()[i];
            if !inst.started || !inst.can_reload() {
                return ReloadOutcome::NotCapable;
            }
        }

        // Skip when the artifact on disk is the one already running.
        // Factory mods carry no stamp and always proceed.
        let inst = &self.mods_mut()[i];
        if let Some(stamp) = inst.loaded_stamp {
            let current = std::fs::metadata(inst.descriptor.resolved_artifact_path())
                .and_then(|m| m.modified())
                .ok();
            if current == Some(stamp) {
                info!("[{}] reload is not needed", inst.id());
                return ReloadOutcome::UpToDate;
            }
        }
        let id = self.mods_mut()[i].id().to_string();
        info!("[{}] reloading", id);

        // Let the old generation persist anything external first.
        let save = self.mods_mut()[i].hook_name(hooks::ON_SAVE);
        self.mods_mut()[i].invoke_hook(&save, HookSig::Notify, HookArgs::None);

        // Stand the old generation down.
        let inst = &mut self.mods_mut()[i];
        if inst.active() {
            if inst.has_hook(hooks::ON_TOGGLE, HookSig::Toggle) {
                inst.toggle(false);
            } else {
                inst.active = false;
            }
        }
        if self.mods_mut()[i].active() {
            warn!("[{}] must be deactivated before reloading", id);
            return ReloadOutcome::Canceled;
        }

        let unload = self.mods_mut()[i].hook_name(hooks::ON_UNLOAD);
        if self.mods_mut()[i].has_hook(hooks::ON_UNLOAD, HookSig::Gate) {
            let (called, result) =
                self.mods_mut()[i].invoke_hook(&unload, HookSig::Gate, HookArgs::None);
            if !matches!((called, result), (true, Some(HookResult::Flag(true)))) {
                warn!("[{}] unload hook refused, reload canceled", id);
                return ReloadOutcome::Canceled;
            }
        }

        let old_snapshot = self.capture_snapshot(i);

        // Drop the old generation. Cached closures point into it, so the
        // cache goes first.
        {
            let inst = &mut self.mods_mut()[i];
            inst.cache.clear();
            inst.code = None;
            inst.started = false;
            inst.error_on_loading = false;
        }

        if !self.load_mod(i) {
            let err = ModError::Reload("load failed, mod left unloaded".to_string());
            error!("[{}] {err}", id);
            return ReloadOutcome::Canceled;
        }
        self.mods_mut()[i].toggle(true);

        if let Some(old) = old_snapshot {
            self.restore_snapshot(i, &old);
        }
        info!("[{}] reloaded", id);
        ReloadOutcome::Reloaded
    }

    fn capture_snapshot(&mut self, i: usize) -> Option<StateSnapshot> {
        let name = self.mods_mut()[i].hook_name(hooks::SAVE_STATE);
        let (called, result) =
            self.mods_mut()[i].invoke_hook(&name, HookSig::SnapshotOut, HookArgs::None);
        let bytes = match (called, result) {
            (true, Some(HookResult::Bytes(bytes))) => bytes,
            _ => return None,
        };
        match StateSnapshot::from_bytes(&bytes) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!("[{}] unreadable state snapshot: {e}", self.mods_mut()[i].id());
                None
            }
        }
    }

    /// Merge the old generation's values into the new generation's
    /// defaults and import the result. Partial application is possible
    /// when the import hook rejects the merged snapshot.
    fn restore_snapshot(&mut self, i: usize, old: &StateSnapshot) {
        let id = self.mods_mut()[i].id().to_string();
        let mut merged = match self.capture_snapshot(i) {
            Some(defaults) => defaults,
            None => {
                warn!("[{}] new generation exports no state, snapshot dropped", id);
                return;
            }
        };
        let carried = merged.merge_from(old, &id);

        let name = self.mods_mut()[i].hook_name(hooks::RESTORE_STATE);
        let bytes = merged.to_bytes();
        let (called, result) = self.mods_mut()[i].invoke_hook(
            &name,
            HookSig::SnapshotIn,
            HookArgs::Bytes(&bytes),
        );
        if matches!((called, result), (true, Some(HookResult::Flag(true)))) {
            info!("[{}] carried {carried} field(s) across reload", id);
        } else {
            let err = ModError::Reload("state restore failed; continuing with defaults".to_string());
            error!("[{}] {err}", id);
        }
    }
}
