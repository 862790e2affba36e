//! Per-mod runtime state: code generation, lifecycle flags, hook access.

use crate::code::{hooks, CodeFactory, HookSig, ModCode};
use crate::descriptor::ModDescriptor;
use crate::invoke::{HookArgs, HookResult, InvocationCache};
use crate::loader::PrepState;
use crate::version::Version;
use std::collections::HashMap;
use std::fmt;
use std::time::SystemTime;
use tracing::{error, info};

/// Derived lifecycle state of a mod.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModState {
    /// No code generation attached.
    NotLoaded,
    /// Entry point ran and reported success; not yet activated.
    Inactive,
    /// Loaded and activated.
    Active,
    /// Code attached but the entry point has not completed.
    Loaded,
}

/// One discovered mod and everything that changes over its lifetime.
///
/// The descriptor is frozen at discovery; the rest tracks the current code
/// generation and the flags the lifecycle operations consult.
pub struct ModInstance {
    pub descriptor: ModDescriptor,
    pub(crate) code: Option<ModCode>,
    /// In-process code source for builtin mods; `None` for dylib mods.
    pub(crate) factory: Option<CodeFactory>,
    pub(crate) cache: InvocationCache,
    pub(crate) prep: PrepState,
    /// A load attempt ran to the entry point this generation. Set even
    /// when the entry fails, so a later activation cannot rerun it.
    pub(crate) started: bool,
    pub(crate) error_on_loading: bool,
    /// Failures recorded by the most recent load attempt.
    pub(crate) load_errors: Vec<crate::error::ModError>,
    pub(crate) active: bool,
    /// Operator preference, persisted across runs. A disabled mod is
    /// skipped by bulk loading but can still be loaded explicitly.
    pub enabled: bool,
    pub(crate) can_reload: bool,
    pub(crate) reload_probed: bool,
    /// Re-entrancy guard for the load path.
    pub(crate) loading: bool,
    /// Set when dependency resolution placed this mod on a cycle.
    pub(crate) in_cycle: bool,
    /// Highest advisory version seen from the update checker.
    pub(crate) newest_version: Option<Version>,
    /// Versions of requirements observed at load time.
    pub(crate) resolved_requirements: HashMap<String, Option<Version>>,
    /// Entry class path; hooks are probed as `<scope>.<member>`.
    pub(crate) hook_scope: String,
    /// Artifact mtime captured when the current generation loaded.
    pub(crate) loaded_stamp: Option<SystemTime>,
}

impl ModInstance {
    pub fn new(descriptor: ModDescriptor) -> Self {
        Self {
            descriptor,
            code: None,
            factory: None,
            cache: InvocationCache::new(),
            prep: PrepState::default(),
            started: false,
            error_on_loading: false,
            load_errors: Vec::new(),
            active: false,
            enabled: true,
            can_reload: false,
            reload_probed: false,
            loading: false,
            in_cycle: false,
            newest_version: None,
            resolved_requirements: HashMap::new(),
            hook_scope: String::new(),
            loaded_stamp: None,
        }
    }

    pub fn with_factory(descriptor: ModDescriptor, factory: CodeFactory) -> Self {
        let mut inst = Self::new(descriptor);
        inst.factory = Some(factory);
        inst
    }

    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    pub fn display_name(&self) -> &str {
        &self.descriptor.display_name
    }

    pub fn version(&self) -> Version {
        self.descriptor.version
    }

    pub fn newest_version(&self) -> Option<Version> {
        self.newest_version
    }

    pub fn loaded(&self) -> bool {
        self.code.is_some()
    }

    pub fn active(&self) -> bool {
        self.active
    }

    pub fn errored(&self) -> bool {
        self.error_on_loading
    }

    /// Classified failures from the most recent load attempt.
    pub fn load_errors(&self) -> &[crate::error::ModError] {
        &self.load_errors
    }

    pub fn can_reload(&self) -> bool {
        self.can_reload
    }

    /// Requirement versions observed at load time; `None` marks a
    /// requirement that was missing from the registry.
    pub fn resolved_requirements(&self) -> &HashMap<String, Option<Version>> {
        &self.resolved_requirements
    }

    pub fn state(&self) -> ModState {
        if self.code.is_none() {
            ModState::NotLoaded
        } else if self.active {
            ModState::Active
        } else if self.started {
            ModState::Inactive
        } else {
            ModState::Loaded
        }
    }

    /// Qualified hook name on this mod's entry class.
    pub fn hook_name(&self, member: &str) -> String {
        format!("{}.{}", self.hook_scope, member)
    }

    /// Invoke a hook by fully qualified name against the current code
    /// generation. `(false, None)` when the mod has no code attached.
    pub fn invoke_hook(
        &mut self,
        qualified: &str,
        sig: HookSig,
        args: HookArgs<'_>,
    ) -> (bool, Option<HookResult>) {
        let Some(code) = self.code.as_ref() else {
            return (false, None);
        };
        self.cache
            .invoke(code, &self.descriptor.id, qualified, sig, args)
    }

    pub fn has_hook(&mut self, member: &str, sig: HookSig) -> bool {
        let name = self.hook_name(member);
        match self.code.as_ref() {
            Some(code) => self.cache.resolve(code, &name, sig).is_some(),
            None => false,
        }
    }

    /// Activate or deactivate a started mod via its toggle hook.
    ///
    /// Not started or errored mods refuse. A mod without a toggle hook
    /// activates unconditionally but cannot be deactivated; one with the
    /// hook changes state only when the hook runs and returns true.
    pub fn toggle(&mut self, value: bool) -> bool {
        if !self.started || self.error_on_loading {
            return false;
        }
        if self.active == value {
            return true;
        }

        let name = self.hook_name(hooks::ON_TOGGLE);
        if !self.has_hook(hooks::ON_TOGGLE, HookSig::Toggle) {
            if value {
                self.active = true;
                info!("[{}] active", self.descriptor.id);
                return true;
            }
            // No way to ask the mod to stand down; it stays active.
            return false;
        }

        let (called, result) = self.invoke_hook(&name, HookSig::Toggle, HookArgs::Flag(value));
        match (called, result) {
            (true, Some(HookResult::Flag(true))) => {
                self.active = value;
                info!(
                    "[{}] {}",
                    self.descriptor.id,
                    if value { "active" } else { "inactive" }
                );
                true
            }
            (true, _) => {
                info!(
                    "[{}] toggled {} unsuccessfully",
                    self.descriptor.id,
                    if value { "on" } else { "off" }
                );
                false
            }
            (false, _) => {
                error!("[{}] toggle hook failed", self.descriptor.id);
                false
            }
        }
    }
}

impl fmt::Debug for ModInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModInstance")
            .field("id", &self.descriptor.id)
            .field("version", &self.descriptor.version)
            .field("state", &self.state())
            .field("enabled", &self.enabled)
            .field("errored", &self.error_on_loading)
            .field("can_reload", &self.can_reload)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::HookTable;
    use crate::descriptor::ModManifest;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn instance(table: HookTable) -> ModInstance {
        let manifest = ModManifest {
            id: "m".into(),
            version: "1.0.0".into(),
            entry_point: "M.Main.Load".into(),
            ..Default::default()
        };
        let descriptor = ModDescriptor::from_manifest(manifest, PathBuf::from("/mods/m")).unwrap();
        let mut inst = ModInstance::new(descriptor);
        inst.code = Some(ModCode::Table(table));
        inst.hook_scope = "M.Main".into();
        inst.started = true;
        inst
    }

    #[test]
    fn state_derivation() {
        let mut inst = instance(HookTable::new());
        assert_eq!(inst.state(), ModState::Inactive);
        inst.active = true;
        assert_eq!(inst.state(), ModState::Active);
        inst.started = false;
        assert_eq!(inst.state(), ModState::Loaded);
        inst.code = None;
        assert_eq!(inst.state(), ModState::NotLoaded);
    }

    #[test]
    fn toggle_without_hook_activates_but_never_deactivates() {
        let mut inst = instance(HookTable::new());
        assert!(inst.toggle(true));
        assert!(inst.active());
        assert!(!inst.toggle(false));
        assert!(inst.active());
    }

    #[test]
    fn toggle_hook_controls_both_directions() {
        let seen = Arc::new(AtomicBool::new(false));
        let seen2 = seen.clone();
        let mut inst = instance(HookTable::new().toggle("M.Main.OnToggle", move |v| {
            seen2.store(v, Ordering::SeqCst);
            true
        }));
        assert!(inst.toggle(true));
        assert!(seen.load(Ordering::SeqCst));
        assert!(inst.toggle(false));
        assert!(!inst.active());
    }

    #[test]
    fn refusing_toggle_hook_blocks_activation() {
        let mut inst = instance(HookTable::new().toggle("M.Main.OnToggle", |_| false));
        assert!(!inst.toggle(true));
        assert!(!inst.active());
    }

    #[test]
    fn panicking_toggle_hook_leaves_state_unchanged() {
        let mut inst = instance(HookTable::new().toggle("M.Main.OnToggle", |_| panic!("boom")));
        assert!(!inst.toggle(true));
        assert!(!inst.active());
        assert_eq!(inst.state(), ModState::Inactive);
    }

    #[test]
    fn unstarted_or_errored_mods_refuse_to_toggle() {
        let mut inst = instance(HookTable::new());
        inst.started = false;
        assert!(!inst.toggle(true));
        inst.started = true;
        inst.error_on_loading = true;
        assert!(!inst.toggle(true));
    }
}
