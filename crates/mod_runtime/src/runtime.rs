//! The mod runtime: discovery, registration, loading and activation.

use crate::code::{hooks, CodeFactory, HookSig, ModCode};
use crate::descriptor::{read_manifest, EntryKind, EntryPoint, ModDescriptor};
use crate::error::{ModError, Result};
use crate::instance::ModInstance;
use crate::invoke::{HookArgs, HookResult};
use crate::loader::CodeLoader;
use crate::resolver::resolve_order;
use crate::updates::ReleaseNotice;
use crate::version::Version;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Persisted operator preferences, one entry per known mod.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ModParams {
    #[serde(default)]
    pub mods: Vec<ModParamEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModParamEntry {
    pub id: String,
    pub enabled: bool,
}

impl ModParams {
    /// Load preferences; a missing or unreadable file yields defaults.
    pub fn load(path: &Path) -> ModParams {
        if !path.is_file() {
            return ModParams::default();
        }
        match std::fs::read_to_string(path).map_err(|e| e.to_string()).and_then(|raw| {
            serde_json::from_str::<ModParams>(&raw).map_err(|e| e.to_string())
        }) {
            Ok(params) => params,
            Err(e) => {
                warn!("could not read '{}': {e}; using defaults", path.display());
                ModParams::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }
}

/// Owns every [`ModInstance`] and drives the lifecycle operations.
///
/// All state is reachable from here; nothing about the runtime lives in
/// globals, so tests (and embedders) can run several side by side.
pub struct ModRuntime {
    manager_version: Version,
    host_version: Version,
    loader: CodeLoader,
    mods: Vec<ModInstance>,
    index: HashMap<String, usize>,
    update_tx: mpsc::UnboundedSender<ReleaseNotice>,
    update_rx: mpsc::UnboundedReceiver<ReleaseNotice>,
}

impl ModRuntime {
    pub fn new(manager_version: Version, host_version: Version) -> Self {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        Self {
            manager_version,
            host_version,
            loader: CodeLoader::new(manager_version),
            mods: Vec::new(),
            index: HashMap::new(),
            update_tx,
            update_rx,
        }
    }

    pub fn manager_version(&self) -> Version {
        self.manager_version
    }

    pub fn host_version(&self) -> Version {
        self.host_version
    }

    pub fn len(&self) -> usize {
        self.mods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mods.is_empty()
    }

    pub fn mods(&self) -> &[ModInstance] {
        &self.mods
    }

    pub(crate) fn mods_mut(&mut self) -> &mut [ModInstance] {
        &mut self.mods
    }

    pub(crate) fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn find(&self, id: &str) -> Option<&ModInstance> {
        self.index.get(id).map(|&i| &self.mods[i])
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut ModInstance> {
        self.index.get(id).copied().map(move |i| &mut self.mods[i])
    }

    /// Scan `mods_dir` for subdirectories carrying a manifest and register
    /// everything found. Returns how many mods were registered; a broken
    /// manifest skips that directory, never the whole scan.
    pub fn discover(&mut self, mods_dir: &Path, manifest_name: &str) -> Result<usize> {
        let mut found = Vec::new();
        for entry in std::fs::read_dir(mods_dir)? {
            let dir = entry?.path();
            if !dir.is_dir() {
                continue;
            }
            let mut manifest_path = dir.join(manifest_name);
            if !manifest_path.is_file() {
                // Mod archives unpacked on case-sensitive filesystems often
                // carry a lowercased manifest.
                let lower = dir.join(manifest_name.to_lowercase());
                if lower.is_file() {
                    manifest_path = lower;
                } else {
                    debug!("no manifest in '{}', skipping", dir.display());
                    continue;
                }
            }
            match read_manifest(&manifest_path) {
                Ok(descriptor) => found.push(descriptor),
                Err(e) => error!("skipping '{}': {e}", dir.display()),
            }
        }
        let count = found.len();
        self.install(found);
        Ok(count)
    }

    /// Register descriptors for dylib-backed mods.
    pub fn install(&mut self, descriptors: Vec<ModDescriptor>) {
        self.install_with(descriptors.into_iter().map(|d| (d, None)).collect());
    }

    /// Register a batch of mods, each optionally backed by an in-process
    /// code factory. The batch is ordered so requirements come first;
    /// cycle members are flagged and will refuse to load.
    pub fn install_with(&mut self, batch: Vec<(ModDescriptor, Option<CodeFactory>)>) {
        let mut accepted: Vec<(ModDescriptor, Option<CodeFactory>)> = Vec::new();
        for (descriptor, factory) in batch {
            let duplicate = self.index.contains_key(&descriptor.id)
                || accepted.iter().any(|(d, _)| d.id == descriptor.id);
            if duplicate {
                error!(
                    "[{}] duplicate id, skipping '{}'",
                    descriptor.id,
                    descriptor.dir.display()
                );
                continue;
            }
            accepted.push((descriptor, factory));
        }

        let descriptors: Vec<ModDescriptor> = accepted.iter().map(|(d, _)| d.clone()).collect();
        let resolution = resolve_order(&descriptors);

        let mut by_id: HashMap<String, (ModDescriptor, Option<CodeFactory>)> = accepted
            .into_iter()
            .map(|(d, f)| (d.id.clone(), (d, f)))
            .collect();
        for id in &resolution.order {
            let Some((descriptor, factory)) = by_id.remove(id) else {
                continue;
            };
            let mut inst = match factory {
                Some(factory) => ModInstance::with_factory(descriptor, factory),
                None => ModInstance::new(descriptor),
            };
            inst.in_cycle = resolution.cycles.iter().any(|c| c == inst.id());
            self.index.insert(inst.id().to_string(), self.mods.len());
            self.mods.push(inst);
        }
    }

    /// Load and activate every enabled mod, in registration order.
    pub fn load_all(&mut self) -> usize {
        let mut activated = 0;
        for i in 0..self.mods.len() {
            if !self.mods[i].enabled {
                info!("[{}] disabled, skipping", self.mods[i].id());
                continue;
            }
            if self.activate(i, true) {
                activated += 1;
            }
        }
        info!("{}/{} mods active", activated, self.mods.len());
        activated
    }

    /// Activate or deactivate a mod by id.
    pub fn set_active(&mut self, id: &str, value: bool) -> bool {
        match self.index.get(id).copied() {
            Some(i) => self.activate(i, value),
            None => {
                error!("[{}] unknown mod", id);
                false
            }
        }
    }

    fn activate(&mut self, i: usize, value: bool) -> bool {
        if value && !self.mods[i].started {
            let start = Instant::now();
            if !self.load_mod(i) {
                return false;
            }
            info!(
                "[{}] loaded in {:.3}s",
                self.mods[i].id(),
                start.elapsed().as_secs_f64()
            );
        }
        self.mods[i].toggle(value)
    }

    /// Run the load sequence for one mod. Idempotent for started mods;
    /// re-entrant calls (through requirement activation) are refused.
    /// A failed load is final for the generation: the error sticks until
    /// a reload resets the instance.
    pub(crate) fn load_mod(&mut self, i: usize) -> bool {
        if self.mods[i].loading {
            return false;
        }
        if self.mods[i].started {
            return !self.mods[i].error_on_loading;
        }
        if self.mods[i].error_on_loading {
            return false;
        }
        self.mods[i].loading = true;
        let ok = self.load_mod_inner(i);
        self.mods[i].loading = false;
        ok
    }

    fn load_mod_inner(&mut self, i: usize) -> bool {
        self.mods[i].load_errors.clear();
        let descriptor = self.mods[i].descriptor.clone();
        info!("[{}] loading v{}", descriptor.id, descriptor.version);

        if self.mods[i].in_cycle {
            let err = ModError::Dependency("requirement cycle, refusing to load".to_string());
            error!("[{}] {err}", descriptor.id);
            self.mods[i].load_errors.push(err);
            self.mods[i].error_on_loading = true;
            return false;
        }

        // Validation phase: collect everything wrong before failing, so a
        // broken mod reports all of its problems at once.
        let mut failures: Vec<ModError> = Vec::new();

        if descriptor.artifact_name.trim().is_empty() {
            failures.push(ModError::Validation("artifact name is empty".to_string()));
        }
        let entry = match EntryPoint::parse(&descriptor.entry_point) {
            Ok(entry) => Some(entry),
            Err(e) => {
                failures.push(e);
                None
            }
        };
        if !descriptor.manager_version.is_zero() && descriptor.manager_version > self.manager_version
        {
            failures.push(ModError::Compatibility(format!(
                "requires manager v{}, running v{}",
                descriptor.manager_version, self.manager_version
            )));
        }
        if !descriptor.host_version.is_zero()
            && !self.host_version.is_zero()
            && descriptor.host_version > self.host_version
        {
            failures.push(ModError::Compatibility(format!(
                "requires host v{}, running v{}",
                descriptor.host_version, self.host_version
            )));
        }

        let mut healthy_deps: Vec<usize> = Vec::new();
        for req in &descriptor.requirements {
            let Some(&j) = self.index.get(&req.id) else {
                self.mods[i].resolved_requirements.insert(req.id.clone(), None);
                failures.push(ModError::Dependency(format!(
                    "required mod '{}' is missing",
                    req.id
                )));
                continue;
            };
            let dep_version = self.mods[j].descriptor.version;
            self.mods[i]
                .resolved_requirements
                .insert(req.id.clone(), Some(dep_version));
            if let Some(min) = req.min_version {
                if dep_version < min {
                    failures.push(ModError::Dependency(format!(
                        "required mod '{}' is v{}, needs at least v{}",
                        req.id, dep_version, min
                    )));
                    continue;
                }
            }
            healthy_deps.push(j);
        }

        // Healthy requirements are force-enabled and activated. One that
        // stays inactive is reported but does not fail this load.
        for j in healthy_deps {
            self.mods[j].enabled = true;
            self.activate(j, true);
            if !self.mods[j].active() {
                info!(
                    "[{}] required mod '{}' is inactive",
                    descriptor.id,
                    self.mods[j].id()
                );
            }
        }

        if !failures.is_empty() {
            for failure in &failures {
                error!("[{}] {failure}", descriptor.id);
            }
            self.mods[i].load_errors = failures;
            self.mods[i].error_on_loading = true;
            return false;
        }
        let Some(entry) = entry else {
            self.mods[i].error_on_loading = true;
            return false;
        };

        // An entry point naming its own artifact file overrides the
        // manifest default.
        let artifact = match &entry.artifact {
            Some(file) => descriptor.dir.join(file),
            None => descriptor.artifact_path(),
        };

        // Attach a code generation.
        if self.mods[i].factory.is_some() {
            let inst = &mut self.mods[i];
            if let Some(factory) = inst.factory.as_ref() {
                inst.code = Some(ModCode::Table(factory()));
            }
            inst.cache.clear();
        } else {
            let loader = self.loader;
            // The fingerprint hashes the compat version the mod declares,
            // not the running host's, so changing the declaration alone
            // invalidates the cache.
            let compat = descriptor.manager_version;
            let inst = &mut self.mods[i];
            let prepared = match loader.prepare(&artifact, compat, &mut inst.prep) {
                Ok(path) => path,
                Err(e) => {
                    error!("[{}] {e}", descriptor.id);
                    inst.load_errors.push(e);
                    inst.error_on_loading = true;
                    return false;
                }
            };
            let lib = match loader.load(&prepared) {
                Ok(lib) => lib,
                Err(e) => {
                    error!("[{}] {e}", descriptor.id);
                    inst.load_errors.push(e);
                    inst.error_on_loading = true;
                    return false;
                }
            };
            inst.cache.clear();
            inst.code = Some(ModCode::Dylib(lib));
        }

        let inst = &mut self.mods[i];
        inst.loaded_stamp = std::fs::metadata(&artifact)
            .and_then(|m| m.modified())
            .ok();
        inst.hook_scope = entry.class_path.clone();
        if !inst.reload_probed {
            inst.can_reload = inst.has_hook(hooks::ENABLE_RELOAD, HookSig::Notify);
            inst.reload_probed = true;
        }

        // Entry methods must return true; constructors carry no result, so
        // running without a panic counts as success.
        let qualified = entry.qualified_name();
        let ok = match entry.kind() {
            EntryKind::Method => {
                let (called, result) = inst.invoke_hook(&qualified, HookSig::Gate, HookArgs::None);
                matches!((called, result), (true, Some(HookResult::Flag(true))))
            }
            EntryKind::Constructor | EntryKind::StaticConstructor => {
                let (called, _) = inst.invoke_hook(&qualified, HookSig::Notify, HookArgs::None);
                called
            }
        };
        // The load attempt is spent either way; only a reload may retry.
        inst.started = true;
        if !ok {
            let err = ModError::Load(format!("entry point '{qualified}' reported failure"));
            error!("[{}] {err}", descriptor.id);
            inst.load_errors.push(err);
            inst.error_on_loading = true;
            return false;
        }
        true
    }

    /// Broadcast the save notification to every active mod. Individual
    /// failures are logged and never stop the pass.
    pub fn save_all(&mut self) {
        for i in 0..self.mods.len() {
            if !self.mods[i].active() {
                continue;
            }
            let name = self.mods[i].hook_name(hooks::ON_SAVE);
            self.mods[i].invoke_hook(&name, HookSig::Notify, HookArgs::None);
        }
    }

    /// Sender half handed to the update checker.
    pub fn update_sink(&self) -> mpsc::UnboundedSender<ReleaseNotice> {
        self.update_tx.clone()
    }

    /// Apply every pending update notice. Advisory versions only move
    /// forward and only past the installed version; late or out-of-order
    /// completions cannot regress what is shown.
    pub fn drain_update_notices(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(notice) = self.update_rx.try_recv() {
            let Some(&i) = self.index.get(&notice.id) else {
                debug!("release notice for unknown mod '{}'", notice.id);
                continue;
            };
            let inst = &mut self.mods[i];
            let advances = notice.version > inst.descriptor.version
                && inst.newest_version.map_or(true, |v| notice.version > v);
            if advances {
                inst.newest_version = Some(notice.version);
                info!("[{}] update available: v{}", notice.id, notice.version);
                applied += 1;
            }
        }
        applied
    }

    /// Distinct repository URLs over all registered mods, in registration
    /// order.
    pub fn repository_urls(&self) -> Vec<String> {
        let mut urls = Vec::new();
        for inst in &self.mods {
            if let Some(url) = &inst.descriptor.repository {
                if !urls.iter().any(|u| u == url) {
                    urls.push(url.clone());
                }
            }
        }
        urls
    }

    pub fn apply_params(&mut self, params: &ModParams) {
        for entry in &params.mods {
            if let Some(inst) = self.find_mut(&entry.id) {
                inst.enabled = entry.enabled;
            }
        }
    }

    pub fn collect_params(&self) -> ModParams {
        ModParams {
            mods: self
                .mods
                .iter()
                .map(|inst| ModParamEntry {
                    id: inst.id().to_string(),
                    enabled: inst.enabled,
                })
                .collect(),
        }
    }
}
