//! Loaded-code handles and the typed hook surface mods expose.
//!
//! A mod's executable code is either a dynamic library prepared by the
//! code loader or an in-process hook table (builtin mods and tests). Both
//! resolve `<class>.<member>` names into typed [`HookFn`] closures; the
//! string form survives only at the manifest boundary and as cache keys.

use libloading::Library;
use std::collections::HashMap;
use std::sync::Arc;

/// Well-known hook member names probed on a mod's entry class.
pub mod hooks {
    /// `fn(bool) -> bool` — activate / deactivate the mod.
    pub const ON_TOGGLE: &str = "OnToggle";
    /// `fn(f32)` — called once per primary tick.
    pub const ON_UPDATE: &str = "OnUpdate";
    /// `fn(f32)` — called once per fixed-step tick.
    pub const ON_FIXED_UPDATE: &str = "OnFixedUpdate";
    /// `fn(f32)` — called once per late tick.
    pub const ON_LATE_UPDATE: &str = "OnLateUpdate";
    /// `fn()` — persist external state (broadcast before shutdown and
    /// before a reload unloads the old generation).
    pub const ON_SAVE: &str = "OnSave";
    /// `fn() -> bool` — unload gate; reload proceeds only if this returns
    /// true or is absent.
    pub const ON_UNLOAD: &str = "OnUnload";
    /// `fn() -> Vec<u8>` — export the persistent-state snapshot.
    pub const SAVE_STATE: &str = "SaveState";
    /// `fn(&[u8]) -> bool` — import a persistent-state snapshot.
    pub const RESTORE_STATE: &str = "RestoreState";
    /// Marker; its presence makes the mod reload-capable.
    pub const ENABLE_RELOAD: &str = "EnableReload";
}

/// Hook signature families the runtime knows how to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookSig {
    /// `fn() -> bool` — entry points and unload gates.
    Gate,
    /// `fn(bool) -> bool` — activation toggles.
    Toggle,
    /// `fn(f32)` — per-frame hooks receiving the delta time.
    Frame,
    /// `fn()` — notifications with no result (also used for markers).
    Notify,
    /// `fn() -> Vec<u8>` — snapshot export.
    SnapshotOut,
    /// `fn(&[u8]) -> bool` — snapshot import.
    SnapshotIn,
}

/// A resolved, callable hook.
#[derive(Clone)]
pub enum HookFn {
    Gate(Arc<dyn Fn() -> bool + Send + Sync>),
    Toggle(Arc<dyn Fn(bool) -> bool + Send + Sync>),
    Frame(Arc<dyn Fn(f32) + Send + Sync>),
    Notify(Arc<dyn Fn() + Send + Sync>),
    SnapshotOut(Arc<dyn Fn() -> Vec<u8> + Send + Sync>),
    SnapshotIn(Arc<dyn Fn(&[u8]) -> bool + Send + Sync>),
}

impl HookFn {
    pub fn sig(&self) -> HookSig {
        match self {
            HookFn::Gate(_) => HookSig::Gate,
            HookFn::Toggle(_) => HookSig::Toggle,
            HookFn::Frame(_) => HookSig::Frame,
            HookFn::Notify(_) => HookSig::Notify,
            HookFn::SnapshotOut(_) => HookSig::SnapshotOut,
            HookFn::SnapshotIn(_) => HookSig::SnapshotIn,
        }
    }
}

/// Hook registry for mods compiled into the host process.
///
/// The dynamic-library path resolves exported symbols instead; this is the
/// factory-created twin, used by builtin mods and tests.
#[derive(Default, Clone)]
pub struct HookTable {
    entries: HashMap<String, HookFn>,
}

impl HookTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, qualified: impl Into<String>, hook: HookFn) {
        self.entries.insert(qualified.into(), hook);
    }

    pub fn gate(
        mut self,
        qualified: impl Into<String>,
        f: impl Fn() -> bool + Send + Sync + 'static,
    ) -> Self {
        self.insert(qualified, HookFn::Gate(Arc::new(f)));
        self
    }

    pub fn toggle(
        mut self,
        qualified: impl Into<String>,
        f: impl Fn(bool) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.insert(qualified, HookFn::Toggle(Arc::new(f)));
        self
    }

    pub fn frame(
        mut self,
        qualified: impl Into<String>,
        f: impl Fn(f32) + Send + Sync + 'static,
    ) -> Self {
        self.insert(qualified, HookFn::Frame(Arc::new(f)));
        self
    }

    pub fn notify(
        mut self,
        qualified: impl Into<String>,
        f: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        self.insert(qualified, HookFn::Notify(Arc::new(f)));
        self
    }

    pub fn snapshot_out(
        mut self,
        qualified: impl Into<String>,
        f: impl Fn() -> Vec<u8> + Send + Sync + 'static,
    ) -> Self {
        self.insert(qualified, HookFn::SnapshotOut(Arc::new(f)));
        self
    }

    pub fn snapshot_in(
        mut self,
        qualified: impl Into<String>,
        f: impl Fn(&[u8]) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.insert(qualified, HookFn::SnapshotIn(Arc::new(f)));
        self
    }

    /// Marker entry with no behavior (e.g. the reload-enable marker).
    pub fn marker(self, qualified: impl Into<String>) -> Self {
        self.notify(qualified, || {})
    }

    fn resolve(&self, qualified: &str, sig: HookSig) -> Option<HookFn> {
        self.entries
            .get(qualified)
            .filter(|hook| hook.sig() == sig)
            .cloned()
    }
}

/// Produces a fresh code generation for factory-registered mods.
///
/// Called again on every reload, so successive calls may return different
/// tables (that is what makes a factory mod's reload meaningful).
pub type CodeFactory = Box<dyn Fn() -> HookTable + Send + Sync>;

/// One generation of a mod's executable code.
pub enum ModCode {
    /// Dynamic library prepared by the code loader.
    Dylib(Library),
    /// In-process hook table.
    Table(HookTable),
}

impl ModCode {
    /// Resolve `<class>.<member>` against this generation.
    ///
    /// Dylib symbols use the qualified name with `.` replaced by `_`, the
    /// mangling mod build scripts apply when exporting hooks.
    pub fn resolve(&self, qualified: &str, sig: HookSig) -> Option<HookFn> {
        match self {
            ModCode::Table(table) => table.resolve(qualified, sig),
            ModCode::Dylib(lib) => resolve_dylib(lib, qualified, sig),
        }
    }
}

fn resolve_dylib(lib: &Library, qualified: &str, sig: HookSig) -> Option<HookFn> {
    let symbol = qualified.replace('.', "_");
    let name = symbol.as_bytes();

    // The raw fn pointers copied out of the symbols are valid for as long
    // as the library is; the invocation cache holding these closures is
    // cleared before the code handle is detached.
    unsafe {
        match sig {
            HookSig::Gate => {
                let f: libloading::Symbol<unsafe extern "C" fn() -> bool> = lib.get(name).ok()?;
                let f = *f;
                Some(HookFn::Gate(Arc::new(move || unsafe { f() })))
            }
            HookSig::Toggle => {
                let f: libloading::Symbol<unsafe extern "C" fn(bool) -> bool> =
                    lib.get(name).ok()?;
                let f = *f;
                Some(HookFn::Toggle(Arc::new(move |active| unsafe { f(active) })))
            }
            HookSig::Frame => {
                let f: libloading::Symbol<unsafe extern "C" fn(f32)> = lib.get(name).ok()?;
                let f = *f;
                Some(HookFn::Frame(Arc::new(move |dt| unsafe { f(dt) })))
            }
            HookSig::Notify => {
                let f: libloading::Symbol<unsafe extern "C" fn()> = lib.get(name).ok()?;
                let f = *f;
                Some(HookFn::Notify(Arc::new(move || unsafe { f() })))
            }
            HookSig::SnapshotOut => {
                // Two-call protocol: a null buffer asks for the required
                // length, the second call fills the buffer.
                let f: libloading::Symbol<unsafe extern "C" fn(*mut u8, usize) -> isize> =
                    lib.get(name).ok()?;
                let f = *f;
                Some(HookFn::SnapshotOut(Arc::new(move || {
                    let needed = unsafe { f(std::ptr::null_mut(), 0) };
                    if needed <= 0 {
                        return Vec::new();
                    }
                    let mut buf = vec![0u8; needed as usize];
                    let written = unsafe { f(buf.as_mut_ptr(), buf.len()) };
                    buf.truncate(written.max(0) as usize);
                    buf
                })))
            }
            HookSig::SnapshotIn => {
                let f: libloading::Symbol<unsafe extern "C" fn(*const u8, usize) -> bool> =
                    lib.get(name).ok()?;
                let f = *f;
                Some(HookFn::SnapshotIn(Arc::new(move |bytes: &[u8]| unsafe {
                    f(bytes.as_ptr(), bytes.len())
                })))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_resolution_matches_name_and_signature() {
        let table = HookTable::new()
            .gate("X.Main.Load", || true)
            .frame("X.Main.OnUpdate", |_| {});
        let code = ModCode::Table(table);

        assert!(code.resolve("X.Main.Load", HookSig::Gate).is_some());
        assert!(code.resolve("X.Main.OnUpdate", HookSig::Frame).is_some());
        // Right name, wrong signature.
        assert!(code.resolve("X.Main.Load", HookSig::Frame).is_none());
        // Unknown name.
        assert!(code.resolve("X.Main.OnToggle", HookSig::Toggle).is_none());
    }

    #[test]
    fn marker_resolves_as_notify() {
        let table = HookTable::new().marker("X.Main.EnableReload");
        let code = ModCode::Table(table);
        assert!(code.resolve("X.Main.EnableReload", HookSig::Notify).is_some());
    }
}
