//! Runtime mod manager: discovery, dependency-ordered loading, lifecycle
//! control, hot reload with state migration, frame dispatch and update
//! checking.
//!
//! The entry type is [`ModRuntime`]. A host discovers mods from a
//! directory of manifests (or registers them programmatically, optionally
//! backed by in-process [`code::HookTable`] factories), loads and
//! activates them, and then fans tick phases out through
//! [`ModRuntime::dispatch`]. Mods that opt in can be hot-reloaded in
//! place, carrying their marked state across generations.
//!
//! ```no_run
//! use mod_runtime::{manager_version, FramePhase, ModRuntime, Version};
//!
//! # fn main() -> mod_runtime::Result<()> {
//! let mut runtime = ModRuntime::new(manager_version(), Version::new(2, 0, 0));
//! runtime.discover(std::path::Path::new("mods"), "mod.json")?;
//! runtime.load_all();
//! runtime.dispatch(FramePhase::Update, 0.016);
//! # Ok(())
//! # }
//! ```

pub mod code;
pub mod descriptor;
pub mod dispatch;
pub mod error;
pub mod instance;
pub mod invoke;
pub mod loader;
pub mod reload;
pub mod resolver;
pub mod runtime;
pub mod snapshot;
pub mod updates;
pub mod version;

pub use code::{hooks, CodeFactory, HookFn, HookSig, HookTable, ModCode};
pub use descriptor::{EntryKind, EntryPoint, ModDescriptor, ModManifest, Requirement};
pub use dispatch::FramePhase;
pub use error::{ModError, Result};
pub use instance::{ModInstance, ModState};
pub use invoke::{HookArgs, HookResult, InvocationCache};
pub use loader::CodeLoader;
pub use reload::ReloadOutcome;
pub use resolver::{resolve_order, Resolution};
pub use runtime::{ModParamEntry, ModParams, ModRuntime};
pub use snapshot::{FieldKind, PersistentField, StateSnapshot};
pub use updates::{HttpFetcher, Release, ReleaseFetcher, ReleaseNotice, Repository, UpdateChecker};
pub use version::Version;

/// Version of the runtime itself, from the crate manifest.
pub const MANAGER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// [`MANAGER_VERSION`] as a comparable value.
pub fn manager_version() -> Version {
    Version::parse(MANAGER_VERSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manager_version_is_parseable() {
        assert!(!manager_version().is_zero());
    }
}
