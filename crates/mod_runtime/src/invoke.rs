//! Memoized hook invocation with panic isolation.
//!
//! Every hook call goes through an [`InvocationCache`] keyed by qualified
//! name and signature. Hits and misses are both memoized, so a mod that
//! lacks a frame hook costs one lookup per run, not one per frame. Calls
//! run under `catch_unwind` so a panicking mod never takes the host down.

use crate::code::{HookFn, HookSig, ModCode};
use crate::error::ModError;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error};

/// Arguments passed to a hook call.
#[derive(Debug, Clone, Copy)]
pub enum HookArgs<'a> {
    None,
    Flag(bool),
    Delta(f32),
    Bytes(&'a [u8]),
}

/// Values a hook call can produce.
#[derive(Debug, Clone, PartialEq)]
pub enum HookResult {
    Unit,
    Flag(bool),
    Bytes(Vec<u8>),
}

/// Per-instance resolution memo. Cleared whenever the instance's code
/// generation changes; cached closures must not outlive the code they
/// point into.
#[derive(Default)]
pub struct InvocationCache {
    entries: HashMap<(String, HookSig), Option<HookFn>>,
}

impl InvocationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Look up a hook, consulting the code handle only on the first miss.
    pub fn resolve(&mut self, code: &ModCode, qualified: &str, sig: HookSig) -> Option<HookFn> {
        if let Some(cached) = self.entries.get(&(qualified.to_string(), sig)) {
            return cached.clone();
        }
        let resolved = code.resolve(qualified, sig);
        if resolved.is_none() {
            debug!("hook '{}' not found ({:?})", qualified, sig);
        }
        self.entries
            .insert((qualified.to_string(), sig), resolved.clone());
        resolved
    }

    /// Invoke a hook by qualified name.
    ///
    /// Returns `(called, result)`. `called` is false when the name is
    /// malformed, the hook is absent, the argument shape does not match
    /// the signature, or the hook panicked. Absence is silent (and cached);
    /// the other failures are logged against `mod_id`.
    pub fn invoke(
        &mut self,
        code: &ModCode,
        mod_id: &str,
        qualified: &str,
        sig: HookSig,
        args: HookArgs<'_>,
    ) -> (bool, Option<HookResult>) {
        if !qualified.contains('.') {
            let err = ModError::Invocation(format!("malformed hook name '{qualified}'"));
            error!("[{}] {err}", mod_id);
            return (false, None);
        }
        let Some(hook) = self.resolve(code, qualified, sig) else {
            return (false, None);
        };

        match call_checked(&hook, qualified, args) {
            Ok(result) => (true, Some(result)),
            Err(err) => {
                error!("[{}] {err}", mod_id);
                (false, None)
            }
        }
    }
}

/// Call a resolved hook, converting an argument-shape mismatch or a panic
/// into an invocation error.
fn call_checked(
    hook: &HookFn,
    qualified: &str,
    args: HookArgs<'_>,
) -> std::result::Result<HookResult, ModError> {
    match panic::catch_unwind(AssertUnwindSafe(|| call(hook, args))) {
        Ok(Some(result)) => Ok(result),
        Ok(None) => Err(ModError::Invocation(format!(
            "hook '{qualified}' called with mismatched arguments"
        ))),
        Err(payload) => Err(ModError::Invocation(format!(
            "hook '{qualified}' panicked: {}",
            panic_message(&payload)
        ))),
    }
}

fn call(hook: &HookFn, args: HookArgs<'_>) -> Option<HookResult> {
    match (hook, args) {
        (HookFn::Gate(f), HookArgs::None) => Some(HookResult::Flag(f())),
        (HookFn::Toggle(f), HookArgs::Flag(v)) => Some(HookResult::Flag(f(v))),
        (HookFn::Frame(f), HookArgs::Delta(dt)) => {
            f(dt);
            Some(HookResult::Unit)
        }
        (HookFn::Notify(f), HookArgs::None) => {
            f();
            Some(HookResult::Unit)
        }
        (HookFn::SnapshotOut(f), HookArgs::None) => Some(HookResult::Bytes(f())),
        (HookFn::SnapshotIn(f), HookArgs::Bytes(b)) => Some(HookResult::Flag(f(b))),
        _ => None,
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::HookTable;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_code(counter: Arc<AtomicUsize>) -> ModCode {
        ModCode::Table(HookTable::new().frame("M.Main.OnUpdate", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
    }

    #[test]
    fn invokes_and_returns_results() {
        let code = ModCode::Table(HookTable::new().toggle("M.Main.OnToggle", |v| v));
        let mut cache = InvocationCache::new();
        let (called, result) = cache.invoke(
            &code,
            "m",
            "M.Main.OnToggle",
            HookSig::Toggle,
            HookArgs::Flag(true),
        );
        assert!(called);
        assert_eq!(result, Some(HookResult::Flag(true)));
    }

    #[test]
    fn absent_hook_is_silent_and_memoized() {
        let hits = Arc::new(AtomicUsize::new(0));
        let code = counting_code(hits.clone());
        let mut cache = InvocationCache::new();
        for _ in 0..3 {
            let (called, _) = cache.invoke(
                &code,
                "m",
                "M.Main.OnSave",
                HookSig::Notify,
                HookArgs::None,
            );
            assert!(!called);
        }
        // The miss is cached; the table is consulted once.
        assert_eq!(cache.entries.len(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn repeated_calls_reuse_the_resolved_hook() {
        let hits = Arc::new(AtomicUsize::new(0));
        let code = counting_code(hits.clone());
        let mut cache = InvocationCache::new();
        for _ in 0..5 {
            let (called, _) = cache.invoke(
                &code,
                "m",
                "M.Main.OnUpdate",
                HookSig::Frame,
                HookArgs::Delta(0.016),
            );
            assert!(called);
        }
        assert_eq!(hits.load(Ordering::SeqCst), 5);
        assert_eq!(cache.entries.len(), 1);
    }

    #[test]
    fn clear_forgets_cached_misses() {
        let code = ModCode::Table(HookTable::new());
        let mut cache = InvocationCache::new();
        cache.invoke(&code, "m", "M.Main.OnSave", HookSig::Notify, HookArgs::None);
        assert_eq!(cache.entries.len(), 1);
        cache.clear();
        assert!(cache.entries.is_empty());
    }

    #[test]
    fn panicking_hook_is_contained() {
        let code = ModCode::Table(
            HookTable::new().notify("M.Main.OnSave", || panic!("mod blew up")),
        );
        let mut cache = InvocationCache::new();
        let (called, result) =
            cache.invoke(&code, "m", "M.Main.OnSave", HookSig::Notify, HookArgs::None);
        assert!(!called);
        assert_eq!(result, None);
    }

    #[test]
    fn mismatched_arguments_fail_without_calling() {
        let code = ModCode::Table(HookTable::new().toggle("M.Main.OnToggle", |v| v));
        let mut cache = InvocationCache::new();
        let (called, _) = cache.invoke(
            &code,
            "m",
            "M.Main.OnToggle",
            HookSig::Toggle,
            HookArgs::None,
        );
        assert!(!called);
    }

    #[test]
    fn failures_surface_as_invocation_errors() {
        let toggle = HookFn::Toggle(Arc::new(|v| v));
        assert!(matches!(
            call_checked(&toggle, "M.Main.OnToggle", HookArgs::None),
            Err(ModError::Invocation(_))
        ));
        let panicky = HookFn::Notify(Arc::new(|| panic!("boom")));
        assert!(matches!(
            call_checked(&panicky, "M.Main.OnSave", HookArgs::None),
            Err(ModError::Invocation(_))
        ));
    }

    #[test]
    fn malformed_name_is_rejected() {
        let code = ModCode::Table(HookTable::new());
        let mut cache = InvocationCache::new();
        let (called, _) = cache.invoke(&code, "m", "Load", HookSig::Gate, HookArgs::None);
        assert!(!called);
    }
}
