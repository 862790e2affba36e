//! Frame dispatch: fans tick phases out to every active mod.

use crate::code::{hooks, HookSig};
use crate::invoke::HookArgs;
use crate::runtime::ModRuntime;

/// The three per-tick phases, dispatched in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    /// Primary phase; update notices are drained at its start.
    Update,
    FixedUpdate,
    LateUpdate,
}

impl FramePhase {
    pub fn hook_member(&self) -> &'static str {
        match self {
            FramePhase::Update => hooks::ON_UPDATE,
            FramePhase::FixedUpdate => hooks::ON_FIXED_UPDATE,
            FramePhase::LateUpdate => hooks::ON_LATE_UPDATE,
        }
    }
}

impl ModRuntime {
    /// Dispatch one phase to every active mod in registration order.
    ///
    /// A mod without the phase hook costs a memoized lookup; a panicking
    /// hook is contained by the invocation layer and the pass continues
    /// with the next mod. Dispatch never changes lifecycle state.
    pub fn dispatch(&mut self, phase: FramePhase, dt: f32) {
        if phase == FramePhase::Update {
            self.drain_update_notices();
        }
        let member = phase.hook_member();
        for i in 0..self.len() {
            let inst = &mut self.mods_mut()[i];
            if !inst.active() {
                continue;
            }
            let name = inst.hook_name(member);
            inst.invoke_hook(&name, HookSig::Frame, HookArgs::Delta(dt));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::{CodeFactory, HookTable};
    use crate::descriptor::{ModDescriptor, ModManifest};
    use crate::version::Version;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::sync::Arc;

    fn descriptor(id: &str) -> ModDescriptor {
        let manifest = ModManifest {
            id: id.to_string(),
            version: "1.0.0".to_string(),
            entry_point: "Demo.Main.Load".to_string(),
            ..Default::default()
        };
        ModDescriptor::from_manifest(manifest, PathBuf::from(format!("/mods/{id}"))).unwrap()
    }

    fn runtime_with(factories: Vec<(&str, CodeFactory)>) -> ModRuntime {
        let mut rt = ModRuntime::new(Version::new(1, 0, 0), Version::ZERO);
        rt.install_with(
            factories
                .into_iter()
                .map(|(id, f)| (descriptor(id), Some(f)))
                .collect(),
        );
        rt.load_all();
        rt
    }

    #[test]
    fn active_mods_receive_the_phase_hook_with_dt() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let last_dt = Arc::new(AtomicU32::new(0));
        let (t, d) = (ticks.clone(), last_dt.clone());
        let mut rt = runtime_with(vec![(
            "a",
            Box::new(move || {
                let (t, d) = (t.clone(), d.clone());
                HookTable::new()
                    .gate("Demo.Main.Load", || true)
                    .frame("Demo.Main.OnUpdate", move |dt| {
                        t.fetch_add(1, Ordering::SeqCst);
                        d.store(dt.to_bits(), Ordering::SeqCst);
                    })
            }) as CodeFactory,
        )]);

        rt.dispatch(FramePhase::Update, 0.016);
        rt.dispatch(FramePhase::Update, 0.032);
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
        assert_eq!(f32::from_bits(last_dt.load(Ordering::SeqCst)), 0.032);
    }

    #[test]
    fn inactive_mods_are_skipped() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let t = ticks.clone();
        let mut rt = runtime_with(vec![(
            "a",
            Box::new(move || {
                let t = t.clone();
                HookTable::new()
                    .gate("Demo.Main.Load", || true)
                    .toggle("Demo.Main.OnToggle", |_| true)
                    .frame("Demo.Main.OnUpdate", move |_| {
                        t.fetch_add(1, Ordering::SeqCst);
                    })
            }) as CodeFactory,
        )]);

        rt.set_active("a", false);
        rt.dispatch(FramePhase::Update, 0.016);
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn phases_reach_their_own_hooks_only() {
        let fixed = Arc::new(AtomicUsize::new(0));
        let late = Arc::new(AtomicUsize::new(0));
        let (fx, lt) = (fixed.clone(), late.clone());
        let mut rt = runtime_with(vec![(
            "a",
            Box::new(move || {
                let (fx, lt) = (fx.clone(), lt.clone());
                HookTable::new()
                    .gate("Demo.Main.Load", || true)
                    .frame("Demo.Main.OnFixedUpdate", move |_| {
                        fx.fetch_add(1, Ordering::SeqCst);
                    })
                    .frame("Demo.Main.OnLateUpdate", move |_| {
                        lt.fetch_add(1, Ordering::SeqCst);
                    })
            }) as CodeFactory,
        )]);

        rt.dispatch(FramePhase::Update, 0.016);
        rt.dispatch(FramePhase::FixedUpdate, 0.02);
        rt.dispatch(FramePhase::LateUpdate, 0.016);
        assert_eq!(fixed.load(Ordering::SeqCst), 1);
        assert_eq!(late.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn a_panicking_hook_does_not_stop_the_pass() {
        let survivor_ticks = Arc::new(AtomicUsize::new(0));
        let s = survivor_ticks.clone();
        let mut rt = runtime_with(vec![
            (
                "panicky",
                Box::new(|| {
                    HookTable::new()
                        .gate("Demo.Main.Load", || true)
                        .frame("Demo.Main.OnUpdate", |_| panic!("tick failure"))
                }) as CodeFactory,
            ),
            (
                "survivor",
                Box::new(move || {
                    let s = s.clone();
                    HookTable::new()
                        .gate("Demo.Main.Load", || true)
                        .frame("Demo.Main.OnUpdate", move |_| {
                            s.fetch_add(1, Ordering::SeqCst);
                        })
                }) as CodeFactory,
            ),
        ]);

        for _ in 0..100 {
            rt.dispatch(FramePhase::Update, 0.016);
        }
        assert_eq!(survivor_ticks.load(Ordering::SeqCst), 100);
        // The panicking mod keeps its lifecycle state.
        assert!(rt.find("panicky").unwrap().active());
        assert!(!rt.find("panicky").unwrap().errored());
    }
}
