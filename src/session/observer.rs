use super::dirty::DirtyState;
use crate::camera::Camera;
use crate::engine::EngineHandle;
use crate::error::ObserverError;
use crate::inspector::{InspectorEffect, InspectorEntry};
use crate::scene::{
    Lighting, ObserverId, Primitive, PrimitiveId, SceneObserver, Transform, TransformChange, TransformObserver,
    TransformState,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Weak};

/// Kinds of scene mutation a render view reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    AddPrimitive,
    RemovePrimitive,
    CameraReplaced,
    CameraChanged,
    TransformChanged,
}

struct TransformBinding {
    transform: Arc<Transform>,
    observer: ObserverId,
}

/// State the observer callbacks share with the owning session. Everything here is safe to touch
/// from whichever thread mutates the scene.
pub(crate) struct SessionShared {
    pub(crate) session: u64,
    pub(crate) dirty: DirtyState,
    engine: EngineHandle,
    effects: Mutex<mpsc::Sender<InspectorEffect>>,
    bindings: Mutex<HashMap<PrimitiveId, TransformBinding>>,
    topology_resets: AtomicU64,
    inconsistencies: AtomicU64,
}

impl SessionShared {
    pub(crate) fn new(session: u64, engine: EngineHandle, effects: mpsc::Sender<InspectorEffect>) -> Arc<Self> {
        Arc::new(Self {
            session,
            dirty: DirtyState::new(),
            engine,
            effects: Mutex::new(effects),
            bindings: Mutex::new(HashMap::new()),
            topology_resets: AtomicU64::new(0),
            inconsistencies: AtomicU64::new(0),
        })
    }

    pub(crate) fn on_scene_mutated(&self, kind: MutationKind) {
        match kind {
            MutationKind::AddPrimitive | MutationKind::RemovePrimitive => self.invalidate_now(),
            MutationKind::CameraReplaced | MutationKind::CameraChanged => self.dirty.mark_camera(),
            MutationKind::TransformChanged => self.dirty.mark_transform(),
        }
    }

    /// Topology changed: stop the pass in flight and drop the accumulation right away.
    fn invalidate_now(&self) {
        self.engine.queue_geometry_refresh();
        self.engine.shutdown_in_progress();
        let generation = self.engine.clear_accumulation();
        self.topology_resets.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(session = self.session, generation, "render invalidated by topology change");
    }

    pub(crate) fn topology_resets(&self) -> u64 {
        self.topology_resets.load(Ordering::Relaxed)
    }

    pub(crate) fn inconsistencies(&self) -> u64 {
        self.inconsistencies.load(Ordering::Relaxed)
    }

    pub(crate) fn bound_primitives(&self) -> usize {
        self.bindings.lock().len()
    }

    fn send_effect(&self, effect: InspectorEffect) {
        if self.effects.lock().send(effect).is_err() {
            tracing::debug!(session = self.session, "inspector effect dropped; session is gone");
        }
    }

    fn bind(self: &Arc<Self>, primitive: &Arc<Primitive>) {
        let mut bindings = self.bindings.lock();
        if bindings.contains_key(&primitive.id()) {
            self.report(ObserverError::RegistrationInconsistency(format!(
                "primitive {} is already observed",
                primitive.id()
            )));
            return;
        }
        let hook = Arc::new(TransformHook { shared: Arc::downgrade(self) });
        let transform = primitive.transform().clone();
        let observer = transform.register_observer(hook);
        bindings.insert(primitive.id(), TransformBinding { transform, observer });
    }

    fn unbind(&self, id: PrimitiveId) {
        let binding = self.bindings.lock().remove(&id);
        match binding {
            Some(binding) => {
                if let Err(err) = binding.transform.unregister_observer(binding.observer) {
                    self.report(err);
                }
            }
            None => {
                self.report(ObserverError::RegistrationInconsistency(format!("primitive {id} was not observed")))
            }
        }
    }

    /// Unregisters every remaining transform observer.
    pub(crate) fn unbind_all(&self) {
        let bindings: Vec<_> = self.bindings.lock().drain().collect();
        for (_, binding) in bindings {
            if let Err(err) = binding.transform.unregister_observer(binding.observer) {
                self.report(err);
            }
        }
    }

    pub(crate) fn report(&self, err: ObserverError) {
        self.inconsistencies.fetch_add(1, Ordering::Relaxed);
        tracing::error!(session = self.session, error = %err, "observer bookkeeping out of sync");
    }
}

/// Registered on the scene for the lifetime of a session.
pub(crate) struct SessionObserver {
    shared: Arc<SessionShared>,
}

impl SessionObserver {
    pub(crate) fn new(shared: Arc<SessionShared>) -> Arc<Self> {
        Arc::new(Self { shared })
    }
}

impl SceneObserver for SessionObserver {
    fn primitive_added(&self, primitive: &Arc<Primitive>) {
        self.shared.bind(primitive);
        self.shared.send_effect(InspectorEffect::Added(InspectorEntry::for_primitive(primitive)));
        self.shared.on_scene_mutated(MutationKind::AddPrimitive);
    }

    fn primitive_removed(&self, primitive: &Arc<Primitive>) {
        self.shared.unbind(primitive.id());
        self.shared.send_effect(InspectorEffect::Removed(primitive.id()));
        self.shared.on_scene_mutated(MutationKind::RemovePrimitive);
    }

    fn camera_replaced(&self, _camera: &Camera) {
        self.shared.on_scene_mutated(MutationKind::CameraReplaced);
    }

    fn camera_changed(&self, _camera: &Camera) {
        self.shared.on_scene_mutated(MutationKind::CameraChanged);
    }

    fn lighting_changed(&self, _lighting: &Lighting) {
        self.shared.invalidate_now();
    }
}

struct TransformHook {
    shared: Weak<SessionShared>,
}

impl TransformObserver for TransformHook {
    fn transform_changed(&self, _change: TransformChange, _state: &TransformState) {
        if let Some(shared) = self.shared.upgrade() {
            shared.on_scene_mutated(MutationKind::TransformChanged);
        }
    }
}
