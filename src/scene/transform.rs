use super::{ObserverId, ObserverList};
use crate::error::ObserverError;
use glam::{Mat4, Quat, Vec3};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformState {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for TransformState {
    fn default() -> Self {
        Self { position: Vec3::ZERO, rotation: Quat::IDENTITY, scale: Vec3::ONE }
    }
}

impl TransformState {
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformChange {
    Position,
    Rotation,
    Scale,
}

pub trait TransformObserver: Send + Sync {
    fn transform_changed(&self, change: TransformChange, state: &TransformState);
}

/// Observable position/rotation/scale. Setters notify synchronously on the calling thread.
pub struct Transform {
    mutation: Mutex<()>,
    state: RwLock<TransformState>,
    observers: ObserverList<dyn TransformObserver>,
    registered: AtomicUsize,
    unregistered: AtomicUsize,
}

impl Transform {
    pub fn new(state: TransformState) -> Self {
        Self {
            mutation: Mutex::new(()),
            state: RwLock::new(state),
            observers: ObserverList::new(),
            registered: AtomicUsize::new(0),
            unregistered: AtomicUsize::new(0),
        }
    }

    pub fn at(position: Vec3) -> Self {
        Self::new(TransformState { position, ..TransformState::default() })
    }

    pub fn state(&self) -> TransformState {
        *self.state.read()
    }

    pub fn position(&self) -> Vec3 {
        self.state.read().position
    }

    pub fn rotation(&self) -> Quat {
        self.state.read().rotation
    }

    pub fn scale(&self) -> Vec3 {
        self.state.read().scale
    }

    pub fn matrix(&self) -> Mat4 {
        self.state.read().matrix()
    }

    pub fn set_position(&self, position: Vec3) {
        self.mutate(TransformChange::Position, |state| state.position = position);
    }

    pub fn set_rotation(&self, rotation: Quat) {
        self.mutate(TransformChange::Rotation, |state| state.rotation = rotation.normalize());
    }

    pub fn set_scale(&self, scale: Vec3) {
        self.mutate(TransformChange::Scale, |state| state.scale = scale);
    }

    pub fn register_observer(&self, observer: Arc<dyn TransformObserver>) -> ObserverId {
        let _guard = self.mutation.lock();
        self.registered.fetch_add(1, Ordering::AcqRel);
        self.observers.insert(observer)
    }

    /// Fails when `id` is not (or no longer) registered here; nothing is changed in that case.
    pub fn unregister_observer(&self, id: ObserverId) -> Result<(), ObserverError> {
        let _guard = self.mutation.lock();
        if !self.observers.remove(id) {
            return Err(ObserverError::RegistrationInconsistency(format!(
                "transform observer {id} is not registered"
            )));
        }
        self.unregistered.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Lifetime totals of successful register/unregister calls.
    pub fn registration_counts(&self) -> (usize, usize) {
        (self.registered.load(Ordering::Acquire), self.unregistered.load(Ordering::Acquire))
    }

    fn mutate(&self, change: TransformChange, apply: impl FnOnce(&mut TransformState)) {
        let _guard = self.mutation.lock();
        let state = {
            let mut state = self.state.write();
            apply(&mut state);
            *state
        };
        for observer in self.observers.snapshot() {
            observer.transform_changed(change, &state);
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::new(TransformState::default())
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transform")
            .field("state", &self.state())
            .field("observers", &self.observer_count())
            .finish()
    }
}
