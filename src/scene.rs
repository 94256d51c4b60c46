//! Live, thread-safe scene graph.
//!
//! Every mutation is serialised by an internal mutation lock and published through an `RwLock`
//! before observers are notified, so observer callbacks (which run on the mutating thread) always
//! see a complete state. Observers must not mutate the scene they are observing.

mod assets;
mod document;
mod transform;

pub use assets::{Material, MaterialId, MaterialKind, Primitive, PrimitiveId, Shape, ShapeId, ShapeKind};
pub use document::{SceneDocument, Vec3Data};
pub use transform::{Transform, TransformChange, TransformObserver, TransformState};

use crate::camera::Camera;
use crate::error::ObserverError;
use anyhow::Result;
use glam::{Mat4, Vec3};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_OBSERVER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

impl ObserverId {
    fn next() -> Self {
        Self(NEXT_OBSERVER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub(crate) struct ObserverList<T: ?Sized> {
    entries: Mutex<Vec<(ObserverId, Arc<T>)>>,
}

impl<T: ?Sized> ObserverList<T> {
    pub(crate) fn new() -> Self {
        Self { entries: Mutex::new(Vec::new()) }
    }

    pub(crate) fn insert(&self, observer: Arc<T>) -> ObserverId {
        let id = ObserverId::next();
        self.entries.lock().push((id, observer));
        id
    }

    pub(crate) fn remove(&self, id: ObserverId) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        entries.len() != before
    }

    /// Clone of the current observers so callbacks run without the list lock held.
    pub(crate) fn snapshot(&self) -> Vec<Arc<T>> {
        self.entries.lock().iter().map(|(_, observer)| observer.clone()).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

pub trait SceneObserver: Send + Sync {
    fn primitive_added(&self, primitive: &Arc<Primitive>);
    fn primitive_removed(&self, primitive: &Arc<Primitive>);
    fn camera_replaced(&self, camera: &Camera);
    fn camera_changed(&self, camera: &Camera);
    fn lighting_changed(&self, _lighting: &Lighting) {}
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lighting {
    pub direction: Vec3,
    pub color: Vec3,
    pub ambient: Vec3,
}

impl Default for Lighting {
    fn default() -> Self {
        Self {
            direction: Vec3::new(0.4, 0.8, 0.35).normalize(),
            color: Vec3::new(1.05, 0.98, 0.92),
            ambient: Vec3::splat(0.03),
        }
    }
}

struct SceneState {
    primitives: Vec<Arc<Primitive>>,
    camera: Camera,
    lighting: Lighting,
}

pub struct Scene {
    mutation: Mutex<()>,
    state: RwLock<SceneState>,
    observers: ObserverList<dyn SceneObserver>,
}

impl fmt::Debug for Scene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scene").finish_non_exhaustive()
    }
}

impl Scene {
    pub fn new() -> Self {
        Self::with_camera(Camera::default())
    }

    pub fn with_camera(camera: Camera) -> Self {
        Self::with_parts(camera, Lighting::default(), Vec::new())
    }

    pub(crate) fn with_parts(camera: Camera, lighting: Lighting, primitives: Vec<Arc<Primitive>>) -> Self {
        Self {
            mutation: Mutex::new(()),
            state: RwLock::new(SceneState { primitives, camera, lighting }),
            observers: ObserverList::new(),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let document = SceneDocument::load_from_path(path)?;
        document.into_scene()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        SceneDocument::from_scene(self).save_to_path(path)
    }

    pub fn add_primitive(&self, primitive: Primitive) -> Arc<Primitive> {
        let primitive = Arc::new(primitive);
        let _guard = self.mutation.lock();
        self.state.write().primitives.push(primitive.clone());
        for observer in self.observers.snapshot() {
            observer.primitive_added(&primitive);
        }
        primitive
    }

    pub fn remove_primitive(&self, id: PrimitiveId) -> Option<Arc<Primitive>> {
        let _guard = self.mutation.lock();
        let removed = {
            let mut state = self.state.write();
            let index = state.primitives.iter().position(|p| p.id() == id)?;
            state.primitives.remove(index)
        };
        for observer in self.observers.snapshot() {
            observer.primitive_removed(&removed);
        }
        Some(removed)
    }

    pub fn set_camera(&self, camera: Camera) {
        let _guard = self.mutation.lock();
        self.state.write().camera = camera.clone();
        for observer in self.observers.snapshot() {
            observer.camera_replaced(&camera);
        }
    }

    /// Edits the camera in place; observers hear about it only if something actually changed.
    pub fn update_camera(&self, edit: impl FnOnce(&mut Camera)) -> bool {
        let _guard = self.mutation.lock();
        let camera = {
            let mut state = self.state.write();
            let before = state.camera.clone();
            edit(&mut state.camera);
            if state.camera == before {
                return false;
            }
            state.camera.clone()
        };
        for observer in self.observers.snapshot() {
            observer.camera_changed(&camera);
        }
        true
    }

    pub fn set_lighting(&self, lighting: Lighting) {
        let _guard = self.mutation.lock();
        self.state.write().lighting = lighting.clone();
        for observer in self.observers.snapshot() {
            observer.lighting_changed(&lighting);
        }
    }

    pub fn camera(&self) -> Camera {
        self.state.read().camera.clone()
    }

    pub fn lighting(&self) -> Lighting {
        self.state.read().lighting.clone()
    }

    pub fn primitive(&self, id: PrimitiveId) -> Option<Arc<Primitive>> {
        self.state.read().primitives.iter().find(|p| p.id() == id).cloned()
    }

    pub fn primitives(&self) -> Vec<Arc<Primitive>> {
        self.state.read().primitives.clone()
    }

    pub fn len(&self) -> usize {
        self.state.read().primitives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registers `observer`, first replaying `primitive_added` for every primitive already present.
    /// Replay and registration happen under the mutation lock, so a concurrent addition is seen
    /// exactly once.
    pub fn register_observer(&self, observer: Arc<dyn SceneObserver>) -> ObserverId {
        let _guard = self.mutation.lock();
        for primitive in self.state.read().primitives.iter() {
            observer.primitive_added(primitive);
        }
        self.observers.insert(observer)
    }

    pub fn unregister_observer(&self, id: ObserverId) -> Result<(), ObserverError> {
        let _guard = self.mutation.lock();
        if self.observers.remove(id) {
            Ok(())
        } else {
            Err(ObserverError::RegistrationInconsistency(format!("scene observer {id} is not registered")))
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Immutable copy of everything an engine needs for one pass.
    pub fn snapshot(&self) -> SceneSnapshot {
        let state = self.state.read();
        let objects = state
            .primitives
            .iter()
            .map(|primitive| {
                let world = primitive.transform().matrix();
                SnapshotObject {
                    id: primitive.id(),
                    shape: primitive.shape().kind.clone(),
                    material: primitive.material().kind.clone(),
                    world,
                    inverse_world: world.inverse(),
                }
            })
            .collect();
        SceneSnapshot { camera: state.camera.clone(), lighting: state.lighting.clone(), objects }
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotObject {
    pub id: PrimitiveId,
    pub shape: ShapeKind,
    pub material: MaterialKind,
    pub world: Mat4,
    pub inverse_world: Mat4,
}

#[derive(Debug, Clone)]
pub struct SceneSnapshot {
    pub camera: Camera,
    pub lighting: Lighting,
    pub objects: Vec<SnapshotObject>,
}
