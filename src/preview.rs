//! Thumbnails for materials and shapes, rendered once per object and shared by every view.

use crate::camera::Camera;
use crate::config::PreviewConfig;
use crate::engine::{CancelToken, EngineFactory};
use crate::error::PreviewError;
use crate::inspector::ObjectKind;
use crate::scene::{Material, MaterialId, Primitive, Scene, Shape, ShapeId, Transform};
use glam::Vec3;
use image::{Rgba, RgbaImage};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use winit::dpi::PhysicalSize;

const MATERIAL_BORDER: Rgba<u8> = Rgba([230, 160, 40, 255]);
const SHAPE_BORDER: Rgba<u8> = Rgba([60, 140, 230, 255]);

#[derive(Debug, Clone)]
pub enum PreviewSubject {
    Material(Arc<Material>),
    Shape(Arc<Shape>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreviewKey {
    Material(MaterialId),
    Shape(ShapeId),
}

impl PreviewSubject {
    pub fn key(&self) -> PreviewKey {
        match self {
            PreviewSubject::Material(material) => PreviewKey::Material(material.id()),
            PreviewSubject::Shape(shape) => PreviewKey::Shape(shape.id()),
        }
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            PreviewSubject::Material(_) => ObjectKind::Material,
            PreviewSubject::Shape(_) => ObjectKind::Shape,
        }
    }

    fn border_color(&self) -> Rgba<u8> {
        match self {
            PreviewSubject::Material(_) => MATERIAL_BORDER,
            PreviewSubject::Shape(_) => SHAPE_BORDER,
        }
    }

    /// Subject on a neutral stand-in, above a large floor sphere.
    fn stage(&self) -> Scene {
        let scene = Scene::with_camera(Camera::look_at(Vec3::new(0.0, 0.6, 3.2), Vec3::new(0.0, 0.3, 0.0)));
        let (shape, material) = match self {
            PreviewSubject::Material(material) => (Shape::sphere(0.8), material.clone()),
            PreviewSubject::Shape(shape) => (shape.clone(), Material::diffuse("Preview", Vec3::splat(0.75))),
        };
        scene.add_primitive(Primitive::new("subject", shape, material, Transform::at(Vec3::new(0.0, 0.3, 0.0))));
        scene.add_primitive(Primitive::new(
            "floor",
            Shape::sphere(100.0),
            Material::diffuse("Floor", Vec3::splat(0.45)),
            Transform::at(Vec3::new(0.0, -100.5, 0.0)),
        ));
        scene
    }
}

type Slot = Arc<OnceCell<Arc<RgbaImage>>>;

/// Memoizing, single-flight thumbnail renderer. A key is computed at most once while it keeps
/// succeeding; concurrent callers for the same key wait for the first one, other keys proceed.
pub struct PreviewCache {
    factory: Arc<dyn EngineFactory>,
    config: PreviewConfig,
    slots: Mutex<HashMap<PreviewKey, Slot>>,
    computations: AtomicUsize,
    failures: AtomicUsize,
    placeholder: Arc<RgbaImage>,
}

impl PreviewCache {
    pub fn new(factory: Arc<dyn EngineFactory>, config: PreviewConfig) -> Self {
        let placeholder = Arc::new(placeholder_image(config.size));
        Self {
            factory,
            config,
            slots: Mutex::new(HashMap::new()),
            computations: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
            placeholder,
        }
    }

    /// Cached thumbnail, computing it on this thread on first use. Failures yield the placeholder
    /// and leave the key free for a retry.
    pub fn get(&self, subject: &PreviewSubject) -> Arc<RgbaImage> {
        match self.try_get(subject) {
            Ok(image) => image,
            Err(err) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(key = ?subject.key(), error = %err, "preview computation failed; showing placeholder");
                self.placeholder.clone()
            }
        }
    }

    pub fn try_get(&self, subject: &PreviewSubject) -> Result<Arc<RgbaImage>, PreviewError> {
        let slot = self.slot(subject.key());
        slot.get_or_try_init(|| self.compute(subject)).cloned()
    }

    pub fn contains(&self, key: PreviewKey) -> bool {
        self.slots.lock().get(&key).is_some_and(|slot| slot.get().is_some())
    }

    pub fn computations(&self) -> usize {
        self.computations.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn placeholder(&self) -> &Arc<RgbaImage> {
        &self.placeholder
    }

    fn slot(&self, key: PreviewKey) -> Slot {
        self.slots.lock().entry(key).or_default().clone()
    }

    fn compute(&self, subject: &PreviewSubject) -> Result<Arc<RgbaImage>, PreviewError> {
        self.computations.fetch_add(1, Ordering::Relaxed);
        let size = PhysicalSize::new(self.config.size, self.config.size);
        let passes = self.config.passes.max(1);
        let render = || -> Result<RgbaImage, PreviewError> {
            let snapshot = subject.stage().snapshot();
            let mut engine = self.factory.create(size);
            let token = CancelToken::never();
            for _ in 0..passes {
                if !engine.render_pass(&snapshot, &token)? {
                    return Err(PreviewError::Computation("preview pass stopped early".to_string()));
                }
            }
            Ok(engine.resolve())
        };
        let mut image = match panic::catch_unwind(AssertUnwindSafe(render)) {
            Ok(result) => result?,
            Err(_) => return Err(PreviewError::Computation("preview engine panicked".to_string())),
        };
        draw_border(&mut image, self.config.border_px, subject.border_color());
        tracing::debug!(key = ?subject.key(), passes, "preview rendered");
        Ok(Arc::new(image))
    }
}

fn draw_border(image: &mut RgbaImage, width: u32, color: Rgba<u8>) {
    let (w, h) = image.dimensions();
    for y in 0..h {
        for x in 0..w {
            if x < width || y < width || x + width >= w || y + width >= h {
                image.put_pixel(x, y, color);
            }
        }
    }
}

fn placeholder_image(size: u32) -> RgbaImage {
    RgbaImage::from_fn(size, size, |x, y| {
        if ((x / 8) + (y / 8)) % 2 == 0 {
            Rgba([96, 96, 96, 255])
        } else {
            Rgba([64, 64, 64, 255])
        }
    })
}
