use super::transform::Transform;
use glam::Vec3;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

macro_rules! object_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

object_id!(PrimitiveId);
object_id!(MaterialId);
object_id!(ShapeId);

#[derive(Debug, Clone, PartialEq)]
pub enum MaterialKind {
    Diffuse { albedo: Vec3 },
    Metal { albedo: Vec3, roughness: f32 },
    Emissive { color: Vec3, strength: f32 },
}

impl MaterialKind {
    pub fn label(&self) -> &'static str {
        match self {
            MaterialKind::Diffuse { .. } => "Diffuse",
            MaterialKind::Metal { .. } => "Metal",
            MaterialKind::Emissive { .. } => "Emissive",
        }
    }
}

/// Surface description. Identity (`id`) is what preview thumbnails are keyed on, not the values.
#[derive(Debug)]
pub struct Material {
    id: MaterialId,
    pub name: String,
    pub kind: MaterialKind,
}

impl Material {
    pub fn new(name: impl Into<String>, kind: MaterialKind) -> Arc<Self> {
        Self::with_id(MaterialId::new(), name, kind)
    }

    pub fn with_id(id: MaterialId, name: impl Into<String>, kind: MaterialKind) -> Arc<Self> {
        Arc::new(Self { id, name: name.into(), kind })
    }

    pub fn diffuse(name: impl Into<String>, albedo: Vec3) -> Arc<Self> {
        Self::new(name, MaterialKind::Diffuse { albedo })
    }

    pub fn id(&self) -> MaterialId {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ShapeKind {
    Sphere { radius: f32 },
    /// Infinite plane through the local origin with a +Y normal.
    Plane,
    Cuboid { half_extents: Vec3 },
}

impl ShapeKind {
    pub fn label(&self) -> &'static str {
        match self {
            ShapeKind::Sphere { .. } => "Sphere",
            ShapeKind::Plane => "Plane",
            ShapeKind::Cuboid { .. } => "Cuboid",
        }
    }
}

#[derive(Debug)]
pub struct Shape {
    id: ShapeId,
    pub name: String,
    pub kind: ShapeKind,
}

impl Shape {
    pub fn new(name: impl Into<String>, kind: ShapeKind) -> Arc<Self> {
        Self::with_id(ShapeId::new(), name, kind)
    }

    pub fn with_id(id: ShapeId, name: impl Into<String>, kind: ShapeKind) -> Arc<Self> {
        Arc::new(Self { id, name: name.into(), kind })
    }

    pub fn sphere(radius: f32) -> Arc<Self> {
        Self::new("Sphere", ShapeKind::Sphere { radius })
    }

    pub fn id(&self) -> ShapeId {
        self.id
    }
}

/// A placed object: shared shape and material plus an owned, observable transform.
#[derive(Debug)]
pub struct Primitive {
    id: PrimitiveId,
    pub name: String,
    shape: Arc<Shape>,
    material: Arc<Material>,
    transform: Arc<Transform>,
}

impl Primitive {
    pub fn new(name: impl Into<String>, shape: Arc<Shape>, material: Arc<Material>, transform: Transform) -> Self {
        Self::with_id(PrimitiveId::new(), name, shape, material, transform)
    }

    pub fn with_id(
        id: PrimitiveId,
        name: impl Into<String>,
        shape: Arc<Shape>,
        material: Arc<Material>,
        transform: Transform,
    ) -> Self {
        Self { id, name: name.into(), shape, material, transform: Arc::new(transform) }
    }

    pub fn id(&self) -> PrimitiveId {
        self.id
    }

    pub fn shape(&self) -> &Arc<Shape> {
        &self.shape
    }

    pub fn material(&self) -> &Arc<Material> {
        &self.material
    }

    pub fn transform(&self) -> &Arc<Transform> {
        &self.transform
    }
}
