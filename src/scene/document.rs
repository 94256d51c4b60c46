use super::{Lighting, Material, MaterialId, MaterialKind, Primitive, PrimitiveId, Scene, Shape, ShapeId, ShapeKind};
use super::{Transform, TransformState};
use crate::camera::Camera;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// On-disk form of a [`Scene`]. Materials and shapes are stored once and referenced by id so shared
/// assets stay shared after a reload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SceneDocument {
    #[serde(default)]
    pub camera: CameraData,
    #[serde(default)]
    pub lighting: LightingData,
    #[serde(default)]
    pub materials: Vec<MaterialData>,
    #[serde(default)]
    pub shapes: Vec<ShapeData>,
    #[serde(default)]
    pub primitives: Vec<PrimitiveData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraData {
    pub position: Vec3Data,
    pub target: Vec3Data,
    #[serde(default = "default_up")]
    pub up: Vec3Data,
    #[serde(default = "default_fov_degrees")]
    pub fov_degrees: f32,
    #[serde(default = "default_near")]
    pub near: f32,
    #[serde(default = "default_far")]
    pub far: f32,
}

fn default_up() -> Vec3Data {
    Vec3Data { x: 0.0, y: 1.0, z: 0.0 }
}

const fn default_fov_degrees() -> f32 {
    50.0
}

const fn default_near() -> f32 {
    0.01
}

const fn default_far() -> f32 {
    1_000.0
}

impl Default for CameraData {
    fn default() -> Self {
        CameraData::from(&Camera::default())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LightingData {
    pub direction: Vec3Data,
    pub color: Vec3Data,
    pub ambient: Vec3Data,
}

impl Default for LightingData {
    fn default() -> Self {
        let lighting = Lighting::default();
        Self {
            direction: lighting.direction.into(),
            color: lighting.color.into(),
            ambient: lighting.ambient.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialData {
    pub id: Uuid,
    pub name: String,
    pub kind: MaterialKindData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MaterialKindData {
    Diffuse { albedo: Vec3Data },
    Metal { albedo: Vec3Data, roughness: f32 },
    Emissive { color: Vec3Data, strength: f32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShapeData {
    pub id: Uuid,
    pub name: String,
    pub kind: ShapeKindData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShapeKindData {
    Sphere { radius: f32 },
    Plane,
    Cuboid { half_extents: Vec3Data },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrimitiveData {
    pub id: Uuid,
    pub name: String,
    pub shape: Uuid,
    pub material: Uuid,
    #[serde(default)]
    pub transform: TransformData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformData {
    pub translation: Vec3Data,
    pub rotation: QuatData,
    pub scale: Vec3Data,
}

impl Default for TransformData {
    fn default() -> Self {
        TransformData::from(TransformState::default())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct Vec3Data {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct QuatData {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl SceneDocument {
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).with_context(|| format!("Reading scene file {}", path.display()))?;
        serde_json::from_slice::<SceneDocument>(&bytes)
            .with_context(|| format!("Parsing scene file {}", path.display()))
    }

    pub fn save_to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Creating scene directory {}", parent.display()))?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json.as_bytes()).with_context(|| format!("Writing scene file {}", path.display()))?;
        Ok(())
    }

    pub fn from_scene(scene: &Scene) -> Self {
        let mut document = SceneDocument {
            camera: CameraData::from(&scene.camera()),
            lighting: LightingData::from(&scene.lighting()),
            ..SceneDocument::default()
        };
        let mut seen_materials = HashSet::new();
        let mut seen_shapes = HashSet::new();
        for primitive in scene.primitives() {
            let material = primitive.material();
            if seen_materials.insert(material.id()) {
                document.materials.push(MaterialData::from(material.as_ref()));
            }
            let shape = primitive.shape();
            if seen_shapes.insert(shape.id()) {
                document.shapes.push(ShapeData::from(shape.as_ref()));
            }
            document.primitives.push(PrimitiveData {
                id: primitive.id().as_uuid(),
                name: primitive.name.clone(),
                shape: shape.id().as_uuid(),
                material: material.id().as_uuid(),
                transform: TransformData::from(primitive.transform().state()),
            });
        }
        document
    }

    pub fn into_scene(self) -> Result<Scene> {
        let materials: HashMap<Uuid, Arc<Material>> = self
            .materials
            .into_iter()
            .map(|data| {
                let material = Material::with_id(MaterialId::from_uuid(data.id), data.name, data.kind.into());
                (data.id, material)
            })
            .collect();
        let shapes: HashMap<Uuid, Arc<Shape>> = self
            .shapes
            .into_iter()
            .map(|data| (data.id, Shape::with_id(ShapeId::from_uuid(data.id), data.name, data.kind.into())))
            .collect();
        let mut primitives = Vec::with_capacity(self.primitives.len());
        for data in self.primitives {
            let shape = shapes
                .get(&data.shape)
                .cloned()
                .ok_or_else(|| anyhow!("primitive '{}' references unknown shape {}", data.name, data.shape))?;
            let material = materials.get(&data.material).cloned().ok_or_else(|| {
                anyhow!("primitive '{}' references unknown material {}", data.name, data.material)
            })?;
            primitives.push(Arc::new(Primitive::with_id(
                PrimitiveId::from_uuid(data.id),
                data.name,
                shape,
                material,
                Transform::new(data.transform.into()),
            )));
        }
        Ok(Scene::with_parts(self.camera.into(), self.lighting.into(), primitives))
    }
}

impl From<&Camera> for CameraData {
    fn from(camera: &Camera) -> Self {
        Self {
            position: camera.position.into(),
            target: camera.target.into(),
            up: camera.up.into(),
            fov_degrees: camera.fov_y_radians.to_degrees(),
            near: camera.near,
            far: camera.far,
        }
    }
}

impl From<CameraData> for Camera {
    fn from(data: CameraData) -> Self {
        let mut camera =
            Camera::new(data.position.into(), data.target.into(), data.fov_degrees.to_radians(), data.near, data.far);
        camera.up = data.up.into();
        camera
    }
}

impl From<&Lighting> for LightingData {
    fn from(lighting: &Lighting) -> Self {
        Self {
            direction: lighting.direction.into(),
            color: lighting.color.into(),
            ambient: lighting.ambient.into(),
        }
    }
}

impl From<LightingData> for Lighting {
    fn from(data: LightingData) -> Self {
        let direction: glam::Vec3 = data.direction.into();
        Self {
            direction: direction.try_normalize().unwrap_or(Lighting::default().direction),
            color: data.color.into(),
            ambient: data.ambient.into(),
        }
    }
}

impl From<&Material> for MaterialData {
    fn from(material: &Material) -> Self {
        let kind = match &material.kind {
            MaterialKind::Diffuse { albedo } => MaterialKindData::Diffuse { albedo: (*albedo).into() },
            MaterialKind::Metal { albedo, roughness } => {
                MaterialKindData::Metal { albedo: (*albedo).into(), roughness: *roughness }
            }
            MaterialKind::Emissive { color, strength } => {
                MaterialKindData::Emissive { color: (*color).into(), strength: *strength }
            }
        };
        Self { id: material.id().as_uuid(), name: material.name.clone(), kind }
    }
}

impl From<MaterialKindData> for MaterialKind {
    fn from(data: MaterialKindData) -> Self {
        match data {
            MaterialKindData::Diffuse { albedo } => MaterialKind::Diffuse { albedo: albedo.into() },
            MaterialKindData::Metal { albedo, roughness } => {
                MaterialKind::Metal { albedo: albedo.into(), roughness: roughness.clamp(0.0, 1.0) }
            }
            MaterialKindData::Emissive { color, strength } => {
                MaterialKind::Emissive { color: color.into(), strength: strength.max(0.0) }
            }
        }
    }
}

impl From<&Shape> for ShapeData {
    fn from(shape: &Shape) -> Self {
        let kind = match &shape.kind {
            ShapeKind::Sphere { radius } => ShapeKindData::Sphere { radius: *radius },
            ShapeKind::Plane => ShapeKindData::Plane,
            ShapeKind::Cuboid { half_extents } => ShapeKindData::Cuboid { half_extents: (*half_extents).into() },
        };
        Self { id: shape.id().as_uuid(), name: shape.name.clone(), kind }
    }
}

impl From<ShapeKindData> for ShapeKind {
    fn from(data: ShapeKindData) -> Self {
        match data {
            ShapeKindData::Sphere { radius } => ShapeKind::Sphere { radius },
            ShapeKindData::Plane => ShapeKind::Plane,
            ShapeKindData::Cuboid { half_extents } => ShapeKind::Cuboid { half_extents: half_extents.into() },
        }
    }
}

impl From<TransformState> for TransformData {
    fn from(state: TransformState) -> Self {
        Self { translation: state.position.into(), rotation: state.rotation.into(), scale: state.scale.into() }
    }
}

impl From<TransformData> for TransformState {
    fn from(data: TransformData) -> Self {
        Self { position: data.translation.into(), rotation: data.rotation.into(), scale: data.scale.into() }
    }
}

impl From<glam::Vec3> for Vec3Data {
    fn from(value: glam::Vec3) -> Self {
        Self { x: value.x, y: value.y, z: value.z }
    }
}

impl From<Vec3Data> for glam::Vec3 {
    fn from(value: Vec3Data) -> Self {
        glam::Vec3::new(value.x, value.y, value.z)
    }
}

impl From<glam::Quat> for QuatData {
    fn from(value: glam::Quat) -> Self {
        let v = value.normalize();
        Self { x: v.x, y: v.y, z: v.z, w: v.w }
    }
}

impl From<QuatData> for glam::Quat {
    fn from(value: QuatData) -> Self {
        let quat = glam::Quat::from_xyzw(value.x, value.y, value.z, value.w);
        if quat.length_squared() > f32::EPSILON {
            quat.normalize()
        } else {
            glam::Quat::IDENTITY
        }
    }
}
