//! Reference CPU integrator: jittered primary rays, a handful of bounces, one directional light.

use super::{CancelToken, EngineFactory, RenderEngine};
use crate::camera::{CameraRig, Ray};
use crate::config::TracerConfig;
use crate::error::RenderPassFailure;
use crate::scene::{Lighting, MaterialKind, SceneSnapshot, ShapeKind, SnapshotObject};
use glam::{Mat4, Vec2, Vec3};
use image::{Rgba, RgbaImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::{Duration, Instant};
use winit::dpi::PhysicalSize;

const SURFACE_EPSILON: f32 = 1e-3;
const MIN_THROUGHPUT: f32 = 1e-3;

pub struct Tracer {
    size: PhysicalSize<u32>,
    accum: Vec<Vec3>,
    scratch: Vec<Vec3>,
    passes: u32,
    elapsed: Duration,
    rig: Option<CameraRig>,
    rng: StdRng,
    max_bounces: u32,
}

impl Tracer {
    pub fn new(size: PhysicalSize<u32>, config: &TracerConfig) -> Self {
        let pixels = pixel_count(size);
        Self {
            size,
            accum: vec![Vec3::ZERO; pixels],
            scratch: vec![Vec3::ZERO; pixels],
            passes: 0,
            elapsed: Duration::ZERO,
            rig: None,
            rng: StdRng::seed_from_u64(config.seed),
            max_bounces: config.max_bounces,
        }
    }

    fn rig_for(&mut self, scene: &SceneSnapshot) -> CameraRig {
        match self.rig {
            Some(rig) if rig.viewport == self.size => rig,
            _ => {
                let rig = scene.camera.rig(self.size);
                self.rig = Some(rig);
                rig
            }
        }
    }
}

impl RenderEngine for Tracer {
    fn render_pass(&mut self, scene: &SceneSnapshot, cancel: &CancelToken) -> Result<bool, RenderPassFailure> {
        let start = Instant::now();
        if let Some(object) = scene.objects.iter().find(|object| !matrix_is_finite(&object.inverse_world)) {
            return Err(RenderPassFailure::new(format!("primitive {} has a degenerate transform", object.id)));
        }
        let rig = self.rig_for(scene);
        let width = self.size.width as usize;
        for y in 0..self.size.height as usize {
            if cancel.is_cancelled() {
                return Ok(false);
            }
            for x in 0..width {
                let jitter = Vec2::new(self.rng.gen::<f32>(), self.rng.gen::<f32>());
                let screen = Vec2::new(x as f32, y as f32) + jitter;
                self.scratch[y * width + x] = match rig.primary_ray(screen) {
                    Some(ray) => trace(scene, ray, self.max_bounces, &mut self.rng),
                    None => Vec3::ZERO,
                };
            }
        }
        for (sum, sample) in self.accum.iter_mut().zip(&self.scratch) {
            *sum += *sample;
        }
        self.passes += 1;
        self.elapsed += start.elapsed();
        Ok(true)
    }

    fn clear_accumulation(&mut self) {
        self.accum.iter_mut().for_each(|sum| *sum = Vec3::ZERO);
        self.passes = 0;
        self.elapsed = Duration::ZERO;
    }

    fn set_image(&mut self, size: PhysicalSize<u32>) {
        let pixels = pixel_count(size);
        self.size = size;
        self.accum = vec![Vec3::ZERO; pixels];
        self.scratch = vec![Vec3::ZERO; pixels];
        self.clear_accumulation();
    }

    fn update_camera(&mut self, rig: &CameraRig) {
        self.rig = Some(*rig);
    }

    fn pass_count(&self) -> u32 {
        self.passes
    }

    fn elapsed_time(&self) -> Duration {
        self.elapsed
    }

    fn resolve(&self) -> RgbaImage {
        let width = self.size.width;
        let scale = if self.passes == 0 { 0.0 } else { 1.0 / self.passes as f32 };
        RgbaImage::from_fn(self.size.width, self.size.height, |x, y| {
            let sum = self.accum[(y * width + x) as usize];
            let mapped = sum * scale;
            let mapped = mapped / (Vec3::ONE + mapped);
            Rgba([to_byte(mapped.x), to_byte(mapped.y), to_byte(mapped.z), 255])
        })
    }
}

/// Builds a [`Tracer`] per session or preview, all sharing the same settings.
#[derive(Debug, Clone, Default)]
pub struct TracerFactory {
    config: TracerConfig,
}

impl TracerFactory {
    pub fn new(config: TracerConfig) -> Self {
        Self { config }
    }
}

impl EngineFactory for TracerFactory {
    fn create(&self, size: PhysicalSize<u32>) -> Box<dyn RenderEngine> {
        Box::new(Tracer::new(size, &self.config))
    }
}

struct Hit<'a> {
    distance: f32,
    point: Vec3,
    normal: Vec3,
    material: &'a MaterialKind,
}

fn trace(scene: &SceneSnapshot, primary: Ray, max_bounces: u32, rng: &mut StdRng) -> Vec3 {
    let lighting = &scene.lighting;
    let mut ray = primary;
    let mut radiance = Vec3::ZERO;
    let mut throughput = Vec3::ONE;
    for _ in 0..=max_bounces {
        let Some(hit) = closest_hit(scene, &ray) else {
            radiance += throughput * sky(ray.direction, lighting);
            break;
        };
        let origin = hit.point + hit.normal * SURFACE_EPSILON;
        match *hit.material {
            MaterialKind::Emissive { color, strength } => {
                radiance += throughput * color * strength;
                break;
            }
            MaterialKind::Diffuse { albedo } => {
                let n_dot_l = hit.normal.dot(lighting.direction);
                if n_dot_l > 0.0 && !occluded(scene, origin, lighting.direction) {
                    radiance += throughput * albedo * lighting.color * n_dot_l;
                }
                radiance += throughput * albedo * lighting.ambient;
                throughput *= albedo;
                ray = Ray { origin, direction: cosine_direction(hit.normal, rng) };
            }
            MaterialKind::Metal { albedo, roughness } => {
                let reflected = reflect(ray.direction, hit.normal) + random_unit_vector(rng) * roughness;
                let Some(direction) = reflected.try_normalize() else {
                    break;
                };
                if direction.dot(hit.normal) <= 0.0 {
                    break;
                }
                throughput *= albedo;
                ray = Ray { origin, direction };
            }
        }
        if throughput.max_element() < MIN_THROUGHPUT {
            break;
        }
    }
    radiance
}

fn closest_hit<'a>(scene: &'a SceneSnapshot, ray: &Ray) -> Option<Hit<'a>> {
    let mut best: Option<Hit<'a>> = None;
    for object in &scene.objects {
        if let Some(hit) = intersect(object, ray) {
            if best.as_ref().map_or(true, |current| hit.distance < current.distance) {
                best = Some(hit);
            }
        }
    }
    best
}

fn occluded(scene: &SceneSnapshot, origin: Vec3, direction: Vec3) -> bool {
    let ray = Ray { origin, direction };
    scene.objects.iter().any(|object| intersect(object, &ray).is_some())
}

/// Intersects in object space. The local direction is left unnormalised so the ray parameter is
/// the same in both spaces.
fn intersect<'a>(object: &'a SnapshotObject, ray: &Ray) -> Option<Hit<'a>> {
    let origin = object.inverse_world.transform_point3(ray.origin);
    let direction = object.inverse_world.transform_vector3(ray.direction);
    if direction.length_squared() <= f32::EPSILON {
        return None;
    }
    let (t, local_normal) = match &object.shape {
        ShapeKind::Sphere { radius } => {
            let t = ray_sphere(origin, direction, *radius)?;
            (t, origin + direction * t)
        }
        ShapeKind::Plane => {
            if direction.y.abs() < 1e-6 {
                return None;
            }
            let t = -origin.y / direction.y;
            (t, Vec3::Y)
        }
        ShapeKind::Cuboid { half_extents } => ray_slab(origin, direction, *half_extents)?,
    };
    if t <= SURFACE_EPSILON {
        return None;
    }
    let mut normal = object.inverse_world.transpose().transform_vector3(local_normal).try_normalize()?;
    if normal.dot(ray.direction) > 0.0 {
        normal = -normal;
    }
    Some(Hit { distance: t, point: ray.at(t), normal, material: &object.material })
}

fn ray_sphere(origin: Vec3, direction: Vec3, radius: f32) -> Option<f32> {
    let a = direction.length_squared();
    let b = origin.dot(direction);
    let c = origin.length_squared() - radius * radius;
    let discriminant = b * b - a * c;
    if discriminant < 0.0 {
        return None;
    }
    let sqrt_d = discriminant.sqrt();
    let near = (-b - sqrt_d) / a;
    if near > SURFACE_EPSILON {
        return Some(near);
    }
    let far = (-b + sqrt_d) / a;
    (far > SURFACE_EPSILON).then_some(far)
}

/// Slab test against a centred box; returns the entry parameter and the local face normal.
fn ray_slab(origin: Vec3, direction: Vec3, half_extents: Vec3) -> Option<(f32, Vec3)> {
    let mut t_min = f32::NEG_INFINITY;
    let mut t_max = f32::INFINITY;
    let mut enter_axis = 0;
    let mut exit_axis = 0;
    for axis in 0..3 {
        let o = origin[axis];
        let d = direction[axis];
        let extent = half_extents[axis];
        if d.abs() < 1e-8 {
            if o < -extent || o > extent {
                return None;
            }
            continue;
        }
        let mut t1 = (-extent - o) / d;
        let mut t2 = (extent - o) / d;
        if t1 > t2 {
            std::mem::swap(&mut t1, &mut t2);
        }
        if t1 > t_min {
            t_min = t1;
            enter_axis = axis;
        }
        if t2 < t_max {
            t_max = t2;
            exit_axis = axis;
        }
        if t_min > t_max {
            return None;
        }
    }
    let (t, axis) = if t_min > SURFACE_EPSILON { (t_min, enter_axis) } else { (t_max, exit_axis) };
    if t <= SURFACE_EPSILON {
        return None;
    }
    let mut normal = Vec3::ZERO;
    normal[axis] = (origin[axis] + direction[axis] * t).signum();
    Some((t, normal))
}

fn sky(direction: Vec3, lighting: &Lighting) -> Vec3 {
    let t = 0.5 * (direction.y + 1.0);
    let horizon = Vec3::new(0.9, 0.9, 0.92);
    let zenith = Vec3::new(0.45, 0.62, 0.95);
    horizon.lerp(zenith, t) * 0.6 + lighting.ambient
}

fn reflect(direction: Vec3, normal: Vec3) -> Vec3 {
    direction - 2.0 * direction.dot(normal) * normal
}

fn random_unit_vector(rng: &mut StdRng) -> Vec3 {
    let z: f32 = rng.gen_range(-1.0..1.0);
    let phi: f32 = rng.gen_range(0.0..std::f32::consts::TAU);
    let r = (1.0 - z * z).max(0.0).sqrt();
    Vec3::new(r * phi.cos(), r * phi.sin(), z)
}

fn cosine_direction(normal: Vec3, rng: &mut StdRng) -> Vec3 {
    (normal + random_unit_vector(rng)).try_normalize().unwrap_or(normal)
}

fn matrix_is_finite(matrix: &Mat4) -> bool {
    matrix.to_cols_array().iter().all(|v| v.is_finite())
}

fn to_byte(linear: f32) -> u8 {
    (linear.clamp(0.0, 1.0).powf(1.0 / 2.2) * 255.0).round() as u8
}

fn pixel_count(size: PhysicalSize<u32>) -> usize {
    size.width as usize * size.height as usize
}
