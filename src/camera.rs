use crate::config::CameraConfig;
use crate::input::Input;
use glam::{EulerRot, Mat4, Quat, Vec2, Vec3, Vec4};
use winit::dpi::PhysicalSize;

const DEFAULT_UP: Vec3 = Vec3::Y;
const PITCH_LIMIT: f32 = std::f32::consts::FRAC_PI_2 - 0.01;

/// Perspective camera shared by the live scene and the preview scenes.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub fov_y_radians: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera {
    pub fn new(position: Vec3, target: Vec3, fov_y_radians: f32, near: f32, far: f32) -> Self {
        Self { position, target, up: DEFAULT_UP, fov_y_radians, near, far }
    }

    pub fn look_at(position: Vec3, target: Vec3) -> Self {
        Self::new(position, target, 50.0_f32.to_radians(), 0.01, 1_000.0)
    }

    pub fn forward(&self) -> Vec3 {
        (self.target - self.position).normalize_or_zero()
    }

    pub fn focus_distance(&self) -> f32 {
        self.position.distance(self.target).max(0.01)
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh_gl(self.fov_y_radians, aspect.max(0.0001), self.near, self.far)
    }

    /// Derived matrices the engine needs whenever the camera or the viewport changes.
    pub fn rig(&self, viewport: PhysicalSize<u32>) -> CameraRig {
        let aspect = if viewport.height > 0 { viewport.width as f32 / viewport.height as f32 } else { 1.0 };
        let view = self.view_matrix();
        let projection = self.projection_matrix(aspect);
        CameraRig {
            position: self.position,
            view,
            projection,
            inverse_view_projection: (projection * view).inverse(),
            viewport,
        }
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::look_at(Vec3::new(0.0, 1.0, 5.0), Vec3::ZERO)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// Camera matrices resolved for a concrete viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraRig {
    pub position: Vec3,
    pub view: Mat4,
    pub projection: Mat4,
    pub inverse_view_projection: Mat4,
    pub viewport: PhysicalSize<u32>,
}

impl CameraRig {
    /// World-space ray through a (possibly sub-pixel) screen position.
    pub fn primary_ray(&self, screen: Vec2) -> Option<Ray> {
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return None;
        }
        let ndc_x = (2.0 * screen.x / self.viewport.width as f32) - 1.0;
        let ndc_y = 1.0 - (2.0 * screen.y / self.viewport.height as f32);
        let world = self.inverse_view_projection * Vec4::new(ndc_x, ndc_y, 1.0, 1.0);
        if world.w.abs() < f32::EPSILON {
            return None;
        }
        let direction = (world.truncate() / world.w - self.position).normalize_or_zero();
        if direction == Vec3::ZERO {
            return None;
        }
        Some(Ray { origin: self.position, direction })
    }
}

/// Camera-space movement requested for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CameraMotion {
    /// x = right, y = up, z = forward, in world units.
    pub translate: Vec3,
    pub yaw: f32,
    pub pitch: f32,
}

impl CameraMotion {
    pub fn from_input(input: &Input, dt: f32, config: &CameraConfig) -> Self {
        let mut axis = Vec3::ZERO;
        if input.freefly_forward() {
            axis.z += 1.0;
        }
        if input.freefly_backward() {
            axis.z -= 1.0;
        }
        if input.freefly_right() {
            axis.x += 1.0;
        }
        if input.freefly_left() {
            axis.x -= 1.0;
        }
        if input.freefly_ascend() {
            axis.y += 1.0;
        }
        if input.freefly_descend() {
            axis.y -= 1.0;
        }
        let mut speed = config.move_speed;
        if input.freefly_boost() {
            speed *= config.boost_multiplier;
        }
        let translate = axis.normalize_or_zero() * speed * dt.max(0.0);
        let (yaw, pitch) = if input.look_held() {
            let (dx, dy) = input.mouse_delta;
            (-dx * config.look_sensitivity, -dy * config.look_sensitivity)
        } else {
            (0.0, 0.0)
        };
        Self { translate, yaw, pitch }
    }

    pub fn is_idle(&self) -> bool {
        self.translate == Vec3::ZERO && self.yaw == 0.0 && self.pitch == 0.0
    }
}

/// Free-fly controller reconstructed from the scene camera every time it is needed.
#[derive(Clone, Copy, Debug)]
pub struct FreeflyController {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    focus_distance: f32,
}

impl FreeflyController {
    pub fn from_camera(camera: &Camera) -> Self {
        let forward = camera.forward();
        let yaw = (-forward.x).atan2(-forward.z);
        let pitch = forward.y.clamp(-1.0, 1.0).asin().clamp(-PITCH_LIMIT, PITCH_LIMIT);
        Self { position: camera.position, yaw, pitch, focus_distance: camera.focus_distance() }
    }

    pub fn orientation(&self) -> Quat {
        Quat::from_euler(EulerRot::YXZ, self.yaw, self.pitch, 0.0)
    }

    pub fn forward(&self) -> Vec3 {
        self.orientation() * Vec3::new(0.0, 0.0, -1.0)
    }

    pub fn right(&self) -> Vec3 {
        self.orientation() * Vec3::X
    }

    pub fn apply(&mut self, motion: &CameraMotion) {
        self.yaw = crate::wrap_angle(self.yaw + motion.yaw);
        self.pitch = (self.pitch + motion.pitch).clamp(-PITCH_LIMIT, PITCH_LIMIT);
        let offset = self.right() * motion.translate.x
            + Vec3::Y * motion.translate.y
            + self.forward() * motion.translate.z;
        self.position += offset;
    }

    /// Writes the controller pose back, keeping lens settings of `camera`.
    pub fn write_to(&self, camera: &mut Camera) {
        camera.position = self.position;
        camera.target = self.position + self.forward() * self.focus_distance;
        camera.up = DEFAULT_UP;
    }
}
