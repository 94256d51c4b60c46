//! Rhai scene scripts. A script runs on its own thread and edits the live scene, so every call
//! goes through the same observer path as any other off-thread mutation.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, Context, Result};
use glam::Vec3;
use parking_lot::Mutex;
use rhai::{Engine, Scope, AST};
use uuid::Uuid;

use crate::camera::Camera;
use crate::scene::{Material, Primitive, PrimitiveId, Scene, Shape, Transform};

#[derive(Clone)]
pub struct ScriptApi {
    scene: Arc<Scene>,
    log: Arc<Mutex<Vec<String>>>,
}

impl ScriptApi {
    pub fn new(scene: Arc<Scene>) -> Self {
        Self { scene, log: Arc::new(Mutex::new(Vec::new())) }
    }

    fn add_sphere(&mut self, x: rhai::FLOAT, y: rhai::FLOAT, z: rhai::FLOAT, radius: rhai::FLOAT) -> String {
        let primitive = Primitive::new(
            "Scripted sphere",
            Shape::sphere(radius as f32),
            Material::diffuse("Scripted", Vec3::splat(0.7)),
            Transform::at(vec3(x, y, z)),
        );
        self.scene.add_primitive(primitive).id().to_string()
    }

    fn remove(&mut self, id: &str) -> bool {
        match parse_id(id) {
            Some(id) => self.scene.remove_primitive(id).is_some(),
            None => false,
        }
    }

    fn move_to(&mut self, id: &str, x: rhai::FLOAT, y: rhai::FLOAT, z: rhai::FLOAT) -> bool {
        match parse_id(id).and_then(|id| self.scene.primitive(id)) {
            Some(primitive) => {
                primitive.transform().set_position(vec3(x, y, z));
                true
            }
            None => false,
        }
    }

    fn set_camera(
        &mut self,
        px: rhai::FLOAT,
        py: rhai::FLOAT,
        pz: rhai::FLOAT,
        tx: rhai::FLOAT,
        ty: rhai::FLOAT,
        tz: rhai::FLOAT,
    ) {
        let current = self.scene.camera();
        let mut camera = Camera::look_at(vec3(px, py, pz), vec3(tx, ty, tz));
        camera.fov_y_radians = current.fov_y_radians;
        self.scene.set_camera(camera);
    }

    fn primitive_count(&mut self) -> rhai::INT {
        self.scene.len() as rhai::INT
    }

    fn log(&mut self, message: &str) {
        tracing::info!(target: "script", "{message}");
        self.log.lock().push(message.to_string());
    }
}

fn vec3(x: rhai::FLOAT, y: rhai::FLOAT, z: rhai::FLOAT) -> Vec3 {
    Vec3::new(x as f32, y as f32, z as f32)
}

fn parse_id(id: &str) -> Option<PrimitiveId> {
    Uuid::parse_str(id).ok().map(PrimitiveId::from_uuid)
}

pub struct ScriptHost {
    engine: Engine,
    ast: AST,
}

impl ScriptHost {
    pub fn from_source(source: &str) -> Result<Self> {
        let mut engine = Engine::new();
        engine.set_fast_operators(true);
        register_api(&mut engine);
        let ast = engine.compile(source).with_context(|| "Compiling Rhai script")?;
        Ok(Self { engine, ast })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
        Self::from_source(&source)
    }

    /// Runs the script top to bottom with `scene` bound. Returns the lines it logged.
    pub fn run(&self, scene: Arc<Scene>) -> Result<Vec<String>> {
        let api = ScriptApi::new(scene);
        let log = api.log.clone();
        let mut scope = Scope::new();
        scope.push("scene", api);
        self.engine.run_ast_with_scope(&mut scope, &self.ast).map_err(|err| anyhow!("Script error: {err}"))?;
        let lines = log.lock().clone();
        Ok(lines)
    }
}

/// Compiles and runs `source` on a dedicated thread against `scene`.
pub fn spawn_script(source: String, scene: Arc<Scene>) -> Result<thread::JoinHandle<Result<Vec<String>>>> {
    thread::Builder::new()
        .name("scene-script".to_string())
        .spawn(move || ScriptHost::from_source(&source)?.run(scene))
        .context("Failed to spawn script thread")
}

fn register_api(engine: &mut Engine) {
    engine.register_type_with_name::<ScriptApi>("Scene");
    engine.register_fn("add_sphere", ScriptApi::add_sphere);
    engine.register_fn("remove", ScriptApi::remove);
    engine.register_fn("move_to", ScriptApi::move_to);
    engine.register_fn("set_camera", ScriptApi::set_camera);
    engine.register_fn("primitive_count", ScriptApi::primitive_count);
    engine.register_fn("log", ScriptApi::log);
}
