pub mod camera;
pub mod cli;
pub mod config;
pub mod display;
pub mod engine;
pub mod error;
pub mod input;
pub mod inspector;
pub mod preview;
pub mod scene;
pub mod scheduler;
#[cfg(feature = "scripting")]
pub mod scripts;
pub mod session;
pub mod studio;
pub mod time;

pub use scheduler::{RenderScheduler, SchedulerStats};
pub use session::{MutationKind, RenderSession};
pub use studio::Studio;

pub(crate) fn wrap_angle(mut radians: f32) -> f32 {
    let two_pi = 2.0 * std::f32::consts::PI;
    while radians > std::f32::consts::PI {
        radians -= two_pi;
    }
    while radians < -std::f32::consts::PI {
        radians += two_pi;
    }
    radians
}
