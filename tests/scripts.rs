#![cfg(feature = "scripting")]

mod common;

use common::{scene_with_balls, Harness};
use lumen_editor::scripts::{spawn_script, ScriptHost};

const ORBIT: &str = include_str!("../scripts/orbit.rhai");

#[test]
fn script_thread_edits_a_scene_being_rendered() {
    let mut harness = Harness::new(scene_with_balls(1));
    let handle = spawn_script(ORBIT.to_string(), harness.scene.clone()).expect("spawn script");
    while !handle.is_finished() {
        harness.tick_and_wait();
    }
    let lines = handle.join().expect("script thread").expect("script ran");
    assert_eq!(lines, vec!["scene now holds 7 primitives".to_string()]);

    harness.tick_and_wait();
    harness.tick_and_wait();
    let session = harness.scheduler.session();
    assert_eq!(session.observed_primitives(), 7);
    assert_eq!(session.inspector().len(), 7);
    assert_eq!(session.observer_inconsistencies(), 0);
    assert!(harness.scheduler.pass_count() >= 1);
}

#[test]
fn script_errors_are_reported_not_panicked() {
    let scene = std::sync::Arc::new(scene_with_balls(0));
    let host = ScriptHost::from_source("scene.move_to(\"not-an-id\", 0.0, 0.0, 0.0); undefined_fn();")
        .expect("compiles");
    let err = host.run(scene.clone()).expect_err("unknown function");
    assert!(err.to_string().contains("Script error"));
    assert!(scene.is_empty());
}
