mod common;

use common::{ball, scene_with_balls, EngineRig, Harness, WAIT};
use glam::Vec3;
use lumen_editor::input::InputEvent;
use lumen_editor::session::{DirtyFlags, TaskState};
use std::sync::atomic::Ordering;
use std::time::Duration;

#[test]
fn quiet_ticks_complete_one_task_each() {
    let mut harness = Harness::new(scene_with_balls(2));
    let before = harness.scheduler.stats();
    for tick in 1..=10u32 {
        harness.tick_and_wait();
        if tick > 1 {
            assert_eq!(harness.scheduler.pass_count(), tick - 1, "tick {tick} should show the previous pass");
        }
    }
    let stats = harness.scheduler.stats();
    assert_eq!(stats.submitted - before.submitted, 10);
    assert_eq!(stats.applied, 9);
    assert_eq!(stats.resets, before.resets, "quiet ticks never reset");
    assert_eq!(stats.discarded, 0);
    assert_eq!(harness.frames.len(), 9);
}

#[test]
fn adding_a_primitive_resets_then_grows_again() {
    let mut harness = Harness::new(scene_with_balls(1));
    for _ in 0..4 {
        harness.tick_and_wait();
    }
    assert_eq!(harness.scheduler.pass_count(), 3);

    let scene = harness.scene.clone();
    std::thread::spawn(move || {
        scene.add_primitive(ball("late", Vec3::new(0.0, 2.0, 0.0)));
    })
    .join()
    .expect("mutating thread");

    assert_eq!(harness.scheduler.pass_count(), 0, "topology changes invalidate immediately");
    harness.tick_and_wait();
    assert_eq!(harness.scheduler.pass_count(), 0);
    assert_eq!(harness.scheduler.stats().discarded, 1, "the pre-mutation pass is dropped");
    harness.tick_and_wait();
    assert_eq!(harness.scheduler.pass_count(), 1);
    harness.tick_and_wait();
    assert_eq!(harness.scheduler.pass_count(), 2);

    let generation = harness.scheduler.session().generation();
    let last = harness.frames.last().expect("a frame was shown");
    assert_eq!(last.generation, generation);
    assert!(harness.rig.geometry_refreshes.load(Ordering::SeqCst) >= 1);
}

#[test]
fn never_more_than_one_running_task() {
    let rig = EngineRig::with_delay(Duration::from_millis(15));
    let mut harness = Harness::with_rig(scene_with_balls(1), rig.clone());
    for _ in 0..40 {
        harness.tick();
        std::thread::sleep(Duration::from_millis(2));
    }
    assert!(harness.scheduler.wait_for_task(WAIT));
    assert_eq!(rig.max_active(), 1);
    assert!(harness.scheduler.stats().busy_ticks > 0, "ticks outpaced the engine");
}

#[test]
fn transform_edits_are_deferred_to_the_next_tick() {
    let mut harness = Harness::new(scene_with_balls(1));
    for _ in 0..3 {
        harness.tick_and_wait();
    }
    assert_eq!(harness.scheduler.pass_count(), 2);

    let primitive = harness.scene.primitives()[0].clone();
    primitive.transform().set_position(Vec3::new(0.0, 1.5, 0.0));
    assert_eq!(harness.scheduler.session().dirty().peek(), DirtyFlags::TRANSFORM);
    assert_eq!(harness.scheduler.pass_count(), 2, "transform changes wait for the tick");

    harness.tick_and_wait();
    assert!(harness.scheduler.session().dirty().peek().is_empty());
    assert_eq!(harness.scheduler.pass_count(), 0);
    harness.tick_and_wait();
    assert_eq!(harness.scheduler.pass_count(), 1);
}

#[test]
fn camera_changes_queue_a_new_rig() {
    let mut harness = Harness::new(scene_with_balls(1));
    harness.tick_and_wait();
    harness.tick_and_wait();
    let updates_before = harness.rig.camera_updates.load(Ordering::SeqCst);

    assert!(harness.scene.update_camera(|camera| camera.position.y += 1.0));
    assert_eq!(harness.scheduler.session().dirty().peek(), DirtyFlags::CAMERA);
    harness.tick_and_wait();
    assert_eq!(harness.rig.camera_updates.load(Ordering::SeqCst), updates_before + 1);
    assert_eq!(harness.scheduler.pass_count(), 0);
}

#[test]
fn stale_pass_never_reaches_the_display() {
    let rig = EngineRig::with_delay(Duration::from_millis(40));
    let mut harness = Harness::with_rig(scene_with_balls(1), rig.clone());
    harness.tick();
    let first = harness.scheduler.current_task().cloned().expect("submitted");

    harness.scene.primitives()[0].transform().set_scale(Vec3::splat(2.0));
    harness.tick();
    assert!(first.wait_terminal(WAIT));
    rig.set_delay(Duration::ZERO);

    harness.tick_and_wait();
    assert!(harness.frames.is_empty(), "the pre-edit pass was cancelled or discarded");
    assert!(matches!(first.state(), TaskState::Cancelled | TaskState::Succeeded));

    harness.tick_and_wait();
    let shown = harness.frames.last().expect("fresh frame");
    assert_eq!(shown.generation, harness.scheduler.session().generation());
    assert_eq!(shown.pass_count, 1);
}

#[test]
fn failed_pass_is_retried_next_tick() {
    let mut harness = Harness::new(scene_with_balls(1));
    harness.rig.fail_next(1);
    harness.tick_and_wait();
    assert_eq!(harness.scheduler.current_task().map(|task| task.state()), Some(TaskState::Failed));

    harness.tick_and_wait();
    assert_eq!(harness.scheduler.stats().failures, 1);
    harness.tick_and_wait();
    assert_eq!(harness.scheduler.stats().applied, 1);
    assert_eq!(harness.scheduler.pass_count(), 1);
}

#[test]
fn engine_panic_is_reported_as_a_failure() {
    let mut harness = Harness::new(scene_with_balls(1));
    harness.rig.panic_next.store(true, Ordering::SeqCst);
    harness.tick_and_wait();
    harness.tick_and_wait();
    assert_eq!(harness.scheduler.stats().failures, 1);
    harness.tick_and_wait();
    assert!(harness.scheduler.pass_count() >= 1, "the worker survived the panic");
}

#[test]
fn refresh_key_resets_accumulation() {
    let mut harness = Harness::new(scene_with_balls(1));
    for _ in 0..3 {
        harness.tick_and_wait();
    }
    let resets = harness.scheduler.stats().resets;
    harness.scheduler.session_mut().display_mut().input_mut().push(InputEvent::key_char("r", true));
    harness.tick_and_wait();
    assert_eq!(harness.scheduler.stats().resets, resets + 1);
    assert_eq!(harness.scheduler.pass_count(), 0);
}

#[test]
fn held_keys_fly_the_camera() {
    let mut harness = Harness::new(scene_with_balls(1));
    let start = harness.scene.camera();
    harness.scheduler.session_mut().display_mut().input_mut().push(InputEvent::key_char("w", true));
    harness.clock.advance_ms(100);
    harness.tick_and_wait();
    let moved = harness.scene.camera();
    let travelled = moved.position - start.position;
    assert!(travelled.length() > 0.1);
    assert!(travelled.normalize().dot(start.forward()) > 0.99, "moved along the view direction");
    assert!(harness.rig.camera_updates.load(Ordering::SeqCst) >= 1);
}

#[test]
fn inspector_follows_mutations_in_order() {
    let mut harness = Harness::new(scene_with_balls(1));
    assert_eq!(harness.scheduler.session().inspector().names(), vec!["ball 0"]);
    let scene = harness.scene.clone();
    std::thread::spawn(move || {
        let a = scene.add_primitive(ball("a", Vec3::ZERO));
        scene.add_primitive(ball("b", Vec3::X));
        scene.remove_primitive(a.id());
    })
    .join()
    .expect("mutating thread");
    harness.tick_and_wait();
    assert_eq!(harness.scheduler.session().inspector().names(), vec!["ball 0", "b"]);
    assert_eq!(harness.scheduler.session().observed_primitives(), 2);
    assert_eq!(harness.scheduler.session().observer_inconsistencies(), 0);
}
