mod common;

use common::{scene_with_balls, surface_size, EngineRig, Harness, WAIT};
use lumen_editor::config::AppConfig;
use lumen_editor::display::HeadlessSurface;
use lumen_editor::error::SessionError;
use lumen_editor::session::RenderSession;
use lumen_editor::time::SystemClock;
use lumen_editor::Studio;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn session_for(scene: Arc<lumen_editor::scene::Scene>, rig: &Arc<EngineRig>) -> RenderSession {
    RenderSession::new(scene, Box::new(HeadlessSurface::new(surface_size())), &*rig.factory(), WAIT)
}

#[test]
fn second_dispose_reports_already_released() {
    let rig = EngineRig::new();
    let mut session = session_for(Arc::new(scene_with_balls(1)), &rig);
    assert!(session.dispose(WAIT).is_ok());
    assert!(session.is_disposed());
    assert!(session.engine().is_released());
    match session.dispose(WAIT) {
        Err(SessionError::AlreadyReleased(id)) => assert_eq!(id, session.id()),
        other => panic!("expected AlreadyReleased, got {other:?}"),
    }
}

#[test]
fn dispose_detaches_every_observer() {
    let scene = Arc::new(scene_with_balls(3));
    let rig = EngineRig::new();
    let mut session = session_for(scene.clone(), &rig);
    assert_eq!(scene.observer_count(), 1);
    session.dispose(WAIT).expect("clean dispose");
    assert_eq!(scene.observer_count(), 0);
    for primitive in scene.primitives() {
        assert_eq!(primitive.transform().observer_count(), 0);
        assert_eq!(primitive.transform().registration_counts(), (1, 1));
    }

    scene.primitives()[0].transform().set_position(glam::Vec3::ONE);
    assert!(session.dirty().peek().is_empty(), "a disposed session hears nothing");
    assert_eq!(session.observer_inconsistencies(), 0);
}

#[test]
fn dropping_a_session_disposes_it() {
    let scene = Arc::new(scene_with_balls(2));
    let rig = EngineRig::new();
    {
        let _session = session_for(scene.clone(), &rig);
        assert_eq!(scene.observer_count(), 1);
    }
    assert_eq!(scene.observer_count(), 0);
    assert!(scene.primitives().iter().all(|primitive| primitive.transform().observer_count() == 0));
}

#[test]
fn stuck_pass_times_out_but_resources_are_released() {
    let rig = EngineRig::with_delay(Duration::from_millis(300));
    rig.ignore_cancel.store(true, Ordering::SeqCst);
    let mut harness = Harness::with_rig(scene_with_balls(1), rig.clone());
    harness.tick();
    let task = harness.scheduler.current_task().cloned().expect("submitted");

    let started = Instant::now();
    while rig.active.load(Ordering::SeqCst) == 0 {
        assert!(started.elapsed() < WAIT, "pass never started");
        std::thread::sleep(Duration::from_millis(1));
    }

    let result = harness.scheduler.dispose(Duration::from_millis(20));
    assert!(matches!(result, Err(SessionError::EngineShutdownTimeout { .. })), "got {result:?}");
    let session = harness.scheduler.session();
    assert!(session.is_disposed());
    assert!(session.engine().is_released());
    assert_eq!(harness.scene.observer_count(), 0);

    assert!(task.wait_terminal(WAIT), "the stuck pass still ends eventually");
    assert!(harness.pool.wait_idle(WAIT));
}

#[test]
fn saved_session_reopens_with_the_same_scene() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("scenes/two_balls.json");
    let rig = EngineRig::new();
    let scene = Arc::new(scene_with_balls(2));
    let session = session_for(scene.clone(), &rig);
    session.save(&path).expect("save scene");

    let reopened = RenderSession::open(&path, Box::new(HeadlessSurface::new(surface_size())), &*rig.factory(), WAIT)
        .expect("open scene");
    let mut original: Vec<_> = scene.primitives().iter().map(|p| (p.id(), p.name.clone())).collect();
    let mut loaded: Vec<_> = reopened.scene().primitives().iter().map(|p| (p.id(), p.name.clone())).collect();
    original.sort_by_key(|(_, name)| name.clone());
    loaded.sort_by_key(|(_, name)| name.clone());
    assert_eq!(original, loaded);
    assert_eq!(reopened.observed_primitives(), 2);
    assert_ne!(reopened.id(), session.id());
}

#[test]
fn opening_a_missing_file_fails() {
    let dir = tempfile::tempdir().expect("temp dir");
    let rig = EngineRig::new();
    let result = RenderSession::open(
        dir.path().join("nope.json"),
        Box::new(HeadlessSurface::new(surface_size())),
        &*rig.factory(),
        WAIT,
    );
    assert!(result.is_err());
}

#[test]
fn studio_runs_and_shuts_down_several_tabs() {
    let rig = EngineRig::new();
    let mut studio = Studio::new(AppConfig::default(), rig.factory(), Arc::new(SystemClock));
    let first = studio.open_session(Arc::new(scene_with_balls(1)), Box::new(HeadlessSurface::new(surface_size())));
    let second = studio.open_session(Arc::new(scene_with_balls(2)), Box::new(HeadlessSurface::new(surface_size())));
    assert_ne!(first, second);
    assert_eq!(studio.session_ids(), vec![first, second]);

    for _ in 0..5 {
        studio.tick_all();
        for id in [first, second] {
            assert!(studio.view(id).expect("open view").wait_for_task(WAIT));
        }
    }
    assert!(studio.view(first).expect("open view").stats().applied >= 1);
    assert!(studio.resize(second, 20, 10));
    assert!(!studio.resize(9_999, 20, 10));

    studio.close_session(first).expect("close first tab");
    assert!(matches!(studio.close_session(first), Err(SessionError::AlreadyReleased(id)) if id == first));
    assert_eq!(studio.session_ids(), vec![second]);

    let report = studio.shutdown(WAIT);
    assert_eq!(report.sessions, 1);
    assert!(report.is_clean());
    assert!(studio.session_ids().is_empty());
}
