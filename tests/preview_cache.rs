mod common;

use common::{EngineRig, WAIT};
use glam::Vec3;
use lumen_editor::config::PreviewConfig;
use lumen_editor::preview::{PreviewCache, PreviewSubject};
use lumen_editor::scene::{Material, Shape};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Barrier};
use std::time::Duration;

fn config() -> PreviewConfig {
    PreviewConfig { size: 16, passes: 1, border_px: 2 }
}

#[test]
fn concurrent_requests_share_one_computation() {
    let rig = EngineRig::with_delay(Duration::from_millis(30));
    let cache = Arc::new(PreviewCache::new(rig.factory(), config()));
    let subject = PreviewSubject::Material(Material::diffuse("copper", Vec3::new(0.9, 0.5, 0.3)));
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = cache.clone();
            let subject = subject.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                barrier.wait();
                cache.get(&subject)
            })
        })
        .collect();
    let images: Vec<_> = handles.into_iter().map(|handle| handle.join().expect("preview thread")).collect();

    assert_eq!(cache.computations(), 1);
    assert_eq!(rig.passes_run.load(Ordering::SeqCst), 1);
    for image in &images[1..] {
        assert!(Arc::ptr_eq(&images[0], image));
    }
    assert!(!Arc::ptr_eq(&images[0], cache.placeholder()));
}

#[test]
fn a_slow_subject_does_not_block_other_subjects() {
    let rig = EngineRig::new();
    let cache = Arc::new(PreviewCache::new(rig.factory(), config()));
    let slow = PreviewSubject::Material(Material::diffuse("slow", Vec3::ONE));
    let quick = PreviewSubject::Shape(Shape::sphere(0.4));

    rig.hold_next_pass();
    let waiter = {
        let cache = cache.clone();
        let slow = slow.clone();
        std::thread::spawn(move || cache.get(&slow))
    };
    assert!(rig.wait_until_held(WAIT), "slow preview never started");

    let image = cache.get(&quick);
    assert!(!Arc::ptr_eq(&image, cache.placeholder()));
    assert!(cache.contains(quick.key()));
    assert!(!cache.contains(slow.key()), "slow preview is still parked");
    assert_eq!(rig.max_active(), 2, "both computations were in flight together");

    rig.release_held();
    let slow_image = waiter.join().expect("preview thread");
    assert!(!Arc::ptr_eq(&slow_image, cache.placeholder()));
    assert!(cache.contains(slow.key()));
    assert_eq!(cache.computations(), 2);
}

#[test]
fn failure_returns_placeholder_and_is_retried() {
    let rig = EngineRig::new();
    let cache = PreviewCache::new(rig.factory(), config());
    let subject = PreviewSubject::Material(Material::diffuse("flaky", Vec3::ONE));

    rig.fail_next(1);
    let first = cache.get(&subject);
    assert!(Arc::ptr_eq(&first, cache.placeholder()));
    assert!(!cache.contains(subject.key()), "failures are not memoized");
    assert_eq!(cache.failures(), 1);

    let second = cache.get(&subject);
    assert!(!Arc::ptr_eq(&second, cache.placeholder()));
    assert!(cache.contains(subject.key()));
    assert_eq!(cache.computations(), 2);
}

#[test]
fn try_get_surfaces_the_error() {
    let rig = EngineRig::new();
    let cache = PreviewCache::new(rig.factory(), config());
    let subject = PreviewSubject::Shape(Shape::sphere(1.0));
    rig.fail_next(1);
    let err = cache.try_get(&subject).expect_err("scripted failure");
    assert!(err.to_string().contains("scripted failure"));
    assert!(cache.try_get(&subject).is_ok());
}

#[test]
fn engine_panic_becomes_placeholder() {
    let rig = EngineRig::new();
    let cache = PreviewCache::new(rig.factory(), config());
    let subject = PreviewSubject::Shape(Shape::sphere(0.25));
    rig.panic_next.store(true, Ordering::SeqCst);
    let image = cache.get(&subject);
    assert!(Arc::ptr_eq(&image, cache.placeholder()));
    assert!(!cache.contains(subject.key()));
    assert_eq!(cache.failures(), 1);
}
