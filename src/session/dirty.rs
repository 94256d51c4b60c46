use bitflags::bitflags;
use std::sync::atomic::{AtomicBool, Ordering};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DirtyFlags: u8 {
        const CAMERA = 0b01;
        const TRANSFORM = 0b10;
    }
}

/// Deferred invalidation set by observer callbacks on any thread and consumed once per tick.
#[derive(Debug, Default)]
pub struct DirtyState {
    camera: AtomicBool,
    transform: AtomicBool,
}

impl DirtyState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_camera(&self) {
        self.camera.store(true, Ordering::Release);
    }

    pub fn mark_transform(&self) {
        self.transform.store(true, Ordering::Release);
    }

    pub fn peek(&self) -> DirtyFlags {
        let mut flags = DirtyFlags::empty();
        flags.set(DirtyFlags::CAMERA, self.camera.load(Ordering::Acquire));
        flags.set(DirtyFlags::TRANSFORM, self.transform.load(Ordering::Acquire));
        flags
    }

    /// Clears and returns whatever was set. A flag raised concurrently is either returned now or
    /// left for the next call, never lost.
    pub fn take(&self) -> DirtyFlags {
        let mut flags = DirtyFlags::empty();
        if self.camera.compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire).is_ok() {
            flags |= DirtyFlags::CAMERA;
        }
        if self.transform.compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire).is_ok() {
            flags |= DirtyFlags::TRANSFORM;
        }
        flags
    }
}
