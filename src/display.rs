use crate::engine::Frame;
use crate::input::Input;
use anyhow::{Context, Result};
use image::RgbaImage;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use winit::dpi::PhysicalSize;

/// Where a render view puts its frames and where it reads held keys from.
pub trait DisplaySurface {
    fn blit(&mut self, frame: &Frame);
    fn size(&self) -> PhysicalSize<u32>;
    fn input_mut(&mut self) -> &mut Input;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlitRecord {
    pub pass_count: u32,
    pub generation: u64,
    pub size: (u32, u32),
}

#[derive(Default)]
struct BlitLogInner {
    records: Vec<BlitRecord>,
    last_image: Option<Arc<RgbaImage>>,
}

/// Shared view of what a [`HeadlessSurface`] has been shown. Stays readable after the surface
/// itself has been handed to a session.
#[derive(Clone, Default)]
pub struct BlitLog {
    inner: Arc<Mutex<BlitLogInner>>,
}

impl BlitLog {
    pub fn records(&self) -> Vec<BlitRecord> {
        self.inner.lock().records.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last(&self) -> Option<BlitRecord> {
        self.inner.lock().records.last().copied()
    }

    pub fn last_image(&self) -> Option<Arc<RgbaImage>> {
        self.inner.lock().last_image.clone()
    }

    pub fn save_last_png(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let image = self.last_image().context("no frame has been displayed yet")?;
        image.save(path).with_context(|| format!("Failed to write frame to {}", path.display()))
    }
}

/// Off-screen surface used by the headless binary and by tests.
pub struct HeadlessSurface {
    size: PhysicalSize<u32>,
    input: Input,
    log: BlitLog,
}

impl HeadlessSurface {
    pub fn new(size: PhysicalSize<u32>) -> Self {
        Self::with_input(size, Input::new())
    }

    pub fn with_input(size: PhysicalSize<u32>, input: Input) -> Self {
        Self { size, input, log: BlitLog::default() }
    }

    pub fn log(&self) -> BlitLog {
        self.log.clone()
    }
}

impl DisplaySurface for HeadlessSurface {
    fn blit(&mut self, frame: &Frame) {
        let mut inner = self.log.inner.lock();
        inner.records.push(BlitRecord {
            pass_count: frame.pass_count,
            generation: frame.generation,
            size: frame.image.dimensions(),
        });
        inner.last_image = Some(frame.image.clone());
    }

    fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    fn input_mut(&mut self) -> &mut Input {
        &mut self.input
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn blits_are_recorded_and_saved() {
        let mut surface = HeadlessSurface::new(PhysicalSize::new(4, 2));
        let log = surface.log();
        assert!(log.save_last_png(std::env::temp_dir().join("never.png")).is_err());
        surface.blit(&Frame {
            image: Arc::new(RgbaImage::new(4, 2)),
            pass_count: 3,
            elapsed: Duration::from_millis(5),
            generation: 7,
        });
        assert_eq!(log.last(), Some(BlitRecord { pass_count: 3, generation: 7, size: (4, 2) }));
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("frame.png");
        log.save_last_png(&path).expect("save png");
        assert!(path.exists());
    }
}
