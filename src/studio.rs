//! Application-level owner of every open render view (one per tab), the worker pool they share
//! and the process-wide preview cache.

use crate::config::AppConfig;
use crate::display::DisplaySurface;
use crate::engine::EngineFactory;
use crate::error::SessionError;
use crate::preview::PreviewCache;
use crate::scene::Scene;
use crate::scheduler::RenderScheduler;
use crate::session::{RenderSession, RenderWorkerPool};
use crate::time::Clock;
use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub sessions: usize,
    pub timed_out: usize,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.timed_out == 0
    }
}

pub struct Studio {
    config: AppConfig,
    factory: Arc<dyn EngineFactory>,
    clock: Arc<dyn Clock>,
    pool: Arc<RenderWorkerPool>,
    previews: Arc<PreviewCache>,
    views: Vec<RenderScheduler>,
}

impl Studio {
    pub fn new(config: AppConfig, factory: Arc<dyn EngineFactory>, clock: Arc<dyn Clock>) -> Self {
        let workers = config.scheduler.resolved_worker_threads();
        let pool = Arc::new(RenderWorkerPool::new(workers, config.scheduler.worker_queue_depth));
        let previews = Arc::new(PreviewCache::new(factory.clone(), config.preview.clone()));
        tracing::info!(workers = pool.worker_count(), "studio started");
        Self { config, factory, clock, pool, previews, views: Vec::new() }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<RenderWorkerPool> {
        &self.pool
    }

    pub fn previews(&self) -> &Arc<PreviewCache> {
        &self.previews
    }

    pub fn open_session(&mut self, scene: Arc<Scene>, display: Box<dyn DisplaySurface>) -> u64 {
        let session = RenderSession::new(scene, display, &*self.factory, self.config.scheduler.shutdown_timeout());
        self.push_view(session)
    }

    pub fn open_file(&mut self, path: impl AsRef<Path>, display: Box<dyn DisplaySurface>) -> Result<u64> {
        let session =
            RenderSession::open(path, display, &*self.factory, self.config.scheduler.shutdown_timeout())?;
        Ok(self.push_view(session))
    }

    fn push_view(&mut self, session: RenderSession) -> u64 {
        let id = session.id();
        self.views.push(RenderScheduler::new(
            session,
            self.pool.clone(),
            self.clock.clone(),
            self.config.scheduler.clone(),
            self.config.camera.clone(),
        ));
        id
    }

    pub fn session_ids(&self) -> Vec<u64> {
        self.views.iter().map(|view| view.session().id()).collect()
    }

    pub fn view(&self, session: u64) -> Option<&RenderScheduler> {
        self.views.iter().find(|view| view.session().id() == session)
    }

    pub fn view_mut(&mut self, session: u64) -> Option<&mut RenderScheduler> {
        self.views.iter_mut().find(|view| view.session().id() == session)
    }

    pub fn tick_all(&mut self) {
        for view in &mut self.views {
            view.on_tick();
        }
    }

    pub fn resize(&mut self, session: u64, width: u32, height: u32) -> bool {
        match self.view_mut(session) {
            Some(view) => {
                view.on_resize(width, height);
                true
            }
            None => false,
        }
    }

    /// Disposes one tab. Closing an unknown or already closed session reports `AlreadyReleased`.
    pub fn close_session(&mut self, session: u64) -> Result<(), SessionError> {
        let index = self
            .views
            .iter()
            .position(|view| view.session().id() == session)
            .ok_or(SessionError::AlreadyReleased(session))?;
        let mut view = self.views.remove(index);
        view.dispose(self.config.scheduler.shutdown_timeout())
    }

    /// Stops every view, waits for the pool to drain, then disposes them all. Nothing here is
    /// fatal; overruns are logged and counted.
    pub fn shutdown(&mut self, timeout: Duration) -> ShutdownReport {
        let deadline = Instant::now() + timeout;
        let mut report = ShutdownReport { sessions: self.views.len(), timed_out: 0 };
        for view in &self.views {
            view.session().engine().shutdown_in_progress();
        }
        if !self.pool.wait_idle(timeout) {
            tracing::warn!(error = %SessionError::EngineShutdownTimeout { timeout }, "render workers still busy at shutdown");
        }
        for mut view in self.views.drain(..) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match view.dispose(remaining) {
                Ok(()) => {}
                Err(err @ SessionError::EngineShutdownTimeout { .. }) => {
                    report.timed_out += 1;
                    tracing::warn!(session = view.session().id(), error = %err, "session shutdown overran");
                }
                Err(err) => tracing::error!(session = view.session().id(), error = %err, "session shutdown failed"),
            }
        }
        tracing::info!(sessions = report.sessions, timed_out = report.timed_out, "studio shut down");
        report
    }
}
