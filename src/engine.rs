use std::path::Path;

use tracing::info;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::session::FusionSession;
use crate::staging::{StagedSeries, TempVolumeStaging};
use crate::volume::Volume;
use crate::volume_loader::VolumeLoader;

/// Entry point for loading series into fusion sessions.
///
/// Construction sweeps staging directories left behind by processes that
/// are no longer running.
/// Dropping the engine removes every staging directory it created, including
/// those still held by sessions.
#[derive(Debug)]
pub struct FusionEngine {
    config: EngineConfig,
    staging: TempVolumeStaging,
}

impl FusionEngine {
    pub fn new(config: EngineConfig) -> Self {
        let staging = TempVolumeStaging::new(&config.staging_root, &config.staging_prefix)
            .with_orphan_min_age(config.orphan_min_age);
        let swept = staging.sweep_orphans();
        if swept > 0 {
            info!(swept, root = %staging.root().display(), "removed orphaned staging directories");
        }
        Self { config, staging }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn staging(&self) -> &TempVolumeStaging {
        &self.staging
    }

    /// Stage and load one series.
    pub fn load_volume(&self, paths: &[impl AsRef<Path>]) -> Result<(Volume, StagedSeries)> {
        VolumeLoader::load_staged(&self.staging, paths, self.config.sort_by)
    }

    /// Open a session on a fixed series, optionally with a moving series.
    ///
    /// Either load failing aborts the whole open; staging directories of the
    /// series that did load are released on the way out.
    pub fn open_session<P: AsRef<Path>>(&self, fixed_paths: &[P], moving_paths: Option<&[P]>) -> Result<FusionSession> {
        let (fixed, fixed_staged) = self.load_volume(fixed_paths)?;
        let mut session = FusionSession::new(fixed);
        session.attach_staging(fixed_staged);

        if let Some(moving_paths) = moving_paths {
            self.load_moving(&mut session, moving_paths)?;
        }
        Ok(session)
    }

    /// Load a moving series into an existing session.
    pub fn load_moving(&self, session: &mut FusionSession, paths: &[impl AsRef<Path>]) -> Result<()> {
        let (moving, staged) = self.load_volume(paths)?;
        session.set_moving(moving);
        session.attach_staging(staged);
        Ok(())
    }
}

impl Drop for FusionEngine {
    fn drop(&mut self) {
        let removed = self.staging.release_all();
        if removed > 0 {
            info!(removed, "released staging directories on shutdown");
        }
    }
}
