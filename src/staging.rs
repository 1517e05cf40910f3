//! Temporary directories holding one series worth of image files.
//!
//! The volume reader consumes a directory, so every load first links (or
//! copies) the qualifying files of a series into a fresh directory below the
//! staging root. The directory is removed when the [`StagedSeries`] is
//! dropped, and every directory a staging instance created is removed by
//! [`TempVolumeStaging::release_all`]. Directories left behind by a process
//! that died before either happened are removed by
//! [`TempVolumeStaging::sweep_orphans`]. A directory counts as orphaned only
//! when the process named in it is gone. Where liveness cannot be checked
//! (no `/proc`), the directory must also be older than the configured
//! minimum age.
//!
//! Directory names are `<prefix><pid>-<owner>-<random>`.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use dicom::object::OpenFileOptions;
use dicom_dictionary_std::tags;
use tempfile::TempDir;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{FusionError, Result};

/// Modalities that form a tomographic image volume. Dose grids, plans,
/// structure sets and registrations are left out.
pub const VOLUMETRIC_MODALITIES: &[&str] = &["CT", "MR", "PT", "NM"];

pub fn is_volumetric_modality(modality: &str) -> bool {
    let modality = modality.trim();
    VOLUMETRIC_MODALITIES
        .iter()
        .any(|m| m.eq_ignore_ascii_case(modality))
}

#[derive(Debug, Clone)]
pub struct TempVolumeStaging {
    root: PathBuf,
    prefix: String,
    owner: String,
    orphan_min_age: Duration,
}

/// Default age a staging directory of unknown liveness must reach before a
/// sweep removes it.
pub const DEFAULT_ORPHAN_MIN_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// A staged series. The directory lives exactly as long as this value.
#[derive(Debug)]
pub struct StagedSeries {
    dir: TempDir,
    files: Vec<PathBuf>,
}

impl StagedSeries {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Remove the directory now, logging instead of failing.
    pub fn release(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(err) = self.dir.close() {
            warn!(path = %path.display(), error = %err, "failed to remove staging directory");
        } else {
            debug!(path = %path.display(), "released staging directory");
        }
    }
}

impl TempVolumeStaging {
    pub fn new(root: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        let owner = Uuid::new_v4().simple().to_string();
        Self {
            root: root.into(),
            prefix: prefix.into(),
            owner: owner[..8].to_string(),
            orphan_min_age: DEFAULT_ORPHAN_MIN_AGE,
        }
    }

    /// Minimum age for sweeping a directory whose process cannot be checked.
    pub fn with_orphan_min_age(mut self, age: Duration) -> Self {
        self.orphan_min_age = age;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn process_prefix(&self) -> String {
        format!("{}{}-", self.prefix, std::process::id())
    }

    fn owned_prefix(&self) -> String {
        format!("{}{}-", self.process_prefix(), self.owner)
    }

    /// Stage the volumetric image files among `paths`.
    ///
    /// # Errors
    ///
    /// [`FusionError::NoVolumetricSlices`] if no file qualifies; the fresh
    /// directory is removed first.
    pub fn stage(&self, paths: &[impl AsRef<Path>]) -> Result<StagedSeries> {
        fs::create_dir_all(&self.root)?;
        let dir = tempfile::Builder::new()
            .prefix(&self.owned_prefix())
            .tempdir_in(&self.root)?;
        debug!(path = %dir.path().display(), "created staging directory");

        let mut files = Vec::new();
        for source in paths {
            let source: &Path = source.as_ref();
            if !Self::probe_volumetric(source) {
                continue;
            }
            let target = dir.path().join(format!("{:05}.dcm", files.len()));
            if fs::hard_link(source, &target).is_err() {
                if let Err(err) = fs::copy(source, &target) {
                    let staged = StagedSeries { dir, files };
                    staged.release();
                    return Err(err.into());
                }
            }
            files.push(target);
        }

        let staged = StagedSeries { dir, files };
        if staged.files.is_empty() {
            staged.release();
            return Err(FusionError::NoVolumetricSlices);
        }

        info!(
            path = %staged.path().display(),
            staged = staged.files.len(),
            offered = paths.len(),
            "staged series"
        );
        Ok(staged)
    }

    fn probe_volumetric(path: &Path) -> bool {
        let header = match OpenFileOptions::new()
            .read_until(tags::PIXEL_DATA)
            .open_file(path)
        {
            Ok(header) => header,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping unreadable file");
                return false;
            }
        };
        let modality = header
            .element(tags::MODALITY)
            .ok()
            .and_then(|e| e.to_str().ok().map(|s| s.to_string()))
            .unwrap_or_default();
        let keep = is_volumetric_modality(&modality);
        if !keep {
            debug!(path = %path.display(), modality = %modality, "skipping non-volumetric object");
        }
        keep
    }

    /// Remove staging directories left behind by processes that are no longer
    /// running. Returns how many were removed.
    pub fn sweep_orphans(&self) -> usize {
        self.remove_matching(|name, path| self.is_orphan(name, path))
    }

    /// Remove every directory this instance staged. Returns how many were
    /// still present.
    pub fn release_all(&self) -> usize {
        let owned = self.owned_prefix();
        self.remove_matching(|name, _| name.starts_with(&owned))
    }

    fn remove_matching(&self, matches: impl Fn(&str, &Path) -> bool) -> usize {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(_) => return 0,
        };

        let mut removed = 0;
        for entry in entries.filter_map(std::result::Result::ok) {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let path = entry.path();
            if !path.is_dir() || !matches(name, &path) {
                continue;
            }
            match fs::remove_dir_all(&path) {
                Ok(()) => {
                    removed += 1;
                    info!(path = %path.display(), "removed staging directory");
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "failed to remove staging directory");
                }
            }
        }
        removed
    }

    /// PID encoded in a staging directory name.
    fn staging_pid(&self, name: &str) -> Option<u32> {
        let (pid, _) = name.strip_prefix(&self.prefix)?.split_once('-')?;
        if pid.is_empty() || !pid.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        pid.parse().ok()
    }

    fn is_orphan(&self, name: &str, path: &Path) -> bool {
        let Some(pid) = self.staging_pid(name) else {
            return false;
        };
        if pid == std::process::id() {
            return false;
        }
        match process_alive(pid) {
            Some(alive) => !alive,
            None => is_older_than(path, self.orphan_min_age),
        }
    }
}

/// `None` when liveness cannot be determined on this platform.
#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> Option<bool> {
    let proc_root = Path::new("/proc");
    proc_root
        .join("self")
        .exists()
        .then(|| proc_root.join(pid.to_string()).exists())
}

#[cfg(not(target_os = "linux"))]
fn process_alive(_pid: u32) -> Option<bool> {
    None
}

fn is_older_than(path: &Path, age: Duration) -> bool {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .is_some_and(|elapsed| elapsed >= age)
}
