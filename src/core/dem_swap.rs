//! Scoped substitution of a scene's DEM by a constant-height surface.
//!
//! The original elevation file is renamed to `<dem>_old` while the substitute
//! is in place. Restoration happens on `restore`, or on drop if `restore` was
//! never reached, so an early return or unwinding panic between the swap and
//! the restore cannot leave the flat DEM behind. A process that dies without
//! unwinding (release builds abort on panic) leaves the backup in place; the
//! next swap of that DEM puts it back first (`recover_stale`).

use crate::types::{RadiocalError, RadiocalResult};
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Active flat-DEM substitution for one scene
#[derive(Debug)]
pub struct DemSwap {
    dem: PathBuf,
    backup: PathBuf,
    had_original: bool,
    restored: bool,
}

impl DemSwap {
    /// `<dem>_old`
    pub fn backup_path(dem: &Path) -> PathBuf {
        let mut name: OsString = dem.as_os_str().to_owned();
        name.push("_old");
        PathBuf::from(name)
    }

    /// Put back a backup left behind by an interrupted run.
    /// Returns whether a backup was found.
    pub fn recover_stale(dem: &Path) -> RadiocalResult<bool> {
        let backup = Self::backup_path(dem);
        if !backup.exists() {
            return Ok(false);
        }
        log::warn!(
            "Found stale DEM backup {}; restoring it before continuing",
            backup.display()
        );
        std::fs::rename(&backup, dem)?;
        Ok(true)
    }

    /// Move the DEM aside and write a `rows` x `cols` float32 raster of `height` in its place
    pub fn engage(dem: &Path, rows: usize, cols: usize, height: f32) -> RadiocalResult<Self> {
        Self::recover_stale(dem)?;

        let backup = Self::backup_path(dem);
        let had_original = dem.exists();
        if had_original {
            std::fs::rename(dem, &backup)?;
        } else {
            log::warn!(
                "No DEM at {}; the flat substitute will be removed afterwards",
                dem.display()
            );
        }

        let mut swap = Self {
            dem: dem.to_path_buf(),
            backup,
            had_original,
            restored: false,
        };

        // On failure the returned error drops `swap`, which puts the original back
        swap.write_substitute(rows, cols, height)?;
        log::info!(
            "Substituted flat DEM ({}x{}, height {}) for {}",
            rows,
            cols,
            height,
            dem.display()
        );
        Ok(swap)
    }

    fn write_substitute(&mut self, rows: usize, cols: usize, height: f32) -> RadiocalResult<()> {
        let dir = match self.dem.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let values = vec![height; rows * cols];

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(bytemuck::cast_slice(&values))?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.dem)
            .map_err(|e| RadiocalError::Io(e.error))?;
        Ok(())
    }

    pub fn dem_path(&self) -> &Path {
        &self.dem
    }

    /// Put the original DEM back (or remove the substitute if there was none)
    pub fn restore(mut self) -> RadiocalResult<()> {
        self.restore_in_place()
    }

    fn restore_in_place(&mut self) -> RadiocalResult<()> {
        if self.restored {
            return Ok(());
        }
        self.restored = true;

        if self.had_original {
            std::fs::rename(&self.backup, &self.dem)?;
            log::info!("Restored DEM {}", self.dem.display());
        } else if self.dem.exists() {
            std::fs::remove_file(&self.dem)?;
            log::info!("Removed flat DEM {}", self.dem.display());
        }
        Ok(())
    }
}

impl Drop for DemSwap {
    fn drop(&mut self) {
        if !self.restored {
            if let Err(e) = self.restore_in_place() {
                log::error!(
                    "Failed to restore DEM {} from {}: {}",
                    self.dem.display(),
                    self.backup.display(),
                    e
                );
            }
        }
    }
}

/// Run `f` with a flat DEM in place and restore the original afterwards,
/// whatever `f` returns. A failure of `f` takes precedence over a failed restore.
pub fn with_flat_dem<T, F>(
    dem: &Path,
    rows: usize,
    cols: usize,
    height: f32,
    f: F,
) -> RadiocalResult<T>
where
    F: FnOnce(&Path) -> RadiocalResult<T>,
{
    let swap = DemSwap::engage(dem, rows, cols, height)?;
    let result = f(swap.dem_path());
    let restored = swap.restore();

    match (result, restored) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(restore_err)) => {
            log::error!("DEM restore also failed: {}", restore_err);
            Err(e)
        }
    }
}
