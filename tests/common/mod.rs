#![allow(dead_code)]

use ndarray::Array2;
use radiocal::io::raster::RasterStore;
use radiocal::types::{RadiocalError, RadiocalResult, Raster};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Rasters held in memory, keyed by the path they are loaded from or stored to
#[derive(Default)]
pub struct MemoryStore {
    rasters: Mutex<HashMap<PathBuf, Raster>>,
}

impl MemoryStore {
    pub fn insert<P: AsRef<Path>>(&self, path: P, data: Array2<f32>) {
        self.insert_raster(path, Raster::new(data));
    }

    pub fn insert_raster<P: AsRef<Path>>(&self, path: P, raster: Raster) {
        self.rasters
            .lock()
            .unwrap()
            .insert(path.as_ref().to_path_buf(), raster);
    }

    pub fn get<P: AsRef<Path>>(&self, path: P) -> Option<Raster> {
        self.rasters.lock().unwrap().get(path.as_ref()).cloned()
    }
}

impl RasterStore for MemoryStore {
    fn load(&self, path: &Path) -> RadiocalResult<Raster> {
        self.get(path).ok_or_else(|| {
            RadiocalError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                path.display().to_string(),
            ))
        })
    }

    fn store(&self, path: &Path, raster: &Raster) -> RadiocalResult<()> {
        self.insert_raster(path, raster.clone());
        Ok(())
    }
}

impl RasterStore for &MemoryStore {
    fn load(&self, path: &Path) -> RadiocalResult<Raster> {
        (**self).load(path)
    }

    fn store(&self, path: &Path, raster: &Raster) -> RadiocalResult<()> {
        (**self).store(path, raster)
    }
}
