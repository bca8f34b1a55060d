//! YAML job files for the command line and Python entry points

use crate::core::cross_pol::{CompositeParams, CrossPolCompositor};
use crate::core::lut::LutLocation;
use crate::core::lut_builder::{LutBuilder, LutParams};
use crate::core::orchestrator::{BatchParams, BatchReport, CalibrationOrchestrator};
use crate::core::pool::ScenePool;
use crate::io::external::ProcessRunner;
use crate::io::raster::GdalRasterStore;
use crate::io::scene::discover_scenes;
use crate::types::{RadiocalError, RadiocalResult};
use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Read and parse a YAML job file
pub fn load_yaml<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> anyhow::Result<T> {
    let path_ref = path.as_ref();
    let contents = fs::read_to_string(path_ref)
        .with_context(|| format!("reading job file {}", path_ref.display()))?;
    let job: T = serde_yaml::from_str(&contents)
        .with_context(|| format!("parsing job file {}", path_ref.display()))?;
    Ok(job)
}

/// Batch calibration of every scene in a directory
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CalibrateJob {
    pub data_dir: PathBuf,
    #[serde(default)]
    pub batch: BatchParams,
}

impl CalibrateJob {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let job: Self = load_yaml(path.as_ref())?;
        job.batch
            .validate()
            .with_context(|| format!("validating {}", path.as_ref().display()))?;
        Ok(job)
    }

    pub fn run(&self) -> RadiocalResult<BatchReport> {
        CalibrationOrchestrator::new(self.batch.clone(), ProcessRunner)?.run_batch(&self.data_dir)
    }
}

/// Correction table creation from area-corrected scenes
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildLutJob {
    pub data_dir: PathBuf,
    /// Scene roots, e.g. `gulfco_14011_15058_109_150509`
    pub scenes: Vec<String>,
    /// Land-cover raster per scene, same grid as the scene's ground-range rasters
    pub masks: Vec<PathBuf>,
    pub output: LutLocation,
    #[serde(default)]
    pub lut: LutParams,
    #[serde(default)]
    pub threads: Option<usize>,
}

impl BuildLutJob {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let job: Self = load_yaml(path.as_ref())?;
        job.validate()
            .with_context(|| format!("validating {}", path.as_ref().display()))?;
        Ok(job)
    }

    pub fn validate(&self) -> RadiocalResult<()> {
        if self.scenes.len() != self.masks.len() {
            return Err(RadiocalError::InvalidConfig(format!(
                "{} scenes but {} land-cover masks",
                self.scenes.len(),
                self.masks.len()
            )));
        }
        self.lut.validate()
    }

    pub fn run(&self) -> RadiocalResult<Vec<PathBuf>> {
        self.validate()?;
        let builder = LutBuilder::new(self.lut.clone(), GdalRasterStore::default())?;
        let pool = ScenePool::new(self.threads)?;
        builder.build_and_write(&self.data_dir, &self.scenes, &self.masks, &self.output, &pool)
    }
}

/// Cross-product correction of every scene in a directory
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompositeJob {
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    #[serde(default)]
    pub scene_filter: Option<String>,
    #[serde(default)]
    pub composite: CompositeParams,
}

impl CompositeJob {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let job: Self = load_yaml(path.as_ref())?;
        job.composite
            .validate()
            .with_context(|| format!("validating {}", path.as_ref().display()))?;
        Ok(job)
    }

    pub fn run(&self) -> RadiocalResult<Vec<PathBuf>> {
        let compositor =
            CrossPolCompositor::new(self.composite.clone(), GdalRasterStore::default())?;
        let mut written = Vec::new();
        for scene in discover_scenes(&self.data_dir, self.scene_filter.as_deref())? {
            match compositor.correct_scene(&scene, &self.output_dir) {
                Ok(paths) => written.extend(paths),
                Err(e) => log::warn!("Cross-product correction of {} failed: {}", scene.root, e),
            }
        }
        Ok(written)
    }
}

fn area_only_defaults() -> BatchParams {
    BatchParams {
        cal_name: "area_only".to_string(),
        create_look: true,
        create_slope: true,
        ..BatchParams::default()
    }
}

/// Area-only calibration, table creation, then table-informed calibration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineJob {
    pub data_dir: PathBuf,
    pub scenes: Vec<String>,
    pub masks: Vec<PathBuf>,
    pub tables: LutLocation,
    #[serde(default = "area_only_defaults")]
    pub area_only: BatchParams,
    #[serde(default)]
    pub lut: LutParams,
    /// The correction tables are always the ones built by this pipeline
    #[serde(default)]
    pub lut_informed: BatchParams,
    /// Correct the cross products into this directory when set
    #[serde(default)]
    pub composite_dir: Option<PathBuf>,
    #[serde(default)]
    pub composite: CompositeParams,
}

/// Outputs of every pipeline stage
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub area_only: BatchReport,
    pub tables: Vec<PathBuf>,
    pub lut_informed: BatchReport,
    pub composites: Vec<PathBuf>,
}

impl PipelineJob {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let job: Self = load_yaml(path.as_ref())?;
        job.validate()
            .with_context(|| format!("validating {}", path.as_ref().display()))?;
        Ok(job)
    }

    pub fn validate(&self) -> RadiocalResult<()> {
        self.area_only.validate()?;
        self.lut_stage().validate()?;
        self.informed_params().validate()?;
        if self.lut.correction_name != self.area_only.cal_name {
            return Err(RadiocalError::InvalidConfig(format!(
                "tables are built from '{}' rasters but area-only calibration writes '{}'",
                self.lut.correction_name, self.area_only.cal_name
            )));
        }
        if self.lut_informed.cal_name == self.area_only.cal_name {
            return Err(RadiocalError::InvalidConfig(
                "both calibration passes would write the same files".to_string(),
            ));
        }
        if self.composite_dir.is_some() {
            self.composite.validate()?;
        }
        Ok(())
    }

    fn lut_stage(&self) -> BuildLutJob {
        BuildLutJob {
            data_dir: self.data_dir.clone(),
            scenes: self.scenes.clone(),
            masks: self.masks.clone(),
            output: self.tables.clone(),
            lut: self.lut.clone(),
            threads: self.area_only.threads,
        }
    }

    fn informed_params(&self) -> BatchParams {
        BatchParams {
            correction_lut: Some(self.tables.clone()),
            ..self.lut_informed.clone()
        }
    }

    pub fn run(&self) -> RadiocalResult<PipelineReport> {
        self.validate()?;

        log::info!("Pipeline stage 1/3: area-only calibration");
        let area_only = CalibrationOrchestrator::new(self.area_only.clone(), ProcessRunner)?
            .run_batch(&self.data_dir)?;

        log::info!("Pipeline stage 2/3: correction table creation");
        let tables = self.lut_stage().run()?;

        log::info!("Pipeline stage 3/3: table-informed calibration");
        let lut_informed = CalibrationOrchestrator::new(self.informed_params(), ProcessRunner)?
            .run_batch(&self.data_dir)?;

        let composites = match &self.composite_dir {
            Some(dir) => CompositeJob {
                data_dir: self.data_dir.clone(),
                output_dir: dir.clone(),
                scene_filter: self.lut_informed.scene_filter.clone(),
                composite: CompositeParams {
                    uncorrected_name: self.area_only.cal_name.clone(),
                    corrected_name: self.lut_informed.cal_name.clone(),
                    ..self.composite.clone()
                },
            }
            .run()?,
            None => Vec::new(),
        };

        Ok(PipelineReport {
            area_only,
            tables,
            lut_informed,
            composites,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Polarization;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_yaml(text: &str) -> tempfile::TempPath {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(text.as_bytes()).unwrap();
        temp.into_temp_path()
    }

    #[test]
    fn test_calibrate_job_defaults() {
        let path =
            write_yaml("data_dir: /data/uavsar\nbatch:\n  flat_dem: true\n  polarizations: [HV]\n");
        let job = CalibrateJob::load(&path).unwrap();
        assert_eq!(job.data_dir, PathBuf::from("/data/uavsar"));
        assert!(job.batch.flat_dem);
        assert_eq!(job.batch.polarizations, vec![Polarization::HV]);
        assert_eq!(job.batch.cal_name, "area_veg");
        assert_eq!(job.batch.transform_file, "geomap_uavsar.trans");
        assert_eq!(job.batch.min_look, 25.0);
    }

    #[test]
    fn test_lut_job_with_infinite_cutoff() {
        let path = write_yaml(
            "data_dir: /data\n\
             scenes: [gulfco_14011_15058_109_150509]\n\
             masks: [gulfco_ccap.tif]\n\
             output: {dir: /luts, name: wetland}\n\
             lut:\n  allowed_classes: [15, 18]\n  max_cutoff: .inf\n  min_samples: 20\n",
        );
        let job = BuildLutJob::load(&path).unwrap();
        assert_eq!(job.lut.allowed_classes, vec![15.0, 18.0]);
        assert!(job.lut.max_cutoff.is_infinite());
        assert_eq!(job.lut.min_samples, 20);
        assert_eq!(job.lut.smoothing.window_size, 51);
        assert_eq!(job.output.path(Polarization::VV), PathBuf::from("/luts/caltbl_wetland_VV.flt"));
    }

    #[test]
    fn test_lut_job_rejects_mismatched_masks() {
        let path = write_yaml(
            "data_dir: /data\nscenes: [a, b]\nmasks: [a.tif]\noutput: {dir: /luts, name: x}\n",
        );
        assert!(BuildLutJob::load(&path).is_err());
    }

    #[test]
    fn test_pipeline_defaults_are_consistent() {
        let path = write_yaml(
            "data_dir: /data\nscenes: [a]\nmasks: [a.tif]\ntables: {dir: /luts, name: veg}\n",
        );
        let job = PipelineJob::load(&path).unwrap();
        assert_eq!(job.area_only.cal_name, "area_only");
        assert!(job.area_only.create_look && job.area_only.create_slope);
        assert_eq!(job.informed_params().correction_lut, Some(LutLocation::new("/luts", "veg")));
    }

    #[test]
    fn test_pipeline_rejects_same_calibration_name() {
        let path = write_yaml(
            "data_dir: /data\nscenes: [a]\nmasks: [a.tif]\ntables: {dir: /luts, name: veg}\n\
             lut_informed:\n  cal_name: area_only\n",
        );
        assert!(PipelineJob::load(&path).is_err());
    }

    #[test]
    fn test_missing_file_error_names_path() {
        let err = CalibrateJob::load("/definitely/not/here.yaml").unwrap_err();
        assert!(format!("{:#}", err).contains("/definitely/not/here.yaml"));
    }
}
