//! Batch calibration of UAVSAR scenes through the native calibration and
//! geocoding programs.
//!
//! Every scene walks the same sequence of states:
//!
//! ```text
//! Discovered -> GeometryParsed -> [DemSwapped] -> Calibrated -> AuxCollected
//!            -> [DemRestored] -> [PostProcessed] -> Done
//! ```
//!
//! with `Skipped` reached when every requested output already exists and
//! `Failed` when a step errors out. A failed scene never stops the batch.

use crate::core::dem_swap::DemSwap;
use crate::core::lut::{CalibrationSurface, LutLocation};
use crate::core::pool::ScenePool;
use crate::core::postprocess::PostProcessor;
use crate::io::annotation::AnnotationReader;
use crate::io::external::{run_checked, CommandRunner, Invocation};
use crate::io::raster::EnviHeader;
use crate::io::scene::{discover_scenes, SceneFiles};
use crate::types::{
    BoundingBox, Polarization, RadiocalError, RadiocalResult, RunWindow, SceneGeometry,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Suffixes of the auxiliary outputs the calibration program writes into the
/// scene directory; prefixed with the scene root so scenes sharing a directory
/// can run concurrently
pub const LOOK_TEMP: &str = "look_temp";
pub const SLOPE_TEMP: &str = "slope_temp";
pub const MASK_TEMP: &str = "mask_temp";

/// Parameters for a batch calibration run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchParams {
    /// Calibration executable, absolute or on `PATH`
    pub calibration_program: PathBuf,
    /// Geocoding executable, absolute or on `PATH`
    pub geocode_program: PathBuf,
    /// Geocoding transform file name inside each scene directory
    pub transform_file: String,
    /// Calibration name used in output file names
    pub cal_name: String,
    /// Correction tables to apply; area-only calibration when absent
    pub correction_lut: Option<LutLocation>,
    pub polarizations: Vec<Polarization>,
    /// When false the state machine runs without invoking anything or touching the DEM
    pub run_correction: bool,
    /// Calibrate against a constant-height DEM
    pub flat_dem: bool,
    pub flat_dem_height: f32,
    pub create_mask: bool,
    pub create_look: bool,
    pub create_slope: bool,
    pub overwrite: bool,
    pub post_process: bool,
    /// Look-angle range kept by post-processing, degrees
    pub min_look: f64,
    pub max_look: f64,
    /// Process only annotation files whose name contains this string
    pub scene_filter: Option<String>,
    /// Worker count; defaults to one per core
    pub threads: Option<usize>,
}

impl Default for BatchParams {
    fn default() -> Self {
        Self {
            calibration_program: PathBuf::from("uavsar_calib"),
            geocode_program: PathBuf::from("uavsar_geocode"),
            transform_file: "geomap_uavsar.trans".to_string(),
            cal_name: "area_veg".to_string(),
            correction_lut: None,
            polarizations: Polarization::REAL.to_vec(),
            run_correction: true,
            flat_dem: false,
            flat_dem_height: 0.0,
            create_mask: true,
            create_look: false,
            create_slope: false,
            overwrite: false,
            post_process: true,
            min_look: 25.0,
            max_look: 64.0,
            scene_filter: None,
            threads: None,
        }
    }
}

impl BatchParams {
    pub fn validate(&self) -> RadiocalResult<()> {
        if self.polarizations.is_empty() {
            return Err(RadiocalError::InvalidConfig("no polarizations requested".to_string()));
        }
        if let Some(pol) = self.polarizations.iter().find(|p| p.is_complex()) {
            return Err(RadiocalError::InvalidConfig(format!(
                "{} is a cross product; calibrate HH, VV and HV and use the compositor",
                pol
            )));
        }
        if !(self.min_look < self.max_look) {
            return Err(RadiocalError::InvalidConfig(format!(
                "post-processing look range {}..{} is empty",
                self.min_look, self.max_look
            )));
        }
        if self.cal_name.trim().is_empty() || self.transform_file.trim().is_empty() {
            return Err(RadiocalError::InvalidConfig(
                "cal_name and transform_file must not be empty".to_string(),
            ));
        }
        if !self.flat_dem_height.is_finite() {
            return Err(RadiocalError::InvalidConfig("flat_dem_height must be finite".to_string()));
        }
        Ok(())
    }
}

/// Per-scene processing states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SceneState {
    Discovered,
    GeometryParsed,
    DemSwapped,
    Calibrated,
    AuxCollected,
    DemRestored,
    PostProcessed,
    Done,
    Skipped,
    Failed,
}

/// What happened to one scene
#[derive(Debug, Clone, Serialize)]
pub struct SceneReport {
    pub root: String,
    /// States in the order they were entered
    pub states: Vec<SceneState>,
    pub geometry: Option<SceneGeometry>,
    pub calibrated: Vec<Polarization>,
    /// Polarizations whose output already existed
    pub skipped: Vec<Polarization>,
    pub outputs: Vec<PathBuf>,
    pub warnings: Vec<String>,
    pub error: Option<String>,
}

impl SceneReport {
    fn new(root: &str) -> Self {
        Self {
            root: root.to_string(),
            states: vec![SceneState::Discovered],
            geometry: None,
            calibrated: Vec::new(),
            skipped: Vec::new(),
            outputs: Vec::new(),
            warnings: Vec::new(),
            error: None,
        }
    }

    fn enter(&mut self, state: SceneState) {
        log::debug!("{}: {:?}", self.root, state);
        self.states.push(state);
    }

    fn warn(&mut self, message: String) {
        log::warn!("{}: {}", self.root, message);
        self.warnings.push(message);
    }

    /// Terminal (or latest) state
    pub fn outcome(&self) -> SceneState {
        self.states.last().copied().unwrap_or(SceneState::Discovered)
    }

    pub fn visited(&self, state: SceneState) -> bool {
        self.states.contains(&state)
    }
}

/// Result of a batch run
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub scenes: Vec<SceneReport>,
    /// Bounding box of every parsed scene's corners
    pub extent: Option<BoundingBox>,
    pub window: RunWindow,
}

impl BatchReport {
    pub fn count(&self, outcome: SceneState) -> usize {
        self.scenes.iter().filter(|s| s.outcome() == outcome).count()
    }
}

/// Drives scenes through calibration, geocoding and post-processing
pub struct CalibrationOrchestrator<R: CommandRunner> {
    params: BatchParams,
    runner: R,
}

impl<R: CommandRunner> CalibrationOrchestrator<R> {
    pub fn new(params: BatchParams, runner: R) -> RadiocalResult<Self> {
        params.validate()?;
        Ok(Self { params, runner })
    }

    pub fn params(&self) -> &BatchParams {
        &self.params
    }

    /// Every correction table must exist with the expected size before any scene starts
    pub fn validate_correction_tables(&self) -> RadiocalResult<()> {
        let lut = match &self.params.correction_lut {
            Some(lut) if self.params.run_correction => lut,
            _ => return Ok(()),
        };
        for &pol in &self.params.polarizations {
            let path = lut.path(pol);
            CalibrationSurface::read(&path, pol).map_err(|e| {
                RadiocalError::InvalidConfig(format!("correction table {}: {}", path.display(), e))
            })?;
        }
        log::info!("Using correction tables {}/caltbl_{}_*", lut.dir.display(), lut.name);
        Ok(())
    }

    pub fn discover(&self, data_dir: &Path) -> RadiocalResult<Vec<SceneFiles>> {
        discover_scenes(data_dir, self.params.scene_filter.as_deref())
    }

    /// Calibrate every scene in `data_dir`. Configuration problems fail the
    /// call before anything runs; scene problems are reported per scene.
    pub fn run_batch(&self, data_dir: &Path) -> RadiocalResult<BatchReport> {
        self.params.validate()?;
        self.validate_correction_tables()?;

        let started = Utc::now();
        let scenes = self.discover(data_dir)?;
        let pool = ScenePool::new(self.params.threads)?;
        log::info!(
            "Calibrating {} scene(s) with {} worker(s)",
            scenes.len(),
            pool.threads()
        );

        let reports = pool.map(&scenes, |scene| self.process_scene(scene));

        let extent = reports
            .iter()
            .filter_map(|r| r.geometry.as_ref())
            .map(|g| BoundingBox::from_corners(&g.corners))
            .reduce(|a, b| a.union(&b));
        if let Some(e) = &extent {
            log::info!(
                "Combined extent: lat {:.5}..{:.5}, lon {:.5}..{:.5}",
                e.min_lat,
                e.max_lat,
                e.min_lon,
                e.max_lon
            );
        }

        let report = BatchReport {
            scenes: reports,
            extent,
            window: RunWindow {
                started,
                finished: Utc::now(),
            },
        };
        log::info!(
            "Batch finished: {} done, {} skipped, {} failed",
            report.count(SceneState::Done),
            report.count(SceneState::Skipped),
            report.count(SceneState::Failed)
        );
        Ok(report)
    }

    /// Run one scene to a terminal state
    pub fn process_scene(&self, scene: &SceneFiles) -> SceneReport {
        log::info!("Processing scene {}", scene.annotation().display());
        let mut report = SceneReport::new(&scene.root);
        if let Err(e) = self.run_scene(scene, &mut report) {
            log::warn!("Scene {} failed: {}", scene.root, e);
            report.error = Some(e.to_string());
            report.enter(SceneState::Failed);
        }
        report
    }

    fn run_scene(&self, scene: &SceneFiles, report: &mut SceneReport) -> RadiocalResult<()> {
        let p = &self.params;
        let geometry = AnnotationReader::read_geometry(scene.annotation())?;
        report.geometry = Some(geometry.clone());
        report.enter(SceneState::GeometryParsed);

        let mut pending = Vec::new();
        for &pol in &p.polarizations {
            let grd = scene.grd(pol, &p.cal_name);
            if grd.exists() && !p.overwrite {
                log::info!("{} already exists -- skipping...", grd.display());
                report.skipped.push(pol);
            } else {
                pending.push(pol);
            }
        }
        if pending.is_empty() {
            report.enter(SceneState::Skipped);
            return Ok(());
        }

        if !p.run_correction {
            for &pol in &pending {
                let calibrate = self.calibration_invocation(scene, pol);
                let geocode = self.geocode_invocation(scene, &geometry, pol);
                log::info!("Would run: {}", calibrate.command_line());
                log::info!("Would run: {}", geocode.command_line());
            }
            report.enter(SceneState::Done);
            return Ok(());
        }

        let swap = if p.flat_dem {
            let dims = geometry.dimensions;
            let swap =
                DemSwap::engage(&scene.dem(), dims.grd_rows, dims.grd_cols, p.flat_dem_height)?;
            report.enter(SceneState::DemSwapped);
            Some(swap)
        } else {
            None
        };

        let calibrated = self.calibrate_and_collect(scene, &geometry, &pending, report);

        if let Some(swap) = swap {
            match swap.restore() {
                Ok(()) => report.enter(SceneState::DemRestored),
                Err(e) if calibrated.is_ok() => return Err(e),
                Err(e) => log::error!("Failed to restore DEM of {}: {}", scene.root, e),
            }
        }
        calibrated?;

        if p.post_process {
            self.post_process(scene, &geometry, report);
        }
        report.enter(SceneState::Done);
        Ok(())
    }

    /// `calib -u <trans> [-c <table>] -l <root>_look_temp -s <root>_slope_temp
    /// -m <root>_mask_temp <ann> <POL> <mlc>`
    pub fn calibration_invocation(&self, scene: &SceneFiles, pol: Polarization) -> Invocation {
        let p = &self.params;
        let mut invocation =
            Invocation::new(&p.calibration_program, &scene.dir).flag("-u", &p.transform_file);
        if let Some(lut) = &p.correction_lut {
            let table = lut.path(pol);
            let table = std::fs::canonicalize(&table).unwrap_or(table);
            invocation = invocation.flag("-c", table.display());
        }
        invocation
            .flag("-l", temp_name(scene, LOOK_TEMP))
            .flag("-s", temp_name(scene, SLOPE_TEMP))
            .flag("-m", temp_name(scene, MASK_TEMP))
            .arg(file_arg(&scene.annotation()))
            .arg(pol.product_code())
            .arg(file_arg(&scene.mlc(pol, &p.cal_name)))
    }

    /// `geocode <mlc> <mlc_cols> <trans> <grd> <grd_cols> <grd_rows>`
    pub fn geocode_invocation(
        &self,
        scene: &SceneFiles,
        geometry: &SceneGeometry,
        pol: Polarization,
    ) -> Invocation {
        let p = &self.params;
        self.geocode(
            scene,
            geometry,
            &file_arg(&scene.mlc(pol, &p.cal_name)),
            &scene.grd(pol, &p.cal_name),
        )
    }

    fn geocode(
        &self,
        scene: &SceneFiles,
        geometry: &SceneGeometry,
        input: &str,
        output: &Path,
    ) -> Invocation {
        let dims = geometry.dimensions;
        Invocation::new(&self.params.geocode_program, &scene.dir)
            .arg(input)
            .arg(dims.mlc_cols)
            .arg(&self.params.transform_file)
            .arg(file_arg(output))
            .arg(dims.grd_cols)
            .arg(dims.grd_rows)
    }

    fn calibrate_and_collect(
        &self,
        scene: &SceneFiles,
        geometry: &SceneGeometry,
        pending: &[Polarization],
        report: &mut SceneReport,
    ) -> RadiocalResult<()> {
        self.calibrate_polarizations(scene, geometry, pending, report)?;
        report.enter(SceneState::Calibrated);
        self.collect_auxiliary(scene, geometry, report)?;
        report.enter(SceneState::AuxCollected);
        Ok(())
    }

    fn calibrate_polarizations(
        &self,
        scene: &SceneFiles,
        geometry: &SceneGeometry,
        pending: &[Polarization],
        report: &mut SceneReport,
    ) -> RadiocalResult<()> {
        let p = &self.params;
        for &pol in pending {
            let mlc = scene.mlc(pol, &p.cal_name);
            let grd = scene.grd(pol, &p.cal_name);
            remove_stale(&[
                mlc.clone(),
                grd.clone(),
                scene.dir.join(temp_name(scene, LOOK_TEMP)),
                scene.dir.join(temp_name(scene, SLOPE_TEMP)),
                scene.dir.join(temp_name(scene, MASK_TEMP)),
            ])?;

            run_checked(&self.runner, &self.calibration_invocation(scene, pol))?;
            require_output(&mlc)?;

            run_checked(&self.runner, &self.geocode_invocation(scene, geometry, pol))?;
            require_output(&grd)?;

            EnviHeader::for_scene(geometry, pol, "calibrated ground range").write_for(&grd)?;
            log::info!("Calibrated {} -> {}", pol, grd.display());
            report.calibrated.push(pol);
            report.outputs.push(grd);
        }
        Ok(())
    }

    /// Materialize the scene-level auxiliary rasters left by the last calibration call
    fn collect_auxiliary(
        &self,
        scene: &SceneFiles,
        geometry: &SceneGeometry,
        report: &mut SceneReport,
    ) -> RadiocalResult<()> {
        let p = &self.params;

        if p.create_mask {
            let target = scene.mask();
            remove_stale(&[target.clone()])?;
            let mask_temp = temp_name(scene, MASK_TEMP);
            run_checked(&self.runner, &self.geocode(scene, geometry, &mask_temp, &target))?;
            require_output(&target)?;
            EnviHeader::for_auxiliary(geometry, "calibration mask").write_for(&target)?;
            report.outputs.push(target);
        }
        if p.create_slope {
            let temp = scene.dir.join(temp_name(scene, SLOPE_TEMP));
            report.outputs.push(promote(&temp, &scene.slope(), geometry, "range slope")?);
        }
        if p.create_look {
            let temp = scene.dir.join(temp_name(scene, LOOK_TEMP));
            report.outputs.push(promote(&temp, &scene.look(), geometry, "look angle")?);
        }
        Ok(())
    }

    /// Zero untrustworthy pixels of every newly calibrated raster. A failure
    /// here is recorded on the report; it does not fail the scene.
    fn post_process(&self, scene: &SceneFiles, geometry: &SceneGeometry, report: &mut SceneReport) {
        let dims = geometry.dimensions;
        let processor = PostProcessor::new(self.params.min_look, self.params.max_look);
        let mut all_ok = true;

        for pol in report.calibrated.clone() {
            let grd = scene.grd(pol, &self.params.cal_name);
            let result = processor.process_file(
                &grd,
                &scene.mask(),
                &scene.look(),
                dims.grd_rows,
                dims.grd_cols,
            );
            if let Err(e) = result {
                all_ok = false;
                report.warn(format!("post-processing {} skipped: {}", grd.display(), e));
            }
        }
        if all_ok {
            report.enter(SceneState::PostProcessed);
        }
    }
}

pub fn temp_name(scene: &SceneFiles, suffix: &str) -> String {
    format!("{}_{}", scene.root, suffix)
}

/// Programs run inside the scene directory, so files are passed by name
fn file_arg(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn remove_stale(paths: &[PathBuf]) -> RadiocalResult<()> {
    for path in paths {
        if path.exists() {
            log::debug!("Removing stale {}", path.display());
            std::fs::remove_file(path)?;
        }
    }
    Ok(())
}

fn require_output(path: &Path) -> RadiocalResult<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(RadiocalError::MissingOutput(path.to_path_buf()))
    }
}

fn promote(
    temp: &Path,
    target: &Path,
    geometry: &SceneGeometry,
    description: &str,
) -> RadiocalResult<PathBuf> {
    require_output(temp)?;
    std::fs::rename(temp, target)?;
    EnviHeader::for_auxiliary(geometry, description).write_for(target)?;
    Ok(target.to_path_buf())
}
