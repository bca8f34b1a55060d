//! Correction table construction from area-corrected scenes.
//!
//! Samples are selected per scene with one inclusion mask shared by every
//! polarization, binned by range slope and look angle, averaged, smoothed and
//! extrapolated along the look axis. Each scene is binned into its own
//! accumulators on the scene pool, one chunk of scenes per round; the
//! per-scene accumulators are then summed on the calling thread, so memory
//! is bounded by the bin grid times the worker count.

use crate::core::lut::{
    look_bin, slope_bin, CalibrationSurface, LutLocation, LOOK_BINS, SLOPE_BINS,
};
use crate::core::pool::ScenePool;
use crate::core::smoothing::{
    smooth_profile_with_edges, ProfileSmoother, SmoothingParams, SurfaceSmoother,
};
use crate::io::raster::RasterStore;
use crate::io::scene::SceneFiles;
use crate::types::{Polarization, RadiocalError, RadiocalResult};
use ndarray::{s, Array1, Array2, Axis, Zip};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Parameters for correction table creation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LutParams {
    /// Channels to build tables for
    pub polarizations: Vec<Polarization>,
    /// Channel whose backscatter decides the cutoff mask for all channels
    pub reference_polarization: Polarization,
    /// Calibration name of the input rasters, usually the area-only correction
    pub correction_name: String,
    /// Land-cover mask values of pixels to use
    pub allowed_classes: Vec<f64>,
    /// Backscatter bounds (exclusive) on the reference channel, linear units
    pub min_cutoff: f64,
    pub max_cutoff: f64,
    /// Look-angle bounds (exclusive) in degrees
    pub min_look: f64,
    pub max_look: f64,
    /// Data was processed with a flat DEM: no range-slope information
    pub flat_slope: bool,
    /// Apply the Savitzky-Golay filter to the averaged table
    pub smooth: bool,
    pub smoothing: SmoothingParams,
    /// Bins with fewer samples are void
    pub min_samples: u64,
}

impl Default for LutParams {
    fn default() -> Self {
        Self {
            polarizations: Polarization::REAL.to_vec(),
            reference_polarization: Polarization::HV,
            correction_name: "area_only".to_string(),
            allowed_classes: vec![1.0],
            min_cutoff: 0.0,
            max_cutoff: f64::INFINITY,
            min_look: 22.0,
            max_look: 65.0,
            flat_slope: false,
            smooth: true,
            smoothing: SmoothingParams::default(),
            min_samples: 1,
        }
    }
}

impl LutParams {
    pub fn validate(&self) -> RadiocalResult<()> {
        if self.polarizations.is_empty() {
            return Err(RadiocalError::InvalidConfig("no polarizations requested".to_string()));
        }
        if let Some(pol) = self
            .polarizations
            .iter()
            .chain(std::iter::once(&self.reference_polarization))
            .find(|p| p.is_complex())
        {
            return Err(RadiocalError::InvalidConfig(format!(
                "correction tables are built for real channels only, got {}",
                pol
            )));
        }
        if self.allowed_classes.is_empty() {
            return Err(RadiocalError::InvalidConfig("allowed_classes is empty".to_string()));
        }
        if !(self.min_look >= 0.0 && self.min_look < self.max_look && self.max_look <= 90.0) {
            return Err(RadiocalError::InvalidConfig(format!(
                "look-angle range {}..{} must satisfy 0 <= min < max <= 90",
                self.min_look, self.max_look
            )));
        }
        if !(self.min_cutoff < self.max_cutoff) {
            return Err(RadiocalError::InvalidConfig(format!(
                "backscatter cutoff {}..{} is empty",
                self.min_cutoff, self.max_cutoff
            )));
        }
        Ok(())
    }

    /// Pixel selection shared by all polarizations of a scene
    pub fn includes(&self, class: f32, look: f32, reference: f32) -> bool {
        let (look, reference) = (look as f64, reference as f64);
        self.allowed_classes.iter().any(|&c| c == class as f64)
            && look > self.min_look
            && look < self.max_look
            && reference.is_finite()
            && reference > self.min_cutoff
            && reference < self.max_cutoff
    }
}

/// Per-bin sums and sample counts for one polarization, `[slope_bin, look_bin]`
#[derive(Debug, Clone)]
pub struct AccumulatorPair {
    pub sum: Array2<f64>,
    pub count: Array2<u64>,
}

impl Default for AccumulatorPair {
    fn default() -> Self {
        Self::new()
    }
}

impl AccumulatorPair {
    pub fn new() -> Self {
        Self {
            sum: Array2::zeros((SLOPE_BINS, LOOK_BINS)),
            count: Array2::zeros((SLOPE_BINS, LOOK_BINS)),
        }
    }

    pub fn add(&mut self, slope_bin: usize, look_bin: usize, sum: f64, count: u64) {
        self.sum[[slope_bin, look_bin]] += sum;
        self.count[[slope_bin, look_bin]] += count;
    }

    /// Add a slope-independent look-angle marginal to every slope row
    pub fn add_profile(&mut self, sum: &Array1<f64>, count: &Array1<u64>) {
        for mut row in self.sum.rows_mut() {
            row += sum;
        }
        for mut row in self.count.rows_mut() {
            row += count;
        }
    }

    /// Add another accumulator's sums and counts bin by bin
    pub fn merge(&mut self, other: &AccumulatorPair) {
        self.sum += &other.sum;
        self.count += &other.count;
    }

    pub fn total_count(&self) -> u64 {
        self.count.sum()
    }
}

/// Selected pixels of one scene, one value vector per polarization aligned
/// with the look (and slope) vectors
#[derive(Debug, Clone)]
pub struct SceneSamples {
    pub root: String,
    pub look: Vec<f32>,
    pub slope: Option<Vec<f32>>,
    pub values: BTreeMap<Polarization, Vec<f32>>,
}

impl SceneSamples {
    pub fn len(&self) -> usize {
        self.look.len()
    }

    pub fn is_empty(&self) -> bool {
        self.look.is_empty()
    }
}

enum TableSmoother {
    Surface(SurfaceSmoother),
    Profile(ProfileSmoother),
}

/// Builds calibration surfaces from scenes on disk
pub struct LutBuilder<S: RasterStore> {
    params: LutParams,
    store: S,
    smoother: Option<TableSmoother>,
}

impl<S: RasterStore> LutBuilder<S> {
    /// Validates parameters and prepares the smoothing kernel up front
    pub fn new(params: LutParams, store: S) -> RadiocalResult<Self> {
        params.validate()?;
        let smoother = if !params.smooth {
            None
        } else if params.flat_slope {
            let profile = ProfileSmoother::new(params.smoothing)?;
            if profile.window() > LOOK_BINS {
                return Err(RadiocalError::InvalidConfig(format!(
                    "window size {} exceeds the {} look-angle bins",
                    profile.window(),
                    LOOK_BINS
                )));
            }
            Some(TableSmoother::Profile(profile))
        } else {
            Some(TableSmoother::Surface(SurfaceSmoother::new(params.smoothing)?))
        };
        Ok(Self { params, store, smoother })
    }

    pub fn params(&self) -> &LutParams {
        &self.params
    }

    /// Build one surface per requested polarization.
    ///
    /// `masks[i]` is the land-cover raster of `scenes[i]`; relative paths are
    /// resolved against `data_dir`. A scene whose rasters cannot be read is
    /// skipped with a warning.
    pub fn build(
        &self,
        data_dir: &Path,
        scenes: &[String],
        masks: &[PathBuf],
        pool: &ScenePool,
    ) -> RadiocalResult<Vec<CalibrationSurface>> {
        if scenes.len() != masks.len() {
            return Err(RadiocalError::InvalidConfig(format!(
                "{} scenes but {} land-cover masks",
                scenes.len(),
                masks.len()
            )));
        }
        if scenes.is_empty() {
            return Err(RadiocalError::InvalidConfig(
                "no scenes given for LUT creation".to_string(),
            ));
        }

        let inputs: Vec<(SceneFiles, PathBuf)> = scenes
            .iter()
            .zip(masks)
            .map(|(root, mask)| (SceneFiles::from_root(data_dir, root), data_dir.join(mask)))
            .collect();

        let mut totals: BTreeMap<Polarization, AccumulatorPair> = self
            .params
            .polarizations
            .iter()
            .map(|&pol| (pol, AccumulatorPair::new()))
            .collect();
        let mut used = 0usize;

        for chunk in inputs.chunks(pool.threads().max(1)) {
            let binned = pool.map(chunk, |(scene, mask)| self.scene_accumulators(scene, mask));
            for ((scene, _), result) in chunk.iter().zip(binned) {
                match result {
                    Ok(partial) => {
                        for (pol, acc) in &partial {
                            if let Some(total) = totals.get_mut(pol) {
                                total.merge(acc);
                            }
                        }
                        used += 1;
                    }
                    Err(e) => log::warn!("Skipping scene {} in LUT creation: {}", scene.root, e),
                }
            }
        }

        log::info!("Finalizing look up tables from {} scene(s)...", used);
        totals
            .iter()
            .map(|(&pol, acc)| {
                log::debug!("{} LUT accumulated {} samples", pol, acc.total_count());
                self.finalize(pol, acc)
            })
            .collect()
    }

    /// `build`, then write every surface under `location`
    pub fn build_and_write(
        &self,
        data_dir: &Path,
        scenes: &[String],
        masks: &[PathBuf],
        location: &LutLocation,
        pool: &ScenePool,
    ) -> RadiocalResult<Vec<PathBuf>> {
        self.build(data_dir, scenes, masks, pool)?
            .iter()
            .map(|surface| surface.write(location))
            .collect()
    }

    /// Bin one scene into fresh accumulators, one per polarization. The
    /// selected pixels are released before returning.
    pub fn scene_accumulators(
        &self,
        scene: &SceneFiles,
        mask_path: &Path,
    ) -> RadiocalResult<BTreeMap<Polarization, AccumulatorPair>> {
        let samples = self.scene_samples(scene, mask_path)?;
        Ok(self.accumulate(std::slice::from_ref(&samples)))
    }

    /// Load a scene's rasters and keep the pixels passing the inclusion mask
    pub fn scene_samples(
        &self,
        scene: &SceneFiles,
        mask_path: &Path,
    ) -> RadiocalResult<SceneSamples> {
        let p = &self.params;

        let classes = self.store.load(mask_path)?.data;
        let shape = classes.dim();
        let load = |path: PathBuf| -> RadiocalResult<Array2<f32>> {
            let data = self.store.load(&path)?.data;
            if data.dim() != shape {
                return Err(RadiocalError::InvalidFormat(format!(
                    "{} is {:?}, land-cover mask is {:?}",
                    path.display(),
                    data.dim(),
                    shape
                )));
            }
            Ok(data)
        };

        let look = load(scene.look())?;
        let reference = load(scene.grd(p.reference_polarization, &p.correction_name))?;

        let include = Zip::from(&classes)
            .and(&look)
            .and(&reference)
            .map_collect(|&class, &look, &reference| p.includes(class, look, reference));
        drop(reference);

        let selected = |data: &Array2<f32>| -> Vec<f32> {
            data.iter()
                .zip(include.iter())
                .filter(|(_, &keep)| keep)
                .map(|(&v, _)| v)
                .collect()
        };

        let slope = if p.flat_slope {
            None
        } else {
            Some(selected(&load(scene.slope())?))
        };

        let mut values = BTreeMap::new();
        for &pol in &p.polarizations {
            let path = scene.grd(pol, &p.correction_name);
            log::info!("Processing {} ...", path.display());
            values.insert(pol, selected(&load(path)?));
        }

        let samples = SceneSamples {
            root: scene.root.clone(),
            look: selected(&look),
            slope,
            values,
        };
        log::debug!(
            "{}: {} of {} pixels selected",
            scene.root,
            samples.len(),
            shape.0 * shape.1
        );
        Ok(samples)
    }

    /// Reduce all scenes' samples into one accumulator per polarization
    pub fn accumulate(&self, samples: &[SceneSamples]) -> BTreeMap<Polarization, AccumulatorPair> {
        let mut accumulators = BTreeMap::new();
        for &pol in &self.params.polarizations {
            let mut acc = AccumulatorPair::new();
            for scene in samples {
                self.contribute(&mut acc, scene, pol);
            }
            accumulators.insert(pol, acc);
        }
        accumulators
    }

    fn contribute(&self, acc: &mut AccumulatorPair, scene: &SceneSamples, pol: Polarization) {
        let values = match scene.values.get(&pol) {
            Some(v) => v,
            None => return,
        };
        let mut dropped = 0usize;

        match &scene.slope {
            None => {
                let mut sum = Array1::<f64>::zeros(LOOK_BINS);
                let mut count = Array1::<u64>::zeros(LOOK_BINS);
                for (&value, &look) in values.iter().zip(&scene.look) {
                    match look_bin(look as f64) {
                        Some(lb) if value.is_finite() => {
                            sum[lb] += value as f64;
                            count[lb] += 1;
                        }
                        _ => dropped += 1,
                    }
                }
                acc.add_profile(&sum, &count);
            }
            Some(slope) => {
                for ((&value, &look), &slope) in values.iter().zip(&scene.look).zip(slope) {
                    match (slope_bin(slope as f64), look_bin(look as f64)) {
                        (Some(sb), Some(lb)) if value.is_finite() => {
                            acc.add(sb, lb, value as f64, 1)
                        }
                        _ => dropped += 1,
                    }
                }
            }
        }

        if dropped > 0 {
            log::debug!(
                "{} {}: {} samples outside the table or non-finite",
                scene.root,
                pol,
                dropped
            );
        }
    }

    /// Cells that end up void. Flat tables repeat the marginal into every
    /// slope row, so the threshold applies to the column total.
    fn below_threshold(&self, acc: &AccumulatorPair) -> Array2<bool> {
        let min = self.params.min_samples;
        if self.params.flat_slope {
            let rows = acc.count.nrows() as u64;
            let totals = acc.count.sum_axis(Axis(0));
            Array2::from_shape_fn(acc.count.dim(), |(_, c)| totals[c] < min.saturating_mul(rows))
        } else {
            acc.count.mapv(|c| c < min)
        }
    }

    /// Average, void, smooth and extrapolate one polarization's bins
    pub fn finalize(
        &self,
        pol: Polarization,
        acc: &AccumulatorPair,
    ) -> RadiocalResult<CalibrationSurface> {
        let void = self.below_threshold(acc);
        let mut lut = Zip::from(&acc.sum)
            .and(&acc.count)
            .map_collect(|&sum, &count| sum / count.max(1) as f64);
        zero_where(&mut lut, &void);

        match &self.smoother {
            Some(TableSmoother::Surface(smoother)) => {
                lut = smoother.smooth(&lut)?;
                zero_where(&mut lut, &void);
            }
            Some(TableSmoother::Profile(smoother)) => {
                let profile = lut.row(0).to_owned();
                let counts = acc.count.row(0).to_owned();
                let min = self.params.min_samples;
                let (smoothed, range) =
                    smooth_profile_with_edges(&profile, &counts, min, smoother)?;
                if range.is_none() {
                    log::warn!("{} LUT has no populated look-angle bins", pol);
                }
                for mut row in lut.rows_mut() {
                    row.assign(&smoothed);
                }
            }
            None => {}
        }

        extrapolate_look_edges(&mut lut, self.params.min_look, self.params.max_look);

        let surface = CalibrationSurface::new(pol, lut.mapv(|v| v as f32))?;
        if surface.is_empty() {
            log::warn!(
                "Generated {} LUT appears to be empty. Does the mask contain enough pixels? \
                 Are min_cutoff, max_cutoff, min_look, max_look and min_samples reasonable?",
                pol
            );
        }
        Ok(surface)
    }
}

fn zero_where(lut: &mut Array2<f64>, void: &Array2<bool>) {
    Zip::from(lut).and(void).for_each(|v, &is_void| {
        if is_void {
            *v = 0.0;
        }
    });
}

/// Copy the boundary columns of the look-angle operating range outward
pub fn extrapolate_look_edges(lut: &mut Array2<f64>, min_look: f64, max_look: f64) {
    let last = lut.ncols().saturating_sub(1);
    let low = look_bin(min_look).unwrap_or(0).min(last);
    let high = look_bin(max_look).unwrap_or(last).min(last);

    for mut row in lut.rows_mut() {
        let (low_value, high_value) = (row[low], row[high]);
        row.slice_mut(s![..low]).fill(low_value);
        row.slice_mut(s![high + 1..]).fill(high_value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Raster;
    use approx::assert_abs_diff_eq;

    struct NoRasters;

    impl RasterStore for NoRasters {
        fn load(&self, path: &Path) -> RadiocalResult<Raster> {
            Err(RadiocalError::MissingOutput(path.to_path_buf()))
        }

        fn store(&self, _path: &Path, _raster: &Raster) -> RadiocalResult<()> {
            Ok(())
        }
    }

    fn builder(params: LutParams) -> LutBuilder<NoRasters> {
        LutBuilder::new(params, NoRasters).unwrap()
    }

    fn unsmoothed(min_samples: u64) -> LutParams {
        LutParams {
            smooth: false,
            min_samples,
            min_look: 0.0,
            max_look: 90.0,
            ..LutParams::default()
        }
    }

    #[test]
    fn test_bin_below_threshold_is_void() {
        let mut acc = AccumulatorPair::new();
        acc.add(5, 10, 20.0, 4);
        let surface = builder(unsmoothed(5)).finalize(Polarization::HH, &acc).unwrap();
        assert_eq!(surface.values[[5, 10]], 0.0);
    }

    #[test]
    fn test_bin_at_threshold_is_averaged() {
        let mut acc = AccumulatorPair::new();
        acc.add(5, 10, 30.0, 10);
        let surface = builder(unsmoothed(5)).finalize(Polarization::HH, &acc).unwrap();
        assert_eq!(surface.values[[5, 10]], 3.0);
    }

    #[test]
    fn test_sparse_cells_are_exactly_zero() {
        let mut acc = AccumulatorPair::new();
        acc.add(100, 300, 7.0, 2);
        acc.add(101, 300, 9.0, 3);
        acc.add(102, 300, 12.0, 4);
        let surface = builder(unsmoothed(3)).finalize(Polarization::VV, &acc).unwrap();
        assert_eq!(surface.values[[100, 300]], 0.0);
        assert_eq!(surface.values[[101, 300]], 3.0);
        assert_eq!(surface.values[[102, 300]], 3.0);
        // empty bins never divide by zero
        assert!(surface.values.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_look_edges_extrapolated_for_every_row() {
        let mut acc = AccumulatorPair::new();
        acc.add(100, 250, 2.0, 1);
        acc.add(100, 450, 4.0, 1);
        acc.add(700, 300, 1.0, 1);
        let params = LutParams {
            min_look: 25.0,
            max_look: 45.0,
            ..unsmoothed(1)
        };
        let surface = builder(params).finalize(Polarization::HV, &acc).unwrap();
        let v = &surface.values;

        for row in 0..SLOPE_BINS {
            for col in 0..250 {
                assert_eq!(v[[row, col]], v[[row, 250]]);
            }
            for col in 451..LOOK_BINS {
                assert_eq!(v[[row, col]], v[[row, 450]]);
            }
        }
        assert_eq!(v[[100, 0]], 2.0);
        assert_eq!(v[[100, 899]], 4.0);
        assert_eq!(v[[700, 300]], 1.0);
        assert_eq!(v[[700, 0]], 0.0);
    }

    #[test]
    fn test_smoothed_table_keeps_voids_and_constant_interior() {
        let mut acc = AccumulatorPair::new();
        for row in 200..500 {
            for col in 200..700 {
                acc.add(row, col, 20.0, 10);
            }
        }
        // below min_samples once the block is re-binned
        acc.count[[350, 400]] = 2;
        acc.sum[[350, 400]] = 4.0;

        let params = LutParams {
            min_samples: 5,
            ..LutParams::default()
        };
        let surface = builder(params).finalize(Polarization::HH, &acc).unwrap();
        let v = &surface.values;

        assert_eq!(v[[350, 400]], 0.0);
        assert_eq!(v[[100, 400]], 0.0);
        // full 51x51 window inside the block
        assert_abs_diff_eq!(v[[250, 300]], 2.0, epsilon = 1e-5);
        assert_abs_diff_eq!(v[[460, 600]], 2.0, epsilon = 1e-5);

        for row in [0, 250, 499, SLOPE_BINS - 1] {
            for col in 0..220 {
                assert_eq!(v[[row, col]], v[[row, 220]]);
            }
            for col in 651..LOOK_BINS {
                assert_eq!(v[[row, col]], v[[row, 650]]);
            }
        }
        assert!(v[[250, 220]] != 0.0);
    }

    #[test]
    fn test_flat_threshold_saturates() {
        let mut sum = Array1::zeros(LOOK_BINS);
        let mut count = Array1::zeros(LOOK_BINS);
        sum[300] = 50.0;
        count[300] = 100;
        let mut acc = AccumulatorPair::new();
        acc.add_profile(&sum, &count);

        let params = LutParams {
            flat_slope: true,
            ..unsmoothed(u64::MAX)
        };
        let surface = builder(params).finalize(Polarization::HH, &acc).unwrap();
        assert!(surface.is_empty());
    }

    #[test]
    fn test_merge_adds_bins() {
        let mut a = AccumulatorPair::new();
        a.add(5, 10, 2.0, 1);
        let mut b = AccumulatorPair::new();
        b.add(5, 10, 4.0, 3);
        b.add(6, 10, 1.0, 1);
        a.merge(&b);
        assert_eq!(a.sum[[5, 10]], 6.0);
        assert_eq!(a.count[[5, 10]], 4);
        assert_eq!(a.count[[6, 10]], 1);
        assert_eq!(a.total_count(), 5);
    }

    #[test]
    fn test_flat_rows_are_identical() {
        let mut sum = Array1::zeros(LOOK_BINS);
        let mut count = Array1::zeros(LOOK_BINS);
        for bin in 300..400 {
            sum[bin] = 0.1 * bin as f64;
            count[bin] = 2;
        }
        count[350] = 1;
        let mut acc = AccumulatorPair::new();
        acc.add_profile(&sum, &count);

        let params = LutParams {
            flat_slope: true,
            ..unsmoothed(2)
        };
        let surface = builder(params).finalize(Polarization::HH, &acc).unwrap();
        let first = surface.values.row(0).to_owned();
        for row in surface.values.rows() {
            assert_eq!(row, first);
        }
        assert_eq!(first[350], 0.0);
        assert_abs_diff_eq!(first[320], 16.0, epsilon = 1e-4);
    }

    #[test]
    fn test_flat_smoothing_keeps_plateau_to_data_edges() {
        let mut sum = Array1::zeros(LOOK_BINS);
        let mut count = Array1::zeros(LOOK_BINS);
        for bin in 230..600 {
            sum[bin] = 15.0;
            count[bin] = 10;
        }
        let mut acc = AccumulatorPair::new();
        acc.add_profile(&sum, &count);

        let params = LutParams {
            flat_slope: true,
            ..LutParams::default()
        };
        let surface = builder(params).finalize(Polarization::HV, &acc).unwrap();
        let v = &surface.values;
        for col in 230..600 {
            assert_abs_diff_eq!(v[[0, col]], 1.5, epsilon = 1e-5);
            assert_abs_diff_eq!(v[[899, col]], 1.5, epsilon = 1e-5);
        }
        // below min_look the boundary column is copied outward
        assert_abs_diff_eq!(v[[450, 100]], v[[450, 220]], epsilon = 1e-6);
        // populated range ended at 600; void bins stay zero up to max_look
        assert_eq!(v[[10, 620]], 0.0);
        assert_eq!(v[[10, 800]], 0.0);
    }

    #[test]
    fn test_inclusion_mask() {
        let params = LutParams {
            allowed_classes: vec![15.0, 18.0],
            min_cutoff: 0.0,
            max_cutoff: 1.0,
            ..LutParams::default()
        };
        assert!(params.includes(15.0, 30.0, 0.2));
        assert!(params.includes(18.0, 64.9, 0.2));
        assert!(!params.includes(16.0, 30.0, 0.2));
        assert!(!params.includes(15.0, 22.0, 0.2));
        assert!(!params.includes(15.0, 65.0, 0.2));
        assert!(!params.includes(15.0, 30.0, 0.0));
        assert!(!params.includes(15.0, 30.0, f32::NAN));
        assert!(!params.includes(15.0, f32::NAN, 0.2));
    }

    #[test]
    fn test_invalid_parameters_fail_fast() {
        let even_window = LutParams {
            smoothing: SmoothingParams { window_size: 50, order: 3 },
            ..LutParams::default()
        };
        assert!(LutBuilder::new(even_window, NoRasters).is_err());

        let inverted_look = LutParams {
            min_look: 60.0,
            max_look: 30.0,
            ..LutParams::default()
        };
        assert!(LutBuilder::new(inverted_look, NoRasters).is_err());

        let complex = LutParams {
            polarizations: vec![Polarization::HHVV],
            ..LutParams::default()
        };
        assert!(LutBuilder::new(complex, NoRasters).is_err());
    }

    #[test]
    fn test_mismatched_scene_and_mask_lists() {
        let b = builder(LutParams::default());
        let pool = ScenePool::new(Some(1)).unwrap();
        let err = b
            .build(
                Path::new("/data"),
                &["a".to_string(), "b".to_string()],
                &[PathBuf::from("a.tif")],
                &pool,
            )
            .unwrap_err();
        assert!(matches!(err, RadiocalError::InvalidConfig(_)));
    }

    #[test]
    fn test_unreadable_scenes_give_empty_tables() {
        let b = builder(unsmoothed(1));
        let pool = ScenePool::new(Some(2)).unwrap();
        let surfaces = b
            .build(Path::new("/nowhere"), &["a".to_string()], &[PathBuf::from("a_mask.tif")], &pool)
            .unwrap();
        assert_eq!(surfaces.len(), 3);
        assert!(surfaces.iter().all(|s| s.is_empty()));
    }
}
