use crate::io::raster::{read_flat, FlatRasterEdit};
use crate::types::{RadiocalError, RadiocalResult};
use ndarray::{Array2, ArrayViewMut2, Zip};
use std::path::Path;

/// Pixel counts zeroed by each rule of a post-processing pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostProcessStats {
    pub masked: usize,
    pub non_finite: usize,
    pub look_out_of_range: usize,
}

impl PostProcessStats {
    pub fn total(&self) -> usize {
        self.masked + self.non_finite + self.look_out_of_range
    }
}

/// Zeroes pixels of a corrected ground-range raster that cannot be trusted:
/// flagged by the calibration mask, non-finite, or outside the look-angle range.
#[derive(Debug, Clone, Copy)]
pub struct PostProcessor {
    pub min_look: f64,
    pub max_look: f64,
}

impl PostProcessor {
    pub fn new(min_look: f64, max_look: f64) -> Self {
        Self { min_look, max_look }
    }

    pub fn apply(
        &self,
        mut data: ArrayViewMut2<f32>,
        mask: &Array2<f32>,
        look: &Array2<f32>,
    ) -> RadiocalResult<PostProcessStats> {
        if mask.dim() != data.dim() || look.dim() != data.dim() {
            return Err(RadiocalError::InvalidFormat(format!(
                "raster {:?}, mask {:?} and look {:?} differ in shape",
                data.dim(),
                mask.dim(),
                look.dim()
            )));
        }

        let mut stats = PostProcessStats::default();
        let (min_look, max_look) = (self.min_look, self.max_look);

        Zip::from(&mut data).and(mask).and(look).for_each(|v, &m, &l| {
            if m > 0.0 {
                stats.masked += 1;
                *v = 0.0;
            } else if !v.is_finite() {
                stats.non_finite += 1;
                *v = 0.0;
            } else if (l as f64) < min_look || (l as f64) > max_look {
                stats.look_out_of_range += 1;
                *v = 0.0;
            }
        });
        Ok(stats)
    }

    /// Post-process a flat float32 raster in place. The mask and look rasters
    /// must already exist next to it; a missing one is a `MissingOutput` error
    /// and leaves the raster untouched.
    pub fn process_file(
        &self,
        raster: &Path,
        mask: &Path,
        look: &Path,
        rows: usize,
        cols: usize,
    ) -> RadiocalResult<PostProcessStats> {
        for required in [mask, look] {
            if !required.exists() {
                return Err(RadiocalError::MissingOutput(required.to_path_buf()));
            }
        }
        let mask = read_flat::<f32, _>(mask, rows, cols)?;
        let look = read_flat::<f32, _>(look, rows, cols)?;

        let mut edit = FlatRasterEdit::open(raster, rows, cols)?;
        let stats = self.apply(edit.data.view_mut(), &mask, &look)?;
        edit.commit()?;

        log::info!(
            "Post-processed {}: {} masked, {} non-finite, {} outside look range",
            raster.display(),
            stats.masked,
            stats.non_finite,
            stats.look_out_of_range
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::raster::write_flat;
    use ndarray::array;

    #[test]
    fn test_masked_and_low_look_pixels_are_zeroed() {
        let mut data = array![[1.0f32, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let mask = array![[0.0f32, 0.0, 1.0], [0.0, 0.0, 0.0]];
        let look = array![[30.0f32, 30.0, 30.0], [20.0, 30.0, 30.0]];

        let stats = PostProcessor::new(25.0, 64.0)
            .apply(data.view_mut(), &mask, &look)
            .unwrap();

        assert_eq!(data, array![[1.0, 2.0, 0.0], [0.0, 5.0, 6.0]]);
        assert_eq!(stats.masked, 1);
        assert_eq!(stats.look_out_of_range, 1);
    }

    #[test]
    fn test_non_finite_and_high_look() {
        let mut data = array![[f32::NAN, f32::INFINITY, 1.0, 2.0]];
        let mask = Array2::zeros((1, 4));
        let look = array![[30.0f32, 30.0, 64.5, 64.0]];

        let stats = PostProcessor::new(25.0, 64.0)
            .apply(data.view_mut(), &mask, &look)
            .unwrap();
        assert_eq!(data, array![[0.0, 0.0, 0.0, 2.0]]);
        assert_eq!(stats.total(), 3);
    }

    #[test]
    fn test_process_file_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let grd = dir.path().join("scene_HVHV_area_veg.grd");
        let mask = dir.path().join("scene_mask.grd");
        let look = dir.path().join("scene_look.grd");
        write_flat(&grd, &array![[0.5f32, 0.6], [0.7, 0.8]]).unwrap();
        write_flat(&mask, &array![[0.0f32, 0.0], [0.0, 3.0]]).unwrap();
        write_flat(&look, &array![[70.0f32, 40.0], [40.0, 40.0]]).unwrap();

        PostProcessor::new(25.0, 64.0)
            .process_file(&grd, &mask, &look, 2, 2)
            .unwrap();
        let out: Array2<f32> = read_flat(&grd, 2, 2).unwrap();
        assert_eq!(out, array![[0.0, 0.6], [0.7, 0.0]]);
    }

    #[test]
    fn test_missing_look_raster() {
        let dir = tempfile::tempdir().unwrap();
        let grd = dir.path().join("scene_HHHH_area_veg.grd");
        let mask = dir.path().join("scene_mask.grd");
        write_flat(&grd, &array![[0.5f32]]).unwrap();
        write_flat(&mask, &array![[0.0f32]]).unwrap();

        let err = PostProcessor::new(25.0, 64.0)
            .process_file(&grd, &mask, &dir.path().join("scene_look.grd"), 1, 1)
            .unwrap_err();
        assert!(matches!(err, RadiocalError::MissingOutput(_)));
        assert_eq!(read_flat::<f32, _>(&grd, 1, 1).unwrap()[[0, 0]], 0.5);
    }
}
