//! Correction of the complex cross products by the geometric mean of the
//! correction applied to their real channels.
//!
//! For each real channel the per-pixel factor `corrected / uncorrected` is
//! derived from the area-only and the LUT-corrected rasters; a cross product
//! `A x B*` is then scaled by `sqrt(f_A * f_B)`. Every output keeps the
//! geotransform and projection of the scene's uncorrected real channels.

use crate::io::raster::{read_flat, write_flat, EnviHeader, RasterStore};
use crate::io::scene::SceneFiles;
use crate::types::{
    Polarization, RadiocalError, RadiocalResult, Raster, SarComplex, SarComplexImage,
    SarRealImage, NODATA_VALUE,
};
use ndarray::Zip;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Parameters for cross-product correction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeParams {
    /// Calibration name of the rasters the cross products were produced with
    pub uncorrected_name: String,
    /// Calibration name of the LUT-corrected real channels
    pub corrected_name: String,
    pub products: Vec<Polarization>,
    pub nodata: f32,
    /// Also write the real-channel factor rasters
    pub write_factors: bool,
}

impl Default for CompositeParams {
    fn default() -> Self {
        Self {
            uncorrected_name: "area_only".to_string(),
            corrected_name: "area_veg".to_string(),
            products: Polarization::COMPLEX.to_vec(),
            nodata: NODATA_VALUE,
            write_factors: true,
        }
    }
}

impl CompositeParams {
    pub fn validate(&self) -> RadiocalResult<()> {
        if let Some(pol) = self.products.iter().find(|p| !p.is_complex()) {
            return Err(RadiocalError::InvalidConfig(format!("{} is not a cross product", pol)));
        }
        if self.uncorrected_name == self.corrected_name {
            return Err(RadiocalError::InvalidConfig(
                "uncorrected and corrected calibration names are identical".to_string(),
            ));
        }
        Ok(())
    }
}

/// `corrected / uncorrected`; `nodata` where either input is nodata or
/// non-finite, or the uncorrected value is zero
pub fn correction_factor(
    uncorrected: &SarRealImage,
    corrected: &SarRealImage,
    nodata: f32,
) -> RadiocalResult<SarRealImage> {
    if uncorrected.dim() != corrected.dim() {
        return Err(RadiocalError::InvalidFormat(format!(
            "uncorrected {:?} and corrected {:?} differ in shape",
            uncorrected.dim(),
            corrected.dim()
        )));
    }
    Ok(Zip::from(uncorrected).and(corrected).map_collect(|&a, &b| {
        if a.is_finite() && b.is_finite() && a != 0.0 && a != nodata && b != nodata {
            b / a
        } else {
            nodata
        }
    }))
}

/// `C * sqrt(fa * fb)`; pixels where either factor is nodata or negative become `nodata + 0i`
pub fn composite_cross_product(
    product: &SarComplexImage,
    factor_a: &SarRealImage,
    factor_b: &SarRealImage,
    nodata: f32,
) -> RadiocalResult<SarComplexImage> {
    if product.dim() != factor_a.dim() || product.dim() != factor_b.dim() {
        return Err(RadiocalError::InvalidFormat(format!(
            "cross product {:?} and factors {:?}/{:?} differ in shape",
            product.dim(),
            factor_a.dim(),
            factor_b.dim()
        )));
    }
    let valid = |f: f32| f != nodata && f.is_finite() && f >= 0.0;
    Ok(Zip::from(product).and(factor_a).and(factor_b).map_collect(|&c, &fa, &fb| {
        if valid(fa) && valid(fb) {
            c * (fa * fb).sqrt()
        } else {
            SarComplex::new(nodata, 0.0)
        }
    }))
}

/// File-level cross-product correction for scenes on disk.
///
/// Real channels are loaded and factor rasters stored through the raster
/// store. The complex products are headerless float pairs, read and written
/// directly with an ENVI header copied from the channel's reference raster.
pub struct CrossPolCompositor<S: RasterStore> {
    params: CompositeParams,
    store: S,
}

impl<S: RasterStore> CrossPolCompositor<S> {
    pub fn new(params: CompositeParams, store: S) -> RadiocalResult<Self> {
        params.validate()?;
        Ok(Self { params, store })
    }

    /// Factor raster of one real channel, on the grid and in the projection
    /// of its uncorrected raster
    pub fn channel_factor(&self, scene: &SceneFiles, pol: Polarization) -> RadiocalResult<Raster> {
        let p = &self.params;
        let uncorrected = self.store.load(&scene.grd(pol, &p.uncorrected_name))?;
        let corrected = self.store.load(&scene.grd(pol, &p.corrected_name))?;
        let factor = correction_factor(&uncorrected.data, &corrected.data, p.nodata)?;
        Ok(Raster {
            nodata: Some(p.nodata as f64),
            ..uncorrected.with_data(factor)
        })
    }

    /// Correct every configured cross product of `scene`, writing into `out_dir`.
    /// Returns the paths of the written rasters.
    pub fn correct_scene(
        &self,
        scene: &SceneFiles,
        out_dir: &Path,
    ) -> RadiocalResult<Vec<PathBuf>> {
        let p = &self.params;
        std::fs::create_dir_all(out_dir)?;

        let mut factors: BTreeMap<Polarization, Raster> = BTreeMap::new();
        let mut written = Vec::new();

        for &product in &p.products {
            let (a, b) = product.cross_product_factors().ok_or_else(|| {
                RadiocalError::InvalidConfig(format!("{} is not a cross product", product))
            })?;

            for pol in [a, b] {
                if factors.contains_key(&pol) {
                    continue;
                }
                let factor = self.channel_factor(scene, pol)?;
                if p.write_factors {
                    let name = format!("{}_{}_factor.grd", scene.root, pol.product_code());
                    let path = out_dir.join(name);
                    self.store.store(&path, &factor)?;
                    written.push(path);
                }
                factors.insert(pol, factor);
            }

            let (fa, fb) = match (factors.get(&a), factors.get(&b)) {
                (Some(fa), Some(fb)) => (fa, fb),
                _ => {
                    return Err(RadiocalError::Processing(format!(
                        "missing correction factor for {}",
                        product
                    )))
                }
            };
            let (rows, cols) = fa.data.dim();
            let source = scene.grd(product, &p.uncorrected_name);
            let cross = read_flat::<SarComplex, _>(&source, rows, cols)?;
            let corrected = composite_cross_product(&cross, &fa.data, &fb.data, p.nodata)?;

            let target = out_dir.join(format!(
                "{}_{}_{}.grd",
                scene.root,
                product.product_code(),
                p.corrected_name
            ));
            write_flat(&target, &corrected)?;
            EnviHeader::for_raster(fa, product, "geometric mean corrected").write_for(&target)?;
            log::info!("Wrote geometric mean correction: {}", target.display());
            written.push(target);
        }

        Ok(written)
    }
}
