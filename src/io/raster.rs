use crate::types::{
    GeoTransform, Polarization, RadiocalError, RadiocalResult, Raster, SceneGeometry, NODATA_VALUE,
};
use bytemuck::{Pod, Zeroable};
use gdal::raster::Buffer;
use gdal::{Dataset, DriverManager};
use ndarray::Array2;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Load/store boundary for geocoded rasters
pub trait RasterStore: Send + Sync {
    /// Load band 1 of a raster with its nodata value, geotransform and projection
    fn load(&self, path: &Path) -> RadiocalResult<Raster>;

    /// Write a single-band raster carrying the given geospatial metadata
    fn store(&self, path: &Path, raster: &Raster) -> RadiocalResult<()>;
}

/// GDAL-backed raster store. Flat UAVSAR `.grd` files are readable through
/// their ENVI `.hdr` sidecar; new rasters are written with the ENVI driver.
pub struct GdalRasterStore {
    driver_name: String,
}

impl Default for GdalRasterStore {
    fn default() -> Self {
        Self {
            driver_name: "ENVI".to_string(),
        }
    }
}

impl GdalRasterStore {
    pub fn with_driver(driver_name: &str) -> Self {
        Self {
            driver_name: driver_name.to_string(),
        }
    }
}

impl RasterStore for GdalRasterStore {
    fn load(&self, path: &Path) -> RadiocalResult<Raster> {
        log::debug!("Loading raster {}", path.display());

        let dataset = Dataset::open(path)?;
        let (width, height) = dataset.raster_size();
        let rasterband = dataset.rasterband(1)?;
        let band_data = rasterband.read_as::<f32>((0, 0), (width, height), (width, height), None)?;

        let data = Array2::from_shape_vec((height, width), band_data.data)
            .map_err(|e| {
                RadiocalError::Processing(format!("Failed to reshape raster data: {}", e))
            })?;

        let projection = dataset.projection();
        Ok(Raster {
            data,
            nodata: rasterband.no_data_value(),
            geo_transform: dataset.geo_transform().ok().map(GeoTransform::from_gdal),
            projection: if projection.is_empty() { None } else { Some(projection) },
        })
    }

    fn store(&self, path: &Path, raster: &Raster) -> RadiocalResult<()> {
        log::info!("Writing raster {}", path.display());

        let driver = DriverManager::get_driver_by_name(&self.driver_name)?;
        let (height, width) = raster.data.dim();

        let mut dataset = driver.create_with_band_type::<f32, _>(
            path,
            width as isize,
            height as isize,
            1,
        )?;

        if let Some(transform) = &raster.geo_transform {
            dataset.set_geo_transform(&transform.to_gdal())?;
        }
        if let Some(projection) = &raster.projection {
            dataset.set_projection(projection)?;
        }

        let mut rasterband = dataset.rasterband(1)?;
        let flat_data: Vec<f32> = raster.data.iter().cloned().collect();
        let buffer = Buffer::new((width, height), flat_data);
        rasterband.write((0, 0), (width, height), &buffer)?;

        if let Some(nodata) = raster.nodata {
            rasterband.set_no_data_value(Some(nodata))?;
        }

        Ok(())
    }
}

fn expected_len<T>(path: &Path, file_len: u64, rows: usize, cols: usize) -> RadiocalResult<()> {
    let expected = (rows * cols * std::mem::size_of::<T>()) as u64;
    if file_len != expected {
        return Err(RadiocalError::InvalidFormat(format!(
            "{} holds {} bytes, expected {} for a {}x{} grid",
            path.display(),
            file_len,
            expected,
            rows,
            cols
        )));
    }
    Ok(())
}

/// Read a headerless little-endian raster of known shape
pub fn read_flat<T: Pod + Zeroable, P: AsRef<Path>>(
    path: P,
    rows: usize,
    cols: usize,
) -> RadiocalResult<Array2<T>> {
    let path = path.as_ref();
    let mut file = File::open(path)?;
    expected_len::<T>(path, file.metadata()?.len(), rows, cols)?;

    let mut values = vec![T::zeroed(); rows * cols];
    file.read_exact(bytemuck::cast_slice_mut(&mut values))?;

    Array2::from_shape_vec((rows, cols), values)
        .map_err(|e| RadiocalError::Processing(format!("Shape error: {}", e)))
}

/// Write a headerless raster in row-major order
pub fn write_flat<T: Pod, P: AsRef<Path>>(path: P, data: &Array2<T>) -> RadiocalResult<()> {
    let standard = data.as_standard_layout();
    let values = standard
        .as_slice()
        .ok_or_else(|| RadiocalError::Processing("Raster is not contiguous".to_string()))?;
    let mut file = File::create(path.as_ref())?;
    file.write_all(bytemuck::cast_slice(values))?;
    file.sync_all()?;
    Ok(())
}

/// A flat raster opened for in-place modification.
///
/// The pixel buffer is written back and synced only by `commit`; dropping the
/// handle without committing leaves the file untouched. The file handle is
/// released when the value goes out of scope on every path.
pub struct FlatRasterEdit {
    path: PathBuf,
    file: File,
    pub data: Array2<f32>,
}

impl FlatRasterEdit {
    pub fn open<P: AsRef<Path>>(path: P, rows: usize, cols: usize) -> RadiocalResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
        expected_len::<f32>(&path, file.metadata()?.len(), rows, cols)?;

        let mut values = vec![0f32; rows * cols];
        file.read_exact(bytemuck::cast_slice_mut(&mut values))?;
        let data = Array2::from_shape_vec((rows, cols), values)
            .map_err(|e| RadiocalError::Processing(format!("Shape error: {}", e)))?;

        Ok(Self { path, file, data })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn commit(mut self) -> RadiocalResult<()> {
        let values = self
            .data
            .as_slice()
            .ok_or_else(|| RadiocalError::Processing("Raster is not contiguous".to_string()))?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(bytemuck::cast_slice(values))?;
        self.file.sync_all()?;
        log::debug!("Committed in-place edit of {}", self.path.display());
        Ok(())
    }
}

/// ENVI sidecar header for a flat ground-range raster
#[derive(Debug, Clone)]
pub struct EnviHeader {
    pub samples: usize,
    pub lines: usize,
    /// ENVI data type code: 4 = float32, 6 = complex64
    pub data_type: u8,
    pub description: String,
    pub transform: Option<GeoTransform>,
    /// WKT written as `coordinate system string`
    pub projection: Option<String>,
    /// Written as `data ignore value`
    pub nodata: Option<f64>,
}

impl EnviHeader {
    /// Header for a ground-range output of the given scene
    pub fn for_scene(
        geometry: &SceneGeometry,
        polarization: Polarization,
        description: &str,
    ) -> Self {
        Self {
            samples: geometry.dimensions.grd_cols,
            lines: geometry.dimensions.grd_rows,
            data_type: if polarization.is_complex() { 6 } else { 4 },
            description: format!("{} {}", description, polarization.product_code()),
            transform: geometry.grd_transform,
            projection: None,
            nodata: Some(NODATA_VALUE as f64),
        }
    }

    /// Header for a raster on the same grid as `reference`, carrying its
    /// geotransform, projection and nodata value
    pub fn for_raster(reference: &Raster, polarization: Polarization, description: &str) -> Self {
        let (lines, samples) = reference.data.dim();
        Self {
            samples,
            lines,
            data_type: if polarization.is_complex() { 6 } else { 4 },
            description: format!("{} {}", description, polarization.product_code()),
            transform: reference.geo_transform,
            projection: reference.projection.clone(),
            nodata: reference.nodata,
        }
    }

    /// Header for a polarization-independent float32 scene raster (mask, look, slope)
    pub fn for_auxiliary(geometry: &SceneGeometry, description: &str) -> Self {
        Self {
            samples: geometry.dimensions.grd_cols,
            lines: geometry.dimensions.grd_rows,
            data_type: 4,
            description: description.to_string(),
            transform: geometry.grd_transform,
            projection: None,
            nodata: Some(NODATA_VALUE as f64),
        }
    }

    pub fn render(&self) -> String {
        let mut text = format!(
            "ENVI\n\
             description = {{{}}}\n\
             samples = {}\n\
             lines = {}\n\
             bands = 1\n\
             header offset = 0\n\
             file type = ENVI Standard\n\
             data type = {}\n\
             interleave = bsq\n\
             byte order = 0\n",
            self.description, self.samples, self.lines, self.data_type
        );
        if let Some(gt) = &self.transform {
            text.push_str(&format!(
                "map info = {{Geographic Lat/Lon, 1.0, 1.0, {}, {}, {}, {}, \
                 WGS-84, units=Degrees}}\n",
                gt.top_left_x,
                gt.top_left_y,
                gt.pixel_width,
                gt.pixel_height.abs()
            ));
        }
        if let Some(wkt) = &self.projection {
            text.push_str(&format!("coordinate system string = {{{}}}\n", wkt));
        }
        if let Some(nodata) = self.nodata {
            text.push_str(&format!("data ignore value = {}\n", nodata));
        }
        text
    }

    /// Sidecar path: the raster file name with `.hdr` appended
    pub fn path_for<P: AsRef<Path>>(raster_path: P) -> PathBuf {
        let mut name = raster_path.as_ref().as_os_str().to_owned();
        name.push(".hdr");
        PathBuf::from(name)
    }

    pub fn write_for<P: AsRef<Path>>(&self, raster_path: P) -> RadiocalResult<PathBuf> {
        let header_path = Self::path_for(raster_path);
        std::fs::write(&header_path, self.render())?;
        Ok(header_path)
    }
}
