use chrono::{DateTime, Utc};
use ndarray::Array2;
use num_complex::Complex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Complex-valued cross-product pixel (single precision, interleaved re/im on disk)
pub type SarComplex = Complex<f32>;

/// Real-valued backscatter power
pub type SarReal = f32;

/// 2D real ground-range raster (rows x columns)
pub type SarRealImage = Array2<SarReal>;

/// 2D complex ground-range raster (rows x columns)
pub type SarComplexImage = Array2<SarComplex>;

/// Nodata sentinel written into real-valued outputs
pub const NODATA_VALUE: f32 = -9999.0;

/// Polarization channels of a UAVSAR multi-look product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Polarization {
    HH,
    VV,
    HV,
    /// Complex HH x HV* cross product
    HHHV,
    /// Complex HV x VV* cross product
    HVVV,
    /// Complex HH x VV* cross product
    HHVV,
}

impl Polarization {
    /// Real (power) channels, in the order the calibration tooling processes them
    pub const REAL: [Polarization; 3] = [Polarization::HH, Polarization::VV, Polarization::HV];

    /// Complex cross-product channels
    pub const COMPLEX: [Polarization; 3] =
        [Polarization::HHHV, Polarization::HVVV, Polarization::HHVV];

    /// Four letter product code used in file names and calibration program arguments
    pub fn product_code(&self) -> &'static str {
        match self {
            Polarization::HH => "HHHH",
            Polarization::VV => "VVVV",
            Polarization::HV => "HVHV",
            Polarization::HHHV => "HHHV",
            Polarization::HVVV => "HVVV",
            Polarization::HHVV => "HHVV",
        }
    }

    /// Short code used for correction table names
    pub fn short_code(&self) -> &'static str {
        match self {
            Polarization::HH => "HH",
            Polarization::VV => "VV",
            Polarization::HV => "HV",
            Polarization::HHHV => "HHHV",
            Polarization::HVVV => "HVVV",
            Polarization::HHVV => "HHVV",
        }
    }

    pub fn is_complex(&self) -> bool {
        matches!(self, Polarization::HHHV | Polarization::HVVV | Polarization::HHVV)
    }

    /// Real channels whose correction factors combine into this cross product
    pub fn cross_product_factors(&self) -> Option<(Polarization, Polarization)> {
        match self {
            Polarization::HHHV => Some((Polarization::HH, Polarization::HV)),
            Polarization::HVVV => Some((Polarization::HV, Polarization::VV)),
            Polarization::HHVV => Some((Polarization::HH, Polarization::VV)),
            _ => None,
        }
    }

    pub fn parse(value: &str) -> RadiocalResult<Self> {
        match value.trim().to_uppercase().as_str() {
            "HH" | "HHHH" => Ok(Polarization::HH),
            "VV" | "VVVV" => Ok(Polarization::VV),
            "HV" | "HVHV" => Ok(Polarization::HV),
            "HHHV" => Ok(Polarization::HHHV),
            "HVVV" => Ok(Polarization::HVVV),
            "HHVV" => Ok(Polarization::HHVV),
            other => Err(RadiocalError::InvalidConfig(format!(
                "Invalid polarization: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Polarization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.short_code())
    }
}

/// One corner coordinate of a scene footprint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Corner {
    pub lat: f64,
    pub lon: f64,
}

/// Scene footprint corners in annotation order: UL, UR, LL, LR
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SceneCorners {
    pub upper_left: Corner,
    pub upper_right: Corner,
    pub lower_left: Corner,
    pub lower_right: Corner,
}

impl SceneCorners {
    pub fn iter(&self) -> impl Iterator<Item = &Corner> {
        [&self.upper_left, &self.upper_right, &self.lower_left, &self.lower_right].into_iter()
    }
}

/// Geospatial bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn from_corners(corners: &SceneCorners) -> Self {
        let mut bbox = BoundingBox {
            min_lon: f64::INFINITY,
            max_lon: f64::NEG_INFINITY,
            min_lat: f64::INFINITY,
            max_lat: f64::NEG_INFINITY,
        };
        for corner in corners.iter() {
            bbox.include(corner);
        }
        bbox
    }

    pub fn include(&mut self, corner: &Corner) {
        self.min_lon = self.min_lon.min(corner.lon);
        self.max_lon = self.max_lon.max(corner.lon);
        self.min_lat = self.min_lat.min(corner.lat);
        self.max_lat = self.max_lat.max(corner.lat);
    }

    pub fn union(&self, other: &BoundingBox) -> Self {
        BoundingBox {
            min_lon: self.min_lon.min(other.min_lon),
            max_lon: self.max_lon.max(other.max_lon),
            min_lat: self.min_lat.min(other.min_lat),
            max_lat: self.max_lat.max(other.max_lat),
        }
    }
}

/// Geospatial transformation parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }
}

/// Raster dimensions of the multi-look-complex and ground-range grids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridDimensions {
    pub mlc_rows: usize,
    pub mlc_cols: usize,
    pub grd_rows: usize,
    pub grd_cols: usize,
}

/// Geometry of one scene, immutable once parsed from its annotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneGeometry {
    pub dimensions: GridDimensions,
    pub corners: SceneCorners,
    /// Ground-range grid origin and spacing, when the annotation carries it
    pub grd_transform: Option<GeoTransform>,
}

/// A loaded raster with the geospatial metadata needed to write it back
#[derive(Debug, Clone)]
pub struct Raster {
    pub data: SarRealImage,
    pub nodata: Option<f64>,
    pub geo_transform: Option<GeoTransform>,
    pub projection: Option<String>,
}

impl Raster {
    pub fn new(data: SarRealImage) -> Self {
        Self {
            data,
            nodata: None,
            geo_transform: None,
            projection: None,
        }
    }

    /// Same geospatial metadata, new pixel values
    pub fn with_data(&self, data: SarRealImage) -> Self {
        Self {
            data,
            nodata: self.nodata,
            geo_transform: self.geo_transform,
            projection: self.projection.clone(),
        }
    }
}

/// Timestamps attached to batch reports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunWindow {
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
}

/// Error types for calibration processing
#[derive(Debug, thiserror::Error)]
pub enum RadiocalError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Annotation error for key '{key}': {message}")]
    Annotation { key: String, message: String },

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("External program {program} failed with status {status:?}: {stderr}")]
    ExternalProgram {
        program: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("Expected output was not produced: {}", .0.display())]
    MissingOutput(PathBuf),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),
}

/// Result type for calibration operations
pub type RadiocalResult<T> = Result<T, RadiocalError>;
