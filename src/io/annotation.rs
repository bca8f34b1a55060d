use crate::types::{
    Corner, GeoTransform, GridDimensions, RadiocalError, RadiocalResult, SceneCorners,
    SceneGeometry,
};
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;

const MLC_ROWS: &str = "mlc_pwr.set_rows";
const MLC_COLS: &str = "mlc_pwr.set_cols";
const GRD_ROWS: &str = "grd_pwr.set_rows";
const GRD_COLS: &str = "grd_pwr.set_cols";
const GRD_ROW_ADDR: &str = "grd_pwr.row_addr";
const GRD_COL_ADDR: &str = "grd_pwr.col_addr";
const GRD_ROW_MULT: &str = "grd_pwr.row_mult";
const GRD_COL_MULT: &str = "grd_pwr.col_mult";

const CORNER_KEYS: [(&str, &str); 4] = [
    ("Approximate Upper Left Latitude", "Approximate Upper Left Longitude"),
    ("Approximate Upper Right Latitude", "Approximate Upper Right Longitude"),
    ("Approximate Lower Left Latitude", "Approximate Lower Left Longitude"),
    ("Approximate Lower Right Latitude", "Approximate Lower Right Longitude"),
];

/// One `key (units) = value ; comment` record
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationEntry {
    pub value: String,
    pub units: Option<String>,
}

/// Key-value view of a UAVSAR annotation (.ann) file
#[derive(Debug, Clone, Default)]
pub struct Annotation {
    entries: HashMap<String, AnnotationEntry>,
}

impl Annotation {
    /// Parse annotation text. Comment lines (starting with `;`) and lines
    /// without `=` are ignored; the first occurrence of a key wins.
    pub fn parse(text: &str) -> RadiocalResult<Self> {
        let record = Regex::new(
            r"^\s*(?P<key>[^=;(]+?)\s*(?:\((?P<units>[^)]*)\))?\s*=\s*(?P<value>[^;]*?)\s*(?:;.*)?$",
        )
        .map_err(|e| RadiocalError::Processing(format!("Regex error: {}", e)))?;

        let mut entries = HashMap::new();
        for line in text.lines() {
            let trimmed = line.trim_start();
            if trimmed.is_empty() || trimmed.starts_with(';') {
                continue;
            }
            if let Some(caps) = record.captures(line) {
                let key = caps["key"].trim().to_string();
                let entry = AnnotationEntry {
                    value: caps["value"].trim().to_string(),
                    units: caps.name("units").map(|u| u.as_str().trim().to_string()),
                };
                entries.entry(key).or_insert(entry);
            }
        }

        log::debug!("Parsed {} annotation records", entries.len());
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&AnnotationEntry> {
        self.entries.get(key)
    }

    /// Raw string value of a required key
    pub fn require(&self, key: &str) -> RadiocalResult<&str> {
        self.entries
            .get(key)
            .map(|e| e.value.as_str())
            .ok_or_else(|| RadiocalError::Annotation {
                key: key.to_string(),
                message: "missing".to_string(),
            })
    }

    pub fn require_usize(&self, key: &str) -> RadiocalResult<usize> {
        let raw = self.require(key)?;
        raw.parse::<usize>().map_err(|e| RadiocalError::Annotation {
            key: key.to_string(),
            message: format!("'{}' is not a row/column count: {}", raw, e),
        })
    }

    pub fn require_f64(&self, key: &str) -> RadiocalResult<f64> {
        let raw = self.require(key)?;
        raw.parse::<f64>().map_err(|e| RadiocalError::Annotation {
            key: key.to_string(),
            message: format!("'{}' is not a number: {}", raw, e),
        })
    }

    /// Like `require_f64`, but absence is not an error; a malformed value still is.
    pub fn optional_f64(&self, key: &str) -> RadiocalResult<Option<f64>> {
        match self.entries.get(key) {
            Some(_) => self.require_f64(key).map(Some),
            None => Ok(None),
        }
    }
}

/// Reads scene geometry out of annotation files
pub struct AnnotationReader;

impl AnnotationReader {
    pub fn read<P: AsRef<Path>>(path: P) -> RadiocalResult<Annotation> {
        log::debug!("Reading annotation {}", path.as_ref().display());
        let text = std::fs::read_to_string(path.as_ref())?;
        Annotation::parse(&text)
    }

    pub fn read_geometry<P: AsRef<Path>>(path: P) -> RadiocalResult<SceneGeometry> {
        let annotation = Self::read(path)?;
        Self::extract_geometry(&annotation)
    }

    /// Validate every required key and build the scene geometry
    pub fn extract_geometry(annotation: &Annotation) -> RadiocalResult<SceneGeometry> {
        let dimensions = GridDimensions {
            mlc_rows: annotation.require_usize(MLC_ROWS)?,
            mlc_cols: annotation.require_usize(MLC_COLS)?,
            grd_rows: annotation.require_usize(GRD_ROWS)?,
            grd_cols: annotation.require_usize(GRD_COLS)?,
        };

        let mut corners = [Corner { lat: 0.0, lon: 0.0 }; 4];
        for (corner, (lat_key, lon_key)) in corners.iter_mut().zip(CORNER_KEYS.iter()) {
            corner.lat = annotation.require_f64(lat_key)?;
            corner.lon = annotation.require_f64(lon_key)?;
        }

        let grd_transform = match (
            annotation.optional_f64(GRD_ROW_ADDR)?,
            annotation.optional_f64(GRD_COL_ADDR)?,
            annotation.optional_f64(GRD_ROW_MULT)?,
            annotation.optional_f64(GRD_COL_MULT)?,
        ) {
            (Some(row_addr), Some(col_addr), Some(row_mult), Some(col_mult)) => Some(GeoTransform {
                top_left_x: col_addr,
                pixel_width: col_mult,
                rotation_x: 0.0,
                top_left_y: row_addr,
                rotation_y: 0.0,
                pixel_height: row_mult,
            }),
            _ => None,
        };

        Ok(SceneGeometry {
            dimensions,
            corners: SceneCorners {
                upper_left: corners[0],
                upper_right: corners[1],
                lower_left: corners[2],
                lower_right: corners[3],
            },
            grd_transform,
        })
    }
}
