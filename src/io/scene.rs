use crate::types::{Polarization, RadiocalError, RadiocalResult};
use regex::Regex;
use std::path::{Path, PathBuf};

/// File naming for one scene inside its data directory.
///
/// Every stage (batch calibration, LUT creation, cross-product correction)
/// derives paths from here so the producers and consumers agree.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneFiles {
    pub dir: PathBuf,
    /// Flight/line/date prefix shared by every product of the scene
    pub root: String,
    /// Annotation file name without extension
    pub stem: String,
}

impl SceneFiles {
    pub fn new<P: AsRef<Path>>(dir: P, root: &str, stem: &str) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            root: root.to_string(),
            stem: stem.to_string(),
        }
    }

    /// Naming for a scene known only by its root, as LUT creation refers to scenes
    pub fn from_root<P: AsRef<Path>>(dir: P, root: &str) -> Self {
        Self::new(dir, root, root)
    }

    /// Derive naming from an annotation path such as
    /// `gulfco_14011_15058_109_150509_L090_CX_01.ann`
    pub fn from_annotation<P: AsRef<Path>>(annotation: P) -> RadiocalResult<Self> {
        let annotation = annotation.as_ref();
        let stem = annotation
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| {
                RadiocalError::InvalidFormat(format!(
                    "Not an annotation file: {}",
                    annotation.display()
                ))
            })?;
        let dir = annotation
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(Self::new(dir, &scene_root(&stem), &stem))
    }

    pub fn annotation(&self) -> PathBuf {
        self.dir.join(format!("{}.ann", self.stem))
    }

    pub fn dem(&self) -> PathBuf {
        self.dir.join(format!("{}.hgt", self.stem))
    }

    pub fn mlc(&self, pol: Polarization, cal_name: &str) -> PathBuf {
        self.dir
            .join(format!("{}_{}_{}.mlc", self.root, pol.product_code(), cal_name))
    }

    pub fn grd(&self, pol: Polarization, cal_name: &str) -> PathBuf {
        self.dir
            .join(format!("{}_{}_{}.grd", self.root, pol.product_code(), cal_name))
    }

    pub fn mask(&self) -> PathBuf {
        self.dir.join(format!("{}_mask.grd", self.root))
    }

    pub fn look(&self) -> PathBuf {
        self.dir.join(format!("{}_look.grd", self.root))
    }

    pub fn slope(&self) -> PathBuf {
        self.dir.join(format!("{}_slope.grd", self.root))
    }
}

/// Strip the trailing `_L090_CX_01` style band/mode/version segment
fn scene_root(stem: &str) -> String {
    let suffix = Regex::new(r"^(?P<root>.+?)_L\d{3}[A-Z]*_[A-Z]{2}_\d{2}$").ok();
    match suffix.as_ref().and_then(|re| re.captures(stem)) {
        Some(caps) => caps["root"].to_string(),
        None => stem.to_string(),
    }
}

/// Scan a directory for annotation files, optionally keeping only names
/// containing `filter`. Results are sorted by file name.
pub fn discover_scenes<P: AsRef<Path>>(
    dir: P,
    filter: Option<&str>,
) -> RadiocalResult<Vec<SceneFiles>> {
    let dir = dir.as_ref();
    let mut scenes = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_annotation = path.extension().map(|e| e == "ann").unwrap_or(false);
        if !is_annotation || !path.is_file() {
            continue;
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if let Some(f) = filter {
            if !name.contains(f) {
                continue;
            }
        }
        scenes.push(SceneFiles::from_annotation(&path)?);
    }

    scenes.sort_by(|a, b| a.stem.cmp(&b.stem));
    log::info!("Discovered {} scene(s) in {}", scenes.len(), dir.display());
    Ok(scenes)
}
