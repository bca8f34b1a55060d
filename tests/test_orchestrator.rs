use ndarray::Array2;
use radiocal::core::orchestrator::{BatchParams, CalibrationOrchestrator, SceneState, MASK_TEMP};
use radiocal::io::external::{CommandRunner, Invocation, InvocationOutput};
use radiocal::io::raster::{read_flat, write_flat};
use radiocal::io::scene::SceneFiles;
use radiocal::types::{Polarization, RadiocalResult};
use std::fs;
use std::path::Path;
use std::sync::Mutex;

const GRD_ROWS: usize = 3;
const GRD_COLS: usize = 4;

fn annotation_text(north: f64, west: f64) -> String {
    format!(
        "mlc_pwr.set_rows (pixels) = 6\n\
         mlc_pwr.set_cols (pixels) = 5\n\
         grd_pwr.set_rows (pixels) = {rows}\n\
         grd_pwr.set_cols (pixels) = {cols}\n\
         Approximate Upper Left Latitude (deg) = {n}\n\
         Approximate Upper Left Longitude (deg) = {w}\n\
         Approximate Upper Right Latitude (deg) = {n}\n\
         Approximate Upper Right Longitude (deg) = {e}\n\
         Approximate Lower Left Latitude (deg) = {s}\n\
         Approximate Lower Left Longitude (deg) = {w}\n\
         Approximate Lower Right Latitude (deg) = {s}\n\
         Approximate Lower Right Longitude (deg) = {e}\n",
        rows = GRD_ROWS,
        cols = GRD_COLS,
        n = north,
        s = north - 0.5,
        w = west,
        e = west + 0.5,
    )
}

fn grid(value: f32) -> Array2<f32> {
    Array2::from_elem((GRD_ROWS, GRD_COLS), value)
}

/// Stand-in for the native programs: records every call and writes the files
/// the real programs would leave behind.
#[derive(Default)]
struct FakeTools {
    calls: Mutex<Vec<Invocation>>,
    /// Size of the scene DEM each time the calibration program ran
    dem_sizes: Mutex<Vec<u64>>,
    /// Geocoding of outputs starting with this prefix exits non-zero
    fail_geocode_for: Option<String>,
}

impl FakeTools {
    fn failing_for(root: &str) -> Self {
        Self {
            fail_geocode_for: Some(root.to_string()),
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, program: &str) -> usize {
        self.calls().iter().filter(|c| c.program_name() == program).count()
    }

    fn calibrate(&self, invocation: &Invocation) -> RadiocalResult<()> {
        let dir = &invocation.working_dir;
        let annotation = &invocation.args[invocation.args.len() - 3];
        if let Ok(meta) = fs::metadata(dir.join(annotation.replace(".ann", ".hgt"))) {
            self.dem_sizes.lock().unwrap().push(meta.len());
        }

        fs::write(dir.join(invocation.args.last().unwrap()), [0u8; 8])?;

        let mut look = grid(40.0);
        look[[1, 1]] = 10.0;
        let mut mask = grid(0.0);
        mask[[0, 0]] = 1.0;
        write_flat(dir.join(invocation.flag_value("-l").unwrap()), &look)?;
        write_flat(dir.join(invocation.flag_value("-s").unwrap()), &grid(3.0))?;
        write_flat(dir.join(invocation.flag_value("-m").unwrap()), &mask)?;
        Ok(())
    }

    fn geocode(&self, invocation: &Invocation) -> RadiocalResult<bool> {
        let dir = &invocation.working_dir;
        let (input, output) = (&invocation.args[0], &invocation.args[3]);
        if let Some(prefix) = &self.fail_geocode_for {
            if output.starts_with(prefix.as_str()) {
                return Ok(false);
            }
        }

        let cols: usize = invocation.args[4].parse().unwrap();
        let rows: usize = invocation.args[5].parse().unwrap();
        assert_eq!((rows, cols), (GRD_ROWS, GRD_COLS));

        if input.ends_with(MASK_TEMP) {
            fs::copy(dir.join(input), dir.join(output))?;
        } else {
            write_flat(dir.join(output), &grid(1.0))?;
        }
        Ok(true)
    }
}

impl CommandRunner for &FakeTools {
    fn run(&self, invocation: &Invocation) -> RadiocalResult<InvocationOutput> {
        self.calls.lock().unwrap().push(invocation.clone());
        let success = match invocation.program_name().as_str() {
            "calib" => {
                self.calibrate(invocation)?;
                true
            }
            "geocode" => self.geocode(invocation)?,
            other => panic!("unexpected program {}", other),
        };

        Ok(if success {
            InvocationOutput {
                status: Some(0),
                success: true,
                stdout: "done\n".to_string(),
                stderr: String::new(),
            }
        } else {
            InvocationOutput {
                status: Some(1),
                success: false,
                stdout: String::new(),
                stderr: "cannot open transform file".to_string(),
            }
        })
    }
}

fn params() -> BatchParams {
    BatchParams {
        calibration_program: "/opt/uavsar/calib".into(),
        geocode_program: "/opt/uavsar/geocode".into(),
        polarizations: vec![Polarization::HH, Polarization::HV],
        create_look: true,
        threads: Some(2),
        ..BatchParams::default()
    }
}

fn add_scene(dir: &Path, root: &str, north: f64, west: f64) -> SceneFiles {
    let stem = format!("{}_L090_CX_01", root);
    fs::write(dir.join(format!("{}.ann", stem)), annotation_text(north, west)).unwrap();
    fs::write(dir.join(format!("{}.hgt", stem)), [7u8; 8]).unwrap();
    SceneFiles::new(dir, root, &stem)
}

#[test]
fn test_full_scene_with_flat_dem() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().unwrap();
    let scene = add_scene(dir.path(), "site_a", 30.0, -91.0);

    let tools = FakeTools::default();
    let batch = BatchParams {
        flat_dem: true,
        flat_dem_height: 2.5,
        ..params()
    };
    let report = CalibrationOrchestrator::new(batch, &tools)
        .unwrap()
        .run_batch(dir.path())
        .unwrap();

    assert_eq!(report.scenes.len(), 1);
    let scene_report = &report.scenes[0];
    assert_eq!(
        scene_report.states,
        vec![
            SceneState::Discovered,
            SceneState::GeometryParsed,
            SceneState::DemSwapped,
            SceneState::Calibrated,
            SceneState::AuxCollected,
            SceneState::DemRestored,
            SceneState::PostProcessed,
            SceneState::Done,
        ]
    );
    assert_eq!(scene_report.calibrated, vec![Polarization::HH, Polarization::HV]);
    assert!(scene_report.warnings.is_empty());

    // two pols plus the mask
    assert_eq!(tools.count("calib"), 2);
    assert_eq!(tools.count("geocode"), 3);

    // the calibration program saw the flat DEM; the original is back afterwards
    let flat_size = (GRD_ROWS * GRD_COLS * 4) as u64;
    assert_eq!(*tools.dem_sizes.lock().unwrap(), vec![flat_size, flat_size]);
    assert_eq!(fs::read(scene.dem()).unwrap(), vec![7u8; 8]);
    assert!(!dir.path().join("site_a_L090_CX_01.hgt_old").exists());

    // the masked pixel and the low look angle are zeroed, the rest untouched
    for pol in [Polarization::HH, Polarization::HV] {
        let grd = scene.grd(pol, "area_veg");
        let data: Array2<f32> = read_flat(&grd, GRD_ROWS, GRD_COLS).unwrap();
        assert_eq!(data[[0, 0]], 0.0);
        assert_eq!(data[[1, 1]], 0.0);
        assert_eq!(data.iter().filter(|&&v| v == 1.0).count(), GRD_ROWS * GRD_COLS - 2);
        assert!(Path::new(&format!("{}.hdr", grd.display())).exists());
    }
    assert!(scene.mask().exists());
    assert!(scene.look().exists());
    assert!(!scene.slope().exists());

    let extent = report.extent.unwrap();
    assert_eq!(extent.max_lat, 30.0);
    assert_eq!(extent.min_lat, 29.5);
}

#[test]
fn test_existing_outputs_skip_without_invocation() {
    let dir = tempfile::tempdir().unwrap();
    let scene = add_scene(dir.path(), "site_a", 30.0, -91.0);
    for pol in [Polarization::HH, Polarization::HV] {
        write_flat(scene.grd(pol, "area_veg"), &grid(5.0)).unwrap();
    }

    let tools = FakeTools::default();
    let batch = BatchParams {
        flat_dem: true,
        ..params()
    };
    let report = CalibrationOrchestrator::new(batch, &tools)
        .unwrap()
        .run_batch(dir.path())
        .unwrap();

    assert_eq!(report.count(SceneState::Skipped), 1);
    assert!(!report.scenes[0].visited(SceneState::DemSwapped));
    assert!(tools.calls().is_empty());
    assert_eq!(fs::read(scene.dem()).unwrap(), vec![7u8; 8]);
    let untouched: Array2<f32> =
        read_flat(scene.grd(Polarization::HH, "area_veg"), GRD_ROWS, GRD_COLS).unwrap();
    assert_eq!(untouched, grid(5.0));
}

#[test]
fn test_only_missing_polarizations_are_calibrated() {
    let dir = tempfile::tempdir().unwrap();
    let scene = add_scene(dir.path(), "site_a", 30.0, -91.0);
    write_flat(scene.grd(Polarization::HH, "area_veg"), &grid(5.0)).unwrap();

    let tools = FakeTools::default();
    let report = CalibrationOrchestrator::new(params(), &tools)
        .unwrap()
        .run_batch(dir.path())
        .unwrap();

    let scene_report = &report.scenes[0];
    assert_eq!(scene_report.outcome(), SceneState::Done);
    assert_eq!(scene_report.skipped, vec![Polarization::HH]);
    assert_eq!(scene_report.calibrated, vec![Polarization::HV]);
    assert!(tools.calls().iter().all(|c| !c.args.contains(&"HHHH".to_string())));
}

#[test]
fn test_overwrite_recalibrates_existing_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let scene = add_scene(dir.path(), "site_a", 30.0, -91.0);
    write_flat(scene.grd(Polarization::HH, "area_veg"), &grid(5.0)).unwrap();

    let tools = FakeTools::default();
    let batch = BatchParams {
        overwrite: true,
        post_process: false,
        ..params()
    };
    let report = CalibrationOrchestrator::new(batch, &tools)
        .unwrap()
        .run_batch(dir.path())
        .unwrap();

    assert_eq!(report.scenes[0].calibrated, vec![Polarization::HH, Polarization::HV]);
    let fresh: Array2<f32> =
        read_flat(scene.grd(Polarization::HH, "area_veg"), GRD_ROWS, GRD_COLS).unwrap();
    assert_eq!(fresh, grid(1.0));
}

#[test]
fn test_failed_program_fails_scene_and_restores_dem() {
    let dir = tempfile::tempdir().unwrap();
    add_scene(dir.path(), "site_a", 30.0, -91.0);
    let failing = add_scene(dir.path(), "site_b", 31.0, -90.0);

    let tools = FakeTools::failing_for("site_b");
    let batch = BatchParams {
        flat_dem: true,
        ..params()
    };
    let report = CalibrationOrchestrator::new(batch, &tools)
        .unwrap()
        .run_batch(dir.path())
        .unwrap();

    assert_eq!(report.count(SceneState::Done), 1);
    assert_eq!(report.count(SceneState::Failed), 1);

    let failed = report.scenes.iter().find(|s| s.root == "site_b").unwrap();
    assert!(failed.visited(SceneState::DemRestored));
    assert!(!failed.visited(SceneState::Calibrated));
    assert!(failed.error.as_deref().unwrap().contains("transform"));
    assert_eq!(fs::read(failing.dem()).unwrap(), vec![7u8; 8]);

    // a failed scene still contributes its parsed corners
    let extent = report.extent.unwrap();
    assert_eq!(extent.max_lat, 31.0);
    assert_eq!(extent.min_lat, 29.5);
    assert_eq!(extent.min_lon, -91.0);
    assert_eq!(extent.max_lon, -89.5);
}

#[test]
fn test_dry_run_invokes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let scene = add_scene(dir.path(), "site_a", 30.0, -91.0);

    let tools = FakeTools::default();
    let batch = BatchParams {
        run_correction: false,
        flat_dem: true,
        ..params()
    };
    let report = CalibrationOrchestrator::new(batch, &tools)
        .unwrap()
        .run_batch(dir.path())
        .unwrap();

    assert_eq!(report.count(SceneState::Done), 1);
    assert!(tools.calls().is_empty());
    assert!(!scene.grd(Polarization::HV, "area_veg").exists());
    assert_eq!(fs::read(scene.dem()).unwrap(), vec![7u8; 8]);
}

#[test]
fn test_missing_look_raster_is_a_warning() {
    let dir = tempfile::tempdir().unwrap();
    let scene = add_scene(dir.path(), "site_a", 30.0, -91.0);

    let tools = FakeTools::default();
    let batch = BatchParams {
        create_look: false,
        ..params()
    };
    let report = CalibrationOrchestrator::new(batch, &tools)
        .unwrap()
        .run_batch(dir.path())
        .unwrap();

    let scene_report = &report.scenes[0];
    assert_eq!(scene_report.outcome(), SceneState::Done);
    assert!(!scene_report.visited(SceneState::PostProcessed));
    assert_eq!(scene_report.warnings.len(), 2);

    let data: Array2<f32> =
        read_flat(scene.grd(Polarization::HV, "area_veg"), GRD_ROWS, GRD_COLS).unwrap();
    assert_eq!(data, grid(1.0));
}

#[test]
fn test_scene_filter() {
    let dir = tempfile::tempdir().unwrap();
    add_scene(dir.path(), "site_a", 30.0, -91.0);
    add_scene(dir.path(), "site_b", 31.0, -90.0);

    let tools = FakeTools::default();
    let batch = BatchParams {
        scene_filter: Some("site_b".to_string()),
        post_process: false,
        ..params()
    };
    let report = CalibrationOrchestrator::new(batch, &tools)
        .unwrap()
        .run_batch(dir.path())
        .unwrap();

    assert_eq!(report.scenes.len(), 1);
    assert_eq!(report.scenes[0].root, "site_b");
    assert!(tools.calls().iter().all(|c| c.args.iter().all(|a| !a.starts_with("site_a"))));
}
