//! Least-squares polynomial (Savitzky-Golay) smoothing of regular grids.
//!
//! The 2D filter fits, once, the pseudoinverse of a polynomial basis over a
//! square window and convolves the reflected-padded surface with the row of
//! that pseudoinverse belonging to the requested term. The 1D variant is used
//! for slope-independent correction profiles and evaluates the polynomial fit
//! of the first/last full window at the profile ends.

use crate::types::{RadiocalError, RadiocalResult};
use nalgebra::DMatrix;
use ndarray::{s, Array1, Array2};
use num_complex::Complex64;
use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};

/// Smoothing filter parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingParams {
    /// Filter window size (must be odd)
    pub window_size: usize,
    /// Polynomial order of the local fit
    pub order: usize,
}

impl Default for SmoothingParams {
    fn default() -> Self {
        Self {
            window_size: 51,
            order: 3,
        }
    }
}

/// What the 2D filter returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SmoothingMode {
    /// Smoothed surface
    Value,
    /// Partial derivative along rows (per row index)
    RowDerivative,
    /// Partial derivative along columns (per column index)
    ColumnDerivative,
    /// Both partial derivatives
    Both,
}

#[derive(Debug, Clone)]
pub enum SmoothingOutput {
    Surface(Array2<f64>),
    Gradient { row: Array2<f64>, col: Array2<f64> },
}

fn pseudo_inverse(a: DMatrix<f64>) -> RadiocalResult<DMatrix<f64>> {
    a.pseudo_inverse(1e-12)
        .map_err(|e| RadiocalError::Processing(format!("Pseudo-inverse failed: {}", e)))
}

/// 2D Savitzky-Golay filter with sign-corrected reflective padding
#[derive(Debug, Clone)]
pub struct SurfaceSmoother {
    params: SmoothingParams,
    value_kernel: Array2<f64>,
    row_kernel: Option<Array2<f64>>,
    col_kernel: Option<Array2<f64>>,
}

impl SurfaceSmoother {
    pub fn new(params: SmoothingParams) -> RadiocalResult<Self> {
        let window = params.window_size;
        let order = params.order;

        if window % 2 == 0 {
            return Err(RadiocalError::InvalidConfig("window_size must be odd".to_string()));
        }
        let n_terms = (order + 1) * (order + 2) / 2;
        if window * window < n_terms {
            return Err(RadiocalError::InvalidConfig(format!(
                "order {} is too high for window size {}",
                order, window
            )));
        }

        // p(x, y) = a0 + a1*x + a2*y + a3*x^2 + a4*x*y + a5*y^2 + ...
        // with x the row offset and y the column offset inside the window.
        let exps: Vec<(i32, i32)> = (0..=order as i32)
            .flat_map(|k| (0..=k).map(move |n| (k - n, n)))
            .collect();
        let half = (window / 2) as f64;

        let a = DMatrix::from_fn(window * window, exps.len(), |r, c| {
            let dx = (r / window) as f64 - half;
            let dy = (r % window) as f64 - half;
            dx.powi(exps[c].0) * dy.powi(exps[c].1)
        });
        let pinv = pseudo_inverse(a)?;

        let kernel = |term: usize| {
            Array2::from_shape_fn((window, window), |(i, j)| pinv[(term, i * window + j)])
        };

        log::debug!(
            "Built {}x{} smoothing kernel for polynomial order {} ({} terms)",
            window,
            window,
            order,
            exps.len()
        );

        Ok(Self {
            params,
            value_kernel: kernel(0),
            row_kernel: (exps.len() > 1).then(|| kernel(1)),
            col_kernel: (exps.len() > 2).then(|| kernel(2)),
        })
    }

    pub fn params(&self) -> SmoothingParams {
        self.params
    }

    /// Smoothed surface, same shape as the input
    pub fn smooth(&self, z: &Array2<f64>) -> RadiocalResult<Array2<f64>> {
        match self.apply(z, SmoothingMode::Value)? {
            SmoothingOutput::Surface(surface) => Ok(surface),
            SmoothingOutput::Gradient { .. } => Err(RadiocalError::Processing(
                "value mode produced a gradient".to_string(),
            )),
        }
    }

    pub fn apply(&self, z: &Array2<f64>, mode: SmoothingMode) -> RadiocalResult<SmoothingOutput> {
        let half = self.params.window_size / 2;
        let (rows, cols) = z.dim();
        if rows <= half || cols <= half {
            return Err(RadiocalError::Processing(format!(
                "Surface size {}x{} is too small for window size {}",
                rows, cols, self.params.window_size
            )));
        }

        let padded = pad_reflect(z, half);
        fn derivative_kernel(k: &Option<Array2<f64>>) -> RadiocalResult<&Array2<f64>> {
            k.as_ref().ok_or_else(|| {
                RadiocalError::InvalidConfig("derivatives need polynomial order >= 1".to_string())
            })
        }

        let output = match mode {
            SmoothingMode::Value => {
                SmoothingOutput::Surface(correlate_valid(&padded, &self.value_kernel)?)
            }
            SmoothingMode::RowDerivative => {
                let kernel = derivative_kernel(&self.row_kernel)?;
                SmoothingOutput::Surface(correlate_valid(&padded, kernel)?)
            }
            SmoothingMode::ColumnDerivative => {
                let kernel = derivative_kernel(&self.col_kernel)?;
                SmoothingOutput::Surface(correlate_valid(&padded, kernel)?)
            }
            SmoothingMode::Both => SmoothingOutput::Gradient {
                row: correlate_valid(&padded, derivative_kernel(&self.row_kernel)?)?,
                col: correlate_valid(&padded, derivative_kernel(&self.col_kernel)?)?,
            },
        };
        Ok(output)
    }
}

/// Pad by `half` on every side with `2 * edge - mirrored_neighbor`.
/// Corners are the reflection of the already padded left/right bands.
fn pad_reflect(z: &Array2<f64>, half: usize) -> Array2<f64> {
    let (rows, cols) = z.dim();
    let mut p = Array2::<f64>::zeros((rows + 2 * half, cols + 2 * half));
    p.slice_mut(s![half..half + rows, half..half + cols]).assign(z);

    let last_col = half + cols - 1;
    for r in half..half + rows {
        for k in 1..=half {
            p[[r, half - k]] = 2.0 * p[[r, half]] - p[[r, half + k]];
            p[[r, last_col + k]] = 2.0 * p[[r, last_col]] - p[[r, last_col - k]];
        }
    }

    let last_row = half + rows - 1;
    for c in 0..cols + 2 * half {
        for k in 1..=half {
            p[[half - k, c]] = 2.0 * p[[half, c]] - p[[half + k, c]];
            p[[last_row + k, c]] = 2.0 * p[[last_row, c]] - p[[last_row - k, c]];
        }
    }
    p
}

fn fft2(
    data: &mut Array2<Complex64>,
    planner: &mut FftPlanner<f64>,
    inverse: bool,
) -> RadiocalResult<()> {
    let (rows, cols) = data.dim();
    let row_fft = if inverse {
        planner.plan_fft_inverse(cols)
    } else {
        planner.plan_fft_forward(cols)
    };
    let col_fft = if inverse {
        planner.plan_fft_inverse(rows)
    } else {
        planner.plan_fft_forward(rows)
    };

    // rustfft processes every `len`-sized chunk of a contiguous buffer
    row_fft.process(
        data.as_slice_mut()
            .ok_or_else(|| RadiocalError::Processing("FFT buffer is not contiguous".to_string()))?,
    );
    let mut transposed = data.t().as_standard_layout().into_owned();
    col_fft.process(
        transposed
            .as_slice_mut()
            .ok_or_else(|| RadiocalError::Processing("FFT buffer is not contiguous".to_string()))?,
    );
    data.assign(&transposed.t());
    Ok(())
}

/// Cross-correlation of `padded` with `kernel`, keeping only positions where
/// the kernel fits entirely (FFT convolution with the flipped kernel).
fn correlate_valid(padded: &Array2<f64>, kernel: &Array2<f64>) -> RadiocalResult<Array2<f64>> {
    let (pr, pc) = padded.dim();
    let (kr, kc) = kernel.dim();
    let (fr, fc) = (pr + kr - 1, pc + kc - 1);

    let mut a = Array2::<Complex64>::zeros((fr, fc));
    a.slice_mut(s![..pr, ..pc])
        .zip_mut_with(padded, |d, &v| *d = Complex64::new(v, 0.0));

    let mut b = Array2::<Complex64>::zeros((fr, fc));
    for i in 0..kr {
        for j in 0..kc {
            b[[i, j]] = Complex64::new(kernel[[kr - 1 - i, kc - 1 - j]], 0.0);
        }
    }

    let mut planner = FftPlanner::<f64>::new();
    fft2(&mut a, &mut planner, false)?;
    fft2(&mut b, &mut planner, false)?;
    a.zip_mut_with(&b, |x, y| *x *= *y);
    fft2(&mut a, &mut planner, true)?;

    let scale = 1.0 / (fr * fc) as f64;
    Ok(Array2::from_shape_fn((pr - kr + 1, pc - kc + 1), |(r, c)| {
        a[[r + kr - 1, c + kc - 1]].re * scale
    }))
}

/// 1D Savitzky-Golay filter. The first and last `window / 2` samples take the
/// value of the polynomial fitted to the first/last full window.
#[derive(Debug, Clone)]
pub struct ProfileSmoother {
    window: usize,
    coeffs: Array1<f64>,
    left_edge: Array2<f64>,
    right_edge: Array2<f64>,
}

impl ProfileSmoother {
    pub fn new(params: SmoothingParams) -> RadiocalResult<Self> {
        let window = params.window_size;
        let order = params.order;
        if window % 2 == 0 {
            return Err(RadiocalError::InvalidConfig("window_size must be odd".to_string()));
        }
        if order >= window {
            return Err(RadiocalError::InvalidConfig(format!(
                "order {} must be less than window size {}",
                order, window
            )));
        }

        let half = window / 2;
        let offset = |t: usize| t as f64 - half as f64;
        let a = DMatrix::from_fn(window, order + 1, |r, c| offset(r).powi(c as i32));
        let pinv = pseudo_inverse(a)?;

        // value of the fitted polynomial at window position t, as weights on the window samples
        let eval_row = |t: usize, j: usize| -> f64 {
            (0..=order).map(|c| offset(t).powi(c as i32) * pinv[(c, j)]).sum()
        };

        Ok(Self {
            window,
            coeffs: Array1::from_shape_fn(window, |j| pinv[(0, j)]),
            left_edge: Array2::from_shape_fn((half, window), |(t, j)| eval_row(t, j)),
            right_edge: Array2::from_shape_fn((half, window), |(t, j)| eval_row(half + 1 + t, j)),
        })
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn smooth(&self, profile: &Array1<f64>) -> RadiocalResult<Array1<f64>> {
        let n = profile.len();
        let w = self.window;
        let half = w / 2;
        if n < w {
            return Err(RadiocalError::Processing(format!(
                "Profile length {} is shorter than window size {}",
                n, w
            )));
        }

        let mut out = Array1::<f64>::zeros(n);
        for i in half..n - half {
            out[i] = self.coeffs.dot(&profile.slice(s![i - half..i + half + 1]));
        }

        let head = profile.slice(s![..w]);
        let tail = profile.slice(s![n - w..]);
        for t in 0..half {
            out[t] = self.left_edge.row(t).dot(&head);
            out[n - half + t] = self.right_edge.row(t).dot(&tail);
        }
        Ok(out)
    }
}

/// First and last populated bins of a profile; `end` is the first empty bin
/// after the populated run, `None` if the run reaches the end of the profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopulatedRange {
    pub start: usize,
    pub end: Option<usize>,
}

impl PopulatedRange {
    pub fn detect(counts: &Array1<u64>) -> Option<Self> {
        let start = counts.iter().position(|&c| c > 0)?;
        let end = counts
            .iter()
            .skip(start)
            .position(|&c| c == 0)
            .map(|offset| start + offset);
        Some(Self { start, end })
    }
}

/// Mean of the finite values in `[i - 2, i + 2]`, zero when there are none
fn void_aware_mean(voided: &Array1<f64>, i: usize) -> f64 {
    let lo = i.saturating_sub(2);
    let hi = (i + 3).min(voided.len());
    let (sum, n) = voided
        .slice(s![lo..hi])
        .iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(s, n), &v| (s + v, n + 1));
    if n > 0 {
        sum / n as f64
    } else {
        0.0
    }
}

/// Smooth a slope-independent look-angle profile.
///
/// Zero bins are treated as void by the moving average used near the ends of
/// the populated range, where the full-window filter would pull values
/// toward zero. Bins with fewer than `min_samples` samples end up at zero.
pub fn smooth_profile_with_edges(
    profile: &Array1<f64>,
    counts: &Array1<u64>,
    min_samples: u64,
    smoother: &ProfileSmoother,
) -> RadiocalResult<(Array1<f64>, Option<PopulatedRange>)> {
    if profile.len() != counts.len() {
        return Err(RadiocalError::Processing(format!(
            "Profile length {} does not match count length {}",
            profile.len(),
            counts.len()
        )));
    }
    let n = profile.len();
    let voided = profile.mapv(|v| if v == 0.0 { f64::NAN } else { v });

    let range = PopulatedRange::detect(counts);
    let mut moving_average = profile.clone();
    if let Some(r) = range {
        for i in r.start..r.end.unwrap_or(n) {
            moving_average[i] = void_aware_mean(&voided, i);
        }
    }

    let mut smoothed = smoother.smooth(profile)?;

    if let Some(r) = range {
        let edge = smoother.window() / 2 + 1;
        for i in r.start..(r.start + edge + 1).min(n) {
            smoothed[i] = moving_average[i];
        }
        let end = r.end.unwrap_or(n - 1);
        for i in end.saturating_sub(edge)..(end + 1).min(n) {
            smoothed[i] = moving_average[i];
        }
        log::debug!(
            "Populated look bins {}..{:?}; {} edge bins use the moving average",
            r.start,
            r.end,
            edge + 1
        );
    }

    for (value, &count) in smoothed.iter_mut().zip(counts.iter()) {
        if count < min_samples {
            *value = 0.0;
        }
    }

    Ok((smoothed, range))
}
