//! Shared numeric building blocks
//!
//! Every extractor, image or audio, pulls its transforms from here so the
//! single-image path and the per-frame video path run the exact same code.
//!
//! - 1-D: windows, dB conversion, RMS, STFT, Savitzky-Golay smoothing
//! - 2-D: [`Plane`] (a single-channel f64 raster), FFT, 8×8 DCT, convolution,
//!   Sobel gradients

use rustfft::{num_complex::Complex, FftPlanner};
use std::f64::consts::PI;

// =============================================================================
// STATISTICS
// =============================================================================

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance (divides by N, like numpy's default)
pub fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64
}

pub fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

pub fn min_max(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        })
}

pub fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Shannon entropy (bits) of a histogram of counts
pub fn entropy_bits(histogram: &[usize]) -> f64 {
    let total: usize = histogram.iter().sum();
    if total == 0 {
        return 0.0;
    }
    histogram
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / total as f64;
            -p * p.log2()
        })
        .sum()
}

// =============================================================================
// 1-D SIGNAL HELPERS
// =============================================================================

/// Hanning window function
pub fn hanning_window(size: usize) -> Vec<f64> {
    if size < 2 {
        return vec![1.0; size];
    }
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / (size - 1) as f64).cos()))
        .collect()
}

/// Convert linear magnitude to dB
pub fn to_db(value: f64) -> f64 {
    if value <= 0.0 {
        -96.0
    } else {
        20.0 * value.log10()
    }
}

/// Calculate RMS of a slice
pub fn rms(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&x| x * x).sum();
    (sum_sq / samples.len() as f64).sqrt()
}

/// Short-time Fourier transform with centred, reflect-padded frames.
///
/// Returns one spectrum per frame, each holding `n_fft / 2 + 1` bins.
pub fn stft(samples: &[f64], n_fft: usize, hop: usize) -> Vec<Vec<Complex<f64>>> {
    if samples.is_empty() || n_fft == 0 || hop == 0 {
        return Vec::new();
    }
    let padded = reflect_pad(samples, n_fft / 2);
    if padded.len() < n_fft {
        return Vec::new();
    }

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(n_fft);
    let window = hanning_window(n_fft);
    let n_bins = n_fft / 2 + 1;
    let n_frames = (padded.len() - n_fft) / hop + 1;

    let mut frames = Vec::with_capacity(n_frames);
    for i in 0..n_frames {
        let start = i * hop;
        let mut buffer: Vec<Complex<f64>> = padded[start..start + n_fft]
            .iter()
            .zip(window.iter())
            .map(|(&s, &w)| Complex::new(s * w, 0.0))
            .collect();
        fft.process(&mut buffer);
        buffer.truncate(n_bins);
        frames.push(buffer);
    }
    frames
}

/// Mirror `pad` samples onto each end (numpy "reflect" mode).
fn reflect_pad(samples: &[f64], pad: usize) -> Vec<f64> {
    let n = samples.len();
    if n < 2 {
        let fill = samples.first().copied().unwrap_or(0.0);
        return vec![fill; n + 2 * pad];
    }
    let period = 2 * (n - 1);
    let index = |i: isize| -> usize {
        let mut k = i.rem_euclid(period as isize) as usize;
        if k >= n {
            k = period - k;
        }
        k
    };
    (-(pad as isize)..(n + pad) as isize)
        .map(|i| samples[index(i)])
        .collect()
}

/// Savitzky-Golay smoothing, window 5, polynomial order 2.
///
/// Edges are handled by reflecting the signal.
pub fn savgol_5_2(values: &[f64]) -> Vec<f64> {
    const COEFFS: [f64; 5] = [-3.0, 12.0, 17.0, 12.0, -3.0];
    if values.len() < 5 {
        return values.to_vec();
    }
    let padded = reflect_pad(values, 2);
    (0..values.len())
        .map(|i| {
            COEFFS
                .iter()
                .enumerate()
                .map(|(k, c)| c * padded[i + k])
                .sum::<f64>()
                / 35.0
        })
        .collect()
}

/// Wrap an angle difference into [0, π].
pub fn circular_distance(a: f64, b: f64) -> f64 {
    let d = (a - b).abs() % (2.0 * PI);
    d.min(2.0 * PI - d)
}

// =============================================================================
// 2-D PLANES
// =============================================================================

/// Single-channel raster of f64 values, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Plane {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f64>,
}

impl Plane {
    pub fn new(width: usize, height: usize, data: Vec<f64>) -> Self {
        debug_assert_eq!(data.len(), width * height);
        Self { width, height, data }
    }

    pub fn filled(width: usize, height: usize, value: f64) -> Self {
        Self::new(width, height, vec![value; width * height])
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f64 {
        self.data[y * self.width + x]
    }

    /// Pixel lookup with reflected borders (OpenCV BORDER_REFLECT_101)
    #[inline]
    pub fn get_reflect(&self, x: isize, y: isize) -> f64 {
        let rx = reflect_index(x, self.width);
        let ry = reflect_index(y, self.height);
        self.data[ry * self.width + rx]
    }

    /// Copy out a rectangle, clipped to the plane.
    pub fn crop(&self, x: usize, y: usize, width: usize, height: usize) -> Plane {
        let x_end = (x + width).min(self.width);
        let y_end = (y + height).min(self.height);
        let x = x.min(x_end);
        let y = y.min(y_end);
        let mut data = Vec::with_capacity((x_end - x) * (y_end - y));
        for row in y..y_end {
            data.extend_from_slice(&self.data[row * self.width + x..row * self.width + x_end]);
        }
        Plane::new(x_end - x, y_end - y, data)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

fn reflect_index(i: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let period = 2 * (len as isize - 1);
    let mut k = i.rem_euclid(period);
    if k >= len as isize {
        k = period - k;
    }
    k as usize
}

/// 2-D FFT (rows then columns) of a plane; output is row-major, unshifted.
pub fn fft2d(plane: &Plane) -> Vec<Complex<f64>> {
    let (w, h) = (plane.width, plane.height);
    let mut data: Vec<Complex<f64>> = plane.data.iter().map(|&v| Complex::new(v, 0.0)).collect();
    if w == 0 || h == 0 {
        return data;
    }

    let mut planner = FftPlanner::new();
    let row_fft = planner.plan_fft_forward(w);
    for row in data.chunks_mut(w) {
        row_fft.process(row);
    }

    let col_fft = planner.plan_fft_forward(h);
    let mut column = vec![Complex::new(0.0, 0.0); h];
    for x in 0..w {
        for y in 0..h {
            column[y] = data[y * w + x];
        }
        col_fft.process(&mut column);
        for y in 0..h {
            data[y * w + x] = column[y];
        }
    }
    data
}

/// Distance of FFT bin (x, y) from the zero-frequency point after an fftshift.
pub fn shifted_radius(x: usize, y: usize, width: usize, height: usize) -> f64 {
    // fftshift moves bin 0 to index n/2; equivalently, bins above n/2 are negative frequencies
    let fx = if x >= width - width / 2 { x as f64 - width as f64 } else { x as f64 };
    let fy = if y >= height - height / 2 { y as f64 - height as f64 } else { y as f64 };
    (fx * fx + fy * fy).sqrt()
}

/// Orthonormal 8×8 DCT-II basis, `basis[k][n]`.
pub fn dct8_basis() -> [[f64; 8]; 8] {
    let mut basis = [[0.0; 8]; 8];
    for (k, row) in basis.iter_mut().enumerate() {
        let scale = if k == 0 { (1.0f64 / 8.0).sqrt() } else { (2.0f64 / 8.0).sqrt() };
        for (n, v) in row.iter_mut().enumerate() {
            *v = scale * (PI * (2 * n + 1) as f64 * k as f64 / 16.0).cos();
        }
    }
    basis
}

/// 2-D orthonormal DCT-II of one 8×8 block (same scaling as OpenCV's `dct`).
pub fn dct8x8(block: &[[f64; 8]; 8], basis: &[[f64; 8]; 8]) -> [[f64; 8]; 8] {
    let mut rows = [[0.0; 8]; 8];
    for y in 0..8 {
        for k in 0..8 {
            rows[y][k] = (0..8).map(|n| basis[k][n] * block[y][n]).sum();
        }
    }
    let mut out = [[0.0; 8]; 8];
    for x in 0..8 {
        for k in 0..8 {
            out[k][x] = (0..8).map(|n| basis[k][n] * rows[n][x]).sum();
        }
    }
    out
}

/// Same-size 2-D convolution with reflected borders.
pub fn convolve(plane: &Plane, kernel: &[f64], ksize: usize) -> Plane {
    let half = (ksize / 2) as isize;
    let mut out = Vec::with_capacity(plane.data.len());
    for y in 0..plane.height as isize {
        for x in 0..plane.width as isize {
            let mut acc = 0.0;
            for ky in 0..ksize as isize {
                for kx in 0..ksize as isize {
                    let k = kernel[(ky as usize) * ksize + kx as usize];
                    if k != 0.0 {
                        acc += k * plane.get_reflect(x + kx - half, y + ky - half);
                    }
                }
            }
            out.push(acc);
        }
    }
    Plane::new(plane.width, plane.height, out)
}

/// Sobel gradients (3×3, unnormalised like OpenCV). Returns (gx, gy).
pub fn sobel(plane: &Plane) -> (Plane, Plane) {
    const KX: [f64; 9] = [-1.0, 0.0, 1.0, -2.0, 0.0, 2.0, -1.0, 0.0, 1.0];
    const KY: [f64; 9] = [-1.0, -2.0, -1.0, 0.0, 0.0, 0.0, 1.0, 2.0, 1.0];
    (convolve(plane, &KX, 3), convolve(plane, &KY, 3))
}

pub fn gradient_magnitude(plane: &Plane) -> Plane {
    let (gx, gy) = sobel(plane);
    let data = gx
        .data
        .iter()
        .zip(gy.data.iter())
        .map(|(a, b)| (a * a + b * b).sqrt())
        .collect();
    Plane::new(plane.width, plane.height, data)
}

/// Fraction of pixels whose Sobel magnitude exceeds `threshold`
pub fn edge_density(plane: &Plane, threshold: f64) -> f64 {
    if plane.is_empty() {
        return 0.0;
    }
    let magnitude = gradient_magnitude(plane);
    let edges = magnitude.data.iter().filter(|&&m| m > threshold).count();
    edges as f64 / magnitude.data.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==========================================================================
    // WINDOW / LEVEL HELPERS
    // ==========================================================================
    //
    // These helpers are shared by the audio extractors. The Hanning window
    // tapers each STFT frame to zero at its edges to reduce spectral leakage.
    // ==========================================================================

    #[test]
    fn test_hanning_window_edges() {
        let window = hanning_window(100);
        assert!(window[0] < 0.001, "Window should start near zero, got {}", window[0]);
        assert!(window[99] < 0.001, "Window should end near zero, got {}", window[99]);
    }

    #[test]
    fn test_hanning_window_center() {
        let window = hanning_window(101);
        assert!((window[50] - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_to_db_floor() {
        assert_eq!(to_db(0.0), -96.0);
        assert!((to_db(0.1) + 20.0).abs() < 0.001);
    }

    #[test]
    fn test_rms_constant_and_empty() {
        assert!((rms(&[0.5, 0.5, 0.5]) - 0.5).abs() < 1e-12);
        assert_eq!(rms(&[]), 0.0);
    }

    // ==========================================================================
    // STATISTICS
    // ==========================================================================

    #[test]
    fn test_variance_is_population_variance() {
        // numpy.var([1, 2, 3, 4]) == 1.25
        assert!((variance(&[1.0, 2.0, 3.0, 4.0]) - 1.25).abs() < 1e-12);
        assert_eq!(variance(&[]), 0.0);
    }

    #[test]
    fn test_median_even_and_odd() {
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&mut [4.0, 1.0, 3.0, 2.0]), 2.5);
    }

    #[test]
    fn test_entropy_uniform_histogram() {
        // 256 equally likely codes carry exactly 8 bits
        let histogram = vec![10usize; 256];
        assert!((entropy_bits(&histogram) - 8.0).abs() < 1e-9);
        assert_eq!(entropy_bits(&[0, 0, 5]), 0.0);
    }

    #[test]
    fn test_circular_distance_wraps() {
        assert!((circular_distance(0.1, 2.0 * PI - 0.1) - 0.2).abs() < 1e-9);
        assert!((circular_distance(0.0, PI) - PI).abs() < 1e-9);
    }

    // ==========================================================================
    // STFT
    // ==========================================================================

    #[test]
    fn test_stft_frame_count_and_bins() {
        // Centred STFT: 1 + len / hop frames
        let samples = vec![0.0; 4096];
        let frames = stft(&samples, 1024, 256);
        assert_eq!(frames.len(), 1 + 4096 / 256);
        assert_eq!(frames[0].len(), 513);
    }

    #[test]
    fn test_stft_sine_peak_bin() {
        let sr = 8000.0;
        let freq = 1000.0;
        let samples: Vec<f64> = (0..8000)
            .map(|i| (2.0 * PI * freq * i as f64 / sr).sin())
            .collect();
        let frames = stft(&samples, 512, 128);
        let mid = &frames[frames.len() / 2];
        let peak = mid
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.norm().partial_cmp(&b.1.norm()).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        // bin = f * n_fft / sr = 64
        assert_eq!(peak, 64);
    }

    #[test]
    fn test_savgol_preserves_quadratic() {
        let values: Vec<f64> = (0..20).map(|i| (i as f64).powi(2)).collect();
        let smoothed = savgol_5_2(&values);
        for i in 2..18 {
            assert!((smoothed[i] - values[i]).abs() < 1e-9, "index {}", i);
        }
    }

    // ==========================================================================
    // 2-D TRANSFORMS
    // ==========================================================================

    #[test]
    fn test_fft2d_constant_plane_is_all_dc() {
        let plane = Plane::filled(8, 4, 2.0);
        let spectrum = fft2d(&plane);
        assert!((spectrum[0].re - 64.0).abs() < 1e-9);
        for c in &spectrum[1..] {
            assert!(c.norm() < 1e-9);
        }
    }

    #[test]
    fn test_shifted_radius() {
        assert_eq!(shifted_radius(0, 0, 8, 8), 0.0);
        // Index 7 of 8 is frequency -1
        assert_eq!(shifted_radius(7, 0, 8, 8), 1.0);
        assert_eq!(shifted_radius(3, 4, 8, 8), 5.0);
    }

    #[test]
    fn test_dct_constant_block_only_dc() {
        let basis = dct8_basis();
        let block = [[10.0; 8]; 8];
        let out = dct8x8(&block, &basis);
        // Orthonormal DC = 8 * mean
        assert!((out[0][0] - 80.0).abs() < 1e-9);
        for (k, row) in out.iter().enumerate() {
            for (j, &v) in row.iter().enumerate() {
                if k != 0 || j != 0 {
                    assert!(v.abs() < 1e-9);
                }
            }
        }
    }

    #[test]
    fn test_sobel_flat_plane_has_no_edges() {
        let plane = Plane::filled(10, 10, 128.0);
        assert_eq!(edge_density(&plane, 1.0), 0.0);
    }

    #[test]
    fn test_sobel_step_edge() {
        // Vertical step from 0 to 255 in the middle
        let data = (0..100).map(|i| if i % 10 < 5 { 0.0 } else { 255.0 }).collect();
        let plane = Plane::new(10, 10, data);
        let density = edge_density(&plane, 100.0);
        assert!((density - 0.2).abs() < 1e-9, "two columns of edges, got {}", density);
    }

    #[test]
    fn test_crop_clips_to_bounds() {
        let plane = Plane::new(4, 4, (0..16).map(|v| v as f64).collect());
        let crop = plane.crop(2, 2, 10, 10);
        assert_eq!((crop.width, crop.height), (2, 2));
        assert_eq!(crop.data, vec![10.0, 11.0, 14.0, 15.0]);
    }
}
