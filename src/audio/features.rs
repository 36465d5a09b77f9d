use rustfft::num_complex::Complex;
use serde::Serialize;

use super::analysis::{BAND_COUNT, FFT_SIZE};
use super::peaks::PeakState;

/// One analysed window: a complex value per log-spaced band.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpectrumFrame {
    pub bands: [Complex<f64>; BAND_COUNT],
}

impl SpectrumFrame {
    /// Band amplitude on the sample scale: `2 * |X| / FFT_SIZE`.
    pub fn levels(&self) -> [f64; BAND_COUNT] {
        let mut levels = [0.0; BAND_COUNT];
        for (level, band) in levels.iter_mut().zip(&self.bands) {
            *level = 2.0 * band.re.hypot(band.im) / FFT_SIZE as f64;
        }
        levels
    }
}

impl Default for SpectrumFrame {
    fn default() -> Self {
        Self {
            bands: [Complex::new(0.0, 0.0); BAND_COUNT],
        }
    }
}

/// Serialisable per-frame output handed to whatever draws the spectrum.
#[derive(Clone, Debug, Serialize)]
pub struct FrameReport {
    /// Sample offset of the window within the channel.
    pub offset: usize,
    /// Playback position of the window start, in seconds.
    pub time: f64,
    pub levels: Vec<f64>,
    pub peaks: PeakState,
    pub signaled: bool,
}

impl FrameReport {
    pub fn new(
        offset: usize,
        sample_rate: u32,
        frame: &SpectrumFrame,
        peaks: PeakState,
        signaled: bool,
    ) -> Self {
        Self {
            offset,
            time: offset as f64 / f64::from(sample_rate.max(1)),
            levels: frame.levels().to_vec(),
            peaks,
            signaled,
        }
    }
}
