use rayon::prelude::*;
use rustfft::num_complex::Complex;
use thiserror::Error;

use super::features::{FrameReport, SpectrumFrame};
use super::fft::fft_in_place;
use super::peaks::PeakDecayTracker;

/// Samples consumed per analysed frame.
pub const WINDOW_SIZE: usize = 8192;
pub const FFT_SIZE: usize = 1024;
/// Decimation factor of the low-frequency transform.
pub const DECIMATION: usize = WINDOW_SIZE / FFT_SIZE;
pub const BAND_COUNT: usize = 31;
/// Bands below this index read the decimated transform, the rest read the
/// direct one.
pub const LOW_BAND_SPLIT: usize = 14;
/// Distance between consecutive window starts (about 59% overlap).
pub const WINDOW_STRIDE: usize = WINDOW_SIZE * 10 / 17;

const MIN_FREQ_HZ: f64 = 20.0;
const MAX_FREQ_HZ: f64 = 20_000.0;
const NYQUIST_BIN: usize = FFT_SIZE / 2;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum AnalysisError {
    #[error("analysis window must hold {expected} samples, got {actual}")]
    InvalidWindowSize { expected: usize, actual: usize },
    #[error("sample rate must be positive, got {0}")]
    InvalidSampleRate(f64),
}

/// Log-spaced band centre frequencies and the transform index each one reads.
#[derive(Clone, Debug, PartialEq)]
pub struct BandLayout {
    frequencies: [f64; BAND_COUNT],
    bins: [usize; BAND_COUNT],
}

impl BandLayout {
    /// Band `b` sits at `20 * 1000^(b/31)` Hz. Its fine bin is
    /// `freq / (rate / 8192)` rounded to nearest, not truncated; bands from
    /// `LOW_BAND_SPLIT` up read the direct transform at `fine_bin / 8`.
    pub fn new(sample_rate: f64) -> Result<Self, AnalysisError> {
        if !(sample_rate > 0.0) {
            return Err(AnalysisError::InvalidSampleRate(sample_rate));
        }

        let ratio = MAX_FREQ_HZ / MIN_FREQ_HZ;
        // Bin spacing of an 8192-point transform; the decimated transform
        // has exactly this spacing and the direct one is DECIMATION times
        // coarser.
        let fine_resolution = sample_rate / WINDOW_SIZE as f64;

        let mut frequencies = [0.0; BAND_COUNT];
        let mut bins = [0usize; BAND_COUNT];
        for band in 0..BAND_COUNT {
            let freq = MIN_FREQ_HZ * ratio.powf(band as f64 / BAND_COUNT as f64);
            let fine_bin = (freq / fine_resolution).round() as usize;
            let bin = if band < LOW_BAND_SPLIT {
                fine_bin
            } else {
                fine_bin / DECIMATION
            };
            frequencies[band] = freq;
            bins[band] = bin.min(NYQUIST_BIN);
        }

        log::debug!("Band layout @ {}Hz: bins {:?}", sample_rate, bins);

        Ok(Self { frequencies, bins })
    }

    pub fn frequencies(&self) -> &[f64; BAND_COUNT] {
        &self.frequencies
    }

    /// Index into the decimated transform for bands below
    /// [`LOW_BAND_SPLIT`], into the direct transform otherwise.
    pub fn bins(&self) -> &[usize; BAND_COUNT] {
        &self.bins
    }
}

/// Dual-resolution analyser. Owns its FFT scratch buffers, so one instance
/// must not be shared between threads while analysing; clone it instead.
#[derive(Clone, Debug)]
pub struct SpectrumAnalyzer {
    sample_rate: f64,
    layout: BandLayout,
    direct: Vec<Complex<f64>>,
    decimated: Vec<Complex<f64>>,
}

impl SpectrumAnalyzer {
    pub fn new(sample_rate: f64) -> Result<Self, AnalysisError> {
        Ok(Self {
            sample_rate,
            layout: BandLayout::new(sample_rate)?,
            direct: vec![Complex::new(0.0, 0.0); FFT_SIZE],
            decimated: vec![Complex::new(0.0, 0.0); FFT_SIZE],
        })
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn layout(&self) -> &BandLayout {
        &self.layout
    }

    pub fn analyze(&mut self, window: &[i32]) -> Result<SpectrumFrame, AnalysisError> {
        if window.len() != WINDOW_SIZE {
            return Err(AnalysisError::InvalidWindowSize {
                expected: WINDOW_SIZE,
                actual: window.len(),
            });
        }

        for (slot, &sample) in self.direct.iter_mut().zip(&window[..FFT_SIZE]) {
            *slot = Complex::new(f64::from(sample), 0.0);
        }

        // Averaging each group of 8 is a crude low-pass before dropping to
        // 1/8 of the sample rate.
        for (slot, group) in self.decimated.iter_mut().zip(window.chunks_exact(DECIMATION)) {
            let sum: f64 = group.iter().map(|&s| f64::from(s)).sum();
            *slot = Complex::new(sum / DECIMATION as f64, 0.0);
        }

        fft_in_place(&mut self.direct);
        fft_in_place(&mut self.decimated);

        let mut frame = SpectrumFrame::default();
        for (band, (slot, &bin)) in frame.bands.iter_mut().zip(self.layout.bins()).enumerate() {
            *slot = if band < LOW_BAND_SPLIT {
                self.decimated[bin]
            } else {
                self.direct[bin]
            };
        }

        Ok(frame)
    }
}

/// One-shot analysis of a single window.
#[allow(dead_code)]
pub fn analyze(window: &[i32], sample_rate: f64) -> Result<SpectrumFrame, AnalysisError> {
    SpectrumAnalyzer::new(sample_rate)?.analyze(window)
}

/// Start offsets of every full window in a channel of `frame_count` samples.
pub fn window_offsets(frame_count: usize) -> impl Iterator<Item = usize> {
    (0..)
        .map(|n| n * WINDOW_STRIDE)
        .take_while(move |&offset| offset + WINDOW_SIZE <= frame_count)
}

/// Analyse a whole channel without real-time pacing.
///
/// Windows follow the same schedule as the real-time feeder. Spectra are
/// computed in parallel; peak decay is then folded in window order.
pub fn analyze_offline(
    samples: &[i32],
    sample_rate: u32,
    bits_per_sample: u16,
) -> Result<Vec<FrameReport>, AnalysisError> {
    let prototype = SpectrumAnalyzer::new(f64::from(sample_rate))?;
    let offsets: Vec<usize> = window_offsets(samples.len()).collect();

    log::info!("Offline pass: {} windows", offsets.len());

    let spectra = offsets
        .par_iter()
        .map_init(
            || prototype.clone(),
            |analyzer, &offset| analyzer.analyze(&samples[offset..offset + WINDOW_SIZE]),
        )
        .collect::<Result<Vec<_>, _>>()?;

    let mut tracker = PeakDecayTracker::new(bits_per_sample);
    let reports = offsets
        .iter()
        .zip(&spectra)
        .map(|(&offset, frame)| {
            let window = &samples[offset..offset + WINDOW_SIZE];
            let peaks = tracker.advance(frame);
            let signaled = crate::display::has_signal(window, bits_per_sample);
            FrameReport::new(offset, sample_rate, frame, peaks, signaled)
        })
        .collect();

    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    const RATE: f64 = 44_100.0;

    fn tone(freq: f64, amplitude: f64, len: usize) -> Vec<i32> {
        (0..len)
            .map(|i| (amplitude * (2.0 * PI * freq * i as f64 / RATE).sin()).round() as i32)
            .collect()
    }

    fn loudest_band(frame: &SpectrumFrame) -> usize {
        let levels = frame.levels();
        (0..BAND_COUNT)
            .max_by(|&a, &b| levels[a].total_cmp(&levels[b]))
            .unwrap()
    }

    #[test]
    fn stride_constant() {
        assert_eq!(WINDOW_STRIDE, 4818);
        assert_eq!(DECIMATION, 8);
    }

    #[test]
    fn rejects_wrong_window_length() {
        let mut analyzer = SpectrumAnalyzer::new(RATE).unwrap();
        assert_eq!(
            analyzer.analyze(&[0; 1024]),
            Err(AnalysisError::InvalidWindowSize { expected: WINDOW_SIZE, actual: 1024 })
        );
    }

    #[test]
    fn rejects_non_positive_sample_rate() {
        assert!(matches!(SpectrumAnalyzer::new(0.0), Err(AnalysisError::InvalidSampleRate(_))));
        assert!(matches!(
            analyze(&[0; WINDOW_SIZE], -8000.0),
            Err(AnalysisError::InvalidSampleRate(_))
        ));
        assert!(matches!(BandLayout::new(f64::NAN), Err(AnalysisError::InvalidSampleRate(_))));
    }

    #[test]
    fn band_frequencies_are_log_spaced() {
        let layout = BandLayout::new(RATE).unwrap();
        let freqs = layout.frequencies();
        assert!((freqs[0] - 20.0).abs() < 1e-9);
        assert!(freqs.windows(2).all(|w| w[1] > w[0]));
        let ratio = freqs[1] / freqs[0];
        assert!(freqs.windows(2).all(|w| (w[1] / w[0] - ratio).abs() < 1e-9));
        assert!(freqs[30] < 20_000.0);
    }

    #[test]
    fn fine_bins_round_to_nearest() {
        // 20Hz / (44100/8192) = 3.72
        let layout = BandLayout::new(44_100.0).unwrap();
        assert_eq!(layout.bins()[0], 4);
        let freq = layout.frequencies()[17];
        let fine = (freq / (44_100.0 / WINDOW_SIZE as f64)).round() as usize;
        assert_eq!(layout.bins()[17], fine / DECIMATION);
    }

    #[test]
    fn bins_are_monotonic_within_each_region() {
        for rate in [8_000.0, 22_050.0, 44_100.0, 48_000.0, 96_000.0] {
            let layout = BandLayout::new(rate).unwrap();
            let bins = layout.bins();
            assert!(bins[..LOW_BAND_SPLIT].windows(2).all(|w| w[1] >= w[0]), "{rate}");
            assert!(bins[LOW_BAND_SPLIT..].windows(2).all(|w| w[1] >= w[0]), "{rate}");
            assert!(bins.iter().all(|&b| b <= FFT_SIZE / 2));
        }
    }

    #[test]
    fn low_sample_rates_clamp_to_nyquist() {
        let layout = BandLayout::new(8_000.0).unwrap();
        assert_eq!(layout.bins()[BAND_COUNT - 1], FFT_SIZE / 2);
    }

    #[test]
    fn silence_yields_zero_bands() {
        let frame = analyze(&[0; WINDOW_SIZE], RATE).unwrap();
        assert!(frame.levels().iter().all(|&l| l == 0.0));
    }

    #[test]
    fn low_tone_lands_in_decimated_band() {
        let mut analyzer = SpectrumAnalyzer::new(RATE).unwrap();
        let band = 8;
        let freq = analyzer.layout().bins()[band] as f64 * RATE / WINDOW_SIZE as f64;
        let frame = analyzer.analyze(&tone(freq, 8000.0, WINDOW_SIZE)).unwrap();

        assert_eq!(loudest_band(&frame), band);
        let level = frame.levels()[band];
        assert!((level - 8000.0).abs() / 8000.0 < 0.01, "level {level}");
    }

    #[test]
    fn high_tone_lands_in_direct_band() {
        let mut analyzer = SpectrumAnalyzer::new(RATE).unwrap();
        let band = 20;
        let freq = analyzer.layout().bins()[band] as f64 * RATE / FFT_SIZE as f64;
        let frame = analyzer.analyze(&tone(freq, 12_000.0, WINDOW_SIZE)).unwrap();

        assert_eq!(loudest_band(&frame), band);
        let level = frame.levels()[band];
        assert!((level - 12_000.0).abs() / 12_000.0 < 0.01, "level {level}");
    }

    #[test]
    fn scratch_reuse_does_not_leak_between_calls() {
        let mut analyzer = SpectrumAnalyzer::new(RATE).unwrap();
        let loud = tone(1000.0, 20_000.0, WINDOW_SIZE);
        let quiet = tone(300.0, 50.0, WINDOW_SIZE);
        let first = analyzer.analyze(&quiet).unwrap();
        analyzer.analyze(&loud).unwrap();
        assert_eq!(analyzer.analyze(&quiet).unwrap(), first);
    }

    #[test]
    fn window_offsets_stop_at_last_full_window() {
        assert_eq!(window_offsets(WINDOW_SIZE - 1).count(), 0);
        assert_eq!(window_offsets(WINDOW_SIZE).collect::<Vec<_>>(), vec![0]);
        let len = WINDOW_SIZE + 2 * WINDOW_STRIDE;
        assert_eq!(
            window_offsets(len).collect::<Vec<_>>(),
            vec![0, WINDOW_STRIDE, 2 * WINDOW_STRIDE]
        );
        assert_eq!(window_offsets(len - 1).count(), 2);
    }

    #[test]
    fn offline_pass_matches_sequential_analysis() {
        let samples = tone(440.0, 10_000.0, WINDOW_SIZE + 3 * WINDOW_STRIDE + 17);
        let reports = analyze_offline(&samples, 44_100, 16).unwrap();
        assert_eq!(reports.len(), 4);

        let mut analyzer = SpectrumAnalyzer::new(RATE).unwrap();
        let mut tracker = PeakDecayTracker::new(16);
        for (report, offset) in reports.iter().zip(window_offsets(samples.len())) {
            let frame = analyzer.analyze(&samples[offset..offset + WINDOW_SIZE]).unwrap();
            assert_eq!(report.offset, offset);
            assert_eq!(report.levels, frame.levels().to_vec());
            assert_eq!(report.peaks, tracker.advance(&frame));
            assert!(report.signaled);
        }
    }
}
