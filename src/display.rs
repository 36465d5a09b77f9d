use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::audio::analysis::{BandLayout, SpectrumAnalyzer};
use crate::audio::features::SpectrumFrame;
use crate::audio::peaks::{PeakDecayTracker, PeakState};

/// Bit depth assumed until a decoded file says otherwise.
pub const DEFAULT_BITS_PER_SAMPLE: u16 = 16;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    /// Band bars with falling peak markers
    #[default]
    Grid,
    /// Raw sample trace
    Wave,
    /// Do nothing
    #[serde(rename = "none")]
    #[value(name = "none")]
    Off,
}

impl DisplayMode {
    /// Grid and wave swap; `Off` stays off.
    pub fn toggle(self) -> Self {
        match self {
            DisplayMode::Grid => DisplayMode::Wave,
            DisplayMode::Wave => DisplayMode::Grid,
            DisplayMode::Off => DisplayMode::Off,
        }
    }
}

/// What the drawing side receives for one window.
#[derive(Clone, Debug, PartialEq)]
pub enum DisplayFrame {
    Grid {
        frame: SpectrumFrame,
        peaks: PeakState,
        signaled: bool,
    },
    Wave {
        samples: Vec<i32>,
        signaled: bool,
    },
}

/// Stateful consumer of analysis windows: owns the analyser scratch space
/// and the peak tracker, and turns each window into a [`DisplayFrame`].
pub struct SpectrumDisplay {
    mode: DisplayMode,
    bits_per_sample: u16,
    analyzer: Option<SpectrumAnalyzer>,
    tracker: PeakDecayTracker,
}

impl Default for SpectrumDisplay {
    fn default() -> Self {
        Self::new(DisplayMode::default())
    }
}

impl SpectrumDisplay {
    pub fn new(mode: DisplayMode) -> Self {
        Self {
            mode,
            bits_per_sample: DEFAULT_BITS_PER_SAMPLE,
            analyzer: None,
            tracker: PeakDecayTracker::new(DEFAULT_BITS_PER_SAMPLE),
        }
    }

    pub fn mode(&self) -> DisplayMode {
        self.mode
    }

    /// Switch between grid and wave at runtime. Held peaks survive a round
    /// trip through wave mode.
    pub fn toggle_mode(&mut self) -> DisplayMode {
        self.mode = self.mode.toggle();
        self.mode
    }

    pub fn bits_per_sample(&self) -> u16 {
        self.bits_per_sample
    }

    pub fn set_bits_per_sample(&mut self, bits_per_sample: u16) {
        if bits_per_sample != self.bits_per_sample {
            self.bits_per_sample = bits_per_sample;
            self.tracker.set_bits_per_sample(bits_per_sample);
        }
    }

    /// The band layout depends only on the sample rate, so the analyser is
    /// built once and replaced only if the rate changes.
    pub fn set_sample_rate(&mut self, sample_rate: u32) -> Result<()> {
        let rate = f64::from(sample_rate);
        if self.analyzer.as_ref().map(SpectrumAnalyzer::sample_rate) != Some(rate) {
            self.analyzer = Some(SpectrumAnalyzer::new(rate)?);
        }
        Ok(())
    }

    pub fn layout(&self) -> Option<&BandLayout> {
        self.analyzer.as_ref().map(SpectrumAnalyzer::layout)
    }

    #[allow(dead_code)]
    pub fn peaks(&self) -> PeakState {
        self.tracker.snapshot()
    }

    /// Process one window according to the current mode. `Off` does no
    /// work and yields nothing.
    pub fn show(&mut self, window: &[i32], signaled: bool) -> Result<Option<DisplayFrame>> {
        match self.mode {
            DisplayMode::Grid => {
                let analyzer = self
                    .analyzer
                    .as_mut()
                    .ok_or_else(|| anyhow::anyhow!("sample rate not set before analysis"))?;
                let frame = analyzer.analyze(window)?;
                let peaks = self.tracker.advance(&frame);
                Ok(Some(DisplayFrame::Grid {
                    frame,
                    peaks,
                    signaled,
                }))
            }
            DisplayMode::Wave => Ok(Some(DisplayFrame::Wave {
                samples: window.to_vec(),
                signaled,
            })),
            DisplayMode::Off => Ok(None),
        }
    }
}

/// Whether a window carries anything but the silence level of its bit depth
/// (8-bit samples are unsigned and idle at 128).
pub fn has_signal(window: &[i32], bits_per_sample: u16) -> bool {
    let silence = if bits_per_sample == 8 { 128 } else { 0 };
    window.iter().any(|&s| s != silence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::analysis::{AnalysisError, WINDOW_SIZE};

    fn ramp() -> Vec<i32> {
        (0..WINDOW_SIZE as i32).map(|i| (i % 200 - 100) * 150).collect()
    }

    #[test]
    fn toggle_swaps_grid_and_wave_only() {
        assert_eq!(DisplayMode::Grid.toggle(), DisplayMode::Wave);
        assert_eq!(DisplayMode::Wave.toggle(), DisplayMode::Grid);
        assert_eq!(DisplayMode::Off.toggle(), DisplayMode::Off);
    }

    #[test]
    fn grid_mode_analyzes_and_tracks_peaks() {
        let mut display = SpectrumDisplay::new(DisplayMode::Grid);
        display.set_sample_rate(44_100).unwrap();
        let shown = display.show(&ramp(), true).unwrap();
        match shown {
            Some(DisplayFrame::Grid { peaks, signaled, .. }) => {
                assert!(signaled);
                assert_eq!(peaks, display.peaks());
                assert!(peaks.cells[..31].iter().any(|c| c.row < 32));
            }
            other => panic!("expected grid frame, got {other:?}"),
        }
    }

    #[test]
    fn grid_mode_requires_sample_rate() {
        let mut display = SpectrumDisplay::default();
        assert!(display.show(&ramp(), false).is_err());
    }

    #[test]
    fn grid_mode_rejects_short_window() {
        let mut display = SpectrumDisplay::default();
        display.set_sample_rate(8_000).unwrap();
        let err = display.show(&[0; 100], false).unwrap_err();
        assert_eq!(
            err.downcast_ref::<AnalysisError>(),
            Some(&AnalysisError::InvalidWindowSize { expected: WINDOW_SIZE, actual: 100 })
        );
    }

    #[test]
    fn wave_mode_passes_samples_through() {
        let mut display = SpectrumDisplay::new(DisplayMode::Wave);
        let window = ramp();
        assert_eq!(
            display.show(&window, false).unwrap(),
            Some(DisplayFrame::Wave { samples: window, signaled: false })
        );
        assert_eq!(display.peaks(), PeakState::default());
    }

    #[test]
    fn none_mode_emits_nothing() {
        let mut display = SpectrumDisplay::new(DisplayMode::Off);
        display.set_sample_rate(44_100).unwrap();
        assert_eq!(display.show(&ramp(), true).unwrap(), None);
        assert_eq!(display.peaks(), PeakState::default());
    }

    #[test]
    fn toggling_keeps_peaks_across_wave_frames() {
        let mut display = SpectrumDisplay::new(DisplayMode::Grid);
        display.set_sample_rate(44_100).unwrap();
        display.show(&ramp(), true).unwrap();
        let held = display.peaks();

        assert_eq!(display.toggle_mode(), DisplayMode::Wave);
        assert_eq!(display.mode(), DisplayMode::Wave);
        assert!(matches!(display.show(&ramp(), true).unwrap(), Some(DisplayFrame::Wave { .. })));
        assert_eq!(display.peaks(), held);

        assert_eq!(display.toggle_mode(), DisplayMode::Grid);
        assert!(matches!(display.show(&ramp(), true).unwrap(), Some(DisplayFrame::Grid { .. })));
    }

    #[test]
    fn bit_depth_is_tracked() {
        let mut display = SpectrumDisplay::default();
        assert_eq!(display.bits_per_sample(), DEFAULT_BITS_PER_SAMPLE);
        display.set_bits_per_sample(8);
        assert_eq!(display.bits_per_sample(), 8);
    }

    #[test]
    fn silence_depends_on_bit_depth() {
        assert!(!has_signal(&[0, 0, 0], 16));
        assert!(has_signal(&[0, 0, 0], 8));
        assert!(!has_signal(&[128, 128], 8));
        assert!(has_signal(&[0, -1], 16));
    }
}
