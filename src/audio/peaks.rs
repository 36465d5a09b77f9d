use serde::Serialize;

use super::analysis::BAND_COUNT;
use super::decode::max_amplitude;
use super::features::SpectrumFrame;

/// Number of display rows; row 0 is the loudest, `ROW_COUNT` is silence.
pub const ROW_COUNT: usize = 32;
/// Frames a peak holds before it starts to fall.
pub const HOLD_FRAMES: u8 = 10;

const SILENT_ROW: u8 = ROW_COUNT as u8;
/// Level of the lowest lit row.
const ROW_FLOOR: f64 = 5.0;

/// Logarithmic level thresholds, `ROW_FLOOR` up to the bit depth's full scale.
#[derive(Clone, Debug, PartialEq)]
pub struct RowTable {
    thresholds: [f64; ROW_COUNT],
}

impl RowTable {
    pub fn new(bits_per_sample: u16) -> Self {
        let step = (max_amplitude(bits_per_sample) / ROW_FLOOR).powf(1.0 / ROW_COUNT as f64);
        let mut thresholds = [ROW_FLOOR; ROW_COUNT];
        for k in 1..ROW_COUNT {
            thresholds[k] = thresholds[k - 1] * step;
        }
        Self { thresholds }
    }

    #[allow(dead_code)]
    pub fn threshold(&self, k: usize) -> f64 {
        self.thresholds[k]
    }

    /// Row for a band level: `ROW_COUNT - k` for the smallest `k` with
    /// `thresholds[k-1] <= level < thresholds[k]`. Below the floor is
    /// silent; at or above the top threshold is row 0.
    pub fn row_for(&self, level: f64) -> u8 {
        if !(level >= self.thresholds[0]) {
            return SILENT_ROW;
        }
        match self.thresholds[1..].iter().position(|&t| level < t) {
            Some(i) => (ROW_COUNT - (i + 1)) as u8,
            None => 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PeakCell {
    pub row: u8,
    pub hold: u8,
}

impl Default for PeakCell {
    fn default() -> Self {
        Self {
            row: SILENT_ROW,
            hold: 0,
        }
    }
}

impl PeakCell {
    /// Snap up to a louder row immediately, otherwise hold for
    /// `HOLD_FRAMES` frames and then fall one row per frame.
    pub fn step(&mut self, row: u8) {
        if row < self.row {
            self.row = row;
            self.hold = 0;
            return;
        }

        self.hold = self.hold.saturating_add(1);
        if self.hold >= HOLD_FRAMES {
            self.hold = HOLD_FRAMES;
            self.row = row.min(self.row + 1);
        }
    }
}

/// Copy-out snapshot of every band's peak.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PeakState {
    pub cells: [PeakCell; ROW_COUNT],
}

pub struct PeakDecayTracker {
    table: RowTable,
    state: PeakState,
}

impl PeakDecayTracker {
    pub fn new(bits_per_sample: u16) -> Self {
        Self {
            table: RowTable::new(bits_per_sample),
            state: PeakState::default(),
        }
    }

    /// Rebuild the row table for a new bit depth; held peaks are kept.
    pub fn set_bits_per_sample(&mut self, bits_per_sample: u16) {
        self.table = RowTable::new(bits_per_sample);
    }

    #[allow(dead_code)]
    pub fn table(&self) -> &RowTable {
        &self.table
    }

    pub fn snapshot(&self) -> PeakState {
        self.state
    }

    #[allow(dead_code)]
    pub fn reset(&mut self) {
        self.state = PeakState::default();
    }

    pub fn advance(&mut self, frame: &SpectrumFrame) -> PeakState {
        self.advance_levels(&frame.levels())
    }

    pub fn advance_levels(&mut self, levels: &[f64; BAND_COUNT]) -> PeakState {
        for (cell, &level) in self.state.cells.iter_mut().zip(levels) {
            cell.step(self.table.row_for(level));
        }
        self.state
    }
}
