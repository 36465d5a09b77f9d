use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use thiserror::Error;

const TAG_RIFF: &str = "RIFF";
const TAG_WAVE: &str = "WAVE";
const TAG_FMT: &str = "fmt ";
const TAG_DATA: &str = "data";

const WAVE_FORMAT_PCM: u16 = 0x0001;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;
const PCM_FMT_CHUNK_SIZE: u32 = 16;

/// Sample data is pulled from the stream in blocks of roughly this many bytes.
const READ_BLOCK_BYTES: usize = 4096;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed container: expected {expected:?} tag")]
    MalformedContainer { expected: &'static str },
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("stream ended while reading {field}")]
    TruncatedStream { field: &'static str },
    #[error("I/O error while decoding: {0}")]
    Io(#[from] io::Error),
}

/// Format fields discovered from the `fmt ` chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WaveFormat {
    pub sample_rate: u32,
    /// Always 8 or 16.
    pub bits_per_sample: u16,
    pub channels: u16,
}

impl WaveFormat {
    pub fn duration_secs(&self, frame_count: usize) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        frame_count as f64 / self.sample_rate as f64
    }
}

/// Largest positive sample value representable at this bit depth.
pub fn max_amplitude(bits_per_sample: u16) -> f64 {
    2f64.powi(i32::from(bits_per_sample) - 1) - 1.0
}

/// Per-channel sample sequences, all of the same length.
///
/// 8-bit samples keep their raw unsigned byte value (0..=255); 16-bit samples
/// are signed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SampleBuffer {
    channels: Vec<Vec<i32>>,
}

impl SampleBuffer {
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn frame_count(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    #[allow(dead_code)]
    pub fn channel(&self, index: usize) -> Option<&[i32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    /// Take ownership of a single channel, discarding the rest.
    pub fn into_channel(mut self, index: usize) -> Option<Vec<i32>> {
        if index < self.channels.len() {
            Some(self.channels.swap_remove(index))
        } else {
            None
        }
    }
}

pub struct DecodedWave {
    pub format: WaveFormat,
    pub samples: SampleBuffer,
}

pub fn decode_file(path: &Path) -> Result<DecodedWave> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open audio file: {}", path.display()))?;

    let decoded = decode_wave(BufReader::new(file))
        .with_context(|| format!("Failed to decode WAV file: {}", path.display()))?;

    log::info!(
        "Decoded audio: {} frames x {} channel(s), {}Hz, {}-bit, {:.1}s",
        decoded.samples.frame_count(),
        decoded.format.channels,
        decoded.format.sample_rate,
        decoded.format.bits_per_sample,
        decoded.format.duration_secs(decoded.samples.frame_count())
    );

    Ok(decoded)
}

/// Decode a PCM WAV stream.
///
/// The reader is consumed: on success any bytes after the sample data are
/// drained, and on every path the reader is dropped before returning.
pub fn decode_wave<R: Read>(reader: R) -> Result<DecodedWave, DecodeError> {
    let mut stream = ChunkReader { inner: reader };

    stream.expect_tag(TAG_RIFF)?;
    let _riff_size = stream.read_u32("RIFF chunk size")?;
    stream.expect_tag(TAG_WAVE)?;
    stream.expect_tag(TAG_FMT)?;

    let fmt_size = stream.read_u32("fmt chunk size")?;
    let audio_format = stream.read_u16("audio format")?;
    let channels = stream.read_u16("channel count")?;
    let sample_rate = stream.read_u32("sample rate")?;
    let _byte_rate = stream.read_u32("byte rate")?;
    let _block_align = stream.read_u16("block align")?;
    let bits_per_sample = stream.read_u16("bits per sample")?;

    if fmt_size > PCM_FMT_CHUNK_SIZE {
        stream.skip(u64::from(fmt_size - PCM_FMT_CHUNK_SIZE), "fmt chunk extension")?;
    }

    if audio_format != WAVE_FORMAT_PCM && audio_format != WAVE_FORMAT_EXTENSIBLE {
        return Err(DecodeError::UnsupportedFormat(format!(
            "audio format code {:#06x} is not PCM",
            audio_format
        )));
    }
    if bits_per_sample != 8 && bits_per_sample != 16 {
        return Err(DecodeError::UnsupportedFormat(format!(
            "{} bits per sample (expected 8 or 16)",
            bits_per_sample
        )));
    }
    if channels == 0 {
        return Err(DecodeError::UnsupportedFormat("zero channels".into()));
    }

    stream.expect_tag(TAG_DATA)?;
    let data_size = stream.read_u32("data chunk size")? as usize;

    let format = WaveFormat {
        sample_rate,
        bits_per_sample,
        channels,
    };

    let bytes_per_sample = usize::from(bits_per_sample / 8);
    let channel_count = usize::from(channels);
    let frame_count = data_size / bytes_per_sample / channel_count;

    let samples = stream.read_samples(frame_count, channel_count, bytes_per_sample)?;

    // Anything after the sample data (padding, trailing chunks) is discarded.
    io::copy(&mut stream.inner, &mut io::sink())?;

    Ok(DecodedWave { format, samples })
}

struct ChunkReader<R> {
    inner: R,
}

impl<R: Read> ChunkReader<R> {
    fn fill(&mut self, buf: &mut [u8], field: &'static str) -> Result<(), DecodeError> {
        self.inner.read_exact(buf).map_err(|err| {
            if err.kind() == io::ErrorKind::UnexpectedEof {
                DecodeError::TruncatedStream { field }
            } else {
                DecodeError::Io(err)
            }
        })
    }

    fn read_array<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N], DecodeError> {
        let mut buf = [0u8; N];
        self.fill(&mut buf, field)?;
        Ok(buf)
    }

    fn read_u16(&mut self, field: &'static str) -> Result<u16, DecodeError> {
        Ok(u16::from_le_bytes(self.read_array(field)?))
    }

    fn read_u32(&mut self, field: &'static str) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.read_array(field)?))
    }

    fn expect_tag(&mut self, tag: &'static str) -> Result<(), DecodeError> {
        let found: [u8; 4] = self.read_array(tag)?;
        if found != tag.as_bytes() {
            return Err(DecodeError::MalformedContainer { expected: tag });
        }
        Ok(())
    }

    fn skip(&mut self, count: u64, field: &'static str) -> Result<(), DecodeError> {
        let skipped = io::copy(&mut (&mut self.inner).take(count), &mut io::sink())?;
        if skipped < count {
            return Err(DecodeError::TruncatedStream { field });
        }
        Ok(())
    }

    /// Reads `frame_count` interleaved frames and splits them per channel.
    fn read_samples(
        &mut self,
        frame_count: usize,
        channel_count: usize,
        bytes_per_sample: usize,
    ) -> Result<SampleBuffer, DecodeError> {
        let frame_bytes = channel_count * bytes_per_sample;
        let frames_per_block = (READ_BLOCK_BYTES / frame_bytes).max(1);

        // The header is untrusted: grow as data actually arrives.
        let reserve = frame_count.min(frames_per_block * 64);
        let mut channels: Vec<Vec<i32>> =
            (0..channel_count).map(|_| Vec::with_capacity(reserve)).collect();

        let mut block = vec![0u8; frames_per_block * frame_bytes];
        let mut remaining = frame_count;

        while remaining > 0 {
            let frames = remaining.min(frames_per_block);
            let bytes = &mut block[..frames * frame_bytes];
            self.fill(bytes, "sample data")?;

            for frame in bytes.chunks_exact(frame_bytes) {
                let raws = frame.chunks_exact(bytes_per_sample);
                for (channel, raw) in channels.iter_mut().zip(raws) {
                    let sample = match raw {
                        [byte] => i32::from(*byte),
                        [lo, hi] => i32::from(i16::from_le_bytes([*lo, *hi])),
                        _ => unreachable!("bit depth is validated before sample data"),
                    };
                    channel.push(sample);
                }
            }

            remaining -= frames;
        }

        Ok(SampleBuffer { channels })
    }
}
