//! # PCM Sample Buffers
//!
//! Interleaved PCM in one of the four layouts a voice accepts. The sample
//! type is carried as a tagged union ([`PcmData`]) so sources, the chunk cache
//! and the streaming voice handle 8-bit and 16-bit material through one type.
//!
//! Throughout the crate a *sample* means one frame: a value for every
//! channel at a single point in time. `samples()` therefore counts frames,
//! not individual channel values.

use crate::error::{PlaybackError, Result};
use bridge_traits::PcmFormat;
use bytes::{BufMut, Bytes, BytesMut};
use std::time::Duration;

/// Raw interleaved channel values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PcmData {
    /// Unsigned 8-bit values, silence at 128.
    Unsigned8(Vec<u8>),
    /// Signed 16-bit values.
    Signed16(Vec<i16>),
}

impl PcmData {
    fn empty_for(format: PcmFormat) -> Self {
        match format.bits_per_sample() {
            8 => PcmData::Unsigned8(Vec::new()),
            _ => PcmData::Signed16(Vec::new()),
        }
    }

    /// Number of individual channel values.
    pub fn len(&self) -> usize {
        match self {
            PcmData::Unsigned8(v) => v.len(),
            PcmData::Signed16(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn bits(&self) -> u16 {
        match self {
            PcmData::Unsigned8(_) => 8,
            PcmData::Signed16(_) => 16,
        }
    }
}

/// A run of interleaved PCM frames with a known layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmChunk {
    format: PcmFormat,
    data: PcmData,
}

impl PcmChunk {
    /// Wrap raw values, checking they match `format`.
    pub fn new(format: PcmFormat, data: PcmData) -> Result<Self> {
        if data.bits() != format.bits_per_sample() {
            return Err(PlaybackError::InvalidFormat(format!(
                "{}-bit data supplied for {} layout",
                data.bits(),
                format
            )));
        }
        if data.len() % format.channels() as usize != 0 {
            return Err(PlaybackError::InvalidFormat(format!(
                "{} values do not form whole {} frames",
                data.len(),
                format
            )));
        }
        Ok(Self { format, data })
    }

    /// A chunk with no frames.
    pub fn empty(format: PcmFormat) -> Self {
        Self {
            format,
            data: PcmData::empty_for(format),
        }
    }

    /// `samples` frames of silence.
    pub fn silence(format: PcmFormat, samples: usize) -> Self {
        let values = samples * format.channels() as usize;
        let data = match format.bits_per_sample() {
            8 => PcmData::Unsigned8(vec![128; values]),
            _ => PcmData::Signed16(vec![0; values]),
        };
        Self { format, data }
    }

    /// Convenience constructor for 16-bit layouts.
    pub fn from_i16(format: PcmFormat, values: Vec<i16>) -> Result<Self> {
        Self::new(format, PcmData::Signed16(values))
    }

    /// Convenience constructor for 8-bit layouts.
    pub fn from_u8(format: PcmFormat, values: Vec<u8>) -> Result<Self> {
        Self::new(format, PcmData::Unsigned8(values))
    }

    pub fn format(&self) -> PcmFormat {
        self.format
    }

    pub fn data(&self) -> &PcmData {
        &self.data
    }

    /// Number of frames.
    pub fn samples(&self) -> usize {
        self.data.len() / self.format.channels() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Playback length at `sample_rate`.
    pub fn duration(&self, sample_rate: u32) -> Duration {
        if sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples() as f64 / f64::from(sample_rate))
    }

    /// Copy of frames `[start, start + len)`, clamped to the chunk.
    pub fn slice(&self, start: usize, len: usize) -> PcmChunk {
        let channels = self.format.channels() as usize;
        let total = self.samples();
        let start = start.min(total);
        let end = start.saturating_add(len).min(total);
        let range = start * channels..end * channels;
        let data = match &self.data {
            PcmData::Unsigned8(v) => PcmData::Unsigned8(v[range].to_vec()),
            PcmData::Signed16(v) => PcmData::Signed16(v[range].to_vec()),
        };
        PcmChunk {
            format: self.format,
            data,
        }
    }

    /// Append the frames of `other`, which must share this chunk's layout.
    pub fn append(&mut self, other: &PcmChunk) -> Result<()> {
        if other.format != self.format {
            return Err(PlaybackError::InvalidFormat(format!(
                "cannot append {} frames to a {} chunk",
                other.format, self.format
            )));
        }
        match (&mut self.data, &other.data) {
            (PcmData::Unsigned8(a), PcmData::Unsigned8(b)) => a.extend_from_slice(b),
            (PcmData::Signed16(a), PcmData::Signed16(b)) => a.extend_from_slice(b),
            _ => {
                return Err(PlaybackError::Internal(
                    "PCM data does not match its declared format".to_string(),
                ))
            }
        }
        Ok(())
    }

    /// Little-endian byte image for uploading to a voice.
    pub fn to_le_bytes(&self) -> Bytes {
        match &self.data {
            PcmData::Unsigned8(v) => Bytes::copy_from_slice(v),
            PcmData::Signed16(v) => {
                let mut buf = BytesMut::with_capacity(v.len() * 2);
                for value in v {
                    buf.put_i16_le(*value);
                }
                buf.freeze()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_mismatch_rejected() {
        let err = PcmChunk::from_u8(PcmFormat::Pcm16X1, vec![1, 2]).unwrap_err();
        assert!(err.is_format_error());

        let err = PcmChunk::from_i16(PcmFormat::Pcm16X2, vec![1, 2, 3]).unwrap_err();
        assert!(err.is_format_error());
    }

    #[test]
    fn test_samples_count_frames() {
        let chunk = PcmChunk::from_i16(PcmFormat::Pcm16X2, vec![0; 8]).unwrap();
        assert_eq!(chunk.samples(), 4);
        let chunk = PcmChunk::from_u8(PcmFormat::Pcm8X1, vec![128; 8]).unwrap();
        assert_eq!(chunk.samples(), 8);
    }

    #[test]
    fn test_slice_is_frame_aligned_and_clamped() {
        let chunk = PcmChunk::from_i16(PcmFormat::Pcm16X2, vec![1, 2, 3, 4, 5, 6]).unwrap();
        let mid = chunk.slice(1, 1);
        assert_eq!(mid.data(), &PcmData::Signed16(vec![3, 4]));

        let tail = chunk.slice(2, 10);
        assert_eq!(tail.samples(), 1);
        assert!(chunk.slice(5, 2).is_empty());
    }

    #[test]
    fn test_append_requires_same_layout() {
        let mut a = PcmChunk::silence(PcmFormat::Pcm8X2, 2);
        let b = PcmChunk::silence(PcmFormat::Pcm8X2, 3);
        a.append(&b).unwrap();
        assert_eq!(a.samples(), 5);

        let c = PcmChunk::silence(PcmFormat::Pcm16X2, 1);
        assert!(a.append(&c).is_err());
    }

    #[test]
    fn test_le_bytes() {
        let chunk = PcmChunk::from_i16(PcmFormat::Pcm16X1, vec![0x0102, -1]).unwrap();
        assert_eq!(chunk.to_le_bytes().as_ref(), &[0x02, 0x01, 0xff, 0xff]);

        let silence = PcmChunk::silence(PcmFormat::Pcm8X1, 2);
        assert_eq!(silence.to_le_bytes().as_ref(), &[128, 128]);
    }

    #[test]
    fn test_duration() {
        let chunk = PcmChunk::silence(PcmFormat::Pcm16X2, 22050);
        assert_eq!(chunk.duration(22050), Duration::from_secs(1));
        assert_eq!(chunk.duration(0), Duration::ZERO);
    }
}
