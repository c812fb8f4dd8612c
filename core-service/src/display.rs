//! # Transport Display
//!
//! Read-only snapshot of what the sequencer is playing, and a framing for
//! streaming snapshots to a remote display.
//!
//! ## Wire Format
//!
//! A stream is a run of frames terminated by a single `0x00` byte:
//!
//! ```text
//! ┌──────┬───────────────────────────────────────────────┐
//! │ 0x01 │ snapshot                                      │  repeated
//! └──────┴───────────────────────────────────────────────┘
//! ┌──────┐
//! │ 0x00 │                                                  end of stream
//! └──────┘
//!
//! snapshot (little-endian):
//!   i32 track_index │ i32 track_count │ f64 elapsed │ f64 duration │
//!   u8 play_state   │ str name │ str album │ str artist │
//!   u8 has_message  │ [str message]
//!
//! str: u32 byte length followed by UTF-8
//! ```

use bytes::{Buf, BufMut, BytesMut};
use core_playback::PlayState;
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};

/// Longest string accepted by [`DisplayStateReader`].
const MAX_STRING_BYTES: u32 = 64 * 1024;

/// Bytes of the fixed-width part of a snapshot.
const FIXED_BYTES: usize = 4 + 4 + 8 + 8 + 1;

/// Playback snapshot for a UI or remote display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayState {
    /// Live position of the current track, `-1` if it was removed.
    pub track_index: i32,
    pub track_count: i32,
    pub elapsed_seconds: f64,
    pub duration_seconds: f64,
    pub play_state: PlayState,
    pub name: String,
    pub album: String,
    pub artist: String,
    /// Optional status line.
    pub message: Option<String>,
}

impl DisplayState {
    /// Placeholder shown before anything plays.
    pub fn idle() -> Self {
        Self {
            track_index: 0,
            track_count: 0,
            elapsed_seconds: 0.0,
            duration_seconds: 0.0,
            play_state: PlayState::Stopped,
            name: String::new(),
            album: String::new(),
            artist: String::new(),
            message: None,
        }
    }

    /// Elapsed fraction in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        if self.duration_seconds <= 0.0 {
            return 0.0;
        }
        (self.elapsed_seconds / self.duration_seconds).clamp(0.0, 1.0)
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i32_le(self.track_index);
        buf.put_i32_le(self.track_count);
        buf.put_f64_le(self.elapsed_seconds);
        buf.put_f64_le(self.duration_seconds);
        buf.put_u8(self.play_state.code());
        put_str(buf, &self.name);
        put_str(buf, &self.album);
        put_str(buf, &self.artist);
        match &self.message {
            Some(message) => {
                buf.put_u8(1);
                put_str(buf, message);
            }
            None => buf.put_u8(0),
        }
    }

    fn decode<R: Read>(reader: &mut R) -> io::Result<Self> {
        let mut fixed = [0u8; FIXED_BYTES];
        reader.read_exact(&mut fixed)?;
        let mut header = &fixed[..];

        let track_index = header.get_i32_le();
        let track_count = header.get_i32_le();
        let elapsed_seconds = header.get_f64_le();
        let duration_seconds = header.get_f64_le();
        let play_state = PlayState::from_code(header.get_u8());
        let name = read_str(reader)?;
        let album = read_str(reader)?;
        let artist = read_str(reader)?;
        let message = if read_flag(reader)? {
            Some(read_str(reader)?)
        } else {
            None
        };

        Ok(Self {
            track_index,
            track_count,
            elapsed_seconds,
            duration_seconds,
            play_state,
            name,
            album,
            artist,
            message,
        })
    }
}

fn put_str(buf: &mut BytesMut, value: &str) {
    buf.put_u32_le(value.len() as u32);
    buf.put_slice(value.as_bytes());
}

fn read_str<R: Read>(reader: &mut R) -> io::Result<String> {
    let mut len = [0u8; 4];
    reader.read_exact(&mut len)?;
    let len = u32::from_le_bytes(len);
    if len > MAX_STRING_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("string of {} bytes exceeds {}", len, MAX_STRING_BYTES),
        ));
    }
    let mut bytes = vec![0u8; len as usize];
    reader.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn read_flag<R: Read>(reader: &mut R) -> io::Result<bool> {
    let mut flag = [0u8; 1];
    reader.read_exact(&mut flag)?;
    match flag[0] {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("invalid flag byte {:#04x}", other),
        )),
    }
}

// ============================================================================
// Writer
// ============================================================================

/// Writes framed snapshots. The end marker is written by
/// [`finish`](DisplayStateWriter::finish) or on drop, exactly once.
pub struct DisplayStateWriter<W: Write> {
    writer: W,
    buf: BytesMut,
    finished: bool,
}

impl<W: Write> DisplayStateWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            buf: BytesMut::with_capacity(128),
            finished: false,
        }
    }

    /// Write one snapshot frame.
    pub fn write_state(&mut self, state: &DisplayState) -> io::Result<()> {
        if self.finished {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "display stream already finished",
            ));
        }
        self.buf.clear();
        self.buf.put_u8(1);
        state.encode(&mut self.buf);
        self.writer.write_all(&self.buf)?;
        self.writer.flush()
    }

    /// Write the end marker. Later calls do nothing.
    pub fn finish(&mut self) -> io::Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.writer.write_all(&[0])?;
        self.writer.flush()
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }
}

impl<W: Write> Drop for DisplayStateWriter<W> {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            tracing::debug!(error = %e, "Failed to terminate display stream");
        }
    }
}

// ============================================================================
// Reader
// ============================================================================

/// Reads framed snapshots until the end marker.
pub struct DisplayStateReader<R: Read> {
    reader: R,
    ended: bool,
}

impl<R: Read> DisplayStateReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            ended: false,
        }
    }

    /// Next snapshot, or `None` once the end marker has been read.
    pub fn read_state(&mut self) -> io::Result<Option<DisplayState>> {
        if self.ended {
            return Ok(None);
        }
        if !read_flag(&mut self.reader)? {
            self.ended = true;
            return Ok(None);
        }
        DisplayState::decode(&mut self.reader).map(Some)
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }
}

impl<R: Read> Iterator for DisplayStateReader<R> {
    type Item = io::Result<DisplayState>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_state().transpose()
    }
}
