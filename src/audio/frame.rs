//! Fixed-size audio frames and the readers that produce them.

use crate::audio::pcm::decode_s16le;
use crate::error::Result;
use std::io::{ErrorKind, Read};

/// Fixed-duration slice of mono 16-bit PCM.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Position of this frame in the stream, starting at 0.
    pub index: u64,
    /// Audio samples as 16-bit PCM.
    pub samples: Vec<i16>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl AudioFrame {
    /// Creates a new audio frame.
    pub fn new(index: u64, samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            index,
            samples,
            sample_rate,
        }
    }

    /// Returns the duration of this frame in milliseconds.
    pub fn duration_ms(&self) -> u32 {
        (self.samples.len() as u64 * 1000 / self.sample_rate as u64) as u32
    }
}

/// Pull-based source of fixed-size frames.
///
/// `Ok(None)` marks end of stream; the source is not read again afterwards.
pub trait FrameSource {
    /// Read the next complete frame.
    fn next_frame(&mut self) -> Result<Option<AudioFrame>>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> Result<Option<AudioFrame>> {
        (**self).next_frame()
    }
}

/// Reads raw S16LE frames from a byte stream.
///
/// Each read blocks until a whole frame is available. A short final read
/// (fewer bytes than one frame) ends the stream and is not returned.
pub struct FrameReader<R: Read> {
    reader: R,
    frame_samples: usize,
    sample_rate: u32,
    next_index: u64,
    finished: bool,
    buffer: Vec<u8>,
}

impl<R: Read> FrameReader<R> {
    /// Creates a reader producing frames of `frame_samples` samples.
    pub fn new(reader: R, frame_samples: usize, sample_rate: u32) -> Self {
        Self {
            reader,
            frame_samples,
            sample_rate,
            next_index: 0,
            finished: false,
            buffer: vec![0u8; frame_samples * 2],
        }
    }

    /// Number of bytes in one frame.
    pub fn frame_bytes(&self) -> usize {
        self.frame_samples * 2
    }

    /// Fill the frame buffer, returning how many bytes were read before EOF.
    fn fill(&mut self) -> Result<usize> {
        let mut filled = 0;
        while filled < self.buffer.len() {
            match self.reader.read(&mut self.buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }
}

impl<R: Read> FrameSource for FrameReader<R> {
    fn next_frame(&mut self) -> Result<Option<AudioFrame>> {
        if self.finished {
            return Ok(None);
        }

        let filled = self.fill()?;
        if filled < self.frame_bytes() {
            self.finished = true;
            return Ok(None);
        }

        let frame = AudioFrame::new(
            self.next_index,
            decode_s16le(&self.buffer),
            self.sample_rate,
        );
        self.next_index += 1;
        Ok(Some(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::pcm::encode_s16le;
    use std::io::Cursor;

    /// Reader that hands out at most `step` bytes per call.
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        step: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = self.step.min(buf.len()).min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    #[test]
    fn test_audio_frame_duration() {
        let frame = AudioFrame::new(0, vec![0i16; 240], 8000);
        assert_eq!(frame.duration_ms(), 30);
    }

    #[test]
    fn test_reads_whole_frames_in_order() {
        let samples: Vec<i16> = (0..480).map(|i| i as i16).collect();
        let mut reader = FrameReader::new(Cursor::new(encode_s16le(&samples)), 240, 8000);

        let first = reader.next_frame().unwrap().unwrap();
        let second = reader.next_frame().unwrap().unwrap();
        assert_eq!(first.index, 0);
        assert_eq!(second.index, 1);
        assert_eq!(first.samples, samples[..240]);
        assert_eq!(second.samples, samples[240..]);
        assert!(reader.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_short_final_read_ends_stream() {
        let mut bytes = encode_s16le(&vec![7i16; 240]);
        bytes.extend_from_slice(&[1, 2, 3]);
        let mut reader = FrameReader::new(Cursor::new(bytes), 240, 8000);

        assert!(reader.next_frame().unwrap().is_some());
        assert!(reader.next_frame().unwrap().is_none());
        assert!(reader.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_assembles_frames_from_partial_reads() {
        let samples = vec![300i16; 480];
        let trickle = Trickle {
            data: encode_s16le(&samples),
            pos: 0,
            step: 37,
        };
        let mut reader = FrameReader::new(trickle, 240, 8000);

        assert_eq!(reader.next_frame().unwrap().unwrap().samples.len(), 240);
        assert_eq!(reader.next_frame().unwrap().unwrap().samples.len(), 240);
        assert!(reader.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_frame_bytes() {
        let reader = FrameReader::new(Cursor::new(Vec::new()), 240, 8000);
        assert_eq!(reader.frame_bytes(), 480);
    }
}
