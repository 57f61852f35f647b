//! Binary PCM output framing.
//!
//! Audio is written as signed 16-bit little-endian mono samples. Every
//! utterance is zero-padded to a whole number of frames and followed by a
//! 4-byte boundary marker so the reader can split utterances without any
//! out-of-band signalling.

use crate::audio::pcm::encode_s16le;
use crate::defaults;
use crate::error::Result;
use std::io::Write;

/// Utterance boundary marker as written on the wire.
pub const UTTERANCE_BOUNDARY: [u8; 4] = 0xDEAD_BEEFu32.to_le_bytes();

/// Writes PCM samples and utterance boundaries to a byte stream.
pub struct FrameWriter<W: Write> {
    writer: W,
    frame_bytes: usize,
    utterance_bytes: u64,
}

impl<W: Write> FrameWriter<W> {
    /// Writer aligned to the default telephony frame size.
    pub fn new(writer: W) -> Self {
        Self::with_frame_bytes(writer, defaults::OUTPUT_FRAME_BYTES)
    }

    /// Writer that pads utterances to a multiple of `frame_bytes`.
    pub fn with_frame_bytes(writer: W, frame_bytes: usize) -> Self {
        Self {
            writer,
            frame_bytes: frame_bytes.max(1),
            utterance_bytes: 0,
        }
    }

    /// Write samples and flush so the consumer sees them immediately.
    ///
    /// Returns the number of bytes written.
    pub fn write_samples(&mut self, samples: &[i16]) -> Result<usize> {
        if samples.is_empty() {
            return Ok(0);
        }
        let bytes = encode_s16le(samples);
        self.writer.write_all(&bytes)?;
        self.writer.flush()?;
        self.utterance_bytes += bytes.len() as u64;
        Ok(bytes.len())
    }

    /// Audio bytes written since the last boundary, excluding padding.
    pub fn utterance_bytes(&self) -> u64 {
        self.utterance_bytes
    }

    /// Pad the current utterance to a frame multiple and write the boundary.
    ///
    /// Returns the audio bytes of the utterance including padding.
    pub fn finish_utterance(&mut self) -> Result<u64> {
        let frame = self.frame_bytes as u64;
        let remainder = self.utterance_bytes % frame;
        let padding = if remainder == 0 { 0 } else { frame - remainder };
        if padding > 0 {
            self.writer.write_all(&vec![0u8; padding as usize])?;
        }
        let total = self.utterance_bytes + padding;
        self.utterance_bytes = 0;
        self.write_boundary()?;
        Ok(total)
    }

    /// Write a bare boundary marker.
    pub fn write_boundary(&mut self) -> Result<()> {
        self.writer.write_all(&UTTERANCE_BOUNDARY)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_bytes() {
        assert_eq!(UTTERANCE_BOUNDARY, [0xEF, 0xBE, 0xAD, 0xDE]);
    }

    #[test]
    fn test_samples_are_little_endian() {
        let mut writer = FrameWriter::new(Vec::new());
        assert_eq!(writer.write_samples(&[1, -2]).unwrap(), 4);
        assert_eq!(writer.into_inner(), vec![0x01, 0x00, 0xFE, 0xFF]);
    }

    #[test]
    fn test_finish_pads_to_frame_multiple() {
        let mut writer = FrameWriter::new(Vec::new());
        writer.write_samples(&[7i16; 100]).unwrap();
        assert_eq!(writer.utterance_bytes(), 200);

        let total = writer.finish_utterance().unwrap();
        assert_eq!(total, 320);
        assert_eq!(writer.utterance_bytes(), 0);

        let out = writer.into_inner();
        assert_eq!(out.len(), 324);
        assert!(out[200..320].iter().all(|&b| b == 0));
        assert_eq!(&out[320..], &UTTERANCE_BOUNDARY);
    }

    #[test]
    fn test_aligned_utterance_gets_no_padding() {
        let mut writer = FrameWriter::new(Vec::new());
        writer.write_samples(&[1i16; 320]).unwrap();
        assert_eq!(writer.finish_utterance().unwrap(), 640);
        assert_eq!(writer.into_inner().len(), 644);
    }

    #[test]
    fn test_empty_utterance_is_only_boundary() {
        let mut writer = FrameWriter::new(Vec::new());
        assert_eq!(writer.finish_utterance().unwrap(), 0);
        assert_eq!(writer.into_inner(), UTTERANCE_BOUNDARY.to_vec());
    }

    #[test]
    fn test_odd_chunks_accumulate_before_padding() {
        let mut writer = FrameWriter::with_frame_bytes(Vec::new(), 8);
        writer.write_samples(&[1]).unwrap();
        writer.write_samples(&[2, 3]).unwrap();
        assert_eq!(writer.finish_utterance().unwrap(), 8);
        assert_eq!(writer.into_inner().len(), 12);
    }
}
