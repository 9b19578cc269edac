//! Stream resynchronisation
//!
//! Bytes arrive from the serial port in arbitrary chunks. The framer scans
//! for the two-byte marker, validates a full frame at that position and
//! either emits it or drops the first marker byte and scans again. Dropping
//! a single byte means a marker pair inside a corrupted frame is still found
//! on the next pass.

use tracing::debug;

use crate::frame::{OrientationFrame, FRAME_HEADER, FRAME_SIZE};
use crate::parser::{parse, ParseError};

/// Counters describing framing health
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FramerStats {
    /// Frames that passed validation
    pub frames: u64,
    /// Candidate frames rejected for a bad checksum
    pub checksum_failures: u64,
    /// Bytes thrown away while searching for a marker
    pub discarded_bytes: u64,
}

/// Push-based frame extractor
#[derive(Debug)]
pub struct Framer {
    buffer: Vec<u8>,
    stats: FramerStats,
}

impl Default for Framer {
    fn default() -> Self {
        Self::new()
    }
}

impl Framer {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(FRAME_SIZE * 4),
            stats: FramerStats::default(),
        }
    }

    /// Add incoming bytes and return every complete, valid frame.
    pub fn push_bytes(&mut self, data: &[u8]) -> Vec<OrientationFrame> {
        self.buffer.extend_from_slice(data);
        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_frame() {
            frames.push(frame);
        }
        frames
    }

    /// Drop any partial frame, e.g. after the port was reopened.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    pub fn stats(&self) -> FramerStats {
        self.stats
    }

    /// Bytes currently held waiting for the rest of a frame
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    fn try_extract_frame(&mut self) -> Option<OrientationFrame> {
        loop {
            self.resync();
            if self.buffer.len() < FRAME_SIZE {
                return None;
            }

            match parse(&self.buffer[..FRAME_SIZE]) {
                Ok(frame) => {
                    self.buffer.drain(..FRAME_SIZE);
                    self.stats.frames += 1;
                    return Some(frame);
                }
                Err(ParseError::BadChecksum { computed, stored }) => {
                    debug!(
                        "Dropping frame with bad checksum (computed {computed:#04x}, stored {stored:#04x})"
                    );
                    self.stats.checksum_failures += 1;
                    self.discard(1);
                }
                Err(e) => {
                    debug!("Dropping frame: {e}");
                    self.discard(1);
                }
            }
        }
    }

    /// Discard bytes until the marker is at the front of the buffer.
    ///
    /// A trailing lone 0xAA is kept since it may be the first half of a
    /// marker split across reads.
    fn resync(&mut self) {
        let start = self
            .buffer
            .windows(2)
            .position(|w| w == FRAME_HEADER)
            .unwrap_or_else(|| {
                if self.buffer.last() == Some(&FRAME_HEADER[0]) {
                    self.buffer.len() - 1
                } else {
                    self.buffer.len()
                }
            });
        if start > 0 {
            debug!("Resync: discarding {start} bytes");
            self.discard(start);
        }
    }

    fn discard(&mut self, count: usize) {
        self.buffer.drain(..count);
        self.stats.discarded_bytes += count as u64;
    }
}
