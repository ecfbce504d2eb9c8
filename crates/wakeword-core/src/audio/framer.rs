//! Frame assembly for capture callbacks
//!
//! Microphone drivers deliver audio in whatever chunk size their DMA
//! buffers use. The detector wants exactly one frame per call, so the
//! capture side pushes chunks into a [`FrameAssembler`] and the detection
//! task pops whole frames, in arrival order, as they become available.

use crate::error::{Result, WakeWordError};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

/// Ring-buffered frame assembler
///
/// Overflow drops the newest samples (the ring is never overwritten) and
/// counts them, so a stalled consumer shows up as `dropped_samples`.
///
/// # Example
/// ```
/// use wakeword_core::audio::framer::FrameAssembler;
///
/// let mut framer = FrameAssembler::new(4, 2).unwrap();
/// framer.push(&[1, 2, 3]);
/// assert!(framer.next_frame_vec().is_none());
///
/// framer.push(&[4, 5]);
/// assert_eq!(framer.next_frame_vec(), Some(vec![1, 2, 3, 4]));
/// assert_eq!(framer.available(), 1);
/// ```
pub struct FrameAssembler {
    /// Samples per emitted frame
    frame_samples: usize,
    producer: HeapProd<i16>,
    consumer: HeapCons<i16>,
    /// Samples rejected because the ring was full
    dropped_samples: u64,
}

impl FrameAssembler {
    /// Create an assembler emitting `frame_samples`-long frames
    ///
    /// # Arguments
    /// * `frame_samples` - Samples per frame (e.g. 1280 for 80ms at 16kHz)
    /// * `capacity_frames` - How many frames the ring can hold before dropping
    pub fn new(frame_samples: usize, capacity_frames: usize) -> Result<Self> {
        if frame_samples == 0 || capacity_frames == 0 {
            return Err(WakeWordError::InvalidArgument(format!(
                "frame assembler needs non-zero sizes (frame {}, capacity {})",
                frame_samples, capacity_frames
            )));
        }

        let capacity = frame_samples
            .checked_mul(capacity_frames)
            .filter(|&n| n <= isize::MAX as usize / std::mem::size_of::<i16>())
            .ok_or_else(|| {
                WakeWordError::InvalidArgument(format!(
                    "frame assembler capacity overflows (frame {}, capacity {})",
                    frame_samples, capacity_frames
                ))
            })?;

        let ring = HeapRb::<i16>::new(capacity);
        let (producer, consumer) = ring.split();

        Ok(Self {
            frame_samples,
            producer,
            consumer,
            dropped_samples: 0,
        })
    }

    /// Append a capture chunk
    ///
    /// # Returns
    /// Number of samples accepted; the rest were dropped
    pub fn push(&mut self, chunk: &[i16]) -> usize {
        let written = self.producer.push_slice(chunk);
        let dropped = chunk.len() - written;
        if dropped > 0 {
            self.dropped_samples += dropped as u64;
            tracing::warn!(dropped, "Frame assembler full, dropping samples");
        }
        written
    }

    /// Pop the next complete frame into `frame`
    ///
    /// # Returns
    /// `true` if a frame was written to the first `frame_samples` slots
    pub fn next_frame(&mut self, frame: &mut [i16]) -> bool {
        if frame.len() < self.frame_samples || self.consumer.occupied_len() < self.frame_samples
        {
            return false;
        }
        self.consumer.pop_slice(&mut frame[..self.frame_samples]);
        true
    }

    /// Pop the next complete frame into a new vector
    pub fn next_frame_vec(&mut self) -> Option<Vec<i16>> {
        let mut frame = vec![0i16; self.frame_samples];
        self.next_frame(&mut frame).then_some(frame)
    }

    /// Samples currently buffered
    pub fn available(&self) -> usize {
        self.consumer.occupied_len()
    }

    pub fn frame_samples(&self) -> usize {
        self.frame_samples
    }

    /// Total samples dropped on overflow
    pub fn dropped_samples(&self) -> u64 {
        self.dropped_samples
    }

    /// Discard all buffered samples
    pub fn clear(&mut self) {
        self.consumer.clear();
    }
}
