//! The RIFF sampler (`smpl`) chunk, which carries sustain/release loop points as sample indices.
//!
//! The same record shows up as a plain chunk in WAVE files and wrapped in a `riff` APPLICATION
//! block in FLAC files, so both transcoders rewrite it through [`shift_loops_in_place`].

use crate::utils::{InvalidPointerError, SliceReadExt, SliceWriteExt};

pub const TAG: &[u8; 4] = b"smpl";

/// Offset of the first loop entry, and of the loop count inside the header.
const HEADER_SIZE: usize = 36;
const LOOP_COUNT_OFFSET: usize = 28;
const LOOP_SIZE: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleLoop {
    pub identifier: u32,
    pub loop_type: u32,
    pub start: u32,
    pub end: u32,
    pub fraction: u32,
    /// 0 means infinite.
    pub play_count: u32,
}

impl SampleLoop {
    fn read(bytes: &[u8], pointer: &mut usize) -> Result<Self, InvalidPointerError> {
        Ok(Self {
            identifier: bytes.read_u32_le(pointer)?,
            loop_type: bytes.read_u32_le(pointer)?,
            start: bytes.read_u32_le(pointer)?,
            end: bytes.read_u32_le(pointer)?,
            fraction: bytes.read_u32_le(pointer)?,
            play_count: bytes.read_u32_le(pointer)?,
        })
    }

    fn write(&self, bytes: &mut [u8], pointer: &mut usize) -> Result<(), InvalidPointerError> {
        bytes.write_u32_le(pointer, self.identifier)?;
        bytes.write_u32_le(pointer, self.loop_type)?;
        bytes.write_u32_le(pointer, self.start)?;
        bytes.write_u32_le(pointer, self.end)?;
        bytes.write_u32_le(pointer, self.fraction)?;
        bytes.write_u32_le(pointer, self.play_count)
    }

    /// Moves both bounds `delay_samples` towards the start. A bound that lies before the trim
    /// point is kept as it is.
    pub fn shift(&mut self, delay_samples: u64) {
        self.start = shift_bound(self.start, delay_samples);
        self.end = shift_bound(self.end, delay_samples);
    }
}

fn shift_bound(bound: u32, delay_samples: u64) -> u32 {
    match u32::try_from(delay_samples) {
        Ok(delay_samples) if bound >= delay_samples => bound - delay_samples,
        _ => bound,
    }
}

/// Loop entries of a serialized `smpl` payload (without the chunk tag and length).
///
/// Entries announced by the header but missing from the payload are not returned.
pub fn read_loops(payload: &[u8]) -> Result<Vec<SampleLoop>, InvalidPointerError> {
    let mut pointer = LOOP_COUNT_OFFSET;
    let count = payload.read_u32_le(&mut pointer)? as usize;
    let available = payload.len().saturating_sub(HEADER_SIZE) / LOOP_SIZE;

    let mut pointer = HEADER_SIZE;
    (0..count.min(available)).map(|_| SampleLoop::read(payload, &mut pointer)).collect()
}

/// Rewrites every loop of a serialized `smpl` payload in place and returns how many loops were
/// rewritten. All other bytes of the payload are left untouched.
pub fn shift_loops_in_place(
    payload: &mut [u8],
    delay_samples: u64,
) -> Result<usize, InvalidPointerError> {
    let mut loops = read_loops(payload)?;

    let mut pointer = HEADER_SIZE;
    for sample_loop in &mut loops {
        sample_loop.shift(delay_samples);
        sample_loop.write(payload, &mut pointer)?;
    }
    Ok(loops.len())
}
