//! RIFF/WAVE transcoder: walks the chunk list, copying every chunk byte-for-byte except `fmt `
//! (sample rate override), `data` (leading audio removed) and `smpl` (loop points shifted).

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::num::NonZeroU32;

use num_enum::FromPrimitive;

use crate::duration::samples_from_duration;
use crate::utils::{InvalidPointerError, SliceReadExt};
use crate::{Error, TrimRequest, error, smpl};

pub const RIFF: &[u8; 4] = b"RIFF";
pub const WAVE: &[u8; 4] = b"WAVE";
pub const FMT: &[u8; 4] = b"fmt ";
pub const DATA: &[u8; 4] = b"data";

const HEADER_SIZE: u64 = 12;

#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum SampleEncoding {
    Pcm = 0x0001,
    Float = 0x0003,
    Extensible = 0xFFFE,
    #[num_enum(catch_all)]
    Other(u16),
}

impl SampleEncoding {
    pub fn is_supported(self) -> bool {
        matches!(self, Self::Pcm | Self::Float)
    }
}

/// The canonical 16-byte `fmt ` chunk body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatChunk {
    pub format: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    /// Not trusted, some writers get it wrong.
    pub block_align: u16,
    pub bits_per_sample: u16,
}

impl FormatChunk {
    pub const SIZE: usize = 16;

    pub fn parse(bytes: &[u8]) -> Result<Self, InvalidPointerError> {
        let mut pointer = 0;
        Ok(Self {
            format: bytes.read_u16_le(&mut pointer)?,
            channels: bytes.read_u16_le(&mut pointer)?,
            sample_rate: bytes.read_u32_le(&mut pointer)?,
            byte_rate: bytes.read_u32_le(&mut pointer)?,
            block_align: bytes.read_u16_le(&mut pointer)?,
            bits_per_sample: bytes.read_u16_le(&mut pointer)?,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::SIZE);
        bytes.extend_from_slice(&self.format.to_le_bytes());
        bytes.extend_from_slice(&self.channels.to_le_bytes());
        bytes.extend_from_slice(&self.sample_rate.to_le_bytes());
        bytes.extend_from_slice(&self.byte_rate.to_le_bytes());
        bytes.extend_from_slice(&self.block_align.to_le_bytes());
        bytes.extend_from_slice(&self.bits_per_sample.to_le_bytes());
        bytes
    }

    pub fn encoding(&self) -> SampleEncoding {
        SampleEncoding::from_primitive(self.format)
    }

    pub fn bytes_per_sample(&self) -> u32 {
        u32::from(self.bits_per_sample).div_ceil(8)
    }

    /// Number of bytes covering `duration_ms` of audio, rounded half up.
    pub fn bytes_from_duration(&self, duration_ms: f64) -> u64 {
        let bytes_per_second =
            f64::from(self.sample_rate) * f64::from(self.channels) * f64::from(self.bytes_per_sample());
        (0.5 + duration_ms * bytes_per_second / 1000.0) as u64
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    /// Bytes removed from the front of the `data` chunk.
    pub delay_bytes: u64,
    pub delay_samples: u64,
    pub loops_shifted: usize,
}

struct Walker {
    rate: Option<NonZeroU32>,
    delay_ms: f64,
    format: Option<FormatChunk>,
    summary: Summary,
}

impl Walker {
    fn format_chunk(&mut self, payload: &[u8]) -> Result<Vec<u8>, Error> {
        let mut format = FormatChunk::parse(payload)?;
        match self.rate {
            Some(rate) => format.sample_rate = rate.get(),
            None => self.rate = NonZeroU32::new(format.sample_rate),
        }

        self.summary.delay_samples = samples_from_duration(self.delay_ms, format.sample_rate);
        self.summary.delay_bytes = format.bytes_from_duration(self.delay_ms);
        tracing::debug!(
            sample_rate = format.sample_rate,
            channels = format.channels,
            bits_per_sample = format.bits_per_sample,
            delay_samples = self.summary.delay_samples,
            delay_bytes = self.summary.delay_bytes,
            "parsed format chunk"
        );

        let bytes = format.to_bytes();
        self.format = Some(format);
        Ok(bytes)
    }

    fn check_encoding(&self) -> Result<(), Error> {
        let format = self.format.as_ref().map_or(0, |format| format.format);
        if SampleEncoding::from_primitive(format).is_supported() {
            Ok(())
        } else {
            error::Kind::UnsupportedVariant { format }.into()
        }
    }
}

/// Trims `request.delay_ms` of audio from a RIFF/WAVE stream.
///
/// Returns [`error::Kind::FormatMismatch`] without writing anything when the input does not start
/// with a RIFF/WAVE header.
pub fn transcode<R, W>(reader: &mut R, writer: &mut W, request: &TrimRequest) -> Result<Summary, Error>
where
    R: Read + Seek + ?Sized,
    W: Write + Seek + ?Sized,
{
    reader.seek(SeekFrom::Start(0))?;
    let mut header = [0u8; HEADER_SIZE as usize];
    if read_up_to(reader, &mut header)? < header.len()
        || &header[0..4] != RIFF
        || &header[8..12] != WAVE
    {
        return error::Kind::FormatMismatch.into();
    }

    let base = writer.stream_position()?;
    writer.write_all(&header)?;

    let mut walker = Walker {
        rate: request.forced_rate,
        delay_ms: request.delay_ms,
        format: None,
        summary: Summary::default(),
    };

    loop {
        let mut chunk_header = [0u8; 8];
        if read_up_to(reader, &mut chunk_header)? < chunk_header.len() {
            break;
        }
        let tag: [u8; 4] = [chunk_header[0], chunk_header[1], chunk_header[2], chunk_header[3]];
        let length = i32::from_le_bytes([chunk_header[4], chunk_header[5], chunk_header[6], chunk_header[7]]);
        let Ok(length) = u32::try_from(length) else {
            return error::Kind::MalformedChunk { tag: String::from_utf8_lossy(&tag).into_owned(), length }
                .into();
        };
        let length = u64::from(length);
        let padded_length = length + (length & 1);
        let next_chunk = reader.stream_position()? + padded_length;

        tracing::debug!(tag = %String::from_utf8_lossy(&tag), length, "chunk");
        writer.write_all(&tag)?;

        if &tag == FMT && length == FormatChunk::SIZE as u64 {
            let mut payload = [0u8; FormatChunk::SIZE];
            reader.read_exact(&mut payload)?;
            let payload = walker.format_chunk(&payload)?;
            writer.write_all(&chunk_header[4..])?;
            writer.write_all(&payload)?;
        } else if &tag == DATA {
            walker.check_encoding()?;

            let skipped = walker.summary.delay_bytes.min(length);
            walker.summary.delay_bytes = skipped;
            reader.seek(SeekFrom::Current(skipped as i64))?;

            let remaining = length - skipped;
            writer.write_all(&(remaining as u32).to_le_bytes())?;
            copy_exact(reader, writer, remaining)?;
            if remaining & 1 == 1 {
                writer.write_all(&[0])?;
            }
        } else if &tag == smpl::TAG {
            // The declared length is not trusted until the bytes are read.
            let mut payload = Vec::new();
            (&mut *reader).take(padded_length).read_to_end(&mut payload)?;
            let end = payload.len().min(length as usize);
            match smpl::shift_loops_in_place(&mut payload[..end], walker.summary.delay_samples) {
                Ok(count) => walker.summary.loops_shifted += count,
                Err(_) => tracing::warn!(length, "sampler chunk too short, copying as is"),
            }
            writer.write_all(&chunk_header[4..])?;
            writer.write_all(&payload)?;
        } else {
            writer.write_all(&chunk_header[4..])?;
            copy_exact(reader, writer, padded_length)?;
        }

        reader.seek(SeekFrom::Start(next_chunk))?;
    }

    let end = writer.stream_position()?;
    writer.seek(SeekFrom::Start(base + 4))?;
    writer.write_all(&((end - base).saturating_sub(8) as u32).to_le_bytes())?;
    writer.seek(SeekFrom::Start(end))?;

    Ok(walker.summary)
}

/// Reads until `buf` is full or the stream ends, returning the number of bytes read.
fn read_up_to<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(read) => filled += read,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn copy_exact<R, W>(reader: &mut R, writer: &mut W, length: u64) -> io::Result<()>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let copied = io::copy(&mut (&mut *reader).take(length), writer)?;
    if copied < length {
        tracing::warn!(expected = length, copied, "chunk ends past the end of the file");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use rstest::rstest;

    use super::*;
    use crate::smpl::tests::{bounds, payload as smpl_payload};

    fn format_payload(format: u16, channels: u16, sample_rate: u32, bits_per_sample: u16) -> Vec<u8> {
        let block_align = channels * bits_per_sample.div_ceil(8);
        FormatChunk {
            format,
            channels,
            sample_rate,
            byte_rate: sample_rate * u32::from(block_align),
            block_align,
            bits_per_sample,
        }
        .to_bytes()
    }

    fn riff(chunks: &[(&[u8; 4], Vec<u8>)]) -> Vec<u8> {
        let mut body = WAVE.to_vec();
        for (tag, payload) in chunks {
            body.extend_from_slice(*tag);
            body.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            body.extend_from_slice(payload);
            if payload.len() % 2 == 1 {
                body.push(0);
            }
        }
        let mut bytes = RIFF.to_vec();
        bytes.extend_from_slice(&(body.len() as u32).to_le_bytes());
        bytes.extend(body);
        bytes
    }

    /// Returns `(tag, declared length, payload)` for every chunk of a RIFF image.
    fn chunks(bytes: &[u8]) -> Vec<([u8; 4], u32, Vec<u8>)> {
        let mut out = vec![];
        let mut pointer = 12;
        while pointer + 8 <= bytes.len() {
            let tag = bytes[pointer..pointer + 4].try_into().unwrap();
            let length = u32::from_le_bytes(bytes[pointer + 4..pointer + 8].try_into().unwrap());
            let start = pointer + 8;
            let end = start + length as usize;
            out.push((tag, length, bytes[start..end].to_vec()));
            pointer = end + (length as usize & 1);
        }
        out
    }

    fn run(input: &[u8], request: &TrimRequest) -> Result<(Summary, Vec<u8>), Error> {
        let mut reader = Cursor::new(input.to_vec());
        let mut writer = Cursor::new(Vec::new());
        let summary = transcode(&mut reader, &mut writer, request)?;
        Ok((summary, writer.into_inner()))
    }

    fn ramp(length: usize) -> Vec<u8> {
        (0..length).map(|i| i as u8).collect()
    }

    #[test]
    fn test_zero_delay_is_identity() {
        let input = riff(&[
            (FMT, format_payload(1, 2, 44_100, 16)),
            (b"LIST", b"INFOISFT\x05\x00\x00\x00test\x00".to_vec()),
            (DATA, ramp(400)),
            (smpl::TAG, smpl_payload(&[(10, 90)], &[])),
            (b"odd ", vec![1, 2, 3]),
        ]);

        let (summary, output) = run(&input, &TrimRequest::new(0.0, 0).unwrap()).unwrap();
        assert_eq!((summary.delay_bytes, summary.delay_samples, summary.loops_shifted), (0, 0, 1));
        assert_eq!(output, input);
    }

    #[test]
    fn test_trim_stereo_16bit() {
        let input = riff(&[
            (FMT, format_payload(1, 2, 1000, 16)),
            (DATA, ramp(400)),
            (b"junk", vec![0xAA; 7]),
            (smpl::TAG, smpl_payload(&[(1000, 2000), (5, 60)], &[])),
        ]);

        let (summary, output) = run(&input, &TrimRequest::new(10.0, 0).unwrap()).unwrap();
        assert_eq!(summary.delay_samples, 10);
        assert_eq!(summary.delay_bytes, 40);
        assert_eq!(summary.loops_shifted, 2);

        let chunks = chunks(&output);
        assert_eq!(chunks[1].0, *DATA);
        assert_eq!(chunks[1].1, 360);
        assert_eq!(chunks[1].2, ramp(400)[40..]);
        assert_eq!(chunks[2], (*b"junk", 7, vec![0xAA; 7]));
        assert_eq!(bounds(&chunks[3].2), vec![(990, 1990), (5, 50)]);

        assert_eq!(output.len(), input.len() - 40);
        let declared = u32::from_le_bytes(output[4..8].try_into().unwrap());
        assert_eq!(declared as usize, output.len() - 8);
    }

    #[rstest]
    #[case(101, 3, 98)]
    #[case(100, 3, 97)]
    #[case(100, 4, 96)]
    fn test_data_padding(#[case] data_length: usize, #[case] delay_ms: u32, #[case] expected: u32) {
        let input = riff(&[(FMT, format_payload(1, 1, 1000, 8)), (DATA, ramp(data_length)), (b"tail", vec![9; 4])]);

        let (summary, output) = run(&input, &TrimRequest::new(f64::from(delay_ms), 0).unwrap()).unwrap();
        assert_eq!(summary.delay_bytes, u64::from(delay_ms));

        let data_start = 12 + 8 + 16 + 8;
        let declared = u32::from_le_bytes(output[data_start - 4..data_start].try_into().unwrap());
        assert_eq!(declared, expected);

        let padded = expected as usize + (expected as usize & 1);
        if expected % 2 == 1 {
            assert_eq!(output[data_start + expected as usize], 0);
        }
        assert_eq!(&output[data_start + padded..data_start + padded + 4], b"tail");
        assert_eq!(chunks(&output)[2], (*b"tail", 4, vec![9; 4]));
    }

    #[test]
    fn test_forced_rate_rewrites_format_chunk() {
        let input = riff(&[(FMT, format_payload(1, 1, 22_050, 16)), (DATA, ramp(2000))]);

        let (summary, output) = run(&input, &TrimRequest::new(10.0, 48_000).unwrap()).unwrap();
        assert_eq!(summary.delay_samples, 480);
        assert_eq!(summary.delay_bytes, 960);

        let format = FormatChunk::parse(&chunks(&output)[0].2).unwrap();
        assert_eq!(format.sample_rate, 48_000);
        assert_eq!(format.byte_rate, 44_100);
        assert_eq!(chunks(&output)[1].1, 2000 - 960);
    }

    #[test]
    fn test_delay_longer_than_data() {
        let input = riff(&[(FMT, format_payload(3, 1, 1000, 32)), (DATA, ramp(40))]);

        let (summary, output) = run(&input, &TrimRequest::new(100.0, 0).unwrap()).unwrap();
        assert_eq!(summary.delay_bytes, 40);
        assert_eq!(chunks(&output)[1], (*DATA, 0, vec![]));
    }

    #[rstest]
    #[case(0xFFFE)]
    #[case(0x0002)]
    fn test_unsupported_encoding(#[case] format: u16) {
        let input = riff(&[(FMT, format_payload(format, 2, 44_100, 16)), (DATA, ramp(64))]);

        let err = run(&input, &TrimRequest::new(1.0, 0).unwrap()).unwrap_err();
        assert!(matches!(err.kind(), error::Kind::UnsupportedVariant { format: f } if *f == format));
    }

    #[test]
    fn test_extended_format_chunk_is_unsupported() {
        let mut extended = format_payload(1, 2, 44_100, 16);
        extended.extend_from_slice(&[0, 0]);
        let input = riff(&[(FMT, extended), (DATA, ramp(64))]);

        let err = run(&input, &TrimRequest::new(1.0, 0).unwrap()).unwrap_err();
        assert!(matches!(err.kind(), error::Kind::UnsupportedVariant { format: 0 }));
    }

    #[rstest]
    #[case(b"RIFF\x04\x00\x00\x00AVI ".to_vec())]
    #[case(b"fLaC\x00\x00\x00\x22".to_vec())]
    #[case(b"RIFF".to_vec())]
    #[case(vec![])]
    fn test_not_wave(#[case] input: Vec<u8>) {
        let mut reader = Cursor::new(input);
        let mut writer = Cursor::new(Vec::new());

        let err = transcode(&mut reader, &mut writer, &TrimRequest::new(1.0, 0).unwrap()).unwrap_err();
        assert!(err.is_format_mismatch());
        assert!(writer.into_inner().is_empty());
    }

    #[test]
    fn test_sampler_chunk_longer_than_file() {
        let mut input = RIFF.to_vec();
        input.extend_from_slice(&4u32.to_le_bytes());
        input.extend_from_slice(WAVE);
        input.extend_from_slice(smpl::TAG);
        input.extend_from_slice(&0x7FFF_FFF0u32.to_le_bytes());
        input.extend_from_slice(&[0; 60]);

        let (summary, output) = run(&input, &TrimRequest::new(10.0, 0).unwrap()).unwrap();
        assert_eq!(summary, Summary::default());
        assert_eq!(output.len(), input.len());
        assert_eq!(&output[12..], &input[12..]);
        let declared = u32::from_le_bytes(output[4..8].try_into().unwrap());
        assert_eq!(declared as usize, output.len() - 8);
    }

    #[test]
    fn test_negative_chunk_length() {
        let mut input = riff(&[(FMT, format_payload(1, 1, 1000, 8))]);
        input.extend_from_slice(b"bad ");
        input.extend_from_slice(&(-4i32).to_le_bytes());

        let err = run(&input, &TrimRequest::new(1.0, 0).unwrap()).unwrap_err();
        assert!(matches!(err.kind(), error::Kind::MalformedChunk { length: -4, .. }));
    }
}
