use std::io::{Read, Seek, SeekFrom, Write};

use crate::{Error, TrimRequest, config, error, flac, wave};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Wave(wave::Summary),
    Flac(flac::Summary),
}

impl Container {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Wave(_) => "wave",
            Self::Flac(_) => "flac",
        }
    }
}

/// Runs the WAVE transcoder, then the FLAC one if the input is not a WAVE file.
///
/// Returns [`error::Kind::UnknownContainer`] when neither recognizes the input. On any error the
/// content of `writer` is unspecified.
pub fn transcode<R, W>(
    reader: &mut R,
    writer: &mut W,
    request: &TrimRequest,
    encoder: &config::Encoder,
) -> Result<Container, Error>
where
    R: Read + Seek,
    W: Write + Seek,
{
    match wave::transcode(reader, writer, request) {
        Err(e) if e.is_format_mismatch() => tracing::debug!("not a wave file"),
        result => return result.map(Container::Wave),
    }

    writer.seek(SeekFrom::Start(0))?;
    match flac::transcode(reader, writer, request, encoder) {
        Err(e) if e.is_format_mismatch() => error::Kind::UnknownContainer.into(),
        result => result.map(Container::Flac),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::flac::tests::{encode_stream, ramps};

    /// 8 kHz mono 16-bit, 320 bytes of audio.
    pub(crate) fn wave_image() -> Vec<u8> {
        let format = wave::FormatChunk {
            format: 1,
            channels: 1,
            sample_rate: 8000,
            byte_rate: 16_000,
            block_align: 2,
            bits_per_sample: 16,
        };

        let mut body = wave::WAVE.to_vec();
        body.extend_from_slice(wave::FMT);
        body.extend_from_slice(&16u32.to_le_bytes());
        body.extend(format.to_bytes());
        body.extend_from_slice(wave::DATA);
        body.extend_from_slice(&320u32.to_le_bytes());
        body.extend(std::iter::repeat_n(0x11, 320));

        let mut bytes = wave::RIFF.to_vec();
        bytes.extend_from_slice(&(body.len() as u32).to_le_bytes());
        bytes.extend(body);
        bytes
    }

    fn run(input: Vec<u8>) -> Result<(Container, Vec<u8>), Error> {
        let mut reader = Cursor::new(input);
        let mut writer = Cursor::new(Vec::new());
        let request = TrimRequest::new(10.0, 0).unwrap();
        let container = transcode(&mut reader, &mut writer, &request, &config::Encoder::default())?;
        Ok((container, writer.into_inner()))
    }

    #[test]
    fn test_wave() {
        let input = wave_image();
        let (container, output) = run(input.clone()).unwrap();

        assert_eq!(
            container,
            Container::Wave(wave::Summary { delay_bytes: 160, delay_samples: 80, loops_shifted: 0 })
        );
        assert_eq!(container.name(), "wave");
        assert_eq!(output.len(), input.len() - 160);
    }

    #[test]
    fn test_flac() {
        let input = encode_stream(8000, &ramps(2048), vec![]);
        let (container, output) = run(input).unwrap();

        let Container::Flac(summary) = container else { panic!("expected flac, got {container:?}") };
        assert_eq!(summary.delay_samples, 80);
        assert_eq!(summary.samples_written, 2048 - 80);
        assert_eq!(&output[..4], b"fLaC");
    }

    #[test]
    fn test_unknown() {
        let err = run(b"ID3\x04\x00\x00\x00\x00\x00\x00garbage".to_vec()).unwrap_err();
        assert!(matches!(err.kind(), error::Kind::UnknownContainer));
    }

    #[test]
    fn test_unsupported_wave_is_not_retried_as_flac() {
        let mut input = wave_image();
        // Format code of the fmt chunk.
        input[20..22].copy_from_slice(&0xFFFEu16.to_le_bytes());

        let err = run(input).unwrap_err();
        assert!(matches!(err.kind(), error::Kind::UnsupportedVariant { format: 0xFFFE }));
    }
}
