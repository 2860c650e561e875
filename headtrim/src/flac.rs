//! FLAC transcoder: decodes the whole stream through libFLAC, drops the leading samples and
//! encodes the rest again with the original metadata blocks.

pub mod budget;

use std::io::{Read, Seek, SeekFrom, Write};
use std::num::NonZeroU32;

use num_enum::TryFromPrimitive;

use self::budget::TrimBudget;
use crate::config;
use crate::duration::samples_from_duration;
use crate::libflac_wrapper::{
    self, DecodeHandler, EncoderParams, FlacDecoder, FlacEncoder, MetadataObject, MetadataRef,
};
use crate::utils::SliceReadExt;
use crate::{Error, TrimRequest, error, smpl};

/// APPLICATION block id under which RIFF chunks are carried in FLAC files.
pub const RIFF_APPLICATION_ID: [u8; 4] = *b"riff";

const SAMPLE_RATE_KEY: &[u8] = b"SAMPLERATE=";

#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, TryFromPrimitive, Debug)]
pub enum BlockType {
    StreamInfo = 0,
    Padding = 1,
    Application = 2,
    SeekTable = 3,
    VorbisComment = 4,
    CUESheet = 5,
    Picture = 6,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub delay_samples: u64,
    /// Samples per channel handed to the encoder.
    pub samples_written: u64,
    pub loops_shifted: usize,
    /// Errors the decoder reported and recovered from.
    pub decode_errors: usize,
}

/// Value of a `SAMPLERATE=` vorbis comment, the key being matched case-insensitively.
pub fn sample_rate_tag(comment: &[u8]) -> Option<&[u8]> {
    let (key, value) = comment.split_at_checked(SAMPLE_RATE_KEY.len())?;
    key.eq_ignore_ascii_case(SAMPLE_RATE_KEY).then_some(value)
}

/// Leading decimal digits of a tag value.
fn parse_sample_rate(value: &[u8]) -> Option<NonZeroU32> {
    let digits = value.iter().take_while(|byte| byte.is_ascii_digit()).count();
    std::str::from_utf8(&value[..digits]).ok()?.parse().ok().and_then(NonZeroU32::new)
}

/// Shifts the loops of every sampler chunk carried in a `riff` APPLICATION block and returns the
/// number of loops rewritten.
pub fn shift_embedded_loops(metadata: &mut [MetadataObject], delay_samples: u64) -> usize {
    metadata
        .iter_mut()
        .filter_map(MetadataObject::application_mut)
        .filter(|(id, _)| *id == RIFF_APPLICATION_ID)
        .filter_map(|(_, data)| {
            let mut pointer = 0;
            let tag = (&*data).read_tag(&mut pointer).ok()?;
            if &tag != smpl::TAG {
                return None;
            }
            let length = (&*data).read_u32_le(&mut pointer).ok()? as usize;
            let end = data.len().min(pointer.saturating_add(length));

            smpl::shift_loops_in_place(&mut data[pointer..end], delay_samples)
                .inspect_err(|_| tracing::warn!(length, "embedded sampler chunk too short, kept as is"))
                .ok()
        })
        .sum()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    NotStarted,
    Encoding,
    Failed,
}

struct TrimSession<'w> {
    encoder: FlacEncoder<'w>,
    delay_ms: f64,
    compression_level: u32,
    /// Forced, then taken from STREAMINFO, then from the last `SAMPLERATE=` tag.
    rate: Option<NonZeroU32>,
    configured: bool,
    metadata: Vec<MetadataObject>,
    pending_error: Option<Error>,
    state: State,
    budget: TrimBudget,
    summary: Summary,
}

impl<'w> TrimSession<'w> {
    fn new(encoder: FlacEncoder<'w>, request: &TrimRequest, compression_level: u32) -> Self {
        Self {
            encoder,
            delay_ms: request.delay_ms,
            compression_level,
            rate: request.forced_rate,
            configured: false,
            metadata: vec![],
            pending_error: None,
            state: State::NotStarted,
            budget: TrimBudget::new(0),
            summary: Summary::default(),
        }
    }

    fn configure(&mut self, block: MetadataRef<'_>) -> Result<(), Error> {
        let Some(stream_info) = block.stream_info() else {
            return Ok(());
        };
        if stream_info.total_samples == 0 {
            tracing::warn!("stream length unknown, encoder left unconfigured");
            return Ok(());
        }

        let rate = match self.rate {
            Some(rate) => rate,
            None => *self.rate.insert(
                NonZeroU32::new(stream_info.sample_rate)
                    .ok_or(error::Kind::CodecInit("stream has no sample rate"))?,
            ),
        };
        let params = EncoderParams {
            channels: stream_info.channels,
            bits_per_sample: stream_info.bits_per_sample,
            sample_rate: rate.get().min(libflac_wrapper::MAX_SAMPLE_RATE),
            total_samples_estimate: stream_info.total_samples,
            compression_level: self.compression_level,
            block_size: None,
            streamable_subset: libflac_wrapper::sample_rate_is_subset(rate.get()),
        };
        tracing::debug!(?params, "configuring encoder");

        self.encoder.set_params(&params)?;
        self.configured = true;
        Ok(())
    }

    fn read_tags(&mut self, block: MetadataRef<'_>) {
        for value in block.comments().into_iter().filter_map(sample_rate_tag) {
            match parse_sample_rate(value) {
                Some(rate) => {
                    tracing::debug!(rate = rate.get(), "sample rate taken from tag");
                    self.rate = Some(rate);
                }
                None => tracing::warn!(value = %String::from_utf8_lossy(value), "ignoring sample rate tag"),
            }
        }
    }

    fn start(&mut self) -> Result<(), Error> {
        if let Some(e) = self.pending_error.take() {
            return Err(e);
        }
        if !self.configured {
            return error::Kind::CodecInit("audio frame before usable stream info").into();
        }

        let delay_samples = samples_from_duration(self.delay_ms, self.rate.map_or(0, NonZeroU32::get));
        self.summary.delay_samples = delay_samples;
        self.summary.loops_shifted = shift_embedded_loops(&mut self.metadata, delay_samples);
        self.budget = TrimBudget::new(delay_samples);
        tracing::debug!(
            delay_samples,
            loops_shifted = self.summary.loops_shifted,
            blocks = self.metadata.len(),
            "starting encoder"
        );

        self.encoder.set_metadata(std::mem::take(&mut self.metadata))?;
        self.encoder.init()
    }

    fn process_frame(&mut self, channels: &[&[i32]]) -> Result<(), Error> {
        if self.state == State::NotStarted {
            self.start()?;
            self.state = State::Encoding;
        }

        let block_size = channels.first().map_or(0, |channel| channel.len());
        let Some(skip) = self.budget.consume(block_size) else {
            return Ok(());
        };

        let channels = channels.iter().map(|channel| &channel[skip..]).collect::<Vec<_>>();
        self.encoder.process(&channels)?;
        self.summary.samples_written += (block_size - skip) as u64;
        Ok(())
    }
}

impl DecodeHandler for TrimSession<'_> {
    fn on_metadata(&mut self, block: MetadataRef<'_>) {
        if self.pending_error.is_some() {
            return;
        }

        let block_type = block.block_type();
        tracing::debug!(?block_type, "metadata block");

        let result = match block_type {
            Some(BlockType::StreamInfo) => self.configure(block),
            _ => {
                self.read_tags(block);
                block.try_clone().map(|object| self.metadata.push(object))
            }
        };
        if let Err(e) = result {
            self.pending_error = Some(e);
        }
    }

    fn on_frame(&mut self, channels: &[&[i32]]) -> Result<(), Error> {
        let result = self.process_frame(channels);
        if result.is_err() {
            self.state = State::Failed;
        }
        result
    }

    fn on_error(&mut self, _message: &str) {
        self.summary.decode_errors += 1;
    }
}

/// Trims `request.delay_ms` of audio from a FLAC stream, writing a new stream from offset 0 of
/// `writer`.
///
/// Returns [`error::Kind::FormatMismatch`] when no audio frame could be decoded, in which case
/// nothing has been written.
pub fn transcode<R, W>(
    reader: &mut R,
    writer: &mut W,
    request: &TrimRequest,
    config: &config::Encoder,
) -> Result<Summary, Error>
where
    R: Read + Seek,
    W: Write + Seek,
{
    reader.seek(SeekFrom::Start(0))?;
    writer.seek(SeekFrom::Start(0))?;

    let mut decoder = FlacDecoder::new()?;
    let mut session = TrimSession::new(FlacEncoder::new(writer)?, request, config.compression_level());
    decoder.decode(reader, &mut session)?;

    if session.summary.decode_errors > 0 {
        tracing::warn!(decode_errors = session.summary.decode_errors, "stream decoded with errors");
    }

    match session.state {
        State::Encoding => {
            session.encoder.finish()?;
            Ok(session.summary)
        }
        State::NotStarted => error::Kind::FormatMismatch.into(),
        // A failing frame aborts the decoder, which then returns the error itself.
        State::Failed => error::Kind::Encode("stream aborted").into(),
    }
}
