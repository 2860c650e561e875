use std::ffi::{CStr, c_char, c_void};
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};
use std::ptr::NonNull;

use libflac_sys::*;
use num_enum::TryFromPrimitive;

use crate::flac::BlockType;
use crate::{Error, error};

pub trait SeekableRead: Read + Seek {}
impl<T: Read + Seek> SeekableRead for T {}

pub trait SeekableWrite: Write + Seek {}
impl<T: Write + Seek> SeekableWrite for T {}

pub const MAX_SAMPLE_RATE: u32 = FLAC__MAX_SAMPLE_RATE;

pub fn sample_rate_is_subset(sample_rate: u32) -> bool {
    unsafe { FLAC__format_sample_rate_is_subset(sample_rate) != 0 }
}

/// Receives what the decoder finds, in stream order.
pub trait DecodeHandler {
    fn on_metadata(&mut self, block: MetadataRef<'_>);

    /// `channels` holds one slice per channel, all of the frame's block size. Returning an error
    /// aborts decoding and makes [`FlacDecoder::decode`] return it.
    fn on_frame(&mut self, channels: &[&[i32]]) -> Result<(), Error>;

    /// Decoder errors are recoverable, libFLAC resynchronizes on the next frame.
    fn on_error(&mut self, _message: &str) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    pub sample_rate: u32,
    pub channels: u32,
    pub bits_per_sample: u32,
    /// 0 when the stream length is unknown.
    pub total_samples: u64,
}

/// A metadata block owned by libFLAC, only valid inside [`DecodeHandler::on_metadata`].
#[derive(Clone, Copy)]
pub struct MetadataRef<'a>(&'a FLAC__StreamMetadata);

impl<'a> MetadataRef<'a> {
    /// `None` for block types this crate does not know about.
    pub fn block_type(&self) -> Option<BlockType> {
        u8::try_from(self.0.type_).ok().and_then(|block_type| BlockType::try_from_primitive(block_type).ok())
    }

    pub fn stream_info(&self) -> Option<StreamInfo> {
        if self.block_type() != Some(BlockType::StreamInfo) {
            return None;
        }

        let stream_info = unsafe { &self.0.data.stream_info };
        Some(StreamInfo {
            sample_rate: stream_info.sample_rate,
            channels: stream_info.channels,
            bits_per_sample: stream_info.bits_per_sample,
            total_samples: stream_info.total_samples,
        })
    }

    pub fn application(&self) -> Option<([u8; 4], &'a [u8])> {
        if self.block_type() != Some(BlockType::Application) {
            return None;
        }

        let application = unsafe { &self.0.data.application };
        let length = self.0.length.saturating_sub(4) as usize;
        let data = if application.data.is_null() || length == 0 {
            &[][..]
        } else {
            unsafe { std::slice::from_raw_parts(application.data, length) }
        };
        Some((application.id, data))
    }

    /// Raw `NAME=value` entries of a vorbis comment block, empty for every other block type.
    pub fn comments(&self) -> Vec<&'a [u8]> {
        if self.block_type() != Some(BlockType::VorbisComment) {
            return vec![];
        }

        let vorbis_comment = unsafe { &self.0.data.vorbis_comment };
        if vorbis_comment.comments.is_null() {
            return vec![];
        }

        let entries = unsafe {
            std::slice::from_raw_parts(vorbis_comment.comments, vorbis_comment.num_comments as usize)
        };
        entries
            .iter()
            .filter(|entry| !entry.entry.is_null())
            .map(|entry| unsafe { std::slice::from_raw_parts(entry.entry, entry.length as usize) })
            .collect()
    }

    pub fn try_clone(&self) -> Result<MetadataObject, Error> {
        let object = unsafe { FLAC__metadata_object_clone(self.0) };
        NonNull::new(object)
            .map(MetadataObject)
            .ok_or_else(|| error::Kind::CodecInit("could not clone metadata block").into())
    }
}

/// An owned metadata block, deleted on drop.
pub struct MetadataObject(NonNull<FLAC__StreamMetadata>);

impl MetadataObject {
    pub fn view(&self) -> MetadataRef<'_> {
        MetadataRef(unsafe { self.0.as_ref() })
    }

    /// Id and data of an APPLICATION block, writable in place.
    pub fn application_mut(&mut self) -> Option<([u8; 4], &mut [u8])> {
        let (id, data) = self.view().application()?;
        let length = data.len();
        if length == 0 {
            return Some((id, &mut [][..]));
        }

        let data = unsafe { std::slice::from_raw_parts_mut(self.0.as_mut().data.application.data, length) };
        Some((id, data))
    }

    fn as_ptr(&self) -> *mut FLAC__StreamMetadata {
        self.0.as_ptr()
    }
}

#[cfg(test)]
impl MetadataObject {
    fn new(block_type: BlockType) -> Self {
        let object = unsafe { FLAC__metadata_object_new(block_type as FLAC__MetadataType) };
        Self(NonNull::new(object).unwrap())
    }

    pub fn application(id: [u8; 4], data: &[u8]) -> Self {
        let mut object = Self::new(BlockType::Application);
        unsafe {
            object.0.as_mut().data.application.id = id;
            assert!(
                FLAC__metadata_object_application_set_data(
                    object.as_ptr(),
                    data.as_ptr().cast_mut(),
                    data.len() as u32,
                    true.into(),
                ) != 0
            );
        }
        object
    }

    pub fn vorbis_comment(entries: &[&str]) -> Self {
        let object = Self::new(BlockType::VorbisComment);
        for entry in entries {
            let entry = FLAC__StreamMetadata_VorbisComment_Entry {
                length: entry.len() as u32,
                entry: entry.as_ptr().cast_mut(),
            };
            unsafe {
                assert!(
                    FLAC__metadata_object_vorbiscomment_append_comment(object.as_ptr(), entry, true.into())
                        != 0
                );
            }
        }
        object
    }
}

impl Drop for MetadataObject {
    fn drop(&mut self) {
        unsafe { FLAC__metadata_object_delete(self.0.as_ptr()) }
    }
}

struct DecoderClientData<'a> {
    reader: &'a mut dyn SeekableRead,
    handler: &'a mut dyn DecodeHandler,
    failure: Option<Error>,
}

pub struct FlacDecoder {
    inner: NonNull<FLAC__StreamDecoder>,
}

impl FlacDecoder {
    pub fn new() -> Result<Self, Error> {
        let inner = NonNull::new(unsafe { FLAC__stream_decoder_new() })
            .ok_or(error::Kind::CodecInit("could not allocate decoder"))?;

        unsafe {
            FLAC__stream_decoder_set_metadata_respond_all(inner.as_ptr());
            FLAC__stream_decoder_set_md5_checking(inner.as_ptr(), false.into());
        }

        Ok(Self { inner })
    }

    /// Decodes `reader` from its current position to the end of the stream, feeding every
    /// metadata block and frame to `handler`.
    ///
    /// Returns the first error raised by `handler` or by `reader`.
    pub fn decode(
        &mut self,
        reader: &mut dyn SeekableRead,
        handler: &mut dyn DecodeHandler,
    ) -> Result<(), Error> {
        let mut client_data = DecoderClientData { reader, handler, failure: None };

        let status = unsafe {
            FLAC__stream_decoder_init_stream(
                self.inner.as_ptr(),
                Some(decoder_read_cb),
                Some(decoder_seek_cb),
                Some(decoder_tell_cb),
                Some(decoder_length_cb),
                Some(decoder_eof_cb),
                Some(decoder_write_cb),
                Some(decoder_metadata_cb),
                Some(decoder_err_cb),
                &mut client_data as *mut DecoderClientData as *mut c_void,
            )
        };
        if status != FLAC__STREAM_DECODER_INIT_STATUS_OK {
            tracing::error!(status, "could not initialize FLAC decoder");
            return error::Kind::CodecInit("could not initialize decoder").into();
        }

        // The client data lives on this stack frame, so the decoder has to be finished here.
        unsafe {
            FLAC__stream_decoder_process_until_end_of_stream(self.inner.as_ptr());
            FLAC__stream_decoder_finish(self.inner.as_ptr());
        }

        client_data.failure.map_or(Ok(()), Err)
    }
}

impl Drop for FlacDecoder {
    fn drop(&mut self) {
        unsafe { FLAC__stream_decoder_delete(self.inner.as_ptr()) }
    }
}

unsafe extern "C" fn decoder_read_cb(
    _decoder: *const FLAC__StreamDecoder,
    buffer: *mut FLAC__byte,
    bytes: *mut usize,
    client_data: *mut c_void,
) -> FLAC__StreamDecoderReadStatus {
    unsafe {
        let client_data = &mut *(client_data as *mut DecoderClientData);
        let buffer = std::slice::from_raw_parts_mut(buffer, *bytes);
        match client_data.reader.read(buffer) {
            Ok(bytes_read) => {
                *bytes = bytes_read;
                if !buffer.is_empty() && bytes_read == 0 {
                    FLAC__STREAM_DECODER_READ_STATUS_END_OF_STREAM
                } else {
                    FLAC__STREAM_DECODER_READ_STATUS_CONTINUE
                }
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                *bytes = 0;
                FLAC__STREAM_DECODER_READ_STATUS_END_OF_STREAM
            }
            Err(e) => {
                tracing::error!("Error while reading FLAC stream: {e}");
                client_data.failure.get_or_insert(e.into());

                *bytes = 0;
                FLAC__STREAM_DECODER_READ_STATUS_ABORT
            }
        }
    }
}

unsafe extern "C" fn decoder_seek_cb(
    _decoder: *const FLAC__StreamDecoder,
    absolute_byte_offset: FLAC__uint64,
    client_data: *mut c_void,
) -> FLAC__StreamDecoderSeekStatus {
    unsafe {
        let client_data = &mut *(client_data as *mut DecoderClientData);
        match client_data.reader.seek(SeekFrom::Start(absolute_byte_offset)) {
            Ok(_) => FLAC__STREAM_DECODER_SEEK_STATUS_OK,
            Err(e) => {
                tracing::error!("Error while seeking FLAC stream: {e}");
                FLAC__STREAM_DECODER_SEEK_STATUS_ERROR
            }
        }
    }
}

unsafe extern "C" fn decoder_tell_cb(
    _decoder: *const FLAC__StreamDecoder,
    absolute_byte_offset: *mut FLAC__uint64,
    client_data: *mut c_void,
) -> FLAC__StreamDecoderTellStatus {
    unsafe {
        let client_data = &mut *(client_data as *mut DecoderClientData);
        match client_data.reader.stream_position() {
            Ok(position) => {
                *absolute_byte_offset = position;
                FLAC__STREAM_DECODER_TELL_STATUS_OK
            }
            Err(e) => {
                tracing::error!("Error while reading FLAC stream position: {e}");
                FLAC__STREAM_DECODER_TELL_STATUS_ERROR
            }
        }
    }
}

unsafe extern "C" fn decoder_length_cb(
    _decoder: *const FLAC__StreamDecoder,
    stream_length: *mut FLAC__uint64,
    client_data: *mut c_void,
) -> FLAC__StreamDecoderLengthStatus {
    unsafe {
        let client_data = &mut *(client_data as *mut DecoderClientData);
        match stream_len(client_data.reader) {
            Ok(length) => {
                *stream_length = length;
                FLAC__STREAM_DECODER_LENGTH_STATUS_OK
            }
            Err(e) => {
                tracing::error!("Error while reading FLAC stream length: {e}");
                FLAC__STREAM_DECODER_LENGTH_STATUS_ERROR
            }
        }
    }
}

fn stream_len(reader: &mut dyn SeekableRead) -> io::Result<u64> {
    let position = reader.stream_position()?;
    let length = reader.seek(SeekFrom::End(0))?;
    reader.seek(SeekFrom::Start(position))?;
    Ok(length)
}

unsafe extern "C" fn decoder_eof_cb(
    _decoder: *const FLAC__StreamDecoder,
    _client_data: *mut c_void,
) -> FLAC__bool {
    // We cannot reliably know whether EOF reached for objects without `BufRead`.
    false.into()
}

unsafe extern "C" fn decoder_write_cb(
    _decoder: *const FLAC__StreamDecoder,
    frame: *const FLAC__Frame,
    buffer: *const *const FLAC__int32,
    client_data: *mut c_void,
) -> FLAC__StreamDecoderWriteStatus {
    unsafe {
        let client_data = &mut *(client_data as *mut DecoderClientData);
        let channels = (*frame).header.channels as usize;
        let block_size = (*frame).header.blocksize as usize;

        let channels = std::slice::from_raw_parts(buffer, channels)
            .iter()
            .map(|&channel| std::slice::from_raw_parts(channel, block_size))
            .collect::<Vec<_>>();

        match client_data.handler.on_frame(&channels) {
            Ok(()) => FLAC__STREAM_DECODER_WRITE_STATUS_CONTINUE,
            Err(e) => {
                client_data.failure.get_or_insert(e);
                FLAC__STREAM_DECODER_WRITE_STATUS_ABORT
            }
        }
    }
}

unsafe extern "C" fn decoder_metadata_cb(
    _decoder: *const FLAC__StreamDecoder,
    metadata: *const FLAC__StreamMetadata,
    client_data: *mut c_void,
) {
    unsafe {
        let client_data = &mut *(client_data as *mut DecoderClientData);
        if let Some(metadata) = metadata.as_ref() {
            client_data.handler.on_metadata(MetadataRef(metadata));
        }
    }
}

unsafe extern "C" fn decoder_err_cb(
    decoder: *const FLAC__StreamDecoder,
    status: FLAC__StreamDecoderErrorStatus,
    client_data: *mut c_void,
) {
    unsafe {
        let client_data = &mut *(client_data as *mut DecoderClientData);

        let error_str = {
            let error_status_strings = &FLAC__StreamDecoderErrorStatusString as *const _ as *const *const c_char;
            let error_str = error_status_strings.add(status as _);
            CStr::from_ptr(*error_str).to_string_lossy()
        };

        let mut byte_offset = 0;
        FLAC__stream_decoder_get_decode_position(decoder, &mut byte_offset);
        tracing::warn!("Error while decoding FLAC stream: {error_str} at 0x{byte_offset:X}");

        client_data.handler.on_error(&error_str);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderParams {
    pub channels: u32,
    pub bits_per_sample: u32,
    pub sample_rate: u32,
    pub total_samples_estimate: u64,
    pub compression_level: u32,
    /// `None` keeps the block size picked by the compression level.
    pub block_size: Option<u32>,
    pub streamable_subset: bool,
}

struct EncoderClientData<'w> {
    writer: &'w mut dyn SeekableWrite,
    error: Option<io::Error>,
}

/// A stream encoder writing to a seekable destination from its offset 0, so that STREAMINFO can
/// be rewritten when the encoder finishes.
pub struct FlacEncoder<'w> {
    inner: NonNull<FLAC__StreamEncoder>,
    client_data: Box<EncoderClientData<'w>>,
    // libFLAC keeps pointers into these until the encoder is deleted.
    metadata: Vec<MetadataObject>,
    metadata_pointers: Vec<*mut FLAC__StreamMetadata>,
}

impl<'w> FlacEncoder<'w> {
    pub fn new(writer: &'w mut dyn SeekableWrite) -> Result<Self, Error> {
        let inner = NonNull::new(unsafe { FLAC__stream_encoder_new() })
            .ok_or(error::Kind::CodecInit("could not allocate encoder"))?;

        Ok(Self {
            inner,
            client_data: Box::new(EncoderClientData { writer, error: None }),
            metadata: vec![],
            metadata_pointers: vec![],
        })
    }

    pub fn set_params(&mut self, params: &EncoderParams) -> Result<(), Error> {
        let encoder = self.inner.as_ptr();
        let accepted = unsafe {
            FLAC__stream_encoder_set_channels(encoder, params.channels) != 0
                && FLAC__stream_encoder_set_bits_per_sample(encoder, params.bits_per_sample) != 0
                && FLAC__stream_encoder_set_sample_rate(encoder, params.sample_rate) != 0
                && FLAC__stream_encoder_set_total_samples_estimate(encoder, params.total_samples_estimate)
                    != 0
                && FLAC__stream_encoder_set_compression_level(encoder, params.compression_level) != 0
                && params
                    .block_size
                    .is_none_or(|block_size| FLAC__stream_encoder_set_blocksize(encoder, block_size) != 0)
                && FLAC__stream_encoder_set_streamable_subset(encoder, params.streamable_subset.into())
                    != 0
        };

        if accepted { Ok(()) } else { error::Kind::CodecInit("encoder rejected parameters").into() }
    }

    /// Installs the metadata blocks written after STREAMINFO, in order.
    pub fn set_metadata(&mut self, metadata: Vec<MetadataObject>) -> Result<(), Error> {
        self.metadata = metadata;
        self.metadata_pointers = self.metadata.iter().map(MetadataObject::as_ptr).collect();

        let accepted = unsafe {
            FLAC__stream_encoder_set_metadata(
                self.inner.as_ptr(),
                self.metadata_pointers.as_mut_ptr(),
                self.metadata_pointers.len() as u32,
            ) != 0
        };
        if accepted { Ok(()) } else { error::Kind::CodecInit("encoder rejected metadata").into() }
    }

    pub fn init(&mut self) -> Result<(), Error> {
        let status = unsafe {
            FLAC__stream_encoder_init_stream(
                self.inner.as_ptr(),
                Some(encoder_write_cb),
                Some(encoder_seek_cb),
                Some(encoder_tell_cb),
                None,
                &mut *self.client_data as *mut EncoderClientData as *mut c_void,
            )
        };

        if status == FLAC__STREAM_ENCODER_INIT_STATUS_OK {
            Ok(())
        } else {
            tracing::error!(status, state = %self.state(), "could not initialize FLAC encoder");
            error::Kind::CodecInit("could not initialize encoder").into()
        }
    }

    /// `channels` holds one slice per channel, all of the same length.
    pub fn process(&mut self, channels: &[&[i32]]) -> Result<(), Error> {
        let samples = channels.first().map_or(0, |channel| channel.len());
        if samples == 0 {
            return Ok(());
        }

        let buffers = channels.iter().map(|channel| channel.as_ptr()).collect::<Vec<_>>();
        // This function copies the samples, so `buffers` only has to outlive the call.
        let accepted = unsafe {
            FLAC__stream_encoder_process(self.inner.as_ptr(), buffers.as_ptr(), samples as u32) != 0
        };
        if accepted { Ok(()) } else { self.failure("encoder refused samples") }
    }

    pub fn finish(&mut self) -> Result<(), Error> {
        let finished = unsafe { FLAC__stream_encoder_finish(self.inner.as_ptr()) != 0 };
        if finished { Ok(()) } else { self.failure("could not finish stream") }
    }

    fn failure(&mut self, message: &'static str) -> Result<(), Error> {
        if let Some(e) = self.client_data.error.take() {
            return Err(e.into());
        }
        tracing::error!(state = %self.state(), "{message}");
        error::Kind::Encode(message).into()
    }

    fn state(&self) -> String {
        unsafe {
            let state = FLAC__stream_encoder_get_resolved_state_string(self.inner.as_ptr());
            if state.is_null() { String::new() } else { CStr::from_ptr(state).to_string_lossy().into_owned() }
        }
    }
}

unsafe extern "C" fn encoder_write_cb(
    _encoder: *const FLAC__StreamEncoder,
    buffer: *const FLAC__byte,
    bytes: usize,
    _samples: u32,
    _current_frame: u32,
    client_data: *mut c_void,
) -> FLAC__StreamEncoderWriteStatus {
    unsafe {
        let client_data = &mut *(client_data as *mut EncoderClientData);
        let buffer = std::slice::from_raw_parts(buffer, bytes);
        match client_data.writer.write_all(buffer) {
            Ok(()) => FLAC__STREAM_ENCODER_WRITE_STATUS_OK,
            Err(e) => {
                tracing::error!("Error while writing FLAC stream: {e}");
                client_data.error.get_or_insert(e);
                FLAC__STREAM_ENCODER_WRITE_STATUS_FATAL_ERROR
            }
        }
    }
}

unsafe extern "C" fn encoder_seek_cb(
    _encoder: *const FLAC__StreamEncoder,
    absolute_byte_offset: FLAC__uint64,
    client_data: *mut c_void,
) -> FLAC__StreamEncoderSeekStatus {
    unsafe {
        let client_data = &mut *(client_data as *mut EncoderClientData);
        match client_data.writer.seek(SeekFrom::Start(absolute_byte_offset)) {
            Ok(_) => FLAC__STREAM_ENCODER_SEEK_STATUS_OK,
            Err(e) => {
                tracing::error!("Error while seeking FLAC output: {e}");
                client_data.error.get_or_insert(e);
                FLAC__STREAM_ENCODER_SEEK_STATUS_ERROR
            }
        }
    }
}

unsafe extern "C" fn encoder_tell_cb(
    _encoder: *const FLAC__StreamEncoder,
    absolute_byte_offset: *mut FLAC__uint64,
    client_data: *mut c_void,
) -> FLAC__StreamEncoderTellStatus {
    unsafe {
        let client_data = &mut *(client_data as *mut EncoderClientData);
        match client_data.writer.stream_position() {
            Ok(position) => {
                *absolute_byte_offset = position;
                FLAC__STREAM_ENCODER_TELL_STATUS_OK
            }
            Err(e) => {
                tracing::error!("Error while reading FLAC output position: {e}");
                client_data.error.get_or_insert(e);
                FLAC__STREAM_ENCODER_TELL_STATUS_ERROR
            }
        }
    }
}

impl Drop for FlacEncoder<'_> {
    fn drop(&mut self) {
        // Deleting an initialized encoder finishes it, which still calls back into `client_data`.
        unsafe { FLAC__stream_encoder_delete(self.inner.as_ptr()) }
    }
}
