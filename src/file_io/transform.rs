//! Random access over forward-only transforms
//!
//! Decompressors and block decoders can only be driven forward from the
//! first source byte. [`TransformStream`] turns one into a seekable
//! [`FileIo`]:
//!
//! ```text
//!  source (parent)   ──read_size──►  pending ──feed──► transform
//!                                                          │ decoded
//!                                                          ▼
//!  decoded offsets:  [buffer_start ........ decoded_offset)   window
//!                          ▲ current_offset
//! ```
//!
//! - `seek` only records the target and marks the stream for realignment.
//! - `read` realigns lazily: a target inside the window is served directly,
//!   a target ahead of it is reached by decoding and discarding, and a
//!   target behind it restarts the transform from source byte 0.
//! - `size` drives a separate pass to the end once and memoizes the result.
//!
//! Reads past the end return short or empty results.

use std::sync::OnceLock;

use tracing::{debug, trace, warn};

use super::{resolve_seek, FileIo, ParentStream, Whence};
use crate::compression::Decompressor;
use crate::encoding::Decoder;
use crate::error::{Result, VfsError};

/// Max source bytes handed to the transform per feed
const FEED_SIZE: usize = 64 * 1024;

/// A forward-only transform the engine can drive
pub(crate) trait StreamTransform: Send {
    /// Feed input; returns (decoded, leftover input)
    fn feed(&mut self, input: &[u8], end_of_input: bool) -> Result<(Vec<u8>, Vec<u8>)>;

    /// True once the transform will accept no more input
    fn is_exhausted(&self) -> bool;

    /// Whether running out of source before exhaustion means truncation
    fn expects_end_marker(&self) -> bool;
}

impl StreamTransform for Box<dyn Decompressor> {
    fn feed(&mut self, input: &[u8], _end_of_input: bool) -> Result<(Vec<u8>, Vec<u8>)> {
        self.decompress(input)
    }

    fn is_exhausted(&self) -> bool {
        self.is_finished()
    }

    fn expects_end_marker(&self) -> bool {
        true
    }
}

impl StreamTransform for Box<dyn Decoder> {
    fn feed(&mut self, input: &[u8], end_of_input: bool) -> Result<(Vec<u8>, Vec<u8>)> {
        self.decode(input, end_of_input)
    }

    fn is_exhausted(&self) -> bool {
        false
    }

    fn expects_end_marker(&self) -> bool {
        false
    }
}

// =============================================================================
// DecodePass - one forward run of a transform over the source
// =============================================================================

struct DecodePass<T> {
    transform: T,
    source_offset: u64,
    pending: Vec<u8>,
    pending_pos: usize,
    carry: Vec<u8>,
    source_done: bool,
    finished: bool,
}

impl<T: StreamTransform> DecodePass<T> {
    fn new(transform: T) -> Self {
        Self {
            transform,
            source_offset: 0,
            pending: Vec::new(),
            pending_pos: 0,
            carry: Vec::new(),
            source_done: false,
            finished: false,
        }
    }

    fn fill_pending(&mut self, parent: &ParentStream, source_size: u64, read_size: usize) -> Result<()> {
        let wanted = (read_size as u64).min(source_size.saturating_sub(self.source_offset)) as usize;
        self.pending_pos = 0;
        if wanted == 0 {
            self.pending.clear();
            self.source_done = true;
            return Ok(());
        }
        self.pending = parent.read_at(self.source_offset, wanted)?;
        self.source_offset += self.pending.len() as u64;
        if self.pending.is_empty() || self.source_offset >= source_size {
            self.source_done = true;
        }
        Ok(())
    }

    /// Next non-empty run of decoded bytes, or None at end of stream
    fn next_chunk(
        &mut self,
        parent: &ParentStream,
        source_size: u64,
        read_size: usize,
        label: &str,
    ) -> Result<Option<Vec<u8>>> {
        while !self.finished {
            if self.pending_pos == self.pending.len() && !self.source_done {
                self.fill_pending(parent, source_size, read_size)?;
            }
            let end = (self.pending_pos + FEED_SIZE).min(self.pending.len());
            let end_of_input = self.source_done && end == self.pending.len();

            let fed_at = self.source_offset - (self.pending.len() - self.pending_pos) as u64;
            let mut input = std::mem::take(&mut self.carry);
            input.extend_from_slice(&self.pending[self.pending_pos..end]);
            self.pending_pos = end;

            let (decoded, leftover) = self
                .transform
                .feed(&input, end_of_input)
                .map_err(|e| e.at_offset(fed_at))?;

            if self.transform.is_exhausted() {
                self.finished = true;
                let trailing = leftover.len() + (self.pending.len() - self.pending_pos);
                if trailing > 0 || !self.source_done {
                    debug!(label, trailing, "Ignoring data after end of stream");
                }
            } else if end_of_input {
                self.finished = true;
                if self.transform.expects_end_marker() {
                    warn!(label, source_offset = self.source_offset, "Stream truncated before end of stream marker");
                }
            } else {
                self.carry = leftover;
            }

            if !decoded.is_empty() {
                return Ok(Some(decoded));
            }
        }
        Ok(None)
    }
}

// =============================================================================
// TransformStream
// =============================================================================

/// Seekable view of a transform applied to a parent stream
pub(crate) struct TransformStream<T> {
    label: &'static str,
    new_transform: fn() -> Result<T>,
    parent: Option<ParentStream>,
    source_size: u64,
    read_size: usize,
    pass: DecodePass<T>,
    buffer: Vec<u8>,
    buffer_start: u64,
    decoded_offset: u64,
    current_offset: u64,
    realign: bool,
    size: OnceLock<u64>,
}

impl<T: StreamTransform> TransformStream<T> {
    pub fn new(
        label: &'static str,
        parent: ParentStream,
        new_transform: fn() -> Result<T>,
        read_size: usize,
    ) -> Result<Self> {
        let source_size = parent.size()?;
        let transform = new_transform()?;
        Ok(Self {
            label,
            new_transform,
            parent: Some(parent),
            source_size,
            read_size: read_size.max(1),
            pass: DecodePass::new(transform),
            buffer: Vec::new(),
            buffer_start: 0,
            decoded_offset: 0,
            current_offset: 0,
            realign: false,
            size: OnceLock::new(),
        })
    }

    fn parent(&self) -> Result<&ParentStream> {
        self.parent.as_ref().ok_or_else(|| VfsError::not_open(self.label))
    }

    /// Restart decoding from source byte 0
    fn reset(&mut self) -> Result<()> {
        trace!(label = self.label, target = self.current_offset, "Restarting transform");
        self.pass = DecodePass::new((self.new_transform)()?);
        self.buffer.clear();
        self.buffer_start = 0;
        self.decoded_offset = 0;
        Ok(())
    }

    /// Drop delivered bytes, then append the next decoded run to the window
    fn decode_more(&mut self) -> Result<bool> {
        let delivered = self
            .current_offset
            .saturating_sub(self.buffer_start)
            .min(self.buffer.len() as u64) as usize;
        self.buffer.drain(..delivered);
        self.buffer_start += delivered as u64;

        let parent = self.parent.as_ref().ok_or_else(|| VfsError::not_open(self.label))?;
        match self
            .pass
            .next_chunk(parent, self.source_size, self.read_size, self.label)?
        {
            Some(decoded) => {
                self.decoded_offset += decoded.len() as u64;
                self.buffer.extend_from_slice(&decoded);
                Ok(true)
            }
            None => {
                let _ = self.size.set(self.decoded_offset);
                Ok(false)
            }
        }
    }

    /// Bring the window to the current offset after a seek
    fn realign_window(&mut self) -> Result<()> {
        let target = self.current_offset;
        if target < self.buffer_start {
            self.reset()?;
        }
        while self.decoded_offset < target {
            if !self.decode_more()? {
                break;
            }
        }
        Ok(())
    }

    /// Drive a fresh pass to the end, counting decoded bytes
    fn measure(&self) -> Result<u64> {
        let parent = self.parent()?;
        let mut pass = DecodePass::new((self.new_transform)()?);
        let mut total = 0u64;
        while let Some(decoded) = pass.next_chunk(parent, self.source_size, self.read_size, self.label)? {
            total += decoded.len() as u64;
        }
        debug!(label = self.label, size = total, "Measured decoded size");
        Ok(total)
    }
}

impl<T: StreamTransform> FileIo for TransformStream<T> {
    fn read(&mut self, size: usize) -> Result<Vec<u8>> {
        self.parent()?;
        if size == 0 {
            return Ok(Vec::new());
        }
        if let Some(&total) = self.size.get() {
            if self.current_offset >= total {
                return Ok(Vec::new());
            }
        }
        if self.realign {
            self.realign_window()?;
            self.realign = false;
        }

        let mut output = Vec::with_capacity(size.min(self.read_size));
        while output.len() < size {
            let position = self.current_offset;
            if position >= self.buffer_start && position < self.decoded_offset {
                let start = (position - self.buffer_start) as usize;
                let count = (size - output.len()).min(self.buffer.len() - start);
                output.extend_from_slice(&self.buffer[start..start + count]);
                self.current_offset += count as u64;
                continue;
            }
            if !self.decode_more()? {
                break;
            }
        }
        Ok(output)
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        self.parent()?;
        let target = match whence {
            Whence::End => {
                let size = self.size()?;
                resolve_seek(self.current_offset, offset, whence, || Ok(size))?
            }
            _ => resolve_seek(self.current_offset, offset, whence, || Ok(0))?,
        };
        if target != self.current_offset {
            self.current_offset = target;
            self.realign = true;
        }
        Ok(target)
    }

    fn offset(&self) -> Result<u64> {
        self.parent()?;
        Ok(self.current_offset)
    }

    fn size(&mut self) -> Result<u64> {
        self.parent()?;
        if let Some(&size) = self.size.get() {
            return Ok(size);
        }
        let size = self.measure()?;
        Ok(*self.size.get_or_init(|| size))
    }

    fn close(&mut self) -> Result<()> {
        let parent = self
            .parent
            .take()
            .ok_or_else(|| VfsError::not_open(self.label))?;
        self.buffer = Vec::new();
        self.pass.pending = Vec::new();
        parent.release()
    }

    fn is_open(&self) -> bool {
        self.parent.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::test_data::{compress, sample};
    use crate::compression::DecompressorRegistry;
    use crate::encoding::DecoderRegistry;
    use crate::error::ErrorKind;
    use crate::file_io::test_support::{parent_over, temp_file};
    use proptest::prelude::*;

    fn zlib_stream(file: &tempfile::NamedTempFile, read_size: usize) -> TransformStream<Box<dyn Decompressor>> {
        let constructor = DecompressorRegistry::with_defaults().constructor("zlib").unwrap();
        TransformStream::new("compressed stream", parent_over(file), constructor, read_size).unwrap()
    }

    #[test]
    fn test_sequential_and_backward_reads() {
        let data = sample(300_000);
        let file = temp_file(&compress("zlib", &data));
        let mut stream = zlib_stream(&file, 4096);

        assert_eq!(stream.read(1000).unwrap(), &data[..1000]);
        stream.seek(250_000, Whence::Set).unwrap();
        assert_eq!(stream.read(10).unwrap(), &data[250_000..250_010]);
        stream.seek(5, Whence::Set).unwrap();
        assert_eq!(stream.read(20).unwrap(), &data[5..25]);
        stream.seek(-10, Whence::End).unwrap();
        assert_eq!(stream.read(100).unwrap(), &data[data.len() - 10..]);
        assert_eq!(stream.size().unwrap(), data.len() as u64);
    }

    #[test]
    fn test_past_end_reads_are_empty() {
        let data = sample(1000);
        let file = temp_file(&compress("zlib", &data));
        let mut stream = zlib_stream(&file, 128);

        stream.seek(5000, Whence::Set).unwrap();
        assert!(stream.read(10).unwrap().is_empty());
        assert_eq!(stream.offset().unwrap(), 5000);

        stream.seek(995, Whence::Set).unwrap();
        assert_eq!(stream.read(10).unwrap(), &data[995..]);
        assert!(stream.read(10).unwrap().is_empty());
    }

    #[test]
    fn test_negative_seek_keeps_offset() {
        let file = temp_file(&compress("zlib", b"abcdef"));
        let mut stream = zlib_stream(&file, 16);
        stream.seek(3, Whence::Set).unwrap();
        let err = stream.seek(-4, Whence::Current).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(stream.offset().unwrap(), 3);
        assert_eq!(stream.read(3).unwrap(), b"def");
    }

    #[test]
    fn test_corrupt_source_is_backend_error() {
        let mut compressed = compress("zlib", &sample(50_000));
        for byte in compressed.iter_mut().skip(40).take(64) {
            *byte ^= 0x5a;
        }
        let file = temp_file(&compressed);
        let mut stream = zlib_stream(&file, 1024);
        let err = stream.read_all().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackEnd);
    }

    #[test]
    fn test_truncated_source_reads_what_decodes() {
        let data = sample(100_000);
        let compressed = compress("zlib", &data);
        let file = temp_file(&compressed[..compressed.len() / 2]);
        let mut stream = zlib_stream(&file, 1000);
        let recovered = stream.read_all().unwrap();
        assert!(!recovered.is_empty());
        assert_eq!(recovered, &data[..recovered.len()]);
        assert_eq!(stream.size().unwrap(), recovered.len() as u64);
    }

    #[test]
    fn test_closed_stream_rejects_operations() {
        let file = temp_file(&compress("zlib", b"abc"));
        let mut stream = zlib_stream(&file, 16);
        assert_eq!(stream.size().unwrap(), 3);
        stream.close().unwrap();
        assert!(!stream.is_open());
        assert_eq!(stream.read(1).unwrap_err().kind(), ErrorKind::Io);
        assert_eq!(stream.size().unwrap_err().kind(), ErrorKind::Io);
        assert!(stream.offset().is_err());
        assert!(stream.seek(0, Whence::Set).is_err());
        assert!(stream.close().is_err());
    }

    const PROPERTY_METHODS: [&str; 6] = ["zlib", "bzip2", "xz", "lzma", "base64", "base32"];

    /// Stream over `data` transformed by `method`; base64 input is line wrapped
    fn method_stream(method: &str, data: &[u8], read_size: usize) -> (tempfile::NamedTempFile, Box<dyn FileIo>) {
        let (source, stream): (Vec<u8>, fn(&tempfile::NamedTempFile, &str, usize) -> Box<dyn FileIo>) = match method {
            "base64" => {
                use base64::Engine;
                let text = base64::engine::general_purpose::STANDARD.encode(data);
                let mut wrapped = Vec::new();
                for line in text.as_bytes().chunks(76) {
                    wrapped.extend_from_slice(line);
                    wrapped.extend_from_slice(b"\r\n");
                }
                (wrapped, decoder_stream)
            }
            "base32" => (data_encoding::BASE32.encode(data).into_bytes(), decoder_stream),
            _ => (compress(method, data), decompressor_stream),
        };
        let file = temp_file(&source);
        let io = stream(&file, method, read_size);
        (file, io)
    }

    fn decompressor_stream(file: &tempfile::NamedTempFile, method: &str, read_size: usize) -> Box<dyn FileIo> {
        let constructor = DecompressorRegistry::with_defaults().constructor(method).unwrap();
        Box::new(TransformStream::new("compressed stream", parent_over(file), constructor, read_size).unwrap())
    }

    fn decoder_stream(file: &tempfile::NamedTempFile, method: &str, read_size: usize) -> Box<dyn FileIo> {
        let constructor = DecoderRegistry::with_defaults().constructor(method).unwrap();
        Box::new(TransformStream::new("encoded stream", parent_over(file), constructor, read_size).unwrap())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_seek_read_matches_plain_slice(
            method in prop::sample::select(PROPERTY_METHODS.to_vec()),
            ops in prop::collection::vec((0u64..9000, 0usize..3000), 1..12),
            read_size in 64usize..4096,
        ) {
            let data = sample(8000);
            let (_file, mut stream) = method_stream(method, &data, read_size);
            for (offset, len) in ops {
                stream.seek(offset as i64, Whence::Set).unwrap();
                let got = stream.read(len).unwrap();
                let start = (offset as usize).min(data.len());
                let end = (start + len).min(data.len());
                prop_assert_eq!(got, data[start..end].to_vec(), "{} at {}", method, offset);

                let before = stream.offset().unwrap();
                prop_assert!(stream.seek(-(before as i64) - 1, Whence::Current).is_err());
                prop_assert_eq!(stream.offset().unwrap(), before);
            }
            prop_assert_eq!(stream.size().unwrap(), data.len() as u64);
        }
    }

    #[test]
    fn test_every_method_sequential_equals_chunked() {
        let data = sample(20_000);
        for method in PROPERTY_METHODS {
            let (_file, mut whole) = method_stream(method, &data, 1000);
            assert!(whole.read_all().unwrap() == data, "{method}");

            let (_file, mut chunked) = method_stream(method, &data, 333);
            let mut pieces = Vec::new();
            let mut offset = 0usize;
            while offset < data.len() {
                // Step back over the previous chunk's tail before each read
                let start = offset.saturating_sub(50);
                chunked.seek(start as i64, Whence::Set).unwrap();
                let piece = chunked.read(1234).unwrap();
                assert!(!piece.is_empty(), "{method} at {start}");
                pieces.truncate(start);
                pieces.extend_from_slice(&piece);
                offset = start + piece.len();
            }
            assert!(pieces == data, "{method}");
        }
    }
}
