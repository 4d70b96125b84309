//! Encoded stream - seekable decoded view of base16/32/64 text

use tracing::debug;

use super::transform::TransformStream;
use super::{FileIo, ParentStream, Whence};
use crate::config::VfsConfig;
use crate::encoding::{Decoder, DecoderRegistry};
use crate::error::Result;

/// Decoded bytes of a base16/32/64 encoded parent stream
pub struct EncodedStream {
    inner: TransformStream<Box<dyn Decoder>>,
    encoding_method: String,
}

impl EncodedStream {
    pub fn new(
        parent: ParentStream,
        encoding_method: &str,
        registry: &DecoderRegistry,
        config: &VfsConfig,
    ) -> Result<Self> {
        let constructor = registry.constructor(encoding_method)?;
        let inner = TransformStream::new("encoded stream", parent, constructor, config.source_read_size)?;
        debug!(method = %encoding_method, "Opened encoded stream");
        Ok(Self {
            inner,
            encoding_method: encoding_method.to_lowercase(),
        })
    }

    pub fn encoding_method(&self) -> &str {
        &self.encoding_method
    }
}

impl FileIo for EncodedStream {
    fn read(&mut self, size: usize) -> Result<Vec<u8>> {
        self.inner.read(size)
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        self.inner.seek(offset, whence)
    }

    fn offset(&self) -> Result<u64> {
        self.inner.offset()
    }

    fn size(&mut self) -> Result<u64> {
        self.inner.size()
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::file_io::test_support::{parent_over, temp_file};
    use base64::Engine;

    fn wrapped_base64(data: &[u8]) -> Vec<u8> {
        let text = base64::engine::general_purpose::STANDARD.encode(data);
        let mut out = Vec::new();
        for line in text.as_bytes().chunks(76) {
            out.extend_from_slice(line);
            out.extend_from_slice(b"\r\n");
        }
        out
    }

    #[test]
    fn test_base64_with_line_breaks_and_odd_read_size() {
        let data: Vec<u8> = (0..20_000u32).map(|i| (i % 253) as u8).collect();
        let file = temp_file(&wrapped_base64(&data));
        let registry = DecoderRegistry::with_defaults();
        let config = VfsConfig::default().with_source_read_size(333);
        let mut stream = EncodedStream::new(parent_over(&file), "base64", &registry, &config).unwrap();

        assert_eq!(stream.size().unwrap(), data.len() as u64);
        stream.seek(15_000, Whence::Set).unwrap();
        assert_eq!(stream.read(16).unwrap(), &data[15_000..15_016]);
        stream.seek(10, Whence::Set).unwrap();
        assert_eq!(stream.read(5).unwrap(), &data[10..15]);
        assert_eq!(stream.read_all().unwrap(), data);
    }

    #[test]
    fn test_base16_and_base32() {
        let data = b"layered storage, one stream at a time".to_vec();
        let registry = DecoderRegistry::with_defaults();
        let config = VfsConfig::default().with_source_read_size(7);

        let hex_file = temp_file(hex::encode_upper(&data).as_bytes());
        let mut stream = EncodedStream::new(parent_over(&hex_file), "base16", &registry, &config).unwrap();
        assert_eq!(stream.read_all().unwrap(), data);

        let b32_file = temp_file(data_encoding::BASE32.encode(&data).as_bytes());
        let mut stream = EncodedStream::new(parent_over(&b32_file), "Base32", &registry, &config).unwrap();
        assert_eq!(stream.encoding_method(), "base32");
        assert_eq!(stream.read_all().unwrap(), data);
    }

    #[test]
    fn test_multi_megabyte_round_trip_every_method() {
        let data: Vec<u8> = (0..3 * 1024 * 1024 + 17u32).map(|i| (i.wrapping_mul(2_654_435_761) >> 13) as u8).collect();
        let registry = DecoderRegistry::with_defaults();
        let config = VfsConfig::default().with_source_read_size(64 * 1024 + 3);
        let sources = [
            ("base16", hex::encode(&data).into_bytes()),
            ("base32", data_encoding::BASE32.encode(&data).into_bytes()),
            ("base64", wrapped_base64(&data)),
        ];
        for (method, source) in sources {
            let file = temp_file(&source);
            let mut stream = EncodedStream::new(parent_over(&file), method, &registry, &config).unwrap();
            assert_eq!(stream.size().unwrap(), data.len() as u64, "{method}");
            stream.seek(-17, Whence::End).unwrap();
            assert_eq!(stream.read(100).unwrap(), &data[data.len() - 17..], "{method}");
            assert!(stream.read_all().unwrap() == data, "{method}");
        }
    }

    #[test]
    fn test_invalid_text_is_backend_error() {
        let file = temp_file(b"not*valid*base64!");
        let registry = DecoderRegistry::with_defaults();
        let mut stream =
            EncodedStream::new(parent_over(&file), "base64", &registry, &VfsConfig::default()).unwrap();
        assert_eq!(stream.read(4).unwrap_err().kind(), ErrorKind::BackEnd);
    }
}
