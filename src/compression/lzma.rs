//! LZMA decompressors (xz2 / liblzma)
//!
//! `lzma` is the legacy LZMA-alone format (13-byte header, optional end
//! marker); `xz` is the XZ container. Neither decoder is created with the
//! concatenated flag, so decoding stops at the first end of stream and any
//! following bytes come back as leftover.

use xz2::stream::{Action, Status, Stream};

use super::{drain, ensure_not_finished, Decompressor};
use crate::error::{Result, VfsError};

/// No memory limit on the decoder's dictionary
const MEMLIMIT: u64 = u64::MAX;

struct LzmaStream {
    inner: Stream,
    backend: &'static str,
    finished: bool,
}

impl LzmaStream {
    fn decompress(&mut self, input: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
        ensure_not_finished(self.finished, self.backend, input)?;
        if self.finished {
            return Ok((Vec::new(), Vec::new()));
        }

        let inner = &mut self.inner;
        let backend = self.backend;
        let (output, consumed, finished) = drain(backend, input, |remaining, output| {
            let before = inner.total_in();
            let status = inner
                .process_vec(remaining, output, Action::Run)
                .map_err(|e| VfsError::backend(backend, e.to_string()).at_offset(before))?;
            let used = (inner.total_in() - before) as usize;
            Ok((used, matches!(status, Status::StreamEnd)))
        })?;

        self.finished = finished;
        let leftover = if finished {
            input[consumed..].to_vec()
        } else {
            Vec::new()
        };
        Ok((output, leftover))
    }
}

fn create_error(backend: &'static str, err: xz2::stream::Error) -> VfsError {
    VfsError::backend(backend, format!("unable to initialize decoder: {err}"))
}

/// LZMA-alone (.lzma) decompressor
pub struct LzmaDecompressor(LzmaStream);

impl LzmaDecompressor {
    pub fn new() -> Result<Self> {
        let inner = Stream::new_lzma_decoder(MEMLIMIT).map_err(|e| create_error("lzma", e))?;
        Ok(Self(LzmaStream {
            inner,
            backend: "lzma",
            finished: false,
        }))
    }
}

impl Decompressor for LzmaDecompressor {
    fn decompress(&mut self, input: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
        self.0.decompress(input)
    }

    fn is_finished(&self) -> bool {
        self.0.finished
    }
}

/// XZ container decompressor
pub struct XzDecompressor(LzmaStream);

impl XzDecompressor {
    pub fn new() -> Result<Self> {
        let inner = Stream::new_stream_decoder(MEMLIMIT, 0).map_err(|e| create_error("xz", e))?;
        Ok(Self(LzmaStream {
            inner,
            backend: "xz",
            finished: false,
        }))
    }
}

impl Decompressor for XzDecompressor {
    fn decompress(&mut self, input: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
        self.0.decompress(input)
    }

    fn is_finished(&self) -> bool {
        self.0.finished
    }
}
