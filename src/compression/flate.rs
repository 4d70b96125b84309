//! zlib and raw DEFLATE decompressors backed by flate2

use flate2::{Decompress, FlushDecompress, Status};

use super::{drain, ensure_not_finished, Decompressor};
use crate::error::{Result, VfsError};

/// Shared inflate state; `zlib_header` selects zlib framing vs raw DEFLATE
struct Inflater {
    inner: Decompress,
    backend: &'static str,
    finished: bool,
}

impl Inflater {
    fn new(zlib_header: bool) -> Self {
        Self {
            inner: Decompress::new(zlib_header),
            backend: if zlib_header { "zlib" } else { "deflate" },
            finished: false,
        }
    }

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
                .decompress_vec(remaining, output, FlushDecompress::None)
                .map_err(|e| VfsError::backend(backend, e.to_string()).at_offset(before))?;
            let used = (inner.total_in() - before) as usize;
            Ok((used, status == Status::StreamEnd))
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

/// zlib (RFC 1950) framed DEFLATE
pub struct ZlibDecompressor(Inflater);

impl ZlibDecompressor {
    pub fn new() -> Self {
        Self(Inflater::new(true))
    }
}

impl Default for ZlibDecompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Decompressor for ZlibDecompressor {
    fn decompress(&mut self, input: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
        self.0.decompress(input)
    }

    fn is_finished(&self) -> bool {
        self.0.finished
    }
}

/// Raw DEFLATE (RFC 1951), as embedded in gzip members
pub struct DeflateDecompressor(Inflater);

impl DeflateDecompressor {
    pub fn new() -> Self {
        Self(Inflater::new(false))
    }
}

impl Default for DeflateDecompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Decompressor for DeflateDecompressor {
    fn decompress(&mut self, input: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
        self.0.decompress(input)
    }

    fn is_finished(&self) -> bool {
        self.0.finished
    }
}
