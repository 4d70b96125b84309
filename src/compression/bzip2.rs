//! bzip2 decompressor

use bzip2::{Decompress, Status};

use super::{drain, ensure_not_finished, Decompressor};
use crate::error::{Result, VfsError};

pub struct Bzip2Decompressor {
    inner: Decompress,
    finished: bool,
}

impl Bzip2Decompressor {
    pub fn new() -> Self {
        Self {
            inner: Decompress::new(false),
            finished: false,
        }
    }
}

impl Default for Bzip2Decompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Decompressor for Bzip2Decompressor {
    fn decompress(&mut self, input: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
        ensure_not_finished(self.finished, "bzip2", input)?;
        if self.finished {
            return Ok((Vec::new(), Vec::new()));
        }

        let inner = &mut self.inner;
        let (output, consumed, finished) = drain("bzip2", input, |remaining, output| {
            let before = inner.total_in();
            let status = inner
                .decompress_vec(remaining, output)
                .map_err(|e| VfsError::backend("bzip2", e.to_string()).at_offset(before))?;
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

    fn is_finished(&self) -> bool {
        self.finished
    }
}
