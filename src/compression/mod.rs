//! Streaming decompressors and the method registry
//!
//! A [`Decompressor`] is fed compressed input in arbitrary chunks and returns
//! the decoded output plus any input it did not consume. Leftover bytes are
//! only ever reported once the codec has seen its end-of-stream marker; the
//! split point comes from the codec's own consumed-byte counter. An instance
//! that reached end of stream rejects further input and must be replaced.
//!
//! ## Module Structure
//! ```text
//! compression/
//! ├── mod.rs    - Decompressor trait, DecompressorRegistry
//! ├── flate.rs  - zlib and raw DEFLATE (flate2)
//! ├── bzip2.rs  - bzip2
//! └── lzma.rs   - LZMA alone and XZ (xz2)
//! ```

mod bzip2;
mod flate;
mod lzma;

pub use self::bzip2::Bzip2Decompressor;
pub use self::flate::{DeflateDecompressor, ZlibDecompressor};
pub use self::lzma::{LzmaDecompressor, XzDecompressor};

use std::collections::HashMap;

use tracing::debug;

use crate::definitions::{
    COMPRESSION_METHOD_BZIP2, COMPRESSION_METHOD_DEFLATE, COMPRESSION_METHOD_LZMA,
    COMPRESSION_METHOD_XZ, COMPRESSION_METHOD_ZLIB,
};
use crate::error::{Result, VfsError};

/// Output growth step while draining a codec
pub(crate) const OUTPUT_CHUNK_SIZE: usize = 64 * 1024;

/// Stateful streaming decompressor
pub trait Decompressor: Send {
    /// Feed compressed bytes; returns (decoded, unconsumed trailing input)
    fn decompress(&mut self, input: &[u8]) -> Result<(Vec<u8>, Vec<u8>)>;

    /// True once the codec has seen its end-of-stream marker
    fn is_finished(&self) -> bool;
}

/// Constructor stored in the registry
pub type DecompressorConstructor = fn() -> Result<Box<dyn Decompressor>>;

/// Maps compression method identifiers (case-insensitive) to constructors
#[derive(Default)]
pub struct DecompressorRegistry {
    constructors: HashMap<String, DecompressorConstructor>,
}

impl DecompressorRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in method
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let builtins: [(&str, DecompressorConstructor); 5] = [
            (COMPRESSION_METHOD_BZIP2, || Ok(Box::new(Bzip2Decompressor::new()))),
            (COMPRESSION_METHOD_DEFLATE, || Ok(Box::new(DeflateDecompressor::new()))),
            (COMPRESSION_METHOD_LZMA, || Ok(Box::new(LzmaDecompressor::new()?))),
            (COMPRESSION_METHOD_XZ, || Ok(Box::new(XzDecompressor::new()?))),
            (COMPRESSION_METHOD_ZLIB, || Ok(Box::new(ZlibDecompressor::new()))),
        ];
        for (method, constructor) in builtins {
            registry.constructors.insert(method.to_string(), constructor);
        }
        registry
    }

    pub fn register(&mut self, method: &str, constructor: DecompressorConstructor) -> Result<()> {
        let key = method.to_lowercase();
        if self.constructors.contains_key(&key) {
            return Err(VfsError::AlreadyRegistered {
                registry: "Decompressor",
                name: key,
            });
        }
        debug!(method = %key, "Registering decompressor");
        self.constructors.insert(key, constructor);
        Ok(())
    }

    pub fn deregister(&mut self, method: &str) -> Result<()> {
        let key = method.to_lowercase();
        self.constructors
            .remove(&key)
            .map(|_| ())
            .ok_or(VfsError::NotRegistered {
                registry: "Decompressor",
                name: key,
            })
    }

    pub fn is_registered(&self, method: &str) -> bool {
        self.constructors.contains_key(&method.to_lowercase())
    }

    /// Constructor registered for a method
    pub fn constructor(&self, method: &str) -> Result<DecompressorConstructor> {
        let key = method.to_lowercase();
        self.constructors
            .get(&key)
            .copied()
            .ok_or(VfsError::NotRegistered {
                registry: "Decompressor",
                name: key,
            })
    }

    /// Fresh decompressor for a method
    pub fn new_decompressor(&self, method: &str) -> Result<Box<dyn Decompressor>> {
        self.constructor(method)?()
    }

    /// Registered method identifiers, sorted
    pub fn methods(&self) -> Vec<String> {
        let mut methods: Vec<String> = self.constructors.keys().cloned().collect();
        methods.sort();
        methods
    }
}

/// Reject input to a codec that already reached end of stream
pub(crate) fn ensure_not_finished(finished: bool, backend: &'static str, input: &[u8]) -> Result<()> {
    if finished && !input.is_empty() {
        return Err(VfsError::backend(
            backend,
            "decompressor already reached end of stream; use a new instance",
        ));
    }
    Ok(())
}

/// Make sure a drain loop has room to write into
fn reserve_output(output: &mut Vec<u8>) {
    if output.capacity() - output.len() < OUTPUT_CHUNK_SIZE / 4 {
        output.reserve(OUTPUT_CHUNK_SIZE.max(output.len()));
    }
}

/// Run a codec step until the input is consumed and the output drained
///
/// `step` gets the unconsumed input and an output vector with spare capacity
/// and returns how many input bytes it consumed and whether the codec hit
/// end of stream. Returns (decoded, consumed, finished). A codec that stops
/// taking input before end of stream is a back-end failure.
pub(crate) fn drain<F>(backend: &'static str, input: &[u8], mut step: F) -> Result<(Vec<u8>, usize, bool)>
where
    F: FnMut(&[u8], &mut Vec<u8>) -> Result<(usize, bool)>,
{
    let mut output = Vec::new();
    let mut consumed = 0usize;
    if input.is_empty() {
        return Ok((output, consumed, false));
    }
    loop {
        reserve_output(&mut output);
        let produced_before = output.len();
        let (used, end) = step(&input[consumed..], &mut output)?;
        consumed += used;
        if end {
            return Ok((output, consumed, true));
        }
        if consumed == input.len() && output.len() < output.capacity() {
            break;
        }
        if used == 0 && output.len() == produced_before {
            if consumed < input.len() {
                return Err(VfsError::backend(
                    backend,
                    format!("codec made no progress with {} input bytes left", input.len() - consumed),
                ));
            }
            break;
        }
    }
    Ok((output, consumed, false))
}

#[cfg(test)]
pub(crate) mod test_data {
    use std::io::Write;

    pub fn zlib(data: &[u8]) -> Vec<u8> {
        let mut enc = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    pub fn deflate(data: &[u8]) -> Vec<u8> {
        let mut enc = flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    pub fn bzip2(data: &[u8]) -> Vec<u8> {
        let mut enc = ::bzip2::write::BzEncoder::new(Vec::new(), ::bzip2::Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    pub fn xz(data: &[u8]) -> Vec<u8> {
        let mut enc = xz2::write::XzEncoder::new(Vec::new(), 6);
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    pub fn lzma_alone(data: &[u8]) -> Vec<u8> {
        let options = xz2::stream::LzmaOptions::new_preset(6).unwrap();
        let stream = xz2::stream::Stream::new_lzma_encoder(&options).unwrap();
        let mut enc = xz2::write::XzEncoder::new_stream(Vec::new(), stream);
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    /// Compressible but non-trivial payload
    pub fn sample(size: usize) -> Vec<u8> {
        let mut state: u32 = 0x1234_5678;
        (0..size)
            .map(|i| {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                if i % 7 == 0 {
                    (state >> 16) as u8
                } else {
                    b"forensic layered stream "[i % 24]
                }
            })
            .collect()
    }

    pub fn compress(method: &str, data: &[u8]) -> Vec<u8> {
        match method {
            "zlib" => zlib(data),
            "deflate" => deflate(data),
            "bzip2" => bzip2(data),
            "xz" => xz(data),
            "lzma" => lzma_alone(data),
            other => panic!("no test encoder for {other}"),
        }
    }
}
