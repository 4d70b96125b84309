//! Block decoders (base16/32/64) and the method registry
//!
//! Block encodings decode in fixed-size quanta of input characters, so a
//! decoder consumes every whole quantum it is given and hands the remainder
//! back as leftover to be prefixed to the next chunk. On the final block the
//! remainder must itself be decodable. ASCII whitespace (line wrapping in
//! armored exports) is ignored.
//!
//! ## Module Structure
//! ```text
//! encoding/
//! ├── mod.rs     - Decoder trait, DecoderRegistry, quantum splitting
//! ├── base16.rs  - hex
//! ├── base32.rs  - RFC 4648 base32 (data-encoding)
//! └── base64.rs  - RFC 4648 base64 (base64)
//! ```

mod base16;
mod base32;
mod base64;

pub use self::base16::Base16Decoder;
pub use self::base32::Base32Decoder;
pub use self::base64::Base64Decoder;

use std::collections::HashMap;

use tracing::debug;

use crate::definitions::{ENCODING_METHOD_BASE16, ENCODING_METHOD_BASE32, ENCODING_METHOD_BASE64};
use crate::error::{Result, VfsError};

/// Block decoder
pub trait Decoder: Send {
    /// Decode whole quanta of `encoded`; returns (decoded, leftover input)
    ///
    /// With `final_block` set, everything must decode and leftover is empty.
    fn decode(&mut self, encoded: &[u8], final_block: bool) -> Result<(Vec<u8>, Vec<u8>)>;
}

pub type DecoderConstructor = fn() -> Result<Box<dyn Decoder>>;

/// Maps encoding method identifiers (case-insensitive) to constructors
#[derive(Default)]
pub struct DecoderRegistry {
    constructors: HashMap<String, DecoderConstructor>,
}

impl DecoderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with base16, base32 and base64
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let builtins: [(&str, DecoderConstructor); 3] = [
            (ENCODING_METHOD_BASE16, || Ok(Box::new(Base16Decoder))),
            (ENCODING_METHOD_BASE32, || Ok(Box::new(Base32Decoder))),
            (ENCODING_METHOD_BASE64, || Ok(Box::new(Base64Decoder))),
        ];
        for (method, constructor) in builtins {
            registry.constructors.insert(method.to_string(), constructor);
        }
        registry
    }

    pub fn register(&mut self, method: &str, constructor: DecoderConstructor) -> Result<()> {
        let key = method.to_lowercase();
        if self.constructors.contains_key(&key) {
            return Err(VfsError::AlreadyRegistered {
                registry: "Decoder",
                name: key,
            });
        }
        debug!(method = %key, "Registering decoder");
        self.constructors.insert(key, constructor);
        Ok(())
    }

    pub fn deregister(&mut self, method: &str) -> Result<()> {
        let key = method.to_lowercase();
        self.constructors
            .remove(&key)
            .map(|_| ())
            .ok_or(VfsError::NotRegistered {
                registry: "Decoder",
                name: key,
            })
    }

    pub fn is_registered(&self, method: &str) -> bool {
        self.constructors.contains_key(&method.to_lowercase())
    }

    pub fn constructor(&self, method: &str) -> Result<DecoderConstructor> {
        let key = method.to_lowercase();
        self.constructors
            .get(&key)
            .copied()
            .ok_or(VfsError::NotRegistered {
                registry: "Decoder",
                name: key,
            })
    }

    pub fn new_decoder(&self, method: &str) -> Result<Box<dyn Decoder>> {
        self.constructor(method)?()
    }

    pub fn methods(&self) -> Vec<String> {
        let mut methods: Vec<String> = self.constructors.keys().cloned().collect();
        methods.sort();
        methods
    }
}

/// Strip whitespace and split into (whole quanta, remainder)
///
/// On the final block nothing is held back.
pub(crate) fn split_quanta(encoded: &[u8], quantum: usize, final_block: bool) -> (Vec<u8>, Vec<u8>) {
    let mut compact: Vec<u8> = encoded
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    if final_block {
        return (compact, Vec::new());
    }
    let whole = compact.len() - compact.len() % quantum;
    let remainder = compact.split_off(whole);
    (compact, remainder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_split_quanta() {
        let (whole, rest) = split_quanta(b"QUJD\nREVG Rw", 4, false);
        assert_eq!(whole, b"QUJDREVG");
        assert_eq!(rest, b"Rw");

        let (whole, rest) = split_quanta(b"QUJDRw", 4, true);
        assert_eq!(whole, b"QUJDRw");
        assert!(rest.is_empty());
    }

    #[test]
    fn test_round_trip_all_methods() {
        let registry = DecoderRegistry::with_defaults();
        let data: Vec<u8> = (0..3 * 1024 * 1024 + 17u32).map(|i| (i * 31 % 251) as u8).collect();
        let encoders: [(&str, fn(&[u8]) -> String); 3] = [
            ("base16", |d| hex::encode(d)),
            ("base32", |d| data_encoding::BASE32.encode(d)),
            ("base64", |d| {
                use ::base64::Engine;
                ::base64::engine::general_purpose::STANDARD.encode(d)
            }),
        ];
        for (method, encode) in encoders {
            for size in [0usize, 1, 4095, 4096, 4097, data.len()] {
                let encoded = encode(&data[..size]);
                let mut decoder = registry.new_decoder(method).unwrap();
                let (decoded, leftover) = decoder.decode(encoded.as_bytes(), true).unwrap();
                assert_eq!(decoded, &data[..size], "{method} size {size}");
                assert!(leftover.is_empty());
            }
        }
    }

    #[test]
    fn test_partial_quantum_on_final_block_fails() {
        let registry = DecoderRegistry::with_defaults();
        let mut decoder = registry.new_decoder("BASE16").unwrap();
        let err = decoder.decode(b"abc", true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackEnd);

        let (decoded, leftover) = decoder.decode(b"abc", false).unwrap();
        assert_eq!(decoded, vec![0xab]);
        assert_eq!(leftover, b"c");
    }

    #[test]
    fn test_registry_guards() {
        let mut registry = DecoderRegistry::with_defaults();
        assert_eq!(registry.methods(), vec!["base16", "base32", "base64"]);
        assert!(registry.register("Base64", || Ok(Box::new(Base64Decoder))).is_err());
        registry.deregister("base32").unwrap();
        let err = registry.deregister("BASE32").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(registry.new_decoder("base32").is_err());
        assert!(registry.is_registered("base16"));
    }
}
