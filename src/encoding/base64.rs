//! Base64 decoder (standard alphabet, padded)

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::{split_quanta, Decoder};
use crate::error::{Result, VfsError};

pub struct Base64Decoder;

impl Decoder for Base64Decoder {
    fn decode(&mut self, encoded: &[u8], final_block: bool) -> Result<(Vec<u8>, Vec<u8>)> {
        let (whole, leftover) = split_quanta(encoded, 4, final_block);
        let decoded = STANDARD
            .decode(&whole)
            .map_err(|e| VfsError::backend("base64", e.to_string()))?;
        Ok((decoded, leftover))
    }
}
