//! Base32 decoder

use data_encoding::BASE32;

use super::{split_quanta, Decoder};
use crate::error::{Result, VfsError};

pub struct Base32Decoder;

impl Decoder for Base32Decoder {
    fn decode(&mut self, encoded: &[u8], final_block: bool) -> Result<(Vec<u8>, Vec<u8>)> {
        let (whole, leftover) = split_quanta(encoded, 8, final_block);
        let decoded = BASE32
            .decode(&whole)
            .map_err(|e| VfsError::backend("base32", e.to_string()))?;
        Ok((decoded, leftover))
    }
}
