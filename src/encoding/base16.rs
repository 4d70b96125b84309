//! Base16 (hex) decoder; either letter case is accepted

use super::{split_quanta, Decoder};
use crate::error::{Result, VfsError};

pub struct Base16Decoder;

impl Decoder for Base16Decoder {
    fn decode(&mut self, encoded: &[u8], final_block: bool) -> Result<(Vec<u8>, Vec<u8>)> {
        let (whole, leftover) = split_quanta(encoded, 2, final_block);
        let decoded = hex::decode(&whole).map_err(|e| VfsError::backend("base16", e.to_string()))?;
        Ok((decoded, leftover))
    }
}
