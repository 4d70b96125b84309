// Common utilities shared across layer parsers

pub mod binary;

pub use binary::latin1_to_string;
