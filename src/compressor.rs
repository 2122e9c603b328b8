// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Mikael Lund

//! The final packing stage, kept at arm's length from any concrete
//! compressor implementation.

use crate::error::ConverterError;

/// Packs a finished program image, optionally shrinking it.
///
/// Exomizer (the tool the reference implementation shells out to) is an
/// external, opaque byte-in/byte-out transform with its own decompression
/// stub; this crate never links against it, the same way it never bundles
/// an HVSC mirror. Embedding applications supply a [`Compressor`] that
/// shells out to `exomizer`, binds `libexomizer`, or does nothing.
pub trait Compressor {
    /// Compresses `payload` (a full ".prg" image, load address included)
    /// into a self-extracting equivalent. `load_addr` and `start_addr` are
    /// passed through for compressors that need to regenerate a depacker
    /// stub targeting a specific entry point.
    fn compress(
        &self,
        payload: &[u8],
        load_addr: u16,
        start_addr: u16,
    ) -> Result<Vec<u8>, ConverterError>;
}

/// A no-op [`Compressor`] used when compression is disabled and in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCompressor;

impl Compressor for NullCompressor {
    fn compress(
        &self,
        payload: &[u8],
        _load_addr: u16,
        _start_addr: u16,
    ) -> Result<Vec<u8>, ConverterError> {
        Ok(payload.to_vec())
    }
}
