// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Mikael Lund

//! Error taxonomy for the PSID64 conversion pipeline.

use thiserror::Error;

/// Everything that can go wrong while loading, converting, or writing a tune.
#[derive(Debug, Error)]
pub enum ConverterError {
    /// Underlying file-system or stream error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is too short or its magic is neither `PSID` nor `RSID`.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// The header declares a version this loader does not accept.
    #[error("unsupported PSID/RSID version: {0}")]
    UnsupportedVersion(u16),

    /// The header's flags bit 0 marks the payload as SIDPLAYER MUS data.
    #[error("SIDPLAYER MUS content is not supported")]
    UnsupportedMus,

    /// The load address encoded in the file (or its payload) is unusable.
    #[error("invalid load address: {0}")]
    LoadAddressError(String),

    /// The payload does not fit below the top of the 64 KiB memory image.
    #[error("tune data does not fit in C64 memory: {0}")]
    DataTooLarge(String),

    /// The tune's declared relocation window overlaps its own load image
    /// or one of the three forbidden memory bands.
    #[error("relocation information overlaps the load image or a reserved memory area")]
    RelocOverlapsImage,

    /// No placement of driver (and optionally screen/charset/scroll text)
    /// fits in the free pages left by the tune.
    #[error("not enough free C64 memory for the driver")]
    NotEnoughMemory,

    /// The o65 object could not be relocated.
    #[error("relocation failed: {0}")]
    RelocationFailed(String),

    /// The compression pass failed.
    #[error("compression failed: {0}")]
    CompressionFailed(String),

    /// A critical error was reported by the STIL provider.
    #[error("STIL error: {0}")]
    Stil(String),

    /// A conversion or write was requested before a tune was loaded.
    #[error("no tune loaded")]
    NotLoaded,

    /// A write was requested before a conversion completed successfully.
    #[error("no tune converted")]
    NotConverted,
}

impl Clone for ConverterError {
    fn clone(&self) -> Self {
        match self {
            Self::Io(e) => Self::Io(std::io::Error::new(e.kind(), e.to_string())),
            Self::InvalidHeader(s) => Self::InvalidHeader(s.clone()),
            Self::UnsupportedVersion(v) => Self::UnsupportedVersion(*v),
            Self::UnsupportedMus => Self::UnsupportedMus,
            Self::LoadAddressError(s) => Self::LoadAddressError(s.clone()),
            Self::DataTooLarge(s) => Self::DataTooLarge(s.clone()),
            Self::RelocOverlapsImage => Self::RelocOverlapsImage,
            Self::NotEnoughMemory => Self::NotEnoughMemory,
            Self::RelocationFailed(s) => Self::RelocationFailed(s.clone()),
            Self::CompressionFailed(s) => Self::CompressionFailed(s.clone()),
            Self::Stil(s) => Self::Stil(s.clone()),
            Self::NotLoaded => Self::NotLoaded,
            Self::NotConverted => Self::NotConverted,
        }
    }
}

/// Non-fatal issues surfaced during relocation or STIL lookups.
///
/// These never abort a conversion; callers are expected to log them (the
/// CLI binary does so via [`log::warn!`]) and proceed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// An o65 relocation entry referenced a name absent from the externals
    /// table; the delta was treated as zero.
    UndefinedSymbol(String),
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::UndefinedSymbol(name) => write!(f, "undefined label '{name}'"),
        }
    }
}
