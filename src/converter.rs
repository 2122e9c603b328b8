// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Mikael Lund

//! [`Converter`]: the single owning, non-reentrant facade that drives a
//! complete PSID/RSID-to-".prg" conversion, playing the role
//! `original_source/include/psid64/psid64.h`'s `Psid64` class plays.

use crate::assembler::{Assembler, Block};
use crate::compressor::Compressor;
use crate::config::ConverterConfig;
use crate::driver::{Driver, DriverPatcher};
use crate::error::ConverterError;
use crate::placer::{self, Placement};
use crate::screen::render_info_panel;
use crate::stil::{StilFormatter, StilProvider};
use crate::tune::{CompatMode, Tune};
use std::fs;
use std::path::{Path, PathBuf};

const COMPRESSED_LOAD_ADDR: u16 = 0x0801;
const COMPRESSED_START_ADDR: u16 = 0x080D;

/// Drives one conversion at a time: parses a tune, finds a placement,
/// relocates and patches the driver, renders the screen, assembles the
/// final program, and optionally compresses it.
///
/// Owns every buffer involved (the input bytes, the reconstructed 64 KiB
/// memory image inside [`Tune`], the relocated driver, the rendered screen,
/// the STIL text, and the assembled program) for the lifetime of one
/// `load`/`convert`/`write` sequence; callers reuse the same instance only
/// by calling those three in order, never concurrently.
pub struct Converter {
    tune: Option<Tune>,
    source_path: Option<PathBuf>,
    colophon: String,
    program: Option<Vec<u8>>,
    last_error: Option<ConverterError>,
}

impl Converter {
    /// Creates an idle converter. `colophon` is the title-bar text (crate
    /// name/version) the information panel renders, kept as a parameter so
    /// the core never hardcodes a product name.
    pub fn new(colophon: impl Into<String>) -> Self {
        Self {
            tune: None,
            source_path: None,
            colophon: colophon.into(),
            program: None,
            last_error: None,
        }
    }

    /// Parses `bytes` as a PSID/RSID tune. `source_path`, if given, is used
    /// to derive the HVSC-relative STIL lookup key during [`Self::convert`].
    pub fn load(&mut self, bytes: &[u8], source_path: Option<PathBuf>) -> Result<(), ConverterError> {
        self.program = None;
        match Tune::parse(bytes) {
            Ok(tune) => {
                self.tune = Some(tune);
                self.source_path = source_path;
                self.last_error = None;
                Ok(())
            }
            Err(e) => {
                self.tune = None;
                self.last_error = Some(e.clone());
                Err(e)
            }
        }
    }

    /// The loaded tune, if any.
    pub fn tune(&self) -> Option<&Tune> {
        self.tune.as_ref()
    }

    /// Runs the full pipeline against the loaded tune: STIL lookup, space
    /// placement, driver relocation/patching, screen rendering, assembly,
    /// and optional compression. The finished program becomes available via
    /// [`Self::program`] / [`Self::write`].
    pub fn convert(
        &mut self,
        config: &ConverterConfig,
        minimal_driver: &[u8],
        extended_driver: &[u8],
        bootstrapper: &[u8],
        stil_provider: &dyn StilProvider,
        compressor: &dyn Compressor,
    ) -> Result<(), ConverterError> {
        let result = self.convert_inner(
            config,
            minimal_driver,
            extended_driver,
            bootstrapper,
            stil_provider,
            compressor,
        );
        if let Err(ref e) = result {
            self.last_error = Some(e.clone());
        } else {
            self.last_error = None;
        }
        result
    }

    fn convert_inner(
        &mut self,
        config: &ConverterConfig,
        minimal_driver: &[u8],
        extended_driver: &[u8],
        bootstrapper: &[u8],
        stil_provider: &dyn StilProvider,
        compressor: &dyn Compressor,
    ) -> Result<(), ConverterError> {
        let tune = self.tune.as_ref().ok_or(ConverterError::NotLoaded)?;

        if tune.compat_mode == CompatMode::Basic {
            let mut program = Vec::with_capacity(2 + tune.data.len());
            program.extend_from_slice(&tune.load_address.to_le_bytes());
            program.extend_from_slice(&tune.data);
            if config.verbose {
                log::info!(
                    "C64 memory map:\n  ${:04X}-${:04X}  BASIC program",
                    tune.load_address,
                    tune.load_address.wrapping_add(tune.data.len() as u16)
                );
            }
            self.program = Some(program);
            return Ok(());
        }

        let hvsc_path = self
            .source_path
            .as_deref()
            .and_then(|p| config.hvsc_relative_path(p));
        let stil_text = match &hvsc_path {
            Some(path) => {
                StilFormatter::format(stil_provider, path, 0, config.use_global_comment)?
            }
            None => Vec::new(),
        };
        let stil_size_pages = ((stil_text.len() + 255) / 256).min(255) as u8;

        let mut placement = placer::place(tune, stil_size_pages)?;
        if config.blank_screen {
            placement.screen_page = 0;
            placement.char_page = 0;
            placement.stil_page = 0;
        }

        let driver = Driver::select(&placement, minimal_driver, extended_driver);

        let (screen, screen_songnum_offset) = if placement.has_screen() {
            let (screen, songnum) = render_info_panel(tune, &self.colophon);
            (Some(screen), songnum)
        } else {
            (None, None)
        };

        let (driver_bytes, warnings) =
            DriverPatcher::patch(&driver, tune, &placement, screen_songnum_offset)?;
        for warning in &warnings {
            log::warn!("{warning}");
        }

        let mut blocks = vec![Block {
            load: u16::from(placement.driver_page) << 8,
            data: &driver_bytes,
            description: "Driver code",
        }];
        blocks.push(Block {
            load: tune.load_address,
            data: &tune.data,
            description: "Music data",
        });
        if let Some(screen) = &screen
            && placement.has_screen()
        {
            blocks.push(Block {
                load: u16::from(placement.screen_page) << 8,
                data: screen.data(),
                description: "Screen",
            });
        }
        if placement.stil_page != 0 {
            blocks.push(Block {
                load: u16::from(placement.stil_page) << 8,
                data: &stil_text,
                description: "STIL text",
            });
        }

        if config.verbose {
            log_memory_map(&blocks, &placement);
        }

        let program = Assembler::assemble(
            bootstrapper,
            &mut blocks,
            &placement,
            tune,
            config.initial_song,
        )?;

        let program = if config.compress {
            let (header, payload) = program.split_at(2);
            let compressed =
                compressor.compress(payload, COMPRESSED_LOAD_ADDR, COMPRESSED_START_ADDR)?;
            let mut out = Vec::with_capacity(2 + compressed.len());
            out.extend_from_slice(header);
            out.extend_from_slice(&compressed);
            out
        } else {
            program
        };

        self.program = Some(program);
        Ok(())
    }

    /// The finished program bytes, if [`Self::convert`] has succeeded.
    pub fn program(&self) -> Option<&[u8]> {
        self.program.as_deref()
    }

    /// Writes the converted program to `path`.
    pub fn write(&mut self, path: &Path) -> Result<(), ConverterError> {
        let result = match &self.program {
            Some(program) => fs::write(path, program).map_err(ConverterError::Io),
            None => Err(ConverterError::NotConverted),
        };
        if let Err(ref e) = result {
            self.last_error = Some(e.clone());
        }
        result
    }

    /// The error from the most recent failing call, if any.
    pub fn last_error(&self) -> Option<&ConverterError> {
        self.last_error.as_ref()
    }

    /// Whether the most recent call succeeded.
    pub fn is_ok(&self) -> bool {
        self.last_error.is_none()
    }
}

fn log_memory_map(blocks: &[Block<'_>], placement: &Placement) {
    log::info!("C64 memory map:");
    let mut charset_pending = placement.char_page != 0;
    let charset = u16::from(placement.char_page) << 8;
    for block in blocks {
        if charset_pending && block.load > charset {
            log::info!(
                "  ${charset:04X}-${:04X}  Character set",
                charset + 256 * u16::from(crate::placer::NUM_CHAR_PAGES)
            );
            charset_pending = false;
        }
        log::info!(
            "  ${:04X}-${:04X}  {}",
            block.load,
            block.load.wrapping_add(block.data.len() as u16),
            block.description
        );
    }
    if charset_pending {
        log::info!(
            "  ${charset:04X}-${:04X}  Character set",
            charset + 256 * u16::from(crate::placer::NUM_CHAR_PAGES)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compressor::NullCompressor;
    use crate::stil::StilProvider;

    struct NoStil;
    impl StilProvider for NoStil {
        fn set_base_dir(&mut self, _path: &Path) -> bool {
            false
        }
        fn global_comment(&self, _hvsc_path: &str) -> Option<String> {
            None
        }
        fn entry(&self, _hvsc_path: &str, _tune: u16) -> Option<String> {
            None
        }
        fn bug(&self, _hvsc_path: &str, _tune: u16) -> Option<String> {
            None
        }
        fn has_critical_error(&self) -> bool {
            false
        }
        fn error_string(&self) -> String {
            String::new()
        }
    }

    fn minimal_header(load: u16, init: u16, play: u16, songs: u16, data: &[u8]) -> Vec<u8> {
        let mut h = vec![0u8; 0x7C];
        h[0..4].copy_from_slice(b"PSID");
        h[0x04..0x06].copy_from_slice(&2u16.to_be_bytes());
        h[0x06..0x08].copy_from_slice(&(0x7Cu16).to_be_bytes());
        h[0x08..0x0A].copy_from_slice(&load.to_be_bytes());
        h[0x0A..0x0C].copy_from_slice(&init.to_be_bytes());
        h[0x0C..0x0E].copy_from_slice(&play.to_be_bytes());
        h[0x0E..0x10].copy_from_slice(&songs.to_be_bytes());
        h[0x10..0x12].copy_from_slice(&1u16.to_be_bytes());
        h.extend_from_slice(data);
        h
    }

    fn fake_boot() -> Vec<u8> {
        let mut boot = vec![0u8; 40];
        let encoded: u16 = 0 + (0x0801 - 2);
        boot[19] = (encoded & 0xff) as u8;
        boot[20] = (encoded >> 8) as u8;
        boot
    }

    /// A trivial 2-byte-text o65 object (no relocations, no externals) used
    /// as a stand-in "minimal driver" in tests that never patch real player
    /// machine code.
    fn trivial_o65(len: usize) -> Vec<u8> {
        let mut obj = Vec::new();
        obj.extend_from_slice(&[0x01, 0x00, b'o', b'6', b'5']);
        obj.push(0);
        obj.extend_from_slice(&0u16.to_le_bytes()); // mode
        obj.extend_from_slice(&0x1000u16.to_le_bytes()); // tbase
        obj.extend_from_slice(&(len as u16).to_le_bytes()); // tlen
        obj.extend_from_slice(&0u16.to_le_bytes()); // dbase
        obj.extend_from_slice(&0u16.to_le_bytes()); // dlen
        obj.extend_from_slice(&0u16.to_le_bytes()); // bbase
        obj.extend_from_slice(&0u16.to_le_bytes()); // blen
        obj.extend_from_slice(&0u16.to_le_bytes()); // zbase
        obj.extend_from_slice(&0u16.to_le_bytes()); // zlen
        obj.extend_from_slice(&0u16.to_le_bytes()); // stacklen
        obj.push(0); // empty option block
        obj.extend(std::iter::repeat(0xEAu8).take(len)); // text (NOPs)
        obj.extend_from_slice(&0u16.to_le_bytes()); // undefined symbol count
        obj.push(0); // text reloc table: empty
        obj.push(0); // data reloc table: empty
        obj.extend_from_slice(&0u16.to_le_bytes()); // exported globals: none
        obj
    }

    #[test]
    fn basic_compat_tune_emits_verbatim_payload() {
        let header = minimal_header(0x0801, 0, 0, 1, &[0x00, 0x00, 0x60]);
        let mut bytes = header;
        bytes[0..4].copy_from_slice(b"RSID");
        let mut conv = Converter::new("psid64-rs test");
        conv.load(&bytes, None).unwrap();
        conv.convert(
            &ConverterConfig::default(),
            &[],
            &[],
            &[],
            &NoStil,
            &NullCompressor,
        )
        .unwrap();
        let program = conv.program().unwrap();
        assert_eq!(&program[0..2], &0x0801u16.to_le_bytes());
        assert_eq!(&program[2..], &[0x00, 0x00, 0x60]);
    }

    #[test]
    fn minimal_tune_converts_to_nonempty_program() {
        let bytes = minimal_header(0x1000, 0x1000, 0, 1, &[0x60]);
        let mut conv = Converter::new("psid64-rs test");
        conv.load(&bytes, None).unwrap();
        let boot = fake_boot();
        let driver = trivial_o65(2 * 256);
        conv.convert(
            &ConverterConfig::default(),
            &driver,
            &driver,
            &boot,
            &NoStil,
            &NullCompressor,
        )
        .unwrap();
        let program = conv.program().unwrap();
        assert_eq!(&program[0..2], &boot[0..2]);
        assert!(program.len() > boot.len());
        assert!(conv.is_ok());
    }

    #[test]
    fn convert_before_load_reports_not_loaded() {
        let mut conv = Converter::new("psid64-rs test");
        let result = conv.convert(
            &ConverterConfig::default(),
            &[],
            &[],
            &[],
            &NoStil,
            &NullCompressor,
        );
        assert!(matches!(result, Err(ConverterError::NotLoaded)));
        assert!(!conv.is_ok());
    }

    #[test]
    fn write_before_convert_reports_not_converted() {
        let mut conv = Converter::new("psid64-rs test");
        let result = conv.write(Path::new("/tmp/does-not-matter.prg"));
        assert!(matches!(result, Err(ConverterError::NotConverted)));
    }
}
