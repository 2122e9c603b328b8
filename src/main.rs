// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Mikael Lund

//! `psid64` - converts a PSID/RSID tune into a self-contained,
//! self-relocating C64 program file.

#![deny(missing_docs)]

use clap::Parser;
use psid64::compressor::NullCompressor;
use psid64::config::ConverterConfig;
use psid64::converter::Converter;
use psid64::hvsc_stil::HvscStil;
use psid64::stil::StilProvider;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Converts a single PSID/RSID file into a relocating C64 ".prg".
///
/// The driver object blobs and the bootstrapper image are frozen 6502
/// machine code supplied as build inputs (see the crate's out-of-scope
/// collaborators); this binary never embeds or fabricates them, it only
/// reads whatever files the caller points it at.
#[derive(Parser)]
#[command(name = "psid64", version, about)]
struct Args {
    /// Input PSID/RSID file.
    input: PathBuf,

    /// Output ".prg" path (default: input with its extension replaced by
    /// ".prg").
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Path to the minimal (screen-disabled) driver object, in o65 format.
    #[arg(long, env = "PSID64_DRIVER_MINIMAL")]
    driver_minimal: PathBuf,

    /// Path to the extended (screen-capable) driver object, in o65 format.
    #[arg(long, env = "PSID64_DRIVER_EXTENDED")]
    driver_extended: PathBuf,

    /// Path to the psidboot bootstrapper image.
    #[arg(long, env = "PSID64_BOOTSTRAPPER")]
    bootstrapper: PathBuf,

    /// Force the minimal driver: no screen, character set copy, or scroll text.
    #[arg(long)]
    blank_screen: bool,

    /// Compress the finished program with the configured [`Compressor`].
    ///
    /// [`Compressor`]: psid64::compressor::Compressor
    #[arg(long)]
    compress: bool,

    /// Override the subtune to start on (1-based; default: the tune's own
    /// start song).
    #[arg(long)]
    song: Option<u16>,

    /// Include the STIL directory-level global comment in the scroll text.
    #[arg(long)]
    use_global_comment: bool,

    /// Local HVSC collection root, used both to derive the STIL lookup key
    /// and to locate `DOCUMENTS/STIL.txt`.
    #[arg(long)]
    hvsc_root: Option<PathBuf>,

    /// Song-length database path (informational only; not queried by the
    /// core pipeline).
    #[arg(long)]
    songlength_db: Option<PathBuf>,

    /// Emit a memory-map diagnostic on stderr.
    #[arg(short, long)]
    verbose: bool,
}

fn output_path(args: &Args) -> PathBuf {
    args.output.clone().unwrap_or_else(|| {
        let mut out = args.input.clone();
        out.set_extension("prg");
        out
    })
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let input_bytes = fs::read(&args.input)?;
    let driver_minimal = fs::read(&args.driver_minimal)?;
    let driver_extended = fs::read(&args.driver_extended)?;
    let bootstrapper = fs::read(&args.bootstrapper)?;

    let mut stil_provider = HvscStil::empty();
    if let Some(root) = &args.hvsc_root
        && !stil_provider.set_base_dir(root)
    {
        log::warn!("could not load STIL database under {}", root.display());
    }

    if args.compress {
        log::warn!(
            "--compress requested but this binary has no Exomizer binding; \
             the program will be written uncompressed"
        );
    }

    let config = ConverterConfig {
        blank_screen: args.blank_screen,
        compress: args.compress,
        initial_song: args.song,
        use_global_comment: args.use_global_comment,
        hvsc_root: args.hvsc_root.clone(),
        song_length_db: args.songlength_db.clone(),
        verbose: args.verbose,
    };

    let mut converter = Converter::new(format!("psid64-rs v{}", env!("CARGO_PKG_VERSION")));
    converter.load(&input_bytes, Some(args.input.clone()))?;
    converter.convert(
        &config,
        &driver_minimal,
        &driver_extended,
        &bootstrapper,
        &stil_provider,
        &NullCompressor,
    )?;

    let out_path: &Path = &output_path(&args);
    converter.write(out_path)?;
    println!("Wrote {}", out_path.display());
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("psid64: {e}");
            ExitCode::FAILURE
        }
    }
}
