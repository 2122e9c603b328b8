// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Mikael Lund

//! Formats SID Tune Information List text into a scrolling screen-code
//! byte string, and the trait abstracting over where that text comes from.

use crate::error::ConverterError;
use crate::screen::iso2scr;
use std::path::Path;

/// Leading space count the scroll text is padded with, so the color raster
/// effect catches up before the first visible character and the end of one
/// pass is separated from the start of the next.
pub const STIL_EOT_SPACES: usize = 10;

/// Supplies STIL metadata text for a tune, keyed by its HVSC-relative path.
///
/// Grounded on the STIL C API (`stil_init`/`stil_get_data`) wrapped by
/// `original_source/src/stilwrapper.h`: a *critical* error (the STIL
/// database itself could not be opened) aborts formatting entirely, while a
/// missing per-field entry is simply absent text, not an error.
pub trait StilProvider {
    /// Points the provider at a local HVSC tree root, returning whether the
    /// STIL database was found and loaded there.
    fn set_base_dir(&mut self, path: &Path) -> bool;
    /// The collection-wide comment for the tune's containing directory.
    fn global_comment(&self, hvsc_path: &str) -> Option<String>;
    /// The per-tune STIL entry for subtune `tune` (`0` means "all subtunes").
    fn entry(&self, hvsc_path: &str, tune: u16) -> Option<String>;
    /// A known-bug annotation for subtune `tune`, if any.
    fn bug(&self, hvsc_path: &str, tune: u16) -> Option<String>;
    /// Whether the database is unusable (vs. simply lacking this entry).
    fn has_critical_error(&self) -> bool;
    /// A human-readable description of the critical error, if any.
    fn error_string(&self) -> String;
}

/// Builds the scrolling STIL text block placed in the converted program.
pub struct StilFormatter;

impl StilFormatter {
    /// Looks up global comment, entry, and bug text for `hvsc_path`/`tune`
    /// and encodes them into C64 screen codes, or returns an empty vector if
    /// there was no text to show. Fails only on a critical provider error.
    pub fn format(
        provider: &dyn StilProvider,
        hvsc_path: &str,
        tune: u16,
        use_global_comment: bool,
    ) -> Result<Vec<u8>, ConverterError> {
        let mut raw = String::new();

        if use_global_comment
            && !provider.has_critical_error()
            && let Some(comment) = provider.global_comment(hvsc_path)
        {
            raw.push_str(&comment);
        }
        if !provider.has_critical_error()
            && let Some(entry) = provider.entry(hvsc_path, tune)
        {
            raw.push_str(&entry);
        }
        if !provider.has_critical_error()
            && let Some(bug) = provider.bug(hvsc_path, tune)
        {
            raw.push_str(&bug);
        }
        if provider.has_critical_error() {
            return Err(ConverterError::Stil(provider.error_string()));
        }

        Ok(encode(&raw))
    }
}

fn encode(raw: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len() + STIL_EOT_SPACES);
    for _ in 0..STIL_EOT_SPACES.saturating_sub(1) {
        out.push(iso2scr(b' '));
    }

    let mut space = true;
    let mut real_text = false;
    for ch in raw.chars() {
        if ch.is_whitespace() {
            space = true;
            continue;
        }
        if space {
            out.push(iso2scr(b' '));
            space = false;
        }
        let byte = u8::try_from(ch as u32).unwrap_or(b'?');
        out.push(iso2scr(byte));
        real_text = true;
    }

    if real_text {
        out.push(0xFF);
        out
    } else {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeProvider {
        global: Option<&'static str>,
        entry: Option<&'static str>,
        bug: Option<&'static str>,
        critical: bool,
    }

    impl StilProvider for FakeProvider {
        fn set_base_dir(&mut self, _path: &Path) -> bool {
            true
        }
        fn global_comment(&self, _hvsc_path: &str) -> Option<String> {
            self.global.map(String::from)
        }
        fn entry(&self, _hvsc_path: &str, _tune: u16) -> Option<String> {
            self.entry.map(String::from)
        }
        fn bug(&self, _hvsc_path: &str, _tune: u16) -> Option<String> {
            self.bug.map(String::from)
        }
        fn has_critical_error(&self) -> bool {
            self.critical
        }
        fn error_string(&self) -> String {
            "stil database unavailable".to_string()
        }
    }

    #[test]
    fn empty_metadata_produces_empty_text() {
        let provider = FakeProvider { global: None, entry: None, bug: None, critical: false };
        let text = StilFormatter::format(&provider, "/path.sid", 0, true).unwrap();
        assert!(text.is_empty());
    }

    #[test]
    fn whitespace_only_metadata_produces_empty_text() {
        let provider = FakeProvider { global: Some("   \n\t  "), entry: None, bug: None, critical: false };
        let text = StilFormatter::format(&provider, "/path.sid", 0, true).unwrap();
        assert!(text.is_empty());
    }

    #[test]
    fn real_text_is_padded_and_terminated() {
        let provider = FakeProvider { global: None, entry: Some("Hello  World"), bug: None, critical: false };
        let text = StilFormatter::format(&provider, "/path.sid", 0, true).unwrap();
        assert_eq!(&text[..STIL_EOT_SPACES - 1], &[iso2scr(b' '); STIL_EOT_SPACES - 1]);
        assert_eq!(*text.last().unwrap(), 0xFF);
        // collapsed double space between "Hello" and "World" becomes one
        let body = &text[STIL_EOT_SPACES - 1..text.len() - 1];
        assert_eq!(body.iter().filter(|&&b| b == iso2scr(b' ')).count(), 1);
    }

    #[test]
    fn global_comment_is_skipped_when_disabled() {
        let provider = FakeProvider { global: Some("Global"), entry: None, bug: None, critical: false };
        let text = StilFormatter::format(&provider, "/path.sid", 0, false).unwrap();
        assert!(text.is_empty());
    }

    #[test]
    fn critical_error_aborts_formatting() {
        let provider = FakeProvider { global: None, entry: None, bug: None, critical: true };
        let result = StilFormatter::format(&provider, "/path.sid", 0, true);
        assert!(matches!(result, Err(ConverterError::Stil(_))));
    }
}
