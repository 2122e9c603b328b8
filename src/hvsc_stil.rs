// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Mikael Lund

//! File-backed [`StilProvider`] reading HVSC's `STIL.txt` from a local
//! collection root, adapted from `crabsid::hvsc::StilDatabase`'s parser.

use crate::stil::StilProvider;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// One path's worth of parsed STIL fields.
#[derive(Debug, Clone, Default)]
struct StilRecord {
    /// Concatenated TITLE/ARTIST/COMMENT lines, in file order.
    entry_text: String,
    /// Concatenated BUG lines, if any.
    bug_text: String,
}

/// A `STIL.txt`-backed [`StilProvider`].
///
/// Unlike the reference implementation's `libstil` binding (which parses
/// STIL lazily through a C API), this loads and indexes the whole file up
/// front, the way `crabsid::hvsc::StilDatabase::parse` does, trading a
/// larger one-time parse for simple path lookups.
#[derive(Debug, Default)]
pub struct HvscStil {
    records: HashMap<String, StilRecord>,
    critical_error: Option<String>,
}

impl HvscStil {
    /// An empty provider that never supplies text and never errors; used
    /// when no `--hvsc-root` was given.
    pub fn empty() -> Self {
        Self::default()
    }

    fn parse(content: &str) -> HashMap<String, StilRecord> {
        let mut records = HashMap::new();
        let mut current_path: Option<String> = None;
        let mut current = StilRecord::default();

        for line in content.lines() {
            if line.starts_with('/') {
                if let Some(path) = current_path.take() {
                    records.insert(path, current);
                }
                current_path = Some(line.trim().to_string());
                current = StilRecord::default();
                continue;
            }

            let trimmed = line.trim_start();
            if let Some(rest) = trimmed.strip_prefix("BUG:") {
                push_line(&mut current.bug_text, rest.trim());
            } else if let Some(rest) = trimmed.strip_prefix("TITLE:") {
                push_line(&mut current.entry_text, rest.trim());
            } else if let Some(rest) = trimmed.strip_prefix("ARTIST:") {
                push_line(&mut current.entry_text, rest.trim());
            } else if let Some(rest) = trimmed.strip_prefix("COMMENT:") {
                push_line(&mut current.entry_text, rest.trim());
            }
        }
        if let Some(path) = current_path {
            records.insert(path, current);
        }

        records
    }

    /// The containing directory's STIL path (trailing slash), used for
    /// collection-wide comments that STIL records against the directory
    /// entry rather than the individual file.
    fn directory_of(hvsc_path: &str) -> String {
        match hvsc_path.rfind('/') {
            Some(pos) => hvsc_path[..=pos].to_string(),
            None => "/".to_string(),
        }
    }
}

fn push_line(buf: &mut String, text: &str) {
    if text.is_empty() {
        return;
    }
    if !buf.is_empty() {
        buf.push(' ');
    }
    buf.push_str(text);
}

impl StilProvider for HvscStil {
    fn set_base_dir(&mut self, path: &Path) -> bool {
        let stil_path: PathBuf = path.join("DOCUMENTS").join("STIL.txt");
        match fs::read(&stil_path) {
            Ok(bytes) => {
                let content: String = bytes.iter().map(|&b| b as char).collect();
                self.records = Self::parse(&content);
                self.critical_error = None;
                true
            }
            Err(e) => {
                self.critical_error = Some(format!("{}: {e}", stil_path.display()));
                false
            }
        }
    }

    fn global_comment(&self, hvsc_path: &str) -> Option<String> {
        let dir = Self::directory_of(hvsc_path);
        self.records
            .get(&dir)
            .map(|r| r.entry_text.clone())
            .filter(|s| !s.is_empty())
    }

    fn entry(&self, hvsc_path: &str, _tune: u16) -> Option<String> {
        self.records
            .get(hvsc_path)
            .map(|r| r.entry_text.clone())
            .filter(|s| !s.is_empty())
    }

    fn bug(&self, hvsc_path: &str, _tune: u16) -> Option<String> {
        self.records
            .get(hvsc_path)
            .map(|r| r.bug_text.clone())
            .filter(|s| !s.is_empty())
    }

    fn has_critical_error(&self) -> bool {
        self.critical_error.is_some()
    }

    fn error_string(&self) -> String {
        self.critical_error.clone().unwrap_or_default()
    }
}
