// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Mikael Lund

//! A reader for the subset of the "o65" relocatable object format used by
//! the PSID64 driver blobs: a single text segment relocated to an arbitrary
//! page boundary, with undefined externals resolved through a caller
//! supplied name → value table.
//!
//! Ported from André Fachat's `reloc65` (`xa65`), as adapted by Dag Lem for
//! VICE VSID to relocate and extract a text segment from an in-memory
//! buffer rather than a file.

use crate::error::{ConverterError, Warning};
use std::collections::HashMap;

const MAGIC: [u8; 5] = [0x01, 0x00, b'o', b'6', b'5'];
const HEADER_LEN: usize = 26;
const MODE_FORBIDDEN_BITS: u16 = 0x2000 | 0x4000;

fn truncated() -> ConverterError {
    ConverterError::RelocationFailed("truncated o65 object".to_string())
}

/// The kind of an o65 relocation entry (upper 3 bits of its type/seg byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RelocKind {
    /// Patch a full 16-bit little-endian word.
    Word,
    /// Patch only the high byte of a word; the low byte of the *old* value
    /// lives in the relocation stream itself, not in the segment.
    High,
    /// Patch only the low byte of a word.
    Low,
}

/// A single decoded relocation table entry.
#[derive(Debug, Clone, Copy)]
struct RelocEntry {
    addr: u16,
    kind: RelocKind,
    seg: u8,
    name_index: Option<u16>,
    stream_low_byte: Option<u8>,
}

/// Lazily walks an o65 relocation table, yielding one [`RelocEntry`] per
/// non-skip record. This is the "cursor yielding a finite sequence of
/// relocation records" shape called for by the o65 design note: external
/// resolution is supplied by the caller at apply time, not baked into the
/// cursor.
struct RelocCursor<'a> {
    data: &'a [u8],
    pos: usize,
    addr: i32,
    finished: bool,
}

impl<'a> RelocCursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            addr: -1,
            finished: false,
        }
    }

    /// Bytes consumed so far, including the terminating zero once exhausted.
    fn consumed(&self) -> usize {
        self.pos
    }
}

impl<'a> Iterator for RelocCursor<'a> {
    type Item = Result<RelocEntry, ConverterError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            let Some(&b) = self.data.get(self.pos) else {
                self.finished = true;
                return Some(Err(truncated()));
            };
            if b == 0 {
                self.pos += 1;
                self.finished = true;
                return None;
            }
            if b == 0xFF {
                self.addr += 254;
                self.pos += 1;
                continue;
            }

            self.addr += i32::from(b);
            self.pos += 1;

            let Some(&type_seg) = self.data.get(self.pos) else {
                self.finished = true;
                return Some(Err(truncated()));
            };
            self.pos += 1;

            let kind = match type_seg & 0xE0 {
                0x80 => RelocKind::Word,
                0x40 => RelocKind::High,
                0x20 => RelocKind::Low,
                other => {
                    self.finished = true;
                    return Some(Err(ConverterError::RelocationFailed(format!(
                        "unknown relocation type 0x{other:02x}"
                    ))));
                }
            };
            let seg = type_seg & 0x07;

            let name_index = if seg == 0 {
                match self.data.get(self.pos..self.pos + 2) {
                    Some(bytes) => {
                        self.pos += 2;
                        Some(u16::from_le_bytes([bytes[0], bytes[1]]))
                    }
                    None => {
                        self.finished = true;
                        return Some(Err(truncated()));
                    }
                }
            } else {
                None
            };

            let stream_low_byte = if kind == RelocKind::High {
                match self.data.get(self.pos) {
                    Some(&v) => {
                        self.pos += 1;
                        Some(v)
                    }
                    None => {
                        self.finished = true;
                        return Some(Err(truncated()));
                    }
                }
            } else {
                None
            };

            let Ok(addr) = u16::try_from(self.addr) else {
                self.finished = true;
                return Some(Err(truncated()));
            };

            return Some(Ok(RelocEntry {
                addr,
                kind,
                seg,
                name_index,
                stream_low_byte,
            }));
        }
    }
}

/// Per-segment base-address deltas applied to relocation entries whose
/// segment selector is non-zero (2=text, 3=data, 4=bss, 5=zero-page).
#[derive(Debug, Clone, Copy, Default)]
struct SegmentDeltas {
    text: i32,
    data: i32,
    bss: i32,
    zp: i32,
}

impl SegmentDeltas {
    fn for_seg(self, seg: u8) -> i32 {
        match seg {
            2 => self.text,
            3 => self.data,
            4 => self.bss,
            5 => self.zp,
            _ => 0,
        }
    }
}

fn option_block_len(data: &[u8], start: usize) -> Result<usize, ConverterError> {
    let mut len = 0usize;
    let mut c = *data.get(start).ok_or_else(truncated)? as usize;
    while c != 0 {
        len += c;
        c = *data.get(start + len).ok_or_else(truncated)? as usize;
    }
    Ok(len + 1)
}

fn read_undefined_names(data: &[u8], start: usize) -> Result<(Vec<String>, usize), ConverterError> {
    let count = u16::from_le_bytes(
        data.get(start..start + 2)
            .ok_or_else(truncated)?
            .try_into()
            .unwrap(),
    );
    let mut names = Vec::with_capacity(count as usize);
    let mut pos = start + 2;
    for _ in 0..count {
        let end = data[pos..]
            .iter()
            .position(|&b| b == 0)
            .map(|rel| pos + rel)
            .ok_or_else(truncated)?;
        names.push(String::from_utf8_lossy(&data[pos..end]).into_owned());
        pos = end + 1;
    }
    Ok((names, pos - start))
}

fn apply_relocations(
    buf: &mut [u8],
    rtab: &[u8],
    deltas: SegmentDeltas,
    names: &[String],
    externals: &HashMap<String, u16>,
    warnings: &mut Vec<Warning>,
) -> Result<usize, ConverterError> {
    let cursor = RelocCursor::new(rtab);
    let mut entries = Vec::new();
    for entry in cursor.by_ref() {
        entries.push(entry?);
    }
    let consumed = cursor.consumed();

    for entry in entries {
        let delta = if entry.seg != 0 {
            deltas.for_seg(entry.seg)
        } else {
            let index = entry.name_index.unwrap_or(0) as usize;
            let name = names.get(index).ok_or_else(truncated)?;
            match externals.get(name) {
                Some(value) => i32::from(*value),
                None => {
                    warnings.push(Warning::UndefinedSymbol(name.clone()));
                    0
                }
            }
        };

        let addr = entry.addr as usize;
        match entry.kind {
            RelocKind::Word => {
                let bytes = buf.get(addr..addr + 2).ok_or_else(truncated)?;
                let old = u16::from_le_bytes([bytes[0], bytes[1]]);
                let new = (i32::from(old) + delta) as u16;
                buf[addr..addr + 2].copy_from_slice(&new.to_le_bytes());
            }
            RelocKind::High => {
                let low = entry.stream_low_byte.unwrap_or(0);
                let high = *buf.get(addr).ok_or_else(truncated)?;
                let old = (i32::from(high) << 8) | i32::from(low);
                let new = old + delta;
                // The original reloc65 also writes the new low byte back
                // into the relocation stream here; we deliberately do not
                // replicate that (see design notes — it is not required
                // for correct relocation of the text segment).
                buf[addr] = ((new >> 8) & 0xFF) as u8;
            }
            RelocKind::Low => {
                let old = *buf.get(addr).ok_or_else(truncated)?;
                let new = i32::from(old) + delta;
                buf[addr] = (new & 0xFF) as u8;
            }
        }
    }

    Ok(consumed)
}

/// Relocates an already-sliced-out text segment in place, given the raw
/// bytes of its relocation table, the base-address delta to apply to
/// text-relative (`seg == 2`) entries, and a name table for externals.
///
/// This is the low-level primitive `O65Object::relocate_text` is built on;
/// it is exposed separately so the relocation pass itself — "a lazy finite
/// sequence of relocation records applied to an owned buffer" — can be
/// exercised without going through o65 header parsing.
pub fn relocate(
    text: &mut [u8],
    rtab: &[u8],
    base_delta: i32,
    names: &[String],
    externals: &HashMap<String, u16>,
) -> Result<Vec<Warning>, ConverterError> {
    let deltas = SegmentDeltas {
        text: base_delta,
        ..SegmentDeltas::default()
    };
    let mut warnings = Vec::new();
    apply_relocations(text, rtab, deltas, names, externals, &mut warnings)?;
    Ok(warnings)
}

/// A parsed o65 object, restricted to a single text segment, one (usually
/// empty) data segment, and the relocation machinery needed to rebase the
/// text segment to an arbitrary page.
pub struct O65Object<'a> {
    raw: &'a [u8],
    tbase: u16,
    text: std::ops::Range<usize>,
    data: std::ops::Range<usize>,
    names: Vec<String>,
    text_reloc: std::ops::Range<usize>,
    data_reloc: std::ops::Range<usize>,
}

impl<'a> O65Object<'a> {
    /// Parses an o65 object's header and locates its segments, symbol
    /// table, and relocation tables without applying any relocation.
    pub fn parse(raw: &'a [u8]) -> Result<Self, ConverterError> {
        if raw.len() < HEADER_LEN || raw[0..5] != MAGIC {
            return Err(ConverterError::RelocationFailed(
                "bad o65 magic".to_string(),
            ));
        }

        let mode = u16::from_le_bytes([raw[6], raw[7]]);
        if mode & MODE_FORBIDDEN_BITS != 0 {
            return Err(ConverterError::RelocationFailed(
                "unsupported o65 mode".to_string(),
            ));
        }

        let tbase = u16::from_le_bytes([raw[8], raw[9]]);
        let tlen = u16::from_le_bytes([raw[10], raw[11]]) as usize;
        let dlen = u16::from_le_bytes([raw[14], raw[15]]) as usize;

        let hlen = HEADER_LEN + option_block_len(raw, HEADER_LEN)?;
        let text_start = hlen;
        let text_end = text_start
            .checked_add(tlen)
            .filter(|&e| e <= raw.len())
            .ok_or_else(truncated)?;
        let data_start = text_end;
        let data_end = data_start
            .checked_add(dlen)
            .filter(|&e| e <= raw.len())
            .ok_or_else(truncated)?;

        let (names, undef_len) = read_undefined_names(raw, data_end)?;
        let text_reloc_start = data_end + undef_len;

        let text_reloc_consumed = {
            let mut warnings = Vec::new();
            let mut scratch = raw[text_start..text_end].to_vec();
            apply_relocations(
                &mut scratch,
                &raw[text_reloc_start..],
                SegmentDeltas::default(),
                &names,
                &HashMap::new(),
                &mut warnings,
            )?
        };
        let data_reloc_start = text_reloc_start + text_reloc_consumed;
        let data_reloc_consumed = {
            let mut warnings = Vec::new();
            let mut scratch = raw[data_start..data_end].to_vec();
            apply_relocations(
                &mut scratch,
                &raw[data_reloc_start..],
                SegmentDeltas::default(),
                &names,
                &HashMap::new(),
                &mut warnings,
            )?
        };

        Ok(Self {
            raw,
            tbase,
            text: text_start..text_end,
            data: data_start..data_end,
            names,
            text_reloc: text_reloc_start..(text_reloc_start + text_reloc_consumed),
            data_reloc: data_reloc_start..(data_reloc_start + data_reloc_consumed),
        })
    }

    /// The object's original text segment base address.
    pub fn text_base(&self) -> u16 {
        self.tbase
    }

    /// The unrelocated text segment bytes.
    pub fn text(&self) -> &[u8] {
        &self.raw[self.text.clone()]
    }

    /// Relocates the text segment to `target_addr`, resolving external
    /// references through `externals`. Data/bss/zero-page bases are left
    /// unmoved; only the text segment is relocated.
    pub fn relocate_text(
        &self,
        target_addr: u16,
        externals: &HashMap<String, u16>,
    ) -> Result<(Vec<u8>, Vec<Warning>), ConverterError> {
        let mut text = self.raw[self.text.clone()].to_vec();
        let base_delta = i32::from(target_addr) - i32::from(self.tbase);
        let mut warnings = relocate(
            &mut text,
            &self.raw[self.text_reloc.clone()],
            base_delta,
            &self.names,
            externals,
        )?;

        // Data segment relocations are walked for externals-resolution
        // side effects (warnings) but the data bytes themselves are not
        // part of this core's output — only the relocated text segment is.
        if !self.data.is_empty() {
            let mut data = self.raw[self.data.clone()].to_vec();
            apply_relocations(
                &mut data,
                &self.raw[self.data_reloc.clone()],
                SegmentDeltas::default(),
                &self.names,
                externals,
                &mut warnings,
            )?;
        }

        Ok((text, warnings))
    }
}
