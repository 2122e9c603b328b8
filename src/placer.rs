// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Mikael Lund

//! Chooses where in the C64's 256 memory pages the driver, screen,
//! character-ROM copy, and optional scroll text will live, subject to the
//! tune's own reserved pages and VIC-II hardware constraints.

use crate::error::ConverterError;
use crate::tune::Tune;

const MAX_PAGES: usize = 256;

/// Pages reserved for the minimal (screen-disabled) driver.
pub const NUM_MINDRV_PAGES: u8 = 2;
/// Pages reserved for the extended (screen + optional scroll text) driver.
pub const NUM_EXTDRV_PAGES: u8 = 5;
/// Pages a 40x25 screen occupies (1000 bytes, rounded up to whole pages).
pub const NUM_SCREEN_PAGES: u8 = 4;
/// Pages an in-RAM copy of the character ROM occupies.
pub const NUM_CHAR_PAGES: u8 = 8;

/// The chosen placement of driver, screen, character set, and scroll text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Placement {
    /// First page of the relocated driver; `0` means no placement exists.
    pub driver_page: u8,
    /// First page of the screen; `0` means a blank/minimal driver.
    pub screen_page: u8,
    /// First page of the in-RAM character set copy; `0` means the VIC's
    /// character ROM mirror is used instead.
    pub char_page: u8,
    /// First page of the scroll-text block; `0` means no scroll text.
    pub stil_page: u8,
}

impl Placement {
    /// Whether an extended (screen-capable) driver was placed.
    pub const fn has_screen(&self) -> bool {
        self.screen_page != 0
    }
}

fn build_used_pages(tune: &Tune) -> Option<[bool; MAX_PAGES]> {
    let mut used = [false; MAX_PAGES];

    if tune.reloc_start_page == 0 {
        for page in 0x00..=0x03usize {
            used[page] = true;
        }
        for page in 0xA0..=0xBFusize {
            used[page] = true;
        }
        for page in 0xD0..=0xFFusize {
            used[page] = true;
        }
        let load_pages = tune.load_image_pages();
        for page in load_pages.start..load_pages.end {
            used[page as usize] = true;
        }
    } else if tune.reloc_start_page != 0xFF && tune.reloc_pages != 0 {
        let start = usize::from(tune.reloc_start_page);
        let end = (start + usize::from(tune.reloc_pages)).min(MAX_PAGES);
        for (page, slot) in used.iter_mut().enumerate() {
            *slot = !(start..end).contains(&page);
        }
    } else {
        return None;
    }

    Some(used)
}

fn reserved(page: u8, start: u8, len: u8) -> bool {
    start != 0 && page >= start && u16::from(page) < u16::from(start) + u16::from(len)
}

/// Scans pages `0..256` for the first run of `size` consecutive pages that
/// are free in `used` and do not intersect any of `reservations`
/// (`(start_page, length)`, `start_page == 0` meaning "no reservation").
///
/// Mirrors the original `findDriverSpace`/`findStilSpace` search: a run is
/// only recognized once a blocked page (or the reservation sentinel) is
/// encountered after it, so a free run touching page 255 with nothing
/// blocking after it is never reported. This is deliberately preserved
/// rather than "fixed" since the reserved high pages make it unreachable in
/// practice.
fn find_contiguous(used: &[bool; MAX_PAGES], reservations: &[(u8, u8)], size: u8) -> u8 {
    let mut first_page: u16 = 0;
    for i in 0u16..MAX_PAGES as u16 {
        let page = i as u8;
        let blocked =
            used[i as usize] || reservations.iter().any(|&(s, l)| reserved(page, s, l));
        if blocked {
            if i - first_page >= u16::from(size) {
                return first_page as u8;
            }
            first_page = i + 1;
        }
    }
    0
}

fn find_driver_space(used: &[bool; MAX_PAGES], screen: u8, chars: u8, size: u8) -> u8 {
    find_contiguous(
        used,
        &[(screen, NUM_SCREEN_PAGES), (chars, NUM_CHAR_PAGES)],
        size,
    )
}

fn find_stil_space(used: &[bool; MAX_PAGES], screen: u8, chars: u8, driver: u8, size: u8) -> u8 {
    find_contiguous(
        used,
        &[
            (screen, NUM_SCREEN_PAGES),
            (chars, NUM_CHAR_PAGES),
            (driver, NUM_EXTDRV_PAGES),
        ],
        size,
    )
}

/// Chooses driver/screen/charset/scroll-text pages for `tune`, given the
/// scroll text's size in pages (`0` if there is none).
pub fn place(tune: &Tune, stil_size_pages: u8) -> Result<Placement, ConverterError> {
    let Some(used) = build_used_pages(tune) else {
        return Err(ConverterError::NotEnoughMemory);
    };

    // VIC banks in the order {0, 2, 1, 3}: the bit-swap below puts the two
    // RAM-resident banks (0 and 2, which mirror the character ROM only in
    // a narrow window) ahead of the two banks that always need a RAM copy
    // of the character set.
    for i in 0u8..4 {
        let swapped = if (i & 1) ^ (i >> 1) != 0 { i ^ 3 } else { i };
        let bank = swapped << 6;

        let mut j = 0u8;
        while j < 0x40 {
            if (bank & 0x40) == 0 && (0x10..0x20).contains(&j) {
                j += 4;
                continue;
            }

            let scr = bank + j;
            if used[usize::from(scr)]
                || used[usize::from(scr + 1)]
                || used[usize::from(scr + 2)]
                || used[usize::from(scr + 3)]
            {
                j += 4;
                continue;
            }

            if bank & 0x40 != 0 {
                let mut k = 0u8;
                while k < 0x40 {
                    if k == (j & 0x38) {
                        k += 8;
                        continue;
                    }
                    let chars = bank + k;
                    if (0..8).any(|o| used[usize::from(chars + o)]) {
                        k += 8;
                        continue;
                    }

                    let driver = find_driver_space(&used, scr, chars, NUM_EXTDRV_PAGES);
                    if driver != 0 {
                        let stil_page = if stil_size_pages != 0 {
                            find_stil_space(&used, scr, chars, driver, stil_size_pages)
                        } else {
                            0
                        };
                        return Ok(Placement {
                            driver_page: driver,
                            screen_page: scr,
                            char_page: chars,
                            stil_page,
                        });
                    }
                    k += 8;
                }
            } else {
                let driver = find_driver_space(&used, scr, 0, NUM_EXTDRV_PAGES);
                if driver != 0 {
                    let stil_page = if stil_size_pages != 0 {
                        find_stil_space(&used, scr, 0, driver, stil_size_pages)
                    } else {
                        0
                    };
                    return Ok(Placement {
                        driver_page: driver,
                        screen_page: scr,
                        char_page: 0,
                        stil_page,
                    });
                }
            }
            j += 4;
        }
    }

    let driver = find_driver_space(&used, 0, 0, NUM_MINDRV_PAGES);
    if driver == 0 {
        return Err(ConverterError::NotEnoughMemory);
    }
    Ok(Placement {
        driver_page: driver,
        screen_page: 0,
        char_page: 0,
        stil_page: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tune_with_load(load: u16, len: usize) -> Tune {
        let mut h = vec![0u8; 0x7C];
        h[0..4].copy_from_slice(b"PSID");
        h[0x04..0x06].copy_from_slice(&2u16.to_be_bytes());
        h[0x06..0x08].copy_from_slice(&(0x7Cu16).to_be_bytes());
        h[0x08..0x0A].copy_from_slice(&load.to_be_bytes());
        h[0x0A..0x0C].copy_from_slice(&load.to_be_bytes());
        h[0x0E..0x10].copy_from_slice(&1u16.to_be_bytes());
        h[0x10..0x12].copy_from_slice(&1u16.to_be_bytes());
        h.extend(std::iter::repeat(0xEAu8).take(len));
        Tune::parse(&h).unwrap()
    }

    #[test]
    fn default_window_places_screen_in_bank_zero() {
        let tune = tune_with_load(0x0801, 0x100);
        let placement = place(&tune, 0).unwrap();
        assert_ne!(placement.driver_page, 0);
        assert!(placement.has_screen());
        assert!([0x04, 0x08, 0x0C].contains(&placement.screen_page));
    }

    #[test]
    fn regions_are_pairwise_disjoint() {
        let tune = tune_with_load(0x0801, 0x100);
        let p = place(&tune, 2).unwrap();

        let ranges: Vec<(u16, u16)> = [
            Some((p.driver_page, NUM_EXTDRV_PAGES)),
            if p.has_screen() {
                Some((p.screen_page, NUM_SCREEN_PAGES))
            } else {
                None
            },
            if p.char_page != 0 {
                Some((p.char_page, NUM_CHAR_PAGES))
            } else {
                None
            },
            if p.stil_page != 0 {
                Some((p.stil_page, 2))
            } else {
                None
            },
        ]
        .into_iter()
        .flatten()
        .map(|(s, l)| (u16::from(s), u16::from(s) + u16::from(l)))
        .collect();

        for i in 0..ranges.len() {
            for j in (i + 1)..ranges.len() {
                let (a_start, a_end) = ranges[i];
                let (b_start, b_end) = ranges[j];
                assert!(a_end <= b_start || b_end <= a_start);
            }
        }
    }

    #[test]
    fn narrow_reloc_window_falls_back_to_minimal_driver() {
        let mut h = vec![0u8; 0x7C];
        h[0..4].copy_from_slice(b"PSID");
        h[0x04..0x06].copy_from_slice(&2u16.to_be_bytes());
        h[0x06..0x08].copy_from_slice(&(0x7Cu16).to_be_bytes());
        h[0x08..0x0A].copy_from_slice(&0x1000u16.to_be_bytes());
        h[0x0A..0x0C].copy_from_slice(&0x1000u16.to_be_bytes());
        h[0x0E..0x10].copy_from_slice(&1u16.to_be_bytes());
        h[0x10..0x12].copy_from_slice(&1u16.to_be_bytes());
        h[0x78] = 0x04;
        h[0x79] = 0x02; // only 2 pages available: too small for ext driver+screen
        h.push(0xEA);
        let tune = Tune::parse(&h).unwrap();

        let placement = place(&tune, 0).unwrap();
        assert_ne!(placement.driver_page, 0);
        assert!(!placement.has_screen());
        assert_eq!(placement.char_page, 0);
    }

    #[test]
    fn totally_full_memory_reports_not_enough_memory() {
        let mut h = vec![0u8; 0x7C];
        h[0..4].copy_from_slice(b"PSID");
        h[0x04..0x06].copy_from_slice(&2u16.to_be_bytes());
        h[0x06..0x08].copy_from_slice(&(0x7Cu16).to_be_bytes());
        h[0x78] = 0x04;
        h[0x79] = 0x01; // a single page, too small even for the minimal driver
        h.push(0xEA);
        let tune = Tune::parse(&h).unwrap();

        assert!(matches!(place(&tune, 0), Err(ConverterError::NotEnoughMemory)));
    }
}
