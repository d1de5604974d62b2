//! N-gram extraction.
//!
//! Every index kind maps byte windows to 24-bit gram ids. File-side
//! extraction ([`file_grams`]) and query-side extraction ([`query_grams`])
//! must agree for an index to be sound: a file containing a pattern must
//! contain every gram the query side derives from that pattern.
//!
//! Query-side extraction returns `None` when a kind cannot derive any
//! gram from a literal (for example `text4` over a binary pattern). A
//! `None` contributes no narrowing — never an empty candidate set.

use std::collections::BTreeSet;

use scour_types::IndexKind;

/// Mask folding a hash into the 24-bit gram space.
const GRAM_MASK: u32 = 0x00ff_ffff;

/// Extracts the gram set of a file's contents for one index kind.
pub fn file_grams(kind: IndexKind, data: &[u8]) -> BTreeSet<u32> {
    match kind {
        IndexKind::Gram3 => data.windows(3).map(gram3_id).collect(),
        IndexKind::Text4 => data
            .windows(4)
            .filter(|w| w.iter().all(|b| b.is_ascii_graphic() || *b == b' '))
            .map(text4_id)
            .collect(),
        IndexKind::Hash4 => data.windows(4).map(hash4_id).collect(),
        IndexKind::Wide8 => data
            .windows(6)
            .filter(|w| {
                w[1] == 0
                    && w[3] == 0
                    && w[5] == 0
                    && [w[0], w[2], w[4]]
                        .iter()
                        .all(|b| b.is_ascii_graphic() || *b == b' ')
            })
            .map(|w| gram3_id(&[w[0], w[2], w[4]]))
            .collect(),
    }
}

/// Extracts the grams a literal pattern implies for one index kind.
///
/// Returns `None` if this kind cannot narrow candidates for the literal.
pub fn query_grams(kind: IndexKind, literal: &[u8]) -> Option<Vec<u32>> {
    let grams: Vec<u32> = match kind {
        IndexKind::Gram3 => literal.windows(3).map(gram3_id).collect(),
        IndexKind::Text4 => {
            if literal.len() < 4 {
                return None;
            }
            // Only sound if the whole pattern is printable: a partially
            // printable pattern may straddle non-printable file bytes the
            // file-side filter skipped.
            if !literal.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
                return None;
            }
            literal.windows(4).map(text4_id).collect()
        }
        IndexKind::Hash4 => {
            if literal.len() < 4 {
                return None;
            }
            literal.windows(4).map(hash4_id).collect()
        }
        IndexKind::Wide8 => {
            if !literal.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
                return None;
            }
            literal.windows(3).map(gram3_id).collect()
        }
    };

    if grams.is_empty() {
        None
    } else {
        Some(grams)
    }
}

fn gram3_id(window: &[u8]) -> u32 {
    (u32::from(window[0]) << 16) | (u32::from(window[1]) << 8) | u32::from(window[2])
}

fn text4_id(window: &[u8]) -> u32 {
    fnv1a(window) & GRAM_MASK
}

fn hash4_id(window: &[u8]) -> u32 {
    fnv1a(window) & GRAM_MASK
}

/// FNV-1a over a short window.
fn fnv1a(data: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for &byte in data {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}
