//! LZWDecode via weezl.

use weezl::{BitOrder, decode::Decoder};

/// Decodes LZW data (MSB-first, 8-bit symbols).
///
/// `early_change` = 1 is the PDF default; 0 switches code size one code
/// later. Corrupt input yields whatever was decoded before the error.
pub fn lzwdecode(data: &[u8], early_change: i64) -> Vec<u8> {
    let mut decoder = if early_change == 0 {
        Decoder::new(BitOrder::Msb, 8)
    } else {
        Decoder::with_tiff_size_switch(BitOrder::Msb, 8)
    };
    let mut out = Vec::with_capacity(data.len() * 2);
    let _ = decoder.into_vec(&mut out).decode(data);
    out
}
