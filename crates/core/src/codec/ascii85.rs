//! ASCII85 and ASCIIHex stream decoders.

use crate::error::Result;

/// Decodes `ASCII85Decode` data. An optional `<~` prefix is skipped, decoding
/// stops at `~`, whitespace is ignored and `z` expands to four zero bytes.
/// A trailing partial group of n characters yields n - 1 bytes.
pub fn ascii85decode(data: &[u8]) -> Result<Vec<u8>> {
    let data = data.strip_prefix(b"<~").unwrap_or(data);
    let data = match data.iter().position(|&b| b == b'~') {
        Some(pos) => &data[..pos],
        None => data,
    };

    let mut out = Vec::with_capacity(data.len() * 4 / 5);
    let mut group = [0u8; 5];
    let mut n = 0;
    for &b in data {
        match b {
            b'z' if n == 0 => out.extend_from_slice(&[0; 4]),
            b'!'..=b'u' => {
                group[n] = b - b'!';
                n += 1;
                if n == 5 {
                    out.extend_from_slice(&group_value(&group).to_be_bytes());
                    n = 0;
                }
            }
            _ => {}
        }
    }
    if n > 1 {
        for slot in &mut group[n..] {
            *slot = 84;
        }
        out.extend_from_slice(&group_value(&group).to_be_bytes()[..n - 1]);
    }
    Ok(out)
}

fn group_value(group: &[u8; 5]) -> u32 {
    group
        .iter()
        .fold(0u32, |acc, &d| acc.wrapping_mul(85).wrapping_add(u32::from(d)))
}

/// Decodes `ASCIIHexDecode` data up to `>`. Non-hex bytes are skipped and an
/// odd final digit is padded with zero.
pub fn asciihexdecode(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len() / 2);
    let mut pending: Option<u8> = None;
    for &b in data {
        if b == b'>' {
            break;
        }
        if let Some(nibble) = hex_nibble(b) {
            match pending.take() {
                Some(high) => out.push((high << 4) | nibble),
                None => pending = Some(nibble),
            }
        }
    }
    if let Some(high) = pending {
        out.push(high << 4);
    }
    Ok(out)
}

pub(crate) const fn hex_nibble(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}
