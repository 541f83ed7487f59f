//! RunLengthDecode.

/// Decodes run-length data: a length byte 0..=127 copies the next n + 1
/// bytes, 129..=255 repeats the next byte 257 - n times, 128 ends the data.
/// Truncated runs are dropped.
pub fn rldecode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 2);
    let mut i = 0;
    while i < data.len() {
        let length = data[i];
        i += 1;
        match length {
            128 => break,
            0..=127 => {
                let count = usize::from(length) + 1;
                let Some(run) = data.get(i..i + count) else { break };
                out.extend_from_slice(run);
                i += count;
            }
            129..=255 => {
                let Some(&byte) = data.get(i) else { break };
                out.extend(std::iter::repeat_n(byte, 257 - usize::from(length)));
                i += 1;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_and_repeat() {
        assert_eq!(rldecode(&[2, b'a', b'b', b'c', 254, b'z', 128, 9]), b"abczzz");
    }

    #[test]
    fn test_truncated_run() {
        assert_eq!(rldecode(&[0, b'x', 5, b'y']), b"x");
    }
}
