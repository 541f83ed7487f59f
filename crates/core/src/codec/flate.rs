//! FlateDecode via flate2.

use flate2::{Decompress, FlushDecompress, Status};
use std::io::Read;
use tracing::debug;

/// Inflates zlib data. When the stream is damaged (bad checksum, truncated,
/// garbage after the end) the bytes produced before the failure are kept.
pub fn flatedecode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 3);
    let mut decoder = flate2::read::ZlibDecoder::new(data);
    match decoder.read_to_end(&mut out) {
        Ok(_) => out,
        Err(err) => {
            debug!(%err, "zlib stream damaged, inflating incrementally");
            inflate_partial(data)
        }
    }
}

/// Feeds the decoder one byte at a time and stops at the first error.
fn inflate_partial(data: &[u8]) -> Vec<u8> {
    let mut decoder = Decompress::new(true);
    let mut out = Vec::with_capacity(data.len() * 2);
    let mut buf = [0u8; 4096];
    let mut i = 0usize;
    while i < data.len() {
        let before_out = decoder.total_out();
        let before_in = decoder.total_in();
        let res = decoder.decompress(&data[i..i + 1], &mut buf, FlushDecompress::None);
        let produced = (decoder.total_out() - before_out) as usize;
        out.extend_from_slice(&buf[..produced]);
        let consumed = (decoder.total_in() - before_in) as usize;
        i += consumed.max(1);
        match res {
            Ok(Status::StreamEnd) | Err(_) => break,
            Ok(_) => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{Compression, write::ZlibEncoder};
    use std::io::Write;

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn test_inflate() {
        assert_eq!(flatedecode(&deflate(b"BT /F1 12 Tf ET")), b"BT /F1 12 Tf ET");
    }

    #[test]
    fn test_bad_checksum_keeps_output() {
        let mut data = deflate(b"0 0 m 10 10 l S");
        let n = data.len();
        data[n - 1] ^= 0xFF;
        assert_eq!(flatedecode(&data), b"0 0 m 10 10 l S");
    }
}
