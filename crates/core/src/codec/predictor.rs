//! PNG and TIFF predictors (`DecodeParms /Predictor`).

use crate::error::{PdfError, Result};
use crate::model::objects::Dict;

/// Predictor parameters taken from a `DecodeParms` dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredictorParams {
    pub predictor: i64,
    pub colors: usize,
    pub bits_per_component: usize,
    pub columns: usize,
}

impl PredictorParams {
    pub fn from_dict(parms: &Dict) -> Self {
        let int = |key: &str, default: i64| {
            parms
                .get(key)
                .and_then(|v| v.as_int().ok())
                .unwrap_or(default)
        };
        Self {
            predictor: int("Predictor", 1),
            colors: int("Colors", 1).max(1) as usize,
            bits_per_component: int("BitsPerComponent", 8).clamp(1, 16) as usize,
            columns: int("Columns", 1).max(1) as usize,
        }
    }

    fn bytes_per_pixel(&self) -> usize {
        (self.colors * self.bits_per_component).div_ceil(8)
    }

    fn row_bytes(&self) -> usize {
        (self.colors * self.bits_per_component * self.columns).div_ceil(8)
    }
}

/// Reverses the predictor described by `params`. Predictor 1 is the identity.
pub fn apply_predictor(data: Vec<u8>, params: &PredictorParams) -> Result<Vec<u8>> {
    match params.predictor {
        1 => Ok(data),
        2 => Ok(tiff_predictor(data, params)),
        10..=15 => Ok(png_predictor(&data, params)),
        other => Err(PdfError::DecodeError(format!("unsupported predictor {other}"))),
    }
}

/// PNG prediction: every row carries its own filter-type byte. An
/// incomplete final row is decoded as far as it goes.
fn png_predictor(data: &[u8], params: &PredictorParams) -> Vec<u8> {
    let row_bytes = params.row_bytes();
    let bpp = params.bytes_per_pixel();
    let mut out = Vec::with_capacity(data.len());
    let mut prev = vec![0u8; row_bytes];
    let mut cur = vec![0u8; row_bytes];

    for chunk in data.chunks(row_bytes + 1) {
        let (&filter, row) = match chunk.split_first() {
            Some(split) => split,
            None => break,
        };
        let n = row.len();
        cur[..n].copy_from_slice(row);
        cur[n..].fill(0);
        match filter {
            1 => {
                for i in bpp..n {
                    cur[i] = cur[i].wrapping_add(cur[i - bpp]);
                }
            }
            2 => {
                for i in 0..n {
                    cur[i] = cur[i].wrapping_add(prev[i]);
                }
            }
            3 => {
                for i in 0..n {
                    let left = if i >= bpp { u16::from(cur[i - bpp]) } else { 0 };
                    cur[i] = cur[i].wrapping_add(((left + u16::from(prev[i])) / 2) as u8);
                }
            }
            4 => {
                for i in 0..n {
                    let left = if i >= bpp { cur[i - bpp] } else { 0 };
                    let upper_left = if i >= bpp { prev[i - bpp] } else { 0 };
                    cur[i] = cur[i].wrapping_add(paeth(left, prev[i], upper_left));
                }
            }
            _ => {}
        }
        out.extend_from_slice(&cur[..n]);
        std::mem::swap(&mut prev, &mut cur);
    }
    out
}

const fn paeth(left: u8, above: u8, upper_left: u8) -> u8 {
    let p = left as i16 + above as i16 - upper_left as i16;
    let pa = (p - left as i16).abs();
    let pb = (p - above as i16).abs();
    let pc = (p - upper_left as i16).abs();
    if pa <= pb && pa <= pc {
        left
    } else if pb <= pc {
        above
    } else {
        upper_left
    }
}

/// TIFF predictor 2: each component is a delta from the same component of
/// the previous pixel in the row.
fn tiff_predictor(mut data: Vec<u8>, params: &PredictorParams) -> Vec<u8> {
    let row_bytes = params.row_bytes();
    let colors = params.colors;
    match params.bits_per_component {
        8 => {
            for row in data.chunks_mut(row_bytes) {
                for i in colors..row.len() {
                    row[i] = row[i].wrapping_add(row[i - colors]);
                }
            }
        }
        16 => {
            let step = colors * 2;
            for row in data.chunks_mut(row_bytes) {
                let mut i = step;
                while i + 1 < row.len() {
                    let prev = u16::from_be_bytes([row[i - step], row[i - step + 1]]);
                    let cur = u16::from_be_bytes([row[i], row[i + 1]]);
                    row[i..i + 2].copy_from_slice(&cur.wrapping_add(prev).to_be_bytes());
                    i += 2;
                }
            }
        }
        bits => {
            let mask = (1u32 << bits) - 1;
            for row in data.chunks_mut(row_bytes) {
                let samples = row.len() * 8 / bits;
                for s in colors..samples {
                    let v = read_bits(row, s * bits, bits) + read_bits(row, (s - colors) * bits, bits);
                    write_bits(row, s * bits, bits, v & mask);
                }
            }
        }
    }
    data
}

fn read_bits(row: &[u8], bit_pos: usize, bits: usize) -> u32 {
    (0..bits).fold(0, |acc, k| {
        let p = bit_pos + k;
        (acc << 1) | u32::from((row[p / 8] >> (7 - p % 8)) & 1)
    })
}

fn write_bits(row: &mut [u8], bit_pos: usize, bits: usize, value: u32) {
    for k in 0..bits {
        let p = bit_pos + k;
        let bit = ((value >> (bits - 1 - k)) & 1) as u8;
        let shift = 7 - p % 8;
        row[p / 8] = (row[p / 8] & !(1 << shift)) | (bit << shift);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(predictor: i64, colors: usize, bpc: usize, columns: usize) -> PredictorParams {
        PredictorParams {
            predictor,
            colors,
            bits_per_component: bpc,
            columns,
        }
    }

    #[test]
    fn test_png_up_and_sub() {
        let data = vec![1, 1, 2, 3, 2, 1, 1, 1];
        let out = apply_predictor(data, &params(12, 1, 8, 3)).unwrap();
        assert_eq!(out, [1, 3, 6, 2, 4, 7]);
    }

    #[test]
    fn test_png_paeth_first_row() {
        let out = apply_predictor(vec![4, 10, 5], &params(15, 1, 8, 2)).unwrap();
        assert_eq!(out, [10, 15]);
    }

    #[test]
    fn test_tiff_8bit() {
        let out = apply_predictor(vec![10, 20, 1, 2], &params(2, 2, 8, 2)).unwrap();
        assert_eq!(out, [10, 20, 11, 22]);
    }

    #[test]
    fn test_tiff_4bit() {
        // Samples 1, 1, 1, 1 as deltas become 1, 2, 3, 4.
        let out = apply_predictor(vec![0x11, 0x11], &params(2, 1, 4, 4)).unwrap();
        assert_eq!(out, [0x12, 0x34]);
    }

    #[test]
    fn test_unknown_predictor() {
        assert!(apply_predictor(vec![], &params(7, 1, 8, 1)).is_err());
    }
}
