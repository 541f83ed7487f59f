//! PDF functions (PDF 32000 7.10): sampled, exponential, stitching and
//! PostScript calculator.
//!
//! A parsed function is immutable and cheap to share; color spaces and
//! shadings hold them behind `Arc`.

use crate::color::postscript::PsProgram;
use crate::document::xref::XRef;
use crate::error::{PdfError, Result};
use crate::model::objects::{Dict, PDFObject};
use tracing::warn;

/// Sub-function nesting limit for stitching functions.
const MAX_NESTING: usize = 16;

/// Input dimensions accepted for sampled functions. Evaluation visits
/// 2^m cell corners.
const MAX_SAMPLED_INPUTS: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub enum PdfFunction {
    /// Type 0.
    Sampled {
        domain: Vec<f64>,
        range: Vec<f64>,
        size: Vec<usize>,
        bits_per_sample: u32,
        encode: Vec<f64>,
        decode: Vec<f64>,
        /// Samples normalized to 0..1, output-major within each grid point.
        samples: Vec<f64>,
    },
    /// Type 2.
    Exponential {
        domain: Vec<f64>,
        range: Vec<f64>,
        c0: Vec<f64>,
        c1: Vec<f64>,
        n: f64,
    },
    /// Type 3.
    Stitching {
        domain: Vec<f64>,
        range: Vec<f64>,
        functions: Vec<PdfFunction>,
        bounds: Vec<f64>,
        encode: Vec<f64>,
    },
    /// Type 4.
    PostScript {
        domain: Vec<f64>,
        range: Vec<f64>,
        program: PsProgram,
    },
    /// An array of 1-output functions, one per output component.
    Array(Vec<PdfFunction>),
}

fn nums(xref: &XRef, dict: &Dict, key: &str) -> Option<Vec<f64>> {
    xref.get(dict, key)?.as_num_array().ok()
}

fn required_nums(xref: &XRef, dict: &Dict, key: &str) -> Result<Vec<f64>> {
    nums(xref, dict, key).ok_or_else(|| PdfError::KeyError(key.into()))
}

/// Linear map of `x` from [xmin, xmax] onto [ymin, ymax].
fn interpolate(x: f64, xmin: f64, xmax: f64, ymin: f64, ymax: f64) -> f64 {
    if xmax == xmin {
        return ymin;
    }
    ymin + (x - xmin) * (ymax - ymin) / (xmax - xmin)
}

fn clip(x: f64, lo: f64, hi: f64) -> f64 {
    if x.is_nan() { lo } else { x.max(lo).min(hi) }
}

/// Clamps each value against the `[min max ...]` pairs of `bounds`.
fn clip_all(values: &mut [f64], bounds: &[f64]) {
    for (v, pair) in values.iter_mut().zip(bounds.chunks_exact(2)) {
        *v = clip(*v, pair[0], pair[1]);
    }
}

/// Reads `count` unsigned samples of `bps` bits, MSB first.
fn read_samples(data: &[u8], bps: u32, count: usize) -> Result<Vec<f64>> {
    let max = ((1u64 << bps) - 1) as f64;
    let needed_bits = (count as u64)
        .checked_mul(u64::from(bps))
        .ok_or_else(|| PdfError::DecodeError("sampled function is too large".into()))?;
    if (data.len() as u64).saturating_mul(8) < needed_bits {
        return Err(PdfError::DecodeError(format!(
            "sampled function needs {needed_bits} bits, stream has {}",
            data.len() * 8
        )));
    }
    let mut out = Vec::with_capacity(count);
    let mut bit_pos: u64 = 0;
    for _ in 0..count {
        let mut value: u64 = 0;
        for _ in 0..bps {
            let byte = data[(bit_pos / 8) as usize];
            let bit = (byte >> (7 - bit_pos % 8)) & 1;
            value = (value << 1) | u64::from(bit);
            bit_pos += 1;
        }
        out.push(value as f64 / max);
    }
    Ok(out)
}

impl PdfFunction {
    /// Parses a function object, an array of functions, or a reference to
    /// either.
    pub fn parse(xref: &XRef, obj: &PDFObject) -> Result<Self> {
        Self::parse_nested(xref, obj, 0)
    }

    fn parse_nested(xref: &XRef, obj: &PDFObject, depth: usize) -> Result<Self> {
        if depth > MAX_NESTING {
            return Err(PdfError::SyntaxError("functions nested too deeply".into()));
        }
        let resolved = xref
            .resolve(obj)
            .ok_or_else(|| PdfError::ObjectNotFound("function".into()))?;
        if let PDFObject::Array(items) = &*resolved {
            return items
                .iter()
                .map(|item| Self::parse_nested(xref, item, depth + 1))
                .collect::<Result<Vec<_>>>()
                .map(Self::Array);
        }
        let dict = resolved.as_dict()?;
        let function_type = xref
            .get(dict, "FunctionType")
            .ok_or_else(|| PdfError::KeyError("FunctionType".into()))?
            .as_int()?;
        let domain = required_nums(xref, dict, "Domain")?;
        if domain.len() < 2 || domain.len() % 2 != 0 {
            return Err(PdfError::SyntaxError("function Domain must have pairs".into()));
        }
        let range = nums(xref, dict, "Range").unwrap_or_default();

        match function_type {
            0 => {
                let stream = resolved.as_stream()?;
                if range.is_empty() {
                    return Err(PdfError::KeyError("Range".into()));
                }
                let size: Vec<usize> = required_nums(xref, dict, "Size")?
                    .into_iter()
                    .map(|s| s.max(1.0) as usize)
                    .collect();
                if size.len() != domain.len() / 2 {
                    return Err(PdfError::SyntaxError("function Size does not match Domain".into()));
                }
                if size.len() > MAX_SAMPLED_INPUTS {
                    return Err(PdfError::SyntaxError(format!(
                        "sampled function has {} inputs, at most {MAX_SAMPLED_INPUTS} supported",
                        size.len()
                    )));
                }
                let bits_per_sample = xref
                    .get(dict, "BitsPerSample")
                    .and_then(|v| v.as_int().ok())
                    .filter(|b| matches!(b, 1 | 2 | 4 | 8 | 12 | 16 | 24 | 32))
                    .ok_or_else(|| PdfError::KeyError("BitsPerSample".into()))? as u32;
                let encode = nums(xref, dict, "Encode")
                    .unwrap_or_else(|| size.iter().flat_map(|&s| [0.0, (s - 1) as f64]).collect());
                let decode = nums(xref, dict, "Decode").unwrap_or_else(|| range.clone());
                let outputs = range.len() / 2;
                let count = size
                    .iter()
                    .try_fold(outputs, |acc, &s| acc.checked_mul(s))
                    .ok_or_else(|| PdfError::SyntaxError("sampled function Size overflows".into()))?;
                let data = xref.decode_stream(stream)?.data;
                let samples = read_samples(&data, bits_per_sample, count)?;
                Ok(Self::Sampled {
                    domain,
                    range,
                    size,
                    bits_per_sample,
                    encode,
                    decode,
                    samples,
                })
            }
            2 => {
                let c0 = nums(xref, dict, "C0").unwrap_or_else(|| vec![0.0]);
                let c1 = nums(xref, dict, "C1").unwrap_or_else(|| vec![1.0]);
                if c0.len() != c1.len() {
                    return Err(PdfError::SyntaxError("C0 and C1 differ in length".into()));
                }
                let n = xref
                    .get(dict, "N")
                    .ok_or_else(|| PdfError::KeyError("N".into()))?
                    .as_num()?;
                Ok(Self::Exponential {
                    domain,
                    range,
                    c0,
                    c1,
                    n,
                })
            }
            3 => {
                let functions = xref
                    .get(dict, "Functions")
                    .ok_or_else(|| PdfError::KeyError("Functions".into()))?
                    .as_array()?
                    .iter()
                    .map(|f| Self::parse_nested(xref, f, depth + 1))
                    .collect::<Result<Vec<_>>>()?;
                let bounds = required_nums(xref, dict, "Bounds")?;
                let encode = required_nums(xref, dict, "Encode")?;
                if functions.is_empty()
                    || bounds.len() + 1 != functions.len()
                    || encode.len() < functions.len() * 2
                {
                    return Err(PdfError::SyntaxError("malformed stitching function".into()));
                }
                Ok(Self::Stitching {
                    domain,
                    range,
                    functions,
                    bounds,
                    encode,
                })
            }
            4 => {
                let stream = resolved.as_stream()?;
                let data = xref.decode_stream(stream)?.data;
                Ok(Self::PostScript {
                    domain,
                    range,
                    program: PsProgram::compile(&data)?,
                })
            }
            other => Err(PdfError::SyntaxError(format!("unknown function type {other}"))),
        }
    }

    /// Number of outputs, when it is known without evaluating.
    pub fn output_count(&self) -> Option<usize> {
        match self {
            Self::Sampled { range, .. } => Some(range.len() / 2),
            Self::Exponential { c0, .. } => Some(c0.len()),
            Self::Stitching { functions, .. } => functions.first()?.output_count(),
            Self::PostScript { range, .. } => (!range.is_empty()).then_some(range.len() / 2),
            Self::Array(fns) => Some(fns.len()),
        }
    }

    /// Evaluates the function. A failing calculator program is reported
    /// once per call and yields the range minimums.
    pub fn eval(&self, input: &[f64]) -> Vec<f64> {
        match self {
            Self::Array(fns) => fns
                .iter()
                .map(|f| f.eval(input).first().copied().unwrap_or(0.0))
                .collect(),
            Self::Exponential {
                domain,
                range,
                c0,
                c1,
                n,
            } => {
                let x = clip(input.first().copied().unwrap_or(0.0), domain[0], domain[1]);
                let xn = x.powf(*n);
                let mut out: Vec<f64> = c0.iter().zip(c1).map(|(a, b)| a + xn * (b - a)).collect();
                clip_all(&mut out, range);
                out
            }
            Self::Stitching {
                domain,
                range,
                functions,
                bounds,
                encode,
            } => {
                let x = clip(input.first().copied().unwrap_or(0.0), domain[0], domain[1]);
                let i = bounds.iter().position(|&b| x < b).unwrap_or(bounds.len());
                let lo = if i == 0 { domain[0] } else { bounds[i - 1] };
                let hi = if i == bounds.len() { domain[1] } else { bounds[i] };
                let t = interpolate(x, lo, hi, encode[2 * i], encode[2 * i + 1]);
                let mut out = functions[i].eval(&[t]);
                clip_all(&mut out, range);
                out
            }
            Self::PostScript {
                domain,
                range,
                program,
            } => {
                let mut args: Vec<f64> = input.to_vec();
                clip_all(&mut args, domain);
                let outputs = range.len() / 2;
                match program.execute(&args) {
                    Ok(stack) => {
                        let start = stack.len().saturating_sub(outputs);
                        let mut out = if outputs == 0 { stack } else { stack[start..].to_vec() };
                        out.resize(outputs.max(out.len()), 0.0);
                        clip_all(&mut out, range);
                        out
                    }
                    Err(e) => {
                        warn!("PostScript function failed: {e}");
                        range.chunks_exact(2).map(|pair| pair[0]).collect()
                    }
                }
            }
            Self::Sampled { .. } => self.eval_sampled(input),
        }
    }

    /// Multilinear interpolation over the 2^m corners of the sample cell
    /// containing the input.
    fn eval_sampled(&self, input: &[f64]) -> Vec<f64> {
        let Self::Sampled {
            domain,
            range,
            size,
            encode,
            decode,
            samples,
            ..
        } = self
        else {
            return Vec::new();
        };
        let m = size.len();
        let n = range.len() / 2;
        if m > MAX_SAMPLED_INPUTS {
            return range.chunks_exact(2).map(|pair| pair[0]).collect();
        }

        // Position of the input inside the sample grid, per dimension.
        let mut lower = vec![0usize; m];
        let mut frac = vec![0f64; m];
        for j in 0..m {
            let x = clip(input.get(j).copied().unwrap_or(0.0), domain[2 * j], domain[2 * j + 1]);
            let e = interpolate(
                x,
                domain[2 * j],
                domain[2 * j + 1],
                encode.get(2 * j).copied().unwrap_or(0.0),
                encode.get(2 * j + 1).copied().unwrap_or((size[j] - 1) as f64),
            );
            let e = clip(e, 0.0, (size[j] - 1) as f64);
            let base = (e.floor() as usize).min(size[j].saturating_sub(2));
            lower[j] = base;
            frac[j] = if size[j] == 1 { 0.0 } else { e - base as f64 };
        }

        let mut out = vec![0.0; n];
        for corner in 0..(1usize << m) {
            let mut weight = 1.0;
            let mut index = 0;
            let mut stride = 1;
            for j in 0..m {
                let upper = corner >> j & 1 == 1;
                if upper && size[j] == 1 {
                    weight = 0.0;
                    break;
                }
                weight *= if upper { frac[j] } else { 1.0 - frac[j] };
                index += (lower[j] + usize::from(upper)) * stride;
                stride *= size[j];
            }
            if weight == 0.0 {
                continue;
            }
            for (k, slot) in out.iter_mut().enumerate() {
                *slot += weight * samples.get(index * n + k).copied().unwrap_or(0.0);
            }
        }
        for (k, slot) in out.iter_mut().enumerate() {
            let dmin = decode.get(2 * k).copied().unwrap_or(range[2 * k]);
            let dmax = decode.get(2 * k + 1).copied().unwrap_or(range[2 * k + 1]);
            *slot = clip(interpolate(*slot, 0.0, 1.0, dmin, dmax), range[2 * k], range[2 * k + 1]);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::objects::ObjRef;
    use crate::test_utils::xref_with;

    fn approx(a: &[f64], b: &[f64]) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-6)
    }

    #[test]
    fn test_exponential_interpolates_and_clips_domain() {
        let f = PdfFunction::Exponential {
            domain: vec![0.0, 1.0],
            range: vec![],
            c0: vec![0.0, 1.0],
            c1: vec![1.0, 0.0],
            n: 1.0,
        };
        assert!(approx(&f.eval(&[0.25]), &[0.25, 0.75]));
        assert!(approx(&f.eval(&[4.0]), &[1.0, 0.0]));
    }

    #[test]
    fn test_stitching_selects_subfunction() {
        let half = |c0: f64, c1: f64| PdfFunction::Exponential {
            domain: vec![0.0, 1.0],
            range: vec![],
            c0: vec![c0],
            c1: vec![c1],
            n: 1.0,
        };
        let f = PdfFunction::Stitching {
            domain: vec![0.0, 1.0],
            range: vec![],
            functions: vec![half(0.0, 1.0), half(10.0, 20.0)],
            bounds: vec![0.5],
            encode: vec![0.0, 1.0, 0.0, 1.0],
        };
        assert!(approx(&f.eval(&[0.25]), &[0.5]));
        assert!(approx(&f.eval(&[0.75]), &[15.0]));
        assert!(approx(&f.eval(&[1.0]), &[20.0]));
    }

    #[test]
    fn test_sampled_linear_interpolation() {
        // 1-in 1-out, three 8-bit samples: 0, 255, 0.
        let f = PdfFunction::Sampled {
            domain: vec![0.0, 1.0],
            range: vec![0.0, 1.0],
            size: vec![3],
            bits_per_sample: 8,
            encode: vec![0.0, 2.0],
            decode: vec![0.0, 1.0],
            samples: read_samples(&[0, 255, 0], 8, 3).unwrap(),
        };
        assert!(approx(&f.eval(&[0.25]), &[0.5]));
        assert!(approx(&f.eval(&[0.5]), &[1.0]));
        assert!(approx(&f.eval(&[1.0]), &[0.0]));
    }

    #[test]
    fn test_sampled_two_inputs() {
        // 2x2 grid with values 0, 1, 1, 0 (x varies fastest).
        let f = PdfFunction::Sampled {
            domain: vec![0.0, 1.0, 0.0, 1.0],
            range: vec![0.0, 1.0],
            size: vec![2, 2],
            bits_per_sample: 8,
            encode: vec![0.0, 1.0, 0.0, 1.0],
            decode: vec![0.0, 1.0],
            samples: vec![0.0, 1.0, 1.0, 0.0],
        };
        assert!(approx(&f.eval(&[0.5, 0.5]), &[0.5]));
        assert!(approx(&f.eval(&[1.0, 0.0]), &[1.0]));
        assert!(approx(&f.eval(&[1.0, 1.0]), &[0.0]));
    }

    fn parse_stream(dict: &str, data: &str) -> Result<PdfFunction> {
        let body = format!("<< {dict} /Length {} >>\nstream\n{data}\nendstream", data.len());
        let xref = xref_with(&[(2, body.as_str())]);
        PdfFunction::parse(&xref, &PDFObject::Ref(ObjRef::new(2, 0)))
    }

    #[test]
    fn test_sampled_parse_reads_stream() {
        let f = parse_stream(
            "/FunctionType 0 /Domain [0 1] /Range [0 1] /Size [2] /BitsPerSample 8",
            "\u{0}\u{7f}",
        );
        assert!(f.is_ok());
    }

    #[test]
    fn test_sampled_size_overflow_is_rejected() {
        let f = parse_stream(
            "/FunctionType 0 /Domain [0 1 0 1 0 1] /Range [0 1] /Size [4294967296 4294967296 4294967296] /BitsPerSample 8",
            "",
        );
        assert!(matches!(f, Err(PdfError::SyntaxError(_))));
    }

    #[test]
    fn test_sampled_short_stream_is_rejected() {
        let f = parse_stream(
            "/FunctionType 0 /Domain [0 1 0 1] /Range [0 1] /Size [1000 1000] /BitsPerSample 16",
            "ab",
        );
        assert!(matches!(f, Err(PdfError::DecodeError(_))));
    }

    #[test]
    fn test_sampled_input_count_is_bounded() {
        let domain = "0 1 ".repeat(64);
        let size = "1 ".repeat(64);
        let f = parse_stream(
            &format!("/FunctionType 0 /Domain [{domain}] /Range [0 1] /Size [{size}] /BitsPerSample 8"),
            "x",
        );
        assert!(matches!(f, Err(PdfError::SyntaxError(_))));

        let wide = PdfFunction::Sampled {
            domain: [0.0, 1.0].repeat(64),
            range: vec![0.25, 1.0],
            size: vec![1; 64],
            bits_per_sample: 8,
            encode: Vec::new(),
            decode: Vec::new(),
            samples: vec![0.5],
        };
        assert_eq!(wide.eval(&[0.5; 64]), [0.25]);
    }

    #[test]
    fn test_read_samples_sub_byte() {
        assert_eq!(read_samples(&[0b1001_0000], 2, 2).unwrap(), vec![2.0 / 3.0, 1.0 / 3.0]);
        assert!(read_samples(&[0], 16, 1).is_err());
    }

    #[test]
    fn test_postscript_output_clipped_to_range() {
        let f = PdfFunction::PostScript {
            domain: vec![0.0, 1.0],
            range: vec![0.0, 1.0, 0.0, 1.0],
            program: PsProgram::compile(b"{ dup 2 mul }").unwrap(),
        };
        assert!(approx(&f.eval(&[0.75]), &[0.75, 1.0]));
        assert_eq!(f.output_count(), Some(2));
    }

    #[test]
    fn test_postscript_failure_yields_range_minimums() {
        let f = PdfFunction::PostScript {
            domain: vec![0.0, 1.0],
            range: vec![0.2, 1.0],
            program: PsProgram::compile(b"{ pop pop }").unwrap(),
        };
        assert!(approx(&f.eval(&[0.5]), &[0.2]));
    }
}
