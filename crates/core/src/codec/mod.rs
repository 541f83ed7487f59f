//! Stream filters.
//!
//! `apply_filters` runs a filter chain in order. Image-only filters (DCT,
//! JPX, CCITT, JBIG2) are not decoded here: the chain stops in front of
//! them and the caller gets the still-encoded bytes together with the name
//! of the filter left to apply.

pub mod arcfour;
pub mod ascii85;
pub mod flate;
pub mod lzw;
pub mod predictor;
pub mod runlength;

pub use arcfour::{Arcfour, rc4};
pub use ascii85::{ascii85decode, asciihexdecode};
pub use flate::flatedecode;
pub use lzw::lzwdecode;
pub use predictor::{PredictorParams, apply_predictor};
pub use runlength::rldecode;

use crate::error::{PdfError, Result};
use crate::model::objects::{Dict, Name, PDFObject, PDFStream};

/// Expands the abbreviated filter names allowed in inline images.
pub fn canonical_filter(name: &str) -> &str {
    match name {
        "AHx" => "ASCIIHexDecode",
        "A85" => "ASCII85Decode",
        "LZW" => "LZWDecode",
        "Fl" => "FlateDecode",
        "RL" => "RunLengthDecode",
        "CCF" => "CCITTFaxDecode",
        "DCT" => "DCTDecode",
        other => other,
    }
}

/// Filters whose output is an image codec payload rather than bytes.
pub fn is_image_filter(name: &str) -> bool {
    matches!(
        canonical_filter(name),
        "DCTDecode" | "JPXDecode" | "CCITTFaxDecode" | "JBIG2Decode"
    )
}

/// Result of running a filter chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub data: Vec<u8>,
    /// Image filter (and its parameters) the data is still encoded with.
    pub image_filter: Option<(Name, Option<Dict>)>,
}

/// Runs `filters` over `data`. `parms` is aligned with `filters`; missing
/// entries mean default parameters.
pub fn apply_filters(data: &[u8], filters: &[Name], parms: &[Option<Dict>]) -> Result<Decoded> {
    let mut out = data.to_vec();
    for (i, filter) in filters.iter().enumerate() {
        let parm = parms.get(i).and_then(Option::as_ref);
        let name = canonical_filter(filter.as_str());
        if is_image_filter(name) {
            return Ok(Decoded {
                data: out,
                image_filter: Some((Name::new(name), parm.cloned())),
            });
        }
        out = match name {
            "FlateDecode" => with_predictor(flatedecode(&out), parm)?,
            "LZWDecode" => {
                let early = parm
                    .and_then(|p| p.get("EarlyChange"))
                    .and_then(|v| v.as_int().ok())
                    .unwrap_or(1);
                with_predictor(lzwdecode(&out, early), parm)?
            }
            "ASCIIHexDecode" => asciihexdecode(&out)?,
            "ASCII85Decode" => ascii85decode(&out)?,
            "RunLengthDecode" => rldecode(&out),
            "Crypt" => out,
            other => {
                return Err(PdfError::DecodeError(format!("unsupported filter /{other}")));
            }
        };
    }
    Ok(Decoded {
        data: out,
        image_filter: None,
    })
}

fn with_predictor(data: Vec<u8>, parm: Option<&Dict>) -> Result<Vec<u8>> {
    match parm {
        Some(p) => apply_predictor(data, &PredictorParams::from_dict(p)),
        None => Ok(data),
    }
}

/// Decode parameters of `stream` aligned with its filters. Only direct
/// dictionaries are seen here; callers holding an `XRef` resolve first.
pub fn stream_parms(stream: &PDFStream) -> Vec<Option<Dict>> {
    match stream.dict.get_any(&["DecodeParms", "DP"]) {
        Some(PDFObject::Dict(d)) => vec![Some(d.clone())],
        Some(PDFObject::Array(arr)) => arr
            .iter()
            .map(|p| match p {
                PDFObject::Dict(d) => Some(d.clone()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Decodes a stream whose filter entries are all direct objects.
pub fn decode_stream(stream: &PDFStream) -> Result<Decoded> {
    apply_filters(stream.raw(), &stream.filters(), &stream_parms(stream))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_chain_in_order() {
        let mut d = Dict::new();
        d.insert(
            "Filter",
            PDFObject::Array(vec![Name::new("AHx").into(), Name::new("RL").into()]),
        );
        // Hex of the run-length stream [2, 'a', 'b', 'c', 128].
        let s = PDFStream::new(d, Bytes::from_static(b"02616263 80>"));
        let out = decode_stream(&s).unwrap();
        assert_eq!(out.data, b"abc");
        assert!(out.image_filter.is_none());
    }

    #[test]
    fn test_stops_at_image_filter() {
        let out = apply_filters(b"414243>", &[Name::new("ASCIIHexDecode"), Name::new("DCT")], &[]).unwrap();
        assert_eq!(out.data, b"ABC");
        assert_eq!(out.image_filter.map(|(n, _)| n.as_str()), Some("DCTDecode"));
    }

    #[test]
    fn test_unknown_filter() {
        assert!(matches!(
            apply_filters(b"", &[Name::new("Bogus")], &[]),
            Err(PdfError::DecodeError(_))
        ));
    }
}
