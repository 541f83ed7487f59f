//! Image XObjects and inline images as paint-ready data.

use crate::color::ColorSpace;
use crate::document::xref::XRef;
use crate::error::{PdfError, Result};
use crate::model::objects::{Dict, Name, PDFObject, PDFStream};
use bytes::Bytes;
use tracing::{debug, warn};

/// Largest accepted pixel count.
const MAX_PIXELS: u64 = 1 << 28;

/// Layout of `ImageData::data`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ImageKind {
    /// Three bytes per pixel.
    Rgb,
    /// One byte of coverage per pixel (soft masks).
    Alpha,
    /// One bit per pixel, rows padded to bytes; set bits are painted.
    Mask,
    /// Still encoded with `filter`.
    Encoded,
    /// Undecoded stream bytes (decoding disabled).
    Raw,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ImageData {
    pub id: String,
    pub width: u32,
    pub height: u32,
    pub bits_per_component: u32,
    pub color_space: Option<&'static str>,
    pub kind: ImageKind,
    pub interpolate: bool,
    /// Image codec left for the consumer (`DCTDecode`, `JPXDecode`, ...).
    pub filter: Option<Name>,
    #[serde(skip)]
    pub data: Bytes,
    pub smask: Option<Box<ImageData>>,
    /// Set on soft masks: alpha is absolute, not relative to group alpha.
    pub smask_absolute: bool,
}

impl ImageData {
    pub fn is_mask(&self) -> bool {
        self.kind == ImageKind::Mask
    }
}

/// How an image is being built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageOptions {
    pub decode: bool,
    pub is_smask: bool,
}

fn dimension(xref: &XRef, dict: &Dict, keys: [&str; 2]) -> Result<u32> {
    let value = keys
        .iter()
        .find_map(|k| xref.get(dict, k))
        .and_then(|v| v.as_int().ok())
        .ok_or_else(|| PdfError::KeyError(keys[0].into()))?;
    u32::try_from(value)
        .ok()
        .filter(|&v| v > 0)
        .ok_or_else(|| PdfError::SyntaxError(format!("invalid image {}: {value}", keys[0])))
}

/// Builds the paint data of an image stream.
///
/// Named color spaces resolve through `resources`. Soft masks (`SMask`) are
/// built recursively as alpha images with `smask_absolute` set; stencil
/// `Mask` streams are built as masks.
pub fn build_image(
    xref: &XRef,
    stream: &PDFStream,
    resources: Option<&Dict>,
    id: String,
    options: ImageOptions,
) -> Result<ImageData> {
    let dict = &stream.dict;
    let width = dimension(xref, dict, ["Width", "W"])?;
    let height = dimension(xref, dict, ["Height", "H"])?;
    if u64::from(width) * u64::from(height) > MAX_PIXELS {
        return Err(PdfError::SyntaxError(format!("image too large: {width}x{height}")));
    }
    let is_mask = xref
        .get(dict, "ImageMask")
        .is_some_and(|v| v.as_bool().unwrap_or(false));
    let bits = xref
        .get(dict, "BitsPerComponent")
        .and_then(|v| v.as_int().ok())
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(if is_mask { 1 } else { 8 });
    let interpolate = xref
        .get(dict, "Interpolate")
        .is_some_and(|v| v.as_bool().unwrap_or(false));
    let decode = xref.get(dict, "Decode").and_then(|d| d.as_num_array().ok());

    let color_space = if is_mask {
        None
    } else if options.is_smask {
        Some(ColorSpace::DeviceGray)
    } else {
        match dict.get("ColorSpace") {
            Some(obj) => match ColorSpace::parse(obj, xref, resources) {
                Ok(cs) => Some(cs),
                Err(err) => {
                    warn!(%id, %err, "image color space unusable, using DeviceGray");
                    Some(ColorSpace::DeviceGray)
                }
            },
            None => None,
        }
    };

    let mut image = ImageData {
        id,
        width,
        height,
        bits_per_component: bits,
        color_space: color_space.as_ref().map(ColorSpace::name),
        kind: ImageKind::Raw,
        interpolate,
        filter: None,
        data: stream.raw_bytes(),
        smask: None,
        smask_absolute: options.is_smask,
    };

    if options.decode {
        let decoded = xref.decode_stream(stream)?;
        if let Some((filter, _)) = decoded.image_filter {
            image.kind = ImageKind::Encoded;
            image.filter = Some(filter);
            image.data = Bytes::from(decoded.data);
        } else if is_mask {
            // Decode [1 0] paints the zero bits instead.
            let inverted = decode.as_deref().is_some_and(|d| d.first() == Some(&1.0));
            let mut bits = decoded.data;
            if !inverted {
                bits.iter_mut().for_each(|b| *b = !*b);
            }
            image.kind = ImageKind::Mask;
            image.data = Bytes::from(bits);
        } else {
            let cs = color_space.unwrap_or_else(|| {
                warn!(id = %image.id, "image without a color space, using DeviceGray");
                ColorSpace::DeviceGray
            });
            let rgb = cs.get_rgb_buffer(&decoded.data, bits, width as usize, decode.as_deref());
            if options.is_smask {
                image.kind = ImageKind::Alpha;
                image.data = rgb.chunks_exact(3).map(|px| px[0]).collect();
            } else {
                image.kind = ImageKind::Rgb;
                image.data = Bytes::from(rgb);
            }
        }
    }

    if !options.is_smask {
        let mask = match (xref.get(dict, "SMask"), xref.get(dict, "Mask")) {
            (Some(smask), _) if smask.as_stream().is_ok() => Some((smask.into_owned(), true)),
            (_, Some(mask)) if mask.as_stream().is_ok() => Some((mask.into_owned(), false)),
            (_, Some(mask)) if mask.as_array().is_ok() => {
                debug!(id = %image.id, "color key masking is not applied");
                None
            }
            _ => None,
        };
        if let Some((PDFObject::Stream(mask), soft)) = mask {
            let mask_id = format!("{}_mask", image.id);
            let mask_options = ImageOptions {
                decode: options.decode,
                is_smask: soft,
            };
            match build_image(xref, &mask, resources, mask_id, mask_options) {
                Ok(mut built) => {
                    built.smask_absolute = true;
                    image.smask = Some(Box::new(built));
                }
                Err(err) => warn!(id = %image.id, %err, "unusable image mask"),
            }
        }
    }
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::objects::ObjRef;
    use crate::test_utils::xref_with;

    const DECODE: ImageOptions = ImageOptions {
        decode: true,
        is_smask: false,
    };

    fn stream(xref: &XRef, num: u32) -> PDFStream {
        xref.fetch(ObjRef::new(num, 0))
            .unwrap()
            .as_stream()
            .unwrap()
            .clone()
    }

    #[test]
    fn test_rgb_image_with_soft_mask() {
        let xref = xref_with(&[
            (
                2,
                "<< /Type /XObject /Subtype /Image /Width 2 /Height 1 /ColorSpace /DeviceGray /BitsPerComponent 8 /SMask 3 0 R /Filter /AHx /Length 5 >>\nstream\n00ff>\nendstream",
            ),
            (3, "<< /Width 2 /Height 1 /ColorSpace /DeviceGray /BitsPerComponent 8 /Filter /AHx /Length 5 >>\nstream\n8040>\nendstream"),
        ]);
        let image = build_image(&xref, &stream(&xref, 2), None, "img_2_0".into(), DECODE).unwrap();
        assert_eq!(image.kind, ImageKind::Rgb);
        assert_eq!(&image.data[..], &[0, 0, 0, 255, 255, 255]);
        let smask = image.smask.unwrap();
        assert_eq!(smask.kind, ImageKind::Alpha);
        assert!(smask.smask_absolute);
        assert_eq!(&smask.data[..], &[0x80, 0x40]);
    }

    #[test]
    fn test_stencil_mask_bits() {
        let xref = xref_with(&[(
            2,
            "<< /Subtype /Image /Width 8 /Height 1 /ImageMask true /Filter /AHx /Length 3 >>\nstream\n0f>\nendstream",
        )]);
        let image = build_image(&xref, &stream(&xref, 2), None, "m".into(), DECODE).unwrap();
        assert!(image.is_mask());
        assert_eq!(&image.data[..], &[0xF0]);
        assert_eq!(image.color_space, None);
    }

    #[test]
    fn test_jpeg_stays_encoded() {
        let xref = xref_with(&[(
            2,
            "<< /Subtype /Image /Width 1 /Height 1 /ColorSpace /DeviceRGB /BitsPerComponent 8 /Filter [/AHx /DCT] /Length 9 >>\nstream\nffd8ffd9>\nendstream",
        )]);
        let image = build_image(&xref, &stream(&xref, 2), None, "j".into(), DECODE).unwrap();
        assert_eq!(image.kind, ImageKind::Encoded);
        assert_eq!(image.filter.map(|f| f.as_str()), Some("DCTDecode"));
        assert_eq!(image.data.len(), 4);
    }

    #[test]
    fn test_missing_width_is_an_error() {
        let xref = xref_with(&[(2, "<< /Subtype /Image /Height 1 /Length 0 >>\nstream\n\nendstream")]);
        assert!(build_image(&xref, &stream(&xref, 2), None, "x".into(), DECODE).is_err());
    }
}
