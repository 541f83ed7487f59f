//! Page model: inherited attributes, boxes, content and the viewport.

use super::annotation::Annotation;
use super::xref::XRef;
use crate::config::Intent;
use crate::error::Result;
use crate::model::objects::{Dict, ObjRef, PDFObject};
use crate::utils::{Matrix, Rect, intersect_rect, normalize_rect};
use bytes::Bytes;
use tracing::{debug, warn};

/// US Letter, used when no `MediaBox` is found anywhere up the tree.
const LETTER: Rect = (0.0, 0.0, 612.0, 792.0);

/// Attributes a page inherits from its ancestors in the page tree.
#[derive(Debug, Clone, Default)]
pub(crate) struct Inherited {
    resources: Option<PDFObject>,
    media_box: Option<PDFObject>,
    crop_box: Option<PDFObject>,
    rotate: Option<PDFObject>,
}

impl Inherited {
    /// Takes the inheritable entries `node` defines, overriding those of
    /// its ancestors.
    pub(crate) fn absorb(&mut self, node: &Dict) {
        if let Some(v) = node.get("Resources") {
            self.resources = Some(v.clone());
        }
        if let Some(v) = node.get("MediaBox") {
            self.media_box = Some(v.clone());
        }
        if let Some(v) = node.get("CropBox") {
            self.crop_box = Some(v.clone());
        }
        if let Some(v) = node.get("Rotate") {
            self.rotate = Some(v.clone());
        }
    }
}

fn parse_box(xref: &XRef, obj: Option<&PDFObject>) -> Option<Rect> {
    let resolved = xref.resolve(obj?)?;
    let items = resolved.as_array().ok()?;
    if items.len() != 4 {
        return None;
    }
    let nums: Vec<f64> = items
        .iter()
        .filter_map(|n| xref.resolve(n).and_then(|n| n.as_num().ok()))
        .collect();
    match nums.as_slice() {
        &[a, b, c, d] => Some(normalize_rect((a, b, c, d))),
        _ => None,
    }
}

/// One page, with its inherited attributes already applied.
#[derive(Debug, Clone)]
pub struct PDFPage {
    pub index: usize,
    pub objref: ObjRef,
    pub dict: Dict,
    pub resources: Option<Dict>,
    pub media_box: Rect,
    /// `CropBox` clipped to the `MediaBox`.
    pub crop_box: Rect,
    /// Clockwise rotation, one of 0, 90, 180, 270.
    pub rotate: i64,
    pub user_unit: f64,
}

impl PDFPage {
    pub(crate) fn new(xref: &XRef, index: usize, objref: ObjRef, dict: Dict, inherited: &Inherited) -> Self {
        let media_box = parse_box(xref, inherited.media_box.as_ref()).unwrap_or_else(|| {
            warn!(page = index, "page has no usable MediaBox, using Letter");
            LETTER
        });
        let crop_box = match parse_box(xref, inherited.crop_box.as_ref()) {
            Some(crop) => intersect_rect(crop, media_box).unwrap_or_else(|| {
                debug!(page = index, "CropBox outside MediaBox, ignored");
                media_box
            }),
            None => media_box,
        };
        let rotate = inherited
            .rotate
            .as_ref()
            .and_then(|r| xref.resolve(r))
            .and_then(|r| r.as_int().ok())
            .unwrap_or(0);
        let rotate = if rotate % 90 == 0 {
            rotate.rem_euclid(360)
        } else {
            warn!(page = index, rotate, "Rotate is not a multiple of 90, ignored");
            0
        };
        let user_unit = xref
            .get(&dict, "UserUnit")
            .and_then(|u| u.as_num().ok())
            .filter(|u| *u > 0.0)
            .unwrap_or(1.0);
        let resources = inherited
            .resources
            .as_ref()
            .and_then(|r| xref.resolve(r))
            .and_then(|r| r.as_dict().ok().cloned());
        Self {
            index,
            objref,
            dict,
            resources,
            media_box,
            crop_box,
            rotate,
            user_unit,
        }
    }

    /// The visible area of the page in default user space.
    pub const fn view(&self) -> Rect {
        self.crop_box
    }

    /// Viewport at `scale`, with `rotation` added to the page's own.
    pub fn viewport(&self, scale: f64, rotation: i64) -> Viewport {
        Viewport::new(self.view(), scale * self.user_unit, self.rotate + rotation, false)
    }

    /// Decoded content streams in order. A page without `Contents`, or one
    /// whose `Contents` is not a stream or array of streams, has no parts.
    /// Parts that fail to decode are skipped with a warning.
    pub fn content_data(&self, xref: &XRef) -> Vec<Bytes> {
        let Some(contents) = self.dict.get("Contents") else {
            return Vec::new();
        };
        let Some(resolved) = xref.resolve(contents) else {
            warn!(page = self.index, "Contents could not be read");
            return Vec::new();
        };
        let items: Vec<PDFObject> = match &*resolved {
            PDFObject::Array(items) => items.clone(),
            PDFObject::Stream(s) => vec![PDFObject::Stream(s.clone())],
            PDFObject::Null => Vec::new(),
            other => {
                warn!(page = self.index, got = other.type_name(), "Contents is neither a stream nor an array");
                Vec::new()
            }
        };
        let mut parts = Vec::with_capacity(items.len());
        for item in &items {
            let Some(stream) = xref.resolve(item) else { continue };
            let Ok(stream) = stream.as_stream() else {
                debug!(page = self.index, "non-stream entry in Contents skipped");
                continue;
            };
            match xref.decode_stream(stream) {
                Ok(decoded) => parts.push(Bytes::from(decoded.data)),
                Err(err) => warn!(page = self.index, %err, "content stream could not be decoded"),
            }
        }
        parts
    }

    /// References of the page's annotations, in `Annots` order.
    pub fn annotation_refs(&self, xref: &XRef) -> Vec<PDFObject> {
        xref.get(&self.dict, "Annots")
            .and_then(|a| a.as_array().ok().map(<[PDFObject]>::to_vec))
            .unwrap_or_default()
    }

    /// Annotations visible under `intent`.
    pub fn annotations(&self, xref: &XRef, intent: Intent) -> Result<Vec<Annotation>> {
        let mut out = Vec::new();
        for (i, entry) in self.annotation_refs(xref).iter().enumerate() {
            match Annotation::parse(xref, entry, self.index, i) {
                Some(annot) if annot.is_visible(intent) => out.push(annot),
                Some(_) => {}
                None => debug!(page = self.index, index = i, "annotation entry skipped"),
            }
        }
        Ok(out)
    }
}

/// Mapping from page space to a device with the origin at the top left.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub view_box: Rect,
    pub scale: f64,
    pub rotation: i64,
    pub transform: Matrix,
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    /// Builds the viewport of `view_box`. `dont_flip` keeps the y axis
    /// pointing up.
    pub fn new(view_box: Rect, scale: f64, rotation: i64, dont_flip: bool) -> Self {
        let rotation = rotation.rem_euclid(360);
        let center_x = (view_box.2 + view_box.0) / 2.0;
        let center_y = (view_box.3 + view_box.1) / 2.0;
        let (a, b, mut c, mut d) = match rotation {
            90 => (0.0, 1.0, 1.0, 0.0),
            180 => (-1.0, 0.0, 0.0, 1.0),
            270 => (0.0, -1.0, -1.0, 0.0),
            _ => (1.0, 0.0, 0.0, -1.0),
        };
        if dont_flip {
            c = -c;
            d = -d;
        }
        let box_w = (view_box.2 - view_box.0).abs();
        let box_h = (view_box.3 - view_box.1).abs();
        let (offset_x, offset_y, width, height) = if a == 0.0 {
            (
                (center_y - view_box.1).abs() * scale,
                (center_x - view_box.0).abs() * scale,
                box_h * scale,
                box_w * scale,
            )
        } else {
            (
                (center_x - view_box.0).abs() * scale,
                (center_y - view_box.1).abs() * scale,
                box_w * scale,
                box_h * scale,
            )
        };
        let transform = (
            a * scale,
            b * scale,
            c * scale,
            d * scale,
            offset_x - a * scale * center_x - c * scale * center_y,
            offset_y - b * scale * center_x - d * scale * center_y,
        );
        Self {
            view_box,
            scale,
            rotation,
            transform,
            width,
            height,
        }
    }

    /// Maps a page-space point to the viewport.
    pub fn convert_to_viewport_point(&self, x: f64, y: f64) -> (f64, f64) {
        crate::utils::apply_matrix_pt(self.transform, (x, y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::pdf_parser::parse_object;
    use crate::test_utils::xref_with;

    fn dict(s: &'static str) -> Dict {
        parse_object(s).unwrap().as_dict().unwrap().clone()
    }

    #[test]
    fn test_inherited_attributes_and_crop_clipping() {
        let xref = xref_with(&[]);
        let mut inherited = Inherited::default();
        inherited.absorb(&dict("<< /MediaBox [0 0 600 800] /Rotate 90 /Resources << /Font << >> >> >>"));
        let page_dict = dict("<< /Type /Page /CropBox [-10 -10 300 900] /Rotate -90 >>");
        inherited.absorb(&page_dict);
        let page = PDFPage::new(&xref, 0, ObjRef::new(3, 0), page_dict, &inherited);
        assert_eq!(page.media_box, (0.0, 0.0, 600.0, 800.0));
        assert_eq!(page.crop_box, (0.0, 0.0, 300.0, 800.0));
        assert_eq!(page.rotate, 270);
        assert!(page.resources.is_some());
    }

    #[test]
    fn test_missing_media_box_defaults_to_letter() {
        let xref = xref_with(&[]);
        let page = PDFPage::new(&xref, 0, ObjRef::new(3, 0), dict("<< /Type /Page /Rotate 45 >>"), &Inherited::default());
        assert_eq!(page.media_box, LETTER);
        assert_eq!(page.rotate, 0);
    }

    #[test]
    fn test_viewport_flips_and_rotates() {
        let vp = Viewport::new((0.0, 0.0, 200.0, 100.0), 2.0, 0, false);
        assert_eq!((vp.width, vp.height), (400.0, 200.0));
        assert_eq!(vp.convert_to_viewport_point(0.0, 0.0), (0.0, 200.0));

        let vp = Viewport::new((0.0, 0.0, 200.0, 100.0), 1.0, 90, false);
        assert_eq!((vp.width, vp.height), (100.0, 200.0));
        assert_eq!(vp.convert_to_viewport_point(0.0, 0.0), (0.0, 0.0));
        assert_eq!(vp.convert_to_viewport_point(0.0, 100.0), (100.0, 0.0));
    }

    #[test]
    fn test_contents_array_and_missing_contents() {
        let xref = xref_with(&[
            (4, "<< /Length 3 >>\nstream\n1 w\nendstream"),
            (5, "<< /Length 3 >>\nstream\n2 w\nendstream"),
        ]);
        let page = PDFPage::new(
            &xref,
            0,
            ObjRef::new(3, 0),
            dict("<< /Type /Page /Contents [4 0 R 5 0 R] >>"),
            &Inherited::default(),
        );
        let parts = page.content_data(&xref);
        assert_eq!(parts.len(), 2);
        assert_eq!(&parts[1][..], b"2 w");

        let empty = PDFPage::new(&xref, 0, ObjRef::new(3, 0), dict("<< /Type /Page >>"), &Inherited::default());
        assert!(empty.content_data(&xref).is_empty());
    }
}
