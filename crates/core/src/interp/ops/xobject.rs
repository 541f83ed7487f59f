//! XObject, shading and inline image operators.
//!
//! Handles: Do, sh, BI/ID/EI
//!
//! - Do: forms are evaluated in place (as a new frame inheriting the
//!   current state); images are built once per document and cached
//! - sh: fills the clip with a sampled shading
//! - BI/ID/EI: arrives from the content parser as one inline image

use crate::error::{PdfError, Result};
use crate::interp::evaluator::{EvalSink, EvaluatorTask};
use crate::interp::image::{ImageData, ImageOptions, build_image};
use crate::interp::operator_list::{OpArg, OpCode};
use crate::interp::pattern::Shading;
use crate::model::objects::{Dict, Name, ObjRef, PDFStream};
use crate::utils::MATRIX_IDENTITY;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, warn};

#[allow(non_snake_case)]
impl<S: EvalSink> EvaluatorTask<'_, S> {
    /// Do - Paint an XObject.
    pub(crate) fn do_Do(&mut self, name: Name) -> Result<()> {
        let Some(obj) = self.resource("XObject", name) else {
            warn!(%name, "XObject resource not found");
            return Ok(());
        };
        let objref = obj.as_ref().ok();
        let xref = self.ev.xref;
        let resolved = xref.resolve(&obj).ok_or(PdfError::MissingData("XObject"))?;
        let stream = resolved.as_stream()?;
        let subtype = xref.get(&stream.dict, "Subtype").and_then(|s| s.as_name().ok());
        match subtype.as_ref().map(Name::as_str) {
            Some("Form") => self.paint_form(stream, objref),
            Some("Image") => self.paint_image(stream, objref),
            Some("PS") => {
                debug!(%name, "PostScript XObject skipped");
                Ok(())
            }
            other => {
                warn!(%name, subtype = ?other, "unknown XObject subtype");
                Ok(())
            }
        }
    }

    fn paint_form(&mut self, stream: &PDFStream, objref: Option<ObjRef>) -> Result<()> {
        let xref = self.ev.xref;
        let dict = &stream.dict;
        if let Some(oc) = dict.get("OC")
            && self.is_oc_hidden(oc)
        {
            debug!("form in hidden optional content skipped");
            return Ok(());
        }
        if let Some(r) = objref
            && self.form_in_progress(r)
        {
            warn!(form = %r, "recursive form XObject skipped");
            return Ok(());
        }
        if self.form_depth() >= self.ev.options.max_form_depth {
            warn!(depth = self.form_depth(), "form XObjects nested too deeply");
            return Ok(());
        }
        let data = Bytes::from(xref.decode_stream(stream)?.data);
        let matrix = xref
            .get(dict, "Matrix")
            .and_then(|m| m.as_matrix().ok())
            .unwrap_or(MATRIX_IDENTITY);
        let bbox = xref.get(dict, "BBox").and_then(|b| b.as_rect().ok());
        let group = xref
            .get_dict(dict, "Group")
            .filter(|g| g.get_name("S").is_some_and(|s| s == "Transparency"));

        if let Some(group) = &group {
            let flag = |key: &str| xref.get(group, key).is_some_and(|v| v.as_bool().unwrap_or(false));
            let mut entries = vec![
                (Name::new("Isolated"), OpArg::Bool(flag("I"))),
                (Name::new("Knockout"), OpArg::Bool(flag("K"))),
                (Name::new("Matrix"), OpArg::matrix(matrix)),
            ];
            if let Some(bbox) = bbox {
                entries.push((Name::new("BBox"), OpArg::rect(bbox)));
            }
            self.emit(OpCode::BeginGroup, vec![OpArg::Entries(entries)]);
        }

        self.state.save();
        self.state.transform(matrix);
        self.emit(
            OpCode::PaintFormXObjectBegin,
            vec![OpArg::matrix(matrix), bbox.map_or(OpArg::Nums(vec![]), OpArg::rect)],
        );
        let resources = xref.get_dict(dict, "Resources").map(Arc::new).or_else(|| self.resources());
        self.push_form(data, resources, group.is_some(), objref);
        Ok(())
    }

    fn paint_image(&mut self, stream: &PDFStream, objref: Option<ObjRef>) -> Result<()> {
        if !self.sink.wants_paint() {
            return Ok(());
        }
        let cached = objref.and_then(|r| self.ev.cache.image(r));
        let image = match cached {
            Some(image) => image,
            None => {
                let id = match objref {
                    Some(r) => format!("img_{}_{}", r.num, r.generation),
                    None => {
                        self.inline_images += 1;
                        format!("img_direct_{}", self.inline_images)
                    }
                };
                let options = ImageOptions {
                    decode: self.ev.options.decode_images,
                    is_smask: false,
                };
                let resources = self.resources();
                let image = Arc::new(build_image(self.ev.xref, stream, resources.as_deref(), id, options)?);
                if let Some(r) = objref {
                    self.ev.cache.insert_image(r, image.clone());
                }
                image
            }
        };
        self.sink.add_dependency(&image.id);
        self.emit_image(image, OpCode::PaintImageXObject);
        Ok(())
    }

    /// An inline image (`BI ... ID ... EI`).
    pub(crate) fn do_inline_image(&mut self, dict: Dict, data: Bytes) -> Result<()> {
        if !self.sink.wants_paint() {
            return Ok(());
        }
        let id = format!("inline_{}", self.inline_images);
        self.inline_images += 1;
        let stream = PDFStream::new(dict, data);
        let options = ImageOptions {
            decode: self.ev.options.decode_images,
            is_smask: false,
        };
        let resources = self.resources();
        let image = build_image(self.ev.xref, &stream, resources.as_deref(), id, options)?;
        self.emit_image(Arc::new(image), OpCode::PaintInlineImageXObject);
        Ok(())
    }

    /// Stencil masks are painted with the current fill color.
    fn emit_image(&mut self, image: Arc<ImageData>, op: OpCode) {
        if image.is_mask() {
            let gs = &self.state.state;
            let rgb = gs.fill_color_space.get_rgb(&gs.fill_color);
            self.emit(OpCode::PaintImageMaskXObject, vec![OpArg::Image(image), OpArg::Rgb(rgb)]);
        } else {
            self.emit(op, vec![OpArg::Image(image)]);
        }
    }

    /// sh - Paint a shading over the current clip.
    pub(crate) fn do_sh(&mut self, name: Name) -> Result<()> {
        if !self.sink.wants_paint() {
            return Ok(());
        }
        let Some(obj) = self.resource("Shading", name) else {
            warn!(%name, "shading resource not found");
            return Ok(());
        };
        let resources = self.resources();
        if let Some(shading) = Shading::parse(self.ev.xref, &obj, resources.as_deref())? {
            self.emit(OpCode::ShadingFill, vec![OpArg::Shading(Arc::new(shading))]);
        }
        Ok(())
    }
}
