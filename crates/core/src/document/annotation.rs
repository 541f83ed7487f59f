//! Annotation projection.
//!
//! Each entry of a page's `Annots` becomes a plain `Annotation` record:
//! the fields every annotation has, plus a per-subtype payload. Form
//! field attributes of widgets are read through the `Parent` chain.

use super::xref::XRef;
use crate::color::ColorSpace;
use crate::config::Intent;
use crate::model::objects::{Dict, Name, ObjRef, PDFObject};
use crate::utils::{Point, Rect, decode_text, normalize_rect};
use itertools::Itertools;
use rustc_hash::FxHashSet;
use tracing::debug;

/// Annotation flags (PDF 32000 12.5.3).
pub mod flags {
    pub const INVISIBLE: u32 = 1;
    pub const HIDDEN: u32 = 1 << 1;
    pub const PRINT: u32 = 1 << 2;
    pub const NO_VIEW: u32 = 1 << 5;
}

/// Field flags used by widgets.
mod field_flags {
    pub const READ_ONLY: u32 = 1;
    pub const REQUIRED: u32 = 1 << 1;
    pub const MULTILINE: u32 = 1 << 12;
    pub const PASSWORD: u32 = 1 << 13;
    pub const RADIO: u32 = 1 << 15;
    pub const PUSH_BUTTON: u32 = 1 << 16;
    pub const COMBO: u32 = 1 << 17;
}

const MAX_PARENT_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum AnnotationType {
    Link,
    Text,
    Widget,
    Popup,
    FreeText,
    Line,
    Square,
    Circle,
    Polygon,
    PolyLine,
    Ink,
    Highlight,
    Underline,
    Squiggly,
    StrikeOut,
    Stamp,
    FileAttachment,
    Other,
}

impl AnnotationType {
    pub fn from_subtype(subtype: &str) -> Self {
        match subtype {
            "Link" => Self::Link,
            "Text" => Self::Text,
            "Widget" => Self::Widget,
            "Popup" => Self::Popup,
            "FreeText" => Self::FreeText,
            "Line" => Self::Line,
            "Square" => Self::Square,
            "Circle" => Self::Circle,
            "Polygon" => Self::Polygon,
            "PolyLine" => Self::PolyLine,
            "Ink" => Self::Ink,
            "Highlight" => Self::Highlight,
            "Underline" => Self::Underline,
            "Squiggly" => Self::Squiggly,
            "StrikeOut" => Self::StrikeOut,
            "Stamp" => Self::Stamp,
            "FileAttachment" => Self::FileAttachment,
            _ => Self::Other,
        }
    }
}

/// Value of a form field, as read from `V` or set through
/// `AnnotationStorage`.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    /// A button state name such as `Yes` or `Off`.
    Name(String),
    Choice(Vec<String>),
    Bool(bool),
}

impl FieldValue {
    pub(crate) fn parse(xref: &XRef, obj: &PDFObject) -> Option<Self> {
        let obj = xref.resolve(obj)?;
        match &*obj {
            PDFObject::String(s) => Some(Self::Text(decode_text(s))),
            PDFObject::Name(n) => Some(Self::Name(n.as_str().to_string())),
            PDFObject::Array(items) => Some(Self::Choice(
                items
                    .iter()
                    .filter_map(|i| xref.resolve(i).and_then(|s| s.as_string().ok().map(decode_text)))
                    .collect(),
            )),
            PDFObject::Stream(s) => xref
                .decode_stream(s)
                .ok()
                .map(|d| Self::Text(String::from_utf8_lossy(&d.data).into_owned())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetData {
    /// `Tx`, `Btn`, `Ch` or `Sig`.
    pub field_type: Option<String>,
    /// Fully qualified name, partial names joined with `.`.
    pub field_name: String,
    pub field_value: Option<FieldValue>,
    pub default_value: Option<FieldValue>,
    pub field_flags: u32,
    pub read_only: bool,
    pub required: bool,
    pub multiline: bool,
    pub password: bool,
    pub checkbox: bool,
    pub radio_button: bool,
    pub push_button: bool,
    pub combo: bool,
    /// Display values of a choice field's `Opt`.
    pub options: Vec<String>,
    /// The "on" appearance state of a check box or radio button.
    pub export_value: Option<String>,
    pub default_appearance: Option<String>,
}

/// Subtype-specific part of an annotation.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AnnotationData {
    Link {
        url: Option<String>,
        dest: Option<PDFObject>,
        action: Option<String>,
    },
    Text {
        icon: String,
        open: bool,
    },
    Widget(WidgetData),
    Popup {
        parent_id: Option<String>,
        open: bool,
    },
    FreeText {
        default_appearance: Option<String>,
    },
    Line {
        coordinates: [f64; 4],
    },
    Shape {
        interior_color: Option<[u8; 3]>,
    },
    Poly {
        vertices: Vec<Point>,
    },
    Ink {
        ink_lists: Vec<Vec<Point>>,
    },
    TextMarkup {
        quad_points: Vec<f64>,
    },
    Stamp {
        icon: String,
    },
    FileAttachment {
        file_name: Option<String>,
    },
    Other,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    /// Object reference key (`"12R0"`), or a page-local key for direct
    /// annotation dictionaries.
    pub id: String,
    pub annotation_type: AnnotationType,
    pub subtype: String,
    pub rect: Rect,
    pub annotation_flags: u32,
    pub contents: Option<String>,
    pub title: Option<String>,
    pub modification_date: Option<String>,
    pub color: Option<[u8; 3]>,
    pub border_width: f64,
    pub has_appearance: bool,
    pub data: AnnotationData,
}

fn text(xref: &XRef, dict: &Dict, key: &str) -> Option<String> {
    xref.get(dict, key)?.as_string().ok().map(decode_text)
}

fn nums(xref: &XRef, dict: &Dict, key: &str) -> Vec<f64> {
    xref.get(dict, key)
        .and_then(|a| a.as_array().ok().map(|items| items.iter().filter_map(|n| n.as_num().ok()).collect()))
        .unwrap_or_default()
}

fn points(values: &[f64]) -> Vec<Point> {
    values.chunks_exact(2).map(|p| (p[0], p[1])).collect()
}

/// `C`/`IC` arrays: empty is transparent, 1, 3 or 4 components pick the
/// device space.
fn color(xref: &XRef, dict: &Dict, key: &str) -> Option<[u8; 3]> {
    let comps = nums(xref, dict, key);
    let cs = match comps.len() {
        1 => ColorSpace::DeviceGray,
        3 => ColorSpace::DeviceRGB,
        4 => ColorSpace::DeviceCMYK,
        _ => return None,
    };
    Some(cs.get_rgb(&comps))
}

fn border_width(xref: &XRef, dict: &Dict) -> f64 {
    if let Some(bs) = xref.get_dict(dict, "BS") {
        return xref.get(&bs, "W").and_then(|w| w.as_num().ok()).unwrap_or(1.0);
    }
    nums(xref, dict, "Border").get(2).copied().unwrap_or(1.0)
}

/// An inheritable field attribute, looked up through `Parent`.
fn inherited(xref: &XRef, dict: &Dict, key: &str) -> Option<PDFObject> {
    let mut node = dict.clone();
    let mut seen = FxHashSet::default();
    for _ in 0..MAX_PARENT_DEPTH {
        if let Some(value) = xref.get(&node, key) {
            return Some(value.into_owned());
        }
        let parent = node.get("Parent")?;
        if let PDFObject::Ref(r) = parent
            && !seen.insert(*r)
        {
            return None;
        }
        let next = xref.resolve(parent)?.as_dict().ok()?.clone();
        node = next;
    }
    None
}

/// Partial names from the root field down, joined with `.`.
pub(crate) fn full_field_name(xref: &XRef, dict: &Dict) -> String {
    let mut parts = Vec::new();
    let mut node = dict.clone();
    let mut seen = FxHashSet::default();
    for _ in 0..MAX_PARENT_DEPTH {
        if let Some(t) = text(xref, &node, "T") {
            parts.push(t);
        }
        let Some(parent) = node.get("Parent") else { break };
        if let PDFObject::Ref(r) = parent
            && !seen.insert(*r)
        {
            break;
        }
        let Some(next) = xref.resolve(parent).and_then(|p| p.as_dict().ok().cloned()) else {
            break;
        };
        node = next;
    }
    parts.iter().rev().join(".")
}

/// First appearance state of `AP/N` other than `Off`.
fn on_state(xref: &XRef, dict: &Dict) -> Option<String> {
    let ap = xref.get_dict(dict, "AP")?;
    let normal = xref.get_dict(&ap, "N")?;
    normal.keys().find(|k| *k != "Off").map(|k| k.as_str().to_string())
}

pub(crate) fn widget_data(xref: &XRef, dict: &Dict) -> WidgetData {
    let field_type = inherited(xref, dict, "FT")
        .and_then(|t| t.as_name().ok())
        .map(|t| t.as_str().to_string());
    let field_flags = inherited(xref, dict, "Ff")
        .and_then(|f| f.as_int().ok())
        .map_or(0, |f| f as u32);
    let is_button = field_type.as_deref() == Some("Btn");
    let radio_button = is_button && field_flags & field_flags::RADIO != 0;
    let push_button = is_button && field_flags & field_flags::PUSH_BUTTON != 0;
    let checkbox = is_button && !radio_button && !push_button;
    let options = inherited(xref, dict, "Opt")
        .and_then(|o| o.as_array().ok().map(<[PDFObject]>::to_vec))
        .unwrap_or_default()
        .iter()
        .filter_map(|opt| {
            let opt = xref.resolve(opt)?;
            match &*opt {
                PDFObject::String(s) => Some(decode_text(s)),
                PDFObject::Array(pair) => pair
                    .get(1)
                    .and_then(|d| xref.resolve(d))
                    .and_then(|d| d.as_string().ok().map(decode_text)),
                _ => None,
            }
        })
        .collect();
    WidgetData {
        field_name: full_field_name(xref, dict),
        field_value: inherited(xref, dict, "V").and_then(|v| FieldValue::parse(xref, &v)),
        default_value: inherited(xref, dict, "DV").and_then(|v| FieldValue::parse(xref, &v)),
        read_only: field_flags & field_flags::READ_ONLY != 0,
        required: field_flags & field_flags::REQUIRED != 0,
        multiline: field_flags & field_flags::MULTILINE != 0,
        password: field_flags & field_flags::PASSWORD != 0,
        combo: field_flags & field_flags::COMBO != 0,
        checkbox,
        radio_button,
        push_button,
        options,
        export_value: (checkbox || radio_button).then(|| on_state(xref, dict)).flatten(),
        default_appearance: inherited(xref, dict, "DA").and_then(|d| d.as_string().ok().map(decode_text)),
        field_type,
        field_flags,
    }
}

fn link_data(xref: &XRef, dict: &Dict) -> AnnotationData {
    let mut url = None;
    let mut dest = dict.get("Dest").and_then(|d| xref.resolve(d)).map(|d| d.into_owned());
    let mut action = None;
    if let Some(a) = xref.get_dict(dict, "A") {
        let kind = a.get_name("S");
        match kind.as_ref().map(Name::as_str) {
            Some("URI") => {
                url = xref
                    .get(&a, "URI")
                    .and_then(|u| u.as_string().ok().map(|s| String::from_utf8_lossy(s).into_owned()));
            }
            Some("GoTo") => dest = xref.get(&a, "D").map(|d| d.into_owned()),
            Some("Named") => action = a.get_name("N").map(|n| n.as_str().to_string()),
            Some(other) => {
                debug!(action = other, "link action kept by name only");
                action = Some(other.to_string());
            }
            None => {}
        }
    }
    AnnotationData::Link { url, dest, action }
}

impl Annotation {
    /// Projects the `index`-th `Annots` entry of page `page_index`.
    /// Entries that are not annotation dictionaries yield `None`.
    pub fn parse(xref: &XRef, entry: &PDFObject, page_index: usize, index: usize) -> Option<Self> {
        let id = match entry {
            PDFObject::Ref(r) => r.to_string(),
            _ => format!("p{page_index}_annot{index}"),
        };
        let resolved = xref.resolve(entry)?;
        let dict = resolved.as_dict().ok()?;
        let subtype = dict.get_name("Subtype")?.as_str().to_string();
        let annotation_type = AnnotationType::from_subtype(&subtype);
        let rect = xref
            .get(dict, "Rect")
            .and_then(|r| r.as_rect().ok())
            .map_or((0.0, 0.0, 0.0, 0.0), normalize_rect);

        let data = match annotation_type {
            AnnotationType::Link => link_data(xref, dict),
            AnnotationType::Text => AnnotationData::Text {
                icon: dict.get_name("Name").map_or("Note", |n| n.as_str()).to_string(),
                open: xref.get(dict, "Open").is_some_and(|o| o.as_bool().unwrap_or(false)),
            },
            AnnotationType::Widget => AnnotationData::Widget(widget_data(xref, dict)),
            AnnotationType::Popup => AnnotationData::Popup {
                parent_id: dict.get("Parent").and_then(|p| p.as_ref().ok()).map(|r: ObjRef| r.to_string()),
                open: xref.get(dict, "Open").is_some_and(|o| o.as_bool().unwrap_or(false)),
            },
            AnnotationType::FreeText => AnnotationData::FreeText {
                default_appearance: text(xref, dict, "DA"),
            },
            AnnotationType::Line => {
                let l = nums(xref, dict, "L");
                AnnotationData::Line {
                    coordinates: match l.as_slice() {
                        &[a, b, c, d] => [a, b, c, d],
                        _ => [0.0; 4],
                    },
                }
            }
            AnnotationType::Square | AnnotationType::Circle => AnnotationData::Shape {
                interior_color: color(xref, dict, "IC"),
            },
            AnnotationType::Polygon | AnnotationType::PolyLine => AnnotationData::Poly {
                vertices: points(&nums(xref, dict, "Vertices")),
            },
            AnnotationType::Ink => AnnotationData::Ink {
                ink_lists: xref
                    .get(dict, "InkList")
                    .and_then(|l| {
                        l.as_array().ok().map(|lists| {
                            lists
                                .iter()
                                .filter_map(|path| xref.resolve(path).and_then(|p| p.as_num_array().ok()))
                                .map(|p| points(&p))
                                .collect()
                        })
                    })
                    .unwrap_or_default(),
            },
            AnnotationType::Highlight
            | AnnotationType::Underline
            | AnnotationType::Squiggly
            | AnnotationType::StrikeOut => AnnotationData::TextMarkup {
                quad_points: nums(xref, dict, "QuadPoints"),
            },
            AnnotationType::Stamp => AnnotationData::Stamp {
                icon: dict.get_name("Name").map_or("Draft", |n| n.as_str()).to_string(),
            },
            AnnotationType::FileAttachment => AnnotationData::FileAttachment {
                file_name: xref.get_dict(dict, "FS").and_then(|fs| {
                    text(xref, &fs, "UF").or_else(|| text(xref, &fs, "F"))
                }),
            },
            AnnotationType::Other => AnnotationData::Other,
        };

        Some(Self {
            id,
            annotation_type,
            rect,
            annotation_flags: xref
                .get(dict, "F")
                .and_then(|f| f.as_int().ok())
                .map_or(0, |f| f as u32),
            contents: text(xref, dict, "Contents"),
            title: text(xref, dict, "T").filter(|_| annotation_type != AnnotationType::Widget),
            modification_date: text(xref, dict, "M"),
            color: color(xref, dict, "C"),
            border_width: border_width(xref, dict),
            has_appearance: xref.get_dict(dict, "AP").is_some_and(|ap| ap.contains("N")),
            subtype,
            data,
        })
    }

    /// Whether the annotation is shown for `intent`.
    pub const fn is_visible(&self, intent: Intent) -> bool {
        let f = self.annotation_flags;
        if f & flags::HIDDEN != 0 {
            return false;
        }
        match intent {
            Intent::Print => f & flags::PRINT != 0,
            Intent::Display | Intent::Oc => f & flags::NO_VIEW == 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::xref_with;

    fn parse(objects: &[(u32, &str)], num: u32) -> Annotation {
        let xref = xref_with(objects);
        Annotation::parse(&xref, &PDFObject::Ref(ObjRef::new(num, 0)), 0, 0).unwrap()
    }

    #[test]
    fn test_link_with_uri() {
        let annot = parse(
            &[(2, "<< /Type /Annot /Subtype /Link /Rect [10 20 0 0] /A << /S /URI /URI (https://example.org) >> /F 4 >>")],
            2,
        );
        assert_eq!(annot.id, "2R0");
        assert_eq!(annot.rect, (0.0, 0.0, 10.0, 20.0));
        assert_eq!(
            annot.data,
            AnnotationData::Link {
                url: Some("https://example.org".into()),
                dest: None,
                action: None,
            }
        );
        assert!(annot.is_visible(Intent::Print));
        assert!(annot.is_visible(Intent::Display));
    }

    #[test]
    fn test_widget_inherits_from_parent() {
        let annot = parse(
            &[
                (2, "<< /FT /Tx /T (address) /Ff 4097 /V (Main St) >>"),
                (3, "<< /Subtype /Widget /Parent 2 0 R /T (street) /Rect [0 0 1 1] >>"),
            ],
            3,
        );
        let AnnotationData::Widget(w) = &annot.data else {
            panic!("expected a widget");
        };
        assert_eq!(w.field_name, "address.street");
        assert_eq!(w.field_type.as_deref(), Some("Tx"));
        assert_eq!(w.field_value, Some(FieldValue::Text("Main St".into())));
        assert!(w.read_only && w.multiline);
        assert_eq!(annot.title, None);
    }

    #[test]
    fn test_checkbox_export_value() {
        let annot = parse(
            &[
                (2, "<< /Length 0 >>\nstream\n\nendstream"),
                (3, "<< /Subtype /Widget /FT /Btn /T (agree) /V /Off /AP << /N << /Off 2 0 R /Yes 2 0 R >> >> >>"),
            ],
            3,
        );
        let AnnotationData::Widget(w) = &annot.data else {
            panic!("expected a widget");
        };
        assert!(w.checkbox);
        assert_eq!(w.export_value.as_deref(), Some("Yes"));
        assert_eq!(w.field_value, Some(FieldValue::Name("Off".into())));
    }

    #[test]
    fn test_hidden_and_noview_flags() {
        let hidden = parse(&[(2, "<< /Subtype /Square /F 2 /C [1 0 0] >>")], 2);
        assert!(!hidden.is_visible(Intent::Display));
        assert_eq!(hidden.color, Some([255, 0, 0]));
        let no_view = parse(&[(2, "<< /Subtype /Ink /F 36 /InkList [[0 0 1 1]] >>")], 2);
        assert!(!no_view.is_visible(Intent::Display));
        assert!(no_view.is_visible(Intent::Print));
        assert_eq!(
            no_view.data,
            AnnotationData::Ink {
                ink_lists: vec![vec![(0.0, 0.0), (1.0, 1.0)]]
            }
        );
    }
}
