//! Marked content operators.
//!
//! Handles: BMC, BDC, EMC, MP, DP
//!
//! `BDC /OC` sections whose optional content is hidden suppress everything
//! they contain when the evaluator was given a set of hidden groups.

use crate::interp::evaluator::{EvalSink, EvaluatorTask};
use crate::interp::operator_list::{OpArg, OpCode};
use crate::model::objects::{Dict, Name, ObjRef, PDFObject};
use tracing::debug;

#[allow(non_snake_case)]
impl<S: EvalSink> EvaluatorTask<'_, S> {
    /// BMC - Begin a marked-content sequence.
    pub(crate) fn do_BMC(&mut self, tag: Name) {
        if !self.is_hidden() {
            self.sink.begin_marked_content(tag, None);
        }
        self.emit(OpCode::BeginMarkedContent, vec![OpArg::Name(tag)]);
        self.marked.push(false);
    }

    /// BDC - Begin a marked-content sequence with a property list, given
    /// inline or as a name in the `Properties` resources.
    pub(crate) fn do_BDC(&mut self, tag: Name, props: PDFObject) {
        let (dict, source) = self.property_list(props);
        let hides = tag == "OC" && source.as_ref().is_some_and(|oc| self.is_oc_hidden(oc));
        self.marked.push(hides);
        if hides {
            // The section and its boundaries are dropped together.
            self.hidden_depth += 1;
            return;
        }
        if !self.is_hidden() {
            self.sink.begin_marked_content(tag, dict.as_ref());
        }
        let arg = dict.map_or(OpArg::Bool(false), OpArg::Dict);
        self.emit(OpCode::BeginMarkedContentProps, vec![OpArg::Name(tag), arg]);
    }

    /// EMC - End a marked-content sequence. An unmatched `EMC` is ignored.
    pub(crate) fn do_EMC(&mut self) {
        let Some(hides) = self.marked.pop() else {
            debug!("EMC without BMC/BDC, ignored");
            return;
        };
        if hides {
            self.hidden_depth -= 1;
            return;
        }
        if !self.is_hidden() {
            self.sink.end_marked_content();
        }
        self.emit(OpCode::EndMarkedContent, vec![]);
    }

    /// MP - Marked-content point.
    pub(crate) fn do_MP(&mut self, tag: Name) {
        self.emit(OpCode::MarkPoint, vec![OpArg::Name(tag)]);
    }

    /// DP - Marked-content point with a property list.
    pub(crate) fn do_DP(&mut self, tag: Name, props: PDFObject) {
        let (dict, _) = self.property_list(props);
        let arg = dict.map_or(OpArg::Bool(false), OpArg::Dict);
        self.emit(OpCode::MarkPointProps, vec![OpArg::Name(tag), arg]);
    }

    /// Resolves a `BDC`/`DP` property operand. Returns the dictionary and
    /// the unresolved object it came from (a reference for named lists).
    fn property_list(&self, props: PDFObject) -> (Option<Dict>, Option<PDFObject>) {
        match props {
            PDFObject::Dict(dict) => (Some(dict.clone()), Some(PDFObject::Dict(dict))),
            PDFObject::Name(name) => {
                let Some(entry) = self.resource("Properties", name) else {
                    debug!(%name, "property list not found in resources");
                    return (None, None);
                };
                let dict = self
                    .ev
                    .xref
                    .resolve(&entry)
                    .and_then(|d| d.as_dict().ok().cloned());
                (dict, Some(entry))
            }
            other => {
                debug!(got = other.type_name(), "property list is neither a dict nor a name");
                (None, None)
            }
        }
    }

    /// Decides whether an optional content group or membership dictionary
    /// is hidden.
    pub(crate) fn is_oc_hidden(&self, oc: &PDFObject) -> bool {
        let Some(hidden) = self.ev.hidden_groups else {
            return false;
        };
        if let PDFObject::Ref(r) = oc
            && hidden.contains(r)
        {
            return true;
        }
        let Some(resolved) = self.ev.xref.resolve(oc) else {
            return false;
        };
        let Ok(dict) = resolved.as_dict() else {
            return false;
        };
        if !dict.is_type("OCMD") {
            return false;
        }
        let groups: Vec<ObjRef> = match dict.get("OCGs") {
            Some(PDFObject::Ref(r)) => vec![*r],
            Some(PDFObject::Array(items)) => items.iter().filter_map(|i| i.as_ref().ok()).collect(),
            _ => return false,
        };
        if groups.is_empty() {
            return false;
        }
        let off = groups.iter().filter(|g| hidden.contains(*g)).count();
        match dict.get_name("P").as_ref().map_or("AnyOn", Name::as_str) {
            "AllOn" => off > 0,
            "AnyOff" => off == 0,
            "AllOff" => off < groups.len(),
            _ => off == groups.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::EvaluatorOptions;
    use crate::interp::evaluator::{Evaluator, ResourceCache};
    use crate::interp::operator_list::{OpCode, OperatorList};
    use crate::model::objects::{Dict, ObjRef};
    use crate::parser::pdf_parser::parse_object;
    use crate::test_utils::xref_with;
    use crate::utils::MATRIX_IDENTITY;
    use bytes::Bytes;
    use rustc_hash::FxHashSet;

    fn run(content: &'static [u8], hidden: Option<&FxHashSet<ObjRef>>) -> OperatorList {
        let xref = xref_with(&[
            (2, "<< /Type /OCG /Name (Layer) >>"),
            (3, "<< /Type /OCMD /OCGs [2 0 R] /P /AllOff >>"),
        ]);
        let cache = ResourceCache::new();
        let options = EvaluatorOptions::default();
        let resources: Dict = parse_object("<< /Properties << /L1 2 0 R /M1 3 0 R >> >>")
            .unwrap()
            .as_dict()
            .unwrap()
            .clone();
        let mut ev = Evaluator::new(&xref, &cache, &options);
        if let Some(hidden) = hidden {
            ev = ev.with_hidden_groups(hidden);
        }
        ev.operator_list(&[Bytes::from_static(content)], Some(resources), MATRIX_IDENTITY)
            .unwrap()
    }

    #[test]
    fn test_hidden_group_suppresses_content() {
        let hidden: FxHashSet<ObjRef> = [ObjRef::new(2, 0)].into_iter().collect();
        let content = b"/OC /L1 BDC 1 w EMC 2 w";
        let list = run(content, Some(&hidden));
        assert_eq!(list.fn_array, [OpCode::SetLineWidth]);
        assert_eq!(run(content, None).len(), 4);
    }

    #[test]
    fn test_nested_sections_inside_hidden_group() {
        let hidden: FxHashSet<ObjRef> = [ObjRef::new(2, 0)].into_iter().collect();
        let list = run(b"/Span BMC /OC /L1 BDC /P BMC 1 w EMC EMC EMC 2 w", Some(&hidden));
        assert_eq!(
            list.fn_array,
            [OpCode::BeginMarkedContent, OpCode::EndMarkedContent, OpCode::SetLineWidth]
        );
    }

    #[test]
    fn test_membership_dict_policy() {
        let hidden: FxHashSet<ObjRef> = [ObjRef::new(2, 0)].into_iter().collect();
        // AllOff with every group off: visible.
        let list = run(b"/OC /M1 BDC 1 w EMC", Some(&hidden));
        assert_eq!(list.count(OpCode::SetLineWidth), 1);
        let none = FxHashSet::default();
        let list = run(b"/OC /M1 BDC 1 w EMC", Some(&none));
        assert_eq!(list.count(OpCode::SetLineWidth), 0);
    }

    #[test]
    fn test_unmatched_emc_is_ignored() {
        let list = run(b"EMC /Span BMC EMC", None);
        assert_eq!(list.fn_array, [OpCode::BeginMarkedContent, OpCode::EndMarkedContent]);
    }
}
