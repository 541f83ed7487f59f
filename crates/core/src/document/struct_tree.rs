//! Structure tree projection.

use super::xref::XRef;
use crate::model::objects::{Dict, Name, ObjRef, PDFObject};
use crate::utils::decode_text;
use rustc_hash::FxHashSet;
use tracing::warn;

const MAX_DEPTH: usize = 64;

/// One node of the logical structure.
///
/// Marked-content leaves carry `mcid` and have the role `"content"`;
/// object references have the role `"object"`.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StructTreeNode {
    pub role: String,
    pub children: Vec<StructTreeNode>,
    pub mcid: Option<i64>,
    pub page_ref: Option<ObjRef>,
    pub alt: Option<String>,
    pub lang: Option<String>,
}

impl StructTreeNode {
    fn leaf(role: &str, mcid: Option<i64>, page_ref: Option<ObjRef>) -> Self {
        Self {
            role: role.to_string(),
            children: Vec::new(),
            mcid,
            page_ref,
            alt: None,
            lang: None,
        }
    }

    /// Builds the tree under `StructTreeRoot`.
    pub fn build(xref: &XRef, root: &Dict) -> Self {
        let role_map = xref.get_dict(root, "RoleMap").unwrap_or_default();
        let mut builder = Builder {
            xref,
            role_map,
            visited: FxHashSet::default(),
        };
        let mut node = Self::leaf("Root", None, None);
        if let Some(k) = root.get("K") {
            builder.kids(k, None, 0, &mut node.children);
        }
        node
    }

    /// The part of the tree with content on `page`. Structure elements
    /// left without children are dropped.
    pub fn for_page(&self, page: ObjRef) -> Option<Self> {
        if self.mcid.is_some() || self.role == "object" {
            return (self.page_ref == Some(page)).then(|| self.clone());
        }
        let children: Vec<Self> = self.children.iter().filter_map(|c| c.for_page(page)).collect();
        if children.is_empty() {
            return None;
        }
        Some(Self {
            children,
            ..self.clone()
        })
    }

    /// Marked-content ids reachable from this node, in tree order.
    pub fn mcids(&self) -> Vec<i64> {
        let mut out = Vec::new();
        self.collect_mcids(&mut out);
        out
    }

    fn collect_mcids(&self, out: &mut Vec<i64>) {
        out.extend(self.mcid);
        for child in &self.children {
            child.collect_mcids(out);
        }
    }
}

struct Builder<'a> {
    xref: &'a XRef,
    role_map: Dict,
    visited: FxHashSet<ObjRef>,
}

impl Builder<'_> {
    /// Follows `RoleMap` until a name maps to nothing else.
    fn role(&self, name: Name) -> String {
        let mut current = name;
        let mut seen = FxHashSet::default();
        while seen.insert(current) {
            match self.role_map.get_by_name(current).and_then(|n| n.as_name().ok()) {
                Some(next) => current = next,
                None => break,
            }
        }
        current.as_str().to_string()
    }

    fn kids(&mut self, k: &PDFObject, page: Option<ObjRef>, depth: usize, out: &mut Vec<StructTreeNode>) {
        if depth > MAX_DEPTH {
            warn!("structure tree deeper than {MAX_DEPTH} levels");
            return;
        }
        if let PDFObject::Ref(r) = k
            && !self.visited.insert(*r)
        {
            warn!(%r, "cycle in structure tree");
            return;
        }
        let xref = self.xref;
        let Some(resolved) = xref.resolve(k) else { return };
        match &*resolved {
            PDFObject::Int(mcid) => out.push(StructTreeNode::leaf("content", Some(*mcid), page)),
            PDFObject::Array(items) => {
                for item in items {
                    self.kids(item, page, depth + 1, out);
                }
            }
            PDFObject::Dict(dict) => {
                let pg = dict.get("Pg").and_then(|p| p.as_ref().ok()).or(page);
                if dict.is_type("MCR") {
                    let mcid = xref.get(dict, "MCID").and_then(|m| m.as_int().ok());
                    out.push(StructTreeNode::leaf("content", mcid, pg));
                } else if dict.is_type("OBJR") {
                    out.push(StructTreeNode::leaf("object", None, pg));
                } else if let Some(s) = dict.get_name("S") {
                    let mut node = StructTreeNode::leaf(&self.role(s), None, pg);
                    node.alt = xref.get(dict, "Alt").and_then(|a| a.as_string().ok().map(decode_text));
                    node.lang = xref.get(dict, "Lang").and_then(|l| l.as_string().ok().map(decode_text));
                    if let Some(k) = dict.get("K") {
                        self.kids(k, pg, depth + 1, &mut node.children);
                    }
                    out.push(node);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::xref_with;

    #[test]
    fn test_build_with_role_map_and_page_filter() {
        let xref = xref_with(&[
            (2, "<< /Type /StructTreeRoot /RoleMap << /Para /P /Heading /H1 >> /K [3 0 R 4 0 R] >>"),
            (3, "<< /S /Heading /Pg 10 0 R /K 0 /Alt (Title) >>"),
            (4, "<< /S /Para /Pg 11 0 R /K [1 << /Type /MCR /MCID 2 /Pg 10 0 R >>] >>"),
        ]);
        let root = xref.fetch_dict(ObjRef::new(2, 0)).unwrap();
        let tree = StructTreeNode::build(&xref, &root);
        assert_eq!(tree.role, "Root");
        assert_eq!(tree.children.len(), 2);
        assert_eq!(tree.children[0].role, "H1");
        assert_eq!(tree.children[0].alt.as_deref(), Some("Title"));
        assert_eq!(tree.children[1].role, "P");
        assert_eq!(tree.mcids(), [0, 1, 2]);

        let page = tree.for_page(ObjRef::new(10, 0)).unwrap();
        assert_eq!(page.mcids(), [0, 2]);
        assert!(tree.for_page(ObjRef::new(99, 0)).is_none());
    }

    #[test]
    fn test_role_map_cycle_terminates() {
        let xref = xref_with(&[(2, "<< /RoleMap << /A /B /B /A >> /K << /S /A >> >>")]);
        let root = xref.fetch_dict(ObjRef::new(2, 0)).unwrap();
        let tree = StructTreeNode::build(&xref, &root);
        assert_eq!(tree.children.len(), 1);
    }
}
