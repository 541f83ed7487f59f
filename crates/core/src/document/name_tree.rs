//! Name and number tree traversal (PDF 32000 7.9.6, 7.9.7).

use crate::document::xref::XRef;
use crate::model::objects::{ObjRef, PDFObject};
use rustc_hash::FxHashSet;
use tracing::warn;

const MAX_DEPTH: usize = 32;

/// Which leaf array a tree stores its pairs in.
#[derive(Clone, Copy)]
enum TreeKind {
    Names,
    Nums,
}

impl TreeKind {
    const fn leaf_key(self) -> &'static str {
        match self {
            Self::Names => "Names",
            Self::Nums => "Nums",
        }
    }
}

fn walk(
    xref: &XRef,
    node: &PDFObject,
    kind: TreeKind,
    depth: usize,
    visited: &mut FxHashSet<ObjRef>,
    out: &mut Vec<(PDFObject, PDFObject)>,
) {
    if let PDFObject::Ref(r) = node
        && !visited.insert(*r)
    {
        warn!(%r, "cycle in {} tree", kind.leaf_key());
        return;
    }
    if depth > MAX_DEPTH {
        warn!("{} tree deeper than {MAX_DEPTH} levels", kind.leaf_key());
        return;
    }
    let Some(node) = xref.resolve(node) else { return };
    let Ok(dict) = node.as_dict() else { return };

    if let Some(leaf) = xref.get(dict, kind.leaf_key())
        && let Ok(pairs) = leaf.as_array()
    {
        for pair in pairs.chunks_exact(2) {
            let key = match xref.resolve(&pair[0]) {
                Some(k) => k.into_owned(),
                None => continue,
            };
            out.push((key, pair[1].clone()));
        }
    }
    if let Some(kids) = xref.get(dict, "Kids")
        && let Ok(kids) = kids.as_array()
    {
        for kid in kids {
            walk(xref, kid, kind, depth + 1, visited, out);
        }
    }
}

/// All `(name, value)` pairs of a name tree in tree order. Values are left
/// unresolved.
pub fn name_tree_entries(xref: &XRef, root: &PDFObject) -> Vec<(Vec<u8>, PDFObject)> {
    let mut raw = Vec::new();
    walk(xref, root, TreeKind::Names, 0, &mut FxHashSet::default(), &mut raw);
    raw.into_iter()
        .filter_map(|(k, v)| Some((k.as_string().ok()?.to_vec(), v)))
        .collect()
}

/// Looks up `name` in a name tree.
pub fn name_tree_lookup(xref: &XRef, root: &PDFObject, name: &[u8]) -> Option<PDFObject> {
    name_tree_entries(xref, root)
        .into_iter()
        .find_map(|(k, v)| (k == name).then_some(v))
}

/// All `(number, value)` pairs of a number tree, sorted by key.
pub fn number_tree_entries(xref: &XRef, root: &PDFObject) -> Vec<(i64, PDFObject)> {
    let mut raw = Vec::new();
    walk(xref, root, TreeKind::Nums, 0, &mut FxHashSet::default(), &mut raw);
    let mut entries: Vec<(i64, PDFObject)> = raw
        .into_iter()
        .filter_map(|(k, v)| Some((k.as_int().ok()?, v)))
        .collect();
    entries.sort_by_key(|(k, _)| *k);
    entries
}
