//! Optional content configuration (`OCProperties`).

use super::xref::XRef;
use crate::model::objects::{Dict, ObjRef, PDFObject};
use crate::utils::decode_text;
use indexmap::IndexMap;
use rustc_hash::FxHashSet;

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct OptionalContentGroup {
    pub name: String,
    pub intent: Vec<String>,
    pub visible: bool,
}

/// The default configuration (`D`) applied to every group in `OCGs`.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionalContentConfig {
    pub name: Option<String>,
    pub creator: Option<String>,
    pub base_state: String,
    pub groups: IndexMap<ObjRef, OptionalContentGroup>,
}

fn refs(xref: &XRef, dict: &Dict, key: &str) -> Vec<ObjRef> {
    xref.get(dict, key)
        .and_then(|a| a.as_array().ok().map(|items| items.iter().filter_map(|i| i.as_ref().ok()).collect()))
        .unwrap_or_default()
}

impl OptionalContentConfig {
    /// Reads the catalog's `OCProperties`. Returns `None` when it has no
    /// `OCGs` array.
    pub fn parse(xref: &XRef, properties: &Dict) -> Option<Self> {
        let ocgs = xref.get(properties, "OCGs")?;
        let ocgs = ocgs.as_array().ok()?;
        let default = xref.get_dict(properties, "D").unwrap_or_default();
        let base_state = default
            .get_name("BaseState")
            .map_or("ON", |n| n.as_str())
            .to_string();
        let on: FxHashSet<ObjRef> = refs(xref, &default, "ON").into_iter().collect();
        let off: FxHashSet<ObjRef> = refs(xref, &default, "OFF").into_iter().collect();

        let mut groups = IndexMap::new();
        for entry in ocgs {
            let PDFObject::Ref(r) = entry else { continue };
            let Some(group) = xref.fetch_dict(*r) else { continue };
            let name = xref
                .get(&group, "Name")
                .and_then(|n| n.as_string().ok().map(decode_text))
                .unwrap_or_default();
            let intent = match xref.get(&group, "Intent").as_deref() {
                Some(PDFObject::Name(n)) => vec![n.as_str().to_string()],
                Some(PDFObject::Array(items)) => items
                    .iter()
                    .filter_map(|i| i.as_name().ok().map(|n| n.as_str().to_string()))
                    .collect(),
                _ => vec!["View".to_string()],
            };
            let visible = if off.contains(r) {
                false
            } else if on.contains(r) {
                true
            } else {
                base_state != "OFF"
            };
            groups.insert(*r, OptionalContentGroup { name, intent, visible });
        }

        Some(Self {
            name: xref.get(&default, "Name").and_then(|n| n.as_string().ok().map(decode_text)),
            creator: xref.get(&default, "Creator").and_then(|n| n.as_string().ok().map(decode_text)),
            base_state,
            groups,
        })
    }

    pub fn is_visible(&self, group: ObjRef) -> bool {
        self.groups.get(&group).is_none_or(|g| g.visible)
    }

    pub fn set_visibility(&mut self, group: ObjRef, visible: bool) {
        if let Some(g) = self.groups.get_mut(&group) {
            g.visible = visible;
        }
    }

    /// Groups switched off, as handed to the evaluator.
    pub fn hidden_groups(&self) -> FxHashSet<ObjRef> {
        self.groups
            .iter()
            .filter(|(_, g)| !g.visible)
            .map(|(r, _)| *r)
            .collect()
    }
}
