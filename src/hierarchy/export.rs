//! Hierarchy export in VCG graph syntax: one node entry per type, one edge
//! entry per (parent, child) pair, iterated in handle order for determinism.
//!
//! Leaf types are skipped unless requested. A proper type with no declared
//! subtypes gets a distinguished border so hierarchy reviewers can spot
//! unused leaves of the partial order.

use std::io::Write;

use crate::error::HierarchyError;
use crate::hierarchy::{TypeHierarchy, TypeId};

/// Escape a type name for embedding in a quoted VCG field.
///
/// A name whose first character is a quote keeps that quote and gains a `_`
/// marker behind it, so the surrounding quoting stays balanced; any other
/// name is wrapped in quotes verbatim.
pub fn escape_type_name(name: &str) -> String {
    match name.strip_prefix('"') {
        Some(rest) => format!("\"_{rest}"),
        None => format!("\"{name}\""),
    }
}

fn write_node<W: Write>(
    out: &mut W,
    hierarchy: &dyn TypeHierarchy,
    t: TypeId,
) -> Result<(), HierarchyError> {
    let name = escape_type_name(hierarchy.type_name(t)?);
    let childless = hierarchy.is_proper_type(t) && hierarchy.subtype_count(t) == 0;
    let border = if childless { " bordercolor: blue" } else { "" };
    writeln!(out, "node: {{ title: {name}{border} }}")
        .map_err(|source| HierarchyError::ExportIo { source })
}

fn write_edge<W: Write>(
    out: &mut W,
    hierarchy: &dyn TypeHierarchy,
    from: TypeId,
    to: TypeId,
) -> Result<(), HierarchyError> {
    let source = escape_type_name(hierarchy.type_name(from)?);
    let target = escape_type_name(hierarchy.type_name(to)?);
    writeln!(out, "edge: {{ sourcename: {source} targetname: {target} }}")
        .map_err(|e| HierarchyError::ExportIo { source: e })
}

/// Serialize the whole hierarchy as a VCG graph description.
///
/// Written in full on every call. Edges run parent → child. With
/// `include_leaf_types` false the output contains neither leaf nodes nor
/// edges whose child is a leaf type.
pub fn export_graph<W: Write>(
    hierarchy: &dyn TypeHierarchy,
    out: &mut W,
    include_leaf_types: bool,
) -> Result<(), HierarchyError> {
    writeln!(out, "graph: {{ orientation: left_to_right xspace: 10")
        .map_err(|source| HierarchyError::ExportIo { source })?;

    for t in 0..hierarchy.type_count() {
        if include_leaf_types || hierarchy.is_proper_type(t) {
            write_node(out, hierarchy, t)?;
        }
    }

    for t in 0..hierarchy.type_count() {
        if hierarchy.is_proper_type(t) {
            for &parent in hierarchy.immediate_supertypes(t)? {
                write_edge(out, hierarchy, parent, t)?;
            }
        } else if include_leaf_types {
            let parent = hierarchy.leaf_parent(t)?;
            write_edge(out, hierarchy, parent, t)?;
        }
    }

    writeln!(out, "}}").map_err(|source| HierarchyError::ExportIo { source })
}

/// Render the export to a string (CLI and test convenience).
pub fn export_graph_string(
    hierarchy: &dyn TypeHierarchy,
    include_leaf_types: bool,
) -> Result<String, HierarchyError> {
    let mut buf = Vec::new();
    export_graph(hierarchy, &mut buf, include_leaf_types)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::HierarchyBuilder;

    fn animal_hierarchy() -> Box<dyn TypeHierarchy> {
        let mut b = HierarchyBuilder::new();
        b.proper_type("animal", Vec::<String>::new());
        b.leaf_type("dog", "animal");
        b.leaf_type("cat", "animal");
        b.build().unwrap()
    }

    #[test]
    fn escape_passes_plain_names_through_quoted() {
        assert_eq!(escape_type_name("animal"), "\"animal\"");
        assert_eq!(escape_type_name("*top*"), "\"*top*\"");
    }

    #[test]
    fn escape_rewrites_leading_quote_balanced() {
        let escaped = escape_type_name("\"plus\"");
        assert_eq!(escaped, "\"_plus\"");
        assert_eq!(escaped.matches('"').count() % 2, 0);
    }

    #[test]
    fn export_without_leaves_has_no_leaf_entries() {
        let h = animal_hierarchy();
        let out = export_graph_string(h.as_ref(), false).unwrap();
        assert_eq!(out.matches("node:").count(), 1);
        assert_eq!(out.matches("edge:").count(), 0);
        assert!(out.contains("\"animal\""));
        assert!(!out.contains("\"dog\""));
    }

    #[test]
    fn export_with_leaves_has_all_nodes_and_edges() {
        let h = animal_hierarchy();
        let out = export_graph_string(h.as_ref(), true).unwrap();
        assert_eq!(out.matches("node:").count(), 3);
        assert_eq!(out.matches("edge:").count(), 2);
        assert!(out.contains("sourcename: \"animal\" targetname: \"dog\""));
        assert!(out.contains("sourcename: \"animal\" targetname: \"cat\""));
    }

    #[test]
    fn childless_proper_types_are_marked() {
        let mut b = HierarchyBuilder::new();
        b.proper_type("top", Vec::<String>::new());
        b.proper_type("unused", ["top"]);
        let h = b.build().unwrap();
        let out = export_graph_string(h.as_ref(), false).unwrap();
        assert!(out.contains("title: \"unused\" bordercolor: blue"));
        assert!(!out.contains("title: \"top\" bordercolor"));
    }

    #[test]
    fn quote_led_name_survives_export() {
        let mut b = HierarchyBuilder::new();
        b.proper_type("top", Vec::<String>::new());
        b.proper_type("\"string\"", ["top"]);
        let h = b.build().unwrap();
        let out = export_graph_string(h.as_ref(), true).unwrap();
        assert!(out.contains("title: \"_string\""));
        for line in out.lines() {
            assert_eq!(line.matches('"').count() % 2, 0, "unbalanced: {line}");
        }
    }
}
