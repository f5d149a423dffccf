//! Typed grammar hierarchy: a multiple-inheritance partial order over
//! grammar categories with a proper/leaf distinction.
//!
//! The universe of types `0..type_count` is split into two consecutive,
//! non-overlapping ranges: proper types `0..first_leaftype` and leaf types
//! `first_leaftype..type_count`. A proper type carries zero or more named
//! immediate supertypes (multiple inheritance is allowed); a leaf type is a
//! terminal category attached to exactly one parent, kept out of the proper
//! range for compactness.
//!
//! Storage is arena-style: types are addressed by dense integer handles and
//! edges live in adjacency lists keyed by handle, so traversal and export
//! never touch a pointer graph. Two implementations sit behind the
//! [`TypeHierarchy`] trait and are selected when the grammar is loaded:
//! [`FullHierarchy`] when the grammar declares no leaf types, and
//! [`CompactHierarchy`] with the trailing leaf range otherwise.

pub mod export;

use std::collections::HashMap;

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::DiGraph;

use crate::error::HierarchyError;

/// Dense handle of a grammar type within one loaded hierarchy.
pub type TypeId = usize;

/// Read-only query interface over a loaded type hierarchy.
///
/// The hierarchy is built once at grammar load and immutable for the lifetime
/// of the loaded grammar; it is safely shared for reads without locking.
pub trait TypeHierarchy: Send + Sync {
    /// Total number of types, proper and leaf.
    fn type_count(&self) -> usize;

    /// True iff `t` is a proper type (not a leaf type). Out-of-range
    /// handles are not proper.
    fn is_proper_type(&self, t: TypeId) -> bool;

    /// Display name of `t`. The name is an arbitrary string and may itself
    /// begin with a quote character.
    fn type_name(&self, t: TypeId) -> Result<&str, HierarchyError>;

    /// Ordered immediate supertypes of a proper type. Asking for the
    /// supertypes of a leaf type is a caller error, not an empty answer.
    fn immediate_supertypes(&self, t: TypeId) -> Result<&[TypeId], HierarchyError>;

    /// The single parent of a leaf type. Asking for the leaf parent of a
    /// proper type is a caller error.
    fn leaf_parent(&self, t: TypeId) -> Result<TypeId, HierarchyError>;

    /// Number of declared immediate subtypes (proper or leaf) of `t`.
    /// Leaf types always report zero.
    fn subtype_count(&self, t: TypeId) -> usize;
}

fn invalid(t: TypeId, count: usize) -> HierarchyError {
    HierarchyError::InvalidType {
        type_id: t,
        type_count: count,
    }
}

// ---------------------------------------------------------------------------
// Full hierarchy: no leaf compression
// ---------------------------------------------------------------------------

/// Hierarchy variant for grammars that declare no leaf types: every type is
/// proper and participates fully in the partial order.
#[derive(Debug)]
pub struct FullHierarchy {
    names: Vec<String>,
    supertypes: Vec<Vec<TypeId>>,
    subtype_counts: Vec<usize>,
}

impl TypeHierarchy for FullHierarchy {
    fn type_count(&self) -> usize {
        self.names.len()
    }

    fn is_proper_type(&self, t: TypeId) -> bool {
        t < self.names.len()
    }

    fn type_name(&self, t: TypeId) -> Result<&str, HierarchyError> {
        self.names
            .get(t)
            .map(String::as_str)
            .ok_or_else(|| invalid(t, self.names.len()))
    }

    fn immediate_supertypes(&self, t: TypeId) -> Result<&[TypeId], HierarchyError> {
        self.supertypes
            .get(t)
            .map(Vec::as_slice)
            .ok_or_else(|| invalid(t, self.names.len()))
    }

    fn leaf_parent(&self, t: TypeId) -> Result<TypeId, HierarchyError> {
        let name = self.type_name(t)?;
        Err(HierarchyError::TypeKindMismatch {
            type_id: t,
            name: name.to_string(),
            expected: "leaf",
            actual: "proper",
        })
    }

    fn subtype_count(&self, t: TypeId) -> usize {
        self.subtype_counts.get(t).copied().unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Compact hierarchy: trailing leaf range
// ---------------------------------------------------------------------------

/// Hierarchy variant with leaf compression: proper types occupy
/// `0..first_leaftype`, leaf types the trailing `first_leaftype..type_count`
/// range, each holding a single parent handle.
#[derive(Debug)]
pub struct CompactHierarchy {
    names: Vec<String>,
    supertypes: Vec<Vec<TypeId>>,
    leaf_parents: Vec<TypeId>,
    subtype_counts: Vec<usize>,
    first_leaftype: usize,
}

impl CompactHierarchy {
    /// Handle of the first leaf type (equals `type_count` when no leaves).
    pub fn first_leaftype(&self) -> usize {
        self.first_leaftype
    }
}

impl TypeHierarchy for CompactHierarchy {
    fn type_count(&self) -> usize {
        self.names.len()
    }

    fn is_proper_type(&self, t: TypeId) -> bool {
        t < self.first_leaftype
    }

    fn type_name(&self, t: TypeId) -> Result<&str, HierarchyError> {
        self.names
            .get(t)
            .map(String::as_str)
            .ok_or_else(|| invalid(t, self.names.len()))
    }

    fn immediate_supertypes(&self, t: TypeId) -> Result<&[TypeId], HierarchyError> {
        if t >= self.names.len() {
            return Err(invalid(t, self.names.len()));
        }
        if t >= self.first_leaftype {
            return Err(HierarchyError::TypeKindMismatch {
                type_id: t,
                name: self.names[t].clone(),
                expected: "proper",
                actual: "leaf",
            });
        }
        Ok(&self.supertypes[t])
    }

    fn leaf_parent(&self, t: TypeId) -> Result<TypeId, HierarchyError> {
        if t >= self.names.len() {
            return Err(invalid(t, self.names.len()));
        }
        if t < self.first_leaftype {
            return Err(HierarchyError::TypeKindMismatch {
                type_id: t,
                name: self.names[t].clone(),
                expected: "leaf",
                actual: "proper",
            });
        }
        Ok(self.leaf_parents[t - self.first_leaftype])
    }

    fn subtype_count(&self, t: TypeId) -> usize {
        self.subtype_counts.get(t).copied().unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Assembles a hierarchy from declarations, validates it, and selects the
/// implementation variant.
///
/// Proper types are indexed in declaration order, leaf types after them in
/// declaration order, so handles are stable for a given grammar resource.
#[derive(Debug, Default)]
pub struct HierarchyBuilder {
    proper: Vec<(String, Vec<String>)>,
    leaves: Vec<(String, String)>,
}

impl HierarchyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a proper type with its ordered immediate supertype names.
    pub fn proper_type(
        &mut self,
        name: impl Into<String>,
        parents: impl IntoIterator<Item = impl Into<String>>,
    ) -> &mut Self {
        self.proper
            .push((name.into(), parents.into_iter().map(Into::into).collect()));
        self
    }

    /// Declare a leaf type with its single parent name.
    pub fn leaf_type(&mut self, name: impl Into<String>, parent: impl Into<String>) -> &mut Self {
        self.leaves.push((name.into(), parent.into()));
        self
    }

    /// Validate the declarations and build the hierarchy.
    ///
    /// Checks: unique names, parent references resolving to proper types,
    /// and acyclicity of the supertype graph.
    pub fn build(self) -> Result<Box<dyn TypeHierarchy>, HierarchyError> {
        let first_leaftype = self.proper.len();
        let total = first_leaftype + self.leaves.len();

        let mut index: HashMap<&str, TypeId> = HashMap::with_capacity(total);
        let mut names: Vec<String> = Vec::with_capacity(total);
        for (i, (name, _)) in self.proper.iter().enumerate() {
            if index.insert(name.as_str(), i).is_some() {
                return Err(HierarchyError::DuplicateType { name: name.clone() });
            }
            names.push(name.clone());
        }
        for (j, (name, _)) in self.leaves.iter().enumerate() {
            if index.insert(name.as_str(), first_leaftype + j).is_some() {
                return Err(HierarchyError::DuplicateType { name: name.clone() });
            }
            names.push(name.clone());
        }

        let resolve = |child: &str, parent: &str| -> Result<TypeId, HierarchyError> {
            match index.get(parent) {
                Some(&p) if p < first_leaftype => Ok(p),
                _ => Err(HierarchyError::UnknownParent {
                    child: child.to_string(),
                    parent: parent.to_string(),
                }),
            }
        };

        let mut supertypes: Vec<Vec<TypeId>> = Vec::with_capacity(first_leaftype);
        let mut subtype_counts = vec![0usize; total];
        for (name, parents) in &self.proper {
            let mut supers = Vec::with_capacity(parents.len());
            for parent in parents {
                let p = resolve(name, parent)?;
                supers.push(p);
                subtype_counts[p] += 1;
            }
            supertypes.push(supers);
        }

        let mut leaf_parents: Vec<TypeId> = Vec::with_capacity(self.leaves.len());
        for (name, parent) in &self.leaves {
            let p = resolve(name, parent)?;
            leaf_parents.push(p);
            subtype_counts[p] += 1;
        }

        // Leaf edges cannot close a cycle (leaves have no children), so the
        // check runs over the proper range only.
        let mut graph = DiGraph::<(), ()>::with_capacity(first_leaftype, first_leaftype);
        let nodes: Vec<_> = (0..first_leaftype).map(|_| graph.add_node(())).collect();
        for (child, supers) in supertypes.iter().enumerate() {
            for &parent in supers {
                graph.add_edge(nodes[child], nodes[parent], ());
            }
        }
        if is_cyclic_directed(&graph) {
            let name = self
                .proper
                .first()
                .map(|(n, _)| n.clone())
                .unwrap_or_default();
            return Err(HierarchyError::CyclicHierarchy { name });
        }

        if self.leaves.is_empty() {
            Ok(Box::new(FullHierarchy {
                names,
                supertypes,
                subtype_counts,
            }))
        } else {
            Ok(Box::new(CompactHierarchy {
                names,
                supertypes,
                leaf_parents,
                subtype_counts,
                first_leaftype,
            }))
        }
    }
}
