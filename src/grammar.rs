//! Grammar resource loading and grammar-level queries.
//!
//! A grammar resource is a TOML description holding the type table (proper
//! and leaf types), the inflection rules, the stem lexicon, and the
//! punctuation classes. Loading builds the type hierarchy and the
//! morphological analyzer; the result is immutable for the lifetime of the
//! session and safely shared for reads.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::Deserialize;

use crate::error::{GrammarError, HekaResult, HierarchyError};
use crate::hierarchy::{HierarchyBuilder, TypeHierarchy, TypeId};
use crate::morph::{MorphAnalyzer, MorphRule};

// ---------------------------------------------------------------------------
// Resource format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GrammarFile {
    grammar: GrammarMeta,
    #[serde(default)]
    types: Vec<TypeDecl>,
    #[serde(default)]
    morph: MorphSection,
    #[serde(default)]
    lexicon: Vec<LexDecl>,
}

#[derive(Debug, Deserialize)]
struct GrammarMeta {
    name: String,
    #[serde(default)]
    version: String,
    /// Punctuation characters beyond the ASCII class.
    #[serde(default)]
    punctuation: String,
    /// Grammar's own default for the input-segregation mode.
    #[serde(default)]
    segregation: bool,
}

#[derive(Debug, Deserialize)]
struct TypeDecl {
    name: String,
    #[serde(default)]
    parents: Vec<String>,
    #[serde(default)]
    leaf: bool,
}

#[derive(Debug, Default, Deserialize)]
struct MorphSection {
    #[serde(default)]
    rules: Vec<MorphRule>,
}

#[derive(Debug, Deserialize)]
struct LexDecl {
    stem: String,
    #[serde(default)]
    kind: Option<String>,
}

// ---------------------------------------------------------------------------
// Loaded grammar
// ---------------------------------------------------------------------------

/// One lexicon entry: a stem and the grammar type it instantiates.
#[derive(Debug, Clone)]
pub struct LexEntry {
    pub stem: String,
    pub kind: Option<String>,
}

/// A loaded grammar: type hierarchy, morphology, lexicon, punctuation.
pub struct Grammar {
    name: String,
    version: String,
    segregation: bool,
    hierarchy: Box<dyn TypeHierarchy>,
    type_index: HashMap<String, TypeId>,
    morph: MorphAnalyzer,
    lexicon: HashMap<String, Vec<LexEntry>>,
    punctuation: HashSet<char>,
}

impl Grammar {
    /// Load a grammar resource from disk.
    pub fn load(path: &Path) -> HekaResult<Self> {
        Self::load_with_max_chain(path, MorphAnalyzer::DEFAULT_MAX_CHAIN)
    }

    /// Load with an explicit cap on chained inflection rules.
    pub fn load_with_max_chain(path: &Path, morph_max_chain: usize) -> HekaResult<Self> {
        let display = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| GrammarError::Load {
            path: display.clone(),
            source,
        })?;
        let file: GrammarFile =
            toml::from_str(&raw).map_err(|e| GrammarError::Malformed {
                path: display.clone(),
                message: format!("{e}"),
            })?;

        let mut builder = HierarchyBuilder::new();
        for decl in &file.types {
            if decl.leaf {
                if decl.parents.len() != 1 {
                    return Err(HierarchyError::LeafParentCount {
                        name: decl.name.clone(),
                        count: decl.parents.len(),
                    }
                    .into());
                }
                builder.leaf_type(&decl.name, &decl.parents[0]);
            } else {
                builder.proper_type(&decl.name, decl.parents.iter().map(String::as_str));
            }
        }
        let hierarchy = builder.build()?;

        let mut type_index = HashMap::with_capacity(hierarchy.type_count());
        for t in 0..hierarchy.type_count() {
            type_index.insert(hierarchy.type_name(t)?.to_string(), t);
        }

        let mut lexicon: HashMap<String, Vec<LexEntry>> = HashMap::new();
        for decl in &file.lexicon {
            if let Some(kind) = &decl.kind {
                if !type_index.contains_key(kind) {
                    return Err(GrammarError::Malformed {
                        path: display,
                        message: format!(
                            "lexicon stem `{}` names undeclared type `{kind}`",
                            decl.stem
                        ),
                    }
                    .into());
                }
            }
            lexicon.entry(decl.stem.clone()).or_default().push(LexEntry {
                stem: decl.stem.clone(),
                kind: decl.kind.clone(),
            });
        }

        let stems: HashSet<String> = lexicon.keys().cloned().collect();
        let morph =
            MorphAnalyzer::new(file.morph.rules, stems).with_max_chain(morph_max_chain);

        Ok(Self {
            name: file.grammar.name,
            version: file.grammar.version,
            segregation: file.grammar.segregation,
            hierarchy,
            type_index,
            morph,
            lexicon,
            punctuation: file.grammar.punctuation.chars().collect(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// The grammar's own input-segregation default.
    pub fn segregation_default(&self) -> bool {
        self.segregation
    }

    pub fn hierarchy(&self) -> &dyn TypeHierarchy {
        self.hierarchy.as_ref()
    }

    pub fn morph(&self) -> &MorphAnalyzer {
        &self.morph
    }

    /// Resolve a type name to its handle.
    pub fn lookup_type(&self, name: &str) -> Option<TypeId> {
        self.type_index.get(name).copied()
    }

    /// Lexicon entries for a stem.
    pub fn lex_entries(&self, stem: &str) -> &[LexEntry] {
        self.lexicon.get(stem).map(Vec::as_slice).unwrap_or(&[])
    }

    /// True iff the input consists of punctuation only (grammar punctuation
    /// classes plus ASCII punctuation, whitespace ignored). Empty or
    /// whitespace-only input is not punctuation-only.
    pub fn punctuationp(&self, input: &str) -> bool {
        let mut seen = false;
        for c in input.chars() {
            if c.is_whitespace() {
                continue;
            }
            if c.is_ascii_punctuation() || self.punctuation.contains(&c) {
                seen = true;
            } else {
                return false;
            }
        }
        seen
    }
}

impl std::fmt::Debug for Grammar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Grammar")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("types", &self.hierarchy.type_count())
            .field("stems", &self.lexicon.len())
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HekaError;
    use std::io::Write;

    fn write_grammar(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    fn toy() -> Grammar {
        let f = write_grammar(test_support::TOY_GRAMMAR);
        Grammar::load(f.path()).unwrap()
    }

    #[test]
    fn load_builds_hierarchy_and_lexicon() {
        let g = toy();
        assert_eq!(g.name(), "toy-english");
        assert_eq!(g.hierarchy().type_count(), 5);
        assert!(g.hierarchy().is_proper_type(g.lookup_type("noun").unwrap()));
        assert!(!g.hierarchy().is_proper_type(g.lookup_type("dog_le").unwrap()));
        assert_eq!(g.lex_entries("dog").len(), 1);
    }

    #[test]
    fn missing_resource_is_a_load_error() {
        let err = Grammar::load(Path::new("/no/such/grammar.toml")).unwrap_err();
        assert!(matches!(
            err,
            HekaError::Grammar(GrammarError::Load { .. })
        ));
    }

    #[test]
    fn malformed_resource_is_reported() {
        let f = write_grammar("[grammar\nname=");
        let err = Grammar::load(f.path()).unwrap_err();
        assert!(matches!(
            err,
            HekaError::Grammar(GrammarError::Malformed { .. })
        ));
    }

    #[test]
    fn leaf_with_two_parents_rejected() {
        let f = write_grammar(
            r#"
[grammar]
name = "bad"

[[types]]
name = "a"

[[types]]
name = "b"

[[types]]
name = "c"
parents = ["a", "b"]
leaf = true
"#,
        );
        let err = Grammar::load(f.path()).unwrap_err();
        assert!(matches!(
            err,
            HekaError::Hierarchy(HierarchyError::LeafParentCount { count: 2, .. })
        ));
    }

    #[test]
    fn lexicon_kind_must_be_declared() {
        let f = write_grammar(
            r#"
[grammar]
name = "bad"

[[types]]
name = "top"

[[lexicon]]
stem = "dog"
kind = "ghost_le"
"#,
        );
        let err = Grammar::load(f.path()).unwrap_err();
        assert!(matches!(
            err,
            HekaError::Grammar(GrammarError::Malformed { .. })
        ));
    }

    #[test]
    fn punctuation_query() {
        let g = toy();
        assert!(g.punctuationp("?!..."));
        assert!(g.punctuationp("…—"));
        assert!(g.punctuationp("  ?? "));
        assert!(!g.punctuationp("dog."));
        assert!(!g.punctuationp(""));
        assert!(!g.punctuationp("   "));
    }

    #[test]
    fn morph_uses_lexicon_stems() {
        let g = toy();
        let analyses = g.morph().analyze("singings");
        // Two chains: singing (stem) + plural, and sing + prp + plural.
        assert_eq!(analyses.len(), 2);
    }
}
