//! Rule-based morphological analysis with derivation chains.
//!
//! An analysis records how a surface word form was derived: the ordered
//! sequence of forms from the base stem out to the surface, and the ordered
//! sequence of inflection rules applied between them. One surface form may
//! yield zero, one, or many analyses.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

/// One derivation chain for a surface form.
///
/// Invariant: `forms.len() == rules.len() + 1`. `forms[0]` is the base stem,
/// the last form is the surface, and `rules[i]` is the inflection rule that
/// rewrites `forms[i]` into `forms[i + 1]`. A zero-rule analysis (the surface
/// is itself a stem) has one form and no rules.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MorphAnalysis {
    forms: Vec<String>,
    rules: Vec<String>,
}

impl MorphAnalysis {
    /// Zero-rule analysis of a form that is itself a stem.
    pub fn lexical(form: impl Into<String>) -> Self {
        Self {
            forms: vec![form.into()],
            rules: Vec::new(),
        }
    }

    /// Build an analysis from a base-first chain. Panics in debug builds if
    /// the forms/rules lengths disagree.
    pub fn from_chain(forms: Vec<String>, rules: Vec<String>) -> Self {
        debug_assert_eq!(forms.len(), rules.len() + 1);
        Self { forms, rules }
    }

    /// The base stem (first form of the chain).
    pub fn base(&self) -> &str {
        &self.forms[0]
    }

    /// The surface form (last form of the chain).
    pub fn surface(&self) -> &str {
        self.forms.last().map(String::as_str).unwrap_or_default()
    }

    /// Ordered forms, base first.
    pub fn forms(&self) -> &[String] {
        &self.forms
    }

    /// Ordered rule names; `rules()[i]` maps `forms()[i]` to `forms()[i + 1]`.
    pub fn rules(&self) -> &[String] {
        &self.rules
    }
}

/// A suffix rewrite rule: a base form ending in `strip` takes the surface
/// suffix `add` when inflected (`strip` is empty for plain concatenation,
/// e.g. `sing` + `ing` under `prp_verb_infl_rule`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MorphRule {
    pub name: String,
    #[serde(default)]
    pub strip: String,
    pub add: String,
}

impl MorphRule {
    /// Undo this rule on a surface form, returning the candidate base.
    fn unapply(&self, form: &str) -> Option<String> {
        let stripped = form.strip_suffix(&self.add)?;
        let base = format!("{stripped}{}", self.strip);
        // A no-op rewrite would loop the chain search forever.
        if base.is_empty() || base == form {
            return None;
        }
        Some(base)
    }
}

/// Analyzer over the loaded grammar's inflection rules and stem set.
///
/// Chains are anchored: a candidate derivation is kept only when stripping
/// ends at a known stem. Deterministic and read-only over the grammar.
#[derive(Debug)]
pub struct MorphAnalyzer {
    rules: Vec<MorphRule>,
    stems: HashSet<String>,
    max_chain: usize,
}

impl MorphAnalyzer {
    pub const DEFAULT_MAX_CHAIN: usize = 4;

    pub fn new(rules: Vec<MorphRule>, stems: HashSet<String>) -> Self {
        Self {
            rules,
            stems,
            max_chain: Self::DEFAULT_MAX_CHAIN,
        }
    }

    /// Cap on the number of chained rule applications per analysis.
    pub fn with_max_chain(mut self, max_chain: usize) -> Self {
        self.max_chain = max_chain;
        self
    }

    pub fn is_stem(&self, form: &str) -> bool {
        self.stems.contains(form)
    }

    /// All plausible derivation chains for a surface form.
    ///
    /// Returns an empty vector (not an error) when nothing applies. Ordering
    /// is stable for a given grammar load: shortest chains first, ties broken
    /// by rule names, then forms.
    pub fn analyze(&self, form: &str) -> Vec<MorphAnalysis> {
        let surface: String = form.nfc().collect();
        let mut results = Vec::new();

        // Surface-inward walk: `trail` holds the forms seen so far, surface
        // first; `applied` the rules undone so far, outermost first.
        let mut trail = vec![surface];
        let mut applied = Vec::new();
        self.descend(&mut trail, &mut applied, &mut results);

        results.sort_by(|a, b| {
            a.rules
                .len()
                .cmp(&b.rules.len())
                .then_with(|| a.rules.cmp(&b.rules))
                .then_with(|| a.forms.cmp(&b.forms))
        });
        results.dedup();
        results
    }

    fn descend(
        &self,
        trail: &mut Vec<String>,
        applied: &mut Vec<String>,
        results: &mut Vec<MorphAnalysis>,
    ) {
        let current = trail.last().cloned().unwrap_or_default();

        if self.is_stem(&current) {
            let forms: Vec<String> = trail.iter().rev().cloned().collect();
            let rules: Vec<String> = applied.iter().rev().cloned().collect();
            results.push(MorphAnalysis::from_chain(forms, rules));
        }

        if applied.len() >= self.max_chain {
            return;
        }

        for rule in &self.rules {
            let Some(base) = rule.unapply(&current) else {
                continue;
            };
            if trail.contains(&base) {
                continue;
            }
            trail.push(base);
            applied.push(rule.name.clone());
            self.descend(trail, applied, results);
            applied.pop();
            trail.pop();
        }
    }

    /// Flattened single-string rendering of all analyses, one line per chain:
    /// the forms joined by spaces, then the rules joined by spaces.
    pub fn analyze_flat(&self, form: &str) -> String {
        let mut out = String::new();
        for analysis in self.analyze(form) {
            out.push_str(&analysis.forms().join(" "));
            if !analysis.rules().is_empty() {
                out.push_str(" / ");
                out.push_str(&analysis.rules().join(" "));
            }
            out.push('\n');
        }
        out
    }
}
