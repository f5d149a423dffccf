//! Lexical analysis of one input item: tokenization, per-token derivation
//! chains, and the assembly of ranked readings.
//!
//! A reading is one way of resolving every token of the input to a lexicon
//! stem through a derivation chain. Readings are ranked cheapest-first by the
//! total number of inflection rules applied across the item.

use serde::{Deserialize, Serialize};

use crate::error::ParseError;
use crate::grammar::Grammar;

/// Resource caps applied while analyzing one item.
#[derive(Debug, Clone, Copy)]
pub struct ParseLimits {
    /// Cap on lexical edges (token candidates) per item.
    pub edge_limit: usize,
    /// Cap on readings returned per item.
    pub max_readings: usize,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self {
            edge_limit: 500,
            max_readings: 32,
        }
    }
}

/// One token resolved within a reading: the surface form, the stem it was
/// traced to, the grammar type of the lexicon entry, and the rule chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenReading {
    pub surface: String,
    pub stem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub rules: Vec<String>,
}

/// One complete reading of an input item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reading {
    pub tokens: Vec<TokenReading>,
}

impl Reading {
    /// Total inflection rules applied across the item (the ranking key).
    pub fn cost(&self) -> usize {
        self.tokens.iter().map(|t| t.rules.len()).sum()
    }
}

fn token_candidates(grammar: &Grammar, token: &str) -> Vec<TokenReading> {
    let mut candidates = Vec::new();
    for analysis in grammar.morph().analyze(token) {
        for entry in grammar.lex_entries(analysis.base()) {
            candidates.push(TokenReading {
                surface: analysis.surface().to_string(),
                stem: entry.stem.clone(),
                kind: entry.kind.clone(),
                rules: analysis.rules().to_vec(),
            });
        }
        // Anchored chains always end at a lexicon stem, so entries exist;
        // a kind-less stem still contributes one candidate per analysis.
        debug_assert!(!grammar.lex_entries(analysis.base()).is_empty());
    }
    candidates
}

/// Analyze one input item into ranked readings.
///
/// Tokens are whitespace-separated. Every token must reach the lexicon
/// through at least one derivation chain. The edge limit bounds both the
/// candidate count across the item and the number of assembled readings, so
/// ambiguity can never multiply past it: an item whose candidate product
/// exceeds the limit is rejected before any reading is materialized.
pub fn analyze_item(
    grammar: &Grammar,
    input: &str,
    limits: &ParseLimits,
) -> Result<Vec<Reading>, ParseError> {
    let tokens: Vec<&str> = input.split_whitespace().collect();
    if tokens.is_empty() {
        return Ok(Vec::new());
    }

    let mut per_token: Vec<Vec<TokenReading>> = Vec::with_capacity(tokens.len());
    let mut edges = 0usize;
    let mut combinations = 1usize;
    for token in &tokens {
        let candidates = token_candidates(grammar, token);
        if candidates.is_empty() {
            return Err(ParseError::NoLexicalCoverage {
                token: (*token).to_string(),
            });
        }
        edges += candidates.len();
        combinations = combinations.saturating_mul(candidates.len());
        if edges > limits.edge_limit || combinations > limits.edge_limit {
            return Err(ParseError::EdgeLimitExceeded {
                limit: limits.edge_limit,
            });
        }
        per_token.push(candidates);
    }

    // Cartesian assembly over per-token candidates, depth-first; bounded by
    // the combination check above.
    let mut readings = Vec::with_capacity(combinations);
    let mut partial: Vec<TokenReading> = Vec::with_capacity(per_token.len());
    assemble(&per_token, &mut partial, &mut readings);

    readings.sort_by_key(Reading::cost);
    readings.truncate(limits.max_readings);
    Ok(readings)
}

fn assemble(
    per_token: &[Vec<TokenReading>],
    partial: &mut Vec<TokenReading>,
    readings: &mut Vec<Reading>,
) {
    match per_token.split_first() {
        None => readings.push(Reading {
            tokens: partial.clone(),
        }),
        Some((head, rest)) => {
            for candidate in head {
                partial.push(candidate.clone());
                assemble(rest, partial, readings);
                partial.pop();
            }
        }
    }
}

/// Encode readings past the first `nskip` as a JSON array.
///
/// Skipping past the end yields the empty array encoding, never an error.
pub fn encode_readings(readings: &[Reading], nskip: usize) -> Result<String, ParseError> {
    let kept = readings.get(nskip..).unwrap_or(&[]);
    serde_json::to_string(kept).map_err(|e| ParseError::InvalidArgument {
        message: format!("readings not encodable: {e}"),
    })
}
