//! heka: a unification-grammar parsing service.
//!
//! The crate loads a grammar resource (type hierarchy, inflection rules,
//! lexicon, punctuation classes) and serves lexical analysis over it: ranked
//! readings per input item, derivation chains per word form, punctuation
//! queries, and a VCG rendering of the hierarchy. A line-oriented TCP server
//! shares one parse session across concurrent clients and streams per-item
//! profiling records through a single writer.

pub mod analysis;
pub mod config;
pub mod error;
pub mod grammar;
pub mod hierarchy;
pub mod morph;
pub mod parser;
pub mod profile;
pub mod server;

pub use error::{HekaError, HekaResult};
pub use grammar::Grammar;
pub use parser::GrammarParser;
pub use server::ParsingServer;
