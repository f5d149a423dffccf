//! Rich diagnostic error types for the heka parsing service.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains. Callers match on one
//! top-level [`HekaError`] and branch on the wrapped kind.

use miette::Diagnostic;
use thiserror::Error;

use crate::hierarchy::TypeId;

/// Top-level error type for the heka parsing service.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text, sources) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum HekaError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Hierarchy(#[from] HierarchyError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Grammar(#[from] GrammarError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Server(#[from] ServerError),
}

// ---------------------------------------------------------------------------
// Hierarchy errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum HierarchyError {
    #[error("invalid type {type_id}: hierarchy holds {type_count} types")]
    #[diagnostic(
        code(heka::hierarchy::invalid_type),
        help(
            "Type identifiers are dense indices 0..type_count assigned at grammar \
             load. Check that the identifier came from this grammar's hierarchy."
        )
    )]
    InvalidType { type_id: TypeId, type_count: usize },

    #[error("type {type_id} (`{name}`) is a {actual} type, not a {expected} type")]
    #[diagnostic(
        code(heka::hierarchy::type_kind_mismatch),
        help(
            "`immediate_supertypes` is defined only for proper types and \
             `leaf_parent` only for leaf types. Test with `is_proper_type` \
             before choosing the query."
        )
    )]
    TypeKindMismatch {
        type_id: TypeId,
        name: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("type hierarchy contains a cycle through `{name}`")]
    #[diagnostic(
        code(heka::hierarchy::cycle),
        help(
            "Supertype declarations must form a directed acyclic graph. \
             Remove the circular parent declaration from the grammar resource."
        )
    )]
    CyclicHierarchy { name: String },

    #[error("type `{child}` names unknown parent `{parent}`")]
    #[diagnostic(
        code(heka::hierarchy::unknown_parent),
        help(
            "Every parent must be a proper type declared in the same grammar. \
             Leaf types cannot themselves be parents."
        )
    )]
    UnknownParent { child: String, parent: String },

    #[error("duplicate type name `{name}`")]
    #[diagnostic(
        code(heka::hierarchy::duplicate_type),
        help("Type names must be unique across proper and leaf types.")
    )]
    DuplicateType { name: String },

    #[error("leaf type `{name}` declares {count} parents")]
    #[diagnostic(
        code(heka::hierarchy::leaf_parent_count),
        help(
            "A leaf type is attached to exactly one immediate parent. \
             Declare it as a proper type if it needs multiple supertypes."
        )
    )]
    LeafParentCount { name: String, count: usize },

    #[error("hierarchy export failed: {source}")]
    #[diagnostic(
        code(heka::hierarchy::export_io),
        help("Check that the export destination is writable and the disk is not full.")
    )]
    ExportIo {
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Grammar errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum GrammarError {
    #[error("cannot read grammar resource `{path}`: {source}")]
    #[diagnostic(
        code(heka::grammar::load),
        help(
            "The grammar resource is missing or unreadable. Verify the path \
             and retry initialization with a corrected one."
        )
    )]
    Load {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed grammar resource `{path}`: {message}")]
    #[diagnostic(
        code(heka::grammar::malformed),
        help(
            "The grammar resource did not parse as a valid grammar description. \
             The message points at the offending section."
        )
    )]
    Malformed { path: String, message: String },
}

// ---------------------------------------------------------------------------
// Parse session errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ParseError {
    #[error("parser is not ready (state: {state})")]
    #[diagnostic(
        code(heka::parse::not_ready),
        help(
            "Parsing requires an initialized session. Call `init` with a grammar \
             first; after `exit` the session cannot be reused."
        )
    )]
    NotReady { state: &'static str },

    #[error("invalid argument: {message}")]
    #[diagnostic(
        code(heka::parse::invalid_argument),
        help("The caller violated the operation's contract; see the message.")
    )]
    InvalidArgument { message: String },

    #[error("no lexical coverage for `{token}`")]
    #[diagnostic(
        code(heka::parse::no_coverage),
        help(
            "No lexicon stem or morphological derivation covers this token. \
             This is a per-item failure; the session remains usable."
        )
    )]
    NoLexicalCoverage { token: String },

    #[error("item exceeds edge limit of {limit}")]
    #[diagnostic(
        code(heka::parse::edge_limit),
        help(
            "The item was rejected before analysis to bound resource use. \
             Raise the `edge-limit` option if larger items are expected."
        )
    )]
    EdgeLimitExceeded { limit: usize },

    #[error("profiling stream write failed: {source}")]
    #[diagnostic(
        code(heka::parse::profile_io),
        help("Check that the profiling record destinations are writable.")
    )]
    ProfileIo {
        #[source]
        source: std::io::Error,
    },

    #[error("log destination `{path}` cannot be opened: {source}")]
    #[diagnostic(
        code(heka::parse::log_open),
        help("The session log path must be creatable and writable.")
    )]
    LogOpen {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("invalid option name `{name}`")]
    #[diagnostic(
        code(heka::config::invalid_option_name),
        help("Option names match [a-z][a-z0-9_-]*: lowercase, starting with a letter.")
    )]
    InvalidOptionName { name: String },

    #[error("option `{name}` set twice")]
    #[diagnostic(
        code(heka::config::duplicate_option),
        help("Each named option may be set at most once per session configuration.")
    )]
    DuplicateOption { name: String },

    #[error("unknown option `{name}`")]
    #[diagnostic(
        code(heka::config::unknown_option),
        help("Unknown options are rejected rather than silently carried.")
    )]
    UnknownOption { name: String },

    #[error("option `{name}` has invalid value `{value}`: {message}")]
    #[diagnostic(
        code(heka::config::invalid_option_value),
        help("Numeric options must parse as positive integers.")
    )]
    InvalidOptionValue {
        name: String,
        value: String,
        message: String,
    },
}

// ---------------------------------------------------------------------------
// Server errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ServerError {
    #[error("unable to bind server port {port}: {source}")]
    #[diagnostic(
        code(heka::server::bind),
        help(
            "The port is unavailable or privileged. Pass port 0 to bind an \
             ephemeral port; the bound port is returned from `initialize`."
        )
    )]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("protocol error: {message}")]
    #[diagnostic(
        code(heka::server::protocol),
        help(
            "Requests are newline-terminated JSON objects with an `op` tag. \
             Protocol errors are reported to the peer; the connection survives."
        )
    )]
    Protocol { message: String },
}

/// Convenience alias for functions returning heka results.
pub type HekaResult<T> = std::result::Result<T, HekaError>;
