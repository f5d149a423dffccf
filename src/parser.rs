//! The parse session: lifecycle, per-item processing, and profiling capture.
//!
//! A `GrammarParser` moves through three states. It starts uninitialized,
//! `init` loads a grammar and opens the session log, and `exit` closes the
//! session. Every analytical operation requires the ready state and reports
//! the actual state otherwise. All operations take `&self`; the parser is
//! shared behind an `Arc` across connection handler threads.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use tracing::{debug, info};

use crate::analysis::{self, ParseLimits};
use crate::config::{SegregationMode, SessionConfig};
use crate::error::{HekaResult, ParseError};
use crate::grammar::Grammar;
use crate::hierarchy::export;
use crate::morph::{MorphAnalysis, MorphAnalyzer};
use crate::profile::{self, ProfilingRecord, RecordSet, RoleTable};

enum SessionState {
    Uninitialized,
    Ready(Session),
    Closed,
}

impl SessionState {
    fn name(&self) -> &'static str {
        match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Ready(_) => "ready",
            SessionState::Closed => "closed",
        }
    }
}

struct Session {
    grammar: Arc<Grammar>,
    limits: ParseLimits,
    segregation: bool,
    log: Mutex<BufWriter<File>>,
    pending: Mutex<Vec<ProfilingRecord>>,
    next_item: AtomicU64,
}

impl Session {
    fn log_line(&self, message: &str) {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        // Log writes are best-effort; a full disk must not fail the item.
        let _ = writeln!(log, "[{stamp}] {message}");
        let _ = log.flush();
    }
}

/// The stateful parse engine behind the service.
pub struct GrammarParser {
    state: RwLock<SessionState>,
}

impl Default for GrammarParser {
    fn default() -> Self {
        Self::new()
    }
}

impl GrammarParser {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(SessionState::Uninitialized),
        }
    }

    /// Load the grammar and open the session, moving to the ready state.
    /// Fails if the session is already open.
    pub fn init(&self, config: SessionConfig) -> HekaResult<()> {
        config.options.validate()?;
        let defaults = ParseLimits::default();
        let limits = ParseLimits {
            edge_limit: config.options.get_usize("edge-limit", defaults.edge_limit)?,
            max_readings: config
                .options
                .get_usize("max-readings", defaults.max_readings)?,
        };
        let max_chain = config
            .options
            .get_usize("morph-max-chain", MorphAnalyzer::DEFAULT_MAX_CHAIN)?;

        let grammar = Grammar::load_with_max_chain(&config.grammar_path, max_chain)?;
        let segregation = match config.segregation {
            SegregationMode::Default => grammar.segregation_default(),
            SegregationMode::Off => false,
            SegregationMode::On => true,
        };

        let log_file = File::options()
            .create(true)
            .append(true)
            .open(&config.log_path)
            .map_err(|source| ParseError::LogOpen {
                path: config.log_path.display().to_string(),
                source,
            })?;

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if !matches!(*state, SessionState::Uninitialized) {
            return Err(ParseError::InvalidArgument {
                message: format!("cannot initialize from state `{}`", state.name()),
            }
            .into());
        }

        let session = Session {
            grammar: Arc::new(grammar),
            limits,
            segregation,
            log: Mutex::new(BufWriter::new(log_file)),
            pending: Mutex::new(Vec::new()),
            next_item: AtomicU64::new(1),
        };
        session.log_line(&format!(
            "session opened: grammar `{}` version `{}`",
            session.grammar.name(),
            session.grammar.version()
        ));
        info!(
            grammar = session.grammar.name(),
            segregation, "parse session ready"
        );
        *state = SessionState::Ready(session);
        Ok(())
    }

    fn with_session<T>(
        &self,
        f: impl FnOnce(&Session) -> HekaResult<T>,
    ) -> HekaResult<T> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        match &*state {
            SessionState::Ready(session) => f(session),
            other => Err(ParseError::NotReady {
                state: other.name(),
            }
            .into()),
        }
    }

    /// True while a session is open.
    pub fn is_ready(&self) -> bool {
        matches!(
            &*self.state.read().unwrap_or_else(PoisonError::into_inner),
            SessionState::Ready(_)
        )
    }

    /// Parse one item, assigning it the next session-local item id.
    pub fn parse(&self, input: &str, nskip: usize) -> HekaResult<String> {
        self.with_session(|session| {
            let item_id = session.next_item.fetch_add(1, Ordering::Relaxed);
            self.parse_in(session, item_id, input, nskip)
        })
    }

    /// Parse one item under a caller-chosen id (profiled corpora carry
    /// their own item numbering).
    pub fn parse_with_id(&self, item_id: u64, input: &str, nskip: usize) -> HekaResult<String> {
        self.with_session(|session| self.parse_in(session, item_id, input, nskip))
    }

    fn parse_in(
        &self,
        session: &Session,
        item_id: u64,
        input: &str,
        nskip: usize,
    ) -> HekaResult<String> {
        let started = Instant::now();
        let effective = if session.segregation {
            segregate(&session.grammar, input)
        } else {
            input.to_string()
        };

        // Punctuation-only items carry no linguistic content; they succeed
        // with zero readings rather than failing lexical coverage.
        let outcome = if session.grammar.punctuationp(&effective) {
            Ok(Vec::new())
        } else {
            analysis::analyze_item(&session.grammar, &effective, &session.limits)
        };
        let time_ms = started.elapsed().as_millis() as u64;
        let words = effective.split_whitespace().count();

        let record = ProfilingRecord {
            item_id,
            input: input.to_string(),
            words,
            readings: outcome.as_ref().map(Vec::len).unwrap_or(0),
            time_ms,
            error: outcome.as_ref().err().map(|e| e.to_string()),
        };
        session
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);

        match outcome {
            Ok(readings) => {
                session.log_line(&format!(
                    "item {item_id}: {} reading(s) in {time_ms} ms",
                    readings.len()
                ));
                debug!(item_id, readings = readings.len(), time_ms, "item parsed");
                Ok(analysis::encode_readings(&readings, nskip)?)
            }
            Err(e) => {
                session.log_line(&format!("item {item_id}: failed: {e}"));
                Err(e.into())
            }
        }
    }

    /// Derivation chains for a single word form.
    pub fn morph_analyse(&self, form: &str) -> HekaResult<Vec<MorphAnalysis>> {
        self.with_session(|session| Ok(session.grammar.morph().analyze(form)))
    }

    /// Flattened morphology rendering, one line per chain.
    pub fn morph_analyse_flat(&self, form: &str) -> HekaResult<String> {
        self.with_session(|session| Ok(session.grammar.morph().analyze_flat(form)))
    }

    /// Does the input consist of punctuation only?
    pub fn is_punctuation_only(&self, input: &str) -> HekaResult<bool> {
        self.with_session(|session| Ok(session.grammar.punctuationp(input)))
    }

    /// VCG rendering of the loaded type hierarchy.
    pub fn export_hierarchy(&self, include_leaf_types: bool) -> HekaResult<String> {
        self.with_session(|session| {
            Ok(export::export_graph_string(
                session.grammar.hierarchy(),
                include_leaf_types,
            )?)
        })
    }

    /// Take every profiling record accumulated since the last drain.
    pub fn drain_pending(&self) -> HekaResult<RecordSet> {
        self.with_session(|session| {
            Ok(std::mem::take(
                &mut *session
                    .pending
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner),
            ))
        })
    }

    /// Flush pending profiling records as one correlated record set across
    /// the three streams, annotated from the role table. Never touches parse
    /// results.
    pub fn write_profiling_records<P: Write, R: Write, I: Write>(
        &self,
        parse_out: &mut P,
        result_out: &mut R,
        item_out: &mut I,
        roles: &RoleTable,
    ) -> HekaResult<usize> {
        let set = self.drain_pending()?;
        profile::write_record_set(parse_out, result_out, item_out, roles, &set)?;
        Ok(set.len())
    }

    /// Close the session. Idempotent; a second call is a no-op.
    pub fn exit(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if let SessionState::Ready(session) = &*state {
            session.log_line("session closed");
            info!("parse session closed");
            *state = SessionState::Closed;
        }
    }
}

/// Replace punctuation characters with spaces so the words around them
/// tokenize cleanly and the punctuation itself leaves the item.
fn segregate(grammar: &Grammar, input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if grammar.punctuationp(&c.to_string()) {
            out.push(' ');
        } else {
            out.push(c);
        }
    }
    out
}
