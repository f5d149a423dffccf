//! Profiling records: per-item processing measurements written to three
//! correlated append-only streams (parse, result, item records), joined by
//! item id and annotated from a role table. Record sets are funneled through
//! a single writer so concurrent sessions never interleave within a set.

use std::io::Write;
use std::sync::mpsc;
use std::thread::JoinHandle;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ParseError;

/// One item's processing measurements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilingRecord {
    pub item_id: u64,
    pub input: String,
    /// Whitespace-separated token count of the input.
    pub words: usize,
    /// Readings found; zero when the item errored.
    pub readings: usize,
    pub time_ms: u64,
    /// Human-readable failure, empty field when the item succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProfilingRecord {
    /// Processing statistics row for the parse stream.
    fn parse_row(&self) -> String {
        format!("{}@{}@{}", self.item_id, self.words, self.time_ms)
    }

    /// Outcome row for the result stream.
    fn result_row(&self) -> String {
        format!(
            "{}@{}@{}",
            self.item_id,
            self.readings,
            escape_field(self.error.as_deref().unwrap_or(""))
        )
    }

    /// Input row for the item stream, annotated with the role table.
    fn item_row(&self, roles: &RoleTable) -> String {
        format!(
            "{}@{}@{}",
            self.item_id,
            escape_field(&self.input),
            escape_field(&roles.render())
        )
    }
}

/// Literal `@` in string fields is written as `\s`, backslash as `\\`,
/// so rows stay splittable on the separator.
fn escape_field(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('@', "\\s")
}

/// Grammatical-role annotations joined into the item stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleTable {
    roles: Vec<String>,
}

impl RoleTable {
    pub fn new(roles: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    fn render(&self) -> String {
        self.roles.join("+")
    }
}

/// A batch of records from one session, flushed as a unit.
pub type RecordSet = Vec<ProfilingRecord>;

/// Write one session's records as a complete, uninterleaved record set: on
/// each stream a relation header line, one row per record, a terminating
/// blank line. The item id is the join key across the three streams.
pub fn write_record_set<P: Write, R: Write, I: Write>(
    parse_out: &mut P,
    result_out: &mut R,
    item_out: &mut I,
    roles: &RoleTable,
    records: &[ProfilingRecord],
) -> Result<(), ParseError> {
    let io = |source| ParseError::ProfileIo { source };

    writeln!(parse_out, "parse:").map_err(io)?;
    writeln!(result_out, "result:").map_err(io)?;
    writeln!(item_out, "item:").map_err(io)?;
    for record in records {
        writeln!(parse_out, "{}", record.parse_row()).map_err(io)?;
        writeln!(result_out, "{}", record.result_row()).map_err(io)?;
        writeln!(item_out, "{}", record.item_row(roles)).map_err(io)?;
    }
    writeln!(parse_out).map_err(io)?;
    writeln!(result_out).map_err(io)?;
    writeln!(item_out).map_err(io)
}

/// Single-consumer profiling sink.
///
/// Sessions send complete record sets over the channel; one writer thread
/// owns all three streams and serializes sets in arrival order. Dropping
/// every sender ends the thread, which returns the streams for inspection.
pub struct ProfileWriter;

impl ProfileWriter {
    pub fn spawn<P, R, I>(
        mut parse_out: P,
        mut result_out: R,
        mut item_out: I,
        roles: RoleTable,
    ) -> (mpsc::Sender<RecordSet>, JoinHandle<(P, R, I)>)
    where
        P: Write + Send + 'static,
        R: Write + Send + 'static,
        I: Write + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<RecordSet>();
        let handle = std::thread::spawn(move || {
            for set in rx {
                if let Err(e) =
                    write_record_set(&mut parse_out, &mut result_out, &mut item_out, &roles, &set)
                {
                    warn!(error = %e, "dropping profiling record set");
                }
            }
            (parse_out, result_out, item_out)
        });
        (tx, handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(item_id: u64, input: &str) -> ProfilingRecord {
        ProfilingRecord {
            item_id,
            input: input.into(),
            words: input.split_whitespace().count(),
            readings: 1,
            time_ms: 3,
            error: None,
        }
    }

    fn write_all(records: &[ProfilingRecord], roles: &RoleTable) -> (String, String, String) {
        let (mut p, mut r, mut i) = (Vec::new(), Vec::new(), Vec::new());
        write_record_set(&mut p, &mut r, &mut i, roles, records).unwrap();
        (
            String::from_utf8(p).unwrap(),
            String::from_utf8(r).unwrap(),
            String::from_utf8(i).unwrap(),
        )
    }

    #[test]
    fn streams_share_the_item_id_join_key() {
        let roles = RoleTable::new(["subj", "obj"]);
        let (parse, result, item) = write_all(&[record(7, "dog barks")], &roles);
        assert_eq!(parse, "parse:\n7@2@3\n\n");
        assert_eq!(result, "result:\n7@1@\n\n");
        assert_eq!(item, "item:\n7@dog barks@subj+obj\n\n");
    }

    #[test]
    fn failed_item_carries_error_in_result_stream() {
        let mut r = record(9, "xyz");
        r.readings = 0;
        r.error = Some("no lexical coverage for `xyz`".into());
        let (_, result, _) = write_all(&[r], &RoleTable::default());
        assert!(result.contains("9@0@no lexical coverage for `xyz`"));
    }

    #[test]
    fn separator_characters_escaped() {
        let rec = record(1, "who@where");
        let (_, _, item) = write_all(&[rec], &RoleTable::default());
        assert!(item.contains("1@who\\swhere@"));
    }

    #[test]
    fn record_sets_terminate_with_blank_line() {
        let (parse, result, item) =
            write_all(&[record(1, "a"), record(2, "b")], &RoleTable::default());
        for stream in [&parse, &result, &item] {
            assert!(stream.ends_with("\n\n"));
            assert_eq!(stream.lines().count(), 3);
        }
    }

    #[test]
    fn writer_thread_serializes_sets() {
        let (tx, handle) =
            ProfileWriter::spawn(Vec::new(), Vec::new(), Vec::new(), RoleTable::default());
        let tx2 = tx.clone();
        tx.send(vec![record(1, "a")]).unwrap();
        tx2.send(vec![record(2, "b")]).unwrap();
        drop(tx);
        drop(tx2);
        let (parse, _, item) = handle.join().unwrap();
        let parse = String::from_utf8(parse).unwrap();
        let item = String::from_utf8(item).unwrap();
        assert_eq!(parse.matches("parse:").count(), 2);
        assert!(item.contains("1@a@"));
        assert!(item.contains("2@b@"));
    }
}
