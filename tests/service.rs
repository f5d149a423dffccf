//! End-to-end service tests: session lifecycle, the TCP protocol, per-item
//! error recovery, and profiling record flow under concurrent clients.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use heka::config::SessionConfig;
use heka::parser::GrammarParser;
use heka::profile::{write_record_set, RecordSet, RoleTable};
use heka::server::ParsingServer;

const TOY_GRAMMAR: &str = r#"
[grammar]
name = "toy-english"
punctuation = "…"

[[types]]
name = "top"

[[types]]
name = "verb"
parents = ["top"]

[[types]]
name = "noun"
parents = ["top"]

[[types]]
name = "sing_le"
parents = ["verb"]
leaf = true

[[types]]
name = "dog_le"
parents = ["noun"]
leaf = true

[[morph.rules]]
name = "plur_noun_infl_rule"
add = "s"

[[morph.rules]]
name = "prp_verb_infl_rule"
add = "ing"

[[lexicon]]
stem = "sing"
kind = "sing_le"

[[lexicon]]
stem = "singing"
kind = "noun"

[[lexicon]]
stem = "dog"
kind = "dog_le"
"#;

struct Service {
    port: u16,
    records: mpsc::Receiver<RecordSet>,
    thread: std::thread::JoinHandle<()>,
    _dir: tempfile::TempDir,
}

fn start_service() -> Service {
    let dir = tempfile::tempdir().unwrap();
    let grammar_path = dir.path().join("toy.toml");
    std::fs::write(&grammar_path, TOY_GRAMMAR).unwrap();

    let parser = Arc::new(GrammarParser::new());
    parser
        .init(SessionConfig::new(grammar_path, dir.path().join("session.log")))
        .unwrap();

    let (tx, rx) = mpsc::channel();
    let server = ParsingServer::new(parser, tx);
    let (listener, port) = server.initialize(0).unwrap();
    let thread = std::thread::spawn(move || server.run(listener).unwrap());

    Service {
        port,
        records: rx,
        thread,
        _dir: dir,
    }
}

struct Client {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Client {
    fn connect(port: u16) -> Self {
        let stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        Self {
            reader: BufReader::new(stream.try_clone().unwrap()),
            writer: stream,
        }
    }

    fn round_trip(&mut self, request: &str) -> serde_json::Value {
        writeln!(self.writer, "{request}").unwrap();
        self.writer.flush().unwrap();
        let mut line = String::new();
        self.reader.read_line(&mut line).unwrap();
        serde_json::from_str(&line).unwrap()
    }
}

fn shut_down(service: Service) {
    let mut client = Client::connect(service.port);
    let response = client.round_trip(r#"{"op":"shutdown"}"#);
    assert_eq!(response["status"], "shutting_down");
    service.thread.join().unwrap();
}

#[test]
fn parse_morph_and_punct_over_one_connection() {
    let service = start_service();
    let mut client = Client::connect(service.port);

    let response = client.round_trip(r#"{"op":"parse","text":"singings"}"#);
    assert_eq!(response["status"], "readings");
    let encoding = response["encoding"].as_str().unwrap();
    let readings: serde_json::Value = serde_json::from_str(encoding).unwrap();
    assert_eq!(readings.as_array().unwrap().len(), 2);
    assert_eq!(readings[1]["tokens"][0]["stem"], "sing");
    assert_eq!(readings[1]["tokens"][0]["rules"][0], "prp_verb_infl_rule");
    assert_eq!(readings[1]["tokens"][0]["rules"][1], "plur_noun_infl_rule");

    let response = client.round_trip(r#"{"op":"parse","text":"singings","nskip":99}"#);
    assert_eq!(response["encoding"], "[]");

    let response = client.round_trip(r#"{"op":"morph","form":"dogs"}"#);
    assert_eq!(response["status"], "morph");
    assert_eq!(response["analyses"][0]["forms"][0], "dog");
    assert_eq!(response["analyses"][0]["rules"][0], "plur_noun_infl_rule");

    let response = client.round_trip(r#"{"op":"punct","text":"?!…"}"#);
    assert_eq!(response["punctuation_only"], true);
    let response = client.round_trip(r#"{"op":"punct","text":"dog."}"#);
    assert_eq!(response["punctuation_only"], false);

    drop(client);
    shut_down(service);
}

#[test]
fn item_failures_do_not_end_the_connection() {
    let service = start_service();
    let mut client = Client::connect(service.port);

    let response = client.round_trip(r#"{"op":"parse","text":"xylophone"}"#);
    assert_eq!(response["status"], "error");
    assert!(response["message"]
        .as_str()
        .unwrap()
        .contains("xylophone"));

    let response = client.round_trip(r#"{"op":"parse","text":"dog","nskip":-1}"#);
    assert_eq!(response["status"], "error");
    assert!(response["message"]
        .as_str()
        .unwrap()
        .starts_with("invalid argument"));

    let response = client.round_trip("not json at all");
    assert_eq!(response["status"], "error");

    // A bare newline is a malformed request of its own, answered in place.
    let response = client.round_trip("");
    assert_eq!(response["status"], "error");
    assert!(response["message"]
        .as_str()
        .unwrap()
        .contains("empty request line"));

    // A hugely ambiguous item is rejected, not enumerated.
    let blowup = ["singings"; 12].join(" ");
    let response =
        client.round_trip(&format!(r#"{{"op":"parse","text":"{blowup}"}}"#));
    assert_eq!(response["status"], "error");
    assert!(response["message"].as_str().unwrap().contains("edge limit"));

    let response = client.round_trip(r#"{"op":"parse","text":"dog"}"#);
    assert_eq!(response["status"], "readings");

    drop(client);
    shut_down(service);
}

#[test]
fn shutdown_waits_for_open_connections() {
    let service = start_service();

    // A client mid-session when another requests shutdown keeps being
    // served, and its records still reach the profiling writer.
    let mut lingering = Client::connect(service.port);
    let response = lingering.round_trip(r#"{"op":"parse","text":"dog"}"#);
    assert_eq!(response["status"], "readings");

    let mut closer = Client::connect(service.port);
    let response = closer.round_trip(r#"{"op":"shutdown"}"#);
    assert_eq!(response["status"], "shutting_down");
    drop(closer);

    let response = lingering.round_trip(r#"{"op":"parse","text":"dogs"}"#);
    assert_eq!(response["status"], "readings");
    drop(lingering);

    service.thread.join().unwrap();

    let mut seen = 0;
    while seen < 2 {
        let set = service
            .records
            .recv_timeout(Duration::from_secs(5))
            .unwrap();
        seen += set.len();
    }
    assert_eq!(seen, 2);
}

#[test]
fn concurrent_connections_produce_clean_record_sets() {
    let service = start_service();
    let port = service.port;

    let mut workers = Vec::new();
    for (item_id, text) in [(101u64, "singings"), (202u64, "dogs")] {
        workers.push(std::thread::spawn(move || {
            let mut client = Client::connect(port);
            let request = format!(
                r#"{{"op":"parse","text":"{text}","item_id":{item_id}}}"#
            );
            let response = client.round_trip(&request);
            assert_eq!(response["status"], "readings");
        }));
    }
    for worker in workers {
        worker.join().unwrap();
    }

    // Each connection flushes its drained records as one set; collect until
    // both items have arrived.
    let mut sets: Vec<RecordSet> = Vec::new();
    let mut seen = 0;
    while seen < 2 {
        let set = service
            .records
            .recv_timeout(Duration::from_secs(5))
            .unwrap();
        seen += set.len();
        sets.push(set);
    }

    let (mut parse, mut result, mut item) = (Vec::new(), Vec::new(), Vec::new());
    for set in &sets {
        write_record_set(&mut parse, &mut result, &mut item, &RoleTable::default(), set)
            .unwrap();
    }
    let item = String::from_utf8(item).unwrap();
    assert_eq!(item.matches("item:").count(), sets.len());
    assert_eq!(item.matches("101@singings@").count(), 1);
    assert_eq!(item.matches("202@dogs@").count(), 1);
    let result = String::from_utf8(result).unwrap();
    assert!(result.contains("101@2@"));
    assert!(result.contains("202@1@"));

    shut_down(service);
}

#[test]
fn lifecycle_gates_every_operation() {
    let parser = GrammarParser::new();
    assert!(parser.parse("dog", 0).is_err());
    assert!(parser.morph_analyse("dog").is_err());
    assert!(parser.is_punctuation_only("?").is_err());

    let dir = tempfile::tempdir().unwrap();
    let grammar_path = dir.path().join("toy.toml");
    std::fs::write(&grammar_path, TOY_GRAMMAR).unwrap();
    parser
        .init(SessionConfig::new(grammar_path, dir.path().join("session.log")))
        .unwrap();
    assert!(parser.parse("dog", 0).is_ok());

    parser.exit();
    parser.exit();
    assert!(parser.parse("dog", 0).is_err());
}
