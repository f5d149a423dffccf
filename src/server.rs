//! Line-oriented TCP service over a shared parse session.
//!
//! Each connection is served on its own thread against the same
//! `GrammarParser`. The protocol is one JSON request per line, one JSON
//! response per line. A failing item produces an error response on that
//! connection and nothing else; the connection and its peers keep going.
//! Profiling records drained at connection end travel over a channel to the
//! single profiling writer, so record sets from concurrent connections never
//! interleave.

use std::io::{BufRead, BufReader, BufWriter, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{HekaResult, ParseError, ServerError};
use crate::morph::MorphAnalysis;
use crate::parser::GrammarParser;
use crate::profile::RecordSet;

fn default_nskip() -> i64 {
    0
}

/// One client request.
#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Parse {
        text: String,
        #[serde(default = "default_nskip")]
        nskip: i64,
        #[serde(default)]
        item_id: Option<u64>,
    },
    Morph {
        form: String,
    },
    Punct {
        text: String,
    },
    Shutdown,
}

/// One server response line.
#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Readings { encoding: String },
    Morph { analyses: Vec<MorphAnalysis> },
    Punct { punctuation_only: bool },
    ShuttingDown,
    Error { message: String },
}

/// The service: a shared parser, a profiling sink, and a shutdown latch.
#[derive(Clone)]
pub struct ParsingServer {
    parser: Arc<GrammarParser>,
    profile: mpsc::Sender<RecordSet>,
    shutdown: Arc<AtomicBool>,
}

impl ParsingServer {
    pub fn new(parser: Arc<GrammarParser>, profile: mpsc::Sender<RecordSet>) -> Self {
        Self {
            parser,
            profile,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Bind the listening socket. Port 0 asks the OS for a free port; the
    /// actually bound port is returned alongside the listener.
    pub fn initialize(&self, port: u16) -> HekaResult<(TcpListener, u16)> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .map_err(|source| ServerError::Bind { port, source })?;
        let bound = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { port, source })?
            .port();
        info!(port = bound, "listening");
        Ok((listener, bound))
    }

    /// Accept connections until a client requests shutdown, one handler
    /// thread per connection. Waits for in-flight handlers before closing
    /// the parse session, so every served item's profiling records reach
    /// the writer.
    pub fn run(&self, listener: TcpListener) -> HekaResult<()> {
        let local = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { port: 0, source })?;
        let mut handlers = Vec::new();
        for stream in listener.incoming() {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
            match stream {
                Ok(stream) => {
                    let server = self.clone();
                    handlers.push(std::thread::spawn(move || {
                        let peer = stream
                            .peer_addr()
                            .map(|a| a.to_string())
                            .unwrap_or_else(|_| "unknown".into());
                        let items = server.handle_connection(stream);
                        debug!(peer, items, "connection closed");
                        if server.shutdown.load(Ordering::SeqCst) {
                            // Wake the acceptor so the loop can observe the latch.
                            let _ = TcpStream::connect(local);
                        }
                    }));
                }
                Err(e) => warn!(error = %e, "accept failed"),
            }
        }
        for handler in handlers {
            let _ = handler.join();
        }
        self.parser.exit();
        info!("server stopped");
        Ok(())
    }

    /// Serve one connection to completion, returning the number of items
    /// processed. Item failures are reported to the client and recovered;
    /// only transport failures end the connection early.
    pub fn handle_connection(&self, stream: TcpStream) -> usize {
        let mut items = 0usize;
        let reader = match stream.try_clone() {
            Ok(s) => BufReader::new(s),
            Err(e) => {
                warn!(error = %e, "connection unusable");
                return 0;
            }
        };
        let mut writer = BufWriter::new(stream);

        for line in reader.lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    warn!(error = %e, "read failed, dropping connection");
                    break;
                }
            };
            // An empty line is itself a malformed request, answered and
            // recovered like any other.
            let response = if line.trim().is_empty() {
                Response::Error {
                    message: ServerError::Protocol {
                        message: "empty request line".into(),
                    }
                    .to_string(),
                }
            } else {
                match serde_json::from_str::<Request>(&line) {
                    Ok(request) => {
                        if matches!(request, Request::Parse { .. }) {
                            items += 1;
                        }
                        self.dispatch(request)
                    }
                    Err(e) => Response::Error {
                        message: ServerError::Protocol {
                            message: e.to_string(),
                        }
                        .to_string(),
                    },
                }
            };

            let stop = matches!(response, Response::ShuttingDown);
            if write_response(&mut writer, &response).is_err() {
                break;
            }
            if stop {
                self.shutdown.store(true, Ordering::SeqCst);
                break;
            }
        }

        match self.parser.drain_pending() {
            Ok(set) if set.is_empty() => {}
            Ok(set) => {
                let count = set.len();
                if self.profile.send(set).is_err() {
                    warn!(count, "profiling writer gone, records dropped");
                } else {
                    debug!(count, "profiling records flushed");
                }
            }
            Err(e) => warn!(error = %e, "profiling flush failed"),
        }
        items
    }

    fn dispatch(&self, request: Request) -> Response {
        match request {
            Request::Parse {
                text,
                nskip,
                item_id,
            } => {
                if nskip < 0 {
                    return Response::Error {
                        message: ParseError::InvalidArgument {
                            message: format!("nskip must be non-negative, got {nskip}"),
                        }
                        .to_string(),
                    };
                }
                let nskip = nskip as usize;
                let parsed = match item_id {
                    Some(id) => self.parser.parse_with_id(id, &text, nskip),
                    None => self.parser.parse(&text, nskip),
                };
                match parsed {
                    Ok(encoding) => Response::Readings { encoding },
                    Err(e) => Response::Error {
                        message: e.to_string(),
                    },
                }
            }
            Request::Morph { form } => match self.parser.morph_analyse(&form) {
                Ok(analyses) => Response::Morph { analyses },
                Err(e) => Response::Error {
                    message: e.to_string(),
                },
            },
            Request::Punct { text } => match self.parser.is_punctuation_only(&text) {
                Ok(punctuation_only) => Response::Punct { punctuation_only },
                Err(e) => Response::Error {
                    message: e.to_string(),
                },
            },
            Request::Shutdown => {
                info!("shutdown requested");
                Response::ShuttingDown
            }
        }
    }
}

fn write_response<W: Write>(out: &mut W, response: &Response) -> std::io::Result<()> {
    let encoded = serde_json::to_string(response).map_err(std::io::Error::other)?;
    writeln!(out, "{encoded}")?;
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_request_defaults() {
        let req: Request = serde_json::from_str(r#"{"op":"parse","text":"dog"}"#).unwrap();
        match req {
            Request::Parse {
                text,
                nskip,
                item_id,
            } => {
                assert_eq!(text, "dog");
                assert_eq!(nskip, 0);
                assert!(item_id.is_none());
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn responses_encode_one_line() {
        let encoded = serde_json::to_string(&Response::Punct {
            punctuation_only: true,
        })
        .unwrap();
        assert_eq!(encoded, r#"{"status":"punct","punctuation_only":true}"#);
        assert!(!encoded.contains('\n'));
    }

    #[test]
    fn unknown_op_is_a_decode_error() {
        assert!(serde_json::from_str::<Request>(r#"{"op":"reboot"}"#).is_err());
    }
}
