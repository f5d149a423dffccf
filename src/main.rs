//! heka CLI: unification-grammar parsing service.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use heka::config::{Options, SegregationMode, SessionConfig};
use heka::hierarchy::export;
use heka::parser::GrammarParser;
use heka::profile::{ProfileWriter, RoleTable};
use heka::server::ParsingServer;
use heka::Grammar;

#[derive(Parser)]
#[command(name = "heka", version, about = "Unification-grammar parsing service")]
struct Cli {
    /// Grammar resource to load.
    #[arg(long, global = true, default_value = "grammar.toml")]
    grammar: PathBuf,

    /// Session log file.
    #[arg(long, global = true, default_value = "heka.log")]
    log: PathBuf,

    /// Input-segregation mode: default, off, or on.
    #[arg(long, global = true, default_value = "default")]
    segregation: String,

    /// Session option override, `name=value`. Repeatable.
    #[arg(long = "option", global = true)]
    options: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse one input item and print its readings as JSON.
    Parse {
        /// The input item.
        text: String,

        /// Readings to skip from the front of the ranked list.
        #[arg(long, default_value = "0")]
        nskip: i64,
    },

    /// Print the derivation chains of one word form.
    Morph {
        /// The surface form.
        form: String,
    },

    /// Report whether the input is punctuation only.
    Punct {
        /// The input item.
        text: String,
    },

    /// Render the type hierarchy as a VCG graph.
    ExportHierarchy {
        /// Include leaf types in the rendering.
        #[arg(long = "leaf-types")]
        leaf_types: bool,

        /// Write to a file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Serve parse requests over TCP.
    Serve {
        /// Port to listen on; 0 picks a free port.
        #[arg(long, default_value = "4711")]
        port: u16,

        /// Base path for the profiling streams; `.parse`, `.result` and
        /// `.item` files are created next to it.
        #[arg(long, default_value = "profile")]
        profile: PathBuf,

        /// Comma-separated grammatical roles annotated into item records.
        #[arg(long)]
        roles: Option<String>,
    },
}

fn session_config(cli: &Cli) -> Result<SessionConfig> {
    let mut config = SessionConfig::new(&cli.grammar, &cli.log);
    config.segregation = match cli.segregation.as_str() {
        "default" => SegregationMode::Default,
        "off" => SegregationMode::Off,
        "on" => SegregationMode::On,
        other => miette::bail!("unknown segregation mode `{other}`"),
    };
    let mut options = Options::new();
    for raw in &cli.options {
        let (name, value) = raw
            .split_once('=')
            .ok_or_else(|| miette::miette!("option `{raw}` is not `name=value`"))?;
        options.set(name, value)?;
    }
    config.options = options;
    Ok(config)
}

fn ready_parser(cli: &Cli) -> Result<GrammarParser> {
    let parser = GrammarParser::new();
    parser.init(session_config(cli)?)?;
    Ok(parser)
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Parse { text, nskip } => {
            if *nskip < 0 {
                miette::bail!("nskip must be non-negative, got {nskip}");
            }
            let parser = ready_parser(&cli)?;
            let encoded = parser.parse(text, *nskip as usize)?;
            println!("{encoded}");
            parser.exit();
        }

        Commands::Morph { form } => {
            let parser = ready_parser(&cli)?;
            print!("{}", parser.morph_analyse_flat(form)?);
            parser.exit();
        }

        Commands::Punct { text } => {
            let parser = ready_parser(&cli)?;
            println!("{}", parser.is_punctuation_only(text)?);
            parser.exit();
        }

        Commands::ExportHierarchy { leaf_types, output } => {
            // No session needed; the rendering is a pure grammar view.
            let grammar = Grammar::load(&cli.grammar)?;
            match output {
                Some(path) => {
                    let mut file = File::create(path).into_diagnostic()?;
                    export::export_graph(grammar.hierarchy(), &mut file, *leaf_types)
                        .map_err(heka::HekaError::from)?;
                }
                None => {
                    let rendered =
                        export::export_graph_string(grammar.hierarchy(), *leaf_types)
                            .map_err(heka::HekaError::from)?;
                    print!("{rendered}");
                }
            }
        }

        Commands::Serve {
            port,
            profile,
            roles,
        } => {
            let parser = Arc::new(ready_parser(&cli)?);
            let open = |extension: &str| {
                File::options()
                    .create(true)
                    .append(true)
                    .open(profile.with_extension(extension))
                    .into_diagnostic()
            };
            let role_table = match roles {
                Some(raw) => RoleTable::new(raw.split(',').map(str::trim)),
                None => RoleTable::default(),
            };
            let (profile_tx, writer) = ProfileWriter::spawn(
                open("parse")?,
                open("result")?,
                open("item")?,
                role_table,
            );
            let server = ParsingServer::new(parser, profile_tx);
            let (listener, bound) = server.initialize(*port)?;
            println!("listening on port {bound}");
            server.run(listener)?;
            // Handlers hold clones of the sender through the server; once it
            // is dropped the writer drains and stops.
            drop(server);
            let _ = writer.join();
        }
    }

    Ok(())
}
