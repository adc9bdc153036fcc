//! `bson-dump`: decode concatenated BSON documents (stdin) to JSON (stdout).
//!
//! Usage:
//!   bson-dump [--max-size <bytes>] [--compact]
//!
//! Each document is printed as relaxed extended JSON. Set `RUST_LOG=debug`
//! to trace buffer refills.

use std::io::{self, Read, Write};

use mongo_bson::{BsonReader, CodecOptions};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    let mut options = CodecOptions::default();
    let mut compact = false;
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--compact" => compact = true,
            "--max-size" => {
                i += 1;
                match args.get(i).map(|s| s.parse::<usize>()) {
                    Some(Ok(max)) => options.max_message_size = max,
                    _ => {
                        eprintln!("--max-size expects a byte count");
                        std::process::exit(2);
                    }
                }
            }
            other => {
                eprintln!("Unknown argument: {other}");
                std::process::exit(2);
            }
        }
        i += 1;
    }

    let mut buf = Vec::new();
    if let Err(e) = io::stdin().read_to_end(&mut buf) {
        eprintln!("{e}");
        std::process::exit(1);
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut offset = 0;
    while offset < buf.len() {
        let mut reader = BsonReader::with_options(&buf[offset..], options.clone());
        let document = match reader.read() {
            Ok(document) => document,
            Err(e) => {
                eprintln!("document at byte {offset}: {e}");
                std::process::exit(1);
            }
        };
        offset += reader.position();

        let json = document.to_relaxed_extjson();
        let rendered = if compact {
            serde_json::to_string(&json)
        } else {
            serde_json::to_string_pretty(&json)
        };
        match rendered {
            Ok(text) => {
                if writeln!(out, "{text}").is_err() {
                    std::process::exit(1);
                }
            }
            Err(e) => {
                eprintln!("{e}");
                std::process::exit(1);
            }
        }
    }
}
