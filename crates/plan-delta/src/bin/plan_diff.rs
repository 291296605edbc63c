//! `plan-diff` — compute the structural delta between two JSON documents.
//!
//! Usage:
//!   plan-diff '<target-json>'
//!
//! The source document is read from stdin. The target document is the first
//! argument. The delta is printed as JSON (`null` when the documents are
//! equal).

use std::io::{self, Read, Write};

use plan_delta::diff;

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let target = match args.get(1) {
        Some(t) => t.clone(),
        None => {
            eprintln!("First argument must be the target JSON document.");
            std::process::exit(1);
        }
    };

    let mut buf = String::new();
    if let Err(e) = io::stdin().read_to_string(&mut buf) {
        eprintln!("{e}");
        std::process::exit(1);
    }

    let from: serde_json::Value = match serde_json::from_str(buf.trim()) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("invalid source document: {e}");
            std::process::exit(1);
        }
    };
    let to: serde_json::Value = match serde_json::from_str(&target) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("invalid target document: {e}");
            std::process::exit(1);
        }
    };

    let delta = diff(&from, &to);
    let out = serde_json::to_string_pretty(&delta).expect("delta serializes");
    io::stdout().write_all(out.as_bytes()).unwrap();
    io::stdout().write_all(b"\n").unwrap();
}
