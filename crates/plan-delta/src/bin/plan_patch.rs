//! `plan-patch` — apply a structural delta to a JSON document.
//!
//! Usage:
//!   plan-patch '<delta-json>'
//!
//! The document is read from stdin. The delta is the first argument, in the
//! format produced by `plan-diff` (`null` means no change).

use std::io::{self, Read, Write};

use plan_delta::{patch, Delta};

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let delta_arg = match args.get(1) {
        Some(d) => d.clone(),
        None => {
            eprintln!("First argument must be a delta JSON value.");
            std::process::exit(1);
        }
    };

    let mut buf = String::new();
    if let Err(e) = io::stdin().read_to_string(&mut buf) {
        eprintln!("{e}");
        std::process::exit(1);
    }

    let doc: serde_json::Value = match serde_json::from_str(buf.trim()) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("invalid document: {e}");
            std::process::exit(1);
        }
    };
    let delta: Option<Delta> = match serde_json::from_str(&delta_arg) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("invalid delta: {e}");
            std::process::exit(1);
        }
    };

    let out = patch(&doc, delta.as_ref());
    let text = serde_json::to_string_pretty(&out).expect("document serializes");
    io::stdout().write_all(text.as_bytes()).unwrap();
    io::stdout().write_all(b"\n").unwrap();
}
