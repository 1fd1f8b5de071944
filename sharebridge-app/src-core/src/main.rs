//! ShareBridge stdio host
//!
//! Reads newline-delimited JSON from stdin, one item per line:
//!
//! - a platform event descriptor, e.g. `{"action":"send","mimeType":"text/plain","textExtra":"hi"}`
//! - an activation token, `{"activation":"sharebridge://share?type=url&content=..."}`
//! - a share-extension attachment list, `{"attachments":[{"kind":"url","value":"https://..."}]}`
//!
//! Every envelope that reaches the mailbox is printed to stdout as JSON.

use std::path::PathBuf;

use clap::Parser;
use sharebridge_app_lib::RunOptions;

/// ShareBridge stdio host
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Data directory holding settings.json and the shared handoff store
    #[arg(long, env = "SHAREBRIDGE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Activation token the host was launched with
    #[arg(long)]
    activation: Option<String>,
}

fn main() {
    let args = Args::parse();
    let options = RunOptions {
        data_dir: args.data_dir,
        activation: args.activation,
    };

    if let Err(e) = sharebridge_app_lib::run(options) {
        eprintln!("sharebridge: {:#}", e);
        std::process::exit(1);
    }
}
