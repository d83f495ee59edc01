//! Counts key occurrences in a delimited text file and prints the top-N keys.
//!
//! Usage: cargo run --example top_keys --release -- -f data.csv -c 8 -n 10

use std::fs::File;
use std::io::BufReader;
use std::process::exit;
use std::time::Instant;

use clap::Parser;
use log::LevelFilter;
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

use tally_pipeline::{DelimitedReader, MalformedPolicy, PipelineBuilder};

#[derive(Parser, Debug)]
#[command(version, about = "Report the most frequent keys in a delimited text file")]
struct Args {
    /// Source file
    #[arg(short = 'f')]
    file: String,

    /// Number of parallel workers
    #[arg(short = 'c', default_value_t = 4)]
    workers: usize,

    /// Records per batch
    #[arg(short = 'b', default_value_t = 500)]
    batch_size: usize,

    /// Zero-based key column
    #[arg(short = 'k', default_value_t = 1)]
    column: usize,

    /// How many keys to report
    #[arg(short = 'n', default_value_t = 10)]
    top: usize,

    /// Field delimiter
    #[arg(short = 'd', default_value_t = ',')]
    delimiter: char,

    /// Abort on records missing the key column instead of skipping them
    #[arg(long)]
    fail_fast: bool,

    /// Verbose logging
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    TermLogger::init(level, Config::default(), TerminalMode::Stderr, ColorChoice::Auto)
        .expect("logger init failed");

    let file = File::open(&args.file).unwrap_or_else(|e| {
        eprintln!("can't open {}: {}", args.file, e);
        exit(1);
    });

    let policy = if args.fail_fast {
        MalformedPolicy::FailFast
    } else {
        MalformedPolicy::Skip
    };

    let pipeline = PipelineBuilder::new()
        .workers(args.workers)
        .batch_size(args.batch_size)
        .key_column(args.column)
        .top_n(args.top)
        .malformed_policy(policy)
        .build()
        .unwrap_or_else(|e| {
            eprintln!("{}", e);
            exit(1);
        });
    let metrics = pipeline.metrics();

    let source = DelimitedReader::with_delimiter(BufReader::new(file), args.delimiter as u8);

    let start = Instant::now();
    match pipeline.run(source) {
        Ok(entries) => {
            for entry in &entries {
                println!("{} {}", entry.key, entry.count);
            }
            log::debug!("{}", metrics.snapshot().format());
            eprintln!("{:.2}s", start.elapsed().as_secs_f64());
        }
        Err(e) => {
            eprintln!("{}", e);
            exit(1);
        }
    }
}
