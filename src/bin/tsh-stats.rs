//! Protocol statistics of TSH traces, printed as JSON
//!
//! Built with the `cli` feature: `cargo run --features cli --bin tsh-stats -- trace.tsh`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, LevelFilter};
use tsh_analyzer::*;

#[derive(Parser, Debug)]
#[command(author, version, about = "Protocol statistics for TSH packet traces", long_about = None)]
struct Args {
    /// Trace files to process
    #[arg(required = true)]
    traces: Vec<PathBuf>,

    /// Link capacity, in bits per second
    #[arg(short, long, default_value_t = DEFAULT_LINK_CAPACITY)]
    link_capacity: u64,

    /// Write a text dump of the TCP records (only with a single trace)
    #[arg(short, long)]
    dump: Option<PathBuf>,

    /// Build per-flow segment indices
    #[arg(short, long)]
    flows: bool,

    /// Protocol number table (`<number> <name>` lines), instead of the bundled IANA table
    #[arg(short, long)]
    protocols: Option<PathBuf>,

    /// Only count records, do not process them
    #[arg(short = 'n', long)]
    count: bool,

    /// More diagnostics (-v: debug, -vv: trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only report errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

fn main() {
    let args = Args::parse();
    let level = match (args.quiet, args.verbose) {
        (true, _) => LevelFilter::Error,
        (false, 0) => LevelFilter::Warn,
        (false, 1) => LevelFilter::Debug,
        (false, _) => LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    if let Err(e) = run(&args) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    if args.dump.is_some() && args.traces.len() > 1 {
        anyhow::bail!("--dump requires a single trace");
    }
    if args.count {
        for trace in &args.traces {
            let records =
                records_in(trace).with_context(|| format!("{}", trace.display()))?;
            println!("{}\t{}", trace.display(), records);
        }
        return Ok(());
    }

    let protocols = match &args.protocols {
        Some(path) => ProtocolTable::from_path(path)
            .with_context(|| format!("loading protocol table {}", path.display()))?,
        None => ProtocolTable::iana().context("loading bundled protocol table")?,
    };
    info!("{} protocol names", protocols.len());
    let processor = TraceProcessor::new(protocols);

    let mut options = TraceOptions::default()
        .with_link_capacity(args.link_capacity)
        .with_flow_extraction(args.flows);
    if let Some(dump) = &args.dump {
        options = options.with_dump(dump);
    }

    for trace in &args.traces {
        info!("Processing {}", trace.display());
        let outcome = processor
            .process_trace(trace, &options)
            .with_context(|| format!("processing {}", trace.display()))?;
        let summary = outcome.summary();
        println!("{}", serde_json::to_string_pretty(summary)?);
        if let Some(flows) = outcome.flows() {
            info!(
                "{}: {} flows, {} segments, {:?}",
                trace.display(),
                flows.senders.flow_count(),
                flows.segments.len(),
                summary.unidirectional
            );
        }
        if let Some(utilization) = summary.utilization() {
            info!(
                "{}: mean utilization {:.2}%",
                trace.display(),
                utilization * 100.0
            );
        }
    }
    Ok(())
}
