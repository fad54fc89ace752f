//! Shorts Skipper CLI
//!
//! CLI tool for checking like-count parsing and skip decisions, and for
//! replaying feed scenarios through the monitor.

mod scenario;

use std::path::Path;

use clap::{Parser, Subcommand};
use log::info;
use tracing_subscriber::filter::LevelFilter;

use ss_core::{parse_abbreviated, ItemId, MonitorConfig, SkipPolicy};

use crate::scenario::{load_config, load_scenario, replay};

#[derive(Parser)]
#[command(name = "ss-cli")]
#[command(about = "Shorts Skipper decision engine tools")]
struct Cli {
    /// Log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse abbreviated like counts ("1.2K", "3M", "12,345")
    Parse {
        /// Count texts to parse
        #[arg(required = true)]
        text: Vec<String>,
    },

    /// Decide whether an item with the given like count is skipped
    Decide {
        /// Like count text
        count: String,

        /// Skip threshold
        #[arg(short, long, default_value_t = ss_core::config::DEFAULT_THRESHOLD)]
        threshold: u64,

        /// Skips already made in a row
        #[arg(short, long, default_value_t = 0)]
        consecutive: u32,

        /// Consecutive-skip cap
        #[arg(long, default_value_t = ss_core::config::MAX_CONSECUTIVE_SKIPS)]
        max_skips: u32,
    },

    /// Replay a feed scenario on a virtual clock
    Simulate {
        /// Scenario JSON file
        #[arg(short, long)]
        scenario: String,

        /// Monitor config JSON file (partial configs fill in defaults)
        #[arg(short, long)]
        config: Option<String>,

        /// Print the replay as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Parse { text } => cmd_parse(&text),
        Commands::Decide {
            count,
            threshold,
            consecutive,
            max_skips,
        } => cmd_decide(&count, threshold, consecutive, max_skips),
        Commands::Simulate { scenario, config, json } => cmd_simulate(&scenario, config.as_deref(), json),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_parse(texts: &[String]) -> Result<(), String> {
    let mut failed = 0usize;
    for text in texts {
        match parse_abbreviated(text) {
            Ok(value) => println!("{:>16}  {}", value, text),
            Err(e) => {
                failed += 1;
                println!("{:>16}  {} ({})", "-", text, e);
            }
        }
    }

    if failed > 0 {
        return Err(format!("{} of {} texts did not parse", failed, texts.len()));
    }
    Ok(())
}

fn cmd_decide(count: &str, threshold: u64, consecutive: u32, max_skips: u32) -> Result<(), String> {
    let value = parse_abbreviated(count).map_err(|e| format!("Bad count '{}': {}", count, e))?;
    let verdict = SkipPolicy::new(max_skips).decide(&ItemId::new("cli"), value, threshold, consecutive);

    println!("{}", verdict.decision);
    println!("  Count:       {}", value);
    println!("  Threshold:   {}", threshold);
    println!("  Skips:       {} -> {}", consecutive, verdict.consecutive_skips);
    if verdict.cap_tripped {
        println!("  Cap reached: kept after {} consecutive skips", max_skips);
    }
    Ok(())
}

fn cmd_simulate(scenario_path: &str, config_path: Option<&str>, json: bool) -> Result<(), String> {
    let scenario = load_scenario(Path::new(scenario_path)).map_err(|e| e.to_string())?;
    let config: MonitorConfig = match config_path {
        Some(path) => load_config(Path::new(path)).map_err(|e| e.to_string())?,
        None => MonitorConfig::default(),
    };
    info!(
        "Replaying '{}': {} items, threshold {}",
        scenario_path,
        scenario.feed.len(),
        scenario.threshold.unwrap_or(config.default_threshold)
    );

    let replay = replay(&scenario, config);

    if json {
        let out = serde_json::to_string_pretty(&replay)
            .map_err(|e| format!("Failed to serialize replay: {}", e))?;
        println!("{}", out);
        return Ok(());
    }

    println!("Replayed {} items from '{}'", scenario.feed.len(), scenario_path);
    for entry in &replay.evaluations {
        let evaluation = &entry.evaluation;
        println!(
            "  {:>8}ms  {:<4}  {:<16} {:>10} / {}{}",
            entry.at_ms,
            evaluation.verdict.decision,
            evaluation.item,
            evaluation.count,
            evaluation.threshold,
            if evaluation.verdict.cap_tripped { "  (cap)" } else { "" },
        );
    }
    println!("  Skips:    {}", replay.skips.len());
    println!("  Reports:  {:?}", replay.reports);
    println!("  Elapsed:  {}ms", replay.elapsed_ms);
    Ok(())
}
