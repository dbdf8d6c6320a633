use std::path::PathBuf;

use clap::Parser;

/// Simulated cell-balancing session for a multi-cell charger
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to TOML config (default: ./balancer.toml when present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Number of series cells (overrides config)
    #[arg(long)]
    pub cells: Option<usize>,

    /// Starting per-cell voltages in volts, comma separated (e.g. 4.20,4.18,4.15)
    #[arg(long, value_delimiter = ',')]
    pub voltages: Option<Vec<f32>>,

    /// Balance tolerance in volts (overrides config)
    #[arg(long)]
    pub margin: Option<f32>,

    /// Attempt timeout in milliseconds (overrides config)
    #[arg(long)]
    pub max_balance_ms: Option<u64>,

    /// Control tick period in milliseconds (overrides config)
    #[arg(long)]
    pub tick_ms: Option<u64>,

    /// Stop after this many ticks even if the pack is still unbalanced
    #[arg(long, default_value_t = 20_000)]
    pub max_ticks: u64,

    /// Sleep one tick period between control ticks instead of free-running
    #[arg(long)]
    pub real_time: bool,

    /// Emit the final summary as JSON
    #[arg(long)]
    pub json: bool,

    /// Log level (trace|debug|info|warn|error); RUST_LOG wins when set
    #[arg(long)]
    pub log_level: Option<String>,
}
