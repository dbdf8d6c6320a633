mod cli;
mod logging;

use crate::cli::Args;
use balancer_config::{Config, load_toml};
use balancer_core::{BalanceCfg, BalanceStatus, Balancer};
use balancer_core::util::quantize_to_mv_i32;
use balancer_hardware::{SimpleCellModel, SimulatedPack};
use clap::Parser;
use eyre::{Result, WrapErr};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

// Internal resistance handed to every simulated cell model (milliohms).
const SIM_RTH_MOHM: i32 = 50;

fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    let cfg = load_config(&args)?;
    let _log_guard = logging::init(&cfg.logging, args.log_level.as_deref())?;

    let cells = args.cells.unwrap_or(cfg.balance.cell_count);
    let voltages_mv = starting_voltages(&args, cells)?;

    let balance = BalanceCfg {
        error_margin_v: args.margin.unwrap_or(cfg.balance.error_margin_v),
        max_balance_ms: args.max_balance_ms.unwrap_or(cfg.balance.max_balance_ms),
        max_charge_a: cfg.balance.max_charge_a,
    };
    let margin_mv = quantize_to_mv_i32(balance.error_margin_v);

    let pack = SimulatedPack::new(&voltages_mv, cfg.hardware.settle_ticks);
    let mut balancer = Balancer::builder()
        .with_voltage_source(pack.voltage_source())
        .with_switch_driver(pack.switch_driver())
        .with_cell_count(cells)
        .with_cell_model(|| SimpleCellModel::new(SIM_RTH_MOHM))
        .with_config(balance)
        .build()
        .wrap_err("building balancer")?;

    balancer.power_on().wrap_err("powering on balancer")?;
    tracing::info!(cells, margin_mv, "balancing session started");

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst))
            .wrap_err("installing ctrl-c handler")?;
    }

    let tick_ms = args.tick_ms.unwrap_or(cfg.hardware.tick_ms);
    let mut ticks: u64 = 0;
    loop {
        if stop.load(Ordering::SeqCst) {
            tracing::info!("interrupted; powering off");
            balancer.power_off().wrap_err("powering off balancer")?;
        }
        match balancer.tick().wrap_err("balance tick")? {
            BalanceStatus::Complete => break,
            BalanceStatus::Running => {}
        }
        pack.advance();
        ticks += 1;
        if ticks >= args.max_ticks {
            tracing::warn!(ticks, "tick budget exhausted; powering off");
            balancer.power_off().wrap_err("powering off balancer")?;
        }
        if args.real_time {
            std::thread::sleep(Duration::from_millis(tick_ms));
        }
    }

    print_summary(&args, &balancer, &pack, cells, margin_mv, ticks);
    Ok(())
}

fn load_config(args: &Args) -> Result<Config> {
    let path = match &args.config {
        Some(p) => p.clone(),
        None => {
            let default = Path::new("balancer.toml");
            if !default.exists() {
                return Ok(Config::default());
            }
            default.to_path_buf()
        }
    };
    let text = std::fs::read_to_string(&path)
        .wrap_err_with(|| format!("reading config {}", path.display()))?;
    let cfg = load_toml(&text).wrap_err_with(|| format!("parsing config {}", path.display()))?;
    cfg.validate()
        .wrap_err_with(|| format!("validating config {}", path.display()))?;
    Ok(cfg)
}

fn starting_voltages(args: &Args, cells: usize) -> Result<Vec<i32>> {
    match &args.voltages {
        Some(v) => {
            if v.len() != cells {
                eyre::bail!(
                    "--voltages lists {} cells but {} are configured",
                    v.len(),
                    cells
                );
            }
            Ok(v.iter().map(|x| quantize_to_mv_i32(*x)).collect())
        }
        // Default: a mildly imbalanced pack, 25 mV steps down from 4.20 V
        None => Ok((0..cells).map(|c| 4200 - 25 * c as i32).collect()),
    }
}

fn print_summary(
    args: &Args,
    balancer: &Balancer,
    pack: &SimulatedPack,
    cells: usize,
    margin_mv: i32,
    ticks: u64,
) {
    let cells_mv: Vec<i32> = (0..cells).map(|c| pack.cell_mv(c)).collect();
    let spread_mv = match (cells_mv.iter().max(), cells_mv.iter().min()) {
        (Some(max), Some(min)) => max - min,
        _ => 0,
    };
    let balanced = spread_mv <= margin_mv;

    if args.json {
        let summary = serde_json::json!({
            "ticks": ticks,
            "cells_mv": cells_mv,
            "spread_mv": spread_mv,
            "margin_mv": margin_mv,
            "balanced": balanced,
            "powered": balancer.is_powered_on(),
            "min_safe_ma_at_4250mv": balancer.min_safe_current(4250),
            "max_safe_ma_at_4250mv": balancer.max_safe_current(4250),
        });
        println!("{summary}");
        return;
    }

    println!("balancing finished after {ticks} ticks");
    for (c, mv) in cells_mv.iter().enumerate() {
        println!("  cell {c}: {:.3} V", f64::from(*mv) / 1000.0);
    }
    let verdict = if balanced { "balanced" } else { "not balanced" };
    println!("  spread: {spread_mv} mV (margin {margin_mv} mV) -> {verdict}");
}
