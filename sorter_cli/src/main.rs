mod cli;
mod error_fmt;
mod run;

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use eyre::WrapErr;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() {
    let args = Cli::parse();
    let _ = JSON_MODE.set(args.json);
    let _ = color_eyre::install();

    match run_app(args) {
        Ok(()) => {}
        Err(err) => {
            if JSON_MODE.get().copied().unwrap_or(false) {
                eprintln!("{}", format_error_json(&err));
            } else {
                eprintln!("{}", humanize(&err));
            }
            std::process::exit(exit_code_for_error(&err));
        }
    }
}

fn run_app(args: Cli) -> eyre::Result<()> {
    let text = fs::read_to_string(&args.config)
        .wrap_err_with(|| format!("reading config {}", args.config.display()))?;
    let cfg = sorter_config::load_toml(&text)
        .map_err(|e| eyre::eyre!("config parse error in {}: {e}", args.config.display()))?;
    cfg.validate().wrap_err("invalid config")?;

    init_tracing(args.json, &args.log_level, &cfg.logging);

    match args.cmd {
        Commands::Run {
            cycles,
            profile,
            sim,
        } => {
            let shutdown = Arc::new(AtomicBool::new(false));
            let flag = shutdown.clone();
            ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
                .wrap_err("installing Ctrl-C handler")?;

            let summary = run::run_cycles(&cfg, cycles, profile, sim, &shutdown)?;
            if args.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "ok": true,
                        "cycles": summary.cycles,
                        "interrupted": summary.interrupted,
                    })
                );
            } else if summary.interrupted {
                println!("interrupted after {} cycle(s)", summary.cycles);
            } else {
                println!("completed {} cycle(s)", summary.cycles);
            }
        }
        Commands::SelfCheck { sim } => {
            run::self_check(&cfg, sim)?;
            if args.json {
                println!("{}", serde_json::json!({ "ok": true }));
            } else {
                println!("self-check ok");
            }
        }
        Commands::Health => {
            // Config already parsed and validated above; that is the check.
            if args.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "ok": true,
                        "steps": cfg.sequence.steps,
                        "span_counts": cfg.sequence.span_counts,
                        "period_ms": cfg.control.period_ms,
                    })
                );
            } else {
                println!(
                    "healthy: {} steps over {} counts, {} ms control period",
                    cfg.sequence.steps, cfg.sequence.span_counts, cfg.control.period_ms
                );
            }
        }
    }
    Ok(())
}

fn init_tracing(json: bool, cli_level: &str, logging: &sorter_config::Logging) {
    let level = logging.level.as_deref().unwrap_or(cli_level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if let Some(file) = &logging.file {
        let path = Path::new(file);
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
        let name = path.file_name().map(Path::new).unwrap_or(path);
        let appender =
            tracing_appender::rolling::never(dir.unwrap_or(Path::new(".")), name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .json()
            .init();
    } else if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}
