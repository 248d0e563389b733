#![forbid(unsafe_code)]

use anyhow::{Context, Result, bail};
use bfs_harness::fsx::{FsxStressConfig, run_fsx_stress};
use std::env;

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let cmd = args.first().map(String::as_str);

    match cmd {
        Some("run-fsx-stress") => run_fsx_stress_cmd(&args[1..]),
        Some("--help" | "-h" | "help") | None => {
            print_usage();
            Ok(())
        }
        Some(other) => {
            print_usage();
            bail!("unknown command: {other}")
        }
    }
}

fn print_usage() {
    println!("bfs-harness\n");
    println!("USAGE:");
    println!("  bfs-harness run-fsx-stress [--ops N] [--seed S] [--max-file-size BYTES]");
}

fn run_fsx_stress_cmd(args: &[String]) -> Result<()> {
    let mut config = FsxStressConfig::default();
    let mut index = 0_usize;
    while index < args.len() {
        match args[index].as_str() {
            "--ops" => {
                let raw = args.get(index + 1).context("--ops requires a value")?;
                config.operation_count = raw.parse().context("invalid --ops value")?;
                index += 2;
            }
            "--seed" => {
                let raw = args.get(index + 1).context("--seed requires a value")?;
                config.seed = raw.parse().context("invalid --seed value")?;
                index += 2;
            }
            "--max-file-size" => {
                let raw = args
                    .get(index + 1)
                    .context("--max-file-size requires a value")?;
                config.max_file_size_bytes = raw.parse().context("invalid --max-file-size value")?;
                index += 2;
            }
            other => bail!("unknown run-fsx-stress option: {other}"),
        }
    }

    let report = run_fsx_stress(&config)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.passed {
        bail!("fsx stress failed (seed={})", report.seed);
    }
    Ok(())
}
