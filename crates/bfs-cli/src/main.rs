#![forbid(unsafe_code)]

use anyhow::{Context, Result, bail};
use bfs::{
    BLOCK_SIZE, BlockDevice, ByteBlockDevice, FileByteDevice, FileSystem, MemoryBlockDevice,
    VolumeOptions, Whence,
};
use serde::Serialize;
use std::env;
use std::path::Path;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_IMAGE_BLOCKS: u64 = 1024;

fn main() {
    init_logging();
    if let Err(error) = run() {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}

/// Log to stderr so `--json` output on stdout stays machine-readable.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bfs=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<()> {
    let mut args = env::args().skip(1);
    let Some(command) = args.next() else {
        print_usage();
        return Ok(());
    };
    let rest: Vec<String> = args.collect();
    let json = rest.iter().any(|arg| arg == "--json");

    match command.as_str() {
        "mkimage" => {
            let Some(path) = positional_args(&rest).first().copied() else {
                bail!("mkimage requires a path argument");
            };
            let blocks = flag_value(&rest, "--blocks")?.unwrap_or(DEFAULT_IMAGE_BLOCKS);
            mkimage(Path::new(path), blocks, json)
        }
        "scenario" => scenario(json),
        "put" => {
            let positional: Vec<&String> = positional_args(&rest);
            let [image, input] = positional.as_slice() else {
                bail!("put requires <image-path> <input-path>");
            };
            let offset = flag_value(&rest, "--offset")?.unwrap_or(0);
            put(Path::new(image.as_str()), Path::new(input.as_str()), offset, json)
        }
        "--help" | "-h" | "help" => {
            print_usage();
            Ok(())
        }
        _ => {
            print_usage();
            bail!("unknown command: {command}")
        }
    }
}

fn print_usage() {
    println!("bfs-cli\n");
    println!("USAGE:");
    println!("  bfs-cli mkimage <image-path> [--blocks N] [--json]");
    println!("  bfs-cli scenario [--json]");
    println!("  bfs-cli put <image-path> <input-path> [--offset N] [--json]");
}

/// Arguments that are neither flags nor flag values.
fn positional_args(args: &[String]) -> Vec<&String> {
    let mut out = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--blocks" | "--offset" => {
                iter.next();
            }
            "--json" => {}
            _ => out.push(arg),
        }
    }
    out
}

fn flag_value(args: &[String], flag: &str) -> Result<Option<u64>> {
    let Some(pos) = args.iter().position(|arg| arg == flag) else {
        return Ok(None);
    };
    let Some(raw) = args.get(pos + 1) else {
        bail!("{flag} requires a value");
    };
    let value = raw
        .parse::<u64>()
        .with_context(|| format!("invalid {flag} value: {raw}"))?;
    Ok(Some(value))
}

fn print_report<T: Serialize>(report: &T, json: bool, text: impl FnOnce(&T)) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(report).context("serialize output")?
        );
    } else {
        text(report);
    }
    Ok(())
}

// ── mkimage ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct MkimageOutput {
    path: String,
    block_size: usize,
    block_count: u64,
    data_blocks: u32,
}

fn mkimage(path: &Path, blocks: u64, json: bool) -> Result<()> {
    let dev = FileByteDevice::create(path, blocks)
        .with_context(|| format!("failed to create image {}", path.display()))?;
    let dev = ByteBlockDevice::new(dev).context("image geometry")?;
    let fs = FileSystem::mount(&dev, VolumeOptions::default())
        .with_context(|| format!("image {} cannot hold a volume", path.display()))?;
    dev.sync().context("sync image")?;

    let output = MkimageOutput {
        path: path.display().to_string(),
        block_size: BLOCK_SIZE,
        block_count: dev.block_count(),
        data_blocks: fs.volume().free_blocks(),
    };
    print_report(&output, json, |out| {
        println!("created {}", out.path);
        println!("block_size: {}", out.block_size);
        println!("block_count: {}", out.block_count);
        println!("data_blocks: {}", out.data_blocks);
    })
}

// ── scenario ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ScenarioStep {
    op: String,
    bytes: Option<usize>,
    size: u64,
    cursor: u64,
}

#[derive(Debug, Serialize)]
struct ScenarioOutput {
    steps: Vec<ScenarioStep>,
    gap_is_zero: bool,
    tail: String,
}

/// Walk the basic API end to end on an in-memory volume.
fn scenario(json: bool) -> Result<()> {
    let dev = MemoryBlockDevice::in_memory(64).context("in-memory device")?;
    let mut fs = FileSystem::mount(dev, VolumeOptions::default()).context("mount")?;
    let mut steps = Vec::new();
    let mut record = |fs: &FileSystem<MemoryBlockDevice>, fd, op: &str, bytes| -> Result<()> {
        steps.push(ScenarioStep {
            op: op.to_owned(),
            bytes,
            size: fs.size(fd)?,
            cursor: fs.tell(fd)?,
        });
        Ok(())
    };

    let fd = fs.create("scenario").context("create")?;
    record(&fs, fd, "create", None)?;

    let n = fs.write(fd, b"0123456789").context("write head")?;
    record(&fs, fd, "write \"0123456789\"", Some(n))?;

    fs.seek(fd, 0, Whence::Set)?;
    record(&fs, fd, "seek 0", None)?;

    let mut head = [0_u8; 10];
    let n = fs.read(fd, &mut head).context("read head")?;
    record(&fs, fd, "read 10", Some(n))?;
    if &head != b"0123456789" {
        bail!("head read back as {:?}", String::from_utf8_lossy(&head));
    }

    fs.seek(fd, 1000, Whence::Set)?;
    record(&fs, fd, "seek 1000", None)?;

    let n = fs.write(fd, b"ABCDE").context("write tail")?;
    record(&fs, fd, "write \"ABCDE\"", Some(n))?;

    fs.seek(fd, 10, Whence::Set)?;
    record(&fs, fd, "seek 10", None)?;

    let mut gap = vec![0xEE_u8; 990];
    let n = fs.read(fd, &mut gap).context("read gap")?;
    record(&fs, fd, "read 990", Some(n))?;

    let mut tail = [0_u8; 5];
    let n = fs.read(fd, &mut tail).context("read tail")?;
    record(&fs, fd, "read 5", Some(n))?;

    let output = ScenarioOutput {
        steps,
        gap_is_zero: gap.iter().all(|&b| b == 0),
        tail: String::from_utf8_lossy(&tail).into_owned(),
    };
    print_report(&output, json, |out| {
        for step in &out.steps {
            let bytes = step
                .bytes
                .map_or_else(String::new, |n| format!(" -> {n} bytes"));
            println!(
                "{:<20}{bytes:<16} size={:<6} cursor={}",
                step.op, step.size, step.cursor
            );
        }
        println!("gap_is_zero: {}", out.gap_is_zero);
        println!("tail: {}", out.tail);
    })
}

// ── put ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct PutOutput {
    image: String,
    name: String,
    offset: u64,
    written: usize,
    size: u64,
    allocated_blocks: usize,
    verified: bool,
}

/// Write `input` at `offset` into a file on a fresh volume over `image`,
/// then read it back and compare.
fn put(image: &Path, input: &Path, offset: u64, json: bool) -> Result<()> {
    let data =
        std::fs::read(input).with_context(|| format!("failed to read {}", input.display()))?;
    if data.is_empty() {
        bail!("{} is empty; nothing to write", input.display());
    }
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .with_context(|| format!("{} has no file name", input.display()))?;
    let seek_to = i64::try_from(offset).with_context(|| format!("offset {offset} too large"))?;

    let dev = FileByteDevice::open(image)
        .with_context(|| format!("failed to open image {}", image.display()))?;
    if !dev.is_writable() {
        bail!("image {} is read-only", image.display());
    }
    let dev = ByteBlockDevice::new(dev)
        .with_context(|| format!("image {} has invalid geometry", image.display()))?;
    let mut fs = FileSystem::mount(dev, VolumeOptions::default()).context("mount")?;

    let fd = fs.create(&name).with_context(|| format!("create {name}"))?;
    fs.seek(fd, seek_to, Whence::Set)?;
    let written = fs.write(fd, &data).context("write")?;
    fs.sync().context("sync image")?;

    fs.seek(fd, seek_to, Whence::Set)?;
    let mut back = vec![0_u8; data.len()];
    let read = fs.read(fd, &mut back).context("read back")?;
    let verified = read == data.len() && back == data;
    let stat = fs.stat(fd)?;
    fs.close(fd)?;
    info!(name, offset, written, verified, "put complete");

    let output = PutOutput {
        image: image.display().to_string(),
        name: name.clone(),
        offset,
        written,
        size: stat.size,
        allocated_blocks: stat.allocated_blocks,
        verified,
    };
    print_report(&output, json, |out| {
        println!("wrote {} bytes to {} at offset {}", out.written, out.name, out.offset);
        println!("size: {}", out.size);
        println!("allocated_blocks: {}", out.allocated_blocks);
        println!("verified: {}", out.verified);
    })?;
    if !verified {
        bail!("read-back of {name} does not match input");
    }
    Ok(())
}
