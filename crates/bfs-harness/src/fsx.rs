//! fsx-style stress run of the file API against an in-memory reference.
//!
//! A seeded generator produces writes (including sparse extensions), reads,
//! end-relative seeks and close/reopen cycles. Each operation is applied to a
//! file on a fresh in-memory volume and to a plain `Vec<u8>` model; every
//! read, seek result and reopen is checked against the model.

use crate::crc32c_hex;
use anyhow::{Context, Result, bail};
use bfs::{BLOCK_SIZE, FileDescriptor, FileSystem, MemoryBlockDevice, VolumeOptions, Whence};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

const FSX_FILE_NAME: &str = "fsx.dat";
const MAX_IO_LEN: usize = 4096;

#[derive(Debug, Clone)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        Self {
            state: seed ^ 0x9E37_79B9_7F4A_7C15,
        }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    fn next_usize(&mut self, upper_exclusive: usize) -> usize {
        if upper_exclusive <= 1 {
            return 0;
        }
        let upper_u64 = u64::try_from(upper_exclusive).unwrap_or(u64::MAX);
        let value = self.next_u64() % upper_u64;
        usize::try_from(value).unwrap_or(0)
    }

    /// Uniform in `min..=max`.
    fn next_len(&mut self, min: usize, max: usize) -> usize {
        if max <= min {
            return min;
        }
        min + self.next_usize(max - min + 1)
    }

    fn fill(&mut self, buf: &mut [u8]) {
        for chunk in buf.chunks_mut(8) {
            let bytes = self.next_u64().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }
}

/// Configuration for an fsx stress run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsxStressConfig {
    /// Number of operations to execute.
    pub operation_count: u64,
    /// Seed for deterministic operation generation.
    pub seed: u64,
    /// Writes never extend the file past this many bytes.
    pub max_file_size_bytes: usize,
    /// Blocks on the in-memory device, reserved blocks included.
    pub device_blocks: usize,
    /// Full-file verification every N operations (0 disables periodic checks).
    pub full_verify_every_ops: u64,
}

impl Default for FsxStressConfig {
    fn default() -> Self {
        Self {
            operation_count: 10_000,
            seed: 0xB10C_F5A5_0000_0001,
            max_file_size_bytes: 256 * 1024,
            device_blocks: 1024,
            full_verify_every_ops: 500,
        }
    }
}

/// One fsx operation. Offsets are absolute file positions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FsxOperation {
    Write { offset: usize, data: Vec<u8> },
    Read { offset: usize, len: usize },
    SeekEnd { delta: i64 },
    Reopen,
}

impl FsxOperation {
    fn kind(&self) -> &'static str {
        match self {
            Self::Write { .. } => "write",
            Self::Read { .. } => "read",
            Self::SeekEnd { .. } => "seek_end",
            Self::Reopen => "reopen",
        }
    }
}

/// Failure details for an fsx run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsxFailureReport {
    pub operation_index: u64,
    pub operation: FsxOperation,
    pub reason: String,
    pub expected_crc32c: String,
    pub actual_crc32c: String,
}

/// Aggregate result of an fsx run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsxStressReport {
    pub seed: u64,
    pub operation_count: u64,
    pub operations_executed: u64,
    pub passed: bool,
    pub final_file_size: usize,
    pub final_crc32c: String,
    pub allocated_blocks: usize,
    pub operation_mix: BTreeMap<String, u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FsxFailureReport>,
    pub duration_us: u64,
}

// ── Generation ──────────────────────────────────────────────────────────────

fn generate_fsx_operation(
    rng: &mut DeterministicRng,
    current_len: usize,
    max_file_size_bytes: usize,
) -> FsxOperation {
    match rng.next_usize(100) {
        0..=49 => {
            let offset_limit = max_file_size_bytes.saturating_sub(1);
            let offset = match rng.next_usize(4) {
                // Overwrite inside the file.
                0 | 1 if current_len > 0 => rng.next_usize(current_len),
                // Append, or leave a gap past EOF.
                2 => current_len.saturating_add(rng.next_usize(3 * BLOCK_SIZE)),
                _ => rng.next_usize(max_file_size_bytes),
            }
            .min(offset_limit);
            let room = max_file_size_bytes - offset;
            let len = rng.next_len(1, room.min(MAX_IO_LEN));
            let mut data = vec![0_u8; len];
            rng.fill(&mut data);
            FsxOperation::Write { offset, data }
        }
        50..=84 => FsxOperation::Read {
            offset: rng.next_usize(current_len.saturating_add(BLOCK_SIZE)),
            len: rng.next_len(1, MAX_IO_LEN),
        },
        85..=94 => {
            let back = i64::try_from(rng.next_usize(current_len.saturating_add(1))).unwrap_or(0);
            FsxOperation::SeekEnd { delta: -back }
        }
        _ => FsxOperation::Reopen,
    }
}

// ── Execution ───────────────────────────────────────────────────────────────

struct FsxRunState {
    fs: FileSystem<MemoryBlockDevice>,
    fd: FileDescriptor,
    reference: Vec<u8>,
    operation_mix: BTreeMap<String, u64>,
    failure: Option<FsxFailureReport>,
    operations_executed: u64,
}

impl FsxRunState {
    fn new(config: &FsxStressConfig) -> Result<Self> {
        let options = VolumeOptions {
            max_file_blocks: u64::try_from(config.max_file_size_bytes.div_ceil(BLOCK_SIZE))
                .context("max_file_size_bytes out of range")?,
            ..VolumeOptions::default()
        };
        let dev = MemoryBlockDevice::in_memory(config.device_blocks)
            .context("create in-memory device")?;
        let mut fs = FileSystem::mount(dev, options).context("mount fsx volume")?;
        let fd = fs.create(FSX_FILE_NAME).context("create fsx file")?;
        Ok(Self {
            fs,
            fd,
            reference: Vec::new(),
            operation_mix: BTreeMap::new(),
            failure: None,
            operations_executed: 0,
        })
    }

    fn seek_to(&mut self, offset: usize) -> Result<()> {
        let offset = i64::try_from(offset).context("offset out of range")?;
        self.fs.seek(self.fd, offset, Whence::Set)?;
        Ok(())
    }

    /// The whole file as the file API sees it.
    fn read_all(&mut self) -> Result<Vec<u8>> {
        let size = usize::try_from(self.fs.size(self.fd)?).context("file size out of range")?;
        let mut out = vec![0_u8; size];
        if size > 0 {
            self.seek_to(0)?;
            let n = self.fs.read(self.fd, &mut out)?;
            out.truncate(n);
        }
        Ok(out)
    }

    fn fail(&mut self, operation_index: u64, operation: FsxOperation, reason: String) {
        let actual = self.read_all().unwrap_or_default();
        self.failure = Some(FsxFailureReport {
            operation_index,
            operation,
            reason,
            expected_crc32c: crc32c_hex(&self.reference),
            actual_crc32c: crc32c_hex(&actual),
        });
    }

    fn verify_full(&mut self, operation_index: u64, operation: &FsxOperation) -> Result<()> {
        let actual = self.read_all()?;
        if actual != self.reference {
            self.fail(
                operation_index,
                operation.clone(),
                format!(
                    "full-file mismatch: expected {} bytes, found {}",
                    self.reference.len(),
                    actual.len()
                ),
            );
        }
        Ok(())
    }

    fn apply(&mut self, operation_index: u64, operation: &FsxOperation) -> Result<()> {
        let counter = self
            .operation_mix
            .entry(operation.kind().to_owned())
            .or_insert(0);
        *counter = counter.saturating_add(1);
        self.operations_executed = self.operations_executed.saturating_add(1);

        match operation {
            FsxOperation::Write { offset, data } => {
                self.seek_to(*offset)?;
                let written = self.fs.write(self.fd, data)?;
                if written != data.len() {
                    bail!("short write: {written} of {} bytes", data.len());
                }
                let end = offset + data.len();
                if self.reference.len() < end {
                    self.reference.resize(end, 0);
                }
                self.reference[*offset..end].copy_from_slice(data);
            }
            FsxOperation::Read { offset, len } => {
                self.seek_to(*offset)?;
                let mut buf = vec![0_u8; *len];
                let n = self.fs.read(self.fd, &mut buf)?;
                let start = (*offset).min(self.reference.len());
                let end = offset.saturating_add(*len).min(self.reference.len());
                let expected = &self.reference[start..end];
                if buf[..n] != *expected {
                    let reason = format!(
                        "read mismatch at offset={offset} len={len}: got {n} bytes, expected {}",
                        expected.len()
                    );
                    self.fail(operation_index, operation.clone(), reason);
                }
            }
            FsxOperation::SeekEnd { delta } => {
                let cursor = self.fs.seek(self.fd, *delta, Whence::End)?;
                let expected = (self.reference.len() as u64).checked_add_signed(*delta);
                if Some(cursor) != expected {
                    let reason = format!("seek end by {delta} landed at {cursor}, expected {expected:?}");
                    self.fail(operation_index, operation.clone(), reason);
                }
            }
            FsxOperation::Reopen => {
                self.fs.close(self.fd)?;
                self.fd = self.fs.open(FSX_FILE_NAME)?;
                if self.fs.tell(self.fd)? != 0 {
                    self.fail(
                        operation_index,
                        operation.clone(),
                        "reopened cursor is not 0".to_owned(),
                    );
                    return Ok(());
                }
                self.verify_full(operation_index, operation)?;
            }
        }
        Ok(())
    }
}

fn validate_config(config: &FsxStressConfig) -> Result<()> {
    if config.operation_count == 0 {
        bail!("operation_count must be greater than zero");
    }
    if config.max_file_size_bytes == 0 {
        bail!("max_file_size_bytes must be greater than zero");
    }
    let needed = config.max_file_size_bytes.div_ceil(BLOCK_SIZE);
    let reserved = usize::try_from(VolumeOptions::default().reserved_blocks).unwrap_or(usize::MAX);
    if config.device_blocks.saturating_sub(reserved) < needed {
        bail!(
            "device_blocks={} cannot hold a {}-byte file",
            config.device_blocks,
            config.max_file_size_bytes
        );
    }
    Ok(())
}

fn build_fsx_report(
    config: &FsxStressConfig,
    mut state: FsxRunState,
    duration: Duration,
) -> Result<FsxStressReport> {
    let actual = state.read_all()?;
    let allocated_blocks = state.fs.stat(state.fd)?.allocated_blocks;
    Ok(FsxStressReport {
        seed: config.seed,
        operation_count: config.operation_count,
        operations_executed: state.operations_executed,
        passed: state.failure.is_none(),
        final_file_size: actual.len(),
        final_crc32c: crc32c_hex(&actual),
        allocated_blocks,
        operation_mix: state.operation_mix,
        failure: state.failure,
        duration_us: u64::try_from(duration.as_micros()).unwrap_or(u64::MAX),
    })
}

/// Run an fsx stress pass with a deterministic operation stream.
pub fn run_fsx_stress(config: &FsxStressConfig) -> Result<FsxStressReport> {
    validate_config(config)?;

    let start = Instant::now();
    let mut rng = DeterministicRng::new(config.seed);
    let mut state = FsxRunState::new(config)?;

    for operation_index in 0..config.operation_count {
        let operation =
            generate_fsx_operation(&mut rng, state.reference.len(), config.max_file_size_bytes);
        if let Err(error) = state.apply(operation_index, &operation) {
            state.fail(operation_index, operation, format!("{error:#}"));
            break;
        }
        if state.failure.is_some() {
            break;
        }

        if config.full_verify_every_ops != 0
            && state.operations_executed % config.full_verify_every_ops == 0
        {
            state.verify_full(operation_index, &FsxOperation::Reopen)?;
            if state.failure.is_some() {
                break;
            }
        }
    }

    if state.failure.is_none() {
        state.verify_full(state.operations_executed, &FsxOperation::Reopen)?;
    }

    build_fsx_report(config, state, start.elapsed())
}
