#![forbid(unsafe_code)]

use bfs_harness::fsx::{FsxStressConfig, run_fsx_stress};

fn small_config(seed: u64) -> FsxStressConfig {
    FsxStressConfig {
        operation_count: 1_500,
        seed,
        max_file_size_bytes: 48 * 1024,
        device_blocks: 128,
        full_verify_every_ops: 100,
    }
}

#[test]
fn fsx_stress_passes_across_seeds() {
    for seed in [1_u64, 2, 0xDEAD_BEEF, 0x5EED_0000_0000_0042] {
        let report = run_fsx_stress(&small_config(seed)).expect("fsx run");
        assert!(
            report.passed,
            "seed {seed} failed: {}",
            serde_json::to_string_pretty(&report.failure).unwrap_or_default()
        );
        assert_eq!(report.operations_executed, 1_500);
        assert!(report.final_file_size <= 48 * 1024);
        for kind in ["write", "read", "seek_end", "reopen"] {
            assert!(
                report.operation_mix.get(kind).copied().unwrap_or(0) > 0,
                "seed {seed} never generated {kind}"
            );
        }
    }
}

#[test]
fn fsx_stress_is_deterministic() {
    let first = run_fsx_stress(&small_config(99)).expect("first run");
    let second = run_fsx_stress(&small_config(99)).expect("second run");
    assert_eq!(first.final_file_size, second.final_file_size);
    assert_eq!(first.final_crc32c, second.final_crc32c);
    assert_eq!(first.allocated_blocks, second.allocated_blocks);
    assert_eq!(first.operation_mix, second.operation_mix);
}

#[test]
fn report_serializes_without_failure_field_on_success() {
    let report = run_fsx_stress(&FsxStressConfig {
        operation_count: 50,
        ..small_config(5)
    })
    .expect("fsx run");
    let json = serde_json::to_value(&report).expect("serialize");
    assert_eq!(json["passed"], true);
    assert!(json.get("failure").is_none());
    assert_eq!(json["final_crc32c"].as_str().map(str::len), Some(8));
}
