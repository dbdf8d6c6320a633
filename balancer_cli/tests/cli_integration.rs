use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

fn cmd() -> Command {
    Command::cargo_bin("balancer_cli").expect("binary built")
}

#[test]
fn imbalanced_pack_converges_within_the_tick_budget() {
    let output = cmd()
        .args([
            "--cells",
            "3",
            "--voltages",
            "4.20,4.18,4.15",
            "--margin",
            "0.02",
            "--json",
        ])
        .output()
        .expect("run balancer");

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let summary: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("JSON summary on stdout");

    assert_eq!(summary["balanced"], serde_json::json!(true));
    assert_eq!(summary["powered"], serde_json::json!(false));
    assert_eq!(summary["margin_mv"], serde_json::json!(20));
    assert!(summary["spread_mv"].as_i64().expect("spread_mv") <= 20);
    assert_eq!(summary["cells_mv"].as_array().expect("cells_mv").len(), 3);
}

#[test]
fn already_balanced_pack_finishes_immediately() {
    let mut file = tempfile::NamedTempFile::new().expect("temp config");
    writeln!(file, "[hardware]\nsettle_ticks = 1").expect("write config");

    let output = cmd()
        .args(["--config"])
        .arg(file.path())
        .args(["--cells", "2", "--voltages", "4.10,4.10", "--json"])
        .output()
        .expect("run balancer");

    assert!(output.status.success());
    let summary: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("JSON summary on stdout");

    assert_eq!(summary["balanced"], serde_json::json!(true));
    // One tick to settle after power-on, one for the balanced short-circuit
    assert!(summary["ticks"].as_u64().expect("ticks") <= 2);
}

#[test]
fn text_summary_reports_the_verdict() {
    cmd()
        .args(["--cells", "2", "--voltages", "4.10,4.10"])
        .assert()
        .success()
        .stdout(predicate::str::contains("balanced"))
        .stdout(predicate::str::contains("spread:"));
}

#[test]
fn rejects_voltage_list_that_does_not_match_cell_count() {
    cmd()
        .args(["--cells", "3", "--voltages", "4.20,4.18"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--voltages"));
}

#[test]
fn reads_cell_count_and_margin_from_the_config_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp config");
    writeln!(
        file,
        "[balance]\ncell_count = 2\nerror_margin_v = 0.05\n\n[hardware]\nsettle_ticks = 1"
    )
    .expect("write config");

    let output = cmd()
        .args(["--config"])
        .arg(file.path())
        .args(["--voltages", "4.20,4.17", "--json"])
        .output()
        .expect("run balancer");

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let summary: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("JSON summary on stdout");
    assert_eq!(summary["margin_mv"], serde_json::json!(50));
    assert_eq!(summary["cells_mv"].as_array().expect("cells_mv").len(), 2);
    assert_eq!(summary["balanced"], serde_json::json!(true));
}

#[test]
fn rejects_config_with_duplicate_bleed_pins() {
    let mut file = tempfile::NamedTempFile::new().expect("temp config");
    writeln!(file, "[pins]\nbleed = [17, 17]\n\n[balance]\ncell_count = 2").expect("write config");

    cmd()
        .args(["--config"])
        .arg(file.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("duplicate bleed pin"));
}
