use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::Value;
use std::path::PathBuf;

fn fixture() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/shop.toml")
}

fn run_json(args: &[&str]) -> Value {
    let output = cargo_bin_cmd!("svcwin")
        .arg("--config")
        .arg(fixture())
        .args(args)
        .output()
        .expect("run command");
    assert!(output.status.success(), "command failed: {:?}", output);
    serde_json::from_slice(&output.stdout).expect("parse json")
}

// March 16 2026 is a Monday; Chicago is on CDT (UTC-5).
const MONDAY_10AM: &str = "2026-03-16T15:00:00Z";
const MONDAY_8PM: &str = "2026-03-17T01:00:00Z";

#[test]
fn cli_open_during_pickup_hours() {
    let out = run_json(&["open", "--now", MONDAY_10AM]);
    assert_eq!(out["open"], true);
    assert_eq!(out["fulfillments"], serde_json::json!(["pickup"]));
}

#[test]
fn cli_closed_in_the_evening() {
    let out = run_json(&["open", "--now", MONDAY_8PM]);
    assert_eq!(out["open"], false);
    assert_eq!(out["fulfillments"], serde_json::json!([]));
}

#[test]
fn cli_next_rolls_to_tomorrow_morning() {
    let out = run_json(&["next", "--now", MONDAY_8PM]);
    assert_eq!(out["fulfillment_id"], "pickup");
    assert_eq!(out["service"]["selected_date"], "2026-03-17");
    assert_eq!(out["service"]["selected_time"], 540);
    assert_eq!(out["instant"], "2026-03-17T14:00:00Z");
}

#[test]
fn cli_options_for_rest_of_day() {
    // 16:40 local
    let out = run_json(&[
        "options",
        "--fulfillment",
        "pickup",
        "--date",
        "2026-03-16",
        "--now",
        "2026-03-16T21:40:00Z",
    ]);
    let times: Vec<u64> = out
        .as_array()
        .expect("array")
        .iter()
        .map(|slot| slot["selected_time"].as_u64().expect("minute"))
        .collect();
    assert_eq!(times, vec![1000, 1005, 1010, 1015]);
}

#[test]
fn cli_snap_rounds_up_to_step() {
    let out = run_json(&["snap", "--step", "15", "--now", "2026-03-16T15:01:30Z"]);
    assert_eq!(out["selected_date"], "2026-03-16");
    assert_eq!(out["selected_time"], 615);
}

#[test]
fn cli_expand_weekend_delivery() {
    let out = run_json(&[
        "expand",
        "--fulfillment",
        "delivery",
        "--from",
        "2026-03-16",
        "--to",
        "2026-03-22",
    ]);
    let days = out.as_array().expect("array");
    assert_eq!(days.len(), 2);
    assert_eq!(days[0]["date"], "2026-03-20");
    assert_eq!(days[1]["date"], "2026-03-21");
    assert_eq!(days[0]["intervals"], serde_json::json!([{ "start": 1020, "end": 1260 }]));
}

#[test]
fn cli_resolve_when_closed() {
    let out = run_json(&["resolve", "--now", MONDAY_8PM]);
    assert_eq!(out["path"], "next_available");
    assert_eq!(out["fulfillment_id"], "pickup");
}

#[test]
fn cli_unknown_fulfillment_is_not_found() {
    cargo_bin_cmd!("svcwin")
        .arg("--config")
        .arg(fixture())
        .args(["options", "--fulfillment", "curbside", "--date", "2026-03-16"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown fulfillment: curbside"));
}

#[test]
fn cli_bad_now_is_invalid_input() {
    cargo_bin_cmd!("svcwin")
        .arg("--config")
        .arg(fixture())
        .args(["open", "--now", "noon-ish"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("invalid input"));
}

#[test]
fn cli_missing_config_file_fails() {
    cargo_bin_cmd!("svcwin")
        .args(["--config", "/definitely/not/here.toml", "open"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("load config"));
}
