use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::{json, Value};
use std::path::PathBuf;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../tests/fixtures").join(name)
}

fn stdout_json(args: &[&str], file: PathBuf) -> Value {
    let output = cargo_bin_cmd!("panoplan")
        .args(&args[..1])
        .arg(file)
        .args(&args[1..])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    serde_json::from_slice(&output).expect("stdout should contain valid json")
}

#[test]
fn summary_emits_stable_json_contract() {
    let value = stdout_json(&["summary"], fixture("room.json"));

    let images: Vec<Value> = value["images"]
        .as_array()
        .expect("images should be an array")
        .iter()
        .map(|image| {
            let shapes: Vec<&str> = image["rooms"]
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(|room| room["dimensions"]["shape"].as_str())
                .collect();
            json!({
                "image": image["image"],
                "name": image["name"],
                "points": image["points"],
                "lines": image["lines"],
                "surfaces": image["surfaces"],
                "openings": image["openings"]["total"],
                "doors": image["openings"]["doors"],
                "windows": image["openings"]["windows"],
                "roomShapes": shapes.join(","),
            })
        })
        .collect();
    let contract = json!({
        "calibrated": value["calibrated"],
        "unit": value["unit"],
        "images": images,
    });

    insta::assert_json_snapshot!("cli_summary_room", contract);
}

#[test]
fn measure_reports_physical_units() {
    let value = stdout_json(&["measure", "--image", "0", "--surface", "0"], fixture("room.json"));

    assert_eq!(value["unit"], "cm");
    assert_eq!(value["dimensions"]["shape"], "rectangle");
    assert_eq!(value["dimensions"]["area"].as_f64(), Some(30000.0));
    assert_eq!(value["dimensions"]["perimeter"].as_f64(), Some(700.0));
}

#[test]
fn measure_fails_for_unknown_surface() {
    cargo_bin_cmd!("panoplan")
        .arg("measure")
        .arg(fixture("room.json"))
        .args(["--image", "0", "--surface", "9"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("surface 9 not found"));
}

#[test]
fn floor_plan_writes_svg_file() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let output_path = temp.path().join("plan.svg");

    cargo_bin_cmd!("panoplan")
        .arg("floor-plan")
        .arg(fixture("room.json"))
        .args(["--image", "0"])
        .arg("--output")
        .arg(&output_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("plan.svg"));

    let svg = std::fs::read_to_string(&output_path).expect("svg should be written");
    assert!(svg.starts_with("<svg"));
    assert!(svg.contains(">living</text>"));
    assert!(svg.contains(">2.00m</text>"));
    assert!(svg.contains(">Front door</text>"));
}

#[test]
fn floor_plan_writes_png_file() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let output_path = temp.path().join("plan.png");

    cargo_bin_cmd!("panoplan")
        .arg("floor-plan")
        .arg(fixture("room.json"))
        .args(["--image", "0", "--format", "png", "--canvas-size", "200", "--margin", "20"])
        .arg("--output")
        .arg(&output_path)
        .assert()
        .success();

    let image = image::open(&output_path).expect("floor plan should be readable image");
    assert_eq!(image.width(), 200);
    assert_eq!(image.height(), 200);
}

#[test]
fn floor_plan_warns_when_nothing_to_draw() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let output_path = temp.path().join("plan.svg");

    cargo_bin_cmd!("panoplan")
        .arg("floor-plan")
        .arg(fixture("room.json"))
        .args(["--image", "1"])
        .arg("--output")
        .arg(&output_path)
        .assert()
        .success()
        .stderr(predicate::str::contains("nothing to draw"));

    assert!(!output_path.exists());
}

#[test]
fn detect_builds_project_from_candidates() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let output_path = temp.path().join("detected.json");

    cargo_bin_cmd!("panoplan")
        .arg("detect")
        .arg(fixture("candidates.json"))
        .args(["--image", "0", "--name", "scan.png"])
        .arg("--output")
        .arg(&output_path)
        .assert()
        .success();

    let value: Value = serde_json::from_str(&std::fs::read_to_string(&output_path).expect("project written"))
        .expect("project should be valid json");
    let image = &value["imageData"]["0"];
    assert_eq!(image["imageName"], "scan.png");
    assert_eq!(image["surfaces"].as_array().map(Vec::len), Some(1));
    assert_eq!(image["openings"][0]["type"], "door");
    assert_eq!(image["openings"][1]["type"], "window");

    let summary = stdout_json(&["summary"], output_path);
    assert_eq!(summary["images"][0]["rooms"][0]["dimensions"]["shape"], "rectangle");
}

#[test]
fn export_csv_lists_openings() {
    cargo_bin_cmd!("panoplan")
        .arg("export-csv")
        .arg(fixture("room.json"))
        .args(["--kind", "openings"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Image,ID,Type,Name,Material"))
        .stdout(predicate::str::contains("0,0,door,Front door,wood,40.00,100.00,4000.00,280.00,cm,"));
}

#[test]
fn summary_fails_for_missing_file() {
    cargo_bin_cmd!("panoplan")
        .arg("summary")
        .arg(fixture("missing.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("file does not exist"));
}

#[test]
fn summary_fails_for_invalid_project() {
    cargo_bin_cmd!("panoplan")
        .arg("summary")
        .arg(fixture("invalid.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read project"));
}

#[test]
fn empty_project_has_no_images() {
    let value = stdout_json(&["summary"], fixture("empty.json"));
    assert_eq!(value["calibrated"], false);
    assert_eq!(value["images"].as_array().map(Vec::len), Some(0));
}

#[test]
fn version_prints_package_version() {
    cargo_bin_cmd!("panoplan")
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}
