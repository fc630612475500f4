use predicates::prelude::*;

use crate::common::TestEnv;

#[test]
fn plan_shows_both_stages() {
  let env = TestEnv::new();
  env
    .cmd()
    .args(["plan", "openmpi", "--machine", "thea"])
    .assert()
    .success()
    .stdout(
      predicate::str::contains("Recipe openmpi for thea")
        .and(predicate::str::contains("Fingerprint"))
        .and(predicate::str::contains("Devel stage"))
        .and(predicate::str::contains("Runtime stage"))
        .and(predicate::str::contains("/usr/local/benchmarks")),
    );
}

#[test]
fn plan_json_lists_steps_and_copies() {
  let env = TestEnv::new();
  let output = env
    .cmd()
    .args(["plan", "seissol", "--machine", "leonardo", "--json"])
    .output()
    .unwrap();
  assert!(output.status.success());

  let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(value["recipe"], "seissol");
  assert_eq!(value["machine"], "leonardo");
  assert_eq!(value["fingerprint"].as_str().unwrap().len(), 20);

  let devel = value["devel"]["steps"].as_array().unwrap();
  let labels: Vec<&str> = devel.iter().map(|s| s["label"].as_str().unwrap()).collect();
  let hdf5 = labels.iter().position(|l| *l == "hdf5").unwrap();
  let netcdf = labels.iter().position(|l| *l == "netcdf").unwrap();
  assert!(hdf5 < netcdf);

  let copies: Vec<&str> = value["copies"]
    .as_array()
    .unwrap()
    .iter()
    .map(|c| c.as_str().unwrap())
    .collect();
  assert!(copies.contains(&"/usr/local/codegen"));
  assert!(copies.contains(&"/usr/local/seissol_O4"));
}

#[test]
fn plan_fingerprint_is_stable() {
  let env = TestEnv::new();
  let fingerprint = || {
    let output = env
      .cmd()
      .args(["plan", "base-mpi", "--machine", "thea", "--json"])
      .output()
      .unwrap();
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    value["fingerprint"].as_str().unwrap().to_string()
  };

  assert_eq!(fingerprint(), fingerprint());
}

#[test]
fn plan_with_jobs_changes_fingerprint() {
  let env = TestEnv::new();
  let fingerprint = |jobs: &str| {
    let output = env
      .cmd()
      .args(["plan", "base-mpi", "--machine", "thea", "--jobs", jobs, "--json"])
      .output()
      .unwrap();
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    value["fingerprint"].as_str().unwrap().to_string()
  };

  assert_ne!(fingerprint("4"), fingerprint("8"));
}
