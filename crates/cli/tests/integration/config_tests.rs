//! Machine configuration files passed with `--config-file`.

use predicates::prelude::*;

use crate::common::TestEnv;

#[test]
fn custom_config_file_generates() {
  let env = TestEnv::new();
  let config = env.fixture("workstation.json");

  env
    .cmd()
    .args(["generate", "openmpi", "--config-file"])
    .arg(&config)
    .assert()
    .success()
    .stdout(
      predicate::str::contains("FROM --platform=linux/amd64 ")
        .and(predicate::str::contains("--with-gdrcopy=/usr/local/gdrcopy"))
        .and(predicate::str::contains("--with-pmix=internal"))
        .and(predicate::str::contains("xpmem").not()),
    );
}

#[test]
fn config_file_via_userarg() {
  let env = TestEnv::new();
  env.fixture("workstation.json");

  // relative to the working directory
  env
    .cmd()
    .args(["plan", "base-mpi", "--userarg", "config-file=workstation.json"])
    .assert()
    .success()
    .stdout(predicate::str::contains("workstation.json"));
}

#[test]
fn missing_nested_key_names_dotted_path() {
  let env = TestEnv::new();
  let config = env.fixture("missing_ucx.json");

  env
    .cmd()
    .args(["generate", "base-mpi", "--config-file"])
    .arg(&config)
    .assert()
    .failure()
    .stderr(predicate::str::contains("network_stack.ucx"));
}

#[test]
fn missing_config_file_fails() {
  let env = TestEnv::new();
  env
    .cmd()
    .args(["generate", "base-mpi", "--config-file", "nope.json"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("nope.json"));
}

#[test]
fn machine_and_config_file_conflict() {
  let env = TestEnv::new();
  let config = env.fixture("workstation.json");

  env
    .cmd()
    .args(["generate", "base-mpi", "--machine", "thea", "--config-file"])
    .arg(&config)
    .assert()
    .failure()
    .stderr(predicate::str::contains("conflicting arguments"));
}

#[test]
fn dnf_distro_builds_mpi_but_not_seissol() {
  let env = TestEnv::new();
  let config = env.fixture("rocky.json");

  env
    .cmd()
    .args(["generate", "base-mpi", "--config-file"])
    .arg(&config)
    .assert()
    .success()
    .stdout(predicate::str::contains("dnf install -y"));

  env
    .cmd()
    .args(["generate", "seissol", "--config-file"])
    .arg(&config)
    .assert()
    .failure()
    .stderr(predicate::str::contains("unsupported distribution: rockylinux9"));
}

#[test]
fn dnf_runtime_uses_rpm_package_names() {
  let env = TestEnv::new();
  let config = env.fixture("rocky.json");

  for recipe in ["base-mpi", "openmpi", "exahype"] {
    env
      .cmd()
      .args(["generate", recipe, "--config-file"])
      .arg(&config)
      .assert()
      .success()
      .stdout(
        predicate::str::contains("numactl-libs")
          .and(predicate::str::contains("libnuma1").not())
          .and(predicate::str::contains("libcurl4").not())
          .and(predicate::str::contains("apt-get").not()),
      );
  }
}

#[test]
fn fingerprint_does_not_depend_on_config_path() {
  let env = TestEnv::new();
  let config = env.fixture("workstation.json");
  std::fs::create_dir(env.path("copy")).unwrap();
  let copy = env.path("copy/site.json");
  std::fs::copy(&config, &copy).unwrap();

  let fingerprint = |path: &std::path::Path| {
    let output = env
      .cmd()
      .args(["plan", "openmpi", "--json", "--config-file"])
      .arg(path)
      .output()
      .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    value["fingerprint"].as_str().unwrap().to_string()
  };

  assert_eq!(fingerprint(&config), fingerprint(&copy));
}
