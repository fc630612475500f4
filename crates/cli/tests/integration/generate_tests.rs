use predicates::prelude::*;

use crate::common::TestEnv;

#[test]
fn dockerfile_to_stdout() {
  let env = TestEnv::new();
  env
    .cmd()
    .args(["generate", "openmpi", "--machine", "leonardo"])
    .assert()
    .success()
    .stdout(
      predicate::str::contains("FROM --platform=linux/amd64 docker.io/nvidia/cuda@sha256:")
        .and(predicate::str::contains(" AS devel"))
        .and(predicate::str::contains("COPY --from=devel /usr/local/openmpi /usr/local/openmpi"))
        .and(predicate::str::contains("LABEL org.hpcstack.recipe=openmpi")),
    );
}

#[test]
fn singularity_to_file() {
  let env = TestEnv::new();
  let out = env.path("seissol.def");

  env
    .cmd()
    .args(["generate", "seissol", "--machine", "thea", "--format", "singularity", "-o"])
    .arg(&out)
    .assert()
    .success()
    .stdout(predicate::str::is_empty())
    .stderr(predicate::str::contains("seissol.def"));

  let def = env.read(&out);
  assert!(def.contains("Bootstrap: docker\n"));
  assert!(def.contains("Stage: devel\n"));
  assert!(def.contains("%files from devel\n"));
  assert!(def.contains("/usr/local/seissol_O6 /usr/local/seissol_O6"));
}

#[test]
fn json_format_via_userarg() {
  let env = TestEnv::new();
  let output = env
    .cmd()
    .args(["generate", "base_mpi", "--userarg", "machine=thea", "--userarg", "format=json"])
    .output()
    .unwrap();
  assert!(output.status.success());

  let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(value["kind"], "base-mpi");
  assert_eq!(value["origin"], "thea");
}

#[test]
fn jobs_reach_build_commands() {
  let env = TestEnv::new();
  env
    .cmd()
    .args(["generate", "exahype", "--machine", "thea", "--userarg", "llvm-build-par=6"])
    .assert()
    .success()
    .stdout(predicate::str::contains("--parallel 6").and(predicate::str::contains("$(nproc)").not()));
}

#[test]
fn jobs_from_environment() {
  let env = TestEnv::new();
  env
    .cmd()
    .env("HPCSTACK_JOBS", "3")
    .args(["generate", "openmpi", "--machine", "thea"])
    .assert()
    .success()
    .stdout(predicate::str::contains("make -j3"));
}

#[test]
fn conflicting_format_fails() {
  let env = TestEnv::new();
  env
    .cmd()
    .args([
      "generate",
      "openmpi",
      "--machine",
      "thea",
      "--format",
      "docker",
      "--userarg",
      "format=json",
    ])
    .assert()
    .failure()
    .stderr(predicate::str::contains("conflicting arguments"));
}

#[test]
fn unknown_userarg_fails_before_assembly() {
  let env = TestEnv::new();
  env
    .cmd()
    .args(["generate", "seissol", "--machine", "thea", "--userarg", "cuda=12"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("unknown argument 'cuda'").and(predicate::str::contains("Invalid --userarg")))
    .stdout(predicate::str::is_empty());
}

#[test]
fn verbose_logs_to_stderr() {
  let env = TestEnv::new();
  env
    .cmd()
    .args(["-v", "generate", "base-mpi", "--machine", "thea"])
    .assert()
    .success()
    .stderr(predicate::str::contains("assembled recipe"))
    .stdout(predicate::str::contains("assembled recipe").not());
}
