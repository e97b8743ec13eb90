//! Register command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

const SOURCE: &str = "kind: KeptnGitRepository\nmetadata:\n  name: shop\nspec:\n  repository: https://git.example.com/shop.git\n";

#[test]
fn register_creates_then_reports_unchanged() {
  let env = TestEnv::new();
  let file = env.write_file("source.yaml", SOURCE);

  env
    .kgitops_cmd()
    .arg("register")
    .arg(&file)
    .assert()
    .success()
    .stdout(predicate::str::contains("Registered shop"));

  env
    .kgitops_cmd()
    .arg("register")
    .arg(&file)
    .assert()
    .success()
    .stdout(predicate::str::contains("shop is unchanged"));
}

#[test]
fn register_detects_changed_spec() {
  let env = TestEnv::new();
  let file = env.write_file("source.yaml", SOURCE);
  env.kgitops_cmd().arg("register").arg(&file).assert().success();

  env.write_file("source.yaml", &format!("{SOURCE}  branch: release\n"));
  env
    .kgitops_cmd()
    .arg("register")
    .arg(&file)
    .assert()
    .success()
    .stdout(predicate::str::contains("Updated shop"));
}

#[test]
fn register_rejects_other_kinds() {
  let env = TestEnv::new();
  let file = env.write_file("stage.yaml", super::common::STAGE_DEV);

  env
    .kgitops_cmd()
    .arg("register")
    .arg(&file)
    .assert()
    .failure()
    .stderr(predicate::str::contains("KeptnStage"));
}

#[test]
fn register_json_output() {
  let env = TestEnv::new();
  let file = env.write_file("source.yaml", SOURCE);

  env
    .kgitops_cmd()
    .args(["--output", "json", "register"])
    .arg(&file)
    .assert()
    .success()
    .stdout(predicate::str::contains("\"outcome\": \"created\""));
}
