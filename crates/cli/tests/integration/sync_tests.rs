//! Sync command integration tests.

use predicates::prelude::*;

use super::common::{STAGE_DEV, TestEnv};

const STAGE_PROD: &str = "kind: KeptnStage\nmetadata:\n  name: prod\nspec:\n  project: shop\n";

#[test]
fn sync_unknown_repository_warns() {
  let env = TestEnv::new();

  env
    .kgitops_cmd()
    .arg("sync")
    .arg("missing")
    .assert()
    .success()
    .stderr(predicate::str::contains("No repository named missing"));
}

#[test]
fn sync_applies_one_creation_per_pass() {
  let env = TestEnv::new();
  let source = env.source_repo("source", &[(".keptn/dev.yaml", STAGE_DEV), (".keptn/prod.yaml", STAGE_PROD)]);
  env.register("shop", &source);

  env
    .kgitops_cmd()
    .args(["sync", "shop"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Created KeptnStage/dev"));

  env
    .kgitops_cmd()
    .args(["sync", "shop"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Created KeptnStage/prod"));

  env
    .kgitops_cmd()
    .args(["sync", "shop"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Synced shop"));

  env
    .kgitops_cmd()
    .args(["sync", "shop"])
    .assert()
    .success()
    .stdout(predicate::str::contains("up to date"));
}

#[test]
fn sync_prints_events() {
  let env = TestEnv::new();
  let source = env.source_repo("source", &[(".keptn/dev.yaml", STAGE_DEV)]);
  env.register("shop", &source);

  env
    .kgitops_cmd()
    .args(["sync", "shop"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Created: Created stage dev"));
}

#[test]
fn sync_failure_is_reported_and_recorded() {
  let env = TestEnv::new();
  let missing = env.temp.path().join("does-not-exist");
  env.register("shop", &missing);

  env
    .kgitops_cmd()
    .args(["sync", "shop"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("Sync of shop failed"));

  env
    .kgitops_cmd()
    .args(["--output", "json", "status", "shop"])
    .assert()
    .success()
    .stdout(predicate::str::contains("\"result\": \"Failed\""));
}

#[test]
fn sync_json_output() {
  let env = TestEnv::new();
  let source = env.source_repo("source", &[(".keptn/dev.yaml", STAGE_DEV)]);
  env.register("shop", &source);

  env
    .kgitops_cmd()
    .args(["--output", "json", "sync", "shop"])
    .assert()
    .success()
    .stdout(predicate::str::contains("\"outcome\": \"requeue\""))
    .stdout(predicate::str::contains("\"requeueAfterSecs\": 0"));
}
