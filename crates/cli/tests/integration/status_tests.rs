//! Status command integration tests.

use predicates::prelude::*;

use super::common::{STAGE_DEV, TestEnv};

#[test]
fn status_with_empty_store() {
  let env = TestEnv::new();

  env
    .kgitops_cmd()
    .arg("status")
    .assert()
    .success()
    .stdout(predicate::str::contains("No repositories registered"));
}

#[test]
fn status_shows_never_synced_repository() {
  let env = TestEnv::new();
  let source = env.source_repo("source", &[(".keptn/dev.yaml", STAGE_DEV)]);
  env.register("shop", &source);

  env
    .kgitops_cmd()
    .arg("status")
    .assert()
    .success()
    .stderr(predicate::str::contains("never synced"))
    .stdout(predicate::str::contains("KeptnGitRepository: 1"));
}

#[test]
fn status_after_sync_shows_commit_and_counts() {
  let env = TestEnv::new();
  let source = env.source_repo("source", &[(".keptn/dev.yaml", STAGE_DEV)]);
  env.register("shop", &source);
  env.kgitops_cmd().args(["sync", "shop"]).assert().success();
  env.kgitops_cmd().args(["sync", "shop"]).assert().success();

  env
    .kgitops_cmd()
    .args(["status", "shop"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Last commit"))
    .stdout(predicate::str::contains("KeptnStage: 1"));
}

#[test]
fn status_unknown_repository_fails() {
  let env = TestEnv::new();

  env
    .kgitops_cmd()
    .args(["status", "nope"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("No repository named nope"));
}
