//! Deliver command integration tests.
//!
//! Syncing the source promotes `cart-1.0.0-0` into the upstream repository;
//! `deliver` then copies it onto the `dev` branch.

use predicates::prelude::*;

use super::common::{STAGE_DEV, TestEnv, read_blob};

fn promoted_env() -> (TestEnv, std::path::PathBuf) {
  let env = TestEnv::new();
  let upstream = env.upstream_repo(&[("README.md", "upstream\n")], &["dev"]);
  let project = format!(
    "kind: KeptnProject\nmetadata:\n  name: shop\nspec:\n  repository: {}\n",
    upstream.display()
  );
  let source = env.source_repo(
    "source",
    &[
      (".keptn/dev.yaml", STAGE_DEV),
      (".keptn/project.yaml", &project),
      (".keptn/projectmeta.yaml", "spec:\n  project: shop\n"),
      (".keptn/base/cart/metadata.yaml", "spec:\n  version: 1.0.0\n"),
      (
        ".keptn/base/cart/helm/cart/values.yaml",
        "image: cart:{{ keptn/ImageVersion }}\nreplicas: 1\n",
      ),
      (".keptn/stages/dev/cart/helm/cart/values.yaml", "replicas: 2\n"),
    ],
  );
  env.register("shop", &source);
  for _ in 0..3 {
    env.kgitops_cmd().args(["sync", "shop"]).assert().success();
  }
  (env, upstream)
}

#[test]
fn deliver_writes_merged_values_to_stage_branch() {
  let (env, upstream) = promoted_env();

  env
    .kgitops_cmd()
    .args([
      "deliver",
      "--project",
      "shop",
      "--stage",
      "dev",
      "--service",
      "cart",
      "--version",
      "1.0.0",
    ])
    .assert()
    .success()
    .stdout(predicate::str::contains("Delivered cart-1.0.0-0 to dev"));

  let values = read_blob(&upstream, "dev", "cart/helm/cart/values.yaml").unwrap();
  assert!(values.contains("cart:1.0.0"));
  assert!(values.contains("replicas: 2"));

  env
    .kgitops_cmd()
    .args([
      "deliver",
      "--project",
      "shop",
      "--stage",
      "dev",
      "--service",
      "cart",
      "--version",
      "1.0.0",
    ])
    .assert()
    .success()
    .stdout(predicate::str::contains("already has cart-1.0.0-0"));
}

#[test]
fn deliver_unknown_project_fails() {
  let env = TestEnv::new();

  env
    .kgitops_cmd()
    .args([
      "deliver",
      "--project",
      "ghost",
      "--stage",
      "dev",
      "--service",
      "cart",
      "--version",
      "1.0.0",
    ])
    .assert()
    .failure()
    .stderr(predicate::str::contains("Project ghost is not in the store"));
}
