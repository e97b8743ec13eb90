//! End-to-end passes: git checkout, file store and HTTP control plane.

use mockito::Matcher;
use tempfile::TempDir;

use kgitops_lib::deploy::{DeploymentContextStatus, ServiceDeploymentStatus};
use kgitops_lib::driver::PassOutcome;
use kgitops_lib::resource::{Kind, ResourceStore};
use kgitops_lib::source::{GitRepositoryStatus, SyncResult};

use super::common::{Controller, PROJECT, SourceRepo, deployments, instance};

fn source_status(controller: &Controller) -> GitRepositoryStatus {
  controller
    .store
    .get(Kind::GitRepository, "shop")
    .unwrap()
    .unwrap()
    .status_as()
    .unwrap()
}

#[tokio::test]
async fn release_is_triggered_once_per_stage() {
  let mut server = mockito::Server::new_async().await;
  let events = server
    .mock("POST", "/v1/event")
    .match_header("x-token", "secret")
    .match_header("content-type", "application/cloudevents+json")
    .match_body(Matcher::PartialJson(serde_json::json!({
      "data": { "project": "shop", "service": "cart", "image": "cart:1.2.0" }
    })))
    .with_status(200)
    .with_body(r#"{"keptnContext":"ctx-42"}"#)
    .expect(2)
    .create_async()
    .await;

  let temp = TempDir::new().unwrap();
  let source = SourceRepo::init(&temp.path().join("source"));
  let commit = source.commit(&[
    (".keptn/instance.yaml", &instance(&server.url())),
    (".keptn/project.yaml", PROJECT),
    (".keptn/deployments.yaml", &deployments("1.2.0")),
  ]);
  let controller = Controller::new(temp);
  controller.register("shop", &source.path);

  let outcome = controller.settle("shop").await;
  let PassOutcome::Completed(report) = outcome else {
    panic!("expected completed, got {outcome:?}");
  };
  assert_eq!(report.commit, commit);
  assert_eq!(report.triggered.len(), 2);
  events.assert_async().await;

  let context: DeploymentContextStatus = controller
    .store
    .get(Kind::DeploymentContext, "shop-cart-1.2.0")
    .unwrap()
    .unwrap()
    .status_as()
    .unwrap();
  assert_eq!(context.keptn_context, "ctx-42");
  assert_eq!(
    context.last_applied_hash.keys().cloned().collect::<Vec<_>>(),
    vec!["dev".to_string(), "prod".to_string()]
  );

  let status = source_status(&controller);
  assert_eq!(status.last_commit.as_deref(), Some(commit.as_str()));
  assert_eq!(status.result, Some(SyncResult::Successful));

  let again = controller.reconciler.reconcile_source("shop").await.unwrap();
  assert_eq!(again, PassOutcome::Skipped { commit });
}

#[tokio::test]
async fn version_bump_starts_a_new_context() {
  let mut server = mockito::Server::new_async().await;
  let events = server
    .mock("POST", "/v1/event")
    .with_status(200)
    .with_body(r#"{"keptnContext":"ctx-1"}"#)
    .expect(4)
    .create_async()
    .await;

  let temp = TempDir::new().unwrap();
  let source = SourceRepo::init(&temp.path().join("source"));
  source.commit(&[
    (".keptn/instance.yaml", &instance(&server.url())),
    (".keptn/project.yaml", PROJECT),
    (".keptn/deployments.yaml", &deployments("1.2.0")),
  ]);
  let controller = Controller::new(temp);
  controller.register("shop", &source.path);
  assert!(matches!(controller.settle("shop").await, PassOutcome::Completed(_)));

  source.commit(&[(".keptn/deployments.yaml", &deployments("1.3.0"))]);
  let outcome = controller.settle("shop").await;
  assert!(matches!(outcome, PassOutcome::Completed(_)));
  events.assert_async().await;

  assert!(
    controller
      .store
      .get(Kind::DeploymentContext, "shop-cart-1.3.0")
      .unwrap()
      .is_some()
  );
  let dev: ServiceDeploymentStatus = controller
    .store
    .get(Kind::ServiceDeployment, "shop-cart-dev")
    .unwrap()
    .unwrap()
    .status_as()
    .unwrap();
  assert!(!dev.update_pending);
  assert_eq!(dev.keptn_context, "ctx-1");
}

#[tokio::test]
async fn unreachable_control_plane_fails_the_pass() {
  let temp = TempDir::new().unwrap();
  let source = SourceRepo::init(&temp.path().join("source"));
  source.commit(&[
    (".keptn/instance.yaml", &instance("http://127.0.0.1:9")),
    (".keptn/project.yaml", PROJECT),
    (".keptn/deployments.yaml", &deployments("1.2.0")),
  ]);
  let controller = Controller::new(temp);
  controller.register("shop", &source.path);

  let mut last = None;
  for _ in 0..20 {
    match controller.reconciler.reconcile_source("shop").await {
      Ok(PassOutcome::Requeue { .. }) => continue,
      other => {
        last = Some(other);
        break;
      }
    }
  }

  let err = last.unwrap().unwrap_err();
  assert!(err.is_transient());
  let status = source_status(&controller);
  assert_eq!(status.result, Some(SyncResult::Failed));
  assert!(status.last_commit.is_none());
  assert!(controller.recorder.reasons().contains(&"SyncFailed".to_string()));
}

#[tokio::test]
async fn invalid_documents_are_skipped_not_fatal() {
  let temp = TempDir::new().unwrap();
  let source = SourceRepo::init(&temp.path().join("source"));
  source.commit(&[
    (".keptn/stage.yaml", "kind: KeptnStage\nmetadata:\n  name: dev\nspec:\n  project: shop\n"),
    (".keptn/broken.yaml", "kind: KeptnStage\nspec: [unterminated\n"),
    (".keptn/README.md", "not a manifest"),
  ]);
  let controller = Controller::new(temp);
  controller.register("shop", &source.path);

  let PassOutcome::Completed(report) = controller.settle("shop").await else {
    panic!("expected completed");
  };
  assert_eq!(report.documents, 1);
  assert_eq!(report.skipped_documents, 1);
  assert_eq!(controller.store.list(Kind::Stage).unwrap().len(), 1);
}
