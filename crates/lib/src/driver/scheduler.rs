use std::future::Future;
use std::time::Duration;

use tracing::{error, info};

use super::reconciler::Reconciler;
use super::types::{ReconcileError, requeue_after};
use crate::controlplane::ControlPlane;
use crate::resource::Kind;

/// Periodically reconciles every registered source.
///
/// Sources are visited in name order. The wait before the next round is the
/// shortest requeue interval any source asked for, so a pass that created a
/// record is followed up immediately.
pub struct Scheduler<C: ControlPlane> {
  reconciler: Reconciler<C>,
}

impl<C: ControlPlane> Scheduler<C> {
  pub fn new(reconciler: Reconciler<C>) -> Self {
    Self { reconciler }
  }

  pub fn reconciler(&self) -> &Reconciler<C> {
    &self.reconciler
  }

  /// One round over all sources. Returns how long to wait before the next.
  pub async fn run_once(&self) -> Result<Duration, ReconcileError> {
    let settings = self.reconciler.settings();
    let sources = self.reconciler.store().list(Kind::GitRepository)?;
    let mut next = settings.success_interval;

    for source in sources {
      let result = self.reconciler.reconcile_source(&source.name).await;
      match &result {
        Ok(outcome) => info!(source = %source.name, outcome = outcome.label(), "reconciled"),
        Err(e) => error!(source = %source.name, error = %e, transient = e.is_transient(), "reconcile failed"),
      }
      next = next.min(requeue_after(&result, settings));
    }
    Ok(next)
  }

  /// Loop until `shutdown` resolves.
  pub async fn run_until<F>(&self, shutdown: F) -> Result<(), ReconcileError>
  where
    F: Future<Output = ()>,
  {
    tokio::pin!(shutdown);
    loop {
      let wait = match self.run_once().await {
        Ok(wait) => wait,
        Err(e) => {
          error!(error = %e, "failed to list sources");
          self.reconciler.settings().error_interval
        }
      };

      tokio::select! {
        _ = &mut shutdown => {
          info!("shutting down");
          return Ok(());
        }
        _ = tokio::time::sleep(wait) => {}
      }
    }
  }

  /// Loop until interrupted with Ctrl-C.
  pub async fn run(&self) -> Result<(), ReconcileError> {
    self
      .run_until(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
          error!(error = %e, "failed to listen for interrupt");
          std::future::pending::<()>().await;
        }
      })
      .await
  }
}
