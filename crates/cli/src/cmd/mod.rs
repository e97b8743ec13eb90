mod deliver;
mod register;
mod status;
mod sync;
mod watch;

use std::sync::Arc;

use anyhow::{Context, Result};

use kgitops_lib::config::Settings;
use kgitops_lib::controlplane::HttpControlPlane;
use kgitops_lib::driver::Reconciler;
use kgitops_lib::events::EventRecorder;
use kgitops_lib::resource::{FileStore, ResourceStore};
use kgitops_lib::secrets::SecretDecryptor;

pub use deliver::{DeliverArgs, cmd_deliver};
pub use register::cmd_register;
pub use status::cmd_status;
pub use sync::cmd_sync;
pub use watch::cmd_watch;

fn open_store(settings: &Settings) -> Arc<dyn ResourceStore> {
  Arc::new(FileStore::new(settings.store_dir.clone()))
}

fn decryptor(settings: &Settings) -> Result<Arc<dyn SecretDecryptor>> {
  let decryptor = settings.decryptor().context("Failed to load RSA private key")?;
  Ok(Arc::from(decryptor))
}

/// Reconciler over the file store talking to the HTTP control plane.
fn reconciler(settings: &Settings, recorder: Arc<dyn EventRecorder>) -> Result<Reconciler<HttpControlPlane>> {
  let control_plane = HttpControlPlane::new(settings.http_timeout).context("Failed to build HTTP client")?;
  Ok(Reconciler::new(
    open_store(settings),
    control_plane,
    recorder,
    decryptor(settings)?,
    settings.clone(),
  ))
}
