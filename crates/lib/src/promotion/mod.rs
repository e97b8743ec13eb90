//! Artifact promotion.
//!
//! Service artifacts live in the source repository under
//! `<base>/base/<service>` with per-stage overlays under
//! `<base>/stages/<stage>/<service>`. Promotion publishes them to the
//! project's upstream repository as a tagged commit; stage delivery later
//! rolls a tag out to a stage branch with merged helm values.

mod deliver;
mod discover;
mod merge;
mod stage;
mod types;
mod upstream;

pub use deliver::{PromotionError, promote_artifacts};
pub use discover::{DiscoverError, Discovery, RejectedService, discover_services, discover_stages, read_project_meta};
pub use merge::{MergeError, merge_values, merge_values_str};
pub use stage::{StageDelivery, StageDeliveryError, deliver_to_stage};
pub use types::{ArtifactLayout, ArtifactMetadata, ArtifactService, PromotedTag, PromotionReport, StageOverlay, tag_name};
pub use upstream::{Upstream, UpstreamConfig, UpstreamError};
