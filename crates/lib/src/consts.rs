//! Fixed names and defaults shared across the controller.

use std::time::Duration;

/// Application name, used for data directories and log targets.
pub const APP_NAME: &str = "kgitops";

/// Annotation holding the structural hash of the last spec written to a record.
pub const LAST_APPLIED_HASH_ANNOTATION: &str = "keptn.sh/last-applied-hash";

/// Directory inside the source repository that holds manifests and artifacts.
pub const DEFAULT_BASE_DIR: &str = ".keptn";

pub const DEFAULT_BRANCH: &str = "main";

/// Used in tag names when an artifact does not declare a config version.
pub const DEFAULT_CONFIG_VERSION: &str = "0";

pub const DEFAULT_AUTH_HEADER: &str = "x-token";

/// Sequence triggered for a service that does not name one.
pub const DEFAULT_DEPLOYMENT_EVENT: &str = "delivery";

pub const ERROR_INTERVAL: Duration = Duration::from_secs(10);
pub const SUCCESS_INTERVAL: Duration = Duration::from_secs(120);
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Number of read-modify-write attempts before a version conflict is surfaced.
pub const MAX_CONFLICT_RETRIES: usize = 5;

pub const PROMOTION_AUTHOR_NAME: &str = "Keptn Upstream Pusher";
pub const PROMOTION_AUTHOR_EMAIL: &str = "keptn@keptn.sh";
pub const PROMOTION_COMMIT_MESSAGE: &str = "Push new version";
pub const PROMOTION_TAG_MESSAGE: &str = "Created a Tag";

pub const STAGE_AUTHOR_NAME: &str = "Keptn Promotion Service";
pub const STAGE_AUTHOR_EMAIL: &str = "noreply@keptn.sh";

pub const EVENT_SOURCE: &str = "Keptn GitOps Operator";
pub const EVENT_SPEC_VERSION: &str = "1.0";
pub const EVENT_CONTENT_TYPE: &str = "application/json";
pub const CLOUDEVENTS_CONTENT_TYPE: &str = "application/cloudevents+json";

/// Placeholder in promoted helm values replaced with the deployed version.
pub const IMAGE_VERSION_PLACEHOLDER: &str = "{{ keptn/ImageVersion }}";

pub const PROJECT_META_FILE: &str = "projectmeta.yaml";
pub const ARTIFACT_META_FILE: &str = "metadata.yaml";
pub const ARTIFACT_BASE_DIR: &str = "base";
pub const ARTIFACT_STAGES_DIR: &str = "stages";
