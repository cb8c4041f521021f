//! Platform service factory

use crate::config::HarnessConfig;
use crate::error::{Error, Result};
use crate::platform::{GitHubService, MergeQueuePlatform};
use octocrab::Octocrab;
use octocrab::models::{AppId, InstallationId};
use tracing::debug;

/// Build the production platform service from harness configuration
///
/// Authenticates both identities up front so credential problems surface
/// before any scenario touches the repository.
pub async fn create_platform_service(config: &HarnessConfig) -> Result<Box<dyn MergeQueuePlatform>> {
    let user = user_client(config)?;
    let app = app_client(config).await?;

    Ok(Box::new(GitHubService::new(
        app,
        user,
        config.owner.clone(),
        config.repo.clone(),
    )))
}

fn user_client(config: &HarnessConfig) -> Result<Octocrab> {
    let mut builder = Octocrab::builder().personal_token(config.user_token()?.to_string());
    if let Some(base) = &config.api_base {
        builder = builder
            .base_uri(base.as_str())
            .map_err(|e| Error::Config(format!("invalid api_base: {e}")))?;
    }
    builder
        .build()
        .map_err(|e| Error::Auth(format!("failed to build user client: {e}")))
}

async fn app_client(config: &HarnessConfig) -> Result<Octocrab> {
    let key = jsonwebtoken::EncodingKey::from_rsa_pem(config.app_private_key()?.as_bytes())
        .map_err(|e| Error::Auth(format!("invalid app private key: {e}")))?;

    let mut builder = Octocrab::builder().app(AppId(config.app_id), key);
    if let Some(base) = &config.api_base {
        builder = builder
            .base_uri(base.as_str())
            .map_err(|e| Error::Config(format!("invalid api_base: {e}")))?;
    }
    let app = builder
        .build()
        .map_err(|e| Error::Auth(format!("failed to build app client: {e}")))?;

    debug!(installation_id = config.installation_id, "authenticating app installation");
    let (installation, _token) = app
        .installation_and_token(InstallationId(config.installation_id))
        .await
        .map_err(|e| Error::Auth(format!("failed to authenticate installation: {e}")))?;
    Ok(installation)
}
