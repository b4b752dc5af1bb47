//! Artifact downloads - Fetching service jars from the release feed into the layout

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use tracing::{error, info};

use crate::core::catalog::{Catalog, ServiceKind, GAMESERVER_JAR, PROXY_PLUGIN_JAR};
use crate::core::{Settings, SupervisorError, SupervisorResult};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadPhase {
    Idle,
    Downloading,
    Completed,
    Error,
}

/// Progress of the current (or last) download run, as reported to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadState {
    pub status: DownloadPhase,
    /// Percentage of selected services fetched
    pub progress: u8,
    /// File currently being fetched
    pub current: String,
    pub errors: Vec<String>,
}

impl Default for DownloadState {
    fn default() -> Self {
        Self {
            status: DownloadPhase::Idle,
            progress: 0,
            current: String::new(),
            errors: Vec::new(),
        }
    }
}

/// Fetches jars into `downloads/`, then copies them to where the units expect them.
///
/// At most one run is active at a time.
#[derive(Clone)]
pub struct DownloadCoordinator {
    catalog: Catalog,
    settings: Settings,
    client: reqwest::Client,
    state: Arc<Mutex<DownloadState>>,
}

impl DownloadCoordinator {
    pub fn new(catalog: Catalog, settings: Settings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("skyblock-orchestrator/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            catalog,
            settings,
            client,
            state: Arc::new(Mutex::new(DownloadState::default())),
        })
    }

    fn lock(&self) -> SupervisorResult<MutexGuard<'_, DownloadState>> {
        self.state
            .lock()
            .map_err(|e| anyhow!("Download state lock poisoned: {}", e).into())
    }

    pub fn state(&self) -> SupervisorResult<DownloadState> {
        Ok(self.lock()?.clone())
    }

    /// Resolve client-supplied service names (`ServiceBazaar.jar`, `bazaar`, ...)
    fn resolve(&self, selected: Option<&[String]>) -> SupervisorResult<Vec<ServiceKind>> {
        let Some(selected) = selected.filter(|s| !s.is_empty()) else {
            return Ok(self.catalog.services().to_vec());
        };
        selected
            .iter()
            .map(|name| {
                let stem = name
                    .strip_suffix(".jar")
                    .or_else(|| name.strip_suffix(".JAR"))
                    .unwrap_or(name);
                self.catalog
                    .service_by_id(stem)
                    .ok_or_else(|| SupervisorError::InvalidId(name.clone()))
            })
            .collect()
    }

    /// Mark a run as started, rejecting the request if one is already active
    pub(crate) fn claim(&self) -> SupervisorResult<()> {
        let mut state = self.lock()?;
        if state.status == DownloadPhase::Downloading {
            return Err(SupervisorError::DownloadInProgress);
        }
        *state = DownloadState {
            status: DownloadPhase::Downloading,
            ..Default::default()
        };
        Ok(())
    }

    /// Start a background run; returns once it has been accepted
    pub fn start(&self, selected: Option<Vec<String>>, force: bool) -> SupervisorResult<()> {
        let services = self.resolve(selected.as_deref())?;
        self.claim()?;
        let this = self.clone();
        tokio::spawn(async move { this.run(services, force).await });
        Ok(())
    }

    /// Run to completion in the caller's task and return the final state
    pub async fn download(
        &self,
        selected: Option<Vec<String>>,
        force: bool,
    ) -> SupervisorResult<DownloadState> {
        let services = self.resolve(selected.as_deref())?;
        self.claim()?;
        self.run(services, force).await;
        self.state()
    }

    fn update(&self, apply: impl FnOnce(&mut DownloadState)) {
        match self.lock() {
            Ok(mut state) => apply(&mut state),
            Err(e) => error!("{}", e),
        }
    }

    async fn run(&self, services: Vec<ServiceKind>, force: bool) {
        let total = services.len().max(1);
        let mut completed = 0;
        let services_dir = self.settings.services_dir();

        for service in &services {
            match self.fetch(service.jar, &services_dir.join(service.jar), force).await {
                Ok(()) => {
                    completed += 1;
                    let progress = (completed * 100 / total) as u8;
                    self.update(|state| state.progress = progress);
                }
                Err(e) => {
                    error!("Error downloading {}: {:#}", service.jar, e);
                    self.update(|state| {
                        state
                            .errors
                            .push(format!("Failed to download {}: {:#}", service.jar, e))
                    });
                }
            }
        }

        let shared = async {
            self.fetch(GAMESERVER_JAR, &services_dir.join(GAMESERVER_JAR), force)
                .await?;
            self.fetch(
                PROXY_PLUGIN_JAR,
                &self.settings.config_dir().join(PROXY_PLUGIN_JAR),
                force,
            )
            .await
        };

        match shared.await {
            Ok(()) => {
                info!("Downloads complete");
                self.update(|state| {
                    state.status = DownloadPhase::Completed;
                    state.progress = 100;
                });
            }
            Err(e) => {
                error!("Download error: {:#}", e);
                self.update(|state| {
                    state.status = DownloadPhase::Error;
                    state.errors.push(format!("{:#}", e));
                });
            }
        }
    }

    /// Fetch `file` into the cache unless present (or forced), then copy it to `target`
    /// unless already there (or forced)
    async fn fetch(&self, file: &str, target: &Path, force: bool) -> Result<()> {
        self.update(|state| state.current = file.to_string());

        let cache_dir = self.settings.downloads_dir();
        let cached = cache_dir.join(file);
        if cached.exists() && !force {
            info!("Exists in downloads: {}", cached.display());
        } else {
            let url = format!("{}/{}", self.settings.release_base_url, file);
            info!("Downloading {} to {}", url, cached.display());
            tokio::fs::create_dir_all(&cache_dir).await?;

            let bytes = self
                .client
                .get(&url)
                .send()
                .await
                .and_then(|response| response.error_for_status())
                .with_context(|| format!("Request for {} failed", file))?
                .bytes()
                .await
                .with_context(|| format!("Failed to read body of {}", file))?;

            let partial: PathBuf = cache_dir.join(format!("{}.part", file));
            tokio::fs::write(&partial, &bytes).await?;
            tokio::fs::rename(&partial, &cached).await?;
        }

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        if !target.exists() || force {
            tokio::fs::copy(&cached, target)
                .await
                .with_context(|| format!("Failed to copy {} into place", file))?;
            info!("Copied {} -> {}", cached.display(), target.display());
        }
        Ok(())
    }
}
