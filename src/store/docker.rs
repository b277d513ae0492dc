//! Docker daemon implementation of the image store

use crate::image::oci::ContainerConfig;
use crate::store::{ImageDescriptor, ImageStore, LoadMessage};
use crate::{DockhandError, Result};
use async_trait::async_trait;
use bollard::image::{ImportImageOptions, ListImagesOptions, TagImageOptions};
use bollard::{Docker, API_DEFAULT_VERSION};
use futures_util::StreamExt;
use std::path::Path;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

const DEFAULT_DOCKER_HOST: &str = "unix:///var/run/docker.sock";

/// Image store backed by a Docker daemon
pub struct DockerStore {
    docker: Docker,
}

impl DockerStore {
    /// Connect to the daemon named by `DOCKER_HOST` (unix socket or tcp),
    /// falling back to the default local socket.
    ///
    /// The timeout applies to every daemon call made through this store, so
    /// a hung daemon aborts the run instead of stalling it. Connectivity is
    /// verified with a ping before the store is handed out.
    pub async fn connect(timeout: Duration) -> Result<Self> {
        let host = std::env::var("DOCKER_HOST").unwrap_or_else(|_| DEFAULT_DOCKER_HOST.to_string());

        let docker = if host.starts_with("unix://") {
            Docker::connect_with_unix(&host, timeout.as_secs(), API_DEFAULT_VERSION)?
        } else {
            Docker::connect_with_http(&host, timeout.as_secs(), API_DEFAULT_VERSION)?
        };

        docker.ping().await?;
        info!(host = %host, "connected to Docker daemon");

        Ok(Self { docker })
    }

    /// Wrap a pre-configured bollard client
    pub fn with_client(docker: Docker) -> Self {
        Self { docker }
    }
}

#[async_trait]
impl ImageStore for DockerStore {
    async fn inspect(&self, reference: &str) -> Result<Option<ImageDescriptor>> {
        match self.docker.inspect_image(reference).await {
            Ok(inspect) => Ok(Some(descriptor_from_inspect(inspect)?)),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn list(&self) -> Result<Vec<ImageDescriptor>> {
        let summaries = self
            .docker
            .list_images(Some(ListImagesOptions::<String> {
                all: true,
                ..Default::default()
            }))
            .await?;

        // The list endpoint omits the config, so each image is inspected
        // individually. Images removed between the two calls are skipped.
        let mut descriptors = Vec::new();
        for summary in summaries {
            if let Some(descriptor) = self.inspect(&summary.id).await? {
                descriptors.push(descriptor);
            }
        }

        Ok(descriptors)
    }

    async fn tag(&self, image_id: &str, tag: &str) -> Result<()> {
        let (repo, tag_part) = split_repo_tag(tag);
        let options = TagImageOptions {
            repo: repo.to_string(),
            tag: tag_part.to_string(),
        };

        self.docker
            .tag_image(image_id, Some(options))
            .await
            .map_err(|err| DockhandError::Tag(format!("{}: {}", tag, err)))?;

        debug!(id = %image_id, tag = %tag, "applied tag");
        Ok(())
    }

    async fn load_archive(&self, archive: &Path) -> Result<Vec<LoadMessage>> {
        let file = tokio::fs::File::open(archive).await?;

        // A read error ends the upload stream early; the daemon then fails
        // on the truncated tar and reports it in the response body.
        let body = ReaderStream::new(file).scan((), |_, chunk| {
            futures_util::future::ready(match chunk {
                Ok(bytes) => Some(bytes),
                Err(err) => {
                    warn!(error = %err, "error reading archive during upload");
                    None
                }
            })
        });

        let options = ImportImageOptions { quiet: false };
        let mut stream = self.docker.import_image_stream(options, body, None);

        let mut messages = Vec::new();
        while let Some(result) = stream.next().await {
            let build_info = result?;
            messages.push(LoadMessage {
                stream: build_info.stream,
                error: build_info
                    .error_detail
                    .and_then(|detail| detail.message)
                    .or(build_info.error),
            });
        }

        Ok(messages)
    }
}

fn descriptor_from_inspect(inspect: bollard::models::ImageInspect) -> Result<ImageDescriptor> {
    let id = inspect.id.ok_or_else(|| {
        DockhandError::MalformedResponse("daemon returned an image without an ID".to_string())
    })?;

    Ok(ImageDescriptor {
        id,
        architecture: inspect.architecture.unwrap_or_default(),
        os: inspect.os.unwrap_or_default(),
        config: inspect.config.map(convert_config).unwrap_or_default(),
        repo_tags: inspect.repo_tags.unwrap_or_default(),
    })
}

fn convert_config(config: bollard::models::ContainerConfig) -> ContainerConfig {
    ContainerConfig {
        user: config.user,
        env: config.env,
        entrypoint: config.entrypoint,
        cmd: config.cmd,
        working_dir: config.working_dir,
        labels: config.labels,
    }
}

/// Split a "name:tag" reference for the daemon's tag endpoint
fn split_repo_tag(reference: &str) -> (&str, &str) {
    if let Some((name, tag)) = reference.rsplit_once(':') {
        // A '/' after the ':' means the colon belonged to a registry port
        if !tag.contains('/') {
            return (name, tag);
        }
    }
    (reference, "latest")
}
