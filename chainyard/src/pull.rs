//! Pulling default images with a bounded wait.
//!
//! Each pull runs as its own task and forwards progress to a display task
//! through a channel it owns, so the display ends whenever the pull task
//! ends, however it ends. The caller races the pull against a timer. On
//! timeout the pull task is aborted, which kills the client process; the
//! engine may still finish the transfer in the background.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::Settings;
use crate::errors::{ChainError, Result};
use crate::runtime::{ContainerRuntime, RuntimeError};

const PROGRESS_BUFFER: usize = 64;

/// Split `repo[:tag]` (or `registry:port/repo:tag`) into repository and tag.
fn split_tag(image: &str) -> (&str, &str) {
    match image.rsplit_once(':') {
        Some((repo, tag)) if !tag.contains('/') => (repo, tag),
        _ => (image, "latest"),
    }
}

fn qualify(registry: &str, repo: &str, tag: &str) -> String {
    if registry.is_empty() {
        format!("{}:{}", repo, tag)
    } else {
        format!("{}/{}:{}", registry.trim_end_matches('/'), repo, tag)
    }
}

/// Pull from the default registry, then from the backup registry if that fails.
async fn pull_with_fallback(
    runtime: &dyn ContainerRuntime,
    image: &str,
    default_registry: &str,
    backup_registry: &str,
    progress: mpsc::Sender<String>,
) -> std::result::Result<(), RuntimeError> {
    let (repo, tag) = split_tag(image);
    let primary = qualify(default_registry, repo, tag);
    match runtime.pull_image(&primary, progress.clone()).await {
        Ok(()) => Ok(()),
        Err(e) => {
            warn!("Pulling {} failed ({}), trying backup registry", primary, e);
            runtime.pull_image(&qualify(backup_registry, repo, tag), progress).await
        }
    }
}

/// Pull one image, giving up after `timeout`.
pub async fn pull_image_with_timeout(
    runtime: Arc<dyn ContainerRuntime>,
    image: &str,
    settings: &Settings,
    timeout: Duration,
) -> Result<()> {
    let (tx, mut rx) = mpsc::channel::<String>(PROGRESS_BUFFER);

    let display: JoinHandle<()> = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            info!("{}", line);
        }
    });

    let pull_image = image.to_string();
    let default_registry = settings.default_registry.clone();
    let backup_registry = settings.backup_registry.clone();
    let mut pull = tokio::spawn(async move {
        // `tx` moves in here and is dropped when the task ends.
        pull_with_fallback(runtime.as_ref(), &pull_image, &default_registry, &backup_registry, tx).await
    });

    let result = tokio::select! {
        joined = &mut pull => match joined {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ChainError::Runtime(e)),
            Err(e) => Err(ChainError::Internal(format!("pull task for {} failed: {}", image, e))),
        },
        _ = tokio::time::sleep(timeout) => {
            pull.abort();
            Err(ChainError::PullTimeout {
                image: image.to_string(),
                after: timeout,
            })
        }
    };

    // Ends once the pull task has dropped its sender.
    let _ = display.await;
    result
}

/// Pull `images` one after another, stopping at the first failure.
pub async fn pull_images(
    runtime: Arc<dyn ContainerRuntime>,
    settings: &Settings,
    images: &[String],
) -> Result<()> {
    let timeout = settings.pull_timeout();
    for (i, image) in images.iter().enumerate() {
        warn!("Pulling image {} out of {}: {}", i + 1, images.len(), image);
        pull_image_with_timeout(runtime.clone(), image, settings, timeout).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_tag() {
        assert_eq!(split_tag("chainyard/data"), ("chainyard/data", "latest"));
        assert_eq!(split_tag("chainyard/data:0.12"), ("chainyard/data", "0.12"));
        assert_eq!(split_tag("localhost:5000/data"), ("localhost:5000/data", "latest"));
    }

    #[test]
    fn test_qualify() {
        assert_eq!(qualify("quay.io", "a/b", "1"), "quay.io/a/b:1");
        assert_eq!(qualify("", "a/b", "1"), "a/b:1");
    }
}
