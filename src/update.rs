use reqwest::Client;
use std::time::Duration;
use tracing::debug;

const CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Ask `url` for the latest version string (plain text body).
///
/// Returns the remote version when it differs from `current`. Every failure is
/// swallowed: the check must never affect a measurement run.
pub async fn check_latest(url: &str, current: &str) -> Option<String> {
    let client = Client::builder().timeout(CHECK_TIMEOUT).build().ok()?;
    let body = match client.get(url).send().await {
        Ok(resp) if resp.status().is_success() => resp.text().await.ok()?,
        Ok(resp) => {
            debug!(status = %resp.status(), "update check rejected");
            return None;
        }
        Err(e) => {
            debug!("update check failed: {e}");
            return None;
        }
    };
    newer_version(&body, current)
}

/// One-line answer for `--check-update`.
pub async fn version_report(url: &str, current: &str) -> String {
    match check_latest(url, current).await {
        Some(latest) => format!("cdn-speed-rs {current}: new version {latest} available"),
        None => format!("cdn-speed-rs {current}: no newer version found"),
    }
}

fn newer_version(body: &str, current: &str) -> Option<String> {
    let remote = body.trim().trim_start_matches('v');
    let current = current.trim_start_matches('v');
    if remote.is_empty() || remote == current {
        None
    } else {
        Some(remote.to_string())
    }
}
