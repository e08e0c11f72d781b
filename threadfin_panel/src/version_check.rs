//! Compares the server version against the latest GitHub release.

use crate::controller::Controller;
use crate::error::PanelError;
use crate::host::PanelHost;
use crate::html::Element;
use crate::transport::Command;
use regex::Regex;
use reqwest::StatusCode;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use threadfin_protocol::{commands, ClientInfo, Release};
use tracing::{info, warn};

const VERSION_PATTERN: &str =
    r"^v?(\d+)\.(\d+)(?:\.(\d+))?(?:\.(\d+))?(?: \((\d+)(?:-(\w+))?\))?(?:-(\w+))?$";
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
pub const UPDATE_RELOAD_DELAY: Duration = Duration::from_secs(20);
pub const NOTIFICATION_ID: &str = "notification_container";

/// `[major, minor, patch, build]`
pub type Version = [u64; 4];

#[derive(Debug, Error)]
pub enum VersionError {
    #[error("invalid version format: {0:?}")]
    InvalidFormat(String),
    #[error("version pattern failed to compile: {0}")]
    Pattern(#[from] regex::Error),
}

#[derive(Debug, Error)]
pub enum UpdateCheckError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("release request failed: status={0}")]
    BadStatus(StatusCode),
    #[error("no {0} release found")]
    NoRelease(&'static str),
    #[error("unable to parse current version: {0}")]
    CurrentVersion(#[source] VersionError),
    #[error("unable to parse release version: {0}")]
    ReleaseVersion(#[source] VersionError),
}

fn version_regex() -> Result<&'static Regex, VersionError> {
    static RE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(VERSION_PATTERN))
        .as_ref()
        .map_err(|e| VersionError::Pattern(e.clone()))
}

/// Accepts forms like `1.2`, `v1.2.3.4` and `1.2.0 (10-beta)`.
///
/// A missing patch takes the fourth component; a missing build takes the
/// parenthesized build number.
pub fn parse_version(raw: &str) -> Result<Version, VersionError> {
    let invalid = || VersionError::InvalidFormat(raw.to_string());
    let caps = version_regex()?.captures(raw).ok_or_else(invalid)?;
    let num = |i: usize| -> Result<Option<u64>, VersionError> {
        caps.get(i)
            .map(|m| m.as_str().parse::<u64>().map_err(|_| invalid()))
            .transpose()
    };

    let major = num(1)?.ok_or_else(invalid)?;
    let minor = num(2)?.ok_or_else(invalid)?;
    let patch = num(3)?.or(num(4)?).unwrap_or(0);
    let build = num(4)?.or(num(5)?).unwrap_or(0);
    Ok([major, minor, patch, build])
}

pub fn is_newer_version(latest: &Version, current: &Version) -> bool {
    latest > current
}

/// First prerelease for beta installs, first stable release otherwise.
pub fn pick_release(releases: &[Release], beta: bool) -> Option<&Release> {
    releases.iter().find(|r| r.prerelease == beta)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateNotice {
    pub current: String,
    pub latest: String,
}

pub fn evaluate_releases(
    releases: &[Release],
    info: &ClientInfo,
) -> Result<Option<UpdateNotice>, UpdateCheckError> {
    let current = parse_version(&info.version).map_err(UpdateCheckError::CurrentVersion)?;
    let release = pick_release(releases, info.beta).ok_or(UpdateCheckError::NoRelease(
        if info.beta { "beta" } else { "stable" },
    ))?;
    let latest = parse_version(&release.tag_name).map_err(UpdateCheckError::ReleaseVersion)?;

    Ok(is_newer_version(&latest, &current).then(|| UpdateNotice {
        current: info.version.clone(),
        latest: release.tag_name.clone(),
    }))
}

pub async fn fetch_releases(releases_url: &str) -> Result<Vec<Release>, UpdateCheckError> {
    let client = reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .user_agent(concat!("threadfin_panel/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let resp = client.get(releases_url).send().await?;
    if !resp.status().is_success() {
        return Err(UpdateCheckError::BadStatus(resp.status()));
    }
    Ok(resp.json::<Vec<Release>>().await?)
}

/// Failures are logged and reported as "no update".
pub async fn check_for_update(releases_url: &str, info: &ClientInfo) -> Option<UpdateNotice> {
    let result = match fetch_releases(releases_url).await {
        Ok(releases) => evaluate_releases(&releases, info),
        Err(e) => Err(e),
    };
    match result {
        Ok(notice) => notice,
        Err(e) => {
            warn!("update check failed: {e}");
            None
        }
    }
}

pub fn render_update_notice(notice: &UpdateNotice) -> Element {
    Element::new("div")
        .id(NOTIFICATION_ID)
        .child(
            Element::new("h5")
                .id("notification_title")
                .text("Update available"),
        )
        .child(Element::new("p").id("notification_text").text(format!(
            "Version {} is available (installed: {}).",
            notice.latest, notice.current
        )))
        .child(
            Element::new("input")
                .attr("type", "button")
                .id("closeNotification")
                .attr("value", "Close"),
        )
        .child(
            Element::new("input")
                .attr("type", "button")
                .id("updateNowButton")
                .attr("value", "Update now"),
        )
}

/// Asks the server to update itself, then reloads once it had time to restart.
pub async fn apply_update(
    ctrl: &mut Controller,
    host: &mut dyn PanelHost,
) -> Result<(), PanelError> {
    ctrl.send(&Command::new(commands::UPDATE_THREADFIN))?;
    info!(delay_secs = UPDATE_RELOAD_DELAY.as_secs(), "update requested");
    ctrl.pump_for(UPDATE_RELOAD_DELAY, host).await?;
    host.reload();
    Ok(())
}
