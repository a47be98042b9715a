use std::time::Duration;

use serde::Serialize;
use url::Url;

use crate::config::CaptureConfig;
use crate::driver::{BrowserSession, CaptureError};
use crate::extract;

/// Single-page apps switch language without navigating, so the post-switch
/// wait stays short.
const LANGUAGE_RELOAD_WAIT: Duration = Duration::from_secs(5);

/// Result of one successful capture run: the region image plus whatever
/// metadata the extractor managed to scrape. Serialized camelCase straight
/// into the screenshot endpoint's response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureOutcome {
    pub screenshot_base64: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weapon_base_monster: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weapon_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monster_icon_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weapon_type_icon_url: Option<String>,
}

/// Runs one capture end to end in a fresh, isolated browser session.
///
/// The session is closed on every exit path after launch; only
/// [`CaptureError::Launch`] leaves nothing to release.
pub async fn capture_build(
    config: &CaptureConfig,
    url: &Url,
) -> Result<CaptureOutcome, CaptureError> {
    tracing::info!(url = %url, "starting capture");
    let session = BrowserSession::launch(config).await?;
    let result = run_capture(&session, config, url).await;
    session.close().await;

    match &result {
        Ok(_) => tracing::info!(url = %url, "capture done"),
        Err(err) => tracing::warn!(url = %url, %err, "capture failed"),
    }
    result
}

async fn run_capture(
    session: &BrowserSession,
    config: &CaptureConfig,
    url: &Url,
) -> Result<CaptureOutcome, CaptureError> {
    session.prepare(config).await?;
    session.navigate(url.as_str(), config.nav_timeout).await?;
    session
        .select_language(
            &config.selectors,
            LANGUAGE_RELOAD_WAIT.min(config.nav_timeout),
        )
        .await;

    let screenshot_base64 = session
        .capture_region(&config.selectors, config.content_timeout)
        .await?;

    // The extractor runs against the still-open, localized page.
    let metadata = extract::extract_metadata(session, config).await;

    Ok(match metadata {
        Some(meta) => CaptureOutcome {
            screenshot_base64,
            weapon_base_monster: Some(meta.weapon_base_monster),
            weapon_type: Some(meta.weapon_type),
            monster_icon_url: meta.monster_icon,
            weapon_type_icon_url: meta.weapon_type_icon,
        },
        None => CaptureOutcome {
            screenshot_base64,
            weapon_base_monster: None,
            weapon_type: None,
            monster_icon_url: None,
            weapon_type_icon_url: None,
        },
    })
}
