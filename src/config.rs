use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

const MOBILE_USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 16_6 like Mac OS X) \
     AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.6 Mobile/15E148 Safari/604.1";

/// CSS selectors targeting the external build page.
///
/// These are a contract with a third-party DOM, not internal design: the site
/// can break them with any redeploy on its side. They load from a YAML file
/// so an operator can re-tune them without rebuilding this service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SelectorSet {
    /// First element of the capture region.
    pub region_start: String,
    /// Last element of the capture region; doubles as the readiness marker.
    pub region_end: String,
    /// Language `<select>` control, if the page has one.
    pub language_control: String,
    /// Option value to pick on the language control.
    pub language_value: String,
    /// Text element holding "<base monster> <weapon type>".
    pub weapon_name: String,
    pub monster_icon: String,
    pub weapon_type_icon: String,
}

impl Default for SelectorSet {
    fn default() -> Self {
        Self {
            region_start: "#app > div.main.ko.svelte-1oecyh1 > div:nth-child(6)".to_string(),
            region_end: "#app > div.main.ko.svelte-1oecyh1 > div.drift-buff.mobile.svelte-1oecyh1"
                .to_string(),
            language_control: "#app select.language-select".to_string(),
            language_value: "ko".to_string(),
            weapon_name: "#app div.weapon-name".to_string(),
            monster_icon: "#app img.monster-icon".to_string(),
            weapon_type_icon: "#app img.weapon-type-icon".to_string(),
        }
    }
}

impl SelectorSet {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("read selector config: {}", path.display()))?;
        serde_yaml::from_str(&yaml)
            .with_context(|| format!("parse selector config: {}", path.display()))
    }

    pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

/// Everything one capture run needs besides the target URL.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub selectors: SelectorSet,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub user_agent: String,
    pub accept_language: String,
    /// Bound on navigation (and the post-language-switch reload).
    pub nav_timeout: Duration,
    /// Bound on waiting for the end-of-region marker to appear.
    pub content_timeout: Duration,
    /// URL patterns blocked while the page loads.
    pub blocked_url_patterns: Vec<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            selectors: SelectorSet::default(),
            viewport_width: 390,
            viewport_height: 844,
            user_agent: MOBILE_USER_AGENT.to_string(),
            accept_language: "ko-KR,ko;q=0.9,en;q=0.5".to_string(),
            nav_timeout: Duration::from_secs(30),
            content_timeout: Duration::from_secs(20),
            blocked_url_patterns: default_blocked_url_patterns(),
        }
    }
}

/// Analytics/ad hosts and media payloads; none of them affect the DOM the
/// capture targets, and the media in particular dominates load time.
fn default_blocked_url_patterns() -> Vec<String> {
    [
        "*googletagmanager.com*",
        "*google-analytics.com*",
        "*doubleclick.net*",
        "*googlesyndication.com*",
        "*adsystem.com*",
        "*facebook.net*",
        "*.mp3",
        "*.mp4",
        "*.webm",
        "*.m3u8",
        "*.ogg",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}
