use std::time::Duration;

use anyhow::Context as _;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use url::Url;

use crate::config::CaptureConfig;
use crate::driver::BrowserSession;

const ICON_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Labels and icons scraped off the loaded build page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildMetadata {
    pub weapon_base_monster: String,
    pub weapon_type: String,
    pub monster_icon: Option<String>,
    pub weapon_type_icon: Option<String>,
}

/// Reads structured hints out of the already-loaded page.
///
/// Everything here is best-effort: a missing weapon-name element skips
/// extraction entirely, a missing or unfetchable icon skips that icon, and
/// no failure in this module ever fails the capture. `None` means the
/// screenshot goes out unlabeled.
pub async fn extract_metadata(
    session: &BrowserSession,
    config: &CaptureConfig,
) -> Option<BuildMetadata> {
    let selectors = &config.selectors;

    let label = match session.inner_text(&selectors.weapon_name).await {
        Ok(Some(label)) => label,
        Ok(None) => {
            tracing::debug!(selector = %selectors.weapon_name, "weapon name not found; skipping metadata");
            return None;
        }
        Err(err) => {
            tracing::debug!(?err, "weapon name read failed; skipping metadata");
            return None;
        }
    };
    let (weapon_base_monster, weapon_type) = split_weapon_label(&label);

    let page_url = match session.current_url().await.map(|raw| Url::parse(&raw)) {
        Ok(Ok(url)) => Some(url),
        Ok(Err(err)) => {
            tracing::debug!(?err, "page url unparseable; skipping icons");
            None
        }
        Err(err) => {
            tracing::debug!(?err, "page url unavailable; skipping icons");
            None
        }
    };

    let (monster_icon, weapon_type_icon) = match &page_url {
        Some(page_url) => {
            let client = icon_client();
            (
                fetch_icon(session, &client, page_url, &selectors.monster_icon).await,
                fetch_icon(session, &client, page_url, &selectors.weapon_type_icon).await,
            )
        }
        None => (None, None),
    };

    Some(BuildMetadata {
        weapon_base_monster,
        weapon_type,
        monster_icon,
        weapon_type_icon,
    })
}

/// Splits `"<base monster> <weapon type>"` at the *last* space. Multi-word
/// monster names keep their spaces; a single word is all monster, no type.
pub fn split_weapon_label(label: &str) -> (String, String) {
    let label = label.trim();
    match label.rsplit_once(' ') {
        Some((monster, weapon)) => (monster.trim_end().to_string(), weapon.to_string()),
        None => (label.to_string(), String::new()),
    }
}

fn icon_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(ICON_FETCH_TIMEOUT)
        .build()
        .unwrap_or_default()
}

/// Resolves an icon element's `src` against the page URL, fetches it, and
/// inlines it as a data URI so stored cards never hot-link the source site.
async fn fetch_icon(
    session: &BrowserSession,
    client: &reqwest::Client,
    page_url: &Url,
    selector: &str,
) -> Option<String> {
    let src = match session.attribute(selector, "src").await {
        Ok(Some(src)) if !src.trim().is_empty() => src,
        Ok(_) => {
            tracing::debug!(selector, "icon element or src missing");
            return None;
        }
        Err(err) => {
            tracing::debug!(?err, selector, "icon src read failed");
            return None;
        }
    };

    let icon_url = match page_url.join(src.trim()) {
        Ok(url) => url,
        Err(err) => {
            tracing::debug!(?err, src, "icon src did not resolve");
            return None;
        }
    };

    match fetch_icon_data_uri(client, &icon_url).await {
        Ok(data_uri) => Some(data_uri),
        Err(err) => {
            tracing::debug!(?err, icon_url = %icon_url, "icon fetch failed");
            None
        }
    }
}

/// Downloads image bytes and re-encodes them as `data:<mime>;base64,…`.
pub async fn fetch_icon_data_uri(client: &reqwest::Client, url: &Url) -> anyhow::Result<String> {
    let response = client
        .get(url.clone())
        .send()
        .await
        .with_context(|| format!("GET {url}"))?;

    if !response.status().is_success() {
        anyhow::bail!("GET {url}: status {}", response.status());
    }

    let mime = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .filter(|v| v.starts_with("image/"))
        .unwrap_or("image/png")
        .to_string();

    let bytes = response
        .bytes()
        .await
        .with_context(|| format!("read body of {url}"))?;
    if bytes.is_empty() {
        anyhow::bail!("GET {url}: empty body");
    }

    Ok(format!("data:{mime};base64,{}", BASE64.encode(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_splits_at_last_space() {
        assert_eq!(
            split_weapon_label("Rathalos Greatsword"),
            ("Rathalos".to_string(), "Greatsword".to_string())
        );
    }

    #[test]
    fn multi_word_monster_keeps_its_spaces() {
        assert_eq!(
            split_weapon_label("Azure Rathalos Bow"),
            ("Azure Rathalos".to_string(), "Bow".to_string())
        );
    }

    #[test]
    fn single_word_is_all_monster() {
        assert_eq!(
            split_weapon_label("Rathalos"),
            ("Rathalos".to_string(), String::new())
        );
    }

    #[test]
    fn surrounding_whitespace_is_trimmed() {
        assert_eq!(
            split_weapon_label("  Legiana Hammer \n"),
            ("Legiana".to_string(), "Hammer".to_string())
        );
    }

    #[test]
    fn empty_label_yields_empty_fields() {
        assert_eq!(split_weapon_label("   "), (String::new(), String::new()));
    }
}
