use crate::domain::model::{Amount, ScrapeResult};
use crate::domain::ports::{BrowserSession, ElementHandle};
use crate::utils::error::{ScrapeError, ScrapeField};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_TITLE_SELECTOR: &str = r#"h1[class*="styled__ProjectTitle-sc-"]"#;
pub const DEFAULT_FUNDING_SELECTOR: &str = r#"[class*="FundingOverallStatus__StatusValue-"]"#;
pub const DEFAULT_IMAGE_SELECTOR: &str = r#"[class*="SingleCoverImage__ProjectCoverImage-"]"#;

const SOURCE_SNIPPET_CHARS: usize = 500;

#[derive(Debug, Clone)]
pub struct PageSelectors {
    pub title: String,
    pub funding: String,
    pub image: String,
}

impl Default for PageSelectors {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE_SELECTOR.to_string(),
            funding: DEFAULT_FUNDING_SELECTOR.to_string(),
            image: DEFAULT_IMAGE_SELECTOR.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReaderSettings {
    pub selectors: PageSelectors,
    pub element_timeout: Duration,
    pub poll_interval: Duration,
    /// Where timeout screenshots go. `None` keeps diagnostics in the log only.
    pub diagnostics_dir: Option<PathBuf>,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            selectors: PageSelectors::default(),
            element_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(250),
            diagnostics_dir: None,
        }
    }
}

/// Reads one project page through a browser session. Never touches stored state.
#[derive(Debug, Clone, Default)]
pub struct PageReader {
    settings: ReaderSettings,
}

impl PageReader {
    pub fn new(settings: ReaderSettings) -> Self {
        Self { settings }
    }

    pub async fn read_project<B>(&self, session: &B, url: &str) -> Result<ScrapeResult, ScrapeError>
    where
        B: BrowserSession + ?Sized,
    {
        tracing::debug!("Reading project page: {}", url);
        session
            .navigate(url)
            .await
            .map_err(|e| ScrapeError::driver(url, e))?;

        let selectors = &self.settings.selectors;

        let title_element = match self.wait_visible(session, url, &selectors.title).await? {
            Some(element) => element,
            None => {
                self.capture_diagnostics(session, url, &selectors.title).await;
                return Err(ScrapeError::timeout(url, ScrapeField::Title, &selectors.title));
            }
        };
        let title = session
            .text(&title_element)
            .await
            .map_err(|e| ScrapeError::driver(url, e))?
            .trim()
            .to_string();

        let funding_element = match self.wait_visible(session, url, &selectors.funding).await? {
            Some(element) => element,
            None => {
                tracing::error!(
                    "Funding element not found (timeout): {} - selector: {}",
                    url,
                    selectors.funding
                );
                return Err(ScrapeError::timeout(url, ScrapeField::Funding, &selectors.funding));
            }
        };
        let funding_text = session
            .text(&funding_element)
            .await
            .map_err(|e| ScrapeError::driver(url, e))?;
        let funding = parse_funding(&funding_text)
            .ok_or_else(|| ScrapeError::parse(url, ScrapeField::Funding, funding_text.trim()))?;

        let image_url = self.read_image(session, url).await;

        Ok(ScrapeResult {
            title: (!title.is_empty()).then_some(title),
            funding_amount: Some(funding),
            image_url,
        })
    }

    async fn read_image<B>(&self, session: &B, url: &str) -> Option<String>
    where
        B: BrowserSession + ?Sized,
    {
        let selector = &self.settings.selectors.image;
        let container = match self.wait_visible(session, url, selector).await {
            Ok(Some(element)) => element,
            Ok(None) => {
                tracing::warn!("Project image not found: {} (continuing)", url);
                return None;
            }
            Err(e) => {
                tracing::warn!("Project image lookup failed: {} - {} (continuing)", url, e);
                return None;
            }
        };

        match session.child_attribute(&container, "img", "src").await {
            Ok(src) => src.filter(|s| !s.is_empty()),
            Err(e) => {
                tracing::warn!("Project image has no usable img: {} - {} (continuing)", url, e);
                None
            }
        }
    }

    /// Polls until the element is displayed or the element timeout passes.
    async fn wait_visible<B>(&self, session: &B, url: &str, selector: &str) -> Result<Option<ElementHandle>, ScrapeError>
    where
        B: BrowserSession + ?Sized,
    {
        let deadline = Instant::now() + self.settings.element_timeout;
        loop {
            if let Some(element) = session
                .find_visible(selector)
                .await
                .map_err(|e| ScrapeError::driver(url, e))?
            {
                return Ok(Some(element));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(self.settings.poll_interval.min(deadline - now)).await;
        }
    }

    async fn capture_diagnostics<B>(&self, session: &B, url: &str, selector: &str)
    where
        B: BrowserSession + ?Sized,
    {
        tracing::error!("Project title not found (timeout): {} - selector: {}", url, selector);

        if let Some(dir) = &self.settings.diagnostics_dir {
            match session.screenshot_png().await {
                Ok(png) => {
                    let path = dir.join(format!(
                        "screenshot_timeout_{}.png",
                        chrono::Utc::now().format("%Y%m%dT%H%M%S%.3f")
                    ));
                    let written = match tokio::fs::create_dir_all(dir).await {
                        Ok(()) => tokio::fs::write(&path, png).await,
                        Err(e) => Err(e),
                    };
                    match written {
                        Ok(()) => tracing::error!("Screenshot saved: {}", path.display()),
                        Err(e) => tracing::warn!("Could not save screenshot {}: {}", path.display(), e),
                    }
                }
                Err(e) => tracing::warn!("Screenshot failed: {}", e),
            }
        }

        match session.current_url().await {
            Ok(current) => tracing::error!("Current URL: {}", current),
            Err(e) => tracing::warn!("Current URL unavailable: {}", e),
        }
        match session.page_source().await {
            Ok(source) => {
                let snippet: String = source.chars().take(SOURCE_SNIPPET_CHARS).collect();
                tracing::error!("Page source (excerpt): {}...", snippet);
            }
            Err(e) => tracing::warn!("Page source unavailable: {}", e),
        }
    }
}

/// Parses the funding status text, e.g. `1,234,500원`, `312%` or `87명`.
pub fn parse_funding(text: &str) -> Option<Amount> {
    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, ',' | '원' | '%' | '명') && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse().ok()
}
