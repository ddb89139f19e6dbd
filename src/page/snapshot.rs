use anyhow::{Context, Result};
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::warn;
use url::Url;

use crate::platform;

use super::memory::{ElementKey, MemoryPage, Node, Rect, VideoPlayback};

/// Upper bound on tracked elements per snapshot; page churn beyond this
/// is picked up by later refreshes.
const MAX_TRACKED: usize = 200;

const POST_ROW_HEIGHT: f32 = 200.0;
const VIDEO_ROW_HEIGHT: f32 = 400.0;

/// Builds `MemoryPage` snapshots from live HTML. A refreshed snapshot is
/// the mutation-event analogue: scans run against whatever the latest
/// build contains.
pub struct SnapshotLoader {
    http: Client,
    page_url: Url,
    hostname: String,
    post_selector: Option<Selector>,
    video_selector: Option<Selector>,
}

impl SnapshotLoader {
    pub fn new(http: Client, page_url: Url, hostname: &str) -> Self {
        let post_selector = platform::post_selector(hostname).and_then(parse_selector);
        let video_selector = platform::video_selector(hostname).and_then(parse_selector);
        Self {
            http,
            page_url,
            hostname: hostname.to_string(),
            post_selector,
            video_selector,
        }
    }

    /// Whether the platform adapter knows this hostname at all.
    pub fn is_supported(&self) -> bool {
        self.post_selector.is_some() || self.video_selector.is_some()
    }

    pub async fn fetch(&self) -> Result<Option<MemoryPage>> {
        let response = self
            .http
            .get(self.page_url.clone())
            .send()
            .await
            .with_context(|| format!("failed to fetch {}", self.page_url))?;
        if !response.status().is_success() {
            return Ok(None);
        }
        let body = response.text().await?;
        Ok(Some(self.build(&body)))
    }

    pub fn build(&self, html: &str) -> MemoryPage {
        let document = Html::parse_document(html);
        let mut page = MemoryPage::new(&self.hostname);
        let body = page.body();
        let mut row = 0usize;

        if let Some(selector) = &self.post_selector {
            for matched in document.select(selector).take(MAX_TRACKED) {
                let text = collapse_whitespace(&matched.text().collect::<Vec<_>>().join(" "));
                if text.is_empty() {
                    continue;
                }

                let article = page.create_element("article");
                let post = page.create_element("div");
                page.set_attr(post, "data-role", "post");
                page.set_key(post, ElementKey::derive("post", &text));
                page.set_rect(
                    post,
                    Rect::new(0.0, row as f32 * POST_ROW_HEIGHT, 800.0, 180.0),
                );
                page.append_child(post, Node::Text(text));
                page.append_child(article, Node::Element(post));
                page.append_child(body, Node::Element(article));
                row += 1;
            }
        }

        if let Some(selector) = &self.video_selector {
            for (index, matched) in document.select(selector).take(MAX_TRACKED).enumerate() {
                let poster = matched
                    .value()
                    .attr("poster")
                    .and_then(|raw| self.page_url.join(raw).ok())
                    .map(|url| url.to_string());
                let src = matched.value().attr("src").unwrap_or_default().to_string();
                let identity = poster
                    .clone()
                    .filter(|p| !p.is_empty())
                    .unwrap_or_else(|| {
                        if src.is_empty() {
                            format!("video-index-{index}")
                        } else {
                            src.clone()
                        }
                    });

                let container = page.create_element("div");
                page.add_class(container, "video-container");
                let video = page.create_element("video");
                page.set_key(video, ElementKey::derive("video", &identity));
                page.set_video(video, VideoPlayback::default());
                page.set_rect(
                    video,
                    Rect::new(
                        0.0,
                        row as f32 * VIDEO_ROW_HEIGHT,
                        parse_dimension(matched.value().attr("width"), 640.0),
                        parse_dimension(matched.value().attr("height"), 360.0),
                    ),
                );
                if let Some(poster) = poster {
                    page.set_attr(video, "poster", &poster);
                }
                page.append_child(container, Node::Element(video));
                page.append_child(body, Node::Element(container));
                row += 1;
            }
        }

        page
    }
}

fn parse_selector(raw: &str) -> Option<Selector> {
    match Selector::parse(raw) {
        Ok(selector) => Some(selector),
        Err(err) => {
            warn!(target: "snapshot", selector = raw, error = %err, "invalid platform selector");
            None
        }
    }
}

fn parse_dimension(raw: Option<&str>, default: f32) -> f32 {
    raw.and_then(|value| value.trim().parse::<f32>().ok())
        .filter(|value| *value > 0.0)
        .unwrap_or(default)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
