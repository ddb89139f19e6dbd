use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use futures::future::BoxFuture;

use crate::{
    broker::{
        Bus, ContextId, Envelope,
        protocol::{self, TextPayload},
    },
    domain::TriageResult,
    page::{ElementId, ElementKey, MemoryPage, Node},
};

/// Posts shorter than this after trimming are not worth a classifier call.
pub const MIN_ANALYZABLE_CHARS: usize = 20;
/// Verdicts below this confidence do not earn a badge.
pub const BADGE_CONFIDENCE_THRESHOLD: u8 = 60;
pub const BADGE_CLASS: &str = "triage-badge";

pub fn is_analyzable(text: &str) -> bool {
    text.trim().chars().count() >= MIN_ANALYZABLE_CHARS
}

pub fn severity_label(confidence: u8) -> &'static str {
    if confidence >= 70 {
        "high"
    } else if confidence >= 40 {
        "medium"
    } else {
        "low"
    }
}

/// Seam between the scanner and the remote text classifier. Production
/// routes through the broker; a `None` covers every failure mode alike
/// (timeout, lost message, torn-down context, remote error).
pub trait TextAnalyzer: Send + Sync {
    fn analyze<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Option<TriageResult>>;
}

pub struct BrokerTextAnalyzer {
    bus: Arc<Bus>,
    timeout: Duration,
}

impl BrokerTextAnalyzer {
    pub fn new(bus: Arc<Bus>, timeout: Duration) -> Self {
        Self { bus, timeout }
    }
}

impl TextAnalyzer for BrokerTextAnalyzer {
    fn analyze<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Option<TriageResult>> {
        Box::pin(async move {
            let envelope = Envelope::with_payload(
                protocol::ANALYZE_TEXT,
                &TextPayload {
                    text: text.to_string(),
                },
            )
            .ok()?;
            let reply = self
                .bus
                .request(ContextId::Broker, envelope, self.timeout)
                .await?;
            reply.payload_as::<TriageResult>()
        })
    }
}

/// Finds unscanned post elements, submits qualifying text, and badges
/// confident verdicts. The scan-marker set is keyed by element
/// fingerprint so a marker survives snapshot rebuilds; verdicts are
/// cached for the same reason, since a rebuilt tree loses injected
/// badge nodes.
pub struct PostScanner {
    scanned: HashSet<ElementKey>,
    verdicts: HashMap<ElementKey, TriageResult>,
}

impl PostScanner {
    pub fn new() -> Self {
        Self {
            scanned: HashSet::new(),
            verdicts: HashMap::new(),
        }
    }

    /// Idempotent; safe to call on every mutation event and timer tick.
    /// Returns how many elements were submitted for analysis.
    pub async fn scan_posts(&mut self, page: &mut MemoryPage, analyzer: &dyn TextAnalyzer) -> usize {
        let mut submitted = 0;
        for id in page.elements_with_attr("data-role", "post") {
            let Some(key) = page.key(id).cloned() else {
                continue;
            };
            if self.scanned.contains(&key) {
                if let Some(result) = self.verdicts.get(&key) {
                    inject_badge(page, id, result);
                }
                continue;
            }
            self.scanned.insert(key.clone());

            let text = page.text_content(id);
            let text = text.trim();
            if !is_analyzable(text) {
                continue;
            }
            submitted += 1;

            let Some(result) = analyzer.analyze(text).await else {
                // Dropped sample; the next snapshot that changes this
                // post produces a fresh fingerprint and a fresh attempt.
                continue;
            };
            if result.confidence >= BADGE_CONFIDENCE_THRESHOLD {
                inject_badge(page, id, &result);
                self.verdicts.insert(key, result);
            }
        }
        submitted
    }

    pub fn sweep(&mut self, present: &HashSet<ElementKey>) {
        self.scanned.retain(|key| present.contains(key));
        self.verdicts.retain(|key, _| present.contains(key));
    }

    #[cfg(test)]
    pub fn scanned_count(&self) -> usize {
        self.scanned.len()
    }
}

fn inject_badge(page: &mut MemoryPage, post: ElementId, result: &TriageResult) {
    let container = page
        .closest(post, |el| el.tag == "article")
        .unwrap_or(post);
    let already_badged = page
        .child_elements(container)
        .into_iter()
        .any(|child| page.has_class(child, BADGE_CLASS));
    if already_badged {
        return;
    }

    let badge = page.create_element("span");
    page.add_class(badge, BADGE_CLASS);
    page.add_class(
        badge,
        match severity_label(result.confidence) {
            "high" => "triage-badge-high",
            "medium" => "triage-badge-medium",
            _ => "triage-badge-low",
        },
    );
    page.set_text(badge, &format!("{} · {}%", result.verdict, result.confidence));
    page.set_attr(badge, "title", &result.summary);
    page.append_child(container, Node::Element(badge));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedAnalyzer {
        result: Option<TriageResult>,
        calls: AtomicUsize,
    }

    impl FixedAnalyzer {
        fn new(result: Option<TriageResult>) -> Self {
            Self {
                result,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl TextAnalyzer for FixedAnalyzer {
        fn analyze<'a>(&'a self, _text: &'a str) -> BoxFuture<'a, Option<TriageResult>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { self.result.clone() })
        }
    }

    fn verdict(confidence: u8) -> TriageResult {
        TriageResult {
            verdict: "FALSE".into(),
            confidence,
            summary: "fabricated claim".into(),
            highlights: Vec::new(),
        }
    }

    fn page_with_post(text: &str) -> (MemoryPage, ElementId, ElementId) {
        let mut page = MemoryPage::new("www.facebook.com");
        let article = page.create_element("article");
        let post = page.create_element("div");
        page.set_attr(post, "data-role", "post");
        page.set_key(post, ElementKey::derive("post", text));
        page.append_child(post, Node::Text(text.to_string()));
        page.append_child(article, Node::Element(post));
        let body = page.body();
        page.append_child(body, Node::Element(article));
        (page, article, post)
    }

    #[test]
    fn analyzable_boundary_sits_at_twenty_chars() {
        assert!(!is_analyzable("exactly 19 chars..!"));
        assert!(is_analyzable("exactly twenty chars"));
        assert!(!is_analyzable("   padded        "));
        assert!(is_analyzable("  This is exactly twenty chars  "));
    }

    #[test]
    fn severity_bands_have_exact_boundaries() {
        assert_eq!(severity_label(70), "high");
        assert_eq!(severity_label(69), "medium");
        assert_eq!(severity_label(40), "medium");
        assert_eq!(severity_label(39), "low");
        assert_eq!(severity_label(0), "low");
        assert_eq!(severity_label(100), "high");
    }

    #[tokio::test]
    async fn confident_verdict_badges_the_article_exactly_once() {
        let (mut page, article, _post) = page_with_post("This is exactly twenty chars");
        let analyzer = FixedAnalyzer::new(Some(verdict(72)));
        let mut scanner = PostScanner::new();

        let submitted = scanner.scan_posts(&mut page, &analyzer).await;
        assert_eq!(submitted, 1);
        // Two more passes over the same DOM must not resubmit or re-badge.
        scanner.scan_posts(&mut page, &analyzer).await;
        scanner.scan_posts(&mut page, &analyzer).await;
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 1);

        let badges: Vec<_> = page
            .child_elements(article)
            .into_iter()
            .filter(|id| page.has_class(*id, BADGE_CLASS))
            .collect();
        assert_eq!(badges.len(), 1);
        assert_eq!(page.text_content(badges[0]), "FALSE · 72%");
        assert!(page.has_class(badges[0], "triage-badge-high"));
    }

    #[tokio::test]
    async fn low_confidence_verdict_leaves_the_post_unbadged() {
        let (mut page, article, _post) = page_with_post("A post long enough to analyze");
        let analyzer = FixedAnalyzer::new(Some(verdict(59)));
        let mut scanner = PostScanner::new();
        scanner.scan_posts(&mut page, &analyzer).await;
        assert!(
            page.child_elements(article)
                .into_iter()
                .all(|id| !page.has_class(id, BADGE_CLASS))
        );
    }

    #[tokio::test]
    async fn analysis_failure_is_a_silent_drop_without_retry() {
        let (mut page, article, _post) = page_with_post("A post long enough to analyze");
        let analyzer = FixedAnalyzer::new(None);
        let mut scanner = PostScanner::new();
        scanner.scan_posts(&mut page, &analyzer).await;
        scanner.scan_posts(&mut page, &analyzer).await;
        // One attempt only; the marker blocks a retry.
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 1);
        assert!(page.child_elements(article).is_empty() || {
            page.child_elements(article)
                .into_iter()
                .all(|id| !page.has_class(id, BADGE_CLASS))
        });
    }

    #[tokio::test]
    async fn short_posts_are_marked_but_never_submitted() {
        let (mut page, _article, _post) = page_with_post("too short");
        let analyzer = FixedAnalyzer::new(Some(verdict(90)));
        let mut scanner = PostScanner::new();
        let submitted = scanner.scan_posts(&mut page, &analyzer).await;
        assert_eq!(submitted, 0);
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 0);
        assert_eq!(scanner.scanned_count(), 1);
    }

    #[tokio::test]
    async fn badges_are_reapplied_after_a_snapshot_rebuild() {
        let text = "This is exactly twenty chars";
        let (mut page, _, _) = page_with_post(text);
        let analyzer = FixedAnalyzer::new(Some(verdict(72)));
        let mut scanner = PostScanner::new();
        scanner.scan_posts(&mut page, &analyzer).await;

        // Fresh tree, same content: no classifier call, badge restored.
        let (mut rebuilt, article, _) = page_with_post(text);
        scanner.scan_posts(&mut rebuilt, &analyzer).await;
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 1);
        assert!(
            rebuilt
                .child_elements(article)
                .into_iter()
                .any(|id| rebuilt.has_class(id, BADGE_CLASS))
        );
    }

    #[tokio::test]
    async fn sweep_forgets_elements_gone_from_the_page() {
        let (mut page, _, _) = page_with_post("A post long enough to analyze");
        let analyzer = FixedAnalyzer::new(Some(verdict(72)));
        let mut scanner = PostScanner::new();
        scanner.scan_posts(&mut page, &analyzer).await;
        assert_eq!(scanner.scanned_count(), 1);

        scanner.sweep(&HashSet::new());
        assert_eq!(scanner.scanned_count(), 0);
    }
}
