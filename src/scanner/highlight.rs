use crate::{
    domain::TriageHighlight,
    page::{ElementId, MemoryPage, Node},
};

pub const HIGHLIGHT_CLASS: &str = "phrase-highlight";
pub const BANNER_CLASS: &str = "verdict-banner";
/// A candidate content container must carry at least this much text.
pub const MIN_CONTAINER_TEXT: usize = 200;

/// Broad content selectors tried in order when no selection container
/// was captured.
const CONTAINER_TAGS: [&str; 4] = ["article", "main", "section", "div"];

/// Renders the verdict banner and phrase-level annotations. The
/// selection container is captured eagerly because the user action that
/// triggers analysis clears the native selection as a side effect.
pub struct HighlightEngine {
    captured: Option<ElementId>,
}

impl HighlightEngine {
    pub fn new() -> Self {
        Self { captured: None }
    }

    /// Records the current selection's container before it can vanish.
    pub fn capture_selection(&mut self, page: &MemoryPage) {
        if let Some(selection) = page.selection() {
            self.captured = Some(selection);
        }
    }

    pub fn captured(&self) -> Option<ElementId> {
        self.captured
    }

    /// Container that phrase highlights should target: the captured
    /// selection container when still present, otherwise the best broad
    /// content container.
    pub fn target_container(&self, page: &MemoryPage) -> ElementId {
        self.captured
            .filter(|id| page.element(*id).is_some())
            .unwrap_or_else(|| find_best_container(page))
    }

    /// Inserts a dismissible banner at the top of the body, replacing
    /// any earlier banner.
    pub fn render_banner(
        &self,
        page: &mut MemoryPage,
        verdict: &str,
        confidence: u8,
        summary: &str,
    ) -> ElementId {
        for stale in page.elements_with_class(BANNER_CLASS) {
            page.remove_element(stale);
        }
        let banner = page.create_element("div");
        page.add_class(banner, BANNER_CLASS);
        page.set_attr(banner, "data-dismissible", "true");
        page.set_text(banner, &format!("{verdict} ({confidence}%): {summary}"));
        let body = page.body();
        page.insert_first(body, Node::Element(banner));
        banner
    }

    pub fn dismiss_banner(&self, page: &mut MemoryPage) {
        for banner in page.elements_with_class(BANNER_CLASS) {
            page.remove_element(banner);
        }
    }

    /// Wraps the first verbatim occurrence of each phrase in a span,
    /// skipping text already inside a prior highlight. Re-applying the
    /// same highlights is a no-op. Returns how many were applied.
    pub fn apply_highlights(
        &self,
        page: &mut MemoryPage,
        container: ElementId,
        highlights: &[TriageHighlight],
    ) -> usize {
        let mut applied = 0;
        for highlight in highlights {
            if highlight.text.is_empty() {
                continue;
            }
            let Some((element, child_index, start)) =
                find_first_occurrence(page, container, &highlight.text)
            else {
                continue;
            };
            let end = start + highlight.text.len();
            if let Some(span) =
                page.wrap_text_slice(element, child_index, start, end, "span", HIGHLIGHT_CLASS)
            {
                page.set_attr(span, "data-label", &highlight.label);
                applied += 1;
            }
        }
        applied
    }

    /// Unwraps every highlight span and merges the text back together,
    /// restoring the container's visible text exactly.
    pub fn clear_highlights(&self, page: &mut MemoryPage) {
        for span in page.elements_with_class(HIGHLIGHT_CLASS) {
            page.unwrap_element(span);
        }
        let body = page.body();
        page.normalize(body);
    }
}

/// First candidate from the broad-selector priority list whose text is
/// long enough to be a real content container; the body otherwise.
pub fn find_best_container(page: &MemoryPage) -> ElementId {
    for tag in CONTAINER_TAGS {
        for candidate in page.elements_with_tag(tag) {
            let text = page.text_content(candidate);
            if text.trim().chars().count() > MIN_CONTAINER_TEXT {
                return candidate;
            }
        }
    }
    page.body()
}

/// Document-order search for the first text node containing the phrase,
/// skipping subtrees already wrapped in a highlight span.
fn find_first_occurrence(
    page: &MemoryPage,
    root: ElementId,
    phrase: &str,
) -> Option<(ElementId, usize, usize)> {
    let data = page.element(root)?;
    if data.classes.iter().any(|class| class == HIGHLIGHT_CLASS) {
        return None;
    }
    for (index, node) in data.children.iter().enumerate() {
        match node {
            Node::Text(text) => {
                if let Some(position) = text.find(phrase) {
                    return Some((root, index, position));
                }
            }
            Node::Element(child) => {
                if let Some(hit) = find_first_occurrence(page, *child, phrase) {
                    return Some(hit);
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const LONG_TEXT: &str = "The miracle cure spreading on social feeds this week has no \
        clinical backing whatsoever, according to three independent reviews. Researchers \
        warn that the viral posts recycle a debunked study and misquote its authors to \
        manufacture credibility among new audiences.";

    fn page_with_container() -> (MemoryPage, ElementId) {
        let mut page = MemoryPage::new("www.facebook.com");
        let container = page.create_element("article");
        page.append_child(container, Node::Text(LONG_TEXT.to_string()));
        let body = page.body();
        page.append_child(body, Node::Element(container));
        (page, container)
    }

    fn highlight(text: &str) -> TriageHighlight {
        TriageHighlight {
            text: text.into(),
            label: "ai".into(),
        }
    }

    #[test]
    fn apply_then_clear_restores_visible_text_exactly() {
        let (mut page, container) = page_with_container();
        let engine = HighlightEngine::new();

        let applied = engine.apply_highlights(
            &mut page,
            container,
            &[highlight("miracle cure"), highlight("debunked study")],
        );
        assert_eq!(applied, 2);
        assert_eq!(page.elements_with_class(HIGHLIGHT_CLASS).len(), 2);
        // Wrapping never changes visible text.
        assert_eq!(page.text_content(container), LONG_TEXT);

        engine.clear_highlights(&mut page);
        assert!(page.elements_with_class(HIGHLIGHT_CLASS).is_empty());
        assert_eq!(page.text_content(container), LONG_TEXT);
        // Normalization merged the split nodes back into one.
        assert_eq!(page.element(container).unwrap().children.len(), 1);
    }

    #[test]
    fn reapplying_the_same_phrase_skips_prior_highlights() {
        let (mut page, container) = page_with_container();
        let engine = HighlightEngine::new();

        assert_eq!(
            engine.apply_highlights(&mut page, container, &[highlight("miracle cure")]),
            1
        );
        // The only occurrence is now inside a highlight span.
        assert_eq!(
            engine.apply_highlights(&mut page, container, &[highlight("miracle cure")]),
            0
        );
        assert_eq!(page.elements_with_class(HIGHLIGHT_CLASS).len(), 1);
    }

    #[test]
    fn missing_phrases_are_ignored() {
        let (mut page, container) = page_with_container();
        let engine = HighlightEngine::new();
        assert_eq!(
            engine.apply_highlights(&mut page, container, &[highlight("not in the text")]),
            0
        );
    }

    #[test]
    fn banner_replaces_any_prior_banner() {
        let (mut page, _container) = page_with_container();
        let engine = HighlightEngine::new();

        engine.render_banner(&mut page, "FALSE", 72, "fabricated claim");
        engine.render_banner(&mut page, "MISLEADING", 55, "out of context");
        let banners = page.elements_with_class(BANNER_CLASS);
        assert_eq!(banners.len(), 1);
        assert_eq!(
            page.text_content(banners[0]),
            "MISLEADING (55%): out of context"
        );

        engine.dismiss_banner(&mut page);
        assert!(page.elements_with_class(BANNER_CLASS).is_empty());
    }

    #[test]
    fn best_container_requires_substantial_text() {
        let (page, container) = page_with_container();
        assert_eq!(find_best_container(&page), container);

        let mut sparse = MemoryPage::new("www.facebook.com");
        let small = sparse.create_element("article");
        sparse.append_child(small, Node::Text("barely any text".into()));
        let body = sparse.body();
        sparse.append_child(body, Node::Element(small));
        assert_eq!(find_best_container(&sparse), sparse.body());
    }

    #[test]
    fn captured_selection_wins_over_container_search() {
        let (mut page, container) = page_with_container();
        let aside = page.create_element("div");
        page.append_child(aside, Node::Text("selected snippet".into()));
        let body = page.body();
        page.append_child(body, Node::Element(aside));

        let mut engine = HighlightEngine::new();
        assert_eq!(engine.target_container(&page), container);

        page.set_selection(Some(aside));
        engine.capture_selection(&page);
        // Selection cleared afterwards; the captured container persists.
        page.set_selection(None);
        assert_eq!(engine.target_container(&page), aside);
    }

    #[test]
    fn captured_container_gone_falls_back_to_search() {
        let (mut page, container) = page_with_container();
        let aside = page.create_element("div");
        let body = page.body();
        page.append_child(body, Node::Element(aside));

        let mut engine = HighlightEngine::new();
        page.set_selection(Some(aside));
        engine.capture_selection(&page);
        page.remove_element(aside);
        assert_eq!(engine.target_container(&page), container);
    }
}
