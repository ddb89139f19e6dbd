use std::collections::{HashMap, HashSet, hash_map::DefaultHasher};
use std::hash::{Hash, Hasher};

/// Per-snapshot element handle. Ids follow creation order, so iterating
/// sorted ids walks the page deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ElementId(u64);

/// Stable content fingerprint used to track an element across snapshot
/// rebuilds. Scanner-side state (scan markers, pending set, risk state)
/// is keyed by this, and swept once the key disappears from the page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementKey(String);

impl ElementKey {
    pub fn derive(kind: &str, identity: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        kind.hash(&mut hasher);
        identity.hash(&mut hasher);
        ElementKey(format!("{kind}-{:016x}", hasher.finish()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const ZERO: Rect = Rect {
        x: 0.0,
        y: 0.0,
        width: 0.0,
        height: 0.0,
    };

    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.x + other.width
            && other.x < self.x + self.width
            && self.y < other.y + other.height
            && other.y < self.y + self.height
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VideoPlayback {
    pub paused: bool,
    pub ended: bool,
    /// Whether decoded frame data is available yet.
    pub ready: bool,
}

impl Default for VideoPlayback {
    fn default() -> Self {
        Self {
            paused: false,
            ended: false,
            ready: true,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Node {
    Text(String),
    Element(ElementId),
}

#[derive(Debug, Clone, Default)]
pub struct ElementData {
    pub tag: String,
    pub classes: Vec<String>,
    pub attrs: HashMap<String, String>,
    pub children: Vec<Node>,
    pub parent: Option<ElementId>,
    pub rect: Rect,
    pub video: Option<VideoPlayback>,
    pub key: Option<ElementKey>,
}

impl Default for Rect {
    fn default() -> Self {
        Rect::ZERO
    }
}

/// In-memory element tree standing in for the live page. All scanning
/// and overlay logic reads and mutates this, which keeps it testable
/// without a renderer.
pub struct MemoryPage {
    hostname: String,
    viewport: Rect,
    elements: HashMap<ElementId, ElementData>,
    body: ElementId,
    selection: Option<ElementId>,
    next_id: u64,
}

impl MemoryPage {
    pub fn new(hostname: &str) -> Self {
        let mut page = Self {
            hostname: hostname.to_string(),
            viewport: Rect::new(0.0, 0.0, 1280.0, 720.0),
            elements: HashMap::new(),
            body: ElementId(0),
            selection: None,
            next_id: 0,
        };
        page.body = page.alloc(ElementData {
            tag: "body".to_string(),
            ..ElementData::default()
        });
        page
    }

    fn alloc(&mut self, data: ElementData) -> ElementId {
        let id = ElementId(self.next_id);
        self.next_id += 1;
        self.elements.insert(id, data);
        id
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn body(&self) -> ElementId {
        self.body
    }

    pub fn viewport(&self) -> Rect {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: Rect) {
        self.viewport = viewport;
    }

    pub fn create_element(&mut self, tag: &str) -> ElementId {
        self.alloc(ElementData {
            tag: tag.to_string(),
            ..ElementData::default()
        })
    }

    pub fn element(&self, id: ElementId) -> Option<&ElementData> {
        self.elements.get(&id)
    }

    pub fn append_child(&mut self, parent: ElementId, node: Node) {
        if let Node::Element(child) = node {
            if let Some(data) = self.elements.get_mut(&child) {
                data.parent = Some(parent);
            }
        }
        if let Some(data) = self.elements.get_mut(&parent) {
            data.children.push(node);
        }
    }

    pub fn insert_first(&mut self, parent: ElementId, node: Node) {
        if let Node::Element(child) = node {
            if let Some(data) = self.elements.get_mut(&child) {
                data.parent = Some(parent);
            }
        }
        if let Some(data) = self.elements.get_mut(&parent) {
            data.children.insert(0, node);
        }
    }

    pub fn set_text(&mut self, id: ElementId, text: &str) {
        if let Some(data) = self.elements.get_mut(&id) {
            data.children = vec![Node::Text(text.to_string())];
        }
    }

    pub fn set_attr(&mut self, id: ElementId, name: &str, value: &str) {
        if let Some(data) = self.elements.get_mut(&id) {
            data.attrs.insert(name.to_string(), value.to_string());
        }
    }

    pub fn attr(&self, id: ElementId, name: &str) -> Option<&str> {
        self.elements
            .get(&id)
            .and_then(|data| data.attrs.get(name))
            .map(String::as_str)
    }

    pub fn add_class(&mut self, id: ElementId, class: &str) {
        if let Some(data) = self.elements.get_mut(&id) {
            if !data.classes.iter().any(|c| c == class) {
                data.classes.push(class.to_string());
            }
        }
    }

    pub fn has_class(&self, id: ElementId, class: &str) -> bool {
        self.elements
            .get(&id)
            .map_or(false, |data| data.classes.iter().any(|c| c == class))
    }

    pub fn set_rect(&mut self, id: ElementId, rect: Rect) {
        if let Some(data) = self.elements.get_mut(&id) {
            data.rect = rect;
        }
    }

    pub fn rect(&self, id: ElementId) -> Rect {
        self.elements.get(&id).map_or(Rect::ZERO, |data| data.rect)
    }

    pub fn set_video(&mut self, id: ElementId, playback: VideoPlayback) {
        if let Some(data) = self.elements.get_mut(&id) {
            data.video = Some(playback);
        }
    }

    pub fn video(&self, id: ElementId) -> Option<VideoPlayback> {
        self.elements.get(&id).and_then(|data| data.video)
    }

    pub fn set_key(&mut self, id: ElementId, key: ElementKey) {
        if let Some(data) = self.elements.get_mut(&id) {
            data.key = Some(key);
        }
    }

    pub fn key(&self, id: ElementId) -> Option<&ElementKey> {
        self.elements.get(&id).and_then(|data| data.key.as_ref())
    }

    pub fn find_by_key(&self, key: &ElementKey) -> Option<ElementId> {
        self.sorted_ids()
            .into_iter()
            .find(|id| self.key(*id) == Some(key))
    }

    pub fn parent(&self, id: ElementId) -> Option<ElementId> {
        self.elements.get(&id).and_then(|data| data.parent)
    }

    pub fn child_elements(&self, id: ElementId) -> Vec<ElementId> {
        self.elements.get(&id).map_or_else(Vec::new, |data| {
            data.children
                .iter()
                .filter_map(|node| match node {
                    Node::Element(child) => Some(*child),
                    Node::Text(_) => None,
                })
                .collect()
        })
    }

    /// Walks the element and its ancestors, returning the first match.
    pub fn closest(
        &self,
        id: ElementId,
        predicate: impl Fn(&ElementData) -> bool,
    ) -> Option<ElementId> {
        let mut current = Some(id);
        while let Some(cursor) = current {
            let data = self.elements.get(&cursor)?;
            if predicate(data) {
                return Some(cursor);
            }
            current = data.parent;
        }
        None
    }

    pub fn text_content(&self, id: ElementId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: ElementId, out: &mut String) {
        if let Some(data) = self.elements.get(&id) {
            for node in &data.children {
                match node {
                    Node::Text(text) => out.push_str(text),
                    Node::Element(child) => self.collect_text(*child, out),
                }
            }
        }
    }

    fn sorted_ids(&self) -> Vec<ElementId> {
        let mut ids: Vec<ElementId> = self.elements.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn elements_with_tag(&self, tag: &str) -> Vec<ElementId> {
        self.sorted_ids()
            .into_iter()
            .filter(|id| self.elements[id].tag == tag)
            .collect()
    }

    pub fn elements_with_class(&self, class: &str) -> Vec<ElementId> {
        self.sorted_ids()
            .into_iter()
            .filter(|id| self.elements[id].classes.iter().any(|c| c == class))
            .collect()
    }

    pub fn elements_with_attr(&self, name: &str, value: &str) -> Vec<ElementId> {
        self.sorted_ids()
            .into_iter()
            .filter(|id| self.elements[id].attrs.get(name).map(String::as_str) == Some(value))
            .collect()
    }

    /// Removes the element and its whole subtree, detaching it from its
    /// parent's child list.
    pub fn remove_element(&mut self, id: ElementId) {
        if let Some(parent) = self.parent(id) {
            if let Some(data) = self.elements.get_mut(&parent) {
                data.children
                    .retain(|node| !matches!(node, Node::Element(child) if *child == id));
            }
        }
        let mut stack = vec![id];
        while let Some(cursor) = stack.pop() {
            if let Some(data) = self.elements.remove(&cursor) {
                for node in data.children {
                    if let Node::Element(child) = node {
                        stack.push(child);
                    }
                }
            }
        }
        if self.selection == Some(id) {
            self.selection = None;
        }
    }

    /// Replaces the element with its own children in the parent's child
    /// list (the inverse of wrapping). Returns false when the element is
    /// detached or already gone.
    pub fn unwrap_element(&mut self, id: ElementId) -> bool {
        let (parent, inner) = match self.elements.get(&id) {
            Some(data) => match data.parent {
                Some(parent) => (parent, data.children.clone()),
                None => return false,
            },
            None => return false,
        };
        for node in &inner {
            if let Node::Element(child) = node {
                if let Some(data) = self.elements.get_mut(child) {
                    data.parent = Some(parent);
                }
            }
        }
        let Some(parent_data) = self.elements.get_mut(&parent) else {
            return false;
        };
        let Some(pos) = parent_data
            .children
            .iter()
            .position(|node| matches!(node, Node::Element(child) if *child == id))
        else {
            return false;
        };
        parent_data.children.splice(pos..=pos, inner);
        self.elements.remove(&id);
        true
    }

    /// Merges adjacent text nodes throughout the subtree, so repeated
    /// wrap/unwrap cycles leave the tree in canonical form.
    pub fn normalize(&mut self, id: ElementId) {
        for child in self.child_elements(id) {
            self.normalize(child);
        }
        if let Some(data) = self.elements.get_mut(&id) {
            let old = std::mem::take(&mut data.children);
            let mut merged: Vec<Node> = Vec::with_capacity(old.len());
            for node in old {
                match (merged.last_mut(), node) {
                    (Some(Node::Text(prev)), Node::Text(text)) => prev.push_str(&text),
                    (_, node) => merged.push(node),
                }
            }
            data.children = merged;
        }
    }

    /// Splits the text child at `child_index` and wraps `[start, end)`
    /// in a new element. Indices are byte offsets into the text node and
    /// must fall on char boundaries (substring matches always do).
    pub fn wrap_text_slice(
        &mut self,
        parent: ElementId,
        child_index: usize,
        start: usize,
        end: usize,
        tag: &str,
        class: &str,
    ) -> Option<ElementId> {
        let text = match self.elements.get(&parent)?.children.get(child_index)? {
            Node::Text(text) => text.clone(),
            Node::Element(_) => return None,
        };
        if start >= end || end > text.len() {
            return None;
        }
        if !text.is_char_boundary(start) || !text.is_char_boundary(end) {
            return None;
        }

        let before = text[..start].to_string();
        let middle = text[start..end].to_string();
        let after = text[end..].to_string();

        let span = self.alloc(ElementData {
            tag: tag.to_string(),
            classes: vec![class.to_string()],
            children: vec![Node::Text(middle)],
            parent: Some(parent),
            ..ElementData::default()
        });

        let mut replacement = Vec::with_capacity(3);
        if !before.is_empty() {
            replacement.push(Node::Text(before));
        }
        replacement.push(Node::Element(span));
        if !after.is_empty() {
            replacement.push(Node::Text(after));
        }

        let data = self.elements.get_mut(&parent)?;
        data.children.splice(child_index..=child_index, replacement);
        Some(span)
    }

    pub fn set_selection(&mut self, selection: Option<ElementId>) {
        self.selection = selection.filter(|id| self.elements.contains_key(id));
    }

    pub fn selection(&self) -> Option<ElementId> {
        self.selection
    }

    /// Keys currently attached to any element; the sweep input.
    pub fn present_keys(&self) -> HashSet<ElementKey> {
        self.elements
            .values()
            .filter_map(|data| data.key.clone())
            .collect()
    }
}
