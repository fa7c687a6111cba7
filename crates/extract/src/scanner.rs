use crate::{select_descendants, ExtractionMark, PageDocument, PageNode, Selector};
use tutor_protocol::{DEFAULT_SENDER, MIN_BODY_LEN};

/// Scanner configuration. The selector lists are configuration, not logic:
/// hosts point them at whatever markup their course platform emits.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Candidate message elements, tried in order.
    pub message_selectors: Vec<Selector>,
    /// Name-bearing sub-elements searched during the ancestor walk.
    pub name_selectors: Vec<Selector>,
    /// Lowercased keywords that flag a post as authored by course staff.
    pub instructor_keywords: Vec<String>,
    /// Trimmed text must be strictly longer than this to be captured.
    pub min_text_len: usize,
    /// How many ancestor levels to search for a sender name.
    pub max_ancestor_depth: usize,
    /// Sender used when no name element is found.
    pub default_sender: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            message_selectors: vec![
                Selector::Class("forum-post".to_string()),
                Selector::Class("message-content".to_string()),
                Selector::Class("discussion-text".to_string()),
                Selector::Class("student-comment".to_string()),
                Selector::ClassContains("message".to_string()),
                Selector::ClassContains("post".to_string()),
                Selector::ClassContains("comment".to_string()),
            ],
            name_selectors: vec![
                Selector::Class("user-name".to_string()),
                Selector::Class("author-name".to_string()),
                Selector::Class("student-name".to_string()),
                Selector::Class("posted-by".to_string()),
                Selector::Class("user-info".to_string()),
                Selector::ClassContains("name".to_string()),
                Selector::ClassContains("user".to_string()),
            ],
            instructor_keywords: vec![
                "instructor".to_string(),
                "teacher".to_string(),
                "trainer".to_string(),
                "course lead".to_string(),
                "moderator".to_string(),
            ],
            min_text_len: MIN_BODY_LEN,
            max_ancestor_depth: 3,
            default_sender: DEFAULT_SENDER.to_string(),
        }
    }
}

/// One accepted message element.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ExtractedMessage {
    pub node_id: u64,
    pub sender_name: String,
    pub body_text: String,
}

/// Detects unprocessed student messages in a document snapshot.
pub struct MessageScanner {
    config: ScanConfig,
}

impl MessageScanner {
    #[must_use]
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(ScanConfig::default())
    }

    #[must_use]
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Scan `doc` for unmarked message elements.
    ///
    /// Accepted elements are marked before being emitted, so scanning the
    /// same unchanged document again yields nothing. Elements rejected by
    /// the filters stay unmarked. No matches is an empty result, not an
    /// error.
    pub fn scan<D, M>(&self, doc: &D, marks: &mut M) -> Vec<ExtractedMessage>
    where
        D: PageDocument,
        M: ExtractionMark<D::Node>,
    {
        let mut found = Vec::new();
        for selector in &self.config.message_selectors {
            for node in doc.select(selector) {
                if marks.is_marked(&node) {
                    continue;
                }
                let body = node.text().trim().to_string();
                if body.chars().count() <= self.config.min_text_len {
                    log::debug!("skipping short candidate (node {})", node.node_id());
                    continue;
                }
                if self.looks_like_staff_post(&body) {
                    log::debug!("skipping staff post (node {})", node.node_id());
                    continue;
                }
                let sender_name = self.sender_for(&node);
                marks.mark(&node);
                found.push(ExtractedMessage {
                    node_id: node.node_id(),
                    sender_name,
                    body_text: body,
                });
            }
        }
        if !found.is_empty() {
            log::info!("captured {} student message(s)", found.len());
        }
        found
    }

    /// Coarse authorship filter; false positives/negatives are accepted.
    fn looks_like_staff_post(&self, body: &str) -> bool {
        let lowered = body.to_lowercase();
        self.config
            .instructor_keywords
            .iter()
            .any(|keyword| lowered.contains(keyword.as_str()))
    }

    /// Bounded ancestor search for a display name.
    ///
    /// Walks up to `max_ancestor_depth` levels; at each level the name
    /// selectors are tried in order against that ancestor's descendants and
    /// the first non-empty trimmed text wins. Missing or shallow ancestry
    /// falls back to the sentinel sender, never an error.
    fn sender_for<N: PageNode>(&self, node: &N) -> String {
        let mut current = node.parent();
        for _ in 0..self.config.max_ancestor_depth {
            let Some(ancestor) = current else {
                break;
            };
            for selector in &self.config.name_selectors {
                for candidate in select_descendants(&ancestor, selector) {
                    let text = candidate.text();
                    let name = text.trim();
                    if !name.is_empty() {
                        return name.to_string();
                    }
                }
            }
            current = ancestor.parent();
        }
        self.config.default_sender.clone()
    }
}
