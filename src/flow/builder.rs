//! Flow tree builder — composes a runtime [`FlowNode`] from a validated
//! [`FlowRecord`].
//!
//! Children are built first (post-order), then the parent node is shaped by
//! the record's answer/media combination:
//!
//! - exactly one answer plus media → a single-reply node carrying the media
//!   attachment. The built children are **not** attached on this branch; the
//!   upstream data model has always behaved this way, so the builder keeps
//!   the behavior as-is.
//! - anything else → a node with every answer, the fixed inter-message
//!   delay, and the children attached.

use std::time::Duration;

use crate::flow::record::{FlowRecord, RecordError};

/// Delay inserted between consecutive reply messages of one node.
pub const REPLY_DELAY: Duration = Duration::from_millis(2000);

/// One reply message: text plus an optional media attachment (URL or path).
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    pub media: Option<String>,
}

/// A composed conversational node: trigger keywords, ordered replies, an
/// optional inter-message delay, and child nodes for follow-up matching.
#[derive(Debug, Clone)]
pub struct FlowNode {
    pub keywords: Vec<String>,
    pub replies: Vec<Reply>,
    pub delay: Option<Duration>,
    pub children: Vec<FlowNode>,
}

/// Build one [`FlowNode`] tree from a record, validating first.
pub fn build(record: &FlowRecord) -> Result<FlowNode, RecordError> {
    record.validate("root")?;
    Ok(build_unchecked(record))
}

fn build_unchecked(record: &FlowRecord) -> FlowNode {
    let children: Vec<FlowNode> = record
        .childrens
        .as_ref()
        .map(|map| map.values().map(build_unchecked).collect())
        .unwrap_or_default();

    if record.answers.len() == 1 && record.media.is_some() {
        return FlowNode {
            keywords: record.keywords.clone(),
            replies: vec![Reply {
                text: record.answers[0].clone(),
                media: record.media.clone(),
            }],
            delay: None,
            children: Vec::new(),
        };
    }

    FlowNode {
        keywords: record.keywords.clone(),
        replies: record
            .answers
            .iter()
            .map(|text| Reply {
                text: text.clone(),
                media: None,
            })
            .collect(),
        delay: Some(REPLY_DELAY),
        children,
    }
}

// ── FlowSet ───────────────────────────────────────────────────────────────────

/// The full set of top-level flows currently served by the bot.
///
/// Built fresh on every load and swapped wholesale — never mutated.
#[derive(Debug, Default)]
pub struct FlowSet {
    flows: Vec<FlowNode>,
}

impl FlowSet {
    pub fn new(flows: Vec<FlowNode>) -> Self {
        Self { flows }
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    /// Match `text` against the top-level flows; returns the index path of
    /// the matched node.
    pub fn match_root(&self, text: &str) -> Option<Vec<usize>> {
        let normalized = normalize(text);
        self.flows
            .iter()
            .position(|flow| keyword_matches(flow, &normalized))
            .map(|i| vec![i])
    }

    /// Match `text` against the children of the node at `path`.
    pub fn match_child(&self, path: &[usize], text: &str) -> Option<Vec<usize>> {
        let normalized = normalize(text);
        let node = self.resolve(path)?;
        node.children
            .iter()
            .position(|child| keyword_matches(child, &normalized))
            .map(|i| {
                let mut next = path.to_vec();
                next.push(i);
                next
            })
    }

    /// Resolve an index path to a node, if still valid for this set.
    pub fn resolve(&self, path: &[usize]) -> Option<&FlowNode> {
        let (&first, rest) = path.split_first()?;
        let mut node = self.flows.get(first)?;
        for &index in rest {
            node = node.children.get(index)?;
        }
        Some(node)
    }
}

fn keyword_matches(node: &FlowNode, normalized: &str) -> bool {
    node.keywords.iter().any(|k| normalize(k) == normalized)
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn record(keywords: &[&str], answers: &[&str]) -> FlowRecord {
        FlowRecord {
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            answers: answers.iter().map(|s| s.to_string()).collect(),
            media: None,
            childrens: None,
        }
    }

    fn with_children(mut parent: FlowRecord, children: Vec<(&str, FlowRecord)>) -> FlowRecord {
        parent.childrens = Some(
            children
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect::<BTreeMap<_, _>>(),
        );
        parent
    }

    #[test]
    fn child_count_matches_record() {
        let parent = with_children(
            record(&["menu"], &["Elige una opción", "1, 2 o 3"]),
            vec![
                ("a", record(&["1"], &["Primera"])),
                ("b", record(&["2"], &["Segunda"])),
                ("c", record(&["3"], &["Tercera"])),
            ],
        );
        let node = build(&parent).unwrap();
        assert_eq!(node.children.len(), 3);
        assert_eq!(node.replies.len(), 2);
        assert_eq!(node.delay, Some(REPLY_DELAY));
    }

    #[test]
    fn non_media_branch_has_fixed_delay() {
        let node = build(&record(&["hola"], &["Bienvenido", "¿En qué te ayudo?"])).unwrap();
        assert_eq!(node.delay, Some(Duration::from_millis(2000)));
        assert!(node.replies.iter().all(|r| r.media.is_none()));
    }

    #[test]
    fn single_answer_with_media_builds_media_reply() {
        let mut rec = record(&["promo"], &["Mira nuestra promo"]);
        rec.media = Some("https://cdn.example/promo.png".into());
        let node = build(&rec).unwrap();
        assert_eq!(node.replies.len(), 1);
        assert_eq!(node.replies[0].text, "Mira nuestra promo");
        assert_eq!(
            node.replies[0].media.as_deref(),
            Some("https://cdn.example/promo.png")
        );
        assert_eq!(node.delay, None);
    }

    // Current upstream behavior: the single-answer+media branch discards any
    // built children. Asserted here so a future change is deliberate.
    #[test]
    fn media_branch_drops_children() {
        let mut rec = with_children(
            record(&["promo"], &["Mira nuestra promo"]),
            vec![("detalle", record(&["detalle"], &["Más información"]))],
        );
        rec.media = Some("https://cdn.example/promo.png".into());
        let node = build(&rec).unwrap();
        assert!(node.children.is_empty());
    }

    #[test]
    fn multi_answer_with_media_keeps_children_and_ignores_media() {
        let mut rec = with_children(
            record(&["promo"], &["Uno", "Dos"]),
            vec![("detalle", record(&["detalle"], &["Más información"]))],
        );
        rec.media = Some("https://cdn.example/promo.png".into());
        let node = build(&rec).unwrap();
        assert_eq!(node.children.len(), 1);
        assert!(node.replies.iter().all(|r| r.media.is_none()));
    }

    #[test]
    fn invalid_record_is_rejected_before_building() {
        let bad = with_children(
            record(&["menu"], &["Elige"]),
            vec![("x", record(&["sub"], &[]))],
        );
        assert!(build(&bad).is_err());
    }

    #[test]
    fn flow_set_matches_keywords_case_insensitively() {
        let set = FlowSet::new(vec![
            build(&record(&["hola"], &["Bienvenido"])).unwrap(),
            build(&record(&["menu"], &["Opciones"])).unwrap(),
        ]);
        assert_eq!(set.match_root("  HOLA "), Some(vec![0]));
        assert_eq!(set.match_root("menu"), Some(vec![1]));
        assert_eq!(set.match_root("adios"), None);
    }

    #[test]
    fn flow_set_resolves_child_paths() {
        let parent = with_children(
            record(&["menu"], &["Elige", "una"]),
            vec![("a", record(&["precios"], &["Lista"]))],
        );
        let set = FlowSet::new(vec![build(&parent).unwrap()]);
        let child_path = set.match_child(&[0], "Precios").unwrap();
        assert_eq!(child_path, vec![0, 0]);
        assert_eq!(set.resolve(&child_path).unwrap().replies[0].text, "Lista");
        assert!(set.resolve(&[3]).is_none());
    }
}
