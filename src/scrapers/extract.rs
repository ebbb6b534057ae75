//! Record extraction from guestbook markup.
//!
//! Remote markup is not stable across the crawl, so candidate nodes are
//! located with a prioritized selector list and each node's text is split into
//! content, author and date by a trailing-pattern match.

use std::sync::LazyLock;

use chrono::{NaiveDate, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use super::dedup::collapse_whitespace;
use crate::models::{CandidateRecord, RawPage, ANONYMOUS_AUTHOR};

/// Default record node selectors, most specific first.
pub const DEFAULT_RECORD_SELECTORS: &[&str] = &[
    "ul.comment_list > li",
    ".comment-list .comment",
    ".reply_list > li",
    "div.comment",
    "li.comment",
    ".board_list tbody tr",
];

/// Default trailing action-button labels.
pub const DEFAULT_BOILERPLATE_LABELS: &[&str] = &["글 삭제하기", "삭제하기", "삭제"];

/// Records shorter than this many characters are UI chrome.
pub const DEFAULT_MIN_CONTENT_CHARS: usize = 5;

/// `<content> <author> <date>[ trailing text]` anchored at the end.
static TRAILING_AUTHOR_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:(?P<content>.*)\s)?(?P<author>\S+)\s+(?P<date>\d{4}[-./]\d{1,2}[-./]\d{1,2})\.?(?:\s+(?P<tail>.{0,30}))?$",
    )
    .unwrap()
});

static DATE_PARTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})[-./](\d{1,2})[-./](\d{1,2})$").unwrap());

/// Fields split out of one record node's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedText {
    pub author: String,
    pub content: String,
    pub date: NaiveDate,
}

/// Turns a page's markup into candidate records.
pub struct RecordExtractor {
    selectors: Vec<(String, Selector)>,
    labels: Vec<String>,
    min_content_chars: usize,
}

impl RecordExtractor {
    pub fn new<S: AsRef<str>, L: AsRef<str>>(
        selectors: &[S],
        boilerplate_labels: &[L],
        min_content_chars: usize,
    ) -> Self {
        let selectors = selectors
            .iter()
            .filter_map(|s| match Selector::parse(s.as_ref()) {
                Ok(sel) => Some((s.as_ref().to_string(), sel)),
                Err(e) => {
                    warn!("Ignoring invalid record selector '{}': {}", s.as_ref(), e);
                    None
                }
            })
            .collect();

        // Longest first so "글 삭제하기" wins over "삭제하기".
        let mut labels: Vec<String> = boilerplate_labels
            .iter()
            .map(|l| l.as_ref().trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();
        labels.sort_by_key(|l| std::cmp::Reverse(l.chars().count()));

        Self {
            selectors,
            labels,
            min_content_chars,
        }
    }

    /// Extract records from a raw page.
    pub fn extract(&self, page: &RawPage) -> Vec<CandidateRecord> {
        let document = Html::parse_document(&page.body);
        self.extract_document(&document, page.page, &page.strategy, Utc::now().date_naive())
    }

    /// Extract records from an already parsed document.
    ///
    /// `today` is the fallback date for records without a parseable date.
    pub fn extract_document(
        &self,
        document: &Html,
        page: u32,
        strategy: &str,
        today: NaiveDate,
    ) -> Vec<CandidateRecord> {
        let Some((selector_str, nodes)) = self.match_nodes(document) else {
            debug!("Page {} ({}): no record nodes matched", page, strategy);
            return Vec::new();
        };

        debug!(
            "Page {} ({}): {} nodes via '{}'",
            page,
            strategy,
            nodes.len(),
            selector_str
        );

        nodes
            .into_iter()
            .filter_map(|node| self.parse_text(&node_text(node), today))
            .map(|parsed| CandidateRecord {
                author: parsed.author,
                content: parsed.content,
                date: parsed.date,
                source_page: page,
                source_strategy: strategy.to_string(),
            })
            .collect()
    }

    /// First selector yielding at least one node wins.
    fn match_nodes<'a>(&'a self, document: &'a Html) -> Option<(&'a str, Vec<ElementRef<'a>>)> {
        self.selectors.iter().find_map(|(source, selector)| {
            let nodes: Vec<_> = document.select(selector).collect();
            (!nodes.is_empty()).then_some((source.as_str(), nodes))
        })
    }

    /// Split one node's text into author, date and content.
    ///
    /// Returns None when the remaining content is below the minimum length.
    pub fn parse_text(&self, raw: &str, today: NaiveDate) -> Option<ParsedText> {
        let text = self.strip_boilerplate(&collapse_whitespace(raw));

        let parsed = match split_author_date(&text) {
            // The label may also sit between the content and the suffix.
            Some(parsed) => ParsedText {
                content: self.strip_boilerplate(&parsed.content),
                ..parsed
            },
            None => ParsedText {
                author: ANONYMOUS_AUTHOR.to_string(),
                content: text,
                date: today,
            },
        };

        if parsed.content.chars().count() < self.min_content_chars {
            return None;
        }
        Some(parsed)
    }

    /// Remove trailing action-button labels, repeatedly.
    fn strip_boilerplate(&self, text: &str) -> String {
        let mut current = text.trim();
        loop {
            let stripped = self.labels.iter().find_map(|label| {
                let rest = current.strip_suffix(label.as_str())?;
                // Only whole-word labels; "...를 삭제" inside content stays.
                if rest.is_empty() || rest.ends_with(char::is_whitespace) {
                    Some(rest.trim_end())
                } else {
                    None
                }
            });
            match stripped {
                Some(rest) => current = rest,
                None => return current.to_string(),
            }
        }
    }
}

impl Default for RecordExtractor {
    fn default() -> Self {
        Self::new(
            DEFAULT_RECORD_SELECTORS,
            DEFAULT_BOILERPLATE_LABELS,
            DEFAULT_MIN_CONTENT_CHARS,
        )
    }
}

/// All descendant text of a node, whitespace collapsed.
fn node_text(node: ElementRef<'_>) -> String {
    collapse_whitespace(&node.text().collect::<Vec<_>>().join(" "))
}

/// Match the trailing `<author> <date>` suffix.
fn split_author_date(text: &str) -> Option<ParsedText> {
    let caps = TRAILING_AUTHOR_DATE.captures(text)?;
    let date = parse_date(caps.name("date")?.as_str())?;
    let content = caps
        .name("content")
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();

    Some(ParsedText {
        author: caps.name("author")?.as_str().to_string(),
        content,
        date,
    })
}

/// Parse `YYYY-MM-DD` (also `.` or `/` separated) into a date.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let caps = DATE_PARTS.captures(s)?;
    let year = caps[1].parse().ok()?;
    let month = caps[2].parse().ok()?;
    let day = caps[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}
