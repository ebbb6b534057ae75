//! Pagination strategies.
//!
//! Each strategy is one hypothesis about how the remote board exposes page N.
//! None of them is known to be correct up front, so the driver probes them in
//! order and relies on [`PaginationCheck`] to notice when the server silently
//! ignored the paging request.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use reqwest::Method;
use scraper::{Html, Selector};
use url::Url;

use super::dedup::Fingerprint;

/// Default selectors for an explicit "current page" marker.
pub const DEFAULT_PAGE_INDICATOR_SELECTORS: &[&str] = &[
    ".paging strong",
    ".paging .on",
    ".pagination .active",
    "[aria-current='page']",
    ".page_num.on",
];

static PAGE_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

/// One way of asking the remote board for page N.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// `?<name>=N`
    QueryParam { name: String },
    /// `?offset=(N-1)*size&limit=size`
    OffsetLimit { page_size: u32 },
    /// `#<prefix>N`; only meaningful when the fetcher executes script.
    HashFragment { prefix: String },
    /// POST with form field `<field>=N`
    FormPost { field: String },
}

impl Strategy {
    /// Stable textual id, also accepted by [`FromStr`].
    pub fn id(&self) -> String {
        match self {
            Self::QueryParam { name } => format!("query:{}", name),
            Self::OffsetLimit { .. } => "offset-limit".to_string(),
            Self::HashFragment { prefix } => format!("hash:{}", prefix),
            Self::FormPost { field } => format!("form-post:{}", field),
        }
    }

    /// Whether the page content only changes when client-side script runs.
    pub fn requires_script(&self) -> bool {
        matches!(self, Self::HashFragment { .. })
    }

    /// Build the request descriptor for `page` against `base`.
    pub fn request(&self, base: &Url, page: u32) -> PageRequest {
        let mut url = base.clone();
        let mut method = Method::GET;
        let mut form = Vec::new();

        match self {
            Self::QueryParam { name } => {
                set_query_param(&mut url, name, &page.to_string());
            }
            Self::OffsetLimit { page_size } => {
                let offset = page.saturating_sub(1) as u64 * *page_size as u64;
                set_query_param(&mut url, "offset", &offset.to_string());
                set_query_param(&mut url, "limit", &page_size.to_string());
            }
            Self::HashFragment { prefix } => {
                url.set_fragment(Some(&format!("{}{}", prefix, page)));
            }
            Self::FormPost { field } => {
                method = Method::POST;
                form.push((field.clone(), page.to_string()));
            }
        }

        let mut headers = Vec::new();
        if method == Method::POST {
            headers.push(("Referer".to_string(), base.to_string()));
        }

        PageRequest {
            page,
            strategy: self.id(),
            method,
            url,
            headers,
            form,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

/// Error for an unrecognised strategy id.
#[derive(Debug, thiserror::Error)]
#[error("unknown pagination strategy '{0}' (expected query:<name>, offset-limit, hash:<prefix> or form-post:<field>)")]
pub struct UnknownStrategy(pub String);

impl FromStr for Strategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (kind, arg) = match s.split_once(':') {
            Some((kind, arg)) => (kind, Some(arg.trim()).filter(|a| !a.is_empty())),
            None => (s, None),
        };

        match (kind, arg) {
            ("query", Some(name)) => Ok(Self::QueryParam {
                name: name.to_string(),
            }),
            ("offset-limit", None) => Ok(Self::OffsetLimit {
                page_size: DEFAULT_PAGE_SIZE,
            }),
            ("offset-limit", Some(size)) => size
                .parse()
                .ok()
                .filter(|n: &u32| *n > 0)
                .map(|page_size| Self::OffsetLimit { page_size })
                .ok_or_else(|| UnknownStrategy(s.to_string())),
            ("hash", Some(prefix)) => Ok(Self::HashFragment {
                prefix: prefix.to_string(),
            }),
            ("form-post", Some(field)) => Ok(Self::FormPost {
                field: field.to_string(),
            }),
            _ => Err(UnknownStrategy(s.to_string())),
        }
    }
}

/// Page size used by `offset-limit` when none is given.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// The default probing order.
pub fn default_strategies(page_size: u32) -> Vec<Strategy> {
    vec![
        Strategy::QueryParam {
            name: "page".to_string(),
        },
        Strategy::QueryParam {
            name: "p".to_string(),
        },
        Strategy::OffsetLimit { page_size },
        Strategy::FormPost {
            field: "cPage".to_string(),
        },
        Strategy::HashFragment {
            prefix: "gopage".to_string(),
        },
    ]
}

/// Concrete request for one page.
#[derive(Debug, Clone)]
pub struct PageRequest {
    pub page: u32,
    pub strategy: String,
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    /// Url-encoded form body fields (POST only).
    pub form: Vec<(String, String)>,
}

/// Replace (or add) a query parameter, keeping every other pair in order.
fn set_query_param(url: &mut Url, key: &str, value: &str) {
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != key)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    {
        let mut query = url.query_pairs_mut();
        query.clear();
        for (k, v) in &pairs {
            query.append_pair(k, v);
        }
        query.append_pair(key, value);
    }
}

/// Outcome of checking whether a fetched page is really the requested one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaginationCheck {
    /// Indicator matched, or content changed from the previous page.
    Confirmed,
    /// The page has no records and no indicator; nothing to judge.
    Inconclusive,
    /// The page's current-page indicator names another page.
    Mismatch { requested: u32, reported: u32 },
    /// Same first record as the previous page: the request was ignored.
    Repeated,
}

impl PaginationCheck {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Mismatch { .. } | Self::Repeated)
    }
}

/// Detects silent pagination failures.
pub struct PaginationDetector {
    indicator_selectors: Vec<Selector>,
}

impl PaginationDetector {
    pub fn new<S: AsRef<str>>(indicator_selectors: &[S]) -> Self {
        let indicator_selectors = indicator_selectors
            .iter()
            .filter_map(|s| match Selector::parse(s.as_ref()) {
                Ok(sel) => Some(sel),
                Err(e) => {
                    tracing::warn!("Ignoring invalid page indicator selector '{}': {}", s.as_ref(), e);
                    None
                }
            })
            .collect();

        Self {
            indicator_selectors,
        }
    }

    /// Page number announced by the document's current-page marker, if any.
    pub fn reported_page(&self, document: &Html) -> Option<u32> {
        for selector in &self.indicator_selectors {
            if let Some(element) = document.select(selector).next() {
                let text: String = element.text().collect();
                if let Some(m) = PAGE_NUMBER.find(&text) {
                    if let Ok(n) = m.as_str().parse() {
                        return Some(n);
                    }
                }
            }
        }
        None
    }

    /// Judge a fetched page.
    ///
    /// `first` is the fingerprint of the page's first record and `previous`
    /// the same for the preceding page of this strategy.
    pub fn check(
        &self,
        document: &Html,
        requested: u32,
        first: Option<&Fingerprint>,
        previous: Option<&Fingerprint>,
    ) -> PaginationCheck {
        if let Some(reported) = self.reported_page(document) {
            return if reported == requested {
                PaginationCheck::Confirmed
            } else {
                PaginationCheck::Mismatch {
                    requested,
                    reported,
                }
            };
        }

        match (first, previous) {
            (Some(first), Some(previous)) if first == previous => PaginationCheck::Repeated,
            (Some(_), _) => PaginationCheck::Confirmed,
            (None, _) => PaginationCheck::Inconclusive,
        }
    }
}

impl Default for PaginationDetector {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_INDICATOR_SELECTORS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://board.example.go.kr/memorial/comments.do?id=42").unwrap()
    }

    #[test]
    fn test_query_param_request() {
        let req = Strategy::QueryParam {
            name: "page".to_string(),
        }
        .request(&base(), 3);
        assert_eq!(req.method, Method::GET);
        assert_eq!(
            req.url.as_str(),
            "https://board.example.go.kr/memorial/comments.do?id=42&page=3"
        );
        assert_eq!(req.strategy, "query:page");
        assert!(req.form.is_empty());
    }

    #[test]
    fn test_query_param_replaces_existing_value() {
        let base = Url::parse("https://example.com/list?p=1&sort=new").unwrap();
        let req = Strategy::QueryParam {
            name: "p".to_string(),
        }
        .request(&base, 5);
        assert_eq!(req.url.as_str(), "https://example.com/list?sort=new&p=5");
    }

    #[test]
    fn test_offset_limit_request() {
        let req = Strategy::OffsetLimit { page_size: 20 }.request(&base(), 3);
        let pairs: Vec<(String, String)> = req
            .url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(pairs.contains(&("offset".to_string(), "40".to_string())));
        assert!(pairs.contains(&("limit".to_string(), "20".to_string())));
    }

    #[test]
    fn test_offset_limit_first_page_is_zero() {
        let req = Strategy::OffsetLimit { page_size: 10 }.request(&base(), 1);
        assert!(req.url.as_str().contains("offset=0"));
    }

    #[test]
    fn test_hash_fragment_request() {
        let strategy = Strategy::HashFragment {
            prefix: "gopage".to_string(),
        };
        let req = strategy.request(&base(), 7);
        assert_eq!(req.url.fragment(), Some("gopage7"));
        assert!(strategy.requires_script());
    }

    #[test]
    fn test_form_post_request() {
        let req = Strategy::FormPost {
            field: "cPage".to_string(),
        }
        .request(&base(), 4);
        assert_eq!(req.method, Method::POST);
        assert_eq!(req.form, vec![("cPage".to_string(), "4".to_string())]);
        assert_eq!(req.url, base());
    }

    #[test]
    fn test_strategy_ids_parse_back() {
        for strategy in default_strategies(10) {
            let parsed: Strategy = strategy.id().parse().unwrap();
            assert_eq!(parsed, strategy);
        }
        assert_eq!(
            "offset-limit:25".parse::<Strategy>().unwrap(),
            Strategy::OffsetLimit { page_size: 25 }
        );
        assert!("bogus".parse::<Strategy>().is_err());
        assert!("query:".parse::<Strategy>().is_err());
        assert!("offset-limit:0".parse::<Strategy>().is_err());
    }

    #[test]
    fn test_indicator_match_confirms() {
        let doc = Html::parse_document(r#"<div class="paging"><a>1</a><strong>2</strong><a>3</a></div>"#);
        let detector = PaginationDetector::default();
        assert_eq!(detector.reported_page(&doc), Some(2));
        assert_eq!(detector.check(&doc, 2, None, None), PaginationCheck::Confirmed);
    }

    #[test]
    fn test_indicator_mismatch_fails() {
        let doc = Html::parse_document(r#"<div class="paging"><strong>1</strong><a>2</a></div>"#);
        let detector = PaginationDetector::default();
        let check = detector.check(&doc, 2, None, None);
        assert_eq!(
            check,
            PaginationCheck::Mismatch {
                requested: 2,
                reported: 1
            }
        );
        assert!(check.is_failure());
    }

    #[test]
    fn test_repeated_first_record_fails_without_indicator() {
        let doc = Html::parse_document("<ul><li>no paging here</li></ul>");
        let detector = PaginationDetector::default();
        let fp = Fingerprint::compute("a", "same", 150);
        assert_eq!(
            detector.check(&doc, 3, Some(&fp), Some(&fp)),
            PaginationCheck::Repeated
        );

        let other = Fingerprint::compute("b", "different", 150);
        assert_eq!(
            detector.check(&doc, 3, Some(&other), Some(&fp)),
            PaginationCheck::Confirmed
        );
        assert_eq!(
            detector.check(&doc, 3, None, Some(&fp)),
            PaginationCheck::Inconclusive
        );
    }
}
