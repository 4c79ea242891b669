use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

use crate::media::{ResolveError, ResolverConfig};

static ANSWER_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"zhihu\.com/question/(\d+)/answer/(\d+)").unwrap());
static ARTICLE_URL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"zhihu\.com/p/(\d+)").unwrap());
static QUESTION_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"zhihu\.com/question/(\d+)").unwrap());

/// A recognized source post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceIdentifier {
    Answer { question_id: u64, answer_id: u64 },
    Article { article_id: u64 },
    Question { question_id: u64 },
}

fn capture_id(caps: &regex::Captures<'_>, group: usize) -> Option<u64> {
    caps.get(group)?.as_str().parse().ok()
}

impl SourceIdentifier {
    /// Matches answer, then article, then question patterns; the first hit wins.
    pub fn parse(url: &str) -> Result<Self, ResolveError> {
        let unrecognized = || ResolveError::UnrecognizedSource(url.to_string());

        if let Some(caps) = ANSWER_URL.captures(url) {
            return Ok(Self::Answer {
                question_id: capture_id(&caps, 1).ok_or_else(unrecognized)?,
                answer_id: capture_id(&caps, 2).ok_or_else(unrecognized)?,
            });
        }
        if let Some(caps) = ARTICLE_URL.captures(url) {
            return Ok(Self::Article {
                article_id: capture_id(&caps, 1).ok_or_else(unrecognized)?,
            });
        }
        if let Some(caps) = QUESTION_URL.captures(url) {
            return Ok(Self::Question {
                question_id: capture_id(&caps, 1).ok_or_else(unrecognized)?,
            });
        }
        Err(unrecognized())
    }

    pub fn is_question(&self) -> bool {
        matches!(self, Self::Question { .. })
    }

    /// Same-origin API path used from inside a logged-in page.
    pub fn page_api_path(&self, question_limit: u32) -> String {
        match self {
            Self::Answer { answer_id, .. } => format!("/api/v4/answers/{answer_id}?include=content"),
            Self::Article { article_id } => format!("/api/v4/articles/{article_id}?include=content"),
            Self::Question { question_id } => format!(
                "/api/v4/questions/{question_id}/answers?include=content&limit={question_limit}&offset=0"
            ),
        }
    }

    /// Direct endpoints, mobile API first, then the web API.
    pub fn direct_api_urls(&self, config: &ResolverConfig) -> [String; 2] {
        let v3 = config.api_v3_base.trim_end_matches('/');
        let v4 = config.api_v4_base.trim_end_matches('/');
        match self {
            Self::Answer { answer_id, .. } => [
                format!("{v3}/answers/{answer_id}?include=content%2Cexcerpt%2Cvoteup_count"),
                format!("{v4}/answers/{answer_id}?include=content"),
            ],
            Self::Article { article_id } => [
                format!("{v3}/articles/{article_id}?include=content"),
                format!("{v4}/articles/{article_id}?include=content"),
            ],
            Self::Question { question_id } => [
                format!(
                    "{v3}/questions/{question_id}/answers?include=content%2Cexcerpt%2Cvoteup_count&limit=1&offset=0"
                ),
                format!("{v4}/questions/{question_id}/answers?include=content&limit=1&offset=0"),
            ],
        }
    }
}


#[cfg(feature = "fuzz")]
mod fuzz {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn answer_urls_parse_to_their_ids(question_id in any::<u64>(), answer_id in any::<u64>()) {
            let url = format!("https://www.zhihu.com/question/{question_id}/answer/{answer_id}");
            prop_assert_eq!(
                SourceIdentifier::parse(&url).ok(),
                Some(SourceIdentifier::Answer { question_id, answer_id })
            );
        }

        #[test]
        fn parsing_never_panics(url in ".*") {
            let first = SourceIdentifier::parse(&url).ok();
            prop_assert_eq!(first, SourceIdentifier::parse(&url).ok());
        }
    }
}
