//! Static keyword lists used before and after model classification.
//!
//! Matching is plain case-insensitive substring containment, so a deny term
//! embedded in a longer benign word still matches (`"hack"` in
//! `"hackathon"`).

/// Off-topic or sensitive terms. A hit refuses the request before any model
/// call is made.
pub const DENY_LIST: &[&str] = &[
    "messi",
    "ronaldo",
    "league",
    "celebrity",
    "celebrities",
    "gossip",
    "movie",
    "movies",
    "series",
    "tiktok",
    "instagram",
    "facebook",
    "twitter",
    "politic",
    "election",
    "politics",
    "government",
    "adult",
    "nsfw",
    "sex",
    "violence",
    "gambling",
    "casino",
    "lottery",
    "betting",
    "celebs",
    "hollywood",
    "bollywood",
    "nba",
    "nfl",
    "soccer",
    "football",
    "baseball",
    "hockey",
    "premier league",
    "transfer news",
    "crime",
    "illegal",
    "hack",
    "hacking",
    "cheat code",
    "cheats",
    "leak",
    "rumor",
];

/// Academic-domain terms used to cross-check the classifier's category.
pub const ALLOW_LIST: &[&str] = &[
    "math",
    "mathematics",
    "algebra",
    "geometry",
    "calculus",
    "statistics",
    "probability",
    "physics",
    "chemistry",
    "biology",
    "science",
    "medicine",
    "anatomy",
    "programming",
    "coding",
    "computer",
    "technology",
    "algorithm",
    "data structure",
    "data structures",
    "software",
    "engineering",
    "history",
    "geography",
    "economics",
    "finance",
    "accounting",
    "language",
    "grammar",
    "vocabulary",
    "literature",
    "poetry",
    "essay",
    "study",
    "studying",
    "education",
    "exam",
    "homework",
    "revision",
    "practice",
    "recursion",
    "loop",
    "dart",
    "flutter",
    "java",
    "python",
    "chemical",
    "equation",
    "balance",
];

/// Returns `true` when any keyword occurs anywhere in `text`, ignoring case.
pub fn contains_keyword<S: AsRef<str>>(text: &str, keywords: &[S]) -> bool {
    let haystack = text.to_lowercase();
    keywords
        .iter()
        .any(|keyword| haystack.contains(&keyword.as_ref().to_lowercase()))
}

/// Deny and allow lists bundled for the moderation pipeline.
#[derive(Debug, Clone)]
pub struct KeywordFilter {
    deny: Vec<String>,
    allow: Vec<String>,
}

impl KeywordFilter {
    pub fn new<I, J>(deny: I, allow: J) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        J: IntoIterator,
        J::Item: Into<String>,
    {
        Self {
            deny: deny.into_iter().map(Into::into).collect(),
            allow: allow.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_denied(&self, text: &str) -> bool {
        contains_keyword(text, &self.deny)
    }

    pub fn is_allowed(&self, text: &str) -> bool {
        contains_keyword(text, &self.allow)
    }
}

impl Default for KeywordFilter {
    fn default() -> Self {
        Self::new(DENY_LIST.iter().copied(), ALLOW_LIST.iter().copied())
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn match_ignores_case() {
        assert!(contains_keyword("Who is MESSI?", DENY_LIST));
        assert!(contains_keyword("explain Calculus limits", ALLOW_LIST));
    }

    #[test]
    fn match_is_substring_not_word() {
        // Accepted false positive: "hack" inside "hackathon".
        assert!(contains_keyword("tips for my first hackathon", DENY_LIST));
        assert!(contains_keyword("mathematical induction", &["math"]));
    }

    #[test]
    fn multi_word_terms_match() {
        assert!(contains_keyword("latest Premier League results", DENY_LIST));
        assert!(contains_keyword("which data structure fits a queue", ALLOW_LIST));
    }

    #[test]
    fn no_match_on_unrelated_text() {
        assert!(!contains_keyword("how do plants make food", DENY_LIST));
        assert!(!contains_keyword("", ALLOW_LIST));
        assert!(!contains_keyword("anything", &[] as &[&str]));
    }

    #[test]
    fn default_filter_uses_static_lists() {
        let filter = KeywordFilter::default();
        assert!(filter.is_denied("casino strategy"));
        assert!(!filter.is_denied("photosynthesis"));
        assert!(filter.is_allowed("Biology"));
        assert!(!filter.is_allowed("unknown"));
    }

    #[test]
    fn custom_filter_lowercases_terms() {
        let filter = KeywordFilter::new(["Spoilers"], ["Latin"]);
        assert!(filter.is_denied("no spoilers please"));
        assert!(filter.is_allowed("latin declensions"));
    }
}
