//! Decides whether the first row of a file holds column labels.

use std::sync::OnceLock;

use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderMode {
    #[default]
    Auto,
    ForceHeader,
    ForceNoHeader,
}

/// Header-like words looked for (as substrings) in uppercased labels.
const HEADER_KEYWORDS: &[&str] = &[
    "ID",
    "NAME",
    "CODE",
    "TYPE",
    "STATUS",
    "DATE",
    "TIME",
    "EMAIL",
    "PHONE",
    "ADDRESS",
    "TITLE",
    "DESCRIPTION",
    "VALUE",
    "CREATED_BY",
    "CREATE_TIMESTAMP",
    "UPDATED_BY",
    "UPDATE_TIMESTAMP",
    "编号",
    "姓名",
    "名称",
    "代码",
    "类型",
    "状态",
    "日期",
    "时间",
    "邮箱",
    "电话",
    "地址",
    "标题",
    "描述",
    "数值",
];

/// OR of AND groups, all terms uppercased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordRule {
    groups: Vec<Vec<String>>,
}

impl KeywordRule {
    /// Parses `A,B|C`: `|` separates alternatives, `,` joins required terms.
    /// Returns `None` when the expression holds no terms.
    pub fn parse(expression: &str) -> Option<Self> {
        let groups: Vec<Vec<String>> = expression
            .split('|')
            .map(|group| {
                group
                    .split(',')
                    .map(|term| term.trim().to_uppercase())
                    .filter(|term| !term.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|group| !group.is_empty())
            .collect();
        if groups.is_empty() {
            None
        } else {
            Some(Self { groups })
        }
    }

    pub fn groups(&self) -> &[Vec<String>] {
        &self.groups
    }

    pub fn matches(&self, labels: &[String]) -> bool {
        let upper: Vec<String> = labels.iter().map(|l| l.trim().to_uppercase()).collect();
        self.groups
            .iter()
            .any(|group| group.iter().all(|term| upper.contains(term)))
    }
}

#[derive(Debug, Clone, Default)]
pub struct HeaderDetector {
    mode: HeaderMode,
    rule: Option<KeywordRule>,
}

impl HeaderDetector {
    pub fn new(mode: HeaderMode, keywords: &str) -> Self {
        Self {
            mode,
            rule: KeywordRule::parse(keywords),
        }
    }

    pub fn mode(&self) -> HeaderMode {
        self.mode
    }

    pub fn is_header(&self, labels: &[String]) -> bool {
        match self.mode {
            HeaderMode::ForceHeader => true,
            HeaderMode::ForceNoHeader => false,
            HeaderMode::Auto => match &self.rule {
                Some(rule) => {
                    let matched = rule.matches(labels);
                    debug!("Keyword header rule matched: {matched}");
                    matched
                }
                None => looks_like_header(labels),
            },
        }
    }
}

/// Default heuristic used when no keyword rule is configured.
///
/// A plain alphabetic word is not a header signal on its own: `John` in
/// `["1", "John", "a@b.com"]` would otherwise tip a data row into a header.
pub fn looks_like_header(labels: &[String]) -> bool {
    if labels.is_empty() {
        return false;
    }
    let has_keyword = labels.iter().any(|label| {
        let upper = label.trim().to_uppercase();
        upper.contains('_') || HEADER_KEYWORDS.iter().any(|kw| upper.contains(kw))
    });
    if has_keyword {
        return true;
    }
    let data_like = labels
        .iter()
        .filter(|label| looks_like_data(label.trim()))
        .count();
    data_like * 2 <= labels.len()
}

fn looks_like_data(value: &str) -> bool {
    let patterns = data_patterns();
    (!value.is_empty() && value.chars().all(|c| c.is_ascii_digit()))
        || patterns.decimal.is_match(value)
        || (value.contains('@') && value.contains('.'))
        || patterns.date.is_match(value)
        || patterns.short_cjk_name.is_match(value)
        || patterns.phone.is_match(value)
}

struct DataPatterns {
    decimal: Regex,
    date: Regex,
    short_cjk_name: Regex,
    phone: Regex,
}

fn data_patterns() -> &'static DataPatterns {
    static PATTERNS: OnceLock<DataPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| DataPatterns {
        decimal: Regex::new(r"^\d+\.\d+$").expect("valid decimal pattern"),
        date: Regex::new(r"^\d{4}[-/]\d{1,2}[-/]\d{1,2}$").expect("valid date pattern"),
        short_cjk_name: Regex::new(r"^[\x{4E00}-\x{9FFF}]{1,4}$").expect("valid name pattern"),
        phone: Regex::new(r"^[\d\-\+\(\)\s]{7,}$").expect("valid phone pattern"),
    })
}
