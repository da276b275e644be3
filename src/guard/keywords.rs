//! Keyword-density leakage classifier

use regex::RegexSet;
use std::collections::HashSet;

use super::LeakageClassifier;

/// Terms that signal programming, markup, changelog or algorithm-puzzle content
///
/// Very short generic words ("use", "for", "if", ...) are left out: they occur
/// in ordinary prose and would turn every reply into a hit. Short changelog
/// verbs stay, bounded as whole words.
pub const DEFAULT_DENYLIST: &[&str] = &[
    // PHP / Laravel
    "namespace",
    "class",
    "function",
    "public",
    "private",
    "protected",
    "extends",
    "implements",
    "import",
    "require",
    "include",
    "<?php",
    "<?=",
    "<?",
    "?>",
    "use Illuminate",
    "extends Controller",
    "class User extends",
    "protected $fillable",
    "public function",
    "return view",
    "compact(",
    "Auth::user()",
    // Python / general programming
    "def",
    "return",
    "print(",
    "while",
    "else:",
    "elif",
    "try:",
    "except:",
    "def twoSum",
    "def solve",
    "algorithm",
    "time complexity",
    "space complexity",
    "O(n)",
    "O(n^2)",
    "hash table",
    "dictionary",
    // Algorithm-problem vocabulary (Chinese)
    "题目",
    "示例",
    "输入",
    "输出",
    "解释",
    "提示",
    "进阶",
    "解题思路",
    "代码",
    "测试",
    "时间复杂度",
    "空间复杂度",
    "哈希表",
    "字典",
    "两数之和",
    "整数数组",
    "目标值",
    "数组下标",
    "有效答案",
    // General programming terms
    "solution",
    "problem",
    "test case",
    "input",
    "output",
    "explanation",
    "hint",
    "advanced",
    "approach",
    "code",
    "testing",
    "array",
    "target",
    "index",
    "valid answer",
    "optimization",
    // Version / changelog vocabulary
    "begin_of_sentence",
    "end_of_sentence",
    "1.0.0",
    "2.0.0",
    "3.0.0",
    "changelog",
    "version",
    "release",
    "update",
    "patch",
    "minor",
    "major",
    "breaking",
    "feature",
    "bug",
    "core:",
    "add",
    "fix",
    "ci",
    "cd",
    "dev",
    "env",
    "remove",
    "change",
    "improve",
    "enhance",
    "deprecate",
    "security",
    "performance",
    "documentation",
    "tests",
    "deploy",
    "build",
    "compile",
    "install",
    "package",
    "dependency",
    "prod",
    "staging",
    "environment",
    "config",
    "settings",
];

/// Plain ASCII words and phrases match on word boundaries; anything with
/// symbols or non-ASCII script matches as a substring.
fn pattern_for(term: &str) -> String {
    let wordlike = term
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ' ');
    if wordlike {
        format!(r"(?i)\b{}\b", regex::escape(term))
    } else {
        format!("(?i){}", regex::escape(term))
    }
}

/// Counts distinct denylist terms present in a text
pub struct KeywordClassifier {
    set: RegexSet,
    terms: Vec<String>,
}

impl KeywordClassifier {
    /// Build from a term list; duplicates (case-insensitive, trimmed) collapse to one
    pub fn new<I, S>(terms: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let terms: Vec<String> = terms
            .into_iter()
            .map(|t| t.as_ref().trim().to_string())
            .filter(|t| !t.is_empty() && seen.insert(t.to_lowercase()))
            .collect();

        let set = RegexSet::new(terms.iter().map(|t| pattern_for(t)))?;
        Ok(Self { set, terms })
    }

    /// Classifier over [`DEFAULT_DENYLIST`]
    pub fn builtin() -> Self {
        Self::new(DEFAULT_DENYLIST.iter().copied()).expect("built-in denylist compiles")
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// The distinct terms found in `text`
    pub fn matched_terms(&self, text: &str) -> Vec<&str> {
        self.set
            .matches(text)
            .into_iter()
            .map(|i| self.terms[i].as_str())
            .collect()
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::builtin()
    }
}

impl LeakageClassifier for KeywordClassifier {
    fn score(&self, text: &str) -> usize {
        self.set.matches(text).iter().count()
    }

    fn name(&self) -> &'static str {
        "keyword"
    }

    fn signals(&self, text: &str) -> Vec<String> {
        self.matched_terms(text)
            .into_iter()
            .map(str::to_string)
            .collect()
    }
}
