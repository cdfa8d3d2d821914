use regex::Regex;

/// Match-if-any name predicate built from a list of regular expressions.
///
/// Each pattern is anchored at the start of the candidate but not at the end,
/// so `tool-` accepts `tool-v1.tar.gz`. An empty filter accepts nothing.
#[derive(Debug, Clone, Default)]
pub struct NameFilter {
    patterns: Vec<Regex>,
}

impl NameFilter {
    /// Compile `patterns` into a filter.
    pub fn new<I, S>(patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| Regex::new(&format!("^(?:{})", p.as_ref())))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// True iff at least one pattern matches a prefix of `candidate`.
    pub fn matches(&self, candidate: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(candidate))
    }
}
