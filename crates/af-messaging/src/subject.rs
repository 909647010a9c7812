//! Subject naming and wildcard matching for the bus: `af.<tenant>.<type>.<to_agent>`.

/// A parsed subject pattern. Publishers always emit a fully qualified
/// subject; only the consumer side may bind with `*` wildcard segments.
#[derive(Debug, Clone)]
pub struct SubjectPattern {
    segments: Vec<String>,
}

impl SubjectPattern {
    pub fn parse(pattern: &str) -> Self {
        Self {
            segments: pattern.split('.').map(str::to_string).collect(),
        }
    }

    /// Whether a fully qualified subject matches this pattern, segment by
    /// segment, with `*` matching exactly one segment.
    pub fn matches(&self, subject: &str) -> bool {
        let subject_segments: Vec<&str> = subject.split('.').collect();
        if subject_segments.len() != self.segments.len() {
            return false;
        }
        self.segments
            .iter()
            .zip(subject_segments.iter())
            .all(|(pat, seg)| pat == "*" || pat == seg)
    }
}
