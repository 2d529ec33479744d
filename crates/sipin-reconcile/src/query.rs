//! Bulk archive lookup expression for a set of pending pids.

/// Scope filters AND-combined with every pid lookup.
const DELETE_STATUS_FILTER: &str = "+(Administrative.DeleteStatus:*)";
const INGEST_SPACE_FILTER: &str = "+(IsInIngestSpace:*)";

/// Refusal to build a lookup from zero pids.
///
/// An empty OR-group would leave only the scope filters, i.e. a query that
/// matches the whole ingest space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmptyInputError;

impl std::fmt::Display for EmptyInputError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "no pids to build MediaHaven query with")
    }
}

impl std::error::Error for EmptyInputError {}

/// Builder for one combined MediaHaven query: records whose original
/// filename matches any of the given pids.
///
/// ```
/// use sipin_reconcile::MediaHavenQuery;
///
/// let q = MediaHavenQuery::new().pids(["a", "b"]).unwrap().build();
/// assert!(q.contains(r#"OriginalFilename:"a.zip" OriginalFilename:"b.zip""#));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MediaHavenQuery {
    clauses: Vec<String>,
}

impl MediaHavenQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one filename clause per pid.
    pub fn pids<I, S>(mut self, pids: I) -> Result<Self, EmptyInputError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let before = self.clauses.len();
        for p in pids {
            self.clauses
                .push(format!("OriginalFilename:\"{}.zip\"", escape(p.as_ref())));
        }
        if self.clauses.len() == before {
            return Err(EmptyInputError);
        }
        Ok(self)
    }

    pub fn build(&self) -> String {
        format!(
            "{DELETE_STATUS_FILTER}{INGEST_SPACE_FILTER}+({})",
            self.clauses.join(" ")
        )
    }
}

/// Backslash-escape characters that would end or break a quoted term.
fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
