//! The authority table: field-path patterns mapped to source priorities.

use lodestar_core::pattern_matches;
use lodestar_sources::SourceId;
use once_cell::sync::Lazy;

/// One authority entry. Higher priority wins; ties break by table order.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct AuthorityRule {
    pub pattern: &'static str,
    pub source: SourceId,
    pub priority: i32,
}

/// Ordered list of authority rules.
#[derive(Debug, Clone, Default)]
pub struct AuthorityTable {
    rules: Vec<AuthorityRule>,
}

impl AuthorityTable {
    pub fn new(rules: Vec<AuthorityRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[AuthorityRule] {
        &self.rules
    }

    /// Whether any rule is the catch-all pattern `*`. Reconciliation is
    /// total only while this holds for every source.
    pub fn has_catch_all(&self) -> bool {
        self.rules.iter().any(|r| r.pattern == "*")
    }

    /// The best rule for `(path, source)`: highest priority among matching
    /// rules, earliest table position on a priority tie. Returns the
    /// priority and the rule's table index.
    pub fn best_rule(&self, path: &str, source: SourceId) -> Option<(i32, usize)> {
        let mut best: Option<(i32, usize)> = None;
        for (index, rule) in self.rules.iter().enumerate() {
            if rule.source != source || !pattern_matches(rule.pattern, path) {
                continue;
            }
            match best {
                None => best = Some((rule.priority, index)),
                Some((priority, _)) if rule.priority > priority => {
                    best = Some((rule.priority, index))
                }
                _ => {}
            }
        }
        best
    }
}

const fn rule(pattern: &'static str, source: SourceId, priority: i32) -> AuthorityRule {
    AuthorityRule {
        pattern,
        source,
        priority,
    }
}

/// The default authority table.
///
/// Community metadata owns pricing, limits, and descriptive metadata; the
/// live provider APIs own capability flags and display names; the local
/// override directory wins its curated fields and floats just above the
/// embedded baseline for everything else. A per-source catch-all block at
/// the bottom keeps reconciliation total: any field reported by exactly
/// one source lands in the merged catalog no matter which source it was.
pub fn default_authority() -> &'static AuthorityTable {
    static TABLE: Lazy<AuthorityTable> = Lazy::new(|| {
        AuthorityTable::new(vec![
            rule("pricing.*", SourceId::ModelsDevHttp, 110),
            rule("pricing.*", SourceId::ModelsDevGit, 100),
            rule("limits.*", SourceId::ModelsDevHttp, 100),
            rule("limits.*", SourceId::ModelsDevGit, 95),
            rule("metadata.*", SourceId::ModelsDevHttp, 100),
            rule("metadata.*", SourceId::ModelsDevGit, 95),
            rule("features.*", SourceId::Providers, 95),
            rule("features.*", SourceId::ModelsDevHttp, 90),
            rule("features.*", SourceId::ModelsDevGit, 88),
            rule("modalities.*", SourceId::ModelsDevHttp, 90),
            rule("modalities.*", SourceId::ModelsDevGit, 88),
            rule("description", SourceId::Local, 90),
            rule("name", SourceId::Providers, 90),
            rule("name", SourceId::ModelsDevHttp, 85),
            rule("authors", SourceId::ModelsDevHttp, 85),
            rule("authors", SourceId::ModelsDevGit, 83),
            rule("provider.*", SourceId::ModelsDevHttp, 85),
            rule("provider.*", SourceId::ModelsDevGit, 83),
            rule("author.*", SourceId::ModelsDevHttp, 85),
            // Floor: every source can carry any field it alone reports.
            rule("*", SourceId::Local, 82),
            rule("*", SourceId::Embedded, 80),
            rule("*", SourceId::ModelsDevHttp, 78),
            rule("*", SourceId::ModelsDevGit, 76),
            rule("*", SourceId::Providers, 74),
        ])
    });
    &TABLE
}
