//! Matching report methods to existing remote test cases.
//!
//! Test cases are titled `<prefix><class>.<method>`. Candidates for a class
//! come either from a cache primed once per run with broad queries, or from
//! one live `title:"<prefix><class>*"` query per class that is memoized for
//! the rest of the run. Remote state is assumed not to change mid-run, so
//! nothing is ever invalidated.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{SyncError, SyncResult};
use crate::naming::{split_class_method, strip_prefix, title_query};
use crate::polarion::{Polarion, WorkItemSummary};
use crate::retry::retry;

/// Outcome of a lookup that may legitimately find zero, one or many records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome<T> {
    NotFound,
    Found(T),
    Ambiguous(usize),
}

impl<T> MatchOutcome<T> {
    pub fn from_matches(mut matches: Vec<T>) -> Self {
        match matches.len() {
            0 => MatchOutcome::NotFound,
            1 => matches
                .pop()
                .map_or(MatchOutcome::NotFound, MatchOutcome::Found),
            n => MatchOutcome::Ambiguous(n),
        }
    }

    /// Treat more than one match as an error.
    pub fn into_result(self, query: &str) -> SyncResult<Option<T>> {
        match self {
            MatchOutcome::NotFound => Ok(None),
            MatchOutcome::Found(value) => Ok(Some(value)),
            MatchOutcome::Ambiguous(count) => Err(SyncError::Ambiguous {
                query: query.to_string(),
                count,
            }),
        }
    }
}

/// Finds the remote test case for a `class.method` pair.
pub struct TestCaseMatcher<P: ?Sized> {
    polarion: Arc<P>,
    prefix: String,
    /// Summaries from the priming queries, if any were configured.
    primed: Option<Vec<WorkItemSummary>>,
    /// Live query results, per class name.
    by_class: HashMap<String, Vec<WorkItemSummary>>,
}

impl<P> TestCaseMatcher<P>
where
    P: Polarion + ?Sized,
{
    pub fn new(polarion: Arc<P>, prefix: impl Into<String>) -> Self {
        Self {
            polarion,
            prefix: prefix.into(),
            primed: None,
            by_class: HashMap::new(),
        }
    }

    /// Run the broad priming queries once and cache their results.
    ///
    /// With no queries the matcher keeps using per-class live queries.
    pub async fn prime(&mut self, queries: &[String]) -> SyncResult<usize> {
        if queries.is_empty() {
            return Ok(0);
        }
        let mut cached = Vec::new();
        for query in queries {
            info!("Performing Polarion query of {}", query);
            let found = retry("query test cases", || self.polarion.query_test_cases(query)).await?;
            cached.extend(found);
        }
        let count = cached.len();
        self.primed = Some(cached);
        Ok(count)
    }

    pub fn is_primed(&self) -> bool {
        self.primed.is_some()
    }

    /// Candidate test cases for `class_name`.
    pub async fn find(&mut self, class_name: &str) -> SyncResult<Vec<WorkItemSummary>> {
        if let Some(cache) = &self.primed {
            let prefix = self.prefix.as_str();
            return Ok(cache
                .iter()
                .filter(|tc| strip_prefix(&tc.title, prefix).contains(class_name))
                .cloned()
                .collect());
        }

        if let Some(found) = self.by_class.get(class_name) {
            return Ok(found.clone());
        }

        let query = title_query(&format!("{}{}", self.prefix, class_name));
        info!("Querying Polarion for: {}", query);
        let found = retry("query test cases", || self.polarion.query_test_cases(&query)).await?;
        self.by_class.insert(class_name.to_string(), found.clone());
        Ok(found)
    }

    /// The first candidate titled `<prefix><class_name>.<method_name>`.
    pub fn resolve(
        &self,
        class_name: &str,
        method_name: &str,
        candidates: &[WorkItemSummary],
    ) -> Option<WorkItemSummary> {
        let found = candidates
            .iter()
            .find(|tc| self.is_match(tc, class_name, method_name))
            .cloned();
        if let Some(tc) = &found {
            info!("Found existing TestCase in Polarion: {}", tc.title);
        }
        found
    }

    /// Every candidate titled `<prefix><class_name>.<method_name>`.
    pub fn resolve_all(
        &self,
        class_name: &str,
        method_name: &str,
        candidates: &[WorkItemSummary],
    ) -> MatchOutcome<WorkItemSummary> {
        MatchOutcome::from_matches(
            candidates
                .iter()
                .filter(|tc| self.is_match(tc, class_name, method_name))
                .cloned()
                .collect(),
        )
    }

    /// [`find`](Self::find) followed by [`resolve`](Self::resolve).
    pub async fn lookup(
        &mut self,
        class_name: &str,
        method_name: &str,
    ) -> SyncResult<Option<WorkItemSummary>> {
        let candidates = self.find(class_name).await?;
        debug!(
            "{} candidate test cases for class {}",
            candidates.len(),
            class_name
        );
        Ok(self.resolve(class_name, method_name, &candidates))
    }

    fn is_match(&self, tc: &WorkItemSummary, class_name: &str, method_name: &str) -> bool {
        let (class, method) = split_class_method(strip_prefix(&tc.title, &self.prefix));
        class == class_name && method == method_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polarion::memory::Operation;
    use crate::polarion::{InMemoryPolarion, TestCaseFields, TestCaseRecord};

    fn seeded(titles: &[&str]) -> Arc<InMemoryPolarion> {
        let mut polarion = InMemoryPolarion::new("RHEL6");
        for (i, title) in titles.iter().enumerate() {
            polarion = polarion.with_test_case(TestCaseRecord {
                id: format!("RHEL6-{}", 100 + i),
                project: "RHEL6".into(),
                title: title.to_string(),
                description: String::new(),
                fields: TestCaseFields::default(),
                steps: Vec::new(),
                linked_items: Vec::new(),
            });
        }
        Arc::new(polarion)
    }

    fn summary(id: &str, title: &str) -> WorkItemSummary {
        WorkItemSummary::new(id, title)
    }

    #[test]
    fn test_match_outcome() {
        assert_eq!(MatchOutcome::<u8>::from_matches(vec![]), MatchOutcome::NotFound);
        assert_eq!(MatchOutcome::from_matches(vec![7]), MatchOutcome::Found(7));
        assert_eq!(MatchOutcome::from_matches(vec![1, 2]), MatchOutcome::Ambiguous(2));
        assert!(matches!(
            MatchOutcome::<u8>::Ambiguous(3).into_result("q"),
            Err(SyncError::Ambiguous { count: 3, .. })
        ));
    }

    #[test]
    fn test_resolve_exact_method() {
        let matcher = TestCaseMatcher::new(seeded(&[]), "RHSM-TC : ");
        let candidates = vec![
            summary("1", "RHSM-TC : pkg.Cls.dataTestExtra"),
            summary("2", "RHSM-TC : pkg.ClsOther.dataTest"),
            summary("3", "RHSM-TC : pkg.Cls.dataTest"),
        ];
        let found = matcher.resolve("pkg.Cls", "dataTest", &candidates).unwrap();
        assert_eq!(found.id, "3");
        assert!(matcher.resolve("pkg.Cls", "missing", &candidates).is_none());
    }

    #[test]
    fn test_resolve_with_duplicates_returns_a_match() {
        let matcher = TestCaseMatcher::new(seeded(&[]), "");
        let candidates = vec![summary("1", "pkg.Cls.t"), summary("2", "pkg.Cls.t")];
        assert!(matcher.resolve("pkg.Cls", "t", &candidates).is_some());
        assert_eq!(
            matcher.resolve_all("pkg.Cls", "t", &candidates),
            MatchOutcome::Ambiguous(2)
        );
    }

    #[tokio::test]
    async fn test_live_query_memoized_per_class() {
        let polarion = seeded(&["pkg.Cls.a", "pkg.Cls.b", "pkg.Other.a"]);
        let mut matcher = TestCaseMatcher::new(polarion.clone(), "");

        assert_eq!(matcher.lookup("pkg.Cls", "a").await.unwrap().unwrap().id, "RHEL6-100");
        assert_eq!(matcher.lookup("pkg.Cls", "b").await.unwrap().unwrap().id, "RHEL6-101");
        assert!(matcher.lookup("pkg.Cls", "c").await.unwrap().is_none());
        assert_eq!(polarion.calls(Operation::QueryTestCases), 1);

        matcher.lookup("pkg.Other", "a").await.unwrap();
        assert_eq!(polarion.calls(Operation::QueryTestCases), 2);
    }

    #[tokio::test]
    async fn test_primed_cache_avoids_live_queries() {
        let polarion = seeded(&["TC pkg.Cls.a", "TC pkg.Other.b"]);
        let mut matcher = TestCaseMatcher::new(polarion.clone(), "TC ");
        let primed = matcher
            .prime(&[title_query("TC pkg")])
            .await
            .unwrap();
        assert_eq!(primed, 2);
        assert!(matcher.is_primed());

        let candidates = matcher.find("pkg.Cls").await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert!(matcher.lookup("pkg.Other", "b").await.unwrap().is_some());
        assert_eq!(polarion.calls(Operation::QueryTestCases), 1);
    }

    #[tokio::test]
    async fn test_query_retried_then_raised() {
        let polarion = seeded(&["pkg.Cls.a"]);
        let mut matcher = TestCaseMatcher::new(polarion.clone(), "");

        polarion.fail_next(Operation::QueryTestCases, 2);
        assert!(matcher.lookup("pkg.Cls", "a").await.unwrap().is_some());

        polarion.fail_next(Operation::QueryTestCases, 3);
        let err = matcher.lookup("pkg.Other", "a").await.unwrap_err();
        assert!(matches!(err, SyncError::Polarion(_)));
        assert_eq!(polarion.calls(Operation::QueryTestCases), 6);
    }
}
