//! Find-or-create of the requirement a `<test>` grouping verifies.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::SyncResult;
use crate::matcher::MatchOutcome;
use crate::naming::{sanitize, title_query};
use crate::polarion::{Polarion, RequirementFields, WorkItemSummary};
use crate::retry::retry;

/// How requirements are looked up and whether missing ones are created.
#[derive(Debug, Clone)]
pub struct RequirementPolicy {
    /// Look titles up in one bulk-loaded list instead of querying per title.
    pub quick_query: bool,
    /// Query used to bulk-load existing requirements in quick mode.
    pub query: String,
    /// Create requirements that do not exist yet.
    pub create: bool,
}

/// Resolves requirement titles to remote requirements, at most one create
/// per title per run.
pub struct RequirementResolver<P: ?Sized> {
    polarion: Arc<P>,
    project: String,
    policy: RequirementPolicy,
    fields: RequirementFields,
    /// Bulk-loaded requirements, fetched on first use in quick mode.
    existing: Option<Vec<WorkItemSummary>>,
    /// Every title resolved so far, including ones that resolved to nothing.
    resolved: HashMap<String, Option<WorkItemSummary>>,
}

impl<P> RequirementResolver<P>
where
    P: Polarion + ?Sized,
{
    pub fn new(polarion: Arc<P>, project: impl Into<String>, policy: RequirementPolicy) -> Self {
        Self {
            polarion,
            project: project.into(),
            policy,
            fields: RequirementFields::default(),
            existing: None,
            resolved: HashMap::new(),
        }
    }

    pub fn with_fields(mut self, fields: RequirementFields) -> Self {
        self.fields = fields;
        self
    }

    /// Resolve `title`, creating the requirement if allowed.
    ///
    /// Returns `None` only when the requirement does not exist and creation
    /// is disabled.
    pub async fn resolve(&mut self, title: &str) -> SyncResult<Option<WorkItemSummary>> {
        if let Some(known) = self.resolved.get(title) {
            return Ok(known.clone());
        }

        let found = if self.policy.quick_query {
            self.find_cached(title).await?
        } else {
            self.find_live(title).await?
        };

        let requirement = match found {
            Some(requirement) => Some(requirement),
            None if self.policy.create => Some(self.create(title).await?),
            None => {
                warn!(
                    "Requirement {:?} does not exist and creation is disabled",
                    title
                );
                None
            }
        };

        self.resolved
            .insert(title.to_string(), requirement.clone());
        Ok(requirement)
    }

    /// Number of distinct titles resolved so far.
    pub fn resolved_count(&self) -> usize {
        self.resolved.len()
    }

    async fn existing(&mut self) -> SyncResult<&[WorkItemSummary]> {
        if self.existing.is_none() {
            info!("Performing Requirements query: {}", self.policy.query);
            let query = self.policy.query.as_str();
            let polarion = &self.polarion;
            let loaded = retry("query requirements", || polarion.query_requirements(query)).await?;
            self.existing = Some(loaded);
        }
        Ok(self.existing.as_deref().unwrap_or_default())
    }

    /// Exact title match first, then the first substring match.
    async fn find_cached(&mut self, title: &str) -> SyncResult<Option<WorkItemSummary>> {
        let existing = self.existing().await?;
        let exact: Vec<WorkItemSummary> = existing
            .iter()
            .filter(|r| r.title == title)
            .cloned()
            .collect();
        match MatchOutcome::from_matches(exact).into_result(title)? {
            Some(requirement) => Ok(Some(requirement)),
            None => Ok(existing.iter().find(|r| r.title.contains(title)).cloned()),
        }
    }

    async fn find_live(&self, title: &str) -> SyncResult<Option<WorkItemSummary>> {
        let query = title_query(&sanitize(title));
        let found = retry("query requirements", || {
            self.polarion.query_requirements(&query)
        })
        .await?;
        Ok(found.into_iter().find(|r| r.title == title))
    }

    async fn create(&self, title: &str) -> SyncResult<WorkItemSummary> {
        info!("Creating requirement {:?}", title);
        let requirement = retry("create requirement", || {
            self.polarion
                .create_requirement(&self.project, title, "", &self.fields)
        })
        .await?;
        Ok(requirement)
    }
}
