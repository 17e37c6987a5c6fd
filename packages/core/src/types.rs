// ABOUTME: Typed records for the Project -> Feature -> Story -> TestCase hierarchy
// ABOUTME: Also covers TestPlan snapshots and the collection names they live in

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Document collections known to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Projects,
    Features,
    Stories,
    TestCases,
    TestPlans,
}

impl Collection {
    pub const ALL: [Collection; 5] = [
        Collection::Projects,
        Collection::Features,
        Collection::Stories,
        Collection::TestCases,
        Collection::TestPlans,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Projects => "projects",
            Collection::Features => "features",
            Collection::Stories => "stories",
            Collection::TestCases => "test_cases",
            Collection::TestPlans => "test_plans",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("Unknown collection: {0}")]
pub struct ParseCollectionError(pub String);

impl FromStr for Collection {
    type Err = ParseCollectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Collection::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ParseCollectionError(s.to_string()))
    }
}

/// A record type stored in exactly one collection
pub trait Entity: Serialize + DeserializeOwned + Send + Sync {
    const COLLECTION: Collection;

    fn id(&self) -> &str;
    fn tenant_id(&self) -> &str;
}

/// Denormalized descendant counts cached on a project
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectStats {
    pub feature_count: u64,
    pub story_count: u64,
    pub test_case_count: u64,
}

impl ProjectStats {
    pub const EMPTY: ProjectStats = ProjectStats {
        feature_count: 0,
        story_count: 0,
        test_case_count: 0,
    };
}

impl fmt::Display for ProjectStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "features={} stories={} test_cases={}",
            self.feature_count, self.story_count, self.test_case_count
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub tenant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub stats: ProjectStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    pub id: String,
    pub tenant_id: String,
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Story {
    pub id: String,
    pub tenant_id: String,
    pub feature_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub id: String,
    pub tenant_id: String,
    pub story_id: String,
    /// Absent on records written before the pointer was denormalized
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl TestCase {
    /// The denormalized project pointer, if present and non-empty
    pub fn denormalized_project_id(&self) -> Option<&str> {
        self.project_id.as_deref().filter(|id| !id.is_empty())
    }

    /// Whether `other` sits at a different place in the hierarchy
    pub fn ancestry_differs(&self, other: &TestCase) -> bool {
        self.story_id != other.story_id
            || self.denormalized_project_id() != other.denormalized_project_id()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestPlan {
    pub id: String,
    pub tenant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub test_case_ids: Vec<String>,
    #[serde(default)]
    pub test_cases_count: u64,
}

impl TestPlan {
    /// Cached count matches the membership list
    pub fn is_consistent(&self) -> bool {
        self.test_cases_count == self.test_case_ids.len() as u64
    }
}

macro_rules! impl_entity {
    ($ty:ty, $collection:expr) => {
        impl Entity for $ty {
            const COLLECTION: Collection = $collection;

            fn id(&self) -> &str {
                &self.id
            }

            fn tenant_id(&self) -> &str {
                &self.tenant_id
            }
        }
    };
}

impl_entity!(Project, Collection::Projects);
impl_entity!(Feature, Collection::Features);
impl_entity!(Story, Collection::Stories);
impl_entity!(TestCase, Collection::TestCases);
impl_entity!(TestPlan, Collection::TestPlans);

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_collection_round_trips_through_str() {
        for collection in Collection::ALL {
            assert_eq!(collection.as_str().parse::<Collection>().unwrap(), collection);
        }
        assert!("test_suites".parse::<Collection>().is_err());
    }

    #[test]
    fn test_legacy_test_case_has_no_project_pointer() {
        let legacy: TestCase = serde_json::from_value(json!({
            "id": "tc-1",
            "tenant_id": "acme",
            "story_id": "s-1"
        }))
        .unwrap();

        assert_eq!(legacy.project_id, None);
        assert_eq!(legacy.denormalized_project_id(), None);
    }

    #[test]
    fn test_empty_project_pointer_is_ignored() {
        let tc = TestCase {
            id: "tc-1".to_string(),
            tenant_id: "acme".to_string(),
            story_id: "s-1".to_string(),
            project_id: Some(String::new()),
            title: None,
        };
        assert_eq!(tc.denormalized_project_id(), None);
    }

    #[test]
    fn test_ancestry_differs_only_on_parent_fields() {
        let before = TestCase {
            id: "tc-1".to_string(),
            tenant_id: "acme".to_string(),
            story_id: "s-1".to_string(),
            project_id: Some("p-1".to_string()),
            title: Some("Login works".to_string()),
        };

        let mut renamed = before.clone();
        renamed.title = Some("Login still works".to_string());
        assert!(!before.ancestry_differs(&renamed));

        let mut moved = before.clone();
        moved.story_id = "s-2".to_string();
        assert!(before.ancestry_differs(&moved));
    }

    #[test]
    fn test_project_without_stats_decodes_to_zero() {
        let project: Project = serde_json::from_value(json!({
            "id": "p-1",
            "tenant_id": "acme",
            "name": "Checkout"
        }))
        .unwrap();

        assert_eq!(project.stats, ProjectStats::EMPTY);
        assert!(project.updated_at.is_none());
    }

    #[test]
    fn test_plan_consistency() {
        let mut plan = TestPlan {
            id: "tp-1".to_string(),
            tenant_id: "acme".to_string(),
            name: None,
            test_case_ids: vec!["a".to_string(), "b".to_string()],
            test_cases_count: 2,
        };
        assert!(plan.is_consistent());

        plan.test_cases_count = 3;
        assert!(!plan.is_consistent());
    }
}
