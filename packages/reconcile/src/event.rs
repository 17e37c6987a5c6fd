// ABOUTME: Classification of test case writes into create/update/delete
// ABOUTME: Built once at the dispatcher boundary from the before/after snapshots

use caseflow_core::{Collection, TestCase};
use caseflow_storage::{Document, DocumentChange, StorageResult};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Create => f.write_str("create"),
            ChangeKind::Update => f.write_str("update"),
            ChangeKind::Delete => f.write_str("delete"),
        }
    }
}

/// One observed write to a test case
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestCaseChange {
    Created(TestCase),
    Updated { before: TestCase, after: TestCase },
    Deleted(TestCase),
}

impl TestCaseChange {
    /// Classify by which snapshots exist; `None` when neither does
    pub fn classify(before: Option<TestCase>, after: Option<TestCase>) -> Option<Self> {
        match (before, after) {
            (None, Some(after)) => Some(TestCaseChange::Created(after)),
            (Some(before), Some(after)) => Some(TestCaseChange::Updated { before, after }),
            (Some(before), None) => Some(TestCaseChange::Deleted(before)),
            (None, None) => None,
        }
    }

    /// Decode a raw store change; changes to other collections yield `None`
    pub fn from_document_change(change: &DocumentChange) -> StorageResult<Option<Self>> {
        if change.collection != Collection::TestCases {
            return Ok(None);
        }
        let before = change
            .before
            .as_ref()
            .map(Document::decode::<TestCase>)
            .transpose()?;
        let after = change
            .after
            .as_ref()
            .map(Document::decode::<TestCase>)
            .transpose()?;
        Ok(Self::classify(before, after))
    }

    pub fn kind(&self) -> ChangeKind {
        match self {
            TestCaseChange::Created(_) => ChangeKind::Create,
            TestCaseChange::Updated { .. } => ChangeKind::Update,
            TestCaseChange::Deleted(_) => ChangeKind::Delete,
        }
    }

    /// The snapshot ancestry is resolved from: the after-snapshot unless it is gone
    pub fn source(&self) -> &TestCase {
        match self {
            TestCaseChange::Created(after) | TestCaseChange::Updated { after, .. } => after,
            TestCaseChange::Deleted(before) => before,
        }
    }

    pub fn test_case_id(&self) -> &str {
        &self.source().id
    }

    pub fn tenant_id(&self) -> &str {
        &self.source().tenant_id
    }
}
