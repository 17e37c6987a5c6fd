// ABOUTME: Change-triggered reconciliation of denormalized aggregates
// ABOUTME: Keeps Project stats and TestPlan membership aligned with the test case collection

pub mod aggregate;
pub mod ancestry;
pub mod cascade;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod listener;
pub mod partition;

#[cfg(test)]
pub(crate) mod test_utils;

pub use aggregate::{AggregateEngine, RecountOutcome};
pub use ancestry::{Ancestry, AncestryResolver, UnresolvedReason};
pub use cascade::{without_member, CascadeCleanup};
pub use dispatcher::{DispatchReport, Dispatcher, DispatcherOptions};
pub use error::{ReconcileError, ReconcileResult};
pub use event::{ChangeKind, TestCaseChange};
pub use listener::{ChangeListener, ListenerStats};
pub use partition::partition;
