//! Version numbers for mutable entities and the artifacts derived from them.
//!
//! Every content edit of a question bumps its version by exactly one, and the
//! new version is written together with the content (see
//! [`Question::edit`](crate::domain::models::Question::edit)). Assessments
//! record the version they were computed against.

/// Version a freshly created entity starts at.
pub const INITIAL_VERSION: u64 = 1;

/// Version that follows `current`.
pub const fn next_version(current: u64) -> u64 {
    current + 1
}
