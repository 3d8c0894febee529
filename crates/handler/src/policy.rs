//! Replication policy: keep the existing artifact, or replace it?
//!
//! The same comparison is used when pulling (is the copy we already have up
//! to date?) and when pushing (should this write be skipped?), so that two
//! sources replicating into each other converge instead of ping-ponging.

use serde::{Deserialize, Serialize};
use shelf_codec::{BookMetadata, ProgressMetadata, Timestamp};

/// How aggressively writes replace what is already stored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SaveBehavior {
    /// Always write; never compare. Used for forced one-way replication.
    Overwrite,
    /// Only write what is strictly newer than the stored artifact.
    #[default]
    NewOnly,
}

/// Metadata that can be ordered by freshness.
pub trait Freshness {
    /// The timestamps compared between candidate and existing artifacts.
    fn freshness(&self) -> impl Iterator<Item = Timestamp>;
}
impl Freshness for BookMetadata {
    fn freshness(&self) -> impl Iterator<Item = Timestamp> {
        [self.last_book_modified, self.last_book_open].into_iter()
    }
}
impl Freshness for ProgressMetadata {
    fn freshness(&self) -> impl Iterator<Item = Timestamp> {
        [self.last_bookmark_modified].into_iter()
    }
}

/// `candidate` is not newer than `existing` when every freshness field of
/// `existing` is at least the candidate's. Unset timestamps on either side
/// never count.
pub fn is_not_newer<M: Freshness>(candidate: &M, existing: &M) -> bool {
    candidate
        .freshness()
        .zip(existing.freshness())
        .all(|(candidate, existing)| candidate.is_set() && existing.is_set() && existing >= candidate)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplicationPolicy {
    behavior: SaveBehavior,
}
impl ReplicationPolicy {
    pub const fn new(behavior: SaveBehavior) -> Self {
        Self { behavior }
    }

    pub const fn behavior(&self) -> SaveBehavior {
        self.behavior
    }

    /// Push path: skip writing `candidate` over `existing`?
    pub fn should_skip_write<M: Freshness>(&self, candidate: &M, existing: Option<&M>) -> bool {
        self.keeps_existing(candidate, existing)
    }

    /// Pull path: is `existing` at least as fresh as `reference`?
    pub fn is_up_to_date<M: Freshness>(&self, reference: &M, existing: Option<&M>) -> bool {
        self.keeps_existing(reference, existing)
    }

    fn keeps_existing<M: Freshness>(&self, candidate: &M, existing: Option<&M>) -> bool {
        match self.behavior {
            SaveBehavior::Overwrite => false,
            SaveBehavior::NewOnly => existing.is_some_and(|existing| is_not_newer(candidate, existing)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn book(modified: u64, open: u64) -> BookMetadata {
        BookMetadata {
            characters: 100,
            last_book_modified: Timestamp::from_millis(modified),
            last_book_open: Timestamp::from_millis(open),
        }
    }

    fn progress(modified: u64) -> ProgressMetadata {
        ProgressMetadata {
            last_bookmark_modified: Timestamp::from_millis(modified),
            progress: 0.5,
        }
    }

    #[rstest]
    #[case(book(10, 10), book(10, 10), true)]
    #[case(book(10, 10), book(20, 20), true)]
    #[case(book(20, 10), book(10, 10), false)]
    #[case(book(10, 20), book(10, 10), false)]
    #[case(book(10, 0), book(10, 0), false)]
    #[case(book(0, 10), book(10, 10), false)]
    #[case(book(10, 10), book(0, 10), false)]
    fn test_book_freshness(#[case] candidate: BookMetadata, #[case] existing: BookMetadata, #[case] expected: bool) {
        assert_eq!(is_not_newer(&candidate, &existing), expected);
        let policy = ReplicationPolicy::new(SaveBehavior::NewOnly);
        assert_eq!(policy.should_skip_write(&candidate, Some(&existing)), expected);
    }

    #[rstest]
    #[case(5, 5, true)]
    #[case(5, 6, true)]
    #[case(6, 5, false)]
    #[case(0, 5, false)]
    #[case(5, 0, false)]
    fn test_progress_freshness(#[case] candidate: u64, #[case] existing: u64, #[case] expected: bool) {
        assert_eq!(is_not_newer(&progress(candidate), &progress(existing)), expected);
    }

    #[test]
    fn test_missing_existing_never_skips() {
        let policy = ReplicationPolicy::new(SaveBehavior::NewOnly);
        assert!(!policy.should_skip_write(&book(10, 10), None));
        assert!(!policy.is_up_to_date(&progress(10), None));
    }

    #[test]
    fn test_save_behavior_serde() {
        assert_eq!(serde_json::to_string(&SaveBehavior::NewOnly).unwrap(), "\"new-only\"");
        let parsed: SaveBehavior = serde_json::from_str("\"overwrite\"").unwrap();
        assert_eq!(parsed, SaveBehavior::Overwrite);
        assert_eq!(SaveBehavior::default(), SaveBehavior::NewOnly);
    }

    proptest! {
        #[test]
        fn test_overwrite_never_keeps(a in 0u64..50, b in 0u64..50) {
            let policy = ReplicationPolicy::new(SaveBehavior::Overwrite);
            let metadata = book(a, b);
            prop_assert!(!policy.should_skip_write(&metadata, Some(&metadata)));
            prop_assert!(!policy.is_up_to_date(&metadata, Some(&metadata)));
        }

        #[test]
        fn test_freshness_is_transitive(a in 1u64..50, b in 1u64..50, c in 1u64..50) {
            let (x, y, z) = (progress(a), progress(b), progress(c));
            if is_not_newer(&x, &y) && is_not_newer(&y, &z) {
                prop_assert!(is_not_newer(&x, &z));
            }
        }
    }
}
