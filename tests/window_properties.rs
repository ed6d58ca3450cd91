//! Property-based tests for release window selection.
//!
//! These tests use proptest to check the selection invariants across
//! randomly generated tag layouts.

use chrono::{DateTime, Duration, Utc};
use proptest::prelude::*;

use relnotes::{Commit, SelectionError, SelectionPolicy, Version, select_window};

/// Strategy for a commit's tag: mostly none, often a small version, sometimes junk.
fn tag() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        3 => Just(None),
        2 => (0u64..3, 0u64..3, 0u64..3).prop_map(|(a, b, c)| Some(format!("{a}.{b}.{c}"))),
        1 => prop::sample::select(vec!["latest", "1.2", "v", "1.0.0-rc1", "x.y.z", "", "1.2.3.4"])
            .prop_map(|s| Some(s.to_string())),
    ]
}

/// Strategy for a non-empty newest-first history with unique hashes.
fn history() -> impl Strategy<Value = Vec<Commit>> {
    prop::collection::vec(tag(), 1..40).prop_map(|tags| {
        let n = tags.len();
        tags.into_iter()
            .enumerate()
            .map(|(i, tag)| Commit {
                sha: format!("{:040x}", n - i),
                message: format!("commit {}", n - i),
                date: DateTime::<Utc>::UNIX_EPOCH + Duration::seconds((n - i) as i64),
                tag,
            })
            .collect()
    })
}

fn policy() -> impl Strategy<Value = SelectionPolicy> {
    prop_oneof![
        Just(SelectionPolicy::strict()),
        Just(SelectionPolicy::permissive()),
        any::<bool>().prop_map(|same_minor| SelectionPolicy {
            same_minor,
            ..SelectionPolicy::strict()
        }),
    ]
}

fn index_of(commits: &[Commit], sha: &str) -> usize {
    commits.iter().position(|c| c.sha == sha).unwrap()
}

fn is_version(tag: &str) -> bool {
    tag.parse::<Version>().is_ok()
}

proptest! {
    /// `last` is the newest commit whose tag is a valid version.
    #[test]
    fn last_is_newest_valid_tag(commits in history()) {
        let expected = commits
            .iter()
            .find(|c| c.tag.as_deref().is_some_and(is_version));

        match (select_window(&commits, &SelectionPolicy::strict()), expected) {
            (Ok(window), Some(newest)) => prop_assert_eq!(&window.last().sha, &newest.sha),
            (Err(err), None) => prop_assert_eq!(err, SelectionError::NoTaggedCommits),
            (result, expected) => prop_assert!(false, "got {:?}, expected {:?}", result, expected),
        }
    }

    /// Without any `x.y.0` at or before `last`, the window reaches the oldest commit.
    #[test]
    fn first_falls_back_to_oldest(commits in history(), policy in policy()) {
        if let Ok(window) = select_window(&commits, &policy) {
            let last_idx = index_of(&commits, &window.last().sha);
            let has_patch_zero = commits[last_idx..]
                .iter()
                .any(|c| c.version().is_some_and(|v| v.patch == 0));
            if !has_patch_zero {
                prop_assert_eq!(&window.first().sha, &commits[commits.len() - 1].sha);
            }
        }
    }

    /// The window is exactly the contiguous run from `last` to `first`.
    #[test]
    fn window_is_contiguous_run(commits in history(), policy in policy()) {
        if let Ok(window) = select_window(&commits, &policy) {
            let last_idx = index_of(&commits, &window.last().sha);
            let first_idx = index_of(&commits, &window.first().sha);
            prop_assert!(last_idx <= first_idx);
            prop_assert_eq!(window.commits(), &commits[last_idx..=first_idx]);
        }
    }

    /// `first` is a release-line start or the oldest commit, and nothing
    /// between the boundaries would have qualified.
    #[test]
    fn first_is_nearest_release_line_start(commits in history(), policy in policy()) {
        if let Ok(window) = select_window(&commits, &policy) {
            let qualifies = |c: &Commit| {
                c.version().is_some_and(|v| {
                    v.patch == 0
                        && (!policy.same_minor
                            || window.release().is_none_or(|last| last.minor == v.minor))
                })
            };

            let interior = &window.commits()[..window.commits().len() - 1];
            prop_assert!(!interior.iter().any(qualifies));

            let first = window.first();
            let is_oldest = first.sha == commits[commits.len() - 1].sha;
            prop_assert!(qualifies(first) || is_oldest);
        }
    }

    /// Selection is a pure function of its input.
    #[test]
    fn selection_is_idempotent(commits in history(), policy in policy()) {
        prop_assert_eq!(
            select_window(&commits, &policy),
            select_window(&commits, &policy)
        );
    }
}

#[test]
fn empty_history_is_distinct_from_untagged_history() {
    assert_eq!(
        select_window(&[], &SelectionPolicy::strict()),
        Err(SelectionError::NoCommits)
    );
}
