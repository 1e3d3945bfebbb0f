//! Duplicate-convoy detector.
//!
//! Before a new convoy is created, external issue identifiers are pulled
//! out of its description and matched against the titles of Open and
//! InProgress convoys. A hit means someone probably already started a
//! convoy for the same unit of external work.
//!
//! The detector is strictly advisory and fail-open: a ledger outage must
//! never block creating new work, so query failures degrade to an empty
//! scan marked `degraded: true` with a warning.

use crate::config::Config;
use crate::error::Result;
use crate::ledger::{ConvoyRecord, ConvoyStatus, Ledger};
use crate::session::{SessionManager, convoy_session_prefix};
use regex::Regex;
use std::sync::LazyLock;

/// Pattern for external issue identifiers: 2–10 uppercase letters, a
/// hyphen, and digits (e.g. `SC-274`, `REC-123`).
static ISSUE_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Z]{2,10}-[0-9]+").expect("invalid issue id regex"));

/// Extract external issue identifiers from free text.
///
/// De-duplicated, first-seen order preserved.
pub fn extract_issue_ids(text: &str) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for m in ISSUE_ID_REGEX.find_iter(text) {
        let id = m.as_str().to_string();
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}

/// An open convoy that already references a candidate issue id.
#[derive(Debug, Clone)]
pub struct DuplicateMatch {
    /// The colliding convoy.
    pub convoy: ConvoyRecord,
    /// The first candidate id found in its title.
    pub issue_id: String,
    /// Whether a live session currently exists for this convoy.
    pub live_session: bool,
}

/// Result of a duplicate scan.
#[derive(Debug, Clone, Default)]
pub struct DuplicateScan {
    /// At most one match per convoy (first matching id wins).
    pub matches: Vec<DuplicateMatch>,
    /// The scan failed and degraded to empty; emptiness here means
    /// "could not look", not "no duplicates".
    pub degraded: bool,
}

/// Search Open and InProgress convoys for titles referencing any of the
/// candidate issue ids.
///
/// A convoy is reported at most once even if its title contains several
/// candidates. Any query failure degrades to an empty scan (fail-open).
pub fn find_duplicate_convoys(
    config: &Config,
    ledger: &dyn Ledger,
    sessions: &dyn SessionManager,
    issue_ids: &[String],
) -> DuplicateScan {
    if issue_ids.is_empty() {
        return DuplicateScan::default();
    }

    let candidates = match open_convoys(ledger) {
        Ok(convoys) => convoys,
        Err(e) => {
            eprintln!("Warning: duplicate-convoy scan degraded: {}", e);
            return DuplicateScan {
                matches: Vec::new(),
                degraded: true,
            };
        }
    };

    // A session listing failure only loses the liveness annotation.
    let live_sessions = sessions.list_sessions().unwrap_or_default();

    let mut matches = Vec::new();
    for convoy in candidates {
        let Some(issue_id) = issue_ids.iter().find(|id| convoy.title.contains(id.as_str()))
        else {
            continue;
        };

        let prefix = convoy_session_prefix(&config.session_prefix, &convoy.id);
        let live_session = live_sessions.iter().any(|s| s.starts_with(&prefix));

        matches.push(DuplicateMatch {
            issue_id: issue_id.clone(),
            live_session,
            convoy,
        });
    }

    DuplicateScan {
        matches,
        degraded: false,
    }
}

fn open_convoys(ledger: &dyn Ledger) -> Result<Vec<ConvoyRecord>> {
    let mut convoys = ledger.list_convoys(Some(ConvoyStatus::Open))?;
    convoys.extend(ledger.list_convoys(Some(ConvoyStatus::InProgress))?);
    Ok(convoys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeLedger, FakeSessions};

    #[test]
    fn extracts_ids_deduplicated_in_first_seen_order() {
        let ids = extract_issue_ids("Fix SC-274 and REC-123, also SC-274");
        assert_eq!(ids, vec!["SC-274", "REC-123"]);
    }

    #[test]
    fn extraction_requires_two_to_ten_uppercase_letters() {
        assert!(extract_issue_ids("A-123 has one letter").is_empty());
        assert_eq!(extract_issue_ids("AB-1 is minimal"), vec!["AB-1"]);
        assert_eq!(
            extract_issue_ids("ABCDEFGHIJ-9 is the widest"),
            vec!["ABCDEFGHIJ-9"]
        );
        assert!(extract_issue_ids("lower-case ab-123 does not count").is_empty());
        assert!(extract_issue_ids("no digits AB- here").is_empty());
    }

    #[test]
    fn extraction_of_plain_text_is_empty() {
        assert!(extract_issue_ids("nothing to see here").is_empty());
    }

    #[test]
    fn finds_open_convoys_referencing_a_candidate() {
        let ledger = FakeLedger::new();
        let sessions = FakeSessions::new();
        ledger.seed_convoy("Fix SC-274 frame drops", &[]);
        ledger.seed_convoy("Unrelated refactor", &[]);

        let scan = find_duplicate_convoys(
            &Config::default(),
            &ledger,
            &sessions,
            &["SC-274".to_string()],
        );

        assert!(!scan.degraded);
        assert_eq!(scan.matches.len(), 1);
        assert_eq!(scan.matches[0].issue_id, "SC-274");
        assert!(!scan.matches[0].live_session);
    }

    #[test]
    fn one_match_per_convoy_first_candidate_wins() {
        let ledger = FakeLedger::new();
        let sessions = FakeSessions::new();
        ledger.seed_convoy("Fix SC-274 and REC-123 together", &[]);

        let scan = find_duplicate_convoys(
            &Config::default(),
            &ledger,
            &sessions,
            &["REC-123".to_string(), "SC-274".to_string()],
        );

        assert_eq!(scan.matches.len(), 1);
        // First candidate in the given order, not first in the title.
        assert_eq!(scan.matches[0].issue_id, "REC-123");
    }

    #[test]
    fn closed_convoys_are_not_reported() {
        let ledger = FakeLedger::new();
        let sessions = FakeSessions::new();
        let convoy_id = ledger.seed_convoy("Fix SC-274 frame drops", &[]);
        ledger.close_convoy(&convoy_id, None).unwrap();

        let scan = find_duplicate_convoys(
            &Config::default(),
            &ledger,
            &sessions,
            &["SC-274".to_string()],
        );
        assert!(scan.matches.is_empty());
    }

    #[test]
    fn live_session_annotation() {
        let ledger = FakeLedger::new();
        let sessions = FakeSessions::new();
        let convoy_id = ledger.seed_convoy("Fix SC-274 frame drops", &[]);
        sessions.add_session(&format!("muster-{}-ag-1", convoy_id));

        let scan = find_duplicate_convoys(
            &Config::default(),
            &ledger,
            &sessions,
            &["SC-274".to_string()],
        );
        assert!(scan.matches[0].live_session);
    }

    #[test]
    fn query_failure_fails_open_with_degraded_marker() {
        let ledger = FakeLedger::new();
        let sessions = FakeSessions::new();
        ledger.seed_convoy("Fix SC-274 frame drops", &[]);
        ledger.set_fail_reads(true);

        let scan = find_duplicate_convoys(
            &Config::default(),
            &ledger,
            &sessions,
            &["SC-274".to_string()],
        );

        assert!(scan.matches.is_empty());
        assert!(scan.degraded);
    }

    #[test]
    fn empty_candidate_list_scans_nothing() {
        let ledger = FakeLedger::new();
        let sessions = FakeSessions::new();
        // Even a failing ledger is never consulted.
        ledger.set_fail_reads(true);

        let scan = find_duplicate_convoys(&Config::default(), &ledger, &sessions, &[]);
        assert!(scan.matches.is_empty());
        assert!(!scan.degraded);
    }
}
