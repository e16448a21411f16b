use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::directory::{AccountStatus, HrApproverEntry};
use crate::domain::leave::EmployeeId;

/// An HR pool entry together with the account status of the employee behind it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HrCandidate {
    pub entry: HrApproverEntry,
    pub account_status: AccountStatus,
}

impl HrCandidate {
    /// Entry flag and account status are judged together, never one without the other.
    fn is_active(&self) -> bool {
        self.entry.active && self.account_status == AccountStatus::Active
    }

    fn has_affinity_for(&self, division_code: &str) -> bool {
        self.entry.division_code.as_deref() == Some(division_code)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMode {
    /// In-workflow routing: division affinity, then generic, else fail.
    Strict,
    /// Top-level submissions only: strict order, then any active HR approver.
    AnyActiveFallback,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HrMatch {
    DivisionAffinity,
    Generic,
    AnyActive,
}

impl HrMatch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DivisionAffinity => "division_affinity",
            Self::Generic => "generic",
            Self::AnyActive => "any_active",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HrRoutingDecision {
    pub approver_id: EmployeeId,
    pub entry_id: String,
    pub matched: HrMatch,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("no active HR approver for division `{division_code}`")]
    NoHrApprover { division_code: String },
    #[error("no active HR approver exists in the directory")]
    NoActiveHrApprover,
}

/// Picks the HR-layer approver for a division.
///
/// Candidates are kept ordered by entry id so ties always resolve the same way.
#[derive(Clone, Debug, Default)]
pub struct HrApproverRouter {
    candidates: Vec<HrCandidate>,
}

impl HrApproverRouter {
    pub fn new(mut candidates: Vec<HrCandidate>) -> Self {
        candidates.sort_by(|left, right| left.entry.id.cmp(&right.entry.id));
        Self { candidates }
    }

    pub fn resolve(
        &self,
        division_code: &str,
        mode: ResolutionMode,
    ) -> Result<HrRoutingDecision, RoutingError> {
        let mut active = self.candidates.iter().filter(|candidate| candidate.is_active());

        if let Some(candidate) =
            active.clone().find(|candidate| candidate.has_affinity_for(division_code))
        {
            return Ok(decision(candidate, HrMatch::DivisionAffinity));
        }

        if let Some(candidate) = active
            .clone()
            .find(|candidate| candidate.entry.is_generic && candidate.entry.division_code.is_none())
        {
            return Ok(decision(candidate, HrMatch::Generic));
        }

        match mode {
            ResolutionMode::Strict => {
                Err(RoutingError::NoHrApprover { division_code: division_code.to_string() })
            }
            ResolutionMode::AnyActiveFallback => active
                .next()
                .map(|candidate| decision(candidate, HrMatch::AnyActive))
                .ok_or(RoutingError::NoActiveHrApprover),
        }
    }
}

fn decision(candidate: &HrCandidate, matched: HrMatch) -> HrRoutingDecision {
    HrRoutingDecision {
        approver_id: candidate.entry.employee_id.clone(),
        entry_id: candidate.entry.id.clone(),
        matched,
    }
}

/// Classifies requester roles that skip the manager layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoleClassifier {
    top_level_markers: Vec<String>,
}

impl RoleClassifier {
    pub fn new(markers: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let top_level_markers = markers
            .into_iter()
            .map(|marker| normalize_key(&marker.into()))
            .filter(|marker| !marker.is_empty())
            .collect();
        Self { top_level_markers }
    }

    pub fn is_top_level(&self, role_name: &str) -> bool {
        let role = normalize_key(role_name);
        self.top_level_markers.iter().any(|marker| role.contains(marker.as_str()))
    }
}

impl Default for RoleClassifier {
    fn default() -> Self {
        Self::new(["director", "direktur"])
    }
}

fn normalize_key(raw: &str) -> String {
    raw.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::{
        HrApproverRouter, HrCandidate, HrMatch, ResolutionMode, RoleClassifier, RoutingError,
    };
    use crate::domain::directory::{AccountStatus, HrApproverEntry};
    use crate::domain::leave::EmployeeId;

    fn candidate(
        id: &str,
        employee: &str,
        division: Option<&str>,
        is_generic: bool,
        active: bool,
        account_status: AccountStatus,
    ) -> HrCandidate {
        HrCandidate {
            entry: HrApproverEntry {
                id: id.to_string(),
                employee_id: EmployeeId(employee.to_string()),
                division_code: division.map(str::to_string),
                is_generic,
                active,
            },
            account_status,
        }
    }

    fn pool() -> Vec<HrCandidate> {
        vec![
            candidate("hr-03", "E-HR-GEN", None, true, true, AccountStatus::Active),
            candidate("hr-01", "E-HR-FIN", Some("FIN"), false, true, AccountStatus::Active),
            candidate("hr-02", "E-HR-OPS", Some("OPS"), false, true, AccountStatus::Active),
        ]
    }

    #[test]
    fn division_affinity_wins_over_generic() {
        let router = HrApproverRouter::new(pool());
        let decision = router.resolve("FIN", ResolutionMode::Strict).expect("resolve");

        assert_eq!(decision.approver_id.0, "E-HR-FIN");
        assert_eq!(decision.matched, HrMatch::DivisionAffinity);
    }

    #[test]
    fn generic_entry_serves_divisions_without_affinity() {
        let router = HrApproverRouter::new(pool());
        let decision = router.resolve("LEGAL", ResolutionMode::Strict).expect("resolve");

        assert_eq!(decision.approver_id.0, "E-HR-GEN");
        assert_eq!(decision.matched, HrMatch::Generic);
    }

    #[test]
    fn affinity_match_is_exact() {
        let router = HrApproverRouter::new(pool());
        let decision = router.resolve("fin", ResolutionMode::Strict).expect("resolve");

        assert_eq!(decision.matched, HrMatch::Generic);
    }

    #[test]
    fn inactive_account_disqualifies_an_active_entry() {
        let router = HrApproverRouter::new(vec![
            candidate("hr-01", "E-HR-FIN", Some("FIN"), false, true, AccountStatus::Inactive),
            candidate("hr-02", "E-HR-GEN", None, true, true, AccountStatus::Active),
        ]);
        let decision = router.resolve("FIN", ResolutionMode::Strict).expect("resolve");

        assert_eq!(decision.approver_id.0, "E-HR-GEN");
    }

    #[test]
    fn inactive_entry_disqualifies_an_active_account() {
        let router = HrApproverRouter::new(vec![candidate(
            "hr-01",
            "E-HR-FIN",
            Some("FIN"),
            false,
            false,
            AccountStatus::Active,
        )]);

        assert!(router.resolve("FIN", ResolutionMode::AnyActiveFallback).is_err());
    }

    #[test]
    fn strict_mode_never_falls_back_to_another_division() {
        let router = HrApproverRouter::new(vec![candidate(
            "hr-02",
            "E-HR-OPS",
            Some("OPS"),
            false,
            true,
            AccountStatus::Active,
        )]);

        let error = router.resolve("FIN", ResolutionMode::Strict).expect_err("strict");
        assert_eq!(error, RoutingError::NoHrApprover { division_code: "FIN".to_string() });
    }

    #[test]
    fn lenient_mode_falls_back_to_any_active_approver() {
        let router = HrApproverRouter::new(vec![candidate(
            "hr-02",
            "E-HR-OPS",
            Some("OPS"),
            false,
            true,
            AccountStatus::Active,
        )]);

        let decision =
            router.resolve("FIN", ResolutionMode::AnyActiveFallback).expect("fallback");
        assert_eq!(decision.approver_id.0, "E-HR-OPS");
        assert_eq!(decision.matched, HrMatch::AnyActive);
    }

    #[test]
    fn ties_resolve_to_lowest_entry_id() {
        let router = HrApproverRouter::new(vec![
            candidate("hr-09", "E-HR-B", None, true, true, AccountStatus::Active),
            candidate("hr-04", "E-HR-A", None, true, true, AccountStatus::Active),
        ]);
        let decision = router.resolve("ANY", ResolutionMode::Strict).expect("resolve");

        assert_eq!(decision.entry_id, "hr-04");
    }

    #[test]
    fn empty_directory_fails_in_both_modes() {
        let router = HrApproverRouter::default();
        assert!(router.resolve("FIN", ResolutionMode::Strict).is_err());
        assert_eq!(
            router.resolve("FIN", ResolutionMode::AnyActiveFallback),
            Err(RoutingError::NoActiveHrApprover)
        );
    }

    #[test]
    fn role_classifier_matches_markers_case_insensitively() {
        let classifier = RoleClassifier::default();

        assert!(classifier.is_top_level("Director of Finance"));
        assert!(classifier.is_top_level("DIREKTUR UTAMA"));
        assert!(classifier.is_top_level("Managing-director"));
        assert!(!classifier.is_top_level("Finance Manager"));
        assert!(!classifier.is_top_level(""));
    }
}
