//! Pure status aggregation: one display status per requirement, and
//! catalog-level roll-up buckets.
//!
//! Both computations are order-independent over the link list and are
//! recomputed from scratch whenever the requirement set changes; there
//! is no incremental maintenance.

use crate::models::{DerivedStatus, IssueLink, LinkStatus, Requirement};
use crate::requirements::filter_visible;

/// Derives a single display status from a requirement's link list.
///
/// Precedence, first match wins:
/// 1. no entries -> `noStatus`
/// 2. any `Unfulfilled` -> `Unfulfilled`
/// 3. any `pending_validation` -> `pending_validation`
/// 4. all `Validated` -> `Validated`
/// 5. at least one `accept_risk`, rest `Validated` or `accept_risk`
///    -> `validated_with_risk`
/// 6. otherwise -> `Unknown` (unreachable with the closed status set,
///    kept as the documented fallback)
pub fn derive_status(links: &[IssueLink]) -> DerivedStatus {
    if links.is_empty() {
        return DerivedStatus::NoStatus;
    }
    if links.iter().any(|l| l.status == LinkStatus::Unfulfilled) {
        return DerivedStatus::Unfulfilled;
    }
    if links
        .iter()
        .any(|l| l.status == LinkStatus::PendingValidation)
    {
        return DerivedStatus::PendingValidation;
    }
    if links.iter().all(|l| l.status == LinkStatus::Validated) {
        return DerivedStatus::Validated;
    }
    let risk_or_validated = links
        .iter()
        .all(|l| matches!(l.status, LinkStatus::Validated | LinkStatus::AcceptRisk));
    if risk_or_validated {
        return DerivedStatus::ValidatedWithRisk;
    }
    DerivedStatus::Unknown
}

/// Catalog-level partition of non-container requirements into five
/// disjoint buckets, by requirement id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusRollup {
    pub without_work_item: Vec<String>,
    pub pending_validation: Vec<String>,
    pub unfulfilled: Vec<String>,
    pub validated_with_risk: Vec<String>,
    pub validated: Vec<String>,
}

impl StatusRollup {
    /// Total non-container requirements across all buckets.
    pub fn total(&self) -> usize {
        self.without_work_item.len()
            + self.pending_validation.len()
            + self.unfulfilled.len()
            + self.validated_with_risk.len()
            + self.validated.len()
    }

    /// Verification progress as a percentage: validated over total,
    /// zero when there is nothing to verify.
    pub fn progress(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.validated.len() as f64 / total as f64 * 100.0
    }
}

/// Partitions a catalog's requirements using [`derive_status`].
/// Container nodes are excluded before bucketing.
pub fn rollup(requirements: &[Requirement]) -> StatusRollup {
    let mut out = StatusRollup::default();
    for req in filter_visible(requirements) {
        match derive_status(&req.issues_linked) {
            DerivedStatus::NoStatus => out.without_work_item.push(req.id.clone()),
            DerivedStatus::PendingValidation => out.pending_validation.push(req.id.clone()),
            DerivedStatus::Unfulfilled => out.unfulfilled.push(req.id.clone()),
            DerivedStatus::ValidatedWithRisk => out.validated_with_risk.push(req.id.clone()),
            DerivedStatus::Validated => out.validated.push(req.id.clone()),
            // Unreachable with the closed status set.
            DerivedStatus::Unknown => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn link(issue_key: &str, status: LinkStatus) -> IssueLink {
        IssueLink {
            issue_key: issue_key.into(),
            status,
            explanation: None,
            linked_at: Utc::now(),
        }
    }

    fn requirement(id: &str, is_container: bool, links: Vec<IssueLink>) -> Requirement {
        Requirement {
            id: id.into(),
            heading: String::new(),
            text: if is_container { String::new() } else { "body".into() },
            important: 0,
            section: String::new(),
            level: 1,
            parent_id: None,
            children_ids: Vec::new(),
            dependencies: Vec::new(),
            is_container,
            issues_linked: links,
            correlation: None,
            catalog_title: String::new(),
        }
    }

    #[test]
    fn test_empty_links_is_no_status() {
        assert_eq!(derive_status(&[]), DerivedStatus::NoStatus);
    }

    #[test]
    fn test_unfulfilled_wins_over_everything() {
        let links = vec![
            link("A-1", LinkStatus::Validated),
            link("A-2", LinkStatus::Unfulfilled),
            link("A-3", LinkStatus::PendingValidation),
        ];
        assert_eq!(derive_status(&links), DerivedStatus::Unfulfilled);
    }

    #[test]
    fn test_pending_wins_over_validated() {
        let links = vec![
            link("A-1", LinkStatus::Validated),
            link("A-2", LinkStatus::PendingValidation),
        ];
        assert_eq!(derive_status(&links), DerivedStatus::PendingValidation);
    }

    #[test]
    fn test_all_validated() {
        let links = vec![
            link("A-1", LinkStatus::Validated),
            link("A-2", LinkStatus::Validated),
        ];
        assert_eq!(derive_status(&links), DerivedStatus::Validated);
    }

    #[test]
    fn test_accept_risk_mixed_with_validated() {
        let links = vec![
            link("A-1", LinkStatus::Validated),
            link("A-2", LinkStatus::AcceptRisk),
        ];
        assert_eq!(derive_status(&links), DerivedStatus::ValidatedWithRisk);
    }

    #[test]
    fn test_all_accept_risk() {
        let links = vec![link("A-1", LinkStatus::AcceptRisk)];
        assert_eq!(derive_status(&links), DerivedStatus::ValidatedWithRisk);
    }

    #[test]
    fn test_derive_is_order_independent() {
        let mut links = vec![
            link("A-1", LinkStatus::AcceptRisk),
            link("A-2", LinkStatus::Validated),
            link("A-3", LinkStatus::PendingValidation),
        ];
        let forward = derive_status(&links);
        links.reverse();
        assert_eq!(derive_status(&links), forward);
    }

    #[test]
    fn test_rollup_buckets_are_disjoint() {
        let requirements = vec![
            requirement("R-0", false, vec![]),
            requirement("R-1", false, vec![link("A-1", LinkStatus::PendingValidation)]),
            requirement("R-2", false, vec![link("A-1", LinkStatus::Validated)]),
            requirement(
                "R-3",
                false,
                vec![
                    link("A-1", LinkStatus::Validated),
                    link("A-2", LinkStatus::AcceptRisk),
                ],
            ),
            requirement("R-4", false, vec![link("A-1", LinkStatus::Unfulfilled)]),
            requirement("SECTION", true, vec![]),
        ];

        let rollup = rollup(&requirements);
        assert_eq!(rollup.without_work_item, vec!["R-0"]);
        assert_eq!(rollup.pending_validation, vec!["R-1"]);
        assert_eq!(rollup.validated, vec!["R-2"]);
        assert_eq!(rollup.validated_with_risk, vec!["R-3"]);
        assert_eq!(rollup.unfulfilled, vec!["R-4"]);
        // Containers never enter any bucket.
        assert_eq!(rollup.total(), 5);
        assert_eq!(rollup.progress(), 20.0);
    }

    #[test]
    fn test_validated_with_risk_not_counted_as_validated() {
        let requirements = vec![requirement(
            "R-1",
            false,
            vec![
                link("A-1", LinkStatus::Validated),
                link("A-2", LinkStatus::AcceptRisk),
            ],
        )];
        let rollup = rollup(&requirements);
        assert!(rollup.validated.is_empty());
        assert_eq!(rollup.validated_with_risk, vec!["R-1"]);
    }

    #[test]
    fn test_progress_zero_when_empty() {
        assert_eq!(rollup(&[]).progress(), 0.0);
    }
}
