//! Pure decisions that drive the plan-review loop.

use super::types::{Plan, PlannerOutput, Review, StopReason};

/// Decide whether the loop stops after a planning call.
///
/// `attempts` is the counter after it was incremented for this iteration. The
/// budget comparison is strict, so a loop with `max_attempts = N` makes `N + 1`
/// planning calls before it reports exhaustion. A missing plan is treated like
/// a plan with no steps.
pub fn stop_reason(
    review: Option<&Review>,
    plan: Option<&Plan>,
    attempts: u32,
    max_attempts: u32,
    threshold: i64,
) -> Option<StopReason> {
    if review.is_some_and(|review| review.meets(threshold)) {
        return Some(StopReason::Accepted);
    }
    if plan.is_none_or(Plan::is_empty) {
        return Some(StopReason::NothingToDo);
    }
    if attempts > max_attempts {
        return Some(StopReason::Exhausted);
    }
    None
}

/// Apply the planner decoding policy to a decoded payload.
///
/// The review is kept as returned. The plan is kept only while more work is
/// warranted: when no review is present (first iteration) or the review
/// scored below `threshold`.
pub fn accept_planner_output(
    output: PlannerOutput,
    threshold: i64,
) -> (Option<Review>, Option<Plan>) {
    let PlannerOutput { review, plan } = output;
    let keep_plan = review.as_ref().is_none_or(|review| !review.meets(threshold));
    let plan = if keep_plan { plan } else { None };
    (review, plan)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> Plan {
        Plan::new(vec!["s".to_string()], vec!["p".to_string()])
    }

    #[test]
    fn accepting_review_stops_even_with_plan() {
        let review = Review::new(9, "good");
        assert_eq!(
            stop_reason(Some(&review), Some(&plan()), 1, 3, 7),
            Some(StopReason::Accepted)
        );
    }

    #[test]
    fn empty_plan_stops_regardless_of_score() {
        let review = Review::new(1, "bad");
        let empty = Plan::new(Vec::new(), Vec::new());
        assert_eq!(
            stop_reason(Some(&review), Some(&empty), 1, 3, 7),
            Some(StopReason::NothingToDo)
        );
        assert_eq!(
            stop_reason(None, None, 1, 3, 7),
            Some(StopReason::NothingToDo)
        );
    }

    #[test]
    fn budget_comparison_is_strict() {
        let review = Review::new(2, "meh");
        assert_eq!(stop_reason(Some(&review), Some(&plan()), 2, 2, 7), None);
        assert_eq!(
            stop_reason(Some(&review), Some(&plan()), 3, 2, 7),
            Some(StopReason::Exhausted)
        );
    }

    #[test]
    fn plan_dropped_when_review_meets_threshold() {
        let output = PlannerOutput {
            review: Some(Review::new(8, "fine")),
            plan: Some(plan()),
        };
        let (review, plan) = accept_planner_output(output, 7);
        assert_eq!(review.map(|r| r.score), Some(8));
        assert!(plan.is_none());
    }

    #[test]
    fn plan_kept_without_review() {
        let output = PlannerOutput {
            review: None,
            plan: Some(plan()),
        };
        let (review, kept) = accept_planner_output(output, 7);
        assert!(review.is_none());
        assert_eq!(kept, Some(plan()));
    }

    #[test]
    fn zero_score_review_is_kept() {
        let output = PlannerOutput {
            review: Some(Review::new(0, "nothing works")),
            plan: Some(plan()),
        };
        let (review, kept) = accept_planner_output(output, 7);
        assert_eq!(review.map(|r| r.score), Some(0));
        assert!(kept.is_some());
    }
}
