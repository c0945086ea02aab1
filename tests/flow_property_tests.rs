//! Property-based tests for approval flow state derivation
//!
//! Random sequences of approve/reject attempts by actors of random levels are
//! thrown at a flow. Whatever the sequence, the invariants approvers depend on
//! must hold: never more than one pending step, levels resolved strictly in
//! order, refused attempts leave the flow untouched, and a rejection is final
//! for its round.

use batch_report::{
    Actor, ApprovalFlow, Decision, FlowState, StepStatus, error::FlowError,
};
use proptest::prelude::*;

/// An attempted action: decision, actor level, comment
type Attempt = (Decision, u8, String);

fn decision_strategy() -> impl Strategy<Value = Decision> {
    prop::bool::ANY.prop_map(|b| if b { Decision::Approved } else { Decision::Rejected })
}

fn attempt_strategy(max_level: u8) -> impl Strategy<Value = Attempt> {
    (
        decision_strategy(),
        0u8..=max_level + 1,
        prop_oneof![Just(String::new()), Just("  ".to_string()), "[a-z ]{1,12}"],
    )
}

fn levels_and_attempts() -> impl Strategy<Value = (u8, Vec<Attempt>)> {
    (1u8..=4).prop_flat_map(|levels| {
        (
            Just(levels),
            prop::collection::vec(attempt_strategy(levels), 0..=20),
        )
    })
}

fn pending_count(flow: &ApprovalFlow) -> usize {
    flow.current_steps()
        .iter()
        .filter(|s| s.status == StepStatus::Pending)
        .count()
}

proptest! {
    /// Property: at most one step is pending, and exactly one while the flow is active
    #[test]
    fn prop_single_pending_step((levels, attempts) in levels_and_attempts()) {
        let mut flow = ApprovalFlow::new("report_prop".into());
        flow.start_round(levels, "hash".into()).unwrap();

        for (decision, level, comment) in attempts {
            let _ = flow.act(decision, &Actor::new("user", level), &comment);

            let pending = pending_count(&flow);
            match flow.state() {
                FlowState::Pending { .. } => prop_assert_eq!(pending, 1),
                _ => prop_assert_eq!(pending, 0),
            }
        }
    }

    /// Property: failed actions never mutate the flow
    #[test]
    fn prop_refused_actions_are_non_mutating((levels, attempts) in levels_and_attempts()) {
        let mut flow = ApprovalFlow::new("report_prop".into());
        flow.start_round(levels, "hash".into()).unwrap();

        for (decision, level, comment) in attempts {
            let before = flow.clone();
            if flow.act(decision, &Actor::new("user", level), &comment).is_err() {
                prop_assert_eq!(&flow, &before);
            } else {
                prop_assert_eq!(flow.version, before.version + 1);
            }
        }
    }

    /// Property: only an actor with exactly the pending level succeeds, and
    /// rejections always carry a comment
    #[test]
    fn prop_success_implies_exact_level((levels, attempts) in levels_and_attempts()) {
        let mut flow = ApprovalFlow::new("report_prop".into());
        flow.start_round(levels, "hash".into()).unwrap();

        for (decision, level, comment) in attempts {
            let required = flow.pending_step().map(|s| s.required_level);
            match flow.act(decision, &Actor::new("user", level), &comment) {
                Ok(step) => {
                    prop_assert_eq!(Some(level), required);
                    prop_assert_eq!(step.required_level, level);
                    if decision == Decision::Rejected {
                        prop_assert!(step.comment.is_some());
                    }
                }
                Err(FlowError::AlreadyResolved) => prop_assert!(required.is_none()),
                Err(FlowError::Authorization { required: r, actual }) => {
                    prop_assert_eq!(Some(r), required);
                    prop_assert_ne!(actual, r);
                }
                Err(FlowError::Validation(_)) => {
                    prop_assert_eq!(decision, Decision::Rejected);
                    prop_assert!(comment.trim().is_empty());
                }
                Err(other) => prop_assert!(false, "unexpected error {:?}", other),
            }
        }
    }

    /// Property: approved steps always form a prefix of the levels, and after
    /// a rejection every later level is still waiting
    #[test]
    fn prop_levels_resolve_in_order((levels, attempts) in levels_and_attempts()) {
        let mut flow = ApprovalFlow::new("report_prop".into());
        flow.start_round(levels, "hash".into()).unwrap();

        for (decision, level, comment) in attempts {
            let _ = flow.act(decision, &Actor::new("user", level), &comment);
        }

        let statuses: Vec<StepStatus> = flow.current_steps().iter().map(|s| s.status).collect();
        let approved = statuses.iter().take_while(|s| **s == StepStatus::Approved).count();
        if approved < statuses.len() {
            prop_assert!(matches!(statuses[approved], StepStatus::Pending | StepStatus::Rejected));
            prop_assert!(statuses[approved + 1..].iter().all(|s| *s == StepStatus::Waiting));
        } else {
            prop_assert_eq!(flow.state(), FlowState::Approved);
        }
    }

    /// Property: CBOR round trip preserves the derived state
    #[test]
    fn prop_cbor_roundtrip_preserves_state((levels, attempts) in levels_and_attempts()) {
        let mut flow = ApprovalFlow::new("report_prop".into());
        flow.start_round(levels, "hash".into()).unwrap();
        for (decision, level, comment) in attempts {
            let _ = flow.act(decision, &Actor::new("user", level), &comment);
        }

        let encoded = minicbor::to_vec(&flow).expect("Serialization should succeed");
        let decoded: ApprovalFlow = minicbor::decode(&encoded).expect("Deserialization should succeed");

        prop_assert_eq!(decoded.state(), flow.state());
        prop_assert_eq!(decoded, flow);
    }
}
