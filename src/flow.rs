//! Multi-level approval flow for a submission
//!
//! A flow is an append-only list of steps grouped in rounds. Submitting opens
//! a round with one step per approval level; level 1 starts `Pending`, the
//! others `Waiting`. Approving a step hands `Pending` to the next level,
//! rejecting one ends the round. The submission's state is always derived
//! from the steps of the latest round.
use super::error::FlowError;
use super::timestamp::TimeStamp;
use uuid7::uuid7;

/// Most approval levels a round may have.
pub const MAX_APPROVAL_LEVELS: u8 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum StepStatus {
    // not reached yet
    #[n(0)]
    Waiting,
    #[n(1)]
    Pending,
    #[n(2)]
    Approved,
    #[n(3)]
    Rejected,
}

/// What an approver does with the pending step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approved,
    Rejected,
}

impl From<Decision> for StepStatus {
    fn from(value: Decision) -> Self {
        match value {
            Decision::Approved => StepStatus::Approved,
            Decision::Rejected => StepStatus::Rejected,
        }
    }
}

/// A user acting on a flow, identified by id and holding one approval level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub level: u8,
}

impl Actor {
    pub fn new(id: impl Into<String>, level: u8) -> Self {
        Self {
            id: id.into(),
            level,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct ApprovalFlowStep {
    #[n(0)]
    pub flow_id: String,
    #[n(1)]
    pub submission_id: String,
    #[n(2)]
    pub round: u32,
    #[n(3)]
    pub required_level: u8,
    #[n(4)]
    pub status: StepStatus,
    #[n(5)]
    pub approver_id: Option<String>,
    #[n(6)]
    pub comment: Option<String>,
    #[n(7)]
    pub form_hash: String, // sha256 of the form data this round approves
    #[n(8)]
    pub updated_at: TimeStamp,
}

/// Submission state as seen from its flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Drafted,
    Pending { level: u8 },
    Approved,
    Rejected { level: u8 },
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct ApprovalFlow {
    #[n(0)]
    pub submission_id: String,
    #[n(1)]
    pub steps: Vec<ApprovalFlowStep>,
    #[n(2)]
    pub version: u64, // bumped on every mutation
}

impl ApprovalFlow {
    pub fn new(submission_id: String) -> Self {
        Self {
            submission_id,
            steps: vec![],
            version: 0,
        }
    }

    /// Latest round number, 0 before the first submit.
    pub fn round(&self) -> u32 {
        self.steps.iter().map(|s| s.round).max().unwrap_or(0)
    }

    /// Steps of the latest round ordered by required level.
    pub fn current_steps(&self) -> Vec<&ApprovalFlowStep> {
        let round = self.round();
        let mut steps: Vec<_> = self
            .steps
            .iter()
            .filter(|s| round > 0 && s.round == round)
            .collect();
        steps.sort_by_key(|s| s.required_level);
        steps
    }

    /// The single step awaiting action, if the flow is active.
    pub fn pending_step(&self) -> Option<&ApprovalFlowStep> {
        self.current_steps()
            .into_iter()
            .find(|s| s.status == StepStatus::Pending)
    }

    pub fn state(&self) -> FlowState {
        let steps = self.current_steps();
        if steps.is_empty() {
            return FlowState::Drafted;
        }
        if let Some(rejected) = steps.iter().find(|s| s.status == StepStatus::Rejected) {
            return FlowState::Rejected {
                level: rejected.required_level,
            };
        }
        match steps.iter().find(|s| s.status == StepStatus::Pending) {
            Some(pending) => FlowState::Pending {
                level: pending.required_level,
            },
            None => FlowState::Approved,
        }
    }

    /// Whether the submission may be edited by its submitter.
    pub fn is_editable(&self) -> bool {
        matches!(self.state(), FlowState::Drafted | FlowState::Rejected { .. })
    }

    /// True iff `level` is exactly the level required by the pending step.
    pub fn can_act(&self, level: u8) -> bool {
        self.pending_step()
            .is_some_and(|step| step.required_level == level)
    }

    /// Open a new round of `levels` steps for the form identified by `form_hash`.
    pub fn start_round(&mut self, levels: u8, form_hash: String) -> Result<(), FlowError> {
        match self.state() {
            FlowState::Drafted | FlowState::Rejected { .. } => {}
            FlowState::Pending { level } => return Err(FlowError::InFlight { level }),
            FlowState::Approved => return Err(FlowError::AlreadyResolved),
        }
        if !(1..=MAX_APPROVAL_LEVELS).contains(&levels) {
            return Err(FlowError::Validation(format!(
                "An approval flow needs between 1 and {MAX_APPROVAL_LEVELS} levels, got {levels}"
            )));
        }

        let round = self.round() + 1;
        let now = TimeStamp::now();
        for level in 1..=levels {
            self.steps.push(ApprovalFlowStep {
                flow_id: uuid7().to_string(),
                submission_id: self.submission_id.clone(),
                round,
                required_level: level,
                status: if level == 1 {
                    StepStatus::Pending
                } else {
                    StepStatus::Waiting
                },
                approver_id: None,
                comment: None,
                form_hash: form_hash.clone(),
                updated_at: now,
            });
        }
        self.version += 1;
        Ok(())
    }

    /// Apply `decision` to the pending step on behalf of `actor`.
    ///
    /// Every precondition is checked before anything is written, so a failed
    /// call leaves the flow untouched.
    pub fn act(
        &mut self,
        decision: Decision,
        actor: &Actor,
        comment: &str,
    ) -> Result<ApprovalFlowStep, FlowError> {
        let round = self.round();
        if round == 0 {
            return Err(FlowError::NotSubmitted);
        }
        let index = self
            .steps
            .iter()
            .position(|s| s.round == round && s.status == StepStatus::Pending)
            .ok_or(FlowError::AlreadyResolved)?;

        let required = self.steps[index].required_level;
        if actor.level != required {
            return Err(FlowError::Authorization {
                required,
                actual: actor.level,
            });
        }

        let comment = comment.trim();
        if decision == Decision::Rejected && comment.is_empty() {
            return Err(FlowError::Validation(
                "A comment is required when rejecting".into(),
            ));
        }

        let now = TimeStamp::now();
        let step = &mut self.steps[index];
        step.status = decision.into();
        step.approver_id = Some(actor.id.clone());
        step.comment = (!comment.is_empty()).then(|| comment.to_string());
        step.updated_at = now;
        let acted = step.clone();

        if decision == Decision::Approved {
            let next_level = required.checked_add(1);
            if let Some(next) = self.steps.iter_mut().find(|s| {
                s.round == round
                    && Some(s.required_level) == next_level
                    && s.status == StepStatus::Waiting
            }) {
                next.status = StepStatus::Pending;
                next.updated_at = now;
            }
        }
        self.version += 1;

        Ok(acted)
    }

    /// Acted steps carrying a comment, oldest round first then by level.
    pub fn comment_log(&self) -> Vec<&ApprovalFlowStep> {
        let mut log: Vec<_> = self
            .steps
            .iter()
            .filter(|s| matches!(s.status, StepStatus::Approved | StepStatus::Rejected))
            .filter(|s| s.comment.as_deref().is_some_and(|c| !c.is_empty()))
            .collect();
        log.sort_by_key(|s| (s.round, s.required_level));
        log
    }
}
