//! Service layer API for batch report drafts and approvals
use super::bag::{InputBag, OutputBag};
use super::calc;
use super::config::ReportConfig;
use super::error::{FlowError, SubmissionError};
use super::flow::{Actor, ApprovalFlow, ApprovalFlowStep, Decision, FlowState};
use super::submission::Submission;
use super::timestamp::TimeStamp;
use super::utils;
use super::variant::FormVariant;
use anyhow::Context;
use sled::transaction::{TransactionError, TransactionResult, abort};
use sled::{IVec, Transactional};
use std::sync::Arc;

const SUBMISSIONS_TREE: &str = "submissions";
const FLOWS_TREE: &str = "flows";

pub struct ReportService {
    instance: Arc<sled::Db>,
    submissions: sled::Tree,
    flows: sled::Tree,
    config: ReportConfig,
}

impl ReportService {
    pub fn new(instance: Arc<sled::Db>, config: ReportConfig) -> anyhow::Result<Self> {
        let submissions = instance.open_tree(SUBMISSIONS_TREE)?;
        let flows = instance.open_tree(FLOWS_TREE)?;

        Ok(Self {
            instance,
            submissions,
            flows,
            config,
        })
    }

    /// Open (or create) the database at `config.db_path`.
    pub fn open(config: ReportConfig) -> anyhow::Result<Self> {
        let db = sled::open(&config.db_path)
            .with_context(|| format!("failed to open database at {:?}", config.db_path))?;
        tracing::info!("opened report database at {:?}", config.db_path);
        Self::new(Arc::new(db), config)
    }

    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    /// Flush pending writes to disk
    pub fn flush(&self) -> anyhow::Result<()> {
        self.instance.flush()?;
        Ok(())
    }

    fn variant(code: &str) -> anyhow::Result<&'static FormVariant> {
        FormVariant::lookup(code)
            .ok_or_else(|| SubmissionError::UnknownVariant(code.to_string()).into())
    }

    /// Recompute derived fields without touching storage.
    pub fn preview(&self, variant_code: &str, inputs: &InputBag) -> anyhow::Result<OutputBag> {
        let variant = Self::variant(variant_code)?;
        Ok(calc::compute_outputs(inputs, variant))
    }

    fn decode_submission(bytes: Option<IVec>, submission_id: &str) -> anyhow::Result<Submission> {
        let bytes = bytes.ok_or_else(|| SubmissionError::NotFound(submission_id.to_string()))?;
        minicbor::decode(&bytes)
            .with_context(|| format!("corrupt submission record {submission_id}"))
    }

    /// A submission never submitted has no stored flow; it decodes as empty.
    fn decode_flow(bytes: Option<&IVec>, submission_id: &str) -> anyhow::Result<ApprovalFlow> {
        match bytes {
            Some(bytes) => minicbor::decode(bytes)
                .with_context(|| format!("corrupt approval flow record {submission_id}")),
            None => Ok(ApprovalFlow::new(submission_id.to_string())),
        }
    }

    fn load_submission(&self, submission_id: &str) -> anyhow::Result<Submission> {
        Self::decode_submission(self.submissions.get(submission_id.as_bytes())?, submission_id)
    }

    fn load_flow_raw(&self, submission_id: &str) -> anyhow::Result<(Option<IVec>, ApprovalFlow)> {
        let stored = self.flows.get(submission_id.as_bytes())?;
        let flow = Self::decode_flow(stored.as_ref(), submission_id)?;
        Ok((stored, flow))
    }

    /// Unwrap a transaction over both trees, surfacing aborts as their error.
    fn committed<T>(result: TransactionResult<T, anyhow::Error>) -> anyhow::Result<T> {
        match result {
            Ok(value) => Ok(value),
            Err(TransactionError::Abort(err)) => Err(err),
            Err(TransactionError::Storage(err)) => Err(err.into()),
        }
    }

    /// Write `flow` only if the stored record still equals `expected`.
    fn swap_flow(&self, expected: Option<IVec>, flow: &ApprovalFlow) -> anyhow::Result<()> {
        let encoded = minicbor::to_vec(flow)?;
        let swapped = self.flows.compare_and_swap(
            flow.submission_id.as_bytes(),
            expected,
            Some(encoded),
        )?;
        if swapped.is_err() {
            tracing::warn!(
                "lost concurrent update on approval flow {}",
                flow.submission_id
            );
            return Err(FlowError::Conflict.into());
        }
        Ok(())
    }

    fn computed_form_data(variant: &FormVariant, inputs: InputBag) -> InputBag {
        let outputs = calc::compute_outputs(&inputs, variant);
        tracing::debug!(
            "recomputed {} derived fields for {}",
            outputs.len(),
            variant.code
        );
        let mut form_data = inputs;
        form_data.merge_outputs(&outputs);
        form_data
    }

    /// Store a new draft with its derived fields computed.
    pub fn create_draft(
        &self,
        variant_code: &str,
        inputs: InputBag,
        submitter_id: &str,
    ) -> anyhow::Result<Submission> {
        let variant = Self::variant(variant_code)?;
        let id = utils::new_uuid_to_bech32("report")?;

        let submission = Submission::new(
            id,
            variant.code.to_string(),
            submitter_id.to_string(),
            Self::computed_form_data(variant, inputs),
        );
        self.submissions.insert(
            submission.id.as_bytes(),
            minicbor::to_vec(&submission)?,
        )?;

        tracing::info!(
            "created {} draft {} for {}",
            variant.code,
            submission.id,
            submitter_id
        );
        Ok(submission)
    }

    /// Replace the entry of a drafted or rejected submission.
    ///
    /// The editability check and the write run in one transaction over both
    /// trees, so an edit can never land under a round opened concurrently.
    pub fn update_draft(
        &self,
        submission_id: &str,
        inputs: InputBag,
        editor_id: &str,
    ) -> anyhow::Result<Submission> {
        let key = submission_id.as_bytes();
        let result: TransactionResult<Submission, anyhow::Error> = (&self.submissions, &self.flows)
            .transaction(|(submissions, flows)| {
                let mut submission =
                    Self::decode_submission(submissions.get(key)?, submission_id).or_else(abort)?;
                if submission.submitter_id != editor_id {
                    return abort(anyhow::Error::from(SubmissionError::NotSubmitter(
                        submission_id.to_string(),
                    )));
                }
                let flow = Self::decode_flow(flows.get(key)?.as_ref(), submission_id).or_else(abort)?;
                if !flow.is_editable() {
                    return abort(anyhow::Error::from(SubmissionError::NotEditable(
                        submission_id.to_string(),
                    )));
                }

                let variant = Self::variant(&submission.variant_code).or_else(abort)?;
                submission.form_data = Self::computed_form_data(variant, inputs.clone());
                submission.updated_at = TimeStamp::now();

                let encoded = minicbor::to_vec(&submission)
                    .map_err(anyhow::Error::from)
                    .or_else(abort)?;
                submissions.insert(key, encoded)?;
                Ok(submission)
            });
        let submission = Self::committed(result)?;

        tracing::info!("updated draft {}", submission_id);
        Ok(submission)
    }

    /// Enter the approval flow: open a round with the configured levels.
    ///
    /// The round is stamped with the hash of the form data read in the same
    /// transaction that writes the flow.
    pub fn submit(
        &self,
        submission_id: &str,
        submitter_id: &str,
    ) -> anyhow::Result<Vec<ApprovalFlowStep>> {
        let key = submission_id.as_bytes();
        let levels = self.config.approval_levels;
        let result: TransactionResult<ApprovalFlow, anyhow::Error> = (&self.submissions, &self.flows)
            .transaction(|(submissions, flows)| {
                let submission =
                    Self::decode_submission(submissions.get(key)?, submission_id).or_else(abort)?;
                if submission.submitter_id != submitter_id {
                    return abort(anyhow::Error::from(SubmissionError::NotSubmitter(
                        submission_id.to_string(),
                    )));
                }

                let mut flow =
                    Self::decode_flow(flows.get(key)?.as_ref(), submission_id).or_else(abort)?;
                let form_hash = submission.form_hash().or_else(abort)?;
                flow.start_round(levels, form_hash)
                    .map_err(anyhow::Error::from)
                    .or_else(abort)?;

                let encoded = minicbor::to_vec(&flow)
                    .map_err(anyhow::Error::from)
                    .or_else(abort)?;
                flows.insert(key, encoded)?;
                Ok(flow)
            });
        let flow = Self::committed(result)?;

        tracing::info!(
            "submitted {} for approval, round {} with {} levels",
            submission_id,
            flow.round(),
            levels
        );
        Ok(flow.current_steps().into_iter().cloned().collect())
    }

    /// Approve or reject the pending step. Exactly one of several concurrent
    /// callers can win a given step; the others get an error and write nothing.
    pub fn act(
        &self,
        submission_id: &str,
        decision: Decision,
        actor: &Actor,
        comment: &str,
    ) -> anyhow::Result<ApprovalFlowStep> {
        // make sure the submission exists before reporting on its flow
        self.load_submission(submission_id)?;
        let (stored, mut flow) = self.load_flow_raw(submission_id)?;

        let step = match flow.act(decision, actor, comment) {
            Ok(step) => step,
            Err(err) => {
                tracing::warn!(
                    "refused {:?} on {} by {} (level {}): {}",
                    decision,
                    submission_id,
                    actor.id,
                    actor.level,
                    err
                );
                return Err(err.into());
            }
        };
        self.swap_flow(stored, &flow)?;

        tracing::info!(
            "{} level {} {:?} by {}, flow now {:?}",
            submission_id,
            step.required_level,
            decision,
            actor.id,
            flow.state()
        );
        Ok(step)
    }

    pub fn get_submission(&self, submission_id: &str) -> anyhow::Result<Submission> {
        Ok(self.load_submission(submission_id)?)
    }

    /// Steps of the current round ordered by level.
    pub fn get_flow(&self, submission_id: &str) -> anyhow::Result<Vec<ApprovalFlowStep>> {
        self.load_submission(submission_id)?;
        let (_, flow) = self.load_flow_raw(submission_id)?;
        Ok(flow.current_steps().into_iter().cloned().collect())
    }

    pub fn flow_state(&self, submission_id: &str) -> anyhow::Result<FlowState> {
        self.load_submission(submission_id)?;
        Ok(self.load_flow_raw(submission_id)?.1.state())
    }

    /// Commented decisions across every round, oldest first.
    pub fn comment_log(&self, submission_id: &str) -> anyhow::Result<Vec<ApprovalFlowStep>> {
        self.load_submission(submission_id)?;
        let (_, flow) = self.load_flow_raw(submission_id)?;
        Ok(flow.comment_log().into_iter().cloned().collect())
    }
}
