pub mod bag;
pub mod calc;
pub mod config;
pub mod error;
pub mod flow;
pub mod logging;
pub mod service;
pub mod submission;
pub mod timestamp;
pub mod utils;
pub mod variant;

pub use bag::{FieldValue, InputBag, OutputBag, are_equivalent, dirty_fields};
pub use calc::compute_outputs;
pub use flow::{Actor, ApprovalFlow, ApprovalFlowStep, Decision, FlowState, StepStatus};
pub use variant::FormVariant;
