//! Client for the post-processing classification agent.
//!
//! The agent is a black-box text-in/text-out collaborator: it receives
//! a JSON description of a finished download and answers with JSON
//! instructions. Its output drives filesystem moves and shell commands,
//! so [`plan`] validates it against a strict schema before anything is
//! executed.

pub mod client;
pub mod plan;

pub use client::{AgentClient, AgentError, ClassifyRequest};
pub use plan::{parse_plan, ActionList, MovePlan, PostProcessPlan};
