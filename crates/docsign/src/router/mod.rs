//! Table-driven stage routing.

pub mod code;

use std::sync::Arc;

use thiserror::Error;

pub use code::{initial_stage_name, CodeError, CodeParser};

use crate::config::SubmissionCode;
use crate::stage::{Stage, StageTable};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("Unknown stage '{0}'")]
    UnknownStage(String),

    #[error("Stage '{stage}' has no route for code {code}")]
    NoRoutingEntry { stage: String, code: SubmissionCode },
}

#[derive(Debug, Clone)]
pub struct StageRouter {
    stages: Arc<StageTable>,
}

impl StageRouter {
    pub fn new(stages: Arc<StageTable>) -> Self {
        Self { stages }
    }

    /// Looks up the stage a document moves to after `stage` signs a
    /// submission of type `code`. `None` covers unknown stages, unknown or
    /// disabled codes and missing table entries alike.
    pub fn route(&self, stage: &str, code: &str) -> Option<&Stage> {
        let code = code.parse::<SubmissionCode>().ok()?;
        if !self.stages.codes().contains(&code) {
            return None;
        }
        let target = self.stages.get(stage)?.routes.get(&code)?;
        self.stages.get(target.as_str())
    }

    /// Like [`StageRouter::route`] but distinguishes the terminal stage
    /// (`Ok(None)`) from a table that has no entry for the pair.
    pub fn next_stage(
        &self,
        stage: &str,
        code: SubmissionCode,
    ) -> Result<Option<&Stage>, RouteError> {
        let current = self
            .stages
            .get(stage)
            .ok_or_else(|| RouteError::UnknownStage(stage.to_string()))?;

        if self.stages.is_terminal(stage) {
            return Ok(None);
        }

        let missing = || RouteError::NoRoutingEntry {
            stage: stage.to_string(),
            code,
        };

        if !self.stages.codes().contains(&code) {
            return Err(missing());
        }

        current
            .routes
            .get(&code)
            .and_then(|target| self.stages.get(target.as_str()))
            .map(Some)
            .ok_or_else(missing)
    }

    pub fn stages(&self) -> &StageTable {
        &self.stages
    }
}
