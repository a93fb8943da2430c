//! Per-stage password gate.
//!
//! Each stage can carry a password; callers prove knowledge of it once and
//! keep the unlocked stage ids in an [`AccessGrants`] set (typically stored in
//! their session).

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::secrets::secret_matches;
use crate::stage::{Stage, StageId, StageTable};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("Unknown stage '{0}'")]
    UnknownStage(String),

    #[error("Stage '{0}' has no password configured")]
    NotConfigured(String),

    #[error("Wrong password for stage '{0}'")]
    Denied(String),
}

/// Stage ids a caller has unlocked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessGrants(BTreeSet<StageId>);

impl AccessGrants {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&mut self, stage: StageId) {
        self.0.insert(stage);
    }

    pub fn revoke(&mut self, stage: &str) -> bool {
        self.0.remove(&StageId::from(stage))
    }

    pub fn is_unlocked(&self, stage: &str) -> bool {
        self.0.contains(&StageId::from(stage))
    }

    pub fn iter(&self) -> impl Iterator<Item = &StageId> {
        self.0.iter()
    }
}

#[derive(Debug, Clone)]
pub struct AccessGate {
    stages: Arc<StageTable>,
}

impl AccessGate {
    pub fn new(stages: Arc<StageTable>) -> Self {
        Self { stages }
    }

    /// Checks `password` against the stage secret.
    pub fn verify(&self, stage: &str, password: &str) -> Result<&Stage, AccessError> {
        let found = self
            .stages
            .get(stage)
            .ok_or_else(|| AccessError::UnknownStage(stage.to_string()))?;

        let Some(expected) = found.password() else {
            warn!(stage = %stage, "access attempt on stage without password");
            return Err(AccessError::NotConfigured(stage.to_string()));
        };

        if secret_matches(expected, password) {
            debug!(stage = %stage, "stage unlocked");
            Ok(found)
        } else {
            warn!(stage = %stage, "wrong stage password");
            Err(AccessError::Denied(stage.to_string()))
        }
    }

    /// Verifies and, on success, records the stage in `grants`.
    pub fn unlock(
        &self,
        grants: &mut AccessGrants,
        stage: &str,
        password: &str,
    ) -> Result<(), AccessError> {
        let found = self.verify(stage, password)?;
        grants.grant(found.id.clone());
        Ok(())
    }
}
