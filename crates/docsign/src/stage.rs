//! Runtime view of the approval chain.
//!
//! A [`StageTable`] is built once from a validated [`Config`]; folder ids and
//! passwords are resolved at that point so the hot path never touches the
//! environment.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use log::warn;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::config::{validate_config, Config, StageConfig, SubmissionCode};
use crate::error::ConfigError;
use crate::secrets::{self, SecretError};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageId(String);

impl StageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StageId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl PartialEq<str> for StageId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

#[derive(Debug, Clone)]
pub struct Stage {
    pub id: StageId,
    pub name: String,
    pub group: String,
    /// Store folder holding documents that await this stage. `None` when the
    /// deployment did not provide one; moving into such a stage fails.
    pub folder: Option<String>,
    pub keywords: Vec<String>,
    pub routes: BTreeMap<SubmissionCode, StageId>,
    password: Option<SecretString>,
}

impl Stage {
    pub fn password(&self) -> Option<&SecretString> {
        self.password.as_ref()
    }

    fn from_config(config: &StageConfig) -> Result<Self, ConfigError> {
        let folder = match secrets::resolve_setting(
            config.folder.as_deref(),
            config.folder_env_var.as_deref(),
        ) {
            Ok(folder) => folder,
            Err(SecretError::EnvVarNotSet { name }) => {
                warn!("Stage {}: folder variable {} is not set", config.id, name);
                None
            }
            Err(e) => {
                return Err(ConfigError::Secret {
                    id: config.id.clone(),
                    source: e,
                })
            }
        };

        let password = match secrets::resolve_secret_optional(
            config.password.as_deref(),
            config.password_file.as_deref(),
            config.password_env_var.as_deref(),
        ) {
            Ok(password) => password,
            Err(SecretError::EnvVarNotSet { name }) => {
                warn!(
                    "Stage {}: password variable {} is not set, stage stays locked",
                    config.id, name
                );
                None
            }
            Err(e) => {
                return Err(ConfigError::Secret {
                    id: config.id.clone(),
                    source: e,
                })
            }
        };

        Ok(Self {
            id: StageId::new(config.id.clone()),
            name: config.name.clone(),
            group: config.group.clone(),
            folder,
            keywords: config.keywords.clone(),
            routes: config
                .routes
                .iter()
                .map(|(code, target)| (*code, StageId::new(target.clone())))
                .collect(),
            password,
        })
    }
}

#[derive(Debug, Clone)]
pub struct StageTable {
    stages: Vec<Stage>,
    index: HashMap<String, usize>,
    initial: usize,
    terminal: usize,
    codes: Vec<SubmissionCode>,
}

impl StageTable {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        validate_config(config)?;

        let stages = config
            .stages
            .iter()
            .map(Stage::from_config)
            .collect::<Result<Vec<_>, _>>()?;

        let index: HashMap<String, usize> = stages
            .iter()
            .enumerate()
            .map(|(i, stage)| (stage.id.as_str().to_string(), i))
            .collect();

        let position = |id: &str| {
            index.get(id).copied().ok_or_else(|| ConfigError::Validation {
                message: format!("Stage '{}' is referenced but not defined", id),
            })
        };
        let initial = position(&config.initial_stage)?;
        let terminal = position(&config.terminal_stage)?;

        Ok(Self {
            stages,
            index,
            initial,
            terminal,
            codes: config.codes.clone(),
        })
    }

    pub fn get(&self, id: &str) -> Option<&Stage> {
        self.index.get(id).map(|&i| &self.stages[i])
    }

    pub fn initial(&self) -> &Stage {
        &self.stages[self.initial]
    }

    pub fn terminal(&self) -> &Stage {
        &self.stages[self.terminal]
    }

    pub fn is_initial(&self, id: &str) -> bool {
        self.initial().id == *id
    }

    pub fn is_terminal(&self, id: &str) -> bool {
        self.terminal().id == *id
    }

    /// Stages in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = &Stage> {
        self.stages.iter()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn codes(&self) -> &[SubmissionCode] {
        &self.codes
    }
}
