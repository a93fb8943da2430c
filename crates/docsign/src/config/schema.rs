use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const CONFIG_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default = "default_initial_stage")]
    pub initial_stage: String,
    #[serde(default = "default_terminal_stage")]
    pub terminal_stage: String,
    /// Submission codes recognised by the router and the filename parser.
    #[serde(default = "default_codes")]
    pub codes: Vec<SubmissionCode>,
    pub stages: Vec<StageConfig>,
    #[serde(default)]
    pub status: StatusConfig,
    #[serde(default)]
    pub workers: WorkerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_initial_stage() -> String {
    "01".to_string()
}

fn default_terminal_stage() -> String {
    "05".to_string()
}

fn default_codes() -> Vec<SubmissionCode> {
    SubmissionCode::ALL.to_vec()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    pub id: String,
    pub name: String,
    /// Display group, used only for the stage overview.
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub folder: Option<String>,
    #[serde(rename = "folderEnvVar", default)]
    pub folder_env_var: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(rename = "passwordFile", default)]
    pub password_file: Option<String>,
    #[serde(rename = "passwordEnvVar", default)]
    pub password_env_var: Option<String>,
    /// Phrases that mark where this stage's approver signs.
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub routes: BTreeMap<SubmissionCode, String>,
}

/// Two-letter submission-type code carried in document names.
///
/// The first letter is the request category (Service, Maintenance,
/// General), the second the branch it escalates through (Rabat or PRS).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SubmissionCode {
    Sr,
    Mr,
    Gr,
    Sp,
    Mp,
    Gp,
}

impl SubmissionCode {
    pub const ALL: [SubmissionCode; 6] = [
        SubmissionCode::Sr,
        SubmissionCode::Mr,
        SubmissionCode::Gr,
        SubmissionCode::Sp,
        SubmissionCode::Mp,
        SubmissionCode::Gp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionCode::Sr => "SR",
            SubmissionCode::Mr => "MR",
            SubmissionCode::Gr => "GR",
            SubmissionCode::Sp => "SP",
            SubmissionCode::Mp => "MP",
            SubmissionCode::Gp => "GP",
        }
    }
}

impl fmt::Display for SubmissionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCode(pub String);

impl fmt::Display for UnknownCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown submission code '{}'", self.0)
    }
}

impl std::error::Error for UnknownCode {}

impl FromStr for SubmissionCode {
    type Err = UnknownCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        SubmissionCode::ALL
            .iter()
            .copied()
            .find(|code| code.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownCode(trimmed.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    /// Seconds a settled status (ready, completed, failed) stays pollable.
    #[serde(default = "default_status_ttl")]
    pub ttl_secs: u64,
    /// Upper bound for statuses that never settle (stuck downloads).
    #[serde(default = "default_in_flight_ttl")]
    pub in_flight_ttl_secs: u64,
    #[serde(default = "default_status_capacity")]
    pub capacity: u64,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_status_ttl() -> u64 {
    3600
}

fn default_in_flight_ttl() -> u64 {
    24 * 3600
}

fn default_status_capacity() -> u64 {
    10_000
}

fn default_channel_capacity() -> usize {
    256
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_status_ttl(),
            in_flight_ttl_secs: default_in_flight_ttl(),
            capacity: default_status_capacity(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_worker_count")]
    pub count: usize,
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: default_worker_count(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_directory")]
    pub directory: String,
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: u64,
}

fn default_cache_directory() -> String {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("docsign")
        .join("documents")
        .to_string_lossy()
        .to_string()
}

fn default_max_age_hours() -> u64 {
    24
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: default_cache_directory(),
            max_age_hours: default_max_age_hours(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, overridden by `RUST_LOG` when set.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl Config {
    /// The approval chain of the vehicle-repair deployment: one submission
    /// stage, two branch supervisors, three role approvers per branch and a
    /// final archive. Folder ids and passwords come from `FOLDER_<id>` and
    /// `PASSWORD_<id>` environment variables.
    pub fn builtin() -> Self {
        use SubmissionCode::*;

        let to = |pairs: &[(SubmissionCode, &str)]| -> BTreeMap<SubmissionCode, String> {
            pairs
                .iter()
                .map(|(code, stage)| (*code, stage.to_string()))
                .collect()
        };
        let all_to_final = to(&[
            (Sr, "05"),
            (Mr, "05"),
            (Gr, "05"),
            (Sp, "05"),
            (Mp, "05"),
            (Gp, "05"),
        ]);

        let spv = &["SPV"][..];
        let manager = &["Finance Manager", "Fin Manager", "Nindy", "Meri"][..];
        let general = &["GM", "General Manager"][..];

        let stages = vec![
            stage(
                "01",
                "01 - Vehicle Repair Request",
                "Vehicle Repair Request",
                &["GA", "General Affair"],
                to(&[
                    (Sr, "02A"),
                    (Mr, "02A"),
                    (Gr, "02A"),
                    (Sp, "02B"),
                    (Mp, "02B"),
                    (Gp, "02B"),
                ]),
            ),
            stage(
                "02A",
                "02A - HRGA Supervisor",
                "Rabat",
                &["HRGA"],
                to(&[(Sr, "03A"), (Mr, "03B"), (Gr, "03C")]),
            ),
            stage("03A", "03A - Finance Supervisor", "Rabat", spv, all_to_final.clone()),
            stage("03B", "03B - Finance Manager", "Rabat", manager, all_to_final.clone()),
            stage("03C", "03C - General Manager", "Rabat", general, all_to_final.clone()),
            stage(
                "02B",
                "02B - PAMO",
                "PRS",
                &["PAMO"],
                to(&[(Sp, "04A"), (Mp, "04B"), (Gp, "04C")]),
            ),
            stage("04A", "04A - Finance Supervisor", "PRS", spv, all_to_final.clone()),
            stage("04B", "04B - Finance Manager", "PRS", manager, all_to_final.clone()),
            stage("04C", "04C - General Manager", "PRS", general, all_to_final),
            stage("05", "05 - Final", "Final", &[], BTreeMap::new()),
        ];

        Self {
            version: CONFIG_VERSION.to_string(),
            initial_stage: default_initial_stage(),
            terminal_stage: default_terminal_stage(),
            codes: default_codes(),
            stages,
            status: StatusConfig::default(),
            workers: WorkerConfig::default(),
            cache: CacheConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn stage(
    id: &str,
    name: &str,
    group: &str,
    keywords: &[&str],
    routes: BTreeMap<SubmissionCode, String>,
) -> StageConfig {
    StageConfig {
        id: id.to_string(),
        name: name.to_string(),
        group: group.to_string(),
        folder: None,
        folder_env_var: Some(format!("FOLDER_{}", id)),
        password: None,
        password_file: None,
        password_env_var: Some(format!("PASSWORD_{}", id)),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        routes,
    }
}
