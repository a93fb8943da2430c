use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::config::schema::{Config, StageConfig, CONFIG_VERSION};
use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Json,
}

impl ConfigFormat {
    /// `.json` files parse as JSON, everything else as YAML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ConfigFormat::Json,
            _ => ConfigFormat::Yaml,
        }
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content, ConfigFormat::from_path(path))
}

pub fn load_config_from_str(content: &str, format: ConfigFormat) -> Result<Config, ConfigError> {
    let config: Config = match format {
        ConfigFormat::Json => serde_json::from_str(content)?,
        ConfigFormat::Yaml => serde_yaml::from_str(content)?,
    };

    validate_config(&config)?;

    Ok(config)
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != CONFIG_VERSION {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.stages.is_empty() {
        return Err(ConfigError::Validation {
            message: "At least one stage must be configured".to_string(),
        });
    }

    if config.codes.is_empty() {
        return Err(ConfigError::Validation {
            message: "At least one submission code must be enabled".to_string(),
        });
    }

    let mut by_id: HashMap<&str, &StageConfig> = HashMap::new();
    for stage in &config.stages {
        if stage.id.trim().is_empty() {
            return Err(ConfigError::Validation {
                message: format!("Stage '{}' has an empty id", stage.name),
            });
        }
        if by_id.insert(stage.id.as_str(), stage).is_some() {
            return Err(invalid(&stage.id, "Duplicate stage ID"));
        }
    }

    for id in [&config.initial_stage, &config.terminal_stage] {
        if !by_id.contains_key(id.as_str()) {
            return Err(ConfigError::Validation {
                message: format!("Stage '{}' is referenced but not defined", id),
            });
        }
    }

    if config.initial_stage == config.terminal_stage {
        return Err(ConfigError::Validation {
            message: "Initial and terminal stage must differ".to_string(),
        });
    }

    for stage in &config.stages {
        validate_stage(config, stage, &by_id)?;
    }

    validate_graph(config, &by_id)?;

    if config.status.capacity == 0 {
        return Err(ConfigError::Validation {
            message: "status.capacity must be positive".to_string(),
        });
    }

    if config.workers.count == 0 {
        return Err(ConfigError::Validation {
            message: "workers.count must be positive".to_string(),
        });
    }

    if let Err(e) = tracing_subscriber::EnvFilter::try_new(&config.logging.level) {
        return Err(ConfigError::Validation {
            message: format!("Invalid logging.level '{}': {}", config.logging.level, e),
        });
    }

    Ok(())
}

fn validate_stage(
    config: &Config,
    stage: &StageConfig,
    by_id: &HashMap<&str, &StageConfig>,
) -> Result<(), ConfigError> {
    if stage.keywords.iter().any(|k| k.trim().is_empty()) {
        return Err(invalid(&stage.id, "Keywords must not be blank"));
    }

    if stage.id == config.terminal_stage {
        if !stage.routes.is_empty() {
            return Err(invalid(&stage.id, "Terminal stage must not have routes"));
        }
        return Ok(());
    }

    if stage.keywords.is_empty() {
        return Err(invalid(&stage.id, "Signing stage needs at least one keyword"));
    }

    if stage.routes.is_empty() {
        return Err(invalid(&stage.id, "Non-terminal stage needs at least one route"));
    }

    for (code, target) in &stage.routes {
        if !config.codes.contains(code) {
            return Err(invalid(
                &stage.id,
                &format!("Route uses disabled submission code {}", code),
            ));
        }
        if target == &stage.id {
            return Err(invalid(&stage.id, "Stage routes to itself"));
        }
        if !by_id.contains_key(target.as_str()) {
            return Err(invalid(
                &stage.id,
                &format!("Route {} targets unknown stage '{}'", code, target),
            ));
        }
    }

    Ok(())
}

/// Every stage must be reachable from the initial stage, and no route chain
/// may revisit a stage, so every document ends at the terminal stage.
fn validate_graph(
    config: &Config,
    by_id: &HashMap<&str, &StageConfig>,
) -> Result<(), ConfigError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit<'a>(
        id: &'a str,
        by_id: &HashMap<&'a str, &'a StageConfig>,
        marks: &mut HashMap<&'a str, Mark>,
    ) -> Result<(), ConfigError> {
        match marks.get(id) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                return Err(invalid(id, "Routes form a cycle through this stage"));
            }
            None => {}
        }
        marks.insert(id, Mark::Visiting);
        if let Some(&stage) = by_id.get(id) {
            let targets: HashSet<&str> = stage.routes.values().map(String::as_str).collect();
            for target in targets {
                visit(target, by_id, marks)?;
            }
        }
        marks.insert(id, Mark::Done);
        Ok(())
    }

    let mut marks = HashMap::new();
    visit(config.initial_stage.as_str(), by_id, &mut marks)?;

    for stage in &config.stages {
        if !marks.contains_key(stage.id.as_str()) {
            return Err(invalid(&stage.id, "Stage is unreachable from the initial stage"));
        }
    }

    Ok(())
}

fn invalid(id: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidStage {
        id: id.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::SubmissionCode;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL_YAML: &str = r#"
version: "1.0"
stages:
  - id: "01"
    name: Submission
    keywords: [GA]
    routes:
      SR: "05"
  - id: "05"
    name: Final
"#;

    #[test]
    fn test_load_valid_yaml() {
        let config = load_config_from_str(MINIMAL_YAML, ConfigFormat::Yaml).unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.stages.len(), 2);
        assert_eq!(config.stages[0].routes[&SubmissionCode::Sr], "05");
    }

    #[test]
    fn test_load_valid_json() {
        let json = r#"
        {
            "version": "1.0",
            "initial_stage": "start",
            "terminal_stage": "done",
            "codes": ["SR", "SP"],
            "stages": [
                {
                    "id": "start",
                    "name": "Start",
                    "folder": "inbox",
                    "passwordEnvVar": "START_PW",
                    "keywords": ["Requested by"],
                    "routes": { "SR": "done", "SP": "done" }
                },
                { "id": "done", "name": "Done" }
            ],
            "workers": { "count": 2 }
        }
        "#;

        let config = load_config_from_str(json, ConfigFormat::Json).unwrap();
        assert_eq!(config.initial_stage, "start");
        assert_eq!(config.codes.len(), 2);
        assert_eq!(config.stages[0].password_env_var.as_deref(), Some("START_PW"));
        assert_eq!(config.workers.count, 2);
    }

    #[test]
    fn test_builtin_config_is_valid() {
        validate_config(&Config::builtin()).unwrap();
    }

    #[test]
    fn test_load_from_file_picks_format_by_extension() {
        let mut file = NamedTempFile::with_suffix(".yml").unwrap();
        file.write_all(MINIMAL_YAML.as_bytes()).unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.stages[0].id, "01");

        assert_eq!(ConfigFormat::from_path(Path::new("a.JSON")), ConfigFormat::Json);
        assert_eq!(ConfigFormat::from_path(Path::new("a.yaml")), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path(Path::new("noext")), ConfigFormat::Yaml);
    }

    #[test]
    fn test_missing_file() {
        let result = load_config("/nonexistent/docsign.yaml");
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }

    #[test]
    fn test_invalid_version() {
        let yaml = MINIMAL_YAML.replace("\"1.0\"", "\"2.0\"");
        assert!(matches!(
            load_config_from_str(&yaml, ConfigFormat::Yaml),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn test_unknown_code_is_parse_error() {
        let yaml = MINIMAL_YAML.replace("SR: \"05\"", "XX: \"05\"");
        assert!(matches!(
            load_config_from_str(&yaml, ConfigFormat::Yaml),
            Err(ConfigError::ParseYaml(_))
        ));
    }

    fn assert_invalid_stage(config: &Config, expected_id: &str) {
        match validate_config(config) {
            Err(ConfigError::InvalidStage { id, .. }) => assert_eq!(id, expected_id),
            other => panic!("expected InvalidStage for {}, got {:?}", expected_id, other),
        }
    }

    #[test]
    fn test_route_to_unknown_stage() {
        let mut config = Config::builtin();
        config.stages[1]
            .routes
            .insert(SubmissionCode::Sr, "99".to_string());
        assert_invalid_stage(&config, "02A");
    }

    #[test]
    fn test_terminal_with_routes() {
        let mut config = Config::builtin();
        let last = config.stages.len() - 1;
        config.stages[last]
            .routes
            .insert(SubmissionCode::Sr, "01".to_string());
        assert_invalid_stage(&config, "05");
    }

    #[test]
    fn test_signing_stage_without_keywords() {
        let mut config = Config::builtin();
        config.stages[1].keywords.clear();
        assert_invalid_stage(&config, "02A");

        let mut config = Config::builtin();
        config.stages[1].keywords.push("  ".to_string());
        assert_invalid_stage(&config, "02A");
    }

    #[test]
    fn test_duplicate_stage_ids() {
        let mut config = Config::builtin();
        let copy = config.stages[2].clone();
        config.stages.push(copy);
        assert_invalid_stage(&config, "03A");
    }

    #[test]
    fn test_cycle_rejected() {
        let mut config = Config::builtin();
        // 03A -> 02A -> 03A
        config.stages[2]
            .routes
            .insert(SubmissionCode::Sr, "02A".to_string());
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidStage { .. })
        ));
    }

    #[test]
    fn test_unreachable_stage_rejected() {
        let mut config = Config::builtin();
        config.stages[1].routes.remove(&SubmissionCode::Gr);
        assert_invalid_stage(&config, "03C");
    }

    #[test]
    fn test_disabled_code_in_route() {
        let mut config = Config::builtin();
        config.codes.retain(|c| *c != SubmissionCode::Gp);
        assert_invalid_stage(&config, "01");
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = Config::builtin();
        config.logging.level = "docsign=notalevel".to_string();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::Validation { .. })
        ));
    }
}
