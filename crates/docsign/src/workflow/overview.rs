use serde::Serialize;
use tracing::info_span;

use crate::access::AccessGrants;
use crate::stage::StageId;
use crate::store::DocumentEntry;

use super::error::{Step, WorkflowError};
use super::runner::Workflow;

/// One stage as shown to a caller. Documents are only listed for stages
/// the caller has unlocked.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageOverview {
    pub id: StageId,
    pub name: String,
    pub unlocked: bool,
    pub documents: Vec<DocumentEntry>,
}

/// Stages sharing a display group, in stage-table order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupOverview {
    pub group: String,
    pub stages: Vec<StageOverview>,
}

impl Workflow {
    pub fn overview(&self, grants: &AccessGrants) -> Result<Vec<GroupOverview>, WorkflowError> {
        let _span = info_span!("workflow.overview").entered();

        let mut groups: Vec<GroupOverview> = Vec::new();
        for stage in self.stages().iter() {
            let unlocked = grants.is_unlocked(stage.id.as_str());
            let documents = match (&stage.folder, unlocked) {
                (Some(folder), true) => self
                    .store()
                    .list(folder)
                    .map_err(WorkflowError::store(Step::List))?,
                _ => Vec::new(),
            };

            let entry = StageOverview {
                id: stage.id.clone(),
                name: stage.name.clone(),
                unlocked,
                documents,
            };

            match groups.iter_mut().find(|g| g.group == stage.group) {
                Some(group) => group.stages.push(entry),
                None => groups.push(GroupOverview {
                    group: stage.group.clone(),
                    stages: vec![entry],
                }),
            }
        }

        Ok(groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::stage::StageTable;
    use crate::store::{MemoryStore, StoreOp};
    use std::sync::Arc;

    fn workflow(store: Arc<MemoryStore>) -> Workflow {
        let mut config = Config::builtin();
        for stage in &mut config.stages {
            stage.folder = Some(stage.id.clone());
            stage.password_env_var = None;
        }
        Workflow::new(Arc::new(StageTable::from_config(&config).unwrap()), store)
    }

    #[test]
    fn test_overview_lists_unlocked_stages_only() {
        let store = Arc::new(MemoryStore::new());
        store.insert("a", "02A", "b.pdf", b"1".to_vec());
        store.insert("b", "02A", "a.pdf", b"2".to_vec());
        store.insert("c", "03A", "c.pdf", b"3".to_vec());
        let workflow = workflow(store);

        let mut grants = AccessGrants::new();
        grants.grant(StageId::from("02A"));

        let groups = workflow.overview(&grants).unwrap();
        let stages: Vec<&StageOverview> = groups.iter().flat_map(|g| g.stages.iter()).collect();
        assert_eq!(stages.len(), workflow.stages().len());

        let rabat = stages.iter().find(|s| s.id == *"02A").unwrap();
        assert!(rabat.unlocked);
        let names: Vec<&str> = rabat.documents.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["a.pdf", "b.pdf"]);

        let spv = stages.iter().find(|s| s.id == *"03A").unwrap();
        assert!(!spv.unlocked);
        assert!(spv.documents.is_empty());
    }

    #[test]
    fn test_groups_keep_table_order() {
        let workflow = workflow(Arc::new(MemoryStore::new()));
        let groups = workflow.overview(&AccessGrants::new()).unwrap();

        let mut seen = Vec::new();
        for stage in workflow.stages().iter() {
            if !seen.contains(&stage.group) {
                seen.push(stage.group.clone());
            }
        }
        let order: Vec<String> = groups.iter().map(|g| g.group.clone()).collect();
        assert_eq!(order, seen);
    }

    #[test]
    fn test_list_failure_surfaces() {
        let store = Arc::new(MemoryStore::new());
        store.fail_on(StoreOp::List);
        let workflow = workflow(store);

        let mut grants = AccessGrants::new();
        grants.grant(StageId::from("01"));
        assert!(matches!(
            workflow.overview(&grants),
            Err(WorkflowError::StoreTransport {
                step: Step::List,
                ..
            })
        ));
    }
}
