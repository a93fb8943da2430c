use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, info_span, warn};

use crate::cache::DocumentCache;
use crate::compositor::{self, SignatureImage};
use crate::config::SubmissionCode;
use crate::error::StoreError;
use crate::locator::{self, Anchor, KeywordSet};
use crate::pdf;
use crate::router::{initial_stage_name, CodeParser, RouteError, StageRouter};
use crate::sanitize;
use crate::stage::{Stage, StageId, StageTable};
use crate::store::DocumentStore;

use super::context::{AdvanceRequest, InitialDetails, SubmissionMetadata};
use super::error::{Step, WorkflowError};
use super::locks::DocumentLocks;
use super::progress::{NoopProgress, ProgressEvent, ProgressReporter};

/// Result of a successful [`Workflow::advance`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Advance {
    /// Signed and handed to the next stage.
    Moved {
        from: StageId,
        to: StageId,
        code: SubmissionCode,
        renamed_to: Option<String>,
    },
    /// The document is at the terminal stage; nothing was changed.
    Final { stage: StageId },
}

impl Advance {
    /// Stage the document sits in afterwards.
    pub fn stage(&self) -> &StageId {
        match self {
            Advance::Moved { to, .. } => to,
            Advance::Final { stage } => stage,
        }
    }
}

struct Fetched {
    content: Vec<u8>,
    name: String,
}

struct Plan<'a> {
    code: SubmissionCode,
    target: &'a Stage,
    from_folder: &'a str,
    to_folder: &'a str,
    new_name: Option<String>,
}

/// Signs documents at their current stage and moves them along the
/// approval chain.
pub struct Workflow {
    stages: Arc<StageTable>,
    router: StageRouter,
    codes: CodeParser,
    store: Arc<dyn DocumentStore>,
    cache: Option<Arc<DocumentCache>>,
    locks: DocumentLocks,
}

impl Workflow {
    pub fn new(stages: Arc<StageTable>, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            router: StageRouter::new(Arc::clone(&stages)),
            codes: CodeParser::new(stages.codes()),
            stages,
            store,
            cache: None,
            locks: DocumentLocks::new(),
        }
    }

    /// Reads prefetched content from `cache` and releases it after each
    /// advance.
    pub fn with_cache(mut self, cache: Arc<DocumentCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn stages(&self) -> &StageTable {
        &self.stages
    }

    pub fn router(&self) -> &StageRouter {
        &self.router
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    pub fn locks(&self) -> &DocumentLocks {
        &self.locks
    }

    pub fn advance(
        &self,
        document_id: &str,
        stage: &str,
        signature_data_url: &str,
        metadata: &SubmissionMetadata,
    ) -> Result<Advance, WorkflowError> {
        self.execute(document_id, stage, signature_data_url, metadata, &NoopProgress)
    }

    pub fn run(
        &self,
        request: &AdvanceRequest,
        progress: &dyn ProgressReporter,
    ) -> Result<Advance, WorkflowError> {
        self.execute(
            &request.document_id,
            &request.stage,
            &request.signature,
            &request.metadata,
            progress,
        )
    }

    fn execute(
        &self,
        document_id: &str,
        stage: &str,
        signature: &str,
        metadata: &SubmissionMetadata,
        progress: &dyn ProgressReporter,
    ) -> Result<Advance, WorkflowError> {
        let _span = info_span!("workflow",
            document_id = %sanitize::short_id(document_id),
            stage = %stage,
            signature = %sanitize::summarize_data_url(signature),
        )
        .entered();

        let result = self.execute_exclusive(document_id, stage, signature, metadata, progress);

        match &result {
            Ok(outcome) => {
                info!(outcome = ?outcome, "advance finished");
                progress.report(ProgressEvent::Completed {
                    stage: outcome.stage().to_string(),
                });
            }
            Err(e) => {
                if !e.is_partial() {
                    warn!(kind = e.kind(), "advance failed: {}", e);
                }
                progress.report(ProgressEvent::Failed {
                    error: e.to_string(),
                });
            }
        }
        result
    }

    fn execute_exclusive(
        &self,
        document_id: &str,
        stage: &str,
        signature: &str,
        metadata: &SubmissionMetadata,
        progress: &dyn ProgressReporter,
    ) -> Result<Advance, WorkflowError> {
        let current = self
            .stages
            .get(stage)
            .ok_or_else(|| WorkflowError::UnknownStage(stage.to_string()))?;

        if self.stages.is_terminal(stage) {
            info!("document is at the terminal stage, nothing to sign");
            return Ok(Advance::Final {
                stage: current.id.clone(),
            });
        }

        let _guard = self
            .locks
            .try_acquire(document_id)
            .ok_or_else(|| WorkflowError::DocumentBusy(document_id.to_string()))?;

        let result = self.process(document_id, current, signature, metadata, progress);

        // Step 9: always release materialised bytes
        {
            let _step = info_span!("cleanup").entered();
            progress.report(ProgressEvent::Step(Step::Cleanup));
            self.step_cleanup(document_id);
        }

        result
    }

    fn process(
        &self,
        document_id: &str,
        current: &Stage,
        signature: &str,
        metadata: &SubmissionMetadata,
        progress: &dyn ProgressReporter,
    ) -> Result<Advance, WorkflowError> {
        // Step 1: Fetch
        let fetched = {
            let _step = info_span!("fetch").entered();
            progress.report(ProgressEvent::Step(Step::Fetch));
            self.step_fetch(document_id, current)?
        };

        // Step 2: Validate caller input
        let (image, initial) = {
            let _step = info_span!("validate").entered();
            progress.report(ProgressEvent::Step(Step::Validate));
            self.step_validate(current, signature, metadata)?
        };

        // Step 3: Plan the route before touching the store
        let plan = {
            let _step = info_span!("route").entered();
            progress.report(ProgressEvent::Step(Step::Route));
            self.step_route(current, &fetched.name, initial.as_ref())?
        };

        // Step 4: Anchor
        let (mut doc, anchor) = {
            let _step = info_span!("anchor").entered();
            progress.report(ProgressEvent::Step(Step::Anchor));
            self.step_anchor(current, &fetched.content)?
        };

        // Step 5: Sign
        let signed = {
            let _step = info_span!("sign", page = anchor.page).entered();
            progress.report(ProgressEvent::Step(Step::Sign));
            compositor::stamp(&mut doc, &anchor, &image)?;
            pdf::save(&mut doc)?
        };

        // Steps 6-8 mutate the store; any failure after the first one is
        // reported as partially applied.
        let mut completed = Vec::new();

        self.apply(document_id, Step::Persist, &mut completed, progress, || {
            self.store.put_content(document_id, &signed)
        })?;

        if let Some(new_name) = &plan.new_name {
            self.apply(document_id, Step::Rename, &mut completed, progress, || {
                self.store.rename(document_id, new_name)
            })?;
        }

        self.apply(document_id, Step::Move, &mut completed, progress, || {
            self.store
                .move_document(document_id, plan.from_folder, plan.to_folder)
        })?;

        Ok(Advance::Moved {
            from: current.id.clone(),
            to: plan.target.id.clone(),
            code: plan.code,
            renamed_to: plan.new_name,
        })
    }

    fn step_fetch(&self, document_id: &str, current: &Stage) -> Result<Fetched, WorkflowError> {
        let folder = stage_folder(current)?;

        let parents = self
            .store
            .parents(document_id)
            .map_err(WorkflowError::store(Step::Fetch))?;
        if !parents.iter().any(|p| p == folder) {
            return Err(WorkflowError::StoreTransport {
                step: Step::Fetch,
                source: StoreError::NotInFolder {
                    id: document_id.to_string(),
                    folder: folder.to_string(),
                },
            });
        }

        let content = match self.cached(document_id) {
            Some(content) => content,
            None => self
                .store
                .get_content(document_id)
                .map_err(WorkflowError::store(Step::Fetch))?,
        };
        let name = self
            .store
            .get_name(document_id)
            .map_err(WorkflowError::store(Step::Fetch))?;

        if !pdf::is_pdf(&content) {
            return Err(WorkflowError::UnsupportedFormat {
                document_id: document_id.to_string(),
            });
        }

        debug!(
            bytes = content.len(),
            name = %sanitize::hash_name(&name),
            "document fetched"
        );
        Ok(Fetched { content, name })
    }

    fn cached(&self, document_id: &str) -> Option<Vec<u8>> {
        let cache = self.cache.as_ref()?;
        match cache.read(document_id) {
            Ok(Some(content)) => {
                debug!("using prefetched content");
                Some(content)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("ignoring unreadable cache entry: {}", e);
                None
            }
        }
    }

    fn step_validate(
        &self,
        current: &Stage,
        signature: &str,
        metadata: &SubmissionMetadata,
    ) -> Result<(SignatureImage, Option<InitialDetails>), WorkflowError> {
        if signature.trim().is_empty() {
            return Err(WorkflowError::MissingRequiredField { field: "signature" });
        }

        let initial = if self.stages.is_initial(current.id.as_str()) {
            Some(self.initial_details(metadata)?)
        } else {
            None
        };

        let image = SignatureImage::from_data_url(signature)?;
        debug!(
            width = image.width(),
            height = image.height(),
            "signature decoded"
        );
        Ok((image, initial))
    }

    fn initial_details(&self, metadata: &SubmissionMetadata) -> Result<InitialDetails, WorkflowError> {
        let code = required(&metadata.code, "code")?;
        let company = required(&metadata.company, "company")?;
        let month = required(&metadata.month, "month")?;
        let year = required(&metadata.year, "year")?;

        let code: SubmissionCode = code.parse().map_err(|e: crate::config::UnknownCode| {
            WorkflowError::InvalidField {
                field: "code",
                reason: e.to_string(),
            }
        })?;
        if !self.stages.codes().contains(&code) {
            return Err(WorkflowError::InvalidField {
                field: "code",
                reason: format!("submission code {} is not enabled", code),
            });
        }

        Ok(InitialDetails {
            code,
            company: company.to_string(),
            month: normalize_month(month)?,
            year: validate_year(year)?,
        })
    }

    fn step_route<'a>(
        &'a self,
        current: &'a Stage,
        name: &str,
        initial: Option<&InitialDetails>,
    ) -> Result<Plan<'a>, WorkflowError> {
        let code = match initial {
            Some(details) => details.code,
            None => self.codes.parse(name).map_err(|source| {
                WorkflowError::UnresolvableSubmissionCode {
                    name: name.to_string(),
                    source,
                }
            })?,
        };

        let target = self
            .router
            .next_stage(current.id.as_str(), code)
            .map_err(|e| match e {
                RouteError::UnknownStage(stage) => WorkflowError::UnknownStage(stage),
                RouteError::NoRoutingEntry { stage, code } => {
                    WorkflowError::NoRoutingEntry { stage, code }
                }
            })?
            .ok_or_else(|| WorkflowError::NoRoutingEntry {
                stage: current.id.to_string(),
                code,
            })?;

        let new_name = initial.map(|details| {
            initial_stage_name(
                &details.year,
                &details.month,
                details.code,
                &details.company,
                name,
            )
        });

        debug!(code = %code, target = %target.id, "route planned");
        Ok(Plan {
            code,
            target,
            from_folder: stage_folder(current)?,
            to_folder: stage_folder(target)?,
            new_name,
        })
    }

    fn step_anchor(
        &self,
        current: &Stage,
        content: &[u8],
    ) -> Result<(lopdf::Document, Anchor), WorkflowError> {
        let doc = pdf::load(content)?;
        let keywords = KeywordSet::new(&current.keywords)?;
        let anchor = locator::locate_in_document(&doc, &keywords)?.ok_or_else(|| {
            WorkflowError::KeywordNotFound {
                stage: current.id.to_string(),
                keywords: current.keywords.clone(),
            }
        })?;
        debug!(x = anchor.x, y = anchor.y, "anchor found");
        Ok((doc, anchor))
    }

    fn apply(
        &self,
        document_id: &str,
        step: Step,
        completed: &mut Vec<Step>,
        progress: &dyn ProgressReporter,
        op: impl FnOnce() -> Result<(), StoreError>,
    ) -> Result<(), WorkflowError> {
        let _step = info_span!("store_mutation", step = %step).entered();
        progress.report(ProgressEvent::Step(step));

        match op() {
            Ok(()) => {
                completed.push(step);
                Ok(())
            }
            Err(source) => {
                let err = WorkflowError::StoreTransport { step, source };
                if completed.is_empty() {
                    return Err(err);
                }
                error!(
                    completed = ?completed,
                    failed = %step,
                    "document left signed but not fully routed: {}",
                    err
                );
                Err(WorkflowError::PartiallyApplied {
                    document_id: document_id.to_string(),
                    completed: completed.clone(),
                    failed: step,
                    source: Box::new(err),
                })
            }
        }
    }

    fn step_cleanup(&self, document_id: &str) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.release(document_id) {
                warn!("failed to release cached document: {}", e);
            }
        }
    }
}

fn stage_folder(stage: &Stage) -> Result<&str, WorkflowError> {
    stage
        .folder
        .as_deref()
        .ok_or_else(|| WorkflowError::UnresolvableFolder {
            stage: stage.id.to_string(),
        })
}

fn required<'a>(value: &'a Option<String>, field: &'static str) -> Result<&'a str, WorkflowError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(WorkflowError::MissingRequiredField { field })
}

fn normalize_month(month: &str) -> Result<String, WorkflowError> {
    let valid = (1..=2).contains(&month.len()) && month.bytes().all(|b| b.is_ascii_digit());
    match month.parse::<u8>() {
        Ok(m) if valid && (1..=12).contains(&m) => Ok(format!("{:02}", m)),
        _ => Err(WorkflowError::InvalidField {
            field: "month",
            reason: format!("'{}' is not a month number between 1 and 12", month),
        }),
    }
}

fn validate_year(year: &str) -> Result<String, WorkflowError> {
    if matches!(year.len(), 2 | 4) && year.bytes().all(|b| b.is_ascii_digit()) {
        Ok(year.to_string())
    } else {
        Err(WorkflowError::InvalidField {
            field: "year",
            reason: format!("'{}' is not a two or four digit year", year),
        })
    }
}
