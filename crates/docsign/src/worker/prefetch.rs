use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};

use crate::cache::DocumentCache;
use crate::error::WorkerError;
use crate::status::{DocumentPhase, StatusEvent, StatusStore};
use crate::store::DocumentStore;
use crate::workflow::DocumentLocks;

/// Downloads documents into the local cache on background threads and
/// reports `Queued -> Downloading -> Ready | Failed` into the status store.
///
/// Workers share the workflow's [`DocumentLocks`]: a download holds the
/// document's lock from `get_content` until the bytes are cached, and a
/// document that is being advanced is skipped, so cached bytes are never
/// older than the last persisted signature.
pub struct Prefetcher {
    sender: Sender<String>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    cache: Arc<DocumentCache>,
    status: StatusStore,
}

impl Prefetcher {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        cache: Arc<DocumentCache>,
        status: StatusStore,
        locks: DocumentLocks,
        worker_count: usize,
    ) -> Result<Self, WorkerError> {
        if worker_count == 0 {
            return Err(WorkerError::SpawnFailed(
                "worker count must be greater than zero".to_string(),
            ));
        }

        let (sender, receiver) = bounded::<String>(worker_count * 2);
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let worker = PrefetchWorker {
                id: worker_id,
                receiver: receiver.clone(),
                shutdown: Arc::clone(&shutdown),
                store: Arc::clone(&store),
                cache: Arc::clone(&cache),
                status: status.clone(),
                locks: locks.clone(),
            };

            let handle = thread::Builder::new()
                .name(format!("docsign-prefetch-{}", worker_id))
                .spawn(move || worker.run())
                .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;
            workers.push(handle);
        }

        info!("Started {} prefetch workers", worker_count);

        Ok(Self {
            sender,
            workers,
            shutdown,
            cache,
            status,
        })
    }

    /// Queues a download of `id`. Documents already queued or downloading
    /// are not queued twice.
    pub fn request(&self, id: &str) -> Result<(), WorkerError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(WorkerError::ChannelClosed);
        }

        if matches!(
            self.status.phase(id),
            Some(DocumentPhase::Queued | DocumentPhase::Downloading)
        ) {
            debug!("Document {} already in flight", id);
            return Ok(());
        }

        self.status
            .set_phase(id, DocumentPhase::Queued, "Queued for download");
        self.sender.send(id.to_string()).map_err(|_| {
            self.status
                .set_status(StatusEvent::failed(id, "prefetch queue closed"));
            WorkerError::ChannelClosed
        })
    }

    /// True once the document has been downloaded and is still cached.
    pub fn is_ready(&self, id: &str) -> bool {
        self.status.is_ready(id) && self.cache.contains(id)
    }

    pub fn status(&self) -> &StatusStore {
        &self.status
    }

    pub fn shutdown(&self) {
        info!("Shutting down prefetch workers...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Waits for the workers to exit. Without a prior [`Prefetcher::shutdown`]
    /// the queue is drained first.
    pub fn wait(self) {
        // Drop sender to signal workers to exit
        drop(self.sender);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Prefetch worker {} panicked: {:?}", i, e);
            } else {
                debug!("Prefetch worker {} finished", i);
            }
        }

        info!("All prefetch workers have stopped");
    }
}

struct PrefetchWorker {
    id: usize,
    receiver: Receiver<String>,
    shutdown: Arc<AtomicBool>,
    store: Arc<dyn DocumentStore>,
    cache: Arc<DocumentCache>,
    status: StatusStore,
    locks: DocumentLocks,
}

impl PrefetchWorker {
    fn run(self) {
        debug!("Prefetch worker {} started", self.id);

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                debug!("Prefetch worker {} received shutdown signal", self.id);
                break;
            }

            match self.receiver.recv_timeout(Duration::from_millis(100)) {
                Ok(document_id) => self.fetch(&document_id),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("Prefetch worker {} queue disconnected", self.id);
                    break;
                }
            }
        }

        debug!("Prefetch worker {} stopped", self.id);
    }

    fn fetch(&self, document_id: &str) {
        let _span = tracing::info_span!(
            "prefetch",
            worker = self.id,
            document_id = %crate::sanitize::short_id(document_id),
        )
        .entered();

        let Some(_guard) = self.locks.try_acquire(document_id) else {
            warn!("Document {} is being advanced, prefetch skipped", document_id);
            self.status.set_status(StatusEvent::failed(
                document_id,
                "document is being advanced",
            ));
            return;
        };

        self.status
            .set_phase(document_id, DocumentPhase::Downloading, "Downloading document");

        let result = self
            .store
            .get_content(document_id)
            .and_then(|content| self.cache.store(document_id, &content).map(|_| content.len()));

        match result {
            Ok(size) => {
                debug!("Prefetched document {} ({} bytes)", document_id, size);
                self.status
                    .set_phase(document_id, DocumentPhase::Ready, "Document is ready");
            }
            Err(e) => {
                warn!("Prefetch of document {} failed: {}", document_id, e);
                self.status
                    .set_status(StatusEvent::failed(document_id, &e.to_string()));
            }
        }
    }
}
