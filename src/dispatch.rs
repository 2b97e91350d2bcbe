use crate::cache::{RequestKey, ResultCache, SharedResult, Slot};
use crate::error::{CardPressError, Result};
use crate::pipeline::{ContentRequest, PipelineContext, run_pipeline};
use crossbeam_channel::{Receiver, Sender};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Cooperative cancellation flag polled by the pipeline.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(CardPressError::Cancelled)
        } else {
            Ok(())
        }
    }
}

struct Job {
    key: RequestKey,
    request: ContentRequest,
    slot: Arc<Slot>,
}

struct Shared {
    context: PipelineContext,
    cache: ResultCache,
    executions: AtomicUsize,
}

/// Runs pipelines on background threads, deduplicating identical requests.
///
/// Each distinct request runs at most once while its cache entry lives;
/// failed and cancelled executions are evicted so a retry runs again.
/// Dropping the dispatcher closes the queue and joins the workers.
pub struct Dispatcher {
    shared: Arc<Shared>,
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    pub fn new(context: PipelineContext, workers: usize) -> Self {
        let shared = Arc::new(Shared {
            context,
            cache: ResultCache::new(),
            executions: AtomicUsize::new(0),
        });
        let (sender, receiver) = crossbeam_channel::unbounded::<Job>();
        let workers = (0..workers.max(1))
            .filter_map(|index| {
                let shared = shared.clone();
                let receiver = receiver.clone();
                thread::Builder::new()
                    .name(format!("cardpress-worker-{index}"))
                    .spawn(move || worker_loop(&shared, &receiver))
                    .map_err(|err| log::error!("failed to spawn worker {index}: {err}"))
                    .ok()
            })
            .collect();
        Self {
            shared,
            sender: Some(sender),
            workers,
        }
    }

    /// Starts (or joins) the execution for `request` and returns immediately.
    pub fn process_content(&self, request: ContentRequest) -> ContentHandle {
        let key = RequestKey::for_request(&request);
        let (slot, created) = self.shared.cache.get_or_insert(key);
        if created {
            log::debug!("request {key}: queued");
            let job = Job {
                key,
                request,
                slot: slot.clone(),
            };
            let sent = !self.workers.is_empty()
                && self
                    .sender
                    .as_ref()
                    .is_some_and(|sender| sender.send(job).is_ok());
            if !sent {
                self.shared.cache.evict(&key, &slot);
                slot.publish(Err(Arc::new(CardPressError::WorkerUnavailable)));
            }
        } else {
            log::debug!("request {key}: joined existing execution");
        }
        ContentHandle {
            key,
            slot,
            shared: Arc::downgrade(&self.shared),
            attached: AtomicBool::new(true),
        }
    }

    pub fn cache(&self) -> &ResultCache {
        &self.shared.cache
    }

    /// Number of pipeline executions started so far.
    pub fn execution_count(&self) -> usize {
        self.shared.executions.load(Ordering::SeqCst)
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("cardpress worker panicked during shutdown");
            }
        }
    }
}

fn worker_loop(shared: &Shared, receiver: &Receiver<Job>) {
    while let Ok(job) = receiver.recv() {
        shared.executions.fetch_add(1, Ordering::SeqCst);
        let cancel = job.slot.cancel_token();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            run_pipeline(&job.request, &shared.context, cancel)
        }))
        .unwrap_or_else(|_| {
            log::error!("request {}: pipeline panicked", job.key);
            Err(CardPressError::WorkerUnavailable)
        });
        match outcome {
            Ok(result) => {
                log::debug!("request {}: {} cards ready", job.key, result.card_count());
                job.slot.publish(Ok(Arc::new(result)));
            }
            Err(err) => {
                if err.is_cancelled() {
                    log::debug!("request {}: cancelled", job.key);
                } else {
                    log::warn!("request {} failed: {err}", job.key);
                }
                shared.cache.evict(&job.key, &job.slot);
                job.slot.publish(Err(Arc::new(err)));
            }
        }
    }
}

/// Caller's view of one submitted request.
pub struct ContentHandle {
    key: RequestKey,
    slot: Arc<Slot>,
    shared: Weak<Shared>,
    attached: AtomicBool,
}

impl ContentHandle {
    pub fn key(&self) -> RequestKey {
        self.key
    }

    pub fn wait(&self) -> SharedResult {
        self.slot.wait()
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Option<SharedResult> {
        self.slot.wait_timeout(timeout)
    }

    pub fn try_result(&self) -> Option<SharedResult> {
        self.slot.try_result()
    }

    pub fn is_finished(&self) -> bool {
        self.slot.is_finished()
    }

    /// Withdraws interest in the result. The execution is cancelled only
    /// when no other handle is still attached to it.
    pub fn cancel(&self) {
        if !self.attached.swap(false, Ordering::SeqCst) {
            return;
        }
        match self.shared.upgrade() {
            Some(shared) => {
                if shared.cache.release(&self.key, &self.slot) {
                    log::debug!("request {}: cancelled", self.key);
                }
            }
            None => {
                self.slot.detach();
            }
        }
    }
}

impl Drop for ContentHandle {
    fn drop(&mut self) {
        if self.attached.swap(false, Ordering::SeqCst) {
            self.slot.detach();
        }
    }
}

/// Tracks the most recent request of one consumer. Submitting a different
/// request cancels the superseded one; only the latest result is surfaced.
pub struct ContentSession<'a> {
    dispatcher: &'a Dispatcher,
    current: Option<ContentHandle>,
}

impl<'a> ContentSession<'a> {
    pub fn new(dispatcher: &'a Dispatcher) -> Self {
        Self {
            dispatcher,
            current: None,
        }
    }

    pub fn submit(&mut self, request: ContentRequest) -> RequestKey {
        let key = RequestKey::for_request(&request);
        if let Some(current) = &self.current {
            if current.key() == key {
                return key;
            }
            current.cancel();
        }
        self.current = Some(self.dispatcher.process_content(request));
        key
    }

    pub fn current_key(&self) -> Option<RequestKey> {
        self.current.as_ref().map(ContentHandle::key)
    }

    pub fn is_processing(&self) -> bool {
        self.current.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    pub fn latest(&self) -> Option<SharedResult> {
        self.current.as_ref().and_then(ContentHandle::try_result)
    }

    pub fn wait_latest(&self) -> Option<SharedResult> {
        self.current.as_ref().map(ContentHandle::wait)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(token.check().is_ok());
        clone.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(CardPressError::Cancelled)));
    }
}
