//! Generation sessions: one background thread per request
//!
//! A [`Session`] runs each request on a dedicated, named OS thread. Chunks are
//! delivered to the request's callback on that thread, strictly in generation
//! order. Dropping a session blocks until its thread has finished; it does not
//! cancel the request, so a caller wanting a bounded teardown calls
//! [`Session::cancel`] first.

use crate::{
    config::ErrorPolicy,
    engine::Engine,
    generation::{
        pipeline::{GenerationPipeline, GenerationProgress},
        GenerationOutcome,
    },
    response::ResponseContext,
    CoreError, Result,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

type Worker = JoinHandle<Result<GenerationOutcome>>;

/// Cancels requests of one session from any thread, including while another
/// thread is blocked in [`Session::wait`]
#[derive(Debug, Clone)]
pub struct CancelHandle {
    session_id: String,
    early_stop: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Ask the session's current request to stop before its next decode step
    pub fn cancel(&self) {
        debug!("Cancellation requested for session '{}'", self.session_id);
        self.early_stop.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.early_stop.load(Ordering::Acquire)
    }
}

/// One generation request stream bound to an [`Engine`]
pub struct Session {
    /// Unique session ID
    id: String,
    /// Engine this session generates with; kept alive by this handle
    engine: Engine,
    /// Cancellation flag, checked between decode steps
    early_stop: Arc<AtomicBool>,
    /// Counters of the current request
    progress: Arc<GenerationProgress>,
    /// Thread running the current request
    worker: Option<Worker>,
    /// Number of requests started
    requests: usize,
}

impl Session {
    /// Create a new session bound to `engine`
    pub fn new(engine: &Engine) -> Self {
        let id = Uuid::new_v4().to_string();
        info!("Created session '{}' on model '{}'", id, engine.model().name());

        Self {
            id,
            engine: engine.clone(),
            early_stop: Arc::new(AtomicBool::new(false)),
            progress: Arc::new(GenerationProgress::default()),
            worker: None,
            requests: 0,
        }
    }

    /// Get session ID
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Start generating a response to `prompt` and return immediately.
    ///
    /// `callback` receives every chunk in order on the session thread; the
    /// last one has `done == true`. A request still running on this session
    /// is waited for first.
    pub fn predict_async<F>(&mut self, prompt: impl Into<String>, callback: F) -> Result<()>
    where
        F: FnMut(ResponseContext) + Send + 'static,
    {
        self.join_previous();

        self.early_stop.store(false, Ordering::Release);
        self.progress.reset();

        let prompt = prompt.into();
        let engine = self.engine.clone();
        let session_id = self.id.clone();
        let early_stop = Arc::clone(&self.early_stop);
        let progress = Arc::clone(&self.progress);
        let thread_name = format!("genstream-{}", &self.id[..8]);

        debug!(
            "Session '{}' starting request {} ({} prompt bytes)",
            self.id,
            self.requests + 1,
            prompt.len()
        );

        let worker = thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                run_request(&engine, &session_id, &prompt, &early_stop, &progress, callback)
            })
            .map_err(|e| CoreError::Resource {
                code: "SESSION_THREAD_SPAWN_FAILED",
                message: format!("Failed to spawn generation thread: {}", e),
                context: format!("Session '{}'", self.id),
                suggestion: "Reduce the number of concurrently running sessions".to_string(),
                resource_type: "thread".to_string(),
            })?;

        self.worker = Some(worker);
        self.requests += 1;
        Ok(())
    }

    /// Generate a response to `prompt` and block until it is complete.
    ///
    /// Runs the same generation as [`Session::predict_async`] with a
    /// discarding callback and returns the whole output as one final chunk.
    pub fn predict_sync(&mut self, prompt: impl Into<String>) -> Result<ResponseContext> {
        self.predict_async(prompt, |_| {})?;
        let outcome = self.wait()?;
        Ok(ResponseContext::chunk(outcome.text, true))
    }

    /// Block until the current request finishes and return its outcome
    pub fn wait(&mut self) -> Result<GenerationOutcome> {
        let worker = self.worker.take().ok_or_else(|| {
            CoreError::generation(
                "SESSION_NOT_RUNNING",
                "No request has been started on this session",
                "Waiting for generation",
                "Call predict_async before wait",
                Some(&self.id),
            )
        })?;
        join_worker(worker, &self.id)
    }

    /// Ask the current request to stop before its next decode step
    pub fn cancel(&self) {
        self.cancel_handle().cancel();
    }

    /// Handle sharing this session's cancellation flag. It stays valid across
    /// requests; each new request clears the flag when it starts.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            session_id: self.id.clone(),
            early_stop: Arc::clone(&self.early_stop),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.early_stop.load(Ordering::Acquire)
    }

    /// Whether a request thread is still running
    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Tokens generated so far by the current request
    pub fn response_count(&self) -> usize {
        self.progress.response_count()
    }

    /// Output budget of the current request, known once its prompt is encoded
    pub fn max_output_tokens(&self) -> usize {
        self.progress.max_output_tokens()
    }

    /// Number of requests started on this session
    pub fn requests(&self) -> usize {
        self.requests
    }

    /// Number of tokens `text` encodes to, without the start token.
    ///
    /// Tokenizer failures are returned to the caller and do not affect a
    /// running request.
    pub fn size_in_tokens(&self, text: &str) -> Result<usize> {
        self.engine.tokenizer().encode(text).map(|ids| ids.len())
    }

    fn join_previous(&mut self) {
        if let Some(worker) = self.worker.take() {
            debug!("Session '{}' waiting for previous request", self.id);
            if let Err(e) = join_worker(worker, &self.id) {
                warn!("Previous request on session '{}' failed: {}", self.id, e);
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            debug!("Session '{}' waiting for its request before teardown", self.id);
            if let Err(e) = join_worker(worker, &self.id) {
                warn!("Request on session '{}' failed: {}", self.id, e);
            }
        }
        debug!("Session '{}' destroyed", self.id);
    }
}

/// Body of the session thread
fn run_request<F>(
    engine: &Engine,
    session_id: &str,
    prompt: &str,
    early_stop: &AtomicBool,
    progress: &GenerationProgress,
    mut callback: F,
) -> Result<GenerationOutcome>
where
    F: FnMut(ResponseContext),
{
    let pipeline = GenerationPipeline::new(engine, session_id, early_stop, progress);
    match pipeline.run(prompt, &mut callback) {
        Ok(outcome) => {
            info!(
                "Session '{}' finished ({:?}): {} tokens in {:.2}ms ({:.1} tok/s)",
                session_id,
                outcome.finish_reason,
                outcome.tokens_generated,
                outcome.stats.total_time_ms,
                outcome.stats.tokens_per_second
            );
            Ok(outcome)
        }
        Err(err) => {
            error!("Session '{}' failed to generate output: {}", session_id, err);
            if engine.config().error_policy == ErrorPolicy::Abort {
                std::process::abort();
            }
            callback(ResponseContext::chunk(String::new(), true));
            Err(err)
        }
    }
}

fn join_worker(worker: Worker, session_id: &str) -> Result<GenerationOutcome> {
    worker.join().map_err(|panic| {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        CoreError::Internal {
            code: "SESSION_THREAD_PANICKED",
            message: format!("Generation thread panicked: {}", message),
            context: format!("Session '{}'", session_id),
            source: None,
        }
    })?
}
