//! Background load scheduling.
//!
//! Decode jobs run one at a time, in submission order, on a single worker
//! thread that exists only while there is work queued. The first failure
//! trips a halt latch: jobs still queued are discarded and new submissions are
//! refused until [`LoadScheduler::clear_halt`] is called. A panic inside a job
//! counts as a failure.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::cache_file::CacheFile;
use crate::core::FrameSink;
use crate::mcx::LoadSummary;
use crate::util::{Error, LoadOptions, Result};

/// Name of the worker thread.
pub const WORKER_THREAD_NAME: &str = "mcache-loader";

/// Lifecycle of a submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Waiting for the worker.
    Queued,
    /// Being decoded.
    Parsing,
    /// Decoded; the sink holds every frame.
    Completed,
    /// Decoding failed and tripped the halt latch.
    Failed,
    /// Dropped unrun because an earlier job failed.
    Discarded,
}

impl JobState {
    /// No further transitions happen from this state.
    #[inline]
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Discarded)
    }
}

/// Passed to a job's completion callback.
pub struct LoadEvent {
    /// Id of the finished job.
    pub job: u64,
    /// Sink the frames went to.
    pub target: Arc<dyn FrameSink>,
    /// Descriptor path of the cache.
    pub file_name: String,
    pub summary: LoadSummary,
}

/// Passed to the error hook when a job fails.
#[derive(Debug)]
pub struct ErrorEvent {
    pub job: u64,
    pub base_name: String,
    pub error: Error,
}

/// Called once with the result of a successful job.
pub type CompletionFn = Box<dyn FnOnce(LoadEvent) + Send>;

/// Called for every failed job.
pub type ErrorHook = Arc<dyn Fn(&ErrorEvent) + Send + Sync>;

/// Unit of work: one cache decoded into one sink.
pub struct DecodeJob {
    cache: CacheFile,
    sink: Arc<dyn FrameSink>,
    options: LoadOptions,
    on_complete: Option<CompletionFn>,
}

impl DecodeJob {
    pub fn new(cache: CacheFile, sink: Arc<dyn FrameSink>) -> Self {
        Self {
            cache,
            sink,
            options: LoadOptions::default(),
            on_complete: None,
        }
    }

    pub fn with_options(mut self, options: LoadOptions) -> Self {
        self.options = options;
        self
    }

    /// Callback fired on the worker thread after a successful decode.
    pub fn on_complete(mut self, f: impl FnOnce(LoadEvent) + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }

    #[inline]
    pub fn cache(&self) -> &CacheFile {
        &self.cache
    }

    /// Decode on the calling thread, bypassing any scheduler.
    ///
    /// The completion callback still fires on success.
    pub fn run_inline(self) -> Result<LoadSummary> {
        let summary = self.cache.decode(self.sink.as_ref(), &self.options)?;
        if let Some(f) = self.on_complete {
            f(LoadEvent {
                job: 0,
                target: self.sink.clone(),
                file_name: self.cache.file_name().to_string(),
                summary: summary.clone(),
            });
        }
        Ok(summary)
    }
}

/// Observer of a submitted job.
#[derive(Debug, Clone)]
pub struct JobHandle {
    id: u64,
    base_name: String,
    state: Arc<Mutex<JobState>>,
}

impl JobHandle {
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn state(&self) -> JobState {
        *self.state.lock()
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_finished()
    }
}

/// Process-wide (per scheduler) fail-fast flag.
#[derive(Debug, Clone, Default)]
struct HaltLatch(Arc<AtomicBool>);

impl HaltLatch {
    #[inline]
    fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    #[inline]
    fn set(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[inline]
    fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }
}

struct QueuedJob {
    id: u64,
    state: Arc<Mutex<JobState>>,
    job: DecodeJob,
}

#[derive(Default)]
struct QueueState {
    jobs: VecDeque<QueuedJob>,
    worker_active: bool,
}

struct Shared {
    queue: Mutex<QueueState>,
    halt: HaltLatch,
    on_error: Option<ErrorHook>,
    next_id: AtomicU64,
}

/// Serial background loader with a fail-fast latch.
///
/// Cloning yields another handle to the same queue and latch.
#[derive(Clone)]
pub struct LoadScheduler {
    shared: Arc<Shared>,
}

impl Default for LoadScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadScheduler {
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Scheduler that reports every failed job to `hook`, on the worker thread.
    pub fn with_error_hook(hook: impl Fn(&ErrorEvent) + Send + Sync + 'static) -> Self {
        Self::build(Some(Arc::new(hook)))
    }

    fn build(on_error: Option<ErrorHook>) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(QueueState::default()),
                halt: HaltLatch::default(),
                on_error,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Queue a job, starting the worker if none is running.
    ///
    /// Refused with [`Error::Halted`] while the latch is set.
    pub fn submit(&self, job: DecodeJob) -> Result<JobHandle> {
        let base_name = job.cache.base_name().to_string();
        if self.shared.halt.is_set() {
            warn!("{}: not queued, loader halted by an earlier failure", base_name);
            return Err(Error::Halted(base_name));
        }

        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let state = Arc::new(Mutex::new(JobState::Queued));
        let handle = JobHandle {
            id,
            base_name: base_name.clone(),
            state: state.clone(),
        };

        let mut queue = self.shared.queue.lock();
        queue.jobs.push_back(QueuedJob { id, state, job });
        debug!("job {} ({}) queued, {} pending", id, base_name, queue.jobs.len());

        if !queue.worker_active {
            let shared = self.shared.clone();
            let spawned = thread::Builder::new()
                .name(WORKER_THREAD_NAME.to_string())
                .spawn(move || worker_loop(shared));
            if let Err(e) = spawned {
                queue.jobs.pop_back();
                return Err(Error::Io(e));
            }
            queue.worker_active = true;
        }
        Ok(handle)
    }

    /// Whether an earlier failure halted the loader.
    pub fn is_halted(&self) -> bool {
        self.shared.halt.is_set()
    }

    /// Reset the latch so new jobs are accepted.
    pub fn clear_halt(&self) {
        if self.shared.halt.is_set() {
            info!("loader halt cleared");
        }
        self.shared.halt.clear();
    }

    /// Jobs queued but not yet picked up.
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().jobs.len()
    }

    /// No job is queued or running.
    pub fn is_idle(&self) -> bool {
        let queue = self.shared.queue.lock();
        queue.jobs.is_empty() && !queue.worker_active
    }
}

fn worker_loop(shared: Arc<Shared>) {
    debug!("loader thread started");
    loop {
        let next = {
            let mut queue = shared.queue.lock();
            match queue.jobs.pop_front() {
                Some(job) => job,
                None => {
                    queue.worker_active = false;
                    break;
                }
            }
        };
        run_job(&shared, next);
    }
    debug!("loader thread idle, exiting");
}

fn run_job(shared: &Shared, queued: QueuedJob) {
    let QueuedJob { id, state, job } = queued;
    let DecodeJob {
        cache,
        sink,
        options,
        on_complete,
    } = job;

    if shared.halt.is_set() {
        *state.lock() = JobState::Discarded;
        warn!("job {} ({}) discarded, loader halted", id, cache.base_name());
        return;
    }

    *state.lock() = JobState::Parsing;
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> Result<()> {
        let summary = cache.decode(sink.as_ref(), &options)?;
        *state.lock() = JobState::Completed;
        if let Some(f) = on_complete {
            f(LoadEvent {
                job: id,
                target: sink.clone(),
                file_name: cache.file_name().to_string(),
                summary,
            });
        }
        Ok(())
    }))
    .unwrap_or_else(|payload| Err(Error::Panicked(panic_message(payload.as_ref()))));

    if let Err(err) = outcome {
        // latch before publishing the failure so no queued job slips through
        shared.halt.set();
        *state.lock() = JobState::Failed;
        error!("job {} ({}) failed: {}", id, cache.base_name(), err);
        if let Some(hook) = &shared.on_error {
            let event = ErrorEvent {
                job: id,
                base_name: cache.base_name().to_string(),
                error: err,
            };
            if panic::catch_unwind(AssertUnwindSafe(|| hook(&event))).is_err() {
                error!("error hook panicked for job {}", id);
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CacheChannel, CacheDescriptor, CacheLayout, ChannelFormat, FrameStore};
    use crate::mcx::writer::{write_cache, ChannelData, FrameData};
    use crate::util::ErrorKind;
    use byteorder::BigEndian;
    use glam::Vec3;
    use std::path::Path;
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    const DT: f64 = 250.0 / 6000.0;

    fn write_sample(dir: &Path, base: &str) -> CacheFile {
        let desc = CacheDescriptor::new(CacheLayout::OneFile, DT)
            .with_channel(CacheChannel::positions("mesh", ChannelFormat::Float3Array, DT, 0.0, DT));
        let frames = vec![
            FrameData::new(0, vec![ChannelData::new("mesh", ChannelFormat::Float3Array, vec![Vec3::ZERO])]),
            FrameData::new(250, vec![ChannelData::new("mesh", ChannelFormat::Float3Array, vec![Vec3::ONE])]),
        ];
        write_cache::<BigEndian>(dir, base, &desc, &frames).unwrap();
        CacheFile::open(dir.join(format!("{}.xml", base))).unwrap()
    }

    fn wait_idle(scheduler: &LoadScheduler) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !scheduler.is_idle() {
            assert!(Instant::now() < deadline, "loader did not go idle");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_job_completes() {
        let dir = tempfile::tempdir().unwrap();
        let cache = write_sample(dir.path(), "cloth");
        let sink = Arc::new(FrameStore::new());
        let (tx, rx) = mpsc::channel();

        let scheduler = LoadScheduler::new();
        let handle = scheduler
            .submit(DecodeJob::new(cache, sink.clone()).on_complete(move |ev| {
                let _ = tx.send((ev.job, ev.summary.frames_delivered, ev.file_name));
            }))
            .unwrap();

        let (job, delivered, file_name) = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert_eq!(job, handle.id());
        assert_eq!(delivered, 2);
        assert!(file_name.ends_with("cloth.xml"));
        wait_idle(&scheduler);
        assert_eq!(handle.state(), JobState::Completed);
        assert!(sink.is_active());
        assert_eq!(sink.num_frames("mesh"), 2);
    }

    #[test]
    fn test_failure_halts_and_reports() {
        let dir = tempfile::tempdir().unwrap();
        let cache = write_sample(dir.path(), "cloth");
        std::fs::remove_file(dir.path().join("cloth.mc")).unwrap();

        let (tx, rx) = mpsc::channel();
        let scheduler = LoadScheduler::with_error_hook(move |ev| {
            let _ = tx.send((ev.job, ev.base_name.clone(), ev.error.kind()));
        });
        let handle = scheduler
            .submit(DecodeJob::new(cache.clone(), Arc::new(FrameStore::new())))
            .unwrap();

        let (job, base, kind) = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert_eq!(job, handle.id());
        assert_eq!(base, "cloth");
        assert_eq!(kind, ErrorKind::IoFailure);
        wait_idle(&scheduler);
        assert_eq!(handle.state(), JobState::Failed);
        assert!(scheduler.is_halted());

        let refused = scheduler.submit(DecodeJob::new(cache, Arc::new(FrameStore::new())));
        assert_eq!(refused.unwrap_err().kind(), ErrorKind::Halted);
    }

    #[test]
    fn test_clear_halt_accepts_work() {
        let dir = tempfile::tempdir().unwrap();
        let cache = write_sample(dir.path(), "cloth");
        let scheduler = LoadScheduler::new();
        scheduler.shared.halt.set();
        assert!(scheduler.submit(DecodeJob::new(cache.clone(), Arc::new(FrameStore::new()))).is_err());

        scheduler.clear_halt();
        let handle = scheduler
            .submit(DecodeJob::new(cache, Arc::new(FrameStore::new())))
            .unwrap();
        wait_idle(&scheduler);
        assert_eq!(handle.state(), JobState::Completed);
    }

    #[test]
    fn test_run_inline() {
        let dir = tempfile::tempdir().unwrap();
        let cache = write_sample(dir.path(), "cloth");
        let sink = Arc::new(FrameStore::new());
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();

        let summary = DecodeJob::new(cache, sink.clone())
            .on_complete(move |_| flag.store(true, Ordering::SeqCst))
            .run_inline()
            .unwrap();
        assert_eq!(summary.frames_delivered, 2);
        assert!(fired.load(Ordering::SeqCst));
        assert_eq!(sink.num_frames("mesh"), 2);
    }

    #[test]
    fn test_job_state_finished() {
        assert!(!JobState::Queued.is_finished());
        assert!(!JobState::Parsing.is_finished());
        assert!(JobState::Completed.is_finished());
        assert!(JobState::Failed.is_finished());
        assert!(JobState::Discarded.is_finished());
    }
}
