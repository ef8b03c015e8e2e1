//! Background IR rebuild worker
//!
//! Keeps IR preparation (file I/O, resampling, FFT partitioning) off the
//! audio thread.
//!
//! ```text
//! Audio Thread                      Rebuild Thread
//!      │                                  │
//!      │  request(job)  [try_send]        │
//!      │─────────────────────────────────>│ coalesce pending jobs
//!      │                                  │ IrRebuilder::refresh
//!      │  poll() -> PreparedIrSet         │
//!      │<─────────────────────────────────│
//!      │                                  │
//!      │  retire(old convolvers)          │
//!      │─────────────────────────────────>│ dropped here
//! ```

use crate::rebuild::{IrRebuilder, RebuildJob};
use crossbeam_channel::{
    bounded, unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError,
};
use reverb_core::{LogLevel, Result, SharedLogSink};
use reverb_dsp::pipeline::MainPipeline;
use reverb_dsp::PartitionedConvolver;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Convolvers for every channel, built from one job
///
/// After [`install_into`](Self::install_into) the set holds the convolvers it
/// replaced, ready to be retired.
#[derive(Debug)]
pub struct PreparedIrSet {
    generation: u64,
    convolvers: Vec<Option<PartitionedConvolver>>,
}

impl PreparedIrSet {
    pub fn new(generation: u64, convolvers: Vec<PartitionedConvolver>) -> Self {
        Self {
            generation,
            convolvers: convolvers.into_iter().map(Some).collect(),
        }
    }

    /// Generation of the job this set was built from
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of channels in the set
    pub fn len(&self) -> usize {
        self.convolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.convolvers.is_empty()
    }

    /// Swap every convolver into the matching pipeline
    ///
    /// Does not allocate; the replaced convolvers take the freed slots.
    pub fn install_into(&mut self, pipelines: &mut [MainPipeline]) {
        for (pipeline, slot) in pipelines.iter_mut().zip(self.convolvers.iter_mut()) {
            if let Some(convolver) = slot.take() {
                *slot = pipeline.install(convolver);
            }
        }
    }
}

enum WorkerCommand {
    Rebuild { generation: u64, job: RebuildJob },
    Shutdown,
}

/// Handle to the rebuild thread
pub struct RebuildWorker {
    request_tx: Sender<WorkerCommand>,
    result_rx: Receiver<PreparedIrSet>,
    retire_tx: Sender<PreparedIrSet>,
    thread_handle: Option<JoinHandle<()>>,
    next_generation: u64,
    /// Results older than this were built for a stale layout
    accept_from: u64,
    log: SharedLogSink,
}

impl RebuildWorker {
    /// Spawn the worker thread, which takes ownership of `rebuilder`
    pub fn spawn(rebuilder: IrRebuilder, queue_depth: usize, log: SharedLogSink) -> Result<Self> {
        let (request_tx, request_rx) = bounded::<WorkerCommand>(queue_depth.max(1));
        let (result_tx, result_rx) = unbounded::<PreparedIrSet>();
        let (retire_tx, retire_rx) = unbounded::<PreparedIrSet>();
        let thread_log = log.clone();

        let thread_handle = thread::Builder::new()
            .name("ir-rebuild".to_string())
            .spawn(move || {
                Self::worker_thread(rebuilder, &request_rx, &result_tx, &retire_rx, &thread_log);
            })?;

        Ok(Self {
            request_tx,
            result_rx,
            retire_tx,
            thread_handle: Some(thread_handle),
            next_generation: 1,
            accept_from: 0,
            log,
        })
    }

    /// Queue a rebuild (non-blocking)
    ///
    /// Returns false if the queue is full; the caller retries on a later block.
    pub fn request(&mut self, job: RebuildJob) -> bool {
        let generation = self.next_generation;
        match self
            .request_tx
            .try_send(WorkerCommand::Rebuild { generation, job })
        {
            Ok(()) => {
                self.next_generation += 1;
                true
            }
            Err(TrySendError::Full(_)) => false,
            Err(TrySendError::Disconnected(_)) => {
                self.log
                    .log(LogLevel::Error, "IR rebuild thread is gone; request dropped");
                false
            }
        }
    }

    /// Discard results of every request sent so far
    pub fn invalidate(&mut self) {
        self.accept_from = self.next_generation;
    }

    /// Newest finished set, if any (non-blocking)
    ///
    /// Stale sets are retired without being returned.
    pub fn poll(&mut self) -> Option<PreparedIrSet> {
        let mut newest: Option<PreparedIrSet> = None;
        loop {
            match self.result_rx.try_recv() {
                Ok(set) if set.generation() >= self.accept_from => {
                    if let Some(older) = newest.replace(set) {
                        self.retire(older);
                    }
                }
                Ok(stale) => self.retire(stale),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        if let Some(set) = &newest {
            self.accept_from = set.generation() + 1;
        }
        newest
    }

    /// Hand replaced convolvers back to the worker thread to be freed
    pub fn retire(&self, set: PreparedIrSet) {
        // Dropped here only if the worker has already exited
        let _ = self.retire_tx.send(set);
    }

    fn worker_thread(
        mut rebuilder: IrRebuilder,
        request_rx: &Receiver<WorkerCommand>,
        result_tx: &Sender<PreparedIrSet>,
        retire_rx: &Receiver<PreparedIrSet>,
        log: &SharedLogSink,
    ) {
        tracing::debug!("IR rebuild thread started");

        loop {
            retire_rx.try_iter().for_each(drop);

            let command = match request_rx.recv_timeout(POLL_INTERVAL) {
                Ok(command) => command,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };

            // Only the newest pending job matters
            let mut latest = match command {
                WorkerCommand::Rebuild { generation, job } => (generation, job),
                WorkerCommand::Shutdown => break,
            };
            let mut shutdown = false;
            for command in request_rx.try_iter() {
                match command {
                    WorkerCommand::Rebuild { generation, mut job } => {
                        // A skipped forced job still forces the one that replaces it
                        job.force |= latest.1.force;
                        latest = (generation, job);
                    }
                    WorkerCommand::Shutdown => shutdown = true,
                }
            }
            if shutdown {
                break;
            }

            let (generation, job) = latest;
            let started = Instant::now();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| rebuilder.refresh(&job)));
            match outcome {
                Ok(Ok(Some(convolvers))) => {
                    tracing::debug!(
                        generation,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "IR set ready"
                    );
                    if result_tx.send(PreparedIrSet::new(generation, convolvers)).is_err() {
                        break;
                    }
                }
                Ok(Ok(None)) => {}
                Ok(Err(e)) => log.log(
                    LogLevel::Error,
                    &format!("IR refresh failed, keeping previous IR: {}", e),
                ),
                Err(_) => log.log(LogLevel::Fatal, "IR rebuild panicked, keeping previous IR"),
            }
        }

        retire_rx.try_iter().for_each(drop);
        tracing::debug!("IR rebuild thread exiting");
    }
}

impl Drop for RebuildWorker {
    fn drop(&mut self) {
        let _ = self.request_tx.send(WorkerCommand::Shutdown);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use reverb_core::params::ids;
    use reverb_core::{MemorySink, ParameterSnapshot, RawIr, SampleRate};
    use reverb_dsp::IrBank;
    use std::sync::Arc;

    fn worker(log: &Arc<MemorySink>) -> RebuildWorker {
        let mut bank = IrBank::new();
        bank.insert(
            "room",
            RawIr::new(SampleRate::DVD_QUALITY, vec![vec![0.5; 2_000]]),
        );
        let rebuilder = IrRebuilder::new(&EngineConfig::default(), Arc::new(bank), log.clone());
        RebuildWorker::spawn(rebuilder, 4, log.clone()).unwrap()
    }

    fn job(choice: &str, partition_size: usize) -> RebuildJob {
        RebuildJob {
            params: ParameterSnapshot::defaults().with_choice(ids::IR_CHOICE, choice),
            sample_rate: SampleRate::DVD_QUALITY,
            num_channels: 2,
            partition_size,
            force: false,
        }
    }

    fn forced(choice: &str, partition_size: usize) -> RebuildJob {
        RebuildJob {
            force: true,
            ..job(choice, partition_size)
        }
    }

    fn wait_for(worker: &mut RebuildWorker) -> PreparedIrSet {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(set) = worker.poll() {
                return set;
            }
            assert!(Instant::now() < deadline, "rebuild timed out");
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_builds_requested_set() {
        let log = MemorySink::shared();
        let mut worker = worker(&log);

        assert!(worker.request(job("room", 64)));
        let set = wait_for(&mut worker);
        assert_eq!(set.len(), 2);
        assert_eq!(set.generation(), 1);
    }

    #[test]
    fn test_install_swaps_and_retires() {
        let log = MemorySink::shared();
        let mut worker = worker(&log);
        let mut pipelines = vec![MainPipeline::new(64), MainPipeline::new(64)];

        worker.request(job("room", 64));
        let mut first = wait_for(&mut worker);
        first.install_into(&mut pipelines);
        assert!(pipelines.iter().all(MainPipeline::has_ir));
        // Nothing was installed before
        assert!(first.convolvers.iter().all(Option::is_none));
        worker.retire(first);

        worker.request(job("room", 128));
        let mut second = wait_for(&mut worker);
        second.install_into(&mut pipelines);
        assert!(second.convolvers.iter().all(Option::is_some));
        worker.retire(second);
    }

    #[test]
    fn test_invalidate_discards_stale_results() {
        let log = MemorySink::shared();
        let mut worker = worker(&log);

        worker.request(job("room", 64));
        worker.invalidate();
        worker.request(job("room", 256));

        let set = wait_for(&mut worker);
        assert!(set.generation() >= 2);
    }

    #[test]
    fn test_forced_job_after_invalidate_produces_set() {
        let log = MemorySink::shared();
        let mut worker = worker(&log);

        worker.request(job("room", 64));
        let first = wait_for(&mut worker);
        worker.retire(first);

        // Same layout as the result just consumed; only the force flag
        // makes the rebuilder hand out a fresh set
        worker.invalidate();
        worker.request(forced("room", 64));
        let set = wait_for(&mut worker);
        assert_eq!(set.generation(), 2);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_coalesced_jobs_keep_force() {
        let log = MemorySink::shared();
        let mut worker = worker(&log);

        worker.request(job("room", 64));
        let first = wait_for(&mut worker);
        worker.retire(first);

        worker.invalidate();
        worker.request(forced("room", 64));
        worker.request(job("room", 64));
        let set = wait_for(&mut worker);
        assert!(set.generation() >= 2);
    }

    #[test]
    fn test_failed_load_is_logged() {
        let log = MemorySink::shared();
        let mut worker = worker(&log);

        worker.request(job("missing", 64));
        let deadline = Instant::now() + Duration::from_secs(5);
        while !log.contains(LogLevel::Error, "missing") {
            assert!(Instant::now() < deadline, "error never logged");
            thread::sleep(Duration::from_millis(2));
        }
        assert!(worker.poll().is_none());
    }

    #[test]
    fn test_drop_joins_thread() {
        let log = MemorySink::shared();
        let worker = worker(&log);
        drop(worker);
    }
}
