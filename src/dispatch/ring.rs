//! Bounded hand-off ring feeding a fixed pool of worker threads.
//!
//! Producers publish jobs into a preallocated lock-free queue; worker
//! threads pop and run them. When the queue is empty a worker either keeps
//! spinning ([`WaitStrategy::BusySpin`]) or, after a short spin, sleeps on a
//! condition variable until a producer signals ([`WaitStrategy::Blocking`]).
//! The ring runs jobs; it does not order their results.

use std::{
    fmt,
    io,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering, fence},
    },
    thread::{self, JoinHandle},
};

use crossbeam_queue::ArrayQueue;
use crossbeam_utils::Backoff;
use log::{debug, error, info};
use parking_lot::{Condvar, Mutex};

use crate::panic::format_panic;

/// How idle workers wait for jobs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WaitStrategy {
    /// Spin and yield; lowest latency, burns a core per idle worker.
    BusySpin,
    /// Spin briefly, then sleep until a producer signals.
    #[default]
    Blocking,
}

/// Sizing for a [`DispatchRing`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RingConfig {
    /// Slots in the ring.
    pub size: usize,
    /// Worker threads consuming the ring.
    pub workers: usize,
    /// Idle strategy for the workers.
    pub wait_strategy: WaitStrategy,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            size: 1024,
            workers: thread::available_parallelism().map_or(1, usize::from),
            wait_strategy: WaitStrategy::default(),
        }
    }
}

struct RingShared<J> {
    queue: ArrayQueue<J>,
    strategy: WaitStrategy,
    running: AtomicBool,
    sleepers: AtomicUsize,
    lock: Mutex<()>,
    available: Condvar,
}

impl<J> RingShared<J> {
    fn signal(&self) {
        // Pairs with the fence in `sleep`: either the producer sees the
        // sleeper or the sleeper sees the job.
        fence(Ordering::SeqCst);
        if self.sleepers.load(Ordering::SeqCst) > 0 {
            let _guard = self.lock.lock();
            self.available.notify_one();
        }
    }

    fn sleep(&self) {
        let mut guard = self.lock.lock();
        self.sleepers.fetch_add(1, Ordering::SeqCst);
        fence(Ordering::SeqCst);
        while self.queue.is_empty() && self.running.load(Ordering::Acquire) {
            self.available.wait(&mut guard);
        }
        self.sleepers.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Fixed pool of worker threads behind a bounded job ring.
pub struct DispatchRing<J: Send + 'static> {
    shared: Arc<RingShared<J>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl<J: Send + 'static> DispatchRing<J> {
    /// Start `config.workers` threads, each running `runner` on the jobs it
    /// pops.
    ///
    /// # Errors
    ///
    /// Returns an error if a worker thread cannot be spawned; threads already
    /// started are stopped.
    pub fn start<F>(config: RingConfig, runner: F) -> io::Result<Self>
    where
        F: Fn(J) + Send + Sync + 'static,
    {
        let shared = Arc::new(RingShared {
            queue: ArrayQueue::new(config.size.max(1)),
            strategy: config.wait_strategy,
            running: AtomicBool::new(true),
            sleepers: AtomicUsize::new(0),
            lock: Mutex::new(()),
            available: Condvar::new(),
        });
        let ring = Self {
            shared,
            workers: Mutex::new(Vec::with_capacity(config.workers)),
        };
        let runner = Arc::new(runner);
        for index in 0..config.workers.max(1) {
            let shared = Arc::clone(&ring.shared);
            let runner = Arc::clone(&runner);
            let handle = thread::Builder::new()
                .name(format!("ringframe-dispatch-{index}"))
                .spawn(move || worker_loop(&shared, runner.as_ref()))?;
            ring.workers.lock().push(handle);
        }
        info!(
            "dispatch ring started: size={}, workers={}, wait_strategy={:?}",
            ring.shared.queue.capacity(),
            config.workers.max(1),
            config.wait_strategy
        );
        Ok(ring)
    }

    /// Publish `job` without waiting. Hands the job back if the ring is full
    /// or stopped.
    ///
    /// # Errors
    ///
    /// Returns the job when it could not be queued.
    pub fn try_publish(&self, job: J) -> Result<(), J> {
        if !self.shared.running.load(Ordering::Acquire) {
            return Err(job);
        }
        self.shared.queue.push(job)?;
        if self.shared.strategy == WaitStrategy::Blocking {
            self.shared.signal();
        }
        Ok(())
    }

    /// Publish `job`, yielding to the runtime while the ring is full.
    ///
    /// A job published after [`shutdown`](Self::shutdown) is dropped.
    pub async fn publish(&self, mut job: J) {
        loop {
            match self.try_publish(job) {
                Ok(()) => return,
                Err(_) if !self.is_running() => {
                    debug!("dispatch ring stopped, dropping job");
                    return;
                }
                Err(returned) => {
                    job = returned;
                    tokio::task::yield_now().await;
                }
            }
        }
    }

    /// Jobs waiting for a worker.
    #[must_use]
    pub fn len(&self) -> usize { self.shared.queue.len() }

    /// Whether no jobs are waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.shared.queue.is_empty() }

    /// Ring capacity.
    #[must_use]
    pub fn capacity(&self) -> usize { self.shared.queue.capacity() }

    /// Whether the ring accepts jobs.
    #[must_use]
    pub fn is_running(&self) -> bool { self.shared.running.load(Ordering::Acquire) }

    /// Stop accepting jobs, let workers drain the queue, and join them.
    pub fn shutdown(&self) {
        if !self.shared.running.swap(false, Ordering::AcqRel) {
            return;
        }
        {
            let _guard = self.shared.lock.lock();
            self.shared.available.notify_all();
        }
        let current = thread::current().id();
        for handle in self.workers.lock().drain(..) {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                error!("dispatch worker exited by panic");
            }
        }
        info!("dispatch ring stopped");
    }
}

impl<J: Send + 'static> Drop for DispatchRing<J> {
    fn drop(&mut self) { self.shutdown(); }
}

impl<J: Send + 'static> fmt::Debug for DispatchRing<J> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchRing")
            .field("capacity", &self.capacity())
            .field("queued", &self.len())
            .field("strategy", &self.shared.strategy)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

fn worker_loop<J>(shared: &RingShared<J>, runner: &dyn Fn(J)) {
    let backoff = Backoff::new();
    loop {
        if let Some(job) = shared.queue.pop() {
            backoff.reset();
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| runner(job))) {
                error!("dispatch job panicked: panic={}", format_panic(panic));
            }
            continue;
        }
        if !shared.running.load(Ordering::Acquire) {
            return;
        }
        match shared.strategy {
            WaitStrategy::BusySpin => backoff.snooze(),
            WaitStrategy::Blocking if !backoff.is_completed() => backoff.snooze(),
            WaitStrategy::Blocking => {
                shared.sleep();
                backoff.reset();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Mutex as StdMutex, mpsc},
        time::Duration,
    };

    use rstest::rstest;

    use super::*;

    fn collecting_ring(
        strategy: WaitStrategy,
        workers: usize,
    ) -> (DispatchRing<u64>, mpsc::Receiver<u64>) {
        let (tx, rx) = mpsc::channel();
        let tx = StdMutex::new(tx);
        let ring = DispatchRing::start(
            RingConfig {
                size: 8,
                workers,
                wait_strategy: strategy,
            },
            move |job| {
                tx.lock().expect("sender lock").send(job).expect("collector alive");
            },
        )
        .expect("start ring");
        (ring, rx)
    }

    #[rstest]
    #[case(WaitStrategy::BusySpin)]
    #[case(WaitStrategy::Blocking)]
    fn every_published_job_runs_once(#[case] strategy: WaitStrategy) {
        let (ring, rx) = collecting_ring(strategy, 3);
        for job in 0..200 {
            let mut pending = job;
            while let Err(returned) = ring.try_publish(pending) {
                pending = returned;
                thread::yield_now();
            }
        }
        let mut seen: Vec<u64> = (0..200)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).expect("job ran"))
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..200).collect::<Vec<_>>());
        ring.shutdown();
    }

    #[test]
    fn full_ring_hands_job_back() {
        let gate = Arc::new(StdMutex::new(()));
        let held = gate.lock().expect("gate lock");
        let worker_gate = Arc::clone(&gate);
        let ring = DispatchRing::start(
            RingConfig {
                size: 2,
                workers: 1,
                wait_strategy: WaitStrategy::Blocking,
            },
            move |_job: u64| {
                drop(worker_gate.lock().expect("gate lock"));
            },
        )
        .expect("start ring");
        let mut rejected = None;
        for job in 0..16 {
            if let Err(returned) = ring.try_publish(job) {
                rejected = Some(returned);
                break;
            }
        }
        assert!(rejected.is_some(), "ring never filled");
        drop(held);
        ring.shutdown();
        assert!(ring.is_empty());
    }

    #[test]
    fn stopped_ring_rejects_jobs() {
        let (ring, _rx) = collecting_ring(WaitStrategy::Blocking, 1);
        ring.shutdown();
        assert!(!ring.is_running());
        assert_eq!(ring.try_publish(7), Err(7));
    }

    #[test]
    fn panicking_job_does_not_kill_worker() {
        let (tx, rx) = mpsc::channel();
        let tx = StdMutex::new(tx);
        let ring = DispatchRing::start(
            RingConfig {
                size: 4,
                workers: 1,
                wait_strategy: WaitStrategy::Blocking,
            },
            move |job: u64| {
                assert!(job != 0, "job zero is rejected");
                tx.lock().expect("sender lock").send(job).expect("collector alive");
            },
        )
        .expect("start ring");
        ring.try_publish(0).expect("publish panicking job");
        ring.try_publish(1).expect("publish follow-up job");
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(1));
    }

    #[tokio::test]
    async fn async_publish_waits_for_room() {
        let (ring, rx) = collecting_ring(WaitStrategy::BusySpin, 2);
        for job in 0..64 {
            ring.publish(job).await;
        }
        let mut count = 0;
        while count < 64 {
            rx.recv_timeout(Duration::from_secs(5)).expect("job ran");
            count += 1;
        }
    }
}
