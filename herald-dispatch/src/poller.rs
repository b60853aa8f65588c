//! The background thread that drives every slot.
//!
//! One pass visits each slot in turn: skip it if a submitter holds it,
//! otherwise wait for activity (the only place the thread sleeps), perform,
//! and reap whatever finished. Reaped transfers are dropped here, which is the
//! only place a submitted transfer is ever released.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use herald_common::{internal, tracing};

use crate::{
    pool::Pool,
    stats::DispatchStats,
    transport::{Completion, Multiplexer},
};

/// Name of the poller's OS thread.
pub const THREAD_NAME: &str = "herald-poller";

pub struct Poller<M> {
    pool: Arc<Pool<M>>,
    running: Arc<AtomicBool>,
    default_timeout: Duration,
    stats: Arc<DispatchStats>,
}

impl<M: Multiplexer + 'static> Poller<M> {
    #[must_use]
    pub const fn new(
        pool: Arc<Pool<M>>,
        running: Arc<AtomicBool>,
        default_timeout: Duration,
        stats: Arc<DispatchStats>,
    ) -> Self {
        Self {
            pool,
            running,
            default_timeout,
            stats,
        }
    }

    /// Start the loop on its own thread. It runs until `running` is cleared.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be created.
    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || self.run())
    }

    fn run(self) {
        internal!(level = DEBUG, "Poller started with {} slots", self.pool.len());

        while self.running.load(Ordering::Acquire) {
            let mut polled = false;

            for index in 0..self.pool.len() {
                if !self.running.load(Ordering::Acquire) {
                    break;
                }
                let Some(mut slot) = self.pool.try_lock(index) else {
                    continue;
                };

                self.poll_slot(&mut *slot);
                polled = true;
            }

            // Every slot was busy with a submission
            if !polled {
                thread::yield_now();
            }
        }

        internal!(level = DEBUG, "Poller stopped");
    }

    fn poll_slot(&self, multiplexer: &mut M) {
        let timeout = multiplexer.timeout().unwrap_or(self.default_timeout);
        multiplexer.wait(timeout);
        multiplexer.perform();

        while let Some(completion) = multiplexer.info_read() {
            self.reap(multiplexer, completion);
        }
    }

    fn reap(&self, multiplexer: &mut M, Completion { id, outcome }: Completion) {
        match &outcome {
            Ok(()) => {
                self.stats.record_delivered();
                tracing::debug!(transfer = %id, "Mail delivered");
            }
            Err(e) => {
                self.stats.record_failed();
                tracing::warn!(transfer = %id, transient = e.is_transient(), "Mail delivery failed: {e}");
            }
        }

        if let Some(mut transfer) = multiplexer.remove(id) {
            drop(transfer.take_recipients());
            drop(transfer);
        }
    }
}
