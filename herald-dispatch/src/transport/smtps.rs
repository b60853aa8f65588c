//! Production transport: SMTP submission over implicit TLS.
//!
//! Each [`SmtpsMultiplexer`] owns a single-threaded tokio runtime whose tasks
//! are the in-flight transfers. The runtime only runs while the poller is
//! inside [`Multiplexer::wait`] or [`Multiplexer::perform`], so all network
//! progress happens on the poller thread, with the slot's mutex held.

use std::{collections::VecDeque, time::Duration};

use ahash::AHashMap;
use herald_common::internal;
use tokio::{
    runtime::{Builder, Runtime},
    task::{self, AbortHandle, JoinError, JoinSet},
};

use super::{Completion, Multiplexer, Transfer, TransferId, Transport};
use crate::{
    error::{TransferError, TransportError},
    smtp_transaction,
};

/// Wait budget suggested while transfers are running, so that other slots and
/// new submissions are not starved by one busy multiplexer.
const ACTIVE_POLL_SLICE: Duration = Duration::from_millis(50);

type TaskOutput = (Transfer, Result<(), TransferError>);

#[derive(Debug, Default, Clone, Copy)]
pub struct SmtpsTransport;

impl SmtpsTransport {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Transport for SmtpsTransport {
    type Multiplexer = SmtpsMultiplexer;

    fn global_init(&self) -> Result<(), TransportError> {
        internal!(level = DEBUG, "SMTPS transport ready");
        Ok(())
    }

    fn global_cleanup(&self) {
        internal!(level = DEBUG, "SMTPS transport released");
    }

    fn multiplexer(&self) -> Result<Self::Multiplexer, TransportError> {
        SmtpsMultiplexer::new()
    }
}

pub struct SmtpsMultiplexer {
    tasks: JoinSet<TaskOutput>,
    in_flight: AHashMap<task::Id, (TransferId, AbortHandle)>,
    finished: AHashMap<TransferId, Transfer>,
    completions: VecDeque<Completion>,
    next_id: u64,
    runtime: Option<Runtime>,
}

impl SmtpsMultiplexer {
    /// # Errors
    ///
    /// Returns [`TransportError::Runtime`] if the runtime cannot be built.
    pub fn new() -> Result<Self, TransportError> {
        let runtime = Builder::new_current_thread()
            .enable_io()
            .enable_time()
            .build()
            .map_err(TransportError::Runtime)?;

        Ok(Self {
            tasks: JoinSet::new(),
            in_flight: AHashMap::new(),
            finished: AHashMap::new(),
            completions: VecDeque::new(),
            next_id: 0,
            runtime: Some(runtime),
        })
    }

    /// Number of transfers still running.
    #[must_use]
    pub fn running(&self) -> usize {
        self.tasks.len()
    }

    fn complete(&mut self, joined: Result<(task::Id, TaskOutput), JoinError>) {
        match joined {
            Ok((task, (transfer, outcome))) => {
                if let Some((id, _)) = self.in_flight.remove(&task) {
                    self.finished.insert(id, transfer);
                    self.completions.push_back(Completion { id, outcome });
                }
            }
            Err(error) => {
                if let Some((id, _)) = self.in_flight.remove(&error.id()) {
                    self.completions.push_back(Completion {
                        id,
                        outcome: Err(TransferError::Aborted(error.to_string())),
                    });
                }
            }
        }
    }
}

impl Multiplexer for SmtpsMultiplexer {
    fn add(&mut self, mut transfer: Transfer) -> Result<TransferId, TransportError> {
        if let Some(missing) = transfer.missing() {
            return Err(TransportError::Rejected(format!("transfer has no {missing}")));
        }
        let Some(runtime) = &self.runtime else {
            return Err(TransportError::Closed);
        };

        let id = TransferId::new(self.next_id);
        self.next_id += 1;

        let handle = self.tasks.spawn_on(
            async move {
                let outcome = smtp_transaction::deliver(&mut transfer).await;
                (transfer, outcome)
            },
            runtime.handle(),
        );
        self.in_flight.insert(handle.id(), (id, handle));

        Ok(id)
    }

    fn timeout(&self) -> Option<Duration> {
        if self.tasks.is_empty() {
            None
        } else {
            Some(ACTIVE_POLL_SLICE)
        }
    }

    fn wait(&mut self, timeout: Duration) {
        let Some(runtime) = &self.runtime else {
            return;
        };
        if self.tasks.is_empty() {
            std::thread::sleep(timeout);
            return;
        }

        // The timer must be created inside the runtime
        let tasks = &mut self.tasks;
        let joined = runtime.block_on(async move {
            tokio::time::timeout(timeout, tasks.join_next_with_id()).await
        });
        if let Ok(Some(joined)) = joined {
            self.complete(joined);
        }
    }

    fn perform(&mut self) -> usize {
        let Some(runtime) = &self.runtime else {
            return 0;
        };
        if !self.tasks.is_empty() {
            runtime.block_on(task::yield_now());
        }

        let joined: Vec<_> = {
            let _guard = runtime.enter();
            std::iter::from_fn(|| self.tasks.try_join_next_with_id()).collect()
        };
        for result in joined {
            self.complete(result);
        }

        self.tasks.len()
    }

    fn info_read(&mut self) -> Option<Completion> {
        self.completions.pop_front()
    }

    fn remove(&mut self, id: TransferId) -> Option<Transfer> {
        if let Some(transfer) = self.finished.remove(&id) {
            return Some(transfer);
        }

        // Still running: cancel it. The task owns the transfer, so it is
        // released when the runtime drops the aborted task.
        let task = self
            .in_flight
            .iter()
            .find_map(|(task, (transfer, _))| (*transfer == id).then_some(*task))?;
        if let Some((_, handle)) = self.in_flight.remove(&task) {
            handle.abort();
        }
        None
    }
}

impl Drop for SmtpsMultiplexer {
    fn drop(&mut self) {
        self.tasks.abort_all();
        self.in_flight.clear();

        // Never blocks, so a pool may be released from any thread, async or not.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
