//! In-memory transport that counts every allocation it hands out.
//!
//! Transfers complete after a configurable number of `perform` calls. On
//! completion the payload is drained through `Payload::read_chunk` exactly as
//! a network transport would, and the result is recorded for assertions.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use herald_dispatch::{
    Completion, Multiplexer, Transfer, TransferError, TransferId, Transport, TransportError,
};
use herald_smtp::ClientError;
use parking_lot::Mutex;

/// What a completed transfer carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    pub url: String,
    pub port: u16,
    pub ca_cert_store: String,
    pub username: String,
    pub mail_from: String,
    pub recipients: Vec<String>,
    pub message: String,
    pub read_calls: usize,
}

#[derive(Debug, Default)]
pub struct Counters {
    pub global_inits: AtomicUsize,
    pub global_cleanups: AtomicUsize,
    pub allocation_attempts: AtomicUsize,
    pub multiplexers_allocated: AtomicUsize,
    pub multiplexers_released: AtomicUsize,
    pub transfers_added: AtomicUsize,
    /// Handed back through `remove` or dropped with their multiplexer
    pub transfers_released: AtomicUsize,
    pub delivered: Mutex<Vec<Delivered>>,
}

impl Counters {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn live_transfers(&self) -> usize {
        Self::get(&self.transfers_added) - Self::get(&self.transfers_released)
    }

    pub fn live_multiplexers(&self) -> usize {
        Self::get(&self.multiplexers_allocated) - Self::get(&self.multiplexers_released)
    }

    pub fn delivered(&self) -> Vec<Delivered> {
        self.delivered.lock().clone()
    }
}

#[derive(Debug, Clone)]
pub struct MockTransport {
    pub counters: Arc<Counters>,
    fail_global_init: bool,
    fail_multiplexer_at: Option<usize>,
    steps_to_complete: usize,
    fail_recipient: Option<String>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            counters: Arc::default(),
            fail_global_init: false,
            fail_multiplexer_at: None,
            steps_to_complete: 1,
            fail_recipient: None,
        }
    }

    #[must_use]
    pub fn failing_global_init(mut self) -> Self {
        self.fail_global_init = true;
        self
    }

    /// Fail the `attempt`th multiplexer allocation (0-based, counted across
    /// the transport's lifetime).
    #[must_use]
    pub fn failing_multiplexer(mut self, attempt: usize) -> Self {
        self.fail_multiplexer_at = Some(attempt);
        self
    }

    /// Number of `perform` calls a transfer takes to finish.
    #[must_use]
    pub fn completing_after(mut self, steps: usize) -> Self {
        self.steps_to_complete = steps;
        self
    }

    /// Transfers addressed to `<recipient>` finish with a 550.
    #[must_use]
    pub fn rejecting(mut self, recipient: &str) -> Self {
        self.fail_recipient = Some(format!("<{recipient}>"));
        self
    }
}

impl Transport for MockTransport {
    type Multiplexer = MockMultiplexer;

    fn global_init(&self) -> Result<(), TransportError> {
        if self.fail_global_init {
            return Err(TransportError::Unavailable("global init refused".to_string()));
        }
        self.counters.global_inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn global_cleanup(&self) {
        self.counters.global_cleanups.fetch_add(1, Ordering::SeqCst);
    }

    fn multiplexer(&self) -> Result<MockMultiplexer, TransportError> {
        let attempt = self
            .counters
            .allocation_attempts
            .fetch_add(1, Ordering::SeqCst);
        if self.fail_multiplexer_at == Some(attempt) {
            return Err(TransportError::Unavailable("no handles left".to_string()));
        }
        self.counters
            .multiplexers_allocated
            .fetch_add(1, Ordering::SeqCst);

        Ok(MockMultiplexer {
            counters: Arc::clone(&self.counters),
            steps_to_complete: self.steps_to_complete,
            fail_recipient: self.fail_recipient.clone(),
            next_id: 0,
            in_flight: Vec::new(),
            finished: HashMap::new(),
            completions: VecDeque::new(),
        })
    }
}

pub struct MockMultiplexer {
    counters: Arc<Counters>,
    steps_to_complete: usize,
    fail_recipient: Option<String>,
    next_id: u64,
    in_flight: Vec<(TransferId, Transfer, usize)>,
    finished: HashMap<TransferId, Transfer>,
    completions: VecDeque<Completion>,
}

impl MockMultiplexer {
    fn finish(&mut self, id: TransferId, mut transfer: Transfer) {
        let mut message = Vec::new();
        let mut buffer = [0u8; 7];
        let mut read_calls = 0;
        if let Some(payload) = transfer.payload_mut() {
            loop {
                read_calls += 1;
                let n = payload.read_chunk(&mut buffer);
                if n == 0 {
                    break;
                }
                message.extend_from_slice(&buffer[..n]);
            }
        }

        let options = transfer.options();
        let recipients: Vec<String> = transfer
            .recipients()
            .map(|list| list.iter().map(ToString::to_string).collect())
            .unwrap_or_default();

        let outcome = if self
            .fail_recipient
            .as_ref()
            .is_some_and(|bad| recipients.contains(bad))
        {
            Err(TransferError::Client(ClientError::Rejected {
                command: "RCPT TO",
                code: 550,
                message: "User unknown".to_string(),
            }))
        } else {
            Ok(())
        };

        self.counters.delivered.lock().push(Delivered {
            url: options.url.clone(),
            port: options.port,
            ca_cert_store: options.ca_cert_store.display().to_string(),
            username: options.username.clone(),
            mail_from: transfer.mail_from().unwrap_or_default().to_string(),
            recipients,
            message: String::from_utf8_lossy(&message).into_owned(),
            read_calls,
        });

        self.finished.insert(id, transfer);
        self.completions.push_back(Completion { id, outcome });
    }
}

impl Multiplexer for MockMultiplexer {
    fn add(&mut self, transfer: Transfer) -> Result<TransferId, TransportError> {
        if let Some(missing) = transfer.missing() {
            return Err(TransportError::Rejected(format!("transfer has no {missing}")));
        }

        let id = TransferId::new(self.next_id);
        self.next_id += 1;
        self.in_flight.push((id, transfer, self.steps_to_complete));
        self.counters.transfers_added.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    fn timeout(&self) -> Option<Duration> {
        None
    }

    fn wait(&mut self, timeout: Duration) {
        std::thread::sleep(timeout);
    }

    fn perform(&mut self) -> usize {
        let mut still_running = Vec::with_capacity(self.in_flight.len());
        for (id, transfer, steps) in std::mem::take(&mut self.in_flight) {
            if steps <= 1 {
                self.finish(id, transfer);
            } else {
                still_running.push((id, transfer, steps - 1));
            }
        }
        self.in_flight = still_running;
        self.in_flight.len()
    }

    fn info_read(&mut self) -> Option<Completion> {
        self.completions.pop_front()
    }

    fn remove(&mut self, id: TransferId) -> Option<Transfer> {
        let transfer = self.finished.remove(&id)?;
        self.counters
            .transfers_released
            .fetch_add(1, Ordering::SeqCst);
        Some(transfer)
    }
}

impl Drop for MockMultiplexer {
    fn drop(&mut self) {
        let stranded = self.in_flight.len() + self.finished.len();
        self.counters
            .transfers_released
            .fetch_add(stranded, Ordering::SeqCst);
        self.counters
            .multiplexers_released
            .fetch_add(1, Ordering::SeqCst);
    }
}
