//! The lifecycle controller and submission entry point.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::JoinHandle,
};

use arc_swap::ArcSwapOption;
use herald_common::{DispatchConfig, SmtpConfig, SmtpPreferences, internal, tracing};
use herald_smtp::{MessageBuilder, Payload};
use parking_lot::Mutex;

use crate::{
    error::{DispatchError, SubmissionError},
    poller::Poller,
    pool::Pool,
    stats::{DispatchStats, StatsSnapshot},
    transport::{
        Multiplexer, RecipientList, Transfer, TransferOptions, Transport, smtps::SmtpsTransport,
    },
};

/// Owns everything dispatch needs for the life of the process: the
/// configuration snapshot, the slot pool, the poller thread and the flag that
/// ties them together.
///
/// `initialize`, `reconfigure` and `shutdown` are serialized against each
/// other; `send` may be called from any number of threads at once and never
/// blocks on them.
pub struct Mailer<T: Transport> {
    transport: T,
    dispatch: DispatchConfig,
    config: ArcSwapOption<SmtpConfig>,
    pool: ArcSwapOption<Pool<T::Multiplexer>>,
    running: Arc<AtomicBool>,
    /// Poller handle; `Some` exactly while initialized
    lifecycle: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<DispatchStats>,
}

impl Mailer<SmtpsTransport> {
    /// A mailer that delivers over SMTP with implicit TLS.
    #[must_use]
    pub fn smtps(dispatch: DispatchConfig) -> Self {
        Self::new(SmtpsTransport::new(), dispatch)
    }
}

impl<T: Transport> Mailer<T> {
    #[must_use]
    pub fn new(transport: T, dispatch: DispatchConfig) -> Self {
        Self {
            transport,
            dispatch,
            config: ArcSwapOption::empty(),
            pool: ArcSwapOption::empty(),
            running: Arc::new(AtomicBool::new(false)),
            lifecycle: Mutex::new(None),
            stats: Arc::default(),
        }
    }

    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// The snapshot the next submission will use, if any has been stored.
    #[must_use]
    pub fn config(&self) -> Option<Arc<SmtpConfig>> {
        self.config.load_full()
    }

    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Validate `preferences`, allocate the pool and start the poller.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::AlreadyInitialized`] if called again before
    ///   [`Mailer::shutdown`]; nothing changes.
    /// - [`DispatchError::Config`] if a required setting is missing or the port
    ///   does not fit in 16 bits; nothing changes.
    /// - [`DispatchError::TransportInit`], [`DispatchError::MultiplexerInit`] or
    ///   [`DispatchError::PollerSpawn`] if a resource cannot be acquired;
    ///   everything acquired so far is released and the prior configuration
    ///   is restored.
    pub fn initialize(&self, preferences: &SmtpPreferences) -> Result<(), DispatchError> {
        let mut poller = self.lifecycle.lock();
        if poller.is_some() {
            tracing::warn!("Mailer initialization requested while already initialized");
            return Err(DispatchError::AlreadyInitialized);
        }

        let config = preferences.validate().inspect_err(|e| {
            tracing::error!("Refusing mail configuration: {e}");
        })?;

        self.transport
            .global_init()
            .map_err(DispatchError::TransportInit)
            .inspect_err(|e| tracing::error!("{e}"))?;

        let pool = match Pool::allocate(&self.transport, self.dispatch.pool_size) {
            Ok(pool) => Arc::new(pool),
            Err(e) => {
                tracing::error!("{e}");
                self.transport.global_cleanup();
                return Err(e);
            }
        };

        let address = config.address();
        let previous = self.config.swap(Some(Arc::new(config)));
        self.pool.store(Some(Arc::clone(&pool)));
        self.running.store(true, Ordering::Release);

        let spawned = Poller::new(
            pool,
            Arc::clone(&self.running),
            self.dispatch.default_poll_timeout(),
            Arc::clone(&self.stats),
        )
        .spawn();

        match spawned {
            Ok(handle) => {
                *poller = Some(handle);
                internal!(
                    level = INFO,
                    "Mailer initialized for {address} with {} slots",
                    self.dispatch.pool_size
                );
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::Release);
                self.pool.store(None);
                self.config.store(previous);
                self.transport.global_cleanup();

                let e = DispatchError::PollerSpawn(e);
                tracing::error!("{e}");
                Err(e)
            }
        }
    }

    /// Replace the configuration used by future submissions.
    ///
    /// Transfers already handed to a multiplexer keep the settings they were
    /// created with.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Config`] if `preferences` is invalid; the
    /// current configuration is kept.
    pub fn reconfigure(&self, preferences: &SmtpPreferences) -> Result<(), DispatchError> {
        let _lifecycle = self.lifecycle.lock();

        let config = preferences.validate().inspect_err(|e| {
            tracing::error!("Refusing mail configuration: {e}");
        })?;

        internal!(level = INFO, "Mail configuration now targets {}", config.address());
        self.config.store(Some(Arc::new(config)));
        Ok(())
    }

    /// Stop the poller and release every slot, dropping any transfer still in
    /// flight. Does nothing if not initialized.
    pub fn shutdown(&self) {
        let mut poller = self.lifecycle.lock();
        let Some(handle) = poller.take() else {
            return;
        };

        self.running.store(false, Ordering::Release);
        let pool = self.pool.swap(None);

        if handle.join().is_err() {
            tracing::error!("Poller thread panicked");
        }

        // A submitter that loaded the pool before the swap finishes its attach
        // first, so it is counted below
        if let Some(pool) = &pool {
            pool.settle();
        }

        let stranded = self.stats.snapshot().in_flight();
        if stranded > 0 {
            tracing::warn!("Dropping {stranded} undelivered mail(s) on shutdown");
        }
        drop(pool);

        self.transport.global_cleanup();
        internal!(level = INFO, "Mailer shut down");
    }

    /// Compose a message and hand it to the first free slot.
    ///
    /// Returns as soon as the transfer is attached; delivery happens on the
    /// poller thread. Nothing is reported back: the outcome only shows up in
    /// the logs and in [`Mailer::stats`]. Before initialization this is a
    /// no-op.
    pub fn send(&self, to: &str, from: &str, from_name: &str, subject: &str, body: &str) {
        if !self.running.load(Ordering::Acquire) {
            internal!(level = DEBUG, "Mailer not initialized, dropping mail to {to}");
            return;
        }
        let (Some(pool), Some(config)) = (self.pool.load_full(), self.config.load_full()) else {
            internal!(level = DEBUG, "Mailer shutting down, dropping mail to {to}");
            return;
        };

        self.stats.record_submitted();

        let transfer = match self.prepare(&config, to, from, from_name, subject, body) {
            Ok(transfer) => transfer,
            Err(e) => {
                self.stats.record_rejected();
                tracing::error!("Unable to send mail to {to:?}: {e}");
                return;
            }
        };

        self.attach(&pool, transfer, to);
    }

    fn attach(&self, pool: &Pool<T::Multiplexer>, transfer: Transfer, to: &str) {
        let mut slot = pool.lock_any();

        // Shutdown may have taken the pool after it was loaded
        if !self.running.load(Ordering::Acquire) {
            drop(slot);
            drop(transfer);
            self.stats.record_rejected();
            internal!(level = DEBUG, "Mailer shut down, dropping mail to {to}");
            return;
        }

        match slot.add(transfer) {
            Ok(id) => {
                // Counted before unlocking so the poller cannot reap it first
                self.stats.record_attached();
                drop(slot);
                tracing::trace!(transfer = %id, "Queued mail to {to}");
            }
            Err(e) => {
                drop(slot);
                self.stats.record_rejected();
                tracing::error!("Unable to send mail to {to:?}: {}", SubmissionError::Attach(e));
            }
        }
    }

    fn prepare(
        &self,
        config: &SmtpConfig,
        to: &str,
        from: &str,
        from_name: &str,
        subject: &str,
        body: &str,
    ) -> Result<Transfer, SubmissionError> {
        let recipients = RecipientList::new(to)?;

        let mut transfer = Transfer::new(TransferOptions::new(config, &self.dispatch.timeouts));
        transfer.set_mail_from(from)?;
        transfer.set_recipients(recipients);

        let message = MessageBuilder::new()
            .from(from, from_name)
            .to(to)
            .subject(subject)
            .body(body)
            .build()?;
        transfer.set_payload(Payload::new(message));
        transfer.set_upload(true);

        Ok(transfer)
    }
}

impl<T: Transport> Drop for Mailer<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
