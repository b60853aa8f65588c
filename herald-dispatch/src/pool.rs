//! Fixed set of independently locked multiplexers.

use std::num::NonZeroUsize;

use herald_common::internal;
use parking_lot::{Mutex, MutexGuard};

use crate::{
    error::DispatchError,
    transport::{Multiplexer, Transport},
};

/// `N` slots, each a multiplexer behind its own mutex. Submitters and the
/// poller only ever hold one slot at a time.
pub struct Pool<M> {
    slots: Box<[Mutex<M>]>,
}

impl<M: Multiplexer> Pool<M> {
    /// Allocate `size` multiplexers from `transport`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::MultiplexerInit`] naming the first slot that
    /// failed. Slots allocated before it are released first.
    pub fn allocate<T>(transport: &T, size: NonZeroUsize) -> Result<Self, DispatchError>
    where
        T: Transport<Multiplexer = M>,
    {
        let slots = (0..size.get())
            .map(|slot| {
                transport
                    .multiplexer()
                    .map(Mutex::new)
                    .map_err(|source| DispatchError::MultiplexerInit { slot, source })
            })
            .collect::<Result<Box<[_]>, _>>()?;

        internal!(level = DEBUG, "Allocated {} multiplexer slots", slots.len());
        Ok(Self { slots })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Lock slot `index` if nobody else holds it.
    #[must_use]
    pub fn try_lock(&self, index: usize) -> Option<MutexGuard<'_, M>> {
        self.slots.get(index)?.try_lock()
    }

    /// Lock whichever slot frees up first, spinning until one does.
    ///
    /// Never waits on the network: the poller holds a slot only for one
    /// bounded wait-and-perform step.
    pub fn lock_any(&self) -> MutexGuard<'_, M> {
        loop {
            if let Some(guard) = self.slots.iter().find_map(|slot| slot.try_lock()) {
                return guard;
            }
            std::hint::spin_loop();
        }
    }

    /// Lock and release every slot in turn, waiting out any current holder.
    pub fn settle(&self) {
        for slot in &*self.slots {
            drop(slot.lock());
        }
    }
}
