// Client-owned table from native session ids to the handles that own them.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::core::engine::NativeId;
use crate::core::error::{Error, ErrorKind};

use super::event::StaleReason;

/// Registration epoch; a fresh value for every registration, never reused.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Generation(u64);

pub enum Resolution<T> {
    Live(Arc<T>),
    Stale(StaleReason),
}

struct Slot<T> {
    generation: Generation,
    // Engine event watermark when this slot was filled.
    since: u64,
    target: Weak<T>,
}

pub struct Registry<T> {
    slots: Mutex<HashMap<NativeId, Slot<T>>>,
    next_generation: AtomicU64,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
        }
    }
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_generation(&self) -> Generation {
        Generation(self.next_generation.fetch_add(1, Ordering::Relaxed))
    }

    /// Bind `id` to `target`. Events with a sequence below `since` predate
    /// this session and will not resolve to it.
    pub fn register(
        &self,
        id: NativeId,
        generation: Generation,
        target: &Arc<T>,
        since: u64,
    ) -> Result<(), Error> {
        let mut slots = self.lock();
        if slots.contains_key(&id) {
            return Err(Error::new(ErrorKind::DuplicateHandle)
                .with_message(format!("native id {id} is already registered")));
        }
        slots.insert(
            id,
            Slot {
                generation,
                since,
                target: Arc::downgrade(target),
            },
        );
        Ok(())
    }

    /// Plain lookup of the current owner of `id`.
    pub fn lookup(&self, id: NativeId) -> Option<Arc<T>> {
        self.lock().get(&id).and_then(|slot| slot.target.upgrade())
    }

    /// Resolve an event that arrived with `sequence` for native id `id`.
    pub fn resolve(&self, id: NativeId, sequence: u64) -> Resolution<T> {
        let slots = self.lock();
        let Some(slot) = slots.get(&id) else {
            return Resolution::Stale(StaleReason::Unregistered);
        };
        if sequence < slot.since {
            return Resolution::Stale(StaleReason::Superseded);
        }
        match slot.target.upgrade() {
            Some(target) => Resolution::Live(target),
            None => Resolution::Stale(StaleReason::Released),
        }
    }

    /// Remove the slot for `id` if it still belongs to `generation`.
    pub fn unregister(&self, id: NativeId, generation: Generation) -> bool {
        let mut slots = self.lock();
        match slots.get(&id) {
            Some(slot) if slot.generation == generation => {
                slots.remove(&id);
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<NativeId, Slot<T>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
