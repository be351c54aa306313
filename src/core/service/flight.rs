//! Single-flight deduplication of concurrent requests for the same hash.

use crate::core::hasher::ContentHash;
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

enum Slot<T> {
    Pending,
    Done(T),
    /// The leader unwound without publishing; waiters start over
    Abandoned,
}

struct Flight<T> {
    slot: Mutex<Slot<T>>,
    ready: Condvar,
}

impl<T: Clone> Flight<T> {
    fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::Pending),
            ready: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait(&self) -> Option<T> {
        let mut slot = self.lock();
        loop {
            match &*slot {
                Slot::Pending => {
                    slot = self
                        .ready
                        .wait(slot)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Slot::Done(value) => return Some(value.clone()),
                Slot::Abandoned => return None,
            }
        }
    }

    fn finish(&self, next: Slot<T>) {
        let mut slot = self.lock();
        if matches!(*slot, Slot::Pending) {
            *slot = next;
        }
        self.ready.notify_all();
    }
}

/// How a caller got its value
#[derive(Debug)]
pub(crate) enum Outcome<T> {
    /// This caller ran the operation
    Led(T),
    /// Another caller ran it; this one waited for the result
    Shared(T),
}

/// Map of in-progress operations keyed by content hash
///
/// The first caller for a hash runs the operation; callers arriving while
/// it runs block and receive a clone of its result. Entries are removed
/// as soon as the leader finishes, so later callers start fresh (and
/// normally hit the cache).
pub(crate) struct SingleFlight<T> {
    flights: Mutex<HashMap<ContentHash, Arc<Flight<T>>>>,
}

enum Role<T> {
    Leader(Arc<Flight<T>>),
    Follower(Arc<Flight<T>>),
}

impl<T: Clone> SingleFlight<T> {
    pub(crate) fn new() -> Self {
        Self {
            flights: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ContentHash, Arc<Flight<T>>>> {
        self.flights.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn join(&self, key: ContentHash) -> Role<T> {
        let mut flights = self.lock();
        match flights.get(&key) {
            Some(flight) => Role::Follower(Arc::clone(flight)),
            None => {
                let flight = Arc::new(Flight::new());
                flights.insert(key, Arc::clone(&flight));
                Role::Leader(flight)
            }
        }
    }

    /// Run `op` for `key` unless another caller is already running it
    ///
    /// `on_join` is called each time this caller starts waiting on
    /// someone else's flight.
    pub(crate) fn run(
        &self,
        key: ContentHash,
        mut on_join: impl FnMut(),
        op: impl FnOnce() -> T,
    ) -> Outcome<T> {
        let flight = loop {
            match self.join(key) {
                Role::Leader(flight) => break flight,
                Role::Follower(flight) => {
                    on_join();
                    if let Some(value) = flight.wait() {
                        return Outcome::Shared(value);
                    }
                }
            }
        };

        let guard = LeaderGuard {
            owner: self,
            key,
            flight,
        };
        let value = op();
        guard.flight.finish(Slot::Done(value.clone()));
        Outcome::Led(value)
    }

    /// Number of operations currently in progress
    #[cfg(test)]
    pub(crate) fn in_flight(&self) -> usize {
        self.lock().len()
    }
}

/// Removes the leader's entry on every exit path, including unwinding
struct LeaderGuard<'a, T: Clone> {
    owner: &'a SingleFlight<T>,
    key: ContentHash,
    flight: Arc<Flight<T>>,
}

impl<T: Clone> Drop for LeaderGuard<'_, T> {
    fn drop(&mut self) {
        self.owner.lock().remove(&self.key);
        self.flight.finish(Slot::Abandoned);
    }
}
