extern crate chrono;

use crate::result::PollError;
use crate::structs::ArrivalSnapshot;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollHealth {
    pub last_success_at: Option<chrono::DateTime<chrono::Utc>>,
    pub last_failure_at: Option<chrono::DateTime<chrono::Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
}

struct StoreInner {
    latest: std::sync::RwLock<Option<std::sync::Arc<ArrivalSnapshot>>>,
    health: std::sync::Mutex<PollHealth>,
    subscribers: std::sync::Mutex<Vec<std::sync::mpsc::Sender<std::sync::Arc<ArrivalSnapshot>>>>,
}

/// Latest published snapshot plus poll health. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ResultStore {
    inner: std::sync::Arc<StoreInner>,
}

// A panicking subscriber or writer must not take the board down with it.
fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<T> {
    return mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
}

impl ResultStore {
    pub fn new() -> ResultStore {
        return ResultStore{
            inner: std::sync::Arc::new(StoreInner{
                latest: std::sync::RwLock::new(None),
                health: std::sync::Mutex::new(PollHealth::default()),
                subscribers: std::sync::Mutex::new(vec![]),
            }),
        };
    }

    pub fn latest(&self) -> Option<std::sync::Arc<ArrivalSnapshot>> {
        let latest = self.inner.latest.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        return latest.clone();
    }

    /// Replaces the current snapshot unless it comes from an older cycle.
    /// Subscribers are notified after the swap.
    pub fn publish<S: Into<std::sync::Arc<ArrivalSnapshot>>>(&self, snapshot: S) -> bool {
        let snapshot: std::sync::Arc<ArrivalSnapshot> = snapshot.into();
        {
            let mut latest = self.inner.latest.write().unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(current) = latest.as_ref() {
                if current.cycle >= snapshot.cycle {
                    warn!("Dropping snapshot from cycle {}, already have cycle {}",
                          snapshot.cycle, current.cycle);
                    return false;
                }
            }
            *latest = Some(snapshot.clone());
        }

        {
            let mut health = lock(&self.inner.health);
            health.last_success_at = Some(snapshot.fetched_at);
            health.last_error = None;
            health.consecutive_failures = 0;
        }

        let mut subscribers = lock(&self.inner.subscribers);
        subscribers.retain(|tx| tx.send(snapshot.clone()).is_ok());
        return true;
    }

    pub fn subscribe(&self) -> std::sync::mpsc::Receiver<std::sync::Arc<ArrivalSnapshot>> {
        let (tx, rx) = std::sync::mpsc::channel();
        lock(&self.inner.subscribers).push(tx);
        return rx;
    }

    pub fn record_failure(&self, at: chrono::DateTime<chrono::Utc>, error: &PollError) {
        let mut health = lock(&self.inner.health);
        health.last_failure_at = Some(at);
        health.last_error = Some(error.to_string());
        health.consecutive_failures += 1;
    }

    pub fn health(&self) -> PollHealth {
        return lock(&self.inner.health).clone();
    }
}
