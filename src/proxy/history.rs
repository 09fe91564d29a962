use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::proxy::mappers::gemini::Content;

/// In-memory conversation history keyed by user id.
///
/// Every user owns a separate async lock. [`HistoryStore::lock`] hands it
/// out for a whole round trip, so concurrent requests from the same user
/// are serialized while different users never contend. History lives for
/// the lifetime of the process and is not shared between instances.
pub struct HistoryStore {
    histories: DashMap<String, Arc<Mutex<Vec<Content>>>>,
    max_turns: Option<usize>,
}

/// Exclusive access to one user's history.
pub struct UserHistory {
    guard: OwnedMutexGuard<Vec<Content>>,
    max_turns: Option<usize>,
}

impl UserHistory {
    pub fn turns(&self) -> &[Content] {
        &self.guard
    }

    /// Overwrites the stored history.
    pub fn replace(&mut self, mut turns: Vec<Content>) {
        truncate_oldest(&mut turns, self.max_turns);
        *self.guard = turns;
    }
}

impl HistoryStore {
    /// `max_turns = None` keeps every turn.
    pub fn new(max_turns: Option<usize>) -> Self {
        Self {
            histories: DashMap::new(),
            max_turns,
        }
    }

    fn slot(&self, user_id: &str) -> Arc<Mutex<Vec<Content>>> {
        // Clone the Arc out so the shard lock is released before awaiting.
        self.histories
            .entry(user_id.to_string())
            .or_default()
            .value()
            .clone()
    }

    /// Locks a user's history, waiting for any in-flight request of the same user.
    pub async fn lock(&self, user_id: &str) -> UserHistory {
        let guard = self.slot(user_id).lock_owned().await;
        UserHistory {
            guard,
            max_turns: self.max_turns,
        }
    }

    /// Snapshot of a user's turns; empty if the user has none.
    pub async fn get(&self, user_id: &str) -> Vec<Content> {
        let slot = match self.histories.get(user_id) {
            Some(entry) => entry.value().clone(),
            None => return Vec::new(),
        };
        let turns = slot.lock().await;
        turns.clone()
    }

    /// Unlocks a user's history. A slot that is still empty and that no
    /// other request is waiting on is removed, so a failed first round trip
    /// leaves no entry behind.
    pub fn release(&self, user_id: &str, history: UserHistory) {
        drop(history);
        self.histories.remove_if(user_id, |_, slot| {
            Arc::strong_count(slot) == 1
                && slot.try_lock().map(|turns| turns.is_empty()).unwrap_or(false)
        });
    }

    /// Overwrites a user's history.
    pub async fn put(&self, user_id: &str, turns: Vec<Content>) {
        let mut history = self.lock(user_id).await;
        history.replace(turns);
        self.release(user_id, history);
    }

    pub fn is_empty(&self) -> bool {
        self.histories.is_empty()
    }
}

/// Drops the oldest turns beyond `max_turns`, in whole user/model pairs so the
/// stored conversation still starts with a user turn.
fn truncate_oldest(turns: &mut Vec<Content>, max_turns: Option<usize>) {
    let Some(max) = max_turns else {
        return;
    };
    if turns.len() <= max {
        return;
    }
    let mut excess = turns.len() - max;
    if excess % 2 == 1 {
        excess += 1;
    }
    let excess = excess.min(turns.len());
    turns.drain(..excess);
    tracing::debug!("History capped: dropped {} oldest turns", excess);
}
