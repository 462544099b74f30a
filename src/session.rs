//! Registry of active matches.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, info, instrument};

use crate::games::tictactoe::{Match, MatchId, MatchPhase, MatchView};

/// Owns every active match by identifier.
///
/// Each match sits behind its own mutex. [`with_match`](Self::with_match)
/// holds that mutex for the whole closure, so two submissions for the same
/// match are applied one after the other and the second sees the first's
/// result. The registry map is only locked for lookups and never while a
/// match lock is being acquired.
#[derive(Debug)]
pub struct MatchRegistry {
    next_id: AtomicU64,
    matches: Mutex<HashMap<MatchId, Arc<Mutex<Match>>>>,
}

impl MatchRegistry {
    /// Creates an empty registry; identifiers start at 1.
    #[instrument]
    pub fn new() -> Self {
        info!("Creating match registry");
        Self {
            next_id: AtomicU64::new(1),
            matches: Mutex::new(HashMap::new()),
        }
    }

    /// Reserves a fresh identifier.
    pub fn next_id(&self) -> MatchId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Makes sure future identifiers are greater than `id`.
    pub fn advance_past(&self, id: MatchId) {
        let previous = self.next_id.fetch_max(id.saturating_add(1), Ordering::Relaxed);
        debug!(previous, id, "Identifier floor raised");
    }

    /// Registers a match under its own identifier.
    #[instrument(skip(self, game), fields(match_id = game.id()))]
    pub fn insert(&self, game: Match) -> MatchView {
        let view = game.view();
        self.matches
            .lock()
            .insert(game.id(), Arc::new(Mutex::new(game)));
        debug!("Match registered");
        view
    }

    /// Runs `f` with exclusive access to match `id`.
    ///
    /// Returns `None` if the match is unknown or was removed while the
    /// caller waited for the lock.
    #[instrument(skip(self, f))]
    pub fn with_match<T>(&self, id: MatchId, f: impl FnOnce(&mut Match) -> T) -> Option<T> {
        let slot = self.matches.lock().get(&id).cloned();
        let Some(slot) = slot else {
            debug!("Match not found");
            return None;
        };

        let mut game = slot.lock();
        if !self.contains(id) {
            debug!("Match removed while waiting");
            return None;
        }
        Some(f(&mut game))
    }

    /// Snapshot of match `id`.
    pub fn view(&self, id: MatchId) -> Option<MatchView> {
        self.with_match(id, |game| game.view())
    }

    /// Evicts match `id`. Afterwards the identifier is invalid.
    #[instrument(skip(self))]
    pub fn remove(&self, id: MatchId) -> bool {
        let removed = self.matches.lock().remove(&id).is_some();
        if removed {
            info!("Match evicted");
        }
        removed
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: MatchId) -> bool {
        self.matches.lock().contains_key(&id)
    }

    /// Matches waiting for a second player, by identifier.
    #[instrument(skip(self))]
    pub fn open_matches(&self) -> Vec<MatchView> {
        let slots: Vec<Arc<Mutex<Match>>> = self.matches.lock().values().cloned().collect();
        let mut open: Vec<MatchView> = slots
            .iter()
            .map(|slot| slot.lock().view())
            .filter(|view| view.phase == MatchPhase::WaitingForSecondPlayer)
            .collect();
        open.sort_by_key(|view| view.id);
        debug!(count = open.len(), "Open matches listed");
        open
    }

    /// Number of registered matches.
    pub fn len(&self) -> usize {
        self.matches.lock().len()
    }

    /// Whether no match is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}
