use std::collections::{HashMap, HashSet};
use std::fmt;

use futures::future::{BoxFuture, FutureExt, Shared};

use crate::domain::{ChainId, TabId};

/// Outcome of an active chain probe. Failures are plain strings so that the outcome can be
/// cloned to every caller sharing the probe.
pub type ProbeOutcome = Result<Option<ChainId>, String>;

pub type SharedProbe = Shared<BoxFuture<'static, ProbeOutcome>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProbeId(u64);

struct PendingProbe {
    id: ProbeId,
    probe: SharedProbe,
}

impl fmt::Debug for PendingProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingProbe").field("id", &self.id).finish()
    }
}

/// What the background context knows about JSON-RPC endpoints used by pages.
///
/// A URL with a confirmed chain never also has a pending probe: [`confirm`] drops the
/// pending entry. The first confirmed chain for a URL wins and is never overwritten.
///
/// [`confirm`]: NetworkTrackingState::confirm
#[derive(Debug, Default)]
pub struct NetworkTrackingState {
    chain_id_by_rpc_url: HashMap<String, ChainId>,
    pending_probes: HashMap<String, PendingProbe>,
    rpc_urls_by_tab_id: HashMap<TabId, HashSet<String>>,
    tracked_tabs: HashSet<TabId>,
    next_probe_id: u64,
}

impl NetworkTrackingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chain_id_of(&self, url: &str) -> Option<ChainId> {
        self.chain_id_by_rpc_url.get(url).copied()
    }

    pub fn is_confirmed(&self, url: &str) -> bool {
        self.chain_id_by_rpc_url.contains_key(url)
    }

    pub fn has_pending_probe(&self, url: &str) -> bool {
        self.pending_probes.contains_key(url)
    }

    /// Returns the in-flight probe for `url`, starting one with `start` if there is none.
    /// `start` is only called when no probe is outstanding.
    pub fn probe_or_start<F>(&mut self, url: &str, start: F) -> (ProbeId, SharedProbe)
    where
        F: FnOnce() -> BoxFuture<'static, ProbeOutcome>,
    {
        if let Some(pending) = self.pending_probes.get(url) {
            return (pending.id, pending.probe.clone());
        }
        let id = ProbeId(self.next_probe_id);
        self.next_probe_id += 1;
        let probe = start().shared();
        self.pending_probes.insert(
            url.to_owned(),
            PendingProbe {
                id,
                probe: probe.clone(),
            },
        );
        (id, probe)
    }

    /// Drops the pending entry for `url` if it still belongs to probe `id`, so a later
    /// detection can retry. Returns whether an entry was removed.
    pub fn evict_probe(&mut self, url: &str, id: ProbeId) -> bool {
        match self.pending_probes.get(url) {
            Some(pending) if pending.id == id => {
                self.pending_probes.remove(url);
                true
            }
            _ => false,
        }
    }

    /// Records `chain_id` for `url` unless a chain is already known. Returns whether this
    /// call set the mapping.
    pub fn confirm(&mut self, url: &str, chain_id: ChainId) -> bool {
        if self.chain_id_by_rpc_url.contains_key(url) {
            return false;
        }
        self.chain_id_by_rpc_url.insert(url.to_owned(), chain_id);
        self.pending_probes.remove(url);
        true
    }

    pub fn track_rpc_url(&mut self, tab_id: TabId, url: &str) {
        self.rpc_urls_by_tab_id
            .entry(tab_id)
            .or_default()
            .insert(url.to_owned());
    }

    pub fn rpc_urls_for_tab(&self, tab_id: TabId) -> Vec<String> {
        let mut urls: Vec<String> = self
            .rpc_urls_by_tab_id
            .get(&tab_id)
            .map(|urls| urls.iter().cloned().collect())
            .unwrap_or_default();
        urls.sort();
        urls
    }

    pub fn track_tab(&mut self, tab_id: TabId) -> bool {
        self.tracked_tabs.insert(tab_id)
    }

    /// Forgets a tab, e.g. because it was closed. Confirmed URL chains are kept since they
    /// do not depend on the tab.
    pub fn untrack_tab(&mut self, tab_id: TabId) -> bool {
        self.rpc_urls_by_tab_id.remove(&tab_id);
        self.tracked_tabs.remove(&tab_id)
    }

    pub fn is_tracked(&self, tab_id: TabId) -> bool {
        self.tracked_tabs.contains(&tab_id)
    }

    pub fn tracked_tabs(&self) -> impl Iterator<Item = TabId> + '_ {
        self.tracked_tabs.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use futures::future;

    use super::*;

    fn chain(id: u64) -> ChainId {
        ChainId::new(id).expect("non-zero chain id")
    }

    #[test]
    fn confirm_is_single_writer_wins_and_clears_pending() {
        let mut state = NetworkTrackingState::new();
        let url = "https://rpc.example.org";
        state.probe_or_start(url, || future::ready(Ok(Some(chain(1)))).boxed());
        assert!(state.has_pending_probe(url));

        assert!(state.confirm(url, chain(100)));
        assert!(!state.has_pending_probe(url));
        assert!(!state.confirm(url, chain(1)));
        assert_eq!(state.chain_id_of(url), Some(chain(100)));
    }

    #[test]
    fn concurrent_starts_share_one_probe() {
        let mut state = NetworkTrackingState::new();
        let url = "https://rpc.example.org";
        let mut started = 0;
        let (first, _) = state.probe_or_start(url, || {
            started += 1;
            future::pending().boxed()
        });
        let (second, _) = state.probe_or_start(url, || {
            started += 1;
            future::pending().boxed()
        });
        assert_eq!(first, second);
        assert_eq!(started, 1);
    }

    #[test]
    fn stale_eviction_keeps_newer_probe() {
        let mut state = NetworkTrackingState::new();
        let url = "https://rpc.example.org";
        let (old, _) = state.probe_or_start(url, || future::pending().boxed());
        assert!(state.evict_probe(url, old));

        let (new, _) = state.probe_or_start(url, || future::pending().boxed());
        assert_ne!(old, new);
        assert!(!state.evict_probe(url, old));
        assert!(state.has_pending_probe(url));
    }

    #[test]
    fn untracking_a_tab_drops_its_urls_but_keeps_chains() {
        let mut state = NetworkTrackingState::new();
        let tab = TabId(7);
        assert!(state.track_tab(tab));
        state.confirm("https://a.example", chain(10));
        state.track_rpc_url(tab, "https://b.example");
        state.track_rpc_url(tab, "https://a.example");

        assert_eq!(
            state.rpc_urls_for_tab(tab),
            vec!["https://a.example".to_owned(), "https://b.example".to_owned()]
        );
        assert!(state.untrack_tab(tab));
        assert!(!state.is_tracked(tab));
        assert!(state.rpc_urls_for_tab(tab).is_empty());
        assert_eq!(state.chain_id_of("https://a.example"), Some(chain(10)));
    }
}
