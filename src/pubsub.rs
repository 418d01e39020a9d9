/*!
 * Pub/Sub registry: channel→subscribers and pattern→subscribers maps,
 * mirrored by each session's own subscription sets. PUBLISH routing hits
 * exact channels first, then glob patterns.
 */

use crate::glob::glob_match;
use crate::value::BytesMap;
use hashbrown::HashSet;

#[derive(Default)]
pub struct PubSub {
    channels: BytesMap<HashSet<u64>>,
    patterns: BytesMap<HashSet<u64>>,
}

impl PubSub {
    pub fn new() -> PubSub {
        PubSub::default()
    }

    /// Returns true when this is a new subscription for the client.
    pub fn subscribe(&mut self, channel: &[u8], client: u64) -> bool {
        self.channels.entry(channel.to_vec()).or_default().insert(client)
    }

    pub fn unsubscribe(&mut self, channel: &[u8], client: u64) -> bool {
        match self.channels.get_mut(channel) {
            Some(set) => {
                let removed = set.remove(&client);
                if set.is_empty() {
                    self.channels.remove(channel);
                }
                removed
            }
            None => false,
        }
    }

    pub fn psubscribe(&mut self, pattern: &[u8], client: u64) -> bool {
        self.patterns.entry(pattern.to_vec()).or_default().insert(client)
    }

    pub fn punsubscribe(&mut self, pattern: &[u8], client: u64) -> bool {
        match self.patterns.get_mut(pattern) {
            Some(set) => {
                let removed = set.remove(&client);
                if set.is_empty() {
                    self.patterns.remove(pattern);
                }
                removed
            }
            None => false,
        }
    }

    /// Receivers of a message: exact-channel subscribers first, then each
    /// matching pattern's subscribers with the pattern that matched.
    pub fn receivers(&self, channel: &[u8]) -> Vec<(u64, Option<Vec<u8>>)> {
        let mut out = Vec::new();
        if let Some(subs) = self.channels.get(channel) {
            let mut ids: Vec<u64> = subs.iter().copied().collect();
            ids.sort_unstable();
            out.extend(ids.into_iter().map(|id| (id, None)));
        }
        let mut pats: Vec<&Vec<u8>> = self
            .patterns
            .keys()
            .filter(|p| glob_match(p, channel))
            .collect();
        pats.sort();
        for p in pats {
            let mut ids: Vec<u64> = self.patterns[p].iter().copied().collect();
            ids.sort_unstable();
            out.extend(ids.into_iter().map(|id| (id, Some(p.clone()))));
        }
        out
    }

    /// PUBSUB CHANNELS: active channels, optionally filtered by pattern.
    pub fn active_channels(&self, pattern: Option<&[u8]>) -> Vec<Vec<u8>> {
        let mut out: Vec<Vec<u8>> = self
            .channels
            .keys()
            .filter(|c| pattern.map(|p| glob_match(p, c)).unwrap_or(true))
            .cloned()
            .collect();
        out.sort();
        out
    }

    pub fn subscriber_count(&self, channel: &[u8]) -> usize {
        self.channels.get(channel).map(|s| s.len()).unwrap_or(0)
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// Remove every registration of a disconnecting client.
    pub fn drop_client(&mut self, client: u64) {
        self.channels.retain(|_, set| {
            set.remove(&client);
            !set.is_empty()
        });
        self.patterns.retain(|_, set| {
            set.remove(&client);
            !set.is_empty()
        });
    }
}
