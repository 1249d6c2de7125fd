//! Connection, replay and disconnect policies of a hub.

use crate::config::MulticastConfig;
use serde::Deserialize;

/// How much history a late subscriber is replayed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReplayPolicy {
    /// Items are retained only while being fanned out.
    #[default]
    None,
    /// The most recent `n` items.
    Bounded(usize),
    Unbounded,
}

/// When the hub subscribes to its upstream.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectPolicy {
    /// Right away, even with no subscribers.
    Eager,
    /// Once this many subscribers are attached.
    Threshold(usize),
    /// Only through [`MulticastHub::connect`](super::MulticastHub::connect).
    Manual,
}

impl Default for ConnectPolicy {
    fn default() -> Self {
        ConnectPolicy::Threshold(1)
    }
}

/// What happens when the last subscriber leaves.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectPolicy {
    /// Keep the upstream subscription.
    #[default]
    Never,
    /// Cancel the upstream, clear the buffer and return to `Idle`.
    OnZeroSubscribers,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HubConfig {
    pub replay: ReplayPolicy,
    pub connect: ConnectPolicy,
    pub disconnect: DisconnectPolicy,
}

impl HubConfig {
    /// No replay, connect on first subscriber, disconnect after the last.
    pub fn share() -> Self {
        Self {
            replay: ReplayPolicy::None,
            connect: ConnectPolicy::Threshold(1),
            disconnect: DisconnectPolicy::OnZeroSubscribers,
        }
    }

    /// Keep the last `history` items, connect immediately, never disconnect.
    pub fn replay(history: usize) -> Self {
        Self {
            replay: ReplayPolicy::Bounded(history),
            connect: ConnectPolicy::Eager,
            disconnect: DisconnectPolicy::Never,
        }
    }

    pub fn from_config(config: &MulticastConfig) -> Self {
        let replay = if config.replay_unbounded {
            ReplayPolicy::Unbounded
        } else {
            match config.replay_capacity {
                None | Some(0) => ReplayPolicy::None,
                Some(n) => ReplayPolicy::Bounded(n),
            }
        };
        Self {
            replay,
            connect: config.connect,
            disconnect: config.disconnect,
        }
    }
}
