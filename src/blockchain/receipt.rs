//! Identifier extraction from emitted logs.
//!
//! The preferred path matches `topics[0]` against the selector of a named ABI
//! event and reads a named indexed field. When no ABI event matches, a
//! last-resort topic scan is used and reported as [`Strategy::Heuristic`] so
//! callers can surface how the value was obtained.

use alloy::json_abi::JsonAbi;
use alloy::primitives::{Address, B256, U256};
use serde::Serialize;

use crate::blockchain::types::LogView;

/// Request ids are small positive integers; anything at or above this bound
/// is treated as a hash rather than an id.
const MAX_HEURISTIC_ID: u64 = 1_000_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Decoded from a named event field.
    Event,
    /// Guessed from raw topics.
    Heuristic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Extracted<T> {
    pub value: T,
    pub strategy: Strategy,
}

/// Which event carries the identifier.
#[derive(Debug, Clone, Copy)]
pub struct EventField<'a> {
    pub abi: Option<&'a JsonAbi>,
    pub event: &'a str,
    pub field: &'a str,
    /// Only logs emitted by this contract are considered when set.
    pub emitter: Option<Address>,
}

impl EventField<'_> {
    fn accepts(&self, log: &LogView) -> bool {
        self.emitter.is_none_or(|addr| log.address == addr)
    }

    /// Topic of the named indexed field in the first matching event log.
    fn decode(&self, logs: &[LogView]) -> Option<B256> {
        let events = self.abi?.event(self.event)?;
        for event in events.iter().filter(|e| !e.anonymous) {
            let Some(position) = event
                .inputs
                .iter()
                .filter(|p| p.indexed)
                .position(|p| p.name == self.field)
            else {
                continue;
            };
            let selector = event.selector();
            let hit = logs
                .iter()
                .filter(|log| self.accepts(log))
                .find(|log| log.topics.first() == Some(&selector))
                .and_then(|log| log.topics.get(position + 1).copied());
            if hit.is_some() {
                return hit;
            }
        }
        None
    }
}

/// Small positive integer identifier, e.g. a request id.
pub fn extract_identifier(logs: &[LogView], wanted: EventField<'_>) -> Option<Extracted<u64>> {
    if let Some(topic) = wanted.decode(logs) {
        if let Some(value) = topic_as_u64(&topic) {
            return Some(Extracted {
                value,
                strategy: Strategy::Event,
            });
        }
    }

    // topics[1] of any log is the usual slot for a leading indexed id.
    let second = logs
        .iter()
        .filter(|log| wanted.accepts(log) && log.topics.len() >= 2)
        .filter_map(|log| small_id(&log.topics[1]))
        .next();
    let any = || {
        logs.iter()
            .filter(|log| wanted.accepts(log))
            .flat_map(|log| log.topics.iter())
            .find_map(small_id)
    };
    second.or_else(any).map(|value| {
        tracing::warn!(event = wanted.event, value, "Identifier taken from a raw topic scan");
        Extracted {
            value,
            strategy: Strategy::Heuristic,
        }
    })
}

/// A bytes32 indexed value, e.g. a dataset fingerprint.
pub fn extract_indexed_topic(logs: &[LogView], wanted: EventField<'_>) -> Option<Extracted<B256>> {
    if let Some(value) = wanted.decode(logs) {
        return Some(Extracted {
            value,
            strategy: Strategy::Event,
        });
    }

    logs.iter()
        .filter(|log| wanted.accepts(log) && log.topics.len() >= 4)
        .map(|log| log.topics[3])
        .next()
        .map(|value| {
            tracing::warn!(event = wanted.event, "Indexed value taken from topics[3] of the first matching log");
            Extracted {
                value,
                strategy: Strategy::Heuristic,
            }
        })
}

fn topic_as_u64(topic: &B256) -> Option<u64> {
    u64::try_from(U256::from_be_bytes(topic.0)).ok()
}

fn small_id(topic: &B256) -> Option<u64> {
    topic_as_u64(topic).filter(|v| *v > 0 && *v < MAX_HEURISTIC_ID)
}
