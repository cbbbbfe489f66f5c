//! Tiered TTL cache with stale-if-error and single-flight refresh.
//!
//! Each [`CacheTier`] maps a normalized key to the last good [`CacheEntry`].
//! A refresh runs as a spawned task; every caller that finds the key missing or
//! stale while that task is pending awaits the same shared future, so one key
//! never has two upstream refreshes in flight.
//!
//! Every refresh draws a ticket from a per-tier counter. A result is only
//! committed if no newer ticket has committed for the key and its timestamp
//! does not move `stored_at` backward; otherwise it is dropped.

use chrono::{DateTime, Duration, Utc};
use common::CacheConfig;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::model::{Article, BriefedArticle, WeatherReport};

/// A cached value and the moment it was stored. Replaced wholesale, never mutated.
#[derive(Debug)]
pub struct CacheEntry<T> {
    pub value: T,
    pub stored_at: DateTime<Utc>,
}

/// How a served value relates to its tier's TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    /// Within TTL, no upstream call made.
    Fresh,
    /// Produced by the refresh this request waited on.
    Refreshed,
    /// The refresh failed; this is the previous entry.
    Stale,
}

#[derive(Debug)]
pub struct Served<T> {
    pub entry: Arc<CacheEntry<T>>,
    pub freshness: Freshness,
}

impl<T> Clone for Served<T> {
    fn clone(&self) -> Self {
        Self {
            entry: self.entry.clone(),
            freshness: self.freshness,
        }
    }
}

enum RefreshOutcome<T> {
    Committed(Arc<CacheEntry<T>>),
    /// A newer refresh already committed; carries the entry that won.
    Superseded(Arc<CacheEntry<T>>),
    Failed {
        previous: Option<Arc<CacheEntry<T>>>,
        error: Arc<Error>,
    },
}

impl<T> Clone for RefreshOutcome<T> {
    fn clone(&self) -> Self {
        match self {
            RefreshOutcome::Committed(e) => RefreshOutcome::Committed(e.clone()),
            RefreshOutcome::Superseded(e) => RefreshOutcome::Superseded(e.clone()),
            RefreshOutcome::Failed { previous, error } => RefreshOutcome::Failed {
                previous: previous.clone(),
                error: error.clone(),
            },
        }
    }
}

type PendingRefresh<T> = Shared<BoxFuture<'static, RefreshOutcome<T>>>;

struct Slot<T> {
    entry: Option<Arc<CacheEntry<T>>>,
    committed_ticket: u64,
    pending: Option<(u64, PendingRefresh<T>)>,
    last_access: u64,
}

impl<T> Slot<T> {
    fn new() -> Self {
        Self {
            entry: None,
            committed_ticket: 0,
            pending: None,
            last_access: 0,
        }
    }
}

struct Slots<T> {
    map: HashMap<String, Slot<T>>,
    accesses: u64,
}

impl<T> Slots<T> {
    /// Slot for `key`, created on demand; evicts least recently used idle slots past
    /// `capacity`. Slots with a pending refresh are never evicted, so the tier may
    /// stay over capacity until they settle.
    fn slot_mut(&mut self, tier: &str, key: &str, capacity: Option<usize>) -> &mut Slot<T> {
        self.accesses += 1;
        if let Some(capacity) = capacity {
            while !self.map.contains_key(key) && self.map.len() >= capacity {
                let oldest = self
                    .map
                    .iter()
                    .filter(|(_, slot)| slot.pending.is_none())
                    .min_by_key(|(_, slot)| slot.last_access)
                    .map(|(k, _)| k.clone());
                match oldest {
                    Some(oldest) => {
                        debug!(tier, key = %oldest, "evicting least recently used key");
                        self.map.remove(&oldest);
                    }
                    None => {
                        debug!(tier, len = self.map.len(), capacity, "every slot is refreshing, over capacity");
                        break;
                    }
                }
            }
        }
        let slot = self.map.entry(key.to_string()).or_insert_with(Slot::new);
        slot.last_access = self.accesses;
        slot
    }
}

struct Inner<T> {
    name: &'static str,
    ttl: Duration,
    capacity: Option<usize>,
    clock: Arc<dyn Clock>,
    tickets: AtomicU64,
    slots: Mutex<Slots<T>>,
}

impl<T: Send + Sync + 'static> Inner<T> {
    fn lock(&self) -> MutexGuard<'_, Slots<T>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_fresh(&self, entry: &CacheEntry<T>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(entry.stored_at) < self.ttl
    }

    fn commit(&self, key: &str, ticket: u64, result: Result<T>) -> RefreshOutcome<T> {
        let now = self.clock.now();
        let mut slots = self.lock();
        let slot = match slots.map.get_mut(key) {
            Some(slot) => slot,
            None => {
                // pending slots are never evicted, so only an unknown ticket lands here
                debug!(tier = self.name, key, ticket, "no slot for refresh, result not stored");
                return match result {
                    Ok(value) => RefreshOutcome::Committed(Arc::new(CacheEntry { value, stored_at: now })),
                    Err(error) => RefreshOutcome::Failed {
                        previous: None,
                        error: Arc::new(error),
                    },
                };
            }
        };
        if matches!(slot.pending, Some((pending, _)) if pending == ticket) {
            slot.pending = None;
        }

        match result {
            Ok(value) => {
                let committed_ticket = slot.committed_ticket;
                let winner = slot
                    .entry
                    .clone()
                    .filter(|current| committed_ticket > ticket || current.stored_at > now);
                if let Some(winner) = winner {
                    debug!(tier = self.name, key, ticket, committed_ticket, "discarding superseded refresh");
                    return RefreshOutcome::Superseded(winner);
                }

                let entry = Arc::new(CacheEntry { value, stored_at: now });
                slot.entry = Some(entry.clone());
                slot.committed_ticket = ticket;
                debug!(tier = self.name, key, ticket, "refresh committed");
                RefreshOutcome::Committed(entry)
            }
            Err(error) => {
                let previous = slot.entry.clone();
                if previous.is_none() && slot.pending.is_none() {
                    slots.map.remove(key);
                }
                warn!(
                    tier = self.name,
                    key,
                    error = %error,
                    serving_stale = previous.is_some(),
                    "refresh failed"
                );
                RefreshOutcome::Failed {
                    previous,
                    error: Arc::new(error),
                }
            }
        }
    }

    /// The refresh task panicked or was cancelled: clear it so the next access retries.
    fn abandon(&self, key: &str, ticket: u64, reason: String) -> RefreshOutcome<T> {
        let mut slots = self.lock();
        let mut drop_slot = false;
        let previous = match slots.map.get_mut(key) {
            Some(slot) => {
                if matches!(slot.pending, Some((pending, _)) if pending == ticket) {
                    slot.pending = None;
                }
                drop_slot = slot.entry.is_none() && slot.pending.is_none();
                slot.entry.clone()
            }
            None => None,
        };
        if drop_slot {
            slots.map.remove(key);
        }
        warn!(tier = self.name, key, %reason, "refresh task abandoned");
        RefreshOutcome::Failed {
            previous,
            error: Arc::new(Error::RefreshAborted {
                key: key.to_string(),
                reason,
            }),
        }
    }
}

enum Step<T> {
    Hit(Arc<CacheEntry<T>>),
    Wait(PendingRefresh<T>),
}

/// One TTL tier of the cache. Cheap to clone; clones share state.
pub struct CacheTier<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for CacheTier<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Send + Sync + 'static> CacheTier<T> {
    pub fn new(name: &'static str, ttl: Duration, capacity: Option<usize>, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name,
                ttl,
                capacity,
                clock,
                tickets: AtomicU64::new(0),
                slots: Mutex::new(Slots {
                    map: HashMap::new(),
                    accesses: 0,
                }),
            }),
        }
    }

    /// Current entry for `key` and whether it is still within TTL.
    pub fn get(&self, key: &str) -> Option<(Arc<CacheEntry<T>>, bool)> {
        let key = normalize_key(key);
        let now = self.inner.clock.now();
        let mut guard = self.inner.lock();
        let slots = &mut *guard;
        slots.accesses += 1;
        let slot = slots.map.get_mut(&key)?;
        let entry = slot.entry.clone()?;
        slot.last_access = slots.accesses;
        let fresh = self.inner.is_fresh(&entry, now);
        Some((entry, fresh))
    }

    /// Serve a fresh entry without calling upstream, otherwise [`refresh`](Self::refresh).
    pub async fn get_or_refresh<F, Fut>(&self, key: &str, producer: F) -> std::result::Result<Served<T>, Arc<Error>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let key = normalize_key(key);
        let step = {
            let now = self.inner.clock.now();
            let mut slots = self.inner.lock();
            let slot = slots.slot_mut(self.inner.name, &key, self.inner.capacity);
            match slot.entry.clone().filter(|e| self.inner.is_fresh(e, now)) {
                Some(entry) => Step::Hit(entry),
                None => Step::Wait(self.join_or_start(slot, &key, producer)),
            }
        };

        match step {
            Step::Hit(entry) => Ok(Served {
                entry,
                freshness: Freshness::Fresh,
            }),
            Step::Wait(pending) => settle(pending.await),
        }
    }

    /// Join the pending refresh for `key` or start one with `producer`.
    ///
    /// On success the entry is replaced and stamped with the current time. On
    /// failure the previous entry, if any, is served unchanged; with no
    /// previous entry the producer's error is returned.
    pub async fn refresh<F, Fut>(&self, key: &str, producer: F) -> std::result::Result<Served<T>, Arc<Error>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let key = normalize_key(key);
        let pending = {
            let mut slots = self.inner.lock();
            let slot = slots.slot_mut(self.inner.name, &key, self.inner.capacity);
            self.join_or_start(slot, &key, producer)
        };
        settle(pending.await)
    }

    /// Number of keys holding an entry.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .map
            .values()
            .filter(|slot| slot.entry.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn join_or_start<F, Fut>(&self, slot: &mut Slot<T>, key: &str, producer: F) -> PendingRefresh<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        if let Some((ticket, pending)) = &slot.pending {
            debug!(tier = self.inner.name, key, ticket, "joining pending refresh");
            return pending.clone();
        }

        let ticket = self.inner.tickets.fetch_add(1, Ordering::Relaxed) + 1;
        info!(tier = self.inner.name, key, ticket, "starting refresh");

        let work = producer();
        let task = {
            let inner = self.inner.clone();
            let key = key.to_string();
            tokio::spawn(async move {
                let result = work.await;
                inner.commit(&key, ticket, result)
            })
        };

        let inner = self.inner.clone();
        let key = key.to_string();
        let pending = async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(join_error) => inner.abandon(&key, ticket, join_error.to_string()),
            }
        }
        .boxed()
        .shared();

        slot.pending = Some((ticket, pending.clone()));
        pending
    }
}

fn settle<T>(outcome: RefreshOutcome<T>) -> std::result::Result<Served<T>, Arc<Error>> {
    match outcome {
        RefreshOutcome::Committed(entry) | RefreshOutcome::Superseded(entry) => Ok(Served {
            entry,
            freshness: Freshness::Refreshed,
        }),
        RefreshOutcome::Failed {
            previous: Some(entry),
            ..
        } => Ok(Served {
            entry,
            freshness: Freshness::Stale,
        }),
        RefreshOutcome::Failed { previous: None, error } => Err(error),
    }
}

/// Cache keys are trimmed, whitespace-collapsed and lowercased.
pub fn normalize_key(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// The three tiers served by the aggregation service.
#[derive(Clone)]
pub struct TieredCache {
    pub breaking: CacheTier<Vec<BriefedArticle>>,
    pub sections: CacheTier<Vec<Article>>,
    pub weather: CacheTier<WeatherReport>,
}

impl TieredCache {
    pub fn new(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            breaking: CacheTier::new("breaking", ttl(config.breaking_ttl_seconds), None, clock.clone()),
            sections: CacheTier::new("sections", ttl(config.section_ttl_seconds), None, clock.clone()),
            weather: CacheTier::new(
                "weather",
                ttl(config.weather_ttl_seconds),
                Some(config.weather_max_cities),
                clock,
            ),
        }
    }
}

fn ttl(seconds: u64) -> Duration {
    Duration::from_std(std::time::Duration::from_secs(seconds)).unwrap_or_else(|_| Duration::weeks(52))
}
