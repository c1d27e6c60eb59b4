//! Frontier store for pending crawl requests
//!
//! This module handles:
//! - Two FIFO tiers, with forefront work always dequeued before normal work
//! - URL-level dedup at enqueue time (a URL enters the frontier once per run)
//! - In-flight and completed tracking so an interrupted run can resume

use crate::crawler::request::Request;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

/// Priority tier of a queued request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Drained before any normal entry
    Forefront,
    Normal,
}

impl Tier {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Forefront => "forefront",
            Self::Normal => "normal",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "forefront" => Some(Self::Forefront),
            "normal" => Some(Self::Normal),
            _ => None,
        }
    }
}

/// A request with its queue position
#[derive(Debug, Clone)]
struct Queued {
    request: Request,
    tier: Tier,
    seq: u64,
}

/// One frontier entry as persisted at a checkpoint
#[derive(Debug, Clone, PartialEq)]
pub struct FrontierRecord {
    pub request: Request,
    pub tier: Tier,
    /// Arrival order; restoring sorts by it to keep FIFO order
    pub seq: u64,
    pub completed: bool,
}

#[derive(Debug, Default)]
struct FrontierInner {
    forefront: VecDeque<Queued>,
    normal: VecDeque<Queued>,
    /// Every unique key ever enqueued in this run
    seen: HashSet<String>,
    in_flight: HashMap<String, Queued>,
    completed: HashMap<String, Queued>,
    next_seq: u64,
}

impl FrontierInner {
    fn push(&mut self, queued: Queued) {
        match queued.tier {
            Tier::Forefront => self.forefront.push_back(queued),
            Tier::Normal => self.normal.push_back(queued),
        }
    }
}

/// Thread-safe two-tier request queue
#[derive(Debug, Default)]
pub struct Frontier {
    inner: Mutex<FrontierInner>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a frontier from a checkpoint
    ///
    /// Entries that were in flight when the checkpoint was taken come back as
    /// pending. Completed entries only populate the seen-set.
    pub fn restore(mut records: Vec<FrontierRecord>) -> Self {
        records.sort_by_key(|r| r.seq);

        let frontier = Self::new();
        {
            let mut inner = frontier.lock();
            for record in records {
                let key = record.request.unique_key().to_string();
                if !inner.seen.insert(key.clone()) {
                    continue;
                }
                inner.next_seq = inner.next_seq.max(record.seq + 1);

                let queued = Queued {
                    request: record.request,
                    tier: record.tier,
                    seq: record.seq,
                };
                if record.completed {
                    inner.completed.insert(key, queued);
                } else {
                    inner.push(queued);
                }
            }
        }
        frontier
    }

    fn lock(&self) -> MutexGuard<'_, FrontierInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Adds requests whose URL was never seen in this run
    ///
    /// # Arguments
    ///
    /// * `requests` - Requests to add, in arrival order
    /// * `forefront` - Whether to add them to the priority tier
    ///
    /// # Returns
    ///
    /// The number of requests actually added
    pub fn enqueue(&self, requests: Vec<Request>, forefront: bool) -> usize {
        let tier = if forefront {
            Tier::Forefront
        } else {
            Tier::Normal
        };

        let mut inner = self.lock();
        let mut added = 0;

        for request in requests {
            if !inner.seen.insert(request.unique_key().to_string()) {
                continue;
            }
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.push(Queued { request, tier, seq });
            added += 1;
        }

        added
    }

    /// Takes the next request, marking it in flight
    pub fn dequeue(&self) -> Option<Request> {
        let mut inner = self.lock();
        let queued = match inner.forefront.pop_front() {
            Some(q) => q,
            None => inner.normal.pop_front()?,
        };
        let request = queued.request.clone();
        inner
            .in_flight
            .insert(request.unique_key().to_string(), queued);
        Some(request)
    }

    /// Marks an in-flight request as done, whether it succeeded or was dropped
    pub fn complete(&self, request: &Request) {
        let mut inner = self.lock();
        if let Some(queued) = inner.in_flight.remove(request.unique_key()) {
            inner
                .completed
                .insert(request.unique_key().to_string(), queued);
        }
    }

    /// Captures every entry for persistence
    ///
    /// In-flight entries are recorded as pending.
    pub fn snapshot(&self) -> Vec<FrontierRecord> {
        let inner = self.lock();

        let pending = inner
            .forefront
            .iter()
            .chain(inner.normal.iter())
            .chain(inner.in_flight.values())
            .map(|q| (q, false));
        let done = inner.completed.values().map(|q| (q, true));

        let mut records: Vec<FrontierRecord> = pending
            .chain(done)
            .map(|(q, completed)| FrontierRecord {
                request: q.request.clone(),
                tier: q.tier,
                seq: q.seq,
                completed,
            })
            .collect();
        records.sort_by_key(|r| r.seq);
        records
    }

    pub fn seen_len(&self) -> usize {
        self.lock().seen.len()
    }

    pub fn pending_len(&self) -> usize {
        let inner = self.lock();
        inner.forefront.len() + inner.normal.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.lock().in_flight.len()
    }

    #[cfg(test)]
    pub fn completed_len(&self) -> usize {
        self.lock().completed.len()
    }

    /// Returns true when nothing is pending and nothing is in flight
    pub fn is_idle(&self) -> bool {
        let inner = self.lock();
        inner.forefront.is_empty() && inner.normal.is_empty() && inner.in_flight.is_empty()
    }
}
