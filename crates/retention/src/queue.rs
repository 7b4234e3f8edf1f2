//! Purge bookkeeping: pending entries, in-flight deletes, counters, and the
//! tick decision. No I/O and no clock; the scheduler drives it.

use std::{collections::HashMap, time::Duration};

use ebb_channels::{ChannelId, MessageId, TrackedMessage};

use crate::{
    settings::PurgeSettings,
    types::{DeleteOutcome, PurgeStats, QueueEntry},
};

fn oldest<'a>(messages: impl Iterator<Item = &'a TrackedMessage>) -> Option<&'a TrackedMessage> {
    messages.min_by(|a, b| {
        a.created_at_ms
            .cmp(&b.created_at_ms)
            .then_with(|| a.id.cmp(&b.id))
    })
}

/// What a tick decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickPlan {
    /// Deletes from an earlier batch are still outstanding. Nothing was
    /// selected; the tick interval grew and the next check comes sooner.
    Backlog {
        in_flight: usize,
        previous_interval: Duration,
        tick_interval: Duration,
        recheck_in: Duration,
    },
    /// These entries were moved in flight and must be deleted. May be empty.
    Dispatch {
        batch: Vec<QueueEntry>,
        next_tick: Duration,
    },
}

/// Pending and in-flight purge state.
///
/// An id is in `pending` from submission until its delete resolves. While
/// the delete is outstanding it is also in `in_flight`, which keeps it out of
/// later batches.
#[derive(Debug)]
pub struct PurgeQueue {
    pending: HashMap<MessageId, QueueEntry>,
    in_flight: HashMap<MessageId, QueueEntry>,
    stats: PurgeStats,
    batch_size: usize,
    tick_interval: Duration,
    recheck_unit: Duration,
}

impl PurgeQueue {
    pub fn new(settings: &PurgeSettings) -> Self {
        Self {
            pending: HashMap::new(),
            in_flight: HashMap::new(),
            stats: PurgeStats::default(),
            batch_size: settings.batch_size.max(1),
            tick_interval: settings.tick_interval,
            recheck_unit: settings.backlog_recheck_unit,
        }
    }

    /// Track `message` until `due_at_ms`. Returns `false`, leaving the
    /// existing due time untouched, if the id is already tracked.
    pub fn submit(&mut self, message: TrackedMessage, due_at_ms: u64) -> bool {
        if self.pending.contains_key(&message.id) {
            return false;
        }
        self.pending.insert(message.id.clone(), QueueEntry { message, due_at_ms });
        true
    }

    /// The earliest-created pending message.
    #[must_use]
    pub fn oldest_pending(&self) -> Option<&TrackedMessage> {
        oldest(self.pending.values().map(|e| &e.message))
    }

    /// The earliest-created pending message from `channel`; the watcher's
    /// crawl cursor for that channel.
    #[must_use]
    pub fn oldest_pending_in(&self, channel: &ChannelId) -> Option<&TrackedMessage> {
        oldest(
            self.pending
                .values()
                .map(|e| &e.message)
                .filter(|m| &m.channel_id == channel),
        )
    }

    #[must_use]
    pub fn get(&self, id: &MessageId) -> Option<&QueueEntry> {
        self.pending.get(id)
    }

    #[must_use]
    pub fn is_in_flight(&self, id: &MessageId) -> bool {
        self.in_flight.contains_key(id)
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    #[must_use]
    pub fn stats(&self) -> PurgeStats {
        self.stats
    }

    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Run one scheduler tick at `now_ms`.
    pub fn tick(&mut self, now_ms: u64) -> TickPlan {
        let in_flight = self.in_flight.len();
        if in_flight > 0 {
            let previous_interval = self.tick_interval;
            self.tick_interval = grow(previous_interval, in_flight, self.batch_size);
            return TickPlan::Backlog {
                in_flight,
                previous_interval,
                tick_interval: self.tick_interval,
                recheck_in: scale(self.recheck_unit, in_flight, self.batch_size),
            };
        }

        let mut due: Vec<&QueueEntry> = self
            .pending
            .values()
            .filter(|e| e.is_due(now_ms) && !self.in_flight.contains_key(&e.message.id))
            .collect();
        due.sort_by(|a, b| {
            a.due_at_ms
                .cmp(&b.due_at_ms)
                .then_with(|| a.message.created_at_ms.cmp(&b.message.created_at_ms))
                .then_with(|| a.message.id.cmp(&b.message.id))
        });

        let batch: Vec<QueueEntry> = due.into_iter().take(self.batch_size).cloned().collect();
        for entry in &batch {
            self.in_flight
                .insert(entry.message.id.clone(), entry.clone());
        }
        self.stats.delete_attempted_count += batch.len() as u64;

        TickPlan::Dispatch {
            batch,
            next_tick: self.tick_interval,
        }
    }

    /// Resolve an in-flight delete. The entry leaves both sets whatever the
    /// outcome. Returns `None` for ids that are not in flight, so a late or
    /// duplicate completion changes nothing.
    pub fn complete(&mut self, id: &MessageId, outcome: &DeleteOutcome) -> Option<QueueEntry> {
        let entry = self.in_flight.remove(id)?;
        self.pending.remove(id);
        match outcome {
            DeleteOutcome::Deleted => self.stats.deleted_count += 1,
            DeleteOutcome::Failed(_) => self.stats.error_count += 1,
        }
        Some(entry)
    }
}

/// `interval * (1 + in_flight / batch_size)`, saturating.
fn grow(interval: Duration, in_flight: usize, batch_size: usize) -> Duration {
    interval.saturating_add(scale(interval, in_flight, batch_size))
}

/// `unit * numerator / denominator`, at least one millisecond.
fn scale(unit: Duration, numerator: usize, denominator: usize) -> Duration {
    let ms = unit.as_millis() * numerator as u128 / denominator.max(1) as u128;
    Duration::from_millis(u64::try_from(ms).unwrap_or(u64::MAX).max(1))
}
