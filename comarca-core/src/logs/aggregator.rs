use std::{
    collections::VecDeque,
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::{sync::broadcast, task::JoinHandle, time::interval};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::model::{JobId, LogEntry};

pub const DEFAULT_BUFFER_CAPACITY: usize = 1024;
pub const DEFAULT_RETENTION_GRACE: Duration = Duration::from_secs(120);
const BROADCAST_CAPACITY: usize = 1024;
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// A buffered log entry stamped with its per-job sequence number.
///
/// Sequences let the stream transport dedupe across the backfill/follow
/// boundary: a follower skips any frame at or below the last sequence it
/// replayed from the buffer.
#[derive(Clone, Debug)]
pub struct LogFrame {
    pub sequence: u64,
    pub entry: LogEntry,
}

#[derive(Debug)]
struct ChannelState {
    buffer: VecDeque<LogFrame>,
    sequence: u64,
    closed_at: Option<Instant>,
}

#[derive(Debug)]
struct JobChannel {
    state: Mutex<ChannelState>,
    tx: broadcast::Sender<LogFrame>,
}

impl JobChannel {
    fn new() -> Self {
        let (tx, _rx) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            state: Mutex::new(ChannelState {
                buffer: VecDeque::new(),
                sequence: 0,
                closed_at: None,
            }),
            tx,
        }
    }
}

/// Bounded in-memory per-job log buffer with live broadcast fan-out.
///
/// Append and listener notification happen under one lock, so a subscriber
/// obtained via [`LogAggregator::subscribe_with_snapshot`] observes every
/// entry exactly once: either in the snapshot or on the live channel, never
/// both, never neither. The persisted store keeps full history; this buffer
/// only needs to cover what trailing subscribers have not read yet.
#[derive(Debug)]
pub struct LogAggregator {
    channels: DashMap<JobId, Arc<JobChannel>>,
    buffer_capacity: usize,
    retention_grace: Duration,
}

impl Default for LogAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY, DEFAULT_RETENTION_GRACE)
    }
}

impl LogAggregator {
    pub fn new(buffer_capacity: usize, retention_grace: Duration) -> Self {
        Self {
            channels: DashMap::new(),
            buffer_capacity: buffer_capacity.max(1),
            retention_grace,
        }
    }

    fn channel(&self, job_id: JobId) -> Arc<JobChannel> {
        self.channels
            .entry(job_id)
            .or_insert_with(|| Arc::new(JobChannel::new()))
            .clone()
    }

    /// Appends an entry to the job's ring buffer and notifies every attached
    /// listener as one atomic step.
    pub fn append(&self, entry: LogEntry) -> LogFrame {
        let channel = self.channel(entry.job_id);
        let mut state = channel.state.lock();
        state.sequence += 1;
        let frame = LogFrame {
            sequence: state.sequence,
            entry,
        };
        if state.buffer.len() == self.buffer_capacity {
            state.buffer.pop_front();
        }
        state.buffer.push_back(frame.clone());
        // Send while the state lock is held: a subscriber created before
        // this point receives the frame, one created after sees it in the
        // buffer snapshot instead.
        let _ = channel.tx.send(frame.clone());
        frame
    }

    /// Attaches a live listener. Detach by dropping the receiver; a dropped
    /// receiver is never notified again, even with concurrent appends in
    /// flight.
    pub fn subscribe(&self, job_id: JobId) -> Option<broadcast::Receiver<LogFrame>> {
        self.channels.get(&job_id).map(|c| c.tx.subscribe())
    }

    /// Atomically snapshots the buffer and attaches a live listener, so the
    /// pair is equivalent to an instantaneous consistent cut of the stream.
    pub fn subscribe_with_snapshot(
        &self,
        job_id: JobId,
    ) -> (Vec<LogFrame>, Option<broadcast::Receiver<LogFrame>>) {
        match self.channels.get(&job_id) {
            Some(channel) => {
                let state = channel.state.lock();
                let snapshot = state.buffer.iter().cloned().collect();
                let rx = channel.tx.subscribe();
                (snapshot, Some(rx))
            }
            None => (Vec::new(), None),
        }
    }

    /// Current buffer contents, oldest first.
    pub fn snapshot(&self, job_id: JobId) -> Vec<LogFrame> {
        match self.channels.get(&job_id) {
            Some(channel) => channel.state.lock().buffer.iter().cloned().collect(),
            None => Vec::new(),
        }
    }

    pub fn listener_count(&self, job_id: JobId) -> usize {
        self.channels
            .get(&job_id)
            .map(|c| c.tx.receiver_count())
            .unwrap_or(0)
    }

    /// Marks a job's channel complete; the buffer is retained for the grace
    /// period so trailing subscribers can finish reading, then released.
    pub fn mark_complete(&self, job_id: JobId) {
        if let Some(channel) = self.channels.get(&job_id) {
            channel.state.lock().closed_at = Some(Instant::now());
        }
    }

    /// Releases buffers whose post-completion grace period expired. Returns
    /// the number of channels dropped.
    pub fn sweep(&self) -> usize {
        let grace = self.retention_grace;
        let before = self.channels.len();
        self.channels.retain(|_, channel| {
            let state = channel.state.lock();
            match state.closed_at {
                Some(closed_at) => closed_at.elapsed() < grace,
                None => true,
            }
        });
        before.saturating_sub(self.channels.len())
    }

    /// Spawns the periodic retention sweep, stopped via the token.
    pub fn spawn_retention_sweeper(
        self: Arc<Self>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = interval(SWEEP_INTERVAL);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tick.tick() => {
                        let dropped = self.sweep();
                        if dropped > 0 {
                            debug!(dropped, "released expired log buffers");
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LogLevel, LogEntry};

    fn entry(job_id: JobId, message: &str) -> LogEntry {
        LogEntry::job_scoped(LogLevel::Info, message, job_id)
    }

    #[tokio::test]
    async fn append_evicts_past_capacity() {
        let aggregator = LogAggregator::new(2, DEFAULT_RETENTION_GRACE);
        let job_id = JobId::new();

        aggregator.append(entry(job_id, "one"));
        aggregator.append(entry(job_id, "two"));
        aggregator.append(entry(job_id, "three"));

        let frames = aggregator.snapshot(job_id);
        let messages: Vec<&str> =
            frames.iter().map(|f| f.entry.message.as_str()).collect();
        assert_eq!(messages, vec!["two", "three"]);
        assert_eq!(frames[1].sequence, 3);
    }

    #[tokio::test]
    async fn subscriber_sees_appends_after_attach_only_once() {
        let aggregator = LogAggregator::default();
        let job_id = JobId::new();
        aggregator.append(entry(job_id, "before"));

        let (snapshot, rx) = aggregator.subscribe_with_snapshot(job_id);
        let mut rx = rx.expect("channel exists");
        assert_eq!(snapshot.len(), 1);

        aggregator.append(entry(job_id, "after"));
        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.entry.message, "after");
        assert!(rx.try_recv().is_err(), "no duplicate delivery");
    }

    #[tokio::test]
    async fn dropped_receiver_is_not_notified() {
        let aggregator = LogAggregator::default();
        let job_id = JobId::new();
        aggregator.append(entry(job_id, "seed"));

        let rx = aggregator.subscribe(job_id).expect("channel exists");
        assert_eq!(aggregator.listener_count(job_id), 1);
        drop(rx);
        assert_eq!(aggregator.listener_count(job_id), 0);

        // Append still succeeds with nobody attached.
        aggregator.append(entry(job_id, "unheard"));
        assert_eq!(aggregator.snapshot(job_id).len(), 2);
    }

    #[tokio::test]
    async fn sweep_releases_only_expired_channels() {
        let aggregator = LogAggregator::new(8, Duration::from_millis(0));
        let open_job = JobId::new();
        let closed_job = JobId::new();
        aggregator.append(entry(open_job, "open"));
        aggregator.append(entry(closed_job, "closed"));

        aggregator.mark_complete(closed_job);
        assert_eq!(aggregator.sweep(), 1);
        assert!(aggregator.snapshot(closed_job).is_empty());
        assert_eq!(aggregator.snapshot(open_job).len(), 1);
    }
}
