//! The two shared queues workers drain: peer intake (set-like, by
//! `host:port`) and zonefile push (FIFO, drop-new on overflow).

use std::collections::VecDeque;

use tokio::sync::Mutex;

/// Newly-learned `host:port` candidates awaiting crawl-list adoption.
/// Set semantics: re-queueing an already-queued hostport is a no-op.
pub struct PeerIntakeQueue {
    inner: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl PeerIntakeQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            capacity,
        }
    }

    /// Enqueues `hostport` unless already present or the queue is full.
    /// Returns whether it was actually enqueued.
    pub async fn offer(&self, hostport: &str) -> bool {
        let mut queue = self.inner.lock().await;
        if queue.iter().any(|h| h == hostport) {
            return false;
        }
        if queue.len() >= self.capacity {
            return false;
        }
        queue.push_back(hostport.to_string());
        true
    }

    /// Drains every queued hostport, emptying the queue.
    pub async fn drain(&self) -> Vec<String> {
        let mut queue = self.inner.lock().await;
        queue.drain(..).collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

/// Outbound (hash, bytes) zonefiles awaiting gossip. FIFO, bounded by
/// `MAX_QUEUED_ZONEFILES`; full queues drop the newly-offered item rather
/// than evicting older ones.
pub struct PushQueue {
    inner: Mutex<VecDeque<(String, Vec<u8>)>>,
    capacity: usize,
}

impl PushQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            capacity,
        }
    }

    /// Enqueues `(hash, bytes)`. Returns `false` (drop-new) if full.
    pub async fn offer(&self, hash: String, bytes: Vec<u8>) -> bool {
        let mut queue = self.inner.lock().await;
        if queue.len() >= self.capacity {
            return false;
        }
        queue.push_back((hash, bytes));
        true
    }

    /// Pops the oldest entry, or `None` if empty.
    pub async fn pop(&self) -> Option<(String, Vec<u8>)> {
        self.inner.lock().await.pop_front()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn intake_queue_dedupes_by_hostport() {
        let queue = PeerIntakeQueue::new(10);
        assert!(queue.offer("a:1").await);
        assert!(!queue.offer("a:1").await);
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn intake_queue_rejects_past_capacity() {
        let queue = PeerIntakeQueue::new(1);
        assert!(queue.offer("a:1").await);
        assert!(!queue.offer("b:2").await);
    }

    #[tokio::test]
    async fn push_queue_is_fifo_and_drops_new_on_overflow() {
        let queue = PushQueue::new(1);
        assert!(queue.offer("h1".to_string(), vec![1]).await);
        assert!(!queue.offer("h2".to_string(), vec![2]).await);
        let (hash, bytes) = queue.pop().await.expect("one entry");
        assert_eq!(hash, "h1");
        assert_eq!(bytes, vec![1]);
        assert!(queue.pop().await.is_none());
    }
}
