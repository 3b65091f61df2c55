use crate::tenant::lifecycle::Instance;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// Unbounded FIFO of instances awaiting provisioning.
///
/// Any number of producers may enqueue; consumers share the receiver behind
/// an async mutex, so each instance is delivered to exactly one of them.
pub struct ProvisioningQueue {
    tx: mpsc::UnboundedSender<Instance>,
    rx: Mutex<mpsc::UnboundedReceiver<Instance>>,
    depth: AtomicUsize,
}

#[derive(Debug, thiserror::Error)]
#[error("provisioning queue is closed")]
pub struct QueueClosed;

impl ProvisioningQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            depth: AtomicUsize::new(0),
        }
    }

    /// Never blocks.
    pub fn enqueue(&self, instance: Instance) -> Result<(), QueueClosed> {
        self.depth.fetch_add(1, Ordering::SeqCst);
        self.tx.send(instance).map_err(|_| {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            QueueClosed
        })
    }

    /// Wait for the next instance. Returns `None` once `cancel` fires; an
    /// item that was not handed out stays queued.
    pub async fn dequeue(&self, cancel: &CancellationToken) -> Option<Instance> {
        let mut rx = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            rx = self.rx.lock() => rx,
        };
        let item = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            item = rx.recv() => item,
        };
        if item.is_some() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
        }
        item
    }

    pub fn len(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ProvisioningQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn fifo_order() {
        let queue = ProvisioningQueue::new();
        let cancel = CancellationToken::new();
        for domain in ["a.test", "b.test", "c.test"] {
            queue.enqueue(Instance::new(domain, "node")).unwrap();
        }
        assert_eq!(queue.len(), 3);

        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(queue.dequeue(&cancel).await.unwrap().domain().to_string());
        }
        assert_eq!(seen, ["a.test", "b.test", "c.test"]);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn cancelled_dequeue_returns_none_and_keeps_items() {
        let queue = ProvisioningQueue::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        queue.enqueue(Instance::new("kept.test", "node")).unwrap();

        assert!(queue.dequeue(&cancel).await.is_none());
        assert_eq!(queue.len(), 1);

        let fresh = CancellationToken::new();
        let item = queue.dequeue(&fresh).await.unwrap();
        assert_eq!(item.domain(), "kept.test");
    }

    #[tokio::test]
    async fn waiting_dequeue_wakes_on_cancel() {
        let queue = Arc::new(ProvisioningQueue::new());
        let cancel = CancellationToken::new();
        let waiter = {
            let queue = queue.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { queue.dequeue(&cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        assert!(waiter.await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_consumers_never_share_an_item() {
        let queue = Arc::new(ProvisioningQueue::new());
        let cancel = CancellationToken::new();
        let mut ids = HashSet::new();
        for i in 0..50 {
            let instance = Instance::new(format!("t{i}.test"), "node");
            ids.insert(instance.id());
            queue.enqueue(instance).unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..4 {
            let queue = queue.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                let mut got = Vec::new();
                while !queue.is_empty() {
                    match tokio::time::timeout(Duration::from_millis(50), queue.dequeue(&cancel)).await {
                        Ok(Some(i)) => got.push(i.id()),
                        _ => break,
                    }
                }
                got
            }));
        }

        let mut delivered = Vec::new();
        for h in handles {
            delivered.extend(h.await.unwrap());
        }
        assert_eq!(delivered.len(), 50);
        assert_eq!(delivered.into_iter().collect::<HashSet<_>>(), ids);
    }
}
