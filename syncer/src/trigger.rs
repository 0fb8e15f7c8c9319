use tokio::sync::mpsc;

/// Trigger tokens are coalescing: one queued token covers any number of
/// remote notifications, so dropping on overflow loses nothing.
const QUEUE_CAPACITY: usize = 20;

/// Producer side, held by the webhook glue, cron glue, and boot code.
#[derive(Clone)]
pub struct TriggerHandle {
    tx: mpsc::Sender<()>,
}

impl TriggerHandle {
    /// Non-blocking enqueue; a full queue silently swallows the token.
    pub fn notify(&self) {
        let _ = self.tx.try_send(());
    }
}

/// Consumer side, owned by the event loop.
pub struct TriggerQueue {
    rx: mpsc::Receiver<()>,
}

impl TriggerQueue {
    /// Wait for the next token. `None` once every handle is gone.
    pub async fn recv(&mut self) -> Option<()> {
        self.rx.recv().await
    }

    /// Drop all tokens that accumulated during the debounce window.
    pub fn drain(&mut self) -> usize {
        let mut drained = 0;
        while self.rx.try_recv().is_ok() {
            drained += 1;
        }
        drained
    }
}

pub fn trigger_queue() -> (TriggerHandle, TriggerQueue) {
    let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
    (TriggerHandle { tx }, TriggerQueue { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn overflow_is_dropped_silently() {
        let (handle, mut queue) = trigger_queue();
        for _ in 0..50 {
            handle.notify();
        }
        assert!(queue.recv().await.is_some());
        // Capacity 20, one consumed, nineteen drained.
        assert_eq!(queue.drain(), 19);
        assert_eq!(queue.drain(), 0);
    }

    #[tokio::test]
    async fn recv_ends_when_handles_drop() {
        let (handle, mut queue) = trigger_queue();
        drop(handle);
        assert!(queue.recv().await.is_none());
    }
}
