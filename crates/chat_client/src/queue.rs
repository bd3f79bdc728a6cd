//! FIFO hand-off from network tasks to the single consumer tick.
//!
//! Producers push from any task or thread; the consumer drains everything
//! currently buffered in arrival order and never blocks. The buffer is
//! unbounded; a capacity with drop-oldest would be needed for loads well
//! beyond human chat traffic.

use tokio::sync::mpsc;

/// Create a connected sender/queue pair.
pub fn inbound_queue<T>() -> (InboundSender<T>, InboundQueue<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (InboundSender { tx }, InboundQueue { rx })
}

/// Producer side. Cheap to clone, one per network task.
#[derive(Debug)]
pub struct InboundSender<T> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T> Clone for InboundSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> InboundSender<T> {
    /// Enqueue an item. Returns false once the consumer is gone.
    pub fn push(&self, item: T) -> bool {
        self.tx.send(item).is_ok()
    }
}

/// Consumer side.
#[derive(Debug)]
pub struct InboundQueue<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> InboundQueue<T> {
    /// Remove and return every item queued right now, oldest first.
    pub fn drain(&mut self) -> Vec<T> {
        let mut items = Vec::new();
        while let Ok(item) = self.rx.try_recv() {
            items.push(item);
        }
        items
    }

    /// Wait for the next item. `None` when every sender has been dropped.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }
}
