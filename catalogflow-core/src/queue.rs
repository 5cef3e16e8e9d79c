//! Bounded single-producer/single-consumer queue between the decoding thread and the batch
//! accumulator. A full queue suspends the producer, an empty one suspends the consumer.

use tokio::sync::mpsc;

use crate::error::{Error, Result};

/// Creates a queue holding at most `capacity` items. Capacity 0 is a config error.
pub fn bounded<T>(capacity: usize) -> Result<(QueueSender<T>, QueueReceiver<T>)> {
    if capacity == 0 {
        return Err(Error::Config(
            "queue capacity must be greater than 0".to_string(),
        ));
    }
    let (tx, rx) = mpsc::channel(capacity);
    Ok((QueueSender { tx }, QueueReceiver { rx }))
}

/// Producer half. Dropping it closes the queue.
#[derive(Debug)]
pub struct QueueSender<T> {
    tx: mpsc::Sender<T>,
}

impl<T> QueueSender<T> {
    pub async fn push(&self, item: T) -> Result<()> {
        self.tx
            .send(item)
            .await
            .map_err(|_| Error::Queue("consumer has gone away".to_string()))
    }

    /// Same as [QueueSender::push] for producers on a blocking thread. Panics if called from
    /// within an async context, like [mpsc::Sender::blocking_send].
    pub fn blocking_push(&self, item: T) -> Result<()> {
        self.tx
            .blocking_send(item)
            .map_err(|_| Error::Queue("consumer has gone away".to_string()))
    }
}

/// Consumer half.
#[derive(Debug)]
pub struct QueueReceiver<T> {
    rx: mpsc::Receiver<T>,
}

impl<T> QueueReceiver<T> {
    /// Next item, or `None` once the producer is gone and the queue is drained.
    pub async fn pull(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Next item if one is already queued.
    pub fn try_pull(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(bounded::<u32>(0), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_fifo_and_end_of_stream() {
        let (tx, mut rx) = bounded(4).unwrap();
        for i in 0..3 {
            tx.push(i).await.unwrap();
        }
        drop(tx);

        assert_eq!(rx.len(), 3);
        assert_eq!(rx.pull().await, Some(0));
        assert_eq!(rx.pull().await, Some(1));
        assert_eq!(rx.try_pull(), Some(2));
        assert_eq!(rx.pull().await, None);
    }

    #[tokio::test]
    async fn test_full_queue_suspends_producer() {
        let (tx, mut rx) = bounded(1).unwrap();
        tx.push(1).await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(50), tx.push(2)).await;
        assert!(blocked.is_err(), "push into a full queue should wait");

        assert_eq!(rx.pull().await, Some(1));
        tx.push(3).await.unwrap();
        assert_eq!(rx.pull().await, Some(3));
    }

    #[tokio::test]
    async fn test_blocking_push_from_blocking_thread() {
        let (tx, mut rx) = bounded(2).unwrap();
        let producer = tokio::task::spawn_blocking(move || {
            for i in 0..10 {
                tx.blocking_push(i)?;
            }
            Ok::<_, Error>(())
        });

        let mut seen = Vec::new();
        while let Some(item) = rx.pull().await {
            seen.push(item);
        }
        producer.await.unwrap().unwrap();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_push_after_consumer_dropped() {
        let (tx, rx) = bounded(2).unwrap();
        drop(rx);
        assert!(matches!(tx.push(1).await, Err(Error::Queue(_))));
    }
}
