//! In-process queue between two independently scheduled workflows.
//!
//! Only detached copies cross the queue, so the receiving workflow has to
//! recover the exchange through the correlation cache.

use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::workflow::message::IngressMessage;
use crate::workflow::{Service, ServiceError, Workflow};

/// Create a connected producer/receiver pair.
pub fn channel() -> (QueueProducer, mpsc::UnboundedReceiver<IngressMessage>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (QueueProducer { tx }, rx)
}

/// Service that forwards a detached copy of the message onto a queue.
#[derive(Debug, Clone)]
pub struct QueueProducer {
    tx: mpsc::UnboundedSender<IngressMessage>,
}

impl Service for QueueProducer {
    fn apply(&self, message: &mut IngressMessage) -> Result<(), ServiceError> {
        self.tx
            .send(message.detached_copy())
            .map_err(|_| ServiceError::Failed("reply queue closed".to_string()))
    }
}

/// Drains a queue into a workflow until shutdown or the queue closes.
pub struct QueueConsumer {
    rx: mpsc::UnboundedReceiver<IngressMessage>,
    workflow: Arc<dyn Workflow>,
}

impl QueueConsumer {
    pub fn new(rx: mpsc::UnboundedReceiver<IngressMessage>, workflow: Arc<dyn Workflow>) -> Self {
        Self { rx, workflow }
    }

    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(workflow = %self.workflow.name(), "Queue consumer starting");
        loop {
            tokio::select! {
                next = self.rx.recv() => match next {
                    Some(message) => self.workflow.submit(message),
                    None => {
                        tracing::info!(workflow = %self.workflow.name(), "Queue closed, consumer exiting");
                        break;
                    }
                },
                _ = shutdown.recv() => {
                    tracing::info!(workflow = %self.workflow.name(), "Queue consumer received shutdown signal");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::CompletionMonitor;

    #[test]
    fn test_producer_sends_detached_copy() {
        let (producer, mut rx) = channel();
        let mut message = IngressMessage::with_id("abc", "body");
        message.exchange_mut().monitor = Some(Arc::new(CompletionMonitor::new()));

        producer.apply(&mut message).unwrap();
        let received = rx.try_recv().unwrap();
        assert_eq!(received.unique_id(), "abc");
        assert!(received.exchange().is_empty());
    }

    #[test]
    fn test_producer_fails_when_queue_closed() {
        let (producer, rx) = channel();
        drop(rx);
        assert!(producer.apply(&mut IngressMessage::new("x")).is_err());
    }
}
