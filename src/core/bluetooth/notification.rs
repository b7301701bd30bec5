//! Notification handling for the blood pressure monitor
//! This module registers a frame callback on a notifiable characteristic and
//! hands back a `Subscription` token that removes exactly that registration.

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::bluetooth::adapter::BleAdapter;
use crate::core::bluetooth::error::{BpError, BpResult};
use crate::core::bluetooth::types::CharacteristicHandle;

/// One active notification registration.
///
/// Its token is a child of the device link, so a disconnect ends delivery
/// even if `unsubscribe` is never called. Dropping the token also ends delivery.
#[derive(Debug)]
pub struct Subscription {
    characteristic: Uuid,
    cancel: CancellationToken,
    closed: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn characteristic(&self) -> Uuid {
        self.characteristic
    }

    pub fn is_active(&self) -> bool {
        self.task.is_some() && !self.cancel.is_cancelled() && !self.closed.is_cancelled()
    }

    /// Fires when the platform ends the notification stream on its own.
    /// Unsubscribing or disconnecting does not trigger it.
    pub fn closed(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// Stops delivery and waits for the dispatch task, so `on_frame` is never
    /// called again once this returns.
    async fn release(&mut self) {
        let Some(task) = self.task.take() else {
            debug!("Subscription on {} already released", self.characteristic);
            return;
        };
        self.cancel.cancel();
        if let Err(e) = task.await {
            warn!("Notification task for {} ended abnormally: {}", self.characteristic, e);
        }
        info!("Unsubscribed from {}", self.characteristic);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Notification subscriber for a connected device
pub struct NotificationSubscriber<A: BleAdapter> {
    adapter: Arc<A>,
}

impl<A: BleAdapter> Clone for NotificationSubscriber<A> {
    fn clone(&self) -> Self {
        Self {
            adapter: self.adapter.clone(),
        }
    }
}

impl<A: BleAdapter> NotificationSubscriber<A> {
    pub fn new(adapter: Arc<A>) -> Self {
        Self { adapter }
    }

    /// Calls `on_frame` once per inbound notification, in arrival order, from a
    /// single task.
    pub async fn subscribe<F>(
        &self,
        characteristic: &CharacteristicHandle<A>,
        mut on_frame: F,
    ) -> BpResult<Subscription>
    where
        F: FnMut(&[u8]) + Send + 'static,
    {
        let raw = characteristic.characteristic()?;
        let uuid = characteristic.uuid();
        if !characteristic.flags().notifiable {
            return Err(BpError::NotificationUnsupported(uuid));
        }

        info!("Subscribing to notifications on {}...", uuid);
        let cancel = characteristic.link().child_token();
        let (sink, mut frames) = mpsc::unbounded_channel::<Vec<u8>>();
        if let Err(e) = self.adapter.subscribe(raw, sink, cancel.clone()).await {
            cancel.cancel();
            return Err(e);
        }

        let stop = cancel.clone();
        let closed = CancellationToken::new();
        let stream_closed = closed.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = stop.cancelled() => break,
                    frame = frames.recv() => match frame {
                        Some(frame) => {
                            debug!("Received notification on {}: {:02X?}", uuid, frame);
                            on_frame(&frame);
                        }
                        None => {
                            warn!("Notification stream for {} closed by the platform", uuid);
                            stream_closed.cancel();
                            break;
                        }
                    },
                }
            }
        });

        Ok(Subscription {
            characteristic: uuid,
            cancel,
            closed,
            task: Some(task),
        })
    }

    /// Removes exactly this registration. Safe to call twice or after disconnect.
    pub async fn unsubscribe(&self, subscription: &mut Subscription) {
        subscription.release().await;
    }
}
