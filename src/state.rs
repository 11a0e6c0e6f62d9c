use std::sync::Arc;

use tokio::sync::mpsc;

use crate::engine::dispatcher::{DispatchPolicy, Dispatcher};
use crate::engine::expiry::ExpiryEvent;
use crate::notify::BroadcastNotifier;
use crate::observability::metrics::Metrics;
use crate::store::Stores;

pub struct AppState {
    pub stores: Stores,
    pub dispatcher: Arc<Dispatcher>,
    pub notifier: Arc<BroadcastNotifier>,
    pub metrics: Metrics,
    pub webhook_secret: Option<String>,
}

impl AppState {
    pub fn new(
        policy: DispatchPolicy,
        event_buffer_size: usize,
        webhook_secret: Option<String>,
    ) -> (Self, mpsc::Receiver<ExpiryEvent>) {
        let stores = Stores::in_memory();
        let notifier = Arc::new(BroadcastNotifier::new(event_buffer_size));
        let metrics = Metrics::new();

        let (dispatcher, expiry_rx) = Dispatcher::new(
            stores.clone(),
            notifier.clone(),
            policy,
            metrics.clone(),
            event_buffer_size,
        );

        (
            Self {
                stores,
                dispatcher: Arc::new(dispatcher),
                notifier,
                metrics,
                webhook_secret,
            },
            expiry_rx,
        )
    }
}
