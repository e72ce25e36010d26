//! Connector handing out fake handles

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use gearbase_core::models::ConnectionDescriptor;

use crate::routing::TenantConnector;

/// A fake store handle that remembers whether it was closed.
#[derive(Debug, Clone)]
pub struct MockHandle {
    pub id: usize,
    pub key: String,
    pub descriptor: ConnectionDescriptor,
    closed: Arc<AtomicBool>,
}

impl MockHandle {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Default)]
pub struct MockConnector {
    opened: Arc<Mutex<Vec<MockHandle>>>,
    attempts: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    unreachable: Arc<Mutex<HashSet<String>>>,
    delay: Arc<Mutex<Duration>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `open` sleeps this long first.
    pub fn with_delay(delay: Duration) -> Self {
        let connector = Self::new();
        *connector.delay.lock().unwrap() = delay;
        connector
    }

    /// Make opens for `key` fail.
    pub fn set_unreachable(&self, key: &str, unreachable: bool) {
        let mut keys = self.unreachable.lock().unwrap();
        if unreachable {
            keys.insert(key.to_string());
        } else {
            keys.remove(key);
        }
    }

    /// Number of `open` calls, successful or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Handles successfully opened so far, in order.
    pub fn opened(&self) -> Vec<MockHandle> {
        self.opened.lock().unwrap().clone()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TenantConnector for MockConnector {
    type Handle = MockHandle;

    async fn open(&self, key: &str, descriptor: &ConnectionDescriptor) -> Result<MockHandle> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.unreachable.lock().unwrap().contains(key) {
            return Err(anyhow!("connection refused"));
        }

        let mut opened = self.opened.lock().unwrap();
        let handle = MockHandle {
            id: opened.len(),
            key: key.to_string(),
            descriptor: descriptor.clone(),
            closed: Arc::new(AtomicBool::new(false)),
        };
        opened.push(handle.clone());
        Ok(handle)
    }

    async fn close(&self, handle: &MockHandle) {
        handle.closed.store(true, Ordering::SeqCst);
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}
