//! Controlled pages.

use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

/// An open page under the worker's origin.
#[derive(Debug, Clone)]
pub struct Client {
    /// Client ID.
    pub id: String,

    /// Page URL.
    pub url: Url,

    /// Whether this page's requests are routed through the worker.
    pub controlled: bool,
}

/// Registry of open pages.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: RwLock<HashMap<String, Client>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly opened page. Pages start uncontrolled until the
    /// worker claims them or they reload.
    pub async fn add(&self, url: Url) -> Client {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        let id = format!("client-{}", COUNTER.fetch_add(1, Ordering::Relaxed));

        let client = Client {
            id: id.clone(),
            url,
            controlled: false,
        };
        self.clients.write().await.insert(id, client.clone());
        client
    }

    /// Get a client by ID.
    pub async fn get(&self, id: &str) -> Option<Client> {
        self.clients.read().await.get(id).cloned()
    }

    /// Remove a closed page.
    pub async fn remove(&self, id: &str) -> Option<Client> {
        self.clients.write().await.remove(id)
    }

    /// Number of open pages.
    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Currently controlled pages.
    pub async fn controlled(&self) -> Vec<Client> {
        self.clients
            .read()
            .await
            .values()
            .filter(|c| c.controlled)
            .cloned()
            .collect()
    }

    /// Take control of every open page without waiting for a reload.
    ///
    /// Returns the number of pages that were not controlled before.
    pub async fn claim(&self) -> usize {
        let mut clients = self.clients.write().await;
        let mut newly = 0;
        for client in clients.values_mut() {
            if !client.controlled {
                client.controlled = true;
                newly += 1;
            }
        }
        debug!(newly, total = clients.len(), "Claimed clients");
        newly
    }
}
