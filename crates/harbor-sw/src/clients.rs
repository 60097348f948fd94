//! Pages (clients) the worker can see and control.

use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use tracing::debug;
use url::Url;

use crate::lifecycle::ServiceWorkerId;
use crate::WorkerError;

/// A client (open page or worker).
#[derive(Debug, Clone)]
pub struct Client {
    /// Client ID.
    pub id: String,

    /// Client URL.
    pub url: Url,

    /// Client type.
    pub client_type: ClientType,

    /// Whether focused.
    pub focused: bool,

    /// Worker controlling this client.
    pub controller: Option<ServiceWorkerId>,
}

impl Client {
    /// An unfocused, uncontrolled window.
    pub fn window(url: Url) -> Self {
        Self {
            id: next_client_id(),
            url,
            client_type: ClientType::Window,
            focused: false,
            controller: None,
        }
    }

    pub fn is_window(&self) -> bool {
        self.client_type == ClientType::Window
    }
}

/// Client type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientType {
    #[default]
    Window,
    Worker,
    All,
}

/// Options for [`Clients::match_all`].
#[derive(Debug, Clone, Default)]
pub struct ClientMatchOptions {
    pub include_uncontrolled: bool,
    pub client_type: ClientType,
}

/// Clients API.
#[derive(Debug, Default)]
pub struct Clients {
    clients: HashMap<String, Client>,
}

impl Clients {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    /// Matching clients, ordered by ID.
    pub fn match_all(&self, options: &ClientMatchOptions) -> Vec<Client> {
        let mut matched: Vec<Client> = self
            .clients
            .values()
            .filter(|c| options.include_uncontrolled || c.controller.is_some())
            .filter(|c| match options.client_type {
                ClientType::All => true,
                t => c.client_type == t,
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.id.cmp(&b.id));
        matched
    }

    /// Open a focused window at `url`.
    pub fn open_window(&mut self, url: Url) -> Client {
        let mut client = Client::window(url);
        client.focused = true;
        debug!(client = %client.id, url = %client.url, "Opened window");
        self.unfocus_all();
        self.clients.insert(client.id.clone(), client.clone());
        client
    }

    /// Focus a window client, unfocusing the others.
    pub fn focus(&mut self, id: &str) -> Result<Client, WorkerError> {
        match self.clients.get(id) {
            None => return Err(WorkerError::NotFound(format!("client {}", id))),
            Some(client) if !client.is_window() => {
                return Err(WorkerError::ClientError(
                    "Can only focus window clients".to_string(),
                ));
            }
            Some(_) => {}
        }

        self.unfocus_all();
        let client = self
            .clients
            .get_mut(id)
            .ok_or_else(|| WorkerError::NotFound(format!("client {}", id)))?;
        client.focused = true;
        Ok(client.clone())
    }

    fn unfocus_all(&mut self) {
        for client in self.clients.values_mut() {
            client.focused = false;
        }
    }

    /// Take control of every window client in `scope`. Returns the IDs whose
    /// controller changed, ordered by ID.
    pub fn claim(&mut self, worker_id: ServiceWorkerId, scope: &Url) -> Vec<String> {
        let mut claimed: Vec<String> = self
            .clients
            .values_mut()
            .filter(|c| c.is_window() && c.url.as_str().starts_with(scope.as_str()))
            .filter(|c| c.controller != Some(worker_id))
            .map(|c| {
                c.controller = Some(worker_id);
                c.id.clone()
            })
            .collect();
        claimed.sort();
        claimed
    }

    /// Add a client.
    pub fn add(&mut self, client: Client) {
        self.clients.insert(client.id.clone(), client);
    }

    /// Remove a client.
    pub fn remove(&mut self, id: &str) -> Option<Client> {
        self.clients.remove(id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

fn next_client_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    format!("client-{:06}", COUNTER.fetch_add(1, Ordering::Relaxed))
}
