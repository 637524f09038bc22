//! Explicitly constructed client facade.
//!
//! [`MarketClient`] wires the token store, refresh coordinator, REST
//! client, event registry, hub connection and notification service
//! together. There is no global state: each instance owns its own
//! session and connection.

use std::sync::Arc;

use crate::api::{AuthenticatedClient, HttpSend, NotificationService, ReqwestSender};
use crate::auth::{FileTokenStore, HttpTokenExchange, MemoryTokenStore, RefreshCoordinator, TokenStore};
use crate::config::ClientConfig;
use crate::domain::{Clock, EventRegistry, SessionFlags, SystemClock};
use crate::error::ClientError;
use crate::hub::{ConnectionManager, HubConnector, WsConnector};

/// Injectable collaborators for [`MarketClient::with_parts`].
#[derive(Debug, Clone)]
pub struct ClientParts {
    /// REST transport.
    pub sender: Arc<dyn HttpSend>,
    /// Session persistence.
    pub store: Arc<dyn TokenStore>,
    /// Hub transport.
    pub connector: Arc<dyn HubConnector>,
    /// Time source for token staleness.
    pub clock: Arc<dyn Clock>,
}

/// One logical marketplace session.
#[derive(Debug, Clone)]
pub struct MarketClient {
    config: ClientConfig,
    tokens: RefreshCoordinator,
    api: AuthenticatedClient,
    registry: EventRegistry,
    hub: ConnectionManager,
    notifications: NotificationService,
}

impl MarketClient {
    /// Builds a client with the production transports described by
    /// `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Network`] if the HTTP client cannot be
    /// initialised.
    pub fn from_config(config: ClientConfig) -> Result<Self, ClientError> {
        let sender = ReqwestSender::new(config.api_base_url.clone(), config.request_timeout)?;
        let store: Arc<dyn TokenStore> = match &config.token_store_path {
            Some(path) => Arc::new(FileTokenStore::new(path)),
            None => Arc::new(MemoryTokenStore::new()),
        };
        let parts = ClientParts {
            sender: Arc::new(sender),
            store,
            connector: Arc::new(WsConnector::new(config.hub_url.clone())),
            clock: Arc::new(SystemClock),
        };
        Ok(Self::with_parts(config, parts))
    }

    /// Builds a client around the given collaborators.
    #[must_use]
    pub fn with_parts(config: ClientConfig, parts: ClientParts) -> Self {
        let exchange = HttpTokenExchange::new(Arc::clone(&parts.sender), config.refresh_path.clone());
        let tokens = RefreshCoordinator::new(
            parts.store,
            Arc::new(exchange),
            parts.clock,
            config.token_safety_margin,
        );
        let api = AuthenticatedClient::new(parts.sender, tokens.clone(), config.login_path.clone());
        let registry = EventRegistry::new();
        let hub = ConnectionManager::new(
            parts.connector,
            tokens.clone(),
            registry.clone(),
            config.reconnect,
            config.hub_keepalive,
        );
        let notifications = NotificationService::new(api.clone());
        // Lives as long as the registry.
        let _feed = notifications.attach(&registry);

        Self {
            config,
            tokens,
            api,
            registry,
            hub,
            notifications,
        }
    }

    /// Signs in and stores the session.
    ///
    /// # Errors
    ///
    /// See [`AuthenticatedClient::login`].
    pub async fn login(&self, email: &str, password: &str) -> Result<SessionFlags, ClientError> {
        self.api.login(email, password).await
    }

    /// Disconnects the hub and forgets the session.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Storage`] if the store cannot be cleared.
    pub async fn logout(&self) -> Result<(), ClientError> {
        self.hub.disconnect().await;
        self.api.logout().await
    }

    /// Flags derived from the stored session, if any.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Storage`] if the store cannot be read.
    pub async fn session_flags(&self) -> Result<Option<SessionFlags>, ClientError> {
        Ok(self.tokens.store().load().await?.map(|s| s.flags()))
    }

    /// Configuration this client was built from.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Refresh coordinator (and through it, the token store).
    #[must_use]
    pub fn tokens(&self) -> &RefreshCoordinator {
        &self.tokens
    }

    /// Authenticated REST client.
    #[must_use]
    pub fn api(&self) -> &AuthenticatedClient {
        &self.api
    }

    /// Event registry fed by the hub.
    #[must_use]
    pub fn registry(&self) -> &EventRegistry {
        &self.registry
    }

    /// Hub connection.
    #[must_use]
    pub fn hub(&self) -> &ConnectionManager {
        &self.hub
    }

    /// Notification feed and actions.
    #[must_use]
    pub fn notifications(&self) -> &NotificationService {
        &self.notifications
    }
}
