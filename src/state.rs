//! Application state management

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

use crate::config::Config;
use crate::dispatch::UpdateDispatcher;
use crate::pipeline::ChangeGate;
use crate::proxy::{ProxyClient, ProxyError};
use crate::resource::ResourceStore;
use crate::subscription::SubscriptionRegistry;

/// Error type for state initialization
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Failed to initialize proxy client: {0}")]
    Proxy(#[from] ProxyError),
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    store: ResourceStore,
    registry: SubscriptionRegistry,
    dispatcher: UpdateDispatcher,
    change_gate: ChangeGate,
    proxy: Option<ProxyClient>,
    shutdown: watch::Sender<bool>,
}

impl AppState {
    /// Create a new application state
    pub fn new(config: Config) -> Result<Self, StateError> {
        Self::with_registry(config, SubscriptionRegistry::new())
    }

    /// Create a state around an existing registry
    pub fn with_registry(
        config: Config,
        registry: SubscriptionRegistry,
    ) -> Result<Self, StateError> {
        let store = ResourceStore::new(
            config.resources.root_dir.clone(),
            config.resources.extension.clone(),
        );
        let proxy = ProxyClient::from_config(&config.proxy)?;
        let dispatcher = UpdateDispatcher::new(registry.clone());
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                registry,
                dispatcher,
                change_gate: ChangeGate::new(),
                proxy,
                shutdown,
            }),
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the resource store
    pub fn store(&self) -> &ResourceStore {
        &self.inner.store
    }

    /// Get the subscription registry
    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.inner.registry
    }

    /// Get the update dispatcher
    pub fn dispatcher(&self) -> &UpdateDispatcher {
        &self.inner.dispatcher
    }

    /// Gate shared by the change pipeline and new subscriptions
    pub fn change_gate(&self) -> &ChangeGate {
        &self.inner.change_gate
    }

    /// Get the proxy client, if proxy mode is enabled
    pub fn proxy(&self) -> Option<&ProxyClient> {
        self.inner.proxy.as_ref()
    }

    /// Ask every open subscription stream to finish
    pub fn shutdown(&self) {
        tracing::info!(
            resources = self.inner.registry.resource_count(),
            "Closing subscription streams..."
        );
        self.inner.shutdown.send_replace(true);
    }

    /// Resolves once `shutdown` has been called
    pub fn shutdown_signal(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.inner.shutdown.subscribe();
        async move {
            // An error means the state itself is gone, which is also shutdown.
            let _ = rx.wait_for(|stopped| *stopped).await;
        }
    }
}
