pub mod config;

use crate::actions::{Actions, PolicyCleanup};
use crate::core::{MirrorError, Result};
use crate::dispatcher::{CommandDispatcher, HttpTransport, RetryingTransport, Transport};
use crate::storage::MirrorStore;
use config::MirrorConfig;
use serde_json::Map;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Client handle
///
/// Owns the mirror store, the command dispatcher, and the policy cleanup
/// subscription for one signed-in session. Created with `connect`, torn
/// down with `logout` or `shutdown`.
pub struct MirrorClient {
    config: MirrorConfig,
    store: MirrorStore,
    dispatcher: CommandDispatcher,
    actions: Actions,
    cleanup: Mutex<Option<PolicyCleanup>>,
}

impl MirrorClient {
    /// Start a client over any transport. Network failures are retried
    /// according to `config.retry`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use mirrorstore::{MirrorClient, MirrorConfig, ScriptedTransport};
    /// use std::sync::Arc;
    ///
    /// # tokio_test::block_on(async {
    /// let transport = Arc::new(ScriptedTransport::new());
    /// let client = MirrorClient::connect(MirrorConfig::default(), transport).await.unwrap();
    /// client.actions().enable_policy_distance_rates("A1", true).unwrap();
    /// # });
    /// ```
    pub async fn connect(config: MirrorConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate().map_err(MirrorError::Config)?;

        let store = match &config.store.snapshot_path {
            Some(path) => MirrorStore::load_snapshot(path, config.store.clone())?,
            None => MirrorStore::with_state(config.store.clone(), Map::new())?,
        };

        let transport: Arc<dyn Transport> =
            Arc::new(RetryingTransport::new(transport, config.retry.clone()));
        let dispatcher =
            CommandDispatcher::start(store.clone(), transport, config.dispatcher.clone());
        let actions = Actions::new(dispatcher.clone());
        let cleanup = PolicyCleanup::install(&store)?;

        info!(endpoint = %config.endpoint, keys = store.len()?, "mirror client connected");

        Ok(Self {
            config,
            store,
            dispatcher,
            actions,
            cleanup: Mutex::new(Some(cleanup)),
        })
    }

    /// Start a client that posts commands over HTTP.
    pub async fn connect_http(config: MirrorConfig) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(&config)?);
        Self::connect(config, transport).await
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    pub fn store(&self) -> &MirrorStore {
        &self.store
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    pub fn actions(&self) -> &Actions {
        &self.actions
    }

    /// Abandon queued writes and clear the store, keeping preserved keys.
    /// Returns the number of abandoned writes.
    pub fn logout(&self) -> Result<usize> {
        let abandoned = self.dispatcher.abandon_pending()?;
        self.store.clear()?;
        info!(abandoned, "logged out");
        Ok(abandoned)
    }

    /// Drain the dispatcher, save the snapshot if one is configured, and
    /// remove the cleanup subscription.
    pub async fn shutdown(&self) -> Result<()> {
        self.dispatcher.shutdown().await?;

        if let Some(path) = &self.config.store.snapshot_path {
            self.store.save_snapshot(path)?;
        }

        let cleanup = self.cleanup.lock()?.take();
        if let Some(cleanup) = cleanup {
            cleanup.uninstall()?;
        }
        Ok(())
    }
}
