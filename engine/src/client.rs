//! The client context shared by every object handle.
//!
//! A [`Client`] owns the state store, the transport and the configuration.
//! It is cheap to clone; clones share everything.

use crate::config::{ClientConfig, StoreMode};
use crate::object::DataObject;
use crate::store::{InstanceStore, SingleInstanceStore, StateStore};
use crate::transport::{Method, RequestOptions, Transport, TransportError};
use crate::value::ObjectRef;
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use tracing::debug;

struct ClientInner {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    // Never held across an await point.
    store: Mutex<Box<dyn StateStore>>,
}

#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Create a client with the store selected by `config.store_mode`.
    pub fn new(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let store: Box<dyn StateStore> = match config.store_mode {
            StoreMode::SingleInstance => Box::new(SingleInstanceStore::new()),
            StoreMode::PerInstance => Box::new(InstanceStore::new()),
        };
        Self::with_store(config, transport, store)
    }

    /// Create a client around a caller-supplied store.
    pub fn with_store(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        store: Box<dyn StateStore>,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                config,
                transport,
                store: Mutex::new(store),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Exclusive access to the state store.
    pub fn store(&self) -> MutexGuard<'_, Box<dyn StateStore>> {
        self.inner.store.lock()
    }

    /// Credentials attached to every request.
    pub fn request_options(&self) -> RequestOptions {
        let config = &self.inner.config;
        RequestOptions {
            use_master_key: config.use_master_key && config.master_key.is_some(),
            session_token: config.session_token.clone(),
            installation_id: Some(config.installation_id.clone()),
        }
    }

    pub(crate) async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, TransportError> {
        debug!(%method, path, "sending request");
        let options = self.request_options();
        self.inner
            .transport
            .request(method, path, body, &options)
            .await
    }

    /// A handle to a new, unsaved object of `class_name`.
    pub fn object(&self, class_name: impl Into<String>) -> DataObject {
        self.object_from_ref(ObjectRef::new(class_name))
    }

    /// A handle to an existing server object.
    pub fn object_with_id(
        &self,
        class_name: impl Into<String>,
        object_id: impl Into<String>,
    ) -> DataObject {
        self.object_from_ref(ObjectRef::with_id(class_name, object_id))
    }

    /// A handle to the object `obj` refers to, e.g. a decoded pointer.
    pub fn object_from_ref(&self, obj: ObjectRef) -> DataObject {
        DataObject::new(self.clone(), obj)
    }

    /// Drop every tracked object state.
    pub fn clear_all_state(&self) {
        self.store().clear_all_state();
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("application_id", &self.inner.config.application_id)
            .field("store_mode", &self.inner.config.store_mode)
            .finish()
    }
}
