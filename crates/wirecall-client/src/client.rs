use std::sync::Arc;

use wirecall_common::protocol::error::Result;
use wirecall_common::protocol::Request;
use wirecall_common::transform::{Transformer, Wire};
use wirecall_common::transport::{Connector, TcpConnector};

use crate::adapter::{CallAdapter, CallAdapterFactory, FutureCallAdapterFactory, ReturnShape};
use crate::call::Call;
use crate::composer::{Api, Composer};
use crate::config::ClientConfig;
use crate::multicall::MultiCall;
use crate::pool::{ConnectionPool, PoolStats};

/// State shared by a client and every method, call and batch it creates.
pub struct Dispatcher {
    pool: Arc<ConnectionPool>,
    transformer: Arc<Transformer>,
    config: ClientConfig,
    call_adapters: Vec<Arc<dyn CallAdapterFactory>>,
}

impl Dispatcher {
    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn transformer(&self) -> &Arc<Transformer> {
        &self.transformer
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// First registered factory that handles `shape`.
    pub fn call_adapter(&self, shape: &ReturnShape) -> Option<Arc<dyn CallAdapter>> {
        self.call_adapters
            .iter()
            .find_map(|factory| factory.get(shape))
    }
}

/// Client for one wirecall endpoint.
///
/// Cheap to clone; clones share the connection pool and adapter registry.
///
/// # Example
///
/// ```rust,no_run
/// use wirecall_client::{Client, ClientConfig, MethodSpec};
///
/// let client = Client::builder()
///     .tcp("127.0.0.1:9090")
///     .config(ClientConfig::default().with_max_connections(4))
///     .build()
///     .unwrap();
///
/// let get_name = client
///     .composer()
///     .compose::<(i64,), String>(MethodSpec::new("get_name").param("user_id"))
///     .unwrap();
/// let name = get_name.call((42,)).unwrap().execute().unwrap();
/// ```
#[derive(Clone)]
pub struct Client {
    dispatcher: Arc<Dispatcher>,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// A client with default configuration for a TCP endpoint.
    pub fn connect(addr: impl Into<String>) -> Result<Self> {
        Self::builder().tcp(addr).build()
    }

    pub fn composer(&self) -> Composer {
        Composer::new(Arc::clone(&self.dispatcher))
    }

    /// Builds an [`Api`] implementation from its method templates.
    pub fn create<X: Api>(&self) -> Result<X> {
        self.composer().create::<X>()
    }

    /// A call for an already encoded request.
    pub fn call<T: Wire>(&self, request: Request) -> Result<Call<T>> {
        let decoder = self.dispatcher.transformer.adapter::<T>()?;
        Ok(Call::new(
            Arc::new(request),
            decoder,
            Arc::clone(&self.dispatcher),
        ))
    }

    /// An empty batch whose responses decode as `T`.
    pub fn multi_call<K, T>(&self) -> MultiCall<K, T>
    where
        K: Clone + Eq + std::hash::Hash + Send + Sync + 'static,
        T: Send + 'static,
    {
        MultiCall::new(Arc::clone(&self.dispatcher))
    }

    pub fn transformer(&self) -> &Arc<Transformer> {
        &self.dispatcher.transformer
    }

    pub fn config(&self) -> &ClientConfig {
        &self.dispatcher.config
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.dispatcher.pool.stats()
    }
}

enum Endpoint {
    Tcp(String),
    Custom(Arc<dyn Connector>),
}

/// Builder for [`Client`].
///
/// An endpoint is required: either [`tcp`](Self::tcp) or a custom
/// [`connector`](Self::connector). The built-in future call adapter is
/// always registered after any user factories.
#[derive(Default)]
pub struct ClientBuilder {
    endpoint: Option<Endpoint>,
    config: ClientConfig,
    transformer: Option<Arc<Transformer>>,
    call_adapters: Vec<Arc<dyn CallAdapterFactory>>,
}

impl ClientBuilder {
    pub fn tcp(mut self, addr: impl Into<String>) -> Self {
        self.endpoint = Some(Endpoint::Tcp(addr.into()));
        self
    }

    pub fn connector(mut self, connector: impl Connector) -> Self {
        self.endpoint = Some(Endpoint::Custom(Arc::new(connector)));
        self
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Shares an adapter registry with other clients.
    pub fn transformer(mut self, transformer: Arc<Transformer>) -> Self {
        self.transformer = Some(transformer);
        self
    }

    pub fn call_adapter_factory(mut self, factory: impl CallAdapterFactory) -> Self {
        self.call_adapters.push(Arc::new(factory));
        self
    }

    pub fn build(self) -> Result<Client> {
        self.config.validate()?;

        let connector: Arc<dyn Connector> = match self.endpoint {
            Some(Endpoint::Tcp(addr)) => Arc::new(
                TcpConnector::new(addr)
                    .with_connect_timeout(self.config.connect_timeout())
                    .with_io_timeout(self.config.io_timeout())
                    .with_max_message_size(self.config.max_message_size),
            ),
            Some(Endpoint::Custom(connector)) => connector,
            None => {
                return Err(wirecall_common::WirecallError::Usage(
                    "client endpoint not set; call tcp() or connector()".to_string(),
                ))
            }
        };

        let pool = Arc::new(ConnectionPool::new(
            connector,
            self.config.max_connections,
            self.config.acquire_timeout(),
        ));

        let mut call_adapters = self.call_adapters;
        call_adapters.push(Arc::new(FutureCallAdapterFactory));

        tracing::debug!(
            max_connections = self.config.max_connections,
            batch_connections = self.config.batch_connections,
            "Created client"
        );

        Ok(Client {
            dispatcher: Arc::new(Dispatcher {
                pool,
                transformer: self.transformer.unwrap_or_default(),
                config: self.config,
                call_adapters,
            }),
        })
    }
}
