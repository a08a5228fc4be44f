use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, WriteHalf};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinSet;

use muxrpc_common::protocol::{Header, Result, RpcError};
use muxrpc_common::transport::{read_options, MessageReader, MessageWriter};
use muxrpc_common::WireCodec;

use crate::service::{BoxedArg, MethodHandle, Service};

/// Server configuration.
#[derive(Clone, Default)]
pub struct ServerConfig {
    /// Deadline for a single method invocation. When set, a handler that
    /// outlives it is answered with a timeout error immediately; the
    /// handler keeps running in the background and its eventual result
    /// is discarded. `None` waits indefinitely.
    pub handler_timeout: Option<Duration>,
}

struct Inner {
    services: RwLock<HashMap<String, Arc<Service>>>,
    config: ServerConfig,
}

/// The muxrpc dispatch server.
///
/// Cheap to clone; all clones share the service table. One accept loop
/// serves any number of connections, each with its own request pipeline:
/// requests are decoded in order, dispatched concurrently, and answered
/// under a per-connection send lock, so responses may leave out of
/// request order but never interleaved.
///
/// # Example
///
/// ```no_run
/// use muxrpc_server::{Server, ServiceBuilder};
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct SumArgs { a: i64, b: i64 }
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let server = Server::new();
/// server.register(
///     ServiceBuilder::new("Foo")
///         .method("Sum", |args: SumArgs, reply: &mut i64| {
///             *reply = args.a + args.b;
///             Ok(())
///         })
///         .build(),
/// )?;
///
/// let listener = tokio::net::TcpListener::bind("127.0.0.1:4321").await?;
/// server.serve(listener).await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Server {
    inner: Arc<Inner>,
}

impl Server {
    pub fn new() -> Self {
        Server::with_config(ServerConfig::default())
    }

    pub fn with_config(config: ServerConfig) -> Self {
        Server {
            inner: Arc::new(Inner {
                services: RwLock::new(HashMap::new()),
                config,
            }),
        }
    }

    /// Publishes a service's methods.
    ///
    /// # Errors
    ///
    /// `ServiceAlreadyDefined` if a service with the same name was
    /// registered before.
    pub fn register(&self, service: Service) -> Result<()> {
        let mut services = self.inner.services.write().expect("service table poisoned");
        let name = service.name().to_string();
        if services.contains_key(&name) {
            return Err(RpcError::ServiceAlreadyDefined(name));
        }
        tracing::debug!(service = %name, "register service");
        services.insert(name, Arc::new(service));
        Ok(())
    }

    /// Resolves a qualified `"Service.Method"` name, splitting on the
    /// last `.`.
    ///
    /// # Errors
    ///
    /// `MalformedMethod` when there is no dot, otherwise a not-found
    /// error naming the missing service or method.
    pub fn resolve(&self, service_method: &str) -> Result<Arc<MethodHandle>> {
        let dot = service_method
            .rfind('.')
            .ok_or_else(|| RpcError::MalformedMethod(service_method.to_string()))?;
        let (service_name, method_name) = (&service_method[..dot], &service_method[dot + 1..]);

        let services = self.inner.services.read().expect("service table poisoned");
        let service = services
            .get(service_name)
            .ok_or_else(|| RpcError::ServiceNotFound(service_name.to_string()))?;
        service
            .method(method_name)
            .ok_or_else(|| RpcError::MethodNotFound(method_name.to_string()))
    }

    /// Accepts connections on `listener` until accepting fails.
    ///
    /// Each accepted connection gets its own pipeline task; a handshake
    /// or pipeline failure drops that connection without affecting
    /// others.
    pub async fn serve(&self, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    tracing::debug!(%peer, "connection accepted");
                    let server = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = server.serve_stream(stream).await {
                            tracing::warn!(%peer, error = %e, "connection ended");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept error");
                    return;
                }
            }
        }
    }

    /// Runs the request pipeline on a single connection.
    ///
    /// Blocks until the client hangs up, then waits for every dispatched
    /// invocation to finish before returning, so no response is written
    /// after teardown.
    pub async fn serve_stream<S>(&self, mut stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let options = read_options(&mut stream).await?;
        let codec = options.negotiate().map_err(|e| {
            tracing::warn!(error = %e, "handshake rejected");
            e
        })?;

        let (read_half, write_half) = tokio::io::split(stream);
        let mut reader = MessageReader::new(read_half, codec);
        let writer = Arc::new(Mutex::new(MessageWriter::new(write_half, codec)));

        let mut dispatched: JoinSet<()> = JoinSet::new();
        loop {
            // A clean end-of-stream or a broken header ends the pipeline
            // with no response; everything after a good header is
            // answered, successfully or not.
            let mut header = match reader.read_header().await {
                Ok(Some(header)) => header,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "read header error");
                    break;
                }
            };

            // The body frame is consumed unconditionally so that a
            // resolution or decode failure leaves the stream aligned on
            // the next header.
            let body = match reader.read_body_bytes().await {
                Ok(body) => body,
                Err(e) => {
                    tracing::warn!(error = %e, "read body error");
                    break;
                }
            };

            let prepared = self
                .resolve(&header.service_method)
                .and_then(|method| Ok((method.new_argument(codec, &body)?, method)));

            match prepared {
                Err(e) => {
                    header.error = e.to_string();
                    send_response(&writer, &header, codec.invalid_body()).await;
                }
                Ok((arg, method)) => {
                    dispatched.spawn(handle_request(
                        method,
                        arg,
                        header,
                        codec,
                        writer.clone(),
                        self.inner.config.handler_timeout,
                    ));
                }
            }
        }

        while dispatched.join_next().await.is_some() {}
        Ok(())
    }
}

impl Default for Server {
    fn default() -> Self {
        Server::new()
    }
}

/// One dispatched invocation: run the handler, then answer under the
/// connection's send lock.
async fn handle_request<W>(
    method: Arc<MethodHandle>,
    arg: BoxedArg,
    mut header: Header,
    codec: WireCodec,
    writer: Arc<Mutex<MessageWriter<WriteHalf<W>>>>,
    handler_timeout: Option<Duration>,
) where
    W: AsyncWrite + Send + 'static,
{
    // Handlers are plain blocking closures; run them off the reactor so
    // a slow one cannot stall other connections.
    let invocation = tokio::task::spawn_blocking(move || method.invoke(arg, codec));

    let outcome = match handler_timeout {
        Some(deadline) => match tokio::time::timeout(deadline, invocation).await {
            Ok(joined) => {
                joined.unwrap_or_else(|e| Err(RpcError::Handler(format!("handler panicked: {}", e))))
            }
            // Timer won the race: answer now, the handler keeps running
            // in the background and its result is discarded.
            Err(_) => Err(RpcError::Timeout(deadline)),
        },
        None => invocation
            .await
            .unwrap_or_else(|e| Err(RpcError::Handler(format!("handler panicked: {}", e)))),
    };

    match outcome {
        Ok(reply) => send_response(&writer, &header, reply).await,
        Err(e) => {
            header.error = e.to_string();
            send_response(&writer, &header, codec.invalid_body()).await;
        }
    }
}

async fn send_response<W>(
    writer: &Mutex<MessageWriter<WriteHalf<W>>>,
    header: &Header,
    body: Vec<u8>,
) where
    W: AsyncWrite + Send,
{
    let mut writer = writer.lock().await;
    if let Err(e) = writer.write_body_bytes(header, &body).await {
        tracing::warn!(error = %e, "write response error");
    }
}
