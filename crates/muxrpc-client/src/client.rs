use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};

use muxrpc_common::protocol::{ConnectOptions, Header, Result, RpcError};
use muxrpc_common::transport::{write_options, MessageReader, MessageWriter};
use muxrpc_common::WireCodec;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Completion payload for one call: the raw reply body on success, or
/// the error that resolved the call.
type Outcome = Result<Vec<u8>>;

/// One in-flight invocation, returned by [`Client::submit`].
///
/// Holds the receiving end of the call's one-shot completion signal. The
/// signal fires exactly once under every code path: normal response,
/// error response, write failure, or client shutdown.
#[derive(Debug)]
pub struct Call {
    /// Sequence number assigned when the call was registered
    pub seq: u64,
    /// Qualified method name this call was submitted for
    pub service_method: String,
    codec: WireCodec,
    done: oneshot::Receiver<Outcome>,
}

impl Call {
    /// Blocks until the call completes and decodes the reply.
    ///
    /// # Errors
    ///
    /// The error attached to the call: the server's error text, a
    /// transport failure, a shutdown error, or a reply decode failure
    /// (which affects this call only, never the connection).
    pub async fn wait<R: DeserializeOwned>(self) -> Result<R> {
        match self.done.await {
            Ok(Ok(body)) => self.codec.decode(&body),
            Ok(Err(e)) => Err(e),
            // The sender is only ever dropped when the client is torn
            // down without running termination, which cannot happen while
            // the receive loop is alive.
            Err(_) => Err(RpcError::Shutdown),
        }
    }

    /// Like [`wait`](Self::wait), but gives up after `timeout`.
    ///
    /// On expiry the caller gets `Timeout` immediately. The call itself
    /// stays registered and is still resolved (or force-completed at
    /// shutdown) asynchronously; the network exchange is not cancelled.
    pub async fn wait_timeout<R: DeserializeOwned>(self, timeout: Duration) -> Result<R> {
        match tokio::time::timeout(timeout, self.wait()).await {
            Ok(res) => res,
            Err(_) => Err(RpcError::Timeout(timeout)),
        }
    }
}

struct State {
    /// Next sequence number; starts at 1, 0 is reserved
    seq: u64,
    /// In-flight calls by sequence number
    pending: HashMap<u64, oneshot::Sender<Outcome>>,
    /// Set by `close`: the user hung up
    closing: bool,
    /// Set by termination: the connection failed
    shutdown: bool,
}

struct Shared {
    /// The send lock: serializes header+body pairs so concurrent
    /// submissions never interleave frames on the wire.
    writer: Mutex<MessageWriter<BoxedWriter>>,
    state: StdMutex<State>,
}

impl Shared {
    fn register(&self) -> Result<(u64, oneshot::Receiver<Outcome>)> {
        let mut state = self.state.lock().expect("client state poisoned");
        if state.closing || state.shutdown {
            return Err(RpcError::Shutdown);
        }
        let seq = state.seq;
        state.seq += 1;
        let (tx, rx) = oneshot::channel();
        state.pending.insert(seq, tx);
        Ok((seq, rx))
    }

    fn remove_call(&self, seq: u64) -> Option<oneshot::Sender<Outcome>> {
        let mut state = self.state.lock().expect("client state poisoned");
        state.pending.remove(&seq)
    }

    /// Marks the client permanently shut down and force-completes every
    /// pending call with `cause`, each exactly once.
    ///
    /// Holds the send lock for the duration so a concurrent submission
    /// cannot register a call mid-termination and never be completed.
    async fn terminate(&self, cause: RpcError) {
        let _send = self.writer.lock().await;
        let mut state = self.state.lock().expect("client state poisoned");
        state.shutdown = true;
        let closing = state.closing;
        let message = cause.to_string();
        for (_, tx) in state.pending.drain() {
            let err = if closing {
                RpcError::Shutdown
            } else {
                RpcError::Connection(message.clone())
            };
            let _ = tx.send(Err(err));
        }
    }
}

/// A multiplexing RPC client over one connection.
///
/// There may be any number of outstanding calls at once and the client
/// may be used by multiple tasks simultaneously; clone it freely, all
/// clones share the connection.
///
/// # Example
///
/// ```no_run
/// use muxrpc_client::Client;
/// use muxrpc_common::protocol::ConnectOptions;
/// use serde_json::json;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let client = Client::dial("127.0.0.1:4321", ConnectOptions::default()).await?;
/// let sum: i64 = client.call("Foo.Sum", &json!({"a": 3, "b": 4})).await?;
/// assert_eq!(sum, 7);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    shared: Arc<Shared>,
    codec: WireCodec,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("codec", &self.codec)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Performs the handshake on `stream` and starts the receive loop.
    ///
    /// The options are validated before any I/O; the magic number is
    /// always the protocol constant, callers only choose the codec.
    pub async fn new<S>(mut stream: S, options: ConnectOptions) -> Result<Client>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let codec = options.negotiate()?;
        write_options(&mut stream, &options).await?;

        let (read_half, write_half) = tokio::io::split(stream);
        let reader = MessageReader::new(Box::new(read_half) as BoxedReader, codec);
        let writer = MessageWriter::new(Box::new(write_half) as BoxedWriter, codec);

        let shared = Arc::new(Shared {
            writer: Mutex::new(writer),
            state: StdMutex::new(State {
                seq: 1,
                pending: HashMap::new(),
                closing: false,
                shutdown: false,
            }),
        });

        tokio::spawn(receive_loop(reader, shared.clone()));

        Ok(Client { shared, codec })
    }

    /// Connects to `addr` and performs the handshake.
    pub async fn dial(addr: &str, options: ConnectOptions) -> Result<Client> {
        let stream = TcpStream::connect(addr).await?;
        Client::new(stream, options).await
    }

    /// Like [`dial`](Self::dial), but connection establishment races a
    /// timer. On expiry the half-open connection is discarded and
    /// `Timeout` is returned. The handshake itself runs only after a
    /// successful connect and is not separately time-bounded.
    pub async fn dial_timeout(
        addr: &str,
        options: ConnectOptions,
        timeout: Duration,
    ) -> Result<Client> {
        match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
            Ok(stream) => Client::new(stream?, options).await,
            Err(_) => Err(RpcError::Timeout(timeout)),
        }
    }

    /// Submits a call without waiting for its completion.
    ///
    /// Safe for unlimited concurrent callers: the header+argument pair is
    /// written under the connection-wide send lock, and the call is
    /// registered in the pending table before anything hits the wire. If
    /// the client is closing or shut down, fails with `Shutdown` before
    /// any I/O.
    pub async fn submit<A: Serialize>(&self, service_method: &str, args: &A) -> Result<Call> {
        let mut writer = self.shared.writer.lock().await;
        let (seq, done) = self.shared.register()?;

        let header = Header::request(service_method, seq);
        if let Err(e) = writer.write(&header, args).await {
            // The receive loop may have raced a response and already
            // resolved this seq; only fail the call if still pending.
            if let Some(tx) = self.shared.remove_call(seq) {
                let _ = tx.send(Err(RpcError::Connection(e.to_string())));
            }
        }

        Ok(Call {
            seq,
            service_method: service_method.to_string(),
            codec: self.codec,
            done,
        })
    }

    /// Submits a call and blocks until its reply arrives.
    pub async fn call<A, R>(&self, service_method: &str, args: &A) -> Result<R>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        self.submit(service_method, args).await?.wait().await
    }

    /// Like [`call`](Self::call), but the caller is only willing to wait
    /// `timeout` for the completion signal.
    pub async fn call_timeout<A, R>(
        &self,
        service_method: &str,
        args: &A,
        timeout: Duration,
    ) -> Result<R>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        self.submit(service_method, args)
            .await?
            .wait_timeout(timeout)
            .await
    }

    /// Whether the client can still accept submissions.
    pub fn is_available(&self) -> bool {
        let state = self.shared.state.lock().expect("client state poisoned");
        !state.closing && !state.shutdown
    }

    /// Hangs up the connection.
    ///
    /// Closing an already-closing client returns `Shutdown`. Otherwise
    /// the write half is shut down and every call still pending is
    /// force-completed with a shutdown error; the receive loop winds
    /// down once the peer acknowledges the close.
    pub async fn close(&self) -> Result<()> {
        {
            let mut state = self.shared.state.lock().expect("client state poisoned");
            if state.closing {
                return Err(RpcError::Shutdown);
            }
            state.closing = true;
        }
        let shutdown = {
            let mut writer = self.shared.writer.lock().await;
            writer.shutdown().await
        };
        // Do not wait for the peer: pending callers are unblocked now,
        // even against a server that never closes its half.
        self.shared.terminate(RpcError::Shutdown).await;
        shutdown
    }
}

/// Background receive loop, one per connection.
///
/// Responses are matched strictly by sequence number; arrival order is
/// unrelated to submission order. Any loop error, including a normal
/// stream closure, triggers termination of the whole pending table.
async fn receive_loop(mut reader: MessageReader<BoxedReader>, shared: Arc<Shared>) {
    let cause = loop {
        let header = match reader.read_header().await {
            Ok(Some(header)) => header,
            Ok(None) => break RpcError::Connection("connection closed".to_string()),
            Err(e) => break e,
        };

        match shared.remove_call(header.seq) {
            // No such call: it already failed or was cancelled, but the
            // server processed it anyway. Consume the body to keep the
            // stream aligned on the next header.
            None => {
                if let Err(e) = reader.skip_body().await {
                    break e;
                }
            }
            Some(tx) if !header.error.is_empty() => {
                let skipped = reader.skip_body().await;
                let _ = tx.send(Err(RpcError::Server(header.error)));
                if let Err(e) = skipped {
                    break e;
                }
            }
            Some(tx) => match reader.read_body_bytes().await {
                Ok(body) => {
                    let _ = tx.send(Ok(body));
                }
                Err(e) => {
                    let _ = tx.send(Err(RpcError::Connection(format!("reading body: {}", e))));
                    break e;
                }
            },
        }
    };

    tracing::debug!(error = %cause, "receive loop terminating");
    shared.terminate(cause).await;
}
