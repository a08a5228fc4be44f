// Integration tests for the server pipeline, driven by a raw test client
// that speaks the wire protocol frame by frame. This keeps the assertions
// at the protocol level: sequence numbers, error headers, placeholder
// bodies, frame boundaries.

use std::time::{Duration, Instant};

use muxrpc_common::protocol::{ConnectOptions, Header, MAGIC_NUMBER};
use muxrpc_common::transport::{read_frame, write_frame};
use muxrpc_common::WireCodec;
use muxrpc_server::{Server, ServerConfig, ServiceBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Serialize, Deserialize)]
struct SumArgs {
    a: i64,
    b: i64,
}

fn test_server(config: ServerConfig) -> Server {
    let server = Server::with_config(config);
    server
        .register(
            ServiceBuilder::new("Foo")
                .method("Sum", |args: SumArgs, reply: &mut i64| {
                    *reply = args.a + args.b;
                    Ok(())
                })
                .method("Sleep", |ms: u64, _reply: &mut ()| {
                    std::thread::sleep(Duration::from_millis(ms));
                    Ok(())
                })
                .build(),
        )
        .unwrap();
    server
}

async fn start_server(config: ServerConfig) -> String {
    let server = test_server(config);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move { server.serve(listener).await });
    addr
}

/// Frame-level protocol client.
struct RawClient<S> {
    stream: S,
    codec: WireCodec,
}

impl<S: AsyncRead + AsyncWrite + Unpin> RawClient<S> {
    /// Performs the handshake on an open stream.
    async fn handshake(mut stream: S, options: &ConnectOptions) -> Self {
        let payload = serde_json::to_vec(options).unwrap();
        write_frame(&mut stream, &payload).await.unwrap();
        stream.flush().await.unwrap();
        let codec = WireCodec::from_tag(&options.codec_type).unwrap_or_default();
        RawClient { stream, codec }
    }

    async fn send<A: Serialize>(&mut self, service_method: &str, seq: u64, args: &A) {
        let header = self.codec.encode(&Header::request(service_method, seq)).unwrap();
        let body = self.codec.encode(args).unwrap();
        write_frame(&mut self.stream, &header).await.unwrap();
        write_frame(&mut self.stream, &body).await.unwrap();
        self.stream.flush().await.unwrap();
    }

    /// Reads one response, returning the header and the raw body bytes.
    async fn recv(&mut self) -> (Header, Vec<u8>) {
        let header_frame = read_frame(&mut self.stream).await.unwrap().unwrap();
        let header: Header = self.codec.decode(&header_frame).unwrap();
        let body = read_frame(&mut self.stream).await.unwrap().unwrap();
        (header, body)
    }

    async fn recv_reply<R: DeserializeOwned>(&mut self) -> (Header, R) {
        let (header, body) = self.recv().await;
        let reply = self.codec.decode(&body).unwrap();
        (header, reply)
    }
}

async fn connect_raw(addr: &str, options: &ConnectOptions) -> RawClient<TcpStream> {
    let stream = TcpStream::connect(addr).await.unwrap();
    RawClient::handshake(stream, options).await
}

#[tokio::test]
async fn sum_echoes_sequence_number() {
    let addr = start_server(ServerConfig::default()).await;
    let mut client = connect_raw(&addr, &ConnectOptions::default()).await;

    client.send("Foo.Sum", 7, &SumArgs { a: 3, b: 4 }).await;
    let (header, sum) = client.recv_reply::<i64>().await;

    assert_eq!(header.seq, 7);
    assert_eq!(header.service_method, "Foo.Sum");
    assert!(header.error.is_empty());
    assert_eq!(sum, 7);
}

#[tokio::test]
async fn missing_method_gets_placeholder_body() {
    let addr = start_server(ServerConfig::default()).await;
    let mut client = connect_raw(&addr, &ConnectOptions::default()).await;

    client.send("Foo.Missing", 1, &SumArgs { a: 3, b: 4 }).await;
    let (header, body) = client.recv().await;

    assert_eq!(header.seq, 1);
    assert!(!header.error.is_empty());
    assert_eq!(body, client.codec.invalid_body());
}

#[tokio::test]
async fn malformed_name_answered_and_connection_survives() {
    let addr = start_server(ServerConfig::default()).await;
    let mut client = connect_raw(&addr, &ConnectOptions::default()).await;

    client.send("NoDotHere", 5, &SumArgs { a: 1, b: 1 }).await;
    let (header, body) = client.recv().await;
    assert_eq!(header.seq, 5);
    assert!(header.error.contains("ill-formed"), "got {:?}", header.error);
    assert_eq!(body, client.codec.invalid_body());

    // Same connection, next request still serviced.
    client.send("Foo.Sum", 6, &SumArgs { a: 2, b: 5 }).await;
    let (header, sum) = client.recv_reply::<i64>().await;
    assert_eq!(header.seq, 6);
    assert_eq!(sum, 7);
}

#[tokio::test]
async fn bad_argument_answered_and_connection_survives() {
    let addr = start_server(ServerConfig::default()).await;
    let mut client = connect_raw(&addr, &ConnectOptions::default()).await;

    // Body that does not decode as SumArgs.
    client.send("Foo.Sum", 9, &"not the right shape").await;
    let (header, body) = client.recv().await;
    assert_eq!(header.seq, 9);
    assert!(!header.error.is_empty());
    assert_eq!(body, client.codec.invalid_body());

    client.send("Foo.Sum", 10, &SumArgs { a: 4, b: 4 }).await;
    let (_, sum) = client.recv_reply::<i64>().await;
    assert_eq!(sum, 8);
}

#[tokio::test]
async fn magic_mismatch_closed_without_any_header() {
    let addr = start_server(ServerConfig::default()).await;
    let mut stream = TcpStream::connect(&addr).await.unwrap();

    let options = ConnectOptions {
        magic_number: 0x12345,
        codec_type: "application/json".to_string(),
    };
    let payload = serde_json::to_vec(&options).unwrap();
    write_frame(&mut stream, &payload).await.unwrap();
    stream.flush().await.unwrap();

    // The server drops the connection without writing a header; we see
    // either a clean EOF or a reset, never a frame.
    match read_frame(&mut stream).await {
        Ok(None) | Err(_) => {}
        Ok(Some(frame)) => panic!("server responded to bad magic: {:?}", frame),
    }
}

#[tokio::test]
async fn unsupported_codec_closed_without_any_header() {
    let addr = start_server(ServerConfig::default()).await;
    let mut stream = TcpStream::connect(&addr).await.unwrap();

    let options = ConnectOptions {
        magic_number: MAGIC_NUMBER,
        codec_type: "application/gob".to_string(),
    };
    let payload = serde_json::to_vec(&options).unwrap();
    write_frame(&mut stream, &payload).await.unwrap();
    stream.flush().await.unwrap();

    match read_frame(&mut stream).await {
        Ok(None) | Err(_) => {}
        Ok(Some(frame)) => panic!("server responded to bad codec: {:?}", frame),
    }
}

#[tokio::test]
async fn slow_handler_does_not_block_later_requests() {
    let addr = start_server(ServerConfig::default()).await;
    let mut client = connect_raw(&addr, &ConnectOptions::default()).await;

    client.send("Foo.Sleep", 1, &300u64).await;
    client.send("Foo.Sum", 2, &SumArgs { a: 1, b: 1 }).await;

    // The fast call's response overtakes the sleeping one.
    let (first, _) = client.recv().await;
    assert_eq!(first.seq, 2);
    let (second, _) = client.recv().await;
    assert_eq!(second.seq, 1);
    assert!(second.error.is_empty());
}

#[tokio::test]
async fn handler_timeout_answers_while_handler_still_runs() {
    let config = ServerConfig {
        handler_timeout: Some(Duration::from_millis(100)),
    };
    let addr = start_server(config).await;
    let mut client = connect_raw(&addr, &ConnectOptions::default()).await;

    let start = Instant::now();
    client.send("Foo.Sleep", 3, &5_000u64).await;
    let (header, body) = client.recv().await;

    // Bounded by the configured timeout, not the handler's 5 seconds.
    assert!(start.elapsed() < Duration::from_secs(2));
    assert_eq!(header.seq, 3);
    assert!(header.error.contains("Timed out"), "got {:?}", header.error);
    assert_eq!(body, client.codec.invalid_body());
}

#[tokio::test]
async fn bincode_connection_round_trip() {
    let addr = start_server(ServerConfig::default()).await;
    let mut client = connect_raw(&addr, &ConnectOptions::with_codec(WireCodec::Bincode)).await;

    client.send("Foo.Sum", 11, &SumArgs { a: 20, b: 22 }).await;
    let (header, sum) = client.recv_reply::<i64>().await;
    assert_eq!(header.seq, 11);
    assert_eq!(sum, 42);
}

#[tokio::test]
async fn serve_stream_works_over_in_memory_duplex() {
    let server = test_server(ServerConfig::default());
    let (near, far) = tokio::io::duplex(4096);
    tokio::spawn(async move {
        let _ = server.serve_stream(far).await;
    });

    let mut client = RawClient::handshake(near, &ConnectOptions::default()).await;
    client.send("Foo.Sum", 1, &SumArgs { a: 30, b: 12 }).await;
    let (header, sum) = client.recv_reply::<i64>().await;
    assert!(header.error.is_empty());
    assert_eq!(sum, 42);
}
