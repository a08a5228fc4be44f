//! End-to-end demo: register Foo.Sum, serve on an ephemeral port, dial
//! and issue a handful of concurrent calls over one connection.
//!
//! Run with `cargo run --example sum_demo`.

use muxrpc_client::Client;
use muxrpc_common::protocol::ConnectOptions;
use muxrpc_server::{Server, ServiceBuilder};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
struct SumArgs {
    a: i64,
    b: i64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .init();

    let server = Server::new();
    server.register(
        ServiceBuilder::new("Foo")
            .method("Sum", |args: SumArgs, reply: &mut i64| {
                *reply = args.a + args.b;
                Ok(())
            })
            .build(),
    )?;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "rpc server listening");
    tokio::spawn(async move { server.serve(listener).await });

    let client = Client::dial(&addr.to_string(), ConnectOptions::default()).await?;

    let mut handles = Vec::new();
    for i in 0..5i64 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            let args = SumArgs { a: i, b: i * i };
            let reply: i64 = client.call("Foo.Sum", &args).await?;
            tracing::info!("{} + {} = {}", args.a, args.b, reply);
            Ok::<_, muxrpc_common::RpcError>(())
        }));
    }
    for handle in handles {
        handle.await??;
    }

    client.close().await?;
    Ok(())
}
