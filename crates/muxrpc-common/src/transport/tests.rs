use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::codec::WireCodec;
use crate::protocol::{ConnectOptions, Header, RpcError, MAGIC_NUMBER};
use crate::transport::frame::{read_frame, write_frame};
use crate::transport::message::{read_options, write_options, MessageReader, MessageWriter};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct SumArgs {
    a: i64,
    b: i64,
}

#[tokio::test]
async fn frame_round_trip() {
    let (mut client, mut server) = tokio::io::duplex(1024);
    write_frame(&mut client, b"hello").await.unwrap();
    client.flush().await.unwrap();

    let frame = read_frame(&mut server).await.unwrap();
    assert_eq!(frame.as_deref(), Some(&b"hello"[..]));
}

#[tokio::test]
async fn empty_frame_round_trip() {
    let (mut client, mut server) = tokio::io::duplex(64);
    write_frame(&mut client, b"").await.unwrap();
    client.flush().await.unwrap();

    let frame = read_frame(&mut server).await.unwrap();
    assert_eq!(frame.as_deref(), Some(&b""[..]));
}

#[tokio::test]
async fn clean_eof_yields_none() {
    let (client, mut server) = tokio::io::duplex(64);
    drop(client);
    assert!(read_frame(&mut server).await.unwrap().is_none());
}

#[tokio::test]
async fn mid_frame_eof_is_connection_error() {
    let (mut client, mut server) = tokio::io::duplex(64);
    // Length prefix promising 10 bytes, then only 3 before closing.
    client.write_all(&10u32.to_be_bytes()).await.unwrap();
    client.write_all(b"abc").await.unwrap();
    drop(client);

    let err = read_frame(&mut server).await.unwrap_err();
    assert!(matches!(err, RpcError::Connection(_)), "got {:?}", err);
}

#[tokio::test]
async fn oversized_length_prefix_rejected() {
    let (mut client, mut server) = tokio::io::duplex(64);
    client.write_all(&u32::MAX.to_be_bytes()).await.unwrap();

    let err = read_frame(&mut server).await.unwrap_err();
    assert!(matches!(err, RpcError::MessageTooLarge(..)));
}

#[tokio::test]
async fn message_round_trip_both_codecs() {
    for codec in [WireCodec::Json, WireCodec::Bincode] {
        let (client, server) = tokio::io::duplex(1024);
        let mut writer = MessageWriter::new(client, codec);
        let mut reader = MessageReader::new(server, codec);

        let header = Header::request("Foo.Sum", 3);
        let args = SumArgs { a: 3, b: 4 };
        writer.write(&header, &args).await.unwrap();

        let got = reader.read_header().await.unwrap().unwrap();
        assert_eq!(got, header);
        let body: SumArgs = reader.read_body().await.unwrap();
        assert_eq!(body, args);
    }
}

#[tokio::test]
async fn skip_body_keeps_stream_aligned() {
    let codec = WireCodec::Json;
    let (client, server) = tokio::io::duplex(1024);
    let mut writer = MessageWriter::new(client, codec);
    let mut reader = MessageReader::new(server, codec);

    writer
        .write(&Header::request("Foo.Sum", 1), &SumArgs { a: 1, b: 2 })
        .await
        .unwrap();
    writer
        .write(&Header::request("Foo.Sum", 2), &SumArgs { a: 3, b: 4 })
        .await
        .unwrap();

    // Skip the first body; the second message must still parse.
    reader.read_header().await.unwrap().unwrap();
    reader.skip_body().await.unwrap();

    let second = reader.read_header().await.unwrap().unwrap();
    assert_eq!(second.seq, 2);
    let body: SumArgs = reader.read_body().await.unwrap();
    assert_eq!(body, SumArgs { a: 3, b: 4 });
}

#[tokio::test]
async fn handshake_round_trip() {
    let (mut client, mut server) = tokio::io::duplex(256);
    let options = ConnectOptions::with_codec(WireCodec::Bincode);
    write_options(&mut client, &options).await.unwrap();

    let got = read_options(&mut server).await.unwrap();
    assert_eq!(got, options);
    assert_eq!(got.negotiate().unwrap(), WireCodec::Bincode);
}

#[tokio::test]
async fn handshake_is_json_regardless_of_codec() {
    // The record itself must be readable without knowing the codec.
    let (mut client, mut server) = tokio::io::duplex(256);
    write_options(&mut client, &ConnectOptions::with_codec(WireCodec::Bincode))
        .await
        .unwrap();

    let frame = read_frame(&mut server).await.unwrap().unwrap();
    let value: serde_json::Value = serde_json::from_slice(&frame).unwrap();
    assert_eq!(value["magic_number"], serde_json::json!(MAGIC_NUMBER));
}
