//! Smoke tests for the `ringframe_testing` helpers themselves.

use ringframe::{Pipeline, ServerConfig, codec::LengthFieldCodec, handler::HandlerChain};
use ringframe_testing::{TestResult, decode_frames, drive_with_capacity, encode_frames, spawn_server};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

fn echo() -> Pipeline { Pipeline::new(LengthFieldCodec::default(), HandlerChain::new()) }

#[tokio::test]
async fn drive_returns_engine_for_inspection() -> TestResult {
    let out = drive_with_capacity(
        ServerConfig::default(),
        echo(),
        vec![encode_frames(&[b"abc"])],
        64,
    )
    .await?;
    assert_eq!(decode_frames(&out.bytes), vec![b"abc".to_vec()]);
    assert_eq!(out.engine.pool().stats().outstanding(), Some(0));
    Ok(())
}

#[tokio::test]
async fn spawned_server_accepts_and_stops() -> TestResult {
    let server = spawn_server(echo, ServerConfig::default().with_accept_workers(1)).await?;
    let mut stream = TcpStream::connect(server.addr()).await?;
    stream.write_all(&encode_frames(&[b"ping"])).await?;
    let mut buf = [0_u8; 8];
    stream.read_exact(&mut buf).await?;
    assert_eq!(&buf[4..], b"ping");
    server.stop().await
}
