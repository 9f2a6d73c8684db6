//! TCP server behaviour end to end.

use std::time::Duration;

use ringframe::{
    Pipeline,
    ServerConfig,
    WorkMode,
    codec::LengthFieldCodec,
    handler::HandlerChain,
};
use ringframe_testing::{TestResult, Uppercase, decode_frames, encode_frames, spawn_server};
use rstest::rstest;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::timeout,
};

fn upper_pipeline() -> Pipeline {
    Pipeline::new(LengthFieldCodec::default(), HandlerChain::new().with(Uppercase))
}

async fn round_trip(addr: std::net::SocketAddr, payloads: &[Vec<u8>]) -> TestResult<Vec<Vec<u8>>> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(&encode_frames(payloads)).await?;
    stream.shutdown().await?;
    let mut out = Vec::new();
    timeout(Duration::from_secs(5), stream.read_to_end(&mut out)).await??;
    Ok(decode_frames(&out))
}

#[rstest]
#[case(WorkMode::SyncWithOrder)]
#[case(WorkMode::MixWithOrder)]
#[case(WorkMode::AsyncWithOrder)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_clients_get_their_own_responses(#[case] work_mode: WorkMode) -> TestResult {
    let config = ServerConfig::default()
        .with_work_mode(work_mode)
        .with_accept_workers(2)
        .with_dispatch_workers(2);
    let server = spawn_server(upper_pipeline, config).await?;
    let addr = server.addr();

    let clients = (0..8_u8).map(|client| {
        tokio::spawn(async move {
            let payloads: Vec<Vec<u8>> = (0..50_u8).map(|i| vec![b'a' + client, i]).collect();
            let expected: Vec<Vec<u8>> = payloads
                .iter()
                .map(|p| vec![p[0].to_ascii_uppercase(), p[1]])
                .collect();
            let got = round_trip(addr, &payloads).await.expect("round trip");
            assert_eq!(got, expected);
        })
    });
    for client in clients {
        client.await?;
    }
    server.stop().await
}

#[tokio::test]
async fn hello_world_over_tcp() -> TestResult {
    let server = spawn_server(
        || Pipeline::new(LengthFieldCodec::default(), HandlerChain::new()),
        ServerConfig::default(),
    )
    .await?;
    let got = round_trip(server.addr(), &[b"hello".to_vec(), b"world".to_vec()]).await?;
    assert_eq!(got, vec![b"hello".to_vec(), b"world".to_vec()]);
    server.stop().await
}

#[tokio::test]
async fn malformed_client_does_not_affect_others() -> TestResult {
    let server = spawn_server(upper_pipeline, ServerConfig::default()).await?;

    let mut bad = TcpStream::connect(server.addr()).await?;
    bad.write_all(&[0xff, 0xff, 0xff, 0xff, 1, 2, 3]).await?;
    let mut sink = Vec::new();
    // A clean EOF or a reset both mean the server dropped the stream.
    let _ = timeout(Duration::from_secs(5), bad.read_to_end(&mut sink)).await?;
    assert!(sink.is_empty());

    let got = round_trip(server.addr(), &[b"still here".to_vec()]).await?;
    assert_eq!(got, vec![b"STILL HERE".to_vec()]);
    server.stop().await
}

#[tokio::test]
async fn active_connection_count_tracks_open_streams() -> TestResult {
    let server = spawn_server(upper_pipeline, ServerConfig::default()).await?;
    let mut stream = TcpStream::connect(server.addr()).await?;
    stream.write_all(&encode_frames(&[b"x"])).await?;
    let mut echoed = [0_u8; 5];
    stream.read_exact(&mut echoed).await?;
    assert!(ringframe::active_connection_count() >= 1);
    drop(stream);
    server.stop().await
}
