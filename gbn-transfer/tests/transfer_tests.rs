//! End-to-end tests for the Go-Back-N transfer.
//!
//! Most tests run a real [`Server`] and [`Client`] over loopback.  The loss
//! and misbehaviour scenarios replace one side with a script written
//! directly against the [`Channel`] API.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;

use gbn_transfer::{
    channel::Channel,
    client::{Client, TransferError},
    config::{ClientConfig, MessageSource, ServerConfig, MAX_PAYLOAD_SIZE},
    frame::{self, Ack, Frame},
    gbn_receiver::{GbnReceiver, ReassemblyStatus, REORDER_LIMIT},
    handshake, negotiation,
    server::Server,
    session::{SessionReport, Termination},
};

const LIMIT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn server_config(max_size: usize, dynamic: bool) -> ServerConfig {
    ServerConfig {
        bind_ip: "127.0.0.1".parse().unwrap(),
        port: 0,
        maximum_msg_size: max_size,
        dynamic_message_size: dynamic,
        handshake_timeout: Duration::from_secs(5),
    }
}

fn client_config(addr: SocketAddr, window: usize, timeout: Duration, dynamic: bool) -> ClientConfig {
    ClientConfig {
        server_ip: addr.ip().to_string(),
        server_port: addr.port(),
        maximum_msg_size: 100,
        window_size: window,
        timeout,
        dynamic_message_size: dynamic,
        message: MessageSource::Inline(String::new()),
    }
}

/// Spawn a server and return its address plus the report stream.
async fn start_server(config: ServerConfig) -> (SocketAddr, mpsc::Receiver<SessionReport>) {
    let (tx, rx) = mpsc::channel(8);
    let server = Server::bind(config)
        .await
        .expect("bind server")
        .with_reports(tx)
        .with_size_seed(2024);
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    (addr, rx)
}

async fn next_report(rx: &mut mpsc::Receiver<SessionReport>) -> SessionReport {
    tokio::time::timeout(LIMIT, rx.recv())
        .await
        .expect("no session report in time")
        .expect("report channel closed")
}

fn sample_blob(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

/// Accept one raw connection for a scripted server.
async fn scripted_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Send one frame and return the cumulative number of the ack it provokes.
async fn exchange(ch: &mut Channel, body: &[u8]) -> Option<u64> {
    ch.send(body).await.unwrap();
    let ack = ch.recv().await.unwrap().unwrap();
    Ack::parse(&ack).unwrap().cumulative
}

async fn accept_channel(listener: &TcpListener) -> Channel {
    let (stream, _) = listener.accept().await.unwrap();
    Channel::new(stream).unwrap()
}

// ---------------------------------------------------------------------------
// Round trips against the real server
// ---------------------------------------------------------------------------

/// Ten bytes, size four, window two: chunks {4, 4, 2} and an exact copy.
#[tokio::test]
async fn ten_byte_walkthrough() {
    let (addr, mut reports) = start_server(server_config(4, false)).await;
    let blob = b"0123456789".to_vec();

    let cfg = client_config(addr, 2, Duration::from_secs(2), false);
    let client = Client::connect(&cfg).await.expect("connect");
    let report = tokio::time::timeout(LIMIT, client.send(&blob))
        .await
        .expect("transfer timed out")
        .expect("transfer failed");

    assert_eq!(report.negotiated_size, 4);
    assert_eq!(report.chunks, 3);
    assert_eq!(report.frames_sent, 3);
    assert_eq!(report.retransmissions, 0);

    let session = next_report(&mut reports).await;
    assert_eq!(session.outcome.data, blob);
    assert_eq!(session.outcome.status, ReassemblyStatus::Complete);
    assert_eq!(session.termination, Termination::PeerClosed);
    assert_eq!(session.frames, 3);
}

/// Byte-identical output across a spread of sizes and windows.
#[tokio::test]
async fn round_trip_fidelity_grid() {
    let (addr, mut reports) = start_server(server_config(37, false)).await;

    for (len, window) in [(0usize, 1usize), (1, 1), (36, 3), (37, 2), (1_000, 1), (4_096, 8)] {
        let blob = sample_blob(len);
        let cfg = client_config(addr, window, Duration::from_secs(2), false);
        let client = Client::connect(&cfg).await.expect("connect");
        let report = tokio::time::timeout(LIMIT, client.send(&blob))
            .await
            .expect("transfer timed out")
            .expect("transfer failed");
        assert_eq!(report.chunks, len.div_ceil(37), "len={len}");

        let session = next_report(&mut reports).await;
        assert_eq!(session.outcome.data, blob, "len={len} window={window}");
        assert!(session.outcome.is_complete());
    }
}

/// The largest accepted size still frames: a blob bigger than one message
/// arrives intact.
#[tokio::test]
async fn largest_payload_size_round_trip() {
    let (addr, mut reports) = start_server(server_config(MAX_PAYLOAD_SIZE, false)).await;
    let blob = sample_blob(MAX_PAYLOAD_SIZE + 1_000);

    let mut cfg = client_config(addr, 2, Duration::from_secs(5), false);
    cfg.maximum_msg_size = MAX_PAYLOAD_SIZE;
    let report = tokio::time::timeout(
        Duration::from_secs(60),
        Client::connect(&cfg).await.unwrap().send(&blob),
    )
    .await
    .expect("transfer timed out")
    .expect("transfer failed");

    assert_eq!(report.chunks, 2);
    let session = next_report(&mut reports).await;
    assert!(session.outcome.is_complete());
    assert!(session.outcome.data == blob, "reassembled data differs");
}

/// With dynamic sizing on both ends the payload is still reassembled exactly
/// and every size adopted lies within the server's range.
#[tokio::test]
async fn dynamic_resizing_round_trip() {
    let (addr, mut reports) = start_server(server_config(120, true)).await;
    let blob = sample_blob(5_000);

    let cfg = client_config(addr, 4, Duration::from_secs(2), true);
    let client = Client::connect(&cfg).await.expect("connect");
    let report = tokio::time::timeout(LIMIT, client.send(&blob))
        .await
        .expect("transfer timed out")
        .expect("transfer failed");

    assert!(report.resizes > 0, "no directive was adopted");
    assert!((50..=120).contains(&report.final_size.bytes));
    assert_eq!(u64::from(report.final_size.version), report.resizes);

    let session = next_report(&mut reports).await;
    assert_eq!(session.outcome.data, blob);
    assert!(session.outcome.is_complete());
    assert_eq!(session.outcome.chunks, report.chunks as u64);
}

/// A client with dynamic sizing off keeps its negotiated chunk size.
#[tokio::test]
async fn directives_ignored_when_client_not_dynamic() {
    let (addr, mut reports) = start_server(server_config(64, true)).await;
    let blob = sample_blob(1_000);

    let cfg = client_config(addr, 3, Duration::from_secs(2), false);
    let report = Client::connect(&cfg)
        .await
        .unwrap()
        .send(&blob)
        .await
        .expect("transfer failed");

    assert_eq!(report.resizes, 0);
    assert_eq!(report.final_size.bytes, 64);
    assert_eq!(report.chunks, 1_000usize.div_ceil(64));
    assert_eq!(next_report(&mut reports).await.outcome.data, blob);
}

/// Concurrent sessions never see each other's data.
#[tokio::test]
async fn concurrent_sessions_are_isolated() {
    let (addr, mut reports) = start_server(server_config(16, false)).await;

    let blobs: Vec<Vec<u8>> = (0..4u8).map(|k| vec![b'a' + k; 300 + k as usize * 50]).collect();
    let mut tasks = Vec::new();
    for blob in blobs.clone() {
        let cfg = client_config(addr, 4, Duration::from_secs(2), false);
        tasks.push(tokio::spawn(async move {
            Client::connect(&cfg).await.unwrap().send(&blob).await
        }));
    }
    for task in tasks {
        task.await.unwrap().expect("transfer failed");
    }

    let mut received = Vec::new();
    for _ in 0..blobs.len() {
        received.push(next_report(&mut reports).await.outcome.data);
    }
    received.sort();
    let mut expected = blobs;
    expected.sort();
    assert_eq!(received, expected);
}

/// A failed handshake produces no report and leaves the server serving.
#[tokio::test]
async fn bad_handshake_does_not_disturb_server() {
    let (addr, mut reports) = start_server(server_config(8, false)).await;

    let mut rogue = Channel::connect(addr).await.unwrap();
    rogue.send(b"HELLO").await.unwrap();
    let closed = tokio::time::timeout(LIMIT, rogue.recv()).await.unwrap();
    assert!(!matches!(closed, Ok(Some(_))), "server answered a bad handshake");

    let cfg = client_config(addr, 2, Duration::from_secs(2), false);
    Client::connect(&cfg)
        .await
        .unwrap()
        .send(b"still here")
        .await
        .expect("transfer failed");
    assert_eq!(next_report(&mut reports).await.outcome.data, b"still here");
}

// ---------------------------------------------------------------------------
// Server side driven by a scripted sender
// ---------------------------------------------------------------------------

/// Closing without `DONE` yields a partial result rather than a silent one.
#[tokio::test]
async fn early_close_is_reported_partial() {
    let (addr, mut reports) = start_server(server_config(8, false)).await;

    let mut ch = Channel::connect(addr).await.unwrap();
    handshake::initiate(&mut ch, LIMIT).await.unwrap();
    assert_eq!(negotiation::request_max_size(&mut ch, LIMIT).await.unwrap(), 8);

    ch.send(b"0:abc").await.unwrap();
    assert_eq!(Ack::parse(&ch.recv().await.unwrap().unwrap()).unwrap().cumulative, Some(0));
    ch.send(b"2:xyz").await.unwrap();
    assert_eq!(Ack::parse(&ch.recv().await.unwrap().unwrap()).unwrap().cumulative, Some(0));
    ch.shutdown().await.unwrap();

    let session = next_report(&mut reports).await;
    assert_eq!(session.outcome.data, b"abc");
    assert_eq!(
        session.outcome.status,
        ReassemblyStatus::Partial {
            delivered: 1,
            announced: None,
            buffered: 1
        }
    );
}

/// Out-of-order, duplicate, malformed and oversized frames in one session.
#[tokio::test]
async fn receiver_tolerates_disorder_and_garbage() {
    let (addr, mut reports) = start_server(server_config(10, false)).await;

    let mut ch = Channel::connect(addr).await.unwrap();
    handshake::initiate(&mut ch, LIMIT).await.unwrap();
    negotiation::request_max_size(&mut ch, LIMIT).await.unwrap();

    assert_eq!(exchange(&mut ch, b"2:C").await, None);
    assert_eq!(exchange(&mut ch, b"0:A").await, Some(0));
    assert_eq!(exchange(&mut ch, b"1:B").await, Some(2));
    assert_eq!(exchange(&mut ch, b"0:A").await, Some(2));

    // Dropped without an ack: no delimiter, bad sequence, over the allowance.
    ch.send(b"garbage").await.unwrap();
    ch.send(b"x:1").await.unwrap();
    let mut big = b"3:".to_vec();
    big.extend(vec![b'z'; 500]);
    ch.send(&big).await.unwrap();

    ch.send(b"3:D").await.unwrap();
    let ack = Ack::parse(&ch.recv().await.unwrap().unwrap()).unwrap();
    assert_eq!(ack.cumulative, Some(3));

    ch.send(&frame::encode_done(4)).await.unwrap();
    ch.shutdown().await.unwrap();

    let session = next_report(&mut reports).await;
    assert_eq!(session.outcome.data, b"ABCD");
    assert!(session.outcome.is_complete());
    assert_eq!(session.malformed, 3);
    assert_eq!(session.frames, 5);
}

/// A frame far beyond any window is acked but never buffered.
#[tokio::test]
async fn far_future_frame_is_not_buffered() {
    let (addr, mut reports) = start_server(server_config(8, false)).await;

    let mut ch = Channel::connect(addr).await.unwrap();
    handshake::initiate(&mut ch, LIMIT).await.unwrap();
    negotiation::request_max_size(&mut ch, LIMIT).await.unwrap();

    let far = format!("{}:x", REORDER_LIMIT + 1);
    assert_eq!(exchange(&mut ch, far.as_bytes()).await, None);
    assert_eq!(exchange(&mut ch, b"0:a").await, Some(0));
    ch.shutdown().await.unwrap();

    let session = next_report(&mut reports).await;
    assert_eq!(session.outcome.data, b"a");
    assert_eq!(
        session.outcome.status,
        ReassemblyStatus::Partial {
            delivered: 1,
            announced: None,
            buffered: 0
        }
    );
}

/// Dynamic acks carry a size directive within `[50, max]`.
#[tokio::test]
async fn dynamic_server_appends_size_to_every_ack() {
    let (addr, mut reports) = start_server(server_config(90, true)).await;

    let mut ch = Channel::connect(addr).await.unwrap();
    handshake::initiate(&mut ch, LIMIT).await.unwrap();
    negotiation::request_max_size(&mut ch, LIMIT).await.unwrap();

    for seq in 0..20u64 {
        ch.send(format!("{seq}:x").as_bytes()).await.unwrap();
        let ack = Ack::parse(&ch.recv().await.unwrap().unwrap()).unwrap();
        assert_eq!(ack.cumulative, Some(seq));
        let size = ack.new_size.expect("directive missing");
        assert!((50..=90).contains(&size), "size {size} out of range");
    }
    ch.shutdown().await.unwrap();
    assert!(!next_report(&mut reports).await.outcome.is_complete());
}

// ---------------------------------------------------------------------------
// Client side driven by a scripted receiver
// ---------------------------------------------------------------------------

/// Complete the handshake and negotiation from the server side.
async fn scripted_setup(ch: &mut Channel, max_size: usize) {
    handshake::respond(ch, LIMIT).await.unwrap();
    negotiation::announce_max_size(ch, max_size, Some(LIMIT)).await.unwrap();
}

/// Lost ack: the sender times out, resends the whole window, and the
/// duplicate-triggered ack unblocks it.
#[tokio::test]
async fn lost_ack_triggers_full_window_resend() {
    let (listener, addr) = scripted_listener().await;
    let blob = b"0123456789".to_vec();

    let receiver = tokio::spawn(async move {
        let mut ch = accept_channel(&listener).await;
        scripted_setup(&mut ch, 4).await;

        let mut rx = GbnReceiver::new();
        let mut arrivals = Vec::new();
        let mut announced = None;
        while let Some(body) = ch.recv().await.unwrap() {
            match frame::parse_frame(&body).unwrap() {
                Frame::Done { total } => announced = Some(total),
                Frame::Data(data) => {
                    arrivals.push(data.seq);
                    rx.on_frame(data.seq, data.payload);
                    // The acks for the first window are lost.
                    if arrivals.len() <= 2 {
                        continue;
                    }
                    let ack = Ack {
                        cumulative: rx.ack_number(),
                        new_size: None,
                    };
                    ch.send(&ack.encode()).await.unwrap();
                }
            }
        }
        (arrivals, rx.finish(announced))
    });

    let cfg = client_config(addr, 2, Duration::from_millis(300), false);
    let report = tokio::time::timeout(LIMIT, Client::connect(&cfg).await.unwrap().send(&blob))
        .await
        .expect("transfer timed out")
        .expect("transfer failed");

    let (arrivals, outcome) = receiver.await.unwrap();
    assert_eq!(&arrivals[..4], &[0, 1, 0, 1], "window was not resent in full");
    assert!(report.timeouts >= 1);
    assert!(report.retransmissions >= 2);
    assert_eq!(outcome.data, blob);
    assert!(outcome.is_complete());
}

/// A malformed ack is skipped; the transfer still completes.
#[tokio::test]
async fn malformed_ack_is_not_fatal() {
    let (listener, addr) = scripted_listener().await;

    let receiver = tokio::spawn(async move {
        let mut ch = accept_channel(&listener).await;
        scripted_setup(&mut ch, 5).await;
        let mut rx = GbnReceiver::new();
        let mut announced = None;
        while let Some(body) = ch.recv().await.unwrap() {
            match frame::parse_frame(&body).unwrap() {
                Frame::Done { total } => announced = Some(total),
                Frame::Data(data) => {
                    rx.on_frame(data.seq, data.payload);
                    ch.send(b"not-a-number").await.unwrap();
                    let ack = Ack {
                        cumulative: rx.ack_number(),
                        new_size: None,
                    };
                    ch.send(&ack.encode()).await.unwrap();
                }
            }
        }
        rx.finish(announced)
    });

    let cfg = client_config(addr, 1, Duration::from_secs(2), false);
    let report = Client::connect(&cfg)
        .await
        .unwrap()
        .send(b"hello world")
        .await
        .expect("transfer failed");

    assert_eq!(report.chunks, 3);
    let outcome = receiver.await.unwrap();
    assert_eq!(outcome.data, b"hello world");
    assert!(outcome.is_complete());
}

/// After a shrinking directive every new frame fits the new size, while the
/// frames already sent are resent unchanged.
#[tokio::test]
async fn shrink_directive_applies_to_unsent_chunks_only() {
    let (listener, addr) = scripted_listener().await;
    let blob = sample_blob(400);

    let receiver = tokio::spawn(async move {
        let mut ch = accept_channel(&listener).await;
        scripted_setup(&mut ch, 100).await;
        let mut rx = GbnReceiver::new();
        let mut announced = None;
        let mut sizes = Vec::new();
        while let Some(body) = ch.recv().await.unwrap() {
            match frame::parse_frame(&body).unwrap() {
                Frame::Done { total } => announced = Some(total),
                Frame::Data(data) => {
                    sizes.push((data.seq, data.payload.len()));
                    rx.on_frame(data.seq, data.payload);
                    let ack = Ack {
                        cumulative: rx.ack_number(),
                        new_size: Some(30),
                    };
                    ch.send(&ack.encode()).await.unwrap();
                }
            }
        }
        (sizes, rx.finish(announced))
    });

    let cfg = client_config(addr, 2, Duration::from_secs(2), true);
    let report = Client::connect(&cfg)
        .await
        .unwrap()
        .send(&blob)
        .await
        .expect("transfer failed");

    let (sizes, outcome) = receiver.await.unwrap();
    assert_eq!(&sizes[..2], &[(0, 100), (1, 100)]);
    assert!(sizes[2..].iter().all(|&(_, len)| len <= 30), "{sizes:?}");
    assert_eq!(report.resizes, 1);
    assert_eq!(report.chunks, 2 + 200usize.div_ceil(30));
    assert_eq!(outcome.data, blob);
    assert!(outcome.is_complete());
}

/// The peer vanishing mid-transfer aborts the client.
#[tokio::test]
async fn peer_close_mid_transfer_is_fatal() {
    let (listener, addr) = scripted_listener().await;

    let receiver = tokio::spawn(async move {
        let mut ch = accept_channel(&listener).await;
        scripted_setup(&mut ch, 4).await;
        ch.recv().await.unwrap();
        drop(ch);
    });

    let cfg = client_config(addr, 1, Duration::from_secs(2), false);
    let result = Client::connect(&cfg).await.unwrap().send(b"0123456789").await;
    receiver.await.unwrap();
    assert!(
        matches!(result, Err(TransferError::PeerClosed { .. }) | Err(TransferError::Channel(_))),
        "got {result:?}"
    );
}
