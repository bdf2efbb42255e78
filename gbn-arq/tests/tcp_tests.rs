//! Integration tests for transfers over TCP.
//!
//! Each test binds a [`TcpReceiver`] on an OS-chosen loopback port, serves it
//! in a background task, and drives a [`GbnSender`] over a [`TcpChannel`].
//! These run on the real clock, so timeouts are kept short.

use std::net::SocketAddr;
use std::time::Duration;

use gbn_arq::{
    Channel, GbnError, GbnReceiver, GbnSender, Outcome, ScriptedFaults, TcpChannel, TcpReceiver,
    Transmission, TransferConfig, TransportError, Verdict,
};

const MESSAGE: &str = "Hello, this is a test message for Go-Back-N protocol.";

// ---------------------------------------------------------------------------
// Helper
// ---------------------------------------------------------------------------

fn loopback() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

/// Send `message` to a fresh receiver and return what each side ended up with.
async fn run_transfer(
    message: &str,
    window: usize,
    timeout: Duration,
    receiver: GbnReceiver<char>,
) -> (gbn_arq::Transfer<char>, String) {
    let server = TcpReceiver::bind(loopback(), receiver)
        .await
        .expect("bind receiver")
        .with_linger(timeout);
    let addr = server.local_addr;
    let server_task = tokio::spawn(server.serve());

    let stream: Vec<char> = message.chars().collect();
    let config = TransferConfig::new(window, timeout).unwrap();
    let mut channel = TcpChannel::new(addr);
    let done = tokio::time::timeout(
        Duration::from_secs(30),
        GbnSender::new(config).unwrap().run(&stream, &mut channel),
    )
    .await
    .expect("sender timed out")
    .expect("sender failed");

    let received = tokio::time::timeout(Duration::from_secs(30), server_task)
        .await
        .expect("receiver timed out")
        .expect("receiver task panicked")
        .expect("receiver failed");

    (done, received.into_iter().collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn clean_transfer_over_loopback() {
    let (done, received) =
        run_transfer(MESSAGE, 5, Duration::from_secs(2), GbnReceiver::new(5)).await;

    assert_eq!(received, MESSAGE);
    // The sender has no view of the remote receiver's state.
    assert_eq!(done.message, None);
    assert_eq!(done.acknowledged, MESSAGE.chars().count());
    assert_eq!(done.report.accepted, 11);
    assert_eq!(done.report.attempts, 11);
}

#[tokio::test]
async fn short_final_batch_over_loopback() {
    let (done, received) =
        run_transfer(MESSAGE, 7, Duration::from_secs(2), GbnReceiver::new(7)).await;

    assert_eq!(received, MESSAGE);
    assert_eq!(done.report.accepted, 8);
}

#[tokio::test]
async fn rejected_round_is_resent_over_loopback() {
    let receiver = GbnReceiver::new(5)
        .with_faults(ScriptedFaults::new().reject_at(6, Duration::from_millis(50)));
    let (done, received) = run_transfer(MESSAGE, 5, Duration::from_secs(2), receiver).await;

    assert_eq!(received, MESSAGE);
    assert_eq!(done.report.rejected, 1);
    assert_eq!(done.report.attempts, 12);
}

#[tokio::test]
async fn stalled_round_times_out_and_is_resent() {
    let timeout = Duration::from_millis(300);
    let receiver = GbnReceiver::new(5).with_faults(ScriptedFaults::demo(timeout));
    let (done, received) = run_transfer(MESSAGE, 5, timeout, receiver).await;

    // The stalled connection's late completion must not append anything.
    assert_eq!(received, MESSAGE);
    assert_eq!(done.report.timed_out, 1);
    assert_eq!(done.report.rejected, 1);
    assert_eq!(done.report.attempts, 13);
}

#[tokio::test]
async fn refused_connection_is_a_transport_error() {
    // Grab a free port, then close it again.
    let addr = {
        let listener = tokio::net::TcpListener::bind(loopback()).await.unwrap();
        listener.local_addr().unwrap()
    };

    let stream: Vec<char> = "abc".chars().collect();
    let config = TransferConfig::new(2, Duration::from_secs(1)).unwrap();
    let err = GbnSender::new(config)
        .unwrap()
        .run(&stream, &mut TcpChannel::new(addr))
        .await
        .unwrap_err();

    assert!(matches!(err, GbnError::Transport(TransportError::Io(_))));
}

#[tokio::test]
async fn garbage_reply_is_a_transport_error() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind(loopback()).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 64];
        let _ = stream.read(&mut buf).await;
        let _ = stream.write_all(b"NAK\n").await;
    });

    let stream: Vec<char> = "ab".chars().collect();
    let config = TransferConfig::new(2, Duration::from_secs(2)).unwrap();
    let err = GbnSender::new(config)
        .unwrap()
        .run(&stream, &mut TcpChannel::new(addr))
        .await
        .unwrap_err();

    assert!(matches!(err, GbnError::Transport(TransportError::Frame(_))));
}

#[tokio::test]
async fn resend_of_final_round_is_reacknowledged_while_lingering() {
    let server = TcpReceiver::bind(loopback(), GbnReceiver::new(2))
        .await
        .unwrap()
        .with_linger(Duration::from_millis(500));
    let addr = server.local_addr;
    let rx = server.receiver();
    let server_task = tokio::spawn(server.serve());

    let final_round = |attempt| Transmission {
        counter: 1,
        attempt,
        is_final: true,
        batch: vec!['o', 'k'],
    };
    let mut channel = TcpChannel::new(addr);
    let deadline = Duration::from_secs(2);

    let first = channel.transmit(final_round(1), deadline).await.unwrap();
    assert_eq!(first, Outcome::Verdict(Verdict::Accepted));
    assert!(rx.is_complete());

    // The sender missed the first RR and resends; the receiver still listens.
    let again = channel.transmit(final_round(2), deadline).await.unwrap();
    assert_eq!(again, Outcome::Verdict(Verdict::Accepted));

    let received = tokio::time::timeout(Duration::from_secs(5), server_task)
        .await
        .expect("receiver timed out")
        .expect("receiver task panicked")
        .expect("receiver failed");
    assert_eq!(received, vec!['o', 'k']);
}
