//! Integration tests for the streamer over a real loopback socket.
//!
//! A blocking `std::net::TcpListener` plays the viewer: it decodes frame
//! records with the same codec the viewer uses and writes 24-byte event
//! messages back.

use std::io::Write;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::AtomicBool;
use std::thread;
use std::time::Duration;

use mirror_core::protocol::messages::Frame;
use mirror_core::{decode_header, decode_payload, encode_event, UiEvent, UiEventType};
use mirror_streamer::application::handle_events::{HandleEventsUseCase, Interaction, Key};
use mirror_streamer::application::stream_window::{StepOutcome, StreamExit, WindowStreamer};
use mirror_streamer::infrastructure::frame_source::MockFrameSource;
use mirror_streamer::infrastructure::interaction::mock::RecordingSimulator;
use mirror_streamer::infrastructure::network::StreamerConnection;

// ── Fake viewer ───────────────────────────────────────────────────────────────

fn listen() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Reads frames until the streamer closes the connection.
fn read_all_frames(mut stream: TcpStream) -> Vec<Frame> {
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let mut frames = Vec::new();
    while let Ok(header) = decode_header(&mut stream) {
        let Ok(payload) = decode_payload(&mut stream, header.payload_length) else {
            break;
        };
        frames.push(Frame::from_parts(header, payload));
    }
    frames
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_only_changed_frames_reach_viewer() {
    // Arrange
    let (listener, addr) = listen();
    let viewer = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        read_all_frames(stream)
    });
    let (connection, _events) = StreamerConnection::connect(addr, 8).await.unwrap();
    let source = MockFrameSource::new(vec![b"A".to_vec(), b"A".to_vec(), b"B".to_vec()]);
    let mut streamer = WindowStreamer::new("7", source, 30);

    // Act
    let mut outcomes = Vec::new();
    for _ in 0..3 {
        outcomes.push(streamer.step(&connection).await.unwrap());
    }
    connection.shutdown().await;
    let frames = viewer.join().unwrap();

    // Assert
    assert_eq!(
        outcomes,
        vec![StepOutcome::Sent, StepOutcome::Unchanged, StepOutcome::Sent]
    );
    assert_eq!(frames.len(), 2);
    assert!(frames.iter().all(|f| f.window_id == "7" && f.is_image()));
    assert_eq!(frames[0].payload, b"A");
    assert_eq!(frames[1].payload, b"B");
}

#[tokio::test]
async fn test_events_from_viewer_are_replayed_in_order() {
    // Arrange
    let (listener, addr) = listen();
    let viewer = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let click = UiEvent::new(UiEventType::LeftButtonDown, 0, 120, 340, 7);
        let enter = UiEvent::new(UiEventType::Keystroke, 13, 0, 0, 7);
        let invalid = UiEvent::new(UiEventType::Scroll, 0, 0, 0, 7);
        for event in [click, invalid, enter] {
            stream.write_all(&encode_event(&event)).unwrap();
        }
        // Dropping the stream ends the event channel.
    });
    let (_connection, events) = StreamerConnection::connect(addr, 8).await.unwrap();
    let handler = HandleEventsUseCase::new(RecordingSimulator::new());

    // Act
    let performed = tokio::time::timeout(Duration::from_secs(5), handler.run(events))
        .await
        .expect("event channel must close when the viewer disconnects");
    viewer.join().unwrap();

    // Assert
    assert_eq!(performed, 2);
    assert_eq!(
        handler.simulator().performed(),
        vec![
            Interaction::Click {
                window_id: 7,
                button: mirror_core::protocol::messages::MouseButton::Left,
                x: 120,
                y: 340
            },
            Interaction::KeyPress {
                window_id: 7,
                key: Key::Enter
            },
        ]
    );
}

#[tokio::test]
async fn test_streaming_stops_after_viewer_disconnects() {
    // Arrange
    let (listener, addr) = listen();
    let viewer = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        drop(stream);
    });
    let (connection, _events) = StreamerConnection::connect(addr, 8).await.unwrap();
    viewer.join().unwrap();
    // Alternating frames so every capture is sent.
    let source = MockFrameSource::new(vec![vec![1; 4096], vec![2; 4096]]);
    let mut streamer = WindowStreamer::new("7", source, 100);
    let running = AtomicBool::new(true);

    // Act
    let exit = tokio::time::timeout(Duration::from_secs(5), streamer.run(&connection, &running))
        .await
        .expect("a send must fail once the peer is gone");

    // Assert
    assert!(matches!(exit, StreamExit::SendFailed(_)));
    assert!(!connection.is_connected().await);
}
