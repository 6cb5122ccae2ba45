use bytes::Bytes;
use spdy::frame::{self, Frame, Reason};
use spdy::{
    Builder, Error, HeaderBlock, Priority, ProtocolError, StreamEvent, StreamState, UserError,
};
use std::task::Poll;

use crate::support::*;

fn trailers(id: u32) -> frame::Headers {
    let mut block = HeaderBlock::new();
    block.insert("grpc-status", "0");
    let mut frame = frame::Headers::new(id.into(), block);
    frame.set_end_stream();
    frame
}

#[test]
fn request_and_response() -> anyhow::Result<()> {
    let mut client = client();
    let stream = open(&mut client.session, "/upload", Priority::Medium);
    assert_eq!(client.session.stream_state(stream), Some(StreamState::Idle));
    assert_eq!(client.session.stream_id(stream), Some(0.into()));

    let block = HeaderBlock::request("POST", &url("/upload"));
    client.session.send_headers(stream, block, false)?;
    client
        .session
        .send_data(stream, Bytes::from_static(b"hello world"), true)?;
    assert!(drive(&mut client.session).is_pending());

    assert_eq!(client.session.stream_id(stream), Some(1.into()));
    assert_eq!(
        client.session.stream_state(stream),
        Some(StreamState::HalfClosedLocal)
    );

    let frames = client.peer.written();
    assert_eq!(frames.len(), 2);
    match &frames[0] {
        Frame::Headers(headers) => {
            assert_eq!(headers.stream_id(), 1);
            assert!(!headers.is_end_stream());
            assert_eq!(headers.block().url(), Some(url("/upload")));
        }
        other => panic!("expected HEADERS, got {:?}", other),
    }
    match &frames[1] {
        Frame::Data(data) => {
            assert_eq!(data.stream_id(), 1);
            assert!(data.is_end_stream());
            assert_eq!(data.payload(), &Bytes::from_static(b"hello world"));
        }
        other => panic!("expected DATA, got {:?}", other),
    }

    client.peer.send(response(1, false));
    client.peer.send(data(1, 5, true));
    assert!(drive(&mut client.session).is_pending());

    let received = events(&mut client.session, stream);
    assert_eq!(received.len(), 3);
    match &received[0] {
        StreamEvent::Headers(block) => assert_eq!(block.status(), Some(200)),
        other => panic!("expected headers, got {:?}", other),
    }
    assert!(matches!(received[1], StreamEvent::Data(ref d) if d.len() == 5));
    assert_eq!(received[2], StreamEvent::Closed(Ok(())));

    assert!(events(&mut client.session, stream).is_empty());
    assert_eq!(client.session.stream_state(stream), None);
    assert_eq!(client.session.num_active_streams(), 0);
    Ok(())
}

#[test]
fn body_needs_open_send_side() {
    let mut client = client();

    let stream = open(&mut client.session, "/", Priority::Medium);
    assert_eq!(
        client
            .session
            .send_data(stream, Bytes::from_static(b"early"), false),
        Err(Error::User(UserError::HeadersNotSent))
    );

    let block = HeaderBlock::request("GET", &url("/"));
    client.session.send_headers(stream, block.clone(), true).unwrap();
    assert_eq!(
        client.session.send_headers(stream, block, true),
        Err(Error::User(UserError::HeadersAlreadySent))
    );
    assert_eq!(
        client
            .session
            .send_data(stream, Bytes::from_static(b"late"), false),
        Err(Error::User(UserError::SendAfterEndStream))
    );
}

#[test]
fn trailers_end_the_stream() {
    let mut client = client();
    let stream = request(&mut client.session, "/", true);
    assert!(drive(&mut client.session).is_pending());

    client.peer.send(response(1, false));
    client.peer.send(data(1, 3, false));
    client.peer.send(trailers(1));
    assert!(drive(&mut client.session).is_pending());

    let received = events(&mut client.session, stream);
    assert_eq!(received.len(), 4);
    match &received[2] {
        StreamEvent::Trailers(block) => assert_eq!(block.get("grpc-status"), Some("0")),
        other => panic!("expected trailers, got {:?}", other),
    }
    assert_eq!(received[3], StreamEvent::Closed(Ok(())));
}

#[test]
fn peer_reset_closes_the_stream() {
    let mut client = client();
    let cancelled = request(&mut client.session, "/a", true);
    let refused = request(&mut client.session, "/b", true);
    assert!(drive(&mut client.session).is_pending());

    client.peer.send(response(1, false));
    client.peer.send(frame::Reset::new(1.into(), Reason::CANCEL));
    client.peer.send(frame::Reset::new(3.into(), Reason::REFUSED_STREAM));
    assert!(drive(&mut client.session).is_pending());

    assert_eq!(
        events(&mut client.session, cancelled).last(),
        Some(&StreamEvent::Closed(Err(Error::Reset(Reason::CANCEL))))
    );
    assert_eq!(
        events(&mut client.session, refused),
        vec![StreamEvent::Closed(Err(Error::StreamRefused))]
    );
    assert!(client.session.is_available());
}

#[test]
fn no_error_reset_after_full_response_is_success() -> anyhow::Result<()> {
    let mut client = client();
    let stream = open(&mut client.session, "/upload", Priority::Medium);
    let block = HeaderBlock::request("POST", &url("/upload"));
    client.session.send_headers(stream, block, false)?;
    assert!(drive(&mut client.session).is_pending());

    client.peer.send(response(1, true));
    assert!(drive(&mut client.session).is_pending());
    assert_eq!(
        client.session.stream_state(stream),
        Some(StreamState::HalfClosedRemote)
    );

    client.peer.send(frame::Reset::new(1.into(), Reason::NO_ERROR));
    assert!(drive(&mut client.session).is_pending());

    assert_eq!(
        events(&mut client.session, stream).last(),
        Some(&StreamEvent::Closed(Ok(())))
    );
    Ok(())
}

#[test]
fn data_after_remote_end_is_stream_closed() {
    let mut client = client();
    let stream = open(&mut client.session, "/upload", Priority::Medium);
    let block = HeaderBlock::request("POST", &url("/upload"));
    client.session.send_headers(stream, block, false).unwrap();
    assert!(drive(&mut client.session).is_pending());
    client.peer.written();

    client.peer.send(response(1, true));
    client.peer.send(data(1, 5, false));
    assert!(drive(&mut client.session).is_pending());

    assert!(client
        .peer
        .written()
        .iter()
        .any(|frame| is_reset(frame, 1, Reason::STREAM_CLOSED)));
    assert_eq!(
        events(&mut client.session, stream).last(),
        Some(&StreamEvent::Closed(Err(Error::Protocol(
            ProtocolError::UnexpectedFrame
        ))))
    );
    assert!(client.session.is_available());
}

#[test]
fn data_on_idle_stream_is_reset() {
    let mut client = client();
    client.peer.send(data(1, 10, false));
    assert!(drive(&mut client.session).is_pending());

    assert!(client
        .peer
        .written()
        .iter()
        .any(|frame| is_reset(frame, 1, Reason::PROTOCOL_ERROR)));
    assert!(client.session.is_available());
}

#[test]
fn unknown_frames_are_ignored_on_known_streams() {
    let mut client = client();
    request(&mut client.session, "/", true);
    assert!(drive(&mut client.session).is_pending());

    client.peer.send_raw(&[0, 0, 0, 0xbb, 0, 0, 0, 0, 1]);
    assert!(drive(&mut client.session).is_pending());
    assert!(client.session.is_available());

    client.peer.send_raw(&[0, 0, 0, 0xbb, 0, 0, 0, 0, 5]);
    assert_eq!(
        drive(&mut client.session),
        Poll::Ready(Err(Error::Protocol(ProtocolError::UnexpectedFrame)))
    );
}

#[test]
fn read_loop_yields_after_enough_bytes() {
    let mut client = connect(Builder::new().yield_after_bytes(100));
    let stream = request(&mut client.session, "/", true);
    assert!(drive(&mut client.session).is_pending());

    client.peer.send(response(1, false));
    assert!(drive(&mut client.session).is_pending());
    assert_eq!(events(&mut client.session, stream).len(), 1);

    client.peer.send(data(1, 80, false));
    client.peer.send(data(1, 80, false));
    client.peer.send(data(1, 80, true));

    assert!(poll(&mut client.session).is_pending());
    assert_eq!(events(&mut client.session, stream).len(), 2);

    assert!(poll(&mut client.session).is_pending());
    let received = events(&mut client.session, stream);
    assert_eq!(received.len(), 2);
    assert_eq!(received[1], StreamEvent::Closed(Ok(())));
}

#[test]
fn oversized_header_block_closes_the_session() {
    let mut client = connect(Builder::new().max_header_list_size(1_000));
    let stream = request(&mut client.session, "/", true);
    assert!(drive(&mut client.session).is_pending());
    client.peer.written();

    let mut block = HeaderBlock::response(200);
    block.insert("x-long", "a".repeat(5_000));
    client.peer.send(frame::Headers::new(1.into(), block));

    assert_eq!(
        drive(&mut client.session),
        Poll::Ready(Err(Error::FrameSize))
    );
    assert_eq!(
        go_away_of(&client.peer.written()).map(|go_away| go_away.reason()),
        Some(Reason::FRAME_SIZE_ERROR)
    );
    assert_eq!(
        events(&mut client.session, stream),
        vec![StreamEvent::Closed(Err(Error::FrameSize))]
    );
}

#[test]
fn local_reset_is_sent_to_the_peer() {
    let mut client = client();
    let stream = request(&mut client.session, "/", false);
    assert!(drive(&mut client.session).is_pending());
    client.peer.written();

    client.session.reset(stream, Reason::INTERNAL_ERROR).unwrap();
    assert!(drive(&mut client.session).is_pending());

    assert!(client
        .peer
        .written()
        .iter()
        .any(|frame| is_reset(frame, 1, Reason::INTERNAL_ERROR)));
    assert_eq!(client.session.num_active_streams(), 0);
}

#[test]
fn close_is_silent() {
    let mut client = client();
    let stream = request(&mut client.session, "/", true);
    assert!(drive(&mut client.session).is_pending());
    client.peer.written();

    client.session.close(stream).unwrap();
    assert!(drive(&mut client.session).is_pending());

    assert!(client.peer.written().is_empty());
    assert_eq!(client.session.num_active_streams(), 0);

    // late frames for the stream are dropped
    client.peer.send(response(1, true));
    assert!(drive(&mut client.session).is_pending());
    assert!(client.peer.written().is_empty());
}

#[test]
fn released_handle_is_stream_closed() {
    let mut client = client();
    let stream = request(&mut client.session, "/", true);
    assert!(drive(&mut client.session).is_pending());

    client.peer.send(response(1, true));
    assert!(drive(&mut client.session).is_pending());
    events(&mut client.session, stream);

    assert_eq!(
        client
            .session
            .send_data(stream, Bytes::from_static(b"x"), true),
        Err(Error::StreamClosed)
    );
    assert_eq!(client.session.cancel(stream), Err(Error::StreamClosed));
    assert_eq!(
        client.session.release_capacity(stream, 0),
        Err(Error::StreamClosed)
    );
}

#[test]
fn stream_keeps_its_priority() {
    let mut client = client();
    let stream = open(&mut client.session, "/", Priority::Highest);

    assert_eq!(client.session.priority(stream), Some(Priority::Highest));
    assert_eq!(client.session.url(stream), Some(&url("/")));
    assert_eq!(client.session.num_created_streams(), 1);
}
