use bytes::Bytes;
use spdy::frame::{Frame, WindowUpdate};
use spdy::{Builder, Error, HeaderBlock, Priority, ProtocolError, Reason, StreamEvent, UserError};
use std::task::Poll;

use crate::support::*;

fn start_upload(
    session: &mut spdy::Session<Mock>,
    path: &str,
    priority: Priority,
) -> spdy::StreamRef {
    let stream = open(session, path, priority);
    session
        .send_headers(stream, HeaderBlock::request("POST", &url(path)), false)
        .unwrap();
    stream
}

fn body(len: usize) -> Bytes {
    Bytes::from(vec![b'b'; len])
}

#[test]
fn initial_frames_open_the_session_window() {
    let mut client = connect_raw(
        Builder::new()
            .session_max_recv_window(1 << 20)
            .enable_push(false),
    );
    assert!(poll(&mut client.session).is_pending());

    let frames = client.peer.written();
    assert_eq!(frames.len(), 2);
    match &frames[0] {
        Frame::Settings(settings) => {
            assert!(!settings.is_ack());
            assert_eq!(settings.max_concurrent_streams(), Some(1_000));
            assert_eq!(settings.initial_window_size(), Some(65_535));
            assert_eq!(settings.is_push_enabled(), Some(false));
            assert_eq!(settings.max_header_list_size(), Some(256 * 1_024));
        }
        other => panic!("expected SETTINGS, got {:?}", other),
    }
    assert_eq!(
        frames[1],
        Frame::WindowUpdate(WindowUpdate::new(0.into(), (1 << 20) - 65_535))
    );
}

#[test]
fn unannounced_credit_cannot_be_spent_by_the_peer() {
    let mut client = connect(Builder::new().session_max_recv_window(500));
    let stream = request(&mut client.session, "/", true);
    assert!(drive(&mut client.session).is_pending());
    client.peer.written();

    client.peer.send(response(1, false));
    client.peer.send(data(1, 200, false));
    assert!(drive(&mut client.session).is_pending());

    let received = events(&mut client.session, stream);
    assert_eq!(received.len(), 2);
    assert!(matches!(received[1], StreamEvent::Data(ref d) if d.len() == 200));

    // released, but below the update threshold, so the peer never hears
    // about it
    client.session.release_capacity(stream, 200).unwrap();
    assert_eq!(client.session.session_unacked_recv_bytes(), 200);

    client.peer.send(data(1, 400, false));
    assert_eq!(
        drive(&mut client.session),
        Poll::Ready(Err(Error::FlowControl))
    );

    let frames = client.peer.written();
    assert!(!frames
        .iter()
        .any(|frame| matches!(frame, Frame::WindowUpdate(_))));
    assert_eq!(
        go_away_of(&frames).map(|go_away| go_away.reason()),
        Some(Reason::FLOW_CONTROL_ERROR)
    );
    assert_eq!(
        events(&mut client.session, stream),
        vec![StreamEvent::Closed(Err(Error::FlowControl))]
    );
}

#[test]
fn closing_returns_unconsumed_receive_credit() {
    let mut client = client();
    let stream = request(&mut client.session, "/", true);
    assert!(drive(&mut client.session).is_pending());

    client.peer.send(response(1, false));
    client.peer.send(data(1, 1_000, false));
    assert!(drive(&mut client.session).is_pending());
    assert_eq!(client.session.session_recv_window(), 65_535 - 1_000);

    client.session.cancel(stream).unwrap();
    assert_eq!(client.session.session_recv_window(), 65_535);
    assert_eq!(client.session.session_unacked_recv_bytes(), 1_000);

    assert!(drive(&mut client.session).is_pending());
    let frames = client.peer.written();
    assert!(frames
        .iter()
        .any(|frame| is_reset(frame, 1, Reason::CANCEL)));
}

#[test]
fn session_credit_goes_to_the_highest_priority_stall_first() {
    let mut client = client();
    let session = &mut client.session;

    let bulk = start_upload(session, "/bulk", Priority::Medium);
    session.send_data(bulk, body(65_535), false).unwrap();
    assert_eq!(session.session_send_window(), 0);

    let low = start_upload(session, "/low", Priority::Lowest);
    session.send_data(low, body(100), true).unwrap();
    let high = start_upload(session, "/high", Priority::Highest);
    session.send_data(high, body(100), true).unwrap();

    assert!(session.is_send_stalled(low));
    assert!(session.is_send_stalled(high));
    assert_eq!(session.num_stalled_streams(), 2);
    assert!(drive(session).is_pending());

    client.peer.send(WindowUpdate::new(0.into(), 100));
    assert!(drive(&mut client.session).is_pending());

    assert!(!client.session.is_send_stalled(high));
    assert!(client.session.is_send_stalled(low));
    assert_eq!(client.session.session_send_window(), 0);

    client.peer.send(WindowUpdate::new(0.into(), 100));
    assert!(drive(&mut client.session).is_pending());

    assert!(!client.session.is_send_stalled(low));
    assert_eq!(client.session.num_stalled_streams(), 0);

    let high_id = client.session.stream_id(high).unwrap();
    let low_id = client.session.stream_id(low).unwrap();
    let last_data: Vec<_> = client
        .peer
        .written()
        .into_iter()
        .filter_map(|frame| match frame {
            Frame::Data(data) if data.is_end_stream() => Some(data.stream_id()),
            _ => None,
        })
        .collect();
    assert_eq!(last_data, vec![high_id, low_id]);
}

#[test]
fn cancel_before_write_returns_send_credit() {
    let mut client = client();
    let mut peer_settings = settings();
    peer_settings.set_initial_window_size(Some(100));
    client.peer.send(peer_settings);
    assert!(drive(&mut client.session).is_pending());

    let stream = start_upload(&mut client.session, "/upload", Priority::Medium);
    client.session.send_data(stream, body(100), true).unwrap();
    assert_eq!(client.session.stream_send_window(stream), Some(0));
    assert_eq!(client.session.session_send_window(), 65_535 - 100);

    client.session.cancel(stream).unwrap();
    assert_eq!(client.session.session_send_window(), 65_535);

    assert!(drive(&mut client.session).is_pending());
    assert!(!client
        .peer
        .written()
        .iter()
        .any(|frame| matches!(frame, Frame::Data(_) | Frame::Headers(_))));
}

#[test]
fn initial_window_change_shifts_open_streams() {
    let mut client = client();
    let stream = start_upload(&mut client.session, "/upload", Priority::Medium);
    client.session.send_data(stream, body(2_000), false).unwrap();
    assert!(drive(&mut client.session).is_pending());

    let mut peer_settings = settings();
    peer_settings.set_initial_window_size(Some(1_000));
    client.peer.send(peer_settings);
    assert!(drive(&mut client.session).is_pending());
    assert_eq!(client.session.stream_send_window(stream), Some(-1_000));

    client.session.send_data(stream, body(10), false).unwrap();
    assert!(client.session.is_send_stalled(stream));

    client.peer.send(WindowUpdate::new(1.into(), 1_010));
    assert!(drive(&mut client.session).is_pending());
    assert!(!client.session.is_send_stalled(stream));
    assert_eq!(client.session.stream_send_window(stream), Some(0));
    assert_eq!(client.session.session_send_window(), 65_535 - 2_010);

    let other = open(&mut client.session, "/other", Priority::Medium);
    assert_eq!(client.session.stream_send_window(other), Some(1_000));
}

#[test]
fn initial_window_raise_resumes_higher_priority_first() {
    let mut client = client();
    let mut peer_settings = settings();
    peer_settings.set_initial_window_size(Some(100));
    client.peer.send(peer_settings);
    assert!(drive(&mut client.session).is_pending());

    // leave 300 bytes of session credit
    let bulk = start_upload(&mut client.session, "/bulk", Priority::Medium);
    client.session.send_data(bulk, body(65_235), false).unwrap();
    assert!(drive(&mut client.session).is_pending());
    let bulk_id = client.session.stream_id(bulk).unwrap();
    client.peer.send(WindowUpdate::new(bulk_id, 65_135));
    assert!(drive(&mut client.session).is_pending());
    assert_eq!(client.session.session_send_window(), 300);

    let low = start_upload(&mut client.session, "/low", Priority::Lowest);
    client.session.send_data(low, body(200), true).unwrap();
    let high = start_upload(&mut client.session, "/high", Priority::Highest);
    client.session.send_data(high, body(200), true).unwrap();
    assert!(client.session.is_send_stalled(low));
    assert!(client.session.is_send_stalled(high));
    assert_eq!(client.session.session_send_window(), 100);
    assert!(drive(&mut client.session).is_pending());
    client.peer.written();

    let mut peer_settings = settings();
    peer_settings.set_initial_window_size(Some(200));
    client.peer.send(peer_settings);
    assert!(drive(&mut client.session).is_pending());

    assert!(!client.session.is_send_stalled(high));
    assert!(client.session.is_send_stalled(low));
    assert_eq!(client.session.num_stalled_streams(), 1);
    assert_eq!(client.session.session_send_window(), 0);

    let high_id = client.session.stream_id(high).unwrap();
    let finished: Vec<_> = client
        .peer
        .written()
        .into_iter()
        .filter_map(|frame| match frame {
            Frame::Data(data) if data.is_end_stream() => Some(data.stream_id()),
            _ => None,
        })
        .collect();
    assert_eq!(finished, vec![high_id]);

    client.peer.send(WindowUpdate::new(0.into(), 100));
    assert!(drive(&mut client.session).is_pending());
    assert!(!client.session.is_send_stalled(low));
    assert_eq!(client.session.num_stalled_streams(), 0);
}

#[test]
fn data_frames_respect_the_peer_max_frame_size() {
    let mut client = connect(Builder::new().max_send_chunk(100_000));
    let stream = start_upload(&mut client.session, "/upload", Priority::Medium);
    client.session.send_data(stream, body(40_000), true).unwrap();
    assert!(drive(&mut client.session).is_pending());
    assert!(client.session.is_available());

    let sizes: Vec<_> = client
        .peer
        .written()
        .into_iter()
        .filter_map(|frame| match frame {
            Frame::Data(data) => Some(data.payload().len()),
            _ => None,
        })
        .collect();
    assert_eq!(sizes, vec![16_384, 16_384, 7_232]);
}

#[test]
fn oversized_initial_window_is_a_flow_control_error() {
    let mut client = client();
    let mut peer_settings = settings();
    peer_settings.set_initial_window_size(Some(1 << 31));
    client.peer.send(peer_settings);

    assert_eq!(
        drive(&mut client.session),
        Poll::Ready(Err(Error::FlowControl))
    );
}

#[test]
fn zero_session_window_update_closes_the_session() {
    let mut client = client();
    client.peer.send(WindowUpdate::new(0.into(), 0));

    assert_eq!(
        drive(&mut client.session),
        Poll::Ready(Err(Error::Protocol(ProtocolError::ZeroWindowUpdate)))
    );
    assert_eq!(
        go_away_of(&client.peer.written()).map(|go_away| go_away.reason()),
        Some(Reason::PROTOCOL_ERROR)
    );
}

#[test]
fn padding_is_credited_back_immediately() {
    let mut client = client();
    let stream = request(&mut client.session, "/", true);
    assert!(drive(&mut client.session).is_pending());

    let mut padded = data(1, 100, false);
    padded.set_padding(10);
    client.peer.send(response(1, false));
    client.peer.send(padded);
    assert!(drive(&mut client.session).is_pending());

    assert_eq!(client.session.session_recv_window(), 65_535 - 100);
    assert_eq!(client.session.stream_recv_window(stream), Some(65_535 - 100));

    let received = events(&mut client.session, stream);
    assert!(matches!(received[1], StreamEvent::Data(ref d) if d.len() == 100));
}

#[test]
fn released_capacity_is_announced_past_half_the_window() {
    let mut client = connect(Builder::new().initial_window_size(1_000));
    let stream = request(&mut client.session, "/", true);
    assert!(drive(&mut client.session).is_pending());
    client.peer.written();

    client.peer.send(response(1, false));
    client.peer.send(data(1, 600, false));
    assert!(drive(&mut client.session).is_pending());

    assert_eq!(
        client.session.release_capacity(stream, 601),
        Err(Error::User(UserError::ReleaseCapacityTooBig))
    );
    client.session.release_capacity(stream, 600).unwrap();
    assert!(drive(&mut client.session).is_pending());

    let updates: Vec<_> = client
        .peer
        .written()
        .into_iter()
        .filter(|frame| matches!(frame, Frame::WindowUpdate(_)))
        .collect();
    assert_eq!(
        updates,
        vec![Frame::WindowUpdate(WindowUpdate::new(1.into(), 600))]
    );
}

#[test]
fn stream_window_violation_resets_only_the_stream() {
    let mut client = connect(Builder::new().initial_window_size(1_000));
    let stream = request(&mut client.session, "/", true);
    assert!(drive(&mut client.session).is_pending());
    client.peer.written();

    client.peer.send(response(1, false));
    client.peer.send(data(1, 1_001, false));
    assert!(drive(&mut client.session).is_pending());

    assert!(client
        .peer
        .written()
        .iter()
        .any(|frame| is_reset(frame, 1, Reason::FLOW_CONTROL_ERROR)));
    assert_eq!(client.session.session_recv_window(), 65_535);
    assert!(client.session.is_available());

    let received = events(&mut client.session, stream);
    assert_eq!(
        received.last(),
        Some(&StreamEvent::Closed(Err(Error::FlowControl)))
    );
}
