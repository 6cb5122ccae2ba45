use bytes::Bytes;
use spdy::frame::{Frame, GoAway, Ping};
use spdy::{Availability, Builder, Error, ProtocolError, Reason, SessionEvent, StreamEvent};
use std::io;
use std::task::Poll;
use std::time::Duration;

use crate::support::*;

fn closed_events(events: &[SessionEvent]) -> usize {
    events
        .iter()
        .filter(|event| matches!(event, SessionEvent::Closed(_)))
        .count()
}

#[test]
fn go_away_refuses_streams_above_the_last_id() {
    let mut client = client();
    let one = request(&mut client.session, "/1", true);
    let three = request(&mut client.session, "/3", true);
    let five = request(&mut client.session, "/5", true);
    assert!(drive(&mut client.session).is_pending());

    client.peer.send(GoAway::new(3.into(), Reason::NO_ERROR));
    assert!(drive(&mut client.session).is_pending());

    assert_eq!(client.session.availability(), Availability::GoingAway);
    assert_eq!(
        events(&mut client.session, five),
        vec![StreamEvent::Closed(Err(Error::StreamRefused))]
    );
    assert_eq!(
        client.session.create_stream(url("/7"), spdy::Priority::Medium),
        Err(Error::Aborted)
    );

    let events_so_far = session_events(&mut client.session);
    assert!(events_so_far.contains(&SessionEvent::GoAway {
        last_stream_id: 3.into(),
        reason: Reason::NO_ERROR,
        debug_data: Bytes::new(),
    }));

    client.peer.send(response(1, true));
    client.peer.send(response(3, true));
    assert_eq!(drive(&mut client.session), Poll::Ready(Ok(())));
    assert!(client.peer.is_closed());

    assert_eq!(
        events(&mut client.session, one).last(),
        Some(&StreamEvent::Closed(Ok(())))
    );
    assert_eq!(
        events(&mut client.session, three).last(),
        Some(&StreamEvent::Closed(Ok(())))
    );
    assert!(session_events(&mut client.session).contains(&SessionEvent::Closed(Ok(()))));
}

#[test]
fn repeated_go_away_closes_each_stream_once() {
    let mut client = client();
    let one = request(&mut client.session, "/1", true);
    let three = request(&mut client.session, "/3", true);
    let five = request(&mut client.session, "/5", true);
    assert!(drive(&mut client.session).is_pending());

    client.peer.send(GoAway::new(3.into(), Reason::NO_ERROR));
    assert!(drive(&mut client.session).is_pending());
    assert_eq!(
        events(&mut client.session, five),
        vec![StreamEvent::Closed(Err(Error::StreamRefused))]
    );

    client.peer.send(GoAway::new(1.into(), Reason::NO_ERROR));
    assert!(drive(&mut client.session).is_pending());
    assert!(events(&mut client.session, five).is_empty());
    assert_eq!(
        events(&mut client.session, three),
        vec![StreamEvent::Closed(Err(Error::StreamRefused))]
    );

    // a later GOAWAY may not widen the set of streams allowed to finish
    client.peer.send(GoAway::new(5.into(), Reason::NO_ERROR));
    client.peer.send(response(1, true));
    assert_eq!(drive(&mut client.session), Poll::Ready(Ok(())));

    assert_eq!(
        events(&mut client.session, one).last(),
        Some(&StreamEvent::Closed(Ok(())))
    );
    assert_eq!(closed_events(&session_events(&mut client.session)), 1);
    assert_eq!(drive(&mut client.session), Poll::Ready(Ok(())));
}

#[test]
fn go_away_aborts_queued_requests() {
    let mut client = connect(Builder::new().initial_max_concurrent_streams(1));
    request(&mut client.session, "/1", true);
    assert!(drive(&mut client.session).is_pending());

    let queued = match client
        .session
        .create_stream(url("/queued"), spdy::Priority::Medium)
        .unwrap()
    {
        spdy::CreateStream::Pending(id) => id,
        other => panic!("expected a queued request, got {:?}", other),
    };

    client.peer.send(GoAway::new(1.into(), Reason::NO_ERROR));
    assert!(drive(&mut client.session).is_pending());

    assert_eq!(
        poll_request(&mut client.session, queued),
        Poll::Ready(Err(Error::Aborted))
    );
}

#[test]
fn local_go_away_is_sent_once_and_lets_streams_finish() {
    let mut client = client();
    let stream = request(&mut client.session, "/", true);
    assert!(drive(&mut client.session).is_pending());
    client.peer.written();

    client.session.go_away(Reason::NO_ERROR);
    client.session.go_away(Reason::NO_ERROR);
    assert!(drive(&mut client.session).is_pending());
    assert_eq!(client.session.availability(), Availability::GoingAway);

    let frames = client.peer.written();
    let go_aways: Vec<_> = frames
        .iter()
        .filter(|frame| matches!(frame, Frame::GoAway(_)))
        .collect();
    assert_eq!(go_aways.len(), 1);

    client.peer.send(response(1, false));
    client.peer.send(data(1, 5, true));
    assert_eq!(drive(&mut client.session), Poll::Ready(Ok(())));
    assert_eq!(
        events(&mut client.session, stream).last(),
        Some(&StreamEvent::Closed(Ok(())))
    );
}

#[test]
fn network_change_drains_gracefully() {
    let mut client = client();
    let stream = request(&mut client.session, "/", true);
    assert!(drive(&mut client.session).is_pending());

    client.session.on_network_change();
    assert_eq!(client.session.availability(), Availability::GoingAway);
    assert!(!client.session.is_available());

    client.peer.send(response(1, true));
    assert_eq!(drive(&mut client.session), Poll::Ready(Ok(())));
    assert_eq!(
        events(&mut client.session, stream).last(),
        Some(&StreamEvent::Closed(Ok(())))
    );
}

#[test]
fn unanswered_ping_times_out() {
    let mut client = connect(Builder::new().hung_interval(Duration::from_secs(10)));
    let stream = request(&mut client.session, "/", true);
    client.session.send_ping();
    assert!(drive(&mut client.session).is_pending());
    assert_eq!(client.session.pings_in_flight(), 1);

    client.clock.advance(Duration::from_secs(11));
    assert_eq!(drive(&mut client.session), Poll::Ready(Err(Error::Timeout)));

    let frames = client.peer.written();
    let go_away = go_away_of(&frames).unwrap();
    assert_eq!(go_away.reason(), Reason::PROTOCOL_ERROR);
    assert_eq!(go_away.debug_data(), &Bytes::from_static(b"Failed ping."));
    assert_eq!(
        events(&mut client.session, stream),
        vec![StreamEvent::Closed(Err(Error::Timeout))]
    );
}

#[test]
fn answered_ping_keeps_the_session_alive() {
    let mut client = client();
    client.session.send_ping();
    assert!(drive(&mut client.session).is_pending());

    let frames = client.peer.written();
    assert_eq!(frames, vec![Frame::Ping(Ping::new(1))]);

    client.peer.send(Ping::pong(1));
    assert!(drive(&mut client.session).is_pending());
    assert_eq!(client.session.pings_in_flight(), 0);

    client.clock.advance(Duration::from_secs(60));
    assert!(drive(&mut client.session).is_pending());
    assert!(client.session.check_ping_status().is_ok());
}

#[test]
fn peer_ping_is_echoed() {
    let mut client = client();
    client.peer.send(Ping::new(8));
    assert!(drive(&mut client.session).is_pending());

    assert_eq!(client.peer.written(), vec![Frame::Ping(Ping::pong(8))]);
}

#[test]
fn unsolicited_pong_is_a_protocol_error() {
    let mut client = client();
    client.peer.send(Ping::pong(3));

    assert_eq!(
        drive(&mut client.session),
        Poll::Ready(Err(Error::Protocol(ProtocolError::FailedPing)))
    );
}

#[test]
fn quiet_connection_sends_a_ping_before_new_work() {
    let mut client = client();
    client.clock.advance(Duration::from_secs(11));

    let stream = request(&mut client.session, "/", true);
    assert!(drive(&mut client.session).is_pending());
    assert!(client.session.is_available());

    let frames = client.peer.written();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0], Frame::Ping(Ping::new(1)));
    assert!(matches!(frames[1], Frame::Headers(_)));

    client.clock.advance(Duration::from_secs(5));
    client.peer.send(Ping::pong(1));
    client.peer.send(response(1, true));
    assert!(drive(&mut client.session).is_pending());
    assert_eq!(client.session.pings_in_flight(), 0);
    assert_eq!(
        events(&mut client.session, stream).last(),
        Some(&StreamEvent::Closed(Ok(())))
    );
}

#[test]
fn ping_after_long_idle_waits_a_full_hung_interval() {
    let mut client = client();
    client.clock.advance(Duration::from_secs(30));

    client.session.send_ping();
    assert!(drive(&mut client.session).is_pending());
    assert!(client.session.check_ping_status().is_ok());

    client.clock.advance(Duration::from_secs(10));
    assert!(drive(&mut client.session).is_pending());
    assert_eq!(client.session.pings_in_flight(), 1);

    client.clock.advance(Duration::from_secs(1));
    assert_eq!(drive(&mut client.session), Poll::Ready(Err(Error::Timeout)));
}

#[test]
fn transport_eof_fails_open_streams() {
    let mut client = client();
    let stream = request(&mut client.session, "/", true);
    assert!(drive(&mut client.session).is_pending());
    client.peer.written();

    client.peer.eof();
    assert_eq!(
        drive(&mut client.session),
        Poll::Ready(Err(Error::ConnectionClosed))
    );

    assert!(go_away_of(&client.peer.written()).is_none());
    assert_eq!(
        events(&mut client.session, stream),
        vec![StreamEvent::Closed(Err(Error::ConnectionClosed))]
    );
}

#[test]
fn transport_error_closes_the_session() {
    let mut client = client();
    client.peer.read_error(io::ErrorKind::ConnectionReset);

    match drive(&mut client.session) {
        Poll::Ready(Err(Error::Io(err))) => {
            assert_eq!(err.kind(), io::ErrorKind::ConnectionReset)
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(client.session.availability(), Availability::Closed);
}

#[test]
fn idle_session_can_be_closed() {
    let mut client = client();
    let stream = request(&mut client.session, "/", true);
    assert!(drive(&mut client.session).is_pending());
    assert!(!client.session.close_if_idle());

    client.peer.send(response(1, true));
    assert!(drive(&mut client.session).is_pending());
    events(&mut client.session, stream);

    assert!(client.session.close_if_idle());
    assert_eq!(drive(&mut client.session), Poll::Ready(Ok(())));
    assert!(client.peer.is_closed());
}

#[test]
fn close_on_error_fails_everything_with_that_error() {
    let mut client = client();
    let stream = request(&mut client.session, "/", true);
    assert!(drive(&mut client.session).is_pending());
    client.peer.written();

    client.session.close_on_error(Error::Protocol(ProtocolError::UnexpectedFrame));
    assert_eq!(
        client.session.create_stream(url("/next"), spdy::Priority::Medium),
        Err(Error::ConnectionClosed)
    );
    assert_eq!(
        drive(&mut client.session),
        Poll::Ready(Err(Error::Protocol(ProtocolError::UnexpectedFrame)))
    );
    assert_eq!(
        events(&mut client.session, stream),
        vec![StreamEvent::Closed(Err(Error::Protocol(
            ProtocolError::UnexpectedFrame
        )))]
    );
    assert_eq!(
        go_away_of(&client.peer.written()).map(|go_away| go_away.reason()),
        Some(Reason::PROTOCOL_ERROR)
    );
}
