use spdy::{Builder, CreateStream, Error, Priority, ProtocolError, Reason, SessionEvent, StreamEvent};
use std::task::Poll;
use std::time::Duration;
use url::Url;

use crate::support::*;

/// A session with one request open on stream 1.
fn with_request(builder: &mut Builder) -> Client {
    let mut client = connect(builder);
    request(&mut client.session, "/index.html", true);
    assert!(drive(&mut client.session).is_pending());
    client.peer.written();
    client
}

#[test]
fn pushed_stream_is_buffered_until_claimed() {
    let mut client = with_request(&mut Builder::new());
    let pushed = url("/app.js");

    client.peer.send(push_promise(1, 2, &pushed));
    assert!(drive(&mut client.session).is_pending());

    let promised = SessionEvent::PushPromised(pushed.clone());
    assert!(session_events(&mut client.session).contains(&promised));
    assert_eq!(client.session.num_pushed_streams(), 1);
    assert_eq!(client.session.num_active_pushed_streams(), 0);
    assert_eq!(client.session.num_unclaimed_pushed_streams(), 1);

    client.peer.send(response(2, false));
    client.peer.send(data(2, 10, true));
    assert!(drive(&mut client.session).is_pending());
    assert_eq!(client.session.num_pushed_streams(), 0);

    let stream = client.session.claim_pushed_stream(&pushed).unwrap();
    assert!(client.session.is_pushed_on(stream, 1.into()));
    assert_eq!(client.session.num_unclaimed_pushed_streams(), 0);
    assert!(client.session.claim_pushed_stream(&pushed).is_none());

    let received = events(&mut client.session, stream);
    assert_eq!(received.len(), 3);
    assert!(matches!(received[0], StreamEvent::Headers(_)));
    assert!(matches!(received[1], StreamEvent::Data(ref d) if d.len() == 10));
    assert_eq!(received[2], StreamEvent::Closed(Ok(())));
}

#[test]
fn pushes_do_not_take_request_slots() {
    let mut client = with_request(Builder::new().initial_max_concurrent_streams(2));

    for (id, path) in [(2, "/a.js"), (4, "/b.js"), (6, "/c.js")].iter() {
        client.peer.send(push_promise(1, *id, &url(path)));
    }
    assert!(drive(&mut client.session).is_pending());
    assert_eq!(client.session.num_pushed_streams(), 3);
    assert_eq!(client.session.num_active_streams(), 4);

    assert!(matches!(
        client.session.create_stream(url("/next"), Priority::Medium),
        Ok(CreateStream::Ready(_))
    ));
    assert!(matches!(
        client.session.create_stream(url("/queued"), Priority::Medium),
        Ok(CreateStream::Pending(_))
    ));
}

#[test]
fn oldest_unclaimed_push_is_evicted() {
    let mut client = with_request(Builder::new().max_unclaimed_pushed_streams(1));

    client.peer.send(push_promise(1, 2, &url("/a.js")));
    client.peer.send(push_promise(1, 4, &url("/b.js")));
    assert!(drive(&mut client.session).is_pending());

    assert!(client
        .peer
        .written()
        .iter()
        .any(|frame| is_reset(frame, 2, Reason::REFUSED_STREAM)));
    assert_eq!(client.session.num_unclaimed_pushed_streams(), 1);
    assert_eq!(client.session.num_pushed_streams(), 1);
    assert!(client.session.claim_pushed_stream(&url("/a.js")).is_none());
    assert!(client.session.claim_pushed_stream(&url("/b.js")).is_some());
}

#[test]
fn duplicate_push_is_refused() {
    let mut client = with_request(&mut Builder::new());

    client.peer.send(push_promise(1, 2, &url("/a.js")));
    client.peer.send(push_promise(1, 4, &url("/a.js")));
    assert!(drive(&mut client.session).is_pending());

    assert!(client
        .peer
        .written()
        .iter()
        .any(|frame| is_reset(frame, 4, Reason::REFUSED_STREAM)));
    assert_eq!(client.session.num_unclaimed_pushed_streams(), 1);
}

#[test]
fn push_refused_when_disabled() {
    let mut client = with_request(Builder::new().enable_push(false));

    client.peer.send(push_promise(1, 2, &url("/a.js")));
    assert!(drive(&mut client.session).is_pending());

    assert!(client
        .peer
        .written()
        .iter()
        .any(|frame| is_reset(frame, 2, Reason::REFUSED_STREAM)));
    assert_eq!(client.session.num_pushed_streams(), 0);
}

#[test]
fn cross_origin_push_refused() {
    let mut client = with_request(&mut Builder::new());
    let foreign = Url::parse("https://cdn.example.com/a.js").unwrap();

    client.peer.send(push_promise(1, 2, &foreign));
    assert!(drive(&mut client.session).is_pending());

    assert!(client
        .peer
        .written()
        .iter()
        .any(|frame| is_reset(frame, 2, Reason::REFUSED_STREAM)));
    assert_eq!(client.session.num_unclaimed_pushed_streams(), 0);
}

#[test]
fn trusted_proxy_may_push_any_http_origin() {
    let mut client = with_request(Builder::new().trusted_proxy(true));

    let foreign = Url::parse("http://cdn.example.com/a.js").unwrap();
    client.peer.send(push_promise(1, 2, &foreign));
    assert!(drive(&mut client.session).is_pending());
    assert_eq!(client.session.num_unclaimed_pushed_streams(), 1);

    let secure = Url::parse("https://cdn.example.com/b.js").unwrap();
    client.peer.send(push_promise(1, 4, &secure));
    assert!(drive(&mut client.session).is_pending());
    assert_eq!(client.session.num_unclaimed_pushed_streams(), 1);
}

#[test]
fn push_ids_must_increase() {
    let mut client = with_request(&mut Builder::new());

    client.peer.send(push_promise(1, 4, &url("/a.js")));
    client.peer.send(push_promise(1, 2, &url("/b.js")));

    assert_eq!(
        drive(&mut client.session),
        Poll::Ready(Err(Error::Protocol(ProtocolError::InvalidPush)))
    );
}

#[test]
fn unclaimed_push_expires() {
    let mut client = with_request(Builder::new().pushed_stream_lifetime(Duration::from_secs(10)));

    client.peer.send(push_promise(1, 2, &url("/a.js")));
    assert!(drive(&mut client.session).is_pending());
    assert_eq!(client.session.num_unclaimed_pushed_streams(), 1);

    client.clock.advance(Duration::from_secs(11));
    assert!(drive(&mut client.session).is_pending());

    assert_eq!(client.session.num_unclaimed_pushed_streams(), 0);
    assert_eq!(client.session.num_pushed_streams(), 0);
    assert!(client
        .peer
        .written()
        .iter()
        .any(|frame| is_reset(frame, 2, Reason::CANCEL)));
    assert!(client.session.claim_pushed_stream(&url("/a.js")).is_none());
}

#[test]
fn active_push_limit_refuses_new_promises() {
    let mut client = with_request(Builder::new().max_concurrent_pushed_streams(1));

    client.peer.send(push_promise(1, 2, &url("/a.js")));
    client.peer.send(response(2, false));
    assert!(drive(&mut client.session).is_pending());
    assert_eq!(client.session.num_active_pushed_streams(), 1);

    client.peer.send(push_promise(1, 4, &url("/b.js")));
    assert!(drive(&mut client.session).is_pending());

    assert!(client
        .peer
        .written()
        .iter()
        .any(|frame| is_reset(frame, 4, Reason::REFUSED_STREAM)));
    assert_eq!(client.session.num_pushed_streams(), 1);
}

#[test]
fn push_on_finished_stream_is_refused() {
    let mut client = with_request(&mut Builder::new());
    client.peer.send(response(1, true));
    client.peer.send(push_promise(1, 2, &url("/a.js")));
    assert!(drive(&mut client.session).is_pending());

    assert!(client
        .peer
        .written()
        .iter()
        .any(|frame| is_reset(frame, 2, Reason::REFUSED_STREAM)));
}
