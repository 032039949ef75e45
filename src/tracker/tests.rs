use super::*;
use super::frame::{ConnectRequest, Response, ScrapeRequest};
use super::http::{build_get_request, parse_http_response, ResponseHead};
use crate::bencode::{encode, Value};
use crate::constants::{CONNECT_FRAME_LEN, SCRAPE_REQUEST_LEN, UDP_PROTOCOL_ID};
use crate::torrent::InfoHash;

use proptest::prelude::*;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use url::Url;

fn test_hash() -> InfoHash {
    let mut bytes = [0u8; 20];
    for (i, b) in bytes.iter_mut().enumerate() {
        *b = i as u8 * 13;
    }
    InfoHash::new(bytes)
}

fn tracker_addr() -> SocketAddr {
    "127.0.0.1:6969".parse().unwrap()
}

fn scrape_body(info_hash: &InfoHash, complete: i64, downloaded: i64, incomplete: i64) -> Vec<u8> {
    let entry = Value::dict([
        ("complete", Value::from(complete)),
        ("downloaded", Value::from(downloaded)),
        ("incomplete", Value::from(incomplete)),
    ]);
    encode(&Value::dict([(
        "files",
        Value::dict([(info_hash.as_bytes().as_slice(), entry)]),
    )]))
}

#[test]
fn test_connect_request_layout() {
    let bytes = ConnectRequest { transaction_id: -7 }.encode();
    assert_eq!(bytes.len(), CONNECT_FRAME_LEN);
    assert_eq!(&bytes[..8], &UDP_PROTOCOL_ID.to_be_bytes());
    assert_eq!(&bytes[8..12], &[0, 0, 0, 0]);

    let decoded = ConnectRequest::decode(&bytes).unwrap();
    assert_eq!(decoded.transaction_id, -7);
}

#[test]
fn test_scrape_request_carries_ids_and_hash() {
    let request = ScrapeRequest {
        connection_id: 0xDEAD_BEEF_0102_0304,
        transaction_id: 4242,
        info_hash: test_hash(),
    };
    let bytes = request.encode();
    assert_eq!(bytes.len(), SCRAPE_REQUEST_LEN);
    assert_eq!(&bytes[16..], test_hash().as_bytes());

    let decoded = ScrapeRequest::decode(&bytes).unwrap();
    assert_eq!(decoded, request);
}

#[test]
fn test_frames_round_trip_extreme_values() {
    for transaction_id in [i32::MIN, -1, 0, i32::MAX] {
        for connection_id in [0, 1, UDP_PROTOCOL_ID, u64::MAX] {
            for hash in [[0x00; 20], [0xFF; 20]] {
                let request = ScrapeRequest {
                    connection_id,
                    transaction_id,
                    info_hash: InfoHash::new(hash),
                };
                assert_eq!(ScrapeRequest::decode(&request.encode()).unwrap(), request);

                let connect = Response::Connect {
                    transaction_id,
                    connection_id,
                };
                assert_eq!(Response::parse(&connect.encode()).unwrap(), connect);
            }
        }

        let connect = ConnectRequest { transaction_id };
        assert_eq!(ConnectRequest::decode(&connect.encode()).unwrap(), connect);

        let scrape = Response::Scrape {
            transaction_id,
            state: SwarmState::new(u32::MAX, 0, u32::MAX),
        };
        assert_eq!(Response::parse(&scrape.encode()).unwrap(), scrape);
    }
}

proptest! {
    #[test]
    fn test_connect_request_round_trip(transaction_id in any::<i32>()) {
        let request = ConnectRequest { transaction_id };
        prop_assert_eq!(ConnectRequest::decode(&request.encode()).unwrap(), request);
    }

    #[test]
    fn test_scrape_request_round_trip(
        connection_id in any::<u64>(),
        transaction_id in any::<i32>(),
        hash in any::<[u8; 20]>(),
    ) {
        let request = ScrapeRequest {
            connection_id,
            transaction_id,
            info_hash: InfoHash::new(hash),
        };
        let bytes = request.encode();
        prop_assert_eq!(&bytes[16..], &hash[..]);
        prop_assert_eq!(ScrapeRequest::decode(&bytes).unwrap(), request);
    }

    #[test]
    fn test_response_round_trip(
        transaction_id in any::<i32>(),
        connection_id in any::<u64>(),
        counts in any::<(u32, u32, u32)>(),
        message in "[ -~]{0,64}",
    ) {
        let responses = [
            Response::Connect { transaction_id, connection_id },
            Response::Scrape {
                transaction_id,
                state: SwarmState::new(counts.0, counts.1, counts.2),
            },
            Response::Error { transaction_id, message },
        ];
        for response in responses {
            let parsed = Response::parse(&response.encode()).unwrap();
            prop_assert_eq!(parsed.transaction_id(), transaction_id);
            prop_assert_eq!(parsed, response);
        }
    }
}

#[test]
fn test_connect_request_rejects_wrong_magic() {
    let mut bytes = ConnectRequest { transaction_id: 1 }.encode().to_vec();
    bytes[0] ^= 0xFF;
    assert!(ConnectRequest::decode(&bytes).is_err());
}

#[test]
fn test_parse_scrape_response_frame() {
    let frame = Response::Scrape {
        transaction_id: 99,
        state: SwarmState::new(5, 42, 3),
    }
    .encode();
    assert_eq!(frame.len(), 20);

    let parsed = Response::parse(&frame).unwrap();
    assert_eq!(parsed.transaction_id(), 99);
    assert_eq!(
        parsed,
        Response::Scrape {
            transaction_id: 99,
            state: SwarmState::new(5, 42, 3),
        }
    );
}

#[test]
fn test_parse_error_frame() {
    let frame = Response::Error {
        transaction_id: 1,
        message: "torrent not registered".into(),
    }
    .encode();

    match Response::parse(&frame).unwrap() {
        Response::Error { message, .. } => assert_eq!(message, "torrent not registered"),
        other => panic!("expected error frame, got {other:?}"),
    }
}

#[test]
fn test_parse_rejects_malformed_frames() {
    // Too short for a header.
    assert!(matches!(
        Response::parse(&[0, 0, 0, 0, 0, 0, 0]),
        Err(TrackerError::InvalidResponse(_))
    ));

    // Connect response one byte short.
    let connect = Response::Connect {
        transaction_id: 1,
        connection_id: 2,
    }
    .encode();
    assert!(Response::parse(&connect[..15]).is_err());

    // Scrape response with trailing garbage.
    let mut scrape = Response::Scrape {
        transaction_id: 1,
        state: SwarmState::default(),
    }
    .encode()
    .to_vec();
    scrape.push(0);
    assert!(Response::parse(&scrape).is_err());

    // Announce (1) and unknown actions are not scrape replies.
    assert!(Response::parse(&[0, 0, 0, 1, 0, 0, 0, 1]).is_err());
    assert!(Response::parse(&[0, 0, 0, 9, 0, 0, 0, 1]).is_err());
}

#[test]
fn test_cache_entry_expires_after_ttl() {
    let cache = ConnectionCache::new();
    let now = Instant::now();
    cache.insert_at(tracker_addr(), 77, now);

    assert_eq!(
        cache.lookup(&tracker_addr(), now + Duration::from_secs(59)).map(|(id, _)| id),
        Some(77)
    );
    assert_eq!(cache.lookup(&tracker_addr(), now + Duration::from_secs(60)), None);
    // The expired entry is gone for good.
    assert!(cache.is_empty());
}

#[test]
fn test_cache_put_replaces_entry() {
    let cache = ConnectionCache::new();
    cache.put(tracker_addr(), 1);
    cache.put(tracker_addr(), 2);

    assert_eq!(cache.get(&tracker_addr()), Some(2));
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.remove(&tracker_addr()), Some(2));
    assert_eq!(cache.get(&tracker_addr()), None);
}

#[test]
fn test_cache_purge_expired() {
    let cache = ConnectionCache::with_ttl(Duration::ZERO);
    cache.put(tracker_addr(), 1);
    assert_eq!(cache.len(), 1);

    cache.purge_expired();
    assert!(cache.is_empty());
}

#[test]
fn test_session_connect_then_scrape() {
    let cache = ConnectionCache::new();
    let mut session = UdpSession::new("udp://t", tracker_addr(), test_hash(), &cache);
    assert_eq!(session.phase(), SessionPhase::Connecting);

    let connect = ConnectRequest::decode(&session.next_request()).unwrap();
    assert_eq!(connect.transaction_id, session.transaction_id());

    let reply = Response::Connect {
        transaction_id: connect.transaction_id,
        connection_id: 0xC0FFEE,
    }
    .encode();
    let scrape = match session.on_datagram(&reply, &cache) {
        Transition::Send(bytes) => ScrapeRequest::decode(&bytes).unwrap(),
        other => panic!("expected scrape request, got {other:?}"),
    };

    assert_eq!(session.phase(), SessionPhase::Scraping);
    assert_eq!(scrape.connection_id, 0xC0FFEE);
    assert_eq!(scrape.info_hash, test_hash());
    assert_eq!(scrape.transaction_id, session.transaction_id());
    assert_eq!(cache.get(&tracker_addr()), Some(0xC0FFEE));

    let reply = Response::Scrape {
        transaction_id: scrape.transaction_id,
        state: SwarmState::new(5, 42, 3),
    }
    .encode();
    match session.on_datagram(&reply, &cache) {
        Transition::Finished(Ok(state)) => assert_eq!(state, SwarmState::new(5, 42, 3)),
        other => panic!("expected success, got {other:?}"),
    }
    assert!(session.is_done());
}

#[test]
fn test_session_ignores_foreign_transaction() {
    let cache = ConnectionCache::new();
    let mut session = UdpSession::new("udp://t", tracker_addr(), test_hash(), &cache);
    session.next_request();

    let stale = Response::Connect {
        transaction_id: session.transaction_id().wrapping_add(1),
        connection_id: 1,
    }
    .encode();
    assert!(matches!(session.on_datagram(&stale, &cache), Transition::Ignored));
    assert_eq!(session.phase(), SessionPhase::Connecting);
    assert!(cache.is_empty());

    // A retry rotates the transaction id, so answers to the old one are stale.
    let old = session.transaction_id();
    session.next_request();
    let late = Response::Error {
        transaction_id: old,
        message: "late".into(),
    }
    .encode();
    if session.transaction_id() != old {
        assert!(matches!(session.on_datagram(&late, &cache), Transition::Ignored));
    }
    assert!(!session.is_done());
}

#[test]
fn test_session_uses_cached_connection() {
    let cache = ConnectionCache::new();
    cache.put(tracker_addr(), 0x77);

    let mut session = UdpSession::new("udp://t", tracker_addr(), test_hash(), &cache);
    assert_eq!(session.phase(), SessionPhase::Scraping);
    assert_eq!(session.connection_id(), 0x77);

    let request = session.next_request();
    assert_eq!(request.len(), SCRAPE_REQUEST_LEN);
    assert_eq!(ScrapeRequest::decode(&request).unwrap().connection_id, 0x77);
}

#[test]
fn test_session_reconnects_when_id_lapses() {
    // Ids expire the moment they are stored.
    let cache = ConnectionCache::with_ttl(Duration::ZERO);
    let mut session = UdpSession::new("udp://t", tracker_addr(), test_hash(), &cache);
    session.next_request();

    let reply = Response::Connect {
        transaction_id: session.transaction_id(),
        connection_id: 5,
    }
    .encode();
    match session.on_datagram(&reply, &cache) {
        Transition::Send(bytes) => assert_eq!(bytes.len(), CONNECT_FRAME_LEN),
        other => panic!("expected a new connect, got {other:?}"),
    }
    assert_eq!(session.phase(), SessionPhase::Connecting);
    assert_eq!(session.connection_id(), UDP_PROTOCOL_ID);
}

#[test]
fn test_session_error_frame_fails() {
    let cache = ConnectionCache::new();
    let mut session = UdpSession::new("udp://t", tracker_addr(), test_hash(), &cache);
    session.next_request();

    let reply = Response::Error {
        transaction_id: session.transaction_id(),
        message: "banned".into(),
    }
    .encode();
    match session.on_datagram(&reply, &cache) {
        Transition::Finished(Err(TrackerError::TrackerFailure(msg))) => assert_eq!(msg, "banned"),
        other => panic!("expected tracker failure, got {other:?}"),
    }
    // Finished sessions swallow everything.
    assert!(matches!(session.on_datagram(&reply, &cache), Transition::Ignored));
}

#[test]
fn test_session_rejects_out_of_order_response() {
    let cache = ConnectionCache::new();
    let mut session = UdpSession::new("udp://t", tracker_addr(), test_hash(), &cache);
    session.next_request();

    let reply = Response::Scrape {
        transaction_id: session.transaction_id(),
        state: SwarmState::default(),
    }
    .encode();
    assert!(matches!(
        session.on_datagram(&reply, &cache),
        Transition::Finished(Err(TrackerError::InvalidResponse(_)))
    ));
}

#[test]
fn test_session_malformed_datagram_fails() {
    let cache = ConnectionCache::new();
    let mut session = UdpSession::new("udp://t", tracker_addr(), test_hash(), &cache);
    session.next_request();

    assert!(matches!(
        session.on_datagram(&[1, 2, 3], &cache),
        Transition::Finished(Err(TrackerError::InvalidResponse(_)))
    ));
}

#[test]
fn test_session_time_out() {
    let cache = ConnectionCache::new();
    let mut session = UdpSession::new("udp://t", tracker_addr(), test_hash(), &cache);

    assert!(matches!(
        session.time_out(),
        Transition::Finished(Err(TrackerError::Timeout))
    ));
    assert!(matches!(session.time_out(), Transition::Ignored));
}

#[test]
fn test_scrape_url_convention() {
    let cases = [
        ("http://t.example/announce", "http://t.example/scrape"),
        ("http://t.example/x/announce.php?k=1", "http://t.example/x/scrape.php?k=1"),
        ("http://t.example:8080/announce#frag", "http://t.example:8080/scrape"),
    ];
    for (announce, expected) in cases {
        let url = Url::parse(announce).unwrap();
        assert_eq!(scrape_url(&url).unwrap().as_str(), expected);
    }

    for announce in ["http://t.example/ann", "http://t.example/announce/x", "http://t.example/"] {
        let url = Url::parse(announce).unwrap();
        assert!(matches!(
            scrape_url(&url),
            Err(TrackerError::UnsupportedConvention(_))
        ));
    }
}

#[test]
fn test_scrape_request_url_encodes_hash() {
    let hash = InfoHash::new([0xAB; 20]);

    let url = scrape_request_url(&Url::parse("http://t.example/announce").unwrap(), &hash).unwrap();
    assert_eq!(url.path(), "/scrape");
    assert_eq!(url.query(), Some(format!("info_hash={}", "%AB".repeat(20)).as_str()));

    let url = scrape_request_url(&Url::parse("http://t.example/announce?k=1").unwrap(), &hash).unwrap();
    assert!(url.query().unwrap().starts_with("k=1&info_hash=%AB"));
}

#[test]
fn test_parse_scrape_response_body() {
    let hash = test_hash();
    let body = scrape_body(&hash, 5, 42, 3);
    assert_eq!(
        parse_scrape_response(&body, &hash).unwrap(),
        SwarmState::new(5, 42, 3)
    );

    // A lone entry is accepted even when keyed differently.
    assert_eq!(
        parse_scrape_response(&body, &InfoHash::new([0; 20])).unwrap(),
        SwarmState::new(5, 42, 3)
    );
}

#[test]
fn test_parse_scrape_response_failure_reason() {
    let body = encode(&Value::dict([("failure reason", Value::from("unregistered torrent"))]));
    match parse_scrape_response(&body, &test_hash()) {
        Err(TrackerError::TrackerFailure(reason)) => assert_eq!(reason, "unregistered torrent"),
        other => panic!("expected failure, got {other:?}"),
    }
}

#[test]
fn test_parse_scrape_response_invalid() {
    let hash = test_hash();
    assert!(matches!(
        parse_scrape_response(b"not bencode", &hash),
        Err(TrackerError::Bencode(_))
    ));
    assert!(matches!(
        parse_scrape_response(b"d5:filesdee", &hash),
        Err(TrackerError::InvalidResponse(_))
    ));
    assert!(matches!(
        parse_scrape_response(&scrape_body(&hash, -1, 0, 0), &hash),
        Err(TrackerError::InvalidResponse(_))
    ));
}

#[test]
fn test_response_head() {
    let buf = b"HTTP/1.0 200 OK\r\nContent-Length: 5\r\nX-A: b\r\n\r\nhel";
    let head = ResponseHead::parse(buf).unwrap().unwrap();
    assert_eq!(head.status, 200);
    assert_eq!(head.content_length, Some(5));
    assert!(head.is_success());
    assert!(!head.is_complete(buf));

    let full = b"HTTP/1.0 200 OK\r\nContent-Length: 5\r\nX-A: b\r\n\r\nhello";
    assert!(head.is_complete(full));
    assert_eq!(head.body(full), b"hello");

    assert_eq!(ResponseHead::parse(b"HTTP/1.0 200 OK\r\nContent-").unwrap(), None);
    assert!(ResponseHead::parse(b"garbage\r\n\r\n").is_err());

    let redirect = ResponseHead::parse(b"HTTP/1.1 302 Found\r\n\r\n").unwrap().unwrap();
    assert!(!redirect.is_success());
    assert_eq!(redirect.content_length, None);
}

#[test]
fn test_parse_http_response_status() {
    let hash = test_hash();

    let mut ok = b"HTTP/1.1 200 OK\r\n\r\n".to_vec();
    ok.extend(scrape_body(&hash, 1, 2, 3));
    assert_eq!(parse_http_response(&ok, &hash).unwrap(), SwarmState::new(1, 2, 3));

    let missing = b"HTTP/1.1 404 Not Found\r\nContent-Length: 9\r\n\r\nnot found";
    assert!(matches!(
        parse_http_response(missing, &hash),
        Err(TrackerError::HttpStatus(404))
    ));

    let mut rejected = b"HTTP/1.1 400 Bad Request\r\n\r\n".to_vec();
    rejected.extend(encode(&Value::dict([("failure reason", Value::from("nope"))])));
    assert!(matches!(
        parse_http_response(&rejected, &hash),
        Err(TrackerError::TrackerFailure(_))
    ));
}

#[test]
fn test_build_get_request() {
    let url = Url::parse("http://t.example:8080/scrape?info_hash=%AB").unwrap();
    let request = build_get_request(&url);
    let text = std::str::from_utf8(&request).unwrap();

    assert!(text.starts_with("GET /scrape?info_hash=%AB HTTP/1.0\r\n"));
    assert!(text.contains("Host: t.example:8080\r\n"));
    assert!(text.contains("Connection: close\r\n"));
    assert!(text.ends_with("\r\n\r\n"));
}

#[test]
fn test_tracker_kind_classify() {
    let (kind, url) = TrackerKind::classify("UDP://t.example:6969/announce").unwrap();
    assert_eq!(kind, TrackerKind::Udp);
    assert_eq!(url.port(), Some(6969));

    assert_eq!(
        TrackerKind::classify("http://t.example/announce").unwrap().0,
        TrackerKind::Http
    );
    assert!(matches!(
        TrackerKind::classify("wss://t.example/announce"),
        Err(TrackerError::UnsupportedProtocol(scheme)) if scheme == "wss"
    ));
    assert!(matches!(
        TrackerKind::classify("no scheme here"),
        Err(TrackerError::InvalidUrl(_))
    ));
}

#[test]
fn test_http_scraper_invalid_url() {
    assert!(HttpScraper::new("not a url").is_err());
    assert!(matches!(
        HttpScraper::new("udp://t.example:6969/announce"),
        Err(TrackerError::UnsupportedProtocol(_))
    ));
    assert!(matches!(
        HttpScraper::new("http://t.example/ann"),
        Err(TrackerError::UnsupportedConvention(_))
    ));
}

#[test]
fn test_scrape_options_backoff() {
    let options = ScrapeOptions::default();
    assert_eq!(options.max_attempts, 8);
    assert_eq!(options.timeout_for(0), Duration::from_secs(15));
    assert_eq!(options.timeout_for(3), Duration::from_secs(120));
    assert_eq!(options.timeout_for(7), Duration::from_secs(1920));
    assert_eq!(ScrapeOptions::stopping().max_attempts, 1);
}

/// How the fake tracker treats each incoming request.
#[derive(Clone, Copy)]
enum Behavior {
    Answer,
    /// Drops the first connect request.
    DropFirstConnect,
    /// Sends a scrape reply under a wrong transaction id before the real one.
    StaleFirst,
    Reject,
}

async fn spawn_fake_tracker(behavior: Behavior, state: SwarmState) -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();

    tokio::spawn(async move {
        let mut buf = [0u8; 512];
        let mut dropped = false;
        loop {
            let Ok((n, from)) = socket.recv_from(&mut buf).await else {
                return;
            };

            let reply = if n == CONNECT_FRAME_LEN {
                let request = ConnectRequest::decode(&buf[..n]).unwrap();
                if matches!(behavior, Behavior::DropFirstConnect) && !dropped {
                    dropped = true;
                    continue;
                }
                if matches!(behavior, Behavior::Reject) {
                    Response::Error {
                        transaction_id: request.transaction_id,
                        message: "banned".into(),
                    }
                } else {
                    Response::Connect {
                        transaction_id: request.transaction_id,
                        connection_id: 0xFEED,
                    }
                }
            } else {
                let request = ScrapeRequest::decode(&buf[..n]).unwrap();
                assert_eq!(request.connection_id, 0xFEED);
                if matches!(behavior, Behavior::StaleFirst) {
                    let stale = Response::Scrape {
                        transaction_id: request.transaction_id.wrapping_add(1),
                        state: SwarmState::new(0, 0, 0),
                    };
                    socket.send_to(&stale.encode(), from).await.unwrap();
                }
                Response::Scrape {
                    transaction_id: request.transaction_id,
                    state,
                }
            };
            socket.send_to(&reply.encode(), from).await.unwrap();
        }
    });

    addr
}

async fn scraper_for(addr: SocketAddr) -> UdpScraper {
    UdpScraper::connect(
        &format!("udp://{addr}/announce"),
        test_hash(),
        Arc::new(ConnectionCache::new()),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_udp_scraper_success() {
    let addr = spawn_fake_tracker(Behavior::Answer, SwarmState::new(5, 42, 3)).await;
    let scraper = scraper_for(addr).await;

    assert_eq!(scraper.scrape().await.unwrap(), SwarmState::new(5, 42, 3));
}

#[tokio::test]
async fn test_udp_scraper_ignores_stale_reply() {
    let addr = spawn_fake_tracker(Behavior::StaleFirst, SwarmState::new(7, 8, 9)).await;
    let scraper = scraper_for(addr).await;

    assert_eq!(scraper.scrape().await.unwrap(), SwarmState::new(7, 8, 9));
}

#[tokio::test]
async fn test_udp_scraper_retries_after_timeout() {
    let addr = spawn_fake_tracker(Behavior::DropFirstConnect, SwarmState::new(1, 1, 1)).await;
    let scraper = scraper_for(addr)
        .await
        .with_options(ScrapeOptions::default().with_base_timeout(Duration::from_millis(50)));

    assert_eq!(scraper.scrape().await.unwrap(), SwarmState::new(1, 1, 1));
}

#[tokio::test]
async fn test_udp_scraper_reuses_connection_id() {
    let addr = spawn_fake_tracker(Behavior::Answer, SwarmState::new(2, 2, 2)).await;
    let cache = Arc::new(ConnectionCache::new());
    let url = format!("udp://{addr}/announce");

    let first = UdpScraper::connect(&url, test_hash(), Arc::clone(&cache)).await.unwrap();
    first.scrape().await.unwrap();
    assert_eq!(cache.get(&addr), Some(0xFEED));

    let second = UdpScraper::connect(&url, test_hash(), cache).await.unwrap();
    assert_eq!(second.scrape().await.unwrap(), SwarmState::new(2, 2, 2));
}

#[tokio::test]
async fn test_udp_scraper_error_response() {
    let addr = spawn_fake_tracker(Behavior::Reject, SwarmState::default()).await;
    let scraper = scraper_for(addr).await;

    match scraper.scrape().await {
        Err(TrackerError::TrackerFailure(msg)) => assert_eq!(msg, "banned"),
        other => panic!("expected tracker failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_udp_scraper_times_out() {
    // Bound but never answering.
    let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let scraper = scraper_for(silent.local_addr().unwrap()).await.with_options(
        ScrapeOptions::default()
            .with_base_timeout(Duration::from_millis(10))
            .with_max_attempts(3),
    );

    assert!(matches!(scraper.scrape().await, Err(TrackerError::Timeout)));

    // One connect per attempt, then no more.
    let requests = drain(&silent).await;
    assert_eq!(requests.len(), 3);
    assert!(requests.iter().all(|n| *n == CONNECT_FRAME_LEN));
}

#[tokio::test]
async fn test_udp_scraper_default_attempt_cap() {
    let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let options = ScrapeOptions::default().with_base_timeout(Duration::from_millis(1));
    assert_eq!(options.max_attempts, 8);
    let scraper = scraper_for(silent.local_addr().unwrap()).await.with_options(options);

    assert!(matches!(scraper.scrape().await, Err(TrackerError::Timeout)));

    assert_eq!(drain(&silent).await.len(), 8);
}

/// Lengths of every datagram queued on `socket`.
async fn drain(socket: &UdpSocket) -> Vec<usize> {
    let mut buf = [0u8; 64];
    let mut lengths = Vec::new();
    while let Ok(Ok((n, _))) =
        tokio::time::timeout(Duration::from_millis(50), socket.recv_from(&mut buf)).await
    {
        lengths.push(n);
    }
    lengths
}

#[tokio::test]
async fn test_udp_scraper_close_before_scrape() {
    let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let scraper = scraper_for(silent.local_addr().unwrap()).await;

    scraper.close();
    scraper.close();
    assert!(matches!(scraper.scrape().await, Err(TrackerError::Cancelled)));
}

#[tokio::test]
async fn test_udp_scraper_close_during_scrape() {
    let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let scraper = scraper_for(silent.local_addr().unwrap()).await;
    let closer = scraper.closer();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        closer.close();
    });

    let started = Instant::now();
    assert!(matches!(scraper.scrape().await, Err(TrackerError::Cancelled)));
    // Well before the first 15 s receive timeout.
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(scraper.closer().is_closed());
}

#[tokio::test]
async fn test_tracker_scraper_dispatch() {
    let addr = spawn_fake_tracker(Behavior::Answer, SwarmState::new(3, 2, 1)).await;
    let scraper = TrackerScraper::new(
        &format!("udp://{addr}/announce"),
        test_hash(),
        Arc::new(ConnectionCache::new()),
    )
    .await
    .unwrap();

    assert_eq!(scraper.kind(), TrackerKind::Udp);
    assert_eq!(scraper.scrape().await.unwrap(), SwarmState::new(3, 2, 1));

    let http = TrackerScraper::new(
        "http://t.example/announce",
        test_hash(),
        ConnectionCache::shared(),
    )
    .await
    .unwrap();
    assert_eq!(http.kind(), TrackerKind::Http);
    http.close();

    assert!(matches!(
        TrackerScraper::new("wss://t.example/announce", test_hash(), ConnectionCache::shared()).await,
        Err(TrackerError::UnsupportedProtocol(_))
    ));
}

async fn spawn_http_tracker(status: &'static str, body: Vec<u8>) -> SocketAddr {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = stream.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            request.extend_from_slice(&buf[..n]);
        }
        assert!(request.starts_with(b"GET /scrape?info_hash="));

        let head = format!(
            "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        stream.write_all(head.as_bytes()).await.unwrap();
        stream.write_all(&body).await.unwrap();
    });

    addr
}

#[tokio::test]
async fn test_http_scraper_success() {
    let hash = test_hash();
    let addr = spawn_http_tracker("200 OK", scrape_body(&hash, 5, 42, 3)).await;
    let scraper = HttpScraper::new(&format!("http://{addr}/announce")).unwrap();

    assert_eq!(scraper.scrape(&hash).await.unwrap(), SwarmState::new(5, 42, 3));
}

#[tokio::test]
async fn test_http_scraper_error_status() {
    let addr = spawn_http_tracker("503 Service Unavailable", b"busy".to_vec()).await;
    let scraper = HttpScraper::new(&format!("http://{addr}/announce")).unwrap();

    assert!(matches!(
        scraper.scrape(&test_hash()).await,
        Err(TrackerError::HttpStatus(503))
    ));
}
