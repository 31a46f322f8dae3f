use std::io::{BufReader, BufWriter};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cidrq_frame::{RecordReader, RecordWriter};
use cidrq_proto::{
    Cidr, Established, Message, ResponseError, ResponseOkFound, ResponseOkNotFound,
};
use cidrq_session::{
    EntryState, Host, LookupClient, Resolution, Session, SessionConfig, SocketState,
    SubmitOutcome, TcpLink,
};

const WAIT: Duration = Duration::from_secs(5);

/// Minimal lookup service: announces itself, then answers each request from a
/// fixed range table. With `reject_first` it answers the very first request
/// of the whole run with a rate-limit error and closes that connection.
struct MockService {
    port: u16,
    connections: Arc<AtomicUsize>,
}

impl MockService {
    fn spawn(ranges: &[&str], reject_first: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("mock should bind");
        let port = listener.local_addr().expect("mock addr").port();
        let ranges: Vec<Cidr> = ranges
            .iter()
            .map(|r| r.parse().expect("range should parse"))
            .collect();
        let connections = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&connections);

        thread::spawn(move || {
            let mut rejected = !reject_first;
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                counter.fetch_add(1, Ordering::SeqCst);
                let close_after_error = !rejected;
                rejected = true;
                let ranges = ranges.clone();
                thread::spawn(move || serve(stream, &ranges, close_after_error));
            }
        });

        Self { port, connections }
    }

    fn config(&self) -> SessionConfig {
        SessionConfig::new("127.0.0.1", self.port)
    }

    fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

fn serve(stream: TcpStream, ranges: &[Cidr], reject_first_request: bool) {
    let read_half = stream.try_clone().expect("clone should work");
    let mut reader = RecordReader::new(BufReader::new(read_half));
    let mut writer = RecordWriter::new(BufWriter::new(stream));

    let hello = Message::Established(Established {
        rate_limit: 10,
        tree_size: ranges.len() as u32,
        cache_ttl: 86_400,
        peer_ttl: 15,
        banner: "mock lookup service".to_string(),
    });
    if writer.send(&hello.to_bytes().expect("encode")).is_err() {
        return;
    }

    while let Ok(record) = reader.read_record() {
        let reply = match Message::decode(&record.payload) {
            Ok(Message::Request(_)) if reject_first_request => {
                let error = Message::ResponseError(ResponseError {
                    code: 1,
                    message: "rate limited".to_string(),
                });
                let _ = writer.send(&error.to_bytes().expect("encode"));
                return;
            }
            Ok(Message::Request(request)) => {
                let ip = request.ip_address;
                match ranges
                    .iter()
                    .filter(|cidr| cidr.contains(ip))
                    .max_by_key(|cidr| cidr.mask_len)
                {
                    Some(cidr) => Message::ResponseOkFound(ResponseOkFound {
                        ip_address: ip,
                        prefix: cidr.prefix,
                        mask_len: cidr.mask_len,
                    }),
                    None => Message::ResponseOkNotFound(ResponseOkNotFound { ip_address: ip }),
                }
            }
            _ => continue,
        };
        if writer.send(&reply.to_bytes().expect("encode")).is_err() {
            return;
        }
    }
}

#[derive(Default)]
struct Collect {
    resolved: Vec<(u32, Resolution)>,
}

impl Host<u32> for Collect {
    fn on_resolved(&mut self, requester: &u32, resolution: &Resolution) {
        self.resolved.push((*requester, resolution.clone()));
    }
}

fn all_resolved(session: &Session<u32, TcpLink, Collect>) -> bool {
    session.queue().outstanding() == 0
}

#[test]
fn lookups_resolve_over_loopback() {
    let service = MockService::spawn(&["203.0.113.0/24", "203.0.0.0/16"], false);
    let mut client =
        LookupClient::new(service.config(), Collect::default()).expect("client should build");

    assert_eq!(
        client.submit(1, "203.0.113.7").expect("submit"),
        SubmitOutcome::Queued
    );
    client.submit(2, "198.51.100.1").expect("submit");
    client.submit(3, "203.0.9.9").expect("submit");

    assert!(client.run_until(Instant::now() + WAIT, all_resolved));

    let mut resolved = client.host().resolved.clone();
    resolved.sort_by_key(|(id, _)| *id);
    assert_eq!(
        resolved[0].1.cidr().map(|c| c.to_string()).as_deref(),
        Some("203.0.113.0/24")
    );
    assert!(!resolved[1].1.is_found());
    assert_eq!(
        resolved[2].1.cidr().map(|c| c.to_string()).as_deref(),
        Some("203.0.0.0/16")
    );

    let info = client.server_info().expect("established should be recorded");
    assert_eq!(info.peer_ttl, 15);
    assert_eq!(info.banner, "mock lookup service");

    // Once connected, submits go straight out.
    assert_eq!(
        client.submit(4, "203.0.113.8").expect("submit"),
        SubmitOutcome::Sent
    );
    assert!(client.run_until(Instant::now() + WAIT, all_resolved));
    assert_eq!(client.purge(), 4);
    assert_eq!(service.connections(), 1);
}

#[test]
fn rate_limit_error_requeues_until_next_submit() {
    let service = MockService::spawn(&["10.0.0.0/8"], true);
    let mut client =
        LookupClient::new(service.config(), Collect::default()).expect("client should build");

    client.submit(1, "10.1.2.3").expect("submit");
    let requeued = client.run_until(Instant::now() + WAIT, |s| {
        s.state() == SocketState::Disconnected
            && s.queue().get(0).map(|e| e.state) == Some(EntryState::Pending)
    });
    assert!(requeued, "entry should return to pending after the error");
    assert!(client.host().resolved.is_empty());

    // No retry on its own; the next submit reconnects and flushes both.
    client.submit(2, "10.9.9.9").expect("submit");
    assert!(client.run_until(Instant::now() + WAIT, all_resolved));
    assert_eq!(client.host().resolved.len(), 2);
    assert_eq!(service.connections(), 2);
}

#[test]
fn refused_connection_leaves_lookup_pending() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("addr").port()
    };
    let config = SessionConfig::new("127.0.0.1", port);
    let mut client =
        LookupClient::<u32, _>::new(config, Collect::default()).expect("client should build");

    client.submit(1, "10.0.0.1").expect("submit");
    let settled = client.run_until(Instant::now() + WAIT, |s| {
        s.state() == SocketState::Disconnected
    });
    assert!(settled);
    assert_eq!(
        client.session().queue().get(0).map(|e| e.state),
        Some(EntryState::Pending)
    );
}

#[test]
fn probe_without_lookups() {
    let service = MockService::spawn(&[], false);
    let mut client =
        LookupClient::<u32, _>::new(service.config(), Collect::default()).expect("client");

    assert!(client.connect());
    assert!(!client.connect());
    assert!(client.run_until(Instant::now() + WAIT, |s| s.server_info().is_some()));
    assert_eq!(client.server_info().map(|i| i.tree_size), Some(0));

    client.disconnect();
    assert_eq!(client.session().state(), SocketState::Disconnected);
    assert!(client.server_info().is_none());
}
