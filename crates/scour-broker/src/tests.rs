//! Broker tests: deterministic coordinator-iteration tests driven through
//! hand-held worker endpoints, and end-to-end tests over a real pool.

use std::fs;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use scour_db::Database;
use scour_kernel::Response;
use scour_types::{ConnId, WorkerId};
use scour_wire as wire;
use scour_wire::{LockReply, Multipart};

use crate::broker::Broker;
use crate::frontend::{ChannelFrontend, ChannelFrontendHandle};
use crate::worker::WorkerDispatch;

const TICK: usize = 50;
const REPLY_WAIT: Duration = Duration::from_secs(5);

fn conn(byte: u8) -> ConnId {
    ConnId::from(&[byte][..])
}

// ============================================================================
// Deterministic coordinator tests
// ============================================================================

/// A worker endpoint held by the test instead of a thread.
struct TestWorker {
    identity: WorkerId,
    mailbox: Receiver<WorkerDispatch>,
}

impl TestWorker {
    /// Takes the job the coordinator dispatched, if any.
    fn try_job(&self) -> Option<(ConnId, String)> {
        match self.mailbox.try_recv() {
            Ok(WorkerDispatch::Job { frames, .. }) => {
                Some(wire::decode_dispatch(&frames).unwrap())
            }
            Ok(WorkerDispatch::LockReply(_)) => panic!("unexpected lock reply"),
            Err(_) => None,
        }
    }

    fn try_lock_reply(&self) -> Option<LockReply> {
        match self.mailbox.try_recv() {
            Ok(WorkerDispatch::LockReply(frames)) => {
                Some(wire::decode_lock_reply(&frames).unwrap())
            }
            Ok(WorkerDispatch::Job { .. }) => panic!("unexpected job"),
            Err(_) => None,
        }
    }
}

struct Rig {
    broker: Broker<ChannelFrontend>,
    handle: ChannelFrontendHandle,
    workers: Vec<TestWorker>,
    db: Arc<Database>,
    _dir: TempDir,
}

impl Rig {
    /// A broker with `pool` test-held workers, all reported Ready.
    fn new(pool: usize) -> Self {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(Database::open(dir.path().join("data")).unwrap());
        let (frontend, handle) = ChannelFrontend::new();
        let mut broker = Broker::new(Arc::clone(&db), frontend, 0).unwrap();

        let mut workers = Vec::new();
        for n in 0..pool {
            let identity = WorkerId::new(n.to_string());
            let mailbox = broker.register_worker(identity.clone());
            workers.push(TestWorker { identity, mailbox });
        }

        let mut rig = Self {
            broker,
            handle,
            workers,
            db,
            _dir: dir,
        };
        for n in 0..pool {
            rig.report(n, wire::encode_ready());
            rig.tick();
        }
        assert_eq!(rig.broker.idle_workers(), pool);
        rig
    }

    /// Sends backend frames on behalf of worker `n`.
    fn report(&self, n: usize, frames: Multipart) {
        self.broker
            .backend_sender()
            .send(crate::worker::BackendReport {
                identity: self.workers[n].identity.clone(),
                frames,
            })
            .unwrap();
    }

    /// Runs a few coordinator iterations.
    fn tick(&mut self) {
        for _ in 0..3 {
            self.broker.run_iteration().unwrap();
        }
    }
}

#[test]
fn lru_dispatch_follows_ready_order() {
    let mut rig = Rig::new(3);

    // Two dispatches go to the two least-recently-ready workers.
    rig.handle.submit(conn(1), "ping ;").unwrap();
    rig.handle.submit(conn(2), "ping ;").unwrap();
    rig.tick();

    assert!(rig.workers[0].try_job().is_some());
    assert!(rig.workers[1].try_job().is_some());
    assert!(rig.workers[2].try_job().is_none());

    // Worker 0 finishes and requeues *behind* worker 2.
    rig.report(0, wire::encode_response(&conn(1), b"{\"status\":\"ok\"}"));
    rig.tick();

    rig.handle.submit(conn(3), "ping ;").unwrap();
    rig.handle.submit(conn(4), "ping ;").unwrap();
    rig.tick();

    assert!(rig.workers[2].try_job().is_some(), "worker 2 was next in LRU order");
    assert!(rig.workers[0].try_job().is_some(), "worker 0 follows after requeue");
}

#[test]
fn saturated_pool_leaves_requests_unread() {
    let mut rig = Rig::new(1);

    rig.handle.submit(conn(1), "ping ;").unwrap();
    rig.tick();
    assert!(rig.workers[0].try_job().is_some());

    // Pool saturated: the second request must not be dispatched.
    rig.handle.submit(conn(2), "ping ;").unwrap();
    for _ in 0..TICK {
        rig.broker.run_iteration().unwrap();
        assert!(rig.workers[0].try_job().is_none());
    }
    assert_eq!(rig.db.live_tasks(), 1, "second task not even allocated");

    // Worker returns; the queued request is dispatched next.
    rig.report(0, wire::encode_response(&conn(1), b"{\"status\":\"ok\"}"));
    rig.tick();
    let (dispatched_conn, _) = rig.workers[0].try_job().expect("queued request dispatched");
    assert_eq!(dispatched_conn, conn(2));
}

#[test]
fn replies_are_forwarded_to_the_right_client() {
    let mut rig = Rig::new(2);

    rig.handle.submit(conn(1), "ping ;").unwrap();
    rig.handle.submit(conn(2), "ping ;").unwrap();
    rig.tick();

    let (conn_a, _) = rig.workers[0].try_job().unwrap();
    let (conn_b, _) = rig.workers[1].try_job().unwrap();

    // Replies come back out of dispatch order.
    rig.report(1, wire::encode_response(&conn_b, b"reply-b"));
    rig.tick();
    rig.report(0, wire::encode_response(&conn_a, b"reply-a"));
    rig.tick();

    let (first_conn, first_reply) = rig.handle.try_recv_reply().unwrap();
    assert_eq!(first_conn, conn(2));
    assert_eq!(&first_reply[..], b"reply-b");

    let (second_conn, second_reply) = rig.handle.try_recv_reply().unwrap();
    assert_eq!(second_conn, conn(1));
    assert_eq!(&second_reply[..], b"reply-a");
}

#[test]
fn dataset_lock_is_exclusive_across_busy_workers() {
    let mut rig = Rig::new(2);

    rig.handle.submit(conn(1), "ping ;").unwrap();
    rig.handle.submit(conn(2), "ping ;").unwrap();
    rig.tick();
    rig.workers[0].try_job().unwrap();
    rig.workers[1].try_job().unwrap();

    // First claim wins.
    rig.report(0, wire::encode_dataset_lock_req(&["set_a", "set_b"]));
    rig.tick();
    assert_eq!(rig.workers[0].try_lock_reply(), Some(LockReply::Ok));

    // Any overlap denies the whole request.
    rig.report(1, wire::encode_dataset_lock_req(&["set_b"]));
    rig.tick();
    assert_eq!(rig.workers[1].try_lock_reply(), Some(LockReply::Denied));

    // Disjoint names are granted.
    rig.report(1, wire::encode_dataset_lock_req(&["set_c"]));
    rig.tick();
    assert_eq!(rig.workers[1].try_lock_reply(), Some(LockReply::Ok));

    // Holder finishes; its locks die with its snapshot.
    rig.report(0, wire::encode_response(&conn(1), b"{\"status\":\"ok\"}"));
    rig.tick();
    rig.report(1, wire::encode_dataset_lock_req(&["set_b"]));
    rig.tick();
    assert_eq!(rig.workers[1].try_lock_reply(), Some(LockReply::Ok));
}

#[test]
fn iterator_lock_is_exclusive_across_busy_workers() {
    let mut rig = Rig::new(2);

    rig.handle.submit(conn(1), "ping ;").unwrap();
    rig.handle.submit(conn(2), "ping ;").unwrap();
    rig.tick();
    rig.workers[0].try_job().unwrap();
    rig.workers[1].try_job().unwrap();

    rig.report(0, wire::encode_iterator_lock_req("iter_x"));
    rig.tick();
    assert_eq!(rig.workers[0].try_lock_reply(), Some(LockReply::Ok));

    rig.report(1, wire::encode_iterator_lock_req("iter_x"));
    rig.tick();
    assert_eq!(rig.workers[1].try_lock_reply(), Some(LockReply::Denied));

    rig.report(1, wire::encode_iterator_lock_req("iter_y"));
    rig.tick();
    assert_eq!(rig.workers[1].try_lock_reply(), Some(LockReply::Ok));
}

#[test]
fn response_commits_the_task() {
    let mut rig = Rig::new(1);

    rig.handle.submit(conn(1), "ping ;").unwrap();
    rig.tick();
    let (job_conn, _) = rig.workers[0].try_job().unwrap();
    assert_eq!(rig.db.live_tasks(), 1);

    rig.report(0, wire::encode_response(&job_conn, b"{\"status\":\"ok\"}"));
    rig.tick();
    assert_eq!(rig.db.live_tasks(), 0);
    assert_eq!(rig.broker.idle_workers(), 1);
}

// ============================================================================
// End-to-end over a real pool
// ============================================================================

struct Cluster {
    handle: ChannelFrontendHandle,
    dir: TempDir,
}

impl Cluster {
    fn start(pool: usize) -> Self {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(Database::open(dir.path().join("data")).unwrap());
        let (frontend, handle) = ChannelFrontend::new();
        let mut broker = Broker::new(db, frontend, pool).unwrap();
        std::thread::Builder::new()
            .name("scour-broker-test".to_string())
            .spawn(move || {
                // Exits once the test drops its frontend handle.
                let _ = broker.run();
            })
            .unwrap();
        Self { dir, handle }
    }

    fn request(&self, client: u8, line: &str) -> Response {
        self.handle.submit(conn(client), line).unwrap();
        self.wait_reply(client)
    }

    fn wait_reply(&self, client: u8) -> Response {
        let (reply_conn, reply) = self
            .handle
            .recv_reply(REPLY_WAIT)
            .expect("reply before timeout");
        assert_eq!(reply_conn, conn(client));
        Response::from_text(&String::from_utf8_lossy(&reply)).unwrap()
    }

    fn write_corpus(&self, entries: &[(&str, &[u8])]) -> String {
        let corpus = self.dir.path().join("corpus");
        fs::create_dir_all(&corpus).unwrap();
        for (name, contents) in entries {
            fs::write(corpus.join(name), contents).unwrap();
        }
        corpus.to_string_lossy().into_owned()
    }
}

#[test]
fn ping_end_to_end() {
    let cluster = Cluster::start(2);
    let response = cluster.request(0xab, "ping ;");
    assert_eq!(
        response,
        Response::Ping {
            connection: "ab".to_string(),
        }
    );
}

#[test]
fn malformed_request_then_recovery() {
    let cluster = Cluster::start(1);

    assert!(cluster.request(1, "selct \"abc\" ;").is_error());
    // The worker returned to the queue and serves the next request.
    assert!(matches!(
        cluster.request(1, "ping ;"),
        Response::Ping { .. }
    ));
}

#[test]
fn index_select_iterator_pop_end_to_end() {
    let cluster = Cluster::start(2);
    let entries: Vec<(String, Vec<u8>)> = (0..100)
        .map(|i| {
            (
                format!("f{i:03}.txt"),
                format!("file {i} carries the needle").into_bytes(),
            )
        })
        .collect();
    let borrowed: Vec<(&str, &[u8])> = entries
        .iter()
        .map(|(name, contents)| (name.as_str(), contents.as_slice()))
        .collect();
    let corpus = cluster.write_corpus(&borrowed);

    assert_eq!(
        cluster.request(1, &format!("index \"{corpus}\" ;")),
        Response::Ok
    );

    let Response::SelectIterator {
        iterator,
        file_count,
        ..
    } = cluster.request(1, r#"select into iterator "needle" ;"#)
    else {
        panic!("expected select_iterator");
    };
    assert_eq!(file_count, 100);

    let Response::SelectFromIterator {
        files,
        position,
        total_files,
    } = cluster.request(1, &format!(r#"iterator "{iterator}" pop 40 ;"#))
    else {
        panic!("expected select_from_iterator");
    };
    assert_eq!(files.len(), 40);
    assert_eq!(position, 40);
    assert_eq!(total_files, 100);

    let Response::SelectFromIterator { files, position, .. } =
        cluster.request(1, &format!(r#"iterator "{iterator}" pop 40 ;"#))
    else {
        panic!("expected select_from_iterator");
    };
    assert_eq!(files.len(), 40);
    assert_eq!(position, 80);
}

#[test]
fn concurrent_reindex_resolves_without_deadlock() {
    let cluster = Cluster::start(2);
    let corpus = cluster.write_corpus(&[("a.txt", b"needle content here")]);

    assert_eq!(
        cluster.request(1, &format!("index \"{corpus}\" ;")),
        Response::Ok
    );
    let Response::Topology { datasets } = cluster.request(1, "topology ;") else {
        panic!("expected topology");
    };
    let ds = datasets[0].id.clone();

    // Two clients reindex the same dataset at once. Lock arbitration
    // serializes them; both eventually succeed without deadlock.
    cluster
        .handle
        .submit(conn(1), format!(r#"reindex "{ds}" ;"#))
        .unwrap();
    cluster
        .handle
        .submit(conn(2), format!(r#"reindex "{ds}" ;"#))
        .unwrap();

    let mut replies = Vec::new();
    for _ in 0..2 {
        let (_, reply) = cluster
            .handle
            .recv_reply(REPLY_WAIT)
            .expect("reindex reply before timeout");
        replies.push(Response::from_text(&String::from_utf8_lossy(&reply)).unwrap());
    }
    assert!(replies.iter().all(|r| *r == Response::Ok));
}

#[test]
fn status_sees_other_live_tasks() {
    let cluster = Cluster::start(2);
    let Response::Status { tasks } = cluster.request(1, "status ;") else {
        panic!("expected status");
    };
    // Only the status task itself is live.
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].request, "status ;");
}

// ============================================================================
// TCP frontend
// ============================================================================

mod tcp_e2e {
    use std::io::{Read, Write};
    use std::net::TcpStream;

    use bytes::BytesMut;
    use scour_wire::{Frame, FrameKind};

    use super::*;
    use crate::tcp::TcpFrontend;

    fn read_frame(stream: &mut TcpStream) -> Frame {
        let mut buf = BytesMut::new();
        let mut chunk = [0u8; 4096];
        loop {
            if let Some(frame) = Frame::decode(&mut buf).unwrap() {
                return frame;
            }
            let n = stream.read(&mut chunk).unwrap();
            assert!(n > 0, "server closed before a full frame arrived");
            buf.extend_from_slice(&chunk[..n]);
        }
    }

    #[test]
    fn ping_over_tcp() {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(Database::open(dir.path().join("data")).unwrap());
        let frontend = TcpFrontend::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = frontend.local_addr().unwrap();

        let mut broker = Broker::new(db, frontend, 1).unwrap();
        std::thread::Builder::new()
            .name("scour-broker-tcp-test".to_string())
            .spawn(move || {
                let _ = broker.run();
            })
            .unwrap();

        let mut stream = TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(REPLY_WAIT))
            .unwrap();

        let request = Frame::request(wire::encode_client_request("ping ;"));
        stream.write_all(&request.encode_to_bytes()).unwrap();

        let reply_frame = read_frame(&mut stream);
        assert_eq!(reply_frame.kind, FrameKind::Reply);
        let reply = wire::decode_client_reply(&reply_frame.body).unwrap();
        let response = Response::from_text(&String::from_utf8_lossy(&reply)).unwrap();
        let Response::Ping { connection } = response else {
            panic!("expected ping response");
        };
        // The connection id is the hex form of the peer address bytes.
        let expected = stream
            .local_addr()
            .unwrap()
            .to_string()
            .bytes()
            .map(|b| format!("{b:02x}"))
            .collect::<String>();
        assert_eq!(connection, expected);
    }
}
