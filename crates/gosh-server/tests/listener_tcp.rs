//! Listener accepting real TCP connections.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::oneshot;
use tokio::time::timeout;

use gosh_core::error::Result;
use gosh_core::protocol::{Packet, read_packet, write_line};
use gosh_server::{
    AuthConfig, HostServices, Listener, ListenerConfig, SessionConfig, SessionHost,
    TransportFactory,
};
use gosh_test_utils::{
    EventLog, FakeBehavior, FakeLauncher, FakePtyFactory, MemoryKeyStore, ScriptedProvider,
    StaticIdentityDirectory,
};

/// Unencrypted transport.
struct PlainTcp;

#[async_trait]
impl TransportFactory for PlainTcp {
    type Stream = TcpStream;

    async fn accept(&self, tcp: TcpStream, _peer: SocketAddr) -> Result<TcpStream> {
        Ok(tcp)
    }
}

async fn start(max_sessions: usize) -> (SocketAddr, oneshot::Sender<()>, tokio::task::JoinHandle<Result<()>>) {
    let log = EventLog::new();
    let host = SessionHost::new(
        AuthConfig::default(),
        SessionConfig::default(),
        HostServices {
            pty: FakePtyFactory::new(log.clone()),
            launcher: FakeLauncher::new(
                FakeBehavior::Login {
                    user: "alice".into(),
                    password: "pw".into(),
                },
                log,
            ),
            identities: Arc::new(StaticIdentityDirectory::new()),
            keys: Arc::new(MemoryKeyStore::new()),
            credentials: Arc::new(ScriptedProvider::new("alice", "pw")),
        },
    );
    let config = ListenerConfig {
        max_sessions,
        handshake_timeout: Duration::from_secs(5),
    };
    let listener = Listener::bind("127.0.0.1:0".parse().unwrap(), config, PlainTcp, host)
        .await
        .unwrap();
    let addr = listener.local_addr();

    let (stop_tx, stop_rx) = oneshot::channel();
    let task = tokio::spawn(listener.run_until(async {
        let _ = stop_rx.await;
    }));
    (addr, stop_tx, task)
}

async fn connect(addr: SocketAddr) -> (BufReader<OwnedReadHalf>, OwnedWriteHalf) {
    let (read, write) = TcpStream::connect(addr).await.unwrap().into_split();
    (BufReader::new(read), write)
}

/// Answer the handshake as alice; returns the final `?D` result.
async fn log_in(read: &mut BufReader<OwnedReadHalf>, write: &mut OwnedWriteHalf) -> bool {
    loop {
        match read_packet(read).await.unwrap() {
            Packet::EnvRequest(_) => write_line(write, "").await.unwrap(),
            Packet::UsernameRequest(_) => write_line(write, "alice").await.unwrap(),
            Packet::PasswordRequest(_) => write_line(write, "pw").await.unwrap(),
            Packet::Done(success) => return success,
            other => panic!("unexpected packet {:?}", other),
        }
    }
}

#[tokio::test]
async fn serves_a_session_over_tcp() {
    let (addr, stop, task) = start(4).await;
    let (mut read, mut write) = connect(addr).await;

    assert!(log_in(&mut read, &mut write).await);
    write.write_all(b"\x04").await.unwrap();
    let mut output = Vec::new();
    read.read_to_end(&mut output).await.unwrap();
    assert!(String::from_utf8_lossy(&output).contains("Welcome"));

    stop.send(()).unwrap();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn session_limit_defers_new_connections() {
    let (addr, stop, task) = start(1).await;

    let (mut first_read, first_write) = connect(addr).await;
    assert!(matches!(
        read_packet(&mut first_read).await.unwrap(),
        Packet::EnvRequest(_)
    ));

    let (mut second_read, _second_write) = connect(addr).await;
    assert!(
        timeout(Duration::from_millis(200), read_packet(&mut second_read))
            .await
            .is_err()
    );

    drop(first_write);
    drop(first_read);
    let packet = timeout(Duration::from_secs(5), read_packet(&mut second_read))
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(packet, Packet::EnvRequest(_)));

    stop.send(()).unwrap();
    task.await.unwrap().unwrap();
}
