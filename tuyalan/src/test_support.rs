//! In-process fake device for session tests

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};
use parking_lot::Mutex;
use tokio::io::DuplexStream;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use tuyalan_core::{Cipher, Command, Message, ProtocolVersion};
use tuyalan_transport::{Connection, FrameReader, FrameWriter, Transport};
use tuyalan_types::Datapoints;

use crate::config::DeviceConfig;
use crate::observer::StateObserver;

pub const KEY: &str = "0123456789abcdef";

pub fn config(port: u16, version: ProtocolVersion) -> DeviceConfig {
    DeviceConfig::new("dev", "127.0.0.1", KEY)
        .with_port(port)
        .with_version(version)
}

/// Response to a GET, shaped like real firmware sends it
pub fn response(sequence: u32, dps: Value) -> Message {
    Message::with_payload(Command::Get, sequence, json!({"devId": "dev", "dps": dps})).with_status(0)
}

pub struct FakeDevice {
    listener: TcpListener,
    cipher: Cipher,
}

impl FakeDevice {
    pub async fn bind(version: ProtocolVersion) -> Self {
        Self {
            listener: TcpListener::bind("127.0.0.1:0").await.unwrap(),
            cipher: Cipher::new(KEY, version).unwrap(),
        }
    }

    pub fn port(&self) -> u16 {
        self.listener.local_addr().unwrap().port()
    }

    pub async fn accept(&self) -> FakeLink {
        let (socket, peer) = self.listener.accept().await.unwrap();
        let (reader, writer) = socket.into_split();
        let (reader, writer) = Connection::new(reader, writer, peer.to_string()).into_split();

        FakeLink {
            reader,
            writer,
            cipher: self.cipher.clone(),
        }
    }
}

pub struct FakeLink {
    reader: FrameReader,
    writer: FrameWriter,
    cipher: Cipher,
}

impl FakeLink {
    pub async fn recv_raw(&mut self) -> Vec<u8> {
        self.reader.next_frame().await.unwrap().unwrap().to_vec()
    }

    pub async fn recv(&mut self) -> Option<Message> {
        let frame = self.reader.next_frame().await?.ok()?;
        Some(self.decode(&frame))
    }

    /// Skip frames until one with `command` arrives
    pub async fn recv_command(&mut self, command: Command) -> Message {
        loop {
            let message = self.recv().await.unwrap();
            if message.command == command {
                return message;
            }
        }
    }

    pub async fn recv_until_closed(&mut self) {
        while self.recv().await.is_some() {}
    }

    pub fn decode(&self, frame: &[u8]) -> Message {
        Message::decode(frame, &self.cipher).unwrap()
    }

    pub fn encode(&self, message: &Message, encrypt: bool) -> Vec<u8> {
        message.encode(&self.cipher, encrypt).unwrap().to_vec()
    }

    pub async fn send(&mut self, message: &Message, encrypt: bool) {
        let frame = self.encode(message, encrypt);
        self.send_raw(&frame).await;
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.send(bytes).await.unwrap();
    }
}

/// Refuses every connection
#[derive(Debug, Default)]
pub struct FailingTransport {
    attempts: AtomicUsize,
}

impl FailingTransport {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FailingTransport {
    async fn connect(&self) -> tuyalan_transport::Result<Connection> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(io::Error::from(io::ErrorKind::ConnectionRefused).into())
    }

    fn remote_addr(&self) -> String {
        "127.0.0.1:6668".to_string()
    }
}

/// Refuses connections until [`FlakyTransport::recover`], then hands out
/// in-memory links whose far end never answers
#[derive(Debug, Default)]
pub struct FlakyTransport {
    attempts: AtomicUsize,
    recovered: AtomicBool,
    peers: Mutex<Vec<DuplexStream>>,
}

impl FlakyTransport {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn recover(&self) {
        self.recovered.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for FlakyTransport {
    async fn connect(&self) -> tuyalan_transport::Result<Connection> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.recovered.load(Ordering::SeqCst) {
            return Err(io::Error::from(io::ErrorKind::ConnectionRefused).into());
        }

        let (client, device) = tokio::io::duplex(64 * 1024);
        self.peers.lock().push(device);
        Ok(Connection::from_stream(client, "memory"))
    }

    fn remote_addr(&self) -> String {
        "memory".to_string()
    }
}

/// Never completes a connection
#[derive(Debug)]
pub struct PendingTransport;

#[async_trait]
impl Transport for PendingTransport {
    async fn connect(&self) -> tuyalan_transport::Result<Connection> {
        std::future::pending().await
    }

    fn remote_addr(&self) -> String {
        "10.255.255.1:6668".to_string()
    }
}

pub struct RecordingObserver {
    tx: mpsc::UnboundedSender<(String, Datapoints)>,
}

impl RecordingObserver {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<(String, Datapoints)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl StateObserver for RecordingObserver {
    async fn state_updated(&self, device_id: &str, state: &Datapoints) {
        let _ = self.tx.send((device_id.to_string(), state.clone()));
    }
}
