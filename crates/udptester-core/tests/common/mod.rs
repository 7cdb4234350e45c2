//! Shared test doubles: in-memory transport and event recorder
#![allow(dead_code)]

use std::collections::HashSet;
use std::io;
use std::net::SocketAddr;
use std::sync::Mutex;

use tokio::sync::mpsc;
use udptester_core::probe::transport::Transport;
use udptester_core::{EventSink, ProbeEvent};

/// One attempted send, in order
#[derive(Debug, Clone)]
pub struct SentFrame {
    pub target: SocketAddr,
    pub payload: Vec<u8>,
    pub broadcast: bool,
}

/// In-memory transport: records sends, receives from an injected channel
pub struct MockTransport {
    sent: Mutex<Vec<SentFrame>>,
    /// 0-based send attempt indices that fail with an I/O error
    failing_sends: HashSet<usize>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<(Vec<u8>, SocketAddr)>>,
    pub inject: mpsc::UnboundedSender<(Vec<u8>, SocketAddr)>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::failing_on(HashSet::new())
    }

    pub fn failing_on(failing_sends: HashSet<usize>) -> Self {
        let (inject, rx) = mpsc::unbounded_channel();
        Self {
            sent: Mutex::new(Vec::new()),
            failing_sends,
            rx: tokio::sync::Mutex::new(rx),
            inject,
        }
    }

    pub fn sent(&self) -> Vec<SentFrame> {
        self.sent.lock().unwrap().clone()
    }
}

impl Transport for MockTransport {
    async fn send(&self, target: SocketAddr, payload: &[u8], broadcast: bool) -> io::Result<usize> {
        let attempt = {
            let mut sent = self.sent.lock().unwrap();
            sent.push(SentFrame {
                target,
                payload: payload.to_vec(),
                broadcast,
            });
            sent.len() - 1
        };
        if self.failing_sends.contains(&attempt) {
            return Err(io::Error::other("mock send failure"));
        }
        Ok(payload.len())
    }

    async fn recv(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        match self.rx.lock().await.recv().await {
            Some((payload, source)) => {
                let len = payload.len().min(buf.len());
                buf[..len].copy_from_slice(&payload[..len]);
                Ok((len, source))
            }
            // All senders gone: behave like a quiet socket
            None => std::future::pending().await,
        }
    }
}

/// Sink that stores every event for later assertions
#[derive(Default)]
pub struct RecordingSink(Mutex<Vec<ProbeEvent>>);

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProbeEvent> {
        self.0.lock().unwrap().clone()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &ProbeEvent) {
        self.0.lock().unwrap().push(event.clone());
    }
}

/// Decode the sequence field out of a probe frame `<FTEST,{seq},{payload}>`
pub fn probe_sequence(frame: &[u8]) -> u16 {
    let text = std::str::from_utf8(frame).expect("probe frames are UTF-8");
    let body = text
        .strip_prefix("<FTEST,")
        .and_then(|t| t.strip_suffix('>'))
        .expect("probe envelope");
    body.split(',').next().unwrap().parse().expect("sequence field")
}
