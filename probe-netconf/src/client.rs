//! NETCONF client for load generation.
//!
//! Speaks just enough of the protocol to replay RPCs: greeting exchange,
//! framed request/response and increasing message ids. One request is in
//! flight at a time; replies are matched by alternation, not by id. A request
//! that ends without its reply (timeout or transport error) leaves the stream
//! out of step, so the session is dropped rather than reused.

use crate::error::NetconfError;
use crate::framing::{self, FrameReader, DEFAULT_CAPABILITIES};
use chrono::Utc;
use probe_types::{RpcOperation, RpcResult, RpcStatus};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Connection settings.
#[derive(Debug, Clone)]
pub struct NetconfConfig {
    /// Server address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Timeout for connecting and for every read.
    pub timeout: Duration,
    /// Capabilities advertised in the greeting.
    pub capabilities: Vec<String>,
}

impl NetconfConfig {
    /// Settings for `host:port` with the default capabilities and a 30 s timeout.
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            timeout: Duration::from_secs(30),
            capabilities: DEFAULT_CAPABILITIES.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// `host:port`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A NETCONF session over any byte stream.
#[derive(Debug)]
pub struct NetconfClient<S> {
    stream: Option<S>,
    reader: FrameReader,
    next_message_id: u64,
    session_id: Option<u64>,
    timeout: Duration,
}

impl NetconfClient<TcpStream> {
    /// Open a TCP connection and exchange greetings.
    pub async fn connect(config: &NetconfConfig) -> Result<Self, NetconfError> {
        let addr = config.addr();
        let stream = tokio::time::timeout(config.timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| NetconfError::Timeout(config.timeout))?
            .map_err(|source| NetconfError::Connect {
                addr: addr.clone(),
                source,
            })?;
        let client = Self::handshake(stream, config).await?;
        info!(%addr, session_id = ?client.session_id, "NETCONF session established");
        Ok(client)
    }
}

impl<S> NetconfClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Exchange greetings over an already open stream.
    pub async fn handshake(stream: S, config: &NetconfConfig) -> Result<Self, NetconfError> {
        let mut client = Self {
            stream: Some(stream),
            reader: FrameReader::new(),
            next_message_id: 1,
            session_id: None,
            timeout: config.timeout,
        };
        client.send(&framing::hello(&config.capabilities)).await?;
        let greeting = client.receive().await?;
        if !framing::is_hello(&greeting) {
            return Err(NetconfError::Greeting(truncate(&greeting, 200)));
        }
        client.session_id = framing::session_id(&greeting);
        Ok(client)
    }

    /// Session id the server assigned, if it sent one.
    pub fn session_id(&self) -> Option<u64> {
        self.session_id
    }

    /// Message id the next request will carry.
    pub fn next_message_id(&self) -> u64 {
        self.next_message_id
    }

    /// Returns false after [`close`](Self::close) or after a request was
    /// left without its reply.
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn send(&mut self, message: &str) -> Result<(), NetconfError> {
        let stream = self.stream.as_mut().ok_or(NetconfError::NotConnected)?;
        stream.write_all(message.as_bytes()).await?;
        stream.flush().await?;
        Ok(())
    }

    async fn receive(&mut self) -> Result<String, NetconfError> {
        let stream = self.stream.as_mut().ok_or(NetconfError::NotConnected)?;
        match tokio::time::timeout(self.timeout, self.reader.read_frame(stream)).await {
            Ok(frame) => frame,
            Err(_) => Err(NetconfError::Timeout(self.timeout)),
        }
    }

    async fn round_trip(&mut self, message_id: u64, payload: &str) -> Result<String, NetconfError> {
        let reply = match self.send(&framing::rpc(message_id, payload)).await {
            Ok(()) => self.receive().await,
            Err(e) => Err(e),
        };
        if let Err(e) = &reply {
            self.abandon(message_id, e);
        }
        reply
    }

    /// Drop the stream. A late reply would otherwise be read as the answer
    /// to the next request.
    fn abandon(&mut self, message_id: u64, error: &NetconfError) {
        if self.stream.take().is_some() {
            warn!(message_id, %error, "NETCONF session abandoned with a reply outstanding");
            self.reader = FrameReader::new();
        }
    }

    /// Send `operation` `repeat_count` times.
    ///
    /// A transport failure or timeout is recorded as a `Failed` result and
    /// ends the session; the remaining iterations are recorded as `Failed`
    /// with "not connected". The delay applies between iterations, never
    /// after the last one.
    pub async fn execute_rpc(
        &mut self,
        operation: &RpcOperation,
    ) -> Result<Vec<RpcResult>, NetconfError> {
        if self.stream.is_none() {
            return Err(NetconfError::NotConnected);
        }
        let mut results = Vec::with_capacity(operation.repeat_count as usize);

        for i in 0..operation.repeat_count {
            let message_id = self.next_message_id;
            self.next_message_id += 1;
            let started_at = Utc::now();
            let clock = Instant::now();

            let result = match self.round_trip(message_id, &operation.payload).await {
                Ok(reply) => {
                    let latency_ms = clock.elapsed().as_secs_f64() * 1000.0;
                    let failed = framing::has_rpc_error(&reply);
                    debug!(operation = %operation.name, message_id, latency_ms, ok = !failed, "rpc reply");
                    RpcResult {
                        operation: operation.name.clone(),
                        iteration: i + 1,
                        message_id,
                        started_at,
                        latency_ms,
                        status: if failed { RpcStatus::Error } else { RpcStatus::Success },
                        error: failed.then(|| "rpc-error in reply".to_string()),
                        response: Some(reply),
                    }
                }
                Err(e) => {
                    warn!(operation = %operation.name, message_id, error = %e, "rpc failed");
                    RpcResult {
                        operation: operation.name.clone(),
                        iteration: i + 1,
                        message_id,
                        started_at,
                        latency_ms: clock.elapsed().as_secs_f64() * 1000.0,
                        status: RpcStatus::Failed,
                        response: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            results.push(result);

            if i + 1 < operation.repeat_count && self.stream.is_some() && !operation.delay().is_zero() {
                tokio::time::sleep(operation.delay()).await;
            }
        }
        Ok(results)
    }

    /// Run operations in order, keyed by operation name.
    pub async fn execute_sequence(
        &mut self,
        operations: &[RpcOperation],
    ) -> Result<BTreeMap<String, Vec<RpcResult>>, NetconfError> {
        let mut all: BTreeMap<String, Vec<RpcResult>> = BTreeMap::new();
        for operation in operations {
            debug!(operation = %operation.name, "executing");
            let results = self.execute_rpc(operation).await?;
            all.entry(operation.name.clone()).or_default().extend(results);
        }
        Ok(all)
    }

    /// Send `<close-session/>` and shut the stream down. Best effort.
    pub async fn close(&mut self) {
        if self.stream.is_none() {
            return;
        }
        let message_id = self.next_message_id;
        self.next_message_id += 1;
        if let Err(e) = self.send(&framing::close_session(message_id)).await {
            debug!(error = %e, "close-session not sent");
        }
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
    }
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((i, _)) => format!("{}...", &text[..i]),
        None => text.to_string(),
    }
}
