//! Built-in NETCONF load generator.
//!
//! Replays the scenario's operation sequence, round after round, until the
//! hold ends. A request that fails on the transport or times out ends the
//! client's session, and with it the generator.

use probe_netconf::{load_rpc_directory, NetconfClient, NetconfConfig};
use probe_types::{LoadReport, RemoteHost, RpcOperation, RpcStatus, TestScenario};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::RunnerError;

/// Where to connect and what to send.
#[derive(Debug, Clone)]
pub struct LoadPlan {
    /// Connection settings.
    pub config: NetconfConfig,
    /// Operations replayed in order every round.
    pub operations: Vec<RpcOperation>,
}

impl LoadPlan {
    /// Build the plan for a scenario, or `None` when it asks for no load.
    ///
    /// Operations are the scenario's inline RPCs followed by the files of its
    /// RPC directory.
    pub fn for_scenario(
        host: &RemoteHost,
        scenario: &TestScenario,
    ) -> Result<Option<Self>, RunnerError> {
        let Some(target) = &scenario.netconf else {
            return Ok(None);
        };
        let mut operations = scenario.rpcs.clone();
        if let Some(dir) = &target.rpc_dir {
            operations.extend(load_rpc_directory(dir)?);
        }
        if operations.is_empty() {
            warn!(scenario = %scenario.name, "NETCONF target without operations, no load generated");
            return Ok(None);
        }

        let hostname = target.host.as_deref().unwrap_or(&host.hostname);
        let mut config = NetconfConfig::new(hostname, target.port);
        config.timeout = Duration::from_secs(target.timeout_secs);
        Ok(Some(Self { config, operations }))
    }
}

/// Connect over TCP and replay until `stop` fires.
pub async fn run_load(plan: LoadPlan, stop: CancellationToken) -> LoadReport {
    let connect = tokio::select! {
        _ = stop.cancelled() => return LoadReport::default(),
        c = NetconfClient::connect(&plan.config) => c,
    };
    match connect {
        Ok(client) => replay(client, &plan.operations, stop).await,
        Err(e) => {
            warn!(addr = %plan.config.addr(), error = %e, "load generator could not connect");
            LoadReport {
                aborted: Some(e.to_string()),
                ..LoadReport::default()
            }
        }
    }
}

/// Replay `operations` on an established session until `stop` fires.
pub async fn replay<S>(
    mut client: NetconfClient<S>,
    operations: &[RpcOperation],
    stop: CancellationToken,
) -> LoadReport
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut report = LoadReport::default();
    if operations.is_empty() {
        client.close().await;
        return report;
    }

    'rounds: while !stop.is_cancelled() {
        let mut sent = 0u64;
        let mut first_error: Option<String> = None;

        for operation in operations {
            let first_id = client.next_message_id();
            let outcome = tokio::select! {
                _ = stop.cancelled() => break 'rounds,
                r = client.execute_rpc(operation) => r,
            };
            let results = match outcome {
                Ok(results) => results,
                Err(e) => {
                    report.aborted = Some(e.to_string());
                    break 'rounds;
                }
            };
            if results.is_empty() {
                continue;
            }
            report.first_message_id.get_or_insert(first_id);
            report.last_message_id = results.last().map(|r| r.message_id);

            for result in &results {
                sent += 1;
                match result.status {
                    RpcStatus::Success => {}
                    RpcStatus::Error => report.errors += 1,
                    RpcStatus::Failed => {
                        report.errors += 1;
                        if first_error.is_none() {
                            first_error = result.error.clone();
                        }
                    }
                }
            }
            if !client.is_connected() {
                break;
            }
        }

        report.requests += sent;
        report.rounds += 1;
        debug!(round = report.rounds, sent, "load round finished");
        if !client.is_connected() {
            warn!(error = ?first_error, "NETCONF session lost, stopping load");
            report.aborted = first_error.or_else(|| Some("session lost".to_string()));
            break;
        }
    }

    client.close().await;
    info!(
        rounds = report.rounds,
        requests = report.requests,
        errors = report.errors,
        "load generator finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use probe_types::{MemoryLimit, NetconfTarget};
    use std::path::PathBuf;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

    const HELLO: &str = "<hello><capabilities><capability>urn:ietf:params:netconf:base:1.0</capability></capabilities><session-id>3</session-id></hello>]]>]]>";

    /// Answers `<ok/>` to everything until it has answered `replies` rpcs,
    /// then hangs up.
    fn server(mut stream: DuplexStream, replies: usize) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            stream.write_all(HELLO.as_bytes()).await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            let mut frames = 0usize;
            loop {
                let n = match stream.read(&mut chunk).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => n,
                };
                buf.extend_from_slice(&chunk[..n]);
                while let Some(pos) = buf.windows(6).position(|w| w == b"]]>]]>") {
                    buf.drain(..pos + 6);
                    frames += 1;
                    // First frame is the client greeting.
                    if frames == 1 {
                        continue;
                    }
                    if frames - 1 > replies {
                        return;
                    }
                    let reply = "<rpc-reply><ok/></rpc-reply>]]>]]>";
                    if stream.write_all(reply.as_bytes()).await.is_err() {
                        return;
                    }
                }
            }
        })
    }

    async fn client(replies: usize) -> NetconfClient<DuplexStream> {
        let (client, remote) = duplex(64 * 1024);
        server(remote, replies);
        let config = NetconfConfig::new("device", 830);
        NetconfClient::handshake(client, &config).await.unwrap()
    }

    #[tokio::test]
    async fn stops_when_the_server_goes_away() {
        let ops = vec![RpcOperation::new("get", "<get/>"), RpcOperation::new("lock", "<lock/>")];
        let report = replay(client(5).await, &ops, CancellationToken::new()).await;

        // Rounds 1-2 fully answered. In round 3 the second request loses its
        // reply, and the session is dropped rather than reused.
        assert_eq!(report.rounds, 3);
        assert_eq!(report.requests, 6);
        assert_eq!(report.errors, 1);
        assert_eq!(report.first_message_id, Some(1));
        assert_eq!(report.last_message_id, Some(6));
        assert!(report.aborted.is_some());
    }

    #[tokio::test]
    async fn cancelled_before_start_sends_nothing() {
        let stop = CancellationToken::new();
        stop.cancel();
        let ops = vec![RpcOperation::new("get", "<get/>")];
        let report = replay(client(10).await, &ops, stop).await;
        assert_eq!(report.rounds, 0);
        assert_eq!(report.requests, 0);
        assert_eq!(report.first_message_id, None);
    }

    #[test]
    fn plan_requires_target_and_operations() {
        let host = RemoteHost::new("10.0.0.5", "admin");
        let mut scenario = TestScenario::new(
            "s",
            "ui",
            MemoryLimit::parse("5g").unwrap(),
            PathBuf::from("out"),
        );
        assert!(LoadPlan::for_scenario(&host, &scenario).unwrap().is_none());

        scenario.netconf = Some(NetconfTarget::default());
        assert!(LoadPlan::for_scenario(&host, &scenario).unwrap().is_none());

        scenario.rpcs.push(RpcOperation::new("get", "<get/>"));
        let plan = LoadPlan::for_scenario(&host, &scenario).unwrap().unwrap();
        assert_eq!(plan.config.addr(), "10.0.0.5:830");
        assert_eq!(plan.config.timeout, Duration::from_secs(30));
        assert_eq!(plan.operations.len(), 1);
    }
}
