/// Master election for a replicated group
///
/// The coordinator tracks which member of a fixed group currently accepts
/// writes. Members are probed with `INFO replication`; the first one in
/// configured order reporting `role:master` wins. Elections and replication
/// changes are serialized so two callers never settle on different masters.
use crate::core::Endpoint;
use crate::error::{FailoverError, ShardwireError, ShardwireResult};
use crate::pool::ConnectionPools;
use crate::protocol::Reply;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Replication role reported by a member
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Master,
    Replica,
    Other(String),
}

impl Role {
    /// Role from the text of an `INFO replication` reply
    pub fn from_info(info: &str) -> Option<Role> {
        info.lines()
            .find_map(|line| line.trim().strip_prefix("role:"))
            .map(|role| match role.trim() {
                "master" => Role::Master,
                "slave" | "replica" => Role::Replica,
                other => Role::Other(other.to_string()),
            })
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Master => f.write_str("master"),
            Role::Replica => f.write_str("replica"),
            Role::Other(role) => f.write_str(role),
        }
    }
}

/// What a replication reset managed to reconfigure
#[derive(Debug, Clone, Default)]
pub struct ResetOutcome {
    pub master: Option<Endpoint>,
    pub replicas: Vec<Endpoint>,
    /// Members that couldn't be pointed at the new master
    pub failed: Vec<(Endpoint, String)>,
}

pub struct FailoverCoordinator {
    group: String,
    members: Vec<Endpoint>,
    pools: Arc<ConnectionPools>,
    probe_wait: Duration,
    master: RwLock<Option<Endpoint>>,
    election: Mutex<()>,
}

impl FailoverCoordinator {
    pub fn new(group: impl Into<String>, members: Vec<Endpoint>, pools: Arc<ConnectionPools>, probe_wait: Duration) -> Self {
        Self {
            group: group.into(),
            members,
            pools,
            probe_wait,
            master: RwLock::new(None),
            election: Mutex::new(()),
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn members(&self) -> &[Endpoint] {
        &self.members
    }

    /// Last elected master, if any
    pub fn current_master(&self) -> Option<Endpoint> {
        self.master.read().clone()
    }

    /// Ask `member` for its replication role.
    pub async fn probe(&self, member: &Endpoint) -> ShardwireResult<Role> {
        let reply = self
            .pools
            .exec(member, &["INFO", "replication"], self.probe_wait)
            .await?;
        let unknown = || FailoverError::UnknownRole {
            endpoint: member.to_string(),
        };
        match reply {
            Reply::Bulk(info) => Role::from_info(&String::from_utf8_lossy(&info)).ok_or_else(|| unknown().into()),
            _ => Err(unknown().into()),
        }
    }

    /// Keep the current master if it still reports itself as one, otherwise
    /// walk the members in order and take the first master found.
    pub async fn elect_master(&self) -> ShardwireResult<Endpoint> {
        let _election = self.election.lock().await;

        if let Some(current) = self.current_master() {
            match self.probe(&current).await {
                Ok(Role::Master) => return Ok(current),
                Ok(role) => info!("[{}] {} is now {}, electing a new master", self.group, current, role),
                Err(e) => warn!("[{}] Lost master {}: {}", self.group, current, e),
            }
        }

        for member in &self.members {
            match self.probe(member).await {
                Ok(Role::Master) => {
                    info!("[{}] Elected master {}", self.group, member);
                    *self.master.write() = Some(member.clone());
                    return Ok(member.clone());
                }
                Ok(role) => debug!("[{}] {} is {}", self.group, member, role),
                Err(e) => debug!("[{}] Probe of {} failed: {}", self.group, member, e),
            }
        }

        *self.master.write() = None;
        Err(FailoverError::NoMaster {
            group: self.group.clone(),
        }
        .into())
    }

    /// Make `new_master` the master of the group: it stops replicating and
    /// every other member is told to replicate from it. Replicas that can't
    /// be reached are reported in the outcome; failing to promote the new
    /// master is an error and leaves the recorded master unchanged.
    pub async fn reset_master(&self, new_master: &Endpoint) -> ShardwireResult<ResetOutcome> {
        if !self.members.contains(new_master) {
            return Err(FailoverError::UnknownMember {
                group: self.group.clone(),
                endpoint: new_master.to_string(),
            }
            .into());
        }

        let _election = self.election.lock().await;

        self.reconfigure(new_master, &["SLAVEOF", "NO", "ONE"]).await?;
        *self.master.write() = Some(new_master.clone());

        let port = new_master.port().to_string();
        let mut outcome = ResetOutcome {
            master: Some(new_master.clone()),
            ..Default::default()
        };
        for member in self.members.iter().filter(|m| *m != new_master) {
            match self.reconfigure(member, &["SLAVEOF", new_master.host(), port.as_str()]).await {
                Ok(()) => outcome.replicas.push(member.clone()),
                Err(e) => {
                    warn!("[{}] Could not attach {} to {}: {}", self.group, member, new_master, e);
                    outcome.failed.push((member.clone(), e.to_string()));
                }
            }
        }

        info!(
            "[{}] Master reset to {}, {} replicas attached, {} failed",
            self.group,
            new_master,
            outcome.replicas.len(),
            outcome.failed.len()
        );
        Ok(outcome)
    }

    async fn reconfigure(&self, member: &Endpoint, command: &[&str]) -> ShardwireResult<()> {
        let reply = self.pools.exec(member, command, self.probe_wait).await?;
        if reply.is_status("OK") {
            Ok(())
        } else {
            Err(FailoverError::Reconfigure {
                endpoint: member.to_string(),
                message: reply.to_string(),
            }
            .into())
        }
    }

    /// Forget `endpoint` as master after a connection failure on it. The
    /// next election probes the group again.
    pub async fn on_connection_error(&self, endpoint: &Endpoint) {
        let _election = self.election.lock().await;
        let mut master = self.master.write();
        if master.as_ref() == Some(endpoint) {
            warn!("[{}] Connection error on master {}", self.group, endpoint);
            *master = None;
        }
    }

    /// Run a command on the master. A connection failure or a READONLY
    /// reply from a demoted master triggers one election and one retry; a
    /// second failure is returned as is.
    pub async fn execute<A: AsRef<[u8]>>(&self, args: &[A]) -> ShardwireResult<Reply> {
        let master = match self.current_master() {
            Some(master) => master,
            None => self.elect_master().await?,
        };

        match self.pools.exec(&master, args, self.pools.default_wait()).await {
            Ok(reply) if reply.is_read_only_error() => {
                warn!("[{}] {} refused a write: {}", self.group, master, reply);
            }
            Ok(reply) => return Ok(reply),
            Err(e) if retry_on_new_master(&e) => {
                self.on_connection_error(&master).await;
            }
            Err(e) => return Err(e),
        }

        let master = self.elect_master().await?;
        self.pools.exec(&master, args, self.pools.default_wait()).await
    }

    /// Re-run the election every `interval` until `shutdown` flips to true.
    pub fn spawn_monitor(self: &Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            debug!("[{}] Master monitor stopped", coordinator.group);
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = coordinator.elect_master().await {
                            warn!("[{}] Master check failed: {}", coordinator.group, e);
                        }
                    }
                }
            }
        })
    }
}

fn retry_on_new_master(error: &ShardwireError) -> bool {
    // an exhausted pool on the master usually means it stopped accepting
    error.is_connection_error() || error.is_recoverable()
}
