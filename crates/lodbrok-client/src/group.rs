//! Consumer group coordination.
//!
//! The group member moves through discovery, join, sync, a stable phase
//! with running partition fetchers, and rebalance rounds triggered by
//! heartbeat failures. The coordination loop and the heartbeat timer run
//! as separate tasks sharing the generation state; they coordinate
//! exclusively through one mutex-guarded record plus a rebalance channel.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use lodbrok_common::{Error, Result};
use lodbrok_protocol::join_group_types::{
    GroupProtocol, JoinGroupRequest, JoinGroupResponseMember, ProtocolMetadata,
};
use lodbrok_protocol::offset_commit_types::OffsetCommitRequest;
use lodbrok_protocol::sync_group_types::{MemberAssignment, PartitionAssignment, SyncGroupRequest};

use crate::assignor::{AssignmentStrategy, RangeAssignmentStrategy};
use crate::broker::Broker;
use crate::brokers::BrokerSet;
use crate::config::ConsumerConfig;
use crate::fetcher::{AutoCommit, FetchedMessage, FetcherHandle, PartitionFetcher};

/// Capacity of the decoded-message channel handed to the caller.
const MESSAGE_CHANNEL_CAPACITY: usize = 10;

/// Pause between join attempts and failed discovery rounds.
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Sync attempts per join before forcing a fresh join.
const SYNC_ATTEMPTS: usize = 3;

/// The one coordination error code that aborts the whole join/sync cycle:
/// the broker answering is not (or no longer) the group's coordinator, so
/// retrying against it cannot succeed.
const FATAL_COORDINATION_CODE: i16 = 16;

/// The coordinator is mid-rebalance; the member must rejoin to pick up the
/// new generation.
const REBALANCE_IN_PROGRESS_CODE: i16 = 27;

/// Generation-scoped membership state, shared between the heartbeat task
/// and the coordination loop. Lock it only to read or write these fields,
/// never across a network call.
#[derive(Debug, Default)]
struct GenerationState {
    generation_id: i32,
    member_id: String,
    leader: bool,
    /// Set once a join/sync cycle completes; heartbeats are a no-op
    /// before that.
    joined: bool,
}

/// The role the coordinator handed this member for the current generation.
/// Computed once per join, immutable until the next join.
enum Role {
    /// The leader sees the full member list and computes the assignment.
    Leader { members: Vec<JoinGroupResponseMember> },
    Follower,
}

/// What the join/sync driver does after a failed round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryAction {
    /// Try the same step again.
    Retry,
    /// Abandon this generation and join afresh.
    Rejoin,
    /// Give up; the consumer cannot make progress.
    Abort,
}

fn join_failure_action(error: &Error) -> RetryAction {
    match error.broker_code() {
        Some(FATAL_COORDINATION_CODE) => RetryAction::Abort,
        _ => RetryAction::Retry,
    }
}

fn sync_failure_action(error: &Error) -> RetryAction {
    match error.broker_code() {
        Some(FATAL_COORDINATION_CODE) => RetryAction::Abort,
        Some(REBALANCE_IN_PROGRESS_CODE) => RetryAction::Rejoin,
        _ => RetryAction::Retry,
    }
}

struct GroupInner {
    config: ConsumerConfig,
    client_id: String,
    brokers: BrokerSet,
    state: StdMutex<GenerationState>,
    coordinator: StdMutex<Option<Arc<Broker>>>,
    strategy: Box<dyn AssignmentStrategy>,
}

impl GroupInner {
    async fn discover_coordinator(&self) -> Result<()> {
        let coordinator = self.brokers.find_coordinator(&self.config.group_id).await?;
        info!(
            group = %self.config.group_id,
            address = coordinator.address(),
            "coordinator located"
        );
        *self.coordinator.lock().expect("coordinator slot poisoned") = Some(coordinator);
        Ok(())
    }

    fn coordinator(&self) -> Result<Arc<Broker>> {
        self.coordinator
            .lock()
            .expect("coordinator slot poisoned")
            .clone()
            .ok_or_else(|| Error::Network("no coordinator discovered yet".into()))
    }

    /// JoinGroup with the previously assigned member id (empty on a first
    /// join or after leave); stores the new generation under the state
    /// mutex and returns the role the coordinator elected us into.
    async fn join(&self) -> Result<Role> {
        let member_id = {
            let state = self.state.lock().expect("generation state poisoned");
            state.member_id.clone()
        };
        info!(group = %self.config.group_id, member = %member_id, "joining group");

        let request = JoinGroupRequest {
            group_id: self.config.group_id.clone(),
            session_timeout_ms: self.config.session_timeout_ms,
            member_id,
            protocol_type: "consumer".to_string(),
            protocols: vec![GroupProtocol {
                name: self.strategy.name().to_string(),
                metadata: ProtocolMetadata::for_topic(&self.config.topic).to_bytes(),
            }],
        };
        let response = self.coordinator()?.join_group(&request).await?;

        let leader = response.leader_id == response.member_id;
        {
            let mut state = self.state.lock().expect("generation state poisoned");
            state.generation_id = response.generation_id;
            state.member_id = response.member_id.clone();
            state.leader = leader;
        }
        debug!(
            member = %response.member_id,
            generation = response.generation_id,
            leader,
            "joined group"
        );

        Ok(if leader {
            Role::Leader {
                members: response.members,
            }
        } else {
            Role::Follower
        })
    }

    /// SyncGroup: the leader refreshes topic metadata and attaches the
    /// computed assignment, followers send nothing. Either way the
    /// response carries this member's own assignment.
    async fn sync(&self, role: &Role) -> Result<Vec<PartitionAssignment>> {
        info!(group = %self.config.group_id, "syncing group");

        let assignments = match role {
            Role::Leader { members } => {
                let metadata = self
                    .brokers
                    .metadata(std::slice::from_ref(&self.config.topic))
                    .await?;
                debug!(
                    topics = metadata.topics.len(),
                    members = members.len(),
                    "computing assignment as leader"
                );
                self.strategy.assign(members, &metadata.topics)
            }
            Role::Follower => Vec::new(),
        };

        let (generation_id, member_id) = {
            let state = self.state.lock().expect("generation state poisoned");
            (state.generation_id, state.member_id.clone())
        };
        let request = SyncGroupRequest {
            group_id: self.config.group_id.clone(),
            generation_id,
            member_id,
            assignments,
        };
        let response = self.coordinator()?.sync_group(&request).await?;

        if response.member_assignment.is_empty() {
            return Ok(Vec::new());
        }
        let assignment = MemberAssignment::from_bytes(&response.member_assignment)?;
        info!(
            partitions = assignment
                .assignments
                .iter()
                .map(|a| a.partitions.len())
                .sum::<usize>(),
            "partition assignment received"
        );
        Ok(assignment.assignments)
    }

    /// Drive join and sync to a stable generation. Join retries
    /// indefinitely on recoverable errors; sync gets a bounded number of
    /// attempts, with a rebalance-in-progress answer forcing a fresh join.
    async fn join_and_sync(&self) -> Result<Vec<PartitionAssignment>> {
        loop {
            let role = match self.join().await {
                Ok(role) => role,
                Err(error) => match join_failure_action(&error) {
                    RetryAction::Abort => {
                        error!(%error, "unrecoverable join error");
                        return Err(error);
                    }
                    _ => {
                        warn!(%error, "join failed, retrying");
                        tokio::time::sleep(RETRY_DELAY).await;
                        continue;
                    }
                },
            };

            for _ in 0..SYNC_ATTEMPTS {
                match self.sync(&role).await {
                    Ok(assignments) => return Ok(assignments),
                    Err(error) => match sync_failure_action(&error) {
                        RetryAction::Abort => {
                            error!(%error, "unrecoverable sync error");
                            return Err(error);
                        }
                        RetryAction::Rejoin => {
                            info!(%error, "rebalance in progress, rejoining");
                            break;
                        }
                        RetryAction::Retry => {
                            warn!(%error, "sync failed, retrying");
                        }
                    },
                }
            }
        }
    }

    /// One heartbeat with a snapshot of the generation state. A no-op
    /// until the first join/sync cycle completes.
    async fn heartbeat(&self) -> Result<()> {
        let (generation_id, member_id, joined) = {
            let state = self.state.lock().expect("generation state poisoned");
            (state.generation_id, state.member_id.clone(), state.joined)
        };
        if !joined {
            return Ok(());
        }

        trace!(generation = generation_id, member = %member_id, "heartbeat");
        self.coordinator()?
            .heartbeat(&self.config.group_id, generation_id, &member_id)
            .await
    }

    /// Best-effort LeaveGroup; the member id is cleared regardless of the
    /// outcome and failures are only logged.
    async fn leave(&self) {
        let member_id = {
            let mut state = self.state.lock().expect("generation state poisoned");
            state.joined = false;
            std::mem::take(&mut state.member_id)
        };
        if member_id.is_empty() {
            return;
        }

        info!(group = %self.config.group_id, member = %member_id, "leaving group");
        match self.coordinator() {
            Ok(coordinator) => {
                if let Err(error) = coordinator
                    .leave_group(&self.config.group_id, &member_id)
                    .await
                {
                    error!(member = %member_id, %error, "could not leave group");
                }
            }
            Err(error) => error!(member = %member_id, %error, "could not leave group"),
        }
    }

    /// Best-effort offset commit through the coordinator, using the wire
    /// format the configured storage backend requires.
    async fn commit_offset(&self, topic: &str, partition: i32, offset: i64) {
        let (generation_id, member_id) = {
            let state = self.state.lock().expect("generation state poisoned");
            (state.generation_id, state.member_id.clone())
        };
        let version = self.config.offsets_storage.commit_version();
        let request = OffsetCommitRequest::single(
            &self.config.group_id,
            generation_id,
            &member_id,
            topic,
            partition,
            offset,
        );

        let coordinator = match self.coordinator() {
            Ok(coordinator) => coordinator,
            Err(error) => {
                warn!(topic, partition, offset, %error, "offset commit skipped");
                return;
            }
        };
        match coordinator.offset_commit(version, &request).await {
            Ok(response) => match response.first_error() {
                None => debug!(topic, partition, offset, "offset committed"),
                Some(code) => {
                    warn!(topic, partition, offset, code, "broker rejected offset commit")
                }
            },
            Err(error) => error!(topic, partition, offset, %error, "offset commit failed"),
        }
    }
}

/// Cloneable handle fetchers use to commit offsets through the group's
/// coordinator.
#[derive(Clone)]
pub(crate) struct OffsetCommitter {
    inner: Arc<GroupInner>,
}

impl OffsetCommitter {
    pub(crate) async fn commit(&self, topic: &str, partition: i32, offset: i64) {
        self.inner.commit_offset(topic, partition, offset).await;
    }
}

/// A consumer-group member: joins the group, owns its assigned partitions'
/// fetchers, and yields decoded messages over a bounded channel.
pub struct GroupConsumer {
    inner: Arc<GroupInner>,
    shutdown: watch::Sender<bool>,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
}

impl GroupConsumer {
    /// Validate the configuration and connect to the cluster. No group
    /// activity happens until [`consume`](Self::consume).
    pub async fn new(config: ConsumerConfig) -> Result<GroupConsumer> {
        config.validate()?;
        let client_id = config.effective_client_id();
        info!(client_id = %client_id, group = %config.group_id, topic = %config.topic, "creating group consumer");

        let brokers = BrokerSet::connect(
            &config.bootstrap_servers,
            &client_id,
            Duration::from_secs(config.connect_timeout_secs),
            Duration::from_secs(config.timeout_secs),
        )
        .await?;

        let (shutdown, _) = watch::channel(false);
        Ok(GroupConsumer {
            inner: Arc::new(GroupInner {
                config,
                client_id,
                brokers,
                state: StdMutex::new(GenerationState::default()),
                coordinator: StdMutex::new(None),
                strategy: Box::new(RangeAssignmentStrategy),
            }),
            shutdown,
            tasks: StdMutex::new(Vec::new()),
        })
    }

    /// The client id this consumer puts on the wire.
    pub fn client_id(&self) -> &str {
        &self.inner.client_id
    }

    /// Join the group and start consuming. Messages arrive on the returned
    /// channel, which closes only when the consumer shuts down, either
    /// via [`close`](Self::close) or on an unrecoverable coordination
    /// error.
    pub fn consume(&self, from_beginning: bool) -> mpsc::Receiver<FetchedMessage> {
        let (out_tx, out_rx) = mpsc::channel(MESSAGE_CHANNEL_CAPACITY);
        let (rebalance_tx, rebalance_rx) = mpsc::channel(1);

        let heartbeat = tokio::spawn(heartbeat_loop(
            self.inner.clone(),
            rebalance_tx,
            self.shutdown.subscribe(),
        ));
        let coordination = tokio::spawn(coordination_loop(
            self.inner.clone(),
            from_beginning,
            out_tx,
            rebalance_rx,
            self.shutdown.subscribe(),
        ));

        let mut tasks = self.tasks.lock().expect("task list poisoned");
        tasks.push(heartbeat);
        tasks.push(coordination);
        out_rx
    }

    /// Stop every fetcher, leave the group, and close all connections.
    pub async fn close(&self) {
        info!(group = %self.inner.config.group_id, "closing group consumer");
        let _ = self.shutdown.send(true);

        let tasks: Vec<_> = {
            let mut tasks = self.tasks.lock().expect("task list poisoned");
            tasks.drain(..).collect()
        };
        for task in tasks {
            let _ = task.await;
        }
        self.inner.brokers.close().await;
    }
}

/// The heartbeat timer task: one tick every session-timeout/10, for the
/// lifetime of the consumer. A failed heartbeat nudges the coordination
/// loop into a rebalance.
async fn heartbeat_loop(
    inner: Arc<GroupInner>,
    rebalance: mpsc::Sender<()>,
    mut shutdown: watch::Receiver<bool>,
) {
    let period = Duration::from_millis((inner.config.session_timeout_ms as u64 / 10).max(1));
    let mut tick = tokio::time::interval(period);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                if let Err(error) = inner.heartbeat().await {
                    error!(%error, "failed to send heartbeat");
                    let _ = rebalance.try_send(());
                }
            }
        }
    }
    debug!("heartbeat task stopped");
}

/// The main coordination task: discover, join, sync, run fetchers until a
/// rebalance signal or shutdown, then tear down and start over.
async fn coordination_loop(
    inner: Arc<GroupInner>,
    from_beginning: bool,
    out: mpsc::Sender<FetchedMessage>,
    mut rebalance: mpsc::Receiver<()>,
    mut shutdown: watch::Receiver<bool>,
) {
    'session: loop {
        if *shutdown.borrow() {
            break;
        }
        {
            let mut state = inner.state.lock().expect("generation state poisoned");
            state.joined = false;
        }

        let assignments = loop {
            if *shutdown.borrow() {
                break 'session;
            }
            if let Err(error) = inner.discover_coordinator().await {
                error!(%error, "could not find coordinator");
                if pause(&mut shutdown, RETRY_DELAY).await {
                    break 'session;
                }
                continue;
            }

            let result = tokio::select! {
                _ = shutdown.changed() => break 'session,
                result = inner.join_and_sync() => result,
            };
            match result {
                Ok(assignments) => break assignments,
                Err(error) => {
                    error!(%error, "group coordination aborted");
                    break 'session;
                }
            }
        };

        // Drop any rebalance nudge that raced the join we just finished.
        while rebalance.try_recv().is_ok() {}

        {
            let mut state = inner.state.lock().expect("generation state poisoned");
            state.joined = true;
        }

        let fetchers = match spawn_fetchers(&inner, &assignments, from_beginning, &out).await {
            Ok(fetchers) => fetchers,
            Err(error) => {
                error!(%error, "failed to start partition fetchers, rejoining");
                if pause(&mut shutdown, RETRY_DELAY).await {
                    break 'session;
                }
                continue 'session;
            }
        };
        info!(fetchers = fetchers.len(), "group member stable");

        tokio::select! {
            _ = shutdown.changed() => {
                stop_fetchers(fetchers).await;
                break 'session;
            }
            _ = rebalance.recv() => {
                warn!("rebalancing: stopping fetchers and rejoining");
                stop_fetchers(fetchers).await;
            }
        }
    }

    inner.leave().await;
    info!("group consumer coordination stopped");
}

/// One fetcher per assigned partition, each with a dedicated connection to
/// that partition's leader.
async fn spawn_fetchers(
    inner: &Arc<GroupInner>,
    assignments: &[PartitionAssignment],
    from_beginning: bool,
    out: &mpsc::Sender<FetchedMessage>,
) -> Result<Vec<FetcherHandle>> {
    let config = &inner.config;
    let mut fetchers = Vec::new();

    for assignment in assignments {
        if assignment.partitions.is_empty() {
            continue;
        }
        let metadata = inner
            .brokers
            .metadata(std::slice::from_ref(&assignment.topic))
            .await?;
        let topic_metadata = metadata
            .topics
            .iter()
            .find(|t| t.topic == assignment.topic)
            .ok_or_else(|| {
                Error::Protocol(format!("metadata response missing topic {}", assignment.topic))
            })?;

        for &partition in &assignment.partitions {
            let leader = topic_metadata.leader_of(partition).ok_or_else(|| {
                Error::Protocol(format!(
                    "no leader known for {}/{}",
                    assignment.topic, partition
                ))
            })?;
            let broker = inner.brokers.open_broker(leader).await?;

            let auto_commit = config.auto_commit_enable.then(|| AutoCommit {
                committer: OffsetCommitter {
                    inner: inner.clone(),
                },
                interval: Duration::from_millis(config.auto_commit_interval_ms as u64),
            });

            let fetcher = PartitionFetcher::new(
                broker,
                assignment.topic.clone(),
                partition,
                from_beginning,
                config.fetch_max_wait_ms,
                config.fetch_min_bytes,
                config.max_partition_fetch_bytes,
                auto_commit,
            );
            fetchers.push(fetcher.spawn(out.clone()));
        }
    }

    Ok(fetchers)
}

async fn stop_fetchers(fetchers: Vec<FetcherHandle>) {
    for fetcher in fetchers {
        fetcher.stop().await;
    }
}

/// Sleep for `delay` unless shutdown arrives first; true means shut down.
async fn pause(shutdown: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    tokio::select! {
        _ = shutdown.changed() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}
