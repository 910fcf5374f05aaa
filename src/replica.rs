/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Methods to build and run a replica.
//!
//! Every participant of an [`AbciApp`] runs its own replica: a copy of the same deterministic
//! [engine](crate::abci_app::AbciAppEngine), fed with the payloads of every participant and with the
//! timestamps agreed on by the consensus layer. Each replica is uniquely identified by an
//! [Ed25519 verifying key](ed25519_dalek::VerifyingKey).
//!
//! The key components of this module are:
//! - The builder-pattern interface to construct a [ReplicaSpec] with:
//!   1. `ReplicaSpec::builder` to construct a `ReplicaSpecBuilder`,
//!   2. The setters of the `ReplicaSpecBuilder`, and
//!   3. The `ReplicaSpecBuilder::build` method to construct a [ReplicaSpec],
//! - The function to [start](ReplicaSpec::start) a [Replica] given its [ReplicaSpec],
//! - [The type](Replica) which keeps the replica alive, and exposes read-only snapshots of its state.
//!
//! ## The replica thread
//!
//! Once started, the replica thread repeats the following steps until the engine finishes or halts:
//! 1. If it has not done so in the current round instance, ask the matching
//!    [behaviour](crate::behaviour) for a payload, sign it, broadcast it, and submit it locally.
//! 2. Receive one message from the network, waiting at most the configured tick period. Payloads are
//!    submitted to the engine. Block timestamps advance the engine's consensus time, which may time
//!    out the current round.
//! 3. End the block, concluding the current round if its threshold has been reached.
//! 4. After every transition, pass the new synchronized data through the
//!    [commit barrier](crate::persistence::CommitBarrier), and tell the behaviour of the round that
//!    ended.
//!
//! Broadcasting a payload may or may not deliver it back to its sender. Either way it is counted
//! once.
//!
//! ## Consensus time
//!
//! A round instance is entered at the latest block timestamp the replica has received when the
//! previous round concludes, and times out once a timestamp at least its timeout later arrives.
//! Replicas therefore time rounds out identically only if every replica sees the same timestamps in
//! the same order relative to the payloads that conclude each round. The [network](Network) must
//! provide that ordering, e.g., by delivering payloads and timestamps in the order of the blocks that
//! carry them.
//!
//! ## Starting a replica
//!
//! ```ignore
//! let replica =
//!     ReplicaSpec::builder()
//!     .app(app)
//!     .participants(participants)
//!     .behaviours(behaviours)
//!     .network(network)
//!     .commit_barrier(KVStoreCommitBarrier::new(kv_store))
//!     .configuration(configuration)
//!     .on_commit(commit_handler)
//!     .build()
//!     .start()?;
//! ```
//!
//! The replica's [configuration](ReplicaConfiguration) can also be defined using the builder pattern:
//!
//! ```ignore
//! let configuration =
//!     ReplicaConfiguration::builder()
//!     .me(signing_key)
//!     .revote_policy(RevotePolicy::Overwrite)
//!     .tick_period(Duration::from_millis(10))
//!     .payload_buffer_capacity(BufferSize::new(1024))
//!     .log_events(true)
//!     .build()
//! ```

use std::{
    sync::{
        mpsc::{self, Receiver, Sender, TryRecvError},
        Arc, Mutex, MutexGuard,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant, SystemTime},
};

use typed_builder::TypedBuilder;

use crate::{
    abci_app::{AbciApp, AbciAppEngine, EngineError, Transition},
    behaviour::{BehaviourError, BehaviourRegistry, PayloadRequest},
    event_bus::*,
    events::*,
    networking::{
        messages::Message,
        network::Network,
        receiving::{start_polling, MessageReceiveError, MessageStub},
        sending::SenderHandle,
    },
    persistence::CommitBarrier,
    rounds::RevotePolicy,
    synchronized_data::SynchronizedData,
    types::{
        basic::{BufferSize, RoundCount, RoundId},
        crypto_primitives::{Keypair, SigningKey},
        participants::ParticipantSet,
        payload::Payload,
    },
};

/// Stores the user-defined parameters required to start the replica, that is:
/// 1. The replica's [keypair](ed25519_dalek::SigningKey), used to sign its payloads.
/// 2. The [revote policy](RevotePolicy) of every agreement round.
/// 3. The tick period, the longest the replica thread waits for a message before ending the block.
/// 4. The payload buffer capacity, the maximum number of payloads for future round instances the
///    replica keeps. If this capacity is about to be exceeded, payloads for the farthest round
///    instances are removed first.
/// 5. The "Log Events" flag, if set to "true" then logs should be printed.
///
/// ## Log Events
///
/// This crate logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
/// printed onto a terminal or to a file, set up a [logging
/// implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
#[derive(TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [ReplicaConfiguration]. On the builder call the following methods to construct a valid [ReplicaConfiguration].

    Required:
    - `.me(...)`
    - `.tick_period(...)`
    - `.payload_buffer_capacity(...)`
    - `.log_events(...)`

    Optional:
    - `.revote_policy(...)`
"))]
pub struct ReplicaConfiguration {
    #[builder(setter(doc = "Set the replica's signing key, used to sign payloads. Required."))]
    pub me: SigningKey,
    #[builder(
        default,
        setter(doc = "Set what happens when a participant votes twice in a round instance. Defaults to [RevotePolicy::Overwrite]. Optional.")
    )]
    pub revote_policy: RevotePolicy,
    #[builder(setter(doc = "Set the longest time the replica waits for a message before ending the block. Required."))]
    pub tick_period: Duration,
    #[builder(setter(doc = "Set the maximum number of payloads for future round instances that the replica buffers. Required."))]
    pub payload_buffer_capacity: BufferSize,
    #[builder(setter(doc = "Enable logging? Required."))]
    pub log_events: bool,
}

/// Stores all necessary parameters and trait implementations required to run the [Replica].
#[derive(TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [ReplicaSpec]. On the builder call the following methods to construct a valid [ReplicaSpec].

    Required:
    - `.app(...)`
    - `.participants(...)`
    - `.network(...)`
    - `.commit_barrier(...)`
    - `.configuration(...)`

    Optional:
    - `.initial_data(...)`
    - `.initial_state(...)`
    - `.behaviours(...)`
    - `.on_enter_round(...)`
    - `.on_transition(...)`
    - `.on_enter_final_round(...)`
    - `.on_new_period(...)`
    - `.on_receive_payload(...)`
    - `.on_reject_payload(...)`
    - `.on_threshold_reached(...)`
    - `.on_round_timeout(...)`
    - `.on_commit(...)`
"))]
pub struct ReplicaSpec<N: Network + 'static, B: CommitBarrier> {
    // Required parameters
    #[builder(setter(into, doc = "Set the [AbciApp] the replica runs. Required."))]
    app: Arc<AbciApp>,
    #[builder(setter(doc = "Set the participants whose payloads count in every agreement round. Required."))]
    participants: ParticipantSet,
    #[builder(setter(doc = "Set the implementation of peer-to-peer networking. The argument must implement the [Network](crate::networking::network::Network) trait. Required."))]
    network: N,
    #[builder(setter(doc = "Set the barrier that durably commits the synchronized data after every transition. Required."))]
    commit_barrier: B,
    #[builder(setter(doc = "Set the [configuration](ReplicaConfiguration), which contains the necessary parameters to run a replica. Required."))]
    configuration: ReplicaConfiguration,
    // Optional parameters
    #[builder(
        default = SynchronizedData::new(Vec::<String>::new()),
        setter(doc = "Set the synchronized data the app is entered with. Defaults to empty data. Optional.")
    )]
    initial_data: SynchronizedData,
    #[builder(
        default,
        setter(strip_option, doc = "Set the initial state the app is entered at. Defaults to the app's initial round. Optional.")
    )]
    initial_state: Option<RoundId>,
    #[builder(default, setter(doc = "Set the behaviours that compute the replica's payloads. Without a matching behaviour, the replica does not vote in a round. Optional."))]
    behaviours: BehaviourRegistry,
    #[builder(default, setter(transform = |handler: impl Fn(&EnterRoundEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<EnterRoundEvent>),
    doc = "Register a handler closure to be invoked after the engine enters a round. Optional."))]
    on_enter_round: Option<HandlerPtr<EnterRoundEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&TransitionEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<TransitionEvent>),
    doc = "Register a handler closure to be invoked after the engine follows an edge of the transition function. Optional."))]
    on_transition: Option<HandlerPtr<TransitionEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&EnterFinalRoundEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<EnterFinalRoundEvent>),
    doc = "Register a handler closure to be invoked after the engine enters a final state. Optional."))]
    on_enter_final_round: Option<HandlerPtr<EnterFinalRoundEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&NewPeriodEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<NewPeriodEvent>),
    doc = "Register a handler closure to be invoked after the synchronized data enters a new period. Optional."))]
    on_new_period: Option<HandlerPtr<NewPeriodEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceivePayloadEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceivePayloadEvent>),
    doc = "Register a handler closure to be invoked after the current round accepts a payload. Optional."))]
    on_receive_payload: Option<HandlerPtr<ReceivePayloadEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&RejectPayloadEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<RejectPayloadEvent>),
    doc = "Register a handler closure to be invoked after the current round rejects a payload. Optional."))]
    on_reject_payload: Option<HandlerPtr<RejectPayloadEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ThresholdReachedEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ThresholdReachedEvent>),
    doc = "Register a handler closure to be invoked after the current round reaches its threshold. Optional."))]
    on_threshold_reached: Option<HandlerPtr<ThresholdReachedEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&RoundTimeoutEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<RoundTimeoutEvent>),
    doc = "Register a handler closure to be invoked after the current round times out. Optional."))]
    on_round_timeout: Option<HandlerPtr<RoundTimeoutEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&CommitEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<CommitEvent>),
    doc = "Register a handler closure to be invoked after the synchronized data is committed. Optional."))]
    on_commit: Option<HandlerPtr<CommitEvent>>,
}

impl<N: Network + 'static, B: CommitBarrier> ReplicaSpec<N, B> {
    /// Starts all threads and channels associated with running a replica, and returns the handles to
    /// them in a [Replica] struct.
    ///
    /// Fails if a behaviour matches no agreement round of the app, or if the app cannot be entered
    /// with the initial data.
    pub fn start(self) -> Result<Replica, ReplicaError> {
        self.behaviours.check_against(&self.app)?;

        let event_handlers = EventHandlers::new(
            self.configuration.log_events,
            self.on_enter_round,
            self.on_transition,
            self.on_enter_final_round,
            self.on_new_period,
            self.on_receive_payload,
            self.on_reject_payload,
            self.on_threshold_reached,
            self.on_round_timeout,
            self.on_commit,
        );

        let (event_publisher, event_subscriber) = if !event_handlers.is_empty() {
            Some(mpsc::channel()).unzip()
        } else {
            (None, None)
        };

        let initial_state = self
            .initial_state
            .unwrap_or_else(|| self.app.initial_round().clone());
        let engine = AbciAppEngine::new_at(
            self.app,
            self.participants,
            self.initial_data,
            self.configuration.revote_policy,
            initial_state,
        )?
        .with_event_publisher(event_publisher.clone());

        let status = Arc::new(Mutex::new(ReplicaStatus::of(&engine)));

        let (poller_shutdown, poller_shutdown_receiver) = mpsc::channel();
        let (poller, msgs) = start_polling(self.network.clone(), poller_shutdown_receiver);

        let (driver_shutdown, driver_shutdown_receiver) = mpsc::channel();
        let last_committed_version = engine.synchronized_data_snapshot().version();
        let driver = RoundDriver {
            keypair: Keypair::new(self.configuration.me),
            engine,
            behaviours: self.behaviours,
            sender: SenderHandle::new(self.network),
            msg_stub: MessageStub::new(msgs, self.configuration.payload_buffer_capacity),
            commit_barrier: self.commit_barrier,
            tick_period: self.configuration.tick_period,
            voted_in: None,
            last_committed_version,
            stopped: false,
            status: Arc::clone(&status),
            shutdown_signal: driver_shutdown_receiver,
            event_publisher,
        };
        let driver = driver.start();

        let (event_bus_shutdown, event_bus) = match event_subscriber {
            Some(event_subscriber) => {
                let (shutdown, shutdown_receiver) = mpsc::channel();
                let event_bus = start_event_bus(event_handlers, event_subscriber, shutdown_receiver);
                (Some(shutdown), Some(event_bus))
            }
            None => (None, None),
        };

        Ok(Replica {
            status,
            poller: Some(poller),
            poller_shutdown,
            driver: Some(driver),
            driver_shutdown,
            event_bus,
            event_bus_shutdown,
        })
    }
}

/// A read-only snapshot of a replica's engine.
#[derive(Clone, Debug)]
pub struct ReplicaStatus {
    pub round_id: RoundId,
    pub round_count: RoundCount,
    /// The synchronized data the current round was entered with.
    pub synchronized_data: SynchronizedData,
    pub finished: bool,
    pub halted: bool,
}

impl ReplicaStatus {
    fn of(engine: &AbciAppEngine) -> ReplicaStatus {
        ReplicaStatus {
            round_id: engine.current_round_id().clone(),
            round_count: engine.round_count(),
            synchronized_data: engine.synchronized_data_snapshot(),
            finished: engine.is_finished(),
            halted: engine.is_halted(),
        }
    }
}

/// A handle to the background threads of a replica. When this value is dropped, all background
/// threads are gracefully shut down.
pub struct Replica {
    status: Arc<Mutex<ReplicaStatus>>,
    poller: Option<JoinHandle<()>>,
    poller_shutdown: Sender<()>,
    driver: Option<JoinHandle<()>>,
    driver_shutdown: Sender<()>,
    event_bus: Option<JoinHandle<()>>,
    event_bus_shutdown: Option<Sender<()>>,
}

impl Replica {
    pub fn status(&self) -> ReplicaStatus {
        lock(&self.status).clone()
    }

    pub fn current_round_id(&self) -> RoundId {
        lock(&self.status).round_id.clone()
    }

    pub fn round_count(&self) -> RoundCount {
        lock(&self.status).round_count
    }

    pub fn synchronized_data_snapshot(&self) -> SynchronizedData {
        lock(&self.status).synchronized_data.clone()
    }

    /// Check whether the engine has entered a final state. The replica thread stops once it has.
    pub fn is_finished(&self) -> bool {
        lock(&self.status).finished
    }

    /// Check whether the replica thread stopped on a fatal error.
    pub fn is_halted(&self) -> bool {
        lock(&self.status).halted
    }
}

impl Drop for Replica {
    fn drop(&mut self) {
        // The replica thread reads from the poller, so it is shut down first. It may already have
        // stopped by itself, in which case the shutdown signal has no receiver.
        let _ = self.driver_shutdown.send(());
        if let Some(driver) = self.driver.take() {
            let _ = driver.join();
        }

        let _ = self.poller_shutdown.send(());
        if let Some(poller) = self.poller.take() {
            let _ = poller.join();
        }

        if let Some(shutdown) = &self.event_bus_shutdown {
            let _ = shutdown.send(());
        }
        if let Some(event_bus) = self.event_bus.take() {
            let _ = event_bus.join();
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReplicaError {
    #[error(transparent)]
    Behaviour(#[from] BehaviourError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

// The status is only ever replaced whole, so a poisoned lock still holds a consistent snapshot.
fn lock(status: &Mutex<ReplicaStatus>) -> MutexGuard<ReplicaStatus> {
    status.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// The state of the replica thread.
struct RoundDriver<N: Network, B: CommitBarrier> {
    keypair: Keypair,
    engine: AbciAppEngine,
    behaviours: BehaviourRegistry,
    sender: SenderHandle<N>,
    msg_stub: MessageStub,
    commit_barrier: B,
    tick_period: Duration,
    // The round instance the replica last voted in, or decided not to vote in.
    voted_in: Option<RoundCount>,
    last_committed_version: u64,
    // Set when the commit barrier rejects the engine's data.
    stopped: bool,
    status: Arc<Mutex<ReplicaStatus>>,
    shutdown_signal: Receiver<()>,
    event_publisher: Option<Sender<EngineEvent>>,
}

impl<N: Network + 'static, B: CommitBarrier> RoundDriver<N, B> {
    fn start(mut self) -> JoinHandle<()> {
        thread::spawn(move || self.execute())
    }

    fn execute(&mut self) {
        loop {
            match self.shutdown_signal.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => return,
                Err(TryRecvError::Empty) => (),
            }

            if self.stopped || self.engine.is_finished() || self.engine.is_halted() {
                return;
            }

            self.vote();

            let deadline = Instant::now() + self.tick_period;
            let result = match self.msg_stub.recv(self.engine.round_count(), deadline) {
                Ok((_, Message::Payload(payload))) => {
                    let _ = self.engine.submit_payload(payload);
                    Ok(None)
                }
                Ok((_, Message::BlockTimestamp(timestamp))) => self.engine.update_time(timestamp),
                Err(MessageReceiveError::Timeout) => Ok(None),
                Err(MessageReceiveError::Disconnected) => return,
            };
            let result = match result {
                Ok(None) => self.engine.end_block(),
                result => result,
            };

            match result {
                Ok(Some(transition)) => self.on_transition(transition),
                Ok(None) => (),
                Err(err) => {
                    log::error!(
                        "{} halted at round {}: {}",
                        self.engine.app().name(),
                        self.engine.current_round_id(),
                        err
                    );
                    self.update_status();
                }
            }
        }
    }

    /// Compute, sign, broadcast, and locally submit this replica's payload for the current round
    /// instance, if it has not done so yet.
    fn vote(&mut self) {
        let round_count = self.engine.round_count();
        if self.voted_in == Some(round_count) {
            return;
        }

        let round_id = self.engine.current_round_id().clone();
        let data = self.engine.synchronized_data_snapshot();
        let request = PayloadRequest {
            round_id: &round_id,
            round_count,
            data: &data,
        };
        match self.behaviours.compute_payload(request) {
            None => self.voted_in = Some(round_count),
            Some(Err(BehaviourError::NotReady)) => (),
            Some(Err(err)) => {
                log::warn!("not voting in round {} #{}: {}", round_id, round_count, err);
                self.voted_in = Some(round_count);
            }
            Some(Ok(content)) => {
                let payload = Payload::new(&self.keypair, round_id, round_count, content);
                self.sender.broadcast(payload.clone());
                let _ = self.engine.submit_payload(payload);
                self.voted_in = Some(round_count);
            }
        }
    }

    fn on_transition(&mut self, transition: Transition) {
        let data = self.engine.synchronized_data_snapshot();

        if data.version() != self.last_committed_version {
            match self.commit_barrier.propose_commit(&data) {
                Ok(committed) => {
                    self.last_committed_version = committed.version;
                    EngineEvent::Commit(CommitEvent {
                        timestamp: SystemTime::now(),
                        period: committed.period,
                        version: committed.version,
                        data_hash: committed.data_hash,
                    })
                    .publish(&self.event_publisher);
                }
                Err(err) => {
                    log::error!("commit of version {} rejected: {}", data.version(), err);
                    self.stopped = true;
                    self.update_status();
                    return;
                }
            }
        }

        self.behaviours.notify_round_end(&transition, &data);
        self.update_status();
    }

    fn update_status(&mut self) {
        let mut status = ReplicaStatus::of(&self.engine);
        status.halted |= self.stopped;
        *lock(&self.status) = status;
    }
}
