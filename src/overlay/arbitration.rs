//! Single-writer arbitration for the shared history log.
//!
//! Any permitted client may ask for a history mutation. The request is
//! validated locally, then broadcast to every connected GM. Each GM decides on
//! its own whether it is the responsible authority (lowest connected GM id);
//! only that one feeds the request into its mutation queue, a single worker
//! thread that applies mutations strictly one at a time in arrival order.

use crate::overlay::config::WorldSettings;
use crate::overlay::messages::HistoryRpc;
use crate::overlay::model::{HistoryEntry, SceneId, UserId};
use crate::overlay::notifications::Notifier;
use crate::overlay::roster::SharedRoster;
use crate::overlay::store::{load_history, save_history, SettingsStore};
use crate::overlay::transport::{BroadcastTransport, RpcHandler};
use anyhow::{anyhow, Context, Result};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommitError {
    #[error("Could not perform operation \u{2014} did not have permissions!")]
    PermissionDenied,
    #[error("Could not perform operation \u{2014} no active GM!")]
    NoAuthorityAvailable,
    #[error("Could not dispatch history operation: {0}")]
    Transport(String),
}

/// Requesting side of the protocol, one per client.
pub struct HistoryClient {
    user: UserId,
    roster: SharedRoster,
    world: Arc<RwLock<WorldSettings>>,
    transport: Arc<dyn BroadcastTransport>,
    notifier: Arc<dyn Notifier>,
}

impl HistoryClient {
    pub fn new(
        user: UserId,
        roster: SharedRoster,
        world: Arc<RwLock<WorldSettings>>,
        transport: Arc<dyn BroadcastTransport>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            user,
            roster,
            world,
            transport,
            notifier,
        }
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    /// Snapshot of the module-wide settings; defaults if the lock is poisoned.
    pub fn world(&self) -> WorldSettings {
        self.world
            .read()
            .map(|world| world.clone())
            .unwrap_or_default()
    }

    pub fn is_gm(&self) -> bool {
        self.roster
            .read()
            .ok()
            .and_then(|roster| roster.get(&self.user).map(|user| user.is_gm))
            .unwrap_or(false)
    }

    /// GMs may always edit; players only when player editing is enabled and
    /// they hold the drawing capability.
    pub fn validate_permissions(&self) -> Result<(), CommitError> {
        let roster = self
            .roster
            .read()
            .map_err(|_| CommitError::Transport("roster lock poisoned".into()))?;
        let Some(user) = roster.get(&self.user) else {
            return Err(CommitError::PermissionDenied);
        };
        if user.is_gm {
            return Ok(());
        }
        let player_editable = self
            .world
            .read()
            .map(|world| world.is_player_editable)
            .unwrap_or(false);
        if player_editable && user.can_create_drawing {
            return Ok(());
        }
        Err(CommitError::PermissionDenied)
    }

    pub fn validate_active_authority(&self) -> Result<(), CommitError> {
        let roster = self
            .roster
            .read()
            .map_err(|_| CommitError::Transport("roster lock poisoned".into()))?;
        if roster.any_active_gm() {
            Ok(())
        } else {
            Err(CommitError::NoAuthorityAvailable)
        }
    }

    /// Succeeds once the broadcast was dispatched; the authority applies it later.
    pub fn request_commit(&self, scene: &SceneId, entry: HistoryEntry) -> Result<(), CommitError> {
        if entry.is_empty() {
            return Ok(());
        }
        self.dispatch(HistoryRpc::CommitHistory {
            scene: scene.clone(),
            entry,
        })
    }

    pub fn request_reset(&self, scene: &SceneId) -> Result<(), CommitError> {
        self.dispatch(HistoryRpc::ResetHistory {
            scene: scene.clone(),
        })
    }

    pub fn request_step_back(&self, scene: &SceneId, steps: usize) -> Result<(), CommitError> {
        self.dispatch(HistoryRpc::StepBackHistory {
            scene: scene.clone(),
            steps,
        })
    }

    fn dispatch(&self, rpc: HistoryRpc) -> Result<(), CommitError> {
        let result = self
            .validate_permissions()
            .and_then(|()| self.validate_active_authority())
            .and_then(|()| {
                self.transport
                    .execute_for_all_privileged(&rpc)
                    .map_err(|err| CommitError::Transport(format!("{err:#}")))
            });
        match result {
            Ok(delivered) => {
                tracing::debug!(
                    procedure = rpc.procedure(),
                    user = %self.user,
                    delivered,
                    "history rpc dispatched"
                );
                Ok(())
            }
            Err(err) => {
                self.notifier.error(&err.to_string());
                Err(err)
            }
        }
    }
}

enum QueueMessage {
    Apply(HistoryRpc),
    Barrier(Sender<()>),
}

/// Depth-one mutation queue: one worker thread applies mutations in FIFO order.
pub struct MutationQueue {
    tx: Mutex<Option<Sender<QueueMessage>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl MutationQueue {
    pub fn spawn(store: Arc<dyn SettingsStore>) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<QueueMessage>();
        let worker = std::thread::Builder::new()
            .name("polmap-history".into())
            .spawn(move || {
                for message in rx {
                    match message {
                        QueueMessage::Apply(rpc) => {
                            if let Err(err) = apply_mutation(store.as_ref(), &rpc) {
                                tracing::error!(
                                    ?err,
                                    procedure = rpc.procedure(),
                                    "history mutation failed"
                                );
                            }
                        }
                        QueueMessage::Barrier(done) => {
                            let _ = done.send(());
                        }
                    }
                }
            })
            .context("spawn history mutation worker")?;
        Ok(Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn submit(&self, rpc: HistoryRpc) -> Result<()> {
        self.send(QueueMessage::Apply(rpc))
    }

    /// Blocks until every mutation submitted before this call has been applied.
    pub fn flush(&self) -> Result<()> {
        let (done_tx, done_rx) = mpsc::channel();
        self.send(QueueMessage::Barrier(done_tx))?;
        done_rx
            .recv()
            .map_err(|_| anyhow!("history mutation worker stopped"))
    }

    /// Stops accepting work and waits for queued mutations to finish.
    pub fn shutdown(&self) -> Result<()> {
        if let Ok(mut tx) = self.tx.lock() {
            tx.take();
        }
        let handle = self
            .worker
            .lock()
            .map_err(|_| anyhow!("history worker lock poisoned"))?
            .take();
        if let Some(handle) = handle {
            handle
                .join()
                .map_err(|_| anyhow!("history mutation worker panicked"))?;
        }
        Ok(())
    }

    fn send(&self, message: QueueMessage) -> Result<()> {
        let tx = self
            .tx
            .lock()
            .map_err(|_| anyhow!("history queue lock poisoned"))?;
        let tx = tx
            .as_ref()
            .ok_or_else(|| anyhow!("history mutation queue is shut down"))?;
        tx.send(message)
            .map_err(|_| anyhow!("history mutation worker stopped"))
    }
}

impl Drop for MutationQueue {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            tracing::warn!(?err, "history mutation queue shutdown failed");
        }
    }
}

/// Applies one mutation to the persisted log of its scene.
pub fn apply_mutation(store: &dyn SettingsStore, rpc: &HistoryRpc) -> Result<()> {
    let scene = rpc.scene();
    match rpc {
        HistoryRpc::CommitHistory { entry, .. } => {
            if entry.is_empty() {
                return Ok(());
            }
            let mut log = load_history(store, scene)?.unwrap_or_default();
            log.append(entry.clone());
            save_history(store, scene, &log)?;
            tracing::info!(%scene, pointer = log.pointer(), "Pushed {} updates.", entry.len());
        }
        HistoryRpc::ResetHistory { .. } => {
            let mut log = load_history(store, scene)?.unwrap_or_default();
            log.reset();
            save_history(store, scene, &log)?;
            tracing::info!(%scene, "Reset history.");
        }
        HistoryRpc::StepBackHistory { steps, .. } => {
            let mut log = load_history(store, scene)?.unwrap_or_default();
            log.step_back(*steps);
            save_history(store, scene, &log)?;
            tracing::info!(%scene, pointer = log.pointer(), "Undid {steps} steps.");
        }
    }
    Ok(())
}

/// Receiving side of the protocol, registered on every GM client.
pub struct HistoryAuthority {
    user: UserId,
    roster: SharedRoster,
    queue: MutationQueue,
}

impl HistoryAuthority {
    pub fn new(user: UserId, roster: SharedRoster, store: Arc<dyn SettingsStore>) -> Result<Self> {
        Ok(Self {
            user,
            roster,
            queue: MutationQueue::spawn(store)?,
        })
    }

    pub fn is_responsible(&self) -> bool {
        self.roster
            .read()
            .map(|roster| roster.is_responsible(&self.user))
            .unwrap_or(false)
    }

    pub fn flush(&self) -> Result<()> {
        self.queue.flush()
    }
}

impl RpcHandler for HistoryAuthority {
    fn handle(&self, rpc: HistoryRpc) {
        if let HistoryRpc::CommitHistory { entry, .. } = &rpc {
            if entry.is_empty() {
                return;
            }
        }
        if !self.is_responsible() {
            tracing::debug!(
                user = %self.user,
                procedure = rpc.procedure(),
                "not the responsible GM; ignoring"
            );
            return;
        }
        if let Err(err) = self.queue.submit(rpc) {
            tracing::error!(?err, user = %self.user, "failed to queue history mutation");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::model::{BrushDescriptor, Color};
    use crate::overlay::notifications::NotificationLog;
    use crate::overlay::roster::{Roster, UserInfo};
    use crate::overlay::store::JsonSettingsStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingTransport {
        calls: AtomicUsize,
    }

    impl BroadcastTransport for CountingTransport {
        fn execute_for_all_privileged(&self, _rpc: &HistoryRpc) -> Result<usize> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        }
    }

    fn entry() -> HistoryEntry {
        HistoryEntry::new(vec![BrushDescriptor::new_box(
            0.0,
            0.0,
            10.0,
            10.0,
            Color::WHITE,
        )])
    }

    fn client_for(
        user: &str,
        roster: Roster,
        world: WorldSettings,
    ) -> (HistoryClient, Arc<CountingTransport>, Arc<NotificationLog>) {
        let transport = Arc::new(CountingTransport::default());
        let notes = Arc::new(NotificationLog::new());
        let client = HistoryClient::new(
            UserId::new(user),
            roster.shared(),
            Arc::new(RwLock::new(world)),
            transport.clone(),
            notes.clone(),
        );
        (client, transport, notes)
    }

    #[test]
    fn player_without_edit_rights_is_rejected_before_broadcast() {
        let roster = Roster::new([UserInfo::gm("gm"), UserInfo::player("p", true)]);
        let (client, transport, notes) = client_for("p", roster, WorldSettings::default());

        let result = client.request_commit(&SceneId::new("s"), entry());
        assert_eq!(result, Err(CommitError::PermissionDenied));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            notes.errors(),
            vec![CommitError::PermissionDenied.to_string()]
        );
    }

    #[test]
    fn player_needs_drawing_capability_even_when_editable() {
        let world = WorldSettings {
            is_player_editable: true,
            ..WorldSettings::default()
        };
        let roster = Roster::new([UserInfo::gm("gm"), UserInfo::player("p", false)]);
        let (client, transport, _) = client_for("p", roster, world.clone());
        assert_eq!(
            client.request_commit(&SceneId::new("s"), entry()),
            Err(CommitError::PermissionDenied)
        );
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);

        let roster = Roster::new([UserInfo::gm("gm"), UserInfo::player("p", true)]);
        let (client, transport, _) = client_for("p", roster, world);
        assert_eq!(client.request_commit(&SceneId::new("s"), entry()), Ok(()));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn no_active_gm_fails_fast() {
        let mut gm = UserInfo::gm("gm");
        gm.active = false;
        let mut roster = Roster::new([gm]);
        roster.upsert(UserInfo::gm("gm-2"));
        roster.set_active(&UserId::new("gm-2"), false);
        let (client, transport, notes) = client_for("gm", roster, WorldSettings::default());

        assert_eq!(
            client.request_reset(&SceneId::new("s")),
            Err(CommitError::NoAuthorityAvailable)
        );
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
        assert_eq!(notes.errors().len(), 1);
    }

    #[test]
    fn empty_commit_is_a_no_op() {
        let roster = Roster::new([UserInfo::gm("gm")]);
        let (client, transport, _) = client_for("gm", roster, WorldSettings::default());
        assert_eq!(
            client.request_commit(&SceneId::new("s"), HistoryEntry::default()),
            Ok(())
        );
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn queue_applies_mutations_in_submission_order() {
        let store: Arc<dyn SettingsStore> = Arc::new(JsonSettingsStore::in_memory());
        let queue = MutationQueue::spawn(store.clone()).expect("spawn queue");
        let scene = SceneId::new("s");

        for _ in 0..3 {
            queue
                .submit(HistoryRpc::CommitHistory {
                    scene: scene.clone(),
                    entry: entry(),
                })
                .expect("submit");
        }
        queue
            .submit(HistoryRpc::StepBackHistory {
                scene: scene.clone(),
                steps: 2,
            })
            .expect("submit");
        queue
            .submit(HistoryRpc::CommitHistory {
                scene: scene.clone(),
                entry: entry(),
            })
            .expect("submit");
        queue.flush().expect("flush");

        let log = load_history(store.as_ref(), &scene)
            .expect("load")
            .expect("history exists");
        assert_eq!(log.len(), 2);
        assert_eq!(log.pointer(), 2);
    }

    #[test]
    fn shut_down_queue_rejects_work() {
        let store: Arc<dyn SettingsStore> = Arc::new(JsonSettingsStore::in_memory());
        let queue = MutationQueue::spawn(store).expect("spawn queue");
        queue.shutdown().expect("shutdown");
        assert!(queue
            .submit(HistoryRpc::ResetHistory {
                scene: SceneId::new("s"),
            })
            .is_err());
    }

    #[test]
    fn non_responsible_gm_ignores_requests() {
        let store: Arc<dyn SettingsStore> = Arc::new(JsonSettingsStore::in_memory());
        let roster = Roster::new([UserInfo::gm("gm-a"), UserInfo::gm("gm-b")]).shared();
        let authority =
            HistoryAuthority::new(UserId::new("gm-b"), roster, store.clone()).expect("authority");
        assert!(!authority.is_responsible());

        authority.handle(HistoryRpc::CommitHistory {
            scene: SceneId::new("s"),
            entry: entry(),
        });
        authority.flush().expect("flush");
        assert_eq!(
            load_history(store.as_ref(), &SceneId::new("s")).expect("load"),
            None
        );
    }
}
