use crate::overlay::messages::HistoryRpc;
use crate::overlay::model::UserId;
use crate::overlay::roster::SharedRoster;
use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// Receives broadcast procedures on a privileged client.
pub trait RpcHandler: Send + Sync {
    fn handle(&self, rpc: HistoryRpc);
}

/// RPC-over-broadcast primitive: delivers to every connected privileged client
/// and reports only local dispatch success.
pub trait BroadcastTransport: Send + Sync {
    /// Returns how many clients the procedure was handed to.
    fn execute_for_all_privileged(&self, rpc: &HistoryRpc) -> Result<usize>;
}

/// In-process broadcast hub. Payloads are encoded once and decoded per
/// recipient so every client sees its own copy, as over a real socket.
pub struct LocalBroadcast {
    roster: SharedRoster,
    handlers: RwLock<BTreeMap<UserId, Arc<dyn RpcHandler>>>,
}

impl LocalBroadcast {
    pub fn new(roster: SharedRoster) -> Self {
        Self {
            roster,
            handlers: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn register(&self, user: UserId, handler: Arc<dyn RpcHandler>) -> Result<()> {
        let mut handlers = self
            .handlers
            .write()
            .map_err(|_| anyhow!("broadcast handler lock poisoned"))?;
        handlers.insert(user, handler);
        Ok(())
    }

    pub fn unregister(&self, user: &UserId) -> Result<()> {
        let mut handlers = self
            .handlers
            .write()
            .map_err(|_| anyhow!("broadcast handler lock poisoned"))?;
        handlers.remove(user);
        Ok(())
    }

    fn recipients(&self) -> Result<Vec<(UserId, Arc<dyn RpcHandler>)>> {
        let roster = self
            .roster
            .read()
            .map_err(|_| anyhow!("roster lock poisoned"))?;
        let handlers = self
            .handlers
            .read()
            .map_err(|_| anyhow!("broadcast handler lock poisoned"))?;
        Ok(handlers
            .iter()
            .filter(|(user, _)| roster.get(user).is_some_and(|info| info.is_active_gm()))
            .map(|(user, handler)| (user.clone(), handler.clone()))
            .collect())
    }
}

impl BroadcastTransport for LocalBroadcast {
    fn execute_for_all_privileged(&self, rpc: &HistoryRpc) -> Result<usize> {
        let bytes = rpc.encode()?;
        let recipients = self.recipients()?;
        for (user, handler) in &recipients {
            tracing::debug!(procedure = rpc.procedure(), %user, "delivering history rpc");
            handler.handle(HistoryRpc::decode(&bytes)?);
        }
        Ok(recipients.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::model::SceneId;
    use crate::overlay::roster::{Roster, UserInfo};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<HistoryRpc>>,
    }

    impl RpcHandler for Recorder {
        fn handle(&self, rpc: HistoryRpc) {
            self.seen.lock().expect("recorder lock").push(rpc);
        }
    }

    #[test]
    fn only_active_gms_receive_broadcasts() {
        let mut away = UserInfo::gm("gm-away");
        away.active = false;
        let roster = Roster::new([UserInfo::gm("gm-a"), away, UserInfo::player("p", true)]).shared();
        let hub = LocalBroadcast::new(roster);

        let gm = Arc::new(Recorder::default());
        let gm_away = Arc::new(Recorder::default());
        let player = Arc::new(Recorder::default());
        hub.register(UserId::new("gm-a"), gm.clone()).expect("register");
        hub.register(UserId::new("gm-away"), gm_away.clone())
            .expect("register");
        hub.register(UserId::new("p"), player.clone()).expect("register");

        let rpc = HistoryRpc::ResetHistory {
            scene: SceneId::new("s"),
        };
        assert_eq!(hub.execute_for_all_privileged(&rpc).expect("broadcast"), 1);
        assert_eq!(gm.seen.lock().expect("lock").as_slice(), &[rpc]);
        assert!(gm_away.seen.lock().expect("lock").is_empty());
        assert!(player.seen.lock().expect("lock").is_empty());
    }

    #[test]
    fn unregistered_clients_stop_receiving() {
        let roster = Roster::new([UserInfo::gm("gm-a")]).shared();
        let hub = LocalBroadcast::new(roster);
        let gm = Arc::new(Recorder::default());
        hub.register(UserId::new("gm-a"), gm.clone()).expect("register");
        hub.unregister(&UserId::new("gm-a")).expect("unregister");

        let rpc = HistoryRpc::ResetHistory {
            scene: SceneId::new("s"),
        };
        assert_eq!(hub.execute_for_all_privileged(&rpc).expect("broadcast"), 0);
        assert!(gm.seen.lock().expect("lock").is_empty());
        hub.unregister(&UserId::new("nobody")).expect("unregister unknown");
    }
}
