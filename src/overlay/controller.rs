use crate::overlay::layer::OverlayLayer;
use crate::overlay::render::CompositingSurface;
use crate::overlay::store::SceneUpdate;
use std::sync::mpsc::{Receiver, TryRecvError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerLifecycle {
    Active,
    /// The store dropped its end of the notification channel.
    Disconnected,
}

/// Wires the store's scene-update stream into a layer.
pub struct LayerController {
    updates: Receiver<SceneUpdate>,
    lifecycle: ControllerLifecycle,
    applied: usize,
}

impl LayerController {
    pub fn new(updates: Receiver<SceneUpdate>) -> Self {
        Self {
            updates,
            lifecycle: ControllerLifecycle::Active,
            applied: 0,
        }
    }

    pub fn lifecycle(&self) -> ControllerLifecycle {
        self.lifecycle
    }

    /// Number of updates handed to a layer so far.
    pub fn applied(&self) -> usize {
        self.applied
    }

    /// Drains every pending notification into `layer` without blocking.
    /// Returns how many were processed in this call.
    pub fn pump<S: CompositingSurface>(&mut self, layer: &mut OverlayLayer<S>) -> usize {
        let mut processed = 0;
        loop {
            match self.updates.try_recv() {
                Ok(update) => {
                    if let Err(err) = layer.on_external_update(&update) {
                        tracing::warn!(?err, paths = ?update.changed_paths(), "scene update failed; resyncing");
                        if let Err(err) = layer.resync() {
                            tracing::error!(?err, "resync failed");
                        }
                    }
                    processed += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.lifecycle = ControllerLifecycle::Disconnected;
                    break;
                }
            }
        }
        self.applied += processed;
        processed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::arbitration::HistoryClient;
    use crate::overlay::config::WorldSettings;
    use crate::overlay::grid::GridParams;
    use crate::overlay::model::{SceneId, UserId};
    use crate::overlay::notifications::NotificationLog;
    use crate::overlay::render::DrawList;
    use crate::overlay::roster::{Roster, UserInfo};
    use crate::overlay::store::{JsonSettingsStore, SettingsStore};
    use crate::overlay::transport::LocalBroadcast;
    use serde_json::json;
    use std::sync::{Arc, RwLock};

    fn layer(store: Arc<dyn SettingsStore>) -> OverlayLayer<DrawList> {
        let roster = Roster::new([UserInfo::gm("gm")]).shared();
        let client = HistoryClient::new(
            UserId::new("gm"),
            roster.clone(),
            Arc::new(RwLock::new(WorldSettings::default())),
            Arc::new(LocalBroadcast::new(roster)),
            Arc::new(NotificationLog::new()),
        );
        OverlayLayer::new(
            SceneId::new("s"),
            GridParams::square(50.0),
            store,
            client,
            DrawList::default(),
        )
    }

    #[test]
    fn pump_applies_pending_updates() {
        let store: Arc<dyn SettingsStore> = Arc::new(JsonSettingsStore::in_memory());
        let mut controller = LayerController::new(store.subscribe());
        let mut layer = layer(store.clone());

        store
            .set_scene_flag(&SceneId::new("s"), "visible", json!(true))
            .expect("set");
        assert_eq!(controller.pump(&mut layer), 1);
        assert!(layer.is_visible());
        assert_eq!(controller.pump(&mut layer), 0);
        assert_eq!(controller.lifecycle(), ControllerLifecycle::Active);
    }

    #[test]
    fn malformed_history_update_falls_back_to_resync() {
        let (tx, rx) = std::sync::mpsc::channel();
        let store: Arc<dyn SettingsStore> = Arc::new(JsonSettingsStore::in_memory());
        let mut controller = LayerController::new(rx);
        let mut layer = layer(store);

        tx.send(SceneUpdate::single(
            SceneId::new("s"),
            "history",
            Some(json!("not a log")),
        ))
        .expect("send");
        drop(tx);

        assert_eq!(controller.pump(&mut layer), 1);
        assert_eq!(controller.lifecycle(), ControllerLifecycle::Disconnected);
        assert!(layer.surface().visible_brushes().is_empty());
    }
}
