use crate::overlay::history::HistoryLog;
use crate::overlay::model::{SceneId, UserId};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;

pub const MODULE_ID: &str = "polmap";
pub const HISTORY_KEY: &str = "history";

/// Notification that flags on a scene changed. `None` marks an unset key.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneUpdate {
    pub scene: SceneId,
    pub changes: BTreeMap<String, Option<Value>>,
}

impl SceneUpdate {
    pub fn single(scene: SceneId, key: &str, value: Option<Value>) -> Self {
        let mut changes = BTreeMap::new();
        changes.insert(key.to_owned(), value);
        Self { scene, changes }
    }

    pub fn touches(&self, key: &str) -> bool {
        self.changes.contains_key(key)
    }

    pub fn value(&self, key: &str) -> Option<&Value> {
        self.changes.get(key).and_then(Option::as_ref)
    }

    /// Changed key paths in host notation, e.g. `flags.polmap.history`.
    pub fn changed_paths(&self) -> Vec<String> {
        self.changes
            .keys()
            .map(|key| format!("flags.{MODULE_ID}.{key}"))
            .collect()
    }
}

/// Scene-scoped and user-scoped flag storage provided by the host.
///
/// Writes become visible to every client through the [`SceneUpdate`] stream
/// returned by [`SettingsStore::subscribe`].
pub trait SettingsStore: Send + Sync {
    fn scene_flag(&self, scene: &SceneId, key: &str) -> Option<Value>;
    fn scene_flags(&self, scene: &SceneId) -> Map<String, Value>;
    fn set_scene_flag(&self, scene: &SceneId, key: &str, value: Value) -> Result<()>;
    fn unset_scene_flag(&self, scene: &SceneId, key: &str) -> Result<()>;
    fn user_flag(&self, user: &UserId, key: &str) -> Option<Value>;
    fn user_flags(&self, user: &UserId) -> Map<String, Value>;
    fn set_user_flag(&self, user: &UserId, key: &str, value: Value) -> Result<()>;
    fn unset_user_flag(&self, user: &UserId, key: &str) -> Result<()>;
    fn subscribe(&self) -> Receiver<SceneUpdate>;
}

pub fn load_history(store: &dyn SettingsStore, scene: &SceneId) -> Result<Option<HistoryLog>> {
    let Some(value) = store.scene_flag(scene, HISTORY_KEY) else {
        return Ok(None);
    };
    let log = serde_json::from_value(value)
        .with_context(|| format!("deserialize history for scene {scene}"))?;
    Ok(Some(log))
}

/// Replaces the stored history. The key is unset first so the host drops the
/// old nested arrays instead of merging into them.
pub fn save_history(store: &dyn SettingsStore, scene: &SceneId, log: &HistoryLog) -> Result<()> {
    let value = serde_json::to_value(log).context("serialize history")?;
    store.unset_scene_flag(scene, HISTORY_KEY)?;
    store.set_scene_flag(scene, HISTORY_KEY, value)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct FlagTables {
    #[serde(default)]
    scenes: BTreeMap<SceneId, Map<String, Value>>,
    #[serde(default)]
    users: BTreeMap<UserId, Map<String, Value>>,
}

#[derive(Default)]
struct StoreState {
    tables: FlagTables,
    subscribers: Vec<Sender<SceneUpdate>>,
}

/// In-memory flag store, optionally mirrored to a JSON file after every write.
pub struct JsonSettingsStore {
    path: Option<PathBuf>,
    state: Mutex<StoreState>,
}

impl JsonSettingsStore {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(StoreState::default()),
        }
    }

    /// Opens a store backed by `path`. A missing or empty file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let tables = load_tables(&path)?;
        Ok(Self {
            path: Some(path),
            state: Mutex::new(StoreState {
                tables,
                subscribers: Vec::new(),
            }),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn scenes(&self) -> Vec<SceneId> {
        self.state
            .lock()
            .map(|state| state.tables.scenes.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn write<F>(&self, apply: F) -> Result<Option<SceneUpdate>>
    where
        F: FnOnce(&mut FlagTables) -> Option<SceneUpdate>,
    {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow!("settings store lock poisoned"))?;
        // Staged on a copy so a failed save leaves memory and disk in agreement.
        let mut next = state.tables.clone();
        let update = apply(&mut next);
        if let Some(path) = &self.path {
            save_tables(path, &next)?;
        }
        state.tables = next;
        if let Some(update) = &update {
            state
                .subscribers
                .retain(|subscriber| subscriber.send(update.clone()).is_ok());
        }
        Ok(update)
    }

    fn read<T>(&self, read: impl FnOnce(&FlagTables) -> T) -> Option<T> {
        self.state.lock().ok().map(|state| read(&state.tables))
    }
}

impl SettingsStore for JsonSettingsStore {
    fn scene_flag(&self, scene: &SceneId, key: &str) -> Option<Value> {
        self.read(|tables| {
            tables
                .scenes
                .get(scene)
                .and_then(|flags| flags.get(key))
                .cloned()
        })
        .flatten()
    }

    fn scene_flags(&self, scene: &SceneId) -> Map<String, Value> {
        self.read(|tables| tables.scenes.get(scene).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    fn set_scene_flag(&self, scene: &SceneId, key: &str, value: Value) -> Result<()> {
        self.write(|tables| {
            tables
                .scenes
                .entry(scene.clone())
                .or_default()
                .insert(key.to_owned(), value.clone());
            Some(SceneUpdate::single(scene.clone(), key, Some(value)))
        })?;
        Ok(())
    }

    fn unset_scene_flag(&self, scene: &SceneId, key: &str) -> Result<()> {
        self.write(|tables| {
            let removed = tables
                .scenes
                .get_mut(scene)
                .and_then(|flags| flags.remove(key));
            removed.map(|_| SceneUpdate::single(scene.clone(), key, None))
        })?;
        Ok(())
    }

    fn user_flag(&self, user: &UserId, key: &str) -> Option<Value> {
        self.read(|tables| {
            tables
                .users
                .get(user)
                .and_then(|flags| flags.get(key))
                .cloned()
        })
        .flatten()
    }

    fn user_flags(&self, user: &UserId) -> Map<String, Value> {
        self.read(|tables| tables.users.get(user).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    fn set_user_flag(&self, user: &UserId, key: &str, value: Value) -> Result<()> {
        self.write(|tables| {
            tables
                .users
                .entry(user.clone())
                .or_default()
                .insert(key.to_owned(), value);
            None
        })?;
        Ok(())
    }

    fn unset_user_flag(&self, user: &UserId, key: &str) -> Result<()> {
        self.write(|tables| {
            if let Some(flags) = tables.users.get_mut(user) {
                flags.remove(key);
            }
            None
        })?;
        Ok(())
    }

    fn subscribe(&self) -> Receiver<SceneUpdate> {
        let (tx, rx) = mpsc::channel();
        if let Ok(mut state) = self.state.lock() {
            state.subscribers.push(tx);
        }
        rx
    }
}

fn load_tables(path: &Path) -> Result<FlagTables> {
    if !path.exists() {
        return Ok(FlagTables::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("read settings store file {}", path.display()))?;

    if content.trim().is_empty() {
        return Ok(FlagTables::default());
    }

    serde_json::from_str(&content)
        .with_context(|| format!("deserialize settings store file {}", path.display()))
}

fn save_tables(path: &Path, tables: &FlagTables) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create settings store parent folder {}", parent.display()))?;
    }

    let json = serde_json::to_string_pretty(tables).context("serialize settings store")?;
    std::fs::write(path, json)
        .with_context(|| format!("write settings store file {}", path.display()))
}
