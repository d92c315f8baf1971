use crate::overlay::model::{Color, SceneId, UserId};
use crate::overlay::store::SettingsStore;
use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    Visible,
    GmAlpha,
    PlayerAlpha,
    PreviewColor,
    PaletteColor,
}

impl SettingKey {
    pub const ALL: [SettingKey; 5] = [
        SettingKey::Visible,
        SettingKey::GmAlpha,
        SettingKey::PlayerAlpha,
        SettingKey::PreviewColor,
        SettingKey::PaletteColor,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Visible => "visible",
            Self::GmAlpha => "gmAlpha",
            Self::PlayerAlpha => "playerAlpha",
            Self::PreviewColor => "previewColor",
            Self::PaletteColor => "paletteColor",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == key)
    }
}

static SYSTEM_DEFAULTS: Lazy<Map<String, Value>> = Lazy::new(|| {
    let mut defaults = Map::new();
    defaults.insert(SettingKey::Visible.as_str().into(), json!(false));
    defaults.insert(SettingKey::GmAlpha.as_str().into(), json!(0.5));
    defaults.insert(SettingKey::PlayerAlpha.as_str().into(), json!(0.5));
    defaults.insert(SettingKey::PreviewColor.as_str().into(), json!("#00ffff"));
    defaults.insert(SettingKey::PaletteColor.as_str().into(), json!("#ffffff"));
    defaults
});

pub fn system_defaults() -> &'static Map<String, Value> {
    &SYSTEM_DEFAULTS
}

/// Scene override, then user default, then system default.
pub fn resolve<'a>(
    key: &str,
    scene: &'a Map<String, Value>,
    user: &'a Map<String, Value>,
    system: &'a Map<String, Value>,
) -> Option<&'a Value> {
    scene
        .get(key)
        .or_else(|| user.get(key))
        .or_else(|| system.get(key))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Gm,
    Player,
}

impl Role {
    pub fn from_is_gm(is_gm: bool) -> Self {
        if is_gm {
            Self::Gm
        } else {
            Self::Player
        }
    }

    pub fn alpha_key(self) -> SettingKey {
        match self {
            Self::Gm => SettingKey::GmAlpha,
            Self::Player => SettingKey::PlayerAlpha,
        }
    }
}

/// Typed view over the resolved overlay settings for one scene and user.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlaySettings {
    pub visible: bool,
    pub gm_alpha: f64,
    pub player_alpha: f64,
    pub preview_color: Color,
    pub palette_color: Color,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self::from_layers(&Map::new(), &Map::new())
    }
}

impl OverlaySettings {
    pub fn from_layers(scene: &Map<String, Value>, user: &Map<String, Value>) -> Self {
        let system = system_defaults();
        let get = |key: SettingKey| resolve(key.as_str(), scene, user, system);
        let default_of = |key: SettingKey| system.get(key.as_str());

        let visible = get(SettingKey::Visible)
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let alpha = |key: SettingKey| {
            get(key)
                .and_then(Value::as_f64)
                .filter(|alpha| *alpha > 0.0)
                .or_else(|| default_of(key).and_then(Value::as_f64))
                .unwrap_or(0.5)
        };
        let color = |key: SettingKey| {
            get(key)
                .and_then(value_to_color)
                .or_else(|| default_of(key).and_then(value_to_color))
                .unwrap_or(Color::WHITE)
        };

        Self {
            visible,
            gm_alpha: alpha(SettingKey::GmAlpha),
            player_alpha: alpha(SettingKey::PlayerAlpha),
            preview_color: color(SettingKey::PreviewColor),
            palette_color: color(SettingKey::PaletteColor),
        }
    }

    pub fn load(store: &dyn SettingsStore, scene: &SceneId, user: &UserId) -> Self {
        Self::from_layers(&store.scene_flags(scene), &store.user_flags(user))
    }

    /// Zero or missing alpha falls back to the role's system default.
    pub fn alpha_for(&self, role: Role) -> f64 {
        match role {
            Role::Gm => self.gm_alpha,
            Role::Player => self.player_alpha,
        }
    }
}

pub fn value_to_color(value: &Value) -> Option<Color> {
    match value {
        Value::String(text) => Color::parse(text),
        Value::Number(number) => number
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(Color::from_u32),
        _ => None,
    }
}

/// Writes any default missing on the scene: the user's custom default when
/// present, otherwise the system default. Returns the keys that were written.
pub fn seed_scene_defaults(
    store: &dyn SettingsStore,
    scene: &SceneId,
    user: &UserId,
) -> Result<Vec<SettingKey>> {
    let scene_flags = store.scene_flags(scene);
    let user_flags = store.user_flags(user);
    let mut seeded = Vec::new();
    for key in SettingKey::ALL {
        if scene_flags.contains_key(key.as_str()) {
            continue;
        }
        let value = user_flags
            .get(key.as_str())
            .or_else(|| system_defaults().get(key.as_str()))
            .cloned();
        if let Some(value) = value {
            store
                .set_scene_flag(scene, key.as_str(), value)
                .with_context(|| format!("seed scene default {}", key.as_str()))?;
            seeded.push(key);
        }
    }
    Ok(seeded)
}

/// Submitted values of the scene configuration form. Alphas are percentages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneConfigForm {
    pub gm_alpha_percent: f64,
    pub player_alpha_percent: f64,
    pub save_as_defaults: bool,
}

impl SceneConfigForm {
    pub fn from_settings(settings: &OverlaySettings) -> Self {
        Self {
            gm_alpha_percent: (settings.gm_alpha * 100.0).round(),
            player_alpha_percent: (settings.player_alpha * 100.0).round(),
            save_as_defaults: false,
        }
    }

    pub fn apply(&self, store: &dyn SettingsStore, scene: &SceneId, user: &UserId) -> Result<()> {
        let values = [
            (SettingKey::GmAlpha, self.gm_alpha_percent / 100.0),
            (SettingKey::PlayerAlpha, self.player_alpha_percent / 100.0),
        ];
        for (key, alpha) in values {
            store.set_scene_flag(scene, key.as_str(), json!(alpha))?;
            if self.save_as_defaults {
                store.set_user_flag(user, key.as_str(), json!(alpha))?;
            }
        }
        Ok(())
    }
}

/// Module-wide settings shared by every scene.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldSettings {
    #[serde(default)]
    pub is_player_editable: bool,
    #[serde(default = "default_z_index")]
    pub z_index: i32,
    #[serde(default)]
    pub migration_version: u32,
}

fn default_z_index() -> i32 {
    215
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            is_player_editable: false,
            z_index: default_z_index(),
            migration_version: 0,
        }
    }
}

impl WorldSettings {
    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(err).with_context(|| format!("read world settings {}", path.display()))
            }
        };
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(&content)
            .with_context(|| format!("deserialize world settings {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("create world settings parent folder {}", parent.display())
            })?;
        }
        let json = serde_json::to_string_pretty(self).context("serialize world settings")?;
        std::fs::write(path, json)
            .with_context(|| format!("write world settings {}", path.display()))
    }
}
