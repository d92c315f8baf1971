use crate::overlay::arbitration::{CommitError, HistoryClient};
use crate::overlay::config::{seed_scene_defaults, OverlaySettings, Role, SettingKey};
use crate::overlay::grid::{GridMapper, GridParams};
use crate::overlay::history::{HistoryLog, RenderCursor, SyncOutcome};
use crate::overlay::model::{Color, SceneId};
use crate::overlay::palette;
use crate::overlay::render::CompositingSurface;
use crate::overlay::session::{ActiveTool, PointerButton, PointerOutcome, StrokeSession};
use crate::overlay::store::{load_history, SceneUpdate, SettingsStore, HISTORY_KEY};
use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::sync::Arc;

/// The drawing layer of one scene as seen by one client.
///
/// Owns the local surface, the render cursor and the stroke session. Shared
/// state lives in the settings store; the layer only reads it and asks the
/// [`HistoryClient`] for mutations.
pub struct OverlayLayer<S: CompositingSurface> {
    scene: SceneId,
    role: Role,
    store: Arc<dyn SettingsStore>,
    client: HistoryClient,
    surface: S,
    cursor: RenderCursor,
    session: StrokeSession,
    settings: OverlaySettings,
}

impl<S: CompositingSurface> OverlayLayer<S> {
    pub fn new(
        scene: SceneId,
        grid: GridParams,
        store: Arc<dyn SettingsStore>,
        client: HistoryClient,
        surface: S,
    ) -> Self {
        let role = Role::from_is_gm(client.is_gm());
        let settings = OverlaySettings::load(store.as_ref(), &scene, client.user());
        let session = StrokeSession::new(
            GridMapper::new(grid),
            settings.palette_color,
            settings.preview_color,
        );
        Self {
            scene,
            role,
            store,
            client,
            surface,
            cursor: RenderCursor::default(),
            session,
            settings,
        }
    }

    /// Seeds missing scene defaults (GM only), then runs [`Self::init`].
    pub fn canvas_init(&mut self) -> Result<SyncOutcome> {
        if self.role == Role::Gm {
            let seeded = seed_scene_defaults(self.store.as_ref(), &self.scene, self.client.user())?;
            if !seeded.is_empty() {
                tracing::debug!(scene = %self.scene, seeded = seeded.len(), "seeded scene defaults");
            }
        }
        self.init()
    }

    /// Reloads settings, clears the surface and replays the stored history.
    pub fn init(&mut self) -> Result<SyncOutcome> {
        self.settings = OverlaySettings::load(self.store.as_ref(), &self.scene, self.client.user());
        self.session.set_fill(self.settings.palette_color);
        self.session.set_outline(self.settings.preview_color);
        self.resync()
    }

    /// Full clear and replay from the persisted log.
    pub fn resync(&mut self) -> Result<SyncOutcome> {
        self.cursor.reset(&mut self.surface);
        let log = load_history(self.store.as_ref(), &self.scene)?;
        Ok(match self.cursor.sync(log.as_ref(), &mut self.surface) {
            SyncOutcome::Incremental { to, .. } => SyncOutcome::FullReplay { to },
            outcome => outcome,
        })
    }

    /// Applies a scene-update notification. Updates for other scenes are ignored.
    pub fn on_external_update(&mut self, update: &SceneUpdate) -> Result<()> {
        if update.scene != self.scene {
            return Ok(());
        }
        let alpha_key = self.role.alpha_key();
        for (key, value) in &update.changes {
            match SettingKey::from_key(key) {
                Some(SettingKey::Visible) => {
                    self.settings.visible =
                        value.as_ref().and_then(Value::as_bool).unwrap_or(false);
                }
                Some(key) if key == alpha_key => {
                    let alpha = value
                        .as_ref()
                        .and_then(Value::as_f64)
                        .filter(|alpha| *alpha > 0.0)
                        .unwrap_or_else(|| OverlaySettings::default().alpha_for(self.role));
                    match self.role {
                        Role::Gm => self.settings.gm_alpha = alpha,
                        Role::Player => self.settings.player_alpha = alpha,
                    }
                }
                _ => {}
            }
        }
        if let Some(value) = update.value(HISTORY_KEY) {
            let log: HistoryLog =
                serde_json::from_value(value.clone()).context("decode history update")?;
            self.cursor.sync(Some(&log), &mut self.surface);
        }
        Ok(())
    }

    pub fn activate_tool(&mut self) {
        self.session.set_active_tool(ActiveTool::Grid);
    }

    pub fn deactivate_tool(&mut self) {
        self.session.clear_active_tool();
    }

    /// Switches to a new grid geometry. Any stroke in progress is discarded
    /// since its cells were resolved against the old grid.
    pub fn set_grid(&mut self, grid: GridParams) {
        self.session.set_mapper(GridMapper::new(grid));
    }

    pub fn set_erasing(&mut self, erasing: bool) {
        self.session.set_erasing(erasing);
    }

    pub fn pointer_down(&mut self, button: PointerButton, point: (f64, f64)) -> PointerOutcome {
        self.session.pointer_down(button, point, &mut self.surface)
    }

    pub fn pointer_move(&mut self, point: (f64, f64)) -> PointerOutcome {
        self.session.pointer_move(point, &mut self.surface)
    }

    /// Ends the gesture and submits its entry. A rejected commit rolls the
    /// surface back to the stored history.
    pub fn pointer_up(
        &mut self,
        button: PointerButton,
        point: (f64, f64),
    ) -> Result<(), CommitError> {
        let Some(entry) = self.session.pointer_up(button, point, &mut self.surface) else {
            return Ok(());
        };
        let result = self.client.request_commit(&self.scene, entry);
        self.session.finish_flush();
        if result.is_err() {
            self.rollback();
        }
        result
    }

    pub fn undo(&mut self, steps: usize) -> Result<(), CommitError> {
        let result = self.client.request_step_back(&self.scene, steps);
        if result.is_err() {
            self.rollback();
        }
        result
    }

    pub fn reset_layer(&mut self) -> Result<(), CommitError> {
        let result = self.client.request_reset(&self.scene);
        if result.is_err() {
            self.rollback();
        }
        result
    }

    /// Flips the persisted `visible` flag and returns the new value. The
    /// local state follows once the store notification arrives.
    pub fn toggle_visibility(&self) -> Result<bool> {
        let visible = !self.settings.visible;
        self.store
            .set_scene_flag(&self.scene, SettingKey::Visible.as_str(), json!(visible))?;
        Ok(visible)
    }

    /// Stores the palette colour as the user's default and paints with it.
    pub fn set_palette_color(&mut self, color: Color) -> Result<()> {
        self.store.set_user_flag(
            self.client.user(),
            SettingKey::PaletteColor.as_str(),
            json!(color.to_hex()),
        )?;
        self.settings.palette_color = color;
        self.session.set_fill(color);
        Ok(())
    }

    /// Picks a named colour from the basic or extended palette.
    pub fn select_palette_color(&mut self, name: &str) -> Result<Option<Color>> {
        let Some(named) = palette::find(name) else {
            return Ok(None);
        };
        self.set_palette_color(named.color)?;
        Ok(Some(named.color))
    }

    pub fn scene(&self) -> &SceneId {
        &self.scene
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_visible(&self) -> bool {
        self.settings.visible
    }

    /// Layer opacity for the local user's role.
    pub fn alpha(&self) -> f64 {
        self.settings.alpha_for(self.role)
    }

    /// Stacking order of the layer among the host's canvas layers.
    pub fn z_index(&self) -> i32 {
        self.client.world().z_index
    }

    pub fn settings(&self) -> &OverlaySettings {
        &self.settings
    }

    pub fn session(&self) -> &StrokeSession {
        &self.session
    }

    pub fn cursor(&self) -> &RenderCursor {
        &self.cursor
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    fn rollback(&mut self) {
        if let Err(err) = self.resync() {
            tracing::error!(?err, scene = %self.scene, "resync after rejected commit failed");
        }
    }
}
