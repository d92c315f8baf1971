pub mod arbitration;
pub mod composite;
pub mod config;
pub mod controller;
pub mod grid;
pub mod history;
pub mod layer;
pub mod messages;
pub mod model;
pub mod notifications;
pub mod palette;
pub mod render;
pub mod roster;
pub mod session;
pub mod store;
pub mod transport;

pub use arbitration::{CommitError, HistoryAuthority, HistoryClient, MutationQueue};
pub use grid::{GridKind, GridMapper, GridParams};
pub use history::{HistoryLog, RenderCursor, SyncOutcome};
pub use layer::OverlayLayer;
pub use model::{BlendMode, BrushDescriptor, BrushShape, Color, HistoryEntry, SceneId, UserId};
pub use render::{CompositingSurface, DrawList, RasterSurface};
pub use session::{PointerButton, PointerOutcome, StrokeSession};
pub use store::{JsonSettingsStore, SceneUpdate, SettingsStore};
