use crate::overlay::model::HistoryEntry;
use crate::overlay::render::CompositingSurface;
use serde::{Deserialize, Serialize};

/// Shared, persisted brush history for one scene.
///
/// `pointer` counts the entries that are currently applied; anything past it is
/// an undone tail that the next append discards. `generation` changes whenever
/// the applied prefix can no longer be trusted by a client that rendered an
/// older version of the log (reset, or an append that cut off a tail).
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct HistoryLog {
    events: Vec<HistoryEntry>,
    pointer: usize,
    generation: u64,
}

#[derive(Deserialize)]
struct HistoryLogWire {
    #[serde(default)]
    events: Vec<HistoryEntry>,
    #[serde(default)]
    pointer: usize,
    #[serde(default)]
    generation: u64,
}

impl<'de> Deserialize<'de> for HistoryLog {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let wire = HistoryLogWire::deserialize(deserializer)?;
        let pointer = wire.pointer.min(wire.events.len());
        Ok(Self {
            events: wire.events,
            pointer,
            generation: wire.generation,
        })
    }
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[HistoryEntry] {
        &self.events
    }

    pub fn pointer(&self) -> usize {
        self.pointer
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Entries currently applied, i.e. `events[..pointer]`.
    pub fn applied(&self) -> &[HistoryEntry] {
        &self.events[..self.pointer]
    }

    /// Drops the undone tail, then appends `entry` and moves the pointer to the end.
    pub fn append(&mut self, entry: HistoryEntry) {
        if self.pointer < self.events.len() {
            self.events.truncate(self.pointer);
            self.generation += 1;
        }
        self.events.push(entry);
        self.pointer = self.events.len();
    }

    pub fn reset(&mut self) {
        self.events.clear();
        self.pointer = 0;
        self.generation += 1;
    }

    /// Moves the pointer back by `steps`, clamping at zero. Events are kept.
    pub fn step_back(&mut self, steps: usize) {
        self.pointer = self.pointer.saturating_sub(steps);
    }

    /// Applies every brush of `events[from..to]` in order. Out-of-range bounds are clamped.
    pub fn replay(&self, from: usize, to: usize, surface: &mut dyn CompositingSurface) -> usize {
        let to = to.min(self.events.len());
        if from >= to {
            return 0;
        }
        let mut rendered = 0;
        for entry in &self.events[from..to] {
            if entry.is_empty() {
                continue;
            }
            for brush in entry.brushes() {
                surface.render(brush);
                rendered += 1;
            }
        }
        rendered
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Nothing is stored for the scene yet.
    Missing,
    /// Only the entries in `from..to` were rendered on top of the surface.
    Incremental { from: usize, to: usize },
    /// The surface was cleared and `0..to` replayed.
    FullReplay { to: usize },
}

/// Per-client record of how much of the shared log is on the local surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderCursor {
    pointer: usize,
    generation: Option<u64>,
}

impl RenderCursor {
    pub fn pointer(&self) -> usize {
        self.pointer
    }

    /// Clears the surface and forgets everything rendered so far.
    pub fn reset(&mut self, surface: &mut dyn CompositingSurface) {
        surface.clear();
        self.pointer = 0;
        self.generation = None;
    }

    /// Brings the surface in line with `log`, rendering only new entries when the
    /// already rendered prefix is still valid and replaying from zero otherwise.
    pub fn sync(
        &mut self,
        log: Option<&HistoryLog>,
        surface: &mut dyn CompositingSurface,
    ) -> SyncOutcome {
        let Some(log) = log else {
            return SyncOutcome::Missing;
        };
        let stop = log.pointer();
        let prefix_stale = self
            .generation
            .is_some_and(|generation| generation != log.generation());

        let outcome = if log.is_empty() || stop <= self.pointer || prefix_stale {
            surface.clear();
            SyncOutcome::FullReplay { to: stop }
        } else {
            SyncOutcome::Incremental {
                from: self.pointer,
                to: stop,
            }
        };

        let from = match outcome {
            SyncOutcome::Incremental { from, .. } => from,
            _ => 0,
        };
        tracing::debug!("Rendering from: {from} to {stop}");
        log.replay(from, stop, surface);
        self.pointer = stop;
        self.generation = Some(log.generation());
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::model::{BrushDescriptor, Color};
    use crate::overlay::render::{DrawCommand, DrawList, RasterSurface};

    fn entry(id: u8) -> HistoryEntry {
        HistoryEntry::new(vec![BrushDescriptor::new_box(
            id as f64 * 10.0,
            0.0,
            10.0,
            10.0,
            Color::rgb(id, 0, 0),
        )])
    }

    fn log_with(ids: &[u8]) -> HistoryLog {
        let mut log = HistoryLog::new();
        for id in ids {
            log.append(entry(*id));
        }
        log
    }

    #[test]
    fn appends_without_undo_concatenate() {
        let log = log_with(&[1, 2, 3, 4]);
        assert_eq!(
            log.events(),
            &[entry(1), entry(2), entry(3), entry(4)][..]
        );
        assert_eq!(log.pointer(), 4);
        assert_eq!(log.generation(), 0);
    }

    #[test]
    fn step_back_then_append_truncates_exactly_k_entries() {
        let mut log = log_with(&[1, 2, 3, 4, 5]);
        log.step_back(2);
        log.append(entry(9));
        assert_eq!(
            log.events(),
            &[entry(1), entry(2), entry(3), entry(9)][..]
        );
        assert_eq!(log.pointer(), 4);
    }

    #[test]
    fn append_after_partial_undo_replaces_tail() {
        let mut log = log_with(&[1, 2, 3]);
        log.step_back(2);
        assert_eq!(log.pointer(), 1);

        log.append(entry(7));
        assert_eq!(log.len(), 2);
        assert_eq!(log.pointer(), 2);
        assert_eq!(log.events()[1], entry(7));
        assert_eq!(log.generation(), 1);
    }

    #[test]
    fn step_back_clamps_at_zero_and_keeps_events() {
        let mut log = log_with(&[1, 2]);
        log.step_back(5);
        assert_eq!(log.pointer(), 0);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn reset_empties_log_and_bumps_generation() {
        let mut log = log_with(&[1, 2]);
        log.reset();
        assert!(log.is_empty());
        assert_eq!(log.pointer(), 0);
        assert_eq!(log.generation(), 1);
    }

    #[test]
    fn replay_skips_empty_entries() {
        let mut log = log_with(&[1]);
        log.append(HistoryEntry::default());
        log.append(entry(2));
        let mut list = DrawList::default();
        assert_eq!(log.replay(0, log.pointer(), &mut list), 2);
        assert_eq!(list.commands().len(), 2);
    }

    #[test]
    fn replaying_applied_prefix_twice_is_idempotent() {
        let log = log_with(&[1, 2, 3]);
        let mut once = RasterSurface::with_resolution(64, 16, 1.0);
        log.replay(0, log.pointer(), &mut once);

        let mut twice = RasterSurface::with_resolution(64, 16, 1.0);
        log.replay(0, log.pointer(), &mut twice);
        log.replay(0, log.pointer(), &mut twice);
        assert_eq!(once.image(), twice.image());
    }

    #[test]
    fn deserialize_clamps_pointer_past_end() {
        let log: HistoryLog =
            serde_json::from_str(r#"{"events":[[]],"pointer":7}"#).expect("history json");
        assert_eq!(log.pointer(), 1);
        assert_eq!(log.generation(), 0);
    }

    #[test]
    fn cursor_renders_only_new_entries_when_prefix_is_valid() {
        let mut log = log_with(&[1, 2]);
        let mut cursor = RenderCursor::default();
        let mut list = DrawList::default();
        assert_eq!(
            cursor.sync(Some(&log), &mut list),
            SyncOutcome::Incremental { from: 0, to: 2 }
        );

        log.append(entry(3));
        list.drain();
        assert_eq!(
            cursor.sync(Some(&log), &mut list),
            SyncOutcome::Incremental { from: 2, to: 3 }
        );
        assert_eq!(list.commands(), &[DrawCommand::Render(entry(3).0[0].clone())][..]);
    }

    #[test]
    fn cursor_replays_from_zero_after_undo() {
        let mut log = log_with(&[1, 2, 3]);
        let mut cursor = RenderCursor::default();
        let mut list = DrawList::default();
        cursor.sync(Some(&log), &mut list);

        log.step_back(1);
        list.drain();
        assert_eq!(
            cursor.sync(Some(&log), &mut list),
            SyncOutcome::FullReplay { to: 2 }
        );
        assert_eq!(list.commands()[0], DrawCommand::Clear);
        assert_eq!(list.visible_brushes().len(), 2);
        assert_eq!(cursor.pointer(), 2);
    }

    #[test]
    fn cursor_detects_rewritten_prefix_beyond_local_pointer() {
        let mut log = log_with(&[1, 2, 3]);
        let mut cursor = RenderCursor::default();
        let mut list = DrawList::default();
        cursor.sync(Some(&log), &mut list);

        // Undo and two appends land before this client hears about any of them.
        log.step_back(1);
        log.append(entry(8));
        log.append(entry(9));
        list.drain();
        assert_eq!(
            cursor.sync(Some(&log), &mut list),
            SyncOutcome::FullReplay { to: 4 }
        );
        assert_eq!(list.visible_brushes().len(), 4);
    }

    #[test]
    fn cursor_clears_surface_for_empty_log() {
        let log = HistoryLog::new();
        let mut cursor = RenderCursor::default();
        let mut list = DrawList::default();
        assert_eq!(
            cursor.sync(Some(&log), &mut list),
            SyncOutcome::FullReplay { to: 0 }
        );
        assert_eq!(list.commands(), &[DrawCommand::Clear][..]);
        assert_eq!(cursor.sync(None, &mut list), SyncOutcome::Missing);
    }
}
