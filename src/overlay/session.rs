use crate::overlay::grid::{CellKey, CellShape, GridCell, GridMapper};
use crate::overlay::model::{BlendMode, BrushDescriptor, Color, HistoryEntry};
use crate::overlay::render::CompositingSurface;
use std::collections::HashSet;

/// Manhattan distance under which a right-button gesture counts as a click.
pub const RIGHT_CLICK_THRESHOLD: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveTool {
    Grid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerOutcome {
    /// No tool is active or the button is not handled.
    Ignored,
    /// A previous flush is still pending; the input was discarded.
    Dropped,
    /// A cell was painted locally and buffered.
    Painted,
    /// The cell was already touched in this stroke.
    Duplicate,
    /// The pointer does not resolve to a grid cell.
    OffGrid,
    /// Pointer moved without an active stroke; only the preview changed.
    Hover,
    /// A right-button gesture is being measured.
    Tracking,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PreviewShape {
    Box { x: f64, y: f64, size: f64 },
    Polygon { vertices: Vec<(f64, f64)> },
    EraseLine { from: (f64, f64), to: (f64, f64) },
}

/// Hover indicator drawn above the layer. `tint` fills, `outline` strokes.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewGraphic {
    pub shape: PreviewShape,
    pub tint: Color,
    pub outline: Color,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct RightClickTracker {
    origin: (f64, f64),
    distance: f64,
}

/// Per-client stroke capture: turns pointer input into buffered brushes.
#[derive(Debug, Clone)]
pub struct StrokeSession {
    mapper: GridMapper,
    tool: Option<ActiveTool>,
    fill: Color,
    outline: Color,
    buffer: Vec<BrushDescriptor>,
    touched: HashSet<CellKey>,
    stroke_active: bool,
    flush_pending: bool,
    erasing: bool,
    erasing_right_click: bool,
    right_click: Option<RightClickTracker>,
    preview: Option<PreviewGraphic>,
}

impl StrokeSession {
    pub fn new(mapper: GridMapper, fill: Color, outline: Color) -> Self {
        Self {
            mapper,
            tool: None,
            fill,
            outline,
            buffer: Vec::new(),
            touched: HashSet::new(),
            stroke_active: false,
            flush_pending: false,
            erasing: false,
            erasing_right_click: false,
            right_click: None,
            preview: None,
        }
    }

    pub fn active_tool(&self) -> Option<ActiveTool> {
        self.tool
    }

    pub fn set_active_tool(&mut self, tool: ActiveTool) {
        if self.tool != Some(tool) {
            self.abandon();
        }
        self.tool = Some(tool);
    }

    /// Deactivates the tool, discarding any stroke in progress.
    pub fn clear_active_tool(&mut self) {
        self.abandon();
        self.tool = None;
    }

    pub fn is_stroke_active(&self) -> bool {
        self.stroke_active
    }

    pub fn is_flush_pending(&self) -> bool {
        self.flush_pending
    }

    pub fn buffered(&self) -> &[BrushDescriptor] {
        &self.buffer
    }

    pub fn preview(&self) -> Option<&PreviewGraphic> {
        self.preview.as_ref()
    }

    pub fn fill(&self) -> Color {
        self.fill
    }

    pub fn set_fill(&mut self, fill: Color) {
        self.fill = fill;
        self.refresh_preview_tint();
    }

    pub fn set_outline(&mut self, outline: Color) {
        self.outline = outline;
        if let Some(preview) = self.preview.as_mut() {
            preview.outline = outline;
        }
    }

    pub fn is_erasing(&self) -> bool {
        self.erasing
    }

    pub fn set_erasing(&mut self, erasing: bool) {
        self.erasing = erasing;
        self.refresh_preview_tint();
    }

    pub fn set_mapper(&mut self, mapper: GridMapper) {
        self.abandon();
        self.mapper = mapper;
    }

    pub fn pointer_down(
        &mut self,
        button: PointerButton,
        point: (f64, f64),
        surface: &mut dyn CompositingSurface,
    ) -> PointerOutcome {
        if self.tool.is_none() {
            return PointerOutcome::Ignored;
        }
        match button {
            PointerButton::Primary => {
                if self.flush_pending {
                    tracing::warn!("previous stroke still flushing; dropping input");
                    return PointerOutcome::Dropped;
                }
                self.stroke_active = true;
                self.touched.clear();
                self.pointer_move(point, surface)
            }
            PointerButton::Secondary => {
                self.right_click = Some(RightClickTracker {
                    origin: point,
                    distance: 0.0,
                });
                PointerOutcome::Tracking
            }
            PointerButton::Other => PointerOutcome::Ignored,
        }
    }

    pub fn pointer_move(
        &mut self,
        point: (f64, f64),
        surface: &mut dyn CompositingSurface,
    ) -> PointerOutcome {
        if self.tool.is_none() {
            return PointerOutcome::Ignored;
        }
        if let Some(tracker) = self.right_click.as_mut() {
            tracker.distance +=
                (point.0 - tracker.origin.0).abs() + (point.1 - tracker.origin.1).abs();
        }

        let Some(cell) = self.mapper.resolve(point) else {
            self.preview = None;
            return PointerOutcome::OffGrid;
        };
        self.preview = Some(self.preview_for(&cell));

        if !self.stroke_active && !self.erasing_right_click {
            return if self.right_click.is_some() {
                PointerOutcome::Tracking
            } else {
                PointerOutcome::Hover
            };
        }
        if !self.touched.insert(cell.key) {
            return PointerOutcome::Duplicate;
        }
        let brush = if self.erasing || self.erasing_right_click {
            cell.brush(Color::ERASE_FILL, BlendMode::Erase)
        } else {
            cell.brush(self.fill, BlendMode::Normal)
        };
        surface.render(&brush);
        self.buffer.push(brush);
        PointerOutcome::Painted
    }

    /// Ends the gesture for `button`. Returns the entry to commit, if any; the
    /// session then stays flush-pending until [`StrokeSession::finish_flush`].
    pub fn pointer_up(
        &mut self,
        button: PointerButton,
        point: (f64, f64),
        surface: &mut dyn CompositingSurface,
    ) -> Option<HistoryEntry> {
        if self.tool.is_none() {
            return None;
        }
        match button {
            PointerButton::Primary => {
                if !self.stroke_active {
                    return None;
                }
                self.stroke_active = false;
                self.take_entry()
            }
            PointerButton::Secondary => {
                let tracker = self.right_click.take()?;
                if tracker.distance >= RIGHT_CLICK_THRESHOLD {
                    tracing::debug!(distance = tracker.distance, "right drag ignored");
                    return None;
                }
                if self.stroke_active || self.flush_pending {
                    tracing::warn!("stroke in progress; dropping right-click erase");
                    return None;
                }
                self.touched.clear();
                self.erasing_right_click = true;
                self.pointer_move(point, surface);
                self.erasing_right_click = false;
                self.refresh_preview_tint();
                self.take_entry()
            }
            PointerButton::Other => None,
        }
    }

    /// Called once the buffered entry was handed off, accepted or not.
    pub fn finish_flush(&mut self) {
        self.flush_pending = false;
    }

    fn take_entry(&mut self) -> Option<HistoryEntry> {
        self.touched.clear();
        if self.buffer.is_empty() {
            return None;
        }
        self.flush_pending = true;
        Some(HistoryEntry::new(std::mem::take(&mut self.buffer)))
    }

    fn abandon(&mut self) {
        if !self.buffer.is_empty() {
            tracing::debug!(brushes = self.buffer.len(), "discarding uncommitted stroke");
        }
        self.buffer.clear();
        self.touched.clear();
        self.stroke_active = false;
        self.erasing_right_click = false;
        self.right_click = None;
        self.preview = None;
    }

    fn preview_for(&self, cell: &GridCell) -> PreviewGraphic {
        let shape = if self.erasing {
            let (from, to) = cell.erase_stroke();
            PreviewShape::EraseLine { from, to }
        } else {
            match &cell.shape {
                CellShape::Box { x, y, size } => PreviewShape::Box {
                    x: *x,
                    y: *y,
                    size: *size,
                },
                CellShape::Polygon { vertices } => PreviewShape::Polygon {
                    vertices: vertices.clone(),
                },
            }
        };
        PreviewGraphic {
            shape,
            tint: self.tint(),
            outline: self.outline,
        }
    }

    fn tint(&self) -> Color {
        if self.erasing || self.erasing_right_click {
            Color::ERASER_TINT
        } else {
            self.fill
        }
    }

    fn refresh_preview_tint(&mut self) {
        let tint = self.tint();
        if let Some(preview) = self.preview.as_mut() {
            preview.tint = tint;
        }
    }
}
