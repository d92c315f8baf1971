use crate::overlay::model::{BlendMode, BrushDescriptor, BrushShape};
use image::{Rgba, RgbaImage};

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Target of brush rendering. Hosts with their own rendering backend implement
/// this directly; [`RasterSurface`] is the in-crate software implementation.
pub trait CompositingSurface {
    fn clear(&mut self);
    fn render(&mut self, brush: &BrushDescriptor);
}

impl<T: CompositingSurface + ?Sized> CompositingSurface for Box<T> {
    fn clear(&mut self) {
        (**self).clear();
    }

    fn render(&mut self, brush: &BrushDescriptor) {
        (**self).render(brush);
    }
}

/// Texture resolution used for a scene of the given pixel dimensions.
pub fn surface_resolution(width: u32, height: u32) -> f64 {
    let area = width as f64 * height as f64;
    if area > 16000.0_f64.powi(2) {
        0.25
    } else if area > 8000.0_f64.powi(2) {
        0.5
    } else {
        1.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtyRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl DirtyRect {
    pub fn union(self, other: DirtyRect) -> DirtyRect {
        let min_x = self.x.min(other.x);
        let min_y = self.y.min(other.y);
        let max_x = (self.x + self.width).max(other.x + other.width);
        let max_y = (self.y + self.height).max(other.y + other.height);
        DirtyRect {
            x: min_x,
            y: min_y,
            width: (max_x - min_x).max(1),
            height: (max_y - min_y).max(1),
        }
    }

    pub fn clamp(self, width: u32, height: u32) -> Option<DirtyRect> {
        let max_w = width as i32;
        let max_h = height as i32;
        let x0 = self.x.clamp(0, max_w);
        let y0 = self.y.clamp(0, max_h);
        let x1 = (self.x + self.width).clamp(0, max_w);
        let y1 = (self.y + self.height).clamp(0, max_h);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(DirtyRect {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        })
    }
}

/// Software compositing surface backed by an RGBA texture. Painted pixels carry
/// the brush fill at full opacity; layer alpha is applied at composite time.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterSurface {
    image: RgbaImage,
    resolution: f64,
    dirty: Option<DirtyRect>,
}

impl RasterSurface {
    /// Creates a surface for a scene of `width` x `height` scene pixels.
    pub fn for_scene(width: u32, height: u32) -> Self {
        Self::with_resolution(width, height, surface_resolution(width, height))
    }

    pub fn with_resolution(width: u32, height: u32, resolution: f64) -> Self {
        let tex_w = ((width as f64 * resolution).round() as u32).max(1);
        let tex_h = ((height as f64 * resolution).round() as u32).max(1);
        Self {
            image: RgbaImage::from_pixel(tex_w, tex_h, TRANSPARENT),
            resolution,
            dirty: None,
        }
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    /// Pixel at texture coordinates.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.image.width() || y >= self.image.height() {
            return None;
        }
        Some(self.image.get_pixel(x, y).0)
    }

    pub fn painted_pixel_count(&self) -> usize {
        self.image.pixels().filter(|px| px.0[3] != 0).count()
    }

    /// Area touched since the last call, in texture coordinates.
    pub fn take_dirty(&mut self) -> Option<DirtyRect> {
        self.dirty.take()
    }

    fn mark_dirty(&mut self, rect: DirtyRect) {
        let Some(rect) = rect.clamp(self.image.width(), self.image.height()) else {
            return;
        };
        self.dirty = Some(match self.dirty {
            Some(existing) => existing.union(rect),
            None => rect,
        });
    }

    fn fill_rect(&mut self, x: f64, y: f64, width: f64, height: f64, color: Rgba<u8>) {
        let s = self.resolution;
        let x0 = first_covered(x * s);
        let x1 = first_covered((x + width) * s);
        let y0 = first_covered(y * s);
        let y1 = first_covered((y + height) * s);
        let rect = DirtyRect {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        };
        let Some(rect) = rect.clamp(self.image.width(), self.image.height()) else {
            return;
        };
        for py in rect.y..rect.y + rect.height {
            for px in rect.x..rect.x + rect.width {
                self.image.put_pixel(px as u32, py as u32, color);
            }
        }
        self.mark_dirty(rect);
    }

    /// Even-odd scanline fill sampled at pixel centres.
    fn fill_polygon(&mut self, vertices: &[(f64, f64)], color: Rgba<u8>) {
        if vertices.len() < 3 {
            return;
        }
        let s = self.resolution;
        let points: Vec<(f64, f64)> = vertices.iter().map(|(x, y)| (x * s, y * s)).collect();
        let min_y = points.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
        let max_y = points.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);
        let height = self.image.height() as i32;
        let width = self.image.width() as i32;
        let row_start = first_covered(min_y).max(0);
        let row_end = first_covered(max_y).min(height);

        let mut touched: Option<DirtyRect> = None;
        let mut crossings = Vec::with_capacity(points.len());
        for py in row_start..row_end {
            let yc = py as f64 + 0.5;
            crossings.clear();
            for i in 0..points.len() {
                let (x0, y0) = points[i];
                let (x1, y1) = points[(i + 1) % points.len()];
                if (y0 <= yc && yc < y1) || (y1 <= yc && yc < y0) {
                    crossings.push(x0 + (yc - y0) * (x1 - x0) / (y1 - y0));
                }
            }
            crossings.sort_by(|a, b| a.total_cmp(b));
            for pair in crossings.chunks_exact(2) {
                let start = first_covered(pair[0]).max(0);
                let end = first_covered(pair[1]).min(width);
                if end <= start {
                    continue;
                }
                for px in start..end {
                    self.image.put_pixel(px as u32, py as u32, color);
                }
                let span = DirtyRect {
                    x: start,
                    y: py,
                    width: end - start,
                    height: 1,
                };
                touched = Some(touched.map_or(span, |t| t.union(span)));
            }
        }
        if let Some(rect) = touched {
            self.mark_dirty(rect);
        }
    }
}

/// Index of the first pixel whose centre lies at or beyond `edge`.
fn first_covered(edge: f64) -> i32 {
    (edge - 0.5).ceil() as i32
}

impl CompositingSurface for RasterSurface {
    fn clear(&mut self) {
        for px in self.image.pixels_mut() {
            *px = TRANSPARENT;
        }
        let (w, h) = self.image.dimensions();
        self.dirty = Some(DirtyRect {
            x: 0,
            y: 0,
            width: w as i32,
            height: h as i32,
        });
    }

    fn render(&mut self, brush: &BrushDescriptor) {
        let color = match brush.blend {
            BlendMode::Normal => Rgba(brush.fill.to_rgba_array(255)),
            BlendMode::Erase => TRANSPARENT,
        };
        match &brush.shape {
            BrushShape::Box { width, height } => {
                self.fill_rect(brush.x, brush.y, *width, *height, color)
            }
            BrushShape::Polygon { .. } => self.fill_polygon(&brush.outline(), color),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Clear,
    Render(BrushDescriptor),
}

/// Records draw commands for hosts that rasterize elsewhere.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrawList {
    commands: Vec<DrawCommand>,
}

impl DrawList {
    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn drain(&mut self) -> Vec<DrawCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Brushes rendered since the most recent clear.
    pub fn visible_brushes(&self) -> Vec<&BrushDescriptor> {
        let start = self
            .commands
            .iter()
            .rposition(|c| matches!(c, DrawCommand::Clear))
            .map_or(0, |idx| idx + 1);
        self.commands[start..]
            .iter()
            .filter_map(|c| match c {
                DrawCommand::Render(brush) => Some(brush),
                DrawCommand::Clear => None,
            })
            .collect()
    }
}

impl CompositingSurface for DrawList {
    fn clear(&mut self) {
        self.commands.push(DrawCommand::Clear);
    }

    fn render(&mut self, brush: &BrushDescriptor) {
        self.commands.push(DrawCommand::Render(brush.clone()));
    }
}
