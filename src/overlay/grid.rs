use crate::overlay::model::{BlendMode, BrushDescriptor, Color};
use serde::{Deserialize, Serialize};

const SQRT_3: f64 = 1.732_050_807_568_877_2;

/// Grid types by host code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridKind {
    Gridless,
    Square,
    HexPointyOdd,
    HexPointyEven,
    HexFlatOdd,
    HexFlatEven,
}

impl GridKind {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Gridless),
            1 => Some(Self::Square),
            2 => Some(Self::HexPointyOdd),
            3 => Some(Self::HexPointyEven),
            4 => Some(Self::HexFlatOdd),
            5 => Some(Self::HexFlatEven),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Gridless => 0,
            Self::Square => 1,
            Self::HexPointyOdd => 2,
            Self::HexPointyEven => 3,
            Self::HexFlatOdd => 4,
            Self::HexFlatEven => 5,
        }
    }

    pub fn is_square(self) -> bool {
        self == Self::Square
    }

    pub fn is_hex(self) -> bool {
        matches!(
            self,
            Self::HexPointyOdd | Self::HexPointyEven | Self::HexFlatOdd | Self::HexFlatEven
        )
    }
}

/// Scene grid description, treated as immutable for the duration of a redraw.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridParams {
    pub size: f64,
    pub kind: GridKind,
    #[serde(default)]
    pub legacy_hex: bool,
}

impl GridParams {
    pub fn square(size: f64) -> Self {
        Self {
            size,
            kind: GridKind::Square,
            legacy_hex: false,
        }
    }

    pub fn hex(size: f64, kind: GridKind) -> Self {
        Self {
            size,
            kind,
            legacy_hex: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellKey {
    Square { col: i64, row: i64 },
    Hex { q: i64, r: i64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum CellShape {
    Box { x: f64, y: f64, size: f64 },
    Polygon { vertices: Vec<(f64, f64)> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridCell {
    pub key: CellKey,
    pub shape: CellShape,
}

impl GridCell {
    pub fn brush(&self, fill: Color, blend: BlendMode) -> BrushDescriptor {
        let brush = match &self.shape {
            CellShape::Box { x, y, size } => BrushDescriptor::new_box(*x, *y, *size, *size, fill),
            CellShape::Polygon { vertices } => BrushDescriptor::new_polygon(vertices.clone(), fill),
        };
        brush.with_blend(blend)
    }

    /// Diagonal drawn by the erase preview across this cell.
    pub fn erase_stroke(&self) -> ((f64, f64), (f64, f64)) {
        match &self.shape {
            CellShape::Box { x, y, size } => ((x + size, y + size), (*x, *y)),
            CellShape::Polygon { vertices } => {
                let from = vertices.get(1).copied().unwrap_or_default();
                let to = vertices.get(4).copied().unwrap_or_default();
                (from, to)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Orientation {
    f: [f64; 4],
    b: [f64; 4],
    start_angle: f64,
}

const POINTY: Orientation = Orientation {
    f: [SQRT_3, SQRT_3 / 2.0, 0.0, 3.0 / 2.0],
    b: [SQRT_3 / 3.0, -1.0 / 3.0, 0.0, 2.0 / 3.0],
    start_angle: 0.5,
};

const FLAT: Orientation = Orientation {
    f: [3.0 / 2.0, 0.0, SQRT_3 / 2.0, SQRT_3],
    b: [2.0 / 3.0, 0.0, -1.0 / 3.0, SQRT_3 / 3.0],
    start_angle: 0.0,
};

/// Axial hex layout: orientation matrices plus cell radius and pixel origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HexLayout {
    orientation: Orientation,
    size: (f64, f64),
    origin: (f64, f64),
}

impl HexLayout {
    fn new(orientation: Orientation, size: (f64, f64), origin: (f64, f64)) -> Self {
        Self {
            orientation,
            size,
            origin,
        }
    }

    pub fn for_grid(params: GridParams) -> Option<Self> {
        let g = params.size;
        let layout = if params.legacy_hex {
            let half = g / 2.0;
            match params.kind {
                GridKind::HexPointyOdd => Self::new(POINTY, (half, half), (0.0, half)),
                GridKind::HexPointyEven => {
                    Self::new(POINTY, (half, half), (SQRT_3 * g / 4.0, half))
                }
                GridKind::HexFlatOdd => Self::new(FLAT, (half, half), (half, 0.0)),
                GridKind::HexFlatEven => Self::new(FLAT, (half, half), (half, SQRT_3 * g / 4.0)),
                GridKind::Square | GridKind::Gridless => return None,
            }
        } else {
            let radius = g / SQRT_3;
            match params.kind {
                GridKind::HexPointyOdd => Self::new(POINTY, (radius, radius), (0.0, radius)),
                GridKind::HexPointyEven => Self::new(POINTY, (radius, radius), (g / 2.0, radius)),
                GridKind::HexFlatOdd => Self::new(FLAT, (radius, radius), (radius, 0.0)),
                GridKind::HexFlatEven => Self::new(FLAT, (radius, radius), (radius, g / 2.0)),
                GridKind::Square | GridKind::Gridless => return None,
            }
        };
        Some(layout)
    }

    pub fn pixel_to_hex(&self, point: (f64, f64)) -> (f64, f64) {
        let b = self.orientation.b;
        let px = (point.0 - self.origin.0) / self.size.0;
        let py = (point.1 - self.origin.1) / self.size.1;
        (b[0] * px + b[1] * py, b[2] * px + b[3] * py)
    }

    pub fn hex_to_pixel(&self, q: i64, r: i64) -> (f64, f64) {
        let f = self.orientation.f;
        let (q, r) = (q as f64, r as f64);
        (
            (f[0] * q + f[1] * r) * self.size.0 + self.origin.0,
            (f[2] * q + f[3] * r) * self.size.1 + self.origin.1,
        )
    }

    pub fn polygon_corners(&self, q: i64, r: i64) -> Vec<(f64, f64)> {
        let (cx, cy) = self.hex_to_pixel(q, r);
        (0..6)
            .map(|corner| {
                let angle =
                    2.0 * std::f64::consts::PI * (self.orientation.start_angle + corner as f64)
                        / 6.0;
                (
                    cx + self.size.0 * angle.cos(),
                    cy + self.size.1 * angle.sin(),
                )
            })
            .collect()
    }
}

/// Rounds fractional axial coordinates to the nearest hex via cube rounding.
pub fn round_axial(q: f64, r: f64) -> (i64, i64) {
    let s = -q - r;
    let mut rq = q.round();
    let mut rr = r.round();
    let rs = s.round();
    let dq = (rq - q).abs();
    let dr = (rr - r).abs();
    let ds = (rs - s).abs();
    if dq > dr && dq > ds {
        rq = -rr - rs;
    } else if dr > ds {
        rr = -rq - rs;
    }
    (rq as i64, rr as i64)
}

/// Maps pointer positions to grid cells for one scene grid.
#[derive(Debug, Clone, PartialEq)]
pub struct GridMapper {
    params: GridParams,
    hex: Option<HexLayout>,
}

impl GridMapper {
    pub fn new(params: GridParams) -> Self {
        Self {
            params,
            hex: HexLayout::for_grid(params),
        }
    }

    pub fn params(&self) -> GridParams {
        self.params
    }

    /// Returns `None` for gridless scenes and degenerate grid sizes.
    pub fn resolve(&self, point: (f64, f64)) -> Option<GridCell> {
        let size = self.params.size;
        if !(size > 0.0) {
            return None;
        }
        if self.params.kind.is_square() {
            let col = (point.0 / size).floor() as i64;
            let row = (point.1 / size).floor() as i64;
            return Some(GridCell {
                key: CellKey::Square { col, row },
                shape: CellShape::Box {
                    x: col as f64 * size,
                    y: row as f64 * size,
                    size,
                },
            });
        }
        let layout = self.hex.as_ref()?;
        let (fq, fr) = layout.pixel_to_hex(point);
        let (q, r) = round_axial(fq, fr);
        Some(GridCell {
            key: CellKey::Hex { q, r },
            shape: CellShape::Polygon {
                vertices: layout.polygon_corners(q, r),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: (f64, f64), b: (f64, f64)) {
        assert!(
            (a.0 - b.0).abs() < 1e-6 && (a.1 - b.1).abs() < 1e-6,
            "{a:?} != {b:?}"
        );
    }

    #[test]
    fn square_cells_snap_down_to_grid_origin() {
        let mapper = GridMapper::new(GridParams::square(100.0));
        let cell = mapper.resolve((130.0, 130.0)).expect("square cell");
        assert_eq!(cell.key, CellKey::Square { col: 1, row: 1 });
        assert_eq!(
            cell.shape,
            CellShape::Box {
                x: 100.0,
                y: 100.0,
                size: 100.0
            }
        );
    }

    #[test]
    fn square_cells_floor_negative_coordinates() {
        let mapper = GridMapper::new(GridParams::square(50.0));
        let cell = mapper.resolve((-1.0, 49.0)).expect("square cell");
        assert_eq!(cell.key, CellKey::Square { col: -1, row: 0 });
    }

    #[test]
    fn gridless_scene_resolves_nothing() {
        let mapper = GridMapper::new(GridParams {
            size: 100.0,
            kind: GridKind::Gridless,
            legacy_hex: false,
        });
        assert_eq!(mapper.resolve((10.0, 10.0)), None);
    }

    #[test]
    fn hex_centers_resolve_to_their_own_cell() {
        for kind in [
            GridKind::HexPointyOdd,
            GridKind::HexPointyEven,
            GridKind::HexFlatOdd,
            GridKind::HexFlatEven,
        ] {
            for legacy_hex in [false, true] {
                let params = GridParams {
                    size: 100.0,
                    kind,
                    legacy_hex,
                };
                let layout = HexLayout::for_grid(params).expect("hex layout");
                let mapper = GridMapper::new(params);
                for (q, r) in [(0, 0), (3, -1), (-2, 5)] {
                    let center = layout.hex_to_pixel(q, r);
                    let cell = mapper.resolve(center).expect("hex cell");
                    assert_eq!(cell.key, CellKey::Hex { q, r }, "{kind:?} legacy={legacy_hex}");
                }
            }
        }
    }

    #[test]
    fn modern_pointy_hex_is_one_grid_size_wide() {
        let params = GridParams::hex(100.0, GridKind::HexPointyOdd);
        let layout = HexLayout::for_grid(params).expect("hex layout");
        let corners = layout.polygon_corners(0, 0);
        assert_eq!(corners.len(), 6);
        let min_x = corners.iter().map(|c| c.0).fold(f64::INFINITY, f64::min);
        let max_x = corners.iter().map(|c| c.0).fold(f64::NEG_INFINITY, f64::max);
        assert!((max_x - min_x - 100.0).abs() < 1e-6);
        assert_close(layout.hex_to_pixel(0, 0), (0.0, 100.0 / SQRT_3));
    }

    #[test]
    fn cube_rounding_picks_nearest_hex() {
        assert_eq!(round_axial(0.1, 0.1), (0, 0));
        assert_eq!(round_axial(0.9, -0.2), (1, 0));
        assert_eq!(round_axial(0.45, 0.45), (0, 1));
    }

    #[test]
    fn grid_codes_roundtrip() {
        for code in 0..=5 {
            let kind = GridKind::from_code(code).expect("known code");
            assert_eq!(kind.code(), code);
        }
        assert_eq!(GridKind::from_code(6), None);
    }
}
