use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SceneId(pub String);

impl SceneId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable user identifier. Ordering is what decides the responsible authority.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const WHITE: Self = Self::rgb(0xff, 0xff, 0xff);
    pub const CYAN: Self = Self::rgb(0x00, 0xff, 0xff);
    pub const ERASER_TINT: Self = Self::rgb(0xff, 0x00, 0xff);
    /// Fill stored on brushes painted with the eraser toggle; ignored by ERASE blending.
    pub const ERASE_FILL: Self = Self::rgb(0x00, 0x00, 0x01);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub const fn from_u32(value: u32) -> Self {
        Self::rgb(
            ((value >> 16) & 0xff) as u8,
            ((value >> 8) & 0xff) as u8,
            (value & 0xff) as u8,
        )
    }

    pub fn to_u32(self) -> u32 {
        ((self.r as u32) << 16) | ((self.g as u32) << 8) | self.b as u32
    }

    pub fn to_rgba_array(self, a: u8) -> [u8; 4] {
        [self.r, self.g, self.b, a]
    }

    /// Accepts `#rrggbb`, `0xrrggbb` or bare `rrggbb`.
    pub fn parse(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        let digits = trimmed
            .strip_prefix('#')
            .or_else(|| trimmed.strip_prefix("0x"))
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        if digits.len() != 6 {
            return None;
        }
        u32::from_str_radix(digits, 16).ok().map(Self::from_u32)
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl Serialize for Color {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ColorWire {
    Text(String),
    Number(u32),
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        match ColorWire::deserialize(deserializer)? {
            ColorWire::Number(value) => Ok(Color::from_u32(value)),
            ColorWire::Text(text) => Color::parse(&text)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid colour '{text}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlendMode {
    #[default]
    Normal,
    Erase,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BrushShape {
    Box { width: f64, height: f64 },
    Polygon { vertices: Vec<(f64, f64)> },
}

/// One paint or erase operation. `x`/`y` offset the shape; polygon vertices are
/// already in scene coordinates so their offset is zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrushDescriptor {
    #[serde(flatten)]
    pub shape: BrushShape,
    pub x: f64,
    pub y: f64,
    pub fill: Color,
    #[serde(default)]
    pub blend: BlendMode,
}

impl BrushDescriptor {
    pub fn new_box(x: f64, y: f64, width: f64, height: f64, fill: Color) -> Self {
        Self {
            shape: BrushShape::Box { width, height },
            x,
            y,
            fill,
            blend: BlendMode::Normal,
        }
    }

    pub fn new_polygon(vertices: Vec<(f64, f64)>, fill: Color) -> Self {
        Self {
            shape: BrushShape::Polygon { vertices },
            x: 0.0,
            y: 0.0,
            fill,
            blend: BlendMode::Normal,
        }
    }

    pub fn with_blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }

    pub fn is_erase(&self) -> bool {
        self.blend == BlendMode::Erase
    }

    /// Outline in scene coordinates.
    pub fn outline(&self) -> Vec<(f64, f64)> {
        match &self.shape {
            BrushShape::Box { width, height } => vec![
                (self.x, self.y),
                (self.x + width, self.y),
                (self.x + width, self.y + height),
                (self.x, self.y + height),
            ],
            BrushShape::Polygon { vertices } => vertices
                .iter()
                .map(|(vx, vy)| (vx + self.x, vy + self.y))
                .collect(),
        }
    }
}

/// One committed user action.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistoryEntry(pub Vec<BrushDescriptor>);

impl HistoryEntry {
    pub fn new(brushes: Vec<BrushDescriptor>) -> Self {
        Self(brushes)
    }

    pub fn brushes(&self) -> &[BrushDescriptor] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<BrushDescriptor>> for HistoryEntry {
    fn from(brushes: Vec<BrushDescriptor>) -> Self {
        Self(brushes)
    }
}
