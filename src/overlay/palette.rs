use crate::overlay::model::Color;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamedColor {
    pub name: &'static str,
    pub color: Color,
}

const fn named(name: &'static str, hex: u32) -> NamedColor {
    NamedColor {
        name,
        color: Color::from_u32(hex),
    }
}

/// Swatches offered by the palette controls.
pub const BASIC: [NamedColor; 16] = [
    named("Red", 0xff4500),
    named("Orange", 0xffa800),
    named("Yellow", 0xffd635),
    named("Dark green", 0x00a368),
    named("Light green", 0x7eed56),
    named("Dark blue", 0x2450a4),
    named("Blue", 0x3690ea),
    named("Light blue", 0x51e9f4),
    named("Dark purple", 0x811e9f),
    named("Purple", 0xb44ac0),
    named("Light pink", 0xff99aa),
    named("Brown", 0x9c6926),
    named("White", 0xffffff),
    named("Light gray", 0xd4d7d9),
    named("Gray", 0x898d90),
    named("Black", 0x000000),
];

pub const EXTENDED: [NamedColor; 16] = [
    named("Dark red", 0xbe0039),
    named("Pink", 0xff3881),
    named("Dark teal", 0x00756f),
    named("Teal", 0x009eaa),
    named("Indigo", 0x493ac1),
    named("Periwinkle", 0x6a5cff),
    named("Green", 0x00cc78),
    named("Dark brown", 0x6d482f),
    named("Burgandy", 0x6d001a),
    named("Pale yellow", 0xfff8b8),
    named("Light teal", 0x00ccc0),
    named("Lavender", 0x94b3ff),
    named("Pale purple", 0xe4abff),
    named("Magenta", 0xde107f),
    named("Beige", 0xffb470),
    named("Dark gray", 0x515252),
];

pub fn find(name: &str) -> Option<NamedColor> {
    BASIC
        .iter()
        .chain(EXTENDED.iter())
        .find(|entry| entry.name.eq_ignore_ascii_case(name))
        .copied()
}
