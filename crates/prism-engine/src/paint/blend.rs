/// Compositing mode for a draw call.
///
/// Sources are premultiplied, so every mode uses `One` (or a colour-derived
/// factor) on the source side.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum BlendMode {
    #[default]
    Normal,
    Add,
    Multiply,
    Screen,
}

/// Device-agnostic blend factor.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    DstAlpha,
    DstColor,
    OneMinusSrcAlpha,
    OneMinusSrcColor,
}

impl BlendMode {
    /// `(src, dst)` factors applied to color and alpha alike; the operation is always add.
    pub const fn factors(self) -> (BlendFactor, BlendFactor) {
        match self {
            BlendMode::Normal => (BlendFactor::One, BlendFactor::OneMinusSrcAlpha),
            BlendMode::Add => (BlendFactor::One, BlendFactor::DstAlpha),
            BlendMode::Multiply => (BlendFactor::DstColor, BlendFactor::OneMinusSrcAlpha),
            BlendMode::Screen => (BlendFactor::One, BlendFactor::OneMinusSrcColor),
        }
    }
}
