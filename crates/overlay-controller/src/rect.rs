/// A viewport-relative anchor rect. Spec §4.2: "clamped to non-negative
/// integers".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AnchorRect {
    pub top: i64,
    pub left: i64,
    pub width: i64,
    pub height: i64,
}

impl AnchorRect {
    /// Clamp every field to `>= 0`, matching the spec's anchored-mode rule.
    pub fn clamped(top: f64, left: f64, width: f64, height: f64) -> Self {
        AnchorRect {
            top: clamp_non_negative(top),
            left: clamp_non_negative(left),
            width: clamp_non_negative(width),
            height: clamp_non_negative(height),
        }
    }

    /// Render the per-element CSS rule body for this rect.
    pub fn to_css_rule(self, selector: &str) -> String {
        format!(
            "{selector}{{position:fixed;top:{top}px;left:{left}px;width:{width}px;height:{height}px;}}",
            selector = selector,
            top = self.top,
            left = self.left,
            width = self.width,
            height = self.height,
        )
    }
}

fn clamp_non_negative(value: f64) -> i64 {
    if value.is_nan() || value < 0.0 {
        0
    } else {
        value.floor() as i64
    }
}
