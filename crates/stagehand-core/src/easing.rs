use keyframe::EasingFunction;
use serde::{Deserialize, Serialize};

/// Easing curves available to scripts through `ease(name, x)`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EasingType {
    Linear,
    EaseIn,
    EaseOut,
    EaseInOut,
    BounceOut,
}

impl EasingFunction for EasingType {
    fn y(&self, x: f64) -> f64 {
        match self {
            EasingType::Linear => keyframe::functions::Linear.y(x),
            EasingType::EaseIn => keyframe::functions::EaseIn.y(x),
            EasingType::EaseOut => keyframe::functions::EaseOut.y(x),
            EasingType::EaseInOut => keyframe::functions::EaseInOut.y(x),
            EasingType::BounceOut => bounce_out(x),
        }
    }
}

impl EasingType {
    /// Evaluates the curve at `x`, clamped to `0.0..=1.0`.
    pub fn eval(&self, x: f64) -> f64 {
        self.y(x.clamp(0.0, 1.0))
    }
}

/// Parses an easing name. Unknown names fall back to linear.
pub fn parse_easing(e: &str) -> EasingType {
    match e {
        "linear" => EasingType::Linear,
        "ease_in" | "ease-in" => EasingType::EaseIn,
        "ease_out" | "ease-out" => EasingType::EaseOut,
        "ease_in_out" | "ease-in-out" => EasingType::EaseInOut,
        "bounce_out" | "bounce-out" => EasingType::BounceOut,
        _ => EasingType::Linear,
    }
}

// Piecewise quadratic bounce (Penner).
fn bounce_out(x: f64) -> f64 {
    const N: f64 = 7.5625;
    const D: f64 = 2.75;
    if x < 1.0 / D {
        N * x * x
    } else if x < 2.0 / D {
        let x = x - 1.5 / D;
        N * x * x + 0.75
    } else if x < 2.5 / D {
        let x = x - 2.25 / D;
        N * x * x + 0.9375
    } else {
        let x = x - 2.625 / D;
        N * x * x + 0.984375
    }
}
