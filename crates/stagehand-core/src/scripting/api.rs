//! # Script API
//!
//! Helper functions available to every action and transition script.
//!
//! ## Functions
//! - **Math**: `lerp(a, b, t)`, `clamp01(x)`
//! - **Easing**: `ease(name, x)` for `linear`, `ease_in`, `ease_out`,
//!   `ease_in_out` and `bounce_out`
//! - **Random**: `rand_float(min, max)`
//! - **Text**: `grapheme_count(text)`, `grapheme_prefix(text, n)`

use crate::easing::parse_easing;
use rand::Rng;
use rhai::{Engine, EvalAltResult, INT};
use unicode_segmentation::UnicodeSegmentation;

/// Register the helper functions.
pub fn register(engine: &mut Engine) {
    // ========== MATH ==========
    engine.register_fn("lerp", |a: f64, b: f64, t: f64| a + (b - a) * t);
    engine.register_fn("clamp01", |x: f64| x.clamp(0.0, 1.0));

    // ========== EASING ==========
    engine.register_fn("ease", |name: &str, x: f64| parse_easing(name).eval(x));

    // ========== RANDOM ==========
    engine.register_fn("rand_float", rand_float);

    // ========== TEXT ==========
    engine.register_fn("grapheme_count", |text: &str| {
        text.graphemes(true).count() as INT
    });
    engine.register_fn("grapheme_prefix", grapheme_prefix);
}

/// Uniform sample from `[min, max)`; `min` itself when the bounds are equal.
///
/// Bounds that are unordered, NaN or too far apart to sample are a script
/// error.
fn rand_float(min: f64, max: f64) -> Result<f64, Box<EvalAltResult>> {
    if min == max && min.is_finite() {
        return Ok(min);
    }
    if min.is_nan() || max.is_nan() || min > max || !(max - min).is_finite() {
        return Err(format!("rand_float: invalid range {} to {}", min, max).into());
    }
    Ok(rand::thread_rng().gen_range(min..max))
}

/// The first `n` grapheme clusters of `text`.
fn grapheme_prefix(text: &str, n: INT) -> String {
    if n <= 0 {
        return String::new();
    }
    text.graphemes(true).take(n as usize).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> Engine {
        let mut engine = Engine::new();
        register(&mut engine);
        engine
    }

    #[test]
    fn lerp_and_clamp() {
        let engine = engine();
        assert_eq!(engine.eval::<f64>("lerp(2.0, 4.0, 0.5)").unwrap(), 3.0);
        assert_eq!(engine.eval::<f64>("clamp01(1.5)").unwrap(), 1.0);
        assert_eq!(engine.eval::<f64>("clamp01(-0.5)").unwrap(), 0.0);
    }

    #[test]
    fn ease_uses_named_curves() {
        let engine = engine();
        let v = engine.eval::<f64>(r#"ease("ease_in", 0.5)"#).unwrap();
        assert!(v < 0.5);
        assert_eq!(engine.eval::<f64>(r#"ease("linear", 0.25)"#).unwrap(), 0.25);
    }

    #[test]
    fn rand_float_stays_in_range() {
        let engine = engine();
        for _ in 0..32 {
            let v = engine.eval::<f64>("rand_float(1.0, 2.0)").unwrap();
            assert!((1.0..2.0).contains(&v));
        }
        assert_eq!(engine.eval::<f64>("rand_float(3.0, 3.0)").unwrap(), 3.0);
    }

    #[test]
    fn rand_float_rejects_unusable_ranges() {
        let engine = engine();
        let err = engine
            .eval::<f64>("rand_float(-1.0e308, 1.0e308)")
            .unwrap_err();
        assert!(err.to_string().contains("invalid range"), "{}", err);
        assert!(engine.eval::<f64>("rand_float(2.0, 1.0)").is_err());
        assert!(rand_float(f64::NAN, 1.0).is_err());
        assert!(rand_float(0.0, f64::INFINITY).is_err());
        assert!(rand_float(f64::INFINITY, f64::INFINITY).is_err());
    }

    #[test]
    fn graphemes_count_combined_characters_once() {
        let engine = engine();
        assert_eq!(engine.eval::<INT>(r#"grapheme_count("éa")"#).unwrap(), 2);
        assert_eq!(grapheme_prefix("héllo", 2), "hé");
        assert_eq!(grapheme_prefix("abc", 10), "abc");
        assert_eq!(grapheme_prefix("abc", -1), "");
    }
}
