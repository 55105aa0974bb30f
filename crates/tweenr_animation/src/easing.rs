//! Easing functions for animations
//!
//! Every easing maps a linear progress ratio (0.0 to 1.0) to an eased ratio.
//! Results are not clamped, so overshooting curves are allowed.

use crate::error::AnimationError;
use std::f32::consts::PI;
use std::str::FromStr;

/// Easing function type
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum Easing {
    #[default]
    Linear,
    QuadIn,
    QuadOut,
    QuadInOut,
    /// Alias of `QuadIn` kept under its registry name
    EaseIn,
    /// Alias of `QuadOut` kept under its registry name
    EaseOut,
    PowIn(f32),
    PowOut(f32),
    PowInOut(f32),
    BounceIn,
    BounceOut,
    BounceInOut,
    SineIn,
    SineOut,
    SineInOut,
    /// Any pure numeric curve supplied by the caller
    Custom(fn(f32) -> f32),
}

impl Easing {
    /// The named registry, in lookup order
    pub const NAMED: [(&'static str, Easing); 12] = [
        ("linear", Easing::Linear),
        ("quadIn", Easing::QuadIn),
        ("quadOut", Easing::QuadOut),
        ("quadInOut", Easing::QuadInOut),
        ("easeIn", Easing::EaseIn),
        ("easeOut", Easing::EaseOut),
        ("bounceIn", Easing::BounceIn),
        ("bounceOut", Easing::BounceOut),
        ("bounceInOut", Easing::BounceInOut),
        ("sineIn", Easing::SineIn),
        ("sineOut", Easing::SineOut),
        ("sineInOut", Easing::SineInOut),
    ];

    /// Look up an easing by its registry name
    pub fn from_name(name: &str) -> Option<Easing> {
        Self::NAMED
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, easing)| *easing)
    }

    /// Apply the easing function to a progress value (0.0 to 1.0)
    pub fn apply(&self, t: f32) -> f32 {
        match self {
            Easing::Linear => t,
            Easing::QuadIn | Easing::EaseIn => t * t,
            Easing::QuadOut | Easing::EaseOut => 1.0 - (1.0 - t) * (1.0 - t),
            Easing::QuadInOut => pow_in_out_ease(t, 2.0),
            Easing::PowIn(pow) => t.powf(*pow),
            Easing::PowOut(pow) => 1.0 - (1.0 - t).powf(*pow),
            Easing::PowInOut(pow) => pow_in_out_ease(t, *pow),
            Easing::BounceIn => 1.0 - bounce_out(1.0 - t),
            Easing::BounceOut => bounce_out(t),
            Easing::BounceInOut => {
                if t < 0.5 {
                    (1.0 - bounce_out(1.0 - t * 2.0)) * 0.5
                } else {
                    bounce_out(t * 2.0 - 1.0) * 0.5 + 0.5
                }
            }
            Easing::SineIn => 1.0 - (t * PI / 2.0).cos(),
            Easing::SineOut => (t * PI / 2.0).sin(),
            Easing::SineInOut => -0.5 * ((PI * t).cos() - 1.0),
            Easing::Custom(f) => f(t),
        }
    }
}

impl FromStr for Easing {
    type Err = AnimationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Easing::from_name(s).ok_or_else(|| AnimationError::UnknownEasing(s.to_string()))
    }
}

/// Build an ease-in curve of the given power
pub fn pow_in(pow: f32) -> Easing {
    Easing::PowIn(pow)
}

/// Build an ease-out curve of the given power
pub fn pow_out(pow: f32) -> Easing {
    Easing::PowOut(pow)
}

/// Build a symmetric ease-in-out curve of the given power
pub fn pow_in_out(pow: f32) -> Easing {
    Easing::PowInOut(pow)
}

fn pow_in_out_ease(t: f32, pow: f32) -> f32 {
    let t = t * 2.0;
    if t < 1.0 {
        0.5 * t.powf(pow)
    } else {
        1.0 - 0.5 * (2.0 - t).powf(pow).abs()
    }
}

/// Piecewise quadratic bounce with break points at 1/2.75, 2/2.75 and 2.5/2.75
#[inline]
fn bounce_out(t: f32) -> f32 {
    if t < 1.0 / 2.75 {
        7.5625 * t * t
    } else if t < 2.0 / 2.75 {
        let t = t - 1.5 / 2.75;
        7.5625 * t * t + 0.75
    } else if t < 2.5 / 2.75 {
        let t = t - 2.25 / 2.75;
        7.5625 * t * t + 0.9375
    } else {
        let t = t - 2.625 / 2.75;
        7.5625 * t * t + 0.984375
    }
}
