//! Mapping between the logical resolution the model sees and the real
//! browser viewport.

use std::sync::RwLock;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// The logical pair is fixed; the real pair follows the viewport sizes the
/// extension reports with its screenshots.
#[derive(Debug)]
pub struct CoordinateNormalizer {
    logical: Resolution,
    real: RwLock<Resolution>,
}

fn scale(v: i64, to: u32, from: u32) -> i64 {
    // f64::round rounds half away from zero.
    (v as f64 * to as f64 / from as f64).round() as i64
}

impl CoordinateNormalizer {
    /// Both resolutions must be non-zero (`Config::validate` enforces it).
    pub fn new(logical: Resolution, real: Resolution) -> Self {
        Self {
            logical,
            real: RwLock::new(real),
        }
    }

    pub fn logical(&self) -> Resolution {
        self.logical
    }

    pub fn real(&self) -> Resolution {
        *self.real.read().unwrap_or_else(|p| p.into_inner())
    }

    /// Logical → real, rounding each axis independently.
    pub fn to_real(&self, x: i64, y: i64) -> (i64, i64) {
        let real = self.real();
        (
            scale(x, real.width, self.logical.width),
            scale(y, real.height, self.logical.height),
        )
    }

    /// Real → logical. Used for messages only; never feed the result back
    /// into `to_real`.
    pub fn to_logical(&self, x: i64, y: i64) -> (i64, i64) {
        let real = self.real();
        (
            scale(x, self.logical.width, real.width),
            scale(y, self.logical.height, real.height),
        )
    }

    /// Adopt the viewport size reported with an observation. Zero sizes are
    /// ignored. Returns whether the real pair changed.
    pub fn observe_viewport(&self, width: u32, height: u32) -> bool {
        if width == 0 || height == 0 {
            return false;
        }
        let next = Resolution::new(width, height);
        let mut real = self.real.write().unwrap_or_else(|p| p.into_inner());
        if *real == next {
            return false;
        }
        info!(from = %*real, to = %next, "Viewport resolution changed");
        *real = next;
        true
    }
}
