use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::StudioError;

pub const MIN_LONG_EDGE: u32 = 512;
pub const MAX_LONG_EDGE: u32 = 4096;
pub const DEFAULT_LONG_EDGE: u32 = 3200;

/// Caller-supplied rectangle in source pixel space, before any clamping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl CropRect {
    pub fn validate(&self) -> Result<(), StudioError> {
        let fields = [
            ("x", self.x),
            ("y", self.y),
            ("width", self.width),
            ("height", self.height),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(StudioError::validation(format!(
                    "crop.{name} must be a finite number"
                )));
            }
        }
        Ok(())
    }
}

/// In-bounds, non-empty rectangle actually extracted from the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractRect {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl ExtractRect {
    pub fn right(&self) -> u32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.top + self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AspectToken {
    Original,
    Ratio { width: u32, height: u32 },
}

impl AspectToken {
    /// `None`/blank/`original` mean "keep the cropped proportions".
    pub fn parse(raw: Option<&str>) -> Result<Self, StudioError> {
        let Some(raw) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
            return Ok(AspectToken::Original);
        };
        if raw.eq_ignore_ascii_case("original") {
            return Ok(AspectToken::Original);
        }
        let invalid = || {
            StudioError::validation(format!("invalid aspect '{raw}'; expected W:H or original"))
        };
        let (left, right) = raw.split_once(':').ok_or_else(invalid)?;
        let width = left.trim().parse::<u32>().map_err(|_| invalid())?;
        let height = right.trim().parse::<u32>().map_err(|_| invalid())?;
        if width == 0 || height == 0 || width > 100 || height > 100 {
            return Err(invalid());
        }
        Ok(AspectToken::Ratio { width, height })
    }

    pub fn ratio(&self) -> Option<f64> {
        match self {
            AspectToken::Original => None,
            AspectToken::Ratio { width, height } => Some(*width as f64 / *height as f64),
        }
    }
}

impl fmt::Display for AspectToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AspectToken::Original => f.write_str("original"),
            AspectToken::Ratio { width, height } => write!(f, "{width}:{height}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizePlan {
    /// Scale and center-crop to exactly these dimensions.
    Cover { width: u32, height: u32 },
    /// Scale down (never up) to fit inside a `max_edge` square.
    Fit { max_edge: u32 },
}

impl ResizePlan {
    pub fn target_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        match *self {
            ResizePlan::Cover { width, height } => (width, height),
            ResizePlan::Fit { max_edge } => {
                let longest = width.max(height);
                if longest <= max_edge || longest == 0 {
                    return (width.max(1), height.max(1));
                }
                let scale = max_edge as f64 / longest as f64;
                let scaled =
                    |value: u32| ((value as f64 * scale).round() as u32).clamp(1, max_edge);
                (scaled(width), scaled(height))
            }
        }
    }
}

pub fn clamp_long_edge(requested: Option<f64>) -> u32 {
    match requested {
        Some(value) if value.is_finite() => {
            (value.round() as i64).clamp(MIN_LONG_EDGE as i64, MAX_LONG_EDGE as i64) as u32
        }
        _ => DEFAULT_LONG_EDGE,
    }
}

pub fn plan_resize(aspect: AspectToken, long_edge: u32) -> ResizePlan {
    let Some(ratio) = aspect.ratio() else {
        return ResizePlan::Fit {
            max_edge: long_edge,
        };
    };
    let edge = long_edge as f64;
    let (width, height) = if ratio >= 1.0 {
        (edge, edge / ratio)
    } else {
        (edge * ratio, edge)
    };
    ResizePlan::Cover {
        width: (width.round() as u32).max(1),
        height: (height.round() as u32).max(1),
    }
}

/// Always returns a rectangle with `0 <= left < right <= source_width` and
/// `0 <= top < bottom <= source_height`, whatever the request looks like.
/// Both source dimensions must be at least 1.
pub fn resolve_extract_rect(rect: &CropRect, source_width: u32, source_height: u32) -> ExtractRect {
    let (left, right) = resolve_axis(rect.x, rect.width, source_width);
    let (top, bottom) = resolve_axis(rect.y, rect.height, source_height);
    ExtractRect {
        left,
        top,
        width: right - left,
        height: bottom - top,
    }
}

fn resolve_axis(offset: f64, extent: f64, dimension: u32) -> (u32, u32) {
    let dimension = dimension.max(1) as f64;
    let offset = if offset.is_finite() { offset } else { 0.0 };
    let extent = if extent.is_finite() { extent.max(1.0) } else { 1.0 };

    let start = offset.floor().clamp(0.0, dimension - 1.0);
    let end = (offset + extent).ceil().clamp(start + 1.0, dimension);
    (start as u32, end as u32)
}
