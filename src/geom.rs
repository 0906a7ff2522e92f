pub use kurbo::{Point, Rect, Size, Vec2};

/// Pixel comparisons throughout the camera treat values closer than this as
/// equal, so float drift at page boundaries cannot cause snap oscillation.
pub const PIXEL_EPSILON: f64 = 0.5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Axis {
    Horizontal,
    Vertical,
}

impl Axis {
    pub fn of(self, size: Size) -> f64 {
        match self {
            Self::Horizontal => size.width,
            Self::Vertical => size.height,
        }
    }

    pub fn coord(self, p: Point) -> f64 {
        match self {
            Self::Horizontal => p.x,
            Self::Vertical => p.y,
        }
    }

    pub fn other(self) -> Self {
        match self {
            Self::Horizontal => Self::Vertical,
            Self::Vertical => Self::Horizontal,
        }
    }
}

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ReadingDirection {
    #[default]
    Ltr,
    Rtl,
    Ttb,
    Btt,
}

impl ReadingDirection {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ltr" => Some(Self::Ltr),
            "rtl" => Some(Self::Rtl),
            "ttb" => Some(Self::Ttb),
            "btt" => Some(Self::Btt),
            _ => None,
        }
    }

    /// The primary scroll axis.
    pub fn axis(self) -> Axis {
        match self {
            Self::Ltr | Self::Rtl => Axis::Horizontal,
            Self::Ttb | Self::Btt => Axis::Vertical,
        }
    }

    /// Sign of progress growth along the primary axis: ltr/ttb read toward
    /// positive coordinates, rtl/btt toward negative ones.
    pub fn sign(self) -> f64 {
        match self {
            Self::Ltr | Self::Ttb => 1.0,
            Self::Rtl | Self::Btt => -1.0,
        }
    }

    pub fn is_horizontal(self) -> bool {
        self.axis() == Axis::Horizontal
    }
}

pub fn nearly_equal(a: f64, b: f64) -> bool {
    (a - b).abs() < PIXEL_EPSILON
}
