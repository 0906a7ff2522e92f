//! Media-fragment rectangles (`#xywh=unit:x,y,w,h`) attached to resource hrefs.

use kurbo::{Rect, Size};

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Unit {
    Percent,
    Px,
}

impl Unit {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Percent => "%",
            Self::Px => "px",
        }
    }

    pub fn from_suffix(s: &str) -> Option<Self> {
        match s {
            "%" => Some(Self::Percent),
            "px" => Some(Self::Px),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FragmentRect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    pub unit: Unit,
}

impl FragmentRect {
    /// Resolve to a pixel rect against the resource's natural size, clamping
    /// out-of-range values to the natural bounds.
    pub fn resolve_px(&self, natural: Size) -> Rect {
        let (x, y, w, h) = match self.unit {
            Unit::Px => (self.x, self.y, self.w, self.h),
            Unit::Percent => (
                self.x / 100.0 * natural.width,
                self.y / 100.0 * natural.height,
                self.w / 100.0 * natural.width,
                self.h / 100.0 * natural.height,
            ),
        };
        let x = x.clamp(0.0, natural.width);
        let y = y.clamp(0.0, natural.height);
        let w = w.clamp(0.0, natural.width - x);
        let h = h.clamp(0.0, natural.height - y);
        Rect::new(x, y, x + w, y + h)
    }
}

/// Split an href into its path and optional raw fragment (text after `#`).
pub fn split_href(href: &str) -> (&str, Option<&str>) {
    match href.split_once('#') {
        Some((path, fragment)) if !fragment.is_empty() => (path, Some(fragment)),
        Some((path, _)) => (path, None),
        None => (href, None),
    }
}

/// Parse a media fragment of the form `xywh=[pixel:|percent:]x,y,w,h`.
///
/// A leading `#` is tolerated. The unit prefix defaults to pixel. Malformed
/// fragments yield `None` (skip-and-continue policy).
pub fn parse_fragment(fragment: &str) -> Option<FragmentRect> {
    let fragment = fragment.strip_prefix('#').unwrap_or(fragment);
    let spec = fragment.strip_prefix("xywh=")?;

    let (unit, coords) = if let Some(rest) = spec.strip_prefix("percent:") {
        (Unit::Percent, rest)
    } else if let Some(rest) = spec.strip_prefix("pixel:") {
        (Unit::Px, rest)
    } else {
        (Unit::Px, spec)
    };

    let mut values = [0.0f64; 4];
    let mut count = 0;
    for part in coords.split(',') {
        if count >= 4 {
            return None;
        }
        let v: f64 = part.trim().parse().ok()?;
        if !v.is_finite() || v < 0.0 {
            return None;
        }
        values[count] = v;
        count += 1;
    }
    if count != 4 {
        return None;
    }

    Some(FragmentRect {
        x: values[0],
        y: values[1],
        w: values[2],
        h: values[3],
        unit,
    })
}

pub fn serialize_fragment(rect: &FragmentRect) -> String {
    let unit = match rect.unit {
        Unit::Percent => "percent:",
        Unit::Px => "pixel:",
    };
    format!("xywh={unit}{},{},{},{}", rect.x, rect.y, rect.w, rect.h)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_href_extracts_fragment() {
        assert_eq!(
            split_href("img.png#xywh=0,0,10,10"),
            ("img.png", Some("xywh=0,0,10,10"))
        );
        assert_eq!(split_href("img.png"), ("img.png", None));
        assert_eq!(split_href("img.png#"), ("img.png", None));
    }

    #[test]
    fn parse_units_and_default() {
        let px = parse_fragment("xywh=1,2,3,4").unwrap();
        assert_eq!(px.unit, Unit::Px);
        let pct = parse_fragment("xywh=percent:0,10,100,50").unwrap();
        assert_eq!(pct.unit, Unit::Percent);
        assert_eq!(pct.h, 50.0);
        assert_eq!(parse_fragment("xywh=pixel:1,2,3,4").unwrap().x, 1.0);
    }

    #[test]
    fn malformed_fragments_are_dropped() {
        assert!(parse_fragment("xywh=1,2,3").is_none());
        assert!(parse_fragment("xywh=1,2,3,4,5").is_none());
        assert!(parse_fragment("xywh=a,b,c,d").is_none());
        assert!(parse_fragment("t=0,10").is_none());
        assert!(parse_fragment("xywh=-1,0,4,4").is_none());
    }

    #[test]
    fn round_trip() {
        for unit in [Unit::Percent, Unit::Px] {
            let rect = FragmentRect {
                x: 5.0,
                y: 10.0,
                w: 40.0,
                h: 30.0,
                unit,
            };
            assert_eq!(parse_fragment(&serialize_fragment(&rect)), Some(rect));
        }
    }

    #[test]
    fn resolve_px_clamps_to_natural_size() {
        let rect = FragmentRect {
            x: 50.0,
            y: 0.0,
            w: 100.0,
            h: 300.0,
            unit: Unit::Px,
        };
        let resolved = rect.resolve_px(Size::new(100.0, 200.0));
        assert_eq!(resolved, Rect::new(50.0, 0.0, 100.0, 200.0));

        let pct = FragmentRect {
            x: 0.0,
            y: 50.0,
            w: 100.0,
            h: 50.0,
            unit: Unit::Percent,
        };
        let resolved = pct.resolve_px(Size::new(100.0, 200.0));
        assert_eq!(resolved, Rect::new(0.0, 100.0, 100.0, 200.0));
    }
}
