//! Table-driven validation of manifest configuration options.
//!
//! Every property a manifest (or a link object's `properties` bag) may carry
//! is validated against this table. Invalid or missing values fall back to
//! the option's default, or to nothing when no default exists. This table is
//! the single source of truth for manifest property semantics; parsing code
//! never interprets raw JSON values directly.

use crate::fragment::Unit;

#[derive(Clone, Copy, Debug)]
pub enum OptionKind {
    String,
    StringEnum(&'static [&'static str]),
    Bool,
    PositiveNumber,
    StrictlyPositiveNumber,
    Color,
    ValueAndUnit,
}

#[derive(Clone, Copy, Debug)]
enum DefaultValue {
    None,
    Str(&'static str),
    Bool(bool),
    Number(f64),
    ValueUnit(f64, Unit),
}

#[derive(Clone, Debug, PartialEq)]
pub enum OptionValue {
    Str(String),
    Bool(bool),
    Number(f64),
    ValueUnit(f64, Unit),
}

impl OptionValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_value_unit(&self) -> Option<(f64, Unit)> {
        match self {
            Self::ValueUnit(v, u) => Some((*v, *u)),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct OptionSpec {
    pub name: &'static str,
    pub kind: OptionKind,
    default: DefaultValue,
}

const OPTIONS: &[OptionSpec] = &[
    OptionSpec {
        name: "loadingMessage",
        kind: OptionKind::String,
        default: DefaultValue::Str("Loading"),
    },
    OptionSpec {
        name: "loadingMode",
        kind: OptionKind::StringEnum(&["page", "segment"]),
        default: DefaultValue::Str("page"),
    },
    OptionSpec {
        name: "allowsDestroy",
        kind: OptionKind::Bool,
        default: DefaultValue::Bool(false),
    },
    OptionSpec {
        name: "allowsParallel",
        kind: OptionKind::Bool,
        default: DefaultValue::Bool(true),
    },
    OptionSpec {
        name: "allowsSwipe",
        kind: OptionKind::Bool,
        default: DefaultValue::Bool(true),
    },
    OptionSpec {
        name: "allowsWheelScroll",
        kind: OptionKind::Bool,
        default: DefaultValue::Bool(true),
    },
    OptionSpec {
        name: "allowsZoomOnDoubleTap",
        kind: OptionKind::Bool,
        default: DefaultValue::Bool(true),
    },
    OptionSpec {
        name: "allowsZoomOnCtrlOrAltScroll",
        kind: OptionKind::Bool,
        default: DefaultValue::Bool(true),
    },
    OptionSpec {
        name: "allowsPaginatedScroll",
        kind: OptionKind::Bool,
        default: DefaultValue::Bool(true),
    },
    OptionSpec {
        name: "isPaginationSticky",
        kind: OptionKind::Bool,
        default: DefaultValue::Bool(true),
    },
    OptionSpec {
        name: "isPaginationGridBased",
        kind: OptionKind::Bool,
        default: DefaultValue::Bool(true),
    },
    OptionSpec {
        name: "direction",
        kind: OptionKind::StringEnum(&["ltr", "rtl", "ttb", "btt"]),
        default: DefaultValue::Str("ltr"),
    },
    OptionSpec {
        name: "continuous",
        kind: OptionKind::Bool,
        default: DefaultValue::Bool(true),
    },
    OptionSpec {
        name: "fit",
        kind: OptionKind::StringEnum(&["contain", "cover", "width", "height"]),
        default: DefaultValue::Str("contain"),
    },
    OptionSpec {
        name: "clipped",
        kind: OptionKind::Bool,
        default: DefaultValue::Bool(false),
    },
    OptionSpec {
        name: "overflow",
        kind: OptionKind::StringEnum(&["scrolled", "paginated"]),
        default: DefaultValue::Str("scrolled"),
    },
    OptionSpec {
        name: "hAlign",
        kind: OptionKind::StringEnum(&["left", "center", "right"]),
        default: DefaultValue::Str("center"),
    },
    OptionSpec {
        name: "vAlign",
        kind: OptionKind::StringEnum(&["top", "center", "bottom"]),
        default: DefaultValue::Str("center"),
    },
    OptionSpec {
        name: "spread",
        kind: OptionKind::StringEnum(&["none", "both", "landscape"]),
        default: DefaultValue::Str("none"),
    },
    OptionSpec {
        name: "constraint",
        kind: OptionKind::StringEnum(&["exact", "min", "max"]),
        default: DefaultValue::Str("exact"),
    },
    OptionSpec {
        name: "pageSide",
        kind: OptionKind::StringEnum(&["left", "center", "right"]),
        default: DefaultValue::Str("center"),
    },
    OptionSpec {
        name: "duration",
        kind: OptionKind::StrictlyPositiveNumber,
        default: DefaultValue::Number(250.0),
    },
    OptionSpec {
        name: "looping",
        kind: OptionKind::Bool,
        default: DefaultValue::Bool(false),
    },
    OptionSpec {
        name: "transitionType",
        kind: OptionKind::StringEnum(&[
            "cut",
            "dissolve",
            "slide-in",
            "slide-out",
            "push",
            "animation",
        ]),
        default: DefaultValue::None,
    },
    OptionSpec {
        name: "halfTransitionType",
        kind: OptionKind::StringEnum(&["cut", "fade-in", "fade-out", "slide-in", "slide-out"]),
        default: DefaultValue::Str("cut"),
    },
    OptionSpec {
        name: "viewport",
        kind: OptionKind::StringEnum(&["start", "center", "end"]),
        default: DefaultValue::None,
    },
    OptionSpec {
        name: "animationType",
        kind: OptionKind::StringEnum(&["time", "progress", "point"]),
        default: DefaultValue::Str("time"),
    },
    OptionSpec {
        name: "animationVariable",
        kind: OptionKind::StringEnum(&["alpha", "x", "y", "scale", "rotation"]),
        default: DefaultValue::None,
    },
    OptionSpec {
        name: "backgroundColor",
        kind: OptionKind::Color,
        default: DefaultValue::Str("#000000"),
    },
    OptionSpec {
        name: "fillColor",
        kind: OptionKind::Color,
        default: DefaultValue::Str("#000000"),
    },
    OptionSpec {
        name: "fontFamily",
        kind: OptionKind::String,
        default: DefaultValue::Str("Arial"),
    },
    OptionSpec {
        name: "fontSize",
        kind: OptionKind::ValueAndUnit,
        default: DefaultValue::ValueUnit(20.0, Unit::Percent),
    },
    OptionSpec {
        name: "lineHeight",
        kind: OptionKind::ValueAndUnit,
        default: DefaultValue::None,
    },
    OptionSpec {
        name: "letterSpacing",
        kind: OptionKind::PositiveNumber,
        default: DefaultValue::Number(0.0),
    },
];

pub fn spec_for(name: &str) -> Option<&'static OptionSpec> {
    OPTIONS.iter().find(|spec| spec.name == name)
}

/// Validate `raw` against the table entry for `name`.
///
/// Returns the validated value, the option's default when `raw` is missing or
/// invalid, or `None` when the option has no default either.
pub fn validate(name: &str, raw: Option<&serde_json::Value>) -> Option<OptionValue> {
    let spec = spec_for(name)?;
    if let Some(value) = raw.and_then(|raw| validate_raw(spec.kind, raw)) {
        return Some(value);
    }
    match spec.default {
        DefaultValue::None => None,
        DefaultValue::Str(s) => Some(OptionValue::Str(s.to_string())),
        DefaultValue::Bool(b) => Some(OptionValue::Bool(b)),
        DefaultValue::Number(n) => Some(OptionValue::Number(n)),
        DefaultValue::ValueUnit(v, u) => Some(OptionValue::ValueUnit(v, u)),
    }
}

/// Validate option `name` read from a JSON object (a `properties` bag or the
/// manifest `metadata`). Non-object containers behave as "missing".
pub fn validated(container: &serde_json::Value, name: &str) -> Option<OptionValue> {
    validate(name, container.as_object().and_then(|map| map.get(name)))
}

fn validate_raw(kind: OptionKind, raw: &serde_json::Value) -> Option<OptionValue> {
    match kind {
        OptionKind::String => {
            let s = raw.as_str()?;
            (!s.is_empty()).then(|| OptionValue::Str(s.to_string()))
        }
        OptionKind::StringEnum(allowed) => {
            let s = raw.as_str()?;
            allowed
                .contains(&s)
                .then(|| OptionValue::Str(s.to_string()))
        }
        OptionKind::Bool => raw.as_bool().map(OptionValue::Bool),
        OptionKind::PositiveNumber => {
            let n = raw.as_f64()?;
            (n.is_finite() && n >= 0.0).then_some(OptionValue::Number(n))
        }
        OptionKind::StrictlyPositiveNumber => {
            let n = raw.as_f64()?;
            (n.is_finite() && n > 0.0).then_some(OptionValue::Number(n))
        }
        OptionKind::Color => {
            let s = raw.as_str()?;
            let hex = s.strip_prefix('#')?;
            (hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()))
                .then(|| OptionValue::Str(s.to_string()))
        }
        OptionKind::ValueAndUnit => parse_value_unit(raw),
    }
}

/// Parse a raw `value&unit` JSON value (`"15px"`, `"80%"`, bare number =
/// percent) outside the option table, e.g. point coordinates.
pub fn value_and_unit(raw: &serde_json::Value) -> Option<(f64, Unit)> {
    match parse_value_unit(raw)? {
        OptionValue::ValueUnit(v, u) => Some((v, u)),
        _ => None,
    }
}

fn parse_value_unit(raw: &serde_json::Value) -> Option<OptionValue> {
    if let Some(n) = raw.as_f64() {
        return (n.is_finite() && n >= 0.0).then_some(OptionValue::ValueUnit(n, Unit::Percent));
    }
    let s = raw.as_str()?.trim();
    let (number, unit) = if let Some(rest) = s.strip_suffix("px") {
        (rest, Unit::Px)
    } else if let Some(rest) = s.strip_suffix('%') {
        (rest, Unit::Percent)
    } else {
        return None;
    };
    let n: f64 = number.trim().parse().ok()?;
    (n.is_finite() && n >= 0.0).then_some(OptionValue::ValueUnit(n, unit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_value_yields_default() {
        assert_eq!(
            validate("direction", None),
            Some(OptionValue::Str("ltr".to_string()))
        );
        assert_eq!(validate("allowsDestroy", None), Some(OptionValue::Bool(false)));
        assert_eq!(validate("duration", None), Some(OptionValue::Number(250.0)));
        assert_eq!(
            validate("fontSize", None),
            Some(OptionValue::ValueUnit(20.0, Unit::Percent))
        );
    }

    #[test]
    fn optionless_defaults_are_none() {
        assert_eq!(validate("transitionType", None), None);
        assert_eq!(validate("viewport", None), None);
        assert_eq!(validate("animationVariable", None), None);
        assert_eq!(validate("lineHeight", None), None);
    }

    #[test]
    fn invalid_value_falls_back_to_default() {
        assert_eq!(
            validate("direction", Some(&json!("diagonal"))),
            Some(OptionValue::Str("ltr".to_string()))
        );
        assert_eq!(
            validate("duration", Some(&json!(-3))),
            Some(OptionValue::Number(250.0))
        );
        assert_eq!(
            validate("continuous", Some(&json!("yes"))),
            Some(OptionValue::Bool(true))
        );
    }

    #[test]
    fn valid_values_pass_through() {
        assert_eq!(
            validate("direction", Some(&json!("rtl"))),
            Some(OptionValue::Str("rtl".to_string()))
        );
        assert_eq!(
            validate("overflow", Some(&json!("paginated"))),
            Some(OptionValue::Str("paginated".to_string()))
        );
        assert_eq!(
            validate("duration", Some(&json!(500))),
            Some(OptionValue::Number(500.0))
        );
    }

    #[test]
    fn color_requires_rrggbb() {
        assert_eq!(
            validate("backgroundColor", Some(&json!("#ffAA00"))),
            Some(OptionValue::Str("#ffAA00".to_string()))
        );
        assert_eq!(
            validate("backgroundColor", Some(&json!("#fff"))),
            Some(OptionValue::Str("#000000".to_string()))
        );
        assert_eq!(
            validate("backgroundColor", Some(&json!("red"))),
            Some(OptionValue::Str("#000000".to_string()))
        );
    }

    #[test]
    fn value_and_unit_accepts_suffixed_strings_and_bare_numbers() {
        assert_eq!(
            validate("fontSize", Some(&json!("15px"))),
            Some(OptionValue::ValueUnit(15.0, Unit::Px))
        );
        assert_eq!(
            validate("fontSize", Some(&json!("80%"))),
            Some(OptionValue::ValueUnit(80.0, Unit::Percent))
        );
        assert_eq!(
            validate("fontSize", Some(&json!(40))),
            Some(OptionValue::ValueUnit(40.0, Unit::Percent))
        );
        assert_eq!(
            validate("fontSize", Some(&json!("40em"))),
            Some(OptionValue::ValueUnit(20.0, Unit::Percent))
        );
    }

    #[test]
    fn unknown_option_is_none() {
        assert_eq!(validate("notAnOption", Some(&json!(true))), None);
    }
}
