//! Validated in-memory manifest model.
//!
//! [`ManifestModel`] turns the lenient raw layer into global [`Metadata`] and
//! one [`LinkObject`] per reading-order (or guided) entry. Link objects carry
//! everything the scene builder needs: the slice descriptor, child layers,
//! transitions, snap points, sounds, and keyframe animations. Malformed
//! sub-objects are dropped one by one; only the manifest-level checks in
//! [`crate::manifest`] are fatal.

use serde_json::Value;

use crate::{
    error::DivinaResult,
    fragment::{FragmentRect, Unit, parse_fragment, split_href},
    geom::ReadingDirection,
    manifest::{Manifest, RawLinkObject},
    options,
};

/// Extensions recognized as video when no MIME type is given. Anything not
/// listed here (and not carrying an explicit MIME type) loads as an image.
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "m4v", "webm", "ogv", "mov"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ResourceKind {
    Image,
    Video,
    Audio,
}

impl ResourceKind {
    pub fn from_mime(mime: &str) -> Option<Self> {
        if mime.starts_with("image/") {
            Some(Self::Image)
        } else if mime.starts_with("video/") {
            Some(Self::Video)
        } else if mime.starts_with("audio/") {
            Some(Self::Audio)
        } else {
            None
        }
    }

    pub fn from_path(path: &str) -> Self {
        let ext = path
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Self::Video
        } else {
            Self::Image
        }
    }
}

/// A fully resolved resource reference, ready for registry insertion.
#[derive(Clone, Debug, PartialEq)]
pub struct ResourceSpec {
    pub kind: ResourceKind,
    pub mime: Option<String>,
    pub path: String,
    pub fragment: Option<FragmentRect>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub language: Option<String>,
    /// Failure-triggered replacements (video → image), never reachable via
    /// tag matching alone.
    pub fallbacks: Vec<ResourceSpec>,
}

macro_rules! option_enum {
    ($name:ident, $option:literal, { $($variant:ident => $text:literal),+ $(,)? }, $default:ident) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($text => Some(Self::$variant),)+
                    _ => None,
                }
            }

            /// Read and validate this option from a JSON object, falling back
            /// to the table default.
            pub fn from_options(container: &Value) -> Self {
                options::validated(container, $option)
                    .as_ref()
                    .and_then(|v| v.as_str())
                    .and_then(Self::from_name)
                    .unwrap_or(Self::$default)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::$default
            }
        }
    };
}

option_enum!(Fit, "fit", {
    Contain => "contain",
    Cover => "cover",
    Width => "width",
    Height => "height",
}, Contain);

option_enum!(Overflow, "overflow", {
    Scrolled => "scrolled",
    Paginated => "paginated",
}, Scrolled);

option_enum!(HAlign, "hAlign", {
    Left => "left",
    Center => "center",
    Right => "right",
}, Center);

option_enum!(VAlign, "vAlign", {
    Top => "top",
    Center => "center",
    Bottom => "bottom",
}, Center);

option_enum!(Spread, "spread", {
    None => "none",
    Both => "both",
    Landscape => "landscape",
}, None);

option_enum!(Constraint, "constraint", {
    Exact => "exact",
    Min => "min",
    Max => "max",
}, Exact);

option_enum!(PageSide, "page", {
    Left => "left",
    Center => "center",
    Right => "right",
}, Center);

option_enum!(LoadingMode, "loadingMode", {
    Page => "page",
    Segment => "segment",
}, Page);

option_enum!(ViewportAnchor, "viewport", {
    Start => "start",
    Center => "center",
    End => "end",
}, Center);

option_enum!(AnimationType, "animationType", {
    Time => "time",
    Progress => "progress",
    Point => "point",
}, Time);

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnimationVariable {
    Alpha,
    X,
    Y,
    Scale,
    Rotation,
}

impl AnimationVariable {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "alpha" => Some(Self::Alpha),
            "x" => Some(Self::X),
            "y" => Some(Self::Y),
            "scale" => Some(Self::Scale),
            "rotation" => Some(Self::Rotation),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransitionType {
    Cut,
    Dissolve,
    SlideIn,
    SlideOut,
    Push,
    Animation,
}

impl TransitionType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "cut" => Some(Self::Cut),
            "dissolve" => Some(Self::Dissolve),
            "slide-in" => Some(Self::SlideIn),
            "slide-out" => Some(Self::SlideOut),
            "push" => Some(Self::Push),
            "animation" => Some(Self::Animation),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HalfTransitionType {
    #[default]
    Cut,
    FadeIn,
    FadeOut,
    SlideIn,
    SlideOut,
    /// Media-driven half synthesized from an `animation` transition; never
    /// authored directly on a layer boundary.
    Animation,
}

impl HalfTransitionType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "cut" => Some(Self::Cut),
            "fade-in" => Some(Self::FadeIn),
            "fade-out" => Some(Self::FadeOut),
            "slide-in" => Some(Self::SlideIn),
            "slide-out" => Some(Self::SlideOut),
            _ => None,
        }
    }
}

/// Video or image sequence driving an `animation` half. Playback itself is
/// the host compositor's job; the engine only tracks the half's lifetime.
#[derive(Clone, Debug, PartialEq)]
pub struct AnimationMedia {
    pub resource: Option<ResourceSpec>,
    pub sequence: Option<Vec<ResourceSpec>>,
}

impl AnimationMedia {
    /// An animation half with nothing to play ends immediately.
    pub fn is_playable(&self) -> bool {
        self.resource.is_some() || self.sequence.as_ref().is_some_and(|s| !s.is_empty())
    }
}

/// One side (entry or exit) of a transition, attachable to any layer.
#[derive(Clone, Debug, PartialEq)]
pub struct HalfTransition {
    pub kind: HalfTransitionType,
    /// Infinite for a duration-less animation, which runs until the host
    /// signals its media's natural end.
    pub duration_ms: f64,
    pub direction: ReadingDirection,
    /// Present only when `kind` is [`HalfTransitionType::Animation`].
    pub media: Option<AnimationMedia>,
}

/// A full inter-page transition descriptor.
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub kind: TransitionType,
    pub duration_ms: Option<f64>,
    pub direction: ReadingDirection,
    /// Video driving an `animation` transition.
    pub resource: Option<ResourceSpec>,
    /// Image sequence driving an `animation` transition.
    pub sequence: Option<Vec<ResourceSpec>>,
    /// Whether the author allows gesture-driven (controlled) playback.
    pub controllable: bool,
}

impl Transition {
    /// Split into (exit half for the old layer, entry half for the new one).
    pub fn halves(&self) -> (Option<HalfTransition>, Option<HalfTransition>) {
        let duration = self.duration_ms.unwrap_or(250.0);
        let half = |kind| HalfTransition {
            kind,
            duration_ms: duration,
            direction: self.direction,
            media: None,
        };
        match self.kind {
            TransitionType::Cut => (None, None),
            TransitionType::Animation => (
                None,
                Some(HalfTransition {
                    kind: HalfTransitionType::Animation,
                    duration_ms: self.duration_ms.unwrap_or(f64::INFINITY),
                    direction: self.direction,
                    media: Some(AnimationMedia {
                        resource: self.resource.clone(),
                        sequence: self.sequence.clone(),
                    }),
                }),
            ),
            TransitionType::Dissolve => (Some(half(HalfTransitionType::FadeOut)), None),
            TransitionType::SlideIn => (None, Some(half(HalfTransitionType::SlideIn))),
            TransitionType::SlideOut => (Some(half(HalfTransitionType::SlideOut)), None),
            TransitionType::Push => (
                Some(half(HalfTransitionType::SlideOut)),
                Some(half(HalfTransitionType::SlideIn)),
            ),
        }
    }
}

/// Author-declared camera rest point.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PointDescriptor {
    pub page_segment_index: Option<usize>,
    pub viewport: Option<ViewportAnchor>,
    pub x: Option<(f64, Unit)>,
    pub y: Option<(f64, Unit)>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SoundDescriptor {
    pub spec: ResourceSpec,
    pub looping: bool,
    pub animation_type: AnimationType,
    pub start: Option<PointDescriptor>,
    pub end: Option<PointDescriptor>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum AnimationKey {
    TimeMs(f64),
    Progress(f64),
    Point(PointDescriptor),
}

#[derive(Clone, Debug, PartialEq)]
pub struct AnimationKeyframe {
    pub key: AnimationKey,
    pub value: f64,
}

/// A keyframe animation over one visual variable of a slice.
#[derive(Clone, Debug, PartialEq)]
pub struct AnimationDescriptor {
    pub variable: AnimationVariable,
    pub kind: AnimationType,
    pub looping: bool,
    pub keyframes: Vec<AnimationKeyframe>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextStyle {
    pub font_family: String,
    pub font_size: (f64, Unit),
    pub line_height: Option<(f64, Unit)>,
    pub letter_spacing: f64,
    pub fill_color: String,
    pub rect: Option<FragmentRect>,
}

impl TextStyle {
    fn from_options(container: &Value) -> Self {
        Self {
            font_family: string_option(container, "fontFamily"),
            font_size: options::validated(container, "fontSize")
                .and_then(|v| v.as_value_unit())
                .unwrap_or((20.0, Unit::Percent)),
            line_height: options::validated(container, "lineHeight")
                .and_then(|v| v.as_value_unit()),
            letter_spacing: number_option(container, "letterSpacing", 0.0),
            fill_color: string_option(container, "fillColor"),
            rect: container
                .get("rect")
                .and_then(Value::as_str)
                .and_then(parse_fragment),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SliceContent {
    /// Single resource (rank 0) plus ranked tag-selectable alternates.
    Resource {
        primary: ResourceSpec,
        alternates: Vec<ResourceSpec>,
    },
    /// Image sequence played as frames.
    Sequence {
        frames: Vec<ResourceSpec>,
        duration_ms: f64,
    },
    /// Styled text, laid out by the host's text collaborator.
    Text { text: String, style: TextStyle },
    Empty,
}

/// Everything needed to build one slice of the scene graph.
#[derive(Clone, Debug, PartialEq)]
pub struct SliceDescriptor {
    pub content: SliceContent,
    pub fit: Option<Fit>,
    pub clipped: Option<bool>,
    pub h_align: Option<HAlign>,
    pub v_align: Option<VAlign>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub background_color: Option<String>,
}

/// A child layer of a multi-layer segment with its half-transitions.
#[derive(Clone, Debug, PartialEq)]
pub struct LayerDescriptor {
    pub slice: SliceDescriptor,
    pub entry_forward: Option<HalfTransition>,
    pub exit_forward: Option<HalfTransition>,
    pub entry_backward: Option<HalfTransition>,
    pub exit_backward: Option<HalfTransition>,
}

/// One resolved reading-order (or guided) entry.
#[derive(Clone, Debug, PartialEq)]
pub struct LinkObject {
    pub slice: SliceDescriptor,
    pub layers: Vec<LayerDescriptor>,
    pub transition_forward: Option<Transition>,
    pub transition_backward: Option<Transition>,
    pub snap_points: Vec<PointDescriptor>,
    pub sounds: Vec<SoundDescriptor>,
    pub animations: Vec<AnimationDescriptor>,
    pub page_side: PageSide,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Metadata {
    pub direction: ReadingDirection,
    pub continuous: bool,
    pub fit: Fit,
    pub clipped: bool,
    pub overflow: Overflow,
    pub h_align: HAlign,
    pub v_align: VAlign,
    pub spread: Spread,
    pub constraint: Constraint,
    /// Viewport aspect-ratio constraint (width / height).
    pub ratio: Option<f64>,
    pub languages: Vec<String>,
    pub loading_message: String,
    pub loading_mode: LoadingMode,
    pub allows_destroy: bool,
    pub allows_parallel: bool,
    pub allows_swipe: bool,
    pub allows_wheel_scroll: bool,
    pub allows_zoom_on_double_tap: bool,
    pub allows_zoom_on_ctrl_or_alt_scroll: bool,
    pub allows_paginated_scroll: bool,
    pub is_pagination_sticky: bool,
    pub is_pagination_grid_based: bool,
    pub background_color: String,
    pub sounds: Vec<SoundDescriptor>,
    pub text_style: TextStyle,
}

#[derive(Clone, Debug)]
pub struct ManifestModel {
    pub metadata: Metadata,
    pub reading_order: Vec<LinkObject>,
    pub guided: Vec<LinkObject>,
    pub folder_path: Option<String>,
}

impl ManifestModel {
    #[tracing::instrument(skip(manifest))]
    pub fn from_manifest(manifest: &Manifest) -> DivinaResult<Self> {
        let metadata = Metadata::from_value(&manifest.metadata);
        let folder_path = manifest.folder_path();
        let folder = folder_path.as_deref();

        let reading_order = manifest
            .reading_order
            .iter()
            .map(|raw| LinkObject::from_raw(raw, folder))
            .collect();
        let guided = manifest
            .guided
            .iter()
            .map(|raw| LinkObject::from_raw(raw, folder))
            .collect();

        Ok(Self {
            metadata,
            reading_order,
            guided,
            folder_path,
        })
    }

    pub fn has_guided(&self) -> bool {
        !self.guided.is_empty()
    }
}

impl Metadata {
    pub fn from_value(metadata: &Value) -> Self {
        let languages = match metadata.get("languages") {
            Some(Value::String(s)) => vec![s.clone()],
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
            _ => Vec::new(),
        };

        let sounds = metadata
            .get("sounds")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(parse_sound).collect())
            .unwrap_or_default();

        Self {
            direction: metadata
                .get("readingProgression")
                .or_else(|| metadata.get("direction"))
                .and_then(Value::as_str)
                .and_then(ReadingDirection::from_name)
                .unwrap_or_default(),
            continuous: bool_option(metadata, "continuous"),
            fit: Fit::from_options(metadata),
            clipped: bool_option(metadata, "clipped"),
            overflow: Overflow::from_options(metadata),
            h_align: HAlign::from_options(metadata),
            v_align: VAlign::from_options(metadata),
            spread: Spread::from_options(metadata),
            constraint: Constraint::from_options(metadata),
            ratio: metadata.get("ratio").and_then(parse_ratio),
            languages,
            loading_message: string_option(metadata, "loadingMessage"),
            loading_mode: LoadingMode::from_options(metadata),
            allows_destroy: bool_option(metadata, "allowsDestroy"),
            allows_parallel: bool_option(metadata, "allowsParallel"),
            allows_swipe: bool_option(metadata, "allowsSwipe"),
            allows_wheel_scroll: bool_option(metadata, "allowsWheelScroll"),
            allows_zoom_on_double_tap: bool_option(metadata, "allowsZoomOnDoubleTap"),
            allows_zoom_on_ctrl_or_alt_scroll: bool_option(
                metadata,
                "allowsZoomOnCtrlOrAltScroll",
            ),
            allows_paginated_scroll: bool_option(metadata, "allowsPaginatedScroll"),
            is_pagination_sticky: bool_option(metadata, "isPaginationSticky"),
            is_pagination_grid_based: bool_option(metadata, "isPaginationGridBased"),
            background_color: string_option(metadata, "backgroundColor"),
            sounds,
            text_style: TextStyle::from_options(metadata),
        }
    }
}

impl LinkObject {
    pub fn from_raw(raw: &RawLinkObject, folder: Option<&str>) -> Self {
        let props = &raw.properties;

        let slice = SliceDescriptor::from_raw(raw, folder);

        let layers = props
            .get("layers")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| parse_layer(item, folder))
                    .collect()
            })
            .unwrap_or_default();

        let snap_points = props
            .get("snapPoints")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(parse_point).collect())
            .unwrap_or_default();

        let sounds = props
            .get("sounds")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(parse_sound).collect())
            .unwrap_or_default();

        let animations = props
            .get("animations")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(parse_animation).collect())
            .unwrap_or_default();

        Self {
            slice,
            layers,
            transition_forward: props
                .get("transitionForward")
                .and_then(|v| parse_transition(v, folder)),
            transition_backward: props
                .get("transitionBackward")
                .and_then(|v| parse_transition(v, folder)),
            snap_points,
            sounds,
            animations,
            page_side: PageSide::from_options(props),
        }
    }
}

impl SliceDescriptor {
    fn from_raw(raw: &RawLinkObject, folder: Option<&str>) -> Self {
        let props = &raw.properties;

        let content = if let Some(sequence) = props.get("sequence").and_then(Value::as_object) {
            let frames: Vec<ResourceSpec> = sequence
                .get("files")
                .and_then(Value::as_array)
                .map(|files| {
                    files
                        .iter()
                        .filter_map(Value::as_str)
                        .filter_map(|href| resolve_resource(href, None, None, folder))
                        .collect()
                })
                .unwrap_or_default();
            let duration_ms = options::validate("duration", sequence.get("duration"))
                .and_then(|v| v.as_f64())
                .unwrap_or(250.0);
            if frames.is_empty() {
                SliceContent::Empty
            } else {
                SliceContent::Sequence {
                    frames,
                    duration_ms,
                }
            }
        } else if raw
            .mime
            .as_deref()
            .is_some_and(|mime| mime.starts_with("text/"))
        {
            SliceContent::Text {
                text: raw.href.clone().unwrap_or_default(),
                style: TextStyle::from_options(props),
            }
        } else if let Some(resolved) = resolve_link_resource(raw, folder) {
            SliceContent::Resource {
                primary: resolved.primary,
                alternates: resolved.alternates,
            }
        } else {
            SliceContent::Empty
        };

        Self {
            content,
            fit: optional_enum(props, "fit", Fit::from_name),
            clipped: props.get("clipped").and_then(Value::as_bool),
            h_align: optional_enum(props, "hAlign", HAlign::from_name),
            v_align: optional_enum(props, "vAlign", VAlign::from_name),
            width: raw.width.filter(|w| *w > 0.0),
            height: raw.height.filter(|h| *h > 0.0),
            background_color: options::validated(props, "backgroundColor")
                .and_then(|v| v.as_str().map(String::from))
                .filter(|_| props.get("backgroundColor").is_some()),
        }
    }
}

struct ResolvedResource {
    primary: ResourceSpec,
    alternates: Vec<ResourceSpec>,
}

/// Resolve a link object's resource tree.
///
/// Alternates are flattened depth-first into a ranked list. A video→image
/// alternate with no distinguishing tag is a failure-triggered *fallback* of
/// its parent, not a peer alternate, and never enters the ranked list.
fn resolve_link_resource(raw: &RawLinkObject, folder: Option<&str>) -> Option<ResolvedResource> {
    let href = raw.href.as_deref()?;
    let mut primary = resolve_resource(
        href,
        raw.mime.as_deref(),
        raw.language.as_deref(),
        folder,
    )?;
    primary.width = raw.width.filter(|w| *w > 0.0);
    primary.height = raw.height.filter(|h| *h > 0.0);

    let mut alternates = Vec::new();
    for alt_raw in &raw.alternate {
        let Some(resolved) = resolve_link_resource(alt_raw, folder) else {
            tracing::debug!("dropping malformed alternate");
            continue;
        };
        if primary.kind == ResourceKind::Video
            && resolved.primary.kind == ResourceKind::Image
            && resolved.primary.language.is_none()
        {
            primary.fallbacks.push(resolved.primary);
        } else {
            alternates.push(resolved.primary);
        }
        alternates.extend(resolved.alternates);
    }

    Some(ResolvedResource {
        primary,
        alternates,
    })
}

fn resolve_resource(
    href: &str,
    mime: Option<&str>,
    language: Option<&str>,
    folder: Option<&str>,
) -> Option<ResourceSpec> {
    let (path, fragment) = split_href(href);
    if path.is_empty() {
        return None;
    }

    let kind = mime
        .and_then(ResourceKind::from_mime)
        .unwrap_or_else(|| ResourceKind::from_path(path));

    let path = if path.contains("://") || path.starts_with('/') {
        path.to_string()
    } else if let Some(folder) = folder {
        format!("{folder}{path}")
    } else {
        path.to_string()
    };

    Some(ResourceSpec {
        kind,
        mime: mime.map(String::from),
        path,
        fragment: fragment.and_then(parse_fragment),
        width: None,
        height: None,
        language: language.map(String::from),
        fallbacks: Vec::new(),
    })
}

fn parse_layer(item: &Value, folder: Option<&str>) -> Option<LayerDescriptor> {
    let raw: RawLinkObject = serde_json::from_value(item.clone()).ok()?;
    raw.href.as_ref()?;
    let props = &raw.properties;
    let layer = LayerDescriptor {
        slice: SliceDescriptor::from_raw(&raw, folder),
        entry_forward: props.get("entryForward").and_then(parse_half_transition),
        exit_forward: props.get("exitForward").and_then(parse_half_transition),
        entry_backward: props.get("entryBackward").and_then(parse_half_transition),
        exit_backward: props.get("exitBackward").and_then(parse_half_transition),
    };
    Some(layer)
}

fn parse_half_transition(value: &Value) -> Option<HalfTransition> {
    if !value.is_object() {
        return None;
    }
    let kind = options::validate("halfTransitionType", value.get("type"))
        .as_ref()
        .and_then(|v| v.as_str())
        .and_then(HalfTransitionType::from_name)
        .unwrap_or_default();
    Some(HalfTransition {
        kind,
        duration_ms: options::validated(value, "duration")
            .and_then(|v| v.as_f64())
            .unwrap_or(250.0),
        direction: value
            .get("direction")
            .and_then(Value::as_str)
            .and_then(ReadingDirection::from_name)
            .unwrap_or_default(),
        media: None,
    })
}

fn parse_transition(value: &Value, folder: Option<&str>) -> Option<Transition> {
    // transitionType has no default: a missing or unknown type drops the
    // whole transition.
    let kind = options::validate("transitionType", value.get("type"))
        .as_ref()
        .and_then(|v| v.as_str())
        .and_then(TransitionType::from_name)?;

    let resource = value
        .get("file")
        .and_then(Value::as_str)
        .and_then(|href| resolve_resource(href, None, None, folder));

    let sequence = value
        .get("sequence")
        .and_then(Value::as_object)
        .and_then(|seq| seq.get("files"))
        .and_then(Value::as_array)
        .map(|files| {
            files
                .iter()
                .filter_map(Value::as_str)
                .filter_map(|href| resolve_resource(href, None, None, folder))
                .collect::<Vec<_>>()
        })
        .filter(|frames| !frames.is_empty());

    if kind == TransitionType::Animation && resource.is_none() && sequence.is_none() {
        tracing::debug!("dropping animation transition without file or sequence");
        return None;
    }

    Some(Transition {
        kind,
        duration_ms: value
            .get("duration")
            .and_then(|raw| options::validate("duration", Some(raw)))
            .and_then(|v| v.as_f64()),
        direction: value
            .get("direction")
            .and_then(Value::as_str)
            .and_then(ReadingDirection::from_name)
            .unwrap_or_default(),
        resource,
        sequence,
        controllable: value
            .get("controlled")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}

fn parse_point(value: &Value) -> Option<PointDescriptor> {
    if !value.is_object() {
        return None;
    }
    let x = value.get("x").and_then(options::value_and_unit);
    let y = value.get("y").and_then(options::value_and_unit);
    let viewport = optional_enum(value, "viewport", ViewportAnchor::from_name);
    let page_segment_index = value
        .get("pageSegmentIndex")
        .and_then(Value::as_u64)
        .map(|v| v as usize);
    if x.is_none() && y.is_none() && viewport.is_none() && page_segment_index.is_none() {
        return None;
    }
    Some(PointDescriptor {
        page_segment_index,
        viewport,
        x,
        y,
    })
}

fn parse_sound(value: &Value) -> Option<SoundDescriptor> {
    let href = value.get("href").and_then(Value::as_str)?;
    let mut spec = resolve_resource(href, value.get("type").and_then(Value::as_str), None, None)?;
    // Sound hrefs are audio regardless of extension.
    spec.kind = ResourceKind::Audio;
    Some(SoundDescriptor {
        spec,
        looping: bool_option(value, "looping"),
        animation_type: AnimationType::from_options(value),
        start: value.get("start").and_then(parse_point),
        end: value.get("end").and_then(parse_point),
    })
}

fn parse_animation(value: &Value) -> Option<AnimationDescriptor> {
    let variable = options::validate("animationVariable", value.get("variable"))
        .as_ref()
        .and_then(|v| v.as_str())
        .and_then(AnimationVariable::from_name)?;
    let kind = AnimationType::from_options(value);

    let keyframes: Vec<AnimationKeyframe> = value
        .get("keyframes")
        .and_then(Value::as_array)?
        .iter()
        .filter_map(|kf| parse_keyframe(kf, kind))
        .collect();
    if keyframes.is_empty() {
        return None;
    }

    Some(AnimationDescriptor {
        variable,
        kind,
        looping: bool_option(value, "looping"),
        keyframes,
    })
}

fn parse_keyframe(value: &Value, kind: AnimationType) -> Option<AnimationKeyframe> {
    let v = value.get("value").and_then(Value::as_f64)?;
    let key = match kind {
        AnimationType::Time => AnimationKey::TimeMs(
            value
                .get("ms")
                .or_else(|| value.get("time"))
                .and_then(Value::as_f64)
                .filter(|ms| ms.is_finite() && *ms >= 0.0)?,
        ),
        AnimationType::Progress => AnimationKey::Progress(
            value
                .get("progress")
                .and_then(Value::as_f64)
                .filter(|p| (0.0..=1.0).contains(p))?,
        ),
        AnimationType::Point => AnimationKey::Point(parse_point(value.get("point")?)?),
    };
    Some(AnimationKeyframe { key, value: v })
}

fn optional_enum<T>(container: &Value, key: &str, from_name: fn(&str) -> Option<T>) -> Option<T> {
    container.get(key)?;
    options::validated(container, key)
        .as_ref()
        .and_then(|v| v.as_str())
        .and_then(from_name)
}

fn bool_option(container: &Value, name: &str) -> bool {
    options::validated(container, name)
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

fn string_option(container: &Value, name: &str) -> String {
    options::validated(container, name)
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_default()
}

fn number_option(container: &Value, name: &str, fallback: f64) -> f64 {
    options::validated(container, name)
        .and_then(|v| v.as_f64())
        .unwrap_or(fallback)
}

fn parse_ratio(value: &Value) -> Option<f64> {
    if let Some(n) = value.as_f64() {
        return (n.is_finite() && n > 0.0).then_some(n);
    }
    let s = value.as_str()?;
    let (w, h) = s.split_once(':')?;
    let w: f64 = w.trim().parse().ok()?;
    let h: f64 = h.trim().parse().ok()?;
    (w > 0.0 && h > 0.0).then_some(w / h)
}
