//! Page → Segment → Layer → Slice tree built from the manifest model.
//!
//! The scene graph owns layout geometry and the mapping from slices to
//! registry resources. It renders nothing itself; the navigator walks it to
//! drive the camera, the transition engine, and the load scheduler.

use std::collections::HashMap;

use kurbo::Size;

use crate::{
    geom::{Axis, ReadingDirection},
    model::{
        AnimationDescriptor, Fit, HAlign, HalfTransition, LayerDescriptor, LinkObject,
        ManifestModel, Metadata, PageSide, PointDescriptor, ResourceSpec, SliceContent,
        SliceDescriptor, SoundDescriptor, Transition, VAlign,
    },
    navigator::ReadingMode,
    resources::{ResourceId, ResourceRegistry},
};

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct SliceId(pub u64);

/// Slice ids stay unique across every scene graph built for one story, so the
/// registry's consumer sets never collide between navigators.
#[derive(Debug, Default)]
pub struct SliceIdAllocator {
    next: u64,
}

impl SliceIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self) -> SliceId {
        let id = SliceId(self.next);
        self.next += 1;
        id
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SliceRole {
    Standard,
    LayersParent,
    LayersChild,
    Transition,
    Empty,
}

/// What a slice draws. `Single` keeps the full ranked variant list so a tag
/// switch can re-select without rebuilding the scene.
#[derive(Clone, Debug)]
pub enum SliceResources {
    Single {
        id: ResourceId,
        fragment: Option<crate::fragment::FragmentRect>,
        /// `(language tag, id)` pairs, primary first.
        variants: Vec<(Option<String>, ResourceId)>,
    },
    Sequence {
        ids: Vec<ResourceId>,
        duration_ms: f64,
    },
    Text {
        text: String,
        style: crate::model::TextStyle,
    },
    None,
}

#[derive(Clone, Debug)]
pub struct Slice {
    pub id: SliceId,
    pub role: SliceRole,
    pub resources: SliceResources,
    pub fit: Fit,
    pub clipped: bool,
    pub h_align: HAlign,
    pub v_align: VAlign,
    /// Declared natural size, when the manifest provided one.
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub background_color: Option<String>,
    pub animations: Vec<AnimationDescriptor>,
    pub page_index: usize,
    pub page_segment_index: usize,
    pub segment_index: usize,
}

impl Slice {
    /// The resource ids this slice fetches as one loading unit.
    pub fn loading_unit(&self) -> Vec<ResourceId> {
        match &self.resources {
            SliceResources::Single { id, .. } => vec![*id],
            SliceResources::Sequence { ids, .. } => ids.clone(),
            SliceResources::Text { .. } | SliceResources::None => Vec::new(),
        }
    }

    fn natural_size(&self, registry: &ResourceRegistry) -> Option<Size> {
        if let (Some(w), Some(h)) = (self.width, self.height) {
            return Some(Size::new(w, h));
        }
        match &self.resources {
            SliceResources::Single { id, fragment, .. } => {
                let natural = registry.get(*id)?.natural_size?;
                Some(match fragment {
                    Some(f) => f.resolve_px(natural).size(),
                    None => natural,
                })
            }
            SliceResources::Sequence { ids, .. } => {
                ids.first().and_then(|id| registry.get(*id)?.natural_size)
            }
            _ => None,
        }
    }
}

/// A child layer of a layered segment: a slice plus its directional
/// half-transitions.
#[derive(Clone, Debug)]
pub struct SegmentLayer {
    pub slice: Slice,
    pub entry_forward: Option<HalfTransition>,
    pub exit_forward: Option<HalfTransition>,
    pub entry_backward: Option<HalfTransition>,
    pub exit_backward: Option<HalfTransition>,
}

#[derive(Clone, Debug)]
pub struct Segment {
    pub segment_index: usize,
    pub page_segment_index: usize,
    pub parent: Slice,
    pub layers: Vec<SegmentLayer>,
    pub snap_points: Vec<PointDescriptor>,
    pub sounds: Vec<(SoundDescriptor, Option<ResourceId>)>,
    /// Scaled size after the last layout pass.
    pub size: Size,
}

impl Segment {
    pub fn is_layered(&self) -> bool {
        !self.layers.is_empty()
    }

    /// Number of stackable layers, parent included.
    pub fn layer_count(&self) -> usize {
        1 + self.layers.len()
    }

    pub fn slices(&self) -> impl Iterator<Item = &Slice> {
        std::iter::once(&self.parent).chain(self.layers.iter().map(|l| &l.slice))
    }

    /// One loading unit per slice that has resources.
    pub fn loading_units(&self) -> Vec<Vec<ResourceId>> {
        self.slices()
            .map(Slice::loading_unit)
            .filter(|unit| !unit.is_empty())
            .collect()
    }
}

#[derive(Clone, Debug)]
pub struct Page {
    pub page_index: usize,
    pub segments: Vec<Segment>,
    pub transition_forward: Option<Transition>,
    pub transition_backward: Option<Transition>,
    /// Resources backing animation transitions, fetched at page boundaries.
    pub transition_resources: Vec<ResourceId>,
    /// Consumer id the transition resources are registered under.
    pub transition_slice: Option<SliceId>,
    pub size: Size,
}

impl Page {
    /// Offset of a segment's leading edge along the reading axis.
    pub fn segment_offset(&self, page_segment_index: usize, axis: Axis) -> f64 {
        self.segments[..page_segment_index.min(self.segments.len())]
            .iter()
            .map(|s| axis.of(s.size))
            .sum()
    }

    fn compute_size(&mut self, axis: Axis, viewport: Size) {
        let primary: f64 = self.segments.iter().map(|s| axis.of(s.size)).sum();
        let mut secondary: f64 = self
            .segments
            .iter()
            .map(|s| axis.other().of(s.size))
            .fold(0.0, f64::max);
        // Multi-segment pages never overflow the cross axis.
        if self.segments.len() > 1 {
            secondary = secondary.min(axis.other().of(viewport));
        }
        self.size = match axis {
            Axis::Horizontal => Size::new(primary, secondary),
            Axis::Vertical => Size::new(secondary, primary),
        };
    }
}

#[derive(Debug)]
pub struct SceneGraph {
    pub mode: ReadingMode,
    pub direction: ReadingDirection,
    pub pages: Vec<Page>,
    viewport: Size,
    /// Absolute segment index → (page index, page segment index).
    segment_locations: Vec<(usize, usize)>,
    /// Slice id → owning absolute segment index (transition slices map to the
    /// first segment of their page).
    slice_owners: HashMap<SliceId, usize>,
}

impl SceneGraph {
    #[tracing::instrument(skip(model, registry, ids), fields(mode = ?mode))]
    pub fn build(
        model: &ManifestModel,
        mode: ReadingMode,
        viewport: Size,
        registry: &mut ResourceRegistry,
        ids: &mut SliceIdAllocator,
    ) -> Self {
        let metadata = &model.metadata;
        let links = match mode {
            ReadingMode::Guided => &model.guided,
            _ => &model.reading_order,
        };
        let groups = group_links(links, mode, metadata.direction);

        let mut pages = Vec::with_capacity(groups.len());
        let mut segment_locations = Vec::new();
        let mut slice_owners = HashMap::new();
        let mut segment_index = 0usize;

        for (page_index, group) in groups.iter().enumerate() {
            let first_segment = segment_index;
            let mut segments = Vec::with_capacity(group.len());
            for (page_segment_index, link) in group.iter().enumerate() {
                let segment = build_segment(
                    link,
                    page_index,
                    page_segment_index,
                    segment_index,
                    metadata,
                    registry,
                    ids,
                );
                for slice in segment.slices() {
                    slice_owners.insert(slice.id, segment_index);
                }
                segment_locations.push((page_index, page_segment_index));
                segments.push(segment);
                segment_index += 1;
            }

            let lead = group.first();
            let transition_forward = lead.and_then(|l| l.transition_forward.clone());
            let transition_backward = lead.and_then(|l| l.transition_backward.clone());
            let mut transition_resources = Vec::new();
            for transition in [&transition_forward, &transition_backward]
                .into_iter()
                .filter_map(Option::as_ref)
            {
                if let Some(spec) = &transition.resource {
                    transition_resources.extend(registry.get_or_create_id(spec));
                }
                for spec in transition.sequence.iter().flatten() {
                    transition_resources.extend(registry.get_or_create_id(spec));
                }
            }
            let transition_slice = if transition_resources.is_empty() {
                None
            } else {
                let slice = ids.next();
                for id in &transition_resources {
                    registry.register_consumer(*id, None, slice);
                }
                slice_owners.insert(slice, first_segment);
                Some(slice)
            };

            pages.push(Page {
                page_index,
                segments,
                transition_forward,
                transition_backward,
                transition_resources,
                transition_slice,
                size: Size::ZERO,
            });
        }

        let mut scene = Self {
            mode,
            direction: metadata.direction,
            pages,
            viewport,
            segment_locations,
            slice_owners,
        };
        scene.resize(viewport, registry);
        scene
    }

    pub fn viewport(&self) -> Size {
        self.viewport
    }

    pub fn axis(&self) -> Axis {
        self.direction.axis()
    }

    pub fn nb_of_pages(&self) -> usize {
        self.pages.len()
    }

    pub fn nb_of_segments(&self) -> usize {
        self.segment_locations.len()
    }

    pub fn page_of_segment(&self, segment_index: usize) -> Option<(usize, usize)> {
        self.segment_locations.get(segment_index).copied()
    }

    pub fn segment(&self, segment_index: usize) -> Option<&Segment> {
        let (page, in_page) = self.page_of_segment(segment_index)?;
        self.pages.get(page)?.segments.get(in_page)
    }

    /// Absolute segment index owning a slice, for liveness checks during
    /// resource destruction.
    pub fn owner_of_slice(&self, slice: SliceId) -> Option<usize> {
        self.slice_owners.get(&slice).copied()
    }

    /// Recompute slice, segment, and page sizes for a viewport. Safe to call
    /// repeatedly; sizes depend only on the viewport and known natural sizes.
    pub fn resize(&mut self, viewport: Size, registry: &ResourceRegistry) {
        self.viewport = viewport;
        let axis = self.direction.axis();
        // Double-page spreads size each segment against half the viewport.
        let cell = if self.mode == ReadingMode::Double {
            Size::new(viewport.width / 2.0, viewport.height)
        } else {
            viewport
        };
        for page in &mut self.pages {
            for segment in &mut page.segments {
                let natural = segment.parent.natural_size(registry);
                segment.size = match natural {
                    Some(n) => scaled_size(n, cell, segment.parent.fit),
                    None => cell,
                };
            }
            page.compute_size(axis, viewport);
        }
    }

    /// Re-select each slice's resource variant for a tag (language) choice.
    /// Returns the slices whose selection changed.
    pub fn select_tag(&mut self, tag: Option<&str>, registry: &mut ResourceRegistry) -> Vec<SliceId> {
        let mut changed = Vec::new();
        for page in &mut self.pages {
            for segment in &mut page.segments {
                let parent = &mut segment.parent;
                if reselect_variant(parent, tag, registry) {
                    changed.push(parent.id);
                }
                for layer in &mut segment.layers {
                    if reselect_variant(&mut layer.slice, tag, registry) {
                        changed.push(layer.slice.id);
                    }
                }
            }
        }
        changed
    }
}

fn reselect_variant(slice: &mut Slice, tag: Option<&str>, registry: &mut ResourceRegistry) -> bool {
    let SliceResources::Single {
        id,
        fragment,
        variants,
    } = &mut slice.resources
    else {
        return false;
    };
    // Tag match wins; otherwise fall back to the primary (rank 0).
    let selected = tag
        .and_then(|t| {
            variants
                .iter()
                .find(|(lang, _)| lang.as_deref() == Some(t))
        })
        .map(|(_, rid)| *rid)
        .unwrap_or(variants[0].1);
    if selected == *id {
        return false;
    }
    *id = selected;
    registry.register_consumer(selected, fragment.as_ref(), slice.id);
    true
}

fn scaled_size(natural: Size, viewport: Size, fit: Fit) -> Size {
    if natural.width <= 0.0 || natural.height <= 0.0 {
        return viewport;
    }
    let sx = viewport.width / natural.width;
    let sy = viewport.height / natural.height;
    let scale = match fit {
        Fit::Contain => sx.min(sy),
        Fit::Cover => sx.max(sy),
        Fit::Width => sx,
        Fit::Height => sy,
    };
    Size::new(natural.width * scale, natural.height * scale)
}

/// Assign link objects to pages for a reading mode.
///
/// Double mode pairs adjacent links whose page sides complement each other in
/// physical order (left then right for ltr, mirrored for rtl); a center-sided
/// link always stands alone.
fn group_links(
    links: &[LinkObject],
    mode: ReadingMode,
    direction: ReadingDirection,
) -> Vec<Vec<&LinkObject>> {
    match mode {
        ReadingMode::Scroll => vec![links.iter().collect()],
        ReadingMode::Single | ReadingMode::Guided => {
            links.iter().map(|link| vec![link]).collect()
        }
        ReadingMode::Double => {
            let (first, second) = if direction == ReadingDirection::Rtl {
                (PageSide::Right, PageSide::Left)
            } else {
                (PageSide::Left, PageSide::Right)
            };
            let mut pages = Vec::new();
            let mut i = 0;
            while i < links.len() {
                let link = &links[i];
                if link.page_side == first
                    && links
                        .get(i + 1)
                        .is_some_and(|next| next.page_side == second)
                {
                    pages.push(vec![link, &links[i + 1]]);
                    i += 2;
                } else {
                    pages.push(vec![link]);
                    i += 1;
                }
            }
            pages
        }
    }
}

fn build_segment(
    link: &LinkObject,
    page_index: usize,
    page_segment_index: usize,
    segment_index: usize,
    metadata: &Metadata,
    registry: &mut ResourceRegistry,
    ids: &mut SliceIdAllocator,
) -> Segment {
    let parent_role = if !link.layers.is_empty() {
        SliceRole::LayersParent
    } else if matches!(link.slice.content, SliceContent::Empty) {
        SliceRole::Empty
    } else {
        SliceRole::Standard
    };
    let parent = build_slice(
        &link.slice,
        parent_role,
        link.animations.clone(),
        page_index,
        page_segment_index,
        segment_index,
        metadata,
        registry,
        ids,
    );

    let layers = link
        .layers
        .iter()
        .map(|descriptor| {
            build_layer(
                descriptor,
                page_index,
                page_segment_index,
                segment_index,
                metadata,
                registry,
                ids,
            )
        })
        .collect();

    let sounds = link
        .sounds
        .iter()
        .map(|sound| {
            let id = registry.get_or_create_id(&sound.spec);
            if let Some(id) = id {
                registry.register_consumer(id, None, parent.id);
            }
            (sound.clone(), id)
        })
        .collect();

    Segment {
        segment_index,
        page_segment_index,
        parent,
        layers,
        snap_points: link.snap_points.clone(),
        sounds,
        size: Size::ZERO,
    }
}

fn build_layer(
    descriptor: &LayerDescriptor,
    page_index: usize,
    page_segment_index: usize,
    segment_index: usize,
    metadata: &Metadata,
    registry: &mut ResourceRegistry,
    ids: &mut SliceIdAllocator,
) -> SegmentLayer {
    SegmentLayer {
        slice: build_slice(
            &descriptor.slice,
            SliceRole::LayersChild,
            Vec::new(),
            page_index,
            page_segment_index,
            segment_index,
            metadata,
            registry,
            ids,
        ),
        entry_forward: descriptor.entry_forward.clone(),
        exit_forward: descriptor.exit_forward.clone(),
        entry_backward: descriptor.entry_backward.clone(),
        exit_backward: descriptor.exit_backward.clone(),
    }
}

#[allow(clippy::too_many_arguments)]
fn build_slice(
    descriptor: &SliceDescriptor,
    role: SliceRole,
    animations: Vec<AnimationDescriptor>,
    page_index: usize,
    page_segment_index: usize,
    segment_index: usize,
    metadata: &Metadata,
    registry: &mut ResourceRegistry,
    ids: &mut SliceIdAllocator,
) -> Slice {
    let id = ids.next();
    let resources = match &descriptor.content {
        SliceContent::Resource { primary, alternates } => {
            register_variants(primary, alternates, id, registry)
        }
        SliceContent::Sequence { frames, duration_ms } => {
            let frame_ids: Vec<ResourceId> = frames
                .iter()
                .filter_map(|spec| {
                    let rid = registry.get_or_create_id(spec)?;
                    registry.register_consumer(rid, None, id);
                    Some(rid)
                })
                .collect();
            if frame_ids.is_empty() {
                SliceResources::None
            } else {
                SliceResources::Sequence {
                    ids: frame_ids,
                    duration_ms: *duration_ms,
                }
            }
        }
        SliceContent::Text { text, style } => SliceResources::Text {
            text: text.clone(),
            style: style.clone(),
        },
        SliceContent::Empty => SliceResources::None,
    };

    Slice {
        id,
        role,
        resources,
        fit: descriptor.fit.unwrap_or(metadata.fit),
        clipped: descriptor.clipped.unwrap_or(metadata.clipped),
        h_align: descriptor.h_align.unwrap_or(metadata.h_align),
        v_align: descriptor.v_align.unwrap_or(metadata.v_align),
        width: descriptor.width,
        height: descriptor.height,
        background_color: descriptor.background_color.clone(),
        animations,
        page_index,
        page_segment_index,
        segment_index,
    }
}

fn register_variants(
    primary: &ResourceSpec,
    alternates: &[ResourceSpec],
    slice: SliceId,
    registry: &mut ResourceRegistry,
) -> SliceResources {
    let Some(primary_id) = registry.get_or_create_id(primary) else {
        return SliceResources::None;
    };
    registry.register_consumer(primary_id, primary.fragment.as_ref(), slice);

    let mut variants = vec![(primary.language.clone(), primary_id)];
    for alt in alternates {
        if let Some(alt_id) = registry.get_or_create_id(alt) {
            variants.push((alt.language.clone(), alt_id));
        }
    }
    SliceResources::Single {
        id: primary_id,
        fragment: primary.fragment,
        variants,
    }
}
