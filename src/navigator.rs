//! Page navigation: discrete page states composed with continuous in-page
//! camera movement.
//!
//! Discontinuous input (tap, swipe, key) bubbles innermost-first: the current
//! segment's layer stack, then the page camera's snap points, then a page
//! change. Continuous input goes to the camera first and only falls through
//! to a controlled page transition when the camera reports no space to move.
//! A change already in progress absorbs same-direction input (forced to
//! finish) and cancels on opposite-direction input.

use std::collections::{BTreeMap, HashSet};

use kurbo::{Size, Vec2};

use crate::{
    camera::{Camera, SegmentGeometry},
    geom::PIXEL_EPSILON,
    loader::{FetchSpec, LoadScheduler, TaskKey},
    model::{HalfTransition, LoadingMode, Metadata, PointDescriptor, Transition, ViewportAnchor},
    resources::{ResourceId, ResourceRegistry},
    scene::{Page, SceneGraph, Segment, SegmentLayer},
    surface::ResourceFetcher,
    transition::{StateEffects, StateHandler, TransitionSide},
};

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ReadingMode {
    Scroll,
    Single,
    Double,
    Guided,
}

impl ReadingMode {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "scroll" => Some(Self::Scroll),
            "single" => Some(Self::Single),
            "double" => Some(Self::Double),
            "guided" => Some(Self::Guided),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Scroll => "scroll",
            Self::Single => "single",
            Self::Double => "double",
            Self::Guided => "guided",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Handled {
    Handled,
    NotHandled,
}

impl Handled {
    pub fn is_handled(self) -> bool {
        self == Self::Handled
    }
}

/// Fixed bubbling contract for discontinuous input: try self, then the
/// innermost child, then the own handler.
pub trait NavigationNode {
    fn attempt_forward(&mut self, ctx: &mut LoadContext<'_>) -> Handled;
    fn attempt_backward(&mut self, ctx: &mut LoadContext<'_>) -> Handled;
}

/// Everything a navigation operation needs to schedule loads.
pub struct LoadContext<'a> {
    pub scheduler: &'a mut LoadScheduler,
    pub registry: &'a mut ResourceRegistry,
    pub fetcher: &'a mut dyn ResourceFetcher,
    pub now_ms: u64,
}

#[derive(Clone, Copy, Debug)]
pub struct NavigatorOptions {
    pub loading_mode: LoadingMode,
    /// Units kept loaded ahead of the target; `None` keeps the whole story.
    pub max_units_after: Option<usize>,
    pub allows_destroy: bool,
    pub paginated: bool,
    pub sticky: bool,
    pub grid_based: bool,
}

impl NavigatorOptions {
    pub fn from_metadata(metadata: &Metadata, max_units_after: Option<usize>) -> Self {
        Self {
            loading_mode: metadata.loading_mode,
            max_units_after,
            allows_destroy: metadata.allows_destroy,
            paginated: metadata.overflow == crate::model::Overflow::Paginated,
            sticky: metadata.is_pagination_sticky,
            grid_based: metadata.is_pagination_grid_based,
        }
    }
}

/// Mount/alpha/offset state of one layer, read by the host to drive its
/// compositor nodes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayerVisual {
    pub mounted: bool,
    pub alpha: f64,
    pub offset: Vec2,
}

impl Default for LayerVisual {
    fn default() -> Self {
        Self {
            mounted: false,
            alpha: 1.0,
            offset: Vec2::ZERO,
        }
    }
}

/// State of a live drag gesture.
#[derive(Clone, Copy, Debug, Default)]
struct Drag {
    anchor_progress: Option<f64>,
    /// Signed gesture percent while a controlled page transition runs.
    controlled_percent: f64,
    controlled: bool,
    controlled_forward: bool,
}

pub struct PageNavigator {
    mode: ReadingMode,
    scene: SceneGraph,
    options: NavigatorOptions,
    page_handler: StateHandler,
    page_visuals: Vec<LayerVisual>,
    /// One camera per page, keyed by page index.
    cameras: Vec<Camera>,
    /// Layered segments' state machines, keyed by absolute segment index.
    segment_handlers: BTreeMap<usize, StateHandler>,
    segment_visuals: BTreeMap<usize, Vec<LayerVisual>>,
    page_first_segments: Vec<usize>,
    current_page: usize,
    /// Direction of the in-flight page change, for absorb/cancel decisions.
    transition_forward: bool,
    segment_range: Option<(usize, usize)>,
    drag: Drag,
}

impl PageNavigator {
    pub fn new(scene: SceneGraph, metadata: &Metadata, options: NavigatorOptions) -> Self {
        let viewport = scene.viewport();
        let cameras = scene
            .pages
            .iter()
            .map(|page| build_camera(page, viewport, metadata, &options))
            .collect();

        let mut page_first_segments = Vec::with_capacity(scene.pages.len());
        let mut first = 0usize;
        for page in &scene.pages {
            page_first_segments.push(first);
            first += page.segments.len();
        }

        let mut segment_handlers = BTreeMap::new();
        let mut segment_visuals = BTreeMap::new();
        for page in &scene.pages {
            for segment in &page.segments {
                if segment.is_layered() {
                    segment_handlers.insert(
                        segment.segment_index,
                        StateHandler::new(segment.layer_count(), true),
                    );
                    segment_visuals.insert(
                        segment.segment_index,
                        vec![LayerVisual::default(); segment.layer_count()],
                    );
                }
            }
        }

        let nb_pages = scene.pages.len();
        Self {
            mode: scene.mode,
            options,
            page_handler: StateHandler::new(nb_pages, false),
            page_visuals: vec![LayerVisual::default(); nb_pages],
            cameras,
            segment_handlers,
            segment_visuals,
            page_first_segments,
            scene,
            current_page: 0,
            transition_forward: true,
            segment_range: None,
            drag: Drag::default(),
        }
    }

    pub fn mode(&self) -> ReadingMode {
        self.mode
    }

    pub fn scene(&self) -> &SceneGraph {
        &self.scene
    }

    pub fn nb_of_pages(&self) -> usize {
        self.scene.nb_of_pages()
    }

    pub fn nb_of_segments(&self) -> usize {
        self.scene.nb_of_segments()
    }

    pub fn current_page_index(&self) -> usize {
        self.current_page
    }

    pub fn page_visual(&self, page: usize) -> Option<LayerVisual> {
        self.page_visuals.get(page).copied()
    }

    pub fn segment_layer_visuals(&self, segment: usize) -> Option<&[LayerVisual]> {
        self.segment_visuals.get(&segment).map(Vec::as_slice)
    }

    pub fn camera(&self) -> &Camera {
        &self.cameras[self.current_page]
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.cameras[self.current_page]
    }

    pub fn progress(&self) -> Option<f64> {
        self.camera().progress()
    }

    pub fn segment_range(&self) -> Option<(usize, usize)> {
        self.segment_range
    }

    /// Absolute index of the segment nearest the viewport center.
    pub fn current_segment_index(&self) -> usize {
        let first = self.page_first_segments[self.current_page];
        let in_page = self
            .camera()
            .virtual_point()
            .map(|vp| vp.page_segment_index)
            .unwrap_or(0);
        first + in_page
    }

    /// Mount the first page and queue the initial load window.
    #[tracing::instrument(skip_all)]
    pub fn start(&mut self, ctx: &mut LoadContext<'_>) {
        let mut fx = PageEffects {
            viewport: self.scene.viewport(),
            pages: &self.scene.pages,
            visuals: &mut self.page_visuals,
            source: None,
            target: 0,
        };
        self.page_handler.go_to_state(0, true, true, false, &mut fx);

        for (segment_index, handler) in &mut self.segment_handlers {
            let Some((page, in_page)) = self.scene.page_of_segment(*segment_index) else {
                continue;
            };
            let segment = &self.scene.pages[page].segments[in_page];
            let Some(visuals) = self.segment_visuals.get_mut(segment_index) else {
                continue;
            };
            let mut fx = SegmentEffects {
                viewport: self.scene.viewport(),
                segment,
                visuals,
            };
            handler.go_to_state(0, true, true, false, &mut fx);
        }

        self.update_load_targets(ctx);
    }

    // --- discrete navigation -------------------------------------------

    /// Committed page change. Forward entries land at progress 0, backward
    /// entries at progress 1.
    pub fn go_to_page(
        &mut self,
        target: usize,
        forward: bool,
        skip_transition: bool,
        ctx: &mut LoadContext<'_>,
    ) -> bool {
        if self.page_handler.is_transitioning() {
            return false;
        }
        let mut fx = PageEffects {
            viewport: self.scene.viewport(),
            pages: &self.scene.pages,
            visuals: &mut self.page_visuals,
            source: self.page_handler.state_index(),
            target,
        };
        if !self
            .page_handler
            .go_to_state(target, forward, skip_transition, false, &mut fx)
        {
            return false;
        }
        self.finish_page_entry(target, forward, ctx);
        true
    }

    fn finish_page_entry(&mut self, target: usize, forward: bool, ctx: &mut LoadContext<'_>) {
        self.current_page = target;
        self.transition_forward = forward;
        let camera = &mut self.cameras[target];
        if camera.progress().is_some() {
            camera.set_progress(if forward { 0.0 } else { 1.0 });
        }
        tracing::debug!(page = target, forward, "page change");
        self.update_load_targets(ctx);
    }

    /// Center a segment (locator or index jump), switching pages as needed.
    pub fn go_to_segment(&mut self, segment_index: usize, ctx: &mut LoadContext<'_>) -> bool {
        let Some((page, in_page)) = self.scene.page_of_segment(segment_index) else {
            return false;
        };
        let forward = page >= self.current_page;
        if page != self.current_page && !self.go_to_page(page, forward, true, ctx) {
            return false;
        }
        let camera = &mut self.cameras[page];
        if camera.progress().is_some() {
            let center = PointDescriptor {
                page_segment_index: Some(in_page),
                viewport: Some(ViewportAnchor::Center),
                x: Some((50.0, crate::fragment::Unit::Percent)),
                y: Some((50.0, crate::fragment::Unit::Percent)),
            };
            if let Some(p) = camera.point_progress(&center) {
                camera.set_progress(p);
            }
        }
        self.update_load_targets(ctx);
        true
    }

    pub fn set_percent_in_page(&mut self, percent: f64, ctx: &mut LoadContext<'_>) {
        let camera = &mut self.cameras[self.current_page];
        if camera.progress().is_some() {
            camera.set_progress(percent.clamp(0.0, 1.0));
            self.update_load_targets(ctx);
        }
    }

    fn attempt(&mut self, forward: bool, ctx: &mut LoadContext<'_>) -> Handled {
        // A change in flight absorbs same-direction input and cancels on
        // opposite-direction input.
        if self.page_handler.is_transitioning() {
            if self.page_handler.is_controlled() {
                let percent = if forward == self.transition_forward {
                    1.0
                } else {
                    0.0
                };
                self.end_controlled_page_transition(percent, ctx);
            } else {
                let mut fx = PageEffects {
                    viewport: self.scene.viewport(),
                    pages: &self.scene.pages,
                    visuals: &mut self.page_visuals,
                    source: None,
                    target: self.current_page,
                };
                self.page_handler.force_end(&mut fx);
            }
            return Handled::Handled;
        }

        // Innermost first: the current segment's layer stack.
        if self.attempt_segment_layers(forward).is_handled() {
            return Handled::Handled;
        }

        // Then in-page camera movement between snap points.
        if self.attempt_camera_step(forward, ctx).is_handled() {
            return Handled::Handled;
        }

        // Finally the page handler.
        let target = if forward {
            self.current_page + 1
        } else {
            match self.current_page.checked_sub(1) {
                Some(t) => t,
                None => return Handled::NotHandled,
            }
        };
        if target >= self.nb_of_pages() {
            return Handled::NotHandled;
        }
        if self.go_to_page(target, forward, false, ctx) {
            Handled::Handled
        } else {
            Handled::NotHandled
        }
    }

    fn attempt_segment_layers(&mut self, forward: bool) -> Handled {
        let segment_index = self.current_segment_index();
        let Some(handler) = self.segment_handlers.get_mut(&segment_index) else {
            return Handled::NotHandled;
        };
        if handler.is_transitioning() {
            return Handled::NotHandled;
        }
        let current = handler.state_index().unwrap_or(0);
        let target = if forward {
            if current + 1 >= handler.nb_states() {
                return Handled::NotHandled;
            }
            current + 1
        } else {
            match current.checked_sub(1) {
                Some(t) => t,
                None => return Handled::NotHandled,
            }
        };

        let Some((page, in_page)) = self.scene.page_of_segment(segment_index) else {
            return Handled::NotHandled;
        };
        let segment = &self.scene.pages[page].segments[in_page];
        let Some(visuals) = self.segment_visuals.get_mut(&segment_index) else {
            return Handled::NotHandled;
        };
        let mut fx = SegmentEffects {
            viewport: self.scene.viewport(),
            segment,
            visuals,
        };
        if handler.go_to_state(target, forward, false, false, &mut fx) {
            Handled::Handled
        } else {
            Handled::NotHandled
        }
    }

    fn attempt_camera_step(&mut self, forward: bool, ctx: &mut LoadContext<'_>) -> Handled {
        let camera = &mut self.cameras[self.current_page];
        let Some(progress) = camera.progress() else {
            return Handled::NotHandled;
        };
        let eps = PIXEL_EPSILON / 10_000.0;
        let target = if forward {
            camera.next_snap_point_progress(progress, None)
        } else {
            camera.previous_snap_point_progress(progress, None)
        };
        match target {
            Some(t) if (t - progress).abs() > eps => {
                camera.start_snap_scroll(t, ctx.now_ms);
                Handled::Handled
            }
            _ => Handled::NotHandled,
        }
    }

    // --- continuous input ------------------------------------------------

    /// Continuous drag/wheel delta in camera pixels. The camera consumes what
    /// it can; leftover primary-axis movement falls through to a controlled
    /// page transition when pagination allows one.
    pub fn scroll_by(&mut self, delta: Vec2, ctx: &mut LoadContext<'_>) -> Handled {
        let axis = self.scene.axis();
        let sign = self.scene.direction.sign();
        let primary = axis.coord(delta.to_point());

        if self.page_handler.is_controlled() {
            let viewport_len = axis.of(self.scene.viewport());
            self.drag.controlled_percent += primary * sign / viewport_len;
            let percent = self.drag.controlled_percent;
            let mut fx = PageEffects {
                viewport: self.scene.viewport(),
                pages: &self.scene.pages,
                visuals: &mut self.page_visuals,
                source: None,
                target: self.current_page,
            };
            self.page_handler.go_to_intermediate_state(percent, &mut fx);
            return Handled::Handled;
        }

        let camera = &mut self.cameras[self.current_page];
        if self.drag.anchor_progress.is_none() {
            self.drag.anchor_progress = camera.progress();
        }
        let consumed = camera.move_by(delta);
        let consumed_primary = axis.coord(consumed.to_point());
        if consumed_primary != 0.0 {
            self.update_load_targets(ctx);
            return Handled::Handled;
        }
        if primary == 0.0 {
            return Handled::NotHandled;
        }

        // No space left: offer a controlled page transition.
        let forward = primary * sign > 0.0;
        let target = if forward {
            self.current_page + 1
        } else {
            match self.current_page.checked_sub(1) {
                Some(t) => t,
                None => return Handled::NotHandled,
            }
        };
        if target >= self.nb_of_pages() {
            return Handled::NotHandled;
        }
        let mut fx = PageEffects {
            viewport: self.scene.viewport(),
            pages: &self.scene.pages,
            visuals: &mut self.page_visuals,
            source: Some(self.current_page),
            target,
        };
        if self
            .page_handler
            .go_to_state(target, forward, false, true, &mut fx)
        {
            self.drag.controlled = true;
            self.drag.controlled_forward = forward;
            self.transition_forward = forward;
            // The initiating delta already counts toward the gesture percent.
            let viewport_len = axis.of(self.scene.viewport());
            self.drag.controlled_percent = primary * sign / viewport_len;
            let percent = self.drag.controlled_percent;
            let mut fx = PageEffects {
                viewport: self.scene.viewport(),
                pages: &self.scene.pages,
                visuals: &mut self.page_visuals,
                source: Some(self.current_page),
                target,
            };
            self.page_handler.go_to_intermediate_state(percent, &mut fx);
            Handled::Handled
        } else {
            Handled::NotHandled
        }
    }

    /// Gesture release. Commits/cancels a controlled page transition at the
    /// half-viewport threshold, snaps in sticky pagination, or starts kinetic
    /// decay.
    pub fn end_scroll(&mut self, velocity: Vec2, ctx: &mut LoadContext<'_>) {
        if self.page_handler.is_controlled() {
            let percent = self.drag.controlled_percent;
            self.end_controlled_page_transition(percent, ctx);
            return;
        }

        let axis = self.scene.axis();
        let sign = self.scene.direction.sign();
        let camera = &mut self.cameras[self.current_page];
        let anchor = self.drag.anchor_progress.take();

        if camera.is_paginated() && camera.is_pagination_sticky() {
            if let Some(progress) = camera.progress() {
                let v = axis.coord(velocity.to_point()) * sign;
                let target = if v > 0.05 {
                    camera.next_snap_point_progress(progress, anchor)
                } else if v < -0.05 {
                    camera.previous_snap_point_progress(progress, anchor)
                } else {
                    // Nearest of the two candidates around the release point.
                    let next = camera.next_snap_point_progress(progress, anchor);
                    let prev = camera.previous_snap_point_progress(progress, anchor);
                    match (next, prev) {
                        (Some(n), Some(p)) => {
                            Some(if n - progress <= progress - p { n } else { p })
                        }
                        (n, p) => n.or(p),
                    }
                };
                if let Some(t) = target {
                    camera.start_snap_scroll(t, ctx.now_ms);
                }
                return;
            }
        }
        if velocity.x != 0.0 || velocity.y != 0.0 {
            camera.start_kinetic_scroll(velocity, ctx.now_ms);
        }
    }

    fn end_controlled_page_transition(&mut self, signed_percent: f64, ctx: &mut LoadContext<'_>) {
        let forward = self.drag.controlled_forward;
        let mut fx = PageEffects {
            viewport: self.scene.viewport(),
            pages: &self.scene.pages,
            visuals: &mut self.page_visuals,
            source: Some(self.current_page),
            target: self.page_handler.state_index().unwrap_or(self.current_page),
        };
        let committed = self
            .page_handler
            .end_controlled_transition(signed_percent, &mut fx);
        self.drag = Drag::default();
        if committed {
            let target = self
                .page_handler
                .state_index()
                .unwrap_or(self.current_page);
            self.finish_page_entry(target, forward, ctx);
        }
    }

    /// Settle the running page transition early. This is how the host
    /// reports the natural end of a duration-less animation transition's
    /// media; it is a no-op mid-gesture or when nothing is running.
    pub fn finish_page_transition(&mut self) {
        if !self.page_handler.is_transitioning() || self.page_handler.is_controlled() {
            return;
        }
        let mut fx = PageEffects {
            viewport: self.scene.viewport(),
            pages: &self.scene.pages,
            visuals: &mut self.page_visuals,
            source: None,
            target: self.current_page,
        };
        self.page_handler.force_end(&mut fx);
    }

    // --- per-frame update -----------------------------------------------

    pub fn tick(&mut self, ctx: &mut LoadContext<'_>) {
        let moved = self.cameras[self.current_page].tick(ctx.now_ms);
        if moved {
            self.update_load_targets(ctx);
        }

        let mut fx = PageEffects {
            viewport: self.scene.viewport(),
            pages: &self.scene.pages,
            visuals: &mut self.page_visuals,
            source: None,
            target: self.current_page,
        };
        self.page_handler.tick(ctx.now_ms, &mut fx);

        for (segment_index, handler) in &mut self.segment_handlers {
            if !handler.is_transitioning() {
                continue;
            }
            let Some((page, in_page)) = self.scene.page_of_segment(*segment_index) else {
                continue;
            };
            let segment = &self.scene.pages[page].segments[in_page];
            let Some(visuals) = self.segment_visuals.get_mut(segment_index) else {
                continue;
            };
            let mut fx = SegmentEffects {
                viewport: self.scene.viewport(),
                segment,
                visuals,
            };
            handler.tick(ctx.now_ms, &mut fx);
        }
    }

    /// Synchronously settle every animation, then re-run layout against a new
    /// viewport.
    pub fn resize(&mut self, viewport: Size, ctx: &mut LoadContext<'_>) {
        for camera in &mut self.cameras {
            camera.force_end_auto_scroll();
        }
        let mut fx = PageEffects {
            viewport: self.scene.viewport(),
            pages: &self.scene.pages,
            visuals: &mut self.page_visuals,
            source: None,
            target: self.current_page,
        };
        self.page_handler.force_end(&mut fx);

        self.scene.resize(viewport, ctx.registry);
        for (index, page) in self.scene.pages.iter().enumerate() {
            relayout_camera(&mut self.cameras[index], page, viewport);
        }
        self.update_load_targets(ctx);
    }

    // --- load scheduling ------------------------------------------------

    /// Recompute the segment window around the current target, queue loads
    /// for newly-in-range segments, then (only afterwards) destroy resources
    /// that fell out of range. Loads always precede destroys so a shared
    /// resource is never freed and refetched across one range move.
    pub fn update_load_targets(&mut self, ctx: &mut LoadContext<'_>) {
        let target_segment = self.current_segment_index();
        let new_range = self.desired_range(target_segment);
        let old_range = self.segment_range;

        if old_range != Some(new_range) {
            for segment_index in new_range.0..=new_range.1 {
                if old_range.is_some_and(|(s, e)| (s..=e).contains(&segment_index)) {
                    continue;
                }
                self.queue_segment_loads(segment_index, ctx);
            }
            self.segment_range = Some(new_range);
        }

        ctx.scheduler.update_priorities(
            self.current_page,
            target_segment,
            ctx.registry,
            ctx.fetcher,
            ctx.now_ms,
        );

        if let Some((old_start, old_end)) = old_range {
            if self.options.allows_destroy {
                for segment_index in old_start..=old_end {
                    if (new_range.0..=new_range.1).contains(&segment_index) {
                        continue;
                    }
                    self.destroy_segment_resources(segment_index, ctx);
                }
            }
        }
    }

    fn desired_range(&self, target_segment: usize) -> (usize, usize) {
        let last = self.scene.nb_of_segments().saturating_sub(1);
        let Some(after) = self.options.max_units_after else {
            return (0, last);
        };
        let before = after.div_ceil(3);

        match self.options.loading_mode {
            LoadingMode::Segment => (
                target_segment.saturating_sub(before),
                (target_segment + after).min(last),
            ),
            LoadingMode::Page => {
                let page = self.current_page;
                let first_page = page.saturating_sub(before);
                let last_page = (page + after).min(self.nb_of_pages() - 1);
                let start = self.page_first_segments[first_page];
                let end = self.page_first_segments[last_page]
                    + self.scene.pages[last_page].segments.len()
                    - 1;
                (start, end.min(last))
            }
        }
    }

    fn queue_segment_loads(&self, segment_index: usize, ctx: &mut LoadContext<'_>) {
        let Some((page_index, in_page)) = self.scene.page_of_segment(segment_index) else {
            return;
        };
        let page = &self.scene.pages[page_index];
        let segment = &page.segments[in_page];

        for unit in segment.loading_units() {
            self.queue_unit(&unit, page_index, segment_index, ctx);
        }
        for (_, sound_id) in &segment.sounds {
            if let Some(id) = sound_id {
                self.queue_unit(&[*id], page_index, segment_index, ctx);
            }
        }
        // Page-boundary extras ride along with the page's first segment.
        if in_page == 0 && !page.transition_resources.is_empty() {
            self.queue_unit(&page.transition_resources, page_index, segment_index, ctx);
        }
    }

    fn queue_unit(
        &self,
        unit: &[ResourceId],
        page_index: usize,
        segment_index: usize,
        ctx: &mut LoadContext<'_>,
    ) {
        let Some(first) = unit.first() else {
            return;
        };
        let fetches: Vec<FetchSpec> = unit
            .iter()
            .filter_map(|id| {
                let resource = ctx.registry.get(*id)?;
                Some(FetchSpec {
                    resource: *id,
                    kind: resource.kind,
                    path: resource.path.clone(),
                })
            })
            .collect();
        ctx.scheduler.add_task(
            TaskKey(*first),
            page_index,
            segment_index,
            fetches,
            None,
            ctx.registry,
            ctx.fetcher,
            ctx.now_ms,
        );
    }

    fn destroy_segment_resources(&self, segment_index: usize, ctx: &mut LoadContext<'_>) {
        let Some((page_index, in_page)) = self.scene.page_of_segment(segment_index) else {
            return;
        };
        let segment = &self.scene.pages[page_index].segments[in_page];

        let mut ids: HashSet<ResourceId> = HashSet::new();
        for unit in segment.loading_units() {
            if let Some(first) = unit.first() {
                ctx.scheduler
                    .kill_task(TaskKey(*first), ctx.registry, ctx.fetcher);
            }
            ids.extend(unit);
        }
        for (_, sound_id) in &segment.sounds {
            if let Some(id) = sound_id {
                ctx.scheduler.kill_task(TaskKey(*id), ctx.registry, ctx.fetcher);
                ids.insert(*id);
            }
        }

        let scene = &self.scene;
        let range = self.segment_range;
        let is_active = |slice: crate::scene::SliceId| -> bool {
            scene
                .owner_of_slice(slice)
                .zip(range)
                .is_some_and(|(owner, (start, end))| (start..=end).contains(&owner))
        };
        for id in ids {
            ctx.registry.destroy_if_unused(id, false, &is_active);
        }
    }

    /// Re-select resource variants for a tag (language or resolution) and
    /// re-queue loads for every slice whose variant changed.
    pub fn select_tag(&mut self, tag: Option<&str>, ctx: &mut LoadContext<'_>) {
        let changed = self.scene.select_tag(tag, ctx.registry);
        if changed.is_empty() {
            return;
        }
        if let Some((start, end)) = self.segment_range {
            for segment_index in start..=end {
                self.queue_segment_loads(segment_index, ctx);
            }
            ctx.scheduler.update_priorities(
                self.current_page,
                self.current_segment_index(),
                ctx.registry,
                ctx.fetcher,
                ctx.now_ms,
            );
        }
    }

    /// Tear down before a navigator switch or shutdown: kill remaining tasks
    /// and force-destroy everything this scene registered.
    pub fn shutdown(&mut self, ctx: &mut LoadContext<'_>) {
        for page in &self.scene.pages {
            for segment in &page.segments {
                for unit in segment.loading_units() {
                    if let Some(first) = unit.first() {
                        ctx.scheduler
                            .kill_task(TaskKey(*first), ctx.registry, ctx.fetcher);
                    }
                    for id in unit {
                        ctx.registry.destroy_if_unused(id, true, &|_| false);
                    }
                }
            }
        }
        self.segment_range = None;
    }
}

impl NavigationNode for PageNavigator {
    fn attempt_forward(&mut self, ctx: &mut LoadContext<'_>) -> Handled {
        self.attempt(true, ctx)
    }

    fn attempt_backward(&mut self, ctx: &mut LoadContext<'_>) -> Handled {
        self.attempt(false, ctx)
    }
}

fn build_camera(
    page: &Page,
    viewport: Size,
    metadata: &Metadata,
    options: &NavigatorOptions,
) -> Camera {
    let mut camera = Camera::new(
        metadata.direction,
        options.paginated,
        options.sticky,
        options.grid_based,
        metadata.h_align,
        metadata.v_align,
    );
    relayout_camera(&mut camera, page, viewport);
    camera
}

fn relayout_camera(camera: &mut Camera, page: &Page, viewport: Size) {
    let axis = camera.axis();
    let geometries: Vec<SegmentGeometry> = page
        .segments
        .iter()
        .enumerate()
        .map(|(i, segment)| SegmentGeometry {
            offset: page.segment_offset(i, axis),
            length: axis.of(segment.size),
        })
        .collect();
    // Snap points without an explicit segment bind to their declaring one.
    let snap_points: Vec<PointDescriptor> = page
        .segments
        .iter()
        .flat_map(|segment: &Segment| {
            segment.snap_points.iter().map(|point| PointDescriptor {
                page_segment_index: Some(
                    point.page_segment_index.unwrap_or(segment.page_segment_index),
                ),
                ..point.clone()
            })
        })
        .collect();
    camera.set_layout(viewport, page.size, geometries, &snap_points);
}

/// Binds the page-level state machine to page visuals and the pages' full
/// transition descriptors.
struct PageEffects<'a> {
    viewport: Size,
    pages: &'a [Page],
    visuals: &'a mut [LayerVisual],
    source: Option<usize>,
    target: usize,
}

impl PageEffects<'_> {
    fn boundary_transition(&self, forward: bool) -> Option<&Transition> {
        if forward {
            self.pages.get(self.target)?.transition_forward.as_ref()
        } else {
            self.pages.get(self.source?)?.transition_backward.as_ref()
        }
    }
}

impl StateEffects for PageEffects<'_> {
    fn viewport(&self) -> Size {
        self.viewport
    }

    fn half_transition(
        &mut self,
        _layer: usize,
        side: TransitionSide,
        forward: bool,
    ) -> Option<HalfTransition> {
        let (exit, entry) = self.boundary_transition(forward)?.halves();
        match side {
            TransitionSide::Exit => exit,
            TransitionSide::Entry => entry,
        }
    }

    fn is_controllable(&mut self, _layer: usize, _side: TransitionSide, forward: bool) -> bool {
        self.boundary_transition(forward)
            .is_some_and(|t| t.controllable)
    }

    fn add_layer(&mut self, layer: usize) {
        if let Some(v) = self.visuals.get_mut(layer) {
            v.mounted = true;
        }
    }

    fn remove_layer(&mut self, layer: usize) {
        if let Some(v) = self.visuals.get_mut(layer) {
            v.mounted = false;
        }
    }

    fn set_alpha(&mut self, layer: usize, alpha: f64) {
        if let Some(v) = self.visuals.get_mut(layer) {
            v.alpha = alpha;
        }
    }

    fn set_offset(&mut self, layer: usize, dx: f64, dy: f64) {
        if let Some(v) = self.visuals.get_mut(layer) {
            v.offset = Vec2::new(dx, dy);
        }
    }

    fn finalize_layer(&mut self, layer: usize) {
        if let Some(v) = self.visuals.get_mut(layer) {
            v.alpha = 1.0;
            v.offset = Vec2::ZERO;
        }
    }
}

/// Binds a layered segment's state machine to its per-layer visuals and the
/// authored half-transitions. Handler layer 0 is the parent slice; children
/// start at 1.
struct SegmentEffects<'a> {
    viewport: Size,
    segment: &'a Segment,
    visuals: &'a mut [LayerVisual],
}

impl SegmentEffects<'_> {
    fn child(&self, layer: usize) -> Option<&SegmentLayer> {
        layer.checked_sub(1).and_then(|i| self.segment.layers.get(i))
    }

    fn descriptor(
        &self,
        layer: usize,
        side: TransitionSide,
        forward: bool,
    ) -> Option<&HalfTransition> {
        let child = self.child(layer)?;
        match (side, forward) {
            (TransitionSide::Entry, true) => child.entry_forward.as_ref(),
            (TransitionSide::Entry, false) => child.entry_backward.as_ref(),
            (TransitionSide::Exit, true) => child.exit_forward.as_ref(),
            (TransitionSide::Exit, false) => child.exit_backward.as_ref(),
        }
    }
}

impl StateEffects for SegmentEffects<'_> {
    fn viewport(&self) -> Size {
        self.viewport
    }

    fn half_transition(
        &mut self,
        layer: usize,
        side: TransitionSide,
        forward: bool,
    ) -> Option<HalfTransition> {
        self.descriptor(layer, side, forward).cloned()
    }

    fn is_controllable(&mut self, layer: usize, side: TransitionSide, forward: bool) -> bool {
        self.descriptor(layer, side, forward)
            .is_some_and(|d| d.kind != crate::model::HalfTransitionType::Cut)
    }

    fn add_layer(&mut self, layer: usize) {
        if let Some(v) = self.visuals.get_mut(layer) {
            v.mounted = true;
        }
    }

    fn remove_layer(&mut self, layer: usize) {
        if let Some(v) = self.visuals.get_mut(layer) {
            v.mounted = false;
        }
    }

    fn set_alpha(&mut self, layer: usize, alpha: f64) {
        if let Some(v) = self.visuals.get_mut(layer) {
            v.alpha = alpha;
        }
    }

    fn set_offset(&mut self, layer: usize, dx: f64, dy: f64) {
        if let Some(v) = self.visuals.get_mut(layer) {
            v.offset = Vec2::new(dx, dy);
        }
    }

    fn finalize_layer(&mut self, layer: usize) {
        if let Some(v) = self.visuals.get_mut(layer) {
            v.alpha = 1.0;
            v.offset = Vec2::ZERO;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        loader::SchedulerConfig,
        manifest::Manifest,
        model::ManifestModel,
        resources::LoadStatus,
        scene::SliceIdAllocator,
        surface::NullFetcher,
    };
    use serde_json::{Value, json};
    use std::sync::Arc;

    struct Fixture {
        navigator: PageNavigator,
        scheduler: LoadScheduler,
        registry: ResourceRegistry,
        fetcher: NullFetcher,
    }

    impl Fixture {
        fn new(manifest: Value, mode: ReadingMode, options: Option<NavigatorOptions>) -> Self {
            let manifest = Manifest::from_value(manifest).unwrap();
            let model = ManifestModel::from_manifest(&manifest).unwrap();
            let mut registry = ResourceRegistry::new();
            let mut ids = SliceIdAllocator::new();
            let scene = SceneGraph::build(
                &model,
                mode,
                Size::new(800.0, 600.0),
                &mut registry,
                &mut ids,
            );
            let options = options
                .unwrap_or_else(|| NavigatorOptions::from_metadata(&model.metadata, None));
            let navigator = PageNavigator::new(scene, &model.metadata, options);
            Self {
                navigator,
                scheduler: LoadScheduler::new(SchedulerConfig::default()),
                registry,
                fetcher: NullFetcher::default(),
            }
        }

        fn with_ctx<R>(
            &mut self,
            now_ms: u64,
            f: impl FnOnce(&mut PageNavigator, &mut LoadContext<'_>) -> R,
        ) -> R {
            let mut ctx = LoadContext {
                scheduler: &mut self.scheduler,
                registry: &mut self.registry,
                fetcher: &mut self.fetcher,
                now_ms,
            };
            f(&mut self.navigator, &mut ctx)
        }
    }

    fn images(n: usize) -> Value {
        let order: Vec<Value> = (0..n)
            .map(|i| json!({ "href": format!("img{i}.png"), "width": 800, "height": 600 }))
            .collect();
        json!({ "metadata": { "continuous": true }, "readingOrder": order })
    }

    #[test]
    fn scroll_navigator_is_one_page_of_segments() {
        let mut fx = Fixture::new(images(3), ReadingMode::Scroll, None);
        fx.with_ctx(0, |nav, ctx| nav.start(ctx));
        assert_eq!(fx.navigator.nb_of_pages(), 1);
        assert_eq!(fx.navigator.nb_of_segments(), 3);
        assert!(fx.navigator.page_visual(0).unwrap().mounted);
    }

    #[test]
    fn forward_attempt_steps_snap_then_page() {
        let mut fx = Fixture::new(
            json!({
                "metadata": { "continuous": false, "overflow": "paginated" },
                "readingOrder": [
                    { "href": "a.png", "width": 800, "height": 600 },
                    { "href": "b.png", "width": 800, "height": 600 }
                ]
            }),
            ReadingMode::Single,
            None,
        );
        fx.with_ctx(0, |nav, ctx| nav.start(ctx));
        assert_eq!(fx.navigator.current_page_index(), 0);

        // Page content fits the viewport, so the first forward attempt is a
        // page change.
        let handled = fx.with_ctx(10, |nav, ctx| nav.attempt_forward(ctx));
        assert!(handled.is_handled());
        assert_eq!(fx.navigator.current_page_index(), 1);

        // At the last page, forward is not handled.
        fx.with_ctx(3000, |nav, ctx| nav.tick(ctx));
        let handled = fx.with_ctx(3010, |nav, ctx| nav.attempt_forward(ctx));
        assert!(!handled.is_handled());
    }

    #[test]
    fn backward_from_first_page_is_not_handled() {
        let mut fx = Fixture::new(images(2), ReadingMode::Single, None);
        fx.with_ctx(0, |nav, ctx| nav.start(ctx));
        let handled = fx.with_ctx(1, |nav, ctx| nav.attempt_backward(ctx));
        assert!(!handled.is_handled());
    }

    #[test]
    fn layered_segment_absorbs_input_before_page_change() {
        let mut fx = Fixture::new(
            json!({
                "metadata": { "continuous": false },
                "readingOrder": [
                    {
                        "href": "bg.png", "width": 800, "height": 600,
                        "properties": { "layers": [{ "href": "fg.png" }] }
                    },
                    { "href": "next.png", "width": 800, "height": 600 }
                ]
            }),
            ReadingMode::Single,
            None,
        );
        fx.with_ctx(0, |nav, ctx| nav.start(ctx));

        // First forward reveals the layer, page stays put.
        assert!(fx.with_ctx(10, |nav, ctx| nav.attempt_forward(ctx)).is_handled());
        assert_eq!(fx.navigator.current_page_index(), 0);
        let visuals = fx.navigator.segment_layer_visuals(0).unwrap();
        assert!(visuals[1].mounted);

        // Second forward changes page.
        assert!(fx.with_ctx(20, |nav, ctx| nav.attempt_forward(ctx)).is_handled());
        assert_eq!(fx.navigator.current_page_index(), 1);
    }

    #[test]
    fn overflowing_page_steps_between_snap_points_before_changing_page() {
        // 3 segments of 800px in scroll mode, paginated overflow.
        let mut fx = Fixture::new(
            json!({
                "metadata": { "continuous": true, "overflow": "paginated" },
                "readingOrder": [
                    { "href": "a.png", "width": 800, "height": 600 },
                    { "href": "b.png", "width": 800, "height": 600 },
                    { "href": "c.png", "width": 800, "height": 600 }
                ]
            }),
            ReadingMode::Scroll,
            None,
        );
        fx.with_ctx(0, |nav, ctx| nav.start(ctx));
        assert_eq!(fx.navigator.progress(), Some(0.0));

        assert!(fx.with_ctx(10, |nav, ctx| nav.attempt_forward(ctx)).is_handled());
        // Snap scroll runs to the next grid line (one viewport = half range).
        let mut now = 10;
        while fx.navigator.camera().is_auto_scrolling() {
            now += 16;
            fx.with_ctx(now, |nav, ctx| nav.tick(ctx));
        }
        let p = fx.navigator.progress().unwrap();
        assert!((p - 0.5).abs() < 0.01, "expected half progress, got {p}");
    }

    #[test]
    fn segment_range_scenario_matches_loading_window() {
        let options = NavigatorOptions {
            loading_mode: LoadingMode::Segment,
            max_units_after: Some(3),
            allows_destroy: true,
            paginated: false,
            sticky: true,
            grid_based: true,
        };
        let mut fx = Fixture::new(images(10), ReadingMode::Scroll, Some(options));
        fx.with_ctx(0, |nav, ctx| nav.start(ctx));
        assert_eq!(fx.navigator.segment_range(), Some((0, 3)));

        // Mark segment 0's resource loaded so the destroy is observable.
        let seg0_resource = fx.navigator.scene().segment(0).unwrap().parent.loading_unit()[0];
        fx.registry.set_loaded(
            seg0_resource,
            crate::resources::Texture {
                width: 1,
                height: 1,
                data: Arc::new(vec![0; 4]),
            },
        );

        fx.with_ctx(100, |nav, ctx| {
            nav.go_to_segment(5, ctx);
        });
        assert_eq!(fx.navigator.current_segment_index(), 5);
        assert_eq!(fx.navigator.segment_range(), Some((4, 8)));
        // Segment 0 fell out of range and its resource was destroyed.
        assert_eq!(fx.registry.status(seg0_resource), LoadStatus::NotStarted);
    }

    #[test]
    fn range_moves_issue_loads_for_new_segments() {
        let options = NavigatorOptions {
            loading_mode: LoadingMode::Segment,
            max_units_after: Some(1),
            allows_destroy: false,
            paginated: false,
            sticky: true,
            grid_based: true,
        };
        let mut fx = Fixture::new(images(6), ReadingMode::Scroll, Some(options));
        fx.with_ctx(0, |nav, ctx| nav.start(ctx));
        assert_eq!(fx.navigator.segment_range(), Some((0, 1)));
        let started_before = fx.fetcher.started.len();

        fx.with_ctx(10, |nav, ctx| {
            nav.go_to_segment(3, ctx);
        });
        assert_eq!(fx.navigator.segment_range(), Some((2, 4)));
        assert!(fx.fetcher.started.len() > started_before);
    }

    #[test]
    fn controlled_page_transition_commits_past_half_viewport() {
        let manifest = json!({
            "metadata": { "continuous": false },
            "readingOrder": [
                { "href": "a.png", "width": 800, "height": 600 },
                {
                    "href": "b.png", "width": 800, "height": 600,
                    "properties": {
                        "transitionForward": {
                            "type": "dissolve", "duration": 300, "controlled": true
                        }
                    }
                }
            ]
        });
        let mut fx = Fixture::new(manifest, ReadingMode::Single, None);
        fx.with_ctx(0, |nav, ctx| nav.start(ctx));

        // Page fits, so scrolling falls through to a controlled transition.
        let handled =
            fx.with_ctx(10, |nav, ctx| nav.scroll_by(Vec2::new(480.0, 0.0), ctx));
        assert!(handled.is_handled());
        fx.with_ctx(20, |nav, ctx| nav.scroll_by(Vec2::new(40.0, 0.0), ctx));
        fx.with_ctx(30, |nav, ctx| nav.end_scroll(Vec2::ZERO, ctx));
        assert_eq!(fx.navigator.current_page_index(), 1);
        assert!(fx.navigator.page_visual(1).unwrap().mounted);
        assert!(!fx.navigator.page_visual(0).unwrap().mounted);
    }

    #[test]
    fn controlled_page_transition_cancels_below_half_viewport() {
        let manifest = json!({
            "metadata": { "continuous": false },
            "readingOrder": [
                { "href": "a.png", "width": 800, "height": 600 },
                {
                    "href": "b.png", "width": 800, "height": 600,
                    "properties": {
                        "transitionForward": {
                            "type": "dissolve", "duration": 300, "controlled": true
                        }
                    }
                }
            ]
        });
        let mut fx = Fixture::new(manifest, ReadingMode::Single, None);
        fx.with_ctx(0, |nav, ctx| nav.start(ctx));

        fx.with_ctx(10, |nav, ctx| nav.scroll_by(Vec2::new(100.0, 0.0), ctx));
        fx.with_ctx(20, |nav, ctx| nav.end_scroll(Vec2::ZERO, ctx));
        assert_eq!(fx.navigator.current_page_index(), 0);
        assert!(fx.navigator.page_visual(0).unwrap().mounted);
        assert!(!fx.navigator.page_visual(1).unwrap().mounted);
    }

    #[test]
    fn animation_page_transition_runs_for_its_duration() {
        let manifest = json!({
            "metadata": { "continuous": false },
            "readingOrder": [
                { "href": "a.png", "width": 800, "height": 600 },
                {
                    "href": "b.png", "width": 800, "height": 600,
                    "properties": {
                        "transitionForward": {
                            "type": "animation", "file": "clip.mp4", "duration": 400
                        }
                    }
                }
            ]
        });
        let mut fx = Fixture::new(manifest, ReadingMode::Single, None);
        fx.with_ctx(0, |nav, ctx| nav.start(ctx));

        assert!(fx.with_ctx(10, |nav, ctx| nav.attempt_forward(ctx)).is_handled());
        assert_eq!(fx.navigator.current_page_index(), 1);
        // The media keeps the change in flight; discrete jumps are refused.
        fx.with_ctx(20, |nav, ctx| nav.tick(ctx));
        assert!(!fx.with_ctx(30, |nav, ctx| nav.go_to_page(0, false, true, ctx)));

        fx.with_ctx(500, |nav, ctx| nav.tick(ctx));
        assert!(fx.with_ctx(510, |nav, ctx| nav.go_to_page(0, false, true, ctx)));
    }

    #[test]
    fn duration_less_animation_settles_on_media_end_signal() {
        let manifest = json!({
            "metadata": { "continuous": false },
            "readingOrder": [
                { "href": "a.png", "width": 800, "height": 600 },
                {
                    "href": "b.png", "width": 800, "height": 600,
                    "properties": {
                        "transitionForward": { "type": "animation", "file": "clip.mp4" }
                    }
                }
            ]
        });
        let mut fx = Fixture::new(manifest, ReadingMode::Single, None);
        fx.with_ctx(0, |nav, ctx| nav.start(ctx));

        assert!(fx.with_ctx(10, |nav, ctx| nav.attempt_forward(ctx)).is_handled());
        // No duration: ticking arbitrarily far never settles the change.
        fx.with_ctx(100_000, |nav, ctx| nav.tick(ctx));
        assert!(!fx.with_ctx(100_010, |nav, ctx| nav.go_to_page(0, false, true, ctx)));

        fx.navigator.finish_page_transition();
        assert!(fx.with_ctx(100_020, |nav, ctx| nav.go_to_page(0, false, true, ctx)));
        assert_eq!(fx.navigator.current_page_index(), 0);
    }

    #[test]
    fn scroll_without_transition_does_not_start_controlled_change() {
        let mut fx = Fixture::new(images(2), ReadingMode::Single, None);
        fx.with_ctx(0, |nav, ctx| nav.start(ctx));
        // No controllable transition on the boundary: the gesture is refused.
        let handled =
            fx.with_ctx(10, |nav, ctx| nav.scroll_by(Vec2::new(100.0, 0.0), ctx));
        assert!(!handled.is_handled());
        assert_eq!(fx.navigator.current_page_index(), 0);
    }

    #[test]
    fn resize_settles_in_flight_scrolls_first() {
        let mut fx = Fixture::new(images(4), ReadingMode::Scroll, None);
        fx.with_ctx(0, |nav, ctx| nav.start(ctx));
        fx.with_ctx(5, |nav, ctx| nav.set_percent_in_page(0.0, ctx));
        // Start a snap scroll then resize mid-flight.
        fx.with_ctx(10, |nav, _| {
            nav.cameras[0].start_snap_scroll(1.0, 10);
        });
        fx.with_ctx(20, |nav, ctx| nav.resize(Size::new(800.0, 600.0), ctx));
        assert_eq!(fx.navigator.progress(), Some(1.0));
        assert!(!fx.navigator.camera().is_auto_scrolling());
    }

    #[test]
    fn go_to_segment_crosses_pages() {
        let mut fx = Fixture::new(images(3), ReadingMode::Single, None);
        fx.with_ctx(0, |nav, ctx| nav.start(ctx));
        assert!(fx.with_ctx(10, |nav, ctx| nav.go_to_segment(2, ctx)));
        assert_eq!(fx.navigator.current_page_index(), 2);
        assert_eq!(fx.navigator.current_segment_index(), 2);
    }
}
