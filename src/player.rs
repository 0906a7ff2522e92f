//! Top-level orchestration: manifest opening, navigator construction per
//! reading mode, the host-facing event stream, and the loading-message
//! surface.
//!
//! The player owns the registry, the scheduler, and one active navigator. It
//! is driven entirely by the host: `tick(now_ms)` once per display frame, and
//! `on_fetch_outcome` whenever an asynchronous fetch settles.

use anyhow::Context as _;
use kurbo::{Point, Size, Vec2};
use serde_json::Value;

use crate::{
    error::{DivinaError, DivinaResult},
    fragment::split_href,
    loader::{LoadEvent, LoadScheduler, SchedulerConfig},
    manifest::Manifest,
    model::{Constraint, ManifestModel, Metadata, Spread},
    navigator::{
        Handled, LoadContext, NavigationNode, NavigatorOptions, PageNavigator, ReadingMode,
    },
    resources::ResourceRegistry,
    scene::{SceneGraph, SliceIdAllocator},
    surface::{FetchId, FetchOutcome, ResourceFetcher},
};

#[derive(Clone, Debug, Default)]
pub struct PlayerOptions {
    /// Units (pages or segments, per `loadingMode`) kept loaded ahead of the
    /// reading position. `None` loads the whole story.
    pub max_nb_of_units_to_load_after: Option<usize>,
    /// Preferred language tag; falls back to the manifest's first language.
    pub language: Option<String>,
    /// Initial reading mode; falls back to the first available one.
    pub reading_mode: Option<ReadingMode>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PlayerEvent {
    DataParsing,
    ReadingModesUpdate { modes: Vec<ReadingMode> },
    ReadingModeChange { mode: ReadingMode },
    LanguageChange { language: String },
    PageChange { page_index: usize, nb_of_pages: usize },
    PageLoadStatusUpdate { page_index: usize },
    InPageScroll { progress: Option<f64> },
    InitialLoad,
}

/// Reading position reference, as consumed by [`Player::go_to`].
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct Locator {
    pub href: Option<String>,
    #[serde(default)]
    pub locations: Locations,
    /// Optional reading-mode name riding along with the position.
    pub text: Option<String>,
}

#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct Locations {
    pub position: Option<usize>,
    pub progression: Option<f64>,
    #[serde(rename = "totalProgression")]
    pub total_progression: Option<f64>,
}

/// Full-screen fatal-error text, the only user-visible failure surface.
pub fn fatal_error_text(error: &DivinaError) -> String {
    format!("ERROR!\n{error}")
}

pub struct Player {
    model: ManifestModel,
    options: PlayerOptions,
    registry: ResourceRegistry,
    scheduler: LoadScheduler,
    ids: SliceIdAllocator,
    fetcher: Box<dyn ResourceFetcher>,
    navigator: PageNavigator,
    mode: ReadingMode,
    available_modes: Vec<ReadingMode>,
    viewport: Size,
    language: Option<String>,
    muted: bool,
    initial_loading: bool,
    initial_percent: u32,
    last_page: usize,
    last_progress: Option<f64>,
    events: Vec<PlayerEvent>,
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player").finish_non_exhaustive()
    }
}

impl Player {
    /// Open from a manifest file on disk.
    pub fn open_path(
        path: &str,
        viewport: Size,
        options: PlayerOptions,
        fetcher: Box<dyn ResourceFetcher>,
    ) -> DivinaResult<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading manifest {path}"))?;
        Self::open_json(&json, viewport, options, fetcher)
    }

    pub fn open_json(
        json: &str,
        viewport: Size,
        options: PlayerOptions,
        fetcher: Box<dyn ResourceFetcher>,
    ) -> DivinaResult<Self> {
        let manifest = Manifest::from_json_str(json)?;
        Self::open_manifest(&manifest, viewport, options, fetcher)
    }

    pub fn open_value(
        value: Value,
        viewport: Size,
        options: PlayerOptions,
        fetcher: Box<dyn ResourceFetcher>,
    ) -> DivinaResult<Self> {
        let manifest = Manifest::from_value(value)?;
        Self::open_manifest(&manifest, viewport, options, fetcher)
    }

    #[tracing::instrument(skip_all)]
    fn open_manifest(
        manifest: &Manifest,
        viewport: Size,
        options: PlayerOptions,
        fetcher: Box<dyn ResourceFetcher>,
    ) -> DivinaResult<Self> {
        let mut events = vec![PlayerEvent::DataParsing];
        let model = ManifestModel::from_manifest(manifest)?;
        let metadata = &model.metadata;

        let available_modes = available_reading_modes(&model);
        events.push(PlayerEvent::ReadingModesUpdate {
            modes: available_modes.clone(),
        });
        let mode = options
            .reading_mode
            .filter(|m| available_modes.contains(m))
            .or_else(|| available_modes.first().copied())
            .ok_or_else(|| DivinaError::navigation("no reading mode available"))?;

        let language = options
            .language
            .clone()
            .filter(|l| metadata.languages.contains(l))
            .or_else(|| metadata.languages.first().cloned());
        if let Some(l) = &language {
            events.push(PlayerEvent::LanguageChange {
                language: l.clone(),
            });
        }

        let scheduler_config = SchedulerConfig {
            parallel: metadata.allows_parallel,
            loading_unit: metadata.loading_mode,
            ..SchedulerConfig::default()
        };
        let mut scheduler = LoadScheduler::new(scheduler_config);
        scheduler.set_tag(language.clone());

        let viewport = constrained_viewport(viewport, metadata);
        let mut registry = ResourceRegistry::new();
        let mut ids = SliceIdAllocator::new();
        let navigator = build_navigator(
            &model,
            mode,
            viewport,
            language.as_deref(),
            options.max_nb_of_units_to_load_after,
            &mut registry,
            &mut ids,
        );

        events.push(PlayerEvent::ReadingModeChange { mode });
        let mut player = Self {
            model,
            options,
            registry,
            scheduler,
            ids,
            fetcher,
            navigator,
            mode,
            available_modes,
            viewport,
            language,
            muted: false,
            initial_loading: true,
            initial_percent: 0,
            last_page: 0,
            last_progress: None,
            events,
        };
        player.with_ctx(0, |nav, ctx| nav.start(ctx));
        player
            .scheduler
            .run_initial_tasks(&mut player.registry, player.fetcher.as_mut(), 0);
        player.last_progress = player.navigator.progress();
        player.events.push(PlayerEvent::PageChange {
            page_index: 0,
            nb_of_pages: player.navigator.nb_of_pages(),
        });
        player.drain_scheduler_events();
        Ok(player)
    }

    // --- inspection -------------------------------------------------------

    pub fn reading_mode(&self) -> ReadingMode {
        self.mode
    }

    pub fn available_reading_modes(&self) -> &[ReadingMode] {
        &self.available_modes
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.model.metadata
    }

    pub fn navigator(&self) -> &PageNavigator {
        &self.navigator
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    pub fn nb_of_pages(&self) -> usize {
        self.navigator.nb_of_pages()
    }

    pub fn current_page_index(&self) -> usize {
        self.navigator.current_page_index()
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn take_events(&mut self) -> Vec<PlayerEvent> {
        std::mem::take(&mut self.events)
    }

    /// Text for the full-screen loading overlay, while the initial run is
    /// still going.
    pub fn loading_text(&self) -> Option<String> {
        self.initial_loading.then(|| {
            format!(
                "{}... {}%",
                self.model.metadata.loading_message, self.initial_percent
            )
        })
    }

    // --- host drive -------------------------------------------------------

    /// Once per display frame.
    pub fn tick(&mut self, now_ms: u64) {
        self.with_ctx(now_ms, |nav, ctx| nav.tick(ctx));
        self.scheduler
            .tick(now_ms, &mut self.registry, self.fetcher.as_mut());
        self.drain_scheduler_events();
        self.sync_position_events();
    }

    /// Feed back the settlement of an asynchronous fetch.
    pub fn on_fetch_outcome(&mut self, fetch: FetchId, outcome: FetchOutcome, now_ms: u64) {
        self.scheduler.on_fetch_outcome(
            fetch,
            outcome,
            &mut self.registry,
            self.fetcher.as_mut(),
            now_ms,
        );
        self.drain_scheduler_events();
    }

    // --- navigation -------------------------------------------------------

    pub fn go_to_page_with_index(&mut self, page_index: usize, now_ms: u64) -> bool {
        let forward = page_index >= self.navigator.current_page_index();
        let changed =
            self.with_ctx(now_ms, |nav, ctx| nav.go_to_page(page_index, forward, true, ctx));
        self.sync_position_events();
        changed
    }

    /// Locator-based jump: an optional reading-mode name, then href, then
    /// position/progression in decreasing precedence.
    pub fn go_to(&mut self, locator: &Locator, now_ms: u64) -> bool {
        if let Some(mode) = locator.text.as_deref().and_then(ReadingMode::from_name) {
            self.set_reading_mode(mode, now_ms);
        }
        if let Some(href) = locator.href.as_deref() {
            if let Some(segment) = self.segment_for_href(href) {
                let moved = self.with_ctx(now_ms, |nav, ctx| nav.go_to_segment(segment, ctx));
                self.sync_position_events();
                return moved;
            }
        }
        if let Some(position) = locator.locations.position {
            let moved = self.with_ctx(now_ms, |nav, ctx| nav.go_to_segment(position, ctx));
            if let Some(progression) = locator.locations.progression {
                self.set_percent_in_page(progression, now_ms);
            }
            self.sync_position_events();
            return moved;
        }
        if let Some(total) = locator.locations.total_progression {
            let last = self.navigator.nb_of_segments().saturating_sub(1);
            let segment = (total.clamp(0.0, 1.0) * last as f64).round() as usize;
            let moved = self.with_ctx(now_ms, |nav, ctx| nav.go_to_segment(segment, ctx));
            self.sync_position_events();
            return moved;
        }
        false
    }

    pub fn set_percent_in_page(&mut self, percent: f64, now_ms: u64) {
        self.with_ctx(now_ms, |nav, ctx| nav.set_percent_in_page(percent, ctx));
        self.sync_position_events();
    }

    pub fn go_right(&mut self, now_ms: u64) -> Handled {
        self.nudge(1.0, 0.0, false, now_ms)
    }

    pub fn go_left(&mut self, now_ms: u64) -> Handled {
        self.nudge(-1.0, 0.0, false, now_ms)
    }

    pub fn go_down(&mut self, now_ms: u64) -> Handled {
        self.nudge(0.0, 1.0, false, now_ms)
    }

    pub fn go_up(&mut self, now_ms: u64) -> Handled {
        self.nudge(0.0, -1.0, false, now_ms)
    }

    pub fn go_right_max(&mut self, now_ms: u64) -> Handled {
        self.nudge(1.0, 0.0, true, now_ms)
    }

    pub fn go_left_max(&mut self, now_ms: u64) -> Handled {
        self.nudge(-1.0, 0.0, true, now_ms)
    }

    pub fn go_down_max(&mut self, now_ms: u64) -> Handled {
        self.nudge(0.0, 1.0, true, now_ms)
    }

    pub fn go_up_max(&mut self, now_ms: u64) -> Handled {
        self.nudge(0.0, -1.0, true, now_ms)
    }

    /// Directional nudge: along the reading axis this is page/snap
    /// navigation; across it, a half-viewport camera move.
    fn nudge(&mut self, dx: f64, dy: f64, max: bool, now_ms: u64) -> Handled {
        let direction = self.model.metadata.direction;
        let along_axis = if direction.is_horizontal() {
            dx != 0.0
        } else {
            dy != 0.0
        };
        let handled = if along_axis {
            let toward = if direction.is_horizontal() { dx } else { dy };
            let forward = toward * direction.sign() > 0.0;
            if max {
                self.jump_to_extremity(forward, now_ms)
            } else {
                self.with_ctx(now_ms, |nav, ctx| {
                    if forward {
                        nav.attempt_forward(ctx)
                    } else {
                        nav.attempt_backward(ctx)
                    }
                })
            }
        } else {
            // Cross-axis movement only pans the camera.
            let step = if max { 1.0e9 } else { self.viewport.height.max(self.viewport.width) / 2.0 };
            let delta = Vec2::new(dx * step, dy * step);
            let consumed = self.navigator.camera_mut().move_by(delta);
            if consumed.x != 0.0 || consumed.y != 0.0 {
                Handled::Handled
            } else {
                Handled::NotHandled
            }
        };
        self.sync_position_events();
        handled
    }

    fn jump_to_extremity(&mut self, forward: bool, now_ms: u64) -> Handled {
        let target = if forward { self.nb_of_pages() - 1 } else { 0 };
        let changed = if target == self.navigator.current_page_index() {
            false
        } else {
            self.with_ctx(now_ms, |nav, ctx| nav.go_to_page(target, forward, true, ctx))
        };
        let camera = self.navigator.camera_mut();
        let had_progress = camera.progress().is_some();
        if had_progress {
            camera.set_progress(if forward { 1.0 } else { 0.0 });
            self.with_ctx(now_ms, |nav, ctx| nav.update_load_targets(ctx));
        }
        if changed || had_progress {
            Handled::Handled
        } else {
            Handled::NotHandled
        }
    }

    // --- continuous input / zoom ------------------------------------------

    pub fn scroll_by(&mut self, delta: Vec2, now_ms: u64) -> Handled {
        let handled = self.with_ctx(now_ms, |nav, ctx| nav.scroll_by(delta, ctx));
        self.sync_position_events();
        handled
    }

    pub fn end_scroll(&mut self, velocity: Vec2, now_ms: u64) {
        self.with_ctx(now_ms, |nav, ctx| nav.end_scroll(velocity, ctx));
        self.sync_position_events();
    }

    /// Host signal that the media driving a duration-less animation
    /// transition reached its natural end.
    pub fn end_transition_media(&mut self) {
        self.navigator.finish_page_transition();
        self.sync_position_events();
    }

    pub fn zoom_by_wheel(&mut self, wheel_delta: f64, viewport_point: Point) {
        if self.model.metadata.allows_zoom_on_ctrl_or_alt_scroll {
            self.navigator
                .camera_mut()
                .zoom_by_wheel(wheel_delta, viewport_point);
        }
    }

    pub fn zoom_by_pinch(&mut self, distance_ratio: f64, viewport_point: Point) {
        self.navigator
            .camera_mut()
            .zoom_by_pinch(distance_ratio, viewport_point);
    }

    pub fn toggle_zoom(&mut self, viewport_point: Point) {
        if self.model.metadata.allows_zoom_on_double_tap {
            self.navigator.camera_mut().toggle_zoom(viewport_point);
        }
    }

    // --- configuration ----------------------------------------------------

    pub fn set_reading_mode(&mut self, mode: ReadingMode, now_ms: u64) -> bool {
        if mode == self.mode || !self.available_modes.contains(&mode) {
            return false;
        }
        // Carry the reading position across the rebuild.
        let segment = self.navigator.current_segment_index();
        let percent = self.navigator.progress();

        self.mode = mode;
        self.navigator = build_navigator(
            &self.model,
            mode,
            self.viewport,
            self.language.as_deref(),
            self.options.max_nb_of_units_to_load_after,
            &mut self.registry,
            &mut self.ids,
        );
        self.with_ctx(now_ms, |nav, ctx| {
            nav.start(ctx);
            nav.go_to_segment(segment, ctx);
            if let Some(p) = percent {
                nav.set_percent_in_page(p, ctx);
            }
        });
        self.events.push(PlayerEvent::ReadingModeChange { mode });
        self.last_page = self.navigator.current_page_index();
        self.last_progress = self.navigator.progress();
        self.events.push(PlayerEvent::PageChange {
            page_index: self.last_page,
            nb_of_pages: self.navigator.nb_of_pages(),
        });
        true
    }

    /// Switch language (or any variant tag). Changed slices get their new
    /// variants queued for loading.
    pub fn set_language(&mut self, language: &str, now_ms: u64) -> bool {
        if !self.model.metadata.languages.iter().any(|l| l == language) {
            return false;
        }
        if self.language.as_deref() == Some(language) {
            return true;
        }
        self.language = Some(language.to_string());
        self.scheduler.set_tag(self.language.clone());
        let tag = language.to_string();
        self.with_ctx(now_ms, |nav, ctx| nav.select_tag(Some(&tag), ctx));
        self.events.push(PlayerEvent::LanguageChange {
            language: tag,
        });
        true
    }

    pub fn set_tag(&mut self, tag: Option<&str>, now_ms: u64) {
        self.scheduler.set_tag(tag.map(String::from));
        self.with_ctx(now_ms, |nav, ctx| nav.select_tag(tag, ctx));
    }

    pub fn mute(&mut self) {
        self.muted = true;
    }

    pub fn unmute(&mut self) {
        self.muted = false;
    }

    /// New viewport. In-flight auto-scrolls settle at their targets before
    /// the new bounds apply.
    pub fn resize(&mut self, viewport: Size, now_ms: u64) {
        let viewport = constrained_viewport(viewport, &self.model.metadata);
        self.viewport = viewport;
        self.with_ctx(now_ms, |nav, ctx| nav.resize(viewport, ctx));
        self.sync_position_events();
    }

    /// Release everything: kill pending loads, free every texture.
    pub fn destroy(&mut self, now_ms: u64) {
        self.with_ctx(now_ms, |nav, ctx| nav.shutdown(ctx));
        self.events.clear();
        self.initial_loading = false;
    }

    // --- internals --------------------------------------------------------

    fn with_ctx<R>(
        &mut self,
        now_ms: u64,
        f: impl FnOnce(&mut PageNavigator, &mut LoadContext<'_>) -> R,
    ) -> R {
        let mut ctx = LoadContext {
            scheduler: &mut self.scheduler,
            registry: &mut self.registry,
            fetcher: self.fetcher.as_mut(),
            now_ms,
        };
        f(&mut self.navigator, &mut ctx)
    }

    fn drain_scheduler_events(&mut self) {
        for event in self.scheduler.take_events() {
            match event {
                LoadEvent::InitialProgress(percent) => {
                    self.initial_percent = percent;
                }
                LoadEvent::InitialRunFinished => {
                    self.initial_loading = false;
                    self.initial_percent = 100;
                    self.events.push(PlayerEvent::InitialLoad);
                }
                LoadEvent::TaskFinished(_) => {
                    self.events.push(PlayerEvent::PageLoadStatusUpdate {
                        page_index: self.navigator.current_page_index(),
                    });
                }
                LoadEvent::TaskKilled(_) => {}
            }
        }
    }

    fn sync_position_events(&mut self) {
        let page = self.navigator.current_page_index();
        if page != self.last_page {
            self.last_page = page;
            self.events.push(PlayerEvent::PageChange {
                page_index: page,
                nb_of_pages: self.navigator.nb_of_pages(),
            });
        }
        let progress = self.navigator.progress();
        if progress != self.last_progress {
            self.last_progress = progress;
            self.events.push(PlayerEvent::InPageScroll { progress });
        }
    }

    fn segment_for_href(&self, href: &str) -> Option<usize> {
        let (path, _) = split_href(href);
        let scene: &SceneGraph = self.navigator.scene();
        for page in &scene.pages {
            for segment in &page.segments {
                let matches = segment
                    .parent
                    .loading_unit()
                    .iter()
                    .filter_map(|id| self.registry.get(*id))
                    .any(|r| r.path == path || r.path.ends_with(&path));
                if matches {
                    return Some(segment.segment_index);
                }
            }
        }
        None
    }
}

/// Which navigators this manifest supports: continuous stories scroll; others
/// page one-by-one, with a double spread when the manifest allows it and a
/// guided mode when a guided order exists.
fn available_reading_modes(model: &ManifestModel) -> Vec<ReadingMode> {
    let mut modes = Vec::new();
    if model.metadata.continuous {
        modes.push(ReadingMode::Scroll);
    } else {
        modes.push(ReadingMode::Single);
        if model.metadata.spread != Spread::None {
            modes.push(ReadingMode::Double);
        }
    }
    if model.has_guided() {
        modes.push(ReadingMode::Guided);
    }
    modes
}

fn build_navigator(
    model: &ManifestModel,
    mode: ReadingMode,
    viewport: Size,
    language: Option<&str>,
    max_units_after: Option<usize>,
    registry: &mut ResourceRegistry,
    ids: &mut SliceIdAllocator,
) -> PageNavigator {
    let mut scene = SceneGraph::build(model, mode, viewport, registry, ids);
    if language.is_some() {
        scene.select_tag(language, registry);
    }
    let options = NavigatorOptions::from_metadata(&model.metadata, max_units_after);
    PageNavigator::new(scene, &model.metadata, options)
}

/// Apply the manifest's viewport-ratio constraint to the host viewport.
fn constrained_viewport(viewport: Size, metadata: &Metadata) -> Size {
    let Some(ratio) = metadata.ratio else {
        return viewport;
    };
    if ratio <= 0.0 || viewport.width <= 0.0 || viewport.height <= 0.0 {
        return viewport;
    }
    let actual = viewport.width / viewport.height;
    match metadata.constraint {
        Constraint::Exact => {
            if actual > ratio {
                Size::new(viewport.height * ratio, viewport.height)
            } else {
                Size::new(viewport.width, viewport.width / ratio)
            }
        }
        Constraint::Min => {
            if actual < ratio {
                Size::new(viewport.width, viewport.width / ratio)
            } else {
                viewport
            }
        }
        Constraint::Max => {
            if actual > ratio {
                Size::new(viewport.height * ratio, viewport.height)
            } else {
                viewport
            }
        }
    }
}
