//! Priority-ordered, cancelable resource loading.
//!
//! A task is the loading unit for one slice: a single resource id, or the
//! set of ids of a sequence. At most one task exists per unit at a time —
//! re-adding updates the existing task's position data and priority instead
//! of enqueueing a duplicate. Lower numeric priority runs first.
//!
//! The scheduler is single-threaded and deterministic: fetch completions are
//! fed back by the host through [`LoadScheduler::on_fetch_outcome`], and
//! timeouts advance only when the host calls [`LoadScheduler::tick`] with its
//! monotonic clock. A completion for a canceled fetch id is a no-op.

use std::collections::{BTreeMap, HashMap};

use crate::{
    model::{LoadingMode, ResourceKind},
    resources::{LoadStatus, ResourceId, ResourceRegistry},
    surface::{FetchId, FetchOutcome, FetchRequest, ResourceFetcher},
};

/// Unit key: the first resource id of the slice's loading unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskKey(pub ResourceId);

#[derive(Clone, Debug)]
pub struct FetchSpec {
    pub resource: ResourceId,
    pub kind: ResourceKind,
    pub path: String,
}

#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    pub parallel: bool,
    pub loading_unit: LoadingMode,
    /// Parallel mode only: tasks farther than this from the target (in
    /// priority terms) are not started, and running ones are killed.
    pub max_priority: f64,
    /// Asymmetric weight applied to tasks behind the target, so look-ahead
    /// wins over look-behind.
    pub behind_multiplier: f64,
    /// Serial mode only: video/audio loads are force-failed after this long.
    pub media_timeout_ms: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            loading_unit: LoadingMode::Page,
            max_priority: 4.0,
            behind_multiplier: 3.0,
            media_timeout_ms: Some(10_000),
        }
    }
}

#[derive(Clone, Debug)]
enum TaskState {
    Pending,
    Running {
        cursor: usize,
        fetch: FetchId,
        is_fallback: bool,
        started_ms: u64,
        media: bool,
    },
}

#[derive(Clone, Debug)]
pub struct LoadTask {
    pub key: TaskKey,
    pub page_index: usize,
    pub segment_index: usize,
    pub priority: f64,
    pub forced_priority: Option<f64>,
    fetches: Vec<FetchSpec>,
    state: TaskState,
}

impl LoadTask {
    pub fn is_running(&self) -> bool {
        matches!(self.state, TaskState::Running { .. })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum LoadEvent {
    TaskFinished(TaskKey),
    TaskKilled(TaskKey),
    InitialProgress(u32),
    InitialRunFinished,
}

#[derive(Debug)]
struct InitialRun {
    total: usize,
    done: usize,
}

#[derive(Debug)]
pub struct LoadScheduler {
    config: SchedulerConfig,
    tasks: BTreeMap<TaskKey, LoadTask>,
    in_flight: HashMap<FetchId, TaskKey>,
    next_fetch: u64,
    target_page: usize,
    target_segment: usize,
    tag: Option<String>,
    initial: Option<InitialRun>,
    events: Vec<LoadEvent>,
}

impl LoadScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            tasks: BTreeMap::new(),
            in_flight: HashMap::new(),
            next_fetch: 0,
            target_page: 0,
            target_segment: 0,
            tag: None,
            initial: None,
            events: Vec::new(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn set_tag(&mut self, tag: Option<String>) {
        self.tag = tag;
    }

    pub fn is_idle(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn running_count(&self) -> usize {
        self.tasks.values().filter(|t| t.is_running()).count()
    }

    pub fn has_task(&self, key: TaskKey) -> bool {
        self.tasks.contains_key(&key)
    }

    pub fn running_priorities(&self) -> Vec<f64> {
        self.tasks
            .values()
            .filter(|t| t.is_running())
            .map(|t| t.priority)
            .collect()
    }

    pub fn take_events(&mut self) -> Vec<LoadEvent> {
        std::mem::take(&mut self.events)
    }

    /// Percent complete of the initial run, when one is active.
    pub fn percent_complete(&self) -> Option<u32> {
        let run = self.initial.as_ref()?;
        if run.total == 0 {
            return Some(100);
        }
        Some((run.done * 100 / run.total) as u32)
    }

    /// Queue (or refresh) the loading task for one unit.
    pub fn add_task(
        &mut self,
        key: TaskKey,
        page_index: usize,
        segment_index: usize,
        fetches: Vec<FetchSpec>,
        forced_priority: Option<f64>,
        registry: &mut ResourceRegistry,
        fetcher: &mut dyn ResourceFetcher,
        now_ms: u64,
    ) {
        if let Some(task) = self.tasks.get_mut(&key) {
            // Duplicate request: refresh the data instead of double-queueing.
            task.page_index = page_index;
            task.segment_index = segment_index;
            task.forced_priority = forced_priority;
            task.priority = Self::priority_for(
                &self.config,
                self.target_page,
                self.target_segment,
                page_index,
                segment_index,
                forced_priority,
            );
            return;
        }

        // Nothing to do when the whole unit is already resident.
        if fetches
            .iter()
            .all(|f| registry.status(f.resource) == LoadStatus::Loaded)
        {
            self.events.push(LoadEvent::TaskFinished(key));
            return;
        }

        let priority = Self::priority_for(
            &self.config,
            self.target_page,
            self.target_segment,
            page_index,
            segment_index,
            forced_priority,
        );
        tracing::debug!(unit = key.0.0, page_index, segment_index, priority, "task queued");
        self.tasks.insert(
            key,
            LoadTask {
                key,
                page_index,
                segment_index,
                priority,
                forced_priority,
                fetches,
                state: TaskState::Pending,
            },
        );
        self.start_eligible(registry, fetcher, now_ms);
    }

    /// Recompute every pending/running task's priority around a new target.
    /// In parallel mode, running tasks that drifted outside the window are
    /// killed.
    pub fn update_priorities(
        &mut self,
        target_page: usize,
        target_segment: usize,
        registry: &mut ResourceRegistry,
        fetcher: &mut dyn ResourceFetcher,
        now_ms: u64,
    ) {
        self.target_page = target_page;
        self.target_segment = target_segment;

        let mut to_kill = Vec::new();
        for task in self.tasks.values_mut() {
            task.priority = Self::priority_for(
                &self.config,
                target_page,
                target_segment,
                task.page_index,
                task.segment_index,
                task.forced_priority,
            );
            if self.config.parallel
                && self.initial.is_none()
                && task.priority > self.config.max_priority
            {
                to_kill.push(task.key);
            }
        }
        for key in to_kill {
            self.kill_task(key, registry, fetcher);
        }
        self.start_eligible(registry, fetcher, now_ms);
    }

    /// Cancel a task and reset its not-yet-loaded resources to `NotStarted`.
    pub fn kill_task(
        &mut self,
        key: TaskKey,
        registry: &mut ResourceRegistry,
        fetcher: &mut dyn ResourceFetcher,
    ) {
        let Some(task) = self.tasks.remove(&key) else {
            return;
        };
        if let TaskState::Running { fetch, .. } = task.state {
            fetcher.cancel(fetch);
            self.in_flight.remove(&fetch);
        }
        for spec in &task.fetches {
            registry.reset_if_not_loaded(spec.resource);
        }
        tracing::debug!(unit = key.0.0, "task killed");
        self.events.push(LoadEvent::TaskKilled(key));
        self.note_initial_done();
    }

    /// One-shot startup pass: run everything currently queued regardless of
    /// the priority window and report percent complete along the way.
    pub fn run_initial_tasks(
        &mut self,
        registry: &mut ResourceRegistry,
        fetcher: &mut dyn ResourceFetcher,
        now_ms: u64,
    ) {
        let total = self.tasks.len();
        self.initial = Some(InitialRun { total, done: 0 });
        if total == 0 {
            self.events.push(LoadEvent::InitialRunFinished);
            self.initial = None;
            return;
        }
        self.events.push(LoadEvent::InitialProgress(0));
        self.start_eligible(registry, fetcher, now_ms);
    }

    /// Host-delivered fetch completion. Unknown (canceled/superseded) fetch
    /// ids are ignored.
    pub fn on_fetch_outcome(
        &mut self,
        fetch: FetchId,
        outcome: FetchOutcome,
        registry: &mut ResourceRegistry,
        fetcher: &mut dyn ResourceFetcher,
        now_ms: u64,
    ) {
        let Some(key) = self.in_flight.remove(&fetch) else {
            return;
        };
        let Some(task) = self.tasks.get_mut(&key) else {
            return;
        };
        let TaskState::Running {
            cursor,
            fetch: current,
            is_fallback,
            ..
        } = task.state
        else {
            return;
        };
        if current != fetch {
            return;
        }

        let resource = task.fetches[cursor].resource;
        match outcome {
            FetchOutcome::Loaded(texture) => {
                if is_fallback {
                    registry.set_fallback_loaded(resource, texture);
                } else {
                    registry.set_loaded(resource, texture);
                }
                self.advance_task(key, cursor + 1, registry, fetcher, now_ms);
            }
            FetchOutcome::Failed(reason) => {
                tracing::warn!(resource = resource.0, %reason, "resource load failed");
                if !is_fallback {
                    if let Some(fallback) = registry.best_fallback(resource, self.tag.as_deref()) {
                        self.issue_fetch(key, cursor, fallback.path, ResourceKind::Image, true, now_ms, registry, fetcher);
                        return;
                    }
                }
                // Local recovery: leave a placeholder, keep going.
                registry.reset_if_not_loaded(resource);
                self.advance_task(key, cursor + 1, registry, fetcher, now_ms);
            }
        }
    }

    /// Clock-driven maintenance: force-fail serial-mode media loads that
    /// outlived the timeout.
    pub fn tick(
        &mut self,
        now_ms: u64,
        registry: &mut ResourceRegistry,
        fetcher: &mut dyn ResourceFetcher,
    ) {
        // Parallel mode has no timeout: one stuck video must not block the
        // priority window.
        if self.config.parallel {
            return;
        }
        let Some(timeout) = self.config.media_timeout_ms else {
            return;
        };

        let timed_out: Vec<(TaskKey, FetchId)> = self
            .tasks
            .values()
            .filter_map(|task| match task.state {
                TaskState::Running {
                    fetch,
                    started_ms,
                    media: true,
                    ..
                } if now_ms.saturating_sub(started_ms) >= timeout => Some((task.key, fetch)),
                _ => None,
            })
            .collect();

        for (key, fetch) in timed_out {
            tracing::warn!(unit = key.0.0, "media load timed out");
            fetcher.cancel(fetch);
            self.on_fetch_outcome(
                fetch,
                FetchOutcome::Failed("timeout".to_string()),
                registry,
                fetcher,
                now_ms,
            );
        }
    }

    fn priority_for(
        config: &SchedulerConfig,
        target_page: usize,
        target_segment: usize,
        page_index: usize,
        segment_index: usize,
        forced: Option<f64>,
    ) -> f64 {
        if let Some(f) = forced {
            return f;
        }
        let (index, target) = match config.loading_unit {
            LoadingMode::Page => (page_index as f64, target_page as f64),
            LoadingMode::Segment => (segment_index as f64, target_segment as f64),
        };
        let dist = index - target;
        if dist >= 0.0 {
            dist
        } else {
            -dist * config.behind_multiplier
        }
    }

    fn start_eligible(
        &mut self,
        registry: &mut ResourceRegistry,
        fetcher: &mut dyn ResourceFetcher,
        now_ms: u64,
    ) {
        if self.config.parallel {
            let window_open = self.initial.is_some();
            let keys: Vec<TaskKey> = self
                .tasks
                .values()
                .filter(|t| {
                    matches!(t.state, TaskState::Pending)
                        && (window_open || t.priority <= self.config.max_priority)
                })
                .map(|t| t.key)
                .collect();
            for key in keys {
                self.advance_task(key, 0, registry, fetcher, now_ms);
            }
        } else {
            if self.tasks.values().any(|t| t.is_running()) {
                return;
            }
            let next = self
                .tasks
                .values()
                .filter(|t| matches!(t.state, TaskState::Pending))
                .min_by(|a, b| {
                    a.priority
                        .total_cmp(&b.priority)
                        .then_with(|| a.key.cmp(&b.key))
                })
                .map(|t| t.key);
            if let Some(key) = next {
                self.advance_task(key, 0, registry, fetcher, now_ms);
            }
        }
    }

    /// Move a task's cursor to the next resource still needing a fetch, issue
    /// it, or finish the task.
    fn advance_task(
        &mut self,
        key: TaskKey,
        mut cursor: usize,
        registry: &mut ResourceRegistry,
        fetcher: &mut dyn ResourceFetcher,
        now_ms: u64,
    ) {
        loop {
            let Some(task) = self.tasks.get(&key) else {
                return;
            };
            let Some(spec) = task.fetches.get(cursor) else {
                self.finish_task(key, registry, fetcher, now_ms);
                return;
            };
            if registry.status(spec.resource) == LoadStatus::Loaded {
                cursor += 1;
                continue;
            }
            let (path, kind) = (spec.path.clone(), spec.kind);
            self.issue_fetch(key, cursor, path, kind, false, now_ms, registry, fetcher);
            return;
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn issue_fetch(
        &mut self,
        key: TaskKey,
        cursor: usize,
        path: String,
        kind: ResourceKind,
        is_fallback: bool,
        now_ms: u64,
        registry: &mut ResourceRegistry,
        fetcher: &mut dyn ResourceFetcher,
    ) {
        let fetch = FetchId(self.next_fetch);
        self.next_fetch += 1;

        let Some(task) = self.tasks.get_mut(&key) else {
            return;
        };
        let resource = task.fetches[cursor].resource;
        let media = matches!(kind, ResourceKind::Video | ResourceKind::Audio);
        task.state = TaskState::Running {
            cursor,
            fetch,
            is_fallback,
            started_ms: now_ms,
            media,
        };
        self.in_flight.insert(fetch, key);
        registry.set_loading(resource);
        fetcher.start(FetchRequest {
            fetch,
            resource,
            kind,
            path,
        });
    }

    fn finish_task(
        &mut self,
        key: TaskKey,
        registry: &mut ResourceRegistry,
        fetcher: &mut dyn ResourceFetcher,
        now_ms: u64,
    ) {
        self.tasks.remove(&key);
        tracing::debug!(unit = key.0.0, "task finished");
        self.events.push(LoadEvent::TaskFinished(key));
        self.note_initial_done();
        self.start_eligible(registry, fetcher, now_ms);
    }

    fn note_initial_done(&mut self) {
        let Some(run) = self.initial.as_mut() else {
            return;
        };
        run.done += 1;
        let percent = (run.done * 100 / run.total.max(1)) as u32;
        self.events.push(LoadEvent::InitialProgress(percent));
        if run.done >= run.total {
            self.events.push(LoadEvent::InitialRunFinished);
            self.initial = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::model::ResourceSpec;
    use crate::resources::Texture;
    use crate::surface::NullFetcher;

    fn texture() -> Texture {
        Texture {
            width: 1,
            height: 1,
            data: Arc::new(vec![0, 0, 0, 0]),
        }
    }

    fn image_spec(path: &str) -> ResourceSpec {
        ResourceSpec {
            kind: ResourceKind::Image,
            mime: None,
            path: path.to_string(),
            fragment: None,
            width: None,
            height: None,
            language: None,
            fallbacks: Vec::new(),
        }
    }

    fn setup(n: usize) -> (ResourceRegistry, Vec<ResourceId>) {
        let mut registry = ResourceRegistry::new();
        let ids = (0..n)
            .map(|i| {
                registry
                    .get_or_create_id(&image_spec(&format!("img{i}.png")))
                    .unwrap()
            })
            .collect();
        (registry, ids)
    }

    fn one_fetch(registry: &ResourceRegistry, id: ResourceId) -> Vec<FetchSpec> {
        let r = registry.get(id).unwrap();
        vec![FetchSpec {
            resource: id,
            kind: r.kind,
            path: r.path.clone(),
        }]
    }

    fn add(
        sched: &mut LoadScheduler,
        registry: &mut ResourceRegistry,
        fetcher: &mut NullFetcher,
        id: ResourceId,
        segment: usize,
    ) {
        let fetches = one_fetch(registry, id);
        sched.add_task(TaskKey(id), 0, segment, fetches, None, registry, fetcher, 0);
    }

    #[test]
    fn serial_mode_runs_one_task_at_a_time() {
        let (mut registry, ids) = setup(3);
        let mut fetcher = NullFetcher::default();
        let mut sched = LoadScheduler::new(SchedulerConfig {
            parallel: false,
            loading_unit: LoadingMode::Segment,
            ..SchedulerConfig::default()
        });

        for (i, id) in ids.iter().enumerate() {
            add(&mut sched, &mut registry, &mut fetcher, *id, i);
        }
        assert_eq!(sched.running_count(), 1);
        assert_eq!(fetcher.started.len(), 1);

        let first = fetcher.started.pop_front().unwrap();
        sched.on_fetch_outcome(
            first.fetch,
            FetchOutcome::Loaded(texture()),
            &mut registry,
            &mut fetcher,
            0,
        );
        // Completion starts the next lowest-priority task.
        assert_eq!(sched.running_count(), 1);
        assert_eq!(sched.task_count(), 2);
    }

    #[test]
    fn parallel_mode_starts_everything_in_window() {
        let (mut registry, ids) = setup(4);
        let mut fetcher = NullFetcher::default();
        let mut sched = LoadScheduler::new(SchedulerConfig {
            parallel: true,
            loading_unit: LoadingMode::Segment,
            max_priority: 2.0,
            ..SchedulerConfig::default()
        });

        for (i, id) in ids.iter().enumerate() {
            add(&mut sched, &mut registry, &mut fetcher, *id, i);
        }
        // Segments 0..=2 are within max_priority of target 0; segment 3 is not.
        assert_eq!(sched.running_count(), 3);
        for p in sched.running_priorities() {
            assert!(p <= 2.0);
        }
    }

    #[test]
    fn update_priorities_kills_out_of_window_tasks() {
        let (mut registry, ids) = setup(4);
        let mut fetcher = NullFetcher::default();
        let mut sched = LoadScheduler::new(SchedulerConfig {
            parallel: true,
            loading_unit: LoadingMode::Segment,
            max_priority: 1.0,
            behind_multiplier: 3.0,
            ..SchedulerConfig::default()
        });

        for (i, id) in ids.iter().enumerate() {
            add(&mut sched, &mut registry, &mut fetcher, *id, i);
        }
        assert!(sched.has_task(TaskKey(ids[0])));

        // Move the target to segment 3: segment 0 is now 9 units behind
        // (3 × behind multiplier) and gets killed.
        sched.update_priorities(0, 3, &mut registry, &mut fetcher, 0);
        assert!(!sched.has_task(TaskKey(ids[0])));
        assert!(fetcher.canceled.len() >= 1);
        assert_eq!(registry.status(ids[0]), LoadStatus::NotStarted);
        assert!(
            sched
                .take_events()
                .contains(&LoadEvent::TaskKilled(TaskKey(ids[0])))
        );
    }

    #[test]
    fn duplicate_add_updates_existing_task() {
        let (mut registry, ids) = setup(1);
        let mut fetcher = NullFetcher::default();
        let mut sched = LoadScheduler::new(SchedulerConfig {
            parallel: false,
            loading_unit: LoadingMode::Segment,
            ..SchedulerConfig::default()
        });

        add(&mut sched, &mut registry, &mut fetcher, ids[0], 5);
        let fetches = one_fetch(&registry, ids[0]);
        sched.add_task(TaskKey(ids[0]), 0, 9, fetches, None, &mut registry, &mut fetcher, 0);
        assert_eq!(sched.task_count(), 1);
        assert_eq!(fetcher.started.len(), 1);
    }

    #[test]
    fn already_loaded_unit_finishes_immediately() {
        let (mut registry, ids) = setup(1);
        registry.set_loaded(ids[0], texture());
        let mut fetcher = NullFetcher::default();
        let mut sched = LoadScheduler::new(SchedulerConfig::default());

        add(&mut sched, &mut registry, &mut fetcher, ids[0], 0);
        assert!(sched.is_idle());
        assert_eq!(
            sched.take_events(),
            vec![LoadEvent::TaskFinished(TaskKey(ids[0]))]
        );
    }

    #[test]
    fn failed_video_falls_back_to_image() {
        let mut registry = ResourceRegistry::new();
        let mut video = ResourceSpec {
            kind: ResourceKind::Video,
            ..image_spec("v.mp4")
        };
        video.fallbacks = vec![image_spec("poster.jpg")];
        let id = registry.get_or_create_id(&video).unwrap();

        let mut fetcher = NullFetcher::default();
        let mut sched = LoadScheduler::new(SchedulerConfig {
            parallel: false,
            ..SchedulerConfig::default()
        });
        let fetches = vec![FetchSpec {
            resource: id,
            kind: ResourceKind::Video,
            path: "v.mp4".to_string(),
        }];
        sched.add_task(TaskKey(id), 0, 0, fetches, None, &mut registry, &mut fetcher, 0);

        let req = fetcher.started.pop_front().unwrap();
        sched.on_fetch_outcome(
            req.fetch,
            FetchOutcome::Failed("network".to_string()),
            &mut registry,
            &mut fetcher,
            0,
        );

        // The fallback fetch targets the same resource id with the image path.
        let fb = fetcher.started.pop_front().unwrap();
        assert_eq!(fb.resource, id);
        assert_eq!(fb.path, "poster.jpg");
        assert_eq!(fb.kind, ResourceKind::Image);

        sched.on_fetch_outcome(
            fb.fetch,
            FetchOutcome::Loaded(texture()),
            &mut registry,
            &mut fetcher,
            0,
        );
        assert_eq!(registry.status(id), LoadStatus::PartiallyLoaded);
        assert!(sched.is_idle());
    }

    #[test]
    fn serial_media_timeout_force_fails() {
        let mut registry = ResourceRegistry::new();
        let video = ResourceSpec {
            kind: ResourceKind::Video,
            ..image_spec("v.mp4")
        };
        let id = registry.get_or_create_id(&video).unwrap();

        let mut fetcher = NullFetcher::default();
        let mut sched = LoadScheduler::new(SchedulerConfig {
            parallel: false,
            media_timeout_ms: Some(1000),
            ..SchedulerConfig::default()
        });
        let fetches = vec![FetchSpec {
            resource: id,
            kind: ResourceKind::Video,
            path: "v.mp4".to_string(),
        }];
        sched.add_task(TaskKey(id), 0, 0, fetches, None, &mut registry, &mut fetcher, 0);

        sched.tick(999, &mut registry, &mut fetcher);
        assert_eq!(sched.running_count(), 1);

        sched.tick(1000, &mut registry, &mut fetcher);
        // No fallback available: resource resets, task completes.
        assert_eq!(registry.status(id), LoadStatus::NotStarted);
        assert!(sched.is_idle());
        assert!(!fetcher.canceled.is_empty());
    }

    #[test]
    fn stale_completion_after_kill_is_a_noop() {
        let (mut registry, ids) = setup(1);
        let mut fetcher = NullFetcher::default();
        let mut sched = LoadScheduler::new(SchedulerConfig::default());

        add(&mut sched, &mut registry, &mut fetcher, ids[0], 0);
        let req = fetcher.started.pop_front().unwrap();
        sched.kill_task(TaskKey(ids[0]), &mut registry, &mut fetcher);

        sched.on_fetch_outcome(
            req.fetch,
            FetchOutcome::Loaded(texture()),
            &mut registry,
            &mut fetcher,
            0,
        );
        assert_eq!(registry.status(ids[0]), LoadStatus::NotStarted);
    }

    #[test]
    fn initial_run_reports_percent_and_finishes() {
        let (mut registry, ids) = setup(2);
        let mut fetcher = NullFetcher::default();
        let mut sched = LoadScheduler::new(SchedulerConfig {
            parallel: true,
            loading_unit: LoadingMode::Segment,
            max_priority: 0.0,
            ..SchedulerConfig::default()
        });

        for (i, id) in ids.iter().enumerate() {
            add(&mut sched, &mut registry, &mut fetcher, *id, i);
        }
        // max_priority 0 keeps task 1 pending until the initial run opens the
        // window.
        sched.run_initial_tasks(&mut registry, &mut fetcher, 0);
        assert_eq!(sched.running_count(), 2);
        assert_eq!(sched.percent_complete(), Some(0));

        let reqs: Vec<_> = fetcher.started.drain(..).collect();
        sched.on_fetch_outcome(
            reqs[0].fetch,
            FetchOutcome::Loaded(texture()),
            &mut registry,
            &mut fetcher,
            0,
        );
        assert_eq!(sched.percent_complete(), Some(50));

        sched.on_fetch_outcome(
            reqs[1].fetch,
            FetchOutcome::Loaded(texture()),
            &mut registry,
            &mut fetcher,
            0,
        );
        let events = sched.take_events();
        assert!(events.contains(&LoadEvent::InitialRunFinished));
        assert!(sched.percent_complete().is_none());
    }

    #[test]
    fn sequence_unit_loads_resources_one_by_one() {
        let (mut registry, ids) = setup(3);
        let mut fetcher = NullFetcher::default();
        let mut sched = LoadScheduler::new(SchedulerConfig::default());

        let fetches: Vec<FetchSpec> = ids
            .iter()
            .map(|id| FetchSpec {
                resource: *id,
                kind: ResourceKind::Image,
                path: registry.get(*id).unwrap().path.clone(),
            })
            .collect();
        sched.add_task(TaskKey(ids[0]), 0, 0, fetches, None, &mut registry, &mut fetcher, 0);

        for _ in 0..3 {
            assert_eq!(fetcher.started.len(), 1);
            let req = fetcher.started.pop_front().unwrap();
            sched.on_fetch_outcome(
                req.fetch,
                FetchOutcome::Loaded(texture()),
                &mut registry,
                &mut fetcher,
                0,
            );
        }
        assert!(sched.is_idle());
        for id in ids {
            assert_eq!(registry.status(id), LoadStatus::Loaded);
        }
    }
}
