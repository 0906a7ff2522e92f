//! Layer transition state machine.
//!
//! A [`StateHandler`] owns a linear sequence of states, each the set of layer
//! indices that must be mounted. Page navigation uses one handler over pages
//! (states never coexist outside transitions); a layered segment uses one
//! handler over its layers (layers below the current state stay mounted).
//!
//! The handler mutates nothing directly. Every mount, unmount, alpha, and
//! offset change goes through a [`StateEffects`] implementation supplied by
//! the caller, which is where the navigator binds layers to scene slices and
//! compositor nodes.

use kurbo::Size;

use crate::{
    geom::Axis,
    model::{AnimationMedia, HalfTransition, HalfTransitionType},
};

/// Side of a transition batch a layer participates in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionSide {
    Entry,
    Exit,
}

/// The seam between the state machine and the scene.
pub trait StateEffects {
    fn viewport(&self) -> Size;
    /// The half-transition descriptor for a layer crossing the state
    /// boundary, or `None` for a cut.
    fn half_transition(&mut self, layer: usize, side: TransitionSide, forward: bool)
    -> Option<HalfTransition>;
    /// Whether the author allows gesture-driven playback across this
    /// boundary.
    fn is_controllable(&mut self, layer: usize, side: TransitionSide, forward: bool) -> bool;
    fn add_layer(&mut self, layer: usize);
    fn remove_layer(&mut self, layer: usize);
    fn set_alpha(&mut self, layer: usize, alpha: f64);
    fn set_offset(&mut self, layer: usize, dx: f64, dy: f64);
    /// Reset a layer's container after its transition stops (alpha 1, zero
    /// offset, visible).
    fn finalize_layer(&mut self, layer: usize);
}

/// One running entry or exit animation.
#[derive(Clone, Debug)]
pub struct LayerTransition {
    pub layer: usize,
    pub side: TransitionSide,
    descriptor: Option<HalfTransition>,
    started_ms: Option<u64>,
    done: bool,
}

impl LayerTransition {
    fn new(layer: usize, side: TransitionSide, descriptor: Option<HalfTransition>) -> Self {
        let done = match &descriptor {
            None => true,
            Some(d) => match d.kind {
                HalfTransitionType::Cut => true,
                // An animation half with nothing to play is over before it
                // starts; a playable one gates the batch for its duration
                // (forever, for duration-less media, until force-ended).
                HalfTransitionType::Animation => {
                    !d.media.as_ref().is_some_and(AnimationMedia::is_playable)
                }
                _ => d.duration_ms <= 0.0,
            },
        };
        Self {
            layer,
            side,
            descriptor,
            started_ms: None,
            done,
        }
    }

    fn apply(&self, percent: f64, effects: &mut dyn StateEffects) {
        let Some(descriptor) = &self.descriptor else {
            return;
        };
        let percent = percent.clamp(0.0, 1.0);
        match descriptor.kind {
            HalfTransitionType::Cut => {}
            // The host compositor plays the media slice; the engine only
            // holds the batch open for its lifetime.
            HalfTransitionType::Animation => {}
            HalfTransitionType::FadeIn => effects.set_alpha(self.layer, percent),
            HalfTransitionType::FadeOut => effects.set_alpha(self.layer, 1.0 - percent),
            HalfTransitionType::SlideIn | HalfTransitionType::SlideOut => {
                let axis = descriptor.direction.axis();
                let extent = axis.of(effects.viewport()) * descriptor.direction.sign();
                let k = match descriptor.kind {
                    HalfTransitionType::SlideIn => 1.0 - percent,
                    _ => percent,
                };
                // Entries arrive from beyond the leading edge, exits leave
                // through the trailing one.
                let offset = extent
                    * k
                    * match self.side {
                        TransitionSide::Entry => 1.0,
                        TransitionSide::Exit => -1.0,
                    };
                match axis {
                    Axis::Horizontal => effects.set_offset(self.layer, offset, 0.0),
                    Axis::Vertical => effects.set_offset(self.layer, 0.0, offset),
                }
            }
        }
    }

    fn finish(&mut self, effects: &mut dyn StateEffects) {
        if let TransitionSide::Exit = self.side {
            effects.remove_layer(self.layer);
        }
        effects.finalize_layer(self.layer);
        self.done = true;
    }
}

#[derive(Debug)]
pub struct StateHandler {
    nb_states: usize,
    /// Layers below the current state stay mounted between transitions
    /// (layered segment topology) instead of being swapped out (page
    /// topology).
    coexist: bool,
    state: Option<usize>,
    previous_state: Option<usize>,
    batch: Vec<LayerTransition>,
    controlled: bool,
}

impl StateHandler {
    pub fn new(nb_states: usize, coexist: bool) -> Self {
        Self {
            nb_states,
            coexist,
            state: None,
            previous_state: None,
            batch: Vec::new(),
            controlled: false,
        }
    }

    pub fn nb_states(&self) -> usize {
        self.nb_states
    }

    /// Current state, or `None` before the first `go_to_state`.
    pub fn state_index(&self) -> Option<usize> {
        self.state
    }

    pub fn is_transitioning(&self) -> bool {
        !self.batch.is_empty()
    }

    pub fn is_controlled(&self) -> bool {
        self.controlled && !self.batch.is_empty()
    }

    /// Start a state change. Returns `false` (and changes nothing) when the
    /// target is out of range, equal to the current state, a transition is
    /// already running, or a controlled change was requested but no boundary
    /// transition is controllable.
    pub fn go_to_state(
        &mut self,
        target: usize,
        forward: bool,
        skip_transition: bool,
        controlled: bool,
        effects: &mut dyn StateEffects,
    ) -> bool {
        if target >= self.nb_states || Some(target) == self.state || self.is_transitioning() {
            return false;
        }

        let (instant_adds, instant_removes, animated) =
            self.plan(target, forward, skip_transition);

        if controlled
            && !animated
                .iter()
                .any(|(layer, side)| effects.is_controllable(*layer, *side, forward))
        {
            return false;
        }

        for layer in instant_adds {
            effects.add_layer(layer);
        }
        for layer in instant_removes {
            effects.remove_layer(layer);
        }

        let mut batch = Vec::new();
        for (layer, side) in animated {
            if side == TransitionSide::Entry {
                effects.add_layer(layer);
            }
            let descriptor = if skip_transition {
                None
            } else {
                effects.half_transition(layer, side, forward)
            };
            let mut transition = LayerTransition::new(layer, side, descriptor);
            if transition.done {
                transition.finish(effects);
            } else {
                transition.apply(0.0, effects);
            }
            batch.push(transition);
        }
        batch.retain(|t| !t.done);

        self.previous_state = self.state;
        self.state = Some(target);
        self.controlled = controlled && !batch.is_empty();
        self.batch = batch;
        true
    }

    /// Which layers change across the boundary: instantly mounted, instantly
    /// removed, and animated `(layer, side)` pairs.
    fn plan(
        &self,
        target: usize,
        forward: bool,
        skip: bool,
    ) -> (Vec<usize>, Vec<usize>, Vec<(usize, TransitionSide)>) {
        let mut instant_adds = Vec::new();
        let mut instant_removes = Vec::new();
        let mut animated = Vec::new();

        if self.coexist {
            match self.state {
                None => {
                    // First mount: everything up to the target appears at once.
                    for layer in 0..=target {
                        instant_adds.push(layer);
                    }
                }
                Some(current) if target > current => {
                    // Intermediate layers mount instantly, only the final one
                    // animates in.
                    for layer in current + 1..target {
                        instant_adds.push(layer);
                    }
                    animated.push((target, TransitionSide::Entry));
                }
                Some(current) => {
                    // Backward: strip layers above the target in one pass,
                    // animating only the topmost.
                    for layer in (target + 1..current).rev() {
                        instant_removes.push(layer);
                    }
                    animated.push((current, TransitionSide::Exit));
                }
            }
        } else {
            if let Some(current) = self.state {
                animated.push((current, TransitionSide::Exit));
            }
            animated.push((target, TransitionSide::Entry));
        }

        let _ = skip;
        let _ = forward;
        (instant_adds, instant_removes, animated)
    }

    /// Advance time-driven transitions. Returns `true` when the whole batch
    /// just finished.
    pub fn tick(&mut self, now_ms: u64, effects: &mut dyn StateEffects) -> bool {
        if self.batch.is_empty() || self.controlled {
            return false;
        }
        for transition in &mut self.batch {
            if transition.done {
                continue;
            }
            let Some(descriptor) = &transition.descriptor else {
                transition.finish(effects);
                continue;
            };
            let started = *transition.started_ms.get_or_insert(now_ms);
            let percent = (now_ms.saturating_sub(started)) as f64 / descriptor.duration_ms;
            if percent >= 1.0 {
                transition.apply(1.0, effects);
                transition.finish(effects);
            } else {
                transition.apply(percent, effects);
            }
        }
        self.settle_if_done()
    }

    /// Drive a controlled batch by gesture percent (magnitude of the signed
    /// gesture value).
    pub fn go_to_intermediate_state(&mut self, percent: f64, effects: &mut dyn StateEffects) {
        if !self.is_controlled() {
            return;
        }
        let percent = percent.abs().clamp(0.0, 1.0);
        for transition in &self.batch {
            transition.apply(percent, effects);
        }
    }

    /// Finish a controlled batch: commit when `|signed_percent| >= 0.5`, else
    /// cancel and revert to the previous state. Returns whether it committed.
    pub fn end_controlled_transition(
        &mut self,
        signed_percent: f64,
        effects: &mut dyn StateEffects,
    ) -> bool {
        if !self.is_controlled() {
            return false;
        }
        self.controlled = false;
        if signed_percent.abs() >= 0.5 {
            self.force_end(effects);
            return true;
        }

        // Cancel: entries unmount, exits snap back, state reverts.
        for transition in &mut self.batch {
            match transition.side {
                TransitionSide::Entry => effects.remove_layer(transition.layer),
                TransitionSide::Exit => effects.finalize_layer(transition.layer),
            }
            transition.done = true;
        }
        self.batch.clear();
        self.state = self.previous_state;
        false
    }

    /// Run every pending transition to completion synchronously (resize,
    /// navigator switch, shutdown).
    pub fn force_end(&mut self, effects: &mut dyn StateEffects) {
        self.controlled = false;
        for transition in &mut self.batch {
            if !transition.done {
                transition.apply(1.0, effects);
                transition.finish(effects);
            }
        }
        self.batch.clear();
    }

    fn settle_if_done(&mut self) -> bool {
        if self.batch.is_empty() || self.batch.iter().any(|t| !t.done) {
            return false;
        }
        self.batch.clear();
        true
    }
}
