//! Viewport camera: progress mapping, snap points, zoom, kinetic scroll.
//!
//! The camera owns a center position in the zoomed scene referential and a
//! scalar `progress` along the reading axis. `progress` is `None` when the
//! content fits the viewport on that axis (centered, immovable). All mapping
//! is linear; snap points and point descriptors are converted to progress
//! once per layout and compared with a half-pixel epsilon so float drift can
//! never cause oscillation at page boundaries.

use kurbo::{Point, Size, Vec2};

use crate::{
    geom::{Axis, PIXEL_EPSILON, ReadingDirection},
    model::{HAlign, PointDescriptor, VAlign, ViewportAnchor},
};

pub const MAX_ZOOM: f64 = 3.0;

/// Exponential decay constant for kinetic scroll, in milliseconds.
const SCROLL_TAU_MS: f64 = 325.0;

/// Duration of a snap-point auto scroll.
const SNAP_SCROLL_MS: f64 = 250.0;

/// Leading-edge offset and length of one segment along the reading axis, in
/// unzoomed scene coordinates.
#[derive(Clone, Copy, Debug)]
pub struct SegmentGeometry {
    pub offset: f64,
    pub length: f64,
}

/// Synthesized "current segment + percent through it", the single source of
/// truth for visibility and load targeting.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VirtualPoint {
    pub page_segment_index: usize,
    pub percent: f64,
}

#[derive(Clone, Copy, Debug)]
struct KineticScroll {
    velocity: Vec2,
    last_ms: u64,
    generation: u64,
}

#[derive(Clone, Copy, Debug)]
struct SnapScroll {
    from: f64,
    target: f64,
    started_ms: u64,
    generation: u64,
}

#[derive(Debug)]
pub struct Camera {
    direction: ReadingDirection,
    paginated: bool,
    sticky: bool,
    grid_based: bool,
    h_align: HAlign,
    v_align: VAlign,
    viewport: Size,
    content: Size,
    segments: Vec<SegmentGeometry>,
    snap_progress: Vec<f64>,
    zoom: f64,
    /// Camera center in the zoomed referential.
    position: Point,
    progress: Option<f64>,
    kinetic: Option<KineticScroll>,
    snap_scroll: Option<SnapScroll>,
    /// Bumped on every cancellation so a superseded animation loop exits at
    /// the top of its next tick.
    generation: u64,
}

impl Camera {
    pub fn new(
        direction: ReadingDirection,
        paginated: bool,
        sticky: bool,
        grid_based: bool,
        h_align: HAlign,
        v_align: VAlign,
    ) -> Self {
        Self {
            direction,
            paginated,
            sticky,
            grid_based,
            h_align,
            v_align,
            viewport: Size::ZERO,
            content: Size::ZERO,
            segments: Vec::new(),
            snap_progress: Vec::new(),
            zoom: 1.0,
            position: Point::ZERO,
            progress: None,
            kinetic: None,
            snap_scroll: None,
            generation: 0,
        }
    }

    pub fn axis(&self) -> Axis {
        self.direction.axis()
    }

    pub fn progress(&self) -> Option<f64> {
        self.progress
    }

    pub fn zoom_factor(&self) -> f64 {
        self.zoom
    }

    pub fn position(&self) -> Point {
        self.position
    }

    pub fn is_paginated(&self) -> bool {
        self.paginated
    }

    pub fn is_pagination_sticky(&self) -> bool {
        self.sticky
    }

    pub fn is_auto_scrolling(&self) -> bool {
        self.kinetic.is_some() || self.snap_scroll.is_some()
    }

    /// Install new geometry. Zoom is forced back to 1 and any in-flight auto
    /// scroll is forced to its target first, so new bounds are never applied
    /// to a mid-flight position.
    pub fn set_layout(
        &mut self,
        viewport: Size,
        content: Size,
        segments: Vec<SegmentGeometry>,
        snap_points: &[PointDescriptor],
    ) {
        self.force_end_auto_scroll();
        self.zoom = 1.0;
        self.viewport = viewport;
        self.content = content;
        self.segments = segments;

        let previous = self.progress;
        self.recompute_bounds();
        self.snap_progress = self.convert_snap_points(snap_points);
        if let (Some(p), Some(_)) = (previous, self.progress) {
            self.set_progress(p);
        }
    }

    /// Distance the camera can cover along an axis at the current zoom.
    fn scrollable(&self, axis: Axis) -> f64 {
        axis.of(self.content) * self.zoom - axis.of(self.viewport)
    }

    fn bounds(&self, axis: Axis) -> Option<(f64, f64)> {
        if self.scrollable(axis) <= PIXEL_EPSILON {
            return None;
        }
        let half = axis.of(self.viewport) / 2.0;
        Some((half, axis.of(self.content) * self.zoom - half))
    }

    fn recompute_bounds(&mut self) {
        let axis = self.axis();
        // Primary axis.
        match self.bounds(axis) {
            Some((min, _)) => {
                self.progress.get_or_insert(0.0);
                let p = self.progress.unwrap_or(0.0);
                self.set_axis_position(axis, self.position_for_progress(p).unwrap_or(min));
            }
            None => {
                self.progress = None;
                self.set_axis_position(axis, axis.of(self.content) * self.zoom / 2.0);
            }
        }
        // Secondary axis: centered unless it overflows, then the alignment
        // picks the resting offset.
        let sec = axis.other();
        match self.bounds(sec) {
            Some((min, max)) => {
                let frac = self.align_fraction(sec);
                self.set_axis_position(sec, min + frac * (max - min));
            }
            None => self.set_axis_position(sec, sec.of(self.content) * self.zoom / 2.0),
        }
    }

    fn align_fraction(&self, axis: Axis) -> f64 {
        match axis {
            Axis::Horizontal => match self.h_align {
                HAlign::Left => 0.0,
                HAlign::Center => 0.5,
                HAlign::Right => 1.0,
            },
            Axis::Vertical => match self.v_align {
                VAlign::Top => 0.0,
                VAlign::Center => 0.5,
                VAlign::Bottom => 1.0,
            },
        }
    }

    fn set_axis_position(&mut self, axis: Axis, value: f64) {
        match axis {
            Axis::Horizontal => self.position.x = value,
            Axis::Vertical => self.position.y = value,
        }
    }

    fn axis_position(&self, axis: Axis) -> f64 {
        axis.coord(self.position)
    }

    /// Linear progress → primary-axis center position, direction-adjusted.
    fn position_for_progress(&self, progress: f64) -> Option<f64> {
        let (min, max) = self.bounds(self.axis())?;
        let p = progress.clamp(0.0, 1.0);
        Some(if self.direction.sign() > 0.0 {
            min + p * (max - min)
        } else {
            max - p * (max - min)
        })
    }

    fn progress_for_position(&self, position: f64) -> Option<f64> {
        let (min, max) = self.bounds(self.axis())?;
        let raw = (position - min) / (max - min);
        let p = if self.direction.sign() > 0.0 { raw } else { 1.0 - raw };
        Some(p.clamp(0.0, 1.0))
    }

    pub fn set_progress(&mut self, progress: f64) {
        let axis = self.axis();
        if let Some(pos) = self.position_for_progress(progress) {
            self.set_axis_position(axis, pos);
            self.progress = Some(progress.clamp(0.0, 1.0));
        }
    }

    /// Progress-equivalent of one viewport length.
    pub fn pagination_step(&self) -> Option<f64> {
        let distance = self.scrollable(self.axis());
        if distance <= PIXEL_EPSILON {
            return None;
        }
        Some(self.axis().of(self.viewport) / distance)
    }

    /// Half-pixel epsilon expressed in progress units.
    fn progress_epsilon(&self) -> f64 {
        let distance = self.scrollable(self.axis());
        if distance <= PIXEL_EPSILON {
            return 0.0;
        }
        PIXEL_EPSILON / distance
    }

    /// Move the camera center by a pixel delta, clamped to bounds on both
    /// axes. Returns the delta actually consumed; a zero primary component
    /// means "no space to move" and the caller should bubble the gesture up.
    pub fn move_by(&mut self, delta: Vec2) -> Vec2 {
        let mut consumed = Vec2::ZERO;
        for axis in [Axis::Horizontal, Axis::Vertical] {
            let d = match axis {
                Axis::Horizontal => delta.x,
                Axis::Vertical => delta.y,
            };
            if d == 0.0 {
                continue;
            }
            let Some((min, max)) = self.bounds(axis) else {
                continue;
            };
            let current = self.axis_position(axis);
            let next = (current + d).clamp(min, max);
            let moved = next - current;
            if moved.abs() > 0.0 {
                self.set_axis_position(axis, next);
                match axis {
                    Axis::Horizontal => consumed.x = moved,
                    Axis::Vertical => consumed.y = moved,
                }
            }
        }
        if consumed.x != 0.0 || consumed.y != 0.0 {
            let axis = self.axis();
            self.progress = self.progress_for_position(self.axis_position(axis));
        }
        consumed
    }

    // --- snap points ---------------------------------------------------

    /// Convert author snap points to progress values, enforcing monotonicity
    /// in declaration order.
    fn convert_snap_points(&self, points: &[PointDescriptor]) -> Vec<f64> {
        let mut progresses = Vec::with_capacity(points.len());
        let mut floor = 0.0f64;
        for point in points {
            let Some(p) = self.point_progress(point) else {
                continue;
            };
            let p = p.max(floor);
            floor = p;
            progresses.push(p);
        }
        progresses
    }

    /// Progress at which a point descriptor's scene coordinate meets its
    /// viewport anchor.
    pub fn point_progress(&self, point: &PointDescriptor) -> Option<f64> {
        let axis = self.axis();
        let segment = self
            .segments
            .get(point.page_segment_index.unwrap_or(0))
            .copied()
            .unwrap_or(SegmentGeometry {
                offset: 0.0,
                length: axis.of(self.content),
            });

        let coord = match axis {
            Axis::Horizontal => point.x,
            Axis::Vertical => point.y,
        };
        let within = match coord {
            Some((value, crate::fragment::Unit::Percent)) => segment.length * value / 100.0,
            Some((value, crate::fragment::Unit::Px)) => value,
            None => 0.0,
        };
        let scene = segment.offset + within;

        let half = axis.of(self.viewport) / 2.0;
        let s = self.direction.sign();
        let center = match point.viewport.unwrap_or(ViewportAnchor::Center) {
            ViewportAnchor::Start => scene + s * half,
            ViewportAnchor::Center => scene,
            ViewportAnchor::End => scene - s * half,
        };
        self.progress_for_position(center)
    }

    /// Next snap target at or above `reference`: the nearest explicit snap
    /// point competes with one pagination step (grid-aligned, or anchored to
    /// the drag origin); ties favor the explicit point.
    pub fn next_snap_point_progress(
        &self,
        reference: f64,
        drag_anchor: Option<f64>,
    ) -> Option<f64> {
        self.progress?;
        let eps = self.progress_epsilon();

        let explicit = self
            .snap_progress
            .iter()
            .copied()
            .filter(|p| *p > reference + eps)
            .fold(None::<f64>, |best, p| {
                Some(best.map_or(p, |b| b.min(p)))
            });

        let step = self.paginated.then(|| self.pagination_step()).flatten();
        let paged = step.map(|step| {
            if self.grid_based {
                // Next grid line strictly above the reference.
                let n = ((reference + eps) / step).floor() + 1.0;
                (n * step).min(1.0)
            } else {
                (drag_anchor.unwrap_or(reference) + step).min(1.0)
            }
        });

        match (explicit, paged) {
            (Some(e), Some(p)) => Some(if e <= p + eps { e } else { p }),
            (Some(e), None) => Some(e),
            (None, Some(p)) => Some(p),
            (None, None) => None,
        }
        .map(|p| p.clamp(reference, 1.0))
    }

    pub fn previous_snap_point_progress(
        &self,
        reference: f64,
        drag_anchor: Option<f64>,
    ) -> Option<f64> {
        self.progress?;
        let eps = self.progress_epsilon();

        let explicit = self
            .snap_progress
            .iter()
            .copied()
            .filter(|p| *p < reference - eps)
            .fold(None::<f64>, |best, p| {
                Some(best.map_or(p, |b| b.max(p)))
            });

        let step = self.paginated.then(|| self.pagination_step()).flatten();
        let paged = step.map(|step| {
            if self.grid_based {
                let n = ((reference - eps) / step).ceil() - 1.0;
                (n * step).max(0.0)
            } else {
                (drag_anchor.unwrap_or(reference) - step).max(0.0)
            }
        });

        match (explicit, paged) {
            (Some(e), Some(p)) => Some(if e >= p - eps { e } else { p }),
            (Some(e), None) => Some(e),
            (None, Some(p)) => Some(p),
            (None, None) => None,
        }
        .map(|p| p.clamp(0.0, reference))
    }

    // --- zoom ------------------------------------------------------------

    /// Change the zoom factor keeping the scene point under `viewport_point`
    /// visually stationary, then clamp to bounds.
    pub fn set_zoom_factor(&mut self, factor: f64, viewport_point: Point) {
        let factor = factor.clamp(1.0, MAX_ZOOM);
        if factor == self.zoom {
            return;
        }
        let old_zoom = self.zoom;
        self.zoom = factor;

        for axis in [Axis::Horizontal, Axis::Vertical] {
            let v = axis.coord(viewport_point);
            let half = axis.of(self.viewport) / 2.0;
            // Unzoomed scene point under the viewport point.
            let scene = (self.axis_position(axis) - half + v) / old_zoom;
            let mut center = scene * factor + half - v;
            center = match self.bounds(axis) {
                Some((min, max)) => center.clamp(min, max),
                None => axis.of(self.content) * factor / 2.0,
            };
            self.set_axis_position(axis, center);
        }

        let axis = self.axis();
        self.progress = self.progress_for_position(self.axis_position(axis));
        if self.progress.is_none() {
            // Content fits again on the primary axis at this zoom.
            self.set_axis_position(axis, axis.of(self.content) * self.zoom / 2.0);
        }
    }

    /// Instantaneous 1 ↔ MAX_ZOOM toggle (double tap).
    pub fn toggle_zoom(&mut self, viewport_point: Point) {
        let target = if self.zoom > 1.0 { 1.0 } else { MAX_ZOOM };
        self.set_zoom_factor(target, viewport_point);
    }

    /// Wheel-driven continuous zoom with exponential sensitivity.
    pub fn zoom_by_wheel(&mut self, wheel_delta: f64, viewport_point: Point) {
        let factor = self.zoom * (wheel_delta / 500.0).exp();
        self.set_zoom_factor(factor, viewport_point);
    }

    /// Pinch-driven continuous zoom: linear in the distance ratio.
    pub fn zoom_by_pinch(&mut self, distance_ratio: f64, viewport_point: Point) {
        if distance_ratio > 0.0 {
            self.set_zoom_factor(self.zoom * distance_ratio, viewport_point);
        }
    }

    // --- animation loops --------------------------------------------------

    /// Begin kinetic decay from a release velocity (px/ms).
    pub fn start_kinetic_scroll(&mut self, velocity: Vec2, now_ms: u64) {
        self.generation += 1;
        self.snap_scroll = None;
        self.kinetic = Some(KineticScroll {
            velocity,
            last_ms: now_ms,
            generation: self.generation,
        });
    }

    /// Animate progress toward a snap target.
    pub fn start_snap_scroll(&mut self, target: f64, now_ms: u64) {
        let Some(from) = self.progress else {
            return;
        };
        self.generation += 1;
        self.kinetic = None;
        self.snap_scroll = Some(SnapScroll {
            from,
            target: target.clamp(0.0, 1.0),
            started_ms: now_ms,
            generation: self.generation,
        });
    }

    /// Jump any in-flight auto scroll to its end value synchronously.
    pub fn force_end_auto_scroll(&mut self) {
        self.generation += 1;
        self.kinetic = None;
        if let Some(snap) = self.snap_scroll.take() {
            self.set_progress(snap.target);
        }
    }

    /// Per-frame update. Returns `true` while an auto scroll is still moving
    /// the camera.
    pub fn tick(&mut self, now_ms: u64) -> bool {
        if let Some(mut kinetic) = self.kinetic {
            if kinetic.generation != self.generation {
                self.kinetic = None;
                return false;
            }
            let dt = now_ms.saturating_sub(kinetic.last_ms) as f64;
            if dt <= 0.0 {
                return true;
            }
            let decay = (-dt / SCROLL_TAU_MS).exp();
            kinetic.velocity *= decay;
            kinetic.last_ms = now_ms;
            // Round to the nearest half pixel for a smooth stop.
            let delta = Vec2::new(
                (kinetic.velocity.x * dt * 2.0).round() / 2.0,
                (kinetic.velocity.y * dt * 2.0).round() / 2.0,
            );
            if delta.x.abs() < PIXEL_EPSILON && delta.y.abs() < PIXEL_EPSILON {
                self.kinetic = None;
                return false;
            }
            let consumed = self.move_by(delta);
            if consumed.x == 0.0 && consumed.y == 0.0 {
                self.kinetic = None;
                return false;
            }
            self.kinetic = Some(kinetic);
            return true;
        }

        if let Some(snap) = self.snap_scroll {
            if snap.generation != self.generation {
                self.snap_scroll = None;
                return false;
            }
            let t = (now_ms.saturating_sub(snap.started_ms) as f64 / SNAP_SCROLL_MS).min(1.0);
            let p = snap.from + (snap.target - snap.from) * t;
            self.set_progress(p);
            if t >= 1.0 {
                self.snap_scroll = None;
                return false;
            }
            return true;
        }
        false
    }

    // --- virtual point ------------------------------------------------

    /// The segment whose center is nearest the viewport center, plus the
    /// percent through it.
    pub fn virtual_point(&self) -> Option<VirtualPoint> {
        if self.segments.is_empty() {
            return None;
        }
        let axis = self.axis();
        let center = self.axis_position(axis) / self.zoom;

        let mut best = 0usize;
        let mut best_distance = f64::INFINITY;
        for (i, segment) in self.segments.iter().enumerate() {
            let seg_center = segment.offset + segment.length / 2.0;
            let d = (seg_center - center).abs();
            if d < best_distance {
                best_distance = d;
                best = i;
            }
        }
        let segment = self.segments[best];
        let percent = if segment.length > 0.0 {
            ((center - segment.offset) / segment.length).clamp(0.0, 1.0)
        } else {
            0.0
        };
        Some(VirtualPoint {
            page_segment_index: best,
            percent,
        })
    }

    /// Page-local indices of segments intersecting the viewport window.
    pub fn visible_segments(&self) -> Vec<usize> {
        let axis = self.axis();
        let half = axis.of(self.viewport) / 2.0 / self.zoom;
        let center = self.axis_position(axis) / self.zoom;
        let (lo, hi) = (center - half, center + half);
        self.segments
            .iter()
            .enumerate()
            .filter(|(_, s)| s.offset < hi + PIXEL_EPSILON && s.offset + s.length > lo - PIXEL_EPSILON)
            .map(|(i, _)| i)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::nearly_equal;

    fn camera(direction: ReadingDirection, paginated: bool) -> Camera {
        Camera::new(
            direction,
            paginated,
            true,
            true,
            HAlign::Center,
            VAlign::Center,
        )
    }

    fn strip(camera: &mut Camera, n: usize, seg_len: f64, viewport: Size) {
        let segments: Vec<SegmentGeometry> = (0..n)
            .map(|i| SegmentGeometry {
                offset: i as f64 * seg_len,
                length: seg_len,
            })
            .collect();
        camera.set_layout(
            viewport,
            Size::new(n as f64 * seg_len, viewport.height),
            segments,
            &[],
        );
    }

    #[test]
    fn fitting_content_has_no_progress() {
        let mut cam = camera(ReadingDirection::Ltr, false);
        strip(&mut cam, 1, 800.0, Size::new(800.0, 600.0));
        assert_eq!(cam.progress(), None);
        assert_eq!(cam.position().x, 400.0);
        // And it cannot move.
        assert_eq!(cam.move_by(Vec2::new(100.0, 0.0)), Vec2::ZERO);
    }

    #[test]
    fn progress_maps_linearly_with_direction_sign() {
        let mut cam = camera(ReadingDirection::Ltr, false);
        strip(&mut cam, 3, 800.0, Size::new(800.0, 600.0));
        assert_eq!(cam.progress(), Some(0.0));
        assert_eq!(cam.position().x, 400.0);
        cam.set_progress(1.0);
        assert_eq!(cam.position().x, 2000.0);
        cam.set_progress(0.5);
        assert_eq!(cam.position().x, 1200.0);

        let mut cam = camera(ReadingDirection::Rtl, false);
        strip(&mut cam, 3, 800.0, Size::new(800.0, 600.0));
        // rtl progress 0 rests at the far (right) edge.
        assert_eq!(cam.position().x, 2000.0);
        cam.set_progress(1.0);
        assert_eq!(cam.position().x, 400.0);
    }

    #[test]
    fn resize_preserves_progress_idempotently() {
        let mut cam = camera(ReadingDirection::Ltr, false);
        strip(&mut cam, 3, 800.0, Size::new(800.0, 600.0));
        cam.set_progress(0.4);
        strip(&mut cam, 3, 800.0, Size::new(800.0, 600.0));
        let first = (cam.progress().unwrap(), cam.position());
        strip(&mut cam, 3, 800.0, Size::new(800.0, 600.0));
        assert!(nearly_equal(cam.progress().unwrap(), first.0));
        assert_eq!(cam.position(), first.1);
    }

    #[test]
    fn move_by_clamps_and_updates_progress() {
        let mut cam = camera(ReadingDirection::Ltr, false);
        strip(&mut cam, 2, 800.0, Size::new(800.0, 600.0));
        let consumed = cam.move_by(Vec2::new(400.0, 0.0));
        assert_eq!(consumed.x, 400.0);
        assert!(nearly_equal(cam.progress().unwrap(), 0.5));

        // Over-scroll clamps at the far bound.
        let consumed = cam.move_by(Vec2::new(10_000.0, 0.0));
        assert_eq!(consumed.x, 400.0);
        assert_eq!(cam.progress(), Some(1.0));
        assert_eq!(cam.move_by(Vec2::new(50.0, 0.0)), Vec2::ZERO);
    }

    #[test]
    fn grid_step_competes_with_explicit_snap_points() {
        // Viewport 800 over 800*11 content: distance 8000, step 0.1. Scale so
        // the step is 0.3: viewport 600 over 2600 content.
        let mut cam = camera(ReadingDirection::Ltr, true);
        cam.set_layout(
            Size::new(600.0, 600.0),
            Size::new(2600.0, 600.0),
            vec![SegmentGeometry {
                offset: 0.0,
                length: 2600.0,
            }],
            &[],
        );
        assert!(nearly_equal(cam.pagination_step().unwrap(), 0.3));
        cam.snap_progress = vec![0.2, 0.7];

        // From 0.5 forward: grid line 0.6 beats snap point 0.7.
        cam.set_progress(0.5);
        let next = cam.next_snap_point_progress(0.5, None).unwrap();
        assert!((next - 0.6).abs() < 0.01);

        // From 0.61 forward: snap point 0.7 is nearer than grid line 0.9.
        let next = cam.next_snap_point_progress(0.61, None).unwrap();
        assert!((next - 0.7).abs() < 0.01);
    }

    #[test]
    fn snap_selection_is_monotonic() {
        let mut cam = camera(ReadingDirection::Ltr, true);
        strip(&mut cam, 5, 800.0, Size::new(800.0, 600.0));
        cam.snap_progress = vec![0.25, 0.5, 0.75];
        for p in [0.0, 0.1, 0.3, 0.49, 0.8, 1.0] {
            if let Some(next) = cam.next_snap_point_progress(p, None) {
                assert!(next >= p);
            }
            if let Some(prev) = cam.previous_snap_point_progress(p, None) {
                assert!(prev <= p);
            }
        }
    }

    #[test]
    fn snap_point_conversion_is_monotone_and_anchored() {
        let mut cam = camera(ReadingDirection::Ltr, true);
        let points = vec![
            PointDescriptor {
                page_segment_index: Some(1),
                viewport: Some(ViewportAnchor::Start),
                x: Some((0.0, crate::fragment::Unit::Percent)),
                y: None,
            },
            // Declared out of order on purpose; conversion clamps upward.
            PointDescriptor {
                page_segment_index: Some(0),
                viewport: Some(ViewportAnchor::Start),
                x: Some((0.0, crate::fragment::Unit::Percent)),
                y: None,
            },
        ];
        let segments: Vec<SegmentGeometry> = (0..3)
            .map(|i| SegmentGeometry {
                offset: i as f64 * 800.0,
                length: 800.0,
            })
            .collect();
        cam.set_layout(
            Size::new(800.0, 600.0),
            Size::new(2400.0, 600.0),
            segments,
            &points,
        );
        assert_eq!(cam.snap_progress.len(), 2);
        assert!(cam.snap_progress[1] >= cam.snap_progress[0]);
        // Segment 1's leading edge at the viewport start = half the range.
        assert!(nearly_equal(cam.snap_progress[0], 0.5));
    }

    #[test]
    fn zoom_round_trip_restores_position() {
        let mut cam = camera(ReadingDirection::Ltr, false);
        strip(&mut cam, 3, 800.0, Size::new(800.0, 600.0));
        cam.set_progress(0.5);
        let before = cam.position();

        let touch = Point::new(200.0, 150.0);
        cam.set_zoom_factor(2.0, touch);
        assert_eq!(cam.zoom_factor(), 2.0);
        cam.set_zoom_factor(1.0, touch);
        assert!((cam.position().x - before.x).abs() < PIXEL_EPSILON);
        assert!((cam.position().y - before.y).abs() < PIXEL_EPSILON);
    }

    #[test]
    fn zoom_keeps_touch_point_fixed() {
        let mut cam = camera(ReadingDirection::Ltr, false);
        strip(&mut cam, 3, 800.0, Size::new(800.0, 600.0));
        cam.set_progress(0.5);

        let touch = Point::new(600.0, 300.0);
        let scene_before = (cam.position().x - 400.0 + touch.x) / cam.zoom_factor();
        cam.set_zoom_factor(2.0, touch);
        let scene_after = (cam.position().x - 400.0 + touch.x) / cam.zoom_factor();
        assert!((scene_before - scene_after).abs() < PIXEL_EPSILON);
    }

    #[test]
    fn kinetic_scroll_decays_to_a_stop() {
        let mut cam = camera(ReadingDirection::Ltr, false);
        strip(&mut cam, 10, 800.0, Size::new(800.0, 600.0));
        cam.start_kinetic_scroll(Vec2::new(2.0, 0.0), 0);

        let mut now = 0;
        let mut ticks = 0;
        while cam.tick(now) {
            now += 16;
            ticks += 1;
            assert!(ticks < 1000, "kinetic scroll never stopped");
        }
        assert!(cam.progress().unwrap() > 0.0);
        assert!(!cam.is_auto_scrolling());
    }

    #[test]
    fn force_end_jumps_snap_scroll_to_target() {
        let mut cam = camera(ReadingDirection::Ltr, true);
        strip(&mut cam, 5, 800.0, Size::new(800.0, 600.0));
        cam.start_snap_scroll(1.0, 0);
        cam.tick(50);
        assert!(cam.progress().unwrap() < 1.0);
        cam.force_end_auto_scroll();
        assert_eq!(cam.progress(), Some(1.0));
        assert!(!cam.is_auto_scrolling());
    }

    #[test]
    fn virtual_point_tracks_nearest_segment_center() {
        let mut cam = camera(ReadingDirection::Ltr, false);
        strip(&mut cam, 4, 800.0, Size::new(800.0, 600.0));
        cam.set_progress(0.0);
        let vp = cam.virtual_point().unwrap();
        assert_eq!(vp.page_segment_index, 0);
        assert!(nearly_equal(vp.percent, 0.5));

        cam.set_progress(1.0);
        let vp = cam.virtual_point().unwrap();
        assert_eq!(vp.page_segment_index, 3);
    }

    #[test]
    fn visible_segments_cover_the_viewport_window() {
        let mut cam = camera(ReadingDirection::Ltr, false);
        strip(&mut cam, 4, 800.0, Size::new(800.0, 600.0));
        cam.set_progress(0.0);
        assert_eq!(cam.visible_segments(), vec![0]);
        cam.set_progress(0.5);
        // Centered at 1600: window [1200, 2000] touches segments 1 and 2.
        assert_eq!(cam.visible_segments(), vec![1, 2]);
    }
}
