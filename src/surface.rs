//! External-collaborator boundary.
//!
//! The engine never renders pixels, captures gestures, or shapes text. Hosts
//! supply a [`DrawingSurface`] (compositor nodes), a [`ResourceFetcher`]
//! (asynchronous decode/upload), and optionally a [`TextMeasurer`]. All three
//! are narrow by design; nothing else in the crate touches the outside world.

use std::collections::{HashMap, VecDeque};

use kurbo::{Affine, Size};

use crate::{
    model::{ResourceKind, TextStyle},
    resources::{ResourceId, Texture},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

/// Compositor abstraction: a tree of transformable, maskable nodes that can
/// carry one texture each (or step through sequence frames).
pub trait DrawingSurface {
    fn create_node(&mut self, parent: Option<NodeId>) -> NodeId;
    fn destroy_node(&mut self, node: NodeId);
    fn set_transform(&mut self, node: NodeId, transform: Affine);
    fn set_alpha(&mut self, node: NodeId, alpha: f64);
    fn set_visible(&mut self, node: NodeId, visible: bool);
    fn set_mask(&mut self, node: NodeId, clip: Option<kurbo::Rect>);
    fn set_texture(&mut self, node: NodeId, texture: Option<Texture>);
    fn set_sequence_frame(&mut self, node: NodeId, frame: usize);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FetchId(pub u64);

#[derive(Clone, Debug)]
pub struct FetchRequest {
    pub fetch: FetchId,
    pub resource: ResourceId,
    pub kind: ResourceKind,
    pub path: String,
}

#[derive(Clone, Debug)]
pub enum FetchOutcome {
    Loaded(Texture),
    Failed(String),
}

/// Asynchronous resource loading primitive.
///
/// `start` must not complete synchronously into the engine: the host collects
/// completions and feeds them back through the scheduler
/// ([`crate::loader::LoadScheduler::on_fetch_outcome`]). After `cancel`, a
/// late completion for that fetch id must be dropped by the host (the
/// scheduler also ignores unknown ids, so a stale completion is a no-op).
pub trait ResourceFetcher {
    fn start(&mut self, request: FetchRequest);
    fn cancel(&mut self, fetch: FetchId);
}

/// On-screen text measurement primitive (layout/shaping happens host-side).
pub trait TextMeasurer {
    fn measure(&mut self, text: &str, style: &TextStyle, viewport: Size) -> Size;
}

/// Surface implementation that records structure but draws nothing. Useful
/// for headless embedding and as the default until a host attaches.
#[derive(Debug, Default)]
pub struct NullSurface {
    next: u64,
    alive: HashMap<NodeId, Option<NodeId>>,
}

impl NullSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.alive.len()
    }

    pub fn is_alive(&self, node: NodeId) -> bool {
        self.alive.contains_key(&node)
    }
}

impl DrawingSurface for NullSurface {
    fn create_node(&mut self, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.next);
        self.next += 1;
        self.alive.insert(id, parent);
        id
    }

    fn destroy_node(&mut self, node: NodeId) {
        self.alive.remove(&node);
    }

    fn set_transform(&mut self, _node: NodeId, _transform: Affine) {}
    fn set_alpha(&mut self, _node: NodeId, _alpha: f64) {}
    fn set_visible(&mut self, _node: NodeId, _visible: bool) {}
    fn set_mask(&mut self, _node: NodeId, _clip: Option<kurbo::Rect>) {}
    fn set_texture(&mut self, _node: NodeId, _texture: Option<Texture>) {}
    fn set_sequence_frame(&mut self, _node: NodeId, _frame: usize) {}
}

/// Fetcher that never completes anything. Placeholder counterpart to
/// [`NullSurface`].
#[derive(Debug, Default)]
pub struct NullFetcher {
    pub started: VecDeque<FetchRequest>,
    pub canceled: Vec<FetchId>,
}

impl ResourceFetcher for NullFetcher {
    fn start(&mut self, request: FetchRequest) {
        self.started.push_back(request);
    }

    fn cancel(&mut self, fetch: FetchId) {
        self.canceled.push(fetch);
    }
}
