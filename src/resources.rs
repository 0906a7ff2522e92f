//! Deduplicated table of resource descriptors and their decoded textures.
//!
//! The registry is the single owner of decoded textures. Slices hold only
//! [`ResourceId`]s; nothing frees a texture directly — destruction goes
//! through [`ResourceRegistry::destroy_if_unused`], which consults every
//! dependent slice's active flag first.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use kurbo::{Rect, Size};

use crate::{
    fragment::{FragmentRect, serialize_fragment},
    model::{ResourceKind, ResourceSpec},
    scene::SliceId,
};

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct ResourceId(pub u32);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoadStatus {
    #[default]
    NotStarted,
    Loading,
    /// A fallback stands in for the real resource (e.g. video poster image).
    PartiallyLoaded,
    Loaded,
}

/// Decoded premultiplied-RGBA8 texture.
#[derive(Clone, Debug)]
pub struct Texture {
    pub width: u32,
    pub height: u32,
    pub data: Arc<Vec<u8>>,
}

impl Texture {
    pub fn size(&self) -> Size {
        Size::new(f64::from(self.width), f64::from(self.height))
    }

    /// Extract the sub-texture covered by `rect` (pixel coordinates, already
    /// clamped to this texture's bounds).
    pub fn crop(&self, rect: Rect) -> Self {
        let x0 = (rect.x0.max(0.0) as u32).min(self.width);
        let y0 = (rect.y0.max(0.0) as u32).min(self.height);
        let x1 = (rect.x1.max(0.0) as u32).clamp(x0, self.width);
        let y1 = (rect.y1.max(0.0) as u32).clamp(y0, self.height);
        let (w, h) = (x1 - x0, y1 - y0);

        let mut data = Vec::with_capacity((w * h * 4) as usize);
        let stride = (self.width * 4) as usize;
        for row in y0..y1 {
            let start = row as usize * stride + (x0 * 4) as usize;
            data.extend_from_slice(&self.data[start..start + (w * 4) as usize]);
        }
        Self {
            width: w,
            height: h,
            data: Arc::new(data),
        }
    }
}

#[derive(Clone, Debug)]
struct FragmentEntry {
    rect: FragmentRect,
    texture: Option<Texture>,
    consumers: BTreeSet<SliceId>,
}

#[derive(Clone, Debug)]
pub struct Resource {
    pub id: ResourceId,
    pub kind: ResourceKind,
    pub mime: Option<String>,
    pub path: String,
    pub natural_size: Option<Size>,
    pub language: Option<String>,
    pub fallbacks: Vec<ResourceSpec>,
    pub status: LoadStatus,
    full_texture: Option<Texture>,
    fragments: HashMap<String, FragmentEntry>,
    consumers: BTreeSet<SliceId>,
}

impl Resource {
    pub fn full_texture(&self) -> Option<&Texture> {
        self.full_texture.as_ref()
    }

    /// Texture for a consumer: the fragment sub-texture when one was
    /// requested and the resource loaded normally. A fallback-backed resource
    /// always serves the uncropped full image, whatever fragment the slice
    /// asked for.
    pub fn texture_for(&self, fragment: Option<&FragmentRect>) -> Option<&Texture> {
        if self.status == LoadStatus::PartiallyLoaded {
            return self.full_texture.as_ref();
        }
        match fragment {
            Some(rect) => self
                .fragments
                .get(&serialize_fragment(rect))
                .and_then(|entry| entry.texture.as_ref())
                .or(self.full_texture.as_ref()),
            None => self.full_texture.as_ref(),
        }
    }

    fn all_consumers(&self) -> impl Iterator<Item = SliceId> + '_ {
        self.consumers
            .iter()
            .copied()
            .chain(self.fragments.values().flat_map(|f| f.consumers.iter().copied()))
    }

    fn recompute_fragments(&mut self) {
        let (Some(full), Some(natural)) = (self.full_texture.clone(), self.natural_size) else {
            return;
        };
        for entry in self.fragments.values_mut() {
            entry.texture = Some(full.crop(entry.rect.resolve_px(natural)));
        }
    }
}

#[derive(Debug, Default)]
pub struct ResourceRegistry {
    resources: Vec<Resource>,
    /// Image dedup table. Video and audio always get fresh ids: a playing
    /// media element can only be mounted in one place at a time.
    ids_by_path: HashMap<String, ResourceId>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Register a resource descriptor, reusing the existing id for an
    /// already-known image path. Returns `None` for an empty path.
    pub fn get_or_create_id(&mut self, spec: &ResourceSpec) -> Option<ResourceId> {
        if spec.path.is_empty() {
            return None;
        }
        if spec.kind == ResourceKind::Image {
            if let Some(id) = self.ids_by_path.get(&spec.path) {
                return Some(*id);
            }
        }

        let id = ResourceId(u32::try_from(self.resources.len()).ok()?);
        let natural_size = match (spec.width, spec.height) {
            (Some(w), Some(h)) => Some(Size::new(w, h)),
            _ => None,
        };
        self.resources.push(Resource {
            id,
            kind: spec.kind,
            mime: spec.mime.clone(),
            path: spec.path.clone(),
            natural_size,
            language: spec.language.clone(),
            fallbacks: spec.fallbacks.clone(),
            status: LoadStatus::NotStarted,
            full_texture: None,
            fragments: HashMap::new(),
            consumers: BTreeSet::new(),
        });
        if spec.kind == ResourceKind::Image {
            self.ids_by_path.insert(spec.path.clone(), id);
        }
        Some(id)
    }

    pub fn get(&self, id: ResourceId) -> Option<&Resource> {
        self.resources.get(id.0 as usize)
    }

    pub fn get_mut(&mut self, id: ResourceId) -> Option<&mut Resource> {
        self.resources.get_mut(id.0 as usize)
    }

    pub fn status(&self, id: ResourceId) -> LoadStatus {
        self.get(id).map(|r| r.status).unwrap_or_default()
    }

    /// Record that `slice` renders `id`, lazily creating the fragment entry
    /// when a media fragment is requested.
    pub fn register_consumer(
        &mut self,
        id: ResourceId,
        fragment: Option<&FragmentRect>,
        slice: SliceId,
    ) {
        let Some(resource) = self.get_mut(id) else {
            return;
        };
        match fragment {
            Some(rect) => {
                let entry = resource
                    .fragments
                    .entry(serialize_fragment(rect))
                    .or_insert_with(|| FragmentEntry {
                        rect: *rect,
                        texture: None,
                        consumers: BTreeSet::new(),
                    });
                entry.consumers.insert(slice);
            }
            None => {
                resource.consumers.insert(slice);
            }
        }
        // A fragment added after the full texture landed gets its sub-texture
        // immediately.
        if self.resources[id.0 as usize].full_texture.is_some() {
            self.resources[id.0 as usize].recompute_fragments();
        }
    }

    pub fn set_loading(&mut self, id: ResourceId) {
        if let Some(resource) = self.get_mut(id) {
            if resource.status == LoadStatus::NotStarted {
                resource.status = LoadStatus::Loading;
            }
        }
    }

    /// Full texture arrived: status becomes `Loaded` and every lazily created
    /// fragment is recomputed from it.
    pub fn set_loaded(&mut self, id: ResourceId, texture: Texture) {
        let Some(resource) = self.get_mut(id) else {
            return;
        };
        resource.natural_size = Some(texture.size());
        resource.full_texture = Some(texture);
        resource.status = LoadStatus::Loaded;
        resource.recompute_fragments();
    }

    /// A fallback image stands in for a failed media resource.
    pub fn set_fallback_loaded(&mut self, id: ResourceId, texture: Texture) {
        let Some(resource) = self.get_mut(id) else {
            return;
        };
        resource.natural_size = Some(texture.size());
        resource.full_texture = Some(texture);
        resource.status = LoadStatus::PartiallyLoaded;
        tracing::debug!(resource = id.0, "fallback texture installed");
    }

    /// Cancellation path: anything not fully loaded reverts to `NotStarted`.
    /// Already-loaded resources are never reset by a cancellation.
    pub fn reset_if_not_loaded(&mut self, id: ResourceId) {
        if let Some(resource) = self.get_mut(id) {
            if resource.status != LoadStatus::Loaded {
                resource.status = LoadStatus::NotStarted;
                resource.full_texture = None;
                for entry in resource.fragments.values_mut() {
                    entry.texture = None;
                }
            }
        }
    }

    /// Pick the fallback best matching the current tag selection: a
    /// tag-matching fallback first, then an untagged one, then any.
    pub fn best_fallback(&self, id: ResourceId, tag: Option<&str>) -> Option<ResourceSpec> {
        let fallbacks = &self.get(id)?.fallbacks;
        fallbacks
            .iter()
            .find(|f| tag.is_some() && f.language.as_deref() == tag)
            .or_else(|| fallbacks.iter().find(|f| f.language.is_none()))
            .or_else(|| fallbacks.first())
            .cloned()
    }

    /// Free a resource's textures when no dependent slice is active (or
    /// unconditionally when `force` is set: navigator switch, tag change,
    /// shutdown). Returns whether anything was freed.
    pub fn destroy_if_unused(
        &mut self,
        id: ResourceId,
        force: bool,
        is_active: &dyn Fn(SliceId) -> bool,
    ) -> bool {
        let Some(resource) = self.resources.get(id.0 as usize) else {
            return false;
        };
        if resource.status == LoadStatus::NotStarted && resource.full_texture.is_none() {
            return false;
        }
        if !force && resource.all_consumers().any(|slice| is_active(slice)) {
            return false;
        }

        let resource = &mut self.resources[id.0 as usize];
        resource.full_texture = None;
        for entry in resource.fragments.values_mut() {
            entry.texture = None;
        }
        resource.status = LoadStatus::NotStarted;
        tracing::debug!(resource = id.0, force, "resource destroyed");
        true
    }
}
