//! Default image decoding for hosts without their own texture pipeline.

use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;

use crate::{
    error::DivinaResult,
    model::ResourceKind,
    resources::Texture,
    surface::{FetchId, FetchOutcome, FetchRequest, ResourceFetcher},
};

/// Decode encoded image bytes into a premultiplied RGBA8 texture.
pub fn decode_image(bytes: &[u8]) -> DivinaResult<Texture> {
    let dyn_img = image::load_from_memory(bytes).context("decode image from memory")?;
    let rgba = dyn_img.to_rgba8();
    let (width, height) = rgba.dimensions();

    let mut rgba8_premul = rgba.into_raw();
    premultiply_rgba8_in_place(&mut rgba8_premul);

    Ok(Texture {
        width,
        height,
        data: Arc::new(rgba8_premul),
    })
}

fn premultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
            continue;
        }
        px[0] = ((px[0] as u16 * a + 127) / 255) as u8;
        px[1] = ((px[1] as u16 * a + 127) / 255) as u8;
        px[2] = ((px[2] as u16 * a + 127) / 255) as u8;
    }
}

/// Filesystem-backed [`ResourceFetcher`].
///
/// Decoding happens synchronously at `start`, but completions are queued and
/// only reach the engine when the host drains them into the scheduler — the
/// engine still sees the asynchronous protocol. Video and audio paths fail
/// here (this fetcher has no media decoder), which exercises the regular
/// fallback machinery.
#[derive(Debug, Default)]
pub struct FileFetcher {
    root: PathBuf,
    completed: VecDeque<(FetchId, FetchOutcome)>,
    canceled: Vec<FetchId>,
}

impl FileFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            completed: VecDeque::new(),
            canceled: Vec::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Completions queued since the last drain, oldest first. Completions for
    /// canceled fetch ids have already been dropped.
    pub fn drain_completions(&mut self) -> Vec<(FetchId, FetchOutcome)> {
        self.completed.drain(..).collect()
    }
}

impl ResourceFetcher for FileFetcher {
    fn start(&mut self, request: FetchRequest) {
        let outcome = match request.kind {
            ResourceKind::Image => {
                let path = self.root.join(&request.path);
                match std::fs::read(&path) {
                    Ok(bytes) => match decode_image(&bytes) {
                        Ok(texture) => FetchOutcome::Loaded(texture),
                        Err(e) => FetchOutcome::Failed(format!("decode {}: {e}", request.path)),
                    },
                    Err(e) => FetchOutcome::Failed(format!("read {}: {e}", request.path)),
                }
            }
            ResourceKind::Video | ResourceKind::Audio => {
                FetchOutcome::Failed(format!("no media decoder for {}", request.path))
            }
        };
        self.completed.push_back((request.fetch, outcome));
    }

    fn cancel(&mut self, fetch: FetchId) {
        self.completed.retain(|(id, _)| *id != fetch);
        self.canceled.push(fetch);
    }
}
