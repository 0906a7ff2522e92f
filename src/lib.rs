#![forbid(unsafe_code)]

pub mod camera;
pub mod decode;
pub mod error;
pub mod fragment;
pub mod geom;
pub mod loader;
pub mod manifest;
pub mod model;
pub mod navigator;
pub mod options;
pub mod player;
pub mod resources;
pub mod scene;
pub mod surface;
pub mod transition;

pub use camera::{Camera, VirtualPoint};
pub use error::{DivinaError, DivinaResult};
pub use fragment::{FragmentRect, Unit, parse_fragment, serialize_fragment, split_href};
pub use geom::{Axis, ReadingDirection};
pub use loader::{LoadScheduler, SchedulerConfig};
pub use manifest::Manifest;
pub use model::{ManifestModel, Metadata, ResourceKind};
pub use navigator::{
    Handled, LoadContext, NavigationNode, NavigatorOptions, PageNavigator, ReadingMode,
};
pub use player::{Locations, Locator, Player, PlayerEvent, PlayerOptions, fatal_error_text};
pub use resources::{LoadStatus, ResourceId, ResourceRegistry, Texture};
pub use scene::{SceneGraph, SliceId};
pub use surface::{DrawingSurface, FetchOutcome, FetchRequest, NullSurface, ResourceFetcher};
