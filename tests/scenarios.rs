use std::{cell::RefCell, io::Cursor, rc::Rc};

use divina::{
    Camera, FragmentRect, LoadStatus, Locations, Locator, Player, PlayerOptions, ReadingMode,
    Unit,
    camera::SegmentGeometry,
    decode::FileFetcher,
    geom::ReadingDirection,
    model::{HAlign, PointDescriptor, VAlign, ViewportAnchor},
    surface::{FetchId, FetchRequest, ResourceFetcher},
};
use kurbo::Size;
use serde_json::json;

fn temp_dir(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!(
        "divina_{name}_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ))
}

fn write_png(path: &std::path::Path, width: u32, height: u32) {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([10, 20, 30, 255]));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    std::fs::write(path, &buf).unwrap();
}

/// Fetcher handle shared between the player and the test body, so completions
/// can be drained and fed back through the public API.
#[derive(Clone)]
struct SharedFetcher(Rc<RefCell<FileFetcher>>);

impl SharedFetcher {
    fn new(root: std::path::PathBuf) -> Self {
        Self(Rc::new(RefCell::new(FileFetcher::new(root))))
    }
}

impl ResourceFetcher for SharedFetcher {
    fn start(&mut self, request: FetchRequest) {
        self.0.borrow_mut().start(request);
    }

    fn cancel(&mut self, fetch: FetchId) {
        self.0.borrow_mut().cancel(fetch);
    }
}

/// Feed queued fetch completions back into the player until none remain.
fn pump(player: &mut Player, fetcher: &SharedFetcher, now: &mut u64) {
    loop {
        let done = fetcher.0.borrow_mut().drain_completions();
        if done.is_empty() {
            break;
        }
        for (fetch, outcome) in done {
            *now += 1;
            player.on_fetch_outcome(fetch, outcome, *now);
        }
    }
    player.tick(*now);
}

#[test]
fn continuous_ltr_story_builds_one_scroll_page() {
    let fetcher = SharedFetcher::new(std::env::temp_dir());
    let player = Player::open_value(
        json!({
            "metadata": { "continuous": true, "direction": "ltr" },
            "readingOrder": [
                { "href": "a.png", "width": 800, "height": 600 },
                { "href": "b.png", "width": 800, "height": 600 },
                { "href": "c.png", "width": 800, "height": 600 }
            ]
        }),
        Size::new(800.0, 600.0),
        PlayerOptions::default(),
        Box::new(fetcher),
    )
    .unwrap();

    assert_eq!(player.available_reading_modes(), &[ReadingMode::Scroll]);
    assert_eq!(player.navigator().nb_of_segments(), 3);
    assert_eq!(player.nb_of_pages(), 1);
}

#[test]
fn alternating_spread_story_offers_single_and_double_layouts() {
    let fetcher = SharedFetcher::new(std::env::temp_dir());
    let mut player = Player::open_value(
        json!({
            "metadata": { "continuous": false, "spread": "both" },
            "readingOrder": [
                { "href": "p1.png", "properties": { "page": "left" } },
                { "href": "p2.png", "properties": { "page": "right" } },
                { "href": "p3.png", "properties": { "page": "left" } },
                { "href": "p4.png", "properties": { "page": "right" } }
            ]
        }),
        Size::new(800.0, 600.0),
        PlayerOptions::default(),
        Box::new(fetcher),
    )
    .unwrap();

    assert_eq!(
        player.available_reading_modes(),
        &[ReadingMode::Single, ReadingMode::Double]
    );
    assert_eq!(player.nb_of_pages(), 4);

    assert!(player.set_reading_mode(ReadingMode::Double, 0));
    assert_eq!(player.nb_of_pages(), 2);
    for page in &player.navigator().scene().pages {
        assert_eq!(page.segments.len(), 2);
    }
}

#[test]
fn failed_video_falls_back_to_uncropped_image() {
    let tmp = temp_dir("video_fallback");
    std::fs::create_dir_all(&tmp).unwrap();
    write_png(&tmp.join("a.jpg"), 64, 32);

    let fetcher = SharedFetcher::new(tmp.clone());
    let mut player = Player::open_value(
        json!({
            "metadata": { "continuous": true },
            "readingOrder": [
                {
                    "href": "a.mp4",
                    "type": "video/mp4",
                    "alternate": [ { "href": "a.jpg", "type": "image/jpeg" } ]
                }
            ]
        }),
        Size::new(800.0, 600.0),
        PlayerOptions::default(),
        Box::new(fetcher.clone()),
    )
    .unwrap();

    let mut now = 0;
    pump(&mut player, &fetcher, &mut now);

    let scene = player.navigator().scene();
    let id = scene.pages[0].segments[0].parent.loading_unit()[0];
    let resource = player.registry().get(id).unwrap();
    assert_eq!(resource.status, LoadStatus::PartiallyLoaded);

    // The fallback serves the full texture even to fragment consumers.
    let fragment = FragmentRect {
        x: 0.0,
        y: 0.0,
        w: 8.0,
        h: 8.0,
        unit: Unit::Px,
    };
    let texture = resource.texture_for(Some(&fragment)).unwrap();
    assert_eq!((texture.width, texture.height), (64, 32));

    std::fs::remove_dir_all(&tmp).ok();
}

#[test]
fn grid_pagination_competes_with_explicit_snap_points() {
    // Pagination step 0.3 (viewport 600 over a 2000px scroll range), explicit
    // snap points at progress 0.2 and 0.7.
    let mut camera = Camera::new(
        ReadingDirection::Ltr,
        true,
        true,
        true,
        HAlign::Center,
        VAlign::Center,
    );
    let snaps = [
        PointDescriptor {
            page_segment_index: Some(0),
            viewport: Some(ViewportAnchor::Center),
            x: Some((700.0, Unit::Px)),
            y: None,
        },
        PointDescriptor {
            page_segment_index: Some(0),
            viewport: Some(ViewportAnchor::Center),
            x: Some((1700.0, Unit::Px)),
            y: None,
        },
    ];
    camera.set_layout(
        Size::new(600.0, 600.0),
        Size::new(2600.0, 600.0),
        vec![SegmentGeometry {
            offset: 0.0,
            length: 2600.0,
        }],
        &snaps,
    );

    // From 0.5 the next grid line (0.6) beats the explicit point at 0.7.
    camera.set_progress(0.5);
    let next = camera.next_snap_point_progress(0.5, None).unwrap();
    assert!((next - 0.6).abs() < 1e-6, "got {next}");

    // From 0.61 the explicit point at 0.7 beats the grid line at 0.9.
    let next = camera.next_snap_point_progress(0.61, None).unwrap();
    assert!((next - 0.7).abs() < 1e-6, "got {next}");
}

#[test]
fn segment_loading_window_moves_and_destroys_behind() {
    let tmp = temp_dir("loading_window");
    std::fs::create_dir_all(&tmp).unwrap();
    for i in 0..10 {
        write_png(&tmp.join(format!("img{i}.png")), 8, 6);
    }

    let order: Vec<serde_json::Value> = (0..10)
        .map(|i| json!({ "href": format!("img{i}.png"), "width": 800, "height": 600 }))
        .collect();
    let fetcher = SharedFetcher::new(tmp.clone());
    let mut player = Player::open_value(
        json!({
            "metadata": {
                "continuous": true,
                "loadingMode": "segment",
                "allowsDestroy": true
            },
            "readingOrder": order
        }),
        Size::new(800.0, 600.0),
        PlayerOptions {
            max_nb_of_units_to_load_after: Some(3),
            ..PlayerOptions::default()
        },
        Box::new(fetcher.clone()),
    )
    .unwrap();

    assert_eq!(player.navigator().segment_range(), Some((0, 3)));

    let mut now = 0;
    pump(&mut player, &fetcher, &mut now);
    let scene = player.navigator().scene();
    let first = scene.pages[0].segments[0].parent.loading_unit()[0];
    assert_eq!(player.registry().status(first), LoadStatus::Loaded);

    // Move the target to segment 5: window becomes [4, 8] (before share =
    // ceil(3 / 3) = 1) and segment 0 is destroyed.
    let locator = Locator {
        locations: Locations {
            position: Some(5),
            ..Locations::default()
        },
        ..Locator::default()
    };
    now += 10;
    assert!(player.go_to(&locator, now));
    assert_eq!(player.navigator().current_segment_index(), 5);
    assert_eq!(player.navigator().segment_range(), Some((4, 8)));
    assert_eq!(player.registry().status(first), LoadStatus::NotStarted);

    std::fs::remove_dir_all(&tmp).ok();
}
