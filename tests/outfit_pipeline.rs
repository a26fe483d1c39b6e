use image::{Rgba, RgbaImage};
use tokio_util::sync::CancellationToken;
use wardrobe_fx::avatar::{AvatarRenderer, NodeKind, PlacedLayer, RenderPlan};
use wardrobe_fx::raster::encode_png;
use wardrobe_fx::source::png_data_url;
use wardrobe_fx::trim::{Padding, TrimCache, TrimOptions, Trimmed};
use wardrobe_fx::{
    AnchorRegistry, Category, GarmentAsset, ImageSource, LayerCompositor, LayerInstruction,
    OutfitSelection,
};

const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);
const GREEN: Rgba<u8> = Rgba([0, 255, 0, 255]);

/// Opaque square of `color` inside a transparent margin
fn garment_png(color: Rgba<u8>) -> Vec<u8> {
    let image = RgbaImage::from_fn(40, 40, |x, y| {
        if (10..30).contains(&x) && (10..30).contains(&y) {
            color
        } else {
            Rgba([0, 0, 0, 0])
        }
    });
    encode_png(&image).unwrap()
}

fn outfit() -> OutfitSelection {
    let mut selection = OutfitSelection::new();
    selection.select(GarmentAsset::new(
        "itemA",
        Category::Tops,
        png_data_url(&garment_png(BLUE)),
    ));
    selection.select(GarmentAsset::new(
        "itemB",
        Category::Bottoms,
        png_data_url(&garment_png(GREEN)),
    ));
    selection
}

async fn trimmed_images(cache: &TrimCache, layers: &[LayerInstruction]) -> Vec<RgbaImage> {
    let cancel = CancellationToken::new();
    let mut images = Vec::new();
    for layer in layers {
        let source = ImageSource::parse(&layer.image_source).unwrap();
        let trimmed = cache.trim(&source, &cancel).await.unwrap();
        images.push(trimmed.source(&source.key()).decode().unwrap().to_rgba8());
    }
    images
}

fn paint_order(plan: &RenderPlan) -> Vec<String> {
    plan.nodes
        .iter()
        .filter_map(|node| match &node.kind {
            NodeKind::Garment { garment_id, .. } => Some(garment_id.clone()),
            _ => None,
        })
        .collect()
}

fn renderer() -> AvatarRenderer {
    AvatarRenderer::new(
        RgbaImage::from_pixel(10, 20, Rgba([255, 255, 255, 255])),
        RgbaImage::new(10, 20),
    )
}

#[tokio::test]
async fn tuck_toggle_swaps_top_and_bottom_on_the_avatar() {
    let compositor = LayerCompositor::new(AnchorRegistry::default());
    let cache = TrimCache::new(TrimOptions {
        padding: Padding::Pixels(0),
        ..TrimOptions::default()
    });
    let renderer = renderer();
    let selection = outfit();

    let untucked = compositor.compose(&selection, false);
    let tucked = compositor.compose(&selection, true);

    let images = trimmed_images(&cache, &untucked).await;
    assert!(images.iter().all(|image| image.dimensions() == (20, 20)));
    assert_eq!(cache.len(), 2);

    // Tucking changes z-indices only, so both lists pair with the same images
    let untucked_layers: Vec<_> = untucked
        .iter()
        .zip(&images)
        .map(|(instruction, image)| PlacedLayer { instruction, image })
        .collect();
    let tucked_layers: Vec<_> = tucked
        .iter()
        .zip(&images)
        .map(|(instruction, image)| PlacedLayer { instruction, image })
        .collect();

    let container = (200, 400);
    assert_eq!(
        paint_order(&renderer.plan(container, &untucked_layers)),
        vec!["itemB", "itemA"]
    );
    assert_eq!(
        paint_order(&renderer.plan(container, &tucked_layers)),
        vec!["itemA", "itemB"]
    );

    // Top spans y 76..192, bottom starts at y 176: they overlap at the waist
    let untucked_canvas = renderer.render(container, &untucked_layers);
    let tucked_canvas = renderer.render(container, &tucked_layers);

    let waist = untucked_canvas.get_pixel(100, 185);
    assert!(waist[2] > 200 && waist[1] < 50, "{waist:?}");
    let waist = tucked_canvas.get_pixel(100, 185);
    assert!(waist[1] > 200 && waist[2] < 50, "{waist:?}");

    // Away from the waist nothing changes
    assert_eq!(
        untucked_canvas.get_pixel(100, 100),
        tucked_canvas.get_pixel(100, 100)
    );
    assert_eq!(
        untucked_canvas.get_pixel(100, 250),
        tucked_canvas.get_pixel(100, 250)
    );

    // Toggling back reproduces the first layout
    assert_eq!(compositor.compose(&selection, false), untucked);
}

#[tokio::test]
async fn trim_crops_large_asset_to_its_content() {
    let image = RgbaImage::from_fn(1000, 2000, |x, y| {
        if (400..600).contains(&x) && (800..1200).contains(&y) {
            Rgba([120, 60, 30, 255])
        } else {
            Rgba([0, 0, 0, 0])
        }
    });
    let source = ImageSource::parse(&png_data_url(&encode_png(&image).unwrap())).unwrap();

    let cache = TrimCache::new(TrimOptions {
        padding: Padding::Pixels(0),
        max_working_dimension: None,
        ..TrimOptions::default()
    });
    let trimmed = cache.trim(&source, &CancellationToken::new()).await.unwrap();

    match trimmed.as_ref() {
        Trimmed::Cropped {
            width,
            height,
            bounds,
            ..
        } => {
            assert_eq!((*width, *height), (200, 400));
            assert_eq!((bounds.min_x, bounds.min_y), (400, 800));
        }
        other => panic!("expected a crop, got {other:?}"),
    }
}
