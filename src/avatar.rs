use crate::compositor::{LayerInstruction, Rect};
use image::{imageops, RgbaImage};

/// Width / height of the avatar illustration
pub const AVATAR_ASPECT: f32 = 0.5;

/// Largest 1:2 box centred in a `width`x`height` container
pub fn aspect_box(width: f32, height: f32) -> Rect {
    let inner_width = width.min(height * AVATAR_ASPECT).max(0.0);
    let inner_height = inner_width / AVATAR_ASPECT;
    Rect {
        x: (width - inner_width) / 2.0,
        y: (height - inner_height) / 2.0,
        width: inner_width,
        height: inner_height,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Base,
    /// `layer` indexes the slice handed to [`AvatarRenderer::plan`]
    Garment { layer: usize, garment_id: String },
    Mask,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderNode {
    pub kind: NodeKind,
    /// Pixel rectangle in the outer container
    pub rect: Rect,
    pub z_index: i32,
    /// Whether the node should receive pointer input
    pub interactive: bool,
}

/// Nodes in paint order: base, garments by ascending z-index, mask
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPlan {
    pub container: (u32, u32),
    pub inner: Rect,
    pub nodes: Vec<RenderNode>,
}

/// A compositor instruction paired with its decoded garment image
#[derive(Debug, Clone, Copy)]
pub struct PlacedLayer<'a> {
    pub instruction: &'a LayerInstruction,
    pub image: &'a RgbaImage,
}

/// Draws garments between a base avatar and an occlusion mask.
///
/// The base and mask fill the aspect-locked inner box; the mask restores
/// head, neck and hands over any garment art.
pub struct AvatarRenderer {
    base: RgbaImage,
    mask: RgbaImage,
}

impl AvatarRenderer {
    pub fn new(base: RgbaImage, mask: RgbaImage) -> Self {
        Self { base, mask }
    }

    pub fn plan(&self, container: (u32, u32), layers: &[PlacedLayer<'_>]) -> RenderPlan {
        let inner = aspect_box(container.0 as f32, container.1 as f32);

        let mut garments: Vec<RenderNode> = layers
            .iter()
            .enumerate()
            .map(|(index, placed)| {
                let instruction = placed.instruction;
                let width = inner.width * instruction.width / 100.0;
                let (image_width, image_height) = placed.image.dimensions();
                let height = if image_width == 0 {
                    0.0
                } else {
                    width * image_height as f32 / image_width as f32
                };

                let rect = instruction.transform.apply(Rect {
                    x: inner.x + inner.width * instruction.left / 100.0,
                    y: inner.y + inner.height * instruction.top / 100.0,
                    width,
                    height,
                });

                RenderNode {
                    kind: NodeKind::Garment {
                        layer: index,
                        garment_id: instruction.garment_id.clone(),
                    },
                    rect,
                    z_index: instruction.z_index,
                    interactive: true,
                }
            })
            .collect();

        // Stable: equal z-indices keep paint order
        garments.sort_by_key(|node| node.z_index);

        let mut nodes = Vec::with_capacity(garments.len() + 2);
        nodes.push(RenderNode {
            kind: NodeKind::Base,
            rect: inner,
            z_index: i32::MIN,
            interactive: false,
        });
        nodes.extend(garments);
        nodes.push(RenderNode {
            kind: NodeKind::Mask,
            rect: inner,
            z_index: i32::MAX,
            interactive: false,
        });

        RenderPlan {
            container,
            inner,
            nodes,
        }
    }

    /// Rasterize the plan onto a transparent canvas the size of the container
    pub fn render(&self, container: (u32, u32), layers: &[PlacedLayer<'_>]) -> RgbaImage {
        let _span = tracing::debug_span!("render_avatar").entered();

        let plan = self.plan(container, layers);
        let mut canvas = RgbaImage::new(container.0, container.1);

        for node in &plan.nodes {
            let image = match &node.kind {
                NodeKind::Base => &self.base,
                NodeKind::Mask => &self.mask,
                NodeKind::Garment { layer, .. } => layers[*layer].image,
            };
            draw(&mut canvas, image, node.rect);
        }

        canvas
    }
}

fn draw(canvas: &mut RgbaImage, image: &RgbaImage, rect: Rect) {
    let width = rect.width.round();
    let height = rect.height.round();
    if width < 1.0 || height < 1.0 || image.width() == 0 || image.height() == 0 {
        return;
    }

    let scaled = imageops::resize(
        image,
        width as u32,
        height as u32,
        imageops::FilterType::Triangle,
    );
    imageops::overlay(canvas, &scaled, rect.x.round() as i64, rect.y.round() as i64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::Category;
    use crate::compositor::LayerTransform;
    use image::Rgba;

    fn instruction(id: &str, top: f32, left: f32, width: f32, z_index: i32) -> LayerInstruction {
        LayerInstruction {
            garment_id: id.to_string(),
            category: Category::Tops,
            image_source: format!("/{id}.png"),
            top,
            left,
            width,
            z_index,
            transform: LayerTransform::IDENTITY,
        }
    }

    fn renderer() -> AvatarRenderer {
        let base = RgbaImage::from_pixel(10, 20, Rgba([255, 0, 0, 255]));
        // Opaque over the top quarter only: the head
        let mask = RgbaImage::from_fn(10, 20, |_, y| {
            if y < 5 {
                Rgba([0, 255, 0, 255])
            } else {
                Rgba([0, 0, 0, 0])
            }
        });
        AvatarRenderer::new(base, mask)
    }

    #[test]
    fn aspect_box_is_centred() {
        assert_eq!(
            aspect_box(300.0, 400.0),
            Rect {
                x: 50.0,
                y: 0.0,
                width: 200.0,
                height: 400.0
            }
        );
        assert_eq!(
            aspect_box(100.0, 400.0),
            Rect {
                x: 0.0,
                y: 100.0,
                width: 100.0,
                height: 200.0
            }
        );
    }

    #[test]
    fn percentages_resolve_against_inner_box() {
        let image = RgbaImage::new(10, 20);
        let ins = instruction("shirt", 50.0, 25.0, 50.0, 20);
        let layers = [PlacedLayer {
            instruction: &ins,
            image: &image,
        }];

        let narrow = renderer().plan((200, 400), &layers);
        let wide = renderer().plan((600, 400), &layers);

        assert_eq!(
            narrow.nodes[1].rect,
            Rect {
                x: 50.0,
                y: 200.0,
                width: 100.0,
                height: 200.0
            }
        );
        // Same placement relative to the avatar, shifted by the letterbox
        assert_eq!(wide.nodes[1].rect.x, narrow.nodes[1].rect.x + 200.0);
        assert_eq!(wide.nodes[1].rect.width, narrow.nodes[1].rect.width);
    }

    #[test]
    fn plan_orders_base_layers_mask() {
        let image = RgbaImage::new(4, 4);
        let top = instruction("top", 20.0, 20.0, 50.0, 10);
        let bottom = instruction("bottom", 40.0, 20.0, 50.0, 25);
        let shoes = instruction("shoes", 85.0, 30.0, 40.0, 10);
        let layers = [
            PlacedLayer {
                instruction: &bottom,
                image: &image,
            },
            PlacedLayer {
                instruction: &top,
                image: &image,
            },
            PlacedLayer {
                instruction: &shoes,
                image: &image,
            },
        ];

        let plan = renderer().plan((100, 200), &layers);
        let ids: Vec<_> = plan
            .nodes
            .iter()
            .map(|node| match &node.kind {
                NodeKind::Base => "base".to_string(),
                NodeKind::Mask => "mask".to_string(),
                NodeKind::Garment { garment_id, .. } => garment_id.clone(),
            })
            .collect();

        assert_eq!(ids, vec!["base", "top", "shoes", "bottom", "mask"]);
        assert!(!plan.nodes.last().unwrap().interactive);
    }

    #[test]
    fn render_stacks_mask_over_garments() {
        let shirt = RgbaImage::from_pixel(10, 10, Rgba([0, 0, 255, 255]));
        // Covers the whole avatar, head included
        let ins = instruction("shirt", 0.0, 0.0, 100.0, 20);
        let layers = [PlacedLayer {
            instruction: &ins,
            image: &shirt,
        }];

        let canvas = renderer().render((200, 200), &layers);

        // inner box is 100x200 at x = 50
        assert_eq!(canvas.get_pixel(10, 100)[3], 0);
        let head = canvas.get_pixel(100, 20);
        assert!(head[1] > 200 && head[2] < 50, "{head:?}");
        let torso = canvas.get_pixel(100, 80);
        assert!(torso[2] > 200 && torso[0] < 50, "{torso:?}");
        let legs = canvas.get_pixel(100, 170);
        assert!(legs[0] > 200 && legs[2] < 50, "{legs:?}");
    }

    #[test]
    fn render_is_deterministic() {
        let shirt = RgbaImage::from_pixel(6, 8, Rgba([10, 200, 30, 180]));
        let ins = instruction("shirt", 20.0, 20.0, 60.0, 20);
        let layers = [PlacedLayer {
            instruction: &ins,
            image: &shirt,
        }];

        let renderer = renderer();
        assert_eq!(
            renderer.render((123, 321), &layers),
            renderer.render((123, 321), &layers)
        );
    }
}
