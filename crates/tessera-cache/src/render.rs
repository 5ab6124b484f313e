//! Lazy conversion of payloads into draw-ready resources.
//!
//! A selected tile is drawn from the payload of its nearest loaded ancestor,
//! so builders receive both addresses and cut the ancestor's data down to
//! the target cell.

use glam::DVec3;

use crate::address::{SubRegion, TileAddress};
use crate::culling::Aabb;
use crate::node::{Built, NodeId};
use crate::payload::{ImageTile, SurfaceTile};

/// Row alignment required for texture uploads, in bytes.
pub const TEXTURE_ROW_ALIGNMENT: u32 = 256;

/// Builds render resources from payloads.
pub trait RenderableBuilder<const D: usize, P> {
    /// The resource handed to the renderer.
    type Resource;

    /// Build the resource for `target` from the payload of `source`, which is
    /// `target` itself or one of its ancestors. `None` when there is nothing to draw.
    fn build(
        &mut self,
        payload: &P,
        source: &TileAddress<D>,
        target: &TileAddress<D>,
    ) -> Option<Self::Resource>;
}

/// A builder producing no resources. For headless tools and tests that only
/// care about streaming.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopBuilder;

impl<const D: usize, P> RenderableBuilder<D, P> for NoopBuilder {
    type Resource = ();

    fn build(&mut self, _: &P, _: &TileAddress<D>, _: &TileAddress<D>) -> Option<()> {
        Some(())
    }
}

/// An RGBA8 texture laid out for upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureData {
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
    /// Bytes per row, a multiple of [`TEXTURE_ROW_ALIGNMENT`].
    pub row_pitch: u32,
    /// `row_pitch * height` bytes; padding is zeroed.
    pub data: Vec<u8>,
}

impl TextureData {
    /// Texel at `(x, y)`.
    pub fn texel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let at = (y * self.row_pitch + x * 4) as usize;
        let px = self.data.get(at..at + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }
}

/// Crops image tiles to the target cell.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageTextureBuilder;

impl RenderableBuilder<2, ImageTile> for ImageTextureBuilder {
    type Resource = TextureData;

    fn build(
        &mut self,
        image: &ImageTile,
        source: &TileAddress<2>,
        target: &TileAddress<2>,
    ) -> Option<TextureData> {
        let region = target.sub_region_in(source)?;
        let (x0, x1) = texel_span(region.offset[0], region.scale, image.width);
        let (y0, y1) = texel_span(region.offset[1], region.scale, image.height);
        let width = x1 - x0;
        let height = y1 - y0;
        if width == 0 || height == 0 {
            return None;
        }

        let row_pitch = (width * 4).div_ceil(TEXTURE_ROW_ALIGNMENT) * TEXTURE_ROW_ALIGNMENT;
        let mut data = vec![0; (row_pitch * height) as usize];
        for (row, y) in (y0..y1).enumerate() {
            let start = y as usize * image.width as usize + x0 as usize;
            let texels = image.pixels.get(start..start + width as usize)?;
            let dst = row * row_pitch as usize;
            for (i, px) in texels.iter().enumerate() {
                data[dst + i * 4..dst + i * 4 + 4].copy_from_slice(px);
            }
        }
        Some(TextureData {
            width,
            height,
            row_pitch,
            data,
        })
    }
}

/// Texel range `[first, last)` covering `offset .. offset + scale` of `size` texels.
/// Never empty for a non-empty image.
fn texel_span(offset: f64, scale: f64, size: u32) -> (u32, u32) {
    if size == 0 {
        return (0, 0);
    }
    let n = f64::from(size);
    let first = ((offset * n).floor() as u32).min(size - 1);
    let last = (((offset + scale) * n).ceil() as u32).clamp(first + 1, size);
    (first, last)
}

/// A triangle list in the target cell's unit cube.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SurfaceMesh {
    /// Vertex positions.
    pub positions: Vec<[f32; 3]>,
    /// Triangle list indices.
    pub indices: Vec<u32>,
}

/// Clips surface tiles to the target cell by triangle centroid.
///
/// Cells are half-open on their upper faces except at the source boundary,
/// so a triangle lands in exactly one sibling.
#[derive(Clone, Copy, Debug, Default)]
pub struct SurfaceMeshBuilder;

impl<const D: usize> RenderableBuilder<D, SurfaceTile> for SurfaceMeshBuilder {
    type Resource = SurfaceMesh;

    fn build(
        &mut self,
        tile: &SurfaceTile,
        source: &TileAddress<D>,
        target: &TileAddress<D>,
    ) -> Option<SurfaceMesh> {
        let region = target.sub_region_in(source)?;
        let mut remap = vec![u32::MAX; tile.positions.len()];
        let mut mesh = SurfaceMesh::default();

        for tri in tile.indices.chunks_exact(3) {
            let corners = [
                tile.positions.get(tri[0] as usize)?,
                tile.positions.get(tri[1] as usize)?,
                tile.positions.get(tri[2] as usize)?,
            ];
            let centroid = corners.iter().fold([0.0_f64; 3], |mut acc, p| {
                for (a, c) in acc.iter_mut().zip(p.iter()) {
                    *a += f64::from(*c) / 3.0;
                }
                acc
            });
            if !in_cell(&region, centroid) {
                continue;
            }
            for &index in tri {
                let slot = &mut remap[index as usize];
                if *slot == u32::MAX {
                    *slot = mesh.positions.len() as u32;
                    mesh.positions
                        .push(to_cell_local(&region, tile.positions[index as usize]));
                }
                mesh.indices.push(*slot);
            }
        }
        Some(mesh)
    }
}

fn in_cell<const D: usize>(region: &SubRegion<D>, p: [f64; 3]) -> bool {
    (0..D.min(3)).all(|axis| {
        let lo = region.offset[axis];
        let hi = lo + region.scale;
        p[axis] >= lo && (p[axis] < hi || (hi >= 1.0 && p[axis] <= hi))
    })
}

fn to_cell_local<const D: usize>(region: &SubRegion<D>, p: [f32; 3]) -> [f32; 3] {
    let mut out = p;
    for axis in 0..D.min(3) {
        out[axis] = ((f64::from(p[axis]) - region.offset[axis]) / region.scale) as f32;
    }
    out
}

/// World placement of a selected tile.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TileTransform {
    /// Minimum corner of the cell.
    pub translation: DVec3,
    /// Cell size along each axis.
    pub scale: DVec3,
}

impl TileTransform {
    /// The transform mapping the unit cube onto `bounds`.
    pub fn from_bounds(bounds: &Aabb) -> Self {
        Self {
            translation: bounds.min,
            scale: bounds.size(),
        }
    }
}

/// One tile to draw this frame.
#[derive(Debug)]
pub struct SelectedTile<'a, const D: usize, R> {
    /// The node chosen by LOD selection.
    pub node: NodeId,
    /// Its address.
    pub address: TileAddress<D>,
    /// Resource built from the nearest loaded ancestor ("hi").
    pub renderable: Option<&'a Built<R>>,
    /// Resource built from the next coarser loaded ancestor ("lo").
    pub fallback: Option<&'a Built<R>>,
    /// World placement.
    pub transform: TileTransform,
}
