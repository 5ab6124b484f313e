//! Tile payloads and their binary formats.
//!
//! Two payload kinds ship with the cache: [`ImageTile`] for quadtree image
//! layers and [`SurfaceTile`] for octree surface meshes.
//!
//! ## Image layout (`TSIM`)
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 4 | Magic `"TSIM"` |
//! | 4 | 1 | Format version (`u8`, currently 1) |
//! | 5 | 2 | Width (`u16`, little-endian) |
//! | 7 | 2 | Height (`u16`, little-endian) |
//! | 9 | W×H×4 | RGBA8 pixels, row-major |
//!
//! ## Surface layout (`TSSF`)
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 4 | Magic `"TSSF"` |
//! | 4 | 1 | Format version (`u8`, currently 1) |
//! | 5 | 4 | Vertex count (`u32`) |
//! | 9 | 4 | Index count (`u32`) |
//! | 13 | V×12 | Positions, three `f32` each, in the tile's unit cube |
//! | .. | I×4 | Triangle indices (`u32`) |
//!
//! Headers may overstate the body. Decoding keeps whatever complete records
//! are present and [`TilePayload::sanitize`] clamps the counts to match.

use tracing::warn;

/// Magic bytes identifying an image tile.
const IMAGE_MAGIC: [u8; 4] = *b"TSIM";
/// Magic bytes identifying a surface tile.
const SURFACE_MAGIC: [u8; 4] = *b"TSSF";

/// Current tile format version.
pub const FORMAT_VERSION: u8 = 1;

/// Errors that can occur during tile decoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    /// The data does not start with the expected magic bytes.
    #[error("invalid magic bytes")]
    InvalidMagic,
    /// The format version is not supported by this build.
    #[error("unsupported format version: {0}")]
    UnsupportedVersion(u8),
    /// The data is shorter than the fixed header.
    #[error("data truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Minimum expected byte count.
        expected: usize,
        /// Actual byte count received.
        actual: usize,
    },
    /// Image dimensions do not fit the 16-bit header fields.
    #[error("image {width}x{height} exceeds the {max} texel limit per side")]
    TooLarge {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
        /// Largest encodable side.
        max: u32,
    },
}

/// Behaviour every payload stored in the cache provides.
pub trait TilePayload {
    /// Approximate resident memory of this payload in bytes.
    fn byte_size(&self) -> usize;

    /// Clamp internally inconsistent counts. Returns `true` if anything changed.
    fn sanitize(&mut self) -> bool {
        false
    }
}

/// An RGBA8 image tile.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageTile {
    /// Width in texels as reported by the header.
    pub width: u32,
    /// Height in texels as reported by the header.
    pub height: u32,
    /// Row-major texels.
    pub pixels: Vec<[u8; 4]>,
}

impl ImageTile {
    /// A tile filled with a single color.
    #[must_use]
    pub fn solid(width: u32, height: u32, color: [u8; 4]) -> Self {
        Self {
            width,
            height,
            pixels: vec![color; width as usize * height as usize],
        }
    }

    /// Texel at `(x, y)`, or `None` outside the image.
    #[must_use]
    pub fn texel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// Serialize to the `TSIM` format. Sides above `u16::MAX` are rejected.
    pub fn encode(&self) -> Result<Vec<u8>, PayloadError> {
        let too_large = |_| PayloadError::TooLarge {
            width: self.width,
            height: self.height,
            max: u32::from(u16::MAX),
        };
        let width = u16::try_from(self.width).map_err(too_large)?;
        let height = u16::try_from(self.height).map_err(too_large)?;

        let mut out = Vec::with_capacity(9 + self.pixels.len() * 4);
        out.extend_from_slice(&IMAGE_MAGIC);
        out.push(FORMAT_VERSION);
        out.extend_from_slice(&width.to_le_bytes());
        out.extend_from_slice(&height.to_le_bytes());
        for px in &self.pixels {
            out.extend_from_slice(px);
        }
        Ok(out)
    }

    /// Decode from the `TSIM` format. A short pixel body is kept as-is;
    /// call [`TilePayload::sanitize`] to reconcile the header.
    pub fn decode(data: &[u8]) -> Result<Self, PayloadError> {
        check_header(data, IMAGE_MAGIC, 9)?;
        let width = u32::from(u16::from_le_bytes([data[5], data[6]]));
        let height = u32::from(u16::from_le_bytes([data[7], data[8]]));
        let body = &data[9..];
        let declared = width as usize * height as usize;
        let pixels = body
            .chunks_exact(4)
            .take(declared)
            .map(|c| [c[0], c[1], c[2], c[3]])
            .collect();
        Ok(Self {
            width,
            height,
            pixels,
        })
    }
}

impl TilePayload for ImageTile {
    fn byte_size(&self) -> usize {
        self.pixels.len() * 4
    }

    /// Shrinks the height to the number of complete rows present.
    fn sanitize(&mut self) -> bool {
        let declared = self.width as usize * self.height as usize;
        if self.pixels.len() >= declared {
            self.pixels.truncate(declared);
            return false;
        }
        let rows = if self.width == 0 {
            0
        } else {
            self.pixels.len() / self.width as usize
        };
        warn!(
            width = self.width,
            declared_height = self.height,
            actual_rows = rows,
            "image tile shorter than header, clamping"
        );
        self.height = rows as u32;
        self.pixels.truncate(rows * self.width as usize);
        true
    }
}

/// A triangle mesh covering part of a volumetric cell.
///
/// Positions are in the tile's local unit cube `[0, 1]^3`.
#[derive(Clone, Debug, PartialEq)]
pub struct SurfaceTile {
    /// Vertex count as reported by the header.
    pub vertex_count: u32,
    /// Index count as reported by the header.
    pub index_count: u32,
    /// Vertex positions.
    pub positions: Vec<[f32; 3]>,
    /// Triangle list indices into `positions`.
    pub indices: Vec<u32>,
}

impl SurfaceTile {
    /// Build a tile whose header counts match its contents.
    #[must_use]
    pub fn new(positions: Vec<[f32; 3]>, indices: Vec<u32>) -> Self {
        Self {
            vertex_count: positions.len() as u32,
            index_count: indices.len() as u32,
            positions,
            indices,
        }
    }

    /// Number of complete triangles.
    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Serialize to the `TSSF` format.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(13 + self.positions.len() * 12 + self.indices.len() * 4);
        out.extend_from_slice(&SURFACE_MAGIC);
        out.push(FORMAT_VERSION);
        out.extend_from_slice(&self.vertex_count.to_le_bytes());
        out.extend_from_slice(&self.index_count.to_le_bytes());
        for p in &self.positions {
            for c in p {
                out.extend_from_slice(&c.to_le_bytes());
            }
        }
        for i in &self.indices {
            out.extend_from_slice(&i.to_le_bytes());
        }
        out
    }

    /// Decode from the `TSSF` format, keeping every complete record present.
    pub fn decode(data: &[u8]) -> Result<Self, PayloadError> {
        check_header(data, SURFACE_MAGIC, 13)?;
        let vertex_count = u32::from_le_bytes([data[5], data[6], data[7], data[8]]);
        let index_count = u32::from_le_bytes([data[9], data[10], data[11], data[12]]);
        let body = &data[13..];

        let vertex_bytes = (vertex_count as usize).saturating_mul(12).min(body.len());
        let positions: Vec<[f32; 3]> = body[..vertex_bytes]
            .chunks_exact(12)
            .map(|c| {
                [
                    f32::from_le_bytes([c[0], c[1], c[2], c[3]]),
                    f32::from_le_bytes([c[4], c[5], c[6], c[7]]),
                    f32::from_le_bytes([c[8], c[9], c[10], c[11]]),
                ]
            })
            .collect();
        let indices: Vec<u32> = body[vertex_bytes..]
            .chunks_exact(4)
            .take(index_count as usize)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        Ok(Self {
            vertex_count,
            index_count,
            positions,
            indices,
        })
    }
}

impl TilePayload for SurfaceTile {
    fn byte_size(&self) -> usize {
        self.positions.len() * 12 + self.indices.len() * 4
    }

    /// Clamps counts to the data present, drops the trailing partial triangle
    /// and any triangle referencing a missing vertex.
    fn sanitize(&mut self) -> bool {
        let vertices = self.positions.len() as u32;
        let before = (self.vertex_count, self.index_count, self.indices.len());

        self.vertex_count = self.vertex_count.min(vertices);
        self.positions.truncate(self.vertex_count as usize);
        self.indices.truncate(self.index_count as usize);
        self.indices.truncate(self.indices.len() / 3 * 3);

        let limit = self.vertex_count;
        let mut kept = Vec::with_capacity(self.indices.len());
        for tri in self.indices.chunks_exact(3) {
            if tri.iter().all(|&i| i < limit) {
                kept.extend_from_slice(tri);
            }
        }
        self.indices = kept;
        self.index_count = self.indices.len() as u32;

        let changed = before != (self.vertex_count, self.index_count, self.indices.len());
        if changed {
            warn!(
                declared_vertices = before.0,
                declared_indices = before.1,
                vertices = self.vertex_count,
                indices = self.index_count,
                "surface tile counts inconsistent with data, clamping"
            );
        }
        changed
    }
}

fn check_header(data: &[u8], magic: [u8; 4], header_len: usize) -> Result<(), PayloadError> {
    if data.len() < 5 {
        return Err(PayloadError::Truncated {
            expected: header_len,
            actual: data.len(),
        });
    }
    if data[0..4] != magic {
        return Err(PayloadError::InvalidMagic);
    }
    if data[4] != FORMAT_VERSION {
        return Err(PayloadError::UnsupportedVersion(data[4]));
    }
    if data.len() < header_len {
        return Err(PayloadError::Truncated {
            expected: header_len,
            actual: data.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_roundtrip() {
        let mut tile = ImageTile::solid(4, 3, [1, 2, 3, 255]);
        tile.pixels[5] = [9, 9, 9, 9];
        let decoded = ImageTile::decode(&tile.encode().unwrap()).unwrap();
        assert_eq!(decoded, tile);
        assert_eq!(decoded.texel(1, 1), Some([9, 9, 9, 9]));
        assert_eq!(decoded.texel(4, 0), None);
    }

    /// A header claiming more rows than present is clamped to the complete rows.
    #[test]
    fn test_image_short_body_is_clamped() {
        let tile = ImageTile::solid(4, 4, [7; 4]);
        let mut bytes = tile.encode().unwrap();
        bytes.truncate(9 + 4 * 4 * 2 + 6);
        let mut decoded = ImageTile::decode(&bytes).unwrap();
        assert!(decoded.sanitize());
        assert_eq!(decoded.height, 2);
        assert_eq!(decoded.pixels.len(), 8);
        assert!(!decoded.sanitize());
    }

    /// Sides that do not fit the header are an error, not a wrapped size.
    #[test]
    fn test_oversized_image_rejected() {
        let tile = ImageTile {
            width: 70_000,
            height: 1,
            pixels: Vec::new(),
        };
        assert_eq!(
            tile.encode(),
            Err(PayloadError::TooLarge {
                width: 70_000,
                height: 1,
                max: 65_535,
            })
        );
        let edge = ImageTile::solid(65_535, 1, [0; 4]);
        let decoded = ImageTile::decode(&edge.encode().unwrap()).unwrap();
        assert_eq!(decoded.width, 65_535);
    }

    #[test]
    fn test_invalid_magic() {
        let mut bytes = ImageTile::solid(1, 1, [0; 4]).encode().unwrap();
        bytes[0] = b'X';
        assert_eq!(ImageTile::decode(&bytes), Err(PayloadError::InvalidMagic));
    }

    #[test]
    fn test_unsupported_version() {
        let mut bytes = SurfaceTile::new(vec![], vec![]).encode();
        bytes[4] = 9;
        assert_eq!(
            SurfaceTile::decode(&bytes),
            Err(PayloadError::UnsupportedVersion(9))
        );
    }

    #[test]
    fn test_truncated_header() {
        assert!(matches!(
            SurfaceTile::decode(b"TSSF\x01\x00"),
            Err(PayloadError::Truncated { expected: 13, .. })
        ));
    }

    /// Reported counts beyond the data are clamped and dangling triangles removed.
    #[test]
    fn test_surface_overstated_counts_are_clamped() {
        let positions = vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let mut tile = SurfaceTile::new(positions, vec![0, 1, 2, 0, 2, 7, 1]);
        tile.index_count = 40;
        let mut decoded = SurfaceTile::decode(&tile.encode()).unwrap();
        assert_eq!(decoded.indices.len(), 7);
        assert!(decoded.sanitize());
        assert_eq!(decoded.vertex_count, 3);
        assert_eq!(decoded.indices, vec![0, 1, 2]);
        assert_eq!(decoded.index_count, 3);
        assert_eq!(decoded.triangle_count(), 1);
    }

    #[test]
    fn test_surface_overstated_vertex_count_is_clamped() {
        let mut tile = SurfaceTile::new(vec![[0.5; 3]; 3], vec![]);
        tile.vertex_count = 10;
        let mut decoded = SurfaceTile::decode(&tile.encode()).unwrap();
        assert_eq!(decoded.positions.len(), 3);
        assert!(decoded.sanitize());
        assert_eq!(decoded.vertex_count, 3);
    }

    #[test]
    fn test_consistent_surface_unchanged() {
        let mut tile = SurfaceTile::new(vec![[0.0; 3]; 3], vec![0, 1, 2]);
        assert!(!tile.sanitize());
        assert_eq!(tile.byte_size(), 3 * 12 + 3 * 4);
    }
}
