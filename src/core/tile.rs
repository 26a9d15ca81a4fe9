//! Hierarchy, level and tile structures
//!
//! ```text
//! hierarchy: width u32, height u32, bpp u32, level pointer, ..., 0
//! level:     width u32, height u32, tile pointer * ceil(w/64)*ceil(h/64), 0
//! tile:      bpp planes of the tile's pixels, channel-major, raw or RLE
//! ```
//!
//! Only the first level is stored with pixels; the others are dummies that
//! readers skip. Tiles on the right and bottom edges are clipped, not padded.

use crate::error::{Result, XcfError};
use crate::header::{Compression, MAX_IMAGE_SIZE};
use crate::io::{XcfReader, XcfWriter};
use crate::model::{PixelLayout, Raster};
use crate::rle::{self, RleDecoder};
use std::collections::HashMap;
use std::io::{Read, Seek, Write};
use tracing::{debug, trace};

pub const TILE_SIZE: u32 = 64;

/// Pixel region covered by one tile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl TileRect {
    pub fn pixels(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Row-major grid of 64x64 tiles over a `width` x `height` image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    width: u32,
    height: u32,
}

impl TileGrid {
    pub fn new(width: u32, height: u32) -> Self {
        TileGrid { width, height }
    }

    pub fn columns(&self) -> u32 {
        self.width.div_ceil(TILE_SIZE)
    }

    pub fn rows(&self) -> u32 {
        self.height.div_ceil(TILE_SIZE)
    }

    pub fn len(&self) -> usize {
        self.columns() as usize * self.rows() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bounds of tile `index`, clipped at the image edge
    pub fn rect(&self, index: usize) -> TileRect {
        let columns = self.columns().max(1) as usize;
        let x = (index % columns) as u32 * TILE_SIZE;
        let y = (index / columns) as u32 * TILE_SIZE;
        TileRect {
            x,
            y,
            width: TILE_SIZE.min(self.width - x),
            height: TILE_SIZE.min(self.height - y),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = TileRect> + '_ {
        (0..self.len()).map(move |i| self.rect(i))
    }
}

/// Layers and channels are held to the same bound as the image itself
pub(crate) fn check_drawable_size(name: &str, width: u32, height: u32) -> Result<()> {
    if width > MAX_IMAGE_SIZE || height > MAX_IMAGE_SIZE {
        return Err(XcfError::InconsistentData(format!(
            "{:?} is {}x{}, larger than {} on a side",
            name, width, height, MAX_IMAGE_SIZE
        )));
    }
    Ok(())
}

/// One tile's location; `body` indexes the compressed bytes read for it
struct TileSpan {
    rect: TileRect,
    offset: u64,
    body: usize,
}

/// Read the hierarchy at `offset` and check it matches the owning layer or channel
pub(crate) fn read_hierarchy<R: Read + Seek>(
    reader: &mut XcfReader<R>,
    offset: u64,
    width: u32,
    height: u32,
    layout: PixelLayout,
    compression: Compression,
    workers: usize,
) -> Result<Raster> {
    let grid = read_level_header(reader, offset, width, height, layout)?;
    let bpp = layout.channels();
    let pointers = read_tile_pointers(reader, &grid)?;

    let mut bounds = pointers.clone();
    bounds.sort_unstable();
    bounds.dedup();

    // Tiles sharing a pointer share one copy of their bytes
    let mut bodies: Vec<Vec<u8>> = Vec::new();
    let mut seen: HashMap<(u64, u64), usize> = HashMap::new();
    let mut spans = Vec::with_capacity(pointers.len());
    for (index, &pointer) in pointers.iter().enumerate() {
        let rect = grid.rect(index);
        let len = match compression {
            Compression::None => (rect.pixels() * bpp) as u64,
            Compression::Rle => {
                let max_len = rle::max_encoded_len(rect.pixels() * bpp) as u64;
                let next = bounds.partition_point(|&p| p <= pointer);
                match bounds.get(next) {
                    Some(&next_pointer) => max_len.min(next_pointer - pointer),
                    None => max_len,
                }
            }
        };
        let body = match seen.get(&(pointer, len)) {
            Some(&body) => body,
            None => {
                let bytes = match compression {
                    Compression::None => {
                        reader.seek_absolute(pointer)?;
                        reader.read_bytes(len)?
                    }
                    Compression::Rle => reader.read_span(pointer, len)?,
                };
                bodies.push(bytes);
                seen.insert((pointer, len), bodies.len() - 1);
                bodies.len() - 1
            }
        };
        spans.push(TileSpan {
            rect,
            offset: pointer,
            body,
        });
    }

    debug!(
        "Decoding {} tiles ({} distinct, {}x{}, {:?}) on {} worker(s)",
        spans.len(),
        bodies.len(),
        width,
        height,
        layout,
        workers
    );
    let planes = map_tiles(&spans, workers, |span| {
        decode_tile(span, &bodies[span.body], bpp, compression)
    })?;

    let mut raster = Raster::new(width, height, layout);
    for (span, plane) in spans.iter().zip(&planes) {
        scatter_tile(&mut raster, span.rect, plane);
    }
    Ok(raster)
}

/// Validate the hierarchy and level headers of an image whose pixels are not wanted
pub(crate) fn skip_hierarchy<R: Read + Seek>(
    reader: &mut XcfReader<R>,
    offset: u64,
    width: u32,
    height: u32,
    layout: PixelLayout,
) -> Result<()> {
    let grid = read_level_header(reader, offset, width, height, layout)?;
    read_tile_pointers(reader, &grid)?;
    Ok(())
}

fn read_level_header<R: Read + Seek>(
    reader: &mut XcfReader<R>,
    offset: u64,
    width: u32,
    height: u32,
    layout: PixelLayout,
) -> Result<TileGrid> {
    reader.seek_absolute(offset)?;
    let stored_width = reader.read_u32()?;
    let stored_height = reader.read_u32()?;
    let bpp = reader.read_u32()?;

    if (stored_width, stored_height) != (width, height) {
        return Err(XcfError::InconsistentData(format!(
            "hierarchy at {} is {}x{}, expected {}x{}",
            offset, stored_width, stored_height, width, height
        )));
    }
    if bpp as usize != layout.channels() {
        return Err(XcfError::InconsistentData(format!(
            "hierarchy at {} has {} bytes per pixel, {:?} needs {}",
            offset,
            bpp,
            layout,
            layout.channels()
        )));
    }

    let level = reader.read_pointer()?;
    if level == 0 {
        return Err(XcfError::InconsistentData(format!(
            "hierarchy at {} has no levels",
            offset
        )));
    }
    reader.seek_absolute(level)?;
    let level_width = reader.read_u32()?;
    let level_height = reader.read_u32()?;
    if (level_width, level_height) != (width, height) {
        return Err(XcfError::InconsistentData(format!(
            "level at {} is {}x{}, expected {}x{}",
            level, level_width, level_height, width, height
        )));
    }

    Ok(TileGrid::new(width, height))
}

fn read_tile_pointers<R: Read + Seek>(
    reader: &mut XcfReader<R>,
    grid: &TileGrid,
) -> Result<Vec<u64>> {
    // A forged size must not drive the allocation; the stream bounds it first
    let room = (reader.remaining() / reader.version().pointer_width().bytes()) as usize;
    let mut pointers = Vec::with_capacity(grid.len().min(room));
    for index in 0..grid.len() {
        let pointer = reader.read_pointer()?;
        if pointer == 0 {
            return Err(XcfError::InconsistentData(format!(
                "level lists {} tiles, expected {}",
                index,
                grid.len()
            )));
        }
        if pointer >= reader.len() {
            return Err(XcfError::UnexpectedEof { offset: pointer });
        }
        pointers.push(pointer);
    }
    if reader.read_pointer()? != 0 {
        return Err(XcfError::InconsistentData(format!(
            "level lists more than {} tiles",
            grid.len()
        )));
    }
    Ok(pointers)
}

/// Decompress one tile into its channel-major planes
fn decode_tile(span: &TileSpan, bytes: &[u8], bpp: usize, compression: Compression) -> Result<Vec<u8>> {
    let len = span.rect.pixels() * bpp;
    trace!(
        "Tile at ({}, {}) from offset {}",
        span.rect.x,
        span.rect.y,
        span.offset
    );
    match compression {
        Compression::None => Ok(bytes.to_vec()),
        Compression::Rle => {
            let mut planes = vec![0u8; len];
            let mut decoder = RleDecoder::new(bytes, span.offset);
            for plane in planes.chunks_mut(span.rect.pixels().max(1)) {
                decoder.decode_into(plane)?;
            }
            Ok(planes)
        }
    }
}

/// Copy channel-major tile planes into the pixel-major raster
fn scatter_tile(raster: &mut Raster, rect: TileRect, planes: &[u8]) {
    let bpp = raster.layout().channels();
    let stride = raster.stride();
    let pixels = rect.pixels();
    let data = raster.data_mut();
    for row in 0..rect.height as usize {
        let line = (rect.y as usize + row) * stride + rect.x as usize * bpp;
        for col in 0..rect.width as usize {
            let source = row * rect.width as usize + col;
            let target = line + col * bpp;
            for channel in 0..bpp {
                data[target + channel] = planes[channel * pixels + source];
            }
        }
    }
}

/// Copy one tile of the raster out as channel-major planes
fn gather_tile(raster: &Raster, rect: TileRect) -> Vec<u8> {
    let bpp = raster.layout().channels();
    let stride = raster.stride();
    let pixels = rect.pixels();
    let data = raster.data();
    let mut planes = vec![0u8; pixels * bpp];
    for row in 0..rect.height as usize {
        let line = (rect.y as usize + row) * stride + rect.x as usize * bpp;
        for col in 0..rect.width as usize {
            let target = row * rect.width as usize + col;
            let source = line + col * bpp;
            for channel in 0..bpp {
                planes[channel * pixels + target] = data[source + channel];
            }
        }
    }
    planes
}

/// Apply `work` to every item, on up to `workers` threads, keeping input order
fn map_tiles<T, U, F>(items: &[T], workers: usize, work: F) -> Result<Vec<U>>
where
    T: Sync,
    U: Send,
    F: Fn(&T) -> Result<U> + Sync,
{
    if workers <= 1 || items.len() <= 1 {
        return items.iter().map(&work).collect();
    }

    let chunk_size = items.len().div_ceil(workers);
    let work = &work;
    let chunks = crossbeam::thread::scope(|scope| {
        let handles: Vec<_> = items
            .chunks(chunk_size)
            .map(|chunk| scope.spawn(move |_| chunk.iter().map(work).collect::<Result<Vec<U>>>()))
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .map_err(|_| XcfError::Worker("tile worker panicked".to_string()))?
            })
            .collect::<Result<Vec<Vec<U>>>>()
    })
    .map_err(|_| XcfError::Worker("tile worker scope panicked".to_string()))??;

    Ok(chunks.into_iter().flatten().collect())
}

/// Write a hierarchy for `raster` at the writer's position and return its offset
pub(crate) fn write_hierarchy<W: Write + Seek>(
    writer: &mut XcfWriter<W>,
    raster: &Raster,
    compression: Compression,
    workers: usize,
) -> Result<u64> {
    let grid = TileGrid::new(raster.width(), raster.height());
    let rects: Vec<TileRect> = grid.iter().collect();
    let tiles = map_tiles(&rects, workers, |rect| {
        let planes = gather_tile(raster, *rect);
        Ok(match compression {
            Compression::None => planes,
            Compression::Rle => encode_planes(&planes, rect.pixels()),
        })
    })?;
    write_tiles(writer, grid, raster.layout(), &tiles)
}

/// Write a hierarchy whose pixels are all zero (group layers)
pub(crate) fn write_blank_hierarchy<W: Write + Seek>(
    writer: &mut XcfWriter<W>,
    width: u32,
    height: u32,
    layout: PixelLayout,
    compression: Compression,
) -> Result<u64> {
    let grid = TileGrid::new(width, height);
    let bpp = layout.channels();
    let tiles: Vec<Vec<u8>> = grid
        .iter()
        .map(|rect| {
            let planes = vec![0u8; rect.pixels() * bpp];
            match compression {
                Compression::None => planes,
                Compression::Rle => encode_planes(&planes, rect.pixels()),
            }
        })
        .collect();
    write_tiles(writer, grid, layout, &tiles)
}

/// RLE each channel plane separately
fn encode_planes(planes: &[u8], pixels: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(planes.len() / 2 + 16);
    for plane in planes.chunks(pixels.max(1)) {
        rle::encode_into(plane, &mut out);
    }
    out
}

fn write_tiles<W: Write + Seek>(
    writer: &mut XcfWriter<W>,
    grid: TileGrid,
    layout: PixelLayout,
    tiles: &[Vec<u8>],
) -> Result<u64> {
    let hierarchy = writer.position();
    writer.write_u32(grid.width)?;
    writer.write_u32(grid.height)?;
    writer.write_u32(layout.channels() as u32)?;
    let level_slot = writer.reserve_pointer()?;
    writer.write_pointer(0)?;

    writer.patch_here(level_slot)?;
    writer.write_u32(grid.width)?;
    writer.write_u32(grid.height)?;
    let tile_slots = writer.reserve_pointer_table(tiles.len())?;

    for (slot, tile) in tile_slots.into_iter().zip(tiles) {
        writer.patch_here(slot)?;
        writer.write_bytes(tile)?;
    }
    Ok(hierarchy)
}
