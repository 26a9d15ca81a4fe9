//! Whole-document encoding
//!
//! Mirrors the decoder. Pointer tables are reserved before the structures
//! they point at and patched once each structure has been written.

use crate::channel::write_channel;
use crate::config::EncodeOptions;
use crate::error::{Result, XcfError};
use crate::header::{Header, MAX_IMAGE_SIZE};
use crate::io::XcfWriter;
use crate::layer::{write_layer, Placement};
use crate::model::{ColorMode, Document};
use crate::parasite::write_parasites;
use crate::paths::{write_guides, write_sample_points};
use crate::property::{PayloadWriter, PropertyId, PropertyListWriter};
use crate::tree::{check_tree_alpha, flatten};
use std::io::{Seek, Write};
use tracing::{debug, info, warn};

/// Largest palette the COLORMAP property can describe for 8-bit indices
const MAX_PALETTE: usize = 256;

pub struct Encoder<W> {
    inner: W,
    options: EncodeOptions,
}

impl<W: Write + Seek> Encoder<W> {
    /// `inner` must be positioned at offset 0
    pub fn new(inner: W) -> Self {
        Self::with_options(inner, EncodeOptions::default())
    }

    pub fn with_options(inner: W, options: EncodeOptions) -> Self {
        Encoder { inner, options }
    }

    /// Write `doc` and hand back the sink
    pub fn encode(self, doc: &Document) -> Result<W> {
        let version = self.options.version.unwrap_or(doc.version);
        let compression = self.options.compression.unwrap_or(doc.compression);
        validate(doc)?;

        let mut writer = XcfWriter::new(self.inner, version);
        let mut header = Header::new(version, doc.width, doc.height, doc.color_mode);
        header.precision = doc.precision;
        writer.write_bytes(&header.to_bytes()?)?;

        let mut props = PropertyListWriter::new(version);
        if doc.color_mode == ColorMode::Indexed {
            if let Some(palette) = &doc.palette {
                props.with(PropertyId::Colormap, |p| {
                    p.write_u32(palette.len() as u32)?;
                    for entry in palette {
                        p.write_bytes(&[entry.r, entry.g, entry.b]);
                    }
                    Ok(())
                })?;
            }
        } else if doc.palette.is_some() {
            warn!("Not writing a colormap for a {:?} image", doc.color_mode);
        }
        props.with(PropertyId::Compression, |p| p.write_u8(compression as u8))?;
        if !doc.guides.is_empty() {
            props.with(PropertyId::Guides, |p| write_guides(&doc.guides, p))?;
        }
        props.with(PropertyId::Resolution, |p| {
            p.write_f32(doc.resolution.x)?;
            p.write_f32(doc.resolution.y)
        })?;
        props.u32(PropertyId::Tattoo, doc.tattoo)?;
        props.u32(PropertyId::Unit, doc.unit)?;
        if let Some(unit) = &doc.user_unit {
            props.with(PropertyId::UserUnit, |p| unit.write(p))?;
        }
        if let Some(paths) = &doc.paths {
            props.with(PropertyId::Paths, |p| paths.write(p))?;
        }
        if let Some(vectors) = &doc.vectors {
            props.with(PropertyId::Vectors, |p| vectors.write(p))?;
        }
        if !doc.sample_points.is_empty() {
            let mut payload = PayloadWriter::new(version);
            let id = write_sample_points(&doc.sample_points, &mut payload)?;
            props.raw(id.code(), &payload.into_bytes())?;
        }
        if !doc.parasites.is_empty() {
            props.with(PropertyId::Parasites, |p| write_parasites(&doc.parasites, p))?;
        }
        writer.write_bytes(&props.finish()?)?;

        let layers = flatten(&doc.layers)?;
        let layer_slots = writer.reserve_pointer_table(layers.len())?;
        let channel_slots = writer.reserve_pointer_table(doc.channels.len())?;

        let options = &self.options;
        let workers = |tiles: usize| options.tile_workers(tiles);

        for (slot, layer) in layer_slots.into_iter().zip(&layers) {
            writer.patch_here(slot)?;
            let placement = Placement {
                x: layer.x,
                y: layer.y,
                item_path: layer.item_path(),
            };
            let offset = write_layer(
                &mut writer,
                layer.node,
                placement,
                doc.color_mode,
                compression,
                workers,
            )?;
            debug!("Wrote layer {:?} at offset {}", layer.node.name(), offset);
        }

        for (slot, channel) in channel_slots.into_iter().zip(&doc.channels) {
            writer.patch_here(slot)?;
            write_channel(&mut writer, channel, compression, workers)?;
        }

        writer.flush()?;
        info!(
            "Encoded {}x{} {:?} image (version {}, {} layers, {} bytes)",
            doc.width,
            doc.height,
            doc.color_mode,
            version,
            layers.len(),
            writer.position()
        );
        Ok(writer.into_inner())
    }
}

/// Reject value trees the format cannot represent
fn validate(doc: &Document) -> Result<()> {
    for (what, value) in [("width", doc.width), ("height", doc.height)] {
        if value == 0 || value > MAX_IMAGE_SIZE {
            return Err(XcfError::InvalidDocument(format!(
                "image {} {} outside 1..={}",
                what, value, MAX_IMAGE_SIZE
            )));
        }
    }
    if doc.color_mode == ColorMode::Indexed {
        match &doc.palette {
            None => {
                return Err(XcfError::InvalidDocument(
                    "indexed image without a palette".to_string(),
                ))
            }
            Some(palette) if palette.len() > MAX_PALETTE => {
                return Err(XcfError::InvalidDocument(format!(
                    "palette has {} entries, at most {} fit",
                    palette.len(),
                    MAX_PALETTE
                )))
            }
            Some(_) => {}
        }
    }
    check_tree_alpha(&doc.layers)
}
