//! Whole-document decoding
//!
//! Order on the wire: header, image property list, layer pointer table,
//! channel pointer table. Every structure after that is reached through a
//! pointer, so the decoder follows them one at a time through the cursor.

use crate::channel::read_channel;
use crate::config::DecodeOptions;
use crate::error::{Result, XcfError};
use crate::header::{Compression, Header};
use crate::io::XcfReader;
use crate::layer::read_layer;
use crate::model::{ColorMode, Document, Rgb};
use crate::parasite::read_parasites;
use crate::paths::{read_guides, read_sample_points, LegacyPaths, UserUnit, Vectors};
use crate::property::{read_property_list, Payload, PropertyId, PropertyTarget};
use crate::tree::build_tree;
use std::io::{Read, Seek};
use tracing::{debug, info, warn};

/// Image-level properties land directly in the document
struct DocumentProps<'a> {
    document: &'a mut Document,
}

impl PropertyTarget for DocumentProps<'_> {
    fn accepts(&self, id: PropertyId) -> bool {
        use PropertyId::*;
        matches!(
            id,
            Colormap
                | Compression
                | Guides
                | Resolution
                | Tattoo
                | Parasites
                | Unit
                | Paths
                | UserUnit
                | Vectors
                | OldSamplePoints
                | SamplePoints
        )
    }

    fn apply(&mut self, id: PropertyId, payload: &mut Payload<'_>) -> Result<()> {
        let doc = &mut *self.document;
        match id {
            PropertyId::Colormap => {
                let count = payload.read_u32()? as usize;
                let bytes = payload.read_bytes(count * 3)?;
                doc.palette = Some(
                    bytes
                        .chunks_exact(3)
                        .map(|c| Rgb::new(c[0], c[1], c[2]))
                        .collect(),
                );
            }
            PropertyId::Compression => {
                doc.compression = Compression::from_u8(payload.read_u8()?)?;
            }
            PropertyId::Guides => doc.guides.extend(read_guides(payload)?),
            PropertyId::Resolution => {
                doc.resolution.x = payload.read_f32()?;
                doc.resolution.y = payload.read_f32()?;
            }
            PropertyId::Tattoo => doc.tattoo = payload.read_u32()?,
            PropertyId::Parasites => doc.parasites.extend(read_parasites(payload)?),
            PropertyId::Unit => doc.unit = payload.read_u32()?,
            PropertyId::Paths => doc.paths = Some(LegacyPaths::read(payload)?),
            PropertyId::UserUnit => doc.user_unit = Some(UserUnit::read(payload)?),
            PropertyId::Vectors => doc.vectors = Some(Vectors::read(payload)?),
            PropertyId::OldSamplePoints => {
                doc.sample_points.extend(read_sample_points(payload, true)?)
            }
            PropertyId::SamplePoints => {
                doc.sample_points.extend(read_sample_points(payload, false)?)
            }
            _ => {}
        }
        Ok(())
    }
}

/// Decodes one document from a seekable byte source
pub struct Decoder<R> {
    reader: XcfReader<R>,
    options: DecodeOptions,
}

impl<R: Read + Seek> Decoder<R> {
    pub fn new(inner: R) -> Result<Self> {
        Self::with_options(inner, DecodeOptions::default())
    }

    pub fn with_options(inner: R, options: DecodeOptions) -> Result<Self> {
        Ok(Decoder {
            reader: XcfReader::new(inner)?,
            options,
        })
    }

    pub fn decode(mut self) -> Result<Document> {
        let reader = &mut self.reader;
        let header = Header::read_from(reader)?;

        let mut doc = Document::new(header.width, header.height, header.color_mode);
        doc.version = header.version;
        doc.precision = header.precision;

        read_property_list(reader, &mut DocumentProps { document: &mut doc })?;

        match (doc.color_mode, &doc.palette) {
            (ColorMode::Indexed, None) => {
                return Err(XcfError::InconsistentData(
                    "indexed image has no colormap".to_string(),
                ))
            }
            (ColorMode::Rgb | ColorMode::Grayscale, Some(palette)) => {
                warn!(
                    "Dropping {}-entry colormap from a {:?} image",
                    palette.len(),
                    doc.color_mode
                );
                doc.palette = None;
            }
            _ => {}
        }

        let layer_offsets = reader.read_pointer_table()?;
        let channel_offsets = reader.read_pointer_table()?;
        debug!(
            "{} layer(s), {} channel(s), {:?} tiles",
            layer_offsets.len(),
            channel_offsets.len(),
            doc.compression
        );

        let records = layer_offsets
            .iter()
            .map(|&offset| {
                read_layer(
                    reader,
                    offset,
                    doc.color_mode,
                    doc.compression,
                    &self.options,
                )
            })
            .collect::<Result<Vec<_>>>()?;
        doc.layers = build_tree(records)?;

        let options = &self.options;
        doc.channels = channel_offsets
            .iter()
            .map(|&offset| {
                read_channel(reader, offset, None, doc.compression, |tiles| {
                    options.tile_workers(tiles)
                })
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            "Decoded {}x{} {:?} image (version {}, {} layers, {} channels)",
            doc.width,
            doc.height,
            doc.color_mode,
            doc.version,
            doc.layer_count(),
            doc.channels.len()
        );
        Ok(doc)
    }
}
