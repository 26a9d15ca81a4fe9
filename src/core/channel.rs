//! Channel records: document channels and layer masks
//!
//! ```text
//! width u32, height u32, name string, property list, hierarchy pointer
//! ```
//!
//! Channels always hold a single gray plane.

use crate::error::{Result, XcfError};
use crate::header::Compression;
use crate::io::{XcfReader, XcfWriter};
use crate::model::{Channel, ColorTag, PixelLayout, Raster, Rgb};
use crate::parasite::{read_parasites, write_parasites};
use crate::property::{
    read_property_list, Payload, PropertyId, PropertyListWriter, PropertyTarget,
};
use crate::tile::{check_drawable_size, read_hierarchy, write_hierarchy, TileGrid};
use std::io::{Read, Seek, Write};
use tracing::debug;

/// Channel fields gathered from the property list before the pixels are read
struct ChannelProps {
    channel: Channel,
}

impl PropertyTarget for ChannelProps {
    fn accepts(&self, id: PropertyId) -> bool {
        use PropertyId::*;
        matches!(
            id,
            ActiveChannel
                | Selection
                | Opacity
                | FloatOpacity
                | Visible
                | Linked
                | ShowMasked
                | Color
                | Tattoo
                | Parasites
                | LockContent
                | LockPosition
                | ColorTag
        )
    }

    fn apply(&mut self, id: PropertyId, payload: &mut Payload<'_>) -> Result<()> {
        let channel = &mut self.channel;
        match id {
            PropertyId::ActiveChannel => channel.active = true,
            PropertyId::Selection => channel.selection = true,
            PropertyId::Opacity => channel.opacity = payload.read_opacity()?,
            PropertyId::FloatOpacity => channel.opacity = payload.read_float_opacity()?,
            PropertyId::Visible => channel.visible = payload.read_bool()?,
            PropertyId::Linked => channel.linked = payload.read_bool()?,
            PropertyId::ShowMasked => channel.show_masked = payload.read_bool()?,
            PropertyId::Color => {
                let bytes = payload.read_bytes(3)?;
                channel.color = Rgb::new(bytes[0], bytes[1], bytes[2]);
            }
            PropertyId::Tattoo => channel.tattoo = payload.read_u32()?,
            PropertyId::Parasites => channel.parasites = read_parasites(payload)?,
            PropertyId::LockContent => channel.lock_content = payload.read_bool()?,
            PropertyId::LockPosition => channel.lock_position = payload.read_bool()?,
            PropertyId::ColorTag => channel.color_tag = ColorTag::from_u32(payload.read_u32()?)?,
            _ => {}
        }
        Ok(())
    }
}

/// Read the channel record at `offset`.
///
/// `expected` is the owning layer's size when the channel is a mask.
pub(crate) fn read_channel<R: Read + Seek>(
    reader: &mut XcfReader<R>,
    offset: u64,
    expected: Option<(u32, u32)>,
    compression: Compression,
    workers: impl Fn(usize) -> usize,
) -> Result<Channel> {
    reader.seek_absolute(offset)?;
    let width = reader.read_u32()?;
    let height = reader.read_u32()?;
    let name = reader.read_string()?;
    check_drawable_size(&name, width, height)?;

    if let Some((layer_width, layer_height)) = expected {
        if (width, height) != (layer_width, layer_height) {
            return Err(XcfError::InconsistentData(format!(
                "mask {:?} is {}x{}, layer is {}x{}",
                name, width, height, layer_width, layer_height
            )));
        }
    }

    let mut props = ChannelProps {
        channel: Channel::new(name, Raster::new(0, 0, PixelLayout::Gray)),
    };
    read_property_list(reader, &mut props)?;
    let hierarchy = reader.read_pointer()?;

    debug!(
        "Channel {:?} ({}x{}) at offset {}",
        props.channel.name, width, height, offset
    );
    let tiles = TileGrid::new(width, height).len();
    props.channel.raster = read_hierarchy(
        reader,
        hierarchy,
        width,
        height,
        PixelLayout::Gray,
        compression,
        workers(tiles),
    )?;
    Ok(props.channel)
}

pub(crate) fn write_channel<W: Write + Seek>(
    writer: &mut XcfWriter<W>,
    channel: &Channel,
    compression: Compression,
    workers: impl Fn(usize) -> usize,
) -> Result<u64> {
    let raster = &channel.raster;
    if raster.layout() != PixelLayout::Gray {
        return Err(XcfError::InvalidDocument(format!(
            "channel {:?} is {:?}, channels are single-plane gray",
            channel.name,
            raster.layout()
        )));
    }

    let offset = writer.position();
    writer.write_u32(raster.width())?;
    writer.write_u32(raster.height())?;
    writer.write_string(&channel.name)?;

    let mut props = PropertyListWriter::new(writer.version());
    if channel.active {
        props.flag(PropertyId::ActiveChannel)?;
    }
    if channel.selection {
        props.flag(PropertyId::Selection)?;
    }
    props.u32(PropertyId::Opacity, u32::from(channel.opacity))?;
    props.with(PropertyId::FloatOpacity, |p| {
        p.write_f32(f32::from(channel.opacity) / 255.0)
    })?;
    props.bool(PropertyId::Visible, channel.visible)?;
    props.bool(PropertyId::Linked, channel.linked)?;
    props.bool(PropertyId::ShowMasked, channel.show_masked)?;
    props.with(PropertyId::Color, |p| {
        p.write_bytes(&[channel.color.r, channel.color.g, channel.color.b]);
        Ok(())
    })?;
    props.u32(PropertyId::Tattoo, channel.tattoo)?;
    props.bool(PropertyId::LockContent, channel.lock_content)?;
    props.bool(PropertyId::LockPosition, channel.lock_position)?;
    if channel.color_tag != ColorTag::None {
        props.u32(PropertyId::ColorTag, channel.color_tag.code())?;
    }
    if !channel.parasites.is_empty() {
        props.with(PropertyId::Parasites, |p| write_parasites(&channel.parasites, p))?;
    }
    writer.write_bytes(&props.finish()?)?;

    let hierarchy_slot = writer.reserve_pointer()?;
    let tiles = TileGrid::new(raster.width(), raster.height()).len();
    writer.patch_here(hierarchy_slot)?;
    write_hierarchy(writer, raster, compression, workers(tiles))?;
    Ok(offset)
}
