//! Layer records as they appear on the wire
//!
//! ```text
//! width u32, height u32, type u32, name string, property list,
//! hierarchy pointer, mask pointer
//! ```
//!
//! A [`LayerRecord`] is one flat entry of the layer pointer table: offsets are
//! absolute and the item path is still attached. [`crate::tree`] folds records
//! into the nested [`LayerNode`] tree.

use crate::channel::{read_channel, write_channel};
use crate::config::DecodeOptions;
use crate::error::{Result, XcfError};
use crate::header::Compression;
use crate::io::{XcfReader, XcfWriter};
use crate::model::{
    BlendMode, ColorMode, ColorTag, LayerImage, LayerNode, LayerProps, Mask, PixelLayout, Raster,
};
use crate::parasite::{read_parasites, write_parasites, Parasite};
use crate::property::{
    read_property_list, Payload, PropertyId, PropertyListWriter, PropertyTarget,
};
use crate::text::{TextLayer, TEXT_PARASITE_NAME};
use crate::tile::{
    check_drawable_size, read_hierarchy, skip_hierarchy, write_blank_hierarchy, write_hierarchy,
    TileGrid,
};
use std::io::{Read, Seek, Write};
use tracing::debug;

/// GROUP_ITEM_FLAGS bit for an expanded group in the layers dialog
const GROUP_EXPANDED: u32 = 1;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RecordContent {
    Group { expanded: bool },
    Image(LayerImage),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LayerRecord {
    /// `x`/`y` are absolute canvas offsets
    pub props: LayerProps,
    pub layout: PixelLayout,
    pub item_path: Option<Vec<u32>>,
    pub content: RecordContent,
}

/// Property state collected while reading one layer
struct LayerState {
    props: LayerProps,
    is_group: bool,
    group_flags: u32,
    item_path: Option<Vec<u32>>,
    text_flags: Option<u32>,
    apply_mask: bool,
    edit_mask: bool,
    show_mask: bool,
}

impl PropertyTarget for LayerState {
    fn accepts(&self, id: PropertyId) -> bool {
        use PropertyId::*;
        matches!(
            id,
            ActiveLayer
                | FloatingSelection
                | Opacity
                | FloatOpacity
                | Mode
                | Visible
                | Linked
                | LockAlpha
                | ApplyMask
                | EditMask
                | ShowMask
                | Offsets
                | Tattoo
                | Parasites
                | TextLayerFlags
                | LockContent
                | LockPosition
                | GroupItem
                | ItemPath
                | GroupItemFlags
                | ColorTag
        )
    }

    fn apply(&mut self, id: PropertyId, payload: &mut Payload<'_>) -> Result<()> {
        let props = &mut self.props;
        match id {
            PropertyId::ActiveLayer => {}
            PropertyId::GroupItem => self.is_group = true,
            PropertyId::FloatingSelection => {
                let attached_to = payload.read_pointer()?;
                debug!("Layer {:?} is a floating selection over {}", props.name, attached_to);
            }
            PropertyId::Opacity => props.opacity = payload.read_opacity()?,
            PropertyId::FloatOpacity => props.opacity = payload.read_float_opacity()?,
            PropertyId::Mode => props.blend_mode = BlendMode::from_u32(payload.read_u32()?)?,
            PropertyId::Visible => props.visible = payload.read_bool()?,
            PropertyId::Linked => props.linked = payload.read_bool()?,
            PropertyId::LockAlpha => props.lock_alpha = payload.read_bool()?,
            PropertyId::ApplyMask => self.apply_mask = payload.read_bool()?,
            PropertyId::EditMask => self.edit_mask = payload.read_bool()?,
            PropertyId::ShowMask => self.show_mask = payload.read_bool()?,
            PropertyId::Offsets => {
                props.x = payload.read_i32()?;
                props.y = payload.read_i32()?;
            }
            PropertyId::Tattoo => props.tattoo = payload.read_u32()?,
            PropertyId::Parasites => props.parasites = read_parasites(payload)?,
            PropertyId::TextLayerFlags => self.text_flags = Some(payload.read_u32()?),
            PropertyId::LockContent => props.lock_content = payload.read_bool()?,
            PropertyId::LockPosition => props.lock_position = payload.read_bool()?,
            PropertyId::ItemPath => {
                let mut path = Vec::with_capacity(payload.remaining() / 4);
                while !payload.is_empty() {
                    path.push(payload.read_u32()?);
                }
                self.item_path = Some(path);
            }
            PropertyId::GroupItemFlags => self.group_flags = payload.read_u32()?,
            PropertyId::ColorTag => props.color_tag = ColorTag::from_u32(payload.read_u32()?)?,
            _ => {}
        }
        Ok(())
    }
}

/// Read the layer record at `offset`, pixels, mask and text included
pub(crate) fn read_layer<R: Read + Seek>(
    reader: &mut XcfReader<R>,
    offset: u64,
    color_mode: ColorMode,
    compression: Compression,
    options: &DecodeOptions,
) -> Result<LayerRecord> {
    reader.seek_absolute(offset)?;
    let width = reader.read_u32()?;
    let height = reader.read_u32()?;
    let layout = PixelLayout::from_type_code(reader.read_u32()?)?;
    let name = reader.read_string()?;
    check_drawable_size(&name, width, height)?;

    if layout.color_mode() != color_mode {
        return Err(XcfError::InconsistentData(format!(
            "layer {:?} is {:?} in a {:?} image",
            name, layout, color_mode
        )));
    }

    let mut state = LayerState {
        props: LayerProps::new(name, width, height),
        is_group: false,
        group_flags: 0,
        item_path: None,
        text_flags: None,
        apply_mask: false,
        edit_mask: false,
        show_mask: false,
    };
    read_property_list(reader, &mut state)?;

    let hierarchy = reader.read_pointer()?;
    let mask_offset = reader.read_pointer()?;
    let workers = |tiles: usize| options.tile_workers(tiles);

    debug!(
        "Layer {:?} ({}x{} {:?}{}) at offset {}",
        state.props.name,
        width,
        height,
        layout,
        if state.is_group { ", group" } else { "" },
        offset
    );

    let content = if state.is_group {
        if hierarchy != 0 {
            skip_hierarchy(reader, hierarchy, width, height, layout)?;
        }
        RecordContent::Group {
            expanded: state.group_flags & GROUP_EXPANDED != 0,
        }
    } else {
        let tiles = TileGrid::new(width, height).len();
        let raster = read_hierarchy(
            reader,
            hierarchy,
            width,
            height,
            layout,
            compression,
            workers(tiles),
        )?;
        let mut image = LayerImage::from(raster);

        if mask_offset != 0 {
            let channel = read_channel(
                reader,
                mask_offset,
                Some((width, height)),
                compression,
                workers,
            )?;
            image = image.with_mask(Mask {
                channel,
                apply: state.apply_mask,
                edit: state.edit_mask,
                show: state.show_mask,
            });
        }

        if options.decode_text {
            if let Some(parasite) = take_parasite(&mut state.props.parasites, TEXT_PARASITE_NAME) {
                let text = TextLayer::from_parasite(&parasite, state.text_flags.unwrap_or(0))?;
                image = image.with_text(text);
            }
        }
        RecordContent::Image(image)
    };

    Ok(LayerRecord {
        props: state.props,
        layout,
        item_path: state.item_path,
        content,
    })
}

fn take_parasite(parasites: &mut Vec<Parasite>, name: &str) -> Option<Parasite> {
    let index = parasites.iter().position(|p| p.name == name)?;
    Some(parasites.remove(index))
}

/// Where a layer lands in the file: its canvas offset and, inside a group, its item path
pub(crate) struct Placement<'a> {
    pub x: i32,
    pub y: i32,
    pub item_path: Option<&'a [u32]>,
}

/// Write one layer record (pre-order position in the tree is the caller's concern)
pub(crate) fn write_layer<W: Write + Seek>(
    writer: &mut XcfWriter<W>,
    node: &LayerNode,
    placement: Placement<'_>,
    color_mode: ColorMode,
    compression: Compression,
    workers: impl Fn(usize) -> usize + Copy,
) -> Result<u64> {
    let props = node.props();
    let (layout, image) = match node {
        LayerNode::Group(_) => (PixelLayout::for_mode(color_mode, true), None),
        LayerNode::Image(leaf) => {
            let raster = leaf.image.raster();
            check_raster(props, raster, color_mode)?;
            (raster.layout(), Some(&leaf.image))
        }
    };

    let offset = writer.position();
    writer.write_u32(props.width)?;
    writer.write_u32(props.height)?;
    writer.write_u32(layout.type_code())?;
    writer.write_string(&props.name)?;

    let mut list = PropertyListWriter::new(writer.version());
    list.u32(PropertyId::Opacity, u32::from(props.opacity))?;
    list.with(PropertyId::FloatOpacity, |p| {
        p.write_f32(f32::from(props.opacity) / 255.0)
    })?;
    list.u32(PropertyId::Mode, props.blend_mode.code())?;
    list.bool(PropertyId::Visible, props.visible)?;
    list.bool(PropertyId::Linked, props.linked)?;
    list.bool(PropertyId::LockAlpha, props.lock_alpha)?;
    list.bool(PropertyId::LockContent, props.lock_content)?;
    list.bool(PropertyId::LockPosition, props.lock_position)?;
    list.with(PropertyId::Offsets, |p| {
        p.write_i32(placement.x)?;
        p.write_i32(placement.y)
    })?;
    list.u32(PropertyId::Tattoo, props.tattoo)?;
    if props.color_tag != ColorTag::None {
        list.u32(PropertyId::ColorTag, props.color_tag.code())?;
    }

    let mut parasites = props.parasites.clone();
    match node {
        LayerNode::Group(group) => {
            list.flag(PropertyId::GroupItem)?;
            let flags = if group.expanded { GROUP_EXPANDED } else { 0 };
            list.u32(PropertyId::GroupItemFlags, flags)?;
        }
        LayerNode::Image(leaf) => {
            if let Some(mask) = leaf.image.mask() {
                list.bool(PropertyId::ApplyMask, mask.apply)?;
                list.bool(PropertyId::EditMask, mask.edit)?;
                list.bool(PropertyId::ShowMask, mask.show)?;
            }
            if let Some(text) = leaf.image.text() {
                list.u32(PropertyId::TextLayerFlags, text.flags)?;
                parasites.retain(|p| p.name != TEXT_PARASITE_NAME);
                parasites.push(text.to_parasite());
            }
        }
    }
    if let Some(path) = placement.item_path {
        list.with(PropertyId::ItemPath, |p| {
            path.iter().try_for_each(|index| p.write_u32(*index))
        })?;
    }
    if !parasites.is_empty() {
        list.with(PropertyId::Parasites, |p| write_parasites(&parasites, p))?;
    }
    writer.write_bytes(&list.finish()?)?;

    let hierarchy_slot = writer.reserve_pointer()?;
    let mask_slot = writer.reserve_pointer()?;

    writer.patch_here(hierarchy_slot)?;
    match image {
        None => {
            write_blank_hierarchy(writer, props.width, props.height, layout, compression)?;
        }
        Some(image) => {
            let raster = image.raster();
            let tiles = TileGrid::new(raster.width(), raster.height()).len();
            write_hierarchy(writer, raster, compression, workers(tiles))?;

            if let Some(mask) = image.mask() {
                let mask_raster = &mask.channel.raster;
                if (mask_raster.width(), mask_raster.height()) != (props.width, props.height) {
                    return Err(XcfError::InvalidDocument(format!(
                        "mask of {:?} is {}x{}, layer is {}x{}",
                        props.name,
                        mask_raster.width(),
                        mask_raster.height(),
                        props.width,
                        props.height
                    )));
                }
                writer.patch_here(mask_slot)?;
                write_channel(writer, &mask.channel, compression, workers)?;
            }
        }
    }

    Ok(offset)
}

fn check_raster(props: &LayerProps, raster: &Raster, color_mode: ColorMode) -> Result<()> {
    if (raster.width(), raster.height()) != (props.width, props.height) {
        return Err(XcfError::InvalidDocument(format!(
            "layer {:?} is {}x{} but its raster is {}x{}",
            props.name,
            props.width,
            props.height,
            raster.width(),
            raster.height()
        )));
    }
    if raster.layout().color_mode() != color_mode {
        return Err(XcfError::InvalidDocument(format!(
            "layer {:?} is {:?} in a {:?} image",
            props.name,
            raster.layout(),
            color_mode
        )));
    }
    Ok(())
}
