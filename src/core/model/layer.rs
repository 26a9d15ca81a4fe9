//! Layer tree value types

use super::raster::{Raster, Rgb};
use crate::error::{Result, XcfError};
use crate::parasite::Parasite;
use crate::property::PropertyId;
use crate::text::TextLayer;
use serde::{Deserialize, Serialize};
use serde_json::json;

macro_rules! blend_modes {
    ($($variant:ident = $code:literal),* $(,)?) => {
        /// Layer composite operator, numbered as stored in the MODE property
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[repr(u32)]
        pub enum BlendMode {
            $($variant = $code,)*
        }

        impl BlendMode {
            pub fn from_u32(value: u32) -> Result<Self> {
                match value {
                    $($code => Ok(BlendMode::$variant),)*
                    _ => Err(XcfError::InvalidState {
                        property: PropertyId::Mode.code(),
                        value,
                    }),
                }
            }
        }
    };
}

blend_modes! {
    NormalLegacy = 0,
    Dissolve = 1,
    BehindLegacy = 2,
    MultiplyLegacy = 3,
    ScreenLegacy = 4,
    OverlayLegacy = 5,
    DifferenceLegacy = 6,
    AdditionLegacy = 7,
    SubtractLegacy = 8,
    DarkenOnlyLegacy = 9,
    LightenOnlyLegacy = 10,
    HsvHueLegacy = 11,
    HsvSaturationLegacy = 12,
    HslColorLegacy = 13,
    HsvValueLegacy = 14,
    DivideLegacy = 15,
    DodgeLegacy = 16,
    BurnLegacy = 17,
    HardlightLegacy = 18,
    SoftlightLegacy = 19,
    GrainExtractLegacy = 20,
    GrainMergeLegacy = 21,
    ColorEraseLegacy = 22,
    Overlay = 23,
    LchHue = 24,
    LchChroma = 25,
    LchColor = 26,
    LchLightness = 27,
    Normal = 28,
    Behind = 29,
    Multiply = 30,
    Screen = 31,
    Difference = 32,
    Addition = 33,
    Subtract = 34,
    DarkenOnly = 35,
    LightenOnly = 36,
    HsvHue = 37,
    HsvSaturation = 38,
    HslColor = 39,
    HsvValue = 40,
    Divide = 41,
    Dodge = 42,
    Burn = 43,
    Hardlight = 44,
    Softlight = 45,
    GrainExtract = 46,
    GrainMerge = 47,
    VividLight = 48,
    PinLight = 49,
    LinearLight = 50,
    HardMix = 51,
    Exclusion = 52,
    LinearBurn = 53,
    LumaDarkenOnly = 54,
    LumaLightenOnly = 55,
    Luminance = 56,
    ColorErase = 57,
    Erase = 58,
    Merge = 59,
    Split = 60,
    PassThrough = 61,
}

impl BlendMode {
    pub fn code(self) -> u32 {
        self as u32
    }
}

impl Default for BlendMode {
    fn default() -> Self {
        BlendMode::NormalLegacy
    }
}

/// Color label shown in the layers dialog
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum ColorTag {
    #[default]
    None = 0,
    Blue = 1,
    Green = 2,
    Yellow = 3,
    Orange = 4,
    Brown = 5,
    Red = 6,
    Violet = 7,
    Gray = 8,
}

impl ColorTag {
    pub fn from_u32(value: u32) -> Result<Self> {
        Ok(match value {
            0 => ColorTag::None,
            1 => ColorTag::Blue,
            2 => ColorTag::Green,
            3 => ColorTag::Yellow,
            4 => ColorTag::Orange,
            5 => ColorTag::Brown,
            6 => ColorTag::Red,
            7 => ColorTag::Violet,
            8 => ColorTag::Gray,
            _ => {
                return Err(XcfError::InvalidState {
                    property: PropertyId::ColorTag.code(),
                    value,
                })
            }
        })
    }

    pub fn code(self) -> u32 {
        self as u32
    }
}

/// Attributes shared by group and image layers.
///
/// `x`/`y` are relative to the enclosing group (or the canvas for top-level layers).
#[derive(Debug, Clone, PartialEq)]
pub struct LayerProps {
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub blend_mode: BlendMode,
    pub opacity: u8,
    pub visible: bool,
    pub linked: bool,
    pub lock_alpha: bool,
    pub lock_content: bool,
    pub lock_position: bool,
    pub tattoo: u32,
    pub color_tag: ColorTag,
    pub parasites: Vec<Parasite>,
}

impl LayerProps {
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        LayerProps {
            name: name.into(),
            x: 0,
            y: 0,
            width,
            height,
            blend_mode: BlendMode::default(),
            opacity: 255,
            visible: true,
            linked: false,
            lock_alpha: false,
            lock_content: false,
            lock_position: false,
            tattoo: 0,
            color_tag: ColorTag::None,
            parasites: Vec::new(),
        }
    }

    pub fn at(mut self, x: i32, y: i32) -> Self {
        self.x = x;
        self.y = y;
        self
    }
}

/// A single-plane channel: document channels and layer masks
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub name: String,
    pub raster: Raster,
    pub opacity: u8,
    pub visible: bool,
    pub linked: bool,
    pub show_masked: bool,
    pub color: Rgb,
    pub tattoo: u32,
    pub lock_content: bool,
    pub lock_position: bool,
    pub color_tag: ColorTag,
    pub active: bool,
    pub selection: bool,
    pub parasites: Vec<Parasite>,
}

impl Channel {
    pub fn new(name: impl Into<String>, raster: Raster) -> Self {
        Channel {
            name: name.into(),
            raster,
            opacity: 255,
            visible: true,
            linked: false,
            show_masked: false,
            color: Rgb::BLACK,
            tattoo: 0,
            lock_content: false,
            lock_position: false,
            color_tag: ColorTag::None,
            active: false,
            selection: false,
            parasites: Vec::new(),
        }
    }
}

/// A layer mask plus the layer-level switches that control it
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    pub channel: Channel,
    pub apply: bool,
    pub edit: bool,
    pub show: bool,
}

impl Mask {
    pub fn new(channel: Channel) -> Self {
        Mask {
            channel,
            apply: true,
            edit: false,
            show: false,
        }
    }
}

/// Image content of a leaf layer.
///
/// Masks and text metadata decorate the base raster instead of altering it.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerImage {
    Raster(Raster),
    Masked { image: Box<LayerImage>, mask: Mask },
    Text { image: Box<LayerImage>, text: TextLayer },
}

impl LayerImage {
    pub fn with_mask(self, mask: Mask) -> Self {
        LayerImage::Masked {
            image: Box::new(self),
            mask,
        }
    }

    pub fn with_text(self, text: TextLayer) -> Self {
        LayerImage::Text {
            image: Box::new(self),
            text,
        }
    }

    /// The undecorated pixels
    pub fn raster(&self) -> &Raster {
        match self {
            LayerImage::Raster(raster) => raster,
            LayerImage::Masked { image, .. } | LayerImage::Text { image, .. } => image.raster(),
        }
    }

    pub fn mask(&self) -> Option<&Mask> {
        match self {
            LayerImage::Raster(_) => None,
            LayerImage::Masked { mask, .. } => Some(mask),
            LayerImage::Text { image, .. } => image.mask(),
        }
    }

    pub fn text(&self) -> Option<&TextLayer> {
        match self {
            LayerImage::Raster(_) => None,
            LayerImage::Text { text, .. } => Some(text),
            LayerImage::Masked { image, .. } => image.text(),
        }
    }
}

impl From<Raster> for LayerImage {
    fn from(raster: Raster) -> Self {
        LayerImage::Raster(raster)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupLayer {
    pub props: LayerProps,
    pub expanded: bool,
    /// Top of the stack first
    pub children: Vec<LayerNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageLayer {
    pub props: LayerProps,
    pub image: LayerImage,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LayerNode {
    Group(GroupLayer),
    Image(ImageLayer),
}

impl LayerNode {
    /// Leaf layer whose bounds follow the raster size
    pub fn image(name: impl Into<String>, image: impl Into<LayerImage>) -> Self {
        let image = image.into();
        let raster = image.raster();
        let props = LayerProps::new(name, raster.width(), raster.height());
        LayerNode::Image(ImageLayer { props, image })
    }

    pub fn group(props: LayerProps, children: Vec<LayerNode>) -> Self {
        LayerNode::Group(GroupLayer {
            props,
            expanded: true,
            children,
        })
    }

    pub fn props(&self) -> &LayerProps {
        match self {
            LayerNode::Group(group) => &group.props,
            LayerNode::Image(image) => &image.props,
        }
    }

    pub fn props_mut(&mut self) -> &mut LayerProps {
        match self {
            LayerNode::Group(group) => &mut group.props,
            LayerNode::Image(image) => &mut image.props,
        }
    }

    pub fn name(&self) -> &str {
        &self.props().name
    }

    pub fn is_group(&self) -> bool {
        matches!(self, LayerNode::Group(_))
    }

    /// Groups are always stored with an alpha channel
    pub fn has_alpha(&self) -> bool {
        match self {
            LayerNode::Group(_) => true,
            LayerNode::Image(image) => image.image.raster().layout().has_alpha(),
        }
    }

    pub fn children(&self) -> &[LayerNode] {
        match self {
            LayerNode::Group(group) => &group.children,
            LayerNode::Image(_) => &[],
        }
    }

    /// Number of layers in this subtree, including itself
    pub fn count(&self) -> usize {
        1 + self.children().iter().map(LayerNode::count).sum::<usize>()
    }

    /// Depth-first search by name
    pub fn find(&self, name: &str) -> Option<&LayerNode> {
        if self.name() == name {
            return Some(self);
        }
        self.children().iter().find_map(|child| child.find(name))
    }

    /// Metadata outline of the subtree (no pixel data)
    pub fn outline(&self) -> serde_json::Value {
        let props = self.props();
        let mut value = json!({
            "name": props.name,
            "kind": if self.is_group() { "group" } else { "image" },
            "x": props.x,
            "y": props.y,
            "width": props.width,
            "height": props.height,
            "blend_mode": props.blend_mode,
            "opacity": props.opacity,
            "visible": props.visible,
        });
        match self {
            LayerNode::Group(group) => {
                value["children"] = group.children.iter().map(LayerNode::outline).collect();
            }
            LayerNode::Image(image) => {
                value["layout"] = json!(image.image.raster().layout());
                value["mask"] = json!(image.image.mask().is_some());
                if let Some(text) = image.image.text() {
                    value["text"] = json!(text.plain_text());
                }
            }
        }
        value
    }
}

/// Check the stacking rule: every layer above the bottommost one needs alpha
pub(crate) fn check_stack_alpha<'a, I>(stack: I) -> Result<()>
where
    I: IntoIterator<Item = (&'a str, bool)>,
{
    let stack: Vec<(&str, bool)> = stack.into_iter().collect();
    let Some((_bottom, upper)) = stack.split_last() else {
        return Ok(());
    };
    match upper.iter().find(|(_, has_alpha)| !has_alpha) {
        Some((name, _)) => Err(XcfError::MissingAlpha(name.to_string())),
        None => Ok(()),
    }
}
