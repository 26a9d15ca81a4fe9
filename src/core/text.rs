//! Styled text carried by the `gimp-text-layer` parasite
//!
//! The parasite is a sequence of tags (see [`crate::parasite`]). The base style
//! comes from `font`, `font-size`, `letter-spacing` and `color`; the content is
//! either a plain `text` string or a `markup` string holding a small XML subset
//! that is flattened into runs, one per character-data node.

use crate::error::{Result, XcfError};
use crate::model::Rgb;
use crate::parasite::{Parasite, Tag, Value};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const TEXT_PARASITE_NAME: &str = "gimp-text-layer";

/// Markup sizes, spacing and rise are stored in 1024ths of a point
const PANGO_SCALE: f64 = 1024.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextStyle {
    pub font: String,
    pub size: f64,
    pub color: Rgb,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strikethrough: bool,
    pub letter_spacing: f64,
    pub rise: f64,
}

impl Default for TextStyle {
    fn default() -> Self {
        TextStyle {
            font: "Sans-serif".to_string(),
            size: 18.0,
            color: Rgb::BLACK,
            bold: false,
            italic: false,
            underline: false,
            strikethrough: false,
            letter_spacing: 0.0,
            rise: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRun {
    pub text: String,
    pub style: TextStyle,
}

/// Decoded text-layer metadata
#[derive(Debug, Clone, PartialEq)]
pub struct TextLayer {
    pub base: TextStyle,
    pub runs: Vec<TextRun>,
    /// TEXT_LAYER_FLAGS value of the owning layer
    pub flags: u32,
    /// Tags this crate does not interpret (justify, box-mode, ...), written back as-is
    pub extra: Vec<Tag>,
}

impl TextLayer {
    /// One run of plain text in the base style
    pub fn plain(text: impl Into<String>, base: TextStyle) -> Self {
        TextLayer {
            runs: vec![TextRun {
                text: text.into(),
                style: base.clone(),
            }],
            base,
            flags: 0,
            extra: Vec::new(),
        }
    }

    pub fn plain_text(&self) -> String {
        self.runs.iter().map(|run| run.text.as_str()).collect()
    }

    pub fn from_parasite(parasite: &Parasite, flags: u32) -> Result<Self> {
        let tags = Tag::parse_all(parasite.text()?)?;

        let mut base = TextStyle::default();
        let mut text = None;
        let mut markup = None;
        let mut extra = Vec::new();

        for tag in tags {
            match tag.name.as_str() {
                "text" => text = Some(string_value(&tag)?.to_string()),
                "markup" => markup = Some(string_value(&tag)?.to_string()),
                "font" => base.font = string_value(&tag)?.to_string(),
                "font-size" => base.size = number_value(&tag)?,
                "letter-spacing" => base.letter_spacing = number_value(&tag)?,
                "color" => base.color = color_value(&tag)?,
                _ => extra.push(tag),
            }
        }

        let runs = match (markup, text) {
            (Some(markup), _) => flatten_markup(&markup, &base)?,
            (None, Some(text)) => vec![TextRun {
                text,
                style: base.clone(),
            }],
            (None, None) => Vec::new(),
        };

        Ok(TextLayer {
            base,
            runs,
            flags,
            extra,
        })
    }

    pub fn to_parasite(&self) -> Parasite {
        let mut tags = Vec::with_capacity(self.extra.len() + 4);

        match self.runs.as_slice() {
            [] => tags.push(Tag::new("text", vec![Value::String(String::new())])),
            [run] if run.style == self.base => {
                tags.push(Tag::new("text", vec![Value::String(run.text.clone())]))
            }
            runs => tags.push(Tag::new(
                "markup",
                vec![Value::String(render_markup(runs, &self.base))],
            )),
        }

        tags.push(Tag::new("font", vec![Value::String(self.base.font.clone())]));
        tags.push(Tag::new("font-size", vec![Value::Number(self.base.size)]));
        if self.base.letter_spacing != 0.0 {
            tags.push(Tag::new(
                "letter-spacing",
                vec![Value::Number(self.base.letter_spacing)],
            ));
        }
        let Rgb { r, g, b } = self.base.color;
        let channel = |c: u8| Value::Number(f64::from(c) / 255.0);
        tags.push(Tag::new(
            "color",
            vec![Value::Tag(Tag::new(
                "color-rgb",
                vec![channel(r), channel(g), channel(b)],
            ))],
        ));
        tags.extend(self.extra.iter().cloned());

        let mut data = tags
            .iter()
            .map(Tag::to_string)
            .collect::<Vec<_>>()
            .join("\n")
            .into_bytes();
        data.push(0);
        Parasite::new(TEXT_PARASITE_NAME, Parasite::PERSISTENT, data)
    }
}

fn layout_error(message: String) -> XcfError {
    XcfError::InvalidParasiteLayout(message)
}

fn string_value(tag: &Tag) -> Result<&str> {
    tag.first()
        .and_then(Value::as_str)
        .ok_or_else(|| layout_error(format!("({}) needs a string", tag.name)))
}

fn number_value(tag: &Tag) -> Result<f64> {
    tag.first()
        .and_then(Value::as_number)
        .ok_or_else(|| layout_error(format!("({}) needs a number", tag.name)))
}

/// `(color (color-rgb r g b))` or `(color (color-rgba r g b a))`, components in 0..1
fn color_value(tag: &Tag) -> Result<Rgb> {
    let inner = tag
        .first()
        .and_then(Value::as_tag)
        .filter(|t| t.name == "color-rgb" || t.name == "color-rgba")
        .ok_or_else(|| layout_error("(color) needs a color-rgb value".to_string()))?;
    let mut channels = inner.values.iter().map(|v| {
        v.as_number()
            .map(|n| (n.clamp(0.0, 1.0) * 255.0).round() as u8)
            .ok_or_else(|| layout_error(format!("({}) component is not a number", inner.name)))
    });
    let mut next = || {
        channels
            .next()
            .unwrap_or_else(|| Err(layout_error(format!("({}) is too short", inner.name))))
    };
    Ok(Rgb::new(next()?, next()?, next()?))
}

/// Flatten markup into runs, each inheriting the style of its enclosing elements
fn flatten_markup(markup: &str, base: &TextStyle) -> Result<Vec<TextRun>> {
    let mut runs = Vec::new();
    let mut open: Vec<(String, TextStyle)> = Vec::new();
    let mut rest = markup;

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('<') {
            let end = after
                .find('>')
                .ok_or_else(|| layout_error("unterminated markup element".to_string()))?;
            let element = &after[..end];
            rest = &after[end + 1..];

            if let Some(name) = element.strip_prefix('/') {
                let name = name.trim();
                match open.pop() {
                    Some((expected, _)) if expected == name => {}
                    Some((expected, _)) => {
                        return Err(layout_error(format!(
                            "</{}> closes <{}>",
                            name, expected
                        )))
                    }
                    None => return Err(layout_error(format!("unmatched </{}>", name))),
                }
                continue;
            }
            if element.ends_with('/') {
                continue;
            }

            let current = open.last().map_or(base, |(_, style)| style);
            let (name, style) = open_element(element, current)?;
            open.push((name, style));
        } else {
            let end = rest.find('<').unwrap_or(rest.len());
            let text = decode_entities(&rest[..end])?;
            rest = &rest[end..];
            if !text.is_empty() {
                let style = open.last().map_or(base, |(_, style)| style).clone();
                runs.push(TextRun { text, style });
            }
        }
    }

    if let Some((name, _)) = open.last() {
        return Err(layout_error(format!("<{}> is never closed", name)));
    }
    Ok(runs)
}

/// Apply one opening element to the inherited style
fn open_element(element: &str, inherited: &TextStyle) -> Result<(String, TextStyle)> {
    let element = element.trim();
    let name_end = element
        .find(|c: char| c.is_ascii_whitespace())
        .unwrap_or(element.len());
    let name = &element[..name_end];
    let mut style = inherited.clone();

    match name {
        "b" => style.bold = true,
        "i" => style.italic = true,
        "u" => style.underline = true,
        "s" => style.strikethrough = true,
        "span" => {
            for (key, value) in parse_attributes(&element[name_end..])? {
                apply_span_attribute(&mut style, &key, &value)?;
            }
        }
        "markup" => {}
        "" => return Err(layout_error("empty markup element".to_string())),
        other => debug!("Ignoring markup element <{}>", other),
    }

    Ok((name.to_string(), style))
}

fn parse_attributes(mut source: &str) -> Result<Vec<(String, String)>> {
    let mut attributes = Vec::new();
    loop {
        source = source.trim_start();
        if source.is_empty() {
            return Ok(attributes);
        }
        let (key, after) = source
            .split_once('=')
            .ok_or_else(|| layout_error(format!("attribute without value: {}", source)))?;
        let after = after.trim_start();
        let quote = after
            .chars()
            .next()
            .filter(|c| *c == '"' || *c == '\'')
            .ok_or_else(|| layout_error(format!("unquoted attribute {}", key.trim())))?;
        let body = &after[1..];
        let close = body
            .find(quote)
            .ok_or_else(|| layout_error(format!("unterminated attribute {}", key.trim())))?;
        attributes.push((key.trim().to_string(), decode_entities(&body[..close])?));
        source = &body[close + 1..];
    }
}

fn apply_span_attribute(style: &mut TextStyle, key: &str, value: &str) -> Result<()> {
    let scaled = |value: &str| {
        value
            .trim()
            .parse::<f64>()
            .map(|n| n / PANGO_SCALE)
            .map_err(|_| layout_error(format!("span {}={:?} is not a number", key, value)))
    };

    match key {
        "foreground" | "fgcolor" | "color" => {
            style.color = Rgb::from_hex(value)
                .ok_or_else(|| layout_error(format!("bad span color {:?}", value)))?;
        }
        "font" | "font_desc" | "font_family" | "face" => style.font = value.to_string(),
        "size" => style.size = scaled(value)?,
        "letter_spacing" => style.letter_spacing = scaled(value)?,
        "rise" => style.rise = scaled(value)?,
        "weight" => {
            style.bold = match value {
                "bold" | "ultrabold" | "heavy" | "semibold" => true,
                "normal" | "light" | "ultralight" | "book" => false,
                numeric => numeric.parse::<u32>().map_or(false, |w| w >= 600),
            }
        }
        "style" => style.italic = matches!(value, "italic" | "oblique"),
        "underline" => style.underline = value != "none",
        "strikethrough" => style.strikethrough = value == "true",
        _ => debug!("Ignoring span attribute {}", key),
    }
    Ok(())
}

fn decode_entities(source: &str) -> Result<String> {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after
            .find(';')
            .ok_or_else(|| layout_error("unterminated markup entity".to_string()))?;
        let entity = &after[..end];
        let ch = match entity {
            "amp" => '&',
            "lt" => '<',
            "gt" => '>',
            "quot" => '"',
            "apos" => '\'',
            _ => {
                let code = if let Some(hex) = entity.strip_prefix("#x") {
                    u32::from_str_radix(hex, 16).ok()
                } else if let Some(dec) = entity.strip_prefix('#') {
                    dec.parse().ok()
                } else {
                    None
                };
                code.and_then(char::from_u32)
                    .ok_or_else(|| layout_error(format!("unknown entity &{};", entity)))?
            }
        };
        out.push(ch);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn escape_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Render runs as spans carrying only the attributes that differ from the base
fn render_markup(runs: &[TextRun], base: &TextStyle) -> String {
    let mut out = String::from("<markup>");
    for run in runs {
        let style = &run.style;
        let mut attributes = Vec::new();
        if style.font != base.font {
            attributes.push(format!("font=\"{}\"", escape_markup(&style.font)));
        }
        if style.size != base.size {
            attributes.push(format!("size=\"{}\"", (style.size * PANGO_SCALE).round()));
        }
        if style.color != base.color {
            attributes.push(format!("foreground=\"{}\"", style.color.to_hex()));
        }
        if style.letter_spacing != base.letter_spacing {
            attributes.push(format!(
                "letter_spacing=\"{}\"",
                (style.letter_spacing * PANGO_SCALE).round()
            ));
        }
        if style.rise != base.rise {
            attributes.push(format!("rise=\"{}\"", (style.rise * PANGO_SCALE).round()));
        }
        if style.bold != base.bold {
            let weight = if style.bold { "bold" } else { "normal" };
            attributes.push(format!("weight=\"{}\"", weight));
        }
        if style.italic != base.italic {
            let slant = if style.italic { "italic" } else { "normal" };
            attributes.push(format!("style=\"{}\"", slant));
        }
        if style.underline != base.underline {
            let line = if style.underline { "single" } else { "none" };
            attributes.push(format!("underline=\"{}\"", line));
        }
        if style.strikethrough != base.strikethrough {
            attributes.push(format!("strikethrough=\"{}\"", style.strikethrough));
        }

        let text = escape_markup(&run.text);
        if attributes.is_empty() {
            out.push_str(&text);
        } else {
            out.push_str(&format!("<span {}>{}</span>", attributes.join(" "), text));
        }
    }
    out.push_str("</markup>");
    out
}
