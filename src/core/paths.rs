//! Document-level geometry properties: guides, sample points, user unit,
//! legacy paths and vector paths

use crate::error::{Result, XcfError};
use crate::parasite::Parasite;
use crate::property::{Payload, PayloadWriter, PropertyId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuideOrientation {
    Horizontal = 1,
    Vertical = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guide {
    pub position: i32,
    pub orientation: GuideOrientation,
}

impl Guide {
    pub fn horizontal(position: i32) -> Self {
        Guide {
            position,
            orientation: GuideOrientation::Horizontal,
        }
    }

    pub fn vertical(position: i32) -> Self {
        Guide {
            position,
            orientation: GuideOrientation::Vertical,
        }
    }
}

/// GUIDES: `(position: i32, orientation: i8)` pairs filling the payload
pub fn read_guides(payload: &mut Payload<'_>) -> Result<Vec<Guide>> {
    let mut guides = Vec::with_capacity(payload.remaining() / 5);
    while !payload.is_empty() {
        let position = payload.read_i32()?;
        let orientation = match payload.read_i8()? {
            1 => GuideOrientation::Horizontal,
            2 => GuideOrientation::Vertical,
            other => {
                return Err(XcfError::InvalidState {
                    property: PropertyId::Guides.code(),
                    value: other as u32,
                })
            }
        };
        guides.push(Guide {
            position,
            orientation,
        });
    }
    Ok(guides)
}

pub fn write_guides(guides: &[Guide], out: &mut PayloadWriter) -> Result<()> {
    for guide in guides {
        out.write_i32(guide.position)?;
        out.write_i8(guide.orientation as i8)?;
    }
    Ok(())
}

/// Color picker position. Old-style points (OLD_SAMPLE_POINTS) carry no pick mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplePoint {
    pub x: i32,
    pub y: i32,
    pub pick_mode: Option<u32>,
}

/// OLD_SAMPLE_POINTS is `(x, y)` pairs; SAMPLE_POINTS is `(x, y, pick_mode)`
/// followed by two reserved words
pub fn read_sample_points(payload: &mut Payload<'_>, old_style: bool) -> Result<Vec<SamplePoint>> {
    let mut points = Vec::new();
    while !payload.is_empty() {
        let x = payload.read_i32()?;
        let y = payload.read_i32()?;
        let pick_mode = if old_style {
            None
        } else {
            let mode = payload.read_u32()?;
            payload.read_u32()?;
            payload.read_u32()?;
            Some(mode)
        };
        points.push(SamplePoint { x, y, pick_mode });
    }
    Ok(points)
}

/// Falls back to the old layout when no point has a pick mode.
/// Returns the property id the payload belongs under.
pub fn write_sample_points(points: &[SamplePoint], out: &mut PayloadWriter) -> Result<PropertyId> {
    let old_style = points.iter().all(|p| p.pick_mode.is_none());
    for point in points {
        out.write_i32(point.x)?;
        out.write_i32(point.y)?;
        if !old_style {
            out.write_u32(point.pick_mode.unwrap_or(0))?;
            out.write_u32(0)?;
            out.write_u32(0)?;
        }
    }
    Ok(if old_style {
        PropertyId::OldSamplePoints
    } else {
        PropertyId::SamplePoints
    })
}

/// Custom measurement unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserUnit {
    /// Units per inch
    pub factor: f32,
    pub digits: u32,
    pub identifier: String,
    pub symbol: String,
    pub abbreviation: String,
    pub singular: String,
    pub plural: String,
}

impl UserUnit {
    pub fn read(payload: &mut Payload<'_>) -> Result<Self> {
        Ok(UserUnit {
            factor: payload.read_f32()?,
            digits: payload.read_u32()?,
            identifier: payload.read_string()?,
            symbol: payload.read_string()?,
            abbreviation: payload.read_string()?,
            singular: payload.read_string()?,
            plural: payload.read_string()?,
        })
    }

    pub fn write(&self, out: &mut PayloadWriter) -> Result<()> {
        out.write_f32(self.factor)?;
        out.write_u32(self.digits)?;
        for s in [
            &self.identifier,
            &self.symbol,
            &self.abbreviation,
            &self.singular,
            &self.plural,
        ] {
            out.write_string(s)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathPoint {
    pub kind: u32,
    pub x: f32,
    pub y: f32,
}

/// Pre-vectors path record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyPath {
    pub name: String,
    pub locked: bool,
    pub state: u8,
    pub closed: bool,
    /// Record version 1 stores integer points, 2 and 3 floats; 3 adds a tattoo
    pub version: u32,
    pub tattoo: u32,
    pub points: Vec<PathPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyPaths {
    pub active: u32,
    pub paths: Vec<LegacyPath>,
}

impl LegacyPaths {
    pub fn read(payload: &mut Payload<'_>) -> Result<Self> {
        let active = payload.read_u32()?;
        let count = payload.read_u32()?;
        let paths = (0..count)
            .map(|_| read_legacy_path(payload))
            .collect::<Result<Vec<_>>>()?;
        Ok(LegacyPaths { active, paths })
    }

    pub fn write(&self, out: &mut PayloadWriter) -> Result<()> {
        out.write_u32(self.active)?;
        out.write_u32(count_u32(self.paths.len(), "paths")?)?;
        for path in &self.paths {
            out.write_string(&path.name)?;
            out.write_bool(path.locked)?;
            out.write_u8(path.state)?;
            out.write_bool(path.closed)?;
            out.write_u32(count_u32(path.points.len(), "path points")?)?;
            out.write_u32(path.version)?;
            match path.version {
                1 => {}
                2 => out.write_u32(0)?,
                3 => {
                    out.write_u32(0)?;
                    out.write_u32(path.tattoo)?;
                }
                other => {
                    return Err(XcfError::InvalidDocument(format!(
                        "path {:?} has unknown record version {}",
                        path.name, other
                    )))
                }
            }
            for point in &path.points {
                out.write_u32(point.kind)?;
                if path.version == 1 {
                    out.write_i32(point.x.round() as i32)?;
                    out.write_i32(point.y.round() as i32)?;
                } else {
                    out.write_f32(point.x)?;
                    out.write_f32(point.y)?;
                }
            }
        }
        Ok(())
    }
}

fn read_legacy_path(payload: &mut Payload<'_>) -> Result<LegacyPath> {
    let name = payload.read_string()?;
    let locked = payload.read_bool()?;
    let state = payload.read_u8()?;
    let closed = payload.read_bool()?;
    let num_points = payload.read_u32()?;
    let version = payload.read_u32()?;

    let tattoo = match version {
        1 => 0,
        2 => {
            payload.read_u32()?;
            0
        }
        3 => {
            payload.read_u32()?;
            payload.read_u32()?
        }
        other => {
            return Err(XcfError::InvalidState {
                property: PropertyId::Paths.code(),
                value: other,
            })
        }
    };

    let points = (0..num_points)
        .map(|_| {
            let kind = payload.read_u32()?;
            let (x, y) = if version == 1 {
                (payload.read_i32()? as f32, payload.read_i32()? as f32)
            } else {
                (payload.read_f32()?, payload.read_f32()?)
            };
            Ok(PathPoint { kind, x, y })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(LegacyPath {
        name,
        locked,
        state,
        closed,
        version,
        tattoo,
        points,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlPoint {
    /// 0 anchor, 1 control handle
    pub kind: u32,
    /// x, y and up to four extra axes (pressure, tilt, wheel)
    pub coords: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub closed: bool,
    pub num_axes: u32,
    pub points: Vec<ControlPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorPath {
    pub name: String,
    pub tattoo: u32,
    pub visible: bool,
    pub linked: bool,
    pub parasites: Vec<Parasite>,
    pub strokes: Vec<Stroke>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vectors {
    pub active: u32,
    pub paths: Vec<VectorPath>,
}

const VECTORS_VERSION: u32 = 1;
const BEZIER_STROKE: u32 = 1;

fn vectors_state(value: u32) -> XcfError {
    XcfError::InvalidState {
        property: PropertyId::Vectors.code(),
        value,
    }
}

impl Vectors {
    pub fn read(payload: &mut Payload<'_>) -> Result<Self> {
        let version = payload.read_u32()?;
        if version != VECTORS_VERSION {
            return Err(vectors_state(version));
        }
        let active = payload.read_u32()?;
        let count = payload.read_u32()?;
        let paths = (0..count)
            .map(|_| read_vector_path(payload))
            .collect::<Result<Vec<_>>>()?;
        Ok(Vectors { active, paths })
    }

    pub fn write(&self, out: &mut PayloadWriter) -> Result<()> {
        out.write_u32(VECTORS_VERSION)?;
        out.write_u32(self.active)?;
        out.write_u32(count_u32(self.paths.len(), "vector paths")?)?;
        for path in &self.paths {
            out.write_string(&path.name)?;
            out.write_u32(path.tattoo)?;
            out.write_bool(path.visible)?;
            out.write_bool(path.linked)?;
            out.write_u32(count_u32(path.parasites.len(), "path parasites")?)?;
            out.write_u32(count_u32(path.strokes.len(), "strokes")?)?;
            for parasite in &path.parasites {
                parasite.write(out)?;
            }
            for stroke in &path.strokes {
                if !(2..=6).contains(&stroke.num_axes) {
                    return Err(XcfError::InvalidDocument(format!(
                        "stroke in {:?} has {} axes",
                        path.name, stroke.num_axes
                    )));
                }
                out.write_u32(BEZIER_STROKE)?;
                out.write_bool(stroke.closed)?;
                out.write_u32(stroke.num_axes)?;
                out.write_u32(count_u32(stroke.points.len(), "control points")?)?;
                for point in &stroke.points {
                    if point.coords.len() != stroke.num_axes as usize {
                        return Err(XcfError::InvalidDocument(format!(
                            "control point in {:?} has {} coordinates, stroke has {} axes",
                            path.name,
                            point.coords.len(),
                            stroke.num_axes
                        )));
                    }
                    out.write_u32(point.kind)?;
                    for coord in &point.coords {
                        out.write_f32(*coord)?;
                    }
                }
            }
        }
        Ok(())
    }
}

fn read_vector_path(payload: &mut Payload<'_>) -> Result<VectorPath> {
    let name = payload.read_string()?;
    let tattoo = payload.read_u32()?;
    let visible = payload.read_bool()?;
    let linked = payload.read_bool()?;
    let num_parasites = payload.read_u32()?;
    let num_strokes = payload.read_u32()?;

    let parasites = (0..num_parasites)
        .map(|_| Parasite::read(payload))
        .collect::<Result<Vec<_>>>()?;

    let strokes = (0..num_strokes)
        .map(|_| {
            let kind = payload.read_u32()?;
            if kind != BEZIER_STROKE {
                return Err(vectors_state(kind));
            }
            let closed = payload.read_bool()?;
            let num_axes = payload.read_u32()?;
            if !(2..=6).contains(&num_axes) {
                return Err(vectors_state(num_axes));
            }
            let num_points = payload.read_u32()?;
            let points = (0..num_points)
                .map(|_| {
                    let kind = payload.read_u32()?;
                    let coords = (0..num_axes)
                        .map(|_| payload.read_f32())
                        .collect::<Result<Vec<_>>>()?;
                    Ok(ControlPoint { kind, coords })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Stroke {
                closed,
                num_axes,
                points,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(VectorPath {
        name,
        tattoo,
        visible,
        linked,
        parasites,
        strokes,
    })
}

fn count_u32(len: usize, what: &str) -> Result<u32> {
    u32::try_from(len).map_err(|_| XcfError::InvalidDocument(format!("too many {}", what)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::Version;

    fn payload_bytes<F>(fill: F) -> Vec<u8>
    where
        F: FnOnce(&mut PayloadWriter) -> Result<()>,
    {
        let mut out = PayloadWriter::new(Version::V3);
        fill(&mut out).unwrap();
        out.into_bytes()
    }

    #[test]
    fn test_guides() {
        let guides = vec![Guide::horizontal(10), Guide::vertical(-4)];
        let bytes = payload_bytes(|out| write_guides(&guides, out));
        assert_eq!(bytes.len(), 10);
        let mut payload = Payload::new(18, &bytes, Version::V3);
        assert_eq!(read_guides(&mut payload).unwrap(), guides);
    }

    #[test]
    fn test_guide_orientation_checked() {
        let bytes = [0, 0, 0, 1, 3];
        let mut payload = Payload::new(18, &bytes, Version::V3);
        assert!(matches!(
            read_guides(&mut payload),
            Err(XcfError::InvalidState { property: 18, value: 3 })
        ));
    }

    #[test]
    fn test_sample_point_styles() {
        let old = vec![SamplePoint { x: 1, y: 2, pick_mode: None }];
        let mut id = PropertyId::End;
        let bytes = payload_bytes(|out| {
            id = write_sample_points(&old, out)?;
            Ok(())
        });
        assert_eq!(id, PropertyId::OldSamplePoints);
        let mut payload = Payload::new(id.code(), &bytes, Version::V3);
        assert_eq!(read_sample_points(&mut payload, true).unwrap(), old);

        let new = vec![SamplePoint { x: 5, y: 6, pick_mode: Some(1) }];
        let bytes = payload_bytes(|out| write_sample_points(&new, out).map(|_| ()));
        assert_eq!(bytes.len(), 20);
        let mut payload = Payload::new(39, &bytes, Version::V3);
        assert_eq!(read_sample_points(&mut payload, false).unwrap(), new);
    }

    #[test]
    fn test_legacy_path_versions() {
        let point = |x, y| PathPoint { kind: 1, x, y };
        let paths = LegacyPaths {
            active: 1,
            paths: (1..=3)
                .map(|version| LegacyPath {
                    name: format!("path {}", version),
                    locked: false,
                    state: 4,
                    closed: version == 2,
                    version,
                    tattoo: if version == 3 { 77 } else { 0 },
                    points: vec![point(1.0, 2.0), point(3.0, -4.0)],
                })
                .collect(),
        };
        let bytes = payload_bytes(|out| paths.write(out));
        let mut payload = Payload::new(23, &bytes, Version::V3);
        assert_eq!(LegacyPaths::read(&mut payload).unwrap(), paths);
        payload.finish().unwrap();
    }

    #[test]
    fn test_vectors() {
        let vectors = Vectors {
            active: 0,
            paths: vec![VectorPath {
                name: "outline".to_string(),
                tattoo: 9,
                visible: true,
                linked: false,
                parasites: vec![Parasite::new("note", 1, b"x".to_vec())],
                strokes: vec![Stroke {
                    closed: true,
                    num_axes: 2,
                    points: vec![
                        ControlPoint { kind: 0, coords: vec![0.0, 0.0] },
                        ControlPoint { kind: 1, coords: vec![10.5, 3.25] },
                    ],
                }],
            }],
        };
        let bytes = payload_bytes(|out| vectors.write(out));
        let mut payload = Payload::new(25, &bytes, Version::V3);
        assert_eq!(Vectors::read(&mut payload).unwrap(), vectors);
        payload.finish().unwrap();
    }

    #[test]
    fn test_vectors_version_checked() {
        let bytes = payload_bytes(|out| {
            out.write_u32(2)?;
            out.write_u32(0)?;
            out.write_u32(0)
        });
        let mut payload = Payload::new(25, &bytes, Version::V3);
        assert!(matches!(
            Vectors::read(&mut payload),
            Err(XcfError::InvalidState { property: 25, value: 2 })
        ));
    }

    #[test]
    fn test_user_unit() {
        let unit = UserUnit {
            factor: 2.54,
            digits: 2,
            identifier: "centimeter".to_string(),
            symbol: "cm".to_string(),
            abbreviation: "cm".to_string(),
            singular: "centimeter".to_string(),
            plural: "centimeters".to_string(),
        };
        let bytes = payload_bytes(|out| unit.write(out));
        let mut payload = Payload::new(24, &bytes, Version::V3);
        assert_eq!(UserUnit::read(&mut payload).unwrap(), unit);
    }
}
