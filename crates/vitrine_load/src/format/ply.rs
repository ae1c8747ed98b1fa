//! Raw-geometry adapter: Stanford PLY.
//!
//! PLY files carry geometry only, so the adapter wraps the decoded mesh in a
//! node with the default grey material.
//!
//! # Supported Syntax
//!
//! - `format ascii 1.0`, `format binary_little_endian 1.0`,
//!   `format binary_big_endian 1.0`
//! - every scalar type (`char`..`double` and the `int8`..`float64` aliases)
//! - `element vertex` with `x y z` and optional `nx ny nz`
//! - `element face` with a `vertex_indices` (or `vertex_index`) list;
//!   polygons are fan-triangulated
//! - any other element or property is read and ignored
//!
//! A file with no face element is treated as an unindexed triangle soup.

use std::sync::Arc;

use thiserror::Error;
use vitrine_core::{Material, Mesh, SceneNode, Vec3};

use super::{off_runtime, DecodeError, DecodeResult, FormatAdapter};
use crate::catalog::{AssetLocation, FormatTag};
use crate::fetch::ResourceFetcher;

/// Errors that can occur during PLY parsing.
#[derive(Error, Debug, PartialEq)]
pub enum PlyError {
    #[error("Missing 'ply' magic line")]
    MissingMagic,

    #[error("Header error at line {line}: {message}")]
    Header { line: usize, message: String },

    #[error("Header is not terminated by end_header")]
    UnterminatedHeader,

    #[error("Unexpected end of data in element {0}")]
    UnexpectedEof(String),

    #[error("Invalid value {value:?} in element {element}")]
    InvalidValue { element: String, value: String },

    #[error("Vertex element lacks x/y/z properties")]
    MissingPositions,

    #[error("Face references vertex {index} but only {count} vertices exist")]
    IndexOutOfRange { index: i64, count: usize },

    #[error("Element {element} declares {count} rows, more than the body can hold")]
    CountTooLarge { element: String, count: usize },
}

/// Result type for PLY parsing.
pub type PlyResult<T> = Result<T, PlyError>;

/// Decoder for PLY geometry.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlyAdapter;

impl FormatAdapter for PlyAdapter {
    async fn decode<F: ResourceFetcher>(
        &self,
        fetcher: &F,
        location: &AssetLocation,
    ) -> DecodeResult<SceneNode> {
        let path = location.primary(FormatTag::Ply);
        let bytes = fetcher.fetch(&path).await?;
        let name = location.name().to_string();

        off_runtime(move || {
            let mut mesh = parse_ply(&bytes)?.into_mesh();
            if mesh.is_empty() {
                return Err(DecodeError::NoGeometry(path));
            }
            mesh.ensure_normals();

            let mut node = SceneNode::mesh(name, Arc::new(mesh), Arc::new(Material::default_grey()));
            node.enable_shadows();
            Ok(node)
        })
        .await
    }
}

/// Geometry read from a PLY file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlyGeometry {
    pub positions: Vec<Vec3>,
    pub normals: Option<Vec<Vec3>>,
    /// Triangle indices, `None` when the file has no face element
    pub indices: Option<Vec<u32>>,
}

impl PlyGeometry {
    pub fn into_mesh(self) -> Mesh {
        let indices = match self.indices {
            Some(indices) => indices,
            None => {
                let usable = self.positions.len() - self.positions.len() % 3;
                (0..usable as u32).collect()
            }
        };
        Mesh::new(self.positions, indices, self.normals)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Ascii,
    BinaryLittleEndian,
    BinaryBigEndian,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScalarType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
    F64,
}

impl ScalarType {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "char" | "int8" => ScalarType::I8,
            "uchar" | "uint8" => ScalarType::U8,
            "short" | "int16" => ScalarType::I16,
            "ushort" | "uint16" => ScalarType::U16,
            "int" | "int32" => ScalarType::I32,
            "uint" | "uint32" => ScalarType::U32,
            "float" | "float32" => ScalarType::F32,
            "double" | "float64" => ScalarType::F64,
            _ => return None,
        })
    }

    fn size(self) -> usize {
        match self {
            ScalarType::I8 | ScalarType::U8 => 1,
            ScalarType::I16 | ScalarType::U16 => 2,
            ScalarType::I32 | ScalarType::U32 | ScalarType::F32 => 4,
            ScalarType::F64 => 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Property {
    Scalar { name: String, ty: ScalarType },
    List { name: String, count: ScalarType, item: ScalarType },
}

impl Property {
    fn name(&self) -> &str {
        match self {
            Property::Scalar { name, .. } | Property::List { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Element {
    name: String,
    count: usize,
    properties: Vec<Property>,
}

impl Element {
    fn scalar_index(&self, name: &str) -> Option<usize> {
        self.properties
            .iter()
            .position(|p| matches!(p, Property::Scalar { name: n, .. } if n == name))
    }

    /// Fewest body bytes one row can occupy. An ascii value is at least one
    /// character, a binary list at least its count field.
    fn min_row_size(&self, encoding: Encoding) -> usize {
        match encoding {
            Encoding::Ascii => self.properties.len(),
            _ => self
                .properties
                .iter()
                .map(|p| match p {
                    Property::Scalar { ty, .. } => ty.size(),
                    Property::List { count, .. } => count.size(),
                })
                .sum(),
        }
    }
}

#[derive(Debug)]
struct Header {
    encoding: Encoding,
    elements: Vec<Element>,
    /// Byte offset of the body
    body_start: usize,
}

fn header_error(line: usize, message: impl Into<String>) -> PlyError {
    PlyError::Header {
        line,
        message: message.into(),
    }
}

fn parse_header(bytes: &[u8]) -> PlyResult<Header> {
    let mut pos = 0;
    let mut line_no = 0;
    let mut encoding = None;
    let mut elements: Vec<Element> = Vec::new();

    loop {
        let rest = &bytes[pos..];
        let Some(newline) = rest.iter().position(|&b| b == b'\n') else {
            return Err(if line_no == 0 {
                PlyError::MissingMagic
            } else {
                PlyError::UnterminatedHeader
            });
        };
        line_no += 1;
        pos += newline + 1;

        let line = std::str::from_utf8(&rest[..newline])
            .map_err(|_| header_error(line_no, "header is not valid UTF-8"))?
            .trim();

        if line_no == 1 {
            if line != "ply" {
                return Err(PlyError::MissingMagic);
            }
            continue;
        }

        let mut words = line.split_whitespace();
        match words.next() {
            None | Some("comment") | Some("obj_info") => {}
            Some("format") => {
                encoding = Some(match words.next() {
                    Some("ascii") => Encoding::Ascii,
                    Some("binary_little_endian") => Encoding::BinaryLittleEndian,
                    Some("binary_big_endian") => Encoding::BinaryBigEndian,
                    other => {
                        return Err(header_error(
                            line_no,
                            format!("unsupported format {:?}", other.unwrap_or("")),
                        ))
                    }
                });
            }
            Some("element") => {
                let name = words
                    .next()
                    .ok_or_else(|| header_error(line_no, "element without name"))?;
                let count = words
                    .next()
                    .and_then(|c| c.parse::<usize>().ok())
                    .ok_or_else(|| header_error(line_no, "element without valid count"))?;
                elements.push(Element {
                    name: name.to_string(),
                    count,
                    properties: Vec::new(),
                });
            }
            Some("property") => {
                let element = elements
                    .last_mut()
                    .ok_or_else(|| header_error(line_no, "property before any element"))?;
                let property = parse_property(&mut words)
                    .ok_or_else(|| header_error(line_no, format!("invalid property: {}", line)))?;
                element.properties.push(property);
            }
            Some("end_header") => break,
            Some(other) => {
                return Err(header_error(line_no, format!("unknown keyword {}", other)));
            }
        }
    }

    let encoding = encoding.ok_or_else(|| header_error(line_no, "missing format line"))?;
    Ok(Header {
        encoding,
        elements,
        body_start: pos,
    })
}

fn parse_property<'a>(words: &mut impl Iterator<Item = &'a str>) -> Option<Property> {
    match words.next()? {
        "list" => {
            let count = ScalarType::parse(words.next()?)?;
            let item = ScalarType::parse(words.next()?)?;
            let name = words.next()?.to_string();
            Some(Property::List { name, count, item })
        }
        ty => {
            let ty = ScalarType::parse(ty)?;
            let name = words.next()?.to_string();
            Some(Property::Scalar { name, ty })
        }
    }
}

/// Reads scalar values from the body in either encoding.
struct BodyReader<'a> {
    encoding: Encoding,
    bytes: &'a [u8],
    pos: usize,
    tokens: std::str::SplitAsciiWhitespace<'a>,
}

impl<'a> BodyReader<'a> {
    fn new(encoding: Encoding, bytes: &'a [u8]) -> PlyResult<Self> {
        let text = match encoding {
            Encoding::Ascii => std::str::from_utf8(bytes).map_err(|_| PlyError::InvalidValue {
                element: "body".to_string(),
                value: "non-UTF-8 data".to_string(),
            })?,
            _ => "",
        };
        Ok(Self {
            encoding,
            bytes,
            pos: 0,
            tokens: text.split_ascii_whitespace(),
        })
    }

    fn read(&mut self, ty: ScalarType, element: &str) -> PlyResult<f64> {
        let eof = || PlyError::UnexpectedEof(element.to_string());

        if self.encoding == Encoding::Ascii {
            let token = self.tokens.next().ok_or_else(eof)?;
            return token.parse::<f64>().map_err(|_| PlyError::InvalidValue {
                element: element.to_string(),
                value: token.to_string(),
            });
        }

        let size = ty.size();
        let raw = self.bytes.get(self.pos..self.pos + size).ok_or_else(eof)?;
        self.pos += size;

        let mut buf = [0u8; 8];
        buf[..size].copy_from_slice(raw);
        if self.encoding == Encoding::BinaryBigEndian {
            buf[..size].reverse();
        }

        // buf now holds the value in little-endian order
        Ok(match ty {
            ScalarType::I8 => buf[0] as i8 as f64,
            ScalarType::U8 => buf[0] as f64,
            ScalarType::I16 => i16::from_le_bytes([buf[0], buf[1]]) as f64,
            ScalarType::U16 => u16::from_le_bytes([buf[0], buf[1]]) as f64,
            ScalarType::I32 => i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64,
            ScalarType::U32 => u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64,
            ScalarType::F32 => f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64,
            ScalarType::F64 => f64::from_le_bytes(buf),
        })
    }

    fn read_list(&mut self, count: ScalarType, item: ScalarType, element: &str) -> PlyResult<Vec<f64>> {
        let n = self.read(count, element)?;
        if n < 0.0 || n.fract() != 0.0 {
            return Err(PlyError::InvalidValue {
                element: element.to_string(),
                value: n.to_string(),
            });
        }
        (0..n as usize).map(|_| self.read(item, element)).collect()
    }
}

/// Parse PLY bytes into positions, optional normals and triangle indices.
pub fn parse_ply(bytes: &[u8]) -> PlyResult<PlyGeometry> {
    let header = parse_header(bytes)?;
    check_counts(&header, bytes.len() - header.body_start)?;
    let mut body = BodyReader::new(header.encoding, &bytes[header.body_start..])?;
    let mut geometry = PlyGeometry::default();

    for element in &header.elements {
        match element.name.as_str() {
            "vertex" => read_vertices(&mut body, element, &mut geometry)?,
            "face" => read_faces(&mut body, element, &mut geometry)?,
            _ => skip_element(&mut body, element)?,
        }
    }

    if let Some(indices) = &geometry.indices {
        let count = geometry.positions.len();
        if let Some(&bad) = indices.iter().find(|&&i| i as usize >= count) {
            return Err(PlyError::IndexOutOfRange {
                index: bad as i64,
                count,
            });
        }
    }

    Ok(geometry)
}

/// Reject headers whose element counts could not fit in `body_len` bytes.
fn check_counts(header: &Header, body_len: usize) -> PlyResult<()> {
    let mut needed = 0usize;
    for element in &header.elements {
        let rows = element.count.saturating_mul(element.min_row_size(header.encoding));
        needed = needed.saturating_add(rows);
        if needed > body_len {
            return Err(PlyError::CountTooLarge {
                element: element.name.clone(),
                count: element.count,
            });
        }
    }
    Ok(())
}

/// Read one element instance, returning every scalar property value (lists
/// are consumed and reported as NaN).
fn read_row(body: &mut BodyReader<'_>, element: &Element, row: &mut Vec<f64>) -> PlyResult<()> {
    row.clear();
    for property in &element.properties {
        match property {
            Property::Scalar { ty, .. } => row.push(body.read(*ty, &element.name)?),
            Property::List { count, item, .. } => {
                body.read_list(*count, *item, &element.name)?;
                row.push(f64::NAN);
            }
        }
    }
    Ok(())
}

fn skip_element(body: &mut BodyReader<'_>, element: &Element) -> PlyResult<()> {
    // Rows without properties occupy no bytes
    if element.properties.is_empty() {
        return Ok(());
    }
    let mut row = Vec::with_capacity(element.properties.len());
    for _ in 0..element.count {
        read_row(body, element, &mut row)?;
    }
    Ok(())
}

fn read_vertices(body: &mut BodyReader<'_>, element: &Element, geometry: &mut PlyGeometry) -> PlyResult<()> {
    let (Some(x), Some(y), Some(z)) = (
        element.scalar_index("x"),
        element.scalar_index("y"),
        element.scalar_index("z"),
    ) else {
        return Err(PlyError::MissingPositions);
    };
    let normal_index = match (
        element.scalar_index("nx"),
        element.scalar_index("ny"),
        element.scalar_index("nz"),
    ) {
        (Some(nx), Some(ny), Some(nz)) => Some((nx, ny, nz)),
        _ => None,
    };

    // Header counts are untrusted; don't reserve more than the body could hold
    let capacity = element.count.min(body.bytes.len());
    let mut positions = Vec::with_capacity(capacity);
    let mut normals = normal_index.map(|_| Vec::with_capacity(capacity));

    let mut row = Vec::with_capacity(element.properties.len());
    for _ in 0..element.count {
        read_row(body, element, &mut row)?;
        positions.push(Vec3::new(row[x] as f32, row[y] as f32, row[z] as f32));
        if let (Some(normals), Some((nx, ny, nz))) = (normals.as_mut(), normal_index) {
            normals.push(Vec3::new(row[nx] as f32, row[ny] as f32, row[nz] as f32));
        }
    }

    geometry.positions = positions;
    geometry.normals = normals;
    Ok(())
}

fn read_faces(body: &mut BodyReader<'_>, element: &Element, geometry: &mut PlyGeometry) -> PlyResult<()> {
    if element.properties.is_empty() {
        return Ok(());
    }
    let list_index = element.properties.iter().position(|p| {
        matches!(p, Property::List { .. }) && matches!(p.name(), "vertex_indices" | "vertex_index")
    });

    let mut indices = Vec::new();
    for _ in 0..element.count {
        for (i, property) in element.properties.iter().enumerate() {
            match property {
                Property::Scalar { ty, .. } => {
                    body.read(*ty, &element.name)?;
                }
                Property::List { count, item, .. } => {
                    let values = body.read_list(*count, *item, &element.name)?;
                    if Some(i) != list_index {
                        continue;
                    }

                    let polygon = values
                        .iter()
                        .map(|&v| to_index(v, &element.name))
                        .collect::<PlyResult<Vec<u32>>>()?;
                    for k in 1..polygon.len().saturating_sub(1) {
                        indices.extend_from_slice(&[polygon[0], polygon[k], polygon[k + 1]]);
                    }
                }
            }
        }
    }

    if list_index.is_some() {
        geometry.indices = Some(indices);
    }
    Ok(())
}

fn to_index(value: f64, element: &str) -> PlyResult<u32> {
    if value < 0.0 || value.fract() != 0.0 || value > u32::MAX as f64 {
        return Err(PlyError::InvalidValue {
            element: element.to_string(),
            value: value.to_string(),
        });
    }
    Ok(value as u32)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::super::fixtures::TRIANGLE_PLY;
    use super::*;
    use crate::fetch::MemoryFetcher;

    #[test]
    fn test_parse_ascii_triangle() {
        let geometry = parse_ply(TRIANGLE_PLY.as_bytes()).unwrap();
        assert_eq!(geometry.positions.len(), 3);
        assert_eq!(geometry.positions[1], Vec3::X);
        assert_eq!(geometry.indices, Some(vec![0, 1, 2]));
        assert!(geometry.normals.is_none());
    }

    #[test]
    fn test_parse_binary_quad_with_normals_and_extra_element() {
        let header = "ply\nformat binary_little_endian 1.0\n\
                      element vertex 4\n\
                      property float x\nproperty float y\nproperty float z\n\
                      property float nx\nproperty float ny\nproperty float nz\n\
                      property uchar red\n\
                      element face 1\nproperty list uchar uint vertex_indices\n\
                      element edge 1\nproperty int vertex1\nproperty int vertex2\n\
                      end_header\n";
        let mut bytes = header.as_bytes().to_vec();
        for p in [[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]] {
            for c in p.iter().chain([0.0f32, 0.0, 1.0].iter()) {
                bytes.extend_from_slice(&c.to_le_bytes());
            }
            bytes.push(255);
        }
        bytes.push(4);
        for i in [0u32, 1, 2, 3] {
            bytes.extend_from_slice(&i.to_le_bytes());
        }
        bytes.extend_from_slice(&0i32.to_le_bytes());
        bytes.extend_from_slice(&1i32.to_le_bytes());

        let geometry = parse_ply(&bytes).unwrap();
        assert_eq!(geometry.positions.len(), 4);
        assert_eq!(geometry.normals.as_ref().map(Vec::len), Some(4));
        assert_eq!(geometry.normals.as_ref().unwrap()[2], Vec3::Z);
        // Quad fan-triangulated
        assert_eq!(geometry.indices, Some(vec![0, 1, 2, 0, 2, 3]));
    }

    #[test]
    fn test_parse_binary_big_endian() {
        let mut bytes = b"ply\nformat binary_big_endian 1.0\nelement vertex 1\n\
                          property double x\nproperty double y\nproperty short z\nend_header\n"
            .to_vec();
        bytes.extend_from_slice(&1.5f64.to_be_bytes());
        bytes.extend_from_slice(&(-2.0f64).to_be_bytes());
        bytes.extend_from_slice(&(-3i16).to_be_bytes());

        let geometry = parse_ply(&bytes).unwrap();
        assert_eq!(geometry.positions, vec![Vec3::new(1.5, -2.0, -3.0)]);
        assert_eq!(geometry.indices, None);
    }

    #[test]
    fn test_header_errors() {
        assert_eq!(parse_ply(b"obj\n"), Err(PlyError::MissingMagic));
        assert_eq!(parse_ply(b""), Err(PlyError::MissingMagic));
        assert_eq!(
            parse_ply(b"ply\nformat ascii 1.0\nelement vertex 1\n"),
            Err(PlyError::UnterminatedHeader)
        );
        assert!(matches!(
            parse_ply(b"ply\nformat utf16 1.0\nend_header\n"),
            Err(PlyError::Header { line: 2, .. })
        ));
        assert!(matches!(
            parse_ply(b"ply\nformat ascii 1.0\nproperty float x\nend_header\n"),
            Err(PlyError::Header { line: 3, .. })
        ));
    }

    #[test]
    fn test_body_errors() {
        let truncated = "ply\nformat ascii 1.0\nelement vertex 2\n\
                         property float x\nproperty float y\nproperty float z\nend_header\n0 0 0\n";
        assert_eq!(
            parse_ply(truncated.as_bytes()),
            Err(PlyError::UnexpectedEof("vertex".to_string()))
        );

        let out_of_range = "ply\nformat ascii 1.0\nelement vertex 1\n\
                            property float x\nproperty float y\nproperty float z\n\
                            element face 1\nproperty list uchar int vertex_indices\nend_header\n\
                            0 0 0\n3 0 1 2\n";
        assert_eq!(
            parse_ply(out_of_range.as_bytes()),
            Err(PlyError::IndexOutOfRange { index: 1, count: 1 })
        );

        let no_xyz = "ply\nformat ascii 1.0\nelement vertex 1\nproperty float u\nend_header\n0\n";
        assert_eq!(parse_ply(no_xyz.as_bytes()), Err(PlyError::MissingPositions));
    }

    #[test]
    fn test_propertyless_element_with_huge_count() {
        // Finishes immediately instead of looping over u64::MAX empty rows
        for name in ["junk", "face"] {
            let ply = format!(
                "ply\nformat ascii 1.0\nelement vertex 3\n\
                 property float x\nproperty float y\nproperty float z\n\
                 element {} 18446744073709551615\nend_header\n0 0 0\n1 0 0\n0 1 0\n",
                name
            );
            let geometry = parse_ply(ply.as_bytes()).unwrap();
            assert_eq!(geometry.positions.len(), 3);
            assert_eq!(geometry.indices, None);
        }
    }

    #[test]
    fn test_counts_larger_than_body_rejected() {
        let ascii = "ply\nformat ascii 1.0\nelement vertex 18446744073709551615\n\
                     property float x\nproperty float y\nproperty float z\nend_header\n0 0 0\n";
        assert_eq!(
            parse_ply(ascii.as_bytes()),
            Err(PlyError::CountTooLarge {
                element: "vertex".to_string(),
                count: usize::MAX,
            })
        );

        // 1 vertex of 12 bytes fits, the 1000 single-byte list headers do not
        let mut binary = b"ply\nformat binary_little_endian 1.0\nelement vertex 1\n\
                           property float x\nproperty float y\nproperty float z\n\
                           element face 1000\nproperty list uchar int vertex_indices\nend_header\n"
            .to_vec();
        binary.extend_from_slice(&[0u8; 12]);
        binary.push(0);
        assert!(matches!(
            parse_ply(&binary),
            Err(PlyError::CountTooLarge { count: 1000, .. })
        ));
    }

    #[test]
    fn test_faceless_file_becomes_triangle_soup() {
        let ply = "ply\nformat ascii 1.0\nelement vertex 4\n\
                   property float x\nproperty float y\nproperty float z\nend_header\n\
                   0 0 0\n1 0 0\n0 1 0\n5 5 5\n";
        let mesh = parse_ply(ply.as_bytes()).unwrap().into_mesh();
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.indices, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_adapter_synthesizes_default_material() {
        let fetcher = MemoryFetcher::new().with("models/bunny/bunny.ply", TRIANGLE_PLY);
        let location = AssetLocation::new(Path::new("models"), "bunny");

        let node = PlyAdapter.decode(&fetcher, &location).await.unwrap();

        assert_eq!(node.name, "bunny");
        let instance = node.mesh.as_ref().expect("mesh node");
        assert_eq!(*instance.material, Material::default_grey());
        assert!(instance.cast_shadow && instance.receive_shadow);
        assert!(instance.mesh.has_normals());
    }

    #[tokio::test]
    async fn test_adapter_rejects_empty_geometry() {
        let ply = "ply\nformat ascii 1.0\nelement vertex 0\n\
                   property float x\nproperty float y\nproperty float z\nend_header\n";
        let fetcher = MemoryFetcher::new().with("models/empty/empty.ply", ply);
        let location = AssetLocation::new(Path::new("models"), "empty");

        let result = PlyAdapter.decode(&fetcher, &location).await;
        assert!(matches!(result, Err(DecodeError::NoGeometry(_))));
    }
}
