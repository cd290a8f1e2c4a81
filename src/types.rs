//! Binary FBX node records.
//!
//! A binary FBX file is a list of nested [`Node`]s. Each node carries a name, a list of typed
//! property [`Record`]s and a list of child nodes.

use std::borrow::Cow;
use std::io::{self, Cursor, Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};
use flate2::read::ZlibDecoder;

use crate::error::{Error, Result};

/// A single typed property of a [`Node`].
#[derive(Clone, Debug, PartialEq)]
pub enum Record {
    B(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    RawArray(Vec<u8>),
    String(String),
    BArray(Vec<bool>),
    I8Array(Vec<i8>),
    I32Array(Vec<i32>),
    I64Array(Vec<i64>),
    F32Array(Vec<f32>),
    F64Array(Vec<f64>),
}

impl Record {
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Record::B(v) => Some(v as i64),
            Record::I16(v) => Some(v as i64),
            Record::I32(v) => Some(v as i64),
            Record::I64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Record::F32(v) => Some(v as f64),
            Record::F64(v) => Some(v),
            Record::I16(v) => Some(v as f64),
            Record::I32(v) => Some(v as f64),
            Record::I64(v) => Some(v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Record::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Record::RawArray(v) => Some(v),
            _ => None,
        }
    }

    /// Numeric array as doubles, widening `f32` and integer arrays.
    pub fn as_f64_array(&self) -> Option<Cow<'_, [f64]>> {
        match self {
            Record::F64Array(v) => Some(Cow::Borrowed(v)),
            Record::F32Array(v) => Some(Cow::Owned(v.iter().map(|&x| x as f64).collect())),
            Record::I32Array(v) => Some(Cow::Owned(v.iter().map(|&x| x as f64).collect())),
            _ => None,
        }
    }

    pub fn as_i32_array(&self) -> Option<Cow<'_, [i32]>> {
        match self {
            Record::I32Array(v) => Some(Cow::Borrowed(v)),
            Record::I64Array(v) => Some(Cow::Owned(v.iter().map(|&x| x as i32).collect())),
            _ => None,
        }
    }

    pub fn as_i64_array(&self) -> Option<Cow<'_, [i64]>> {
        match self {
            Record::I64Array(v) => Some(Cow::Borrowed(v)),
            Record::I32Array(v) => Some(Cow::Owned(v.iter().map(|&x| x as i64).collect())),
            _ => None,
        }
    }
}

/// A named FBX node with its property records and nested children.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Node {
    pub name: String,
    pub properties: Vec<Record>,
    pub children: Vec<Node>,
}

impl Node {
    pub fn new(name: &str) -> Node {
        Node {
            name: name.to_string(),
            properties: Vec::new(),
            children: Vec::new(),
        }
    }

    /// First child with the given name.
    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn property(&self, index: usize) -> Option<&Record> {
        self.properties.get(index)
    }

    /// First property of the named child.
    pub fn child_property(&self, name: &str) -> Option<&Record> {
        self.child(name).and_then(|c| c.property(0))
    }
}

trait Decodable: Sized {
    const SIZE: usize;
    fn decode<R: Read>(r: &mut R) -> Result<Self>;
}

impl Decodable for bool {
    const SIZE: usize = 1;
    fn decode<R: Read>(r: &mut R) -> Result<bool> {
        Ok(r.read_u8()? == 1)
    }
}

impl Decodable for i8 {
    const SIZE: usize = 1;
    fn decode<R: Read>(r: &mut R) -> Result<i8> {
        Ok(r.read_i8()?)
    }
}

impl Decodable for i32 {
    const SIZE: usize = 4;
    fn decode<R: Read>(r: &mut R) -> Result<i32> {
        Ok(r.read_i32::<LittleEndian>()?)
    }
}

impl Decodable for i64 {
    const SIZE: usize = 8;
    fn decode<R: Read>(r: &mut R) -> Result<i64> {
        Ok(r.read_i64::<LittleEndian>()?)
    }
}

impl Decodable for f32 {
    const SIZE: usize = 4;
    fn decode<R: Read>(r: &mut R) -> Result<f32> {
        Ok(r.read_f32::<LittleEndian>()?)
    }
}

impl Decodable for f64 {
    const SIZE: usize = 8;
    fn decode<R: Read>(r: &mut R) -> Result<f64> {
        Ok(r.read_f64::<LittleEndian>()?)
    }
}

/// Upper bound on buffers reserved from lengths declared in the file.
const MAX_PREALLOC: usize = 1 << 16;

/// Reads exactly `length` bytes without trusting `length` for the allocation.
fn read_bytes<R: Read>(r: &mut R, length: usize) -> Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(length.min(MAX_PREALLOC));
    r.take(length as u64).read_to_end(&mut bytes)?;
    if bytes.len() != length {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("expected {} bytes, got {}", length, bytes.len()),
        )));
    }
    Ok(bytes)
}

fn decode_raw_array<R: Read>(r: &mut R) -> Result<Vec<u8>> {
    let length = r.read_u32::<LittleEndian>()? as usize;
    read_bytes(r, length)
}

fn decode_values<R: Read, T: Decodable>(r: &mut R, length: usize) -> Result<Vec<T>> {
    let mut array = Vec::with_capacity(length.min(MAX_PREALLOC));
    for _ in 0..length {
        array.push(T::decode(r)?);
    }
    Ok(array)
}

fn decode_array<R: Read, T: Decodable>(r: &mut R) -> Result<Vec<T>> {
    let length = r.read_u32::<LittleEndian>()? as usize;
    let encoding = r.read_u32::<LittleEndian>()?;
    let compressed_length = r.read_u32::<LittleEndian>()? as usize;
    match encoding {
        0 => decode_values(r, length),
        1 => {
            let compressed = read_bytes(r, compressed_length)?;
            let expected = length.saturating_mul(T::SIZE);
            // One byte past the declared size is enough to detect oversized payloads.
            let mut decompressed = Vec::with_capacity(expected.min(MAX_PREALLOC));
            ZlibDecoder::new(&compressed[..])
                .take(expected as u64 + 1)
                .read_to_end(&mut decompressed)
                .map_err(|e| Error::Inflate(e.to_string()))?;
            if decompressed.len() != expected {
                return Err(Error::Inflate(format!(
                    "expected {} bytes, got {}{}",
                    expected,
                    decompressed.len(),
                    if decompressed.len() > expected { " or more" } else { "" }
                )));
            }
            decode_values(&mut Cursor::new(decompressed), length)
        }
        other => Err(Error::UnknownArrayEncoding(other)),
    }
}

pub fn decode_record<R: Read>(r: &mut R) -> Result<Record> {
    match r.read_u8()? {
        b'C' => Ok(Record::B(r.read_u8()? == 1)),
        b'Y' => Ok(Record::I16(r.read_i16::<LittleEndian>()?)),
        b'I' => Ok(Record::I32(r.read_i32::<LittleEndian>()?)),
        b'L' => Ok(Record::I64(r.read_i64::<LittleEndian>()?)),
        b'F' => Ok(Record::F32(r.read_f32::<LittleEndian>()?)),
        b'D' => Ok(Record::F64(r.read_f64::<LittleEndian>()?)),
        b'R' => Ok(Record::RawArray(decode_raw_array(r)?)),
        b'S' => String::from_utf8(decode_raw_array(r)?)
            .map(Record::String)
            .map_err(|_| Error::InvalidUtf8),
        b'b' => Ok(Record::BArray(decode_array::<R, bool>(r)?)),
        b'c' => Ok(Record::I8Array(decode_array::<R, i8>(r)?)),
        b'i' => Ok(Record::I32Array(decode_array::<R, i32>(r)?)),
        b'l' => Ok(Record::I64Array(decode_array::<R, i64>(r)?)),
        b'f' => Ok(Record::F32Array(decode_array::<R, f32>(r)?)),
        b'd' => Ok(Record::F64Array(decode_array::<R, f64>(r)?)),
        other => Err(Error::InvalidRecordType(other)),
    }
}

fn decode_offset<R: Read>(r: &mut R, wide: bool) -> Result<u64> {
    if wide {
        Ok(r.read_u64::<LittleEndian>()?)
    } else {
        Ok(r.read_u32::<LittleEndian>()? as u64)
    }
}

/// Decode one node record. Returns `None` on the null record terminating a node list.
/// `end` is the end offset of the enclosing list; a record must lie strictly inside it.
fn decode_node<R: Read + Seek>(r: &mut R, end: u64, wide: bool) -> Result<Option<Node>> {
    let start = r.stream_position()?;
    let end_offset = decode_offset(r, wide)?;
    let num_properties = decode_offset(r, wide)?;
    let _property_list_len = decode_offset(r, wide)?;
    let name_len = r.read_u8()? as usize;
    if end_offset == 0 {
        return Ok(None);
    }
    if end_offset <= start || end_offset > end {
        return Err(Error::Malformed(format!(
            "record at {} ends at {}, outside {}..{}",
            start, end_offset, start, end
        )));
    }

    let mut name = vec![0u8; name_len];
    r.read_exact(&mut name)?;
    let name = String::from_utf8(name).map_err(|_| Error::InvalidUtf8)?;

    let mut properties = Vec::with_capacity(num_properties.min(1024) as usize);
    for _ in 0..num_properties {
        properties.push(decode_record(r)?);
    }
    let position = r.stream_position()?;
    if position > end_offset {
        return Err(Error::Malformed(format!(
            "record {} runs to {}, past its end offset {}",
            name, position, end_offset
        )));
    }

    let children = if position < end_offset {
        decode_node_list(r, end_offset, wide)?
    } else {
        Vec::new()
    };
    r.seek(SeekFrom::Start(end_offset))?;

    Ok(Some(Node {
        name,
        properties,
        children,
    }))
}

/// Decode sibling nodes until the null record or the `end` offset.
/// `wide` selects the 64-bit record headers used from FBX 7.5 on.
pub fn decode_node_list<R: Read + Seek>(r: &mut R, end: u64, wide: bool) -> Result<Vec<Node>> {
    let mut nodes = Vec::new();
    while r.stream_position()? < end {
        match decode_node(r, end, wide)? {
            Some(node) => nodes.push(node),
            None => break,
        }
    }
    Ok(nodes)
}
