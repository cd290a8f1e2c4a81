//! Minimal binary FBX writer used to feed the decoder.

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::write::ZlibEncoder;
use flate2::Compression;

#[derive(Clone, Debug)]
pub enum Prop {
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Str(String),
    Raw(Vec<u8>),
    I32s(Vec<i32>),
    I64s(Vec<i64>),
    F32s(Vec<f32>),
    F64s(Vec<f64>),
    /// `f64` array stored zlib compressed.
    ZF64s(Vec<f64>),
}

pub fn s(value: &str) -> Prop {
    Prop::Str(value.to_string())
}

fn write_array(out: &mut Vec<u8>, code: u8, count: usize, encoding: u32, payload: &[u8]) {
    out.push(code);
    out.write_u32::<LittleEndian>(count as u32).unwrap();
    out.write_u32::<LittleEndian>(encoding).unwrap();
    out.write_u32::<LittleEndian>(payload.len() as u32).unwrap();
    out.extend_from_slice(payload);
}

impl Prop {
    fn write(&self, out: &mut Vec<u8>) {
        match self {
            Prop::Bool(v) => {
                out.push(b'C');
                out.push(*v as u8);
            }
            Prop::I16(v) => {
                out.push(b'Y');
                out.write_i16::<LittleEndian>(*v).unwrap();
            }
            Prop::I32(v) => {
                out.push(b'I');
                out.write_i32::<LittleEndian>(*v).unwrap();
            }
            Prop::I64(v) => {
                out.push(b'L');
                out.write_i64::<LittleEndian>(*v).unwrap();
            }
            Prop::F32(v) => {
                out.push(b'F');
                out.write_f32::<LittleEndian>(*v).unwrap();
            }
            Prop::F64(v) => {
                out.push(b'D');
                out.write_f64::<LittleEndian>(*v).unwrap();
            }
            Prop::Str(v) => {
                out.push(b'S');
                out.write_u32::<LittleEndian>(v.len() as u32).unwrap();
                out.extend_from_slice(v.as_bytes());
            }
            Prop::Raw(v) => {
                out.push(b'R');
                out.write_u32::<LittleEndian>(v.len() as u32).unwrap();
                out.extend_from_slice(v);
            }
            Prop::I32s(v) => {
                let mut payload = Vec::new();
                for x in v {
                    payload.write_i32::<LittleEndian>(*x).unwrap();
                }
                write_array(out, b'i', v.len(), 0, &payload);
            }
            Prop::I64s(v) => {
                let mut payload = Vec::new();
                for x in v {
                    payload.write_i64::<LittleEndian>(*x).unwrap();
                }
                write_array(out, b'l', v.len(), 0, &payload);
            }
            Prop::F32s(v) => {
                let mut payload = Vec::new();
                for x in v {
                    payload.write_f32::<LittleEndian>(*x).unwrap();
                }
                write_array(out, b'f', v.len(), 0, &payload);
            }
            Prop::F64s(v) => {
                let mut payload = Vec::new();
                for x in v {
                    payload.write_f64::<LittleEndian>(*x).unwrap();
                }
                write_array(out, b'd', v.len(), 0, &payload);
            }
            Prop::ZF64s(v) => {
                let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
                for x in v {
                    encoder.write_f64::<LittleEndian>(*x).unwrap();
                }
                let payload = encoder.finish().unwrap();
                write_array(out, b'd', v.len(), 1, &payload);
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct Rec {
    pub name: String,
    pub props: Vec<Prop>,
    pub children: Vec<Rec>,
}

impl Rec {
    pub fn new(name: &str) -> Rec {
        Rec {
            name: name.to_string(),
            props: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn prop(mut self, prop: Prop) -> Rec {
        self.props.push(prop);
        self
    }

    pub fn child(mut self, child: Rec) -> Rec {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: Vec<Rec>) -> Rec {
        self.children.extend(children);
        self
    }
}

fn header_len(wide: bool) -> usize {
    if wide {
        25
    } else {
        13
    }
}

fn write_offset(out: &mut [u8], at: usize, wide: bool, value: u64) {
    if wide {
        out[at..at + 8].copy_from_slice(&value.to_le_bytes());
    } else {
        out[at..at + 4].copy_from_slice(&(value as u32).to_le_bytes());
    }
}

fn write_node(out: &mut Vec<u8>, rec: &Rec, wide: bool) {
    let start = out.len();
    let header = header_len(wide);
    out.resize(start + header, 0);
    out.extend_from_slice(rec.name.as_bytes());

    let props_start = out.len();
    for p in &rec.props {
        p.write(out);
    }
    let props_len = out.len() - props_start;

    if !rec.children.is_empty() {
        for c in &rec.children {
            write_node(out, c, wide);
        }
        out.extend(std::iter::repeat(0u8).take(header));
    }

    let end = out.len() as u64;
    let width = if wide { 8 } else { 4 };
    write_offset(out, start, wide, end);
    write_offset(out, start + width, wide, rec.props.len() as u64);
    write_offset(out, start + 2 * width, wide, props_len as u64);
    out[start + header - 1] = rec.name.len() as u8;
}

/// Encodes `records` as a binary FBX file of the given version.
pub fn write_fbx(version: u32, records: &[Rec]) -> Vec<u8> {
    let wide = version >= 7500;
    let mut out = Vec::new();
    out.extend_from_slice(b"Kaydara FBX Binary  \x00\x1a\x00");
    out.write_u32::<LittleEndian>(version).unwrap();
    for r in records {
        write_node(&mut out, r, wide);
    }
    out.extend(std::iter::repeat(0u8).take(header_len(wide)));
    out
}
