use std::io;

use thiserror::Error;

/// Errors raised while decoding or importing an FBX blob.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid FBX header magic")]
    InvalidMagic,

    #[error("ASCII FBX is not supported")]
    UnsupportedFormat,

    #[error("Unsupported FBX version: {0}")]
    UnsupportedVersion(u32),

    #[error("Invalid record type marker: {0:#04x}")]
    InvalidRecordType(u8),

    #[error("Unknown array encoding: {0}")]
    UnknownArrayEncoding(u32),

    #[error("Failed to inflate array: {0}")]
    Inflate(String),

    #[error("Invalid UTF-8 characters in string record")]
    InvalidUtf8,

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("No .fbx entry found in archive")]
    MissingArchiveEntry,

    #[error("Asset has no backing blob")]
    MissingBlob,

    #[error("Malformed FBX document: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, Error>;
