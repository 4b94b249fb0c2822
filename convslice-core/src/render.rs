use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::error::{Result, SliceError};

const INDENT: &[u8] = b"  ";

/// Pretty JSON with a two-space indent and a trailing newline. Non-ASCII text
/// is written as UTF-8, not escaped.
pub fn to_pretty_json<T: Serialize + ?Sized>(value: &T, context: &str) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(INDENT);
    {
        let mut serializer = serde_json::Serializer::with_formatter(&mut bytes, formatter);
        value
            .serialize(&mut serializer)
            .map_err(|e| SliceError::json(context, e))?;
    }
    bytes.push(b'\n');
    Ok(bytes)
}

/// Write already-rendered bytes, replacing any existing file.
pub fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let file = File::create(path).map_err(|e| SliceError::filesystem(path, e))?;
    let mut writer = BufWriter::new(file);
    writer
        .write_all(bytes)
        .and_then(|_| writer.flush())
        .map_err(|e| SliceError::filesystem(path, e))
}
