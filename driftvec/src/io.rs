use std::io::{self, BufRead, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};

/// Version of the binary model format.
pub const MODEL_VERSION: u32 = 1;

/// Magic bytes leading a binary model stream.
pub(crate) const MODEL_MAGIC: [u8; 3] = [b'D', b'V', b'M'];

/// Write a component to a binary stream.
///
/// All integers are little-endian fixed-width; vectors and strings are
/// length-prefixed. Fields are written in declaration order.
pub trait WriteModelBinary<W>
where
    W: Write,
{
    fn write_model_binary(&self, write: &mut W) -> Result<()>;
}

/// Read a component from a binary stream.
pub trait ReadModelBinary<R>: Sized
where
    R: Read,
{
    fn read_model_binary(read: &mut R) -> Result<Self>;
}

pub(crate) fn write_usize<W: Write>(write: &mut W, v: usize) -> Result<()> {
    write.write_u64::<LittleEndian>(v as u64)?;
    Ok(())
}

pub(crate) fn read_usize<R: Read>(read: &mut R) -> Result<usize> {
    Ok(read.read_u64::<LittleEndian>()? as usize)
}

pub(crate) fn write_f32<W: Write>(write: &mut W, v: f32) -> Result<()> {
    write.write_f32::<LittleEndian>(v)?;
    Ok(())
}

pub(crate) fn read_f32<R: Read>(read: &mut R) -> Result<f32> {
    Ok(read.read_f32::<LittleEndian>()?)
}

pub(crate) fn write_bool<W: Write>(write: &mut W, v: bool) -> Result<()> {
    write.write_u8(v as u8)?;
    Ok(())
}

pub(crate) fn read_bool<R: Read>(read: &mut R) -> Result<bool> {
    match read.read_u8()? {
        0 => Ok(false),
        1 => Ok(true),
        tag => Err(Error::deserialize(format!("invalid boolean tag: {}", tag))),
    }
}

pub(crate) fn write_string<W: Write>(write: &mut W, s: &str) -> Result<()> {
    write.write_u32::<LittleEndian>(s.len() as u32)?;
    write.write_all(s.as_bytes())?;
    Ok(())
}

pub(crate) fn read_string<R: Read>(read: &mut R) -> Result<String> {
    let len = read.read_u32::<LittleEndian>()?;
    let mut bytes = vec![0; len as usize];
    read.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|e| Error::deserialize(format!("invalid word: {}", e)))
}

pub(crate) fn write_f32_vec<W: Write>(write: &mut W, values: &[f32]) -> Result<()> {
    write_usize(write, values.len())?;
    for &v in values {
        write.write_f32::<LittleEndian>(v)?;
    }
    Ok(())
}

pub(crate) fn read_f32_vec<R: Read>(read: &mut R) -> Result<Vec<f32>> {
    let len = read_usize(read)?;
    let mut values = vec![0f32; len];
    read.read_f32_into::<LittleEndian>(&mut values)?;
    Ok(values)
}

pub(crate) fn write_usize_vec<W: Write>(write: &mut W, values: &[usize]) -> Result<()> {
    write_usize(write, values.len())?;
    for &v in values {
        write_usize(write, v)?;
    }
    Ok(())
}

pub(crate) fn read_usize_vec<R: Read>(read: &mut R) -> Result<Vec<usize>> {
    let len = read_usize(read)?;
    let mut values = Vec::with_capacity(len);
    for _ in 0..len {
        values.push(read_usize(read)?);
    }
    Ok(values)
}

pub(crate) fn write_header<W: Write>(write: &mut W) -> Result<()> {
    write.write_all(&MODEL_MAGIC)?;
    write.write_u32::<LittleEndian>(MODEL_VERSION)?;
    Ok(())
}

pub(crate) fn read_header<R: Read>(read: &mut R) -> Result<()> {
    let mut magic = [0u8; 3];
    read.read_exact(&mut magic)?;
    if magic != MODEL_MAGIC {
        return Err(Error::deserialize("incorrect file format"));
    }

    let version = read.read_u32::<LittleEndian>()?;
    if version != MODEL_VERSION {
        return Err(Error::deserialize(format!(
            "unknown file version: {}",
            version
        )));
    }

    Ok(())
}

/// Iterator over the sentences of a tokenized corpus.
///
/// Expects one sentence per line, tokens separated by whitespace, and
/// yields the bare tokens of each non-blank line. No end-of-sentence
/// marker is appended; a trainer that wants one (see [`crate::EOS`])
/// pushes it onto the sentence itself. A single line buffer is reused
/// across sentences.
pub struct Sentences<R> {
    read: R,
    line: String,
}

impl<R> Sentences<R>
where
    R: BufRead,
{
    pub fn new(read: R) -> Self {
        Sentences {
            read,
            line: String::new(),
        }
    }
}

impl<R> Iterator for Sentences<R>
where
    R: BufRead,
{
    type Item = std::result::Result<Vec<String>, io::Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.line.clear();
            match self.read.read_line(&mut self.line) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(err) => return Some(Err(err)),
            }

            // split_whitespace drops the line terminator and collapses
            // blank lines to zero tokens, which are skipped.
            let tokens = self
                .line
                .split_whitespace()
                .map(ToOwned::to_owned)
                .collect::<Vec<_>>();
            if !tokens.is_empty() {
                return Some(Ok(tokens));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::{read_string, write_string, Sentences};

    #[test]
    fn sentences_yield_bare_tokens() {
        let c = Cursor::new(b"This is a sentence .\nAnd another one .\n".to_vec());
        let mut sentences = Sentences::new(c);
        assert_eq!(
            sentences.next().unwrap().unwrap(),
            vec!["This", "is", "a", "sentence", "."]
        );
        assert_eq!(
            sentences.next().unwrap().unwrap(),
            vec!["And", "another", "one", "."]
        );
        assert!(sentences.next().is_none());
    }

    #[test]
    fn sentences_without_trailing_newline() {
        let c = Cursor::new(b"This is a sentence .\nAnd another one .".to_vec());
        let mut sentences = Sentences::new(c);
        assert_eq!(
            sentences.next().unwrap().unwrap(),
            vec!["This", "is", "a", "sentence", "."]
        );
        assert_eq!(
            sentences.next().unwrap().unwrap(),
            vec!["And", "another", "one", "."]
        );
        assert!(sentences.next().is_none());
    }

    #[test]
    fn sentences_empty_input() {
        let mut sentences = Sentences::new(Cursor::new(b"".to_vec()));
        assert!(sentences.next().is_none());
    }

    #[test]
    fn sentences_skip_blank_lines() {
        let c = Cursor::new(b"\n \n   \na b\n\t\n".to_vec());
        let mut sentences = Sentences::new(c);
        assert_eq!(sentences.next().unwrap().unwrap(), vec!["a", "b"]);
        assert!(sentences.next().is_none());
    }

    #[test]
    fn string_round_trip() {
        let mut buf = Vec::new();
        write_string(&mut buf, "münchen").unwrap();
        let mut cursor = Cursor::new(buf);
        assert_eq!(read_string(&mut cursor).unwrap(), "münchen");
    }
}
