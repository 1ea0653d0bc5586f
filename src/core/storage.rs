use std::io::{self, Read, Write};

pub const MAGIC: &[u8; 8] = b"CELLNET1";
pub const VERSION_V1: u32 = 1;
/// Adds the oscillator cycle position after the four `u16` counters.
pub const VERSION_V2: u32 = 2;
pub const VERSION_CURRENT: u32 = VERSION_V2;

/// A sink that only counts bytes, used to size an image without buffering it.
pub struct CountingWriter {
    written: usize,
}

impl CountingWriter {
    pub fn new() -> Self {
        Self { written: 0 }
    }

    pub fn written(&self) -> usize {
        self.written
    }
}

impl Default for CountingWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for CountingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written = self.written.saturating_add(buf.len());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn write_u8<W: Write>(w: &mut W, v: u8) -> io::Result<()> {
    w.write_all(&[v])
}

pub fn write_u16_le<W: Write>(w: &mut W, v: u16) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub fn write_u32_le<W: Write>(w: &mut W, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub fn write_f32_le<W: Write>(w: &mut W, v: f32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub fn write_f64_le<W: Write>(w: &mut W, v: f64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

/// Write a length as `u32`, rejecting lengths the format cannot represent.
pub fn write_len<W: Write>(w: &mut W, len: usize) -> io::Result<()> {
    let len = u32::try_from(len)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "length exceeds u32"))?;
    write_u32_le(w, len)
}

pub fn read_exact<const N: usize, R: Read>(r: &mut R) -> io::Result<[u8; N]> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

pub fn read_u8<R: Read>(r: &mut R) -> io::Result<u8> {
    Ok(read_exact::<1, _>(r)?[0])
}

pub fn read_u16_le<R: Read>(r: &mut R) -> io::Result<u16> {
    Ok(u16::from_le_bytes(read_exact::<2, _>(r)?))
}

pub fn read_u32_le<R: Read>(r: &mut R) -> io::Result<u32> {
    Ok(u32::from_le_bytes(read_exact::<4, _>(r)?))
}

pub fn read_f32_le<R: Read>(r: &mut R) -> io::Result<f32> {
    Ok(f32::from_le_bytes(read_exact::<4, _>(r)?))
}

pub fn read_f64_le<R: Read>(r: &mut R) -> io::Result<f64> {
    Ok(f64::from_le_bytes(read_exact::<8, _>(r)?))
}

/// Codec for a cell value inside a network image.
pub trait CellCodec: Sized {
    fn write_cell<W: Write>(&self, w: &mut W) -> io::Result<()>;
    /// `version` is the image's format version, already checked to be known.
    fn read_cell<R: Read>(r: &mut R, version: u32) -> crate::Result<Self>;
}

/// Codec for the global parameter block that follows the image header.
pub trait ParamsCodec: Sized {
    fn write_params<W: Write>(&self, w: &mut W) -> io::Result<()>;
    fn read_params<R: Read>(r: &mut R) -> crate::Result<Self>;
}
