//! Positional byte channels over the input and output recordings.
//!
//! Both sides track their own absolute position so that callers can
//! remember offsets, jump around and come back without asking the OS.
//! The output side supports the reserve/patch pattern: write a padded
//! placeholder, keep streaming, then seek back and overwrite it.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::varint;
use crate::{Error, Result};

/// Größe des Kopierpuffers für Byte-Range-Kopien.
const COPY_BUF_LEN: usize = 8 * 1024;

/// Sequenzieller Leser mit absoluter Neupositionierung.
pub struct PositionalInput<R> {
    inner: BufReader<R>,
    pos: u64,
    len: u64,
}

impl PositionalInput<File> {
    /// Öffnet `path` zum positionsbasierten Lesen.
    pub fn open(path: &Path) -> Result<Self> {
        Self::new(File::open(path)?)
    }
}

impl<R: Read + Seek> PositionalInput<R> {
    /// Umschließt `inner`, Position steht auf 0.
    pub fn new(mut inner: R) -> Result<Self> {
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;
        Ok(Self {
            inner: BufReader::new(inner),
            pos: 0,
            len,
        })
    }

    /// Aktuelle absolute Position.
    #[inline]
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Gesamtlänge der Quelle.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// `true`, wenn die Quelle gar keine Bytes enthält.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Verbleibende Bytes bis zum Ende der Quelle.
    pub fn remaining(&self) -> u64 {
        self.len.saturating_sub(self.pos)
    }

    /// Springt an die absolute Position `pos`.
    ///
    /// Kurze Sprünge innerhalb des Puffers verwerfen ihn nicht.
    pub fn seek(&mut self, pos: u64) -> Result<()> {
        if pos == self.pos {
            return Ok(());
        }
        let delta = pos as i128 - self.pos as i128;
        match i64::try_from(delta) {
            Ok(delta) => self.inner.seek_relative(delta)?,
            Err(_) => {
                self.inner.seek(SeekFrom::Start(pos))?;
            }
        }
        self.pos = pos;
        Ok(())
    }

    /// Liest ein einzelnes Byte.
    #[inline]
    pub fn read_byte(&mut self) -> Result<u8> {
        let mut byte = [0u8; 1];
        self.inner.read_exact(&mut byte)?;
        self.pos += 1;
        Ok(byte[0])
    }

    /// Füllt `buf` vollständig.
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner.read_exact(buf)?;
        self.pos += buf.len() as u64;
        Ok(())
    }

    /// Liest einen komprimierten vorzeichenlosen Integer.
    #[inline]
    pub fn read_u64(&mut self) -> Result<u64> {
        varint::decode(|| self.read_byte())
    }

    /// Liest einen komprimierten vorzeichenbehafteten Integer.
    #[inline]
    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(self.read_u64()? as i64)
    }

    /// Liest einen komprimierten Integer, der in `u32` passen muss (Anzahlen, Längen).
    pub fn read_u32(&mut self) -> Result<u32> {
        varint::to_u32(self.read_u64()?)
    }

    /// Liest ein rohes Big-Endian-`u16` (Header-Felder).
    pub fn read_raw_u16(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.read_bytes(&mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    /// Liest ein rohes Big-Endian-`u32`.
    pub fn read_raw_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_bytes(&mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }

    /// Liest ein rohes Big-Endian-`i64`.
    pub fn read_raw_i64(&mut self) -> Result<i64> {
        let mut buf = [0u8; 8];
        self.read_bytes(&mut buf)?;
        Ok(i64::from_be_bytes(buf))
    }

    /// Überspringt `n` Bytes.
    pub fn skip(&mut self, n: u64) -> Result<()> {
        self.seek(self.pos + n)
    }
}

/// Sequential writer with seek-and-patch support.
///
/// The inner writer is released by [`PositionalOutput::close`]; any write
/// after that fails with [`Error::OutputClosed`].
pub struct PositionalOutput<W: Write + Seek> {
    inner: Option<BufWriter<W>>,
    pos: u64,
}

impl PositionalOutput<File> {
    /// Legt `path` zum Schreiben an (oder kürzt die Datei).
    pub fn create(path: &Path) -> Result<Self> {
        Ok(Self::new(File::create(path)?))
    }
}

impl<W: Write + Seek> PositionalOutput<W> {
    /// Umschließt `inner`; geschrieben wird ab Offset 0.
    pub fn new(inner: W) -> Self {
        Self {
            inner: Some(BufWriter::new(inner)),
            pos: 0,
        }
    }

    #[inline]
    fn writer(&mut self) -> Result<&mut BufWriter<W>> {
        self.inner.as_mut().ok_or(Error::OutputClosed)
    }

    /// Aktuelle absolute Position.
    #[inline]
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Springt an die absolute Position `pos` (gepufferte Bytes werden vorher geschrieben).
    pub fn seek(&mut self, pos: u64) -> Result<()> {
        if pos == self.pos {
            return Ok(());
        }
        self.writer()?.seek(SeekFrom::Start(pos))?;
        self.pos = pos;
        Ok(())
    }

    /// Schreibt ein einzelnes Byte.
    #[inline]
    pub fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.write_bytes(&[byte])
    }

    /// Schreibt `bytes` vollständig.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer()?.write_all(bytes)?;
        self.pos += bytes.len() as u64;
        Ok(())
    }

    /// Schreibt einen komprimierten vorzeichenlosen Integer.
    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        let mut buf = [0u8; varint::MAX_LEN];
        let n = varint::encode(value, &mut buf);
        self.write_bytes(&buf[..n])
    }

    /// Schreibt einen komprimierten vorzeichenbehafteten Integer.
    pub fn write_i64(&mut self, value: i64) -> Result<()> {
        self.write_u64(value as u64)
    }

    /// Schreibt die gepaddete Form fester Breite, die später überschrieben werden kann.
    pub fn write_padded_u32(&mut self, value: u64) -> Result<()> {
        let padded = varint::encode_padded(value)?;
        self.write_bytes(&padded)
    }

    /// Schreibt ein rohes Big-Endian-`i64` (Header-Felder).
    pub fn write_raw_i64(&mut self, value: i64) -> Result<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    /// Schreibt `value` an `at` und kehrt an die aktuelle Position zurück.
    pub fn patch_raw_i64(&mut self, at: u64, value: i64) -> Result<()> {
        let resume = self.pos;
        self.seek(at)?;
        self.write_raw_i64(value)?;
        self.seek(resume)
    }

    /// Schreibt `value` gepaddet an `at` und kehrt an die aktuelle Position zurück.
    pub fn patch_padded_u32(&mut self, at: u64, value: u64) -> Result<()> {
        let resume = self.pos;
        self.seek(at)?;
        self.write_padded_u32(value)?;
        self.seek(resume)
    }

    /// Schreibt gepufferte Bytes in den inneren Writer.
    pub fn flush(&mut self) -> Result<()> {
        self.writer()?.flush()?;
        Ok(())
    }

    /// Flusht und verwirft den inneren Writer. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        match self.inner.take() {
            Some(mut writer) => {
                writer.flush()?;
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Flusht und gibt den inneren Writer zurück.
    pub fn into_inner(mut self) -> Result<W> {
        self.take_inner()
    }

    /// Flusht und entnimmt den inneren Writer; danach gilt der Kanal als geschlossen.
    pub fn take_inner(&mut self) -> Result<W> {
        let writer = self.inner.take().ok_or(Error::OutputClosed)?;
        writer.into_inner().map_err(|e| Error::from(e.into_error()))
    }

    /// `true` once [`close`](Self::close) or [`into_inner`](Self::into_inner) ran.
    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }
}

/// Copies the input range `[start, end)` to the end of `output`.
///
/// The input position is restored afterwards. Memory use is bounded by a
/// fixed copy buffer regardless of the range length.
pub fn copy_range<R: Read + Seek, W: Write + Seek>(
    input: &mut PositionalInput<R>,
    output: &mut PositionalOutput<W>,
    start: u64,
    end: u64,
) -> Result<()> {
    if end < start {
        return Err(Error::MalformedRange { start, end });
    }
    let resume = input.position();
    input.seek(start)?;
    let mut buf = [0u8; COPY_BUF_LEN];
    let mut left = end - start;
    while left > 0 {
        let n = left.min(COPY_BUF_LEN as u64) as usize;
        input.read_bytes(&mut buf[..n])?;
        output.write_bytes(&buf[..n])?;
        left -= n as u64;
    }
    input.seek(resume)
}
