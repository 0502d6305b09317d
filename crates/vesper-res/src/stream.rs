// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Seekable binary streams with a runtime endian flag.
//!
//! [`ByteStream`] is the seam every container component reads and writes
//! through. Scalar reads never fail directly: past end-of-stream they
//! return zeroes and latch an error flag, which the parsing layers check
//! at well-defined points. This keeps the hot decode loops free of
//! per-byte error plumbing while still making truncation detectable.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use vesper_core::EngineError;

/// The latched error state of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamError {
    /// No error.
    #[default]
    Ok,
    /// A read ran past the end of the stream; the short portion was
    /// zero-filled.
    Eof,
    /// An underlying I/O operation failed.
    Io,
}

/// A seekable byte stream with explicit endianness.
///
/// Multi-byte scalars default to little-endian; `set_endian_swap(true)`
/// switches every scalar read and write to big-endian. The provided
/// scalar methods are all built on [`get_buffer`](ByteStream::get_buffer)
/// and [`store_buffer`](ByteStream::store_buffer).
pub trait ByteStream {
    /// Seeks to an absolute position.
    fn seek(&mut self, pos: u64);

    /// Seeks relative to the end of the stream (`offset` is usually
    /// zero or negative).
    fn seek_end(&mut self, offset: i64);

    /// Returns the current position.
    fn position(&self) -> u64;

    /// Returns the total length of the stream.
    fn len(&self) -> u64;

    /// Returns `true` when the stream holds no bytes.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` once a read has run past the end.
    fn eof_reached(&self) -> bool {
        self.get_error() == StreamError::Eof
    }

    /// Reads into `dst`, zero-filling and latching [`StreamError::Eof`]
    /// on a short read. Returns the number of bytes actually read.
    fn get_buffer(&mut self, dst: &mut [u8]) -> usize;

    /// Writes all of `data`, latching [`StreamError::Io`] on failure.
    fn store_buffer(&mut self, data: &[u8]);

    /// Switches multi-byte scalars between little-endian (`false`) and
    /// big-endian (`true`).
    fn set_endian_swap(&mut self, swap: bool);

    /// Returns the current endian setting.
    fn endian_swap(&self) -> bool;

    /// Returns the latched error state.
    fn get_error(&self) -> StreamError;

    /// Flushes buffered data to the underlying sink. Streams that frame
    /// their output (the compressed wrapper) emit it here; dropping such
    /// a stream without closing loses the tail.
    fn close(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    /// Reads one byte.
    fn get_u8(&mut self) -> u8 {
        let mut b = [0u8; 1];
        self.get_buffer(&mut b);
        b[0]
    }

    /// Reads a 16-bit unsigned integer.
    fn get_u16(&mut self) -> u16 {
        let mut b = [0u8; 2];
        self.get_buffer(&mut b);
        if self.endian_swap() {
            u16::from_be_bytes(b)
        } else {
            u16::from_le_bytes(b)
        }
    }

    /// Reads a 32-bit unsigned integer.
    fn get_u32(&mut self) -> u32 {
        let mut b = [0u8; 4];
        self.get_buffer(&mut b);
        if self.endian_swap() {
            u32::from_be_bytes(b)
        } else {
            u32::from_le_bytes(b)
        }
    }

    /// Reads a 64-bit unsigned integer.
    fn get_u64(&mut self) -> u64 {
        let mut b = [0u8; 8];
        self.get_buffer(&mut b);
        if self.endian_swap() {
            u64::from_be_bytes(b)
        } else {
            u64::from_le_bytes(b)
        }
    }

    /// Reads a 32-bit float.
    fn get_f32(&mut self) -> f32 {
        f32::from_bits(self.get_u32())
    }

    /// Reads a 64-bit float.
    fn get_f64(&mut self) -> f64 {
        f64::from_bits(self.get_u64())
    }

    /// Reads one real-valued payload at the width selected by the
    /// file-level flag, narrowing to `f32`.
    fn get_real(&mut self, real64: bool) -> f32 {
        if real64 {
            self.get_f64() as f32
        } else {
            self.get_f32()
        }
    }

    /// Writes one byte.
    fn store_u8(&mut self, v: u8) {
        self.store_buffer(&[v]);
    }

    /// Writes a 16-bit unsigned integer.
    fn store_u16(&mut self, v: u16) {
        let b = if self.endian_swap() {
            v.to_be_bytes()
        } else {
            v.to_le_bytes()
        };
        self.store_buffer(&b);
    }

    /// Writes a 32-bit unsigned integer.
    fn store_u32(&mut self, v: u32) {
        let b = if self.endian_swap() {
            v.to_be_bytes()
        } else {
            v.to_le_bytes()
        };
        self.store_buffer(&b);
    }

    /// Writes a 64-bit unsigned integer.
    fn store_u64(&mut self, v: u64) {
        let b = if self.endian_swap() {
            v.to_be_bytes()
        } else {
            v.to_le_bytes()
        };
        self.store_buffer(&b);
    }

    /// Writes a 32-bit float.
    fn store_f32(&mut self, v: f32) {
        self.store_u32(v.to_bits());
    }

    /// Writes a 64-bit float.
    fn store_f64(&mut self, v: f64) {
        self.store_u64(v.to_bits());
    }

    /// Writes one real-valued payload. Files are always written at
    /// 32-bit real width.
    fn store_real(&mut self, v: f32) {
        self.store_f32(v);
    }
}

/// The access mode a [`FileStream`] was opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileMode {
    Read,
    Write,
}

/// A [`ByteStream`] over a filesystem file.
pub struct FileStream {
    file: File,
    mode: FileMode,
    length: u64,
    position: u64,
    swap: bool,
    error: StreamError,
}

impl FileStream {
    /// Opens an existing file for reading.
    pub fn open_read(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let file = File::open(path)?;
        let length = file.metadata()?.len();
        Ok(Self {
            file,
            mode: FileMode::Read,
            length,
            position: 0,
            swap: false,
            error: StreamError::Ok,
        })
    }

    /// Creates (or truncates) a file for writing. The stream stays
    /// seekable so offset tables can be patched after the fact.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            file,
            mode: FileMode::Write,
            length: 0,
            position: 0,
            swap: false,
            error: StreamError::Ok,
        })
    }
}

impl ByteStream for FileStream {
    fn seek(&mut self, pos: u64) {
        if self.file.seek(SeekFrom::Start(pos)).is_err() {
            self.error = StreamError::Io;
            return;
        }
        self.position = pos;
    }

    fn seek_end(&mut self, offset: i64) {
        match self.file.seek(SeekFrom::End(offset)) {
            Ok(pos) => self.position = pos,
            Err(_) => self.error = StreamError::Io,
        }
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn len(&self) -> u64 {
        self.length
    }

    fn get_buffer(&mut self, dst: &mut [u8]) -> usize {
        if self.mode != FileMode::Read {
            self.error = StreamError::Io;
            dst.fill(0);
            return 0;
        }
        let mut read = 0;
        while read < dst.len() {
            match self.file.read(&mut dst[read..]) {
                Ok(0) => break,
                Ok(n) => read += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(_) => {
                    self.error = StreamError::Io;
                    break;
                }
            }
        }
        self.position += read as u64;
        if read < dst.len() {
            dst[read..].fill(0);
            if self.error == StreamError::Ok {
                self.error = StreamError::Eof;
            }
        }
        read
    }

    fn store_buffer(&mut self, data: &[u8]) {
        if self.mode != FileMode::Write {
            self.error = StreamError::Io;
            return;
        }
        if self.file.write_all(data).is_err() {
            self.error = StreamError::Io;
            return;
        }
        self.position += data.len() as u64;
        self.length = self.length.max(self.position);
    }

    fn set_endian_swap(&mut self, swap: bool) {
        self.swap = swap;
    }

    fn endian_swap(&self) -> bool {
        self.swap
    }

    fn get_error(&self) -> StreamError {
        self.error
    }

    fn close(&mut self) -> Result<(), EngineError> {
        if self.mode == FileMode::Write {
            self.file.flush()?;
        }
        if self.error == StreamError::Io {
            return Err(EngineError::Io("stream error latched on close".into()));
        }
        Ok(())
    }
}

/// A [`ByteStream`] over an in-memory buffer, growable on write.
#[derive(Debug, Default)]
pub struct MemoryStream {
    data: Vec<u8>,
    position: u64,
    swap: bool,
    error: StreamError,
}

impl MemoryStream {
    /// Creates an empty stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a stream positioned at the start of `data`.
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }

    /// Consumes the stream, returning the underlying bytes.
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Borrows the underlying bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }
}

impl ByteStream for MemoryStream {
    fn seek(&mut self, pos: u64) {
        self.position = pos;
    }

    fn seek_end(&mut self, offset: i64) {
        self.position = (self.data.len() as i64 + offset).max(0) as u64;
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn get_buffer(&mut self, dst: &mut [u8]) -> usize {
        let start = (self.position as usize).min(self.data.len());
        let available = self.data.len() - start;
        let read = dst.len().min(available);
        dst[..read].copy_from_slice(&self.data[start..start + read]);
        self.position += read as u64;
        if read < dst.len() {
            dst[read..].fill(0);
            if self.error == StreamError::Ok {
                self.error = StreamError::Eof;
            }
        }
        read
    }

    fn store_buffer(&mut self, data: &[u8]) {
        let start = self.position as usize;
        let end = start + data.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(data);
        self.position = end as u64;
    }

    fn set_endian_swap(&mut self, swap: bool) {
        self.swap = swap;
    }

    fn endian_swap(&self) -> bool {
        self.swap
    }

    fn get_error(&self) -> StreamError {
        self.error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_round_trip_little_endian() {
        let mut s = MemoryStream::new();
        s.store_u16(0x1234);
        s.store_u32(0xDEAD_BEEF);
        s.store_u64(0x0102_0304_0506_0708);
        s.store_f32(1.5);
        s.seek(0);
        assert_eq!(s.get_u16(), 0x1234);
        assert_eq!(s.get_u32(), 0xDEAD_BEEF);
        assert_eq!(s.get_u64(), 0x0102_0304_0506_0708);
        assert_eq!(s.get_f32(), 1.5);
        assert_eq!(s.get_error(), StreamError::Ok);
    }

    #[test]
    fn endian_swap_affects_scalars() {
        let mut s = MemoryStream::new();
        s.set_endian_swap(true);
        s.store_u32(1);
        assert_eq!(s.bytes(), &[0, 0, 0, 1]);
        s.seek(0);
        assert_eq!(s.get_u32(), 1);
        s.seek(0);
        s.set_endian_swap(false);
        assert_eq!(s.get_u32(), 0x0100_0000);
    }

    #[test]
    fn short_read_zero_fills_and_latches_eof() {
        let mut s = MemoryStream::from_vec(vec![0xAA, 0xBB]);
        assert_eq!(s.get_u32(), 0x0000_BBAA);
        assert!(s.eof_reached());
    }

    #[test]
    fn overwrite_in_the_middle() {
        let mut s = MemoryStream::new();
        s.store_u32(0);
        s.store_u32(7);
        s.seek(0);
        s.store_u32(42);
        s.seek(0);
        assert_eq!(s.get_u32(), 42);
        assert_eq!(s.get_u32(), 7);
    }

    #[test]
    fn file_stream_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scratch.bin");
        {
            let mut w = FileStream::create(&path).unwrap();
            w.store_u32(99);
            w.store_buffer(b"tail");
            w.close().unwrap();
        }
        let mut r = FileStream::open_read(&path).unwrap();
        assert_eq!(r.len(), 8);
        assert_eq!(r.get_u32(), 99);
        let mut buf = [0u8; 4];
        r.get_buffer(&mut buf);
        assert_eq!(&buf, b"tail");
        assert_eq!(r.get_error(), StreamError::Ok);
    }
}
