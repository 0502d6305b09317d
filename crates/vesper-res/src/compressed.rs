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

//! Block-compressed stream wrapper for `RSCC` containers.
//!
//! Layout after the 4-byte magic: `mode:u32`, `block_size:u32`,
//! `total:u32`, one compressed size per block (`total / block_size + 1`
//! blocks), the concatenated LZ4 blocks, then the magic again as a
//! trailer. The wrapper presents the decompressed payload as an ordinary
//! [`ByteStream`]: seeks inside the current block are free, crossing a
//! block boundary re-reads only the target block.
//!
//! The write side buffers the whole payload and emits the frame on
//! [`close`](ByteStream::close); dropping an unclosed writer loses the
//! output.

use vesper_core::EngineError;

use crate::stream::{ByteStream, StreamError};

/// Magic identifying a block-compressed container.
pub const COMPRESSED_MAGIC: &[u8; 4] = b"RSCC";

/// The only supported compression mode.
const MODE_LZ4: u32 = 0;

/// Default block size for written containers.
pub const DEFAULT_BLOCK_SIZE: u32 = 4096;

enum Direction {
    Read {
        block_size: u32,
        total: u32,
        // (file offset, compressed size) per block
        blocks: Vec<(u64, u32)>,
        current: Option<usize>,
        decompressed: Vec<u8>,
    },
    Write {
        block_size: u32,
        buffer: Vec<u8>,
    },
}

/// A [`ByteStream`] that transparently (de)compresses LZ4 blocks.
pub struct CompressedStream {
    inner: Box<dyn ByteStream>,
    dir: Direction,
    position: u64,
    swap: bool,
    error: StreamError,
}

impl CompressedStream {
    /// Opens a compressed payload for reading. The caller has already
    /// consumed the leading magic; the stream position must sit on the
    /// `mode` field.
    pub fn open_after_magic(mut inner: Box<dyn ByteStream>) -> Result<Self, EngineError> {
        let mode = inner.get_u32();
        if mode != MODE_LZ4 {
            return Err(EngineError::Io(format!(
                "unsupported compression mode {mode}"
            )));
        }
        let block_size = inner.get_u32();
        if block_size == 0 {
            return Err(EngineError::Io("compressed block size is zero".into()));
        }
        let total = inner.get_u32();
        let block_count = (total / block_size) as usize + 1;

        let mut sizes = Vec::with_capacity(block_count);
        for _ in 0..block_count {
            sizes.push(inner.get_u32());
        }
        if inner.get_error() != StreamError::Ok {
            return Err(EngineError::Io("truncated compressed header".into()));
        }

        let mut offset = inner.position();
        let mut blocks = Vec::with_capacity(block_count);
        for csize in sizes {
            blocks.push((offset, csize));
            offset += u64::from(csize);
        }

        Ok(Self {
            inner,
            dir: Direction::Read {
                block_size,
                total,
                blocks,
                current: None,
                decompressed: Vec::new(),
            },
            position: 0,
            swap: false,
            error: StreamError::Ok,
        })
    }

    /// Creates a compressed writer over `inner`. Nothing reaches the
    /// underlying stream until [`close`](ByteStream::close).
    pub fn new_write(inner: Box<dyn ByteStream>, block_size: u32) -> Self {
        Self {
            inner,
            dir: Direction::Write {
                block_size: block_size.max(1),
                buffer: Vec::new(),
            },
            position: 0,
            swap: false,
            error: StreamError::Ok,
        }
    }

    /// Consumes the wrapper, returning the underlying stream.
    pub fn into_inner(self) -> Box<dyn ByteStream> {
        self.inner
    }

    fn load_block(&mut self, index: usize) -> bool {
        let Direction::Read {
            block_size,
            total,
            blocks,
            current,
            decompressed,
        } = &mut self.dir
        else {
            return false;
        };
        if *current == Some(index) {
            return true;
        }
        let Some(&(offset, csize)) = blocks.get(index) else {
            return false;
        };
        let expected =
            (*total as usize - index * *block_size as usize).min(*block_size as usize);
        self.inner.seek(offset);
        let mut compressed = vec![0u8; csize as usize];
        self.inner.get_buffer(&mut compressed);
        if self.inner.get_error() == StreamError::Io {
            self.error = StreamError::Io;
            return false;
        }
        match lz4_flex::block::decompress(&compressed, expected) {
            Ok(data) if data.len() == expected => {
                *decompressed = data;
                *current = Some(index);
                true
            }
            _ => {
                self.error = StreamError::Io;
                false
            }
        }
    }
}

impl ByteStream for CompressedStream {
    fn seek(&mut self, pos: u64) {
        self.position = pos;
    }

    fn seek_end(&mut self, offset: i64) {
        self.position = (self.len() as i64 + offset).max(0) as u64;
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn len(&self) -> u64 {
        match &self.dir {
            Direction::Read { total, .. } => u64::from(*total),
            Direction::Write { buffer, .. } => buffer.len() as u64,
        }
    }

    fn get_buffer(&mut self, dst: &mut [u8]) -> usize {
        let (block_size, total) = match &self.dir {
            Direction::Read {
                block_size, total, ..
            } => (*block_size as u64, u64::from(*total)),
            Direction::Write { .. } => {
                self.error = StreamError::Io;
                dst.fill(0);
                return 0;
            }
        };

        let mut read = 0;
        while read < dst.len() && self.position < total {
            let index = (self.position / block_size) as usize;
            if !self.load_block(index) {
                break;
            }
            let within = (self.position % block_size) as usize;
            let Direction::Read { decompressed, .. } = &self.dir else {
                break;
            };
            let n = (dst.len() - read)
                .min(decompressed.len() - within)
                .min((total - self.position) as usize);
            dst[read..read + n].copy_from_slice(&decompressed[within..within + n]);
            read += n;
            self.position += n as u64;
        }
        if read < dst.len() {
            dst[read..].fill(0);
            if self.error == StreamError::Ok {
                self.error = StreamError::Eof;
            }
        }
        read
    }

    fn store_buffer(&mut self, data: &[u8]) {
        let Direction::Write { buffer, .. } = &mut self.dir else {
            self.error = StreamError::Io;
            return;
        };
        let start = self.position as usize;
        let end = start + data.len();
        if end > buffer.len() {
            buffer.resize(end, 0);
        }
        buffer[start..end].copy_from_slice(data);
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

    fn close(&mut self) -> Result<(), EngineError> {
        let Direction::Write { block_size, buffer } = &self.dir else {
            return Ok(());
        };
        let block_size = *block_size;
        let total = buffer.len() as u32;
        let block_count = (total / block_size) as usize + 1;

        let mut blocks = Vec::with_capacity(block_count);
        for i in 0..block_count {
            let start = i * block_size as usize;
            let end = (start + block_size as usize).min(buffer.len());
            blocks.push(lz4_flex::block::compress(&buffer[start..end]));
        }

        // Frame header is always little-endian, whatever the payload uses.
        self.inner.set_endian_swap(false);
        self.inner.store_buffer(COMPRESSED_MAGIC);
        self.inner.store_u32(MODE_LZ4);
        self.inner.store_u32(block_size);
        self.inner.store_u32(total);
        for block in &blocks {
            self.inner.store_u32(block.len() as u32);
        }
        for block in &blocks {
            self.inner.store_buffer(block);
        }
        self.inner.store_buffer(COMPRESSED_MAGIC);

        if self.error == StreamError::Io || self.inner.get_error() == StreamError::Io {
            return Err(EngineError::Io("failed to emit compressed stream".into()));
        }
        self.inner.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::MemoryStream;

    fn compress_round(payload: &[u8], block_size: u32) -> CompressedStream {
        let mut writer =
            CompressedStream::new_write(Box::new(MemoryStream::new()), block_size);
        writer.store_buffer(payload);
        writer.close().unwrap();
        let framed = writer.into_inner();

        let mut raw = vec![0u8; framed.len() as usize];
        let mut framed = framed;
        framed.seek(0);
        framed.get_buffer(&mut raw);
        assert_eq!(&raw[..4], COMPRESSED_MAGIC);
        assert_eq!(&raw[raw.len() - 4..], COMPRESSED_MAGIC);

        let mut inner = MemoryStream::from_vec(raw);
        inner.seek(4);
        CompressedStream::open_after_magic(Box::new(inner)).unwrap()
    }

    #[test]
    fn round_trip_across_blocks() {
        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let mut reader = compress_round(&payload, 64);
        assert_eq!(reader.len(), payload.len() as u64);
        let mut out = vec![0u8; payload.len()];
        reader.get_buffer(&mut out);
        assert_eq!(out, payload);
        assert_eq!(reader.get_error(), StreamError::Ok);
    }

    #[test]
    fn seek_across_blocks_matches_linear_read() {
        let payload: Vec<u8> = (0..1000u32).map(|i| (i * 7 % 256) as u8).collect();
        let mut reader = compress_round(&payload, 32);
        for &pos in &[900usize, 5, 333, 64, 31, 32] {
            reader.seek(pos as u64);
            assert_eq!(reader.get_u8(), payload[pos], "at position {pos}");
        }
    }

    #[test]
    fn exact_multiple_of_block_size() {
        let payload = vec![0xABu8; 128];
        let mut reader = compress_round(&payload, 64);
        let mut out = vec![0u8; 128];
        reader.get_buffer(&mut out);
        assert_eq!(out, payload);
    }

    #[test]
    fn read_past_end_latches_eof() {
        let mut reader = compress_round(b"abc", 64);
        let mut out = [0u8; 8];
        assert_eq!(reader.get_buffer(&mut out), 3);
        assert!(reader.eof_reached());
        assert_eq!(&out[..3], b"abc");
        assert_eq!(&out[3..], &[0, 0, 0, 0, 0]);
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let mut inner = MemoryStream::new();
        inner.store_u32(9);
        inner.store_u32(64);
        inner.store_u32(0);
        inner.seek(0);
        assert!(matches!(
            CompressedStream::open_after_magic(Box::new(inner)),
            Err(EngineError::Io(_))
        ));
    }
}
