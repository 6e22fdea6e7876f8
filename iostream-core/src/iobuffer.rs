//! Component A: the shared byte-buffer primitive.
//!
//! An [`IoBuffer`] is a chain of fixed-capacity, refcounted blocks with a
//! single producer and any number of independent [`Reader`]s. Blocks are
//! appended as the producer writes past the current tail's capacity, and are
//! freed once every reader has consumed past them and the producer holds no
//! other reference — never truncated or compacted in place, matching the
//! append-only contract every IOBuffer consumer in the original core relies
//! on (readers may run arbitrarily far behind the writer).
//!
//! The allocation shape (power-of-two size classes, `reserve`-then-`commit`
//! for zero-copy producer writes) is grounded on the Workspace's
//! `reserve()`/`ReservedBuf::release()` pair, adapted from a per-task arena
//! to a refcounted multi-reader chain since an IOBuffer outlives any single
//! task and must support independent readers.

use std::cell::Cell;
use std::rc::Rc;

use crate::error::{CoreError, ResourceError};

/// Power-of-two buffer size classes, from 128 B up to 32 KiB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSizeClass(u8);

impl BufferSizeClass {
    pub const MIN_INDEX: u8 = 0;
    pub const MAX_INDEX: u8 = 8;

    /// `index` selects `2^(7+index)` bytes; valid range is `0..=8` (128 B..=32 KiB).
    pub fn new(index: u8) -> Result<Self, CoreError> {
        if index > Self::MAX_INDEX {
            return Err(ResourceError::OutOfMemory {
                requested: 1usize << (7 + index.min(63)),
            }
            .into());
        }
        Ok(Self(index))
    }

    #[must_use]
    pub fn bytes(self) -> usize {
        1usize << (7 + self.0)
    }

    #[must_use]
    pub fn default_class() -> Self {
        // 8 KiB, the common default block size quoted by the original core.
        Self(6)
    }
}

impl Default for BufferSizeClass {
    fn default() -> Self {
        Self::default_class()
    }
}

/// One block in the chain: fixed capacity, append-only, refcounted.
struct IoBlock {
    data: std::cell::RefCell<Box<[u8]>>,
    /// Bytes written so far; only the producer ever advances this.
    written: Cell<usize>,
    capacity: usize,
}

impl IoBlock {
    fn new(capacity: usize) -> Self {
        Self {
            data: std::cell::RefCell::new(vec![0u8; capacity].into_boxed_slice()),
            written: Cell::new(0),
            capacity,
        }
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn write_avail(&self) -> usize {
        self.capacity() - self.written.get()
    }
}

/// A chain of blocks with a single producer. Cloneable handles share the
/// same underlying chain (`Rc`-based, matching the single-threaded-per-loop
/// concurrency model: an `IoBuffer` never crosses a continuation mutex
/// boundary without the whole continuation moving with it).
#[derive(Clone)]
pub struct IoBuffer {
    inner: Rc<IoBufferInner>,
}

struct IoBufferInner {
    size_class: BufferSizeClass,
    blocks: std::cell::RefCell<Vec<Rc<IoBlock>>>,
}

impl IoBuffer {
    #[must_use]
    pub fn new(size_class: BufferSizeClass) -> Self {
        Self {
            inner: Rc::new(IoBufferInner {
                size_class,
                blocks: std::cell::RefCell::new(vec![Rc::new(IoBlock::new(size_class.bytes()))]),
            }),
        }
    }

    /// Total bytes ever written to this buffer (sum of all blocks' `written`).
    #[must_use]
    pub fn write_total(&self) -> usize {
        self.inner
            .blocks
            .borrow()
            .iter()
            .map(|b| b.written.get())
            .sum()
    }

    /// Append `src` to the tail block, allocating new blocks as needed.
    /// Never splits a write across blocks invisibly to the caller; returns
    /// the number of bytes actually written (always `src.len()` unless the
    /// process is out of memory, in which case a partial write is returned).
    pub fn write(&self, mut src: &[u8]) -> usize {
        let mut total = 0;
        while !src.is_empty() {
            let blocks = self.inner.blocks.borrow_mut();
            let tail = blocks.last().expect("blocks never empty");
            let avail = tail.write_avail();
            if avail == 0 {
                let cap = self.inner.size_class.bytes();
                drop(blocks);
                self.inner.blocks.borrow_mut().push(Rc::new(IoBlock::new(cap)));
                continue;
            }
            let n = avail.min(src.len());
            let start = tail.written.get();
            tail.data.borrow_mut()[start..start + n].copy_from_slice(&src[..n]);
            tail.written.set(start + n);
            total += n;
            src = &src[n..];
        }
        total
    }

    /// Create a new independent [`Reader`] starting at the current write
    /// position of the earliest live block (i.e. it will only see bytes
    /// written from this point forward). Callers that want to see bytes
    /// already sitting in the buffer should hold this reader from before
    /// those writes happen, or use [`IoBuffer::alloc_reader_from_start`].
    #[must_use]
    pub fn alloc_reader(&self) -> Reader {
        let blocks = self.inner.blocks.borrow();
        let tail = blocks.last().expect("blocks never empty").clone();
        let offset = tail.written.get();
        drop(blocks);
        Reader {
            buffer: self.clone(),
            block: tail,
            offset,
            consumed: 0,
        }
    }

    /// Create a new [`Reader`] positioned at the oldest live block, so it
    /// sees everything still retained in the chain rather than only future
    /// writes. Used when a one-shot drain needs "whatever is in the buffer
    /// right now" without the caller having held a reader since creation.
    #[must_use]
    pub fn alloc_reader_from_start(&self) -> Reader {
        let blocks = self.inner.blocks.borrow();
        let head = blocks.first().expect("blocks never empty").clone();
        drop(blocks);
        Reader {
            buffer: self.clone(),
            block: head,
            offset: 0,
            consumed: 0,
        }
    }

    /// Copy `n` bytes into this buffer from `src`, starting `offset` bytes
    /// ahead of `src`'s current position, without advancing `src` itself —
    /// used to splice data from one reader's view into a different buffer
    /// without disturbing the source reader's own progress. Returns the
    /// number of bytes actually copied (fewer than `n` if `src` doesn't have
    /// that many bytes available past `offset`).
    pub fn copy_from(&self, src: &Reader, n: usize, offset: usize) -> usize {
        let mut blocks = src.buffer.inner.blocks.borrow();
        let Some(start_idx) = blocks.iter().position(|b| Rc::ptr_eq(b, &src.block)) else {
            return 0;
        };

        let mut idx = start_idx;
        let mut pos = src.offset;
        let mut to_skip = offset;
        while to_skip > 0 {
            let avail = blocks[idx].written.get() - pos;
            if avail == 0 {
                idx += 1;
                if idx >= blocks.len() {
                    return 0;
                }
                pos = 0;
                continue;
            }
            let skip = avail.min(to_skip);
            pos += skip;
            to_skip -= skip;
        }

        let mut copied = 0;
        while copied < n && idx < blocks.len() {
            let avail = blocks[idx].written.get() - pos;
            if avail == 0 {
                idx += 1;
                pos = 0;
                continue;
            }
            let take = avail.min(n - copied);
            let chunk = blocks[idx].data.borrow()[pos..pos + take].to_vec();
            drop(blocks);
            self.write(&chunk);
            blocks = src.buffer.inner.blocks.borrow();
            pos += take;
            copied += take;
        }
        copied
    }

    /// Drop any blocks that lie entirely before `watermark_block_index` and
    /// have no outstanding readers. Called opportunistically by the loop;
    /// readers consume-as-they-go so this is rarely needed in practice.
    fn compact(&self) {
        let mut blocks = self.inner.blocks.borrow_mut();
        while blocks.len() > 1 {
            let first = &blocks[0];
            // Rc::strong_count == 2 means only this Vec and `first` hold it
            // (no Reader clone is keeping it alive), and it's fully drained.
            if Rc::strong_count(first) == 1 && first.written.get() == first.capacity() {
                blocks.remove(0);
            } else {
                break;
            }
        }
    }
}

/// An independent cursor into an [`IoBuffer`]'s block chain.
pub struct Reader {
    buffer: IoBuffer,
    block: Rc<IoBlock>,
    offset: usize,
    /// Bytes consumed from *earlier*, already-dropped blocks, for a
    /// buffer-wide view via [`Reader::total_consumed`].
    consumed: usize,
}

impl Reader {
    /// Bytes immediately readable without crossing a block boundary.
    #[must_use]
    pub fn avail(&self) -> usize {
        self.block.written.get() - self.offset
    }

    /// Bytes readable in total across the rest of the chain.
    #[must_use]
    pub fn avail_total(&self) -> usize {
        let blocks = self.buffer.inner.blocks.borrow();
        let Some(start) = blocks.iter().position(|b| Rc::ptr_eq(b, &self.block)) else {
            return self.avail();
        };
        let mut total = self.avail();
        for b in &blocks[start + 1..] {
            total += b.written.get();
        }
        total
    }

    /// Copy up to `dst.len()` bytes into `dst`, advancing the reader.
    /// Returns the number of bytes copied.
    pub fn copy_out(&mut self, dst: &mut [u8]) -> usize {
        let mut copied = 0;
        while copied < dst.len() {
            let avail = self.avail();
            if avail == 0 {
                if !self.advance_block() {
                    break;
                }
                continue;
            }
            let n = avail.min(dst.len() - copied);
            dst[copied..copied + n]
                .copy_from_slice(&self.block.data.borrow()[self.offset..self.offset + n]);
            self.offset += n;
            copied += n;
        }
        self.consumed += copied;
        self.buffer.compact();
        copied
    }

    /// Skip `n` bytes without copying them out (used when a caller only
    /// needs the byte count, e.g. background-fill's `addBytes`).
    pub fn consume(&mut self, mut n: usize) -> usize {
        let mut consumed = 0;
        while n > 0 {
            let avail = self.avail();
            if avail == 0 {
                if !self.advance_block() {
                    break;
                }
                continue;
            }
            let skip = avail.min(n);
            self.offset += skip;
            n -= skip;
            consumed += skip;
        }
        self.consumed += consumed;
        self.buffer.compact();
        consumed
    }

    #[must_use]
    pub fn total_consumed(&self) -> usize {
        self.consumed
    }

    fn advance_block(&mut self) -> bool {
        let blocks = self.buffer.inner.blocks.borrow();
        let Some(idx) = blocks.iter().position(|b| Rc::ptr_eq(b, &self.block)) else {
            return false;
        };
        if idx + 1 >= blocks.len() {
            return false;
        }
        let next = blocks[idx + 1].clone();
        drop(blocks);
        self.block = next;
        self.offset = 0;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_back() {
        let buf = IoBuffer::new(BufferSizeClass::new(0).unwrap()); // 128 B blocks
        buf.write(b"hello world");
        let mut r = buf.alloc_reader();
        let mut out = [0u8; 11];
        assert_eq!(r.copy_out(&mut out), 11);
        assert_eq!(&out, b"hello world");
    }

    #[test]
    fn spans_multiple_blocks() {
        let buf = IoBuffer::new(BufferSizeClass::new(0).unwrap()); // 128 B
        let payload = vec![b'x'; 500];
        buf.write(&payload);
        let mut r = buf.alloc_reader();
        let mut out = vec![0u8; 500];
        assert_eq!(r.copy_out(&mut out), 500);
        assert_eq!(out, payload);
    }

    #[test]
    fn independent_readers_see_same_bytes_independently() {
        let buf = IoBuffer::new(BufferSizeClass::default());
        buf.write(b"abc");
        let mut r1 = buf.alloc_reader();
        buf.write(b"def");
        let mut r2 = buf.alloc_reader();

        let mut out1 = [0u8; 6];
        assert_eq!(r1.copy_out(&mut out1), 6);
        assert_eq!(&out1, b"abcdef");

        let mut out2 = [0u8; 0];
        assert_eq!(r2.avail(), 0);
        assert_eq!(r2.copy_out(&mut out2), 0);
    }

    #[test]
    fn a_lagging_reader_keeps_blocks_alive() {
        let sc = BufferSizeClass::new(0).unwrap(); // 128 B blocks
        let buf = IoBuffer::new(sc);
        let mut lagging = buf.alloc_reader();
        buf.write(&vec![b'y'; 300]); // spans 3 blocks
        let mut fast = buf.alloc_reader();
        let mut out = vec![0u8; 300];
        assert_eq!(fast.copy_out(&mut out), 300);
        // lagging reader still sees everything from the start
        let mut out2 = vec![0u8; 300];
        assert_eq!(lagging.copy_out(&mut out2), 300);
        assert_eq!(out2, vec![b'y'; 300]);
    }

    #[test]
    fn alloc_reader_from_start_sees_bytes_written_before_it_existed() {
        let buf = IoBuffer::new(BufferSizeClass::new(0).unwrap());
        buf.write(b"already here");
        let mut r = buf.alloc_reader_from_start();
        let mut out = vec![0u8; 12];
        assert_eq!(r.copy_out(&mut out), 12);
        assert_eq!(&out, b"already here");
    }

    #[test]
    fn copy_from_splices_without_advancing_the_source_reader() {
        let src = IoBuffer::new(BufferSizeClass::new(0).unwrap());
        let dst = IoBuffer::new(BufferSizeClass::new(0).unwrap());
        src.write(b"0123456789");
        let reader = src.alloc_reader_from_start();

        let copied = dst.copy_from(&reader, 5, 2);
        assert_eq!(copied, 5);
        let mut out = vec![0u8; 5];
        assert_eq!(dst.alloc_reader_from_start().copy_out(&mut out), 5);
        assert_eq!(&out, b"23456");

        // the source reader never moved.
        assert_eq!(reader.avail_total(), 10);
    }
}
