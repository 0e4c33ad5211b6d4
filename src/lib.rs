//! A reader for JFR (Java Flight Recorder) files as produced by
//! async-profiler.
//!
//! [`JfrReader::open`] maps the file and indexes every chunk up front:
//! per-chunk metadata builds the type registry, and the constant pools
//! populate the lookup dictionaries (threads, classes, methods, symbols,
//! stack traces). Events are then pulled one at a time:
//!
//! ```no_run
//! use jfr_data::{ExecutionSample, JfrReader};
//!
//! # fn main() -> Result<(), jfr_data::Error> {
//! let mut reader = JfrReader::open("profile.jfr")?;
//! for sample in reader.all_events_of::<ExecutionSample>()? {
//!     let stack_trace = reader.stack_traces.get(sample.stack_trace_id.into());
//!     println!("{} {:?}", sample.time, stack_trace);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! One reader owns one cursor, so all reads take `&mut self`; separate
//! readers on the same file are independent. The file mapping is released
//! when the reader is dropped.

mod chunk;
mod constant_pool;
mod cursor;
mod dictionary;
mod error;
mod event;
mod metadata;

pub use chunk::ChunkHeader;
pub use constant_pool::{ClassRef, MethodRef, StackTrace};
pub use dictionary::Dictionary;
pub use error::Error;
pub use event::{
    AllocationSample, ContendedLock, Event, EventKind, ExecutionSample, TypedEvent,
};
pub use metadata::{JfrClass, JfrField};

/// This is a re-export of the linear-map crate. We use its map type for the
/// frame type and thread state label tables in our public API.
pub use linear_map;

use linear_map::LinearMap;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::rc::Rc;

use chunk::ChunkBounds;
use cursor::{Cursor, Image};

pub struct JfrReader {
    cursor: Cursor,
    chunks: Vec<ChunkBounds>,
    current_chunk: usize,

    /// Start of the first chunk, in nanoseconds since the epoch.
    pub start_nanos: u64,
    /// Recording duration across all chunks, in nanoseconds.
    pub duration_nanos: u64,
    /// Start of the first chunk, in writer ticks.
    pub start_ticks: u64,
    /// Tick frequency of all event timestamps.
    pub ticks_per_sec: u64,

    /// Top-level types (no `superType` attribute), keyed by type id. These
    /// are the types which dispatch constant pool sections.
    pub types: Dictionary<Rc<JfrClass>>,
    /// Every declared type by fully qualified name, last chunk wins.
    pub types_by_name: HashMap<String, Rc<JfrClass>>,

    /// Thread id to display name: the Java thread name when present,
    /// otherwise the OS thread name.
    pub threads: Dictionary<String>,
    pub classes: Dictionary<ClassRef>,
    /// Raw UTF-8 symbol bytes (class names, method names, signatures).
    pub symbols: Dictionary<Vec<u8>>,
    pub methods: Dictionary<MethodRef>,
    pub stack_traces: Dictionary<StackTrace>,
    pub frame_types: LinearMap<u32, String>,
    pub thread_states: LinearMap<u32, String>,

    // Numeric ids of the recognized event types, resolved once after all
    // chunks are indexed. A type missing from the recording stays `None`
    // and never matches.
    execution_sample: Option<u32>,
    native_method_sample: Option<u32>,
    allocation_in_new_tlab: Option<u32>,
    allocation_outside_tlab: Option<u32>,
    monitor_enter: Option<u32>,
    thread_park: Option<u32>,
}

impl JfrReader {
    /// Opens a recording file read-only, maps it into memory, and indexes
    /// all chunks.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let file = File::open(path)?;
        // Read-only mapping; the file must not be truncated while the
        // reader is alive.
        let mmap = unsafe { memmap2::Mmap::map(&file)? };
        Self::from_image(Image::Mmap(mmap))
    }

    /// Reads a recording from a fully buffered byte image.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, Error> {
        Self::from_image(Image::Owned(data))
    }

    fn from_image(image: Image) -> Result<Self, Error> {
        let mut reader = JfrReader {
            cursor: Cursor::new(image),
            chunks: Vec::new(),
            current_chunk: 0,
            start_nanos: 0,
            duration_nanos: 0,
            start_ticks: 0,
            ticks_per_sec: 0,
            types: Dictionary::new(),
            types_by_name: HashMap::new(),
            threads: Dictionary::new(),
            classes: Dictionary::new(),
            symbols: Dictionary::new(),
            methods: Dictionary::new(),
            stack_traces: Dictionary::new(),
            frame_types: LinearMap::new(),
            thread_states: LinearMap::new(),
            execution_sample: None,
            native_method_sample: None,
            allocation_in_new_tlab: None,
            allocation_outside_tlab: None,
            monitor_enter: None,
            thread_park: None,
        };

        let mut end_nanos = 0u64;
        let mut chunk_start = 0usize;
        while chunk_start < reader.cursor.image_len() {
            let header = ChunkHeader::parse(reader.cursor.data(), chunk_start)?;
            end_nanos = end_nanos.max(header.start_nanos.saturating_add(header.duration_nanos));

            let len = header.chunk_size as usize;
            let chunk_end = chunk_start.checked_add(len).ok_or(Error::UnexpectedEof)?;
            if len < ChunkHeader::SIZE || chunk_end > reader.cursor.image_len() {
                return Err(Error::InvalidFormat("chunk length out of range"));
            }

            reader
                .cursor
                .set_position(chunk_start + header.metadata_offset as usize)?;
            reader.read_metadata()?;

            reader
                .cursor
                .set_position(chunk_start + header.constant_pool_offset as usize)?;
            reader.read_constant_pool()?;

            reader.chunks.push(ChunkBounds {
                start: chunk_start,
                len,
            });
            chunk_start = chunk_end;
        }

        reader.start_nanos = reader.cursor.get_u64_be(32)?;
        reader.duration_nanos = end_nanos.saturating_sub(reader.start_nanos);
        reader.start_ticks = reader.cursor.get_u64_be(48)?;
        reader.ticks_per_sec = reader.cursor.get_u64_be(56)?;

        reader.execution_sample = reader.type_id("jdk.ExecutionSample");
        reader.native_method_sample = reader.type_id("jdk.NativeMethodSample");
        reader.allocation_in_new_tlab = reader.type_id("jdk.ObjectAllocationInNewTLAB");
        reader.allocation_outside_tlab = reader.type_id("jdk.ObjectAllocationOutsideTLAB");
        reader.monitor_enter = reader.type_id("jdk.JavaMonitorEnter");
        reader.thread_park = reader.type_id("jdk.ThreadPark");

        if let Some(first) = reader.chunks.first().copied() {
            reader.cursor.set_window(first.body_start(), first.end())?;
        }
        Ok(reader)
    }

    pub(crate) fn type_id(&self, name: &str) -> Option<u32> {
        self.types_by_name.get(name).map(|class| class.id)
    }

    /// Returns the next event of any recognized kind, or `None` when all
    /// chunks are exhausted.
    pub fn next_event(&mut self) -> Result<Option<Event>, Error> {
        self.next_event_impl(None)
    }

    /// Returns the next event of kind `E`, skipping events of other kinds.
    pub fn next_event_of<E: TypedEvent>(&mut self) -> Result<Option<E>, Error> {
        match self.next_event_impl(Some(E::KIND))? {
            Some(event) => Ok(E::from_event(event)),
            None => Ok(None),
        }
    }

    /// Drains the stream and returns all recognized events sorted by time.
    ///
    /// Events inside a chunk are only roughly time-ordered on the wire, so
    /// the result is sorted explicitly.
    pub fn all_events(&mut self) -> Result<Vec<Event>, Error> {
        let mut events = Vec::new();
        while let Some(event) = self.next_event()? {
            events.push(event);
        }
        events.sort_by_key(Event::time);
        Ok(events)
    }

    /// Drains the stream and returns all events of kind `E` sorted by time.
    pub fn all_events_of<E: TypedEvent>(&mut self) -> Result<Vec<E>, Error> {
        let mut events = Vec::new();
        while let Some(event) = self.next_event_of::<E>()? {
            events.push(event);
        }
        events.sort_by_key(E::time);
        Ok(events)
    }

    fn next_event_impl(&mut self, filter: Option<EventKind>) -> Result<Option<Event>, Error> {
        loop {
            while !self.cursor.has_remaining() {
                if !self.move_to_next_chunk()? {
                    return Ok(None);
                }
            }

            let start = self.cursor.position();
            let size = self.cursor.read_varint()? as usize;
            let type_id = Some(self.cursor.read_varint()?);

            if type_id == self.execution_sample || type_id == self.native_method_sample {
                if filter.map_or(true, |f| f == EventKind::ExecutionSample) {
                    let event = ExecutionSample::parse(&mut self.cursor)?;
                    return Ok(Some(Event::ExecutionSample(event)));
                }
            } else if type_id == self.allocation_in_new_tlab {
                if filter.map_or(true, |f| f == EventKind::AllocationSample) {
                    let event = AllocationSample::parse(&mut self.cursor, true)?;
                    return Ok(Some(Event::AllocationSample(event)));
                }
            } else if type_id == self.allocation_outside_tlab {
                if filter.map_or(true, |f| f == EventKind::AllocationSample) {
                    let event = AllocationSample::parse(&mut self.cursor, false)?;
                    return Ok(Some(Event::AllocationSample(event)));
                }
            } else if type_id == self.monitor_enter {
                if filter.map_or(true, |f| f == EventKind::ContendedLock) {
                    let event = ContendedLock::parse(&mut self.cursor, false)?;
                    return Ok(Some(Event::ContendedLock(event)));
                }
            } else if type_id == self.thread_park {
                if filter.map_or(true, |f| f == EventKind::ContendedLock) {
                    let event = ContendedLock::parse(&mut self.cursor, true)?;
                    return Ok(Some(Event::ContendedLock(event)));
                }
            }

            if size == 0 {
                return Err(Error::InvalidFormat("event record with zero size"));
            }
            self.cursor.set_position(start + size)?;
        }
    }

    /// Narrows the cursor window to the next chunk's event body. Returns
    /// false when no chunks remain.
    fn move_to_next_chunk(&mut self) -> Result<bool, Error> {
        if self.current_chunk + 1 >= self.chunks.len() {
            return Ok(false);
        }
        self.current_chunk += 1;
        let chunk = self.chunks[self.current_chunk];
        self.cursor.set_window(chunk.body_start(), chunk.end())?;
        Ok(true)
    }
}
