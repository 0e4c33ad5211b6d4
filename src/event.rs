use crate::cursor::Cursor;
use crate::error::Error;

/// A CPU or native-method execution sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionSample {
    /// Timestamp in writer ticks.
    pub time: u64,
    pub tid: u32,
    pub stack_trace_id: u32,
    /// Key into [`thread_states`](crate::JfrReader::thread_states).
    pub thread_state: u32,
}

impl ExecutionSample {
    pub(crate) fn parse(cursor: &mut Cursor) -> Result<Self, Error> {
        Ok(ExecutionSample {
            time: cursor.read_varlong()?,
            tid: cursor.read_varint()?,
            stack_trace_id: cursor.read_varint()?,
            thread_state: cursor.read_varint()?,
        })
    }
}

/// An object allocation sample, from either the in-TLAB or the outside-TLAB
/// event. `tlab_size` is zero for the outside-TLAB variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationSample {
    /// Timestamp in writer ticks.
    pub time: u64,
    pub tid: u32,
    pub stack_trace_id: u32,
    /// Key into [`classes`](crate::JfrReader::classes).
    pub class_id: u32,
    pub allocation_size: u64,
    pub tlab_size: u64,
}

impl AllocationSample {
    pub(crate) fn parse(cursor: &mut Cursor, in_tlab: bool) -> Result<Self, Error> {
        Ok(AllocationSample {
            time: cursor.read_varlong()?,
            tid: cursor.read_varint()?,
            stack_trace_id: cursor.read_varint()?,
            class_id: cursor.read_varint()?,
            allocation_size: cursor.read_varlong()?,
            tlab_size: if in_tlab { cursor.read_varlong()? } else { 0 },
        })
    }
}

/// A contended monitor-enter or thread-park sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContendedLock {
    /// Timestamp in writer ticks.
    pub time: u64,
    pub tid: u32,
    pub stack_trace_id: u32,
    /// Time spent blocked, in writer ticks.
    pub duration: u64,
    /// Key into [`classes`](crate::JfrReader::classes).
    pub class_id: u32,
}

impl ContendedLock {
    pub(crate) fn parse(cursor: &mut Cursor, has_timeout: bool) -> Result<Self, Error> {
        let time = cursor.read_varlong()?;
        let duration = cursor.read_varlong()?;
        let tid = cursor.read_varint()?;
        let stack_trace_id = cursor.read_varint()?;
        let class_id = cursor.read_varint()?;
        if has_timeout {
            cursor.read_varlong()?;
        }
        cursor.read_varlong()?; // lock address
        Ok(ContendedLock {
            time,
            tid,
            stack_trace_id,
            duration,
            class_id,
        })
    }
}

/// Any event this reader recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    ExecutionSample(ExecutionSample),
    AllocationSample(AllocationSample),
    ContendedLock(ContendedLock),
}

impl Event {
    /// Timestamp in writer ticks.
    pub fn time(&self) -> u64 {
        match self {
            Event::ExecutionSample(e) => e.time,
            Event::AllocationSample(e) => e.time,
            Event::ContendedLock(e) => e.time,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Event::ExecutionSample(_) => EventKind::ExecutionSample,
            Event::AllocationSample(_) => EventKind::AllocationSample,
            Event::ContendedLock(_) => EventKind::ContendedLock,
        }
    }
}

/// Discriminant of [`Event`], used to filter typed reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    ExecutionSample,
    AllocationSample,
    ContendedLock,
}

mod private {
    pub trait Sealed {}

    impl Sealed for super::ExecutionSample {}
    impl Sealed for super::AllocationSample {}
    impl Sealed for super::ContendedLock {}
}

/// One of the concrete event record types, usable with
/// [`JfrReader::next_event_of`](crate::JfrReader::next_event_of) and
/// [`JfrReader::all_events_of`](crate::JfrReader::all_events_of).
///
/// This trait is sealed; the three record types are the only implementors.
pub trait TypedEvent: private::Sealed + Sized {
    /// Timestamp in writer ticks.
    fn time(&self) -> u64;

    #[doc(hidden)]
    const KIND: EventKind;

    #[doc(hidden)]
    fn from_event(event: Event) -> Option<Self>;
}

impl TypedEvent for ExecutionSample {
    const KIND: EventKind = EventKind::ExecutionSample;

    fn time(&self) -> u64 {
        self.time
    }

    fn from_event(event: Event) -> Option<Self> {
        match event {
            Event::ExecutionSample(e) => Some(e),
            _ => None,
        }
    }
}

impl TypedEvent for AllocationSample {
    const KIND: EventKind = EventKind::AllocationSample;

    fn time(&self) -> u64 {
        self.time
    }

    fn from_event(event: Event) -> Option<Self> {
        match event {
            Event::AllocationSample(e) => Some(e),
            _ => None,
        }
    }
}

impl TypedEvent for ContendedLock {
    const KIND: EventKind = EventKind::ContendedLock;

    fn time(&self) -> u64 {
        self.time
    }

    fn from_event(event: Event) -> Option<Self> {
        match event {
            Event::ContendedLock(e) => Some(e),
            _ => None,
        }
    }
}
