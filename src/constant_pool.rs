use linear_map::LinearMap;

use crate::chunk::ChunkHeader;
use crate::cursor::Cursor;
use crate::error::Error;
use crate::metadata::{JfrClass, JfrField};
use crate::JfrReader;

/// A class constant: the symbol id of its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassRef {
    pub name: u64,
}

/// A method constant: symbol ids for its name and signature, and the class
/// constant it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodRef {
    pub class: u64,
    pub name: u64,
    pub signature: u64,
}

/// A stack trace constant, deepest frame first per JFR convention.
///
/// `methods` and `frame_types` are parallel: entry `i` of both describes
/// frame `i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackTrace {
    pub methods: Vec<u64>,
    pub frame_types: Vec<u8>,
}

/// How to decode one pool section. The well-known JFR types get hand-written
/// readers which tabulate their values; anything else falls through to the
/// schema-driven generic reader, which consumes the section without building
/// values.
enum PoolKind<'a> {
    ChunkHeader,
    Threads { has_group: bool },
    Classes { has_hidden: bool },
    Symbols,
    Methods,
    StackTraces,
    FrameTypes,
    ThreadStates,
    Other(&'a [JfrField]),
}

impl<'a> PoolKind<'a> {
    fn of(class: &'a JfrClass) -> Self {
        match class.name.as_str() {
            "jdk.types.ChunkHeader" => PoolKind::ChunkHeader,
            "java.lang.Thread" => PoolKind::Threads {
                has_group: class.field("group").is_some(),
            },
            "java.lang.Class" => PoolKind::Classes {
                has_hidden: class.field("hidden").is_some(),
            },
            "jdk.types.Symbol" => PoolKind::Symbols,
            "jdk.types.Method" => PoolKind::Methods,
            "jdk.types.StackTrace" => PoolKind::StackTraces,
            "jdk.types.FrameType" => PoolKind::FrameTypes,
            "jdk.types.ThreadState" => PoolKind::ThreadStates,
            _ => PoolKind::Other(&class.fields),
        }
    }
}

impl JfrReader {
    /// Walks the linked list of constant pool blocks the cursor is positioned
    /// at. Each block carries a `delta` to the next block's start; zero marks
    /// the last block.
    pub(crate) fn read_constant_pool(&mut self) -> Result<(), Error> {
        loop {
            let block_start = self.cursor.position();
            self.cursor.read_varint()?; // record size
            self.cursor.read_varint()?; // record type
            self.cursor.read_varlong()?; // start time
            self.cursor.read_varlong()?; // duration
            let delta = self.cursor.read_varlong()? as i64;
            self.cursor.read_varint()?; // flush marker

            let pool_count = self.cursor.read_varint()?;
            for _ in 0..pool_count {
                let type_id = self.cursor.read_varint()?;
                let class = self
                    .types
                    .get(u64::from(type_id))
                    .cloned()
                    .ok_or(Error::InvalidFormat("constant pool references unknown type"))?;
                self.read_pool_section(&class)?;
            }

            if delta == 0 {
                return Ok(());
            }
            let next = (block_start as i64)
                .checked_add(delta)
                .filter(|&p| p >= 0)
                .ok_or(Error::InvalidFormat("constant pool delta out of range"))?;
            self.cursor.set_position(next as usize)?;
        }
    }

    fn read_pool_section(&mut self, class: &JfrClass) -> Result<(), Error> {
        match PoolKind::of(class) {
            // An embedded copy of the chunk header plus its record preamble.
            PoolKind::ChunkHeader => self.cursor.skip(ChunkHeader::SIZE + 3),
            PoolKind::Threads { has_group } => self.read_threads(has_group),
            PoolKind::Classes { has_hidden } => self.read_classes(has_hidden),
            PoolKind::Symbols => self.read_symbols(),
            PoolKind::Methods => self.read_methods(),
            PoolKind::StackTraces => self.read_stack_traces(),
            PoolKind::FrameTypes => read_label_map(&mut self.cursor, &mut self.frame_types),
            PoolKind::ThreadStates => read_label_map(&mut self.cursor, &mut self.thread_states),
            PoolKind::Other(fields) => self.read_other_constants(fields),
        }
    }

    fn read_threads(&mut self, has_group: bool) -> Result<(), Error> {
        let count = self.threads.preallocate(self.cursor.read_varint()?);
        for _ in 0..count {
            let id = self.cursor.read_varlong()?;
            let os_name = self.cursor.read_string()?;
            self.cursor.read_varint()?; // os thread id
            let java_name = self.cursor.read_string()?;
            self.cursor.read_varlong()?; // java thread id
            if has_group {
                self.cursor.read_varlong()?;
            }
            if let Some(name) = java_name.or(os_name) {
                self.threads.put(id, name);
            }
        }
        Ok(())
    }

    fn read_classes(&mut self, has_hidden: bool) -> Result<(), Error> {
        let count = self.classes.preallocate(self.cursor.read_varint()?);
        for _ in 0..count {
            let id = self.cursor.read_varlong()?;
            self.cursor.read_varlong()?; // class loader
            let name = self.cursor.read_varlong()?;
            self.cursor.read_varlong()?; // package
            self.cursor.read_varint()?; // modifiers
            if has_hidden {
                self.cursor.read_varint()?;
            }
            self.classes.put(id, ClassRef { name });
        }
        Ok(())
    }

    fn read_symbols(&mut self) -> Result<(), Error> {
        let count = self.symbols.preallocate(self.cursor.read_varint()?);
        for _ in 0..count {
            let id = self.cursor.read_varlong()?;
            // Symbols are always written with the UTF-8 byte array encoding.
            if self.cursor.read_u8()? != 3 {
                return Err(Error::InvalidFormat("Invalid symbol encoding"));
            }
            let bytes = self.cursor.read_bytes()?;
            self.symbols.put(id, bytes);
        }
        Ok(())
    }

    fn read_methods(&mut self) -> Result<(), Error> {
        let count = self.methods.preallocate(self.cursor.read_varint()?);
        for _ in 0..count {
            let id = self.cursor.read_varlong()?;
            let class = self.cursor.read_varlong()?;
            let name = self.cursor.read_varlong()?;
            let signature = self.cursor.read_varlong()?;
            self.cursor.read_varint()?; // modifiers
            self.cursor.read_varint()?; // hidden
            self.methods.put(
                id,
                MethodRef {
                    class,
                    name,
                    signature,
                },
            );
        }
        Ok(())
    }

    fn read_stack_traces(&mut self) -> Result<(), Error> {
        let count = self.stack_traces.preallocate(self.cursor.read_varint()?);
        for _ in 0..count {
            let id = self.cursor.read_varlong()?;
            self.cursor.read_varint()?; // truncated
            let depth = self.cursor.read_varint()? as usize;
            let mut methods = Vec::with_capacity(depth);
            let mut frame_types = Vec::with_capacity(depth);
            for _ in 0..depth {
                methods.push(self.cursor.read_varlong()?);
                self.cursor.read_varint()?; // line number
                self.cursor.read_varint()?; // bytecode index
                frame_types.push(self.cursor.read_u8()?);
            }
            self.stack_traces.put(
                id,
                StackTrace {
                    methods,
                    frame_types,
                },
            );
        }
        Ok(())
    }

    /// Decodes a pool for a type without a dedicated reader, driven by the
    /// declared field schema: every field is one varlong, except inline
    /// `java.lang.String` fields which use the string encoding.
    fn read_other_constants(&mut self, fields: &[JfrField]) -> Result<(), Error> {
        let string_type = self.type_id("java.lang.String");
        let numeric: Vec<bool> = fields
            .iter()
            .map(|f| f.constant_pool || Some(f.type_id) != string_type)
            .collect();

        let count = self.cursor.read_varint()?;
        for _ in 0..count {
            self.cursor.read_varlong()?; // constant id
            for &is_numeric in &numeric {
                if is_numeric {
                    self.cursor.read_varlong()?;
                } else {
                    self.cursor.read_string()?;
                }
            }
        }
        Ok(())
    }
}

fn read_label_map(cursor: &mut Cursor, map: &mut LinearMap<u32, String>) -> Result<(), Error> {
    let count = cursor.read_varint()?;
    for _ in 0..count {
        let key = cursor.read_varint()?;
        if let Some(label) = cursor.read_string()? {
            map.insert(key, label);
        }
    }
    Ok(())
}
