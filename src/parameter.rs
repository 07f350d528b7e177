//! Bounded storage for RDM parameters.
//!
//! Parameter data lives in a per-port bump-allocated slab whose size is
//! fixed at install; nothing is ever freed before the port is deleted.
//! Definitions sit in an insertion-ordered table keyed by PID. An alias
//! parameter shares another parameter's storage at a fixed offset, which
//! is how derived PIDs such as DMX_START_ADDRESS expose single fields of
//! DEVICE_INFO without duplicating state. A deterministic parameter owns
//! no storage at all; its handler computes every reply.

use crate::command_class::{CommandClassSet, RequestCommandClass};
use crate::consts::{PD_HEAP_CAPACITY, RESPONDER_PIDS_MAX, RESPONDER_QUEUE_MAX};
use crate::layouts::rdm_parameter_description_layout;
use binary_layout::Field;
use crate::pids;
use crate::types::DataPack;

/// RDM data type codes from ANSI E1.20 Table A-15.
pub mod ds {
    pub const NOT_DEFINED: u8 = 0x00;
    pub const BIT_FIELD: u8 = 0x01;
    pub const ASCII: u8 = 0x03;
    pub const UNSIGNED_BYTE: u8 = 0x06;
    pub const UNSIGNED_WORD: u8 = 0x08;
    pub const UNSIGNED_DWORD: u8 = 0x0A;
}

/// RDM unit and prefix codes; only the identity values are used here.
pub const UNITS_NONE: u8 = 0x00;
pub const PREFIX_NONE: u8 = 0x00;

/// The serializable shape of one parameter.
#[derive(Copy, Clone, Debug)]
pub struct ParameterSchema {
    pub command_class: CommandClassSet,
    pub data_type: u8,
    /// Declared maximum parameter data length on the wire.
    pub pdl_size: u8,
    pub min_value: u32,
    pub max_value: u32,
    pub default_value: u32,
    /// Field layout, see [`crate::format`].
    pub format: &'static str,
}

/// How requests for a PID are answered.
#[derive(Copy, Clone)]
pub enum ParameterHandler {
    /// GET serializes the stored slab through the schema format; SET
    /// deserializes into it, range-checks single numeric fields, and
    /// queues the PID.
    Simple,
    /// The reply is computed by driver code instead of read from storage.
    Builtin,
    /// A user-supplied handler, see [`crate::responder::CustomHandler`].
    Custom(crate::responder::CustomHandler),
}

/// Notification hook invoked after a request mutated a parameter.
pub type ParameterCallback = fn(port_num: u8, pid: u16, command_class: RequestCommandClass);

#[derive(Copy, Clone)]
pub struct ParameterDefinition {
    pub pid: u16,
    pub schema: ParameterSchema,
    pub unit: u8,
    pub prefix: u8,
    /// At most 32 ASCII bytes, reported through PARAMETER_DESCRIPTION.
    pub description: &'static str,
    /// Slab bytes reserved for the parameter; at least `schema.pdl_size`.
    pub alloc_size: usize,
    /// True when the value is written through to non-volatile storage.
    pub non_volatile: bool,
    pub handler: ParameterHandler,
}

#[derive(Copy, Clone)]
enum ParameterData {
    /// The handler computes replies; nothing is stored.
    Deterministic,
    /// Owned storage or a window into another parameter's storage.
    Slab { offset: usize, len: usize },
}

struct ParameterSlot {
    definition: ParameterDefinition,
    data: ParameterData,
    callback: Option<ParameterCallback>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParameterError {
    /// The PID is already registered.
    AlreadyExists,
    /// The PID table is full.
    TableFull,
    /// The parameter heap cannot fit the allocation.
    HeapExhausted,
    /// No parameter with the PID is registered.
    UnknownPid,
    /// The parameter is deterministic and owns no storage.
    NoStorage,
    /// The alias offset does not fit inside the base parameter.
    BadAlias,
}

impl core::fmt::Display for ParameterError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ParameterError::AlreadyExists => write!(f, "parameter already exists"),
            ParameterError::TableFull => write!(f, "parameter table is full"),
            ParameterError::HeapExhausted => write!(f, "parameter heap exhausted"),
            ParameterError::UnknownPid => write!(f, "parameter does not exist"),
            ParameterError::NoStorage => write!(f, "parameter has no storage"),
            ParameterError::BadAlias => write!(f, "alias outside base parameter"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ParameterError {}

/// Read-back of a definition, the payload of PARAMETER_DESCRIPTION.
pub struct PidDescription {
    pub pid: u16,
    pub pdl_size: u8,
    pub data_type: u8,
    pub command_class: CommandClassSet,
    pub unit: u8,
    pub prefix: u8,
    pub min_value: u32,
    pub max_value: u32,
    pub default_value: u32,
    pub description: &'static str,
}

impl PidDescription {
    pub fn serialize(&self) -> DataPack {
        let description = self.description.as_bytes();
        let description_len = description.len().min(32);
        let total = rdm_parameter_description_layout::description::OFFSET + description_len;

        let mut buffer = [0u8; 52];
        let mut view = rdm_parameter_description_layout::View::new(&mut buffer[..total]);
        view.parameter_id_mut().write(self.pid);
        view.pdl_size_mut().write(self.pdl_size);
        view.data_type_mut().write(self.data_type);
        view.command_class_mut().write(self.command_class as u8);
        view.parameter_type_mut().write(0);
        view.unit_mut().write(self.unit);
        view.prefix_mut().write(self.prefix);
        view.min_value_mut().write(self.min_value);
        view.max_value_mut().write(self.max_value);
        view.default_value_mut().write(self.default_value);
        view.description_mut()[..description_len].copy_from_slice(&description[..description_len]);

        DataPack::from_slice(&buffer[..total]).unwrap()
    }
}

/// The per-port parameter store.
pub struct ParameterTable {
    heap: heapless::Vec<u8, PD_HEAP_CAPACITY>,
    /// Configured heap size; the slab never grows past it.
    limit: usize,
    slots: heapless::Vec<ParameterSlot, RESPONDER_PIDS_MAX>,
    /// FIFO of PIDs with unreported value changes.
    queue: heapless::Vec<u16, RESPONDER_QUEUE_MAX>,
}

impl ParameterTable {
    pub fn new(heap_size: usize) -> Self {
        Self {
            heap: heapless::Vec::new(),
            limit: heap_size.min(PD_HEAP_CAPACITY),
            slots: heapless::Vec::new(),
            queue: heapless::Vec::new(),
        }
    }

    fn index_of(&self, pid: u16) -> Option<usize> {
        self.slots.iter().position(|slot| slot.definition.pid == pid)
    }

    fn insert(
        &mut self,
        definition: ParameterDefinition,
        data: ParameterData,
    ) -> Result<(), ParameterError> {
        if self.index_of(definition.pid).is_some() {
            return Err(ParameterError::AlreadyExists);
        }

        self.slots
            .push(ParameterSlot {
                definition,
                data,
                callback: None,
            })
            .map_err(|_| ParameterError::TableFull)
    }

    /// Registers a parameter with freshly allocated storage, copying
    /// `init_value` (or zero-filling) into the slab.
    pub fn add_new(
        &mut self,
        definition: ParameterDefinition,
        init_value: Option<&[u8]>,
    ) -> Result<(), ParameterError> {
        if self.index_of(definition.pid).is_some() {
            return Err(ParameterError::AlreadyExists);
        }
        if self.slots.is_full() {
            return Err(ParameterError::TableFull);
        }

        let offset = self.heap.len();
        let len = definition.alloc_size;
        if offset + len > self.limit {
            return Err(ParameterError::HeapExhausted);
        }
        self.heap
            .resize(offset + len, 0)
            .map_err(|_| ParameterError::HeapExhausted)?;

        if let Some(init_value) = init_value {
            let copy_len = init_value.len().min(len);
            self.heap[offset..offset + copy_len].copy_from_slice(&init_value[..copy_len]);
        }

        self.insert(definition, ParameterData::Slab { offset, len })
    }

    /// Registers a parameter whose data is a window into `base_pid`'s
    /// storage at `offset`.
    pub fn add_alias(
        &mut self,
        definition: ParameterDefinition,
        base_pid: u16,
        offset: usize,
    ) -> Result<(), ParameterError> {
        let base = self
            .index_of(base_pid)
            .ok_or(ParameterError::UnknownPid)?;

        let ParameterData::Slab {
            offset: base_offset,
            len: base_len,
        } = self.slots[base].data
        else {
            return Err(ParameterError::NoStorage);
        };

        let len = definition.alloc_size;
        if offset + len > base_len {
            return Err(ParameterError::BadAlias);
        }

        self.insert(
            definition,
            ParameterData::Slab {
                offset: base_offset + offset,
                len,
            },
        )
    }

    /// Registers a parameter with no storage; its handler computes every
    /// reply.
    pub fn add_deterministic(
        &mut self,
        definition: ParameterDefinition,
    ) -> Result<(), ParameterError> {
        self.insert(definition, ParameterData::Deterministic)
    }

    pub fn exists(&self, pid: u16) -> bool {
        self.index_of(pid).is_some()
    }

    pub fn definition(&self, pid: u16) -> Option<&ParameterDefinition> {
        self.index_of(pid).map(|index| &self.slots[index].definition)
    }

    pub fn get(&self, pid: u16) -> Option<&[u8]> {
        let index = self.index_of(pid)?;
        match self.slots[index].data {
            ParameterData::Deterministic => None,
            ParameterData::Slab { offset, len } => Some(&self.heap[offset..offset + len]),
        }
    }

    pub fn get_mut(&mut self, pid: u16) -> Option<&mut [u8]> {
        let index = self.index_of(pid)?;
        match self.slots[index].data {
            ParameterData::Deterministic => None,
            ParameterData::Slab { offset, len } => Some(&mut self.heap[offset..offset + len]),
        }
    }

    /// Copies `data` into the parameter's storage, returning the bytes
    /// written. Writes past the allocation are truncated.
    pub fn set(&mut self, pid: u16, data: &[u8]) -> usize {
        let Some(slab) = self.get_mut(pid) else {
            return 0;
        };

        let len = data.len().min(slab.len());
        slab[..len].copy_from_slice(&data[..len]);
        len
    }

    /// [`set`](Self::set), plus an idempotent enqueue into the
    /// queued-message ring.
    pub fn set_and_queue(&mut self, pid: u16, data: &[u8]) -> usize {
        let written = self.set(pid, data);
        if written > 0 {
            self.queue_push(pid);
        }
        written
    }

    /// Enqueues a PID unless it is already waiting to be reported.
    pub fn queue_push(&mut self, pid: u16) {
        if !self.queue.contains(&pid) {
            // A full ring drops the oldest unreported change.
            if self.queue.is_full() {
                self.queue.remove(0);
            }
            self.queue.push(pid).ok();
        }
    }

    /// Dequeues the oldest changed PID.
    pub fn queue_pop(&mut self) -> Option<u16> {
        if self.queue.is_empty() {
            None
        } else {
            Some(self.queue.remove(0))
        }
    }

    /// Queue depth as reported in the `message_count` field.
    pub fn message_count(&self) -> u8 {
        self.queue.len().min(255) as u8
    }

    /// Copies up to `out.len()` PIDs in insertion order; the return value
    /// is the total registered count, which may exceed the copied amount.
    pub fn list(&self, out: &mut [u16]) -> usize {
        for (index, slot) in self.slots.iter().enumerate() {
            if index < out.len() {
                out[index] = slot.definition.pid;
            }
        }
        self.slots.len()
    }

    pub fn schema(&self, pid: u16) -> Option<&ParameterSchema> {
        self.definition(pid).map(|definition| &definition.schema)
    }

    /// Definition read-back. Only manufacturer-specific PIDs expose their
    /// descriptions.
    pub fn description(&self, pid: u16) -> Option<PidDescription> {
        if !pids::is_manufacturer_specific(pid) {
            return None;
        }

        let definition = self.definition(pid)?;
        Some(PidDescription {
            pid,
            pdl_size: definition.schema.pdl_size,
            data_type: definition.schema.data_type,
            command_class: definition.schema.command_class,
            unit: definition.unit,
            prefix: definition.prefix,
            min_value: definition.schema.min_value,
            max_value: definition.schema.max_value,
            default_value: definition.schema.default_value,
            description: definition.description,
        })
    }

    pub fn set_callback(&mut self, pid: u16, callback: ParameterCallback) -> bool {
        match self.index_of(pid) {
            Some(index) => {
                self.slots[index].callback = Some(callback);
                true
            },
            None => false,
        }
    }

    pub(crate) fn callback(&self, pid: u16) -> Option<ParameterCallback> {
        self.index_of(pid).and_then(|index| self.slots[index].callback)
    }

    /// Slab bytes in use.
    pub fn heap_used(&self) -> usize {
        self.heap.len()
    }

    pub fn heap_size(&self) -> usize {
        self.limit
    }
}
