//! Typed Data Sources
//!
//! Programs fetch their operands from opaque, typed memory regions
//! called data handlers. A handler advertises the set of operand types
//! it can provide, a per-type address space, and a lazily computed
//! 64-bit content hash used by the archive to key data snapshots.
//!
//! The engine works with a closed set of handler kinds:
//!
//! ```text
//! DataHandler
//!   |-- DoubleArray(PrimitiveArray<f64>)   (registers, sensor vectors)
//!   |-- IntArray(PrimitiveArray<i32>)      (discrete observations)
//!   `-- Constants(ConstantHandler)         (per-program constant slots)
//! ```
//!
//! # Example
//!
//! ```
//! use tangle::data::{DataHandler, OperandType, PrimitiveArray, Value};
//!
//! let mut source = DataHandler::from(PrimitiveArray::<f64>::new(8));
//! source.set_data_at(OperandType::Double, 3, Value::Double(1.5)).unwrap();
//!
//! assert_eq!(source.address_space(OperandType::Double), 8);
//! // A window of 3 doubles can start at any of the first 6 positions.
//! assert_eq!(source.address_space(OperandType::DoubleWindow(3)), 6);
//! assert_eq!(source.get_data_at(OperandType::Double, 3).unwrap(), Value::Double(1.5));
//! ```

pub mod constants;
pub mod primitive_array;

pub use constants::ConstantHandler;
pub use primitive_array::{Primitive, PrimitiveArray};

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{TangleError, TangleResult};

/// Process-wide monotonic counter for handler ids.
///
/// Ids must stay unique within the process: the archive keys its data
/// snapshots by a hash seeded with the originating handler's id, and a
/// snapshot must hash identically to its source.
static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(0);

pub(crate) fn next_handler_id() -> u64 {
    NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed)
}

/// Runtime type token for the data an instruction operand consumes.
///
/// Window variants denote a contiguous view of `k` elements starting at
/// the fetched address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandType {
    /// A single `f64`
    Double,
    /// A single `i32`
    Int,
    /// A view over `k` consecutive `f64` elements
    DoubleWindow(usize),
    /// A view over `k` consecutive `i32` elements
    IntWindow(usize),
}

impl OperandType {
    /// Short name used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            OperandType::Double => "double",
            OperandType::Int => "int",
            OperandType::DoubleWindow(_) => "double-window",
            OperandType::IntWindow(_) => "int-window",
        }
    }
}

impl fmt::Display for OperandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperandType::DoubleWindow(k) => write!(f, "double-window[{k}]"),
            OperandType::IntWindow(k) => write!(f, "int-window[{k}]"),
            other => write!(f, "{}", other.name()),
        }
    }
}

/// A value fetched from a data handler.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Double(f64),
    Int(i32),
    DoubleWindow(Vec<f64>),
    IntWindow(Vec<i32>),
}

impl Value {
    /// The scalar `f64` inside, if this is a [`Value::Double`].
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// The scalar `i32` inside, if this is a [`Value::Int`].
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// The window contents, if this is a [`Value::DoubleWindow`].
    pub fn as_double_window(&self) -> Option<&[f64]> {
        match self {
            Value::DoubleWindow(v) => Some(v),
            _ => None,
        }
    }

    /// The window contents, if this is a [`Value::IntWindow`].
    pub fn as_int_window(&self) -> Option<&[i32]> {
        match self {
            Value::IntWindow(v) => Some(v),
            _ => None,
        }
    }
}

/// A typed data source with identity, address spaces and content hash.
///
/// Size and handled types are fixed for the handler's lifetime; only
/// the stored values change. Cloning deep-copies the content while
/// preserving the `id`, so archived snapshots hash like their source.
#[derive(Debug, Clone)]
pub enum DataHandler {
    DoubleArray(PrimitiveArray<f64>),
    IntArray(PrimitiveArray<i32>),
    Constants(ConstantHandler),
}

impl From<PrimitiveArray<f64>> for DataHandler {
    fn from(array: PrimitiveArray<f64>) -> Self {
        DataHandler::DoubleArray(array)
    }
}

impl From<PrimitiveArray<i32>> for DataHandler {
    fn from(array: PrimitiveArray<i32>) -> Self {
        DataHandler::IntArray(array)
    }
}

impl From<ConstantHandler> for DataHandler {
    fn from(constants: ConstantHandler) -> Self {
        DataHandler::Constants(constants)
    }
}

impl DataHandler {
    /// Process-unique id assigned at creation and preserved by clones.
    pub fn id(&self) -> u64 {
        match self {
            DataHandler::DoubleArray(a) => a.id(),
            DataHandler::IntArray(a) => a.id(),
            DataHandler::Constants(c) => c.id(),
        }
    }

    /// Whether this handler can provide values of type `ty`.
    pub fn can_handle(&self, ty: OperandType) -> bool {
        self.address_space(ty) != 0
    }

    /// Number of addressable positions for `ty`; `0` means unhandled.
    pub fn address_space(&self, ty: OperandType) -> usize {
        match self {
            DataHandler::DoubleArray(a) => a.address_space(ty),
            DataHandler::IntArray(a) => a.address_space(ty),
            DataHandler::Constants(c) => c.address_space(ty),
        }
    }

    /// Largest address space over all handled types.
    pub fn largest_address_space(&self) -> usize {
        match self {
            DataHandler::DoubleArray(a) => a.len(),
            DataHandler::IntArray(a) => a.len(),
            DataHandler::Constants(c) => c.len(),
        }
    }

    /// Checked fetch of one value.
    pub fn get_data_at(&self, ty: OperandType, address: usize) -> TangleResult<Value> {
        match self {
            DataHandler::DoubleArray(a) => a.get_data_at(ty, address),
            DataHandler::IntArray(a) => a.get_data_at(ty, address),
            DataHandler::Constants(c) => c.get_data_at(ty, address),
        }
    }

    /// Checked write of one value. Invalidates the cached hash.
    pub fn set_data_at(&mut self, ty: OperandType, address: usize, value: Value) -> TangleResult<()> {
        match self {
            DataHandler::DoubleArray(a) => {
                let v = value.as_double().ok_or(TangleError::InvalidType {
                    requested: ty.name(),
                    handler: "double-array",
                })?;
                a.set_data_at(ty, address, v)
            }
            DataHandler::IntArray(a) => {
                let v = value.as_int().ok_or(TangleError::InvalidType {
                    requested: ty.name(),
                    handler: "int-array",
                })?;
                a.set_data_at(ty, address, v)
            }
            DataHandler::Constants(c) => {
                let v = value.as_int().ok_or(TangleError::InvalidType {
                    requested: ty.name(),
                    handler: "constants",
                })?;
                c.set_data_at(ty, address, v)
            }
        }
    }

    /// Unchecked fetch with modulo scaling of the raw location.
    ///
    /// Used by the execution engines, which never fail on operand
    /// bounds: the raw location is reduced modulo the address space of
    /// `ty`. The caller guarantees that `ty` is handled.
    pub fn get_data_scaled(&self, ty: OperandType, raw_location: usize) -> Value {
        match self {
            DataHandler::DoubleArray(a) => a.get_data_scaled(ty, raw_location),
            DataHandler::IntArray(a) => a.get_data_scaled(ty, raw_location),
            DataHandler::Constants(c) => c.get_data_scaled(ty, raw_location),
        }
    }

    /// Addresses read by a fetch of type `ty` at `address`.
    ///
    /// A scalar fetch reads `[address]`; a window of `k` reads
    /// `[address, address + k)`. Empty when `ty` is unhandled or the
    /// address is out of range.
    pub fn addresses_accessed(&self, ty: OperandType, address: usize) -> Vec<usize> {
        let space = self.address_space(ty);
        if address >= space {
            return Vec::new();
        }
        let width = match ty {
            OperandType::Double | OperandType::Int => 1,
            OperandType::DoubleWindow(k) | OperandType::IntWindow(k) => k,
        };
        (address..address + width).collect()
    }

    /// Content hash, recomputed when invalidated.
    ///
    /// Deterministic for an identical `(id, content)` pair.
    pub fn hash(&self) -> u64 {
        match self {
            DataHandler::DoubleArray(a) => a.hash(),
            DataHandler::IntArray(a) => a.hash(),
            DataHandler::Constants(c) => c.hash(),
        }
    }
}

/// Insertion-rotated XOR fold shared by every handler kind.
///
/// The accumulator starts from the hash of the handler id and rotates
/// right by one bit before folding each element, so permutations of the
/// same elements hash differently.
pub(crate) fn content_hash<T: Primitive>(id: u64, elements: &[T]) -> u64 {
    let mut acc = {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        hasher.finish()
    };
    for element in elements {
        acc = acc.rotate_right(1);
        let mut hasher = DefaultHasher::new();
        element.hash_element(&mut hasher);
        acc ^= hasher.finish();
    }
    acc
}
