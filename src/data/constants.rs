//! Per-program constant slots.
//!
//! Each program owns a constant handler sized to the environment's
//! `nb_constants`. Programs read the slots through operand fetches on
//! virtual data source index 1; only the constant mutation operator
//! writes them.

use parking_lot::Mutex;

use crate::data::{content_hash, next_handler_id, OperandType, Value};
use crate::error::{TangleError, TangleResult};

/// Immutable-size vector of `i32` constant slots.
///
/// Unlike [`PrimitiveArray`](crate::data::PrimitiveArray), constants
/// expose no windowed views: each slot is addressed individually.
#[derive(Debug)]
pub struct ConstantHandler {
    id: u64,
    data: Vec<i32>,
    cached_hash: Mutex<Option<u64>>,
}

impl ConstantHandler {
    /// Allocate `size` zeroed constant slots with a fresh id.
    pub fn new(size: usize) -> Self {
        ConstantHandler {
            id: next_handler_id(),
            data: vec![0; size],
            cached_hash: Mutex::new(None),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Address space for `ty`; constants only provide scalar ints.
    pub fn address_space(&self, ty: OperandType) -> usize {
        match ty {
            OperandType::Int => self.data.len(),
            _ => 0,
        }
    }

    /// Checked fetch.
    pub fn get_data_at(&self, ty: OperandType, address: usize) -> TangleResult<Value> {
        if ty != OperandType::Int {
            return Err(TangleError::InvalidType {
                requested: ty.name(),
                handler: "constants",
            });
        }
        if address >= self.data.len() {
            return Err(TangleError::OutOfRange {
                address,
                space: self.data.len(),
            });
        }
        Ok(Value::Int(self.data[address]))
    }

    /// Checked write; invalidates the cached hash.
    pub fn set_data_at(&mut self, ty: OperandType, address: usize, value: i32) -> TangleResult<()> {
        if ty != OperandType::Int {
            return Err(TangleError::InvalidType {
                requested: ty.name(),
                handler: "constants",
            });
        }
        if address >= self.data.len() {
            return Err(TangleError::OutOfRange {
                address,
                space: self.data.len(),
            });
        }
        self.data[address] = value;
        *self.cached_hash.lock() = None;
        Ok(())
    }

    /// Unchecked fetch with modulo scaling of the raw location.
    pub fn get_data_scaled(&self, ty: OperandType, raw_location: usize) -> Value {
        debug_assert_eq!(ty, OperandType::Int, "scaled fetch of unhandled type {ty}");
        debug_assert!(!self.data.is_empty());
        Value::Int(self.data[raw_location % self.data.len()])
    }

    /// Read-only view of the slots.
    pub fn slots(&self) -> &[i32] {
        &self.data
    }

    /// Content hash; recomputed when the cache is invalid.
    pub fn hash(&self) -> u64 {
        let mut cache = self.cached_hash.lock();
        match *cache {
            Some(hash) => hash,
            None => {
                let hash = content_hash(self.id, &self.data);
                *cache = Some(hash);
                hash
            }
        }
    }
}

impl Clone for ConstantHandler {
    /// Deep copy preserving the id.
    fn clone(&self) -> Self {
        ConstantHandler {
            id: self.id,
            data: self.data.clone(),
            cached_hash: Mutex::new(*self.cached_hash.lock()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants_handle_ints_only() {
        let constants = ConstantHandler::new(4);
        assert_eq!(constants.address_space(OperandType::Int), 4);
        assert_eq!(constants.address_space(OperandType::Double), 0);
        assert_eq!(constants.address_space(OperandType::IntWindow(2)), 0);
    }

    #[test]
    fn test_set_and_get() {
        let mut constants = ConstantHandler::new(2);
        constants.set_data_at(OperandType::Int, 1, -42).unwrap();
        assert_eq!(
            constants.get_data_at(OperandType::Int, 1).unwrap(),
            Value::Int(-42)
        );
        assert!(constants.get_data_at(OperandType::Int, 2).is_err());
    }

    #[test]
    fn test_scaled_fetch() {
        let mut constants = ConstantHandler::new(3);
        constants.set_data_at(OperandType::Int, 0, 7).unwrap();
        assert_eq!(
            constants.get_data_scaled(OperandType::Int, 3),
            Value::Int(7)
        );
    }
}
