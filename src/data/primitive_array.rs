//! Fixed-length arrays of primitive values, the workhorse data source.
//!
//! A `PrimitiveArray<T>` provides its element type as a scalar operand
//! and, for any window length `k <= len`, a windowed view of `k`
//! consecutive elements. The address space of the window type shrinks
//! accordingly: a window of `k` can start at `len - k + 1` positions.

use std::hash::Hasher;

use parking_lot::Mutex;

use crate::data::{content_hash, next_handler_id, OperandType, Value};
use crate::error::{TangleError, TangleResult};

/// Element types storable in a [`PrimitiveArray`].
///
/// The trait is the bridge between the compile-time element type and
/// the runtime [`OperandType`] tokens used by instructions and lines.
pub trait Primitive: Copy + Default + PartialEq + std::fmt::Debug + Send + Sync + 'static {
    /// The scalar operand type for this element.
    fn scalar_type() -> OperandType;

    /// The windowed operand type of width `k` for this element.
    fn window_type(k: usize) -> OperandType;

    /// Wrap a single element.
    fn scalar_value(self) -> Value;

    /// Wrap a window of elements.
    fn window_value(window: &[Self]) -> Value;

    /// Extract an element from a scalar [`Value`] of the matching kind.
    fn from_value(value: &Value) -> Option<Self>;

    /// Widen to `f64` (instruction results are always `f64`).
    fn to_f64(self) -> f64;

    /// Overflow-tolerant arithmetic used by the instruction library.
    fn add(self, other: Self) -> Self;
    fn sub(self, other: Self) -> Self;
    fn mul(self, other: Self) -> Self;

    /// Feed this element into a hasher.
    fn hash_element(self, hasher: &mut impl Hasher);
}

impl Primitive for f64 {
    fn scalar_type() -> OperandType {
        OperandType::Double
    }

    fn window_type(k: usize) -> OperandType {
        OperandType::DoubleWindow(k)
    }

    fn scalar_value(self) -> Value {
        Value::Double(self)
    }

    fn window_value(window: &[Self]) -> Value {
        Value::DoubleWindow(window.to_vec())
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_double()
    }

    fn to_f64(self) -> f64 {
        self
    }

    fn add(self, other: Self) -> Self {
        self + other
    }

    fn sub(self, other: Self) -> Self {
        self - other
    }

    fn mul(self, other: Self) -> Self {
        self * other
    }

    fn hash_element(self, hasher: &mut impl Hasher) {
        // NaN payloads are preserved; identical bit patterns hash alike.
        hasher.write_u64(self.to_bits());
    }
}

impl Primitive for i32 {
    fn scalar_type() -> OperandType {
        OperandType::Int
    }

    fn window_type(k: usize) -> OperandType {
        OperandType::IntWindow(k)
    }

    fn scalar_value(self) -> Value {
        Value::Int(self)
    }

    fn window_value(window: &[Self]) -> Value {
        Value::IntWindow(window.to_vec())
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_int()
    }

    fn to_f64(self) -> f64 {
        f64::from(self)
    }

    fn add(self, other: Self) -> Self {
        self.wrapping_add(other)
    }

    fn sub(self, other: Self) -> Self {
        self.wrapping_sub(other)
    }

    fn mul(self, other: Self) -> Self {
        self.wrapping_mul(other)
    }

    fn hash_element(self, hasher: &mut impl Hasher) {
        hasher.write_i32(self);
    }
}

/// Fixed-length vector of a primitive type with windowed views.
#[derive(Debug)]
pub struct PrimitiveArray<T: Primitive> {
    id: u64,
    data: Vec<T>,
    cached_hash: Mutex<Option<u64>>,
}

impl<T: Primitive> PrimitiveArray<T> {
    /// Allocate a zero-filled array of `size` elements with a fresh id.
    pub fn new(size: usize) -> Self {
        PrimitiveArray {
            id: next_handler_id(),
            data: vec![T::default(); size],
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

    /// Address space for `ty`; `0` when `ty` is not handled here.
    pub fn address_space(&self, ty: OperandType) -> usize {
        if ty == T::scalar_type() {
            self.data.len()
        } else if ty == T::window_type(self.window_width(ty)) && self.window_width(ty) >= 1 {
            self.data.len().saturating_sub(self.window_width(ty) - 1)
        } else {
            0
        }
    }

    fn window_width(&self, ty: OperandType) -> usize {
        match ty {
            OperandType::DoubleWindow(k) | OperandType::IntWindow(k) => k,
            _ => 0,
        }
    }

    /// Checked fetch.
    pub fn get_data_at(&self, ty: OperandType, address: usize) -> TangleResult<Value> {
        let space = self.address_space(ty);
        if space == 0 {
            return Err(TangleError::InvalidType {
                requested: ty.name(),
                handler: "primitive-array",
            });
        }
        if address >= space {
            return Err(TangleError::OutOfRange { address, space });
        }
        Ok(self.fetch(ty, address))
    }

    /// Checked write of the scalar slot at `address`.
    pub fn set_data_at(&mut self, ty: OperandType, address: usize, value: T) -> TangleResult<()> {
        if ty != T::scalar_type() {
            return Err(TangleError::InvalidType {
                requested: ty.name(),
                handler: "primitive-array",
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
    ///
    /// The caller guarantees `ty` is handled (the environment filters
    /// instructions so that a compatible source always exists).
    pub fn get_data_scaled(&self, ty: OperandType, raw_location: usize) -> Value {
        let space = self.address_space(ty);
        debug_assert!(space > 0, "scaled fetch of unhandled type {ty}");
        self.fetch(ty, raw_location % space)
    }

    fn fetch(&self, ty: OperandType, address: usize) -> Value {
        if ty == T::scalar_type() {
            self.data[address].scalar_value()
        } else {
            let k = self.window_width(ty);
            T::window_value(&self.data[address..address + k])
        }
    }

    /// Read-only view of the raw slots.
    pub fn slots(&self) -> &[T] {
        &self.data
    }

    /// Mutable view of the raw slots; invalidates the cached hash.
    ///
    /// For owners that mutate in bulk, such as the register file of an
    /// execution engine or a learning environment refreshing sensor
    /// data.
    pub fn slots_mut(&mut self) -> &mut [T] {
        *self.cached_hash.lock() = None;
        &mut self.data
    }

    /// Reset every slot to the default value.
    pub fn reset(&mut self) {
        self.data.fill(T::default());
        *self.cached_hash.lock() = None;
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

impl<T: Primitive> Clone for PrimitiveArray<T> {
    /// Deep copy preserving the id, so snapshots hash like the source.
    fn clone(&self) -> Self {
        PrimitiveArray {
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
    fn test_scalar_and_window_address_spaces() {
        let array = PrimitiveArray::<f64>::new(24);
        assert_eq!(array.address_space(OperandType::Double), 24);
        assert_eq!(array.address_space(OperandType::DoubleWindow(1)), 24);
        assert_eq!(array.address_space(OperandType::DoubleWindow(5)), 20);
        assert_eq!(array.address_space(OperandType::Int), 0);
        assert_eq!(array.address_space(OperandType::IntWindow(2)), 0);
    }

    #[test]
    fn test_checked_accessors_fail_modes() {
        let mut array = PrimitiveArray::<i32>::new(4);
        assert!(matches!(
            array.get_data_at(OperandType::Double, 0),
            Err(TangleError::InvalidType { .. })
        ));
        assert!(matches!(
            array.get_data_at(OperandType::Int, 4),
            Err(TangleError::OutOfRange { address: 4, space: 4 })
        ));
        assert!(matches!(
            array.set_data_at(OperandType::Int, 9, 1),
            Err(TangleError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_window_fetch() {
        let mut array = PrimitiveArray::<f64>::new(5);
        for (i, slot) in array.slots_mut().iter_mut().enumerate() {
            *slot = i as f64;
        }
        let window = array
            .get_data_at(OperandType::DoubleWindow(3), 2)
            .unwrap();
        assert_eq!(window, Value::DoubleWindow(vec![2.0, 3.0, 4.0]));
    }

    #[test]
    fn test_scaled_fetch_wraps() {
        let mut array = PrimitiveArray::<i32>::new(4);
        array.slots_mut().copy_from_slice(&[10, 11, 12, 13]);
        assert_eq!(
            array.get_data_scaled(OperandType::Int, 6),
            Value::Int(12)
        );
        // Window space is 2, so raw location 5 lands on start 1.
        assert_eq!(
            array.get_data_scaled(OperandType::IntWindow(3), 5),
            Value::IntWindow(vec![11, 12, 13])
        );
    }

    #[test]
    fn test_hash_caching_and_invalidation() {
        let mut array = PrimitiveArray::<f64>::new(3);
        let h0 = array.hash();
        assert_eq!(h0, array.hash());
        array.set_data_at(OperandType::Double, 1, 2.5).unwrap();
        let h1 = array.hash();
        assert_ne!(h0, h1);
        array.reset();
        assert_eq!(array.hash(), h0);
    }
}
