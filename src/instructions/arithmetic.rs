//! Stock instruction library.
//!
//! Generic arithmetic over the supported primitive element types, a
//! constant multiplier, a windowed maximum, and a closure-backed
//! two-operand instruction for ad-hoc operations.

use std::marker::PhantomData;

use crate::data::{OperandType, Primitive, Value};
use crate::instructions::Instruction;

/// `dest = a + b` over two operands of type `T`.
#[derive(Debug)]
pub struct Add<T: Primitive> {
    types: [OperandType; 2],
    _marker: PhantomData<T>,
}

impl<T: Primitive> Add<T> {
    pub fn new() -> Self {
        Add {
            types: [T::scalar_type(), T::scalar_type()],
            _marker: PhantomData,
        }
    }
}

impl<T: Primitive> Default for Add<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Primitive> Instruction for Add<T> {
    fn operand_types(&self) -> &[OperandType] {
        &self.types
    }

    fn execute(&self, operands: &[Value]) -> f64 {
        match (
            operands.first().and_then(T::from_value),
            operands.get(1).and_then(T::from_value),
        ) {
            (Some(a), Some(b)) => T::to_f64(a.add(b)),
            _ => 0.0,
        }
    }

    fn name(&self) -> &'static str {
        "add"
    }
}

/// `dest = a - b` over two operands of type `T`.
#[derive(Debug)]
pub struct Sub<T: Primitive> {
    types: [OperandType; 2],
    _marker: PhantomData<T>,
}

impl<T: Primitive> Sub<T> {
    pub fn new() -> Self {
        Sub {
            types: [T::scalar_type(), T::scalar_type()],
            _marker: PhantomData,
        }
    }
}

impl<T: Primitive> Default for Sub<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Primitive> Instruction for Sub<T> {
    fn operand_types(&self) -> &[OperandType] {
        &self.types
    }

    fn execute(&self, operands: &[Value]) -> f64 {
        match (
            operands.first().and_then(T::from_value),
            operands.get(1).and_then(T::from_value),
        ) {
            (Some(a), Some(b)) => T::to_f64(a.sub(b)),
            _ => 0.0,
        }
    }

    fn name(&self) -> &'static str {
        "sub"
    }
}

/// `dest = a * b` over two operands of type `T`.
#[derive(Debug)]
pub struct Mult<T: Primitive> {
    types: [OperandType; 2],
    _marker: PhantomData<T>,
}

impl<T: Primitive> Mult<T> {
    pub fn new() -> Self {
        Mult {
            types: [T::scalar_type(), T::scalar_type()],
            _marker: PhantomData,
        }
    }
}

impl<T: Primitive> Default for Mult<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Primitive> Instruction for Mult<T> {
    fn operand_types(&self) -> &[OperandType] {
        &self.types
    }

    fn execute(&self, operands: &[Value]) -> f64 {
        match (
            operands.first().and_then(T::from_value),
            operands.get(1).and_then(T::from_value),
        ) {
            (Some(a), Some(b)) => T::to_f64(a.mul(b)),
            _ => 0.0,
        }
    }

    fn name(&self) -> &'static str {
        "mult"
    }
}

/// `dest = a * c` where `a` is a double and `c` an integer constant.
///
/// The second operand is typed `Int` so that the mutators route it to
/// the constant handler (or any other int source) while the first stays
/// on a double source.
#[derive(Debug)]
pub struct MultByConstant {
    types: [OperandType; 2],
}

impl MultByConstant {
    pub fn new() -> Self {
        MultByConstant {
            types: [OperandType::Double, OperandType::Int],
        }
    }
}

impl Default for MultByConstant {
    fn default() -> Self {
        Self::new()
    }
}

impl Instruction for MultByConstant {
    fn operand_types(&self) -> &[OperandType] {
        &self.types
    }

    fn execute(&self, operands: &[Value]) -> f64 {
        match (
            operands.first().and_then(Value::as_double),
            operands.get(1).and_then(Value::as_int),
        ) {
            (Some(a), Some(c)) => a * f64::from(c),
            _ => 0.0,
        }
    }

    fn name(&self) -> &'static str {
        "mult_by_constant"
    }
}

/// `dest = max(window)` over a window of `K` doubles.
#[derive(Debug)]
pub struct MaxOfWindow<const K: usize> {
    types: [OperandType; 1],
}

impl<const K: usize> MaxOfWindow<K> {
    pub fn new() -> Self {
        MaxOfWindow {
            types: [OperandType::DoubleWindow(K)],
        }
    }
}

impl<const K: usize> Default for MaxOfWindow<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const K: usize> Instruction for MaxOfWindow<K> {
    fn operand_types(&self) -> &[OperandType] {
        &self.types
    }

    fn execute(&self, operands: &[Value]) -> f64 {
        match operands.first().and_then(Value::as_double_window) {
            Some(window) => window.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            None => 0.0,
        }
    }

    fn name(&self) -> &'static str {
        "max_of_window"
    }
}

/// Closure-backed instruction over two doubles.
///
/// Every closure literal is its own concrete type, so a [`Set`]
/// accepts any number of distinct `Lambda2` instructions.
///
/// [`Set`]: crate::instructions::Set
pub struct Lambda2<F: Fn(f64, f64) -> f64 + Send + Sync + 'static> {
    name: &'static str,
    types: [OperandType; 2],
    function: F,
}

impl<F: Fn(f64, f64) -> f64 + Send + Sync + 'static> Lambda2<F> {
    pub fn new(name: &'static str, function: F) -> Self {
        Lambda2 {
            name,
            types: [OperandType::Double, OperandType::Double],
            function,
        }
    }
}

impl<F: Fn(f64, f64) -> f64 + Send + Sync + 'static> Instruction for Lambda2<F> {
    fn operand_types(&self) -> &[OperandType] {
        &self.types
    }

    fn execute(&self, operands: &[Value]) -> f64 {
        match (
            operands.first().and_then(Value::as_double),
            operands.get(1).and_then(Value::as_double),
        ) {
            (Some(a), Some(b)) => (self.function)(a, b),
            _ => 0.0,
        }
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_double() {
        let add = Add::<f64>::new();
        assert_eq!(
            add.execute(&[Value::Double(1.5), Value::Double(2.25)]),
            3.75
        );
    }

    #[test]
    fn test_add_int_wraps() {
        let add = Add::<i32>::new();
        let result = add.execute(&[Value::Int(i32::MAX), Value::Int(1)]);
        assert_eq!(result, f64::from(i32::MIN));
    }

    #[test]
    fn test_mismatched_operands_yield_zero() {
        let add = Add::<f64>::new();
        assert_eq!(add.execute(&[Value::Int(1), Value::Int(2)]), 0.0);
        assert_eq!(add.execute(&[Value::Double(1.0)]), 0.0);
    }

    #[test]
    fn test_mult_by_constant() {
        let mult = MultByConstant::new();
        assert_eq!(
            mult.execute(&[Value::Double(2.5), Value::Int(-2)]),
            -5.0
        );
    }

    #[test]
    fn test_max_of_window() {
        let max = MaxOfWindow::<3>::new();
        assert_eq!(
            max.execute(&[Value::DoubleWindow(vec![0.5, 4.0, -1.0])]),
            4.0
        );
    }

    #[test]
    fn test_lambda() {
        let div = Lambda2::new("div", |a, b| a / b);
        assert_eq!(div.execute(&[Value::Double(9.0), Value::Double(3.0)]), 3.0);
        assert_eq!(div.nb_operands(), 2);
        assert_eq!(div.name(), "div");
    }
}
