//! Execution Environment
//!
//! An environment binds together an instruction set, the data sources a
//! program can read, the register file size and the number of program
//! constants. From these it derives the bit layout of program lines and
//! the largest address space, both of which stay fixed for the
//! environment's lifetime. Programs, execution engines and mutators all
//! take their structural bounds from here.
//!
//! Data source indexing is positional: index `0` is the register file,
//! index `1` the constant slots when `nb_constants > 0`, and the
//! caller's sources follow in order.

use tracing::warn;

use crate::data::{ConstantHandler, DataHandler, PrimitiveArray};
use crate::error::{TangleError, TangleResult};
use crate::instructions::Set;

/// Bit widths of the regions of an encoded line.
///
/// Only used for mutation weighting and size reporting; lines are not
/// actually bit-packed in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineLayout {
    /// Bits encoding the instruction index
    pub nb_instruction_bits: usize,
    /// Bits encoding the destination register index
    pub nb_destination_bits: usize,
    /// Bits encoding one operand's data source index
    pub nb_operand_source_bits: usize,
    /// Bits encoding one operand's location
    pub nb_operand_location_bits: usize,
    /// Bits encoding all operands
    pub nb_operands_bits: usize,
    /// Total bits per line
    pub total_bits: usize,
}

/// `ceil(log2(n))` for `n >= 1`.
fn bits_for(n: usize) -> usize {
    (usize::BITS - (n - 1).leading_zeros()) as usize
}

/// Immutable configuration shared by programs and engines.
#[derive(Debug)]
pub struct Environment {
    instruction_set: Set,
    /// Index 0: register template; index 1: constant template when
    /// `nb_constants > 0`; then deep clones of the caller's sources.
    data_sources: Vec<DataHandler>,
    nb_registers: usize,
    nb_constants: usize,
    largest_address_space: usize,
    line_layout: LineLayout,
    use_memory_registers: bool,
}

impl Environment {
    /// Build an environment from an instruction set and data sources.
    ///
    /// The instruction set is filtered: any instruction with an operand
    /// type that no source in this layout can provide is dropped with a
    /// warning. Fails with
    /// [`InvalidEnvironment`](TangleError::InvalidEnvironment) when the
    /// result is degenerate: no register, fewer than two instructions
    /// after filtering, no operand, registers as the only source, or an
    /// empty address space.
    pub fn new(
        instruction_set: &Set,
        sources: &[&DataHandler],
        nb_registers: usize,
        nb_constants: usize,
    ) -> TangleResult<Self> {
        let mut data_sources = Vec::with_capacity(sources.len() + 2);
        data_sources.push(DataHandler::from(PrimitiveArray::<f64>::new(nb_registers)));
        if nb_constants > 0 {
            data_sources.push(DataHandler::from(ConstantHandler::new(nb_constants)));
        }
        for source in sources {
            data_sources.push((*source).clone());
        }

        let filtered = Self::filter_instruction_set(instruction_set, &data_sources);

        let largest_address_space = data_sources
            .iter()
            .map(DataHandler::largest_address_space)
            .max()
            .unwrap_or(0);

        let nb_instructions = filtered.nb_instructions();
        let max_nb_operands = filtered.max_nb_operands();
        let nb_data_sources = data_sources.len();

        if nb_registers == 0
            || nb_instructions <= 1
            || max_nb_operands == 0
            || nb_data_sources <= 1
            || largest_address_space == 0
        {
            return Err(TangleError::InvalidEnvironment(format!(
                "degenerate layout: {nb_registers} registers, {nb_instructions} instructions, \
                 {max_nb_operands} max operands, {nb_data_sources} data sources, \
                 largest address space {largest_address_space}"
            )));
        }

        let nb_instruction_bits = bits_for(nb_instructions);
        let nb_destination_bits = bits_for(nb_registers);
        let nb_operand_source_bits = bits_for(nb_data_sources);
        let nb_operand_location_bits = bits_for(largest_address_space);
        let nb_operands_bits =
            max_nb_operands * (nb_operand_source_bits + nb_operand_location_bits);
        let line_layout = LineLayout {
            nb_instruction_bits,
            nb_destination_bits,
            nb_operand_source_bits,
            nb_operand_location_bits,
            nb_operands_bits,
            total_bits: nb_instruction_bits + nb_destination_bits + nb_operands_bits,
        };

        Ok(Environment {
            instruction_set: filtered,
            data_sources,
            nb_registers,
            nb_constants,
            largest_address_space,
            line_layout,
            use_memory_registers: false,
        })
    }

    /// Keep the register file content between program executions
    /// instead of zeroing it.
    pub fn with_memory_registers(mut self, use_memory_registers: bool) -> Self {
        self.use_memory_registers = use_memory_registers;
        self
    }

    /// Drop instructions whose operands no source can provide.
    fn filter_instruction_set(instruction_set: &Set, data_sources: &[DataHandler]) -> Set {
        let mut filtered = Set::new();
        for instruction in instruction_set.iter() {
            let unprovidable = instruction
                .operand_types()
                .iter()
                .find(|ty| !data_sources.iter().any(|source| source.can_handle(**ty)));
            match unprovidable {
                Some(ty) => {
                    warn!(
                        instruction = instruction.name(),
                        operand_type = %ty,
                        "instruction dropped: no data source provides its operand type"
                    );
                }
                None => {
                    filtered.add(instruction.clone());
                }
            }
        }
        filtered
    }

    /// The filtered instruction set.
    pub fn instruction_set(&self) -> &Set {
        &self.instruction_set
    }

    /// All positional data sources, register and constant templates
    /// included. These are templates for structural queries (types,
    /// address spaces); live data is supplied at execution time.
    pub fn data_sources(&self) -> &[DataHandler] {
        &self.data_sources
    }

    /// The register file template at source index 0.
    pub fn registers_template(&self) -> &DataHandler {
        &self.data_sources[0]
    }

    pub fn nb_registers(&self) -> usize {
        self.nb_registers
    }

    pub fn nb_constants(&self) -> usize {
        self.nb_constants
    }

    pub fn nb_instructions(&self) -> usize {
        self.instruction_set.nb_instructions()
    }

    pub fn max_nb_operands(&self) -> usize {
        self.instruction_set.max_nb_operands()
    }

    /// Number of positional data sources, virtual ones included.
    pub fn nb_data_sources(&self) -> usize {
        self.data_sources.len()
    }

    /// Positional index of the first caller-supplied source.
    pub fn first_external_source(&self) -> usize {
        if self.nb_constants > 0 {
            2
        } else {
            1
        }
    }

    pub fn largest_address_space(&self) -> usize {
        self.largest_address_space
    }

    pub fn line_layout(&self) -> &LineLayout {
        &self.line_layout
    }

    pub fn use_memory_registers(&self) -> bool {
        self.use_memory_registers
    }
}
