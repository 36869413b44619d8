//! In-memory shader modules.

use std::fmt;

use crate::{
    spirv::{Function, Instruction, Op, TargetEnv, Word, MAGIC_NUMBER},
    Error, Result,
};

/// The five-word module header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleHeader {
    /// Magic number, always [`MAGIC_NUMBER`] after a successful parse.
    pub magic: Word,
    /// Version word, `0x0001_0300` for SPIR-V 1.3.
    pub version: Word,
    /// Generator magic. Preserved verbatim, never interpreted.
    pub generator: Word,
    /// Id bound: every id in the module is strictly below this value.
    pub bound: Word,
    /// Reserved schema word, zero in practice.
    pub schema: Word,
}

impl ModuleHeader {
    /// Creates a header for the given target environment with id bound 1.
    #[must_use]
    pub const fn new(env: TargetEnv) -> Self {
        Self {
            magic: MAGIC_NUMBER,
            version: env.version_word(),
            generator: 0,
            bound: 1,
            schema: 0,
        }
    }
}

/// A shader module held as structured sections plus function bodies.
///
/// Sections are stored in logical-layout order, so serialization is a plain
/// walk over the fields. Instructions that global sections hold are kept
/// verbatim, including ones with opcodes this crate does not model, which
/// round-trip as opaque literal operands.
///
/// # Examples
///
/// ```rust,no_run
/// use spvshrink::spirv::{binary, Module};
///
/// let module = binary::read_file("shader.spv")?;
/// for function in module.functions() {
///     println!("function %{} has {} blocks", function.id(), function.blocks().len());
/// }
/// # Ok::<(), spvshrink::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    /// The module header.
    header: ModuleHeader,

    /// `OpCapability` instructions.
    capabilities: Vec<Instruction>,

    /// `OpExtension` instructions.
    extensions: Vec<Instruction>,

    /// `OpExtInstImport` instructions.
    ext_inst_imports: Vec<Instruction>,

    /// The single `OpMemoryModel`, if the module declares one.
    memory_model: Option<Instruction>,

    /// `OpEntryPoint` instructions.
    entry_points: Vec<Instruction>,

    /// `OpExecutionMode` instructions.
    execution_modes: Vec<Instruction>,

    /// Debug instructions: `OpString`, `OpSource`, `OpName`, `OpMemberName`.
    debug: Vec<Instruction>,

    /// Annotation instructions: `OpDecorate` and friends.
    annotations: Vec<Instruction>,

    /// Types, constants and module-scope variables, in declaration order.
    globals: Vec<Instruction>,

    /// Function definitions in module order.
    functions: Vec<Function>,
}

impl Module {
    /// Creates an empty module targeting [`TargetEnv::default`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_env(TargetEnv::default())
    }

    /// Creates an empty module targeting the given environment.
    #[must_use]
    pub fn with_env(env: TargetEnv) -> Self {
        Self {
            header: ModuleHeader::new(env),
            capabilities: Vec::new(),
            extensions: Vec::new(),
            ext_inst_imports: Vec::new(),
            memory_model: None,
            entry_points: Vec::new(),
            execution_modes: Vec::new(),
            debug: Vec::new(),
            annotations: Vec::new(),
            globals: Vec::new(),
            functions: Vec::new(),
        }
    }

    /// Returns the module header.
    #[must_use]
    pub const fn header(&self) -> &ModuleHeader {
        &self.header
    }

    /// Returns the module header mutably.
    pub fn header_mut(&mut self) -> &mut ModuleHeader {
        &mut self.header
    }

    /// Returns the id bound.
    #[must_use]
    pub const fn bound(&self) -> Word {
        self.header.bound
    }

    /// Allocates a fresh id by bumping the bound.
    ///
    /// # Errors
    /// Returns [`Error::IdOverflow`] if the id space is exhausted.
    pub fn take_next_id(&mut self) -> Result<Word> {
        let id = self.header.bound;
        let next = self
            .header
            .bound
            .checked_add(1)
            .ok_or(Error::IdOverflow)?;
        self.header.bound = next;
        Ok(id)
    }

    /// Raises the bound to cover `id` if it does not already.
    pub fn ensure_bound_covers(&mut self, id: Word) {
        if id >= self.header.bound {
            self.header.bound = id.saturating_add(1);
        }
    }

    /// Returns the capability instructions.
    #[must_use]
    pub fn capabilities(&self) -> &[Instruction] {
        &self.capabilities
    }

    /// Returns the extension instructions.
    #[must_use]
    pub fn extensions(&self) -> &[Instruction] {
        &self.extensions
    }

    /// Returns the extended instruction set imports.
    #[must_use]
    pub fn ext_inst_imports(&self) -> &[Instruction] {
        &self.ext_inst_imports
    }

    /// Returns the memory model instruction, if declared.
    #[must_use]
    pub const fn memory_model(&self) -> Option<&Instruction> {
        self.memory_model.as_ref()
    }

    /// Returns the entry point instructions.
    #[must_use]
    pub fn entry_points(&self) -> &[Instruction] {
        &self.entry_points
    }

    /// Returns the execution mode instructions.
    #[must_use]
    pub fn execution_modes(&self) -> &[Instruction] {
        &self.execution_modes
    }

    /// Returns the debug instructions.
    #[must_use]
    pub fn debug(&self) -> &[Instruction] {
        &self.debug
    }

    /// Returns the annotation instructions.
    #[must_use]
    pub fn annotations(&self) -> &[Instruction] {
        &self.annotations
    }

    /// Returns the types, constants and module-scope variables.
    #[must_use]
    pub fn globals(&self) -> &[Instruction] {
        &self.globals
    }

    /// Returns the globals mutably.
    pub fn globals_mut(&mut self) -> &mut Vec<Instruction> {
        &mut self.globals
    }

    /// Returns the global instruction defining `id`, if any.
    #[must_use]
    pub fn global(&self, id: Word) -> Option<&Instruction> {
        self.globals.iter().find(|i| i.result_id() == Some(id))
    }

    /// Removes the global instruction defining `id`. Returns `true` if one
    /// was removed.
    pub fn remove_global(&mut self, id: Word) -> bool {
        let before = self.globals.len();
        self.globals.retain(|i| i.result_id() != Some(id));
        self.globals.len() != before
    }

    /// Appends an instruction to the section its opcode belongs to.
    pub fn push_global(&mut self, instruction: Instruction) {
        match instruction.op() {
            Op::Capability => self.capabilities.push(instruction),
            Op::Extension => self.extensions.push(instruction),
            Op::ExtInstImport => self.ext_inst_imports.push(instruction),
            Op::MemoryModel => self.memory_model = Some(instruction),
            Op::EntryPoint => self.entry_points.push(instruction),
            Op::ExecutionMode => self.execution_modes.push(instruction),
            op if op.is_debug() => self.debug.push(instruction),
            op if op.is_annotation() => self.annotations.push(instruction),
            _ => self.globals.push(instruction),
        }
    }

    /// Returns the functions in module order.
    #[must_use]
    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    /// Returns the functions mutably.
    pub fn functions_mut(&mut self) -> &mut Vec<Function> {
        &mut self.functions
    }

    /// Returns the function with the given result id.
    #[must_use]
    pub fn function(&self, id: Word) -> Option<&Function> {
        self.functions.iter().find(|f| f.id() == id)
    }

    /// Returns the function with the given result id mutably.
    pub fn function_mut(&mut self, id: Word) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| f.id() == id)
    }

    /// Appends a function definition.
    pub fn add_function(&mut self, function: Function) {
        self.functions.push(function);
    }

    /// Iterates over every global-section instruction in layout order.
    pub fn global_instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.capabilities
            .iter()
            .chain(self.extensions.iter())
            .chain(self.ext_inst_imports.iter())
            .chain(self.memory_model.iter())
            .chain(self.entry_points.iter())
            .chain(self.execution_modes.iter())
            .chain(self.debug.iter())
            .chain(self.annotations.iter())
            .chain(self.globals.iter())
    }

    /// Iterates over every instruction in the module, layout order, function
    /// bodies last.
    pub fn all_instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.global_instructions()
            .chain(self.functions.iter().flat_map(Function::instructions))
    }
}

impl Default for Module {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "; SPIR-V {}.{}, bound {}",
            (self.header.version >> 16) & 0xff,
            (self.header.version >> 8) & 0xff,
            self.header.bound
        )?;
        for instruction in self.global_instructions() {
            writeln!(f, "{instruction}")?;
        }
        for function in &self.functions {
            write!(f, "{function}")?;
        }
        Ok(())
    }
}
