use std::io::{self, Write};
use std::mem;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::bytecode::{Op, ProgramBc, stack_check::check_program};
use crate::lang::value::{Builtin, UserFunction, Value};
use crate::runtime::builtins;
use crate::runtime::runtime_error::{ErrorKind, RuntimeError, type_error, undefined_name};
use crate::runtime::scope::Scope;

#[derive(Debug, Clone)]
pub struct VmConfig {
    pub max_call_depth: usize,
    pub max_steps: Option<usize>,
    pub max_stack_size: usize,
    /// Run the stack verifier over a program before executing it.
    pub verify_stack: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            max_call_depth: 1000,
            max_steps: None,
            max_stack_size: 10_000,
            verify_stack: true,
        }
    }
}

/// What the dispatch loop does after an instruction.
enum Flow {
    Next,
    Jump(usize),
    /// Enter a user function with its freshly bound frame scope.
    Call(Rc<UserFunction>, Rc<Scope>),
    Return(Value),
}

/// A suspended caller, resumed when the callee returns.
struct Frame {
    function: String,
    return_ip: usize,
    scope: Rc<Scope>,
}

/// Stack machine executing a [`ProgramBc`].
///
/// All frames share one operand stack and one instruction stream. Calls
/// push a [`Frame`] onto an explicit frame stack instead of recursing on
/// the host stack, so call depth is bounded only by `max_call_depth`.
pub struct Vm<W: Write = io::Stdout> {
    stack: Vec<Value>,
    frames: Vec<Frame>,
    globals: Rc<Scope>,
    // Safety limits
    config: VmConfig,
    steps: usize,
    /// Sink for `print`
    out: W,
}

impl Vm<io::Stdout> {
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        Vm::with_output(config, io::stdout())
    }
}

impl Default for Vm<io::Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> Vm<W> {
    pub fn with_output(config: VmConfig, out: W) -> Self {
        let globals = Scope::global();
        builtins::install(&globals);
        Self {
            stack: Vec::new(),
            frames: Vec::new(),
            globals,
            config,
            steps: 0,
            out,
        }
    }

    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    /// Look up a binding in the global scope.
    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.get(name)
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    /// Instructions executed by the last run.
    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn reset_execution_state(&mut self) {
        self.stack.clear();
        self.frames.clear();
        self.steps = 0;
        self.globals.clear();
        builtins::install(&self.globals);
    }

    /// Execute `program` from instruction 0 in a fresh global scope.
    ///
    /// Returns the value of a top-level `Return`, or `Number(0)` when
    /// execution runs off the end.
    pub fn run(&mut self, program: &ProgramBc) -> Result<Value, RuntimeError> {
        self.reset_execution_state();

        if self.config.verify_stack {
            check_program(program).map_err(|e| RuntimeError::new(ErrorKind::from(e)))?;
        }

        debug!(ops = program.len(), "running program");

        let result = self.execute(&program.ops);
        self.out.flush()?;
        let value = result?;

        debug!(steps = self.steps, stack = self.stack.len(), "program halted");
        Ok(value)
    }

    // Execution

    fn check_limits(&mut self) -> Result<(), RuntimeError> {
        self.steps += 1;

        if let Some(max) = self.config.max_steps {
            if self.steps > max {
                return Err(ErrorKind::StepLimitExceeded(max).into());
            }
        }

        if self.stack.len() >= self.config.max_stack_size {
            return Err(ErrorKind::StackLimitExceeded(self.config.max_stack_size).into());
        }

        Ok(())
    }

    fn execute(&mut self, ops: &[Op]) -> Result<Value, RuntimeError> {
        let mut ip = 0;
        let mut scope = Rc::clone(&self.globals);

        loop {
            // Running off the end inside a function returns 0 to its caller.
            let Some(op) = ops.get(ip) else {
                let Some(frame) = self.frames.pop() else {
                    trace!(ip, "halted");
                    return Ok(Value::Number(0.0));
                };
                self.push(Value::Number(0.0));
                ip = frame.return_ip;
                scope = frame.scope;
                continue;
            };

            let flow = self
                .check_limits()
                .and_then(|_| self.exec_op(ops, ip, op, &scope))
                .map_err(|e| self.unwind(e.at(ip, op.name())))?;

            match flow {
                Flow::Next => ip += 1,
                Flow::Jump(target) => ip = target,
                Flow::Call(func, frame_scope) => {
                    self.frames.push(Frame {
                        function: func.name.clone(),
                        return_ip: ip + 1,
                        scope: mem::replace(&mut scope, frame_scope),
                    });
                    trace!(function = %func.name, entry = func.entry, depth = self.frames.len(), "enter frame");
                    ip = func.entry;
                }
                Flow::Return(value) => {
                    let Some(frame) = self.frames.pop() else {
                        return Ok(value);
                    };
                    trace!(function = %frame.function, depth = self.frames.len(), "leave frame");
                    self.push(value);
                    ip = frame.return_ip;
                    scope = frame.scope;
                }
            }
        }
    }

    /// Pops every live frame into the error's call stack, innermost first.
    fn unwind(&mut self, mut err: RuntimeError) -> RuntimeError {
        while let Some(frame) = self.frames.pop() {
            err = err.with_context(&frame.function);
        }
        err
    }

    fn exec_op(
        &mut self,
        ops: &[Op],
        ip: usize,
        op: &Op,
        scope: &Rc<Scope>,
    ) -> Result<Flow, RuntimeError> {
        match op {
            Op::Push(constant) => self.push(Value::from(constant)),

            // Variables
            Op::Store(name) => {
                let value = self.pop()?;
                scope.set(name, value);
            }
            Op::Load(name) => {
                let value = scope.get(name).ok_or_else(|| undefined_name(name))?;
                self.push(value);
            }

            // Left operand is on top
            Op::Binary(bin) => {
                let left = self.pop_number()?;
                let right = self.pop_number()?;
                self.push(Value::Number(bin.apply(left, right)));
            }

            // Control flow
            Op::Jump(offset) => return Ok(Flow::Jump(jump_target(ops, ip, *offset)?)),
            Op::JumpIfFalse(offset) => {
                if self.pop()? == Value::Number(0.0) {
                    return Ok(Flow::Jump(jump_target(ops, ip, *offset)?));
                }
            }
            Op::JumpIfTrue(offset) => {
                if self.pop()? == Value::Number(1.0) {
                    return Ok(Flow::Jump(jump_target(ops, ip, *offset)?));
                }
            }

            // Dispatch follows the callee's runtime kind: a parameter bound
            // to `print` is called through CALL_USER.
            Op::CallBuiltin(argc) | Op::CallUser(argc) => {
                let callee = self.pop()?;
                let args = self.pop_args(*argc)?;
                match callee {
                    Value::Builtin(builtin) => {
                        let result = self.call_builtin(builtin, &args)?;
                        self.push(result);
                    }
                    Value::Function(func) => {
                        let frame_scope = self.bind_call(&func, args)?;
                        return Ok(Flow::Call(func, frame_scope));
                    }
                    other => return Err(ErrorKind::NotCallable(other.to_string()).into()),
                }
            }

            Op::DeclareFunction(param_count) => self.declare_function(*param_count, scope)?,

            Op::Return => return Ok(Flow::Return(self.pop()?)),

            Op::PopTop => {
                self.pop()?;
            }
        }

        Ok(Flow::Next)
    }

    // Functions

    fn call_builtin(&mut self, builtin: Builtin, args: &[Value]) -> Result<Value, RuntimeError> {
        if args.len() != builtin.arity {
            return Err(ErrorKind::ArityMismatch {
                function: builtin.name.to_string(),
                expected: builtin.arity,
                got: args.len(),
            }
            .into());
        }
        trace!(builtin = builtin.name, "call builtin");
        (builtin.func)(args, &mut self.out)
    }

    /// Checks arity and depth, then binds `args` in a child of the
    /// function's defining scope.
    fn bind_call(&self, func: &UserFunction, args: Vec<Value>) -> Result<Rc<Scope>, RuntimeError> {
        if args.len() != func.params.len() {
            return Err(ErrorKind::ArityMismatch {
                function: func.name.clone(),
                expected: func.params.len(),
                got: args.len(),
            }
            .into());
        }

        if self.frames.len() >= self.config.max_call_depth {
            return Err(ErrorKind::CallDepthExceeded(self.config.max_call_depth).into());
        }

        let frame = Scope::child(&func.scope);
        for (param, arg) in func.params.iter().zip(args) {
            frame.set(param, arg);
        }
        Ok(frame)
    }

    /// Pops name, entry address and parameter names, then binds the new
    /// function in `scope`, which it also captures.
    fn declare_function(&mut self, param_count: usize, scope: &Rc<Scope>) -> Result<(), RuntimeError> {
        let name = self.pop_name()?;
        let entry = match self.pop()? {
            Value::Address(entry) => entry,
            other => return Err(type_error("address", other.type_name())),
        };

        let mut params = Vec::with_capacity(param_count);
        for _ in 0..param_count {
            params.push(self.pop_name()?);
        }

        trace!(function = %name, entry, params = params.len(), "declare function");

        let func = UserFunction {
            name: name.clone(),
            entry,
            params,
            scope: Rc::clone(scope),
        };
        scope.set(&name, Value::Function(Rc::new(func)));
        Ok(())
    }

    // Stack operations

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.stack
            .pop()
            .ok_or_else(|| RuntimeError::new(ErrorKind::StackUnderflow))
    }

    fn pop_number(&mut self) -> Result<f64, RuntimeError> {
        match self.pop()? {
            Value::Number(n) => Ok(n),
            other => Err(type_error("number", other.type_name())),
        }
    }

    fn pop_name(&mut self) -> Result<String, RuntimeError> {
        match self.pop()? {
            Value::Name(name) => Ok(name),
            other => Err(type_error("name", other.type_name())),
        }
    }

    /// First value popped is the first argument.
    fn pop_args(&mut self, argc: usize) -> Result<Vec<Value>, RuntimeError> {
        let mut args = Vec::with_capacity(argc);
        for _ in 0..argc {
            args.push(self.pop()?);
        }
        Ok(args)
    }
}

impl<W: Write> Drop for Vm<W> {
    // Functions bound globally hold the global scope; clearing it frees them.
    fn drop(&mut self) {
        self.stack.clear();
        self.frames.clear();
        self.globals.clear();
    }
}

fn jump_target(ops: &[Op], ip: usize, offset: i32) -> Result<usize, RuntimeError> {
    let target = ip as i64 + offset as i64;
    if target < 0 || target > ops.len() as i64 {
        return Err(ErrorKind::JumpOutOfBounds { offset, target }.into());
    }
    Ok(target as usize)
}
