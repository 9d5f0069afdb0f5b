use std::collections::HashSet;

use tracing::{debug, trace};

use crate::{
    bytecode::{Op, ProgramBc, compile_error::CompileError, op::Constant},
    lang::{
        node::{BinaryOp, Expr, Stmt, VarDecl},
        program::Program,
    },
};

/// Single-pass lowering of a syntax tree into one flat instruction stream.
///
/// Control flow is emitted as placeholder jumps whose index is remembered
/// and patched once the target is known. Offsets are relative to the jump
/// instruction itself: `target = index + offset`.
pub struct Compiler {
    /// Output instruction stream
    ops: Vec<Op>,

    /// Names declared in the unit being compiled (variables, parameters,
    /// functions). A call to one of these is a user call; anything else is
    /// assumed to be a built-in.
    locals: HashSet<String>,
}

/// Compile a program with a fresh [`Compiler`].
pub fn compile(program: &Program) -> Result<ProgramBc, CompileError> {
    Compiler::new().compile_program(program)
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        Self {
            ops: Vec::new(),
            locals: HashSet::new(),
        }
    }

    pub fn compile_program(mut self, program: &Program) -> Result<ProgramBc, CompileError> {
        self.compile_statements(&program.statements)?;

        debug!(
            statements = program.statements.len(),
            ops = self.ops.len(),
            "compiled program"
        );

        Ok(ProgramBc::new(self.ops))
    }

    pub fn compile_statements(&mut self, statements: &[Stmt]) -> Result<(), CompileError> {
        for statement in statements {
            self.compile_statement(statement)?;
        }
        Ok(())
    }

    /// Whether `name` has been declared in the current unit.
    pub fn is_local(&self, name: &str) -> bool {
        self.locals.contains(name)
    }

    fn compile_statement(&mut self, statement: &Stmt) -> Result<(), CompileError> {
        match statement {
            Stmt::VarDecl(decl) => self.compile_var_decl(decl),

            Stmt::Expr(expr) => {
                self.compile_expression(expr)?;
                self.emit(Op::PopTop);
                Ok(())
            }

            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => self.compile_if(cond, then_branch, else_branch),

            Stmt::Function { name, params, body } => self.compile_function(name, params, body),

            Stmt::Return(expr) => {
                self.compile_expression(expr)?;
                self.emit(Op::Return);
                Ok(())
            }

            Stmt::For {
                init,
                cond,
                step,
                body,
            } => self.compile_for(init, cond, step, body),
        }
    }

    fn compile_var_decl(&mut self, decl: &VarDecl) -> Result<(), CompileError> {
        self.compile_expression(&decl.init)?;
        self.locals.insert(decl.name.clone());
        self.emit(Op::Store(decl.name.clone()));
        Ok(())
    }

    fn compile_expression(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match expr {
            Expr::Literal(n) => {
                self.emit(Op::Push(Constant::Number(*n)));
            }

            Expr::Identifier(name) => {
                self.emit(Op::Load(name.clone()));
            }

            Expr::Binary { left, op, right } => self.compile_binary(left, *op, right)?,

            Expr::Call { callee, args } => self.compile_call(callee, args)?,

            Expr::Paren(inner) => self.compile_expression(inner)?,

            Expr::Assign { target, value } => {
                if !self.is_local(target) {
                    return Err(CompileError::undeclared_assignment(target));
                }
                self.compile_expression(value)?;
                // No dup instruction: store, then reload to leave the value
                // as the expression's result.
                self.emit(Op::Store(target.clone()));
                self.emit(Op::Load(target.clone()));
            }
        }

        Ok(())
    }

    /// Right operand first, so the left operand ends up on top and is the
    /// first value the operator pops.
    fn compile_binary(&mut self, left: &Expr, op: BinaryOp, right: &Expr) -> Result<(), CompileError> {
        self.compile_expression(right)?;
        self.compile_expression(left)?;
        self.emit(Op::Binary(op));
        Ok(())
    }

    /// Arguments are pushed last-to-first so the VM pops them back in
    /// declaration order.
    fn compile_call(&mut self, callee: &str, args: &[Expr]) -> Result<(), CompileError> {
        for arg in args.iter().rev() {
            self.compile_expression(arg)?;
        }

        self.emit(Op::Load(callee.to_string()));

        if self.is_local(callee) {
            self.emit(Op::CallUser(args.len()));
        } else {
            self.emit(Op::CallBuiltin(args.len()));
        }
        Ok(())
    }

    // =========================================================================
    // Control flow
    // =========================================================================

    /// ```text
    ///   <cond>
    ///   JumpIfFalse(else)     ; patched
    ///   <then>
    ///   Jump(end)             ; only with an else branch, patched
    /// else:
    ///   <else>
    /// end:
    /// ```
    fn compile_if(
        &mut self,
        cond: &Expr,
        then_branch: &[Stmt],
        else_branch: &[Stmt],
    ) -> Result<(), CompileError> {
        self.compile_expression(cond)?;
        let jump_if_false = self.emit(Op::JumpIfFalse(0));

        self.compile_statements(then_branch)?;

        if else_branch.is_empty() {
            self.patch_jump_here(jump_if_false)?;
            return Ok(());
        }

        let jump_over_else = self.emit(Op::Jump(0));
        self.patch_jump_here(jump_if_false)?;

        self.compile_statements(else_branch)?;
        self.patch_jump_here(jump_over_else)?;

        Ok(())
    }

    /// ```text
    ///   <init>
    /// loop:
    ///   <cond>
    ///   JumpIfFalse(end)      ; patched
    ///   <body>
    ///   <step>
    ///   PopTop
    ///   Jump(loop)
    /// end:
    /// ```
    fn compile_for(
        &mut self,
        init: &VarDecl,
        cond: &Expr,
        step: &Expr,
        body: &[Stmt],
    ) -> Result<(), CompileError> {
        self.compile_var_decl(init)?;

        let loop_start = self.ops.len();
        self.compile_expression(cond)?;
        let guard = self.emit(Op::JumpIfFalse(0));

        self.compile_statements(body)?;

        // The step is an expression; its value is discarded like a statement's.
        self.compile_expression(step)?;
        self.emit(Op::PopTop);

        let back = self.emit(Op::Jump(0));
        self.patch_jump(back, loop_start)?;
        self.patch_jump_here(guard)?;

        Ok(())
    }

    /// ```text
    ///   Jump(after)           ; patched, skips the body on fall-through
    /// entry:
    ///   <body>
    ///   Push 0; Return        ; unless the body ends with `return`
    /// after:
    ///   Push paramN .. param1
    ///   Push entry
    ///   Push name
    ///   DeclareFunction(N)
    /// ```
    fn compile_function(
        &mut self,
        name: &str,
        params: &[String],
        body: &[Stmt],
    ) -> Result<(), CompileError> {
        // Declared before the body so recursive calls compile as user calls.
        self.locals.insert(name.to_string());

        let jump_over_body = self.emit(Op::Jump(0));
        let entry = self.ops.len();

        let enclosing = self.locals.clone();
        self.locals.extend(params.iter().cloned());
        let compiled_body = self.compile_statements(body);
        self.locals = enclosing;
        compiled_body?;

        if !matches!(body.last(), Some(Stmt::Return(_))) {
            self.emit(Op::Push(Constant::Number(0.0)));
            self.emit(Op::Return);
        }

        self.patch_jump_here(jump_over_body)?;

        for param in params.iter().rev() {
            self.emit(Op::Push(Constant::Name(param.clone())));
        }
        self.emit(Op::Push(Constant::Address(entry)));
        self.emit(Op::Push(Constant::Name(name.to_string())));
        self.emit(Op::DeclareFunction(params.len()));

        trace!(function = name, entry, params = params.len(), "compiled function");
        Ok(())
    }

    // =========================================================================
    // Emission and back-patching
    // =========================================================================

    /// Appends an op and returns its address.
    fn emit(&mut self, op: Op) -> usize {
        self.ops.push(op);
        self.ops.len() - 1
    }

    /// Points the jump at `at` to the next instruction to be emitted.
    fn patch_jump_here(&mut self, at: usize) -> Result<(), CompileError> {
        let target = self.ops.len();
        self.patch_jump(at, target)
    }

    fn patch_jump(&mut self, at: usize, target: usize) -> Result<(), CompileError> {
        let distance = target as i64 - at as i64;
        let offset =
            i32::try_from(distance).map_err(|_| CompileError::JumpOutOfRange { distance })?;

        let patched = self
            .ops
            .get_mut(at)
            .map(|op| op.set_jump_offset(offset))
            .unwrap_or(false);

        if !patched {
            return Err(CompileError::internal(format!(
                "no jump placeholder at {}",
                at
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: f64) -> Op {
        Op::Push(Constant::Number(n))
    }

    fn name(s: &str) -> Op {
        Op::Push(Constant::Name(s.to_string()))
    }

    fn compile_stmts(statements: Vec<Stmt>) -> Vec<Op> {
        compile(&Program::new(statements)).unwrap().ops
    }

    /// Every jump must land inside the program or exactly one past its end.
    fn assert_jumps_in_bounds(ops: &[Op]) {
        for (ip, op) in ops.iter().enumerate() {
            if let Some(target) = op.jump_target(ip) {
                assert!(
                    target >= 0 && target as usize <= ops.len(),
                    "jump at {} lands at {} outside 0..={}",
                    ip,
                    target,
                    ops.len()
                );
            }
        }
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    #[test]
    fn test_var_decl_pushes_right_then_left() {
        let ops = compile_stmts(vec![Stmt::var(
            "x",
            Expr::binary(Expr::literal(2.0), BinaryOp::Add, Expr::literal(3.0)),
        )]);

        assert_eq!(
            ops,
            vec![
                num(3.0),
                num(2.0),
                Op::Binary(BinaryOp::Add),
                Op::Store("x".to_string()),
            ]
        );
    }

    #[test]
    fn test_expression_statement_discards_value() {
        let ops = compile_stmts(vec![Stmt::Expr(Expr::ident("x"))]);
        assert_eq!(ops, vec![Op::Load("x".to_string()), Op::PopTop]);
    }

    #[test]
    fn test_paren_compiles_inner() {
        let ops = compile_stmts(vec![Stmt::Expr(Expr::Paren(Box::new(Expr::literal(1.0))))]);
        assert_eq!(ops, vec![num(1.0), Op::PopTop]);
    }

    #[test]
    fn test_call_unknown_name_is_builtin_with_reversed_args() {
        let ops = compile_stmts(vec![Stmt::Expr(Expr::call(
            "print",
            vec![Expr::literal(1.0), Expr::literal(2.0)],
        ))]);

        assert_eq!(
            ops,
            vec![
                num(2.0),
                num(1.0),
                Op::Load("print".to_string()),
                Op::CallBuiltin(2),
                Op::PopTop,
            ]
        );
    }

    #[test]
    fn test_call_declared_variable_is_user_call() {
        let ops = compile_stmts(vec![
            Stmt::var("f", Expr::literal(0.0)),
            Stmt::Expr(Expr::call("f", vec![])),
        ]);
        assert!(ops.contains(&Op::CallUser(0)));
        assert!(!ops.iter().any(|op| matches!(op, Op::CallBuiltin(_))));
    }

    #[test]
    fn test_assignment_stores_then_reloads() {
        let ops = compile_stmts(vec![
            Stmt::var("x", Expr::literal(1.0)),
            Stmt::Expr(Expr::assign("x", Expr::literal(5.0))),
        ]);

        assert_eq!(
            &ops[2..],
            &[
                num(5.0),
                Op::Store("x".to_string()),
                Op::Load("x".to_string()),
                Op::PopTop,
            ]
        );
    }

    #[test]
    fn test_assignment_to_undeclared_name_fails() {
        let result = compile(&Program::new(vec![Stmt::Expr(Expr::assign(
            "ghost",
            Expr::literal(1.0),
        ))]));

        assert_eq!(result, Err(CompileError::undeclared_assignment("ghost")));
    }

    // =========================================================================
    // Control flow
    // =========================================================================

    #[test]
    fn test_if_without_else_skips_true_branch() {
        let ops = compile_stmts(vec![Stmt::If {
            cond: Expr::literal(1.0),
            then_branch: vec![Stmt::var("a", Expr::literal(1.0))],
            else_branch: vec![],
        }]);

        assert_eq!(
            ops,
            vec![
                num(1.0),
                Op::JumpIfFalse(3),
                num(1.0),
                Op::Store("a".to_string()),
            ]
        );
    }

    #[test]
    fn test_if_else_offsets() {
        let ops = compile_stmts(vec![Stmt::If {
            cond: Expr::literal(0.0),
            then_branch: vec![Stmt::var("a", Expr::literal(1.0))],
            else_branch: vec![Stmt::var("a", Expr::literal(2.0))],
        }]);

        assert_eq!(
            ops,
            vec![
                num(0.0),
                Op::JumpIfFalse(4), // -> 5, first op of the else branch
                num(1.0),
                Op::Store("a".to_string()),
                Op::Jump(3), // -> 7, one past the end
                num(2.0),
                Op::Store("a".to_string()),
            ]
        );
    }

    #[test]
    fn test_elseif_chain_nests() {
        let inner = Stmt::If {
            cond: Expr::literal(1.0),
            then_branch: vec![Stmt::var("b", Expr::literal(2.0))],
            else_branch: vec![Stmt::var("b", Expr::literal(3.0))],
        };
        let ops = compile_stmts(vec![Stmt::If {
            cond: Expr::literal(0.0),
            then_branch: vec![Stmt::var("b", Expr::literal(1.0))],
            else_branch: vec![inner],
        }]);

        assert_jumps_in_bounds(&ops);
        // Outer jump-over-else must land exactly at the end.
        let outer_jump = ops.iter().position(|op| matches!(op, Op::Jump(_))).unwrap();
        assert_eq!(ops[outer_jump].jump_target(outer_jump), Some(ops.len() as i64));
    }

    #[test]
    fn test_for_loop_layout() {
        let ops = compile_stmts(vec![Stmt::For {
            init: VarDecl {
                name: "i".to_string(),
                init: Expr::literal(0.0),
            },
            cond: Expr::binary(Expr::ident("i"), BinaryOp::Lt, Expr::literal(3.0)),
            step: Expr::assign(
                "i",
                Expr::binary(Expr::ident("i"), BinaryOp::Add, Expr::literal(1.0)),
            ),
            body: vec![],
        }]);

        assert_eq!(
            ops,
            vec![
                num(0.0),
                Op::Store("i".to_string()),
                num(3.0), // 2: loop re-entry
                Op::Load("i".to_string()),
                Op::Binary(BinaryOp::Lt),
                Op::JumpIfFalse(8), // -> 13
                num(1.0),
                Op::Load("i".to_string()),
                Op::Binary(BinaryOp::Add),
                Op::Store("i".to_string()),
                Op::Load("i".to_string()),
                Op::PopTop,
                Op::Jump(-10), // -> 2
            ]
        );
    }

    // =========================================================================
    // Functions
    // =========================================================================

    #[test]
    fn test_function_declaration_layout() {
        let ops = compile_stmts(vec![Stmt::Function {
            name: "add".to_string(),
            params: vec!["a".to_string(), "b".to_string()],
            body: vec![Stmt::Return(Expr::binary(
                Expr::ident("a"),
                BinaryOp::Add,
                Expr::ident("b"),
            ))],
        }]);

        assert_eq!(
            ops,
            vec![
                Op::Jump(5),
                Op::Load("b".to_string()),
                Op::Load("a".to_string()),
                Op::Binary(BinaryOp::Add),
                Op::Return,
                name("b"),
                name("a"),
                Op::Push(Constant::Address(1)),
                name("add"),
                Op::DeclareFunction(2),
            ]
        );
    }

    #[test]
    fn test_function_without_return_gets_implicit_zero() {
        let ops = compile_stmts(vec![Stmt::Function {
            name: "noop".to_string(),
            params: vec![],
            body: vec![],
        }]);

        assert_eq!(
            ops,
            vec![
                Op::Jump(3),
                num(0.0),
                Op::Return,
                Op::Push(Constant::Address(1)),
                name("noop"),
                Op::DeclareFunction(0),
            ]
        );
    }

    #[test]
    fn test_trailing_if_with_return_still_gets_implicit_return() {
        let ops = compile_stmts(vec![Stmt::Function {
            name: "f".to_string(),
            params: vec!["x".to_string()],
            body: vec![Stmt::If {
                cond: Expr::ident("x"),
                then_branch: vec![Stmt::Return(Expr::literal(1.0))],
                else_branch: vec![],
            }],
        }]);

        // Load x, JumpIfFalse, Push 1, Return, Push 0, Return
        assert_eq!(&ops[1..7], &[
            Op::Load("x".to_string()),
            Op::JumpIfFalse(3),
            num(1.0),
            Op::Return,
            num(0.0),
            Op::Return,
        ]);
        assert_jumps_in_bounds(&ops);
    }

    #[test]
    fn test_recursive_call_is_user_call() {
        let ops = compile_stmts(vec![Stmt::Function {
            name: "loop_forever".to_string(),
            params: vec![],
            body: vec![Stmt::Return(Expr::call("loop_forever", vec![]))],
        }]);
        assert!(ops.contains(&Op::CallUser(0)));
    }

    #[test]
    fn test_parameters_do_not_leak_out_of_body() {
        let mut compiler = Compiler::new();
        compiler
            .compile_statements(&[Stmt::Function {
                name: "f".to_string(),
                params: vec!["p".to_string()],
                body: vec![Stmt::var("inner", Expr::ident("p"))],
            }])
            .unwrap();

        assert!(compiler.is_local("f"));
        assert!(!compiler.is_local("p"));
        assert!(!compiler.is_local("inner"));
    }

    #[test]
    fn test_parameter_called_as_function_is_user_call() {
        let ops = compile_stmts(vec![Stmt::Function {
            name: "apply".to_string(),
            params: vec!["g".to_string(), "x".to_string()],
            body: vec![Stmt::Return(Expr::call("g", vec![Expr::ident("x")]))],
        }]);
        assert!(ops.contains(&Op::CallUser(1)));
    }
}
