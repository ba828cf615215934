//! Single-pass Pratt parser that emits bytecode directly into a [`Chunk`]
//! as it parses. No AST is ever built.
//!
//! State is a `Compiler` value owned by one `compile()` call — there is
//! no module-level singleton, so nothing prevents running several
//! independent compilations (e.g. successive REPL lines) back to back.

mod disassemble;

pub use disassemble::{disassemble_chunk, disassemble_instruction};

use ember_core::chunk::OpCode;
use ember_core::{Chunk, Heap, Value};

use crate::scanner::{sentinel_eof, Scanner, Token, TokenKind};

/// Soft cap on local variables per compilation, matching the single byte
/// `GetLocal`/`SetLocal` operand width.
const MAX_LOCALS: usize = 256;

/// Sentinel depth for a local that has been declared but whose
/// initializer hasn't finished evaluating yet.
const UNINITIALIZED: i32 = -1;

/// Precedence levels, ascending. `Precedence::next()` is used by `binary`
/// to parse its right operand one level tighter, giving left
/// associativity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    None,
    Assignment,
    Or,
    And,
    Equality,
    Comparison,
    Term,
    Factor,
    Unary,
    Call,
    Primary,
}

impl Precedence {
    fn next(self) -> Self {
        match self {
            Precedence::None => Precedence::Assignment,
            Precedence::Assignment => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::Term,
            Precedence::Term => Precedence::Factor,
            Precedence::Factor => Precedence::Unary,
            Precedence::Unary | Precedence::Call => Precedence::Primary,
            Precedence::Primary => Precedence::Primary,
        }
    }
}

struct Local {
    name: Box<str>,
    depth: i32,
}

/// Compiles `source` into `chunk`, interning any string literals through
/// `heap`. Returns `Err(())` if one or more compile errors were reported
/// (already printed to stderr); the caller must not execute the chunk in
/// that case.
pub fn compile(source: &str, chunk: &mut Chunk, heap: &mut Heap) -> Result<(), ()> {
    let mut compiler = Compiler::new(source, chunk, heap);
    compiler.advance();
    while !compiler.check(TokenKind::Eof) {
        compiler.declaration();
    }
    compiler.end_compiler();
    if compiler.had_error {
        Err(())
    } else {
        Ok(())
    }
}

struct Compiler<'src, 'a> {
    scanner: Scanner<'src>,
    previous: Token<'src>,
    current: Token<'src>,
    had_error: bool,
    panic_mode: bool,
    chunk: &'a mut Chunk,
    heap: &'a mut Heap,
    locals: Vec<Local>,
    scope_depth: i32,
}

impl<'src, 'a> Compiler<'src, 'a> {
    fn new(source: &'src str, chunk: &'a mut Chunk, heap: &'a mut Heap) -> Self {
        let placeholder = sentinel_eof(0);
        Self {
            scanner: Scanner::new(source),
            previous: placeholder,
            current: placeholder,
            had_error: false,
            panic_mode: false,
            chunk,
            heap,
            locals: Vec::new(),
            scope_depth: 0,
        }
    }

    // ------------------------------------------------------------------
    // Token stream plumbing
    // ------------------------------------------------------------------

    fn advance(&mut self) {
        self.previous = self.current;
        loop {
            self.current = self.scanner.scan_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            self.error_at_current(self.current.lexeme);
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn match_token(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.current.kind == kind {
            self.advance();
        } else {
            self.error_at_current(message);
        }
    }

    // ------------------------------------------------------------------
    // Error reporting
    // ------------------------------------------------------------------

    fn error_at_current(&mut self, message: &str) {
        self.error_at(self.current, message);
    }

    fn error(&mut self, message: &str) {
        self.error_at(self.previous, message);
    }

    fn error_at(&mut self, token: Token<'src>, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_error = true;
        let formatted = format_compile_error(token, message);
        tracing::debug!(%formatted, "compile error reported");
        eprintln!("{formatted}");
    }

    fn synchronize(&mut self) {
        self.panic_mode = false;
        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            match self.current.kind {
                TokenKind::Class
                | TokenKind::Fun
                | TokenKind::Var
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Print
                | TokenKind::Return => return,
                _ => self.advance(),
            }
        }
    }

    // ------------------------------------------------------------------
    // Bytecode emission
    // ------------------------------------------------------------------

    fn emit_byte(&mut self, byte: u8) {
        self.chunk.write(byte, self.previous.line);
    }

    fn emit_op(&mut self, op: OpCode) {
        self.chunk.write_op(op, self.previous.line);
    }

    fn emit_constant(&mut self, value: Value) {
        match self.chunk.add_constant(value) {
            Some(idx) => {
                self.emit_op(OpCode::Constant);
                self.emit_byte(idx);
            }
            None => self.error("Too many constants in one chunk."),
        }
    }

    /// Emits `op` followed by a two-byte placeholder offset, returning
    /// the offset of the placeholder's first byte for later
    /// `patch_jump`.
    fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit_op(op);
        self.emit_byte(0xff);
        self.emit_byte(0xff);
        self.chunk.len() - 2
    }

    /// Backpatches the placeholder at `offset` with the distance from
    /// just past it to the chunk's current end.
    fn patch_jump(&mut self, offset: usize) {
        let distance = self.chunk.len() - offset - 2;
        match u16::try_from(distance) {
            Ok(distance) => self.chunk.patch_u16(offset, distance),
            Err(_) => self.error("Too much code to jump over."),
        }
    }

    fn emit_loop(&mut self, loop_start: usize) {
        self.emit_op(OpCode::Loop);
        let distance = self.chunk.len() - loop_start + 2;
        match u16::try_from(distance) {
            Ok(distance) => {
                let bytes = distance.to_be_bytes();
                self.emit_byte(bytes[0]);
                self.emit_byte(bytes[1]);
            }
            Err(_) => self.error("Loop body too large."),
        }
    }

    fn end_compiler(&mut self) {
        self.emit_op(OpCode::Return);
    }

    // ------------------------------------------------------------------
    // Declarations and statements
    // ------------------------------------------------------------------

    fn declaration(&mut self) {
        if self.match_token(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.statement();
        }
        if self.panic_mode {
            self.synchronize();
        }
    }

    fn var_declaration(&mut self) {
        let global = self.parse_variable("Expect variable name.");
        if self.match_token(TokenKind::Equal) {
            self.expression();
        } else {
            self.emit_op(OpCode::Nil);
        }
        self.consume(TokenKind::Semicolon, "Expect ';' after variable declaration.");
        self.define_variable(global);
    }

    fn statement(&mut self) {
        if self.match_token(TokenKind::Print) {
            self.print_statement();
        } else if self.match_token(TokenKind::If) {
            self.if_statement();
        } else if self.match_token(TokenKind::While) {
            self.while_statement();
        } else if self.match_token(TokenKind::For) {
            self.for_statement();
        } else if self.match_token(TokenKind::LeftBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else {
            self.expression_statement();
        }
    }

    fn print_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after value.");
        self.emit_op(OpCode::Print);
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after expression.");
        self.emit_op(OpCode::Pop);
    }

    fn block(&mut self) {
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.declaration();
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after block.");
    }

    fn if_statement(&mut self) {
        self.consume(TokenKind::LeftParen, "Expect '(' after 'if'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let then_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();

        let else_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(then_jump);
        self.emit_op(OpCode::Pop);

        if self.match_token(TokenKind::Else) {
            self.statement();
        }
        self.patch_jump(else_jump);
    }

    fn while_statement(&mut self) {
        let loop_start = self.chunk.len();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'while'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let exit_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit_op(OpCode::Pop);
    }

    fn for_statement(&mut self) {
        self.begin_scope();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'for'.");

        if self.match_token(TokenKind::Semicolon) {
            // no initializer clause
        } else if self.match_token(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.expression_statement();
        }

        let mut loop_start = self.chunk.len();
        let mut exit_jump = None;
        if !self.match_token(TokenKind::Semicolon) {
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after loop condition.");
            exit_jump = Some(self.emit_jump(OpCode::JumpIfFalse));
            self.emit_op(OpCode::Pop);
        }

        if !self.match_token(TokenKind::RightParen) {
            let body_jump = self.emit_jump(OpCode::Jump);
            let increment_start = self.chunk.len();
            self.expression();
            self.emit_op(OpCode::Pop);
            self.consume(TokenKind::RightParen, "Expect ')' after for clauses.");

            self.emit_loop(loop_start);
            loop_start = increment_start;
            self.patch_jump(body_jump);
        }

        self.statement();
        self.emit_loop(loop_start);

        if let Some(exit_jump) = exit_jump {
            self.patch_jump(exit_jump);
            self.emit_op(OpCode::Pop);
        }

        self.end_scope();
    }

    fn begin_scope(&mut self) {
        self.scope_depth += 1;
    }

    fn end_scope(&mut self) {
        self.scope_depth -= 1;
        while let Some(local) = self.locals.last() {
            if local.depth <= self.scope_depth {
                break;
            }
            self.emit_op(OpCode::Pop);
            self.locals.pop();
        }
    }

    // ------------------------------------------------------------------
    // Variables
    // ------------------------------------------------------------------

    fn parse_variable(&mut self, message: &str) -> u8 {
        self.consume(TokenKind::Identifier, message);
        self.declare_variable();
        if self.scope_depth > 0 {
            return 0;
        }
        self.identifier_constant(self.previous)
    }

    fn identifier_constant(&mut self, name: Token<'src>) -> u8 {
        let obj = self.heap.copy_string(name.lexeme);
        self.chunk.add_constant(Value::Object(obj)).unwrap_or_else(|| {
            self.error("Too many constants in one chunk.");
            0
        })
    }

    fn declare_variable(&mut self) {
        if self.scope_depth == 0 {
            return;
        }
        let name = self.previous;
        for local in self.locals.iter().rev() {
            if local.depth != UNINITIALIZED && local.depth < self.scope_depth {
                break;
            }
            if local.name.as_ref() == name.lexeme {
                self.error("Already a variable with this name in this scope.");
                break;
            }
        }
        self.add_local(name);
    }

    fn add_local(&mut self, name: Token<'src>) {
        if self.locals.len() >= MAX_LOCALS {
            self.error("Too many local variables in function.");
            return;
        }
        self.locals.push(Local {
            name: Box::from(name.lexeme),
            depth: UNINITIALIZED,
        });
    }

    fn mark_initialized(&mut self) {
        if let Some(local) = self.locals.last_mut() {
            local.depth = self.scope_depth;
        }
    }

    fn define_variable(&mut self, global: u8) {
        if self.scope_depth > 0 {
            self.mark_initialized();
            return;
        }
        self.emit_op(OpCode::DefineGlobal);
        self.emit_byte(global);
    }

    fn resolve_local(&mut self, name: Token<'src>) -> Option<u8> {
        for (slot, local) in self.locals.iter().enumerate().rev() {
            if local.name.as_ref() == name.lexeme {
                if local.depth == UNINITIALIZED {
                    self.error("Can't read local variable in its own initializer.");
                }
                return u8::try_from(slot).ok();
            }
        }
        None
    }

    fn named_variable(&mut self, name: Token<'src>, can_assign: bool) {
        let (get_op, set_op, operand) = if let Some(slot) = self.resolve_local(name) {
            (OpCode::GetLocal, OpCode::SetLocal, slot)
        } else {
            let idx = self.identifier_constant(name);
            (OpCode::GetGlobal, OpCode::SetGlobal, idx)
        };

        if can_assign && self.match_token(TokenKind::Equal) {
            self.expression();
            self.emit_op(set_op);
        } else {
            self.emit_op(get_op);
        }
        self.emit_byte(operand);
    }

    // ------------------------------------------------------------------
    // Expressions (Pratt parser core)
    // ------------------------------------------------------------------

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let can_assign = precedence <= Precedence::Assignment;
        if !self.prefix_rule(self.previous.kind, can_assign) {
            self.error("Expect expression.");
            return;
        }

        while precedence <= infix_precedence(self.current.kind) {
            self.advance();
            self.infix_rule(self.previous.kind, can_assign);
        }

        if can_assign && self.match_token(TokenKind::Equal) {
            self.error("Invalid assignment target.");
        }
    }

    /// Dispatches a prefix position. Returns `false` (no error reported
    /// here) if `kind` has no prefix rule, so the caller can report
    /// "Expect expression." with the right context.
    fn prefix_rule(&mut self, kind: TokenKind, can_assign: bool) -> bool {
        match kind {
            TokenKind::LeftParen => self.grouping(),
            TokenKind::Minus | TokenKind::Bang => self.unary(),
            TokenKind::Number => self.number(),
            TokenKind::String => self.string(),
            TokenKind::True | TokenKind::False | TokenKind::Nil => self.literal(),
            TokenKind::Identifier => self.variable(can_assign),
            _ => return false,
        }
        true
    }

    fn infix_rule(&mut self, kind: TokenKind, can_assign: bool) {
        match kind {
            TokenKind::Minus
            | TokenKind::Plus
            | TokenKind::Slash
            | TokenKind::Star
            | TokenKind::BangEqual
            | TokenKind::EqualEqual
            | TokenKind::Less
            | TokenKind::LessEqual
            | TokenKind::Greater
            | TokenKind::GreaterEqual => self.binary(),
            TokenKind::And => self.and_(can_assign),
            TokenKind::Or => self.or_(can_assign),
            _ => unreachable!("infix_rule dispatched for a token with no infix precedence"),
        }
    }

    fn grouping(&mut self) {
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after expression.");
    }

    fn unary(&mut self) {
        let operator = self.previous.kind;
        self.parse_precedence(Precedence::Unary);
        match operator {
            TokenKind::Bang => self.emit_op(OpCode::Not),
            TokenKind::Minus => self.emit_op(OpCode::Negate),
            _ => unreachable!("unary dispatched for a non-unary token"),
        }
    }

    fn binary(&mut self) {
        let operator = self.previous.kind;
        let precedence = infix_precedence(operator);
        self.parse_precedence(precedence.next());
        match operator {
            TokenKind::Plus => self.emit_op(OpCode::Add),
            TokenKind::Minus => self.emit_op(OpCode::Subtract),
            TokenKind::Star => self.emit_op(OpCode::Multiply),
            TokenKind::Slash => self.emit_op(OpCode::Divide),
            TokenKind::BangEqual => {
                self.emit_op(OpCode::Equal);
                self.emit_op(OpCode::Not);
            }
            TokenKind::EqualEqual => self.emit_op(OpCode::Equal),
            TokenKind::Greater => self.emit_op(OpCode::Greater),
            TokenKind::GreaterEqual => {
                self.emit_op(OpCode::Less);
                self.emit_op(OpCode::Not);
            }
            TokenKind::Less => self.emit_op(OpCode::Less),
            TokenKind::LessEqual => {
                self.emit_op(OpCode::Greater);
                self.emit_op(OpCode::Not);
            }
            _ => unreachable!("binary dispatched for a non-binary-operator token"),
        }
    }

    fn and_(&mut self, _can_assign: bool) {
        let end_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::And);
        self.patch_jump(end_jump);
    }

    fn or_(&mut self, _can_assign: bool) {
        let else_jump = self.emit_jump(OpCode::JumpIfFalse);
        let end_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(else_jump);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::Or);
        self.patch_jump(end_jump);
    }

    fn number(&mut self) {
        let value: f64 = self
            .previous
            .lexeme
            .parse()
            .expect("scanner only produces well-formed number lexemes");
        self.emit_constant(Value::Number(value));
    }

    fn string(&mut self) {
        let lexeme = self.previous.lexeme;
        let text = &lexeme[1..lexeme.len() - 1];
        let obj = self.heap.copy_string(text);
        self.emit_constant(Value::Object(obj));
    }

    fn literal(&mut self) {
        match self.previous.kind {
            TokenKind::False => self.emit_op(OpCode::False),
            TokenKind::True => self.emit_op(OpCode::True),
            TokenKind::Nil => self.emit_op(OpCode::Nil),
            _ => unreachable!("literal dispatched for a non-literal token"),
        }
    }

    fn variable(&mut self, can_assign: bool) {
        self.named_variable(self.previous, can_assign);
    }
}

/// Infix binding precedence for `kind`, or `Precedence::None` if it has
/// no infix rule. Matches the canonical parse-rule table; implemented as
/// a direct match rather than a `(prefix, infix, precedence)` array
/// (DESIGN.md: both are acceptable, and a match sidesteps needing
/// higher-rank function-pointer types for a per-call-lifetime
/// `Compiler`).
fn infix_precedence(kind: TokenKind) -> Precedence {
    match kind {
        TokenKind::Minus | TokenKind::Plus => Precedence::Term,
        TokenKind::Slash | TokenKind::Star => Precedence::Factor,
        TokenKind::BangEqual | TokenKind::EqualEqual => Precedence::Equality,
        TokenKind::Less | TokenKind::LessEqual | TokenKind::Greater | TokenKind::GreaterEqual => {
            Precedence::Comparison
        }
        TokenKind::And => Precedence::And,
        TokenKind::Or => Precedence::Or,
        _ => Precedence::None,
    }
}

fn format_compile_error(token: Token, message: &str) -> String {
    let location = match token.kind {
        TokenKind::Eof => " at end".to_string(),
        TokenKind::Error => String::new(),
        _ => format!(" at '{}'", token.lexeme),
    };
    format!("[line {}] Error{location}: {message}", token.line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_core::Heap;

    fn compile_source(source: &str) -> (Result<(), ()>, Chunk) {
        let mut chunk = Chunk::new();
        let mut heap = Heap::new();
        let result = compile(source, &mut chunk, &mut heap);
        (result, chunk)
    }

    #[test]
    fn compiles_simple_print_statement() {
        let (result, chunk) = compile_source("print 1 + 2;");
        assert_eq!(result, Ok(()));
        assert!(chunk.code().contains(&(OpCode::Add as u8)));
        assert!(chunk.code().contains(&(OpCode::Print as u8)));
    }

    #[test]
    fn reports_expect_expression_on_bare_operator() {
        let (result, _) = compile_source("print +;");
        assert_eq!(result, Err(()));
    }

    #[test]
    fn redeclaring_a_local_in_the_same_scope_is_an_error() {
        let (result, _) = compile_source("{ var a = 1; var a = 2; }");
        assert_eq!(result, Err(()));
    }

    #[test]
    fn redefining_a_global_at_top_level_is_allowed() {
        let (result, _) = compile_source("var a = 1; var a = 2;");
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn format_compile_error_matches_three_message_shapes() {
        use crate::scanner::Scanner;
        let mut scanner = Scanner::new("x");
        let ident = scanner.scan_token();
        let eof = Token {
            kind: TokenKind::Eof,
            lexeme: "",
            line: 3,
        };
        let err_tok = Token {
            kind: TokenKind::Error,
            lexeme: "Unterminated string.",
            line: 3,
        };
        assert_eq!(
            format_compile_error(ident, "msg"),
            "[line 1] Error at 'x': msg"
        );
        assert_eq!(format_compile_error(eof, "msg"), "[line 3] Error at end: msg");
        assert_eq!(
            format_compile_error(err_tok, "Unterminated string."),
            "[line 3] Error: Unterminated string."
        );
    }

    #[test]
    fn idempotent_for_the_same_source() {
        let (r1, c1) = compile_source("var a = 1; print a + 2;");
        let (r2, c2) = compile_source("var a = 1; print a + 2;");
        assert_eq!(r1, r2);
        assert_eq!(c1.code(), c2.code());
    }

    #[test]
    fn emits_jump_and_loop_for_control_flow() {
        let (result, chunk) = compile_source("var i = 0; while (i < 3) { i = i + 1; }");
        assert_eq!(result, Ok(()));
        assert!(chunk.code().contains(&(OpCode::JumpIfFalse as u8)));
        assert!(chunk.code().contains(&(OpCode::Loop as u8)));
    }

    proptest::proptest! {
        #[test]
        fn compiling_arbitrary_text_never_panics(source in ".{0,200}") {
            // Whatever a user types at the REPL prompt, `compile` must either
            // accept it or report a compile error — never panic. Garbage
            // input is exactly what a hand-typed REPL line is likely to be.
            let _ = compile_source(&source);
        }
    }
}
