//! Parser for Opal syntax.
//!
//! A Pratt-style precedence parser over the token sequence. Statements are
//! recognised by their leading token; everything else is an expression
//! followed by a terminator (usually supplied by the lexer's newline
//! promotion). The parser produces a single `Block` root.

use crate::ast::{Annotation, ClassDecl, FuncDecl, IfClause, Node, NodeKind, VarDecl};
use crate::error::CompileError;
use crate::lexer::{self, Location, Token, TokenKind};
use crate::types::{DataType, TypeContext, TypeHandle};

/// Binding power per operator; higher binds tighter. Returns -1 for tokens
/// that are not binary operators.
fn precedence(kind: TokenKind) -> i32 {
    match kind {
        TokenKind::Assign | TokenKind::Equal => 0,
        TokenKind::OrOr => 1,
        TokenKind::AndAnd => 2,
        TokenKind::BitOr => 3,
        TokenKind::BitXor => 4,
        TokenKind::BitAnd => 5,
        TokenKind::EqualEqual | TokenKind::NotEqual => 6,
        TokenKind::Less | TokenKind::Greater | TokenKind::LessEqual | TokenKind::GreaterEqual => 7,
        TokenKind::ShiftLeft | TokenKind::ShiftRight => 8,
        TokenKind::Add | TokenKind::Sub => 9,
        TokenKind::Mul | TokenKind::Div | TokenKind::Mod => 10,
        _ => -1,
    }
}

pub struct Parser<'ctx> {
    name: String,
    tokens: Vec<Token>,
    cursor: usize,
    error: bool,
    context: &'ctx mut TypeContext,
}

impl<'ctx> Parser<'ctx> {
    pub fn new(name: &str, context: &'ctx mut TypeContext) -> Self {
        Parser {
            name: name.to_string(),
            tokens: Vec::new(),
            cursor: 0,
            error: false,
            context,
        }
    }

    /// Scan and parse a complete source string into a `Block` root.
    pub fn run(&mut self, source: &str) -> Result<Node, CompileError> {
        self.tokens = lexer::scan(&self.name, source)?;
        self.cursor = 0;

        let location = self.location();
        let mut statements = Vec::new();
        while !self.at_end() {
            match self.parse_stmt() {
                Some(node) if !self.error => statements.push(node),
                _ => return Err(CompileError::Syntax),
            }
        }

        Ok(Node::new(location, NodeKind::Block(statements)))
    }

    pub fn had_error(&self) -> bool {
        self.error
    }

    // =========================================================================
    // Token plumbing
    // =========================================================================

    fn at_end(&self) -> bool {
        self.cursor >= self.tokens.len()
    }

    fn peek(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.cursor + offset)
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek(0).is_some_and(|t| t.kind == kind)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.cursor).cloned();
        if token.is_some() {
            self.cursor += 1;
        }
        token
    }

    fn location(&self) -> Location {
        self.peek(0).map(|t| t.location).unwrap_or_default()
    }

    fn current_text(&self) -> String {
        self.peek(0).map_or("<eof>".to_string(), |t| t.text.clone())
    }

    fn throw(&mut self, msg: &str) {
        self.error = true;
        let loc = self.location();
        println!("{}:{}:{} (Syntax): {}", self.name, loc.line, loc.column, msg);
    }

    /// Consume a statement terminator. A closing brace or the end of input
    /// terminates the statement without being consumed, so inline blocks
    /// like `{ return n }` parse the way their multi-line form does.
    fn expect_terminator(&mut self) {
        if self.check(TokenKind::Semicolon) {
            self.cursor += 1;
        } else if !self.check(TokenKind::RBrace) && !self.at_end() {
            self.expect(TokenKind::Semicolon);
        }
    }

    /// Consume a token of the given kind or report a syntax error.
    fn expect(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.cursor += 1;
            true
        } else {
            let found = self.peek(0).map_or("<eof>", |t| t.kind.as_str());
            self.throw(&format!(
                "Invalid syntax token '{}'. Expected '{}'",
                found,
                kind.as_str()
            ));
            false
        }
    }

    // =========================================================================
    // Types
    // =========================================================================

    /// Datatype = SimpleType | "option" "<" Datatype ">" ; SimpleType = word { "[]" } .
    fn parse_datatype(&mut self) -> TypeHandle {
        if !self.check(TokenKind::Word) {
            self.throw("Type must be an identifier, invalid");
            return self.context.null_type();
        }
        let name = self.advance().unwrap().text;

        let mut ty = if name == "option" {
            if !self.expect(TokenKind::Less) {
                return self.context.null_type();
            }
            let subtype = self.parse_datatype();
            if !self.expect(TokenKind::Greater) {
                return self.context.null_type();
            }
            self.context.find_or_create(DataType::Option(subtype))
        } else {
            self.context.intern(&name)
        };

        while self.check(TokenKind::LBracket) {
            self.cursor += 1;
            if !self.expect(TokenKind::RBracket) {
                return self.context.null_type();
            }
            if *ty == DataType::Void {
                self.throw("Invalid: array of type void");
                return self.context.null_type();
            }
            ty = self.context.find_or_create(DataType::Array(ty));
        }

        ty
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    /// SimpleLiteral = Float | Integer | String | Boolean | None "<" Datatype ">" .
    fn parse_simple_literal(&mut self) -> Option<Node> {
        let location = self.location();
        let token = self.peek(0)?.clone();
        match token.kind {
            TokenKind::Float => {
                self.cursor += 1;
                let value: f64 = token.text.parse().unwrap_or(0.0);
                Some(Node::new(location, NodeKind::Float(value)))
            }
            TokenKind::Int => {
                self.cursor += 1;
                let value: i64 = token.text.parse().unwrap_or(0);
                Some(Node::new(location, NodeKind::Int(value)))
            }
            TokenKind::Str => {
                self.cursor += 1;
                // One-character strings are character literals
                let mut chars = token.text.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Some(Node::new(location, NodeKind::Char(c))),
                    _ => Some(Node::new(location, NodeKind::Str(token.text))),
                }
            }
            TokenKind::Bool => {
                self.cursor += 1;
                Some(Node::new(location, NodeKind::Bool(token.text == "true")))
            }
            TokenKind::None => {
                self.cursor += 1;
                if !self.expect(TokenKind::Less) {
                    return None;
                }
                let ty = self.parse_datatype();
                if !self.expect(TokenKind::Greater) {
                    return None;
                }
                Some(Node::new(location, NodeKind::NoneLit(ty)))
            }
            _ => {
                self.throw("Token is not a literal");
                None
            }
        }
    }

    /// Array = "[" ( Expression { "," Expression } | "::" Datatype ) "]" .
    fn parse_array(&mut self) -> Option<Node> {
        let location = self.location();
        self.cursor += 1; // '['

        // Doublecolon initializer: [::int] is an empty array of int
        if self.check(TokenKind::DoubleColon) {
            self.cursor += 1;
            let ty = self.parse_datatype();
            if !self.check(TokenKind::RBracket) {
                self.throw("Expected closing bracket");
                return None;
            }
            self.cursor += 1;
            return Some(Node::new(location, NodeKind::Array { elements: vec![], ty }));
        }

        if self.check(TokenKind::RBracket) {
            self.throw("Initialized array with no elements");
            return None;
        }

        let mut elements = Vec::new();
        while !self.check(TokenKind::RBracket) {
            let expr = self.parse_expression()?;
            elements.push(expr);
            if self.check(TokenKind::Comma) {
                self.cursor += 1;
            } else {
                break;
            }
        }
        if !self.expect(TokenKind::RBracket) {
            return None;
        }

        let ty = self.context.null_type();
        Some(Node::new(location, NodeKind::Array { elements, ty }))
    }

    fn check_literal(&self) -> bool {
        self.peek(0).is_some_and(|t| {
            matches!(
                t.kind,
                TokenKind::Int
                    | TokenKind::Float
                    | TokenKind::Str
                    | TokenKind::Bool
                    | TokenKind::None
                    | TokenKind::LBracket
            )
        })
    }

    fn parse_literal(&mut self) -> Option<Node> {
        if self.check(TokenKind::LBracket) {
            self.parse_array()
        } else {
            self.parse_simple_literal()
        }
    }

    /// Call = Callee "(" [ Expression { "," Expression } ] ")" .
    fn parse_call(&mut self, callee: Node) -> Option<Node> {
        let location = callee.location;
        if !matches!(callee.kind, NodeKind::Ident(_) | NodeKind::Subscript { .. }) {
            self.throw("Function callee has to be an identifier");
            return None;
        }

        let mut args = Vec::new();
        while !self.check(TokenKind::RParen) {
            let expr = self.parse_expression()?;
            args.push(expr);
            if self.check(TokenKind::Comma) {
                self.cursor += 1;
            } else {
                break;
            }
        }
        if !self.check(TokenKind::RParen) {
            self.throw("Expected closing parenthesis");
            return None;
        }
        self.cursor += 1;

        let call = Node::new(location, NodeKind::Call { callee: Box::new(callee), args });
        self.parse_suffix(call)
    }

    /// Subscript = Expression "[" Expression "]" .
    fn parse_subscript(&mut self, expr: Node) -> Option<Node> {
        let location = expr.location;
        let key = self.parse_expression()?;
        if !self.expect(TokenKind::RBracket) {
            return None;
        }

        let node = Node::new(
            location,
            NodeKind::Subscript { expr: Box::new(expr), key: Box::new(key) },
        );
        self.parse_suffix(node)
    }

    /// Sugared subscript: Expression "." Ident — the key is an identifier.
    fn parse_subscript_sugar(&mut self, expr: Node) -> Option<Node> {
        let location = expr.location;
        let Some(ident) = self.peek(0).cloned() else {
            self.throw("Subscript: Identifier expected");
            return None;
        };
        if ident.kind != TokenKind::Word {
            self.throw("Subscript: Identifier expected");
            return None;
        }
        self.cursor += 1;

        let key = Node::new(ident.location, NodeKind::Ident(ident.text));
        let node = Node::new(
            location,
            NodeKind::Subscript { expr: Box::new(expr), key: Box::new(key) },
        );
        self.parse_suffix(node)
    }

    /// Chain call/subscript/dot suffixes after a primary.
    fn parse_suffix(&mut self, node: Node) -> Option<Node> {
        match self.peek(0).map(|t| t.kind) {
            Some(TokenKind::LParen) => {
                self.cursor += 1;
                self.parse_call(node)
            }
            Some(TokenKind::LBracket) => {
                self.cursor += 1;
                self.parse_subscript(node)
            }
            Some(TokenKind::Dot) => {
                self.cursor += 1;
                self.parse_subscript_sugar(node)
            }
            _ => Some(node),
        }
    }

    fn parse_expression_primary(&mut self) -> Option<Node> {
        if self.check(TokenKind::Semicolon) {
            self.cursor += 1;
            return None;
        }

        let location = self.location();
        let token = self.peek(0)?.clone();
        let node = match token.kind {
            TokenKind::Word => {
                self.cursor += 1;
                Node::new(location, NodeKind::Ident(token.text))
            }
            TokenKind::LParen => {
                self.cursor += 1;
                let inner = self.parse_expression()?;
                if !self.check(TokenKind::RParen) {
                    self.throw("Expected closing parenthesis");
                    return None;
                }
                self.cursor += 1;
                inner
            }
            TokenKind::Add | TokenKind::Sub | TokenKind::Not | TokenKind::BitNot => {
                self.cursor += 1;
                let expr = self.parse_expression_primary()?;
                Node::new(
                    location,
                    NodeKind::Unary { op: token.kind, expr: Box::new(expr) },
                )
            }
            _ => {
                if self.check_literal() {
                    self.parse_literal()?
                } else {
                    self.throw(&format!("Expected expression, found '{}'", token.text));
                    return None;
                }
            }
        };

        self.parse_suffix(node)
    }

    /// Precedence climbing over binary operators.
    fn parse_expression_last(&mut self, mut lhs: Node, min_precedence: i32) -> Option<Node> {
        loop {
            let Some(op) = self.peek(0).map(|t| t.kind) else {
                return Some(lhs);
            };
            let prec = precedence(op);
            if prec < min_precedence {
                return Some(lhs);
            }
            self.cursor += 1;

            let Some(mut rhs) = self.parse_expression_primary() else {
                self.throw("Operator with missing second operand");
                return Some(lhs);
            };

            let next_prec = self.peek(0).map_or(-1, |t| precedence(t.kind));
            if prec < next_prec {
                rhs = self.parse_expression_last(rhs, prec + 1)?;
            }

            // A literal int besides a literal float becomes a float, so the
            // operands agree before lowering sees them
            if let (NodeKind::Float(_), NodeKind::Int(n)) = (&lhs.kind, &rhs.kind) {
                rhs.kind = NodeKind::Float(*n as f64);
            } else if let (NodeKind::Int(n), NodeKind::Float(_)) = (&lhs.kind, &rhs.kind) {
                lhs.kind = NodeKind::Float(*n as f64);
            }

            let location = lhs.location;
            lhs = Node::new(
                location,
                NodeKind::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) },
            );
        }
    }

    /// Expression = Primary { Operator Primary } .
    fn parse_expression(&mut self) -> Option<Node> {
        let lhs = self.parse_expression_primary()?;
        if self.check(TokenKind::Semicolon) {
            return Some(lhs);
        }
        self.parse_expression_last(lhs, 0)
    }

    // =========================================================================
    // Statements
    // =========================================================================

    /// Formals = "(" [ [ "mut" ] word ":" Datatype { "," … } ] ")" .
    fn parse_formals(&mut self) -> Vec<Node> {
        let mut formals = Vec::new();
        if !self.expect(TokenKind::LParen) {
            return formals;
        }

        while !self.check(TokenKind::RParen) {
            let mut mutable = false;
            if self.check(TokenKind::Mut) {
                self.cursor += 1;
                mutable = true;
            }

            let location = self.location();
            if !self.check(TokenKind::Word) {
                self.throw("Invalid argument list");
                return formals;
            }
            let name = self.advance().unwrap().text;

            if !self.expect(TokenKind::Colon) {
                return formals;
            }
            let ty = self.parse_datatype();

            formals.push(Node::new(
                location,
                NodeKind::DeclVar(VarDecl { name, mutable, initializer: None, ty }),
            ));

            if self.check(TokenKind::Comma) {
                self.cursor += 1;
            } else if !self.check(TokenKind::RParen) {
                self.throw("Expected seperator");
                return formals;
            }
        }

        self.expect(TokenKind::RParen);
        formals
    }

    /// Block = "{" { Statement } "}" .
    fn parse_block_stmts(&mut self) -> Vec<Node> {
        let mut statements = Vec::new();
        if !self.check(TokenKind::LBrace) {
            self.throw("Expected opening brace");
            return statements;
        }
        self.cursor += 1;

        while !self.check(TokenKind::RBrace) && !self.error {
            if self.at_end() {
                self.throw("Block not closed, reached end");
                return statements;
            }
            match self.parse_stmt() {
                Some(stmt) => statements.push(stmt),
                None => return statements,
            }
        }

        if !self.error {
            self.expect(TokenKind::RBrace);
        }
        statements
    }

    /// Import = "using" ( word | string ) .
    fn parse_import(&mut self, location: Location) -> Option<Node> {
        self.cursor += 1;
        let token = self.peek(0).cloned();
        match token {
            Some(t) if t.kind == TokenKind::Word || t.kind == TokenKind::Str => {
                self.cursor += 1;
                Some(Node::new(location, NodeKind::Import(t.text)))
            }
            _ => {
                self.throw("Malformed import statement");
                None
            }
        }
    }

    /// Variable = "let" [ "mut" ] word "=" Expression .
    fn parse_var_decl(&mut self, location: Location) -> Option<Node> {
        self.cursor += 1;

        let mut mutable = false;
        if self.check(TokenKind::Mut) {
            self.cursor += 1;
            mutable = true;
        }

        let is_decl = self.check(TokenKind::Word)
            && self.peek(1).is_some_and(|t| t.kind == TokenKind::Equal);
        if !is_decl {
            self.throw("Malformed variable declaration");
            return None;
        }

        let name = self.advance().unwrap().text;
        self.cursor += 1; // '='

        let Some(initializer) = self.parse_expression() else {
            self.throw("Invalid or missing variable initializer");
            return None;
        };

        let ty = self.context.null_type();
        Some(Node::new(
            location,
            NodeKind::DeclVar(VarDecl {
                name,
                mutable,
                initializer: Some(Box::new(initializer)),
                ty,
            }),
        ))
    }

    /// Function = "func" word Formals [ "->" Datatype ] Block .
    fn parse_fn_decl(&mut self, location: Location) -> Option<Node> {
        self.cursor += 1;

        if !self.check(TokenKind::Word) {
            self.throw("Malformed function declaration");
            return None;
        }
        let name = self.advance().unwrap().text;
        let formals = self.parse_formals();

        let rettype = if self.check(TokenKind::LBrace) {
            // No arrow: the function is void
            self.context.void_type()
        } else if self.check(TokenKind::Arrow) {
            self.cursor += 1;
            self.parse_datatype()
        } else {
            self.throw("Return type expected");
            return None;
        };

        let body = self.parse_block_stmts();
        Some(Node::new(
            location,
            NodeKind::DeclFunc(FuncDecl { name, formals, body, rettype, external: 0 }),
        ))
    }

    /// If = "if" Expression Block { "else" "if" Expression Block } [ "else" Block ] .
    fn parse_if(&mut self, location: Location) -> Option<Node> {
        let mut clauses = Vec::new();

        while self.check(TokenKind::If)
            || (self.check(TokenKind::Else) && self.peek(1).is_some_and(|t| t.kind == TokenKind::If))
        {
            let clause_location = self.location();
            self.cursor += if self.check(TokenKind::If) { 1 } else { 2 };

            let cond = self.parse_expression()?;
            let body = self.parse_block_stmts();
            clauses.push(Node::new(
                clause_location,
                NodeKind::IfClause(IfClause { cond: Some(Box::new(cond)), body }),
            ));
        }

        if self.check(TokenKind::Else) {
            let clause_location = self.location();
            self.cursor += 1;
            let body = self.parse_block_stmts();
            clauses.push(Node::new(
                clause_location,
                NodeKind::IfClause(IfClause { cond: None, body }),
            ));
        }

        Some(Node::new(location, NodeKind::If(clauses)))
    }

    /// While = "while" Expression Block .
    fn parse_while(&mut self, location: Location) -> Option<Node> {
        self.cursor += 1;
        let cond = self.parse_expression()?;
        let body = self.parse_block_stmts();
        Some(Node::new(location, NodeKind::While { cond: Box::new(cond), body }))
    }

    /// Class = "type" word Formals Block .
    fn parse_class(&mut self, location: Location) -> Option<Node> {
        self.cursor += 1;

        if !self.check(TokenKind::Word) {
            self.throw("Malformed class declaration");
            return None;
        }
        let name = self.advance().unwrap().text;
        let formals = self.parse_formals();
        let body = self.parse_block_stmts();

        Some(Node::new(location, NodeKind::Class(ClassDecl { name, formals, body })))
    }

    /// Return = "return" [ Expression ] .
    fn parse_return(&mut self, location: Location) -> Option<Node> {
        self.cursor += 1;
        if self.check(TokenKind::Semicolon) || self.check(TokenKind::RBrace) {
            Some(Node::new(location, NodeKind::Return(None)))
        } else {
            let expr = self.parse_expression()?;
            Some(Node::new(location, NodeKind::Return(Some(Box::new(expr)))))
        }
    }

    /// Annotation = "@" ( "Getter" | "Setter" | "Unused" ) .
    fn parse_annotation(&mut self, location: Location) -> Option<Node> {
        let content = self.peek(1).cloned();
        match content {
            Some(t) if t.kind == TokenKind::Word => {
                self.cursor += 2;
                let annotation = match t.text.as_str() {
                    "Getter" => Annotation::Getter,
                    "Setter" => Annotation::Setter,
                    "Unused" => Annotation::Unused,
                    _ => {
                        self.throw("Unknown annotation type");
                        return None;
                    }
                };
                Some(Node::new(location, NodeKind::Annotation(annotation)))
            }
            _ => {
                self.throw("Malformed annotation");
                None
            }
        }
    }

    fn parse_stmt(&mut self) -> Option<Node> {
        let location = self.location();

        let keyword = self.peek(0).map(|t| t.kind);
        let node = match keyword {
            Some(TokenKind::Using) => self.parse_import(location),
            Some(TokenKind::Let) => self.parse_var_decl(location),
            Some(TokenKind::Func) => self.parse_fn_decl(location),
            Some(TokenKind::If) => self.parse_if(location),
            Some(TokenKind::While) => self.parse_while(location),
            Some(TokenKind::Type) => self.parse_class(location),
            Some(TokenKind::Return) => self.parse_return(location),
            Some(TokenKind::At) => self.parse_annotation(location),
            Some(TokenKind::Else) => {
                self.throw("If-clause error: No beginning if-statement / Else-if out of if-chain");
                return None;
            }
            _ => {
                // Plain expression statement
                let node = self.parse_expression();
                if node.is_none() {
                    let text = self.current_text();
                    self.throw(&format!("Could not interpret token '{}'", text));
                    return None;
                }
                node
            }
        };

        let node = node?;
        self.expect_terminator();
        Some(node)
    }
}
