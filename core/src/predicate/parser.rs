//! Recursive descent parser for predicate bodies

use super::ast::*;
use super::lexer::{tokenize, Spanned, Token};
use super::SyntaxError;
use regex::RegexBuilder;

const MAX_DEPTH: usize = 64;

const UNSUPPORTED_STATEMENTS: &[&str] = &[
    "for", "while", "do", "switch", "try", "throw", "class", "function", "break", "continue",
    "delete", "import", "export", "await", "yield", "with",
];

/// Parse generated code into a program over a single row parameter.
///
/// Accepts a function body, a bare expression (treated as its own return
/// value), `function (row) { ... }`, and arrow functions.
pub fn parse_program(source: &str) -> Result<Program, SyntaxError> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(SyntaxError::new("empty predicate", 0));
    }

    let mut parser = Parser::new(tokens, source.len());
    let program = parser.parse_wrapped()?;
    if let Some(token) = parser.peek_spanned() {
        return Err(SyntaxError::new(
            format!("unexpected {}", describe(&token.token)),
            token.offset,
        ));
    }
    Ok(program)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
    end: usize,
}

impl Parser {
    fn new(tokens: Vec<Spanned>, end: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
            end,
        }
    }

    fn peek_spanned(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Token> {
        self.tokens.get(self.pos + ahead).map(|s| &s.token)
    }

    fn peek(&self) -> Option<&Token> {
        self.peek_at(0)
    }

    fn offset(&self) -> usize {
        self.peek_spanned().map(|s| s.offset).unwrap_or(self.end)
    }

    fn is_punct(&self, punct: &str) -> bool {
        matches!(self.peek(), Some(Token::Punct(p)) if *p == punct)
    }

    fn is_word(&self, word: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(name)) if name == word)
    }

    fn eat_punct(&mut self, punct: &str) -> bool {
        if self.is_punct(punct) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_word(&mut self, word: &str) -> bool {
        if self.is_word(word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, punct: &str) -> Result<(), SyntaxError> {
        if self.eat_punct(punct) {
            return Ok(());
        }
        Err(self.error(format!("expected '{punct}'")))
    }

    fn expect_ident(&mut self) -> Result<String, SyntaxError> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.error("expected identifier")),
        }
    }

    fn error<S: Into<String>>(&self, message: S) -> SyntaxError {
        let found = match self.peek() {
            Some(token) => describe(token),
            None => "end of input".to_string(),
        };
        SyntaxError::new(format!("{}, found {found}", message.into()), self.offset())
    }

    fn enter(&mut self) -> Result<(), SyntaxError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(SyntaxError::new("expression nested too deeply", self.offset()));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    // Wrappers

    fn parse_wrapped(&mut self) -> Result<Program, SyntaxError> {
        // function [name] (param) { body }
        if self.is_word("function") {
            self.pos += 1;
            if matches!(self.peek(), Some(Token::Ident(_))) {
                self.pos += 1;
            }
            self.expect_punct("(")?;
            let param = self.parse_optional_param()?;
            self.expect_punct(")")?;
            let body = self.parse_block_body()?;
            self.eat_punct(";");
            return Ok(Program { param, body });
        }

        // param => ...
        if matches!(self.peek(), Some(Token::Ident(_)))
            && matches!(self.peek_at(1), Some(Token::Punct("=>")))
        {
            let param = self.expect_ident()?;
            self.pos += 1;
            return self.parse_arrow_body(param);
        }

        // (param) => ... or () => ...
        if self.is_punct("(") {
            let shape = (self.peek_at(1), self.peek_at(2), self.peek_at(3));
            match shape {
                (Some(Token::Ident(_)), Some(Token::Punct(")")), Some(Token::Punct("=>"))) => {
                    self.pos += 1;
                    let param = self.expect_ident()?;
                    self.pos += 2;
                    return self.parse_arrow_body(param);
                }
                (Some(Token::Punct(")")), Some(Token::Punct("=>")), _) => {
                    self.pos += 3;
                    return self.parse_arrow_body("row".to_string());
                }
                _ => {}
            }
        }

        let has_return = self
            .tokens
            .iter()
            .any(|s| matches!(&s.token, Token::Ident(name) if name == "return"));
        let body = if has_return {
            let mut body = self.parse_statements(None)?;
            // `return` only appeared inside a callback; the lone expression is the result
            if let [Stmt::Expr(_)] = body.as_slice() {
                if let Some(Stmt::Expr(expr)) = body.pop() {
                    body.push(Stmt::Return(Some(expr)));
                }
            }
            body
        } else {
            let expr = self.parse_expression()?;
            while self.eat_punct(";") {}
            vec![Stmt::Return(Some(expr))]
        };
        Ok(Program {
            param: "row".to_string(),
            body,
        })
    }

    fn parse_optional_param(&mut self) -> Result<String, SyntaxError> {
        if self.is_punct(")") {
            return Ok("row".to_string());
        }
        self.expect_ident()
    }

    fn parse_arrow_body(&mut self, param: String) -> Result<Program, SyntaxError> {
        let body = if self.is_punct("{") {
            self.parse_block_body()?
        } else {
            vec![Stmt::Return(Some(self.parse_expression()?))]
        };
        while self.eat_punct(";") {}
        Ok(Program { param, body })
    }

    fn parse_block_body(&mut self) -> Result<Vec<Stmt>, SyntaxError> {
        self.expect_punct("{")?;
        let body = self.parse_statements(Some("}"))?;
        self.expect_punct("}")?;
        Ok(body)
    }

    // Statements

    fn parse_statements(&mut self, terminator: Option<&str>) -> Result<Vec<Stmt>, SyntaxError> {
        let mut body = Vec::new();
        loop {
            match (self.peek(), terminator) {
                (None, _) => break,
                (Some(Token::Punct(p)), Some(end)) if *p == end => break,
                _ => body.push(self.parse_statement()?),
            }
        }
        Ok(body)
    }

    fn parse_statement(&mut self) -> Result<Stmt, SyntaxError> {
        self.enter()?;
        let stmt = self.parse_statement_inner();
        self.leave();
        stmt
    }

    fn parse_statement_inner(&mut self) -> Result<Stmt, SyntaxError> {
        if self.eat_punct(";") {
            return Ok(Stmt::Empty);
        }

        if self.is_punct("{") {
            return Ok(Stmt::Block(self.parse_block_body()?));
        }

        if self.eat_word("return") {
            if self.eat_punct(";") || self.is_punct("}") || self.peek().is_none() {
                return Ok(Stmt::Return(None));
            }
            let expr = self.parse_expression()?;
            self.end_statement()?;
            return Ok(Stmt::Return(Some(expr)));
        }

        if self.is_word("const") || self.is_word("let") || self.is_word("var") {
            self.pos += 1;
            let name = self.expect_ident()?;
            let init = if self.eat_punct("=") {
                Some(self.parse_expression()?)
            } else {
                None
            };
            if self.is_punct(",") {
                return Err(self.error("multiple declarations in one statement are not supported"));
            }
            self.end_statement()?;
            return Ok(Stmt::Declare { name, init });
        }

        if self.eat_word("if") {
            self.expect_punct("(")?;
            let test = self.parse_expression()?;
            self.expect_punct(")")?;
            let then = Box::new(self.parse_statement()?);
            let otherwise = if self.eat_word("else") {
                Some(Box::new(self.parse_statement()?))
            } else {
                None
            };
            return Ok(Stmt::If {
                test,
                then,
                otherwise,
            });
        }

        if let Some(Token::Ident(word)) = self.peek() {
            if UNSUPPORTED_STATEMENTS.contains(&word.as_str()) {
                return Err(self.error(format!("'{word}' is not supported")));
            }
        }

        let expr = self.parse_expression()?;
        if self.is_punct("=") {
            return Err(self.error("assignment is not supported"));
        }
        self.end_statement()?;
        Ok(Stmt::Expr(expr))
    }

    /// Semicolons are optional before `}` and at end of input
    fn end_statement(&mut self) -> Result<(), SyntaxError> {
        if self.eat_punct(";") || self.is_punct("}") || self.peek().is_none() {
            return Ok(());
        }
        // A new statement on the following line also ends this one
        if matches!(self.peek(), Some(Token::Ident(name)) if is_statement_keyword(name)) {
            return Ok(());
        }
        Err(self.error("expected ';'"))
    }

    // Expressions

    fn parse_expression(&mut self) -> Result<Expr, SyntaxError> {
        self.enter()?;
        let expr = self.parse_conditional();
        self.leave();
        expr
    }

    fn parse_conditional(&mut self) -> Result<Expr, SyntaxError> {
        let test = self.parse_or()?;
        if !self.eat_punct("?") {
            return Ok(test);
        }
        let consequent = self.parse_expression()?;
        self.expect_punct(":")?;
        let alternate = self.parse_expression()?;
        Ok(Expr::Conditional {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
        })
    }

    fn parse_or(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_and()?;
        loop {
            let op = if self.eat_punct("||") {
                LogicalOp::Or
            } else if self.eat_punct("??") {
                LogicalOp::Nullish
            } else {
                break;
            };
            let right = self.parse_and()?;
            left = Expr::Logical {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_equality()?;
        while self.eat_punct("&&") {
            let right = self.parse_equality()?;
            left = Expr::Logical {
                op: LogicalOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_binary_level(
        &mut self,
        operators: &[(&str, BinaryOp)],
        next: fn(&mut Self) -> Result<Expr, SyntaxError>,
    ) -> Result<Expr, SyntaxError> {
        let mut left = next(self)?;
        'outer: loop {
            for (punct, op) in operators {
                if self.eat_punct(punct) {
                    let right = next(self)?;
                    left = Expr::Binary {
                        op: *op,
                        left: Box::new(left),
                        right: Box::new(right),
                    };
                    continue 'outer;
                }
            }
            break;
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, SyntaxError> {
        self.parse_binary_level(
            &[
                ("===", BinaryOp::StrictEq),
                ("!==", BinaryOp::StrictNe),
                ("==", BinaryOp::LooseEq),
                ("!=", BinaryOp::LooseNe),
            ],
            Self::parse_relational,
        )
    }

    fn parse_relational(&mut self) -> Result<Expr, SyntaxError> {
        self.parse_binary_level(
            &[
                ("<=", BinaryOp::Le),
                (">=", BinaryOp::Ge),
                ("<", BinaryOp::Lt),
                (">", BinaryOp::Gt),
            ],
            Self::parse_additive,
        )
    }

    fn parse_additive(&mut self) -> Result<Expr, SyntaxError> {
        self.parse_binary_level(
            &[("+", BinaryOp::Add), ("-", BinaryOp::Sub)],
            Self::parse_multiplicative,
        )
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, SyntaxError> {
        self.parse_binary_level(
            &[
                ("*", BinaryOp::Mul),
                ("/", BinaryOp::Div),
                ("%", BinaryOp::Rem),
            ],
            Self::parse_unary,
        )
    }

    fn parse_unary(&mut self) -> Result<Expr, SyntaxError> {
        let op = if self.eat_punct("!") {
            UnaryOp::Not
        } else if self.eat_punct("-") {
            UnaryOp::Negate
        } else if self.eat_punct("+") {
            UnaryOp::Plus
        } else if self.eat_word("typeof") {
            UnaryOp::TypeOf
        } else {
            return self.parse_postfix();
        };

        self.enter()?;
        let expr = self.parse_unary();
        self.leave();
        Ok(Expr::Unary {
            op,
            expr: Box::new(expr?),
        })
    }

    fn parse_postfix(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat_punct(".") {
                let name = self.expect_ident()?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    property: Property::Named(name),
                    optional: false,
                };
            } else if self.eat_punct("?.") {
                expr = if self.eat_punct("[") {
                    let index = self.parse_expression()?;
                    self.expect_punct("]")?;
                    Expr::Member {
                        object: Box::new(expr),
                        property: Property::Computed(Box::new(index)),
                        optional: true,
                    }
                } else if self.eat_punct("(") {
                    Expr::Call {
                        callee: Box::new(expr),
                        args: self.parse_arguments()?,
                        optional: true,
                    }
                } else {
                    let name = self.expect_ident()?;
                    Expr::Member {
                        object: Box::new(expr),
                        property: Property::Named(name),
                        optional: true,
                    }
                };
            } else if self.eat_punct("[") {
                let index = self.parse_expression()?;
                self.expect_punct("]")?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    property: Property::Computed(Box::new(index)),
                    optional: false,
                };
            } else if self.eat_punct("(") {
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args: self.parse_arguments()?,
                    optional: false,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    /// Arguments after an already consumed `(`
    fn parse_arguments(&mut self) -> Result<Vec<Expr>, SyntaxError> {
        self.parse_list(")", true)
    }

    fn parse_list(&mut self, close: &str, allow_callbacks: bool) -> Result<Vec<Expr>, SyntaxError> {
        let mut items = Vec::new();
        if self.eat_punct(close) {
            return Ok(items);
        }
        loop {
            let callback = if allow_callbacks {
                self.parse_callback()?
            } else {
                None
            };
            match callback {
                Some(arrow) => items.push(arrow),
                None => items.push(self.parse_expression()?),
            }
            if self.eat_punct(close) {
                return Ok(items);
            }
            self.expect_punct(",")?;
            // trailing comma
            if self.eat_punct(close) {
                return Ok(items);
            }
        }
    }

    /// `x => ...`, `(x) => ...`, `(x, i) => ...` or `() => ...` in argument position
    fn parse_callback(&mut self) -> Result<Option<Expr>, SyntaxError> {
        if matches!(self.peek(), Some(Token::Ident(_)))
            && matches!(self.peek_at(1), Some(Token::Punct("=>")))
        {
            let param = self.expect_ident()?;
            self.pos += 1;
            return self.parse_callback_body(vec![param]).map(Some);
        }
        let Some(params_len) = self.arrow_params_len() else {
            return Ok(None);
        };

        self.pos += 1;
        let mut params = Vec::with_capacity(params_len);
        while !self.eat_punct(")") {
            params.push(self.expect_ident()?);
            self.eat_punct(",");
        }
        self.expect_punct("=>")?;
        self.parse_callback_body(params).map(Some)
    }

    /// Number of parameters when the tokens at the cursor open an arrow parameter list
    fn arrow_params_len(&self) -> Option<usize> {
        if !self.is_punct("(") {
            return None;
        }
        let mut ahead = 1;
        let mut count = 0;
        loop {
            match self.peek_at(ahead) {
                Some(Token::Punct(")")) => break,
                Some(Token::Ident(_)) => {
                    count += 1;
                    ahead += 1;
                    match self.peek_at(ahead) {
                        Some(Token::Punct(",")) => ahead += 1,
                        Some(Token::Punct(")")) => break,
                        _ => return None,
                    }
                }
                _ => return None,
            }
        }
        matches!(self.peek_at(ahead + 1), Some(Token::Punct("=>"))).then_some(count)
    }

    fn parse_callback_body(&mut self, params: Vec<String>) -> Result<Expr, SyntaxError> {
        self.enter()?;
        let body = if self.is_punct("{") {
            self.parse_block_body()
        } else {
            self.parse_expression().map(|expr| vec![Stmt::Return(Some(expr))])
        };
        self.leave();
        Ok(Expr::Arrow { params, body: body? })
    }

    fn parse_primary(&mut self) -> Result<Expr, SyntaxError> {
        let Some(spanned) = self.peek_spanned().cloned() else {
            return Err(self.error("expected expression"));
        };

        match spanned.token {
            Token::Number(n) => {
                self.pos += 1;
                Ok(Expr::Literal(Literal::Number(n)))
            }
            Token::Str(s) => {
                self.pos += 1;
                Ok(Expr::Literal(Literal::Str(s)))
            }
            Token::Regex { pattern, flags } => {
                self.pos += 1;
                compile_regex(&pattern, &flags)
                    .map(Expr::Regex)
                    .map_err(|message| SyntaxError::new(message, spanned.offset))
            }
            Token::Punct("(") => {
                self.pos += 1;
                let expr = self.parse_expression()?;
                self.expect_punct(")")?;
                Ok(expr)
            }
            Token::Punct("[") => {
                self.pos += 1;
                self.enter()?;
                let items = self.parse_list("]", false);
                self.leave();
                Ok(Expr::Array(items?))
            }
            Token::Ident(name) => {
                self.pos += 1;
                match name.as_str() {
                    "true" => Ok(Expr::Literal(Literal::Bool(true))),
                    "false" => Ok(Expr::Literal(Literal::Bool(false))),
                    "null" => Ok(Expr::Literal(Literal::Null)),
                    "undefined" => Ok(Expr::Literal(Literal::Undefined)),
                    "new" => {
                        let class = self.expect_ident()?;
                        let args = if self.eat_punct("(") {
                            self.parse_arguments()?
                        } else {
                            Vec::new()
                        };
                        Ok(Expr::New { class, args })
                    }
                    "return" | "const" | "let" | "var" | "if" | "else" => Err(SyntaxError::new(
                        format!("unexpected keyword '{name}'"),
                        spanned.offset,
                    )),
                    _ => Ok(Expr::Ident(name)),
                }
            }
            other => Err(SyntaxError::new(
                format!("unexpected {}", describe(&other)),
                spanned.offset,
            )),
        }
    }
}

fn is_statement_keyword(word: &str) -> bool {
    matches!(word, "return" | "const" | "let" | "var" | "if")
}

/// Translate a JavaScript regex literal into a compiled pattern
pub(crate) fn compile_regex(pattern: &str, flags: &str) -> Result<RegexLiteral, String> {
    let mut builder = RegexBuilder::new(&pattern.replace("\\/", "/"));
    let mut global = false;
    for flag in flags.chars() {
        match flag {
            'i' => {
                builder.case_insensitive(true);
            }
            'm' => {
                builder.multi_line(true);
            }
            's' => {
                builder.dot_matches_new_line(true);
            }
            'g' => global = true,
            'u' | 'y' | 'd' => {}
            other => return Err(format!("invalid regular expression flag '{other}'")),
        }
    }
    let regex = builder
        .build()
        .map_err(|e| format!("invalid regular expression: {e}"))?;
    Ok(RegexLiteral { regex, global })
}

fn describe(token: &Token) -> String {
    match token {
        Token::Number(n) => format!("number {n}"),
        Token::Str(s) => format!("string '{s}'"),
        Token::Ident(name) => format!("'{name}'"),
        Token::Regex { pattern, .. } => format!("regex /{pattern}/"),
        Token::Punct(p) => format!("'{p}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(source: &str) -> Vec<Stmt> {
        parse_program(source).expect("should parse").body
    }

    #[test]
    fn test_function_body() {
        let stmts = body("const val = parseFloat(row['Revenue']); return !isNaN(val) && val > 50000;");
        assert_eq!(stmts.len(), 2);
        assert!(matches!(&stmts[0], Stmt::Declare { name, init: Some(_) } if name == "val"));
        assert!(matches!(&stmts[1], Stmt::Return(Some(Expr::Logical { op: LogicalOp::And, .. }))));
    }

    #[test]
    fn test_bare_expression_becomes_return() {
        let stmts = body("row['Price'] > 100");
        assert!(matches!(&stmts[0], Stmt::Return(Some(Expr::Binary { op: BinaryOp::Gt, .. }))));
    }

    #[test]
    fn test_wrapper_forms_bind_parameter() {
        assert_eq!(parse_program("function (r) { return r.a; }").unwrap().param, "r");
        assert_eq!(parse_program("item => item.a > 1").unwrap().param, "item");
        assert_eq!(parse_program("(x) => { return true; }").unwrap().param, "x");
        assert_eq!(parse_program("return true;").unwrap().param, "row");
    }

    #[test]
    fn test_precedence() {
        let stmts = body("return 1 + 2 * 3 === 7 || false;");
        let Stmt::Return(Some(Expr::Logical { op, left, .. })) = &stmts[0] else {
            panic!("expected logical or");
        };
        assert_eq!(*op, LogicalOp::Or);
        assert!(matches!(left.as_ref(), Expr::Binary { op: BinaryOp::StrictEq, .. }));
    }

    #[test]
    fn test_if_else_and_optional_chaining() {
        let stmts = body("if (row?.['Qty'] == null) return false; else { return true }");
        assert!(matches!(&stmts[0], Stmt::If { otherwise: Some(_), .. }));
    }

    #[test]
    fn test_syntax_errors() {
        assert!(parse_program("return (row['a'] > ;").is_err());
        assert!(parse_program("for (;;) {}").is_err());
        assert!(parse_program("x = 1; return x;").is_err());
        assert!(parse_program("").is_err());
        assert!(parse_program("return /[/;").is_err());
        assert!(parse_program("return true; }").is_err());
    }

    #[test]
    fn test_callback_arguments() {
        let stmts = body("return ['a', 'b'].some((t, i) => row.Name.includes(t) && i < 2);");
        let Stmt::Return(Some(Expr::Call { args, .. })) = &stmts[0] else {
            panic!("expected call");
        };
        let Expr::Arrow { params, body } = &args[0] else {
            panic!("expected arrow callback");
        };
        assert_eq!(params, &["t".to_string(), "i".to_string()]);
        assert!(matches!(body.as_slice(), [Stmt::Return(Some(_))]));

        assert!(parse_program("return [x => x];").is_err());
        assert!(parse_program("return f((a, 1) => a);").is_err());
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("return {}1{};", "(".repeat(200), ")".repeat(200));
        let err = parse_program(&deep).unwrap_err();
        assert!(err.message.contains("nested too deeply"));
    }
}
