//! Tree-walking evaluation of a parsed predicate against a single row

use super::ast::*;
use super::value::*;
use super::PredicateFault;
use crate::data::Row;
use chrono::{Datelike, NaiveDate, Timelike};
use regex::{NoExpand, Regex, RegexBuilder};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::HashMap;

type Eval<T> = Result<T, PredicateFault>;

/// Global objects whose members can be called as `Math.max(...)`
const NAMESPACES: &[&str] = &["Math", "Number", "Date", "Array", "Object", "String"];

enum Flow<'a> {
    Normal,
    Return(Value<'a>),
}

pub(crate) struct Interpreter<'a> {
    program: &'a Program,
    row: &'a Row,
    now_ms: f64,
    scopes: Vec<HashMap<&'a str, Value<'a>>>,
}

impl<'a> Interpreter<'a> {
    pub(crate) fn new(program: &'a Program, row: &'a Row, now_ms: f64) -> Self {
        Self {
            program,
            row,
            now_ms,
            scopes: Vec::new(),
        }
    }

    /// Run the program; falling off the end yields `undefined`
    pub(crate) fn run(mut self) -> Eval<Value<'a>> {
        let program = self.program;
        match self.exec_block(&program.body)? {
            Flow::Return(value) => Ok(value),
            Flow::Normal => Ok(Value::Undefined),
        }
    }

    fn exec_block(&mut self, stmts: &'a [Stmt]) -> Eval<Flow<'a>> {
        self.scopes.push(HashMap::new());
        let mut flow = Flow::Normal;
        for stmt in stmts {
            match self.exec(stmt) {
                Ok(Flow::Normal) => continue,
                Ok(returned) => {
                    flow = returned;
                    break;
                }
                Err(fault) => {
                    self.scopes.pop();
                    return Err(fault);
                }
            }
        }
        self.scopes.pop();
        Ok(flow)
    }

    fn exec(&mut self, stmt: &'a Stmt) -> Eval<Flow<'a>> {
        match stmt {
            Stmt::Declare { name, init } => {
                let value = match init {
                    Some(expr) => self.eval(expr)?,
                    None => Value::Undefined,
                };
                if let Some(scope) = self.scopes.last_mut() {
                    scope.insert(name.as_str(), value);
                }
                Ok(Flow::Normal)
            }
            Stmt::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval(expr)?,
                    None => Value::Undefined,
                };
                Ok(Flow::Return(value))
            }
            Stmt::If {
                test,
                then,
                otherwise,
            } => {
                if self.eval(test)?.truthy() {
                    self.exec_nested(then)
                } else if let Some(otherwise) = otherwise {
                    self.exec_nested(otherwise)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::Block(stmts) => self.exec_block(stmts),
            Stmt::Expr(expr) => {
                self.eval(expr)?;
                Ok(Flow::Normal)
            }
            Stmt::Empty => Ok(Flow::Normal),
        }
    }

    /// A branch of an `if` gets its own scope even without braces
    fn exec_nested(&mut self, stmt: &'a Stmt) -> Eval<Flow<'a>> {
        match stmt {
            Stmt::Block(stmts) => self.exec_block(stmts),
            other => self.exec_block(std::slice::from_ref(other)),
        }
    }

    fn lookup(&self, name: &str) -> Option<&Value<'a>> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    fn is_namespace(&self, name: &str) -> bool {
        NAMESPACES.contains(&name) && name != self.program.param && self.lookup(name).is_none()
    }

    pub(crate) fn eval(&mut self, expr: &'a Expr) -> Eval<Value<'a>> {
        Ok(self.eval_chain(expr)?.unwrap_or(Value::Undefined))
    }

    /// `None` means an optional chain short-circuited
    fn eval_chain(&mut self, expr: &'a Expr) -> Eval<Option<Value<'a>>> {
        match expr {
            Expr::Member {
                object,
                property,
                optional,
            } => {
                if let (Expr::Ident(ns), Property::Named(name)) = (object.as_ref(), property) {
                    if self.is_namespace(ns) {
                        return static_property(ns, name).map(Some);
                    }
                }
                let Some(target) = self.eval_chain(object)? else {
                    return Ok(None);
                };
                if *optional && target.is_nullish() {
                    return Ok(None);
                }
                let key = self.property_key(property)?;
                get_property(target, &key).map(Some)
            }
            Expr::Call {
                callee,
                args,
                optional,
            } => self.eval_call(callee, args, *optional),
            other => self.eval_simple(other).map(Some),
        }
    }

    fn property_key(&mut self, property: &'a Property) -> Eval<Cow<'a, str>> {
        match property {
            Property::Named(name) => Ok(Cow::Borrowed(name.as_str())),
            Property::Computed(expr) => {
                let key = self.eval(expr)?;
                Ok(Cow::Owned(key.to_js_string().into_owned()))
            }
        }
    }

    fn eval_args(&mut self, args: &'a [Expr]) -> Eval<Vec<Value<'a>>> {
        args.iter().map(|arg| self.eval(arg)).collect()
    }

    fn eval_call(
        &mut self,
        callee: &'a Expr,
        args: &'a [Expr],
        optional: bool,
    ) -> Eval<Option<Value<'a>>> {
        match callee {
            Expr::Member {
                object,
                property,
                optional: member_optional,
            } => {
                if let (Expr::Ident(ns), Property::Named(name)) = (object.as_ref(), property) {
                    if self.is_namespace(ns) {
                        let args = self.eval_args(args)?;
                        return self.call_static(ns, name, args).map(Some);
                    }
                }
                let Some(receiver) = self.eval_chain(object)? else {
                    return Ok(None);
                };
                if *member_optional && receiver.is_nullish() {
                    return Ok(None);
                }
                let name = self.property_key(property)?;
                if receiver.is_nullish() {
                    return Err(PredicateFault::new(format!(
                        "Cannot read properties of {} (reading '{name}')",
                        receiver.to_js_string()
                    )));
                }
                if let Some(Expr::Arrow { params, body }) = args.first() {
                    return self.call_with_callback(receiver, &name, params, body).map(Some);
                }
                let args = self.eval_args(args)?;
                match self.call_method(receiver, &name, args) {
                    Err(fault) if optional && fault.is_missing_method() => Ok(None),
                    other => other.map(Some),
                }
            }
            Expr::Ident(name) if name != &self.program.param && self.lookup(name).is_none() => {
                let args = self.eval_args(args)?;
                self.call_global(name, args).map(Some)
            }
            other => {
                let value = self.eval(other)?;
                if optional && value.is_nullish() {
                    return Ok(None);
                }
                Err(PredicateFault::new(format!(
                    "{} is not a function",
                    value.to_js_string()
                )))
            }
        }
    }

    fn eval_simple(&mut self, expr: &'a Expr) -> Eval<Value<'a>> {
        match expr {
            Expr::Literal(literal) => Ok(match literal {
                Literal::Number(n) => Value::Number(*n),
                Literal::Str(s) => Value::Str(Cow::Borrowed(s.as_str())),
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Null => Value::Null,
                Literal::Undefined => Value::Undefined,
            }),
            Expr::Regex(literal) => Ok(Value::Regex {
                regex: &literal.regex,
                global: literal.global,
            }),
            Expr::Array(items) => Ok(Value::Array(self.eval_args(items)?)),
            Expr::Ident(name) => self.resolve_ident(name),
            Expr::New { class, args } => {
                let args = self.eval_args(args)?;
                self.construct(class, args)
            }
            Expr::Unary { op, expr } => self.eval_unary(*op, expr),
            Expr::Binary { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                Ok(binary(*op, &left, &right))
            }
            Expr::Logical { op, left, right } => {
                let left = self.eval(left)?;
                let short_circuit = match op {
                    LogicalOp::And => !left.truthy(),
                    LogicalOp::Or => left.truthy(),
                    LogicalOp::Nullish => !left.is_nullish(),
                };
                if short_circuit {
                    Ok(left)
                } else {
                    self.eval(right)
                }
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test)?.truthy() {
                    self.eval(consequent)
                } else {
                    self.eval(alternate)
                }
            }
            Expr::Member { .. } | Expr::Call { .. } => self.eval(expr),
            Expr::Arrow { .. } => Err(PredicateFault::new(
                "Functions can only be passed to array methods",
            )),
        }
    }

    /// `some`, `every`, `find`, `findIndex`, `filter` and `map` with an inline callback
    fn call_with_callback(
        &mut self,
        receiver: Value<'a>,
        name: &str,
        params: &'a [String],
        body: &'a [Stmt],
    ) -> Eval<Value<'a>> {
        let items = match receiver {
            Value::Array(items) => items,
            other => return Err(not_a_function(other.type_name(), name)),
        };
        match name {
            "some" | "every" | "find" | "findIndex" => {
                let want = name != "every";
                for (index, item) in items.iter().enumerate() {
                    if self.invoke(params, body, item.clone(), index)?.truthy() == want {
                        return Ok(match name {
                            "find" => item.clone(),
                            "findIndex" => Value::Number(index as f64),
                            _ => Value::Bool(want),
                        });
                    }
                }
                Ok(match name {
                    "find" => Value::Undefined,
                    "findIndex" => Value::Number(-1.0),
                    _ => Value::Bool(!want),
                })
            }
            "filter" => {
                let mut kept = Vec::new();
                for (index, item) in items.into_iter().enumerate() {
                    if self.invoke(params, body, item.clone(), index)?.truthy() {
                        kept.push(item);
                    }
                }
                Ok(Value::Array(kept))
            }
            "map" => {
                let mut mapped = Vec::with_capacity(items.len());
                for (index, item) in items.into_iter().enumerate() {
                    mapped.push(self.invoke(params, body, item, index)?);
                }
                Ok(Value::Array(mapped))
            }
            _ => Err(not_a_function("array", name)),
        }
    }

    /// Run a callback body with its parameters bound to the element and its index
    fn invoke(
        &mut self,
        params: &'a [String],
        body: &'a [Stmt],
        item: Value<'a>,
        index: usize,
    ) -> Eval<Value<'a>> {
        let mut scope = HashMap::new();
        if let Some(param) = params.first() {
            scope.insert(param.as_str(), item);
        }
        if let Some(param) = params.get(1) {
            scope.insert(param.as_str(), Value::Number(index as f64));
        }
        self.scopes.push(scope);
        let flow = self.exec_block(body);
        self.scopes.pop();
        Ok(match flow? {
            Flow::Return(value) => value,
            Flow::Normal => Value::Undefined,
        })
    }

    fn resolve_ident(&self, name: &str) -> Eval<Value<'a>> {
        if name == self.program.param {
            if let Some(value) = self.lookup(name) {
                return Ok(value.clone());
            }
            return Ok(Value::Row(self.row));
        }
        if let Some(value) = self.lookup(name) {
            return Ok(value.clone());
        }
        match name {
            "NaN" => Ok(Value::Number(f64::NAN)),
            "Infinity" => Ok(Value::Number(f64::INFINITY)),
            _ => Err(PredicateFault::new(format!("{name} is not defined"))),
        }
    }

    fn eval_unary(&mut self, op: UnaryOp, expr: &'a Expr) -> Eval<Value<'a>> {
        if op == UnaryOp::TypeOf {
            if let Expr::Ident(name) = expr {
                return Ok(match self.resolve_ident(name) {
                    Ok(value) => Value::str(value.type_name()),
                    Err(_) => Value::str("undefined"),
                });
            }
        }

        let value = self.eval(expr)?;
        Ok(match op {
            UnaryOp::Not => Value::Bool(!value.truthy()),
            UnaryOp::Negate => Value::Number(-value.to_number()),
            UnaryOp::Plus => Value::Number(value.to_number()),
            UnaryOp::TypeOf => Value::str(value.type_name()),
        })
    }

    fn construct(&self, class: &str, args: Vec<Value<'a>>) -> Eval<Value<'a>> {
        match class {
            "Date" => Ok(Value::Date(self.make_date(&args))),
            "Number" => Ok(Value::Number(args.first().map(Value::to_number).unwrap_or(0.0))),
            "String" => Ok(Value::str(
                args.first()
                    .map(|v| v.to_js_string().into_owned())
                    .unwrap_or_default(),
            )),
            "Boolean" => Ok(Value::Bool(args.first().is_some_and(Value::truthy))),
            other => Err(PredicateFault::new(format!("{other} is not a constructor"))),
        }
    }

    fn make_date(&self, args: &[Value<'a>]) -> f64 {
        match args {
            [] => self.now_ms,
            [Value::Date(ms)] => *ms,
            [Value::Number(ms)] => *ms,
            [Value::Str(s)] => parse_date(s),
            [other] => other.to_number(),
            [year, month, rest @ ..] => {
                let part = |i: usize, default: f64| rest.get(i).map(Value::to_number).unwrap_or(default);
                date_from_parts(
                    year.to_number(),
                    month.to_number(),
                    part(0, 1.0),
                    part(1, 0.0),
                    part(2, 0.0),
                    part(3, 0.0),
                )
            }
        }
    }

    fn call_global(&self, name: &str, args: Vec<Value<'a>>) -> Eval<Value<'a>> {
        let first = args.first().cloned().unwrap_or(Value::Undefined);
        match name {
            "parseFloat" => Ok(Value::Number(parse_float(&first.to_js_string()))),
            "parseInt" => {
                // A missing, zero or non-finite radix means "detect"; anything else must fit 2..=36
                let radix = match args.get(1).map(Value::to_number).map(f64::trunc) {
                    Some(r) if r.is_finite() && r != 0.0 => match u32::try_from(r as i64) {
                        Ok(r) => Some(r),
                        Err(_) => return Ok(Value::Number(f64::NAN)),
                    },
                    _ => None,
                };
                Ok(Value::Number(parse_int(&first.to_js_string(), radix)))
            }
            "Number" => Ok(Value::Number(if args.is_empty() {
                0.0
            } else {
                first.to_number()
            })),
            "String" => Ok(if args.is_empty() {
                Value::str("")
            } else {
                Value::str(first.to_js_string().into_owned())
            }),
            "Boolean" => Ok(Value::Bool(first.truthy())),
            "isNaN" => Ok(Value::Bool(first.to_number().is_nan())),
            "isFinite" => Ok(Value::Bool(first.to_number().is_finite())),
            "Date" => Ok(Value::str(Value::Date(self.now_ms).to_js_string().into_owned())),
            other => match self.lookup(other) {
                Some(value) => Err(PredicateFault::new(format!(
                    "{other} is not a function ({})",
                    value.type_name()
                ))),
                None => Err(PredicateFault::new(format!("{other} is not defined"))),
            },
        }
    }

    fn call_static(&self, namespace: &str, name: &str, args: Vec<Value<'a>>) -> Eval<Value<'a>> {
        let numbers = || args.iter().map(Value::to_number).collect::<Vec<_>>();
        let first_number = args.first().map(Value::to_number).unwrap_or(f64::NAN);
        let value = match (namespace, name) {
            ("Math", "abs") => Value::Number(first_number.abs()),
            ("Math", "round") => Value::Number((first_number + 0.5).floor()),
            ("Math", "floor") => Value::Number(first_number.floor()),
            ("Math", "ceil") => Value::Number(first_number.ceil()),
            ("Math", "trunc") => Value::Number(first_number.trunc()),
            ("Math", "sqrt") => Value::Number(first_number.sqrt()),
            ("Math", "sign") => Value::Number(if first_number.is_nan() || first_number == 0.0 {
                first_number
            } else {
                first_number.signum()
            }),
            ("Math", "pow") => {
                let exponent = args.get(1).map(Value::to_number).unwrap_or(f64::NAN);
                Value::Number(first_number.powf(exponent))
            }
            ("Math", "min") => Value::Number(fold_extreme(numbers(), f64::INFINITY, f64::min)),
            ("Math", "max") => Value::Number(fold_extreme(numbers(), f64::NEG_INFINITY, f64::max)),
            ("Number", "isNaN") => {
                Value::Bool(matches!(args.first(), Some(Value::Number(n)) if n.is_nan()))
            }
            ("Number", "isFinite") => {
                Value::Bool(matches!(args.first(), Some(Value::Number(n)) if n.is_finite()))
            }
            ("Number", "isInteger") => Value::Bool(
                matches!(args.first(), Some(Value::Number(n)) if n.is_finite() && n.fract() == 0.0),
            ),
            ("Number", "parseFloat") | ("Number", "parseInt") => {
                return self.call_global(name, args);
            }
            ("Date", "now") => Value::Number(self.now_ms),
            ("Date", "parse") => Value::Number(parse_date(
                &args.first().cloned().unwrap_or(Value::Undefined).to_js_string(),
            )),
            ("Array", "isArray") => Value::Bool(matches!(args.first(), Some(Value::Array(_)))),
            ("Object", "keys") => match args.first() {
                Some(Value::Row(row)) => Value::Array(
                    row.keys()
                        .map(|k| Value::Str(Cow::Borrowed(k.as_str())))
                        .collect(),
                ),
                Some(value) if value.is_nullish() => {
                    return Err(PredicateFault::new(
                        "Cannot convert undefined or null to object",
                    ))
                }
                _ => Value::Array(Vec::new()),
            },
            ("Object", "values") | ("Object", "entries") => match args.first() {
                Some(&Value::Row(row)) => Value::Array(
                    row.iter()
                        .map(|(key, cell)| {
                            let value = Value::from_cell(cell);
                            if name == "values" {
                                value
                            } else {
                                Value::Array(vec![Value::Str(Cow::Borrowed(key.as_str())), value])
                            }
                        })
                        .collect(),
                ),
                Some(Value::Str(s)) if name == "values" => {
                    Value::Array(s.chars().map(|c| Value::str(c.to_string())).collect())
                }
                Some(value) if value.is_nullish() => {
                    return Err(PredicateFault::new(
                        "Cannot convert undefined or null to object",
                    ))
                }
                _ => Value::Array(Vec::new()),
            },
            _ => {
                return Err(PredicateFault::missing_method(format!(
                    "{namespace}.{name} is not a function"
                )))
            }
        };
        Ok(value)
    }

    fn call_method(&self, receiver: Value<'a>, name: &str, args: Vec<Value<'a>>) -> Eval<Value<'a>> {
        match receiver {
            Value::Str(s) => string_method(s, name, &args),
            Value::Number(n) => number_method(n, name, &args),
            Value::Bool(b) => match name {
                "toString" => Ok(Value::str(b.to_string())),
                "valueOf" => Ok(Value::Bool(b)),
                _ => Err(not_a_function("boolean", name)),
            },
            Value::Array(items) => array_method(items, name, &args),
            Value::Regex { regex, global } => match name {
                "test" => Ok(Value::Bool(regex.is_match(&arg_string(&args, 0)))),
                "exec" => Ok(match_regex(regex, false, &arg_string(&args, 0))),
                "toString" => Ok(Value::str(Value::Regex { regex, global }.to_js_string().into_owned())),
                _ => Err(not_a_function("regex", name)),
            },
            Value::Date(ms) => date_method(ms, name),
            Value::Row(row) => match name {
                "hasOwnProperty" => Ok(Value::Bool(row.contains_key(arg_string(&args, 0).as_ref()))),
                "toString" => Ok(Value::str("[object Object]")),
                _ => Err(not_a_function("row", name)),
            },
            Value::Undefined | Value::Null => Err(PredicateFault::new(format!(
                "Cannot read properties of {} (reading '{name}')",
                receiver.to_js_string()
            ))),
        }
    }
}

fn not_a_function(kind: &str, name: &str) -> PredicateFault {
    PredicateFault::missing_method(format!("{kind}.{name} is not a function"))
}

fn arg_string<'v>(args: &'v [Value<'_>], index: usize) -> Cow<'v, str> {
    match args.get(index) {
        Some(value) => value.to_js_string(),
        None => Cow::Borrowed("undefined"),
    }
}

fn arg_integer(args: &[Value<'_>], index: usize) -> Option<f64> {
    args.get(index).filter(|v| !matches!(v, Value::Undefined)).map(|v| {
        let n = v.to_number();
        if n.is_nan() {
            0.0
        } else {
            n.trunc()
        }
    })
}

fn fold_extreme(values: Vec<f64>, init: f64, pick: fn(f64, f64) -> f64) -> f64 {
    if values.iter().any(|v| v.is_nan()) {
        return f64::NAN;
    }
    values.into_iter().fold(init, pick)
}

fn static_property<'a>(namespace: &str, name: &str) -> Eval<Value<'a>> {
    match (namespace, name) {
        ("Math", "PI") => Ok(Value::Number(std::f64::consts::PI)),
        ("Math", "E") => Ok(Value::Number(std::f64::consts::E)),
        ("Number", "NaN") => Ok(Value::Number(f64::NAN)),
        ("Number", "MAX_SAFE_INTEGER") => Ok(Value::Number(9_007_199_254_740_991.0)),
        ("Number", "MIN_SAFE_INTEGER") => Ok(Value::Number(-9_007_199_254_740_991.0)),
        ("Number", "POSITIVE_INFINITY") => Ok(Value::Number(f64::INFINITY)),
        ("Number", "NEGATIVE_INFINITY") => Ok(Value::Number(f64::NEG_INFINITY)),
        _ => Ok(Value::Undefined),
    }
}

fn get_property<'a>(target: Value<'a>, key: &str) -> Eval<Value<'a>> {
    match target {
        Value::Undefined | Value::Null => Err(PredicateFault::new(format!(
            "Cannot read properties of {} (reading '{key}')",
            target.to_js_string()
        ))),
        Value::Row(row) => Ok(row.get(key).map(Value::from_cell).unwrap_or(Value::Undefined)),
        Value::Str(s) => {
            if key == "length" {
                return Ok(Value::Number(s.chars().count() as f64));
            }
            Ok(index_of_key(key)
                .and_then(|i| s.chars().nth(i))
                .map(|c| Value::str(c.to_string()))
                .unwrap_or(Value::Undefined))
        }
        Value::Array(items) => {
            if key == "length" {
                return Ok(Value::Number(items.len() as f64));
            }
            Ok(index_of_key(key)
                .and_then(|i| items.into_iter().nth(i))
                .unwrap_or(Value::Undefined))
        }
        Value::Regex { global, .. } if key == "global" => Ok(Value::Bool(global)),
        _ => Ok(Value::Undefined),
    }
}

fn index_of_key(key: &str) -> Option<usize> {
    key.parse::<usize>().ok()
}

pub(crate) fn binary<'a>(op: BinaryOp, left: &Value<'a>, right: &Value<'a>) -> Value<'a> {
    match op {
        BinaryOp::Add => {
            let left = left.to_primitive();
            let right = right.to_primitive();
            if matches!(left, Value::Str(_)) || matches!(right, Value::Str(_)) {
                let mut joined = left.to_js_string().into_owned();
                joined.push_str(&right.to_js_string());
                Value::str(joined)
            } else {
                Value::Number(left.to_number() + right.to_number())
            }
        }
        BinaryOp::Sub => Value::Number(left.to_number() - right.to_number()),
        BinaryOp::Mul => Value::Number(left.to_number() * right.to_number()),
        BinaryOp::Div => Value::Number(left.to_number() / right.to_number()),
        BinaryOp::Rem => Value::Number(left.to_number() % right.to_number()),
        BinaryOp::Lt => Value::Bool(compare(left, right) == Some(Ordering::Less)),
        BinaryOp::Le => Value::Bool(matches!(
            compare(left, right),
            Some(Ordering::Less) | Some(Ordering::Equal)
        )),
        BinaryOp::Gt => Value::Bool(compare(left, right) == Some(Ordering::Greater)),
        BinaryOp::Ge => Value::Bool(matches!(
            compare(left, right),
            Some(Ordering::Greater) | Some(Ordering::Equal)
        )),
        BinaryOp::LooseEq => Value::Bool(loose_equals(left, right)),
        BinaryOp::LooseNe => Value::Bool(!loose_equals(left, right)),
        BinaryOp::StrictEq => Value::Bool(strict_equals(left, right)),
        BinaryOp::StrictNe => Value::Bool(!strict_equals(left, right)),
    }
}

fn char_slice(chars: &[char], start: usize, end: usize) -> String {
    if start >= end {
        return String::new();
    }
    chars[start.min(chars.len())..end.min(chars.len())].iter().collect()
}

/// Resolve a possibly negative index relative to `len`, as `slice` does
fn relative_index(index: f64, len: usize) -> usize {
    if index < 0.0 {
        (len as f64 + index).max(0.0) as usize
    } else {
        index.min(len as f64) as usize
    }
}

fn char_index_of(haystack: &str, needle: &str) -> f64 {
    haystack
        .find(needle)
        .map(|byte| haystack[..byte].chars().count() as f64)
        .unwrap_or(-1.0)
}

fn string_method<'a>(s: Cow<'a, str>, name: &str, args: &[Value<'a>]) -> Eval<Value<'a>> {
    let value = match name {
        "toString" | "valueOf" => Value::Str(s),
        "toLowerCase" | "toLocaleLowerCase" => Value::str(s.to_lowercase()),
        "toUpperCase" | "toLocaleUpperCase" => Value::str(s.to_uppercase()),
        "trim" => Value::str(s.trim()),
        "trimStart" => Value::str(s.trim_start()),
        "trimEnd" => Value::str(s.trim_end()),
        "includes" => {
            let needle = arg_string(args, 0);
            let chars: Vec<char> = s.chars().collect();
            let from = arg_integer(args, 1).map(|p| relative_index(p.max(0.0), chars.len())).unwrap_or(0);
            Value::Bool(char_slice(&chars, from, chars.len()).contains(needle.as_ref()))
        }
        "startsWith" => Value::Bool(s.starts_with(arg_string(args, 0).as_ref())),
        "endsWith" => Value::Bool(s.ends_with(arg_string(args, 0).as_ref())),
        "indexOf" => Value::Number(char_index_of(&s, &arg_string(args, 0))),
        "lastIndexOf" => {
            let needle = arg_string(args, 0);
            Value::Number(
                s.rfind(needle.as_ref())
                    .map(|byte| s[..byte].chars().count() as f64)
                    .unwrap_or(-1.0),
            )
        }
        "charAt" => {
            let index = arg_integer(args, 0).unwrap_or(0.0);
            let c = if index < 0.0 {
                None
            } else {
                s.chars().nth(index as usize)
            };
            Value::str(c.map(String::from).unwrap_or_default())
        }
        "slice" => {
            let chars: Vec<char> = s.chars().collect();
            let len = chars.len();
            let start = relative_index(arg_integer(args, 0).unwrap_or(0.0), len);
            let end = arg_integer(args, 1).map(|e| relative_index(e, len)).unwrap_or(len);
            Value::str(char_slice(&chars, start, end))
        }
        "substring" => {
            let chars: Vec<char> = s.chars().collect();
            let len = chars.len() as f64;
            let start = arg_integer(args, 0).unwrap_or(0.0).clamp(0.0, len) as usize;
            let end = arg_integer(args, 1).unwrap_or(len).clamp(0.0, len) as usize;
            Value::str(char_slice(&chars, start.min(end), start.max(end)))
        }
        "substr" => {
            let chars: Vec<char> = s.chars().collect();
            let start = relative_index(arg_integer(args, 0).unwrap_or(0.0), chars.len());
            let length = arg_integer(args, 1).unwrap_or(chars.len() as f64).max(0.0) as usize;
            Value::str(char_slice(&chars, start, start.saturating_add(length)))
        }
        "split" => split_string(&s, args),
        "replace" | "replaceAll" => {
            let replacement = arg_string(args, 1).into_owned();
            match args.first() {
                Some(Value::Regex { regex, global }) => {
                    let replaced = if *global || name == "replaceAll" {
                        regex.replace_all(&s, NoExpand(&replacement))
                    } else {
                        regex.replace(&s, NoExpand(&replacement))
                    };
                    Value::str(replaced.into_owned())
                }
                _ => {
                    let pattern = arg_string(args, 0);
                    if name == "replaceAll" {
                        Value::str(s.replace(pattern.as_ref(), &replacement))
                    } else {
                        Value::str(s.replacen(pattern.as_ref(), &replacement, 1))
                    }
                }
            }
        }
        "match" => match args.first() {
            Some(Value::Regex { regex, global }) => match_regex(regex, *global, &s),
            _ => {
                let regex = regex_from_string(&arg_string(args, 0))?;
                match_regex(&regex, false, &s)
            }
        },
        "search" => {
            let found = match args.first() {
                Some(Value::Regex { regex, .. }) => regex.find(&s).map(|m| m.start()),
                _ => regex_from_string(&arg_string(args, 0))?.find(&s).map(|m| m.start()),
            };
            Value::Number(
                found
                    .map(|byte| s[..byte].chars().count() as f64)
                    .unwrap_or(-1.0),
            )
        }
        "localeCompare" => {
            let other = arg_string(args, 0);
            Value::Number(match s.as_ref().cmp(other.as_ref()) {
                Ordering::Less => -1.0,
                Ordering::Equal => 0.0,
                Ordering::Greater => 1.0,
            })
        }
        "concat" => {
            let mut joined = s.into_owned();
            for arg in args {
                joined.push_str(&arg.to_js_string());
            }
            Value::str(joined)
        }
        _ => return Err(not_a_function("string", name)),
    };
    Ok(value)
}

fn split_string<'a>(s: &str, args: &[Value<'a>]) -> Value<'a> {
    let limit = arg_integer(args, 1).map(|l| l.max(0.0) as usize).unwrap_or(usize::MAX);
    let parts: Vec<String> = match args.first() {
        None | Some(Value::Undefined) => vec![s.to_string()],
        Some(Value::Regex { regex, .. }) => regex.split(s).map(str::to_string).collect(),
        Some(separator) => {
            let separator = separator.to_js_string();
            if separator.is_empty() {
                s.chars().map(String::from).collect()
            } else {
                s.split(separator.as_ref()).map(str::to_string).collect()
            }
        }
    };
    Value::Array(parts.into_iter().take(limit).map(Value::str).collect())
}

fn regex_from_string(pattern: &str) -> Eval<Regex> {
    RegexBuilder::new(pattern)
        .build()
        .map_err(|e| PredicateFault::new(format!("Invalid regular expression: {e}")))
}

fn match_regex<'a>(regex: &Regex, global: bool, haystack: &str) -> Value<'a> {
    if global {
        let found: Vec<Value<'a>> = regex
            .find_iter(haystack)
            .map(|m| Value::str(m.as_str()))
            .collect();
        return if found.is_empty() {
            Value::Null
        } else {
            Value::Array(found)
        };
    }
    match regex.captures(haystack) {
        Some(captures) => Value::Array(
            captures
                .iter()
                .map(|group| match group {
                    Some(m) => Value::str(m.as_str()),
                    None => Value::Undefined,
                })
                .collect(),
        ),
        None => Value::Null,
    }
}

fn number_method<'a>(n: f64, name: &str, args: &[Value<'a>]) -> Eval<Value<'a>> {
    match name {
        "toString" | "toLocaleString" => Ok(Value::str(format_number(n))),
        "valueOf" => Ok(Value::Number(n)),
        "toFixed" => {
            let digits = arg_integer(args, 0).unwrap_or(0.0);
            if !(0.0..=100.0).contains(&digits) {
                return Err(PredicateFault::new("toFixed() digits argument must be between 0 and 100"));
            }
            if !n.is_finite() {
                return Ok(Value::str(format_number(n)));
            }
            Ok(Value::str(format!("{:.*}", digits as usize, n)))
        }
        _ => Err(not_a_function("number", name)),
    }
}

fn array_method<'a>(items: Vec<Value<'a>>, name: &str, args: &[Value<'a>]) -> Eval<Value<'a>> {
    let needle = args.first().cloned().unwrap_or(Value::Undefined);
    match name {
        "includes" => Ok(Value::Bool(items.iter().any(|item| same_value_zero(item, &needle)))),
        "indexOf" => Ok(Value::Number(
            items
                .iter()
                .position(|item| strict_equals(item, &needle))
                .map(|i| i as f64)
                .unwrap_or(-1.0),
        )),
        "join" => {
            let separator = match args.first() {
                None | Some(Value::Undefined) => Cow::Borrowed(","),
                Some(sep) => sep.to_js_string(),
            };
            Ok(Value::str(join_array(&items, &separator)))
        }
        "toString" => Ok(Value::str(join_array(&items, ","))),
        _ => Err(not_a_function("array", name)),
    }
}

fn date_method<'a>(ms: f64, name: &str) -> Eval<Value<'a>> {
    let name = name.replace("getUTC", "get");
    if name == "getTime" || name == "valueOf" {
        return Ok(Value::Number(ms));
    }
    if name == "toString" {
        return Ok(Value::str(Value::Date(ms).to_js_string().into_owned()));
    }

    let Some(dt) = date_from_millis(ms) else {
        return match name.as_str() {
            "toISOString" => Err(PredicateFault::new("Invalid time value")),
            "getFullYear" | "getMonth" | "getDate" | "getDay" | "getHours" | "getMinutes"
            | "getSeconds" | "getMilliseconds" => Ok(Value::Number(f64::NAN)),
            _ => Err(not_a_function("date", &name)),
        };
    };

    let value = match name.as_str() {
        "getFullYear" => dt.year() as f64,
        "getMonth" => dt.month0() as f64,
        "getDate" => dt.day() as f64,
        "getDay" => dt.weekday().num_days_from_sunday() as f64,
        "getHours" => dt.hour() as f64,
        "getMinutes" => dt.minute() as f64,
        "getSeconds" => dt.second() as f64,
        "getMilliseconds" => (dt.timestamp_subsec_millis()) as f64,
        "toISOString" => {
            return Ok(Value::str(dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()));
        }
        "toDateString" => return Ok(Value::str(dt.format("%a %b %d %Y").to_string())),
        _ => return Err(not_a_function("date", &name)),
    };
    Ok(Value::Number(value))
}

/// `new Date(y, m, d, h, min, s)` with a zero-based month, interpreted as UTC
fn date_from_parts(year: f64, month: f64, day: f64, hour: f64, minute: f64, second: f64) -> f64 {
    if [year, month, day, hour, minute, second].iter().any(|v| !v.is_finite()) {
        return f64::NAN;
    }
    let Some(total_months) = (year.trunc() as i64)
        .checked_mul(12)
        .and_then(|months| months.checked_add(month.trunc() as i64))
    else {
        return f64::NAN;
    };
    let (y, m) = (total_months.div_euclid(12), total_months.rem_euclid(12));
    let Some(first) = i32::try_from(y)
        .ok()
        .and_then(|y| NaiveDate::from_ymd_opt(y, m as u32 + 1, 1))
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    else {
        return f64::NAN;
    };
    let base = first.and_utc().timestamp_millis() as f64;
    base + ((day.trunc() - 1.0) * 86_400.0 + hour.trunc() * 3_600.0 + minute.trunc() * 60.0 + second.trunc())
        * 1_000.0
}
