//! Sandboxed predicate language.
//!
//! Generated filter logic is JavaScript-like code over a single `row`
//! binding. It is never handed to a host engine: the source is tokenized,
//! parsed into a small syntax tree and interpreted here, so a predicate can
//! read the row and call a fixed set of pure builtins but can reach no I/O,
//! globals or host state. Loops are not part of the language, which bounds
//! evaluation time by the size of the code.

mod ast;
mod eval;
mod lexer;
mod parser;
mod value;

pub use value::{format_number, parse_float, Value};

use crate::data::Row;
use crate::error::{Result, SmartFilterError};
use chrono::Utc;
use log::{debug, warn};
use rayon::prelude::*;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Malformed predicate source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub message: String,
    /// Byte offset into the predicate source
    pub offset: usize,
}

impl SyntaxError {
    pub fn new<S: Into<String>>(message: S, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at offset {}", self.message, self.offset)
    }
}

impl std::error::Error for SyntaxError {}

/// Runtime failure while evaluating a predicate on one row
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct PredicateFault {
    message: String,
    missing_method: bool,
}

impl PredicateFault {
    pub(crate) fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
            missing_method: false,
        }
    }

    pub(crate) fn missing_method<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
            missing_method: true,
        }
    }

    pub(crate) fn is_missing_method(&self) -> bool {
        self.missing_method
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A compiled, reusable row predicate
#[derive(Debug, Clone)]
pub struct Predicate {
    program: ast::Program,
    source: String,
    /// Clock reading taken at compile time, so `new Date()` is stable across rows
    now_ms: f64,
}

impl Predicate {
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate against one row, returning whatever value the code produced
    pub fn evaluate<'a>(&'a self, row: &'a Row) -> std::result::Result<Value<'a>, PredicateFault> {
        eval::Interpreter::new(&self.program, row, self.now_ms).run()
    }

    /// Only a literal boolean `true` keeps a row
    pub fn matches(&self, row: &Row) -> std::result::Result<bool, PredicateFault> {
        Ok(matches!(self.evaluate(row)?, Value::Bool(true)))
    }
}

/// Compile generated source into a predicate.
///
/// Markdown code fences around the code are tolerated. Any syntax problem
/// surfaces as [`SmartFilterError::InvalidPredicateSyntax`].
pub fn compile_predicate(code: &str) -> Result<Predicate> {
    let source = strip_code_fence(code);
    let program = parser::parse_program(&source).map_err(|e| {
        debug!("Rejected predicate source: {source}");
        SmartFilterError::invalid_predicate(e.to_string())
    })?;
    Ok(Predicate {
        program,
        source,
        now_ms: Utc::now().timestamp_millis() as f64,
    })
}

fn strip_code_fence(code: &str) -> String {
    let trimmed = code.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    // Drop an optional language tag on the opening fence line
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
        .to_string()
}

/// Outcome of running a predicate over a set of rows
#[derive(Debug, Clone, Default)]
pub struct FilterRun {
    /// Kept rows, in their original order
    pub rows: Vec<Row>,
    pub evaluated: usize,
    /// Rows whose evaluation raised a fault
    pub faulted: usize,
    /// Rows for which the predicate returned something other than a boolean
    pub non_boolean: usize,
}

/// Apply a predicate to every row. Faults exclude the row and never abort the run.
pub fn apply(predicate: &Predicate, rows: &[Row]) -> FilterRun {
    let faulted = AtomicUsize::new(0);
    let non_boolean = AtomicUsize::new(0);

    let kept: Vec<Row> = rows
        .par_iter()
        .filter(|row| match predicate.evaluate(row) {
            Ok(Value::Bool(keep)) => keep,
            Ok(_) => {
                non_boolean.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(fault) => {
                debug!("Predicate fault excluded a row: {fault}");
                faulted.fetch_add(1, Ordering::Relaxed);
                false
            }
        })
        .cloned()
        .collect();

    let run = FilterRun {
        rows: kept,
        evaluated: rows.len(),
        faulted: faulted.into_inner(),
        non_boolean: non_boolean.into_inner(),
    };
    if run.faulted > 0 {
        warn!(
            "Predicate faulted on {} of {} rows; those rows were excluded",
            run.faulted, run.evaluated
        );
    }
    if run.non_boolean > 0 {
        warn!(
            "Predicate returned a non-boolean value for {} of {} rows; treated as no match",
            run.non_boolean, run.evaluated
        );
    }
    run
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Cell;

    fn row(pairs: &[(&str, Cell)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn product(name: &str, price: Cell) -> Row {
        row(&[("Name", Cell::from(name)), ("Price", price)])
    }

    fn keeps(code: &str, row: &Row) -> bool {
        compile_predicate(code).unwrap().matches(row).unwrap()
    }

    #[test]
    fn test_price_threshold() {
        let predicate =
            compile_predicate("return parseFloat(row['Price']) > 100;").unwrap();
        let rows = vec![
            product("A", Cell::Number(50.0)),
            product("B", Cell::Number(150.0)),
            product("C", Cell::from("200")),
        ];
        let run = apply(&predicate, &rows);
        assert_eq!(run.evaluated, 3);
        assert_eq!(run.rows.len(), 2);
        assert_eq!(run.rows[0]["Name"], Cell::from("B"));
        assert_eq!(run.rows[1]["Name"], Cell::from("C"));
    }

    #[test]
    fn test_faults_are_isolated_per_row() {
        let predicate = compile_predicate("return row.Tags.split(',').includes('red');").unwrap();
        let rows = vec![
            row(&[("Tags", Cell::from("red,blue"))]),
            row(&[("Other", Cell::from("x"))]),
            row(&[("Tags", Cell::from("green"))]),
        ];
        let run = apply(&predicate, &rows);
        assert_eq!(run.rows.len(), 1);
        assert_eq!(run.faulted, 1);
    }

    #[test]
    fn test_non_boolean_results_exclude_rows() {
        let predicate = compile_predicate("return row.Name;").unwrap();
        let rows = vec![product("A", Cell::Number(1.0))];
        let run = apply(&predicate, &rows);
        assert!(run.rows.is_empty());
        assert_eq!(run.non_boolean, 1);
        assert_eq!(run.faulted, 0);
    }

    #[test]
    fn test_wrapper_forms() {
        let r = product("Widget", Cell::Number(10.0));
        assert!(keeps("function (r) { return r.Name === 'Widget'; }", &r));
        assert!(keeps("function filter(row) { return true }", &r));
        assert!(keeps("item => item.Price < 20", &r));
        assert!(keeps("(x) => { return x.Price == '10'; }", &r));
        assert!(keeps("row.Name.toLowerCase().includes('widg')", &r));
    }

    #[test]
    fn test_locals_branches_and_ternary() {
        let code = r#"
            const price = Number(row["Price"]);
            if (isNaN(price)) return false;
            let band = price >= 100 ? "high" : "low";
            return band === "high";
        "#;
        assert!(keeps(code, &product("A", Cell::Number(250.0))));
        assert!(!keeps(code, &product("B", Cell::Number(20.0))));
        assert!(!keeps(code, &product("C", Cell::from("n/a"))));
    }

    #[test]
    fn test_optional_chaining_and_nullish() {
        let r = product("A", Cell::Number(1.0));
        assert!(keeps("return (row.Missing?.trim() ?? 'none') === 'none';", &r));
        assert!(keeps("return row?.['Name'] === 'A';", &r));
        assert!(compile_predicate("return row.Missing.trim() === '';")
            .unwrap()
            .matches(&r)
            .is_err());
    }

    #[test]
    fn test_regex_and_string_builtins() {
        let r = row(&[("Email", Cell::from("Ops@Example.com")), ("Code", Cell::from("AB-123"))]);
        assert!(keeps(r"return /example\.com$/i.test(row.Email);", &r));
        assert!(keeps("return row.Code.match(/\\d+/)[0] === '123';", &r));
        assert!(keeps("return row.Code.slice(-3) === '123' && row.Code.startsWith('AB');", &r));
        assert!(keeps("return row.Email.split('@')[1].toLowerCase() === 'example.com';", &r));
        assert!(keeps("return row.Code.replace(/-/g, '').length === 5;", &r));
    }

    #[test]
    fn test_empty_cells_read_as_empty_strings() {
        let r = row(&[("Notes", Cell::Empty)]);
        assert!(keeps("return row.Notes === '';", &r));
        assert!(keeps("return !row.Notes;", &r));
    }

    #[test]
    fn test_dates_and_math() {
        let r = row(&[("Joined", Cell::from("2023-03-15")), ("Score", Cell::Number(7.6))]);
        assert!(keeps("return new Date(row.Joined).getFullYear() === 2023;", &r));
        assert!(keeps("return new Date(row.Joined).getMonth() === 2;", &r));
        assert!(keeps("return Math.round(row.Score) === 8 && Math.max(1, row.Score) > 7;", &r));
        assert!(keeps("return new Date(row.Joined) < new Date('2024-01-01');", &r));
    }

    #[test]
    fn test_array_literals_and_typeof() {
        let r = row(&[("Region", Cell::from("EU"))]);
        assert!(keeps("return ['EU', 'UK'].includes(row.Region);", &r));
        assert!(keeps("return typeof row.Region === 'string' && typeof nothing === 'undefined';", &r));
    }

    #[test]
    fn test_out_of_range_date_parts_exclude_only_their_row() {
        let predicate =
            compile_predicate("return new Date(parseFloat(row.Year), 0).getFullYear() > 2000;").unwrap();
        let rows: Vec<Row> = ["2024", "1e300", "3e9", "-1e300", "2023"]
            .into_iter()
            .map(|year| row(&[("Year", Cell::from(year))]))
            .collect();
        let run = apply(&predicate, &rows);
        assert_eq!(run.evaluated, 5);
        assert_eq!(run.rows.len(), 2);
        assert_eq!(run.rows[0]["Year"], Cell::from("2024"));
        assert_eq!(run.rows[1]["Year"], Cell::from("2023"));
        assert_eq!(run.faulted, 0);
    }

    #[test]
    fn test_parse_int_radix() {
        let r = Row::new();
        assert!(keeps("return parseInt('ff', 16) === 255 && parseInt('0x1A') === 26;", &r));
        assert!(keeps("return parseInt('101', 2) === 5 && parseInt('42', 0) === 42;", &r));
        assert!(keeps("return isNaN(parseInt('10', -1)) && isNaN(parseInt('10', 37));", &r));
        assert!(keeps("return isNaN(parseInt('10', 1)) && Number.parseInt('12', NaN) === 12;", &r));
    }

    #[test]
    fn test_array_callbacks() {
        let r = row(&[
            ("Name", Cell::from("Cordless Drill")),
            ("Category", Cell::from("Tools")),
            ("Price", Cell::Number(150.0)),
        ]);
        assert!(keeps("return ['saw', 'drill'].some(t => row.Name.toLowerCase().includes(t));", &r));
        assert!(!keeps("return ['saw', 'hammer'].some(t => row.Name.toLowerCase().includes(t));", &r));
        assert!(keeps(
            "return Object.values(row).some(v => String(v).toLowerCase().includes('tool'));",
            &r
        ));
        assert!(keeps("return ['Name', 'Category'].every((h) => row[h] !== '');", &r));
        assert!(keeps("return [5, 20, 40].filter(n => n > 10).length === 2;", &r));
        assert!(keeps("return [1, 2, 3].map((n, i) => n * i).join('-') === '0-2-6';", &r));
        assert!(keeps("return ['a', 'b'].find(x => x === 'b') === 'b';", &r));
        assert!(keeps("return ['a', 'b'].findIndex(x => x === 'z') === -1;", &r));
        assert!(keeps(
            "return Object.entries(row).some(e => e[0] === 'Price' && e[1] > 100);",
            &r
        ));
        assert!(keeps(
            "return Object.keys(row).filter(k => { const v = row[k]; return typeof v === 'string'; }).length === 2;",
            &r
        ));
    }

    #[test]
    fn test_callback_body_returns_do_not_end_the_predicate() {
        let r = product("A", Cell::Number(1.0));
        assert!(keeps("Object.values(row).some(v => { return v === 'A'; })", &r));
        assert!(!keeps("Object.values(row).some(v => { return v === 'B'; })", &r));
    }

    #[test]
    fn test_callbacks_outside_array_methods_fault() {
        let r = product("A", Cell::Number(1.0));
        let fault = compile_predicate("return row.Name.some(c => c === 'A');")
            .unwrap()
            .matches(&r)
            .unwrap_err();
        assert!(fault.message().contains("some"));
        assert!(compile_predicate("return Boolean(x => true);")
            .unwrap()
            .matches(&r)
            .is_err());
    }

    #[test]
    fn test_code_fences_are_stripped() {
        let predicate = compile_predicate("```javascript\nreturn true;\n```").unwrap();
        assert_eq!(predicate.source(), "return true;");
        assert!(predicate.matches(&Row::new()).unwrap());
    }

    #[test]
    fn test_rejects_unsupported_code() {
        for code in [
            "",
            "return row.Price >",
            "for (;;) {}",
            "while (true) { }",
            "row.Price = 5; return true;",
            "return fetch('http://x');;)",
        ] {
            let err = compile_predicate(code).unwrap_err();
            assert!(
                matches!(err, SmartFilterError::InvalidPredicateSyntax { .. }),
                "{code:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_unknown_globals_fault_at_runtime() {
        let predicate = compile_predicate("return fetch('http://example.com') === 1;").unwrap();
        let fault = predicate.matches(&Row::new()).unwrap_err();
        assert!(fault.message().contains("fetch"));
    }
}
