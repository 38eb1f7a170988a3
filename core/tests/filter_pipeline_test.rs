//! End-to-end behaviour of filtering a dataset through the compiler and sandbox

use smartfilter_core::data::Table;
use smartfilter_core::projection::resolve;
use smartfilter_core::view::{self, History};
use smartfilter_core::{Cell, Dataset, SmartFilterError};

mod common;
use common::{column, engine, row, CannedModel};

fn name_price() -> Dataset {
    Dataset::new(
        "prices.csv",
        Table::new(
            vec!["Name".to_string(), "Price".to_string()],
            vec![
                row(&[("Name", "A"), ("Price", "120")]),
                row(&[("Name", "B"), ("Price", "80")]),
            ],
        ),
    )
}

/// The reference scenario: a numeric threshold on text prices, narrowed to one column
#[tokio::test]
async fn test_price_threshold_scenario() {
    let base = name_price();
    let engine = engine(CannedModel::new().filter(
        "return parseFloat(row['Price']) > 100;",
        &["Name"],
        "Items priced above 100",
    ));

    let applied = engine.apply_filter(&base, "price above 100, only names").await.unwrap();

    assert_eq!(applied.dataset.rows, vec![row(&[("Name", "A"), ("Price", "120")])]);
    assert_eq!(applied.dataset.headers, vec!["Name".to_string()]);
    assert_eq!(applied.explanation, "Items priced above 100");
}

#[tokio::test]
async fn test_failed_compilation_is_non_destructive() {
    let base = name_price();
    let engine = engine(
        CannedModel::new()
            .fail("503 Service Unavailable")
            .refuse("The dataset has no Colour column")
            .filter("return row.Price >>> ;", &[], "broken"),
    );

    for requirement in ["anything", "red items", "broken"] {
        let err = engine.apply_filter(&base, requirement).await.unwrap_err();
        assert!(err.is_filter_error(), "unexpected error {err:?}");
    }
    assert_eq!(base.rows.len(), 2);
    assert_eq!(base.headers, vec!["Name".to_string(), "Price".to_string()]);
    assert!(!base.is_filtered());
}

#[tokio::test]
async fn test_filters_never_compound() {
    let base = name_price();
    let engine = engine(
        CannedModel::new()
            .filter("return row.Name === 'A';", &["Price"], "Only A")
            .filter("return parseFloat(row.Price) < 100;", &[], "Cheap")
            .filter("return parseFloat(row.Price) < 100;", &[], "Cheap"),
    );

    let first = engine.apply_filter(&base, "only a").await.unwrap().dataset;
    let chained = engine.apply_filter(&first, "cheap").await.unwrap().dataset;
    let direct = engine.apply_filter(&base, "cheap").await.unwrap().dataset;

    assert_eq!(chained.rows, direct.rows);
    assert_eq!(chained.headers, direct.headers);
    assert_eq!(column(&chained.rows, "Name"), vec![&Cell::from("B")]);
}

#[tokio::test]
async fn test_row_faults_are_isolated() {
    let base = Dataset::from_rows(
        "mixed.csv",
        vec![
            row(&[("Name", "alpha"), ("Tags", "x,y")]),
            row(&[("Name", "beta")]),
            row(&[("Name", "gamma"), ("Tags", "y")]),
        ],
    );
    // beta has no Tags key so the first predicate throws for it alone
    let engine = engine(
        CannedModel::new()
            .filter("return row.Tags.split(',').includes('y');", &[], "Tagged y")
            .filter("return row.Missing.length > 0;", &[], "Always faults"),
    );

    let tagged = engine.apply_filter(&base, "tagged y").await.unwrap();
    assert_eq!(
        column(&tagged.dataset.rows, "Name"),
        vec![&Cell::from("alpha"), &Cell::from("gamma")]
    );

    let faulting = engine.apply_filter(&base, "always faults").await.unwrap();
    assert_eq!(faulting.dataset.row_count(), 0);
    assert_eq!(faulting.stats.faulted, 3);
    assert_eq!(faulting.stats.evaluated, 3);
}

#[tokio::test]
async fn test_non_boolean_results_exclude_rows() {
    let base = name_price();
    let engine = engine(CannedModel::new().filter("return row.Name;", &[], "Truthy names"));

    let applied = engine.apply_filter(&base, "names").await.unwrap();
    assert_eq!(applied.dataset.row_count(), 0);
    assert_eq!(applied.stats.non_boolean, 2);
}

#[tokio::test]
async fn test_prompt_carries_headers_and_samples() {
    let model = std::sync::Arc::new(CannedModel::new().filter("return true;", &[], "All"));
    let engine = smartfilter_core::FilterEngine::new(smartfilter_core::PredicateCompiler::new(model.clone()));
    let base = name_price();

    engine.apply_filter(&base, "everything").await.unwrap();

    let request = &model.requests()[0];
    assert_eq!(request.requirement, "everything");
    assert!(request.system_instruction.contains("\"Name\""));
    assert!(request.system_instruction.contains("\"Price\""));
    assert!(request.system_instruction.contains("\"120\""));
}

#[test]
fn test_reset_is_idempotent() {
    let base = name_price();
    let narrowed = base.derive_view(
        vec!["Price".to_string()],
        base.original_rows[1..].to_vec(),
        Some("cheap".to_string()),
    );

    let once = view::reset(&narrowed);
    let twice = view::reset(&once);
    assert!(once.same_view(&twice));
    assert!(once.same_view(&base));
}

#[test]
fn test_history_keeps_ten_most_recent() {
    let base = name_price();
    let mut history = History::default();
    for i in 0..15 {
        history.record(base.derive_view(base.headers.clone(), Vec::new(), Some(format!("q{i}"))));
    }

    assert_eq!(history.len(), 10);
    let queries: Vec<String> = history.iter().filter_map(|d| d.query.clone()).collect();
    let expected: Vec<String> = (5..15).rev().map(|i| format!("q{i}")).collect();
    assert_eq!(queries, expected);
}

#[test]
fn test_projection_properties() {
    let headers = vec!["Name".to_string(), "Age".to_string()];
    assert_eq!(resolve(&[], &headers), headers);
    assert_eq!(resolve(&["nonexistent".to_string()], &headers), headers);
    assert_eq!(resolve(&["name".to_string()], &headers), vec!["Name".to_string()]);
}

#[tokio::test]
async fn test_blank_requirement_is_invalid_input() {
    let engine = engine(CannedModel::new());
    let err = engine.apply_filter(&name_price(), "  ").await.unwrap_err();
    assert!(matches!(err, SmartFilterError::InvalidInput(_)));
}
