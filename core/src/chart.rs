//! Bar chart preview of a view

use crate::data::{Cell, Row};
use serde::Serialize;

/// Rows taken into account for the preview
pub const CHART_ROW_LIMIT: usize = 15;

const LABEL_WIDTH: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bar {
    pub label: String,
    pub value: f64,
    pub cell: Cell,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarChart {
    pub x_key: String,
    pub y_key: String,
    pub bars: Vec<Bar>,
}

impl BarChart {
    pub fn max_value(&self) -> f64 {
        self.bars.iter().map(|b| b.value).fold(0.0, f64::max)
    }
}

/// Pick a label column and a value column and build one bar per row.
///
/// Returns `None` when there are no rows or no column looks numeric in the
/// first row.
pub fn bar_chart(rows: &[Row], headers: &[String]) -> Option<BarChart> {
    let rows = &rows[..rows.len().min(CHART_ROW_LIMIT)];
    let first = rows.first()?;

    let is_numeric = |h: &String| first.get(h).is_some_and(Cell::is_numeric);
    let y_key = headers.iter().find(|h| is_numeric(*h))?;
    let x_key = headers
        .iter()
        .find(|h| !is_numeric(*h))
        .or_else(|| headers.first())?;

    let bars = rows
        .iter()
        .map(|row| {
            let label: String = row
                .get(x_key)
                .map(Cell::to_string)
                .unwrap_or_default()
                .chars()
                .take(LABEL_WIDTH)
                .collect();
            let cell = row.get(y_key).cloned().unwrap_or_default();
            Bar {
                label: if label.is_empty() { "Item".to_string() } else { label },
                value: cell.as_number().unwrap_or(0.0),
                cell,
            }
        })
        .collect();

    Some(BarChart {
        x_key: x_key.clone(),
        y_key: y_key.clone(),
        bars,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{products_table, row};

    #[test]
    fn test_chart_from_products() {
        let table = products_table();
        let chart = bar_chart(&table.rows, &table.headers).unwrap();

        assert_eq!(chart.x_key, "Name");
        assert_eq!(chart.y_key, "Price");
        let values: Vec<f64> = chart.bars.iter().map(|b| b.value).collect();
        assert_eq!(values, vec![50.0, 150.0, 200.0, 0.0, 0.0]);
        assert_eq!(chart.bars[2].cell, Cell::from("200"));
        assert_eq!(chart.max_value(), 200.0);
    }

    #[test]
    fn test_no_numeric_column() {
        let rows = vec![row(&[("Name", "A".into()), ("City", "Oslo".into())])];
        let headers = vec!["Name".to_string(), "City".to_string()];
        assert!(bar_chart(&rows, &headers).is_none());
        assert!(bar_chart(&[], &headers).is_none());
    }

    #[test]
    fn test_all_numeric_uses_first_header_for_labels() {
        let rows = vec![row(&[("Year", 2024.0.into()), ("Sales", 12.0.into())])];
        let headers = vec!["Year".to_string(), "Sales".to_string()];
        let chart = bar_chart(&rows, &headers).unwrap();
        assert_eq!(chart.x_key, "Year");
        assert_eq!(chart.y_key, "Year");
        assert_eq!(chart.bars[0].label, "2024");
    }

    #[test]
    fn test_labels_are_truncated_and_defaulted() {
        let rows = vec![
            row(&[("Product", "Extra large widget".into()), ("Qty", 3.0.into())]),
            row(&[("Product", Cell::Empty), ("Qty", "x".into())]),
        ];
        let headers = vec!["Product".to_string(), "Qty".to_string()];
        let chart = bar_chart(&rows, &headers).unwrap();
        assert_eq!(chart.bars[0].label, "Extra larg");
        assert_eq!(chart.bars[1].label, "Item");
        assert_eq!(chart.bars[1].value, 0.0);
    }

    #[test]
    fn test_only_first_rows_are_charted() {
        let rows: Vec<Row> = (0..40)
            .map(|i| row(&[("Name", format!("n{i}").into()), ("Value", (i as f64).into())]))
            .collect();
        let headers = vec!["Name".to_string(), "Value".to_string()];
        assert_eq!(bar_chart(&rows, &headers).unwrap().bars.len(), CHART_ROW_LIMIT);
    }
}
