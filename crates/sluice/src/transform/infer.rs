//! Column type inference for raw CSV exports.
//!
//! A column takes the narrowest type every non-empty cell parses as, tried
//! in the order Int64, Float64, Boolean, Utf8. Empty cells are nulls. A
//! column with no values at all is Utf8.

use deltalake::arrow::array::{ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use deltalake::arrow::datatypes::DataType;
use std::sync::Arc;

/// Infer the Arrow type of a column from its cells.
pub fn infer_type<'a>(cells: impl Iterator<Item = &'a str> + Clone) -> DataType {
    let mut values = cells.filter(|c| !c.is_empty()).peekable();
    if values.peek().is_none() {
        return DataType::Utf8;
    }

    if values.clone().all(|c| c.parse::<i64>().is_ok()) {
        DataType::Int64
    } else if values.clone().all(|c| c.parse::<f64>().is_ok()) {
        DataType::Float64
    } else if values.all(|c| parse_bool(c).is_some()) {
        DataType::Boolean
    } else {
        DataType::Utf8
    }
}

/// Build an array of `data_type` from cells that [`infer_type`] accepted.
pub fn build_array<'a>(data_type: &DataType, cells: impl Iterator<Item = &'a str>) -> ArrayRef {
    let non_empty = |c: &'a str| (!c.is_empty()).then_some(c);
    match data_type {
        DataType::Int64 => Arc::new(
            cells
                .map(|c| non_empty(c).and_then(|c| c.parse::<i64>().ok()))
                .collect::<Int64Array>(),
        ),
        DataType::Float64 => Arc::new(
            cells
                .map(|c| non_empty(c).and_then(|c| c.parse::<f64>().ok()))
                .collect::<Float64Array>(),
        ),
        DataType::Boolean => Arc::new(
            cells
                .map(|c| non_empty(c).and_then(parse_bool))
                .collect::<BooleanArray>(),
        ),
        _ => Arc::new(cells.map(non_empty).collect::<StringArray>()),
    }
}

fn parse_bool(cell: &str) -> Option<bool> {
    if cell.eq_ignore_ascii_case("true") {
        Some(true)
    } else if cell.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}
