//! Documents → CSV.

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexSet;
use serde_json::Value;
use snafu::prelude::*;

use crate::docstore::Document;
use crate::error::{CsvEncodeSnafu, CsvFlushSnafu, ExtractError};

/// Extended-JSON type wrappers that stand for a single scalar.
const SCALAR_WRAPPERS: &[&str] = &[
    "$oid",
    "$date",
    "$numberLong",
    "$numberInt",
    "$numberDouble",
    "$numberDecimal",
    "$symbol",
];

/// An encoded export.
#[derive(Debug)]
pub struct EncodedExport {
    pub body: Vec<u8>,
    pub columns: usize,
    pub rows: usize,
}

/// Union of all field names, in the order they are first seen.
pub fn union_header(documents: &[Document]) -> IndexSet<&str> {
    documents
        .iter()
        .flat_map(|doc| doc.keys().map(String::as_str))
        .collect()
}

/// Encode documents as CSV: one header row, one row per document.
///
/// Zero documents produce an empty body.
pub fn encode_csv(documents: &[Document]) -> Result<EncodedExport, ExtractError> {
    let header = union_header(documents);
    let mut writer = csv::Writer::from_writer(Vec::new());

    if !documents.is_empty() {
        writer.write_record(header.iter()).context(CsvEncodeSnafu)?;
    }

    for doc in documents {
        let row = header
            .iter()
            .map(|column| doc.get(*column).map(render_cell).unwrap_or_default());
        writer.write_record(row).context(CsvEncodeSnafu)?;
    }

    let body = writer.into_inner().map_err(|e| {
        CsvFlushSnafu {
            message: e.error().to_string(),
        }
        .build()
    })?;

    Ok(EncodedExport {
        body,
        columns: header.len(),
        rows: documents.len(),
    })
}

/// Render one field value as a CSV cell.
///
/// Dates are always written as RFC 3339 in UTC, whichever extended-JSON
/// form they arrive in.
pub fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Object(map) => {
            if let Some(date) = map.get("$date").filter(|_| map.len() == 1)
                && let Some(rendered) = render_date(date)
            {
                return rendered;
            }
            match unwrap_scalar(map) {
                Some(inner) => render_cell(inner),
                None => value.to_string(),
            }
        }
        Value::Array(_) => value.to_string(),
    }
}

/// Relaxed `$date` is an ISO string for years 1970-9999; other dates are
/// `{"$numberLong": "<epoch millis>"}`.
fn render_date(inner: &Value) -> Option<String> {
    let instant = match inner {
        Value::String(s) => DateTime::parse_from_rfc3339(s).ok()?.with_timezone(&Utc),
        Value::Number(n) => DateTime::from_timestamp_millis(n.as_i64()?)?,
        Value::Object(nested) => {
            let millis = match unwrap_scalar(nested)? {
                Value::String(s) => s.parse::<i64>().ok()?,
                Value::Number(n) => n.as_i64()?,
                _ => return None,
            };
            DateTime::from_timestamp_millis(millis)?
        }
        _ => return None,
    };
    Some(instant.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

fn unwrap_scalar(map: &serde_json::Map<String, Value>) -> Option<&Value> {
    if map.len() != 1 {
        return None;
    }
    let (key, inner) = map.iter().next()?;
    if !SCALAR_WRAPPERS.contains(&key.as_str()) {
        return None;
    }
    match inner {
        Value::Object(nested) => unwrap_scalar(nested),
        other => Some(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn body(export: &EncodedExport) -> &str {
        std::str::from_utf8(&export.body).unwrap()
    }

    #[test]
    fn test_union_header_first_seen_order() {
        let docs = vec![
            doc(json!({"account_id": 1, "limit": 9000})),
            doc(json!({"account_id": 2, "products": ["Brokerage"], "limit": 100})),
        ];
        let export = encode_csv(&docs).unwrap();
        assert_eq!(
            body(&export),
            "account_id,limit,products\n1,9000,\n2,100,\"[\"\"Brokerage\"\"]\"\n"
        );
        assert_eq!(export.columns, 3);
        assert_eq!(export.rows, 2);
    }

    #[test]
    fn test_extended_json_unwrapped() {
        let docs = vec![doc(json!({
            "_id": {"$oid": "5ca4bbc7a2dd94ee5816238c"},
            "bucket_start_date": {"$date": {"$numberLong": "-28598400000"}},
            "bucket_end_date": {"$date": "2016-12-31T00:00:00Z"},
            "total": {"$numberDecimal": "1234.56"}
        }))];
        let export = encode_csv(&docs).unwrap();
        assert_eq!(
            body(&export),
            "_id,bucket_start_date,bucket_end_date,total\n\
             5ca4bbc7a2dd94ee5816238c,1969-02-04T00:00:00Z,2016-12-31T00:00:00Z,1234.56\n"
        );
    }

    #[test]
    fn test_dates_share_one_format_across_epoch() {
        let cells: Vec<String> = [
            json!({"$date": {"$numberLong": "-28598400000"}}),
            json!({"$date": "2016-12-31T00:00:00.000Z"}),
            json!({"$date": "2016-12-31T01:00:00+01:00"}),
            json!({"$date": 1483142400123i64}),
        ]
        .iter()
        .map(render_cell)
        .collect();

        assert_eq!(
            cells,
            vec![
                "1969-02-04T00:00:00Z",
                "2016-12-31T00:00:00Z",
                "2016-12-31T00:00:00Z",
                "2016-12-31T00:00:00.123Z",
            ]
        );
    }

    #[test]
    fn test_unparseable_date_kept_verbatim() {
        assert_eq!(render_cell(&json!({"$date": "yesterday"})), "yesterday");
    }

    #[test]
    fn test_null_and_missing_are_empty() {
        let docs = vec![
            doc(json!({"a": null, "b": true})),
            doc(json!({"b": false})),
        ];
        let export = encode_csv(&docs).unwrap();
        assert_eq!(body(&export), "a,b\n,true\n,false\n");
    }

    #[test]
    fn test_nested_object_rendered_as_json() {
        let cell = render_cell(&json!({"symbol": "amzn", "amount": 100}));
        assert_eq!(cell, r#"{"symbol":"amzn","amount":100}"#);
    }

    #[test]
    fn test_empty_collection_has_empty_body() {
        let export = encode_csv(&[]).unwrap();
        assert!(export.body.is_empty());
        assert_eq!(export.columns, 0);
        assert_eq!(export.rows, 0);
    }
}
