// Feature extraction: one forward pass over a reprojected shapefile,
// accumulating the value series of every requested property.
//
// Index alignment is the load-bearing invariant here: position i in every
// series corresponds to the i-th feature in file order, which is also the
// value the reprojection stage assigned to the synthesized FID. A property
// missing from a record therefore contributes an explicit null, never a
// skipped index.

use crate::errors::PipelineError;
use camino::Utf8Path;
use indexmap::{IndexMap, IndexSet};
use serde_json::Value;
use shapefile::dbase;
use shapefile::dbase::FieldValue;

/// Result of one extraction pass over a layer's reprojected shapefile.
#[derive(Debug, Clone)]
pub struct ExtractedColumns {
    /// Geometry bounding box from the file header, in the file's spatial
    /// reference (web mercator after reprojection): `[west, south, east,
    /// north]`.
    pub bbox: [f64; 4],

    /// Property map of the first feature, in the dbf's declared field
    /// order, used once per layer for the display-name heuristic.
    pub first_feature_properties: IndexMap<String, Value>,

    /// Requested property -> value series in file order.
    pub series_by_property: IndexMap<String, Vec<Value>>,

    /// How many requested values were absent or null across all features.
    pub missing_values: usize,
}

/// Stream all features of `path` once, accumulating the series of every
/// property in `properties`.
///
/// The reader is advanced strictly forward and is not restartable; a read
/// failure mid-stream discards everything accumulated so far and surfaces
/// as [`PipelineError::Read`].
///
/// This is synchronous library I/O; the pipeline runs it on a blocking
/// task.
pub fn extract_columns(
    path: &Utf8Path,
    properties: &IndexSet<String>,
) -> Result<ExtractedColumns, PipelineError> {
    let read_error = |message: String| PipelineError::Read {
        path: path.to_path_buf(),
        message,
    };

    let mut reader =
        shapefile::Reader::from_path(path).map_err(|e| read_error(e.to_string()))?;

    // Records deserialize into an unordered map; the declared field order
    // has to come from the dbf header. The name heuristic depends on it:
    // within a precedence tier, the first declared field wins.
    let field_order: Vec<String> = dbase::Reader::from_path(path.with_extension("dbf"))
        .map_err(|e| read_error(e.to_string()))?
        .fields()
        .iter()
        .map(|f| f.name().to_string())
        .collect();

    let header_bbox = &reader.header().bbox;
    let bbox = [
        header_bbox.min.x,
        header_bbox.min.y,
        header_bbox.max.x,
        header_bbox.max.y,
    ];

    let mut series_by_property: IndexMap<String, Vec<Value>> = properties
        .iter()
        .map(|p| (p.clone(), Vec::new()))
        .collect();
    let mut first_feature_properties = None;
    let mut missing_values = 0usize;

    for shape_record in reader.iter_shapes_and_records() {
        let (_shape, record) = shape_record.map_err(|e| read_error(e.to_string()))?;

        if first_feature_properties.is_none() {
            let mut props = IndexMap::new();
            for name in &field_order {
                if let Some(value) = record.get(name) {
                    props.insert(name.clone(), field_to_value(value));
                }
            }
            first_feature_properties = Some(props);
        }

        for (property, values) in series_by_property.iter_mut() {
            let value = record
                .get(property)
                .map(field_to_value)
                .unwrap_or(Value::Null);
            if value.is_null() {
                missing_values += 1;
            }
            values.push(value);
        }
    }

    Ok(ExtractedColumns {
        bbox,
        first_feature_properties: first_feature_properties.unwrap_or_default(),
        series_by_property,
        missing_values,
    })
}

/// Map a dBASE field value onto JSON. Absent optionals become null, which
/// downstream counts as a missing value.
fn field_to_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::Character(opt) => opt
            .as_ref()
            .map(|s| Value::String(s.clone()))
            .unwrap_or(Value::Null),
        FieldValue::Numeric(opt) => opt.map(number).unwrap_or(Value::Null),
        FieldValue::Float(opt) => opt.map(|f| number(f64::from(f))).unwrap_or(Value::Null),
        FieldValue::Logical(opt) => opt.map(Value::Bool).unwrap_or(Value::Null),
        FieldValue::Integer(i) => Value::from(*i),
        FieldValue::Double(d) | FieldValue::Currency(d) => number(*d),
        FieldValue::Date(opt) => opt
            .as_ref()
            .map(|d| Value::String(format!("{:04}-{:02}-{:02}", d.year(), d.month(), d.day())))
            .unwrap_or(Value::Null),
        FieldValue::DateTime(dt) => {
            let date = dt.date();
            let time = dt.time();
            Value::String(format!(
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                date.year(),
                date.month(),
                date.day(),
                time.hours(),
                time.minutes(),
                time.seconds()
            ))
        }
        FieldValue::Memo(s) => Value::String(s.clone()),
    }
}

fn number(n: f64) -> Value {
    serde_json::Number::from_f64(n)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}
