//! Purpose: Stable JSON description of an opened store.
//! Exports: `store_info_json`, `validation_report_json`.
//! Role: Keep the info envelope consistent for every store kind and for diagnostics.
//! Invariants: Stable key names; kind-specific keys are emitted only when the kind has them.

use serde_json::{Map, Value, json};

use crate::core::format::StoreInfo;
use crate::core::validate::ValidationReport;

pub fn store_info_json(info: &StoreInfo) -> Value {
    let mut map = Map::new();
    map.insert("path".to_string(), json!(info.path.display().to_string()));
    map.insert("kind".to_string(), json!(info.kind.tag()));
    map.insert("len".to_string(), json!(info.len));
    map.insert("data_bytes".to_string(), json!(info.data_bytes));
    if let Some(dtype) = info.dtype {
        map.insert("dtype".to_string(), json!(dtype.name()));
    }
    if let Some(shape) = &info.shape {
        map.insert("shape".to_string(), json!(shape));
    }
    if let Some(order) = info.order {
        map.insert("order".to_string(), json!(order.tag()));
    }
    if let Some(flat) = info.shapes_are_flat {
        map.insert("shapes_are_flat".to_string(), json!(flat));
    }
    Value::Object(map)
}

pub fn validation_report_json(report: &ValidationReport) -> Value {
    let issues: Vec<Value> = report
        .issues
        .iter()
        .map(|issue| {
            let mut map = Map::new();
            map.insert("code".to_string(), json!(issue.code));
            map.insert("message".to_string(), json!(issue.message));
            if let Some(index) = issue.index {
                map.insert("index".to_string(), json!(index));
            }
            Value::Object(map)
        })
        .collect();
    json!({
        "path": report.path.display().to_string(),
        "kind": report.kind.tag(),
        "status": report.status,
        "issue_count": report.issue_count,
        "issues": issues,
    })
}

#[cfg(test)]
mod tests {
    use super::{store_info_json, validation_report_json};
    use crate::core::fixed::FixedArrayStore;
    use crate::core::ragged::RaggedArrayStore;
    use crate::core::strings::StringArrayStore;
    use crate::core::validate::validate_store;
    use ndarray::array;

    #[test]
    fn numpy_info_includes_shape_and_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FixedArrayStore::from_array(dir.path(), &array![[1.0f64, 2.0], [3.0, 4.0]])
            .expect("create");
        let value = store_info_json(&store.info());
        assert_eq!(value["kind"], "numpy");
        assert_eq!(value["dtype"], "float64");
        assert_eq!(value["shape"], serde_json::json!([2, 2]));
        assert_eq!(value["order"], "C");
        assert_eq!(value["data_bytes"], 32);
    }

    #[test]
    fn ragged_and_string_info_omit_dense_keys() {
        let root = tempfile::tempdir().expect("tempdir");
        let ragged =
            RaggedArrayStore::<u8>::from_elements(root.path().join("r"), vec![vec![1u8, 2]])
                .expect("ragged");
        let value = store_info_json(&ragged.info());
        assert_eq!(value["kind"], "ragged");
        assert_eq!(value["shapes_are_flat"], true);
        assert!(value.get("shape").is_none());

        let strings =
            StringArrayStore::from_strings(root.path().join("s"), ["abc"]).expect("strings");
        let value = store_info_json(&strings.info());
        assert_eq!(value["kind"], "string");
        assert_eq!(value["len"], 1);
        assert!(value.get("dtype").is_none());
    }

    #[test]
    fn report_json_lists_issues() {
        let dir = tempfile::tempdir().expect("tempdir");
        StringArrayStore::from_strings(dir.path(), ["abc"]).expect("strings");
        let report = validate_store(dir.path()).expect("validate");
        let value = validation_report_json(&report);
        assert_eq!(value["status"], "ok");
        assert_eq!(value["issues"], serde_json::json!([]));
    }
}
