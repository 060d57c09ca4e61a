use serde_json::Value;

/// Headline figure per command, as JSON pointers in order of priority.
const PRIORITY_POINTERS: [&str; 9] = [
    "/returns/lp/irr",
    "/result/returns/lp/irr",
    "/result/equity_value",
    "/result/final_total_debt",
    "/result/base_case_value",
    "/result/lp_irr/mean",
    "/result/total_leverage",
    "/completed",
    "/exit/equity_value",
];

/// Print just the key answer value from the output.
///
/// Falls back to the first field of the result object.
pub fn print_minimal(value: &Value) {
    for pointer in &PRIORITY_POINTERS {
        if let Some(val) = value.pointer(pointer) {
            if !val.is_null() {
                println!("{}", format_minimal(val));
                return;
            }
        }
    }

    let result_obj = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    if let Value::Object(map) = result_obj {
        if let Some((key, val)) = map.iter().next() {
            println!("{}: {}", key, format_minimal(val));
            return;
        }
    }

    println!("{}", format_minimal(result_obj));
}

fn format_minimal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
