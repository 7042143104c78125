//! Fuzz target: render arbitrary templates against a fixed request.
//!
//! Rendering never fails, so the only thing checked is that it never panics
//! and that text without a `$` comes back unchanged.

#![no_main]

use std::collections::BTreeMap;

use libfuzzer_sys::fuzz_target;
use mimic_core::{InputBinding, Scope, TemplateInterpreter};
use serde_json::json;

fuzz_target!(|data: &[u8]| {
    let Ok(template) = std::str::from_utf8(data) else {
        return;
    };

    let mut stage_variables = BTreeMap::new();
    stage_variables.insert("table".to_owned(), "items".to_owned());
    let scope = Scope::new(
        InputBinding::from_payload(json!({ "name": "widget", "tags": ["a", "b"], "note": null })),
        json!({ "stage": "dev", "httpMethod": "GET" }),
        stage_variables,
    );

    let rendered = TemplateInterpreter::new().evaluate(template, &scope);
    if !template.contains('$') {
        assert_eq!(rendered, template, "token-free text must pass through unchanged");
    }
});
