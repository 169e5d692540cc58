use pipewright::core::path;
use serde_json::json;

#[test]
fn get_descends_objects_and_array_indices() {
    let doc = json!({"user": {"tags": ["a", "b"], "name": "Ada"}});
    assert_eq!(path::get(&doc, "user.name"), Some(&json!("Ada")));
    assert_eq!(path::get(&doc, "user.tags.1"), Some(&json!("b")));
    assert_eq!(path::get(&doc, ""), Some(&doc));
}

#[test]
fn get_reports_absence_instead_of_failing() {
    let doc = json!({"user": {"name": "Ada"}, "count": 3});
    assert_eq!(path::get(&doc, "user.email"), None);
    assert_eq!(path::get(&doc, "count.value"), None);
    assert_eq!(path::get(&doc, "user.name.first"), None);
    assert_eq!(path::get(&doc, "user.tags.x"), None);
}

#[test]
fn set_creates_intermediate_objects() {
    let mut doc = json!({});
    path::set(&mut doc, "a.b.c", json!(1));
    assert_eq!(doc, json!({"a": {"b": {"c": 1}}}));

    path::set(&mut doc, "", json!([1, 2]));
    assert_eq!(doc, json!([1, 2]));
}

#[test]
fn remove_detaches_value() {
    let mut doc = json!({"current": {"temp_c": 35, "humidity": 50}});
    assert_eq!(path::remove(&mut doc, "current.temp_c"), Some(json!(35)));
    assert_eq!(doc, json!({"current": {"humidity": 50}}));
    assert_eq!(path::remove(&mut doc, "current.missing"), None);
}

#[test]
fn substitute_renders_templates_recursively() {
    let context = json!({"input": {"city": "Oslo", "days": 3, "flags": {"metric": true}}});
    let value = json!({
        "url": "https://api/{{ input.city }}?d={{input.days}}",
        "params": ["{{ input.flags }}", "{{ input.unknown }}", 7]
    });
    assert_eq!(
        path::substitute(&value, &context),
        json!({
            "url": "https://api/Oslo?d=3",
            "params": ["{\"metric\":true}", "", 7]
        })
    );
    assert_eq!(
        path::template_bindings(&value),
        vec!["input.city", "input.days", "input.flags", "input.unknown"]
    );
}

#[test]
fn stringify_renders_scalars_as_template_text() {
    assert_eq!(path::stringify(None), "");
    assert_eq!(path::stringify(Some(&json!(null))), "");
    assert_eq!(path::stringify(Some(&json!("x"))), "x");
    assert_eq!(path::stringify(Some(&json!(2.5))), "2.5");
}
