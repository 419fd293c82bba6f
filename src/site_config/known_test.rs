use serde_json::json;

use super::*;

fn config(value: Value) -> SiteConfig {
    serde_json::from_value(value).unwrap()
}

#[test]
fn default_exam_categories_are_the_six_builtins() {
    assert_eq!(
        default_exam_categories(),
        vec!["All Exams", "JEE Main/Advanced", "NEET", "Banking", "SSC", "GATE"]
    );
}

#[test]
fn known_key_round_trips_name() {
    assert_eq!(KnownKey::parse("examCategories"), Some(KnownKey::ExamCategories));
    assert_eq!(KnownKey::ExamCategories.as_str(), "examCategories");
    assert_eq!(KnownKey::parse("exam_categories"), None);
}

#[test]
fn parse_exam_categories_list() {
    let value = ConfigValue::parse("examCategories", &json!(["A", "B"])).unwrap();
    assert_eq!(value, ConfigValue::ExamCategories(vec!["A".into(), "B".into()]));
}

#[test]
fn parse_rejects_non_string_items() {
    let err = ConfigValue::parse("examCategories", &json!(["A", 2])).unwrap_err();
    assert_eq!(err, ConfigValueError::Malformed { key: "examCategories", expected: "an array of strings" });
}

#[test]
fn parse_unknown_key_passes_through() {
    let value = ConfigValue::parse("bannerText", &json!({ "title": "Hi" })).unwrap();
    assert_eq!(value, ConfigValue::Unknown(json!({ "title": "Hi" })));
}

#[test]
fn exam_categories_present_are_returned_verbatim() {
    let cfg = config(json!({ "examCategories": ["A", "B"] }));
    assert_eq!(cfg.exam_categories_or_default(), vec!["A", "B"]);
}

#[test]
fn exam_categories_absent_fall_back() {
    let cfg = config(json!({}));
    assert!(cfg.exam_categories().is_none());
    assert_eq!(cfg.exam_categories_or_default(), default_exam_categories());
}

#[test]
fn exam_categories_empty_fall_back() {
    let cfg = config(json!({ "examCategories": [] }));
    assert_eq!(cfg.exam_categories_or_default(), default_exam_categories());
}

#[test]
fn exam_categories_malformed_fall_back() {
    let cfg = config(json!({ "examCategories": "NEET,SSC" }));
    assert!(matches!(cfg.typed("examCategories"), Some(Err(_))));
    assert_eq!(cfg.exam_categories_or_default(), default_exam_categories());
}
