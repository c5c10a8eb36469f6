use super::*;
use crate::data::loader::parse_csv;

fn sample_table() -> Table {
    parse_csv(
        "address,price,bedrooms,text_content\n\
         1 High St,250000,3,Bright terraced house near the park\n\
         2 Low Rd,199999.5,,\n\
         3 Mill Ln,410000,4,Detached family home with garden\n",
        None,
    )
    .expect("sample csv should parse")
}

#[test]
fn single_column_documents() {
    let table = sample_table();
    let documents = build_documents(&table, &TextColumns::from("text_content"))
        .expect("should build documents");

    assert_eq!(documents.len(), 3);
    assert_eq!(documents[0].id, 0);
    assert_eq!(documents[2].id, 2);
    assert_eq!(documents[0].text, "Bright terraced house near the park");

    let metadata = &documents[0].metadata;
    assert_eq!(metadata.len(), 3);
    assert!(!metadata.contains_key("text_content"));
    assert_eq!(metadata.get("price"), Some(&CellValue::Int(250_000)));
    assert_eq!(documents[0].source_file, None);
}

#[test]
fn null_text_becomes_empty_string() {
    let table = sample_table();
    let documents = build_documents(&table, &TextColumns::from("text_content"))
        .expect("should build documents");

    assert_eq!(documents[1].text, "");
    assert_eq!(documents[1].metadata.get("bedrooms"), Some(&CellValue::Null));
}

#[test]
fn combined_columns_join_in_order() {
    let table = sample_table();
    let columns = TextColumns::Combined(vec!["address".to_string(), "bedrooms".to_string()]);
    let documents = build_documents(&table, &columns).expect("should build documents");

    assert_eq!(documents[0].text, "1 High St | 3");
    assert_eq!(documents[1].text, "2 Low Rd | ");
    assert!(!documents[0].metadata.contains_key("address"));
    assert!(!documents[0].metadata.contains_key("bedrooms"));
    assert!(documents[0].metadata.contains_key("text_content"));
}

#[test]
fn missing_column_is_reported() {
    let table = sample_table();

    let result = build_documents(&table, &TextColumns::from("description"));
    assert!(matches!(result, Err(SearchError::MissingColumn(name)) if name == "description"));

    let columns = TextColumns::Combined(vec!["address".to_string(), "postcode".to_string()]);
    let result = build_documents(&table, &columns);
    assert!(matches!(result, Err(SearchError::MissingColumn(name)) if name == "postcode"));
}

#[test]
fn empty_column_list_is_a_config_error() {
    let table = sample_table();
    let result = build_documents(&table, &TextColumns::Combined(Vec::new()));
    assert!(matches!(result, Err(SearchError::Config(_))));
}

#[test]
fn combine_uses_custom_separator_and_float_forms() {
    let table = parse_csv("a,b\nflat,3.0\nhouse,2.5\n", None).expect("should parse");
    let combined = combine_text_columns(&table, &["a".to_string(), "b".to_string()], " - ")
        .expect("should combine");

    assert_eq!(combined, ["flat - 3.0", "house - 2.5"]);
}

#[test]
fn source_file_tagging() {
    let table = sample_table();
    let mut documents = build_documents(&table, &TextColumns::from("text_content"))
        .expect("should build documents");

    with_source_file(&mut documents, Path::new("data/listings.csv"));
    assert!(
        documents
            .iter()
            .all(|d| d.source_file.as_deref() == Some("data/listings.csv"))
    );
}

#[test]
fn document_payload_json_shape() {
    let table = sample_table();
    let documents = build_documents(&table, &TextColumns::from("text_content"))
        .expect("should build documents");

    let json = serde_json::to_value(&documents[1]).expect("should serialize");
    assert_eq!(json["id"], 1);
    assert_eq!(json["text"], "");
    assert_eq!(json["metadata"]["price"], 199_999.5);
    assert!(json["metadata"]["bedrooms"].is_null());
    assert!(json.get("source_file").is_none());
}
