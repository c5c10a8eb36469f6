use super::*;
use crate::config::EmbeddingStrategy;
use crate::data::CellValue;
use crate::data::loader::parse_csv;
use std::collections::BTreeSet;
use std::fs;
use tempfile::TempDir;

const LISTINGS_CSV: &str = "address,price,text_content\n\
    1 High St,250000,Bright terraced house near the park with a sunny garden\n\
    2 Low Rd,199000,Compact city flat above shops close to the railway station\n\
    3 Mill Ln,410000,Detached farmhouse with stables paddock and countryside views\n";

fn fitted_config(temp_dir: &TempDir) -> Config {
    let mut config = Config {
        base_dir: temp_dir.path().to_path_buf(),
        ..Config::default()
    };
    config.embedding.strategy = EmbeddingStrategy::Fitted;
    config.database.collection = "listings".to_string();
    config.database.batch_size = 3;
    config.data.data_dir = temp_dir.path().join("data");
    config
}

fn ingestor(config: &Config) -> Ingestor {
    Ingestor::from_config(config.clone()).expect("should build ingestor")
}

fn listings() -> Table {
    parse_csv(LISTINGS_CSV, None).expect("listings should parse")
}

fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    fs::create_dir_all(dir).expect("should create dir");
    let path = dir.join(name);
    fs::write(&path, contents).expect("should write file");
    path
}

#[tokio::test]
async fn exact_text_is_top_result() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = fitted_config(&temp_dir);
    let mut ingestor = ingestor(&config);

    let report = ingestor
        .ingest_table(&listings(), &TextColumns::from("text_content"), true)
        .await
        .expect("ingestion should succeed");
    assert_eq!(report.documents, 3);
    assert_eq!(report.first_id, 0);
    assert_eq!(report.collection, "listings");

    let query = "Detached farmhouse with stables paddock and countryside views";
    let results = ingestor
        .search(query, 3)
        .await
        .expect("embedder should work")
        .into_result()
        .expect("search should succeed");

    assert_eq!(results[0].data.text, query);
    assert!((results[0].score - 1.0).abs() < 1e-4);
}

#[tokio::test]
async fn search_returns_metadata_of_matching_record() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = fitted_config(&temp_dir);
    let mut ingestor = ingestor(&config);

    ingestor
        .ingest_table(&listings(), &TextColumns::from("text_content"), true)
        .await
        .expect("ingestion should succeed");

    let results = ingestor
        .search(
            "Compact city flat above shops close to the railway station",
            1,
        )
        .await
        .expect("embedder should work")
        .into_result()
        .expect("search should succeed");

    assert_eq!(results.len(), 1);
    let metadata = &results[0].data.metadata;
    assert_eq!(metadata.len(), 2);
    assert_eq!(
        metadata.get("address"),
        Some(&CellValue::Text("2 Low Rd".to_string()))
    );
    assert_eq!(metadata.get("price"), Some(&CellValue::Int(199_000)));
}

#[tokio::test]
async fn ids_cover_every_document_across_batches() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = fitted_config(&temp_dir);
    let mut ingestor = ingestor(&config);

    let csv: String = std::iter::once("text".to_string())
        .chain((0..7).map(|i| format!("listing number {} with garden", i)))
        .collect::<Vec<_>>()
        .join("\n");
    let table = parse_csv(&csv, None).expect("should parse");

    let report = ingestor
        .ingest_table(&table, &TextColumns::from("text"), true)
        .await
        .expect("ingestion should succeed");
    assert_eq!(report.batches, 3);

    let results = ingestor
        .search("garden", 10)
        .await
        .expect("embedder should work")
        .into_result()
        .expect("search should succeed");
    let ids: BTreeSet<u64> = results.iter().map(|r| r.data.id).collect();
    assert_eq!(ids, (0..7).collect());

    let validation = ingestor.validate(7).await.expect("should validate");
    assert_eq!(
        validation,
        ValidationReport {
            expected: 7,
            actual: Some(7),
            matched: true,
        }
    );
}

#[tokio::test]
async fn append_does_not_collide_ids() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = fitted_config(&temp_dir);
    let mut ingestor = ingestor(&config);

    ingestor
        .ingest_table(&listings(), &TextColumns::from("text_content"), true)
        .await
        .expect("ingestion should succeed");

    let extra = parse_csv(
        "address,price,text_content\n4 New Cl,300000,Garden flat near the park\n5 Old Way,150000,Railway cottage\n",
        None,
    )
    .expect("should parse");
    let report = ingestor
        .ingest_table(&extra, &TextColumns::from("text_content"), false)
        .await
        .expect("append should succeed");

    assert_eq!(report.first_id, 3);
    let validation = ingestor.validate(5).await.expect("should validate");
    assert!(validation.matched);
}

#[tokio::test]
async fn append_to_missing_collection_creates_it() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = fitted_config(&temp_dir);
    let mut ingestor = ingestor(&config);

    let report = ingestor
        .ingest_table(&listings(), &TextColumns::from("text_content"), false)
        .await
        .expect("append should succeed");

    assert_eq!(report.first_id, 0);
    assert!(ingestor.validate(3).await.expect("should validate").matched);
}

fn collection_dir(temp_dir: &TempDir) -> PathBuf {
    temp_dir.path().join("vectors").join("listings.lance")
}

#[tokio::test]
async fn append_to_unreadable_collection_leaves_it_in_place() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = fitted_config(&temp_dir);
    let mut ingestor = ingestor(&config);
    ingestor
        .ingest_table(&listings(), &TextColumns::from("text_content"), true)
        .await
        .expect("ingestion should succeed");

    let versions = collection_dir(&temp_dir).join("_versions");
    let hidden = collection_dir(&temp_dir).join("_versions.hidden");
    fs::rename(&versions, &hidden).expect("should hide versions");

    let extra = parse_csv("text_content\nCanal side narrowboat mooring\n", None)
        .expect("extra listing should parse");
    let appended = ingestor
        .ingest_table(&extra, &TextColumns::from("text_content"), false)
        .await;
    assert!(appended.is_err());

    fs::rename(&hidden, &versions).expect("should restore versions");
    let validation = ingestor.validate(3).await.expect("should validate");
    assert_eq!(validation.actual, Some(3));
}

#[tokio::test]
async fn append_without_saved_vocabulary_is_refused() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = fitted_config(&temp_dir);
    ingestor(&config)
        .ingest_table(&listings(), &TextColumns::from("text_content"), true)
        .await
        .expect("ingestion should succeed");

    let state_path = config.vectorizer_state_path();
    fs::remove_file(&state_path).expect("should remove vocabulary");

    let mut appender = ingestor(&config);
    let appended = appender
        .ingest_table(&listings(), &TextColumns::from("text_content"), false)
        .await;

    assert!(matches!(appended, Err(SearchError::NotFitted)));
    assert!(!state_path.exists());
    assert!(appender.embedder().needs_fit());
    let validation = appender.validate(3).await.expect("should validate");
    assert!(validation.matched);
}

#[tokio::test]
async fn failed_rebuild_keeps_previous_vocabulary() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = fitted_config(&temp_dir);
    let mut ingestor = ingestor(&config);
    ingestor
        .ingest_table(&listings(), &TextColumns::from("text_content"), true)
        .await
        .expect("ingestion should succeed");

    let state_path = config.vectorizer_state_path();
    let saved_state = fs::read(&state_path).expect("vocabulary should be saved");
    let dimension = ingestor.embedder().dimension().expect("should be fitted");

    // A plain file where the table directory belongs makes the rebuild fail after fitting
    fs::remove_dir_all(collection_dir(&temp_dir)).expect("should remove collection");
    fs::write(collection_dir(&temp_dir), "not a table").expect("should write blocker");

    let replacement = parse_csv("text_content\nStudio flat\n", None).expect("should parse");
    let rebuilt = ingestor
        .ingest_table(&replacement, &TextColumns::from("text_content"), true)
        .await;

    assert!(rebuilt.is_err());
    assert_eq!(fs::read(&state_path).expect("vocabulary should remain"), saved_state);
    assert_eq!(
        ingestor.embedder().dimension().expect("should stay fitted"),
        dimension
    );
}

#[tokio::test]
async fn multiple_files_share_one_id_sequence() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = fitted_config(&temp_dir);
    let data_dir = temp_dir.path().join("data");
    let first = write_file(&data_dir, "north.csv", "text,beds\nnorth cottage,2\nnorth barn,4\n");
    let second = write_file(&data_dir, "south.csv", "text,beds\nsouth villa,5\n");

    let mut ingestor = ingestor(&config);
    let report = ingestor
        .ingest_files(&[first.clone(), second.clone()], "text", true)
        .await
        .expect("ingestion should succeed");
    assert_eq!(report.documents, 3);

    let results = ingestor
        .search("south villa", 1)
        .await
        .expect("embedder should work")
        .into_result()
        .expect("search should succeed");
    assert_eq!(results[0].data.id, 2);
    assert_eq!(
        results[0].data.source_file.as_deref(),
        Some(second.display().to_string().as_str())
    );
    assert_eq!(results[0].data.metadata.get("beds"), Some(&CellValue::Int(5)));
}

#[tokio::test]
async fn missing_text_column_aborts_before_writing() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = fitted_config(&temp_dir);
    let mut ingestor = ingestor(&config);

    let result = ingestor
        .ingest_table(&listings(), &TextColumns::from("description"), true)
        .await;
    assert!(matches!(result, Err(SearchError::MissingColumn(_))));

    let validation = ingestor.validate(0).await.expect("should validate");
    assert_eq!(validation.actual, None);
    assert!(!validation.matched);
}

#[tokio::test]
async fn empty_table_is_rejected() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = fitted_config(&temp_dir);
    let mut ingestor = ingestor(&config);

    let table = parse_csv("text\n", None).expect("should parse");
    let result = ingestor
        .ingest_table(&table, &TextColumns::from("text"), true)
        .await;
    assert!(matches!(result, Err(SearchError::Data(_))));
}

#[tokio::test]
async fn property_data_pipeline_and_persisted_vocabulary() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = fitted_config(&temp_dir);
    write_file(
        &temp_dir.path().join("data"),
        "property_data.csv",
        "address,price,type\n1 High St,250000,terraced house\n2 Low Rd,199000,city flat\n",
    );

    let mut ingestor = ingestor(&config);
    let report = ingestor
        .ingest_property_data()
        .await
        .expect("ingestion should succeed");
    assert_eq!(report.documents, 2);
    assert!(config.vectorizer_state_path().exists());

    // A fresh process picks up the fitted vocabulary from disk
    let reader = Ingestor::from_config(config.clone()).expect("should build ingestor");
    let results = reader
        .search("city flat", 1)
        .await
        .expect("persisted vectorizer should embed")
        .into_result()
        .expect("search should succeed");
    assert_eq!(results[0].data.text, "2 Low Rd | city flat");
    assert_eq!(
        results[0].data.metadata.get("type"),
        Some(&CellValue::Text("city flat".to_string()))
    );
}
