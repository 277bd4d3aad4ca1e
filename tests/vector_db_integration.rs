//! Runs against a throwaway Qdrant container. Needs Docker:
//! `cargo test --test vector_db_integration -- --ignored`. Tests run one
//! container at a time.

use anyhow::Result;
use counsel_chat::domain::document::{DocumentChunk, EmbeddedChunk};
use counsel_chat::infrastructure::vector_db::VectorDb;
use counsel_chat::{CounselError, VectorRepository};
use serial_test::serial;
use std::time::Duration;
use testcontainers::core::{ContainerAsync, ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::GenericImage;

// Starts Qdrant and returns a store for a fresh collection
async fn setup_qdrant(collection: &str) -> Result<(VectorDb, ContainerAsync<GenericImage>)> {
    let image = GenericImage::new("qdrant/qdrant", "latest")
        .with_exposed_port(ContainerPort::Tcp(6334))
        .with_wait_for(WaitFor::message_on_stdout("Qdrant gRPC listening on 6334"));

    let container = image.start().await?;
    let grpc_port = container.get_host_port_ipv4(6334).await?;
    let qdrant_url = format!("http://localhost:{}", grpc_port);

    let collection_name = format!("{}_{}", collection, std::process::id());
    let vector_db = VectorDb::connect(&qdrant_url, None, Duration::from_secs(10), collection_name, 3)?;
    vector_db.ensure_collection().await?;
    Ok((vector_db, container))
}

fn embedded(text: &str, page: usize, vector: Vec<f32>) -> EmbeddedChunk {
    EmbeddedChunk {
        chunk: DocumentChunk {
            text: text.to_string(),
            source: "grouped_data.xlsx".to_string(),
            page: Some(page),
            section: Some("Seats".to_string()),
            chunk_index: 0,
        },
        vector,
    }
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_ensure_collection_is_idempotent() -> Result<()> {
    let (vector_db, _container) = setup_qdrant("idempotent").await?;
    vector_db.ensure_collection().await?;
    assert_eq!(vector_db.count().await?, 0);
    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_upsert_and_query() -> Result<()> {
    let (vector_db, _container) = setup_qdrant("upsert_query").await?;

    let chunks = vec![
        embedded("CSE (Computer Science and Engineering) - 120 seats", 1, vec![0.9, 0.1, 0.0]),
        embedded("EEE (Electrical and Electronics Engineering) - 60 seats", 1, vec![0.0, 0.2, 0.9]),
        embedded("Hostels have Wi-Fi and study rooms", 2, vec![0.1, 0.9, 0.1]),
    ];
    vector_db.upsert(&chunks).await?;
    assert_eq!(vector_db.count().await?, 3);

    let results = vector_db.query(vec![1.0, 0.0, 0.0], 2).await?;
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].text, "CSE (Computer Science and Engineering) - 120 seats");
    assert_eq!(results[0].source, "grouped_data.xlsx");
    assert_eq!(results[0].page, Some(1));
    assert_eq!(results[0].section.as_deref(), Some("Seats"));
    assert!(results[0].score >= results[1].score);
    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_reupserting_same_content_does_not_duplicate() -> Result<()> {
    let (vector_db, _container) = setup_qdrant("dedup").await?;

    let chunk = embedded("IT (Information Technology) - 120 seats", 1, vec![0.3, 0.3, 0.3]);
    vector_db.upsert(&[chunk.clone()]).await?;
    vector_db.upsert(&[chunk]).await?;
    assert_eq!(vector_db.count().await?, 1);
    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_query_with_wrong_dimension_is_rejected() -> Result<()> {
    let (vector_db, _container) = setup_qdrant("dimension").await?;
    let err = vector_db.query(vec![1.0, 0.0], 1).await.unwrap_err();
    assert!(matches!(err, CounselError::Configuration(_)));
    Ok(())
}
