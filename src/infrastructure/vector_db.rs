use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub use qdrant_client;
use self::qdrant_client::qdrant::value::Kind as QdrantValueKind;
use self::qdrant_client::qdrant::{
    CountPointsBuilder, CreateCollectionBuilder, Distance, PointStruct, SearchPointsBuilder,
    UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use self::qdrant_client::{Payload, Qdrant};

use crate::domain::document::{DocumentChunk, EmbeddedChunk, RetrievedChunk};
use crate::domain::vector_repository::VectorRepository;
use crate::error::{CounselError, CounselResult};

/// Namespace for content-addressed point ids.
const POINT_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6c0f_5e1a_93d4_4b8e_a1f2_2c7d_9e30_b415);

/// Payload stored next to every vector.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChunkPayload {
    pub text: String,
    pub source: String,
    #[serde(default)]
    pub page: Option<usize>,
    #[serde(default)]
    pub section: Option<String>,
    pub chunk_index: usize,
}

impl From<&DocumentChunk> for ChunkPayload {
    fn from(chunk: &DocumentChunk) -> Self {
        Self {
            text: chunk.text.clone(),
            source: chunk.source.clone(),
            page: chunk.page,
            section: chunk.section.clone(),
            chunk_index: chunk.chunk_index,
        }
    }
}

/// Deterministic point id: identical source and text map to the same point.
pub fn point_id_for(chunk: &DocumentChunk) -> Uuid {
    let key = format!("{}\u{1f}{}", chunk.source, chunk.text);
    Uuid::new_v5(&POINT_ID_NAMESPACE, key.as_bytes())
}

/// Qdrant-backed [`VectorRepository`] for a single cosine collection.
pub struct VectorDb {
    client: Qdrant,
    collection_name: String,
    vector_size: u64,
}

impl VectorDb {
    pub fn new(client: Qdrant, collection_name: String, vector_size: u64) -> CounselResult<Self> {
        if collection_name.is_empty() {
            return Err(CounselError::Configuration("collection name cannot be empty".to_string()));
        }
        if vector_size == 0 {
            return Err(CounselError::Configuration("vector size must be greater than zero".to_string()));
        }
        Ok(Self { client, collection_name, vector_size })
    }

    /// Builds a gRPC client for `url`, authenticating with `api_key` when given.
    pub fn connect(
        url: &str,
        api_key: Option<String>,
        timeout: std::time::Duration,
        collection_name: String,
        vector_size: u64,
    ) -> CounselResult<Self> {
        let client = Qdrant::from_url(url)
            .api_key(api_key)
            .timeout(timeout)
            .build()
            .map_err(|e| CounselError::Configuration(format!("invalid Qdrant client settings for {}: {}", url, e)))?;
        Self::new(client, collection_name, vector_size)
    }

    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    fn unavailable(&self, action: &str, e: impl std::fmt::Display) -> CounselError {
        log::error!("Qdrant {} failed for collection '{}': {}", action, self.collection_name, e);
        CounselError::StoreUnavailable(format!("{} failed for collection '{}'", action, self.collection_name))
    }

    fn to_point(chunk: &EmbeddedChunk) -> CounselResult<PointStruct> {
        let payload_value = serde_json::to_value(ChunkPayload::from(&chunk.chunk))
            .map_err(|e| CounselError::Data(format!("failed to serialize chunk payload: {}", e)))?;
        let payload = Payload::try_from(payload_value)
            .map_err(|e| CounselError::Data(format!("failed to convert chunk payload: {}", e)))?;
        Ok(PointStruct::new(
            point_id_for(&chunk.chunk).to_string(),
            chunk.vector.clone(),
            payload,
        ))
    }
}

/// Converts a Qdrant payload value back into JSON.
fn qdrant_value_to_json(value: QdrantValue) -> serde_json::Value {
    match value.kind {
        Some(QdrantValueKind::NullValue(_)) | None => serde_json::Value::Null,
        Some(QdrantValueKind::BoolValue(b)) => serde_json::Value::Bool(b),
        Some(QdrantValueKind::DoubleValue(d)) => serde_json::Number::from_f64(d)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Some(QdrantValueKind::IntegerValue(i)) => serde_json::Value::Number(i.into()),
        Some(QdrantValueKind::StringValue(s)) => serde_json::Value::String(s),
        Some(QdrantValueKind::ListValue(list)) => {
            serde_json::Value::Array(list.values.into_iter().map(qdrant_value_to_json).collect())
        }
        Some(QdrantValueKind::StructValue(s)) => payload_to_json(s.fields),
    }
}

fn payload_to_json(fields: HashMap<String, QdrantValue>) -> serde_json::Value {
    serde_json::Value::Object(
        fields
            .into_iter()
            .map(|(key, value)| (key, qdrant_value_to_json(value)))
            .collect(),
    )
}

#[async_trait]
impl VectorRepository for VectorDb {
    async fn ensure_collection(&self) -> CounselResult<()> {
        log::info!("Checking if collection '{}' exists...", self.collection_name);
        let exists = self
            .client
            .collection_exists(self.collection_name.clone())
            .await
            .map_err(|e| self.unavailable("existence check", e))?;
        if exists {
            log::info!("Collection '{}' already exists.", self.collection_name);
            return Ok(());
        }

        log::info!(
            "Creating collection '{}' with size {} and distance Cosine...",
            self.collection_name,
            self.vector_size
        );
        self.client
            .create_collection(
                CreateCollectionBuilder::new(self.collection_name.clone())
                    .vectors_config(VectorParamsBuilder::new(self.vector_size, Distance::Cosine)),
            )
            .await
            .map_err(|e| self.unavailable("collection creation", e))?;
        log::info!("Created collection '{}'.", self.collection_name);
        Ok(())
    }

    async fn upsert(&self, chunks: &[EmbeddedChunk]) -> CounselResult<()> {
        if chunks.is_empty() {
            log::info!("No chunks provided for upsert.");
            return Ok(());
        }
        if let Some(bad) = chunks.iter().find(|c| c.vector.len() as u64 != self.vector_size) {
            return Err(CounselError::Data(format!(
                "chunk vector dimension ({}) does not match collection dimension ({})",
                bad.vector.len(),
                self.vector_size
            )));
        }

        let points = chunks.iter().map(Self::to_point).collect::<CounselResult<Vec<_>>>()?;
        let points_count = points.len();
        log::info!("Upserting {} points into collection '{}'...", points_count, self.collection_name);

        let response = self
            .client
            .upsert_points(UpsertPointsBuilder::new(self.collection_name.clone(), points).wait(true))
            .await
            .map_err(|e| self.unavailable("upsert", e))?;
        log::debug!("Upsert response: {:?}", response);
        log::info!("Upserted {} points.", points_count);
        Ok(())
    }

    async fn query(&self, vector: Vec<f32>, k: usize) -> CounselResult<Vec<RetrievedChunk>> {
        if vector.len() as u64 != self.vector_size {
            return Err(CounselError::Configuration(format!(
                "Query vector dimension ({}) does not match collection dimension ({})",
                vector.len(),
                self.vector_size
            )));
        }
        log::debug!("Searching collection '{}' with limit {}...", self.collection_name, k);

        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(self.collection_name.clone(), vector, k as u64).with_payload(true),
            )
            .await
            .map_err(|e| self.unavailable("search", e))?;

        let results: Vec<RetrievedChunk> = response
            .result
            .into_iter()
            .filter_map(|scored_point| {
                if scored_point.payload.is_empty() {
                    log::warn!("Search result point {:?} has no payload, skipping.", scored_point.id);
                    return None;
                }
                match serde_json::from_value::<ChunkPayload>(payload_to_json(scored_point.payload)) {
                    Ok(payload) => Some(RetrievedChunk {
                        text: payload.text,
                        source: payload.source,
                        page: payload.page,
                        section: payload.section,
                        score: scored_point.score,
                    }),
                    Err(e) => {
                        log::error!("Failed to decode payload of point {:?}: {}", scored_point.id, e);
                        None
                    }
                }
            })
            .collect();

        log::info!("Search returned {} chunks.", results.len());
        Ok(results)
    }

    async fn count(&self) -> CounselResult<u64> {
        let response = self
            .client
            .count(CountPointsBuilder::new(self.collection_name.clone()).exact(true))
            .await
            .map_err(|e| self.unavailable("count", e))?;
        Ok(response.result.map(|r| r.count).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use self::qdrant_client::qdrant::{ListValue, Struct};

    fn chunk(source: &str, text: &str) -> DocumentChunk {
        DocumentChunk {
            text: text.to_string(),
            source: source.to_string(),
            page: Some(1),
            section: None,
            chunk_index: 0,
        }
    }

    #[test]
    fn test_point_id_is_content_addressed() {
        let a = chunk("grouped_data.xlsx", "CSE - 120 seats");
        let mut same = chunk("grouped_data.xlsx", "CSE - 120 seats");
        same.chunk_index = 7;
        let other = chunk("grouped_data.xlsx", "IT - 120 seats");

        assert_eq!(point_id_for(&a), point_id_for(&same));
        assert_ne!(point_id_for(&a), point_id_for(&other));
    }

    #[test]
    fn test_payload_round_trips_through_qdrant_values() {
        let payload = ChunkPayload {
            text: "CSE - 120 seats".to_string(),
            source: "grouped_data.xlsx".to_string(),
            page: Some(2),
            section: Some("Seats".to_string()),
            chunk_index: 3,
        };
        let qdrant_payload = Payload::try_from(serde_json::to_value(&payload).unwrap()).unwrap();
        let fields: HashMap<String, QdrantValue> = qdrant_payload.into();
        let decoded: ChunkPayload = serde_json::from_value(payload_to_json(fields)).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_nested_values_convert() {
        let list = QdrantValue {
            kind: Some(QdrantValueKind::ListValue(ListValue {
                values: vec![
                    QdrantValue { kind: Some(QdrantValueKind::IntegerValue(1)) },
                    QdrantValue { kind: Some(QdrantValueKind::StringValue("a".into())) },
                ],
            })),
        };
        let nested = QdrantValue {
            kind: Some(QdrantValueKind::StructValue(Struct {
                fields: HashMap::from([("ok".to_string(), QdrantValue { kind: Some(QdrantValueKind::BoolValue(true)) })]),
            })),
        };
        assert_eq!(qdrant_value_to_json(list), serde_json::json!([1, "a"]));
        assert_eq!(qdrant_value_to_json(nested), serde_json::json!({ "ok": true }));
    }

    #[test]
    fn test_vector_db_new_invalid_params() {
        let client = Qdrant::from_url("http://localhost:6334").build().expect("client builds lazily");
        assert!(VectorDb::new(client.clone(), "".to_string(), 3).is_err());
        assert!(VectorDb::new(client, "test".to_string(), 0).is_err());
    }
}
