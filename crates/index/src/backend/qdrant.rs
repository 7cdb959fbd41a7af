use async_trait::async_trait;
use qdrant_client::qdrant::{
    point_id::PointIdOptions, value::Kind, Condition, CreateCollectionBuilder,
    Distance as QdrantDistance, Filter, ListValue, OptimizersConfigDiffBuilder, PointId,
    PointStruct, Query, QueryPointsBuilder, ScrollPointsBuilder, Struct, UpsertPointsBuilder,
    Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::{Payload as QdrantPayload, Qdrant};
use serde_json::{Number, Value};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

use crate::backend::VectorStore;
use crate::types::{
    CollectionSpec, Distance, FieldCondition, MatchValue, Payload, PayloadFilter, PointRecord,
    ScoredRecord, VectorQuery,
};
use crate::IndexError;

/// Page size used when scrolling large collections.
const SCROLL_PAGE: usize = 256;

/// [`VectorStore`] backed by a Qdrant server (gRPC).
///
/// Qdrant only accepts unsigned integers or UUIDs as point ids. Other ids are mapped to a
/// UUIDv5 derived from the id, so re-indexing the same question overwrites the same point.
pub struct QdrantStore {
    client: Qdrant,
}

impl QdrantStore {
    /// Builds a client. No request is made until the first operation.
    pub fn connect(url: &str, api_key: Option<&str>, timeout: Duration) -> Result<Self, IndexError> {
        let mut builder = Qdrant::from_url(url)
            .timeout(timeout)
            .connect_timeout(timeout);
        if let Some(key) = api_key.filter(|k| !k.is_empty()) {
            builder = builder.api_key(key.to_string());
        }
        let client = builder.build().map_err(IndexError::backend)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn list_collections(&self) -> Result<Vec<String>, IndexError> {
        let response = self
            .client
            .list_collections()
            .await
            .map_err(IndexError::backend)?;
        Ok(response.collections.into_iter().map(|c| c.name).collect())
    }

    async fn create_collection(&self, name: &str, spec: &CollectionSpec) -> Result<(), IndexError> {
        let distance = match spec.distance {
            Distance::Cosine => QdrantDistance::Cosine,
            Distance::Dot => QdrantDistance::Dot,
            Distance::Euclid => QdrantDistance::Euclid,
        };
        let request = CreateCollectionBuilder::new(name)
            .vectors_config(VectorParamsBuilder::new(spec.dimension as u64, distance))
            .optimizers_config(
                OptimizersConfigDiffBuilder::default().default_segment_number(spec.segment_number),
            )
            .replication_factor(spec.replication_factor);

        let exists = self
            .client
            .collection_exists(name)
            .await
            .map_err(IndexError::backend)?;
        if exists {
            return Err(IndexError::AlreadyExists(name.to_string()));
        }

        self.client
            .create_collection(request)
            .await
            .map(|_| ())
            .map_err(IndexError::backend)
    }

    async fn delete_collection(&self, name: &str) -> Result<(), IndexError> {
        self.client
            .delete_collection(name)
            .await
            .map(|_| ())
            .map_err(IndexError::backend)
    }

    async fn upsert(&self, name: &str, points: Vec<PointRecord>, wait: bool) -> Result<(), IndexError> {
        let points: Vec<PointStruct> = points
            .into_iter()
            .map(|point| {
                let payload: HashMap<String, QdrantValue> = point
                    .payload
                    .into_iter()
                    .map(|(key, value)| (key, json_to_qdrant(value)))
                    .collect();
                PointStruct::new(
                    point_id_for(&point.id),
                    point.vector,
                    QdrantPayload::from(payload),
                )
            })
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(name, points).wait(wait))
            .await
            .map(|_| ())
            .map_err(IndexError::backend)
    }

    async fn search(&self, name: &str, query: &VectorQuery) -> Result<Vec<ScoredRecord>, IndexError> {
        let mut request = QueryPointsBuilder::new(name)
            .query(Query::new_nearest(query.vector.clone()))
            .limit(query.limit)
            .with_payload(true);
        if let Some(filter) = query.filter.as_ref().filter(|f| !f.is_empty()) {
            request = request.filter(to_qdrant_filter(filter));
        }
        if let Some(threshold) = query.score_threshold {
            request = request.score_threshold(threshold);
        }

        let response = self.client.query(request).await.map_err(IndexError::backend)?;
        Ok(response
            .result
            .into_iter()
            .map(|point| ScoredRecord {
                id: point_id_string(point.id.as_ref()),
                score: point.score,
                payload: qdrant_payload_to_json(point.payload),
            })
            .collect())
    }

    async fn point_count(&self, name: &str) -> Result<u64, IndexError> {
        let info = self
            .client
            .collection_info(name)
            .await
            .map_err(IndexError::backend)?;
        Ok(info.result.and_then(|r| r.points_count).unwrap_or(0))
    }

    async fn scroll(&self, name: &str, limit: usize) -> Result<Vec<Payload>, IndexError> {
        let mut payloads = Vec::with_capacity(limit.min(SCROLL_PAGE * 8));
        let mut offset: Option<PointId> = None;

        while payloads.len() < limit {
            let page = (limit - payloads.len()).min(SCROLL_PAGE) as u32;
            let mut request = ScrollPointsBuilder::new(name)
                .limit(page)
                .with_payload(true)
                .with_vectors(false);
            if let Some(next) = offset.take() {
                request = request.offset(next);
            }

            let response = self.client.scroll(request).await.map_err(IndexError::backend)?;
            payloads.extend(
                response
                    .result
                    .into_iter()
                    .map(|point| qdrant_payload_to_json(point.payload)),
            );

            match response.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        payloads.truncate(limit);
        Ok(payloads)
    }
}

fn point_id_for(id: &str) -> PointId {
    if let Ok(num) = id.parse::<u64>() {
        return PointId::from(num);
    }
    let uuid = Uuid::parse_str(id).unwrap_or_else(|_| Uuid::new_v5(&Uuid::NAMESPACE_OID, id.as_bytes()));
    PointId::from(uuid.to_string())
}

fn point_id_string(id: Option<&PointId>) -> String {
    match id.and_then(|id| id.point_id_options.as_ref()) {
        Some(PointIdOptions::Num(num)) => num.to_string(),
        Some(PointIdOptions::Uuid(uuid)) => uuid.clone(),
        None => String::new(),
    }
}

fn to_qdrant_condition(condition: &FieldCondition) -> Condition {
    match &condition.matches {
        MatchValue::Keyword(value) => Condition::matches(condition.key.clone(), value.clone()),
        MatchValue::Integer(value) => Condition::matches(condition.key.clone(), *value),
        MatchValue::AnyKeyword(values) => Condition::matches(condition.key.clone(), values.clone()),
    }
}

fn to_qdrant_filter(filter: &PayloadFilter) -> Filter {
    let mut out = Filter::must(filter.must.iter().map(to_qdrant_condition));
    out.must_not = filter.must_not.iter().map(to_qdrant_condition).collect();
    out
}

fn json_to_qdrant(value: Value) -> QdrantValue {
    let kind = match value {
        Value::Null => Kind::NullValue(0),
        Value::Bool(b) => Kind::BoolValue(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Kind::IntegerValue(i),
            None => Kind::DoubleValue(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => Kind::StringValue(s),
        Value::Array(items) => Kind::ListValue(ListValue {
            values: items.into_iter().map(json_to_qdrant).collect(),
        }),
        Value::Object(map) => Kind::StructValue(Struct {
            fields: map.into_iter().map(|(k, v)| (k, json_to_qdrant(v))).collect(),
        }),
    };
    QdrantValue { kind: Some(kind) }
}

fn qdrant_to_json(value: QdrantValue) -> Value {
    match value.kind {
        None | Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::IntegerValue(i)) => Value::Number(i.into()),
        Some(Kind::DoubleValue(d)) => Number::from_f64(d).map(Value::Number).unwrap_or(Value::Null),
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::ListValue(list)) => {
            Value::Array(list.values.into_iter().map(qdrant_to_json).collect())
        }
        Some(Kind::StructValue(st)) => Value::Object(
            st.fields
                .into_iter()
                .map(|(k, v)| (k, qdrant_to_json(v)))
                .collect(),
        ),
    }
}

fn qdrant_payload_to_json(payload: HashMap<String, QdrantValue>) -> Payload {
    payload
        .into_iter()
        .map(|(key, value)| (key, qdrant_to_json(value)))
        .collect()
}
