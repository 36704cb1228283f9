//! LanceDB Vector Index - 읽기 전용 ANN 검색
//!
//! 테이블 스키마: `doc_id`(Int64), `chunk_index`(Int32), `chunk_text`(Utf8),
//! `embedding`(FixedSizeList<Float32, 768>)
//! ref: https://lancedb.github.io/lancedb/

use std::path::Path;

use anyhow::{Context, Result};
use arrow_array::{Array, Float32Array, Int32Array, Int64Array, RecordBatch, StringArray};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};

use super::vector::{distance_to_similarity, VectorHit, VectorIndex};

/// 벡터 테이블 이름
pub const TABLE_NAME: &str = "vectors";

// ============================================================================
// LanceVectorIndex
// ============================================================================

/// LanceDB 벡터 인덱스
pub struct LanceVectorIndex {
    db: Connection,
}

impl LanceVectorIndex {
    /// 기존 .lance 디렉토리 열기
    ///
    /// 디렉토리가 없으면 에러입니다 (검색 경로에서는 생성하지 않음).
    pub async fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Vector index not found at {:?}", path);
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid path encoding"))?;

        let db = lancedb::connect(path_str)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        Ok(Self { db })
    }

    /// 테이블 존재 여부 확인
    async fn table_exists(&self) -> bool {
        self.db
            .table_names()
            .execute()
            .await
            .map(|names| names.iter().any(|n| n == TABLE_NAME))
            .unwrap_or(false)
    }

    async fn open_table(&self) -> Result<Option<lancedb::table::Table>> {
        if !self.table_exists().await {
            return Ok(None);
        }

        let table = self
            .db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .context("Failed to open vector table")?;
        Ok(Some(table))
    }
}

#[async_trait]
impl VectorIndex for LanceVectorIndex {
    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<VectorHit>> {
        let Some(table) = self.open_table().await? else {
            return Ok(vec![]);
        };

        let stream = table
            .vector_search(query_embedding.to_vec())
            .context("Failed to create vector search")?
            .limit(limit)
            .execute()
            .await
            .context("Failed to execute vector search")?;

        let batches: Vec<RecordBatch> = stream.try_collect().await?;

        let mut hits = Vec::new();
        for batch in &batches {
            hits.extend(batch_to_hits(batch)?);
        }

        Ok(hits)
    }

    async fn count(&self) -> Result<usize> {
        let Some(table) = self.open_table().await? else {
            return Ok(0);
        };

        table.count_rows(None).await.context("Failed to count rows")
    }
}

/// RecordBatch에서 검색 결과 추출
fn batch_to_hits(batch: &RecordBatch) -> Result<Vec<VectorHit>> {
    let doc_ids = batch
        .column_by_name("doc_id")
        .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
        .ok_or_else(|| anyhow::anyhow!("Missing doc_id column"))?;

    let chunk_indices = batch
        .column_by_name("chunk_index")
        .and_then(|c| c.as_any().downcast_ref::<Int32Array>())
        .ok_or_else(|| anyhow::anyhow!("Missing chunk_index column"))?;

    let chunk_texts = batch
        .column_by_name("chunk_text")
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow::anyhow!("Missing chunk_text column"))?;

    // _distance 컬럼 (LanceDB가 자동 추가)
    let distances = batch
        .column_by_name("_distance")
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
        .ok_or_else(|| anyhow::anyhow!("Missing _distance column"))?;

    Ok((0..batch.num_rows())
        .map(|i| VectorHit {
            doc_id: doc_ids.value(i),
            chunk_index: chunk_indices.value(i),
            chunk_text: chunk_texts.value(i).to_string(),
            similarity: distance_to_similarity(distances.value(i)),
        })
        .collect())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::vector::EMBEDDING_DIMENSION;
    use arrow_array::{FixedSizeListArray, RecordBatchIterator};
    use arrow_schema::{DataType, Field, Schema};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("doc_id", DataType::Int64, false),
            Field::new("chunk_index", DataType::Int32, false),
            Field::new("chunk_text", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    EMBEDDING_DIMENSION,
                ),
                false,
            ),
        ])
    }

    /// 인제스트 파이프라인 대신 테스트 픽스처를 직접 기록
    async fn write_fixture(path: &Path, rows: &[(i64, f32)]) {
        let doc_ids: Vec<i64> = rows.iter().map(|(id, _)| *id).collect();
        let chunk_indices: Vec<i32> = rows.iter().map(|_| 0).collect();
        let texts: Vec<String> = rows.iter().map(|(id, _)| format!("chunk for doc {}", id)).collect();
        let flat: Vec<f32> = rows
            .iter()
            .flat_map(|(_, v)| std::iter::repeat(*v).take(EMBEDDING_DIMENSION as usize))
            .collect();

        let embeddings = FixedSizeListArray::try_new(
            Arc::new(Field::new("item", DataType::Float32, true)),
            EMBEDDING_DIMENSION,
            Arc::new(Float32Array::from(flat)) as Arc<dyn Array>,
            None,
        )
        .unwrap();

        let schema = Arc::new(schema());
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int64Array::from(doc_ids)),
                Arc::new(Int32Array::from(chunk_indices)),
                Arc::new(StringArray::from(texts)),
                Arc::new(embeddings),
            ],
        )
        .unwrap();

        let db = lancedb::connect(path.to_str().unwrap()).execute().await.unwrap();
        db.create_table(TABLE_NAME, RecordBatchIterator::new(vec![Ok(batch)], schema))
            .execute()
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_open_missing_index_fails() {
        let temp_dir = TempDir::new().unwrap();
        assert!(LanceVectorIndex::open(&temp_dir.path().join("missing.lance")).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_index() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("empty.lance");
        std::fs::create_dir_all(&path).unwrap();

        let index = LanceVectorIndex::open(&path).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 0);
        assert!(index.search(&[0.1; 768], 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_nearest_first() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("vectors.lance");
        write_fixture(&path, &[(1, 0.1), (2, 0.5), (3, 0.9)]).await;

        let index = LanceVectorIndex::open(&path).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 3);

        let hits = index.search(&[0.1; 768], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].doc_id, 1);
        assert!((hits[0].similarity - 1.0).abs() < 1e-6);
        assert!(hits[0].similarity > hits[1].similarity);
        assert_eq!(hits[0].chunk_text, "chunk for doc 1");
    }
}
