#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use tempfile::TempDir;

use folio_harness::config::Config;
use folio_harness::embedding::Embedder;
use folio_harness::registry::JsonFileRegistry;
use folio_harness::store::memory::InMemoryVectorStore;
use folio_harness::models::SearchHit;
use folio_harness::store::{Filter, VectorRecord, VectorStore};
use folio_harness::Pipeline;

const DIMS: usize = 64;

/// Bag-of-words embedder: each lowercased word bumps one hashed dimension.
pub struct HashEmbedder;

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash-test"
    }

    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| hash_vector(t)).collect())
    }
}

fn hash_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let mut h: u64 = 0xcbf29ce484222325;
        for b in word.to_lowercase().bytes() {
            h ^= u64::from(b);
            h = h.wrapping_mul(0x100000001b3);
        }
        v[(h % DIMS as u64) as usize] += 1.0;
    }
    v
}

/// In-memory store whose upserts can be switched to fail.
pub struct FlakyStore {
    pub inner: Arc<InMemoryVectorStore>,
    pub fail_upserts: AtomicBool,
}

#[async_trait]
impl VectorStore for FlakyStore {
    async fn upsert(&self, records: &[VectorRecord]) -> anyhow::Result<()> {
        if self.fail_upserts.load(Ordering::SeqCst) {
            anyhow::bail!("vector store unavailable");
        }
        self.inner.upsert(records).await
    }

    async fn delete(&self, filter: &Filter) -> anyhow::Result<()> {
        self.inner.delete(filter).await
    }

    async fn ids(&self, filter: &Filter) -> anyhow::Result<Vec<String>> {
        self.inner.ids(filter).await
    }

    async fn delete_ids(&self, ids: &[String]) -> anyhow::Result<()> {
        self.inner.delete_ids(ids).await
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&Filter>,
    ) -> anyhow::Result<Vec<SearchHit>> {
        self.inner.query(vector, k, filter).await
    }
}

pub struct Harness {
    pub tmp: TempDir,
    pub store: Arc<InMemoryVectorStore>,
    pub pipeline: Pipeline,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryVectorStore::new());
        let vectors: Arc<dyn VectorStore> = store.clone();
        Self::with_vectors(store, vectors)
    }

    /// A harness whose pipeline writes through `vectors`; `store` is what
    /// tests inspect.
    pub fn with_vectors(store: Arc<InMemoryVectorStore>, vectors: Arc<dyn VectorStore>) -> Self {
        let tmp = TempDir::new().unwrap();
        let registry_path = tmp.path().join("data").join("registry.json");
        std::fs::create_dir_all(registry_path.parent().unwrap()).unwrap();

        let pipeline = Pipeline::new(
            Config::minimal(&registry_path),
            Arc::new(HashEmbedder),
            vectors,
            Arc::new(JsonFileRegistry::new(&registry_path)),
        );

        Self {
            tmp,
            store,
            pipeline,
        }
    }

    pub fn registry_path(&self) -> PathBuf {
        self.tmp.path().join("data").join("registry.json")
    }

    /// Write `bytes` under the temp dir and return the path.
    pub fn write_file(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let path = self.tmp.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }
}

/// A PDF with one page per entry of `pages`; each line is its own text block.
pub fn lines_pdf(pages: &[&[&str]]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for lines in pages {
        let mut operations = Vec::new();
        for (i, line) in lines.iter().enumerate() {
            let y = 760 - 24 * i as i64;
            operations.extend([
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 10.into()]),
                Operation::new("Td", vec![40.into(), y.into()]),
                Operation::new("Tj", vec![Object::string_literal(*line)]),
                Operation::new("ET", vec![]),
            ]);
        }
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

/// A PDF whose pages each hold a single line of text.
pub fn text_pdf(pages: &[&str]) -> Vec<u8> {
    let wrapped: Vec<[&str; 1]> = pages.iter().map(|p| [*p]).collect();
    let refs: Vec<&[&str]> = wrapped.iter().map(|p| p.as_slice()).collect();
    lines_pdf(&refs)
}

pub fn pdf_page_count(path: &Path) -> usize {
    Document::load(path).unwrap().get_pages().len()
}

/// Roughly `chars` characters of sentences built from `topic`.
pub fn prose(topic: &str, chars: usize) -> String {
    let mut text = String::new();
    let mut n = 1;
    while text.len() < chars {
        text.push_str(&format!("Sentence {} is about {}. ", n, topic));
        n += 1;
    }
    text.trim_end().to_string()
}
