// Shared test fixtures: database setup and an in-memory remote store.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use todo_iterator::db::{create_pool, run_migrations};
use todo_iterator::error::{Result, TodoError};
use todo_iterator::remote::{CreateFile, RemoteFileMeta, RemoteStore};

pub async fn setup_test_db() -> (TempDir, SqlitePool) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("test.db");
    let pool = create_pool(&db_path)
        .await
        .expect("Failed to create test database");
    run_migrations(&pool).await.expect("Failed to run migrations");
    (temp_dir, pool)
}

#[derive(Clone, Debug)]
pub struct MockFile {
    pub name: String,
    pub content: String,
    pub modified_time: DateTime<Utc>,
}

#[derive(Default)]
struct MockInner {
    signed_in: AtomicBool,
    files: Mutex<HashMap<String, MockFile>>,
    next_id: AtomicUsize,
    get_calls: AtomicUsize,
    get_meta_calls: AtomicUsize,
    create_calls: AtomicUsize,
    fail_get: AtomicBool,
}

/// In-memory object store with call counters and failure injection.
#[derive(Clone, Default)]
pub struct MockRemote {
    inner: Arc<MockInner>,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_file(&self, name: &str, content: &str, modified_time: DateTime<Utc>) -> String {
        let id = format!("file-{}", self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        self.inner.files.lock().unwrap().insert(
            id.clone(),
            MockFile {
                name: name.to_string(),
                content: content.to_string(),
                modified_time,
            },
        );
        id
    }

    /// Overwrite content and modified time, simulating another client.
    pub fn touch(&self, id: &str, content: &str, modified_time: DateTime<Utc>) {
        let mut files = self.inner.files.lock().unwrap();
        let file = files.get_mut(id).expect("unknown mock file id");
        file.content = content.to_string();
        file.modified_time = modified_time;
    }

    pub fn file_id(&self, name: &str) -> Option<String> {
        self.inner
            .files
            .lock()
            .unwrap()
            .iter()
            .find(|(_, f)| f.name == name)
            .map(|(id, _)| id.clone())
    }

    pub fn content_of(&self, name: &str) -> Option<String> {
        self.inner
            .files
            .lock()
            .unwrap()
            .values()
            .find(|f| f.name == name)
            .map(|f| f.content.clone())
    }

    pub fn file_count(&self) -> usize {
        self.inner.files.lock().unwrap().len()
    }

    pub fn get_calls(&self) -> usize {
        self.inner.get_calls.load(Ordering::SeqCst)
    }

    pub fn get_meta_calls(&self) -> usize {
        self.inner.get_meta_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.inner.create_calls.load(Ordering::SeqCst)
    }

    pub fn set_fail_get(&self, fail: bool) {
        self.inner.fail_get.store(fail, Ordering::SeqCst);
    }

    fn meta_for(id: &str, file: &MockFile) -> RemoteFileMeta {
        RemoteFileMeta {
            id: id.to_string(),
            name: file.name.clone(),
            mime_type: Some("text/plain".to_string()),
            modified_time: file.modified_time,
        }
    }
}

impl RemoteStore for MockRemote {
    fn ready(&self) -> impl Future<Output = Result<bool>> + Send {
        async move { Ok(self.inner.signed_in.load(Ordering::SeqCst)) }
    }

    fn is_signed_in(&self) -> bool {
        self.inner.signed_in.load(Ordering::SeqCst)
    }

    fn sign_in(&self) -> impl Future<Output = Result<bool>> + Send {
        async move {
            self.inner.signed_in.store(true, Ordering::SeqCst);
            Ok(true)
        }
    }

    fn sign_out(&self) -> impl Future<Output = Result<()>> + Send {
        async move {
            self.inner.signed_in.store(false, Ordering::SeqCst);
            Ok(())
        }
    }

    fn list(&self) -> impl Future<Output = Result<Vec<RemoteFileMeta>>> + Send {
        async move {
            let files = self.inner.files.lock().unwrap();
            Ok(files
                .iter()
                .map(|(id, file)| Self::meta_for(id, file))
                .collect())
        }
    }

    fn get(&self, file_id: &str) -> impl Future<Output = Result<String>> + Send {
        let file_id = file_id.to_string();
        async move {
            self.inner.get_calls.fetch_add(1, Ordering::SeqCst);
            if self.inner.fail_get.load(Ordering::SeqCst) {
                return Err(TodoError::Remote("injected get failure".to_string()));
            }
            let files = self.inner.files.lock().unwrap();
            files
                .get(&file_id)
                .map(|f| f.content.clone())
                .ok_or_else(|| TodoError::Remote(format!("404: {}", file_id)))
        }
    }

    fn get_meta(&self, file_id: &str) -> impl Future<Output = Result<RemoteFileMeta>> + Send {
        let file_id = file_id.to_string();
        async move {
            self.inner.get_meta_calls.fetch_add(1, Ordering::SeqCst);
            let files = self.inner.files.lock().unwrap();
            files
                .get(&file_id)
                .map(|f| Self::meta_for(&file_id, f))
                .ok_or_else(|| TodoError::Remote(format!("404: {}", file_id)))
        }
    }

    fn create(&self, file: CreateFile<'_>) -> impl Future<Output = Result<RemoteFileMeta>> + Send {
        let id = file.id.map(str::to_string);
        let name = file.name.to_string();
        let content = file.content.to_string();
        async move {
            self.inner.create_calls.fetch_add(1, Ordering::SeqCst);
            let id = id.unwrap_or_else(|| {
                format!("file-{}", self.inner.next_id.fetch_add(1, Ordering::SeqCst))
            });
            let now = Utc::now();
            let mock = MockFile {
                name,
                content,
                modified_time: now,
            };
            let meta = Self::meta_for(&id, &mock);
            self.inner.files.lock().unwrap().insert(id, mock);
            Ok(meta)
        }
    }
}
