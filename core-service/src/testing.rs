//! Fixtures for the service tests: a scripted media server, a temp media
//! folder and in-memory stores.

use crate::{CoreDependencies, CoreService, ServiceOptions};
use async_trait::async_trait;
use bridge_desktop::{bucket_id_for, FsMediaIndex, SqliteSettingsStore};
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use bridge_traits::notification::{Notification, NotificationPresenter};
use bridge_traits::storage::SecureStore;
use bytes::Bytes;
use mockall::mock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

mock! {
    pub HttpClient {}

    #[async_trait]
    impl HttpClient for HttpClient {
        async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        async fn download_stream(&self, request: HttpRequest) -> BridgeResult<Box<dyn tokio::io::AsyncRead + Send + Unpin>>;
    }
}

#[derive(Default)]
pub struct MemorySecureStore {
    storage: Mutex<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl SecureStore for MemorySecureStore {
    async fn set_secret(&self, key: &str, value: &[u8]) -> BridgeResult<()> {
        self.storage
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn get_secret(&self, key: &str) -> BridgeResult<Option<Vec<u8>>> {
        Ok(self.storage.lock().unwrap().get(key).cloned())
    }

    async fn delete_secret(&self, key: &str) -> BridgeResult<()> {
        self.storage.lock().unwrap().remove(key);
        Ok(())
    }

    async fn list_keys(&self) -> BridgeResult<Vec<String>> {
        Ok(self.storage.lock().unwrap().keys().cloned().collect())
    }

    async fn clear_all(&self) -> BridgeResult<()> {
        self.storage.lock().unwrap().clear();
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingPresenter {
    shown: Mutex<Vec<Notification>>,
    dismissed: Mutex<Vec<u32>>,
}

impl RecordingPresenter {
    pub fn bodies(&self) -> Vec<String> {
        self.shown
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.body.clone())
            .collect()
    }

    pub fn dismissed(&self) -> Vec<u32> {
        self.dismissed.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationPresenter for RecordingPresenter {
    async fn show(&self, notification: &Notification) -> BridgeResult<()> {
        self.shown.lock().unwrap().push(notification.clone());
        Ok(())
    }

    async fn dismiss(&self, id: u32) -> BridgeResult<()> {
        self.dismissed.lock().unwrap().push(id);
        Ok(())
    }
}

fn ok(body: &str) -> HttpResponse {
    HttpResponse {
        status: 200,
        headers: HashMap::new(),
        body: Bytes::from(body.to_string()),
    }
}

/// A media server that accepts everything.
fn media_server(uploads: Arc<AtomicUsize>) -> MockHttpClient {
    let mut http = MockHttpClient::new();
    http.expect_execute().returning(move |req| {
        let path = req.url.split('?').next().unwrap_or_default().to_string();
        let body = if path.ends_with("/api/user/login") {
            r#"{"code":200,"message":"ok","data":"tok-1"}"#
        } else if path.ends_with("/api/media/upload/direct") {
            uploads.fetch_add(1, Ordering::SeqCst);
            r#"{"code":200,"message":"ok","data":null}"#
        } else if path.ends_with("/api/media/count") {
            r#"{"code":200,"message":"ok","data":7}"#
        } else if path.ends_with("/api/media/list") {
            r#"{"code":200,"message":"ok","data":{"records":[{"id":11,"type":"IMAGE","thumbnail":"/thumb/11"}],"current":1,"pages":3}}"#
        } else if path.ends_with("/api/media/detail") {
            r#"{"code":200,"message":"ok","data":{"id":11,"type":"IMAGE","name":"IMG_0011.jpg","originalPath":"/original/11"}}"#
        } else {
            r#"{"code":404,"message":"Not found"}"#
        };
        Ok(ok(body))
    });
    http
}

pub struct Fixture {
    pub service: CoreService,
    uploads: Arc<AtomicUsize>,
    _dir: tempfile::TempDir,
}

impl Fixture {
    pub fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }
}

async fn build(files: &[(&str, &[u8])], logged_in: bool) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let camera = dir.path().join("Camera");
    tokio::fs::create_dir_all(&camera).await.unwrap();
    for (name, bytes) in files {
        tokio::fs::write(camera.join(name), bytes).await.unwrap();
    }

    let uploads = Arc::new(AtomicUsize::new(0));
    let deps = CoreDependencies::new(
        Arc::new(media_server(uploads.clone())),
        Arc::new(MemorySecureStore::default()),
        Arc::new(SqliteSettingsStore::in_memory().await.unwrap()),
        Arc::new(
            FsMediaIndex::in_memory(vec![dir.path().to_path_buf()])
                .await
                .unwrap(),
        ),
    );
    let service = CoreService::new(deps, ServiceOptions::default());

    service.toggle_album(bucket_id_for(&camera)).await.unwrap();
    if logged_in {
        service
            .login("http://nas.local:8080", "alex", "pw")
            .await
            .unwrap();
    }

    Fixture {
        service,
        uploads,
        _dir: dir,
    }
}

/// Logged-in service with `files` in a selected `Camera` album.
pub async fn service_fixture(files: &[(&str, &[u8])]) -> Fixture {
    build(files, true).await
}

pub async fn unauthenticated_fixture() -> Fixture {
    build(&[], false).await
}
