//! Upstream clients and the population pipeline against a local fake of the
//! library, downloader, and files services.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::TryStreamExt;
use serde_json::json;
use stash_api::{
    CacheResolver, DownloaderClient, FilesClient, LibraryClient, Retrieval,
    RetrievalOrchestrator, UpstreamEndpoint, UpstreamPopulator,
};
use stash_core::{
    CachePopulator, CacheStore, Catalog, FilenameResolver, Location, MetadataResolver, ObjectKey,
    UpstreamFetcher,
};
use stash_storage::InMemoryCacheStore;

const STORED: Location = Location {
    chat_id: -5,
    message_id: 77,
};

#[derive(Clone, Default)]
struct Recorded {
    uploads: Arc<Mutex<Vec<Vec<u8>>>>,
    auth: Arc<Mutex<Vec<String>>>,
}

impl Recorded {
    fn note_auth(&self, headers: &HeaderMap) {
        let value = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        self.auth.lock().unwrap().push(value);
    }
}

async fn book(
    State(rec): State<Recorded>,
    headers: HeaderMap,
    Path(id): Path<i32>,
) -> impl IntoResponse {
    rec.note_auth(&headers);
    if id != 1 {
        return (StatusCode::NOT_FOUND, Json(json!({ "detail": "Not found" })));
    }
    (
        StatusCode::OK,
        Json(json!({
            "id": 1,
            "title": "Anna Karenina",
            "source": { "id": 3 },
            "remote_id": 900,
            "available_types": ["fb2"],
            "authors": [{ "first_name": "Leo", "last_name": "Tolstoy" }]
        })),
    )
}

async fn books_page(Query(query): Query<std::collections::HashMap<String, String>>) -> impl IntoResponse {
    let page: u32 = query.get("page").and_then(|p| p.parse().ok()).unwrap_or(1);
    Json(json!({
        "items": [{ "id": page, "available_types": ["fb2", "epub"] }],
        "total": 2,
        "page": page,
        "size": 1,
        "pages": 2
    }))
}

async fn download(Path((_source, _remote, kind)): Path<(i32, i32, String)>) -> impl IntoResponse {
    if kind == "fb2" {
        (StatusCode::OK, "FB2DATA").into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

async fn filename(Path((id, kind)): Path<(i32, String)>) -> impl IntoResponse {
    Json(json!({
        "filename": format!("Толстой_{}.{}", id, kind),
        "filename_ascii": format!("Tolstoy_{}.{}", id, kind)
    }))
}

async fn upload(
    State(rec): State<Recorded>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    rec.note_auth(&headers);
    rec.uploads.lock().unwrap().push(body.to_vec());
    Json(json!({ "chat_id": STORED.chat_id, "message_id": STORED.message_id }))
}

async fn download_by_message(Path((chat, message)): Path<(i64, i64)>) -> impl IntoResponse {
    if chat == STORED.chat_id && message == STORED.message_id {
        (StatusCode::OK, "stored bytes").into_response()
    } else {
        (StatusCode::BAD_REQUEST, "message not found").into_response()
    }
}

struct Fake {
    base: String,
    recorded: Recorded,
}

async fn spawn_fake() -> Fake {
    let recorded = Recorded::default();
    let app = Router::new()
        .route("/api/v1/books/base/", get(books_page))
        .route("/api/v1/books/:id", get(book))
        .route("/download/:source/:remote/:kind", get(download))
        .route("/filename/:id/:kind", get(filename))
        .route("/api/v1/files/upload/", post(upload))
        .route(
            "/api/v1/files/download_by_message/:chat/:message",
            get(download_by_message),
        )
        .with_state(recorded.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    Fake {
        base: format!("http://{}", addr),
        recorded,
    }
}

struct Clients {
    library: LibraryClient,
    downloader: DownloaderClient,
    files: FilesClient,
}

fn clients(fake: &Fake) -> Clients {
    let http = stash_api::build_http_client(Duration::from_secs(5)).unwrap();
    let timeout = Duration::from_secs(5);
    Clients {
        library: LibraryClient::new(
            http.clone(),
            UpstreamEndpoint::new(fake.base.clone(), "library-key"),
            timeout,
        ),
        downloader: DownloaderClient::new(
            http.clone(),
            UpstreamEndpoint::new(fake.base.clone(), "downloader-key"),
            timeout,
        ),
        files: FilesClient::new(
            http,
            UpstreamEndpoint::new(format!("{}/", fake.base), "files-key"),
            timeout,
        ),
    }
}

fn populator(c: &Clients) -> UpstreamPopulator {
    UpstreamPopulator::new(c.library.clone(), c.downloader.clone(), c.files.clone())
}

#[tokio::test]
async fn test_populate_uploads_downloaded_file_with_caption() {
    let fake = spawn_fake().await;
    let c = clients(&fake);

    let location = populator(&c).populate(&ObjectKey::new(1, "fb2")).await.unwrap();

    assert_eq!(location, Some(STORED));
    let uploads = fake.recorded.uploads.lock().unwrap().clone();
    assert_eq!(uploads.len(), 1);
    let body = String::from_utf8_lossy(&uploads[0]);
    assert!(body.contains("FB2DATA"));
    assert!(body.contains("Толстой_1.fb2"));
    assert!(body.contains("Anna Karenina\n\nAuthors: Tolstoy Leo"));

    let auth = fake.recorded.auth.lock().unwrap().clone();
    assert_eq!(auth, vec!["library-key".to_string(), "files-key".to_string()]);
}

#[tokio::test]
async fn test_populate_unknown_book_produces_nothing() {
    let fake = spawn_fake().await;
    let c = clients(&fake);

    let location = populator(&c).populate(&ObjectKey::new(2, "fb2")).await.unwrap();

    assert_eq!(location, None);
    assert!(fake.recorded.uploads.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_populate_type_not_offered_produces_nothing() {
    let fake = spawn_fake().await;
    let c = clients(&fake);

    let location = populator(&c).populate(&ObjectKey::new(1, "epub")).await.unwrap();

    assert_eq!(location, None);
    assert!(fake.recorded.uploads.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_files_client_streams_live_and_reports_gone() {
    let fake = spawn_fake().await;
    let c = clients(&fake);

    let handle = c.files.open(&STORED).await.unwrap();
    let chunks: Vec<Bytes> = handle.try_collect().await.unwrap();
    assert_eq!(chunks.concat(), b"stored bytes");

    let err = c.files.open(&Location::new(-5, 1)).await.unwrap_err();
    assert!(err.is_gone());
}

#[tokio::test]
async fn test_library_metadata_and_catalog() {
    let fake = spawn_fake().await;
    let c = clients(&fake);

    let meta = c.library.metadata(1).await.unwrap().unwrap();
    assert_eq!(meta.title, "Anna Karenina");
    assert_eq!(meta.authors, vec!["Tolstoy Leo"]);
    assert!(c.library.metadata(2).await.unwrap().is_none());

    let page = c.library.page(2, 1).await.unwrap();
    assert_eq!(page.page, 2);
    assert_eq!(page.pages, 2);
    assert_eq!(page.items[0].id, 2);
    assert_eq!(page.items[0].available_types, vec!["fb2", "epub"]);
}

#[tokio::test]
async fn test_downloader_filename() {
    let fake = spawn_fake().await;
    let c = clients(&fake);

    let name = c.downloader.filename(&ObjectKey::new(4, "epub")).await.unwrap().unwrap();
    assert_eq!(name.filename, "Толстой_4.epub");
    assert_eq!(name.ascii(), "Tolstoy_4.epub");
}

#[tokio::test]
async fn test_download_end_to_end_populates_and_streams() {
    let fake = spawn_fake().await;
    let c = clients(&fake);
    let store = Arc::new(InMemoryCacheStore::new());
    let resolver = CacheResolver::new(store.clone(), Arc::new(populator(&c)));
    let orchestrator = RetrievalOrchestrator::new(
        resolver,
        Arc::new(c.files.clone()),
        Arc::new(c.downloader.clone()),
        Arc::new(c.library.clone()),
    );
    let key = ObjectKey::new(1, "fb2");

    let Retrieval::Ready(download) = orchestrator.retrieve(&key).await else {
        panic!("expected a download");
    };
    assert_eq!(download.filename, "Толстой_1.fb2");
    assert_eq!(download.filename_ascii, "Tolstoy_1.fb2");
    let chunks: Vec<Bytes> = download.stream.try_collect().await.unwrap();
    assert_eq!(chunks.concat(), b"stored bytes");

    let entry = store.get(&key).await.unwrap().unwrap();
    assert_eq!(entry.location, STORED);
}
