//! End-to-end tests: a syncstore client against the server binary.

use serde_json::{json, Value};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use syncstore_engine::{EventKind, HttpResource, Record, RemoteId, Resource, Store, StoreConfig};

/// The server process, killed on drop.
struct Server {
    child: Child,
    base_url: String,
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .and_then(|listener| listener.local_addr())
        .map(|addr| addr.port())
        .expect("no free port")
}

async fn start_server() -> Server {
    let port = free_port();
    let child = Command::new(env!("CARGO_BIN_EXE_syncstore-server"))
        .env("HOST", "127.0.0.1")
        .env("PORT", port.to_string())
        .env("RUST_LOG", "warn")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to start server");
    let server = Server {
        child,
        base_url: format!("http://127.0.0.1:{port}"),
    };

    let health = format!("{}/health", server.base_url);
    for _ in 0..100 {
        if let Ok(response) = reqwest::get(&health).await {
            if response.status().is_success() {
                return server;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("server did not become healthy");
}

fn record(value: Value) -> Record {
    value.as_object().cloned().unwrap()
}

#[tokio::test]
async fn resource_contract() {
    let server = start_server().await;
    let resource = HttpResource::new(format!("{}/todos", server.base_url));

    let created = resource.create(record(json!({"title": "milk"}))).await.unwrap();
    let id = RemoteId::from_value(&created["id"]).unwrap();
    assert!(matches!(id, RemoteId::Text(_)));

    let fetched = resource.fetch_one(&id).await.unwrap().unwrap();
    assert_eq!(fetched["title"], json!("milk"));

    let mut edit = fetched.clone();
    edit.insert("title".into(), json!("oat milk"));
    let updated = resource.update(&id, edit).await.unwrap();
    assert_eq!(updated["title"], json!("oat milk"));

    resource.delete(&id).await.unwrap();
    assert_eq!(resource.fetch_one(&id).await.unwrap(), None);
    // Deleting twice is not an error for the client.
    resource.delete(&id).await.unwrap();
}

#[tokio::test]
async fn two_stores_converge_through_the_server() {
    let server = start_server().await;
    let config = || {
        StoreConfig::new("todos", format!("{}/todos", server.base_url), "id")
            .with_hidden_field("selected")
    };

    let writer = Store::connect(config()).unwrap();
    let reader = Store::connect(config()).unwrap();
    writer.load().await.unwrap();
    reader.load().await.unwrap();

    let remote_changes = Arc::new(Mutex::new(Vec::new()));
    for kind in [
        EventKind::CreateRemote,
        EventKind::UpdateRemote,
        EventKind::DeleteRemote,
    ] {
        let remote_changes = Arc::clone(&remote_changes);
        reader.on(kind, move |event| remote_changes.lock().unwrap().push(event.kind()));
    }

    writer
        .collection()
        .push(record(json!({"title": "milk", "selected": true})));
    writer.flush().await;
    let stored = writer.collection().read()[0].value.clone();
    assert!(stored["id"].is_string());
    assert_eq!(stored["selected"], json!(true));

    reader.load().await.unwrap();
    let seen = reader.collection().read()[0].value.clone();
    assert_eq!(seen["title"], json!("milk"));
    assert!(seen.get("selected").is_none());

    writer.collection().write()[0]
        .value
        .insert("title".into(), json!("oat milk"));
    writer.flush().await;
    reader.load().await.unwrap();
    assert_eq!(
        reader.collection().read()[0].value["title"],
        json!("oat milk")
    );

    let local_id = writer.collection().read()[0].local_id().unwrap();
    writer.collection().remove(local_id);
    writer.flush().await;
    reader.load().await.unwrap();
    assert!(reader.collection().is_empty());

    assert_eq!(
        *remote_changes.lock().unwrap(),
        vec![
            EventKind::CreateRemote,
            EventKind::UpdateRemote,
            EventKind::DeleteRemote
        ]
    );
}
