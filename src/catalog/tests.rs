//! Catalog Module Tests
//!
//! Validates the synchronization discipline between the record store and the index.
//!
//! ## Test Scopes
//! - **Ordering**: store mutations happen first and survive index failures.
//! - **Tolerance**: stale index ids are dropped from queries, failed counts are left out of listings.
//! - **Validation**: bad input is refused before either surface is touched.
//! - **HTTP**: the API table end to end over a real socket.

#[cfg(test)]
mod tests {
    use crate::catalog::coordinator::{CoordinatorSettings, SyncCoordinator};
    use crate::catalog::handlers::routes;
    use crate::catalog::types::{CreatePolicy, Fields, Page, RecordId};
    use crate::error::{CatalogError, IndexError, SyncOperation};
    use crate::search::client::{IndexClient, Namespace};
    use crate::search::memory::MemoryIndex;
    use crate::storage::memory::RecordStore;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    // ============================================================
    // TEST DOUBLE
    // ============================================================

    /// Wraps the in-process engine with switchable failures and call accounting.
    #[derive(Default)]
    struct ScriptedIndex {
        inner: MemoryIndex,
        calls: AtomicUsize,
        fail_ingest: AtomicBool,
        fail_remove: AtomicBool,
        hang: AtomicBool,
        failing_counts: Mutex<HashSet<RecordId>>,
        /// Ids prepended to every query result, as if the index lagged behind the store.
        stale_ids: Mutex<Vec<RecordId>>,
        last_limit: Mutex<Option<usize>>,
        removed: Mutex<Vec<RecordId>>,
    }

    impl ScriptedIndex {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        async fn enter(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hang.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
        }
    }

    #[async_trait]
    impl IndexClient for ScriptedIndex {
        async fn ingest(&self, ns: &Namespace, id: &RecordId, text: &str) -> Result<(), IndexError> {
            self.enter().await;
            if self.fail_ingest.load(Ordering::SeqCst) {
                return Err(IndexError::Unavailable("connection refused".to_string()));
            }
            self.inner.ingest(ns, id, text).await
        }

        async fn query(
            &self,
            ns: &Namespace,
            text: &str,
            limit: usize,
            offset: usize,
        ) -> Result<Vec<RecordId>, IndexError> {
            self.enter().await;
            *self.last_limit.lock().unwrap() = Some(limit);
            let mut ids = self.stale_ids.lock().unwrap().clone();
            ids.extend(self.inner.query(ns, text, limit, offset).await?);
            Ok(ids)
        }

        async fn suggest(
            &self,
            ns: &Namespace,
            prefix: &str,
            limit: usize,
        ) -> Result<Vec<String>, IndexError> {
            self.enter().await;
            *self.last_limit.lock().unwrap() = Some(limit);
            self.inner.suggest(ns, prefix, limit).await
        }

        async fn count(&self, ns: &Namespace, id: &RecordId) -> Result<u64, IndexError> {
            self.enter().await;
            if self.failing_counts.lock().unwrap().contains(id) {
                return Err(IndexError::Unavailable("count timed out".to_string()));
            }
            self.inner.count(ns, id).await
        }

        async fn remove(&self, ns: &Namespace, id: &RecordId) -> Result<(), IndexError> {
            self.enter().await;
            self.removed.lock().unwrap().push(id.clone());
            if self.fail_remove.load(Ordering::SeqCst) {
                return Err(IndexError::Unavailable("connection reset".to_string()));
            }
            self.inner.remove(ns, id).await
        }

        async fn close(&self) -> Result<(), IndexError> {
            self.inner.close().await
        }
    }

    fn setup() -> (Arc<SyncCoordinator>, Arc<RecordStore>, Arc<ScriptedIndex>) {
        setup_with(CoordinatorSettings::default())
    }

    fn setup_with(
        settings: CoordinatorSettings,
    ) -> (Arc<SyncCoordinator>, Arc<RecordStore>, Arc<ScriptedIndex>) {
        let store = Arc::new(RecordStore::new());
        let index = Arc::new(ScriptedIndex::default());
        let coordinator = Arc::new(SyncCoordinator::new(
            store.clone(),
            index.clone(),
            Namespace::new("vehicles", "default").with_locale("por"),
            settings,
        ));
        (coordinator, store, index)
    }

    fn falcon() -> Fields {
        Fields::new()
            .with("name", "Falcon")
            .with("description", "fast car")
            .with("color", "red")
            .with("brand", "Acme")
    }

    // ============================================================
    // RECORD TYPES
    // ============================================================

    #[test]
    fn test_fields_from_json_drops_caller_id() {
        let body = serde_json::json!({
            "id": "caller-chosen",
            "name": "Falcon",
            "year": 2020,
            "electric": false,
            "notes": null
        });

        let fields = Fields::from_json(body).unwrap();

        assert_eq!(fields.get("id"), None);
        assert_eq!(fields.get("name"), Some("Falcon"));
        assert_eq!(fields.get("year"), Some("2020"));
        assert_eq!(fields.get("electric"), Some("false"));
        assert_eq!(fields.get("notes"), None);
    }

    #[test]
    fn test_fields_from_json_rejects_nested_values() {
        assert!(matches!(
            Fields::from_json(serde_json::json!({"tags": ["a", "b"]})),
            Err(CatalogError::Validation(_))
        ));
        assert!(matches!(
            Fields::from_json(serde_json::json!(["not", "an", "object"])),
            Err(CatalogError::Validation(_))
        ));
    }

    #[test]
    fn test_indexed_text_follows_field_order() {
        assert_eq!(falcon().indexed_text(), "Falcon fast car red Acme");
    }

    #[test]
    fn test_record_serializes_flat() {
        let store = RecordStore::new();
        let record = store.create(falcon());

        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["id"], record.id.as_str());
        assert_eq!(json["name"], "Falcon");
        assert_eq!(json["brand"], "Acme");
    }

    // ============================================================
    // CREATE
    // ============================================================

    #[tokio::test]
    async fn test_create_then_find() {
        let (coordinator, _store, _index) = setup();

        let record = coordinator.create(falcon()).await.unwrap();
        let hits = coordinator.query("fast", Page::default()).await.unwrap();

        assert_eq!(hits, vec![record]);
    }

    #[tokio::test]
    async fn test_create_without_text_is_rejected_before_any_call() {
        let (coordinator, store, index) = setup();

        let result = coordinator
            .create(Fields::new().with("name", "   "))
            .await;

        assert!(matches!(result, Err(CatalogError::Validation(_))));
        assert!(store.is_empty());
        assert_eq!(index.calls(), 0);
    }

    #[tokio::test]
    async fn test_create_index_failure_keeps_record() {
        let (coordinator, store, index) = setup();
        index.fail_ingest.store(true, Ordering::SeqCst);

        let err = coordinator.create(falcon()).await.unwrap_err();

        let (operation, record, source) = match err {
            CatalogError::PartialFailure {
                operation,
                record,
                source,
            } => (operation, record, source),
            other => panic!("expected a partial failure, got {:?}", other),
        };
        assert_eq!(operation, SyncOperation::Create);
        assert!(matches!(source, IndexError::Unavailable(_)));

        // Stored and visible even though it is not searchable
        assert_eq!(coordinator.get(&record.id).unwrap(), *record);
        assert_eq!(store.len(), 1);
        assert!(coordinator.query("fast", Page::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rollback_create_removes_store_record() {
        let (coordinator, store, index) = setup();
        index.fail_ingest.store(true, Ordering::SeqCst);

        let Err(CatalogError::PartialFailure { record, .. }) = coordinator.create(falcon()).await
        else {
            panic!("expected a partial failure");
        };

        assert!(coordinator.rollback_create(&record.id));
        assert!(store.is_empty());
        assert!(!coordinator.rollback_create(&record.id));
    }

    #[tokio::test]
    async fn test_index_timeout_counts_as_unavailable() {
        let (coordinator, store, index) = setup_with(CoordinatorSettings {
            index_timeout: Duration::from_millis(50),
            ..CoordinatorSettings::default()
        });
        index.hang.store(true, Ordering::SeqCst);

        let err = coordinator.create(falcon()).await.unwrap_err();

        assert!(matches!(
            err,
            CatalogError::PartialFailure {
                source: IndexError::Unavailable(_),
                ..
            }
        ));
        assert_eq!(store.len(), 1, "Store write is not rolled back on timeout");

        let err = coordinator.query("fast", Page::default()).await.unwrap_err();
        assert!(matches!(err, CatalogError::IndexUnavailable(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_get_unique_ids() {
        let (coordinator, store, _index) = setup();

        let mut handles = Vec::new();
        for i in 0..50 {
            let coordinator = coordinator.clone();
            handles.push(tokio::spawn(async move {
                coordinator
                    .create(Fields::new().with("name", format!("model {}", i)))
                    .await
                    .unwrap()
                    .id
            }));
        }

        let mut ids = HashSet::new();
        for handle in handles {
            assert!(ids.insert(handle.await.unwrap()));
        }
        assert_eq!(store.len(), 50);
    }

    // ============================================================
    // QUERY & SUGGEST
    // ============================================================

    #[tokio::test]
    async fn test_query_drops_stale_ids_and_keeps_order() {
        let (coordinator, _store, index) = setup();
        let first = coordinator
            .create(Fields::new().with("name", "fast red car"))
            .await
            .unwrap();
        let second = coordinator
            .create(Fields::new().with("name", "fast van"))
            .await
            .unwrap();
        index
            .stale_ids
            .lock()
            .unwrap()
            .push(RecordId::from("deleted-long-ago"));

        let hits = coordinator.query("fast red", Page::default()).await.unwrap();

        assert_eq!(hits, vec![first, second]);
    }

    #[tokio::test]
    async fn test_query_is_repeatable() {
        let (coordinator, _store, _index) = setup();
        for i in 0..5 {
            coordinator
                .create(Fields::new().with("name", format!("sedan {}", i)))
                .await
                .unwrap();
        }

        let a = coordinator.query("sedan", Page::default()).await.unwrap();
        let b = coordinator.query("sedan", Page::default()).await.unwrap();

        assert_eq!(a.len(), 5);
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_query_paging_and_limit_cap() {
        let (coordinator, _store, index) = setup_with(CoordinatorSettings {
            max_limit: 3,
            ..CoordinatorSettings::default()
        });
        for i in 0..5 {
            coordinator
                .create(Fields::new().with("name", format!("sedan {}", i)))
                .await
                .unwrap();
        }

        let capped = coordinator
            .query(
                "sedan",
                Page {
                    limit: Some(50),
                    offset: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(capped.len(), 3);
        assert_eq!(*index.last_limit.lock().unwrap(), Some(3));

        let tail = coordinator
            .query(
                "sedan",
                Page {
                    limit: Some(3),
                    offset: Some(3),
                },
            )
            .await
            .unwrap();
        assert_eq!(tail.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_query_is_rejected_before_any_call() {
        let (coordinator, _store, index) = setup();

        for text in ["", "   "] {
            let result = coordinator.query(text, Page::default()).await;
            assert!(matches!(result, Err(CatalogError::Validation(_))));
        }
        let zero = coordinator
            .query(
                "fast",
                Page {
                    limit: Some(0),
                    offset: None,
                },
            )
            .await;
        assert!(matches!(zero, Err(CatalogError::Validation(_))));

        assert_eq!(index.calls(), 0);
    }

    #[tokio::test]
    async fn test_suggest_passes_through() {
        let (coordinator, _store, _index) = setup();
        coordinator.create(falcon()).await.unwrap();

        let words = coordinator.suggest("fa", None).await.unwrap();

        assert_eq!(words, vec!["falcon", "fast"]);
    }

    #[tokio::test]
    async fn test_suggest_limit_has_its_own_cap() {
        let (coordinator, _store, index) = setup();
        coordinator.create(falcon()).await.unwrap();

        coordinator.suggest("fa", None).await.unwrap();
        assert_eq!(*index.last_limit.lock().unwrap(), Some(10));

        // Above the engine's suggestion maximum but below the query cap
        coordinator.suggest("fa", Some(50)).await.unwrap();
        assert_eq!(*index.last_limit.lock().unwrap(), Some(20));
    }

    #[tokio::test]
    async fn test_empty_suggest_is_rejected_before_any_call() {
        let (coordinator, _store, index) = setup();

        let result = coordinator.suggest(" ", None).await;

        assert!(matches!(result, Err(CatalogError::Validation(_))));
        assert_eq!(index.calls(), 0);
    }

    // ============================================================
    // LIST WITH COUNT
    // ============================================================

    #[tokio::test]
    async fn test_list_count_is_sum_of_index_counts() {
        let (coordinator, _store, _index) = setup();
        coordinator.create(falcon()).await.unwrap(); // falcon fast car red acme
        coordinator
            .create(Fields::new().with("name", "blue van"))
            .await
            .unwrap();

        let listing = coordinator.list_with_count().await;

        assert_eq!(listing.items.len(), 2);
        assert_eq!(listing.count, 5 + 2);
        assert_eq!(listing.failed_counts, 0);
    }

    #[tokio::test]
    async fn test_list_survives_failed_counts() {
        let (coordinator, _store, index) = setup();
        let falcon = coordinator.create(falcon()).await.unwrap();
        coordinator
            .create(Fields::new().with("name", "blue van"))
            .await
            .unwrap();
        index.failing_counts.lock().unwrap().insert(falcon.id.clone());

        let listing = coordinator.list_with_count().await;

        assert_eq!(listing.items.len(), 2, "Every record is still listed");
        assert_eq!(listing.count, 2);
        assert_eq!(listing.failed_counts, 1);
    }

    // ============================================================
    // DELETE
    // ============================================================

    #[tokio::test]
    async fn test_delete_then_absent() {
        let (coordinator, _store, _index) = setup();
        let record = coordinator.create(falcon()).await.unwrap();

        let removed = coordinator.delete(&record.id).await.unwrap();

        assert_eq!(removed, record);
        assert!(coordinator.query("fast", Page::default()).await.unwrap().is_empty());
        assert!(matches!(
            coordinator.get(&record.id),
            Err(CatalogError::NotFound(_))
        ));
        let listing = coordinator.list_with_count().await;
        assert_eq!(listing.count, 0);
        assert!(listing.items.is_empty());
    }

    #[tokio::test]
    async fn test_delete_index_failure_still_removes_record() {
        let (coordinator, store, index) = setup();
        let record = coordinator.create(falcon()).await.unwrap();
        index.fail_remove.store(true, Ordering::SeqCst);

        let err = coordinator.delete(&record.id).await.unwrap_err();

        assert!(matches!(
            err,
            CatalogError::PartialFailure {
                operation: SyncOperation::Delete,
                ..
            }
        ));
        assert!(store.is_empty());

        // The index still holds the id; queries must hide it
        assert!(coordinator.query("fast", Page::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_unknown_id_is_not_found_but_cleans_index() {
        let (coordinator, _store, index) = setup();
        let ghost = RecordId::from("ghost");

        let result = coordinator.delete(&ghost).await;

        assert!(matches!(result, Err(CatalogError::NotFound(_))));
        assert_eq!(*index.removed.lock().unwrap(), vec![ghost]);
    }

    #[tokio::test]
    async fn test_delete_malformed_id_never_reaches_index() {
        let (coordinator, store, index) = setup();
        coordinator.create(falcon()).await.unwrap();
        let calls_before = index.calls();

        for raw in ["x\nFLUSHC vehicles", "two words", "", "tab\there"] {
            let result = coordinator.delete(&RecordId::from(raw)).await;
            assert!(matches!(result, Err(CatalogError::NotFound(_))), "id {:?}", raw);
        }

        assert_eq!(index.calls(), calls_before);
        assert!(index.removed.lock().unwrap().is_empty());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_of_unindexed_record_succeeds() {
        let (coordinator, store, index) = setup();
        index.fail_ingest.store(true, Ordering::SeqCst);
        let Err(CatalogError::PartialFailure { record, .. }) = coordinator.create(falcon()).await
        else {
            panic!("expected a partial failure");
        };

        // Index reports NotFound for the never-indexed id, which is fine
        coordinator.delete(&record.id).await.unwrap();
        assert!(store.is_empty());
    }

    // ============================================================
    // HTTP API
    // ============================================================

    async fn serve(coordinator: Arc<SyncCoordinator>, policy: CreatePolicy) -> String {
        let app = routes(coordinator, "car", policy);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_http_catalog_scenario() {
        let (coordinator, _store, _index) = setup();
        let base = serve(coordinator, CreatePolicy::Report).await;
        let client = reqwest::Client::new();

        let health = client.get(format!("{}/health", base)).send().await.unwrap();
        assert_eq!(health.status(), 200);

        // Create: caller id is ignored
        let created = client
            .post(format!("{}/car", base))
            .json(&serde_json::json!({
                "id": "mine",
                "name": "Falcon",
                "description": "fast car",
                "color": "red",
                "brand": "Acme"
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(created.status(), 201);
        let created: serde_json::Value = created.json().await.unwrap();
        let id = created["id"].as_str().unwrap().to_string();
        assert_ne!(id, "mine");
        assert_eq!(created["name"], "Falcon");

        // Search
        let hits: serde_json::Value = client
            .get(format!("{}/car?q=fast", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(hits.as_array().unwrap().len(), 1);
        assert_eq!(hits[0]["id"], id.as_str());

        // Fetch by id
        let fetched = client.get(format!("{}/car/{}", base, id)).send().await.unwrap();
        assert_eq!(fetched.status(), 200);

        // Suggest
        let words: Vec<String> = client
            .get(format!("{}/car/suggests?suggest=fa", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(words, vec!["falcon", "fast"]);

        // List
        let listing: serde_json::Value = client
            .get(format!("{}/cars", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(listing["count"], 5);
        assert_eq!(listing["items"].as_array().unwrap().len(), 1);

        // Delete
        let deleted = client
            .delete(format!("{}/car/{}", base, id))
            .send()
            .await
            .unwrap();
        assert_eq!(deleted.status(), 204);

        let hits: serde_json::Value = client
            .get(format!("{}/car?q=fast", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(hits, serde_json::json!([]));

        let listing: serde_json::Value = client
            .get(format!("{}/cars", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(listing, serde_json::json!({"count": 0, "items": []}));

        let again = client
            .delete(format!("{}/car/{}", base, id))
            .send()
            .await
            .unwrap();
        assert_eq!(again.status(), 404);
    }

    #[tokio::test]
    async fn test_http_missing_params_are_bad_requests() {
        let (coordinator, _store, index) = setup();
        let base = serve(coordinator, CreatePolicy::Report).await;
        let client = reqwest::Client::new();

        for path in ["/car", "/car?q=", "/car/suggests", "/car/suggests?suggest="] {
            let response = client.get(format!("{}{}", base, path)).send().await.unwrap();
            assert_eq!(response.status(), 400, "path {}", path);
            let body: serde_json::Value = response.json().await.unwrap();
            assert_eq!(body["kind"], "validation");
        }

        let bad_body = client
            .post(format!("{}/car", base))
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(bad_body.status(), 400);

        assert_eq!(index.calls(), 0);
    }

    #[tokio::test]
    async fn test_http_partial_create_reports_record() {
        let (coordinator, store, index) = setup();
        index.fail_ingest.store(true, Ordering::SeqCst);
        let base = serve(coordinator, CreatePolicy::Report).await;

        let response = reqwest::Client::new()
            .post(format!("{}/car", base))
            .json(&serde_json::json!({"name": "Falcon"}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 503);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["kind"], "partial_failure");
        assert_eq!(body["record"]["name"], "Falcon");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_http_partial_create_compensates() {
        let (coordinator, store, index) = setup();
        index.fail_ingest.store(true, Ordering::SeqCst);
        let base = serve(coordinator, CreatePolicy::Compensate).await;

        let response = reqwest::Client::new()
            .post(format!("{}/car", base))
            .json(&serde_json::json!({"name": "Falcon"}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 503);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["kind"], "index_unavailable");
        assert!(body.get("record").is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_http_delete_with_stale_index_is_no_content() {
        let (coordinator, store, index) = setup();
        let record = coordinator.create(falcon()).await.unwrap();
        index.fail_remove.store(true, Ordering::SeqCst);
        let base = serve(coordinator, CreatePolicy::Report).await;

        let response = reqwest::Client::new()
            .delete(format!("{}/car/{}", base, record.id))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 204);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_http_delete_with_line_break_in_id_is_not_found() {
        let (coordinator, store, index) = setup();
        let base = serve(coordinator, CreatePolicy::Report).await;
        let client = reqwest::Client::new();

        let response = client
            .delete(format!("{}/car/x%0AFLUSHC%20vehicles", base))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 404);
        assert_eq!(index.calls(), 0);

        // The catalog keeps working normally afterwards
        let created = client
            .post(format!("{}/car", base))
            .json(&serde_json::json!({"name": "Falcon"}))
            .send()
            .await
            .unwrap();
        assert_eq!(created.status(), 201);
        assert_eq!(store.len(), 1);
    }
}
