//! saas-search Core Integration Tests

use saas_search_core::{
    Error,
    domain::search::{
        CallerIdentity, EngineSettings, EntityConfig, FieldConfig, FuzzySearchConfig,
        FuzzySearchService, SavedSearch, SearchOptions, SearchType, SortOrder,
    },
    storage::Database,
};

fn settings() -> EngineSettings {
    EngineSettings {
        register_defaults: false,
        ..Default::default()
    }
}

fn widgets() -> EntityConfig {
    EntityConfig::new("widgets", "Widgets")
        .with_field(FieldConfig::new("title", 1.0, SearchType::Contains))
}

async fn widget_db() -> Database {
    let db = Database::in_memory().await.unwrap();
    sqlx::raw_sql(
        r#"
        CREATE TABLE widgets (
            id INTEGER PRIMARY KEY,
            title TEXT NOT NULL,
            status TEXT NOT NULL,
            price REAL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
        INSERT INTO widgets (id, title, status, price) VALUES
            (1, 'Blue Widget', 'active', 9.5),
            (2, 'Dark Blue Lamp', 'active', 30.0),
            (3, 'Red Chair', 'active', 45.0),
            (4, 'Bluebell Vase', 'archived', 12.0);
        "#,
    )
    .execute(db.pool())
    .await
    .unwrap();
    db
}

async fn widget_service(db: &Database, settings: EngineSettings) -> FuzzySearchService {
    let service =
        FuzzySearchService::new(db.pool().clone(), FuzzySearchConfig::default(), settings).await;
    service.register_entity("widgets", widgets()).await.unwrap();
    service
}

fn titles(response: &saas_search_core::domain::search::SearchResponse) -> Vec<String> {
    response.results.iter().map(|r| r.title.clone()).collect()
}

#[tokio::test]
async fn test_widget_search_ranks_and_formats() {
    let db = widget_db().await;
    let service = widget_service(&db, settings()).await;

    let response = service.search(SearchOptions::new("blue")).await.unwrap();

    assert_eq!(response.total, 3);
    assert_eq!(response.categories.get("widgets"), Some(&3));
    assert!(response.suggestions.is_empty());

    // Prefix matches outrank the plain substring match
    let ranked = titles(&response);
    assert_eq!(ranked[2], "Dark Blue Lamp");
    assert!(ranked[..2].contains(&"Blue Widget".to_string()));
    assert!(ranked[..2].contains(&"Bluebell Vase".to_string()));
    assert!(response.results[0].score >= response.results[1].score);
    assert!(response.results[1].score > response.results[2].score);

    let widget = response
        .results
        .iter()
        .find(|r| r.title == "Blue Widget")
        .unwrap();
    assert_eq!(widget.entity_type, "widgets");
    assert_eq!(widget.description, "widgets record");
    assert_eq!(widget.url, "/api/v1/widgets/1");
    assert_eq!(widget.highlights, vec!["<mark>Blue</mark> Widget".to_string()]);
    assert_eq!(widget.data["status"], "active");
    assert!(widget.created_at.is_some());
}

#[tokio::test]
async fn test_non_ascii_capitals_match_case_insensitively() {
    let db = Database::in_memory().await.unwrap();
    sqlx::raw_sql(
        r#"
        CREATE TABLE schools (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
        INSERT INTO schools (id, name) VALUES
            (1, 'École Polytechnique'),
            (2, 'Müller GmbH'),
            (3, 'Red Chair');
        "#,
    )
    .execute(db.pool())
    .await
    .unwrap();
    let service =
        FuzzySearchService::new(db.pool().clone(), FuzzySearchConfig::default(), settings()).await;
    service
        .register_entity(
            "schools",
            EntityConfig::new("schools", "Schools")
                .with_field(FieldConfig::new("name", 1.0, SearchType::Contains)),
        )
        .await
        .unwrap();

    for query in ["école", "ÉCOLE", "poly"] {
        let response = service.search(SearchOptions::new(query)).await.unwrap();
        assert_eq!(response.total, 1, "query {query}");
        assert_eq!(titles(&response), vec!["École Polytechnique"]);
    }

    let response = service.search(SearchOptions::new("MÜLLER")).await.unwrap();
    assert_eq!(titles(&response), vec!["Müller GmbH"]);
    assert_eq!(response.results[0].highlights, vec!["<mark>Müller</mark> GmbH".to_string()]);
}

#[tokio::test]
async fn test_pagination_keeps_total() {
    let db = widget_db().await;
    let service = widget_service(&db, settings()).await;

    let full = service.search(SearchOptions::new("blue")).await.unwrap();
    let page = service
        .search(SearchOptions::new("blue").with_page(1, 1))
        .await
        .unwrap();

    assert_eq!(page.total, 3);
    assert_eq!(page.results.len(), 1);
    assert_eq!(page.results[0].title, full.results[1].title);

    let past_end = service
        .search(SearchOptions::new("blue").with_page(10, 5))
        .await
        .unwrap();
    assert_eq!(past_end.total, 3);
    assert!(past_end.results.is_empty());
    assert!(!past_end.suggestions.is_empty());
}

#[tokio::test]
async fn test_total_is_counted_without_include_count() {
    let db = widget_db().await;
    let service = widget_service(&db, settings()).await;

    let options: SearchOptions =
        serde_json::from_str(r#"{"query": "blue", "limit": 1, "include_count": false}"#).unwrap();
    let response = service.search(options).await.unwrap();
    assert_eq!(response.total, 3);
    assert_eq!(response.results.len(), 1);
}

#[tokio::test]
async fn test_score_threshold_drops_weak_matches() {
    let db = widget_db().await;
    let service = widget_service(&db, settings()).await;

    let mut config = service.get_config().await;
    config.score_threshold = 1.2;
    service.update_config(config).await;

    let response = service.search(SearchOptions::new("blue")).await.unwrap();
    assert_eq!(response.total, 2);
    assert!(!titles(&response).contains(&"Dark Blue Lamp".to_string()));
}

#[tokio::test]
async fn test_filters_and_column_sort() {
    let db = widget_db().await;
    let service = widget_service(&db, settings()).await;

    let active = service
        .search(SearchOptions::new("blue").with_filter("status", "active"))
        .await
        .unwrap();
    assert_eq!(active.total, 2);
    assert!(!titles(&active).contains(&"Bluebell Vase".to_string()));

    let by_price = service
        .search(SearchOptions::new("blue").with_sort("price", SortOrder::Desc))
        .await
        .unwrap();
    assert_eq!(
        titles(&by_price),
        vec!["Dark Blue Lamp", "Bluebell Vase", "Blue Widget"]
    );

    let bad_filter = service
        .search(SearchOptions::new("blue").with_filter("status = 1 OR 1", "x"))
        .await
        .unwrap_err();
    assert!(matches!(bad_filter, Error::InvalidInput(_)));
    assert_eq!(bad_filter.code(), "E001");
}

#[tokio::test]
async fn test_no_matches_gives_suggestions() {
    let db = widget_db().await;
    let service = widget_service(&db, settings()).await;

    let response = service.search(SearchOptions::new("zzzz")).await.unwrap();
    assert_eq!(response.total, 0);
    assert_eq!(response.categories.get("widgets"), Some(&0));
    assert_eq!(
        response.suggestions,
        vec![
            "Try using different keywords",
            "Check your spelling",
            "Use more general terms",
            "Try searching in specific categories",
            "Search in Widgets",
        ]
    );
}

#[tokio::test]
async fn test_short_or_blank_query_returns_empty() {
    let db = widget_db().await;
    let service = widget_service(&db, settings()).await;

    for query in ["b", "   ", ""] {
        let response = service.search(SearchOptions::new(query)).await.unwrap();
        assert_eq!(response.total, 0);
        assert!(response.results.is_empty());
        assert!(response.suggestions.is_empty());
    }

    assert!(matches!(
        service.quick_search("  ", None, None, 0, CallerIdentity::anonymous()).await,
        Err(Error::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_unknown_entity_types() {
    let db = widget_db().await;
    let service = widget_service(&db, settings()).await;

    let response = service
        .quick_search("blue", Some("widgets, gadgets"), None, 0, CallerIdentity::anonymous())
        .await
        .unwrap();
    assert_eq!(response.total, 3);
    assert!(!response.categories.contains_key("gadgets"));

    let only_unknown = service
        .search(SearchOptions::new("blue").with_entity_types(["gadgets"]))
        .await
        .unwrap();
    assert_eq!(only_unknown.total, 0);

    let err = service
        .search_in_entity("gadgets", SearchOptions::new("blue"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "E101");
    assert!(err.to_string().contains("widgets"));
}

#[tokio::test]
async fn test_missing_table_fails_only_when_nothing_succeeds() {
    let db = widget_db().await;
    let service = widget_service(&db, settings()).await;
    service
        .register_entity(
            "ghosts",
            EntityConfig::new("ghosts", "Ghosts")
                .with_field(FieldConfig::new("name", 1.0, SearchType::Contains)),
        )
        .await
        .unwrap();

    let partial = service.search(SearchOptions::new("blue")).await.unwrap();
    assert_eq!(partial.total, 3);
    assert!(!partial.categories.contains_key("ghosts"));

    let failed = service
        .search(SearchOptions::new("blue").with_entity_types(["ghosts"]))
        .await
        .unwrap_err();
    assert!(matches!(failed, Error::SearchFailed(_)));
}

#[tokio::test]
async fn test_registration_is_idempotent_and_validated() {
    let db = widget_db().await;
    let service = widget_service(&db, settings()).await;
    service.register_entity("widgets", widgets()).await.unwrap();

    assert_eq!(service.registry().len().await, 1);
    let infos = service.entity_type_infos().await;
    assert_eq!(infos[0].description, "Search within Widgets records");
    assert_eq!(infos[0].search_fields, vec!["title"]);

    let invalid = service
        .register_entity("broken", EntityConfig::new("widgets", "Broken"))
        .await
        .unwrap_err();
    assert!(matches!(invalid, Error::InvalidEntityConfig { .. }));
    assert!(service.registry().get("broken").await.is_none());
}

#[tokio::test]
async fn test_default_entities_are_tenant_scoped() {
    let db = Database::in_memory().await.unwrap();
    sqlx::raw_sql(
        r#"
        CREATE TABLE users (
            id INTEGER PRIMARY KEY,
            first_name TEXT, last_name TEXT, email TEXT, username TEXT,
            active INTEGER NOT NULL DEFAULT 1,
            organization_id INTEGER NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
        CREATE TABLE customers (
            id INTEGER PRIMARY KEY,
            name TEXT, email TEXT, phone TEXT, company TEXT,
            organization_id INTEGER NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
        INSERT INTO users (id, first_name, last_name, email, username, active, organization_id) VALUES
            (1, 'Ann', 'Lee', 'ann@acme.io', 'ann', 1, 10),
            (2, 'Bob', 'Ray', 'bob@acme.io', 'bob', 0, 10),
            (3, 'Cy', 'Dow', 'cy@acme.io', 'cy', 1, 20);
        INSERT INTO customers (id, name, email, company, organization_id) VALUES
            (1, 'Acme Corp', 'ops@acme.io', 'Acme', 10),
            (2, 'Acme Ltd', 'hi@acme.io', 'Acme', 20);
        "#,
    )
    .execute(db.pool())
    .await
    .unwrap();

    let service = FuzzySearchService::new(
        db.pool().clone(),
        FuzzySearchConfig::default(),
        EngineSettings::default(),
    )
    .await;
    assert_eq!(service.registry().len().await, 5);

    let options = SearchOptions::new("acme")
        .with_entity_types(["users", "customers"])
        .with_identity(CallerIdentity::user(1, 10));
    let response = service.search(options).await.unwrap();

    assert_eq!(response.total, 2);
    assert_eq!(response.categories.get("users"), Some(&1));
    assert_eq!(response.categories.get("customers"), Some(&1));

    let top = &response.results[0];
    assert_eq!(top.entity_type, "customers");
    assert_eq!(top.title, "Acme Corp");
    assert_eq!(top.description, "Email: ops@acme.io | Company: Acme");
    assert_eq!(response.results[1].title, "Ann Lee");

    // Anonymous callers cannot reach auth-only entities
    let anonymous = service
        .search(SearchOptions::new("acme").with_entity_types(["users", "customers"]))
        .await
        .unwrap();
    assert_eq!(anonymous.total, 0);
    assert!(anonymous.categories.is_empty());
}

#[tokio::test]
async fn test_search_log_and_history() {
    let db = widget_db().await;
    let service = widget_service(
        &db,
        EngineSettings {
            log_searches: true,
            ..settings()
        },
    )
    .await;

    let me = CallerIdentity::user(7, 1);
    for query in ["blue", "Blue ", "red"] {
        service
            .search(SearchOptions::new(query).with_identity(me.clone()))
            .await
            .unwrap();
    }

    let history = service.search_history(7, 10).await.unwrap();
    assert_eq!(history.len(), 3);
    assert!(history.iter().all(|log| log.entity_types == vec!["widgets"]));
    assert!(service.search_history(8, 10).await.unwrap().is_empty());

    let popular = service.popular_queries(5).await.unwrap();
    assert_eq!(popular[0].query, "blue");
    assert_eq!(popular[0].count, 2);
}

#[tokio::test]
async fn test_saved_search_runs_for_owner_and_tenant() {
    let db = widget_db().await;
    let service = widget_service(&db, settings()).await;

    let private = service
        .save_search(
            SavedSearch::new("Blues", "blue", 7, 1).with_entity_types(vec!["widgets".into()]),
        )
        .await
        .unwrap();
    let shared = service
        .save_search(SavedSearch::new("Reds", "red", 7, 1).public())
        .await
        .unwrap();

    let response = service
        .run_saved_search(private.id, CallerIdentity::user(7, 1))
        .await
        .unwrap();
    assert_eq!(response.total, 3);

    let denied = service
        .run_saved_search(private.id, CallerIdentity::user(8, 1))
        .await
        .unwrap_err();
    assert!(matches!(denied, Error::SavedSearchNotFound(_)));

    let teammate = service
        .run_saved_search(shared.id, CallerIdentity::user(8, 1))
        .await
        .unwrap();
    assert_eq!(titles(&teammate), vec!["Red Chair"]);

    assert!(
        service
            .run_saved_search(shared.id, CallerIdentity::user(9, 2))
            .await
            .is_err()
    );

    let visible: Vec<String> = service
        .list_saved_searches(8, 1)
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.name)
        .collect();
    assert_eq!(visible, vec!["Reds"]);

    let mine = service.list_saved_searches(7, 1).await.unwrap();
    let blues = mine.iter().find(|s| s.name == "Blues").unwrap();
    assert_eq!(blues.use_count, 1);
    assert!(blues.last_used_at.is_some());

    assert!(
        service
            .save_search(SavedSearch::new(" ", "blue", 7, 1))
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_persisted_entities_survive_new_service() {
    let db = widget_db().await;
    let first = widget_service(&db, settings()).await;
    first.persist_entity("widgets").await.unwrap();
    assert!(first.persist_entity("gadgets").await.is_err());

    let second =
        FuzzySearchService::new(db.pool().clone(), FuzzySearchConfig::default(), settings()).await;
    assert!(second.registry().is_empty().await);
    assert_eq!(second.load_persisted_entities().await.unwrap(), 1);
    assert_eq!(second.get_entity_types().await["widgets"], widgets());

    assert!(second.unregister_entity("widgets").await.unwrap());
    assert!(!second.unregister_entity("widgets").await.unwrap());

    let third =
        FuzzySearchService::new(db.pool().clone(), FuzzySearchConfig::default(), settings()).await;
    assert_eq!(third.load_persisted_entities().await.unwrap(), 0);
}

#[tokio::test]
async fn test_removed_default_entity_stays_removed() {
    let db = Database::in_memory().await.unwrap();
    let first = FuzzySearchService::new(
        db.pool().clone(),
        FuzzySearchConfig::default(),
        EngineSettings::default(),
    )
    .await;
    assert!(first.unregister_entity("users").await.unwrap());
    assert!(!first.unregister_entity("users").await.unwrap());

    let second = FuzzySearchService::new(
        db.pool().clone(),
        FuzzySearchConfig::default(),
        EngineSettings::default(),
    )
    .await;
    assert!(second.registry().get("users").await.is_some());
    assert_eq!(second.load_persisted_entities().await.unwrap(), 0);
    assert!(second.registry().get("users").await.is_none());
    assert_eq!(second.registry().len().await, 4);

    // Registering it again brings it back for later services
    assert!(!first.get_entity_types().await.contains_key("users"));
    second
        .register_entity(
            "users",
            EntityConfig::new("users", "Users")
                .with_field(FieldConfig::new("email", 1.0, SearchType::Prefix)),
        )
        .await
        .unwrap();
    second.persist_entity("users").await.unwrap();

    let third = FuzzySearchService::new(
        db.pool().clone(),
        FuzzySearchConfig::default(),
        EngineSettings::default(),
    )
    .await;
    assert_eq!(third.load_persisted_entities().await.unwrap(), 1);
    assert_eq!(third.registry().len().await, 5);
}

#[tokio::test]
async fn test_stats_and_health() {
    let db = widget_db().await;
    let service = widget_service(&db, settings()).await;

    let stats = service.stats().await;
    assert_eq!(stats.total_entity_types, 1);
    assert_eq!(stats.entity_types, vec!["widgets"]);
    assert_eq!(stats.status, "active");

    let health = service.health().await;
    assert_eq!(health.status, "healthy");
    assert_eq!(health.service, "fuzzy_search");
    assert!(health.database);
    assert_eq!(health.entity_types, 1);
}

#[tokio::test]
async fn test_aggregations() {
    let db = widget_db().await;
    let service = widget_service(&db, settings()).await;

    let mut options = SearchOptions::new("blue").with_page(0, 1);
    options.include_aggregations = true;
    let response = service.search(options).await.unwrap();

    let aggregations = response.aggregations.unwrap();
    let widgets = &aggregations["widgets"];
    assert_eq!(widgets.count, 3);
    assert_eq!(widgets.max_score, response.results[0].score);
    assert!(widgets.avg_score < widgets.max_score);
}

#[test]
fn test_error_codes() {
    let err = Error::SearchFailed("widgets: boom".to_string());
    assert_eq!(err.code(), "E200");
    assert!(!err.is_client_error());

    let err = Error::SavedSearchNotFound("x".to_string());
    assert!(err.is_client_error());
    assert!(err.suggestion().is_some());
}
