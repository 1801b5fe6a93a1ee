//! Offline unit tests for flyerwise-db pool configuration and row types.
//! These tests do not require a live database connection.

use chrono::{Duration, Utc};
use flyerwise_core::{AppConfig, Environment, SizeUnit};
use flyerwise_db::{DbError, FlyerOfferRow, ListItemRow, PoolConfig, SessionRow, SnapshotRow};
use flyerwise_wizard::{OfferSnapshot, SessionFilters, SessionState, WizardSession};
use rust_decimal::Decimal;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use uuid::Uuid;

#[test]
fn pool_config_from_app_config_uses_core_values() {
    let app_config = AppConfig {
        database_url: "postgres://example".to_string(),
        env: Environment::Test,
        bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3000),
        log_level: "info".to_string(),
        scoring_path: None,
        db_max_connections: 42,
        db_min_connections: 7,
        db_acquire_timeout_secs: 9,
        session_ttl_secs: 1800,
        completed_retention_secs: 86_400,
        purge_cron: "0 */15 * * * *".to_string(),
    };

    let pool_config = PoolConfig::from_app_config(&app_config);
    assert_eq!(pool_config.max_connections, 42);
    assert_eq!(pool_config.min_connections, 7);
    assert_eq!(pool_config.acquire_timeout_secs, 9);
}

fn item_row() -> ListItemRow {
    ListItemRow {
        id: Uuid::new_v4(),
        list_id: Uuid::new_v4(),
        text: "brand a whole milk".to_string(),
        position: 0,
        offer_id: None,
        canonical_product_id: Some(Uuid::new_v4()),
        origin_offer_id: Some(Uuid::new_v4()),
        origin_store_id: Some("store-x".to_string()),
        origin_price: Some(Decimal::new(160, 2)),
        origin_package_value: Some(1000.0),
        origin_package_unit: Some("ml".to_string()),
        product_name: Some("whole milk".to_string()),
        product_brand: Some("brand a".to_string()),
        product_category: Some("dairy".to_string()),
        product_package_value: None,
        product_package_unit: None,
    }
}

#[test]
fn list_item_row_rebuilds_product_and_origin() {
    let row = item_row();
    let product_id = row.canonical_product_id;
    let item = row.into_item().expect("valid row");

    let product = item.product.expect("product master");
    assert_eq!(Some(product.id), product_id);
    assert_eq!(product.brand.as_deref(), Some("brand a"));
    assert!(product.package.is_none());

    let origin = item.origin.expect("origin");
    assert_eq!(origin.store_id, "store-x");
    assert_eq!(origin.price, Decimal::new(160, 2));
    assert_eq!(origin.package.map(|p| p.unit), Some(SizeUnit::Millilitre));
}

#[test]
fn list_item_row_without_links_is_free_text() {
    let row = ListItemRow {
        canonical_product_id: None,
        origin_offer_id: None,
        origin_store_id: None,
        origin_price: None,
        origin_package_value: None,
        origin_package_unit: None,
        product_name: None,
        product_brand: None,
        product_category: None,
        ..item_row()
    };
    let item = row.into_item().expect("valid row");
    assert!(item.product.is_none());
    assert!(item.origin.is_none());
}

#[test]
fn offer_row_with_unknown_unit_is_rejected() {
    let now = Utc::now();
    let row = FlyerOfferRow {
        id: Uuid::new_v4(),
        canonical_product_id: None,
        name: "milk".to_string(),
        brand: None,
        category: None,
        store_id: "store-x".to_string(),
        price: Decimal::ONE,
        package_value: Some(12.0),
        package_unit: Some("oz".to_string()),
        valid_from: now,
        valid_until: now + Duration::days(7),
    };
    assert!(matches!(row.into_offer(), Err(DbError::InvalidValue(_))));
}

#[test]
fn session_row_revision_column_wins() {
    let now = Utc::now();
    let mut session = WizardSession::new(
        Uuid::new_v4(),
        Vec::new(),
        SessionFilters::default(),
        3,
        now,
        Duration::minutes(30),
    );
    session.revision = 1;
    let row = SessionRow {
        id: session.id,
        list_id: session.list_id,
        state: session.state.as_str().to_string(),
        revision: 5,
        dataset_version: session.dataset_version,
        body: serde_json::to_value(&session).expect("serializable"),
        created_at: session.created_at,
        expires_at: session.expires_at,
        updated_at: now,
    };

    let decoded = row.into_session().expect("decodes");
    assert_eq!(decoded.revision, 5);
    assert_eq!(decoded.state, SessionState::Initialized);
    assert_eq!(decoded.dataset_version, 3);
}

#[test]
fn session_row_with_garbage_body_fails_to_decode() {
    let now = Utc::now();
    let row = SessionRow {
        id: Uuid::new_v4(),
        list_id: Uuid::new_v4(),
        state: "initialized".to_string(),
        revision: 0,
        dataset_version: 1,
        body: serde_json::json!({"unexpected": true}),
        created_at: now,
        expires_at: now,
        updated_at: now,
    };
    assert!(matches!(row.into_session(), Err(DbError::Serialization(_))));
}

#[test]
fn snapshot_row_converts_field_for_field() {
    let now = Utc::now();
    let row = SnapshotRow {
        id: Uuid::new_v4(),
        item_id: Uuid::new_v4(),
        session_id: Uuid::new_v4(),
        offer_id: Uuid::new_v4(),
        canonical_product_id: None,
        store_id: "store-y".to_string(),
        price: Decimal::new(110, 2),
        valid_from: now,
        valid_until: now + Duration::days(7),
        rank: 2,
        score: 4.5,
        explanation: "same brand".to_string(),
        selected: true,
        created_at: now,
    };
    let snapshot = OfferSnapshot::from(row.clone());
    assert_eq!(snapshot.key(), (row.item_id, row.session_id, row.offer_id, "store-y"));
    assert_eq!(snapshot.rank, 2);
    assert!(snapshot.selected);
}
