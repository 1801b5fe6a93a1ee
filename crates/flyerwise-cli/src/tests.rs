use super::*;
use crate::search::{build_item, format_row};
use flyerwise_core::SizeUnit;
use flyerwise_matching::{CandidateSuggestion, SearchPass};
use rust_decimal::Decimal;

#[test]
fn parses_db_ping_command() {
    let cli =
        Cli::try_parse_from(["flyerwise-cli", "db", "ping"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Ping
        })
    ));
}

#[test]
fn parses_db_migrate_command() {
    let cli =
        Cli::try_parse_from(["flyerwise-cli", "db", "migrate"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Migrate
        })
    ));
}

#[test]
fn parses_sessions_purge_expired_command() {
    let cli = Cli::try_parse_from(["flyerwise-cli", "sessions", "purge-expired"])
        .expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Sessions {
            command: SessionCommands::PurgeExpired
        })
    ));
}

#[test]
fn sessions_show_requires_a_uuid() {
    assert!(Cli::try_parse_from(["flyerwise-cli", "sessions", "show", "--id", "nope"]).is_err());

    let id = Uuid::new_v4().to_string();
    let cli = Cli::try_parse_from(["flyerwise-cli", "sessions", "show", "--id", &id])
        .expect("expected valid cli args");
    assert!(matches!(
        cli.command,
        Some(Commands::Sessions {
            command: SessionCommands::Show { id: parsed }
        }) if parsed.to_string() == id
    ));
}

#[test]
fn no_command_is_none() {
    let cli = Cli::try_parse_from(["flyerwise-cli"]).expect("expected valid cli args");
    assert!(cli.command.is_none());
}

#[test]
fn search_parses_repeatable_store_flags() {
    let cli = Cli::try_parse_from([
        "flyerwise-cli",
        "search",
        "--name",
        "whole milk",
        "--brand",
        "Brand A",
        "--only-store",
        "store-x",
        "--only-store",
        "store-y",
        "--prefer",
        "store-y",
    ])
    .expect("expected valid cli args");

    let Some(Commands::Search(args)) = cli.command else {
        panic!("expected search command");
    };
    assert_eq!(args.only_stores, vec!["store-x", "store-y"]);
    assert_eq!(args.preferred, vec!["store-y"]);
    assert!(args.store.is_none());
}

#[test]
fn search_store_and_price_go_together() {
    assert!(Cli::try_parse_from([
        "flyerwise-cli",
        "search",
        "--name",
        "milk",
        "--store",
        "store-x",
    ])
    .is_err());
    assert!(Cli::try_parse_from(["flyerwise-cli", "search", "--name", "milk", "--price", "1.50"])
        .is_err());
}

#[test]
fn build_item_carries_origin_and_size() {
    let cli = Cli::try_parse_from([
        "flyerwise-cli",
        "search",
        "--name",
        "Whole Milk",
        "--brand",
        "Brand A",
        "--size",
        "1 l",
        "--store",
        "store-x",
        "--price",
        "1.50",
    ])
    .expect("expected valid cli args");
    let Some(Commands::Search(args)) = cli.command else {
        panic!("expected search command");
    };

    let item = build_item(&args);
    let product = item.product.as_ref().expect("product master");
    assert_eq!(product.name, "whole milk");
    assert_eq!(product.branded_query().as_deref(), Some("brand a whole milk"));
    assert_eq!(item.original_store(), Some("store-x"));
    assert_eq!(item.original_price(), Some(Decimal::new(150, 2)));
    assert_eq!(item.original_package().map(|p| p.unit), Some(SizeUnit::Millilitre));
}

#[test]
fn format_row_shows_store_price_and_explanation() {
    let now = chrono::Utc::now();
    let offer = flyerwise_core::FlyerOffer {
        id: Uuid::new_v4(),
        canonical_product_id: None,
        name: "Whole Milk".to_string(),
        brand: Some("Brand A".to_string()),
        category: None,
        store_id: "store-x".to_string(),
        price: Decimal::new(160, 2),
        package: None,
        valid_from: now,
        valid_until: now,
    };
    let mut candidate = CandidateSuggestion::unranked(offer, SearchPass::Strong, 0.9, true);
    candidate.rank = 1;
    candidate.explanation = "same brand, original store".to_string();

    let row = format_row(&candidate);
    assert!(row.starts_with("#1 "));
    assert!(row.contains("store-x"));
    assert!(row.contains("1.60"));
    assert!(row.contains("strong"));
    assert!(row.contains("same brand, original store"));
}
