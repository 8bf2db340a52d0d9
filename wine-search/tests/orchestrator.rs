use std::io::Write;

use rand::rngs::StdRng;
use rand::SeedableRng;
use wine_search::backends::LocalWineStore;
use wine_search::{Config, Error, SearchFilters, SearchOrchestrator, SessionCursor};

const WINE_DATA: &str = r#"{
  "wines": [
    {
      "name": "Test Pinot Noir",
      "winery": "Test Winery",
      "type": "Red Wine",
      "region": "Napa Valley",
      "country": "USA",
      "vintage": "2019",
      "price": 25.99,
      "rating": 4.5,
      "description": "A delicious red wine",
      "pairings": ["beef", "cheese"]
    },
    {
      "name": "Budget Chardonnay",
      "winery": "Valley Cellars",
      "type": "White Wine",
      "region": "Sonoma",
      "country": "USA",
      "price": 9.0,
      "rating": 3.8
    }
  ],
  "metadata": { "version": "1.0" }
}"#;

fn wine_file() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(WINE_DATA.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn test_pinot_noir_from_local_store() {
    let file = wine_file();
    let store = LocalWineStore::load(file.path());
    let orchestrator = SearchOrchestrator::new(vec![Box::new(store)], 5);

    let wines = orchestrator
        .search("Pinot Noir", &SearchFilters::default())
        .await
        .unwrap();

    assert_eq!(wines.len(), 1);
    let wine = &wines[0];
    assert_eq!(wine.name, "Test Pinot Noir");
    assert_eq!(wine.winery, "Test Winery");
    assert_eq!(wine.source, "local_database");
    assert_eq!(wine.price, Some(25.99));
    assert_eq!(wine.vintage.as_deref(), Some("2019"));
    assert_eq!(wine.pairings, vec!["beef", "cheese"]);
}

#[tokio::test]
async fn test_empty_term_is_rejected() {
    let file = wine_file();
    let orchestrator =
        SearchOrchestrator::new(vec![Box::new(LocalWineStore::load(file.path()))], 5);

    let err = orchestrator
        .search("", &SearchFilters::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

#[tokio::test]
async fn test_default_config_chain_uses_local_file() {
    let file = wine_file();
    let path = file.path().to_string_lossy().to_string();
    let mut server = mockito::Server::new_async().await;
    let remote = server
        .mock("GET", mockito::Matcher::Any)
        .expect(0)
        .create_async()
        .await;
    let remote_url = server.url();
    let config = Config::from_lookup(|key| match key {
        "WINE_DATA_PATH" => Some(path.clone()),
        "SAMPLE_API_BASE_URL" => Some(remote_url.clone()),
        _ => None,
    })
    .unwrap();
    let sdk_config = aws_config::SdkConfig::builder().build();

    let orchestrator = SearchOrchestrator::from_config(&config, &sdk_config).await;
    assert_eq!(orchestrator.backend_names(), vec!["local_store", "sample_api"]);

    let filters = SearchFilters {
        max_price: Some(10.0),
        ..Default::default()
    };
    let wines = orchestrator
        .search_with_rng("usa", &filters, None, &mut StdRng::seed_from_u64(1))
        .await
        .unwrap();
    assert_eq!(wines.len(), 1);
    assert_eq!(wines[0].name, "Budget Chardonnay");
    remote.assert_async().await;
}

#[tokio::test]
async fn test_sample_apis_answer_when_local_file_misses() {
    let file = wine_file();
    let path = file.path().to_string_lossy().to_string();
    let mut server = mockito::Server::new_async().await;
    let whites = server
        .mock("GET", "/whites")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"[{"id": 4, "wine": "Cloudy Bay Sauvignon Blanc", "winery": "Cloudy Bay",
                "location": "Marlborough, New Zealand", "rating": {"average": "4.3"}}]"#,
        )
        .expect(1)
        .create_async()
        .await;
    let remote_url = server.url();
    let config = Config::from_lookup(|key| match key {
        "WINE_DATA_PATH" => Some(path.clone()),
        "SAMPLE_API_BASE_URL" => Some(remote_url.clone()),
        _ => None,
    })
    .unwrap();
    let sdk_config = aws_config::SdkConfig::builder().build();
    let orchestrator = SearchOrchestrator::from_config(&config, &sdk_config).await;

    let filters = SearchFilters {
        wine_type: Some("white".to_string()),
        ..Default::default()
    };
    let wines = orchestrator
        .search_with_rng("Cloudy Bay", &filters, None, &mut StdRng::seed_from_u64(3))
        .await
        .unwrap();

    whites.assert_async().await;
    assert_eq!(wines.len(), 1);
    assert_eq!(wines[0].name, "Cloudy Bay Sauvignon Blanc");
    assert_eq!(wines[0].country, "New Zealand");
    assert_eq!(wines[0].source, "sample_apis");
    assert_eq!(wines[0].rating, Some(4.3));
}

#[tokio::test]
async fn test_results_survive_session_round_trip() {
    let file = wine_file();
    let orchestrator = SearchOrchestrator::new(vec![Box::new(LocalWineStore::load(file.path()))], 5)
        .with_pairing_rerank(false);
    let wines = orchestrator
        .search("usa", &SearchFilters::default())
        .await
        .unwrap();

    let mut cursor = SessionCursor::new();
    cursor.set_results(wines);
    cursor.advance();

    let mut attributes = serde_json::Map::new();
    cursor.write_attributes(&mut attributes);
    let restored = SessionCursor::from_attributes(&attributes);

    assert_eq!(restored.current_index(), 1);
    assert_eq!(restored.current().unwrap().name, "Budget Chardonnay");
}
