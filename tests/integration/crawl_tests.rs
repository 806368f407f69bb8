//! Integration tests for the crawler
//!
//! These tests use wiremock to serve a small directory site and test
//! the full crawl cycle end-to-end against an on-disk SQLite store.

use annuaire_crawler::config::{
    Config, CrawlerConfig, FetchConfig, SamplingConfig, Selection, SiteConfig, StorageConfig,
};
use annuaire_crawler::crawler::Coordinator;
use annuaire_crawler::output::load_statistics;
use annuaire_crawler::storage::{FrontierStore, Level, SqliteFrontier};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration for the mock site
fn create_test_config(base_url: &str, db_path: &Path, workers: usize) -> Config {
    Config {
        site: SiteConfig {
            base_url: base_url.to_string(),
            catalog_path: "/trouver-un-professionnel".to_string(),
        },
        crawler: CrawlerConfig {
            workers,
            queue_capacity: 2,
        },
        fetch: FetchConfig {
            timeout_secs: 5,
            connect_timeout_secs: 2,
            max_retries: 1,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
        },
        sampling: SamplingConfig {
            count: 1,
            selection: Selection::UniformRandom,
        },
        storage: StorageConfig {
            database_path: db_path.to_string_lossy().to_string(),
            max_open_connections: 2,
            max_idle_connections: 1,
        },
    }
}

/// Mounts a page that must be requested exactly `times` times
async fn mount_page(server: &MockServer, route: &str, body: String, times: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/html; charset=utf-8"),
        )
        .expect(times)
        .mount(server)
        .await;
}

fn tier(class: &str, links: &[(&str, &str)]) -> String {
    let items: String = links
        .iter()
        .map(|(href, label)| format!("<li><a href=\"{}\">{}</a></li>\n", href, label))
        .collect();
    format!("<ul class=\"{}\">\n{}</ul>\n", class, items)
}

fn listing_page(detail: &str, surname: &str, given: &str) -> String {
    format!(
        "<html><body>\n<div class=\"item-professionnel\">\n  <a href=\"{}\"><strong>{}</strong>\n    {}</a>\n</div>\n</body></html>",
        detail, surname, given
    )
}

fn detail_page(address: &str, phone: &str) -> String {
    format!(
        "<html><body><div class=\"adresse\">{}</div><div class=\"tel\">{}</div></body></html>",
        address, phone
    )
}

/// Mounts one category, two subcategories, (3, 1) listings and one record
/// candidate per listing
///
/// Discovery pages expect `discovery_fetches` requests, listing and detail
/// pages expect `sampling_fetches`.
async fn mount_site(server: &MockServer, discovery_fetches: u64, sampling_fetches: u64) {
    mount_page(
        server,
        "/trouver-un-professionnel",
        tier("first", &[("/cardiologue", "Cardiologue")]),
        discovery_fetches,
    )
    .await;

    // One department in a tier, one as a department item
    mount_page(
        server,
        "/cardiologue",
        format!(
            "{}<ul class=\"departements\"><li class=\"seo-departement\"><a href=\"/cardiologue/13-bouches-du-rhone\">Bouches-du-Rh&ocirc;ne</a></li></ul>",
            tier("first", &[("/cardiologue/75-paris", "Paris")])
        ),
        discovery_fetches,
    )
    .await;

    mount_page(
        server,
        "/cardiologue/75-paris",
        format!(
            "{}{}",
            tier(
                "first",
                &[
                    ("/cardiologue/75-paris/paris-75001", "Paris 1er"),
                    ("/cardiologue/75-paris/paris-75002", "Paris 2e"),
                ]
            ),
            tier("second", &[("/cardiologue/75-paris/paris-75003", "Paris 3e")])
        ),
        discovery_fetches,
    )
    .await;

    mount_page(
        server,
        "/cardiologue/13-bouches-du-rhone",
        tier(
            "first",
            &[("/cardiologue/13-bouches-du-rhone/marseille", "Marseille")],
        ),
        discovery_fetches,
    )
    .await;

    let listings = [
        ("/cardiologue/75-paris/paris-75001", "dupont", "DUPONT", "Jean", "1 rue de Rivoli 75001 Paris"),
        ("/cardiologue/75-paris/paris-75002", "martin", "MARTIN", "Anne", "2 rue de la Paix 75002 Paris"),
        ("/cardiologue/75-paris/paris-75003", "durand", "DURAND", "Paul", "3 rue des Archives 75003 Paris"),
        ("/cardiologue/13-bouches-du-rhone/marseille", "roux", "ROUX", "Marie", "4 La Canebière 13001 Marseille"),
    ];

    for (listing, slug, surname, given, address) in listings {
        let detail = format!("/professionnels-de-sante/fiche-detaillee-{}-1", slug);
        mount_page(
            server,
            listing,
            listing_page(&detail, surname, given),
            sampling_fetches,
        )
        .await;
        mount_page(
            server,
            &detail,
            detail_page(address, "04 91 00 00 00"),
            sampling_fetches,
        )
        .await;
    }
}

fn open_store(db_path: &Path) -> SqliteFrontier {
    SqliteFrontier::open(db_path, 2, 1).expect("Failed to open store")
}

#[tokio::test]
async fn test_full_crawl_populates_every_level() {
    let server = MockServer::start().await;
    mount_site(&server, 1, 1).await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("crawl.db");
    let config = create_test_config(&server.uri(), &db_path, 2);

    let coordinator = Coordinator::new(config, CancellationToken::new()).unwrap();
    let report = coordinator.run().await.unwrap();

    assert_eq!(report.categories, 1);
    assert_eq!(report.subcategories, 2);
    assert_eq!(report.listings, 4);
    assert_eq!(report.jobs_admitted, 4);
    assert_eq!(report.jobs_done, 4);
    assert_eq!(report.jobs_dropped, 0);
    assert_eq!(report.records_inserted, 4);
    assert!(!report.cancelled);

    let store = open_store(&db_path);
    let stats = load_statistics(&store).unwrap();
    assert_eq!(stats.categories, 1);
    assert_eq!(stats.subcategories, 2);
    assert_eq!(stats.listings, 4);
    assert_eq!(stats.records, 4);

    let subcategories = store.load_all(Level::Subcategory).unwrap();
    let mut codes: Vec<_> = subcategories
        .iter()
        .filter_map(|s| s.code.clone())
        .collect();
    codes.sort();
    assert_eq!(codes, vec!["13", "75"]);
    assert!(subcategories.iter().any(|s| s.name == "Bouches-du-Rhône"));

    let records = store.load_records().unwrap();
    let mut names: Vec<_> = records.iter().map(|r| r.name.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["DUPONT Jean", "DURAND Paul", "MARTIN Anne", "ROUX Marie"]);
    assert!(records.iter().all(|r| r.speciality == "Cardiologue"));

    let marseille = records.iter().find(|r| r.name == "ROUX Marie").unwrap();
    assert_eq!(marseille.postal_code.as_deref(), Some("13001"));
    assert_eq!(marseille.city.as_deref(), Some("Marseille"));
}

#[tokio::test]
async fn test_second_run_resumes_without_rediscovery() {
    let server = MockServer::start().await;
    // Discovery pages once across both runs, listings and details once per run
    mount_site(&server, 1, 2).await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("crawl.db");

    let first = Coordinator::new(
        create_test_config(&server.uri(), &db_path, 2),
        CancellationToken::new(),
    )
    .unwrap()
    .run()
    .await
    .unwrap();
    assert_eq!(first.records_inserted, 4);

    let second = Coordinator::new(
        create_test_config(&server.uri(), &db_path, 3),
        CancellationToken::new(),
    )
    .unwrap()
    .run()
    .await
    .unwrap();

    assert_eq!(second.categories, 1);
    assert_eq!(second.subcategories, 2);
    assert_eq!(second.listings, 4);
    assert_eq!(second.jobs_done, 4);
    assert_eq!(second.records_inserted, 0);

    let stats = load_statistics(&open_store(&db_path)).unwrap();
    assert_eq!(stats.categories, 1);
    assert_eq!(stats.subcategories, 2);
    assert_eq!(stats.listings, 4);
    assert_eq!(stats.records, 4);
}

#[tokio::test]
async fn test_resume_continues_from_first_unpopulated_level() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("crawl.db");

    // A previous run persisted the category but stopped before subcategories
    let store = Arc::new(open_store(&db_path));
    store
        .insert_if_absent(&annuaire_crawler::storage::NodeDraft::category(
            "Cardiologue",
            format!("{}/cardiologue", server.uri()),
        ))
        .unwrap();

    mount_page(
        &server,
        "/trouver-un-professionnel",
        tier("first", &[("/cardiologue", "Cardiologue")]),
        0,
    )
    .await;
    mount_page(
        &server,
        "/cardiologue",
        tier("first", &[("/cardiologue/75-paris", "Paris")]),
        1,
    )
    .await;
    mount_page(
        &server,
        "/cardiologue/75-paris",
        tier("first", &[("/cardiologue/75-paris/paris-75001", "Paris 1er")]),
        1,
    )
    .await;
    mount_page(
        &server,
        "/cardiologue/75-paris/paris-75001",
        listing_page("/professionnels-de-sante/fiche-detaillee-dupont-1", "DUPONT", "Jean"),
        1,
    )
    .await;
    mount_page(
        &server,
        "/professionnels-de-sante/fiche-detaillee-dupont-1",
        detail_page("1 rue de Rivoli 75001 Paris", "01 00 00 00 00"),
        1,
    )
    .await;

    let coordinator = Coordinator::with_store(
        create_test_config(&server.uri(), &db_path, 1),
        store.clone(),
        CancellationToken::new(),
    )
    .unwrap();
    let report = coordinator.run().await.unwrap();

    assert_eq!(report.categories, 1);
    assert_eq!(report.subcategories, 1);
    assert_eq!(report.listings, 1);
    assert_eq!(report.records_inserted, 1);
    assert_eq!(store.count(Level::Category).unwrap(), 1);
}

#[tokio::test]
async fn test_failed_listing_is_dropped_and_barrier_drains() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("crawl.db");

    mount_page(
        &server,
        "/trouver-un-professionnel",
        tier("first", &[("/cardiologue", "Cardiologue")]),
        1,
    )
    .await;
    mount_page(
        &server,
        "/cardiologue",
        tier("first", &[("/cardiologue/75-paris", "Paris")]),
        1,
    )
    .await;
    mount_page(
        &server,
        "/cardiologue/75-paris",
        tier(
            "first",
            &[
                ("/cardiologue/75-paris/paris-75001", "Paris 1er"),
                ("/cardiologue/75-paris/paris-75002", "Paris 2e"),
            ],
        ),
        1,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/cardiologue/75-paris/paris-75001"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    mount_page(
        &server,
        "/cardiologue/75-paris/paris-75002",
        listing_page("/professionnels-de-sante/fiche-detaillee-martin-1", "MARTIN", "Anne"),
        1,
    )
    .await;
    mount_page(
        &server,
        "/professionnels-de-sante/fiche-detaillee-martin-1",
        detail_page("2 rue de la Paix 75002 Paris", "01 00 00 00 00"),
        1,
    )
    .await;

    let report = Coordinator::new(
        create_test_config(&server.uri(), &db_path, 2),
        CancellationToken::new(),
    )
    .unwrap()
    .run()
    .await
    .unwrap();

    assert_eq!(report.jobs_admitted, 2);
    assert_eq!(report.jobs_done, 1);
    assert_eq!(report.jobs_dropped, 1);
    assert_eq!(report.jobs_done + report.jobs_dropped, report.jobs_admitted);
    assert_eq!(open_store(&db_path).count_records().unwrap(), 1);
}
