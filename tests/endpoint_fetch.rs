use std::sync::Arc;
use std::time::Duration;

use httptest::{matchers::*, responders::*, Expectation, Server};
use serde_json::{json, Value};

use place_rank_tracker::{
    AppError, EndpointSettings, HttpEndpoint, KeywordSearch, MultiEndpointSearch, PacingPolicy,
    Pacer, PageSource, RetryPolicy,
};

const SEARCH_PATH: &str = "/p/api/search";

fn settings(max_attempts: u32) -> EndpointSettings {
    EndpointSettings {
        caller: "pcweb".into(),
        page_size: 40,
        request_timeout: Duration::from_secs(5),
        retry: RetryPolicy::immediate(max_attempts),
    }
}

fn places_body(start: usize, count: usize) -> Value {
    let list: Vec<Value> = (start..start + count)
        .map(|i| json!({ "id": format!("{}", 1000 + i), "name": format!("Place {i}") }))
        .collect();
    json!({ "result": { "place": { "list": list } } })
}

fn no_pacing() -> Arc<Pacer> {
    Arc::new(Pacer::new(PacingPolicy::none()))
}

#[tokio::test]
async fn sends_search_parameters_and_browser_headers() {
    let server = Server::run();
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", SEARCH_PATH),
            request::query(url_decoded(contains(("caller", "pcweb")))),
            request::query(url_decoded(contains(("query", "강남 카페")))),
            request::query(url_decoded(contains(("type", "all")))),
            request::query(url_decoded(contains(("page", "2")))),
            request::query(url_decoded(contains(("displayCount", "40")))),
            request::query(url_decoded(contains(("lang", "ko")))),
            request::headers(contains(("referer", "https://map.naver.com/"))),
        ])
        .respond_with(json_encoded(places_body(0, 3))),
    );

    let endpoint = HttpEndpoint::new(server.url(SEARCH_PATH).to_string(), settings(1)).unwrap();
    let entries = endpoint.fetch_page("강남 카페", 2).await.unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0]["id"], "1000");
}

#[tokio::test]
async fn gives_up_after_configured_attempts_on_retryable_status() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", SEARCH_PATH))
            .times(3)
            .respond_with(status_code(503)),
    );

    let endpoint = HttpEndpoint::new(server.url(SEARCH_PATH).to_string(), settings(3)).unwrap();
    let err = endpoint.fetch_page("kw", 1).await.unwrap_err();

    match err {
        AppError::Fetch {
            attempts,
            page,
            source,
            ..
        } => {
            assert_eq!(attempts, 3);
            assert_eq!(page, 1);
            assert!(matches!(*source, AppError::Throttled { status: 503 }));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn treats_html_response_as_block_page() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", SEARCH_PATH))
            .times(2)
            .respond_with(
                status_code(200)
                    .append_header("content-type", "text/html; charset=utf-8")
                    .body("<html>captcha</html>"),
            ),
    );

    let endpoint = HttpEndpoint::new(server.url(SEARCH_PATH).to_string(), settings(2)).unwrap();
    let err = endpoint.fetch_page("kw", 1).await.unwrap_err();

    match err {
        AppError::Fetch { source, .. } => {
            assert!(matches!(
                *source,
                AppError::Blocked { ref content_type } if content_type.starts_with("text/html")
            ));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn retries_other_http_errors_with_the_same_cap() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", SEARCH_PATH))
            .times(2)
            .respond_with(status_code(404)),
    );

    let endpoint = HttpEndpoint::new(server.url(SEARCH_PATH).to_string(), settings(2)).unwrap();
    let err = endpoint.fetch_page("kw", 1).await.unwrap_err();

    match err {
        AppError::Fetch { source, .. } => assert!(matches!(*source, AppError::Http(_))),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn paginates_until_an_empty_page() {
    let server = Server::run();
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", SEARCH_PATH),
            request::query(url_decoded(contains(("page", "1")))),
        ])
        .respond_with(json_encoded(places_body(0, 40))),
    );
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", SEARCH_PATH),
            request::query(url_decoded(contains(("page", "2")))),
        ])
        .respond_with(json_encoded(json!({ "result": { "place": { "list": [] } } }))),
    );
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", SEARCH_PATH),
            request::query(url_decoded(contains(("page", "3")))),
        ])
        .times(0)
        .respond_with(json_encoded(places_body(80, 40))),
    );

    let endpoint: Arc<dyn PageSource> =
        Arc::new(HttpEndpoint::new(server.url(SEARCH_PATH).to_string(), settings(1)).unwrap());
    let search = MultiEndpointSearch::new(vec![endpoint], 40, no_pacing());

    let results = search.search("kw", 120).await.unwrap();
    assert_eq!(results.len(), 40);
    assert_eq!(results[0].id, "1000");
    assert_eq!(results[39].url, "https://pcmap.place.naver.com/place/1039");
}

#[tokio::test]
async fn falls_back_to_secondary_endpoint() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/p/api/search"))
            .times(2)
            .respond_with(status_code(429)),
    );
    server.expect(
        Expectation::matching(request::method_path("GET", "/v5/api/search"))
            .respond_with(json_encoded(places_body(0, 40))),
    );

    let sources: Vec<Arc<dyn PageSource>> = vec![
        Arc::new(HttpEndpoint::new(server.url("/p/api/search").to_string(), settings(2)).unwrap()),
        Arc::new(HttpEndpoint::new(server.url("/v5/api/search").to_string(), settings(2)).unwrap()),
    ];
    let search = MultiEndpointSearch::new(sources, 40, no_pacing());

    let results = search.search("kw", 40).await.unwrap();
    assert_eq!(results.len(), 40);
}
