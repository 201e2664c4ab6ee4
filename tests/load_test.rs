//! Concurrency tests: many requests composed at once.

use std::time::{Duration, Instant};

mod common;

use common::{client, start_gateway, start_mock_backend, MockReply};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_compositions() {
    let header = start_mock_backend(MockReply::ok("H").delay(20)).await;
    let content = start_mock_backend(MockReply::ok("C").delay(5)).await;
    let template = format!(
        r#"<header><fragment src="{}"/></header><main><fragment primary src="{}"/></main>"#,
        header.url("/"),
        content.url("/")
    );
    let gateway = start_gateway(&[("index", template)], |_| {}).await;
    let url = gateway.url("/");

    let mut tasks = Vec::new();
    for _ in 0..50 {
        let url = url.clone();
        tasks.push(tokio::spawn(async move {
            let res = client().get(&url).send().await.expect("gateway unreachable");
            (res.status().as_u16(), res.text().await.unwrap())
        }));
    }

    for task in tasks {
        let (status, body) = task.await.unwrap();
        assert_eq!(status, 200);
        assert_eq!(body, "<header>H</header><main>C</main>");
    }
    assert_eq!(header.requests().len(), 50);
    assert_eq!(content.requests().len(), 50);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fragments_fetch_concurrently() {
    let mut sources = Vec::new();
    for i in 0..5 {
        sources.push(start_mock_backend(MockReply::ok(format!("[{}]", i)).delay(200)).await);
    }
    let template: String = sources
        .iter()
        .map(|s| format!(r#"<fragment src="{}"/>"#, s.url("/")))
        .collect();
    let gateway = start_gateway(&[("index", template)], |_| {}).await;

    let started = Instant::now();
    let body = client().get(gateway.url("/")).send().await.unwrap().text().await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(body, "[0][1][2][3][4]");
    // five 200ms fragments in sequence would take a full second
    assert!(elapsed < Duration::from_millis(800), "took {:?}", elapsed);
}
