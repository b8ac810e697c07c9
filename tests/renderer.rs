//! Single-page rendering against the scripted browser

mod common;

use std::time::Duration;

use batchprint::{Error, RenderTask};
use common::{behaviors, renderer, Behavior, FakeBackend, BIO_LOGO, FAKE_PDF, MASTER_LOGO};

const PAGE: &str = "https://bio.libretexts.org/Page";

#[tokio::test]
async fn titled_page_is_named_after_its_title() {
    let out = tempfile::tempdir().unwrap();
    let backend = FakeBackend::new(behaviors(&[(PAGE, Behavior::titled("Ch1: Intro"))]));
    let (renderer, stats) = renderer(backend, out.path());

    let outcome = renderer.render(RenderTask::new(PAGE)).await;
    let path = outcome.output_path().expect("render should succeed").to_path_buf();
    assert_eq!(path, out.path().join("Intro.pdf"));
    assert_eq!(std::fs::read(&path).unwrap(), FAKE_PDF);

    let printed = stats.last_printed().unwrap();
    assert!(printed.print_background);
    assert!(printed.footer_template.contains("Ch1.<div class=\"pageNumber\">"));
    assert!(printed.header_template.contains(BIO_LOGO));
    assert!(printed.header_template.contains(MASTER_LOGO));
    assert!(printed.header_template.contains("#00b224"));
    assert_eq!(stats.opened(), 1);
    assert_eq!(stats.closed(), 1);
}

#[tokio::test]
async fn unknown_library_falls_back_to_default_branding() {
    let out = tempfile::tempdir().unwrap();
    let url = "https://unknown.libretexts.org/Page";
    let (renderer, stats) = renderer(FakeBackend::plain(), out.path());

    let outcome = renderer.render(RenderTask::new(url)).await;
    assert!(outcome.is_success(), "{:?}", outcome.error());

    let printed = stats.last_printed().unwrap();
    assert!(printed.header_template.contains("#127BC4"));
    assert!(!printed.header_template.contains(BIO_LOGO));
    assert!(printed
        .footer_template
        .contains("font-size: 8px\"><div class=\"pageNumber\">"));
}

#[tokio::test]
async fn soft_timeout_still_produces_a_pdf() {
    let out = tempfile::tempdir().unwrap();
    let slow = Behavior {
        soft_timeout: true,
        ..Behavior::titled("Slow Page")
    };
    let (renderer, _) = renderer(FakeBackend::new(behaviors(&[(PAGE, slow)])), out.path());

    let outcome = renderer.render(RenderTask::new(PAGE)).await;
    assert_eq!(outcome.output_path(), Some(out.path().join("Slow Page.pdf").as_path()));
}

#[tokio::test]
async fn hung_page_is_killed_at_the_hard_timeout() {
    let out = tempfile::tempdir().unwrap();
    let (renderer, stats) = renderer(
        FakeBackend::new(behaviors(&[(PAGE, Behavior::hanging())])),
        out.path(),
    );

    let outcome = renderer.render(RenderTask::new(PAGE)).await;
    assert!(matches!(outcome.error(), Some(Error::Timeout(500))));
    assert!(outcome.elapsed < Duration::from_secs(3));
    assert_eq!(stats.closed(), 1);
    assert!(std::fs::read_dir(out.path()).unwrap().next().is_none());
}

#[tokio::test]
async fn navigation_failure_writes_nothing() {
    let out = tempfile::tempdir().unwrap();
    let (renderer, stats) = renderer(
        FakeBackend::new(behaviors(&[(PAGE, Behavior::failing())])),
        out.path(),
    );

    let outcome = renderer.render(RenderTask::new(PAGE)).await;
    assert!(matches!(outcome.error(), Some(Error::LoadError(_))));
    assert_eq!(stats.closed(), 1);
    assert!(std::fs::read_dir(out.path()).unwrap().next().is_none());
}

#[tokio::test]
async fn panicking_browser_call_fails_and_closes_the_page() {
    let out = tempfile::tempdir().unwrap();
    let (renderer, stats) = renderer(
        FakeBackend::new(behaviors(&[(PAGE, Behavior::panicking())])),
        out.path(),
    );

    let outcome = renderer.render(RenderTask::new(PAGE)).await;
    assert!(matches!(outcome.error(), Some(Error::RenderError(msg)) if msg.contains("panicked")));
    assert_eq!(stats.opened(), 1);
    assert_eq!(stats.closed(), 1);
    assert!(std::fs::read_dir(out.path()).unwrap().next().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_renders_of_one_page_all_succeed() {
    let out = tempfile::tempdir().unwrap();
    let page = Behavior {
        delay: Duration::from_millis(100),
        ..Behavior::titled("Ch1: Intro")
    };
    let (renderer, stats) = renderer(FakeBackend::new(behaviors(&[(PAGE, page)])), out.path());

    let renders = (0..6).map(|_| renderer.render(RenderTask::in_directory(PAGE, "libretexts/Book")));
    let outcomes = futures::future::join_all(renders).await;

    let dir = out.path().join("libretexts").join("Book");
    for outcome in &outcomes {
        assert!(outcome.is_success(), "{:?}", outcome.error());
        assert_eq!(outcome.output_path(), Some(dir.join("Intro.pdf").as_path()));
    }
    assert!(stats.max_in_flight() > 1);
    let files: Vec<_> = std::fs::read_dir(&dir).unwrap().collect();
    assert_eq!(files.len(), 1);
    assert_eq!(std::fs::read(dir.join("Intro.pdf")).unwrap(), FAKE_PDF);
}

#[tokio::test]
async fn rendering_twice_overwrites_the_same_file() {
    let out = tempfile::tempdir().unwrap();
    let backend = FakeBackend::new(behaviors(&[(PAGE, Behavior::titled("Ch1: Intro"))]));
    let (renderer, _) = renderer(backend, out.path());

    let task = RenderTask::in_directory(PAGE, "libretexts/Book");
    let first = renderer.render(task.clone()).await;
    let second = renderer.render(task).await;
    assert_eq!(first.output_path(), second.output_path());
    assert_eq!(
        second.output_path(),
        Some(out.path().join("libretexts").join("Book").join("Intro.pdf").as_path())
    );
    let files: Vec<_> = std::fs::read_dir(out.path().join("libretexts").join("Book"))
        .unwrap()
        .collect();
    assert_eq!(files.len(), 1);
}

#[tokio::test]
async fn untitled_page_is_named_after_its_url() {
    let out = tempfile::tempdir().unwrap();
    let (renderer, _) = renderer(FakeBackend::plain(), out.path());

    let outcome = renderer.render(RenderTask::new(PAGE)).await;
    let name = outcome
        .output_path()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap();
    assert!(name.ends_with(".pdf"));
    assert!(name.contains("bio.libretexts.org"));
    assert!(!name.contains('/'));
}
