//! Installs driven by the GitHub release listing.

use crate::common::{NEW_BINARY, OLD_BINARY, Sandbox, fast_settings, release_archive, serve_release};
use devx::core::UpdateError;
use devx::test_utils::release_at;
use devx::upgrade::{GitHubReleaseSource, InstallOptions, UpdateChannel, UpdateOutcome};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const RELEASES_PATH: &str = "/repos/devx-tools/devx/releases";

fn github(server: &MockServer) -> GitHubReleaseSource {
    GitHubReleaseSource::new(reqwest::Client::new(), "devx-tools", "devx")
        .with_api_base(server.uri())
}

async fn serve_listing(server: &MockServer, tags: &[(&str, bool)]) {
    let releases: Vec<_> =
        tags.iter().map(|(tag, pre)| release_at(&server.uri(), tag, *pre)).collect();
    Mock::given(method("GET"))
        .and(path(RELEASES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(&releases))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_install_from_github_listing() {
    let server = MockServer::start().await;
    let sandbox = Sandbox::new();
    serve_listing(&server, &[("v1.4.0-beta.1", true), ("v1.3.0", false)]).await;
    serve_release(&server, "v1.3.0", &release_archive(), None).await;

    let outcome = sandbox
        .updater(Arc::new(github(&server)))
        .install(InstallOptions::default(), &CancellationToken::new())
        .await
        .unwrap();

    let UpdateOutcome::Installed(report) = outcome else {
        panic!("expected an install, got {outcome:?}");
    };
    assert_eq!(report.installed_version, "v1.3.0");
    assert_eq!(report.release_url, "https://github.com/devx-tools/devx/releases/tag/v1.3.0");
    assert_eq!(std::fs::read(sandbox.executable()).unwrap(), NEW_BINARY);
}

#[tokio::test]
async fn test_beta_channel_installs_prerelease() {
    let server = MockServer::start().await;
    let sandbox = Sandbox::new();
    serve_listing(&server, &[("v1.4.0-beta.1", true), ("v1.3.0", false)]).await;
    serve_release(&server, "v1.4.0-beta.1", &release_archive(), None).await;

    let mut settings = fast_settings();
    settings.channel = UpdateChannel::Beta;
    let outcome = sandbox
        .updater_with(Arc::new(github(&server)), settings)
        .install(InstallOptions::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        UpdateOutcome::Installed(ref r) if r.installed_version == "v1.4.0-beta.1"
    ));
}

#[tokio::test]
async fn test_rejected_token_falls_back_to_anonymous() {
    let server = MockServer::start().await;
    let sandbox = Sandbox::new();
    Mock::given(method("GET"))
        .and(path(RELEASES_PATH))
        .and(header("authorization", "Bearer expired"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    serve_listing(&server, &[("v1.2.0", false)]).await;

    let source = github(&server).with_token(Some("expired".to_string()));
    let result = sandbox
        .updater(Arc::new(source))
        .check(&CancellationToken::new())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(result.latest_version, "v1.2.0");
    assert!(!result.update_available);
}

#[tokio::test]
async fn test_rate_limited_listing() {
    let server = MockServer::start().await;
    let sandbox = Sandbox::new();
    Mock::given(method("GET"))
        .and(path(RELEASES_PATH))
        .respond_with(ResponseTemplate::new(403).insert_header("x-ratelimit-remaining", "0"))
        .mount(&server)
        .await;

    let err = sandbox
        .updater(Arc::new(github(&server)))
        .install(InstallOptions::default(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, UpdateError::RateLimited { .. }), "unexpected error: {err:?}");
    assert_eq!(std::fs::read(sandbox.executable()).unwrap(), OLD_BINARY);
    assert!(!sandbox.downloads().exists());
}
