//! End-to-end install flows against a local release server.

use crate::common::{
    ARCHIVE, NEW_BINARY, OLD_BINARY, Sandbox, fast_settings, release_archive, serve_release,
};
use devx::core::UpdateError;
use devx::test_utils::{
    StaticReleaseSource, TarEntry, build_tar_gz, checksum_manifest, release_at, sha256_hex,
};
use devx::upgrade::alias::AliasOutcome;
use devx::upgrade::{InstallOptions, UpdateOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn source(server: &MockServer, tag: &str) -> Arc<StaticReleaseSource> {
    Arc::new(StaticReleaseSource::new(vec![release_at(&server.uri(), tag, false)]))
}

#[tokio::test]
async fn test_full_install_replaces_executable() {
    let server = MockServer::start().await;
    let sandbox = Sandbox::new();
    let archive = release_archive();
    serve_release(&server, "v1.3.0", &archive, None).await;

    let updater = sandbox.updater(source(&server, "v1.3.0"));
    let outcome =
        updater.install(InstallOptions::default(), &CancellationToken::new()).await.unwrap();

    let UpdateOutcome::Installed(report) = outcome else {
        panic!("expected an install, got {outcome:?}");
    };
    assert_eq!(report.previous_version, "1.2.0");
    assert_eq!(report.installed_version, "v1.3.0");
    assert_eq!(report.digest, sha256_hex(&archive));
    assert_eq!(report.bytes, archive.len() as u64);
    assert!(!report.resumed);
    assert_eq!(report.executable, sandbox.executable());

    assert_eq!(std::fs::read(sandbox.executable()).unwrap(), NEW_BINARY);
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(sandbox.executable()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
        assert_eq!(std::fs::read_link(sandbox.bin_dir().join("dx")).unwrap(), sandbox.executable());
        assert_eq!(report.alias, Some(AliasOutcome::Created(sandbox.bin_dir().join("dx"))));
    }

    // archive and staging directory are cleaned up
    assert!(!sandbox.downloads().join(ARCHIVE).exists());
    let leftovers: Vec<_> = std::fs::read_dir(sandbox.downloads()).unwrap().collect();
    assert!(leftovers.is_empty(), "unexpected leftovers: {leftovers:?}");

    let status = updater.status().expect("install records a check");
    assert_eq!(status.latest_version, "v1.3.0");
    assert!(!status.update_available);
}

#[tokio::test]
async fn test_checksum_mismatch_keeps_old_binary() {
    let server = MockServer::start().await;
    let sandbox = Sandbox::new();
    let archive = release_archive();
    let wrong = checksum_manifest(&[(ARCHIVE, b"a different archive".as_slice())]);
    serve_release(&server, "v1.3.0", &archive, Some(wrong)).await;

    let err = sandbox
        .updater(source(&server, "v1.3.0"))
        .install(InstallOptions::default(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, UpdateError::ChecksumMismatch { .. }), "unexpected error: {err:?}");
    assert_eq!(std::fs::read(sandbox.executable()).unwrap(), OLD_BINARY);
    assert!(!sandbox.release_downloads("v1.3.0").join(ARCHIVE).exists());
    assert!(!sandbox.bin_dir().join("dx").exists());
}

#[tokio::test]
async fn test_manifest_without_archive_entry() {
    let server = MockServer::start().await;
    let sandbox = Sandbox::new();
    let archive = release_archive();
    let manifest = checksum_manifest(&[("devx_darwin_arm64.tar.gz", archive.as_slice())]);
    serve_release(&server, "v1.3.0", &archive, Some(manifest)).await;

    let err = sandbox
        .updater(source(&server, "v1.3.0"))
        .install(InstallOptions::default(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, UpdateError::ManifestEntryMissing { .. }), "unexpected error: {err:?}");
    assert_eq!(std::fs::read(sandbox.executable()).unwrap(), OLD_BINARY);
}

#[tokio::test]
async fn test_archive_without_binary() {
    let server = MockServer::start().await;
    let sandbox = Sandbox::new();
    let archive = build_tar_gz(&[
        TarEntry::dir("docs"),
        TarEntry::file("docs/README.md", b"# devx\n", 0o644),
        TarEntry::file("devx-helper", b"not the binary", 0o755),
    ]);
    serve_release(&server, "v1.3.0", &archive, None).await;

    let err = sandbox
        .updater(source(&server, "v1.3.0"))
        .install(InstallOptions::default(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, UpdateError::BinaryNotFound { ref binary } if binary == "devx"));
    assert_eq!(std::fs::read(sandbox.executable()).unwrap(), OLD_BINARY);
}

#[tokio::test]
async fn test_escaping_entries_are_ignored() {
    let server = MockServer::start().await;
    let sandbox = Sandbox::new();
    let archive = build_tar_gz(&[
        TarEntry::file("../evil", b"escaped", 0o755),
        TarEntry::file("../../bin/devx", b"hijacked", 0o755),
        TarEntry::symlink("link", "/etc/passwd"),
        TarEntry::file("devx", NEW_BINARY, 0o755),
    ]);
    serve_release(&server, "v1.3.0", &archive, None).await;

    let outcome = sandbox
        .updater(source(&server, "v1.3.0"))
        .install(InstallOptions::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(outcome, UpdateOutcome::Installed(_)));
    assert_eq!(std::fs::read(sandbox.executable()).unwrap(), NEW_BINARY);
    assert!(!sandbox.release_downloads("v1.3.0").join("evil").exists());
    assert!(!sandbox.downloads().join("evil").exists());
    assert!(!sandbox.state_dir().join("evil").exists());
}

#[tokio::test]
async fn test_up_to_date_skips_download() {
    let server = MockServer::start().await;
    let sandbox = Sandbox::new();
    Mock::given(method("GET"))
        .and(path(format!("/v1.2.0/{ARCHIVE}")))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let outcome = sandbox
        .updater(source(&server, "v1.2.0"))
        .install(InstallOptions::default(), &CancellationToken::new())
        .await
        .unwrap();

    let UpdateOutcome::UpToDate(result) = outcome else {
        panic!("expected up to date, got {outcome:?}");
    };
    assert_eq!(result.latest_version, "v1.2.0");
    assert!(!result.update_available);
    assert_eq!(std::fs::read(sandbox.executable()).unwrap(), OLD_BINARY);
}

#[tokio::test]
async fn test_force_reinstalls_same_version() {
    let server = MockServer::start().await;
    let sandbox = Sandbox::new();
    let archive = release_archive();
    serve_release(&server, "v1.2.0", &archive, None).await;

    let options = InstallOptions {
        force: true,
        ..InstallOptions::default()
    };
    let outcome = sandbox
        .updater(source(&server, "v1.2.0"))
        .install(options, &CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(outcome, UpdateOutcome::Installed(ref r) if r.installed_version == "v1.2.0"));
    assert_eq!(std::fs::read(sandbox.executable()).unwrap(), NEW_BINARY);
}

#[tokio::test]
async fn test_resumes_partial_download() {
    let server = MockServer::start().await;
    let sandbox = Sandbox::new();
    let archive = release_archive();
    let split = archive.len() / 2;

    let release_dir = sandbox.release_downloads("v1.3.0");
    std::fs::create_dir_all(&release_dir).unwrap();
    std::fs::write(release_dir.join(format!("{ARCHIVE}.tmp")), &archive[..split]).unwrap();

    Mock::given(method("GET"))
        .and(path(format!("/v1.3.0/{ARCHIVE}")))
        .and(header("range", format!("bytes={split}-").as_str()))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header(
                    "content-range",
                    format!("bytes {}-{}/{}", split, archive.len() - 1, archive.len()).as_str(),
                )
                .set_body_bytes(archive[split..].to_vec()),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1.3.0/checksums.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(checksum_manifest(&[(ARCHIVE, archive.as_slice())])),
        )
        .mount(&server)
        .await;

    let outcome = sandbox
        .updater(source(&server, "v1.3.0"))
        .install(InstallOptions::default(), &CancellationToken::new())
        .await
        .unwrap();

    let UpdateOutcome::Installed(report) = outcome else {
        panic!("expected an install, got {outcome:?}");
    };
    assert!(report.resumed);
    assert_eq!(report.bytes, archive.len() as u64);
    assert_eq!(report.digest, sha256_hex(&archive));
    assert_eq!(std::fs::read(sandbox.executable()).unwrap(), NEW_BINARY);
}

#[tokio::test]
async fn test_partial_from_older_release_is_not_resumed() {
    let server = MockServer::start().await;
    let sandbox = Sandbox::new();
    let old_archive = build_tar_gz(&[TarEntry::file("devx", OLD_BINARY, 0o755)]);
    let archive = release_archive();

    let old_dir = sandbox.release_downloads("v1.3.0");
    std::fs::create_dir_all(&old_dir).unwrap();
    let half = &old_archive[..old_archive.len() / 2];
    std::fs::write(old_dir.join(format!("{ARCHIVE}.tmp")), half).unwrap();
    std::fs::write(sandbox.downloads().join(format!("{ARCHIVE}.tmp")), &old_archive[..10]).unwrap();

    Mock::given(method("GET"))
        .and(path(format!("/v1.4.0/{ARCHIVE}")))
        .and(header_exists("range"))
        .respond_with(ResponseTemplate::new(416))
        .expect(0)
        .mount(&server)
        .await;
    serve_release(&server, "v1.4.0", &archive, None).await;

    let outcome = sandbox
        .updater(source(&server, "v1.4.0"))
        .install(InstallOptions::default(), &CancellationToken::new())
        .await
        .unwrap();

    let UpdateOutcome::Installed(report) = outcome else {
        panic!("expected an install, got {outcome:?}");
    };
    assert!(!report.resumed);
    assert_eq!(report.digest, sha256_hex(&archive));
    assert_eq!(std::fs::read(sandbox.executable()).unwrap(), NEW_BINARY);
    assert!(!old_dir.exists());
    assert!(!sandbox.downloads().join(format!("{ARCHIVE}.tmp")).exists());
}

#[tokio::test]
async fn test_retries_transient_server_errors() {
    let server = MockServer::start().await;
    let sandbox = Sandbox::new();
    let archive = release_archive();

    Mock::given(method("GET"))
        .and(path(format!("/v1.3.0/{ARCHIVE}")))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    serve_release(&server, "v1.3.0", &archive, None).await;

    let outcome = sandbox
        .updater(source(&server, "v1.3.0"))
        .install(InstallOptions::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(outcome, UpdateOutcome::Installed(_)));
    assert_eq!(std::fs::read(sandbox.executable()).unwrap(), NEW_BINARY);
}

#[tokio::test]
async fn test_missing_archive_is_rejected_without_retry() {
    let server = MockServer::start().await;
    let sandbox = Sandbox::new();
    Mock::given(method("GET"))
        .and(path(format!("/v1.3.0/{ARCHIVE}")))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let err = sandbox
        .updater(source(&server, "v1.3.0"))
        .install(InstallOptions::default(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(
        matches!(err, UpdateError::DownloadRejected { status: 404, .. }),
        "unexpected error: {err:?}"
    );
    assert!(!sandbox.release_downloads("v1.3.0").join(format!("{ARCHIVE}.tmp")).exists());
}

#[tokio::test]
async fn test_no_alias_option() {
    let server = MockServer::start().await;
    let sandbox = Sandbox::new();
    let archive = release_archive();
    serve_release(&server, "v1.3.0", &archive, None).await;

    let options = InstallOptions {
        create_alias: false,
        ..InstallOptions::default()
    };
    let outcome = sandbox
        .updater(source(&server, "v1.3.0"))
        .install(options, &CancellationToken::new())
        .await
        .unwrap();

    let UpdateOutcome::Installed(report) = outcome else {
        panic!("expected an install, got {outcome:?}");
    };
    assert_eq!(report.alias, None);
    assert!(std::fs::symlink_metadata(sandbox.bin_dir().join("dx")).is_err());
}

#[tokio::test]
async fn test_existing_alias_target_is_untouched() {
    let server = MockServer::start().await;
    let sandbox = Sandbox::new();
    let archive = release_archive();
    serve_release(&server, "v1.3.0", &archive, None).await;
    let alias = sandbox.bin_dir().join(if cfg!(windows) { "dx.bat" } else { "dx" });
    std::fs::write(&alias, b"another tool").unwrap();

    let outcome = sandbox
        .updater(source(&server, "v1.3.0"))
        .install(InstallOptions::default(), &CancellationToken::new())
        .await
        .unwrap();

    let UpdateOutcome::Installed(report) = outcome else {
        panic!("expected an install, got {outcome:?}");
    };
    assert_eq!(report.alias, Some(AliasOutcome::AlreadyPresent(alias.clone())));
    assert_eq!(std::fs::read(&alias).unwrap(), b"another tool");
}

#[tokio::test]
async fn test_deadline_cancels_slow_download() {
    let server = MockServer::start().await;
    let sandbox = Sandbox::new();
    Mock::given(method("GET"))
        .and(path(format!("/v1.3.0/{ARCHIVE}")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(release_archive())
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;

    let mut settings = fast_settings();
    settings.download.per_attempt_timeout = Duration::from_secs(30);
    let options = InstallOptions {
        deadline: Some(Duration::from_millis(200)),
        ..InstallOptions::default()
    };

    let started = std::time::Instant::now();
    let err = sandbox
        .updater_with(source(&server, "v1.3.0"), settings)
        .install(options, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.is_cancelled(), "unexpected error: {err:?}");
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(std::fs::read(sandbox.executable()).unwrap(), OLD_BINARY);
}

#[tokio::test]
async fn test_external_cancellation() {
    let server = MockServer::start().await;
    let sandbox = Sandbox::new();
    Mock::given(method("GET"))
        .and(path(format!("/v1.3.0/{ARCHIVE}")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(release_archive())
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let err = sandbox
        .updater(source(&server, "v1.3.0"))
        .install(InstallOptions::default(), &cancel)
        .await
        .unwrap_err();

    assert!(err.is_cancelled(), "unexpected error: {err:?}");
    assert_eq!(std::fs::read(sandbox.executable()).unwrap(), OLD_BINARY);
}

#[tokio::test]
async fn test_check_then_cached_status() {
    let server = MockServer::start().await;
    let sandbox = Sandbox::new();
    let source = source(&server, "v1.3.0");
    let updater = sandbox.updater(source.clone());
    let cancel = CancellationToken::new();

    assert!(updater.status().is_none());

    let fresh = updater.check(&cancel).await.unwrap().unwrap();
    assert!(fresh.update_available);
    assert!(!fresh.from_cache);
    assert_eq!(fresh.latest_version, "v1.3.0");

    let cached = updater.check(&cancel).await.unwrap().unwrap();
    assert!(cached.from_cache);
    assert_eq!(source.calls(), 1);
    assert_eq!(updater.status().unwrap().latest_version, "v1.3.0");

    updater.clear_cache().unwrap();
    assert!(updater.status().is_none());
    assert!(!updater.cache_path().exists());
}
