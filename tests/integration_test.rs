/// End-to-end pipeline tests against a mock releases API.
///
/// `gzip` stands in for the default compressor so the tests only need a
/// standard userland.
#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::path::Path;
    use std::time::Duration;

    use bindl::{Api, Compressor, Config, Error};
    use flate2::read::MultiGzDecoder;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use serde_json::json;
    use sha2::{Digest, Sha256};
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TOOL_BYTES: &[u8] = b"#!/bin/sh\necho tool 1.2.3\n";

    fn tar_gz(members: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, data) in members {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        let tar = builder.into_inner().unwrap();
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(&tar).unwrap();
        enc.finish().unwrap()
    }

    fn gunzip(path: &Path) -> Vec<u8> {
        let mut out = Vec::new();
        MultiGzDecoder::new(std::fs::File::open(path).unwrap())
            .read_to_end(&mut out)
            .unwrap();
        out
    }

    fn github_config(include: &str) -> Config {
        let text = format!(
            r#"
[source]
github = "owner/tool"
included-release-files = ['{include}']
included-tarball-member-names = ["bin/"]

[target]
gz-pattern = "{{name|basename}}-{{release_name}}.gz"
"#
        );
        Config::from_toml_str(&text, None).unwrap()
    }

    fn api(server: &MockServer, root: &TempDir) -> Api {
        Api::new()
            .set_api_base(&server.uri())
            .set_output_dir(root.path().join("out"))
            .set_temp_dir(root.path().join("temp"))
            .set_compressor(Compressor::gzip())
            .set_retry_count(1)
            .set_retry_delay(Duration::ZERO)
            .no_progress()
    }

    fn release(server: &MockServer, tag: &str, created_at: &str, draft: bool, prerelease: bool) -> serde_json::Value {
        let asset = |name: &str| {
            json!({
                "name": name,
                "browser_download_url": format!("{}/dl/{tag}/{name}", server.uri()),
            })
        };
        json!({
            "draft": draft,
            "prerelease": prerelease,
            "created_at": created_at,
            "tag_name": tag,
            "assets": [
                asset("tool-v1.2.3-linux.tar.gz"),
                asset("tool-v1.2.3-linux.tar.gz.sha256"),
                asset("tool-v1.2.3-windows.zip"),
            ],
        })
    }

    /// Mount a releases listing plus the tarball and its checksum for `v1.2.3`.
    async fn mount_tool_release(server: &MockServer, tarball: &[u8], checksum: &str, expected_tarball_fetches: u64) {
        Mock::given(method("GET"))
            .and(path("/repos/owner/tool/releases"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                release(server, "v1.0.0", "2023-01-01T00:00:00Z", false, false),
                release(server, "v1.2.3", "2024-06-01T00:00:00Z", false, false),
                release(server, "v2.0.0-rc1", "2024-07-01T00:00:00Z", false, true),
                release(server, "v3.0.0", "2024-08-01T00:00:00Z", true, false),
            ])))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/dl/v1.2.3/tool-v1.2.3-linux.tar.gz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(tarball.to_vec()))
            .expect(expected_tarball_fetches)
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/dl/v1.2.3/tool-v1.2.3-linux.tar.gz.sha256"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(format!("{checksum}  tool-v1.2.3-linux.tar.gz\n")),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_github_release_end_to_end() {
        let server = MockServer::start().await;
        let tarball = tar_gz(&[("bin/tool", TOOL_BYTES), ("README.md", b"docs")]);
        let checksum = hex::encode(Sha256::digest(&tarball));
        mount_tool_release(&server, &tarball, &checksum, 1).await;
        let root = TempDir::new().unwrap();

        let targets = api(&server, &root)
            .run(&github_config(r"tool-.*linux\.tar\.gz$"))
            .await
            .unwrap();

        let expected = root.path().join("out/tool-1.2.3.gz");
        assert_eq!(targets, vec![expected.clone()]);
        assert_eq!(gunzip(&expected), TOOL_BYTES);
        assert!(root
            .path()
            .join("temp/owner__tool/download/1.2.3/tool-v1.2.3-linux.tar.gz")
            .is_file());
        // The staged copy is removed once recompressed.
        assert!(!root
            .path()
            .join("temp/owner__tool/extract/1.2.3/tool-v1.2.3-linux.tar.gz/bin/tool")
            .exists());
    }

    #[tokio::test]
    async fn test_second_run_downloads_and_compresses_nothing() {
        let server = MockServer::start().await;
        let tarball = tar_gz(&[("bin/tool", TOOL_BYTES)]);
        let checksum = hex::encode(Sha256::digest(&tarball));
        // One tarball fetch across both runs.
        mount_tool_release(&server, &tarball, &checksum, 1).await;
        let root = TempDir::new().unwrap();
        let config = github_config(r"tool-.*linux\.tar\.gz$");

        let first = api(&server, &root).run(&config).await.unwrap();
        let before = std::fs::read(&first[0]).unwrap();

        // A compressor that cannot be spawned proves recompression is skipped.
        let second = api(&server, &root)
            .set_compressor(Compressor::new("bindl-no-such-compressor", ["-c"]))
            .run(&config)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(std::fs::read(&second[0]).unwrap(), before);
        // Nothing is re-staged for targets that already exist.
        assert!(!root
            .path()
            .join("temp/owner__tool/extract/1.2.3/tool-v1.2.3-linux.tar.gz/bin/tool")
            .exists());
    }

    #[tokio::test]
    async fn test_checksum_mismatch_fails_integrity() {
        let server = MockServer::start().await;
        let tarball = tar_gz(&[("bin/tool", TOOL_BYTES)]);
        let wrong = hex::encode(Sha256::digest(b"something else"));
        mount_tool_release(&server, &tarball, &wrong, 1).await;
        let root = TempDir::new().unwrap();

        let err = api(&server, &root)
            .run(&github_config(r"tool-.*linux\.tar\.gz$"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Integrity { .. }), "got {err:?}");
        assert!(!root.path().join("out").exists());
    }

    #[tokio::test]
    async fn test_only_drafts_and_prereleases() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/owner/tool/releases"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                release(&server, "v2.0.0-rc1", "2024-07-01T00:00:00Z", false, true),
                release(&server, "v3.0.0", "2024-08-01T00:00:00Z", true, false),
            ])))
            .mount(&server)
            .await;
        let root = TempDir::new().unwrap();

        let err = api(&server, &root)
            .run(&github_config("tool-"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NoReleaseFound { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn test_no_matching_assets_is_no_content() {
        let server = MockServer::start().await;
        let tarball = tar_gz(&[("bin/tool", TOOL_BYTES)]);
        let checksum = hex::encode(Sha256::digest(&tarball));
        mount_tool_release(&server, &tarball, &checksum, 0).await;
        let root = TempDir::new().unwrap();

        let err = api(&server, &root)
            .run(&github_config("nothing-matches-this"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NoContent), "got {err:?}");
    }

    #[tokio::test]
    async fn test_releases_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/owner/tool/releases"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
            .mount(&server)
            .await;
        let root = TempDir::new().unwrap();

        let err = api(&server, &root)
            .run(&github_config("tool-"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Fetch { .. }), "got {err:?}");
        assert!(err.to_string().contains("404"));
    }

    fn http_config(server: &MockServer, template: &str) -> Config {
        let text = format!(
            r#"
[source]
http = {{ "a.tar.gz" = "{uri}/files/a.tar.gz", "b.tar" = "{uri}/files/b.tar" }}
included-tarball-member-names = ["bin/"]

[target]
gz-pattern = "{template}"
"#,
            uri = server.uri()
        );
        Config::from_toml_str(&text, Some(Path::new("specs/mytools.toml"))).unwrap()
    }

    async fn mount_http_files(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/files/a.tar.gz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(tar_gz(&[("bin/tool", b"from a")])))
            .mount(server)
            .await;
        // A gzip stream under a plain `.tar` name is still readable.
        Mock::given(method("GET"))
            .and(path("/files/b.tar"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(tar_gz(&[("bin/tool", b"from b")])))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_http_source_end_to_end() {
        let server = MockServer::start().await;
        mount_http_files(&server).await;
        let root = TempDir::new().unwrap();

        let targets = api(&server, &root)
            .run(&http_config(&server, "{release_name}/{asset_name_cleaned|strip_ext}-{name|basename}.gz"))
            .await
            .unwrap();

        let out = root.path().join("out/current");
        assert_eq!(targets, vec![out.join("a-tool.gz"), out.join("b-tool.gz")]);
        assert_eq!(gunzip(&targets[0]), b"from a");
        assert_eq!(gunzip(&targets[1]), b"from b");
        assert!(root
            .path()
            .join("temp/mytools/download/current/a.tar.gz")
            .is_file());
    }

    #[tokio::test]
    async fn test_colliding_targets_write_nothing() {
        let server = MockServer::start().await;
        mount_http_files(&server).await;
        let root = TempDir::new().unwrap();

        let err = api(&server, &root)
            .run(&http_config(&server, "{name|basename}.gz"))
            .await
            .unwrap_err();

        match err {
            Error::DuplicateTarget { paths } => {
                assert_eq!(paths, vec![root.path().join("out/tool.gz")]);
            }
            other => panic!("expected DuplicateTarget, got {other:?}"),
        }
        assert!(!root.path().join("out/tool.gz").exists());
    }

    #[tokio::test]
    async fn test_http_download_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let root = TempDir::new().unwrap();

        let err = api(&server, &root)
            .run(&http_config(&server, "{name|basename}.gz"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Fetch { .. }), "got {err:?}");
    }
}
