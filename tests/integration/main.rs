//! Integration tests for predex

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs::{self, File};
    use std::io::Write;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;
    use zip::{CompressionMethod, ZipWriter};

    fn predex() -> Command {
        cargo_bin_cmd!("predex")
    }

    /// Writes a config that keeps the store inside `dir` and points dx at `dx`
    fn write_config(dir: &Path, dx: &Path) -> PathBuf {
        let config = dir.join("config.toml");
        fs::write(
            &config,
            format!(
                "[cache]\nstore_path = '{}'\n\n[build_tools]\nrevision = \"23.0.1\"\ndx_path = '{}'\n",
                dir.join("store.xml").display(),
                dx.display()
            ),
        )
        .unwrap();
        config
    }

    /// Writes a jar holding one class whose bytes are `content`
    fn write_jar(path: &Path, content: &[u8]) {
        let mut jar = ZipWriter::new(File::create(path).unwrap());
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        jar.start_file("com/example/Lib.class", options).unwrap();
        jar.write_all(content).unwrap();
        jar.finish().unwrap();
    }

    /// The single file in `dir`
    fn only_file(dir: &Path) -> PathBuf {
        let entries: Vec<PathBuf> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(entries.len(), 1, "{entries:?}");
        entries.into_iter().next().unwrap()
    }

    #[test]
    fn help_displays() {
        predex()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("pre-dexed"));
    }

    #[test]
    fn version_displays() {
        predex()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("predex"));
    }

    #[test]
    fn config_path() {
        predex()
            .args(["config", "path"])
            .env_remove("PREDEX_CONFIG")
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let temp = TempDir::new().unwrap();
        predex()
            .args(["config", "show"])
            .env("PREDEX_CONFIG", temp.path().join("missing.toml"))
            .assert()
            .success()
            .stdout(predicate::str::contains("[build_tools]"));
    }

    #[test]
    fn invalid_config_is_reported() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("config.toml");
        fs::write(&config, "[build_tools]\nrevision = \"next\"\n").unwrap();

        predex()
            .args(["cache", "path"])
            .env("PREDEX_CONFIG", &config)
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn cache_list_empty() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path(), Path::new("dx"));

        predex()
            .args(["cache", "list"])
            .env("PREDEX_CONFIG", &config)
            .assert()
            .success()
            .stdout(predicate::str::contains("No cache entries found"));
    }

    #[test]
    fn cache_path_uses_config() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path(), Path::new("dx"));

        predex()
            .args(["cache", "path"])
            .env("PREDEX_CONFIG", &config)
            .assert()
            .success()
            .stdout(predicate::str::contains("store.xml"));
    }

    #[test]
    fn dex_missing_input_fails() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path(), Path::new("dx"));

        predex()
            .args(["dex", "nope.jar", "--out-dir"])
            .arg(temp.path().join("out"))
            .env("PREDEX_CONFIG", &config)
            .current_dir(temp.path())
            .assert()
            .failure()
            .stderr(predicate::str::contains("Input library not found"));
    }

    #[cfg(unix)]
    fn fake_dx(dir: &Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let dx = dir.join("dx");
        fs::write(
            &dx,
            r#"#!/bin/sh
out=""
for a in "$@"; do
    case "$a" in
        --output=*) out="${a#--output=}" ;;
    esac
    input="$a"
done
echo "$input" >> "$FAKE_DX_LOG"
cp "$input" "$out"
"#,
        )
        .unwrap();
        fs::set_permissions(&dx, fs::Permissions::from_mode(0o755)).unwrap();
        dx
    }

    #[cfg(unix)]
    #[test]
    fn second_build_hits_cache() {
        let temp = TempDir::new().unwrap();
        let dx = fake_dx(temp.path());
        let config = write_config(temp.path(), &dx);
        let log = temp.path().join("dx.log");
        let lib = temp.path().join("lib.jar");
        write_jar(&lib, b"classes");
        let out = temp.path().join("out");

        predex()
            .arg("dex")
            .arg(&lib)
            .arg("--out-dir")
            .arg(&out)
            .env("PREDEX_CONFIG", &config)
            .env("FAKE_DX_LOG", &log)
            .assert()
            .success()
            .stdout(predicate::str::contains("0 hit(s), 1 miss(es)"));

        predex()
            .arg("dex")
            .arg(&lib)
            .arg("--out-dir")
            .arg(&out)
            .env("PREDEX_CONFIG", &config)
            .env("FAKE_DX_LOG", &log)
            .assert()
            .success()
            .stdout(predicate::str::contains("1 hit(s), 0 miss(es)"));

        assert_eq!(fs::read_to_string(&log).unwrap().lines().count(), 1);
        assert_eq!(fs::read(only_file(&out)).unwrap(), fs::read(&lib).unwrap());

        predex()
            .args(["cache", "list", "--format", "json"])
            .env("PREDEX_CONFIG", &config)
            .assert()
            .success()
            .stdout(predicate::str::contains("\"status\": \"valid\""));
    }

    #[cfg(unix)]
    #[test]
    fn changed_library_is_dexed_again() {
        let temp = TempDir::new().unwrap();
        let dx = fake_dx(temp.path());
        let config = write_config(temp.path(), &dx);
        let log = temp.path().join("dx.log");
        let lib = temp.path().join("lib.jar");
        let out = temp.path().join("out");

        for content in [b"v1", b"v2"] {
            write_jar(&lib, content);
            predex()
                .arg("dex")
                .arg(&lib)
                .arg("--out-dir")
                .arg(&out)
                .env("PREDEX_CONFIG", &config)
                .env("FAKE_DX_LOG", &log)
                .assert()
                .success()
                .stdout(predicate::str::contains("0 hit(s), 1 miss(es)"));
        }

        assert_eq!(fs::read_to_string(&log).unwrap().lines().count(), 2);
        assert_eq!(fs::read(only_file(&out)).unwrap(), fs::read(&lib).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn resource_only_library_is_not_dexed() {
        let temp = TempDir::new().unwrap();
        let dx = fake_dx(temp.path());
        let config = write_config(temp.path(), &dx);
        let log = temp.path().join("dx.log");
        let lib = temp.path().join("res.jar");
        let mut jar = ZipWriter::new(File::create(&lib).unwrap());
        jar.start_file("res/values/strings.xml", SimpleFileOptions::default())
            .unwrap();
        jar.write_all(b"<resources/>").unwrap();
        jar.finish().unwrap();

        predex()
            .arg("dex")
            .arg(&lib)
            .arg("--out-dir")
            .arg(temp.path().join("out"))
            .env("PREDEX_CONFIG", &config)
            .env("FAKE_DX_LOG", &log)
            .assert()
            .success()
            .stdout(predicate::str::contains("0 hit(s), 0 miss(es)"));

        assert!(!log.exists());
    }

    #[cfg(unix)]
    #[test]
    fn no_cache_skips_store() {
        let temp = TempDir::new().unwrap();
        let dx = fake_dx(temp.path());
        let config = write_config(temp.path(), &dx);
        let lib = temp.path().join("lib.jar");
        write_jar(&lib, b"classes");

        predex()
            .arg("dex")
            .arg(&lib)
            .arg("--out-dir")
            .arg(temp.path().join("out"))
            .arg("--no-cache")
            .env("PREDEX_CONFIG", &config)
            .env("FAKE_DX_LOG", temp.path().join("dx.log"))
            .assert()
            .success();

        assert!(!temp.path().join("store.xml").exists());
    }
}
