//! Integration tests for Bazelisk
//!
//! The binary is pointed at a fake `bazel` shell script through an absolute
//! path, so no test touches the network.

#[cfg(unix)]
mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use serial_test::serial;
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    const FAKE_BAZEL: &str = "#!/bin/sh\necho \"fake bazel: $*\"\nexit \"${FAKE_EXIT:-0}\"\n";

    fn write_script(path: &Path, body: &str) -> PathBuf {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_path_buf()
    }

    /// A scratch workspace with its own Bazelisk home and a fake Bazel
    struct Sandbox {
        temp: TempDir,
        bazel: PathBuf,
    }

    impl Sandbox {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let bazel = write_script(&temp.path().join("bin/bazel-dev"), FAKE_BAZEL);
            std::fs::create_dir_all(temp.path().join("project")).unwrap();
            Self { temp, bazel }
        }

        fn project(&self) -> PathBuf {
            self.temp.path().join("project")
        }

        fn home(&self) -> PathBuf {
            self.temp.path().join("home")
        }

        /// Command running in the project directory with a clean environment
        fn bazelisk(&self) -> Command {
            let mut cmd = cargo_bin_cmd!("bazelisk");
            cmd.current_dir(self.project())
                .env("BAZELISK_HOME", self.home())
                .env("USE_BAZEL_VERSION", &self.bazel)
                .env_remove("BAZELISK_SKIP_WRAPPER")
                .env_remove("BAZELISK_BASE_URL")
                .env_remove("BAZELISK_FORMAT_URL")
                .env_remove("BAZELISK_LOG");
            cmd
        }
    }

    #[test]
    #[serial]
    fn forwards_arguments() {
        let sandbox = Sandbox::new();
        sandbox
            .bazelisk()
            .args(["build", "//:target", "--", "-//skip"])
            .assert()
            .success()
            .stdout(predicate::str::contains("fake bazel: build //:target -- -//skip"));
    }

    #[test]
    #[serial]
    fn forwards_leading_double_dash() {
        let sandbox = Sandbox::new();
        sandbox
            .bazelisk()
            .args(["--", "x"])
            .assert()
            .success()
            .stdout(predicate::str::contains("fake bazel: -- x"));
    }

    fn contains_bytes(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    #[serial]
    fn forwards_non_utf8_arguments() {
        let sandbox = Sandbox::new();
        let output = sandbox
            .bazelisk()
            .arg("build")
            .arg(OsStr::from_bytes(b"//pkg:caf\xe9"))
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();

        assert!(contains_bytes(&output, b"fake bazel: build //pkg:caf\xe9"));
    }

    #[test]
    #[serial]
    fn tolerates_non_utf8_environment() {
        let sandbox = Sandbox::new();
        sandbox
            .bazelisk()
            .env("LATIN1_VAR", OsStr::from_bytes(b"caf\xe9"))
            .arg("info")
            .assert()
            .success()
            .stdout(predicate::str::contains("fake bazel: info"));

        let output = sandbox
            .bazelisk()
            .env("LATIN1_VAR", OsStr::from_bytes(b"caf\xe9"))
            .arg("--print_env")
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();

        assert!(contains_bytes(&output, b"\nLATIN1_VAR=caf\xe9\n"));
    }

    #[test]
    #[serial]
    fn propagates_exit_code() {
        let sandbox = Sandbox::new();
        sandbox
            .bazelisk()
            .env("FAKE_EXIT", "3")
            .arg("test")
            .assert()
            .code(3);
    }

    #[test]
    #[serial]
    fn print_env_does_not_launch() {
        let sandbox = Sandbox::new();
        sandbox
            .bazelisk()
            .arg("--print_env")
            .assert()
            .success()
            .stdout(predicate::str::contains("BAZELISK_SKIP_WRAPPER=true"))
            .stdout(predicate::str::contains("PATH="))
            .stdout(predicate::str::contains("fake bazel").not());
    }

    #[test]
    #[serial]
    fn version_prints_banner_first() {
        let sandbox = Sandbox::new();
        sandbox
            .bazelisk()
            .arg("version")
            .assert()
            .success()
            .stdout(predicate::str::starts_with("Bazelisk version: "))
            .stdout(predicate::str::contains("fake bazel: version"));

        sandbox
            .bazelisk()
            .args(["version", "--gnu_format"])
            .assert()
            .success()
            .stdout(predicate::str::starts_with("Bazelisk "));
    }

    #[test]
    #[serial]
    fn delegates_to_workspace_wrapper() {
        let sandbox = Sandbox::new();
        std::fs::write(sandbox.project().join("MODULE.bazel"), "").unwrap();
        write_script(
            &sandbox.project().join("tools/bazel"),
            "#!/bin/sh\necho \"wrapper: $BAZEL_REAL\"\nexec \"$BAZEL_REAL\" \"$@\"\n",
        );

        sandbox
            .bazelisk()
            .arg("info")
            .assert()
            .success()
            .stdout(predicate::str::contains("wrapper: "))
            .stdout(predicate::str::contains("fake bazel: info"));
    }

    #[test]
    #[serial]
    fn skip_wrapper_runs_bazel_directly() {
        let sandbox = Sandbox::new();
        std::fs::write(sandbox.project().join("MODULE.bazel"), "").unwrap();
        write_script(
            &sandbox.project().join("tools/bazel"),
            "#!/bin/sh\necho wrapper\nexit 9\n",
        );

        sandbox
            .bazelisk()
            .env("BAZELISK_SKIP_WRAPPER", "1")
            .arg("info")
            .assert()
            .success()
            .stdout(predicate::str::contains("wrapper").not());
    }

    #[test]
    #[serial]
    fn version_from_bazelversion_file() {
        let sandbox = Sandbox::new();
        std::fs::write(sandbox.project().join("WORKSPACE"), "").unwrap();
        std::fs::write(
            sandbox.project().join(".bazelversion"),
            format!("{}\n", sandbox.bazel.display()),
        )
        .unwrap();

        sandbox
            .bazelisk()
            .env_remove("USE_BAZEL_VERSION")
            .arg("build")
            .assert()
            .success()
            .stdout(predicate::str::contains("fake bazel: build"));
    }

    #[test]
    #[serial]
    fn version_from_bazeliskrc() {
        let sandbox = Sandbox::new();
        std::fs::write(sandbox.project().join("WORKSPACE.bazel"), "").unwrap();
        std::fs::write(
            sandbox.project().join(".bazeliskrc"),
            format!("# pinned\nUSE_BAZEL_VERSION={}\n", sandbox.bazel.display()),
        )
        .unwrap();

        sandbox
            .bazelisk()
            .env_remove("USE_BAZEL_VERSION")
            .arg("query")
            .assert()
            .success()
            .stdout(predicate::str::contains("fake bazel: query"));
    }

    #[test]
    #[serial]
    fn rejects_more_than_one_slash() {
        let sandbox = Sandbox::new();
        sandbox
            .bazelisk()
            .env("USE_BAZEL_VERSION", "a/b/c")
            .arg("build")
            .assert()
            .code(1)
            .stderr(predicate::str::contains("more than one slash"));
    }

    #[test]
    #[serial]
    fn rejects_malformed_candidate() {
        let sandbox = Sandbox::new();
        sandbox
            .bazelisk()
            .env("USE_BAZEL_VERSION", "5.0.0rcX")
            .arg("build")
            .assert()
            .code(1)
            .stderr(predicate::str::contains("invalid release candidate number"));
    }

    #[test]
    #[serial]
    fn missing_local_binary_fails() {
        let sandbox = Sandbox::new();
        sandbox
            .bazelisk()
            .env("USE_BAZEL_VERSION", sandbox.temp.path().join("nope"))
            .arg("build")
            .assert()
            .code(1)
            .stderr(predicate::str::contains("could not link local Bazel"));
    }
}
