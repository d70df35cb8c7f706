//! End-to-end dump tests: build a configuration, run a dump into a temp
//! directory, and read the archive back with a standard tar reader.

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use flate2::read::GzDecoder;
use mayday_core::{
    build_units, run_dump, Archivable, ArchiveWriter, CollectError, CommandRunner, CommandSpec,
    CommandUnit, Config, Discovered, DumpOptions, FailurePolicy, FileSpec, Journal, OnError,
    Orchestrator, Pod, PodState,
};
use tar::EntryType;

struct Entry {
    name: String,
    kind: EntryType,
    body: Vec<u8>,
    link: Option<String>,
}

fn read_archive(path: &Path) -> Vec<Entry> {
    read_entries(File::open(path).expect("open archive"))
}

fn read_entries<R: Read>(gzipped: R) -> Vec<Entry> {
    let mut archive = tar::Archive::new(GzDecoder::new(gzipped));
    let mut entries = Vec::new();
    for entry in archive.entries().expect("entries") {
        let mut entry = entry.expect("entry");
        let name = entry.path().unwrap().to_string_lossy().to_string();
        let kind = entry.header().entry_type();
        let link = entry
            .link_name()
            .unwrap()
            .map(|l| l.to_string_lossy().to_string());
        let mut body = Vec::new();
        entry.read_to_end(&mut body).unwrap();
        entries.push(Entry {
            name,
            kind,
            body,
            link,
        });
    }
    entries
}

fn options_in(dir: &Path) -> DumpOptions {
    DumpOptions {
        output_dir: dir.to_path_buf(),
        ..DumpOptions::default()
    }
}

fn archives_in(dir: &Path) -> Vec<std::path::PathBuf> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.to_string_lossy().ends_with(".tar.gz"))
        .collect()
}

/// One file and `echo hi`, no journals, no pods, danger off.
#[tokio::test]
async fn test_file_and_command_dump() {
    let out = tempfile::tempdir().unwrap();
    let host = tempfile::tempdir().unwrap();
    let hostname = host.path().join("hostname");
    std::fs::write(&hostname, b"node-1.example.com\n").unwrap();

    let config = Config {
        files: vec![FileSpec::new(hostname.to_string_lossy())],
        commands: vec![CommandSpec::new(["echo", "hi"])],
    };

    let report = run_dump(&config, Discovered::default(), &options_in(out.path()))
        .await
        .expect("dump failed");

    assert_eq!(report.entries, 2);
    assert_eq!(report.command_failures, 0);
    assert!(report.path.starts_with(out.path()));
    let file_name = report.path.file_name().unwrap().to_string_lossy().to_string();
    assert!(file_name.starts_with("mayday"));
    assert!(file_name.ends_with(".tar.gz"));

    let entries = read_archive(&report.path);
    assert_eq!(entries.len(), 2);

    let expected_name = hostname.to_string_lossy().trim_start_matches('/').to_string();
    assert_eq!(entries[0].name, expected_name);
    assert_eq!(entries[0].kind, EntryType::Regular);
    assert_eq!(entries[0].body, b"node-1.example.com\n");

    assert_eq!(entries[1].name, "mayday_commands/echo_hi");
    assert_eq!(entries[1].body, b"hi\n");
}

/// N files + M commands + J journals + P pods => N+M+J+P unique entries.
#[tokio::test]
async fn test_entry_count_matches_sources() {
    let out = tempfile::tempdir().unwrap();
    let host = tempfile::tempdir().unwrap();
    let a = host.path().join("a.conf");
    let b = host.path().join("b.conf");
    std::fs::write(&a, b"a").unwrap();
    std::fs::write(&b, b"bb").unwrap();

    let config = Config {
        files: vec![FileSpec::new(a.to_string_lossy()), FileSpec::new(b.to_string_lossy())],
        commands: vec![
            CommandSpec::new(["echo", "one"]),
            CommandSpec::new(["echo", "two"]),
            CommandSpec::new(["true"]),
        ],
    };
    let discovered = Discovered {
        // Journal content comes from journalctl, which may be absent or
        // fail here; either way the entry must still be present.
        journals: vec![Journal::new("mayday-test.service")],
        pods: vec![
            Pod::new("pod-1", PodState::Running),
            Pod::new("pod-2", PodState::Exited),
        ],
    };
    let options = DumpOptions {
        failure_policy: FailurePolicy {
            file_errors: OnError::Abort,
            command_errors: OnError::Skip,
        },
        ..options_in(out.path())
    };

    let report = run_dump(&config, discovered, &options).await.expect("dump failed");
    let entries = read_archive(&report.path);

    let expected = 2 + 3 + 1 + 2 - report.skipped.len();
    assert_eq!(entries.len(), expected);
    assert_eq!(report.entries, expected);

    let names: HashSet<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names.len(), entries.len(), "entry names must be unique");
    assert!(names.contains("rkt/pod-1.json"));
    assert!(names.contains("rkt/pod-2.json"));
    assert!(!names.contains("rkt/pod-1.log"), "danger mode is off");
}

/// A file spec with a link becomes a symlink entry with an empty body.
#[tokio::test]
async fn test_linked_file_is_symlink_entry() {
    let out = tempfile::tempdir().unwrap();
    let host = tempfile::tempdir().unwrap();
    let localtime = host.path().join("localtime");
    std::fs::write(&localtime, b"TZif2 binary zone data").unwrap();

    let config = Config {
        files: vec![FileSpec {
            name: localtime.to_string_lossy().to_string(),
            link: Some("/usr/share/zoneinfo/UTC".to_string()),
        }],
        commands: vec![],
    };

    let report = run_dump(&config, Discovered::default(), &options_in(out.path()))
        .await
        .expect("dump failed");
    let entries = read_archive(&report.path);

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, EntryType::Symlink);
    assert!(entries[0].body.is_empty());
    assert_eq!(entries[0].link.as_deref(), Some("/usr/share/zoneinfo/UTC"));
}

/// Non-zero exit still produces an entry with the captured output.
#[tokio::test]
async fn test_failing_command_output_is_archived() {
    let out = tempfile::tempdir().unwrap();
    let config = Config {
        files: vec![],
        commands: vec![CommandSpec {
            args: vec!["sh".into(), "-c".into(), "echo before-failure; exit 7".into()],
            link: Some("diag/failing".into()),
        }],
    };

    let report = run_dump(&config, Discovered::default(), &options_in(out.path()))
        .await
        .expect("dump failed");
    assert_eq!(report.command_failures, 1);

    let entries = read_archive(&report.path);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "diag/failing");
    assert_eq!(entries[0].body, b"before-failure\n");
}

/// Danger mode on: running pods get a log entry ahead of everything else.
#[tokio::test]
async fn test_danger_mode_pod_logs_lead_the_archive() {
    let discovered = Discovered {
        journals: vec![],
        pods: vec![
            Pod::new("run-1", PodState::Running),
            Pod::new("gone-1", PodState::Exited),
        ],
    };
    let config = Config {
        files: vec![],
        commands: vec![CommandSpec::new(["echo", "hi"])],
    };
    let options = DumpOptions {
        danger: true,
        ..DumpOptions::default()
    };

    let plan = build_units(&config, discovered, &options).expect("plan failed");
    let planned: Vec<&str> = plan.units.iter().map(|u| u.archive_name()).collect();
    assert_eq!(
        planned,
        vec!["rkt/run-1.log", "mayday_commands/echo_hi", "rkt/run-1.json", "rkt/gone-1.json"]
    );
    match &plan.units[0] {
        Archivable::Command(unit) => assert_eq!(unit.argv(), &["journalctl", "-M", "rkt-run-1"]),
        other => panic!("expected a pod-log command, got {other:?}"),
    }

    // journalctl may be missing here; stand in a command with known output.
    let mut units = plan.units;
    units[0] = Archivable::Command(CommandUnit::new(
        vec!["echo".into(), "pod log line".into()],
        Some("rkt/run-1.log"),
    ));

    let runner = CommandRunner::default();
    let mut writer = ArchiveWriter::new(Vec::new());
    let report = Orchestrator::new(&runner, options.failure_policy)
        .run(&mut writer, units)
        .await
        .expect("collection failed");
    assert_eq!(report.entries, 4);

    let entries = read_entries(writer.close().expect("close").as_slice());
    let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["rkt/run-1.log", "mayday_commands/echo_hi", "rkt/run-1.json", "rkt/gone-1.json"]
    );
    assert_eq!(entries[0].body, b"pod log line\n");
    assert!(!names.contains(&"rkt/gone-1.log"));
}

/// A bad command path is skipped without losing the rest of the dump.
#[tokio::test]
async fn test_escaping_command_link_keeps_other_entries() {
    let out = tempfile::tempdir().unwrap();
    let config = Config {
        files: vec![],
        commands: vec![
            CommandSpec::new(["echo", "ok"]),
            CommandSpec {
                args: vec!["echo".into(), "x".into()],
                link: Some("../escape".into()),
            },
        ],
    };

    let report = run_dump(&config, Discovered::default(), &options_in(out.path()))
        .await
        .expect("dump failed");
    assert_eq!(report.skipped, vec!["../escape"]);

    let entries = read_archive(&report.path);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "mayday_commands/echo_ok");
    assert_eq!(archives_in(out.path()).len(), 1);
}

/// Commands whose default names collide still get distinct entries.
#[tokio::test]
async fn test_colliding_command_names_are_made_unique() {
    let out = tempfile::tempdir().unwrap();
    let config = Config {
        files: vec![],
        commands: vec![CommandSpec::new(["echo", "/a"]), CommandSpec::new(["echo", "_a"])],
    };

    let report = run_dump(&config, Discovered::default(), &options_in(out.path()))
        .await
        .expect("dump failed");
    let entries = read_archive(&report.path);

    let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["mayday_commands/echo__a", "mayday_commands/echo__a.1"]);
    assert_eq!(entries[0].body, b"/a\n");
    assert_eq!(entries[1].body, b"_a\n");
}

/// A missing configured file aborts before any archive is left behind.
#[tokio::test]
async fn test_missing_file_aborts_without_archive() {
    let out = tempfile::tempdir().unwrap();
    let config = Config {
        files: vec![FileSpec::new("/nonexistent/mayday/config")],
        commands: vec![CommandSpec::new(["echo", "never"])],
    };

    let err = run_dump(&config, Discovered::default(), &options_in(out.path()))
        .await
        .unwrap_err();
    assert!(matches!(err, CollectError::FileUnit { .. }));
    assert!(archives_in(out.path()).is_empty());
}

/// A fatal error mid-collection removes the partial archive.
#[tokio::test]
async fn test_abort_during_collection_discards_partial_archive() {
    let out = tempfile::tempdir().unwrap();
    let config = Config {
        files: vec![],
        commands: vec![
            CommandSpec::new(["echo", "first"]),
            CommandSpec::new(["/nonexistent/mayday-cmd"]),
        ],
    };
    let options = DumpOptions {
        failure_policy: FailurePolicy {
            file_errors: OnError::Abort,
            command_errors: OnError::Abort,
        },
        ..options_in(out.path())
    };

    let err = run_dump(&config, Discovered::default(), &options).await.unwrap_err();
    assert!(matches!(err, CollectError::Runner { .. }));
    assert!(archives_in(out.path()).is_empty());
}

/// An unwritable output directory is a startup error.
#[tokio::test]
async fn test_missing_output_dir_is_fatal() {
    let out = tempfile::tempdir().unwrap();
    let options = options_in(&out.path().join("does-not-exist"));

    let err = run_dump(&Config::default(), Discovered::default(), &options)
        .await
        .unwrap_err();
    assert!(matches!(err, CollectError::Output { .. }));
}
