//! Archivable units: every data source normalised to a named entry.
//!
//! The variant set is closed. Construction has no side effects beyond
//! opening configured files; commands, journals and pod logs only run when
//! the orchestrator calls [`Archivable::open`].

use std::fs::{File, Metadata};
use std::io::{self, Cursor, Read};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::archive::EntryMeta;
use crate::config::{CommandSpec, FileSpec};
use crate::error::{CollectError, Result};
use crate::runner::{CommandRunner, ExitOutcome};
use crate::source::{Journal, Pod};

/// Directory holding output of configured commands without a `Link`.
pub const COMMAND_DIR: &str = "mayday_commands";

/// Seconds since the epoch for `time`, clamped at zero.
pub fn unix_seconds(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Category of a unit, used for failure policy and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    File,
    Command,
    Journal,
    Pod,
}

impl UnitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitKind::File => "file",
            UnitKind::Command => "command",
            UnitKind::Journal => "journal",
            UnitKind::Pod => "pod",
        }
    }
}

/// A configured host file, opened and stat'd at construction.
#[derive(Debug)]
pub struct FileUnit {
    name: String,
    link: Option<String>,
    file: File,
    metadata: Metadata,
}

impl FileUnit {
    /// Open and stat the file named by `spec`.
    pub fn open(spec: &FileSpec) -> Result<Self> {
        let fail = |source: io::Error| CollectError::FileUnit {
            path: spec.name.clone(),
            source,
        };

        let file = File::open(&spec.name).map_err(fail)?;
        let metadata = file.metadata().map_err(fail)?;
        if metadata.is_dir() {
            return Err(fail(io::Error::new(
                io::ErrorKind::InvalidInput,
                "is a directory",
            )));
        }

        Ok(Self {
            name: spec.name.clone(),
            link: spec.link().map(str::to_string),
            file,
            metadata,
        })
    }

    fn mode(&self) -> u32 {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            self.metadata.permissions().mode() & 0o7777
        }
        #[cfg(not(unix))]
        {
            crate::archive::GENERATED_MODE
        }
    }

    fn into_content(mut self) -> Result<Content> {
        let mtime = self
            .metadata
            .modified()
            .map(unix_seconds)
            .unwrap_or_else(|_| unix_seconds(SystemTime::now()));
        let mode = self.mode();

        // Pseudo-files (procfs, sysfs) report size 0 but have content.
        if self.metadata.len() == 0 {
            let mut buf = Vec::new();
            self.file
                .read_to_end(&mut buf)
                .map_err(|source| CollectError::FileUnit {
                    path: self.name.clone(),
                    source,
                })?;
            return Ok(Content {
                meta: EntryMeta {
                    size: buf.len() as u64,
                    mode,
                    mtime,
                },
                reader: ContentReader::Bytes(Cursor::new(buf)),
                status: None,
            });
        }

        Ok(Content {
            meta: EntryMeta {
                size: self.metadata.len(),
                mode,
                mtime,
            },
            reader: ContentReader::File(self.file),
            status: None,
        })
    }
}

/// A command whose combined output becomes an entry. Runs lazily.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandUnit {
    argv: Vec<String>,
    name: String,
}

impl CommandUnit {
    /// A command stored at `path`, or under [`COMMAND_DIR`] when unset.
    pub fn new(argv: Vec<String>, path: Option<&str>) -> Self {
        let name = match path {
            Some(path) if !path.is_empty() => path.to_string(),
            _ => default_command_name(&argv),
        };
        Self { argv, name }
    }

    pub fn from_spec(spec: &CommandSpec) -> Self {
        Self::new(spec.args.clone(), spec.link())
    }

    /// Log retrieval for a pod, scoped to its machine namespace.
    pub fn pod_log(pod: &Pod) -> Self {
        Self::new(pod.log_argv(), Some(&pod.log_archive_name()))
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }
}

fn default_command_name(argv: &[String]) -> String {
    let joined = argv
        .iter()
        .map(|arg| arg.replace('/', "_"))
        .collect::<Vec<_>>()
        .join("_");
    format!("{COMMAND_DIR}/{joined}")
}

/// A discovered journal, read through `journalctl` when streamed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalUnit {
    journal: Journal,
    name: String,
}

impl JournalUnit {
    pub fn new(journal: Journal) -> Self {
        let name = journal.archive_name();
        Self { journal, name }
    }
}

/// A discovered pod record, stored as JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodUnit {
    pod: Pod,
    name: String,
}

impl PodUnit {
    pub fn new(pod: Pod) -> Self {
        let name = pod.archive_name();
        Self { pod, name }
    }
}

/// Source of an entry body.
#[derive(Debug)]
pub enum ContentReader {
    File(File),
    Bytes(Cursor<Vec<u8>>),
}

impl Read for ContentReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            ContentReader::File(file) => file.read(buf),
            ContentReader::Bytes(bytes) => bytes.read(buf),
        }
    }
}

/// An opened unit, ready to be appended.
#[derive(Debug)]
pub struct Content {
    pub meta: EntryMeta,
    pub reader: ContentReader,

    /// Exit outcome for command-backed units.
    pub status: Option<ExitOutcome>,
}

impl Content {
    fn generated(output: Vec<u8>, status: Option<ExitOutcome>) -> Self {
        Self {
            meta: EntryMeta::generated(output.len() as u64, unix_seconds(SystemTime::now())),
            reader: ContentReader::Bytes(Cursor::new(output)),
            status,
        }
    }
}

/// Anything that can become an archive entry.
#[derive(Debug)]
pub enum Archivable {
    File(FileUnit),
    Command(CommandUnit),
    Journal(JournalUnit),
    Pod(PodUnit),
}

impl Archivable {
    /// Entry name inside the archive.
    pub fn archive_name(&self) -> &str {
        match self {
            Archivable::File(unit) => &unit.name,
            Archivable::Command(unit) => &unit.name,
            Archivable::Journal(unit) => &unit.name,
            Archivable::Pod(unit) => &unit.name,
        }
    }

    pub(crate) fn set_archive_name(&mut self, name: String) {
        match self {
            Archivable::File(unit) => unit.name = name,
            Archivable::Command(unit) => unit.name = name,
            Archivable::Journal(unit) => unit.name = name,
            Archivable::Pod(unit) => unit.name = name,
        }
    }

    /// Symlink target; when set the unit is written as a link and its
    /// content is never read.
    pub fn link_target(&self) -> Option<&str> {
        match self {
            Archivable::File(unit) => unit.link.as_deref(),
            _ => None,
        }
    }

    pub fn kind(&self) -> UnitKind {
        match self {
            Archivable::File(_) => UnitKind::File,
            Archivable::Command(_) => UnitKind::Command,
            Archivable::Journal(_) => UnitKind::Journal,
            Archivable::Pod(_) => UnitKind::Pod,
        }
    }

    /// Produce the entry body. Command-backed units run here, exactly once.
    pub async fn open(self, runner: &CommandRunner) -> Result<Content> {
        match self {
            Archivable::File(unit) => unit.into_content(),
            Archivable::Command(unit) => {
                let output = runner
                    .run(&unit.argv)
                    .await
                    .map_err(|source| CollectError::Runner {
                        name: unit.name.clone(),
                        source,
                    })?;
                Ok(Content::generated(output.output, Some(output.status)))
            }
            Archivable::Journal(unit) => {
                let output = runner
                    .run(&unit.journal.argv())
                    .await
                    .map_err(|source| CollectError::Runner {
                        name: unit.name.clone(),
                        source,
                    })?;
                Ok(Content::generated(output.output, Some(output.status)))
            }
            Archivable::Pod(unit) => {
                let mut body = serde_json::to_vec_pretty(&unit.pod)?;
                body.push(b'\n');
                Ok(Content::generated(body, None))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::GENERATED_MODE;
    use crate::source::PodState;

    fn read_all(mut content: Content) -> Vec<u8> {
        let mut buf = Vec::new();
        content.reader.read_to_end(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_command_default_name() {
        let unit = CommandUnit::new(vec!["ls".into(), "-l".into(), "/var/log".into()], None);
        assert_eq!(unit.name, "mayday_commands/ls_-l__var_log");
    }

    #[test]
    fn test_command_explicit_path() {
        let spec = CommandSpec {
            args: vec!["uname".into(), "-a".into()],
            link: Some("uname".into()),
        };
        let unit = Archivable::Command(CommandUnit::from_spec(&spec));
        assert_eq!(unit.archive_name(), "uname");
        assert_eq!(unit.link_target(), None);
        assert_eq!(unit.kind(), UnitKind::Command);
    }

    #[test]
    fn test_pod_log_unit() {
        let unit = CommandUnit::pod_log(&Pod::new("abc", PodState::Running));
        assert_eq!(unit.argv(), &["journalctl", "-M", "rkt-abc"]);
        assert_eq!(unit.name, "/rkt/abc.log");
    }

    #[test]
    fn test_file_unit_missing_file_fails() {
        let err = FileUnit::open(&FileSpec::new("/nonexistent/mayday/file")).unwrap_err();
        assert!(matches!(err, CollectError::FileUnit { .. }));
    }

    #[test]
    fn test_file_unit_rejects_directory() {
        let dir = tempfile::tempdir().unwrap();
        let spec = FileSpec::new(dir.path().to_string_lossy());
        let err = FileUnit::open(&spec).unwrap_err();
        assert!(err.to_string().contains("is a directory"));
    }

    #[tokio::test]
    async fn test_file_unit_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hostname");
        std::fs::write(&path, b"node-1\n").unwrap();

        let unit = Archivable::File(FileUnit::open(&FileSpec::new(path.to_string_lossy())).unwrap());
        assert_eq!(unit.archive_name(), path.to_string_lossy());

        let content = unit.open(&CommandRunner::default()).await.unwrap();
        assert_eq!(content.meta.size, 7);
        assert!(content.status.is_none());
        assert_eq!(read_all(content), b"node-1\n");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_pseudo_file_is_buffered_to_its_real_length() {
        let unit = FileUnit::open(&FileSpec::new("/proc/self/status")).unwrap();
        assert_eq!(unit.metadata.len(), 0);

        let content = unit.into_content().unwrap();
        assert!(matches!(content.reader, ContentReader::Bytes(_)));
        let meta = content.meta;

        let mut writer = crate::archive::ArchiveWriter::new(Vec::new());
        writer
            .append_file("proc/self/status", &meta, content.reader)
            .unwrap();
        let bytes = writer.close().unwrap();

        let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(Cursor::new(bytes)));
        let mut entries = archive.entries().unwrap();
        let mut entry = entries.next().unwrap().unwrap();
        let header_size = entry.header().size().unwrap();
        let mut body = Vec::new();
        entry.read_to_end(&mut body).unwrap();

        assert!(!body.is_empty());
        assert_eq!(header_size, meta.size);
        assert_eq!(header_size, body.len() as u64);
        assert!(String::from_utf8_lossy(&body).contains("Name:"));
    }

    #[tokio::test]
    async fn test_file_unit_link_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("localtime");
        std::fs::write(&path, b"TZif").unwrap();

        let spec = FileSpec {
            name: path.to_string_lossy().to_string(),
            link: Some("/usr/share/zoneinfo/UTC".into()),
        };
        let unit = Archivable::File(FileUnit::open(&spec).unwrap());
        assert_eq!(unit.link_target(), Some("/usr/share/zoneinfo/UTC"));
    }

    #[tokio::test]
    async fn test_command_unit_runs_on_open() {
        let unit = Archivable::Command(CommandUnit::new(vec!["echo".into(), "hi".into()], None));
        let content = unit.open(&CommandRunner::default()).await.unwrap();
        assert_eq!(content.status, Some(ExitOutcome::Exited(0)));
        assert_eq!(content.meta.size, 3);
        assert_eq!(content.meta.mode, GENERATED_MODE);
        assert_eq!(read_all(content), b"hi\n");
    }

    #[tokio::test]
    async fn test_command_unit_spawn_failure() {
        let unit = Archivable::Command(CommandUnit::new(
            vec!["/nonexistent/mayday-cmd".into()],
            Some("broken"),
        ));
        let err = unit.open(&CommandRunner::default()).await.unwrap_err();
        assert!(matches!(err, CollectError::Runner { ref name, .. } if name == "broken"));
    }

    #[tokio::test]
    async fn test_pod_unit_serializes_record() {
        let mut pod = Pod::new("5bc080ca", PodState::Exited);
        pod.apps = vec!["etcd".into()];
        let unit = Archivable::Pod(PodUnit::new(pod));
        assert_eq!(unit.archive_name(), "rkt/5bc080ca.json");

        let content = unit.open(&CommandRunner::default()).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&read_all(content)).unwrap();
        assert_eq!(value["id"], "5bc080ca");
        assert_eq!(value["state"], "exited");
        assert_eq!(value["apps"][0], "etcd");
    }
}
