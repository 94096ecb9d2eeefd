//! Atomic file replacement
//!
//! Uses the write-temp / commit / atomic-rename pattern: content is
//! staged in a temp file next to the destination, made durable, then
//! renamed over the destination in one step. Concurrent readers observe
//! either the old or the new file in full, never a torn mix.
//!
//! The session is a state machine: `Open -> {Committed, Aborted}`, both
//! terminal. Any error during write, flush, or commit triggers an
//! implicit abort, and dropping an open session aborts it, so the
//! destination is untouched on every failure path.

use crate::buffered::{BufferPolicy, BufferedStream};
use crate::channel::{Channel, FileChannel};
use crate::durability::{CommitConfig, CommitToken, DurabilityController};
use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Atomic write parameters.
#[derive(Debug, Clone)]
pub struct AtomicWriteConfig {
    /// Reserved suffix appended to the destination file name to form the
    /// temp name (default: ".tmp"). The temp file lives in the same
    /// directory as the destination; rename is only atomic within one
    /// filesystem.
    pub temp_suffix: String,

    /// Whether to commit the containing directory's metadata after the
    /// rename, so the rename itself survives a crash (default: true).
    /// Whether this is required is filesystem-dependent, hence an
    /// explicit option rather than an assumption.
    pub sync_parent_dir: bool,

    /// Buffering policy for the session's stream (default: Block(8192)).
    pub policy: BufferPolicy,

    /// Commit retry policy for the durability step.
    pub commit: CommitConfig,
}

impl Default for AtomicWriteConfig {
    fn default() -> Self {
        AtomicWriteConfig {
            temp_suffix: ".tmp".to_string(),
            sync_parent_dir: true,
            policy: BufferPolicy::default(),
            commit: CommitConfig::default(),
        }
    }
}

impl AtomicWriteConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the temp-file suffix (builder pattern).
    pub fn with_temp_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.temp_suffix = suffix.into();
        self
    }

    /// Set whether the parent directory is synced after rename.
    pub fn with_sync_parent_dir(mut self, sync: bool) -> Self {
        self.sync_parent_dir = sync;
        self
    }

    /// Set the session's buffering policy (builder pattern).
    pub fn with_policy(mut self, policy: BufferPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the commit retry policy (builder pattern).
    pub fn with_commit(mut self, commit: CommitConfig) -> Self {
        self.commit = commit;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.temp_suffix.is_empty() {
            return Err(Error::protocol(
                "config",
                "temp suffix must be non-empty, or temp and destination collide",
            ));
        }
        self.policy
            .validate()
            .map_err(|e| Error::protocol("config", e.to_string()))?;
        Ok(())
    }

    /// Configuration with a tiny buffer so tests hit flush boundaries.
    pub fn for_testing() -> Self {
        AtomicWriteConfig {
            policy: BufferPolicy::Block(16),
            ..Default::default()
        }
    }
}

/// Factory for atomic write sessions over destination paths.
pub struct AtomicWriter {
    config: AtomicWriteConfig,
}

impl AtomicWriter {
    /// Create a writer with the given configuration.
    pub fn new(config: AtomicWriteConfig) -> Result<Self> {
        config.validate()?;
        Ok(AtomicWriter { config })
    }

    /// Create a writer with default configuration.
    pub fn with_defaults() -> Self {
        AtomicWriter {
            config: AtomicWriteConfig::default(),
        }
    }

    /// Open a write session targeting `destination`.
    ///
    /// Creates the temp file (destination name + reserved suffix) in the
    /// destination's directory and opens a buffered stream over it. The
    /// destination itself is not touched until `finish` renames.
    pub fn begin(&self, destination: impl AsRef<Path>) -> Result<TempWriteSession> {
        let dest = destination.as_ref().to_path_buf();
        let file_name = dest
            .file_name()
            .ok_or_else(|| Error::protocol("begin", "destination path has no file name"))?;

        let mut temp_name = file_name.to_os_string();
        temp_name.push(&self.config.temp_suffix);
        let temp = dest.parent().unwrap_or_else(|| Path::new("")).join(temp_name);

        let channel = FileChannel::create_new(&temp)?;
        let stream = BufferedStream::new(channel, self.config.policy)?;
        debug!(
            target: "penstock::atomic",
            dest = %dest.display(),
            temp = %temp.display(),
            "opened atomic write session"
        );

        Ok(TempWriteSession {
            dest,
            temp,
            stream: Some(stream),
            controller: DurabilityController::new(self.config.commit.clone()),
            sync_parent_dir: self.config.sync_parent_dir,
            state: SessionState::Open,
        })
    }
}

/// Lifecycle of a temp write session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepting writes
    Open,
    /// Renamed onto the destination; content durable
    Committed,
    /// Temp removed; destination untouched
    Aborted,
}

/// One atomic replacement of a destination file
///
/// Writes accumulate in a temp file sibling to the destination.
/// `finish` flushes, commits durability, and renames; `abort` (explicit,
/// implicit on error, or via drop) removes the temp and guarantees the
/// destination is byte-for-byte unchanged.
pub struct TempWriteSession {
    dest: PathBuf,
    temp: PathBuf,
    /// `None` once finish has taken the stream for the rename step
    stream: Option<BufferedStream<FileChannel>>,
    controller: DurabilityController,
    sync_parent_dir: bool,
    state: SessionState,
}

impl TempWriteSession {
    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Destination path this session will replace.
    pub fn dest(&self) -> &Path {
        &self.dest
    }

    /// Temp path content is staged in.
    pub fn temp_path(&self) -> &Path {
        &self.temp
    }

    /// Append data to the session's stream.
    ///
    /// Any error aborts the session before it is returned; the
    /// destination stays untouched.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        if self.state != SessionState::Open {
            return Err(Error::protocol("write", "session is not open"));
        }
        let result = self
            .stream
            .as_mut()
            .expect("open session owns a stream")
            .write(data);
        match result {
            Ok(n) => Ok(n),
            Err(e) => {
                self.abort_internal();
                Err(e)
            }
        }
    }

    /// Flush, commit, and atomically rename the temp onto the
    /// destination.
    ///
    /// The rename only runs after the durability commit for the temp
    /// file has returned success. A failure before the rename aborts
    /// and re-raises, leaving the destination untouched. The rename is
    /// the point of no return: once it succeeds the session is
    /// Committed and the destination holds the new content in full; a
    /// subsequent parent-directory sync failure is logged, not raised,
    /// so an error from this method always means the destination was
    /// not replaced.
    pub fn finish(mut self) -> Result<CommitToken> {
        if self.state != SessionState::Open {
            return Err(Error::protocol("finish", "session is not open"));
        }
        let token = match self.stage_and_rename() {
            Ok(token) => token,
            Err(e) => {
                self.abort_internal();
                return Err(e);
            }
        };
        self.state = SessionState::Committed;

        if self.sync_parent_dir {
            if let Some(parent) = self.dest.parent().filter(|p| !p.as_os_str().is_empty()) {
                if let Err(e) = sync_dir(parent) {
                    warn!(
                        target: "penstock::atomic",
                        dest = %self.dest.display(),
                        error = %e,
                        "directory sync failed after rename"
                    );
                }
            }
        }
        debug!(
            target: "penstock::atomic",
            dest = %self.dest.display(),
            seq = token.sequence(),
            "atomic replacement committed"
        );
        Ok(token)
    }

    fn stage_and_rename(&mut self) -> Result<CommitToken> {
        let stream = self
            .stream
            .take()
            .ok_or_else(|| Error::protocol("finish", "session stream already taken"))?;

        // Flush (buffer -> kernel cache), then commit (cache -> stable
        // storage). into_inner flushes before handing the channel back.
        let mut channel = stream.into_inner()?;
        let token = self.controller.commit(&mut channel)?;
        channel.close()?;

        // Rename is the atomicity point: before it, readers see the old
        // content; after, the new.
        fs::rename(&self.temp, &self.dest).map_err(|e| Error::from_io("rename", e))?;
        Ok(token)
    }

    /// Remove the temp file and transition to Aborted.
    ///
    /// Best-effort: a failure to remove the temp is logged, not fatal.
    /// The destination is guaranteed untouched.
    pub fn abort(mut self) {
        self.abort_internal();
    }

    fn abort_internal(&mut self) {
        if self.state != SessionState::Open {
            return;
        }
        if let Some(mut stream) = self.stream.take() {
            // The temp file is about to be removed; do not flush the tail.
            stream.discard();
        }
        match fs::remove_file(&self.temp) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(
                    target: "penstock::atomic",
                    temp = %self.temp.display(),
                    error = %e,
                    "failed to remove temp file during abort"
                );
            }
        }
        self.state = SessionState::Aborted;
    }
}

impl Drop for TempWriteSession {
    fn drop(&mut self) {
        // Scoped acquisition: leaving scope with the session still open
        // counts as abandonment and cleans up the temp.
        self.abort_internal();
    }
}

/// Commit a directory's metadata so a completed rename survives a crash.
fn sync_dir(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        let dir = fs::File::open(path).map_err(|e| Error::from_io("sync_dir", e))?;
        dir.sync_all().map_err(|e| Error::from_io("sync_dir", e))?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn read(path: &Path) -> Vec<u8> {
        fs::read(path).unwrap()
    }

    #[test]
    fn test_finish_replaces_destination() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("settings.conf");
        fs::write(&dest, b"v1").unwrap();

        let writer = AtomicWriter::with_defaults();
        let mut session = writer.begin(&dest).unwrap();
        session.write(b"v2").unwrap();
        session.finish().unwrap();

        assert_eq!(read(&dest), b"v2");
        // No temp litter.
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_abort_leaves_destination_untouched() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("data.bin");
        fs::write(&dest, b"original").unwrap();

        let writer = AtomicWriter::with_defaults();
        let mut session = writer.begin(&dest).unwrap();
        session.write(b"half-written garbage").unwrap();
        session.abort();

        assert_eq!(read(&dest), b"original");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_drop_open_session_aborts() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("dropped.bin");
        fs::write(&dest, b"keep").unwrap();

        let writer = AtomicWriter::with_defaults();
        {
            let mut session = writer.begin(&dest).unwrap();
            session.write(b"lost on drop").unwrap();
        }
        assert_eq!(read(&dest), b"keep");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_create_destination_that_did_not_exist() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("fresh.txt");

        let writer = AtomicWriter::with_defaults();
        let mut session = writer.begin(&dest).unwrap();
        session.write(b"first version").unwrap();
        session.finish().unwrap();
        assert_eq!(read(&dest), b"first version");
    }

    #[test]
    fn test_temp_name_is_destination_plus_suffix() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("report.json");
        let writer = AtomicWriter::new(
            AtomicWriteConfig::new().with_temp_suffix(".staging"),
        )
        .unwrap();
        let session = writer.begin(&dest).unwrap();
        assert_eq!(
            session.temp_path(),
            dir.path().join("report.json.staging").as_path()
        );
    }

    #[test]
    fn test_concurrent_sessions_do_not_collide() {
        // Same destination twice without finishing: the reserved suffix
        // is exclusive, so the second begin must fail loudly instead of
        // mixing two writers' bytes.
        let dir = tempdir().unwrap();
        let dest = dir.path().join("shared.bin");
        let writer = AtomicWriter::with_defaults();
        let _first = writer.begin(&dest).unwrap();
        assert!(writer.begin(&dest).is_err());
    }

    #[test]
    fn test_write_after_abort_is_protocol_error() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("x.bin");
        let writer = AtomicWriter::with_defaults();
        let mut session = writer.begin(&dest).unwrap();
        session.abort_internal();
        assert!(matches!(
            session.write(b"no").unwrap_err(),
            Error::Protocol { .. }
        ));
        assert_eq!(session.state(), SessionState::Aborted);
    }

    #[cfg(unix)]
    #[test]
    fn test_directory_sync_failure_after_rename_still_commits() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let parent = dir.path().join("locked");
        fs::create_dir(&parent).unwrap();
        let dest = parent.join("out.bin");
        fs::write(&dest, b"old").unwrap();

        let writer = AtomicWriter::with_defaults();
        let mut session = writer.begin(&dest).unwrap();
        session.write(b"new").unwrap();

        // Write+search but no read: the rename works, while opening the
        // directory for its sync does not.
        fs::set_permissions(&parent, fs::Permissions::from_mode(0o333)).unwrap();
        let open_blocked = fs::File::open(&parent).is_err();
        let result = session.finish();
        fs::set_permissions(&parent, fs::Permissions::from_mode(0o755)).unwrap();

        if !open_blocked {
            // Privileged user, permission bits are not enforced.
            return;
        }
        // Past the rename the replacement stands; the sync failure is
        // logged rather than reported as an abort.
        result.unwrap();
        assert_eq!(read(&dest), b"new");
    }

    #[test]
    fn test_empty_suffix_rejected() {
        assert!(AtomicWriter::new(AtomicWriteConfig::new().with_temp_suffix("")).is_err());
    }

    #[test]
    fn test_large_payload_through_small_buffer() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("big.bin");
        let writer = AtomicWriter::new(AtomicWriteConfig::for_testing()).unwrap();

        let payload: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
        let mut session = writer.begin(&dest).unwrap();
        for chunk in payload.chunks(1000) {
            session.write(chunk).unwrap();
        }
        session.finish().unwrap();
        assert_eq!(read(&dest), payload);
    }
}
