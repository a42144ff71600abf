//! Backend that answers queries by running the distribution's package tools.
//!
//! Supported tools:
//!
//! - [`PackageTool::Dpkg`]: `dpkg-query -S` for ownership, `dpkg-query -L`
//!   for manifests.
//! - [`PackageTool::Rpm`]: `rpm -qf` for ownership, `rpm -ql` for manifests.
//!
//! Both tools only consult the database of installed packages, so the
//! [`Filter::Installed`] filter is always satisfied.
//!
//! Each query runs on its own thread and reports through the [`EventSink`],
//! which keeps a hung tool from blocking anything but its own query. Once the
//! querying side gives up, the tool's process is killed and reaped.

use std::collections::HashSet;
use std::ffi::OsStr;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{
    BackendError, EventSink, ExitStatus, Filter, InfoKind, PackageBackend, PackageId, PackageInfo,
    Role,
};

/// Package tool the backend drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageTool {
    /// Debian family (`dpkg-query`)
    Dpkg,
    /// RPM family (`rpm`)
    Rpm,
}

impl PackageTool {
    /// Executable the tool is invoked through.
    #[must_use]
    pub fn program(self) -> &'static str {
        match self {
            Self::Dpkg => "dpkg-query",
            Self::Rpm => "rpm",
        }
    }

    fn search_command(self, program: &OsStr, paths: &[PathBuf]) -> Command {
        let mut cmd = Command::new(program);
        match self {
            Self::Dpkg => {
                cmd.arg("-S");
            }
            Self::Rpm => {
                cmd.args(["-qf", "--queryformat", "%{NAME};%{VERSION}-%{RELEASE};%{ARCH}\\n"]);
            }
        }
        cmd.arg("--").args(paths);
        cmd
    }

    fn list_command(self, program: &OsStr, package: &PackageId) -> Command {
        let mut cmd = Command::new(program);
        match self {
            Self::Dpkg => cmd.arg("-L"),
            Self::Rpm => cmd.arg("-ql"),
        };
        cmd.arg("--").arg(&package.name);
        cmd
    }
}

/// How often a running tool is checked for exit or cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// [`PackageBackend`] over `dpkg-query` or `rpm`.
#[derive(Debug, Clone)]
pub struct NativeBackend {
    tool: Option<PackageTool>,
    program: Option<PathBuf>,
}

impl NativeBackend {
    /// Create a backend for a specific tool.
    #[must_use]
    pub fn new(tool: PackageTool) -> Self {
        Self {
            tool: Some(tool),
            program: None,
        }
    }

    /// Run the tool from `program` instead of looking it up on `PATH`.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = Some(program.into());
        self
    }

    /// Pick whichever supported tool is on `PATH`.
    ///
    /// When none is found the backend reports no capabilities, so refreshes
    /// and ingests are skipped.
    #[must_use]
    pub fn detect() -> Self {
        let found = [PackageTool::Dpkg, PackageTool::Rpm]
            .into_iter()
            .find_map(|tool| find_in_path(tool.program()).map(|program| (tool, program)));
        match found {
            Some((tool, program)) => {
                log::debug!("Using {} for package queries", program.display());
                Self::new(tool).with_program(program)
            }
            None => {
                log::debug!("No supported package tool found on PATH");
                Self {
                    tool: None,
                    program: None,
                }
            }
        }
    }

    /// The tool in use, if any.
    #[must_use]
    pub fn tool(&self) -> Option<PackageTool> {
        self.tool
    }

    fn require(&self, role: Role) -> Result<PackageTool, BackendError> {
        self.tool.ok_or(BackendError::Unsupported(role))
    }

    fn program(&self, tool: PackageTool) -> &OsStr {
        self.program
            .as_deref()
            .map_or_else(|| OsStr::new(tool.program()), Path::as_os_str)
    }
}

impl PackageBackend for NativeBackend {
    fn name(&self) -> &str {
        self.tool.map_or("none", PackageTool::program)
    }

    fn supports(&self, role: Role) -> bool {
        self.tool.is_some() && matches!(role, Role::SearchFile | Role::GetFiles)
    }

    fn search_files(
        &mut self,
        filter: Filter,
        paths: &[PathBuf],
        sink: EventSink,
    ) -> Result<(), BackendError> {
        let tool = self.require(Role::SearchFile)?;
        log::trace!("{}: search-file {:?} (filter {:?})", tool.program(), paths, filter);
        let mut cmd = tool.search_command(self.program(tool), paths);
        let paths = paths.to_vec();

        spawn_query(Role::SearchFile, move || {
            let status = match run_tool(&mut cmd, &sink) {
                Ok(Some(output)) => {
                    for info in parse_owners(tool, &output, &paths) {
                        sink.package(info);
                    }
                    search_status(&output)
                }
                Ok(None) => ExitStatus::Cancelled,
                Err(e) => ExitStatus::Failed(format!("{}: {e}", tool.program())),
            };
            sink.finished(status);
        })
    }

    fn get_files(
        &mut self,
        package_ids: &[PackageId],
        sink: EventSink,
    ) -> Result<(), BackendError> {
        let tool = self.require(Role::GetFiles)?;
        let program = self.program(tool).to_os_string();
        let package_ids = package_ids.to_vec();

        spawn_query(Role::GetFiles, move || {
            let mut status = ExitStatus::Success;
            for package_id in package_ids {
                let mut cmd = tool.list_command(&program, &package_id);
                match run_tool(&mut cmd, &sink) {
                    Ok(None) => {
                        status = ExitStatus::Cancelled;
                        break;
                    }
                    Ok(Some(output)) if output.status.success() => {
                        sink.files(package_id, parse_file_list(&output.stdout));
                    }
                    Ok(Some(output)) => {
                        log::warn!(
                            "{} could not list files of {}: {}",
                            tool.program(),
                            package_id,
                            String::from_utf8_lossy(&output.stderr).trim()
                        );
                        status = ExitStatus::Failed("package-not-found".to_string());
                    }
                    Err(e) => {
                        status = ExitStatus::Failed(format!("{}: {e}", tool.program()));
                        break;
                    }
                }
            }
            sink.finished(status);
        })
    }
}

fn spawn_query<F>(role: Role, work: F) -> Result<(), BackendError>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(format!("query-{role}"))
        .spawn(work)
        .map(|_| ())
        .map_err(|e| BackendError::Submit {
            role,
            reason: e.to_string(),
        })
}

/// Run `cmd` to completion, killing it if the query is cancelled first.
///
/// Returns `Ok(None)` when the process was killed. Its output is discarded.
fn run_tool(cmd: &mut Command, sink: &EventSink) -> io::Result<Option<Output>> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    // Both pipes are drained concurrently so a chatty tool cannot stall on a
    // full pipe while we wait for it.
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(Output {
                status,
                stdout: join_drain(stdout),
                stderr: join_drain(stderr),
            }));
        }
        if sink.is_cancelled() {
            kill(&mut child, cmd.get_program());
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn kill(child: &mut Child, program: &OsStr) {
    log::debug!(
        "Killing {} (pid {}), nobody is waiting for its answer",
        program.to_string_lossy(),
        child.id()
    );
    // Fails only if the process already exited, which wait() still reaps.
    if let Err(e) = child.kill() {
        log::trace!("kill({}) failed: {}", child.id(), e);
    }
    if let Err(e) = child.wait() {
        log::warn!("Failed to reap {} (pid {}): {}", program.to_string_lossy(), child.id(), e);
    }
}

fn drain<R>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>>
where
    R: Read + Send + 'static,
{
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            if let Err(e) = pipe.read_to_end(&mut buf) {
                log::debug!("Failed to read tool output: {}", e);
            }
            buf
        })
    })
}

fn join_drain(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

/// Both tools exit 1 when a path has no owner, which is an empty answer,
/// not a failure.
fn search_status(output: &Output) -> ExitStatus {
    match output.status.code() {
        Some(0 | 1) => ExitStatus::Success,
        Some(code) => ExitStatus::Failed(format!("exit code {code}")),
        None => ExitStatus::Cancelled,
    }
}

/// Extract the owning packages from search output, one event per package.
fn parse_owners(tool: PackageTool, output: &Output, queried: &[PathBuf]) -> Vec<PackageInfo> {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let ids = match tool {
        PackageTool::Dpkg => parse_dpkg_search(&stdout, queried),
        PackageTool::Rpm => parse_rpm_search(&stdout),
    };
    ids.into_iter()
        .map(|id| PackageInfo::new(InfoKind::Installed, id))
        .collect()
}

/// Parse `dpkg-query -S` lines such as `libfoo:amd64, libfoo:i386: /path`.
///
/// `dpkg-query` treats its arguments as glob patterns, so a queried name
/// containing `*`, `?` or `[` can match unrelated files. Only lines whose
/// path is exactly one of `queried` are kept.
fn parse_dpkg_search(stdout: &str, queried: &[PathBuf]) -> Vec<PackageId> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();

    for line in stdout.lines() {
        if line.starts_with("diversion ") {
            continue;
        }
        let Some((packages, path)) = line.split_once(": ") else {
            continue;
        };
        if !queried.iter().any(|q| q.as_os_str() == path) {
            log::trace!("Ignoring dpkg-query match for unrelated path {}", path);
            continue;
        }
        for package in packages.split(", ") {
            let (name, arch) = package.split_once(':').unwrap_or((package, ""));
            if !name.is_empty() && seen.insert(name.to_string()) {
                ids.push(PackageId::new(name, "", arch, super::package::INSTALLED_DATA));
            }
        }
    }
    ids
}

/// Parse `rpm -qf` lines produced by the `name;version;arch` query format.
fn parse_rpm_search(stdout: &str) -> Vec<PackageId> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();

    for line in stdout.lines() {
        let mut fields = line.splitn(3, ';');
        let (Some(name), Some(version), Some(arch)) = (fields.next(), fields.next(), fields.next())
        else {
            // "file ... is not owned by any package"
            continue;
        };
        if !name.is_empty() && seen.insert(name.to_string()) {
            ids.push(PackageId::new(name, version, arch, super::package::INSTALLED_DATA));
        }
    }
    ids
}

/// Parse a one-path-per-line manifest, keeping absolute paths only.
fn parse_file_list(stdout: &[u8]) -> Vec<PathBuf> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('/'))
        .map(PathBuf::from)
        .collect()
}

fn find_in_path(program: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        path.metadata()
            .is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
    }
    #[cfg(not(unix))]
    {
        path.is_file()
    }
}
