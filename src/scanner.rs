use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::ScanError;
use crate::nmap_xml;

/// Scanner output before normalization: hosts, protocols and ports in whatever
/// order the tool produced them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawScan {
    pub hosts: Vec<RawHost>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawHost {
    pub host: String,
    pub hostname: String,
    pub state: String,
    pub protocols: Vec<RawProtocol>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawProtocol {
    pub name: String,
    pub ports: Vec<RawPort>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawPort {
    pub port: u16,
    pub details: Map<String, Value>,
}

/// Something that can probe `target` with a scanner-specific `options` string.
///
/// The server holds one as `Arc<dyn ScanCapability>`; tests swap in a stub.
#[async_trait]
pub trait ScanCapability: Send + Sync {
    fn name(&self) -> &'static str;
    async fn scan(&self, target: &str, options: &str) -> Result<RawScan, ScanError>;
}

/// Runs the `nmap` binary and parses its XML report from stdout.
#[derive(Debug, Clone)]
pub struct NmapScanner {
    binary: PathBuf,
}

impl NmapScanner {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn binary_name(&self) -> String {
        self.binary.display().to_string()
    }
}

impl Default for NmapScanner {
    fn default() -> Self {
        Self::new("nmap")
    }
}

const REDIRECT_FLAGS: &[&str] = &["-oX", "-oN", "-oG", "-oA", "-oS"];

/// Split an options string with shell-style quoting, refusing output redirection
/// since the XML report has to come back on stdout.
pub fn split_options(options: &str) -> Result<Vec<String>, ScanError> {
    let args = shlex::split(options).ok_or_else(|| {
        ScanError::InvalidOptions(format!("unbalanced quoting in options: {options}"))
    })?;
    if let Some(flag) = args
        .iter()
        .find(|a| REDIRECT_FLAGS.iter().any(|f| a.starts_with(f)))
    {
        return Err(ScanError::InvalidOptions(format!(
            "output can't be redirected from the options string ({flag})"
        )));
    }
    Ok(args)
}

/// Split a target expression into separate hosts, honouring shell-style quoting.
pub fn split_targets(target: &str) -> Result<Vec<String>, ScanError> {
    shlex::split(target).ok_or_else(|| {
        ScanError::InvalidTarget(format!("unbalanced quoting in target: {target}"))
    })
}

#[async_trait]
impl ScanCapability for NmapScanner {
    fn name(&self) -> &'static str {
        "nmap"
    }

    async fn scan(&self, target: &str, options: &str) -> Result<RawScan, ScanError> {
        let hosts = split_targets(target)?;
        let args = split_options(options)?;
        info!(scan_target = %target, %options, "launching nmap");

        let out = Command::new(&self.binary)
            .arg("-oX")
            .arg("-")
            .args(&hosts)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => ScanError::NotInstalled(self.binary_name()),
                ErrorKind::PermissionDenied => ScanError::PermissionDenied(self.binary_name()),
                _ => ScanError::Io(e),
            })?;

        let stderr = String::from_utf8_lossy(&out.stderr);
        if !out.status.success() {
            let msg = stderr.trim();
            return Err(ScanError::ToolFailed(if msg.is_empty() {
                format!("nmap exited with {}", out.status)
            } else {
                msg.to_string()
            }));
        }
        if !stderr.trim().is_empty() {
            warn!(scan_target = %target, stderr = %stderr.trim(), "nmap reported warnings");
        }

        let xml = String::from_utf8_lossy(&out.stdout);
        let raw = nmap_xml::parse_nmap_xml(&xml)?;
        debug!(scan_target = %target, hosts = raw.hosts.len(), "nmap finished");
        Ok(raw)
    }
}
