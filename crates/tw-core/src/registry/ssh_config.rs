//! SSH client config backed registry
//!
//! Only the blocks this process manages are rewritten. Everything else in the
//! file (comments, blank lines, unrelated hosts, `Match` blocks) is kept
//! verbatim. New entries are placed ahead of wildcard blocks so a `Host *`
//! section cannot shadow their `Hostname`/`Port`/`User`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::{expand_home, DEFAULT_LOGIN_USER};
use crate::error::PersistenceError;
use crate::traits::ConnectionRegistry;
use crate::types::{ClusterId, TunnelInfo};

const INDENT: &str = "    ";

/// One `Host` or `Match` section and the lines that follow it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostBlock {
    header: String,
    keyword: String,
    patterns: Vec<String>,
    lines: Vec<String>,
}

impl HostBlock {
    fn new_host(alias: &str) -> Self {
        Self {
            header: format!("Host {}", alias),
            keyword: "host".to_string(),
            patterns: vec![alias.to_string()],
            lines: Vec::new(),
        }
    }

    /// Whether this is a `Host` block for exactly `alias`
    pub fn is_alias(&self, alias: &str) -> bool {
        self.keyword == "host" && self.patterns.len() == 1 && self.patterns[0] == alias
    }

    /// Whether the block can apply to hosts other than one literal alias
    pub fn is_catch_all(&self) -> bool {
        self.keyword != "host" || self.patterns.iter().any(|p| p.contains(|c| c == '*' || c == '?'))
    }

    /// Host patterns, empty for `Match` blocks
    pub fn patterns(&self) -> &[String] {
        if self.keyword == "host" {
            &self.patterns
        } else {
            &[]
        }
    }

    /// First value for `key`, matched case-insensitively
    pub fn get(&self, key: &str) -> Option<String> {
        self.lines.iter().find_map(|line| match split_directive(line) {
            Some((k, v)) if k.eq_ignore_ascii_case(key) => Some(unquote(v).to_string()),
            _ => None,
        })
    }

    /// Overwrite the first `key` line in place or append one
    pub fn set(&mut self, key: &str, value: &str) {
        let rendered = format!("{} {}", key, quote(value));

        let existing = self.lines.iter().position(|line| {
            matches!(split_directive(line), Some((k, _)) if k.eq_ignore_ascii_case(key))
        });

        match existing {
            Some(index) => {
                let line = &self.lines[index];
                let indent = line[..line.len() - line.trim_start().len()].to_string();
                self.lines[index] = format!("{}{}", indent, rendered);
            }
            None => {
                // Keep trailing blank lines and comments after the new directive
                let insert_at = self
                    .lines
                    .iter()
                    .rposition(|line| split_directive(line).is_some())
                    .map(|i| i + 1)
                    .unwrap_or(0);
                self.lines
                    .insert(insert_at, format!("{}{}", INDENT, rendered));
            }
        }
    }
}

/// Parsed SSH client configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SshConfigFile {
    preamble: Vec<String>,
    blocks: Vec<HostBlock>,
}

impl SshConfigFile {
    /// Parse config text
    pub fn parse(text: &str) -> Self {
        let mut config = Self::default();

        for line in text.lines() {
            match split_directive(line) {
                Some((key, value))
                    if key.eq_ignore_ascii_case("host") || key.eq_ignore_ascii_case("match") =>
                {
                    config.blocks.push(HostBlock {
                        header: line.to_string(),
                        keyword: key.to_ascii_lowercase(),
                        patterns: value.split_whitespace().map(String::from).collect(),
                        lines: Vec::new(),
                    });
                }
                _ => match config.blocks.last_mut() {
                    Some(block) => block.lines.push(line.to_string()),
                    None => config.preamble.push(line.to_string()),
                },
            }
        }

        config
    }

    /// Render back to config text
    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.preamble {
            out.push_str(line);
            out.push('\n');
        }
        for block in &self.blocks {
            out.push_str(&block.header);
            out.push('\n');
            for line in &block.lines {
                out.push_str(line);
                out.push('\n');
            }
        }
        out
    }

    /// Aliases of all single-pattern `Host` blocks
    pub fn hosts(&self) -> Vec<&str> {
        self.blocks
            .iter()
            .filter(|b| b.keyword == "host" && b.patterns.len() == 1)
            .map(|b| b.patterns[0].as_str())
            .collect()
    }

    /// Block for `alias`, if any
    pub fn host(&self, alias: &str) -> Option<&HostBlock> {
        self.blocks.iter().find(|b| b.is_alias(alias))
    }

    /// Block for `alias`, inserted if missing
    ///
    /// ssh keeps the first value it sees for each option, so a new block goes
    /// in front of the first wildcard `Host` or `Match` block. Otherwise it is
    /// appended.
    pub fn host_mut_or_insert(&mut self, alias: &str) -> &mut HostBlock {
        if let Some(index) = self.blocks.iter().position(|b| b.is_alias(alias)) {
            return &mut self.blocks[index];
        }

        let index = match self.blocks.iter().position(HostBlock::is_catch_all) {
            Some(index) => {
                let mut block = HostBlock::new_host(alias);
                block.lines.push(String::new());
                self.separate_before(index);
                self.blocks.insert(index, block);
                index
            }
            None => {
                self.separate_before(self.blocks.len());
                self.blocks.push(HostBlock::new_host(alias));
                self.blocks.len() - 1
            }
        };
        &mut self.blocks[index]
    }

    /// Drop the block for `alias`; returns whether one existed
    pub fn remove_host(&mut self, alias: &str) -> bool {
        let before = self.blocks.len();
        self.blocks.retain(|b| !b.is_alias(alias));
        self.blocks.len() != before
    }

    /// Make sure whatever precedes block `index` ends with a blank line
    fn separate_before(&mut self, index: usize) {
        let tail = match index.checked_sub(1) {
            Some(prev) => &mut self.blocks[prev].lines,
            None => &mut self.preamble,
        };
        if tail.last().map(|l| !l.trim().is_empty()).unwrap_or(false) {
            tail.push(String::new());
        }
    }
}

/// Registry stored in an SSH client config file
///
/// The file is re-read on every call and only the `Host <cluster_id>` block
/// being changed is rewritten, so several watchers (and the user's own
/// editor) can share one file. Concurrent writes are last-writer-wins.
#[derive(Debug)]
pub struct SshConfigRegistry {
    path: PathBuf,
    login_user: String,
}

impl SshConfigRegistry {
    /// Open the registry; a missing file is an empty registry
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let registry = Self {
            path: path.into(),
            login_user: DEFAULT_LOGIN_USER.to_string(),
        };

        let config = registry.load()?;
        tracing::debug!(
            "Found {} host entries in {:?}",
            config.hosts().len(),
            registry.path
        );

        Ok(registry)
    }

    /// Use a different login user for entries written from now on
    pub fn with_login_user(mut self, user: impl Into<String>) -> Self {
        self.login_user = user.into();
        self
    }

    /// Backing file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current file contents
    pub fn load(&self) -> Result<SshConfigFile, PersistenceError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(SshConfigFile::parse(&text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(SshConfigFile::default()),
            Err(source) => Err(PersistenceError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn save(&self, config: &SshConfigFile) -> Result<(), PersistenceError> {
        let write_err = |source: io::Error| PersistenceError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(write_err)?;
            }
        }

        let existed = self.path.exists();
        fs::write(&self.path, config.render()).map_err(write_err)?;

        // Fresh files get ssh's preferred mode; existing ones keep theirs
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if !existed {
                fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))
                    .map_err(write_err)?;
            }
        }
        #[cfg(not(unix))]
        let _ = existed;

        Ok(())
    }
}

impl ConnectionRegistry for SshConfigRegistry {
    fn get(&self, cluster_id: &ClusterId) -> Option<TunnelInfo> {
        let config = match self.load() {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Cannot read entry for {}: {}", cluster_id, e);
                return None;
            }
        };
        let block = config.host(cluster_id.as_str())?;

        let host = block.get("hostname")?;
        let port = block.get("port")?.parse::<u16>().ok()?;
        let key_file = block.get("identityfile")?;

        match TunnelInfo::new(host, port, expand_home(Path::new(&key_file))) {
            Ok(info) => Some(info),
            Err(e) => {
                tracing::warn!("Ignoring malformed entry for {}: {}", cluster_id, e);
                None
            }
        }
    }

    fn set(&mut self, cluster_id: &ClusterId, info: &TunnelInfo) -> Result<(), PersistenceError> {
        let mut config = self.load()?;
        let block = config.host_mut_or_insert(cluster_id.as_str());
        block.set("Hostname", info.host());
        block.set("Port", &info.port().to_string());
        block.set("User", &self.login_user);
        block.set("IdentityFile", &info.private_key_file().to_string_lossy());

        self.save(&config)?;
        tracing::debug!("Saved {} -> {} to {:?}", cluster_id, info, self.path);
        Ok(())
    }

    fn remove(&mut self, cluster_id: &ClusterId) -> Result<(), PersistenceError> {
        let mut config = self.load()?;
        if !config.remove_host(cluster_id.as_str()) {
            return Ok(());
        }
        self.save(&config)?;
        tracing::debug!("Removed {} from {:?}", cluster_id, self.path);
        Ok(())
    }
}

/// Split `Key value` / `Key=value`; `None` for blank and comment lines
fn split_directive(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }

    let end = trimmed
        .find(|c: char| c.is_whitespace() || c == '=')
        .unwrap_or(trimmed.len());
    let key = &trimmed[..end];
    let rest = trimmed[end..].trim_start();
    let value = rest.strip_prefix('=').unwrap_or(rest).trim();
    Some((key, value))
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

fn quote(value: &str) -> String {
    if value.contains(char::is_whitespace) {
        format!("\"{}\"", value)
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn info(host: &str, port: u16) -> TunnelInfo {
        TunnelInfo::new(host, port, "/keys/cluster-1").unwrap()
    }

    #[test]
    fn test_split_directive_forms() {
        assert_eq!(split_directive("  Port 22"), Some(("Port", "22")));
        assert_eq!(split_directive("Port=22"), Some(("Port", "22")));
        assert_eq!(split_directive("Port = 22"), Some(("Port", "22")));
        assert_eq!(split_directive("   # comment"), None);
        assert_eq!(split_directive(""), None);
    }

    #[test]
    fn test_parse_render_preserves_text() {
        let text = "# global\nServerAliveInterval 30\n\nHost a b\n    User me\n\nMatch host x\n  Port 2\n";
        let config = SshConfigFile::parse(text);
        assert_eq!(config.render(), text);
        assert!(config.hosts().is_empty());
    }

    #[test]
    fn test_block_lookup_is_case_insensitive() {
        let config = SshConfigFile::parse("Host c1\n  HOSTNAME h\n  port=2200\n");
        let block = config.host("c1").unwrap();
        assert_eq!(block.get("hostname").as_deref(), Some("h"));
        assert_eq!(block.get("Port").as_deref(), Some("2200"));
        assert_eq!(block.patterns(), ["c1".to_string()]);
    }

    #[test]
    fn test_set_then_get_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config");
        let id = ClusterId::new("cluster-1");

        let mut registry = SshConfigRegistry::open(&path).unwrap();
        assert!(registry.get(&id).is_none());

        registry.set(&id, &info("10.0.0.5", 4040)).unwrap();
        assert_eq!(registry.get(&id), Some(info("10.0.0.5", 4040)));

        // Survives a reload from disk
        let reopened = SshConfigRegistry::open(&path).unwrap();
        assert_eq!(reopened.get(&id), Some(info("10.0.0.5", 4040)));
    }

    #[test]
    fn test_set_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config");
        let id = ClusterId::new("cluster-1");

        let mut registry = SshConfigRegistry::open(&path).unwrap();
        registry.set(&id, &info("h", 1)).unwrap();
        registry.set(&id, &info("h", 1)).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("Host cluster-1").count(), 1);
        assert_eq!(text.matches("Port").count(), 1);
        assert_eq!(registry.load().unwrap().hosts(), vec!["cluster-1"]);
    }

    #[test]
    fn test_set_overwrites_in_place() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config");
        fs::write(
            &path,
            "Host other\n    Hostname example.com\n\nHost cluster-1\n\tHostname old\n\tPort 1\n\tUser someone\n\tForwardAgent yes\n",
        )
        .unwrap();
        let id = ClusterId::new("cluster-1");

        let mut registry = SshConfigRegistry::open(&path).unwrap();
        registry.set(&id, &info("new.host", 2022)).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\tHostname new.host\n"));
        assert!(text.contains("\tPort 2022\n"));
        assert!(text.contains("\tUser root\n"));
        assert!(text.contains("\tForwardAgent yes\n"));
        assert!(text.contains("    IdentityFile /keys/cluster-1\n"));
        assert!(text.starts_with("Host other\n    Hostname example.com\n\n"));
    }

    #[test]
    fn test_new_entry_is_appended_after_blank_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config");
        fs::write(&path, "Host other\n    Hostname example.com").unwrap();

        let mut registry = SshConfigRegistry::open(&path)
            .unwrap()
            .with_login_user("ubuntu");
        registry
            .set(&ClusterId::new("cluster-1"), &info("h", 9))
            .unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "Host other\n    Hostname example.com\n\nHost cluster-1\n    Hostname h\n    Port 9\n    User ubuntu\n    IdentityFile /keys/cluster-1\n"
        );
    }

    #[test]
    fn test_new_entry_goes_before_wildcard_block() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config");
        fs::write(
            &path,
            "Host other\n    Hostname example.com\n\nHost *\n    User nobody\n",
        )
        .unwrap();
        let id = ClusterId::new("cluster-1");

        let mut registry = SshConfigRegistry::open(&path).unwrap();
        registry.set(&id, &info("h", 9)).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "Host other\n    Hostname example.com\n\nHost cluster-1\n    Hostname h\n    Port 9\n    User root\n    IdentityFile /keys/cluster-1\n\nHost *\n    User nobody\n"
        );
        assert_eq!(registry.get(&id), Some(info("h", 9)));
    }

    #[test]
    fn test_match_block_counts_as_catch_all() {
        let mut config = SshConfigFile::parse("Match all\n  User nobody\n");
        config.host_mut_or_insert("c1").set("Port", "22");
        assert_eq!(config.render(), "Host c1\n    Port 22\n\nMatch all\n  User nobody\n");
        assert!(!config.host("c1").unwrap().is_catch_all());
    }

    #[test]
    fn test_registries_sharing_a_file_keep_each_others_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config");
        let a_id = ClusterId::new("cluster-a");
        let b_id = ClusterId::new("cluster-b");

        let mut a = SshConfigRegistry::open(&path).unwrap();
        let mut b = SshConfigRegistry::open(&path).unwrap();
        a.set(&a_id, &info("ha", 1)).unwrap();
        b.set(&b_id, &info("hb", 2)).unwrap();
        a.set(&a_id, &info("ha", 3)).unwrap();

        // The user edits an unrelated host while both are running
        let mut text = fs::read_to_string(&path).unwrap();
        text.push_str("\nHost laptop\n    Hostname 192.168.1.5\n");
        fs::write(&path, text).unwrap();
        b.remove(&b_id).unwrap();

        let fresh = SshConfigRegistry::open(&path).unwrap();
        assert_eq!(fresh.get(&a_id), Some(info("ha", 3)));
        assert!(fresh.get(&b_id).is_none());
        assert_eq!(a.get(&b_id), None);
        assert_eq!(
            fresh.load().unwrap().hosts(),
            vec!["cluster-a", "laptop"]
        );
    }

    #[test]
    fn test_remove_entry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config");
        let id = ClusterId::new("cluster-1");

        let mut registry = SshConfigRegistry::open(&path).unwrap();
        registry.set(&ClusterId::new("keep"), &info("k", 1)).unwrap();
        registry.set(&id, &info("h", 1)).unwrap();
        registry.remove(&id).unwrap();
        assert!(registry.get(&id).is_none());

        // Removing again is not an error
        registry.remove(&id).unwrap();

        let reopened = SshConfigRegistry::open(&path).unwrap();
        assert!(reopened.get(&id).is_none());
        assert!(reopened.get(&ClusterId::new("keep")).is_some());
    }

    #[test]
    fn test_malformed_entries_read_as_absent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config");
        fs::write(
            &path,
            "Host bad-port\n  Hostname h\n  Port abc\n  IdentityFile /k\n\nHost no-port\n  Hostname h\n  IdentityFile /k\n\nHost zero\n  Hostname h\n  Port 0\n  IdentityFile /k\n",
        )
        .unwrap();

        let registry = SshConfigRegistry::open(&path).unwrap();
        for alias in ["bad-port", "no-port", "zero"] {
            assert!(registry.get(&ClusterId::new(alias)).is_none(), "{}", alias);
        }
    }

    #[test]
    fn test_multi_pattern_hosts_are_not_entries() {
        let config = SshConfigFile::parse("Host c1 c2\n  Hostname h\n  Port 1\n");
        assert!(config.host("c1").is_none());
    }

    #[test]
    fn test_identity_file_with_spaces_is_quoted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config");
        let id = ClusterId::new("c1");
        let spaced = TunnelInfo::new("h", 1, "/my keys/c1").unwrap();

        let mut registry = SshConfigRegistry::open(&path).unwrap();
        registry.set(&id, &spaced).unwrap();

        assert!(fs::read_to_string(&path)
            .unwrap()
            .contains("IdentityFile \"/my keys/c1\""));
        assert_eq!(SshConfigRegistry::open(&path).unwrap().get(&id), Some(spaced));
    }

    #[test]
    fn test_unreadable_path_is_persistence_error() {
        let dir = TempDir::new().unwrap();
        // A directory where the file should be
        let path = dir.path().join("config");
        fs::create_dir(&path).unwrap();

        let result = SshConfigRegistry::open(&path);
        assert!(matches!(result, Err(PersistenceError::Read { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_new_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ssh").join("config");
        let mut registry = SshConfigRegistry::open(&path).unwrap();
        registry.set(&ClusterId::new("c1"), &info("h", 1)).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
