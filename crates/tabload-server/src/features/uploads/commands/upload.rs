use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::config::UploadConfig;
use crate::features::shared::validation::{file_extension, secure_filename, validate_served_name};

/// Upper bound on `-N` suffixes tried under [`CollisionPolicy::Version`]
const MAX_VERSION_ATTEMPTS: u32 = 1000;

/// What to do when the sanitized name is already taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollisionPolicy {
    #[default]
    Overwrite,
    Reject,
    Version,
}

impl FromStr for CollisionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "overwrite" => Ok(CollisionPolicy::Overwrite),
            "reject" => Ok(CollisionPolicy::Reject),
            "version" => Ok(CollisionPolicy::Version),
            other => Err(format!(
                "unknown collision policy '{}' (expected overwrite, reject or version)",
                other
            )),
        }
    }
}

impl fmt::Display for CollisionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CollisionPolicy::Overwrite => "overwrite",
            CollisionPolicy::Reject => "reject",
            CollisionPolicy::Version => "version",
        })
    }
}

/// The `file` part of an upload form
#[derive(Debug, Clone)]
pub struct IncomingFile {
    /// Client-supplied and untrusted
    pub filename: String,
    pub content: Vec<u8>,
}

/// Validation failures; the caller answers these with a plain redirect
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadRejection {
    #[error("No file part in the request")]
    MissingFile,

    #[error("No file selected")]
    EmptyFilename,

    #[error("File type '{0}' is not allowed")]
    DisallowedExtension(String),

    #[error("Filename '{0}' has no safe representation")]
    UnsafeFilename(String),
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error(transparent)]
    Rejected(#[from] UploadRejection),

    #[error("A file named '{0}' already exists")]
    Conflict(String),

    #[error("Refusing to store '{0}' outside the upload directory")]
    OutsideRoot(String),

    #[error("Upload directory {path} is not usable: {source}")]
    RootUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to store upload: {0}")]
    Io(#[from] io::Error),
}

/// A name that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedName {
    pub sanitized: String,
    pub extension: String,
}

/// A stored upload; never modified after the write
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub original_name: String,
    /// Final name on disk, including any `-N` suffix
    pub sanitized_name: String,
    pub stored_path: PathBuf,
    pub extension: String,
    pub size: u64,
    /// Hex SHA-256 of the stored bytes
    pub checksum: String,
}

/// Validates incoming files and writes them under a fixed root
#[derive(Debug, Clone)]
pub struct UploadGate {
    root: PathBuf,
    allowed_extensions: Vec<String>,
    collision: CollisionPolicy,
}

impl UploadGate {
    /// Canonicalize the configured root and check that it is a writable directory
    pub async fn open(config: &UploadConfig) -> Result<Self, UploadError> {
        let unavailable = |source| UploadError::RootUnavailable {
            path: config.root.clone(),
            source,
        };

        let root = tokio::fs::canonicalize(&config.root).await.map_err(unavailable)?;
        let metadata = tokio::fs::metadata(&root).await.map_err(unavailable)?;
        if !metadata.is_dir() {
            return Err(unavailable(io::Error::new(
                io::ErrorKind::InvalidInput,
                "not a directory",
            )));
        }

        let marker = root.join(format!(".write-check-{}", Uuid::new_v4().simple()));
        tokio::fs::File::create(&marker).await.map_err(unavailable)?;
        tokio::fs::remove_file(&marker).await.map_err(unavailable)?;

        tracing::info!(
            root = %root.display(),
            collision = %config.collision,
            allowed = ?config.allowed_extensions,
            "Upload directory ready"
        );

        Ok(Self {
            root,
            allowed_extensions: config.allowed_extensions.clone(),
            collision: config.collision,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn collision(&self) -> CollisionPolicy {
        self.collision
    }

    /// The lower-cased extension of `filename`, when it is allow-listed
    pub fn allowed_extension(&self, filename: &str) -> Option<String> {
        file_extension(filename).filter(|ext| self.allowed_extensions.contains(ext))
    }

    pub fn validate(&self, incoming: Option<&IncomingFile>) -> Result<AcceptedName, UploadRejection> {
        let file = incoming.ok_or(UploadRejection::MissingFile)?;

        if file.filename.is_empty() {
            return Err(UploadRejection::EmptyFilename);
        }

        let Some(extension) = self.allowed_extension(&file.filename) else {
            let ext = file_extension(&file.filename).unwrap_or_default();
            return Err(UploadRejection::DisallowedExtension(ext));
        };

        let sanitized = secure_filename(&file.filename);
        if sanitized.is_empty() || self.allowed_extension(&sanitized).as_deref() != Some(extension.as_str()) {
            return Err(UploadRejection::UnsafeFilename(file.filename.clone()));
        }

        Ok(AcceptedName {
            sanitized,
            extension,
        })
    }

    /// Path for `name` directly under the root
    pub fn resolve(&self, name: &str) -> Result<PathBuf, UploadError> {
        validate_served_name(name).map_err(|_| UploadError::OutsideRoot(name.to_string()))?;

        let path = self.root.join(name);
        if path.parent() != Some(self.root.as_path()) {
            return Err(UploadError::OutsideRoot(name.to_string()));
        }
        Ok(path)
    }

    /// Write `file` under `accepted`'s name following the collision policy
    ///
    /// Bytes go to a hidden temporary sibling first and are moved into
    /// place in one step, so readers never see a partial file.
    #[tracing::instrument(skip(self, file), fields(name = %accepted.sanitized, policy = %self.collision))]
    pub async fn store(&self, file: IncomingFile, accepted: AcceptedName) -> Result<UploadedFile, UploadError> {
        let target = self.resolve(&accepted.sanitized)?;
        let temp = self.resolve_temp(&accepted.sanitized);

        let checksum = hex::encode(Sha256::digest(&file.content));
        let size = file.content.len() as u64;

        let placed = match write_temp(&temp, &file.content).await {
            Ok(()) => self.place(&temp, &target, &accepted.sanitized).await,
            Err(e) => Err(e.into()),
        };

        if let Err(e) = tokio::fs::remove_file(&temp).await {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = %temp.display(), error = %e, "Failed to remove temporary upload");
            }
        }

        let (sanitized_name, stored_path) = placed?;
        tracing::info!(
            stored = %stored_path.display(),
            size,
            checksum = %checksum,
            "Upload stored"
        );

        Ok(UploadedFile {
            original_name: file.filename,
            sanitized_name,
            stored_path,
            extension: accepted.extension,
            size,
            checksum,
        })
    }

    fn resolve_temp(&self, name: &str) -> PathBuf {
        self.root
            .join(format!(".{}.{}.part", name, Uuid::new_v4().simple()))
    }

    async fn place(&self, temp: &Path, target: &Path, name: &str) -> Result<(String, PathBuf), UploadError> {
        match self.collision {
            CollisionPolicy::Overwrite => {
                tokio::fs::rename(temp, target).await?;
                Ok((name.to_string(), target.to_path_buf()))
            }
            CollisionPolicy::Reject => match tokio::fs::hard_link(temp, target).await {
                Ok(()) => Ok((name.to_string(), target.to_path_buf())),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    Err(UploadError::Conflict(name.to_string()))
                }
                Err(e) => Err(e.into()),
            },
            CollisionPolicy::Version => {
                for attempt in 0..=MAX_VERSION_ATTEMPTS {
                    let candidate = versioned_name(name, attempt);
                    let path = self.resolve(&candidate)?;
                    match tokio::fs::hard_link(temp, &path).await {
                        Ok(()) => return Ok((candidate, path)),
                        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                        Err(e) => return Err(e.into()),
                    }
                }
                Err(UploadError::Conflict(name.to_string()))
            }
        }
    }
}

async fn write_temp(path: &Path, content: &[u8]) -> io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(content).await?;
    file.sync_all().await
}

/// `data.csv` -> `data-N.csv`; attempt 0 is the name itself
fn versioned_name(name: &str, attempt: u32) -> String {
    if attempt == 0 {
        return name.to_string();
    }
    match name.rsplit_once('.') {
        Some((stem, ext)) => format!("{}-{}.{}", stem, attempt, ext),
        None => format!("{}-{}", name, attempt),
    }
}

/// Validate then store; the whole upload step
pub async fn handle(gate: &UploadGate, incoming: Option<IncomingFile>) -> Result<UploadedFile, UploadError> {
    let accepted = gate.validate(incoming.as_ref())?;
    let file = incoming.ok_or(UploadRejection::MissingFile)?;
    gate.store(file, accepted).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn upload_config(root: &Path, collision: CollisionPolicy) -> UploadConfig {
        UploadConfig {
            root: root.to_path_buf(),
            allowed_extensions: vec!["csv".to_string(), "txt".to_string()],
            max_bytes: 1024 * 1024,
            collision,
        }
    }

    async fn gate(collision: CollisionPolicy) -> (TempDir, UploadGate) {
        let dir = TempDir::new().unwrap();
        let gate = UploadGate::open(&upload_config(dir.path(), collision))
            .await
            .unwrap();
        (dir, gate)
    }

    fn incoming(filename: &str, content: &[u8]) -> IncomingFile {
        IncomingFile {
            filename: filename.to_string(),
            content: content.to_vec(),
        }
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_collision_policy_parsing() {
        assert_eq!("Reject".parse(), Ok(CollisionPolicy::Reject));
        assert_eq!("version".parse(), Ok(CollisionPolicy::Version));
        assert!("append".parse::<CollisionPolicy>().is_err());
        assert_eq!(CollisionPolicy::default(), CollisionPolicy::Overwrite);
    }

    #[test]
    fn test_versioned_name() {
        assert_eq!(versioned_name("data.csv", 0), "data.csv");
        assert_eq!(versioned_name("data.csv", 2), "data-2.csv");
        assert_eq!(versioned_name("iris.v2.txt", 1), "iris.v2-1.txt");
    }

    #[tokio::test]
    async fn test_open_rejects_missing_root() {
        let dir = TempDir::new().unwrap();
        let config = upload_config(&dir.path().join("missing"), CollisionPolicy::Overwrite);
        assert!(matches!(
            UploadGate::open(&config).await,
            Err(UploadError::RootUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_open_rejects_file_root() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("plain.txt");
        std::fs::write(&file, b"x").unwrap();
        let config = upload_config(&file, CollisionPolicy::Overwrite);
        assert!(matches!(
            UploadGate::open(&config).await,
            Err(UploadError::RootUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_validate_rejections() {
        let (_dir, gate) = gate(CollisionPolicy::Overwrite).await;

        assert_eq!(gate.validate(None), Err(UploadRejection::MissingFile));
        assert_eq!(
            gate.validate(Some(&incoming("", b"a,b"))),
            Err(UploadRejection::EmptyFilename)
        );
        assert_eq!(
            gate.validate(Some(&incoming("data.png", b"\x89PNG"))),
            Err(UploadRejection::DisallowedExtension("png".to_string()))
        );
        assert_eq!(
            gate.validate(Some(&incoming("README", b"x"))),
            Err(UploadRejection::DisallowedExtension(String::new()))
        );
        assert_eq!(
            gate.validate(Some(&incoming(".csv", b"x"))),
            Err(UploadRejection::UnsafeFilename(".csv".to_string()))
        );
    }

    #[tokio::test]
    async fn test_validate_sanitizes() {
        let (_dir, gate) = gate(CollisionPolicy::Overwrite).await;
        let accepted = gate
            .validate(Some(&incoming("../../My Data.CSV", b"x")))
            .unwrap();
        assert_eq!(accepted.sanitized, "My_Data.CSV");
        assert_eq!(accepted.extension, "csv");
    }

    #[tokio::test]
    async fn test_disallowed_upload_writes_nothing() {
        let (dir, gate) = gate(CollisionPolicy::Overwrite).await;
        let err = handle(&gate, Some(incoming("data.png", b"\x89PNG"))).await.unwrap_err();
        assert!(matches!(err, UploadError::Rejected(UploadRejection::DisallowedExtension(_))));
        assert!(entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_store_under_root() {
        let (dir, gate) = gate(CollisionPolicy::Overwrite).await;
        let stored = handle(&gate, Some(incoming("../../etc/data.csv", b"abc")))
            .await
            .unwrap();

        assert_eq!(stored.sanitized_name, "etc_data.csv");
        assert_eq!(stored.original_name, "../../etc/data.csv");
        assert_eq!(stored.stored_path.parent(), Some(gate.root()));
        assert_eq!(stored.size, 3);
        assert_eq!(
            stored.checksum,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(entries(dir.path()), vec!["etc_data.csv"]);
        assert_eq!(std::fs::read(&stored.stored_path).unwrap(), b"abc");
    }

    #[tokio::test]
    async fn test_overwrite_policy_replaces() {
        let (dir, gate) = gate(CollisionPolicy::Overwrite).await;
        handle(&gate, Some(incoming("data.csv", b"first"))).await.unwrap();
        let second = handle(&gate, Some(incoming("data.csv", b"second"))).await.unwrap();

        assert_eq!(entries(dir.path()), vec!["data.csv"]);
        assert_eq!(std::fs::read(second.stored_path).unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_reject_policy_conflicts() {
        let (dir, gate) = gate(CollisionPolicy::Reject).await;
        handle(&gate, Some(incoming("data.csv", b"first"))).await.unwrap();
        let err = handle(&gate, Some(incoming("data.csv", b"second"))).await.unwrap_err();

        assert!(matches!(err, UploadError::Conflict(ref name) if name == "data.csv"));
        assert_eq!(entries(dir.path()), vec!["data.csv"]);
        assert_eq!(std::fs::read(dir.path().join("data.csv")).unwrap(), b"first");
    }

    #[tokio::test]
    async fn test_version_policy_suffixes() {
        let (dir, gate) = gate(CollisionPolicy::Version).await;
        handle(&gate, Some(incoming("data.csv", b"1"))).await.unwrap();
        let second = handle(&gate, Some(incoming("data.csv", b"2"))).await.unwrap();
        let third = handle(&gate, Some(incoming("data.csv", b"3"))).await.unwrap();

        assert_eq!(second.sanitized_name, "data-1.csv");
        assert_eq!(third.sanitized_name, "data-2.csv");
        assert_eq!(entries(dir.path()), vec!["data-1.csv", "data-2.csv", "data.csv"]);
    }

    #[tokio::test]
    async fn test_resolve_refuses_traversal() {
        let (_dir, gate) = gate(CollisionPolicy::Overwrite).await;
        assert!(gate.resolve("data.csv").is_ok());
        assert!(matches!(gate.resolve("../data.csv"), Err(UploadError::OutsideRoot(_))));
        assert!(matches!(gate.resolve("/etc/passwd"), Err(UploadError::OutsideRoot(_))));
        assert!(matches!(gate.resolve(".."), Err(UploadError::OutsideRoot(_))));
    }
}
