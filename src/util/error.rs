use std::io;

/// Errors raised while loading the device manifest or resolving its paths.
/// All of these are fatal to initialization; the engine refuses to serve
/// requests rather than start in a half-configured state.
#[derive(Debug)]
pub enum ConfigError {
    ManifestNotFound,
    ManifestParse(serde_json::Error),
    NoProfiles,
    PathDefinition(String),
    PathInvalid { name: String, path: String },
    Io(io::Error),
}

impl From<io::Error> for ConfigError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::ManifestParse(err)
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ManifestNotFound => {
                write!(f, "no readable device manifest found in the search list")
            }
            Self::ManifestParse(e) => write!(f, "error parsing manifest: {e}"),
            Self::NoProfiles => write!(f, "no profiles were found in the device manifest"),
            Self::PathDefinition(name) => {
                write!(f, "please define path for {name}, or remove it from manifest")
            }
            Self::PathInvalid { name, path } => write!(f, "invalid {name} path {path}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Runtime errors from the sysfs control files. These are logged and the
/// current operation continues with the next tunable; a governor rejecting
/// one value must not abort a whole profile transition.
#[derive(Debug)]
pub enum ControlError {
    Read { path: String, source: io::Error },
    Write { path: String, source: io::Error },
    PermissionDenied(String),
    UnknownProfile(String),
    UnsupportedValue { path: String, found: String },
}

impl std::fmt::Display for ControlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read { path, source } => write!(f, "failed to read from path {path}: {source}"),
            Self::Write { path, source } => write!(f, "failed to write to path {path}: {source}"),
            Self::PermissionDenied(s) => write!(f, "permission denied: {s}"),
            Self::UnknownProfile(name) => write!(f, "profile {name} does not exist"),
            Self::UnsupportedValue { path, found } => {
                write!(f, "unsupported value type '{found}' when writing to path {path}")
            }
        }
    }
}

impl std::error::Error for ControlError {}
